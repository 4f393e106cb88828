//! Command-line flags.
//!
//! Flag names follow the Kubernetes component-base conventions so the binary
//! can be dropped into manifests written for other controllers.

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use election::config::{
    DEFAULT_RESOURCE_LOCK, DEFAULT_RESOURCE_NAME, DEFAULT_RESOURCE_NAMESPACE,
};
use election::ElectionConfig;

/// A Kubernetes leader election demo
#[derive(Parser, Debug)]
#[command(name = "kle")]
#[command(about = "A Kubernetes leader election demo")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// The address the kle server binds to
    #[arg(long, env = "KLE_ADDR", default_value = ":80")]
    pub addr: String,

    /// Execute kle in dry run mode, against an in-memory lock store
    #[arg(long)]
    pub dry_run: bool,

    /// File path to kube configuration for interacting with the apiserver
    #[arg(long, alias = "client-connection-kubeconfig")]
    pub kubeconfig: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    pub log_format: LogFormat,

    #[command(flatten)]
    pub leader_election: LeaderElectionArgs,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Print build information as JSON
    Version,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Leader election flags.
#[derive(Args, Debug, Clone)]
pub struct LeaderElectionArgs {
    /// Start a leader election client and gain leadership before executing the main loop
    #[arg(
        long = "leader-elect",
        action = ArgAction::Set,
        num_args = 0..=1,
        default_value_t = false,
        default_missing_value = "true"
    )]
    pub leader_elect: bool,

    /// How long non-leader candidates wait after observing a leadership
    /// renewal before attempting to take over
    #[arg(
        long = "leader-elect-lease-duration",
        value_parser = parse_duration,
        default_value = "15s"
    )]
    pub lease_duration: Duration,

    /// Interval within which the leader must renew before it stops leading
    #[arg(
        long = "leader-elect-renew-deadline",
        value_parser = parse_duration,
        default_value = "10s"
    )]
    pub renew_deadline: Duration,

    /// Duration clients wait between attempts of acquisition and renewal
    #[arg(long = "leader-elect-retry-period", value_parser = parse_duration, default_value = "2s")]
    pub retry_period: Duration,

    /// Type of resource object used for locking
    #[arg(long = "leader-elect-resource-lock", default_value = DEFAULT_RESOURCE_LOCK)]
    pub resource_lock: String,

    /// Name of the resource object used for locking
    #[arg(long = "leader-elect-resource-name", default_value = DEFAULT_RESOURCE_NAME)]
    pub resource_name: String,

    /// Namespace of the resource object used for locking
    #[arg(long = "leader-elect-resource-namespace", default_value = DEFAULT_RESOURCE_NAMESPACE)]
    pub resource_namespace: String,

    /// Release the lease when the process is shutting down
    #[arg(
        long = "leader-elect-release-on-cancel",
        action = ArgAction::Set,
        num_args = 0..=1,
        default_value_t = true,
        default_missing_value = "true"
    )]
    pub release_on_cancel: bool,
}

impl LeaderElectionArgs {
    /// Election configuration for these flags. Validation happens in the runner.
    pub fn to_config(&self) -> ElectionConfig {
        ElectionConfig::default()
            .with_lease_duration(self.lease_duration)
            .with_renew_deadline(self.renew_deadline)
            .with_retry_period(self.retry_period)
            .with_resource_lock(&self.resource_lock)
            .with_resource(&self.resource_namespace, &self.resource_name)
            .with_release_on_cancel(self.release_on_cancel)
    }
}

/// Parse a duration such as `15s`, `500ms`, `1m30s` or a bare number of seconds.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("empty duration".to_string());
    }
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let unit_start = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(|| format!("missing unit in duration {input:?}"))?;
        let (number, tail) = rest.split_at(unit_start);

        let unit_end = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, next) = tail.split_at(unit_end);
        let nanos_per_unit: u64 = match unit {
            "ns" => 1,
            "us" | "µs" => 1_000,
            "ms" => 1_000_000,
            "s" => 1_000_000_000,
            "m" => 60_000_000_000,
            "h" => 3_600_000_000_000,
            other => return Err(format!("unknown unit {other:?} in duration {input:?}")),
        };

        let nanos = if let Ok(whole) = number.parse::<u64>() {
            whole
                .checked_mul(nanos_per_unit)
                .ok_or_else(|| format!("duration {input:?} is too large"))?
        } else {
            let fractional: f64 = number
                .parse()
                .map_err(|_| format!("invalid duration {input:?}"))?;
            (fractional * nanos_per_unit as f64).round() as u64
        };

        total = total
            .checked_add(Duration::from_nanos(nanos))
            .ok_or_else(|| format!("duration {input:?} is too large"))?;
        rest = next;
    }
    Ok(total)
}
