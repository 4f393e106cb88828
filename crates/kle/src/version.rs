//! Build information for `kle version`.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

/// `v20200521-v0.18.0`, `v20201009-v0.18.0-46-g939c1c0`, `v0.18.0` or `0.18.0`
static RELEASE_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^v?(?:\d{8}-v)?(\d+)\.(\d+\.\d+)(?:-\w+-\w+)?$")
        .expect("release version pattern is valid")
});

/// Immutable build metadata, captured at compile time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildInfo {
    pub major: String,
    pub minor: String,
    pub git_version: String,
    pub git_branch: String,
    pub git_sha1: String,
    pub build_date: String,
    pub compiler: String,
    pub platform: String,
}

impl BuildInfo {
    /// Build info of the running binary.
    ///
    /// `KLE_GIT_VERSION`, `KLE_GIT_BRANCH`, `KLE_GIT_SHA1` and `KLE_BUILD_DATE`
    /// are read from the build environment when set.
    pub fn current() -> Self {
        let git_version = option_env!("KLE_GIT_VERSION")
            .unwrap_or(concat!("v", env!("CARGO_PKG_VERSION")))
            .to_string();
        let (major, minor) = split_version(&git_version);

        Self {
            major,
            minor,
            git_version,
            git_branch: option_env!("KLE_GIT_BRANCH").unwrap_or_default().to_string(),
            git_sha1: option_env!("KLE_GIT_SHA1").unwrap_or_default().to_string(),
            build_date: option_env!("KLE_BUILD_DATE").unwrap_or_default().to_string(),
            compiler: "rustc".to_string(),
            platform: format!("{}/{}", std::env::consts::OS, std::env::consts::ARCH),
        }
    }
}

/// Split a git version into `(major, minor)`, where minor keeps the patch
/// component (`v20200521-v0.18.0` gives `("0", "18.0")`).
///
/// Unrecognised versions give two empty strings. Chart release tags such as
/// `v20210101-kle-helm-chart-0.20.0` version the chart, not the binary, and
/// are never baked into a build, so they are treated as unrecognised.
pub fn split_version(version: &str) -> (String, String) {
    RELEASE_VERSION
        .captures(version)
        .map(|caps| (caps[1].to_string(), caps[2].to_string()))
        .unwrap_or_default()
}
