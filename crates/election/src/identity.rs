//! Process identity used as the lock holder.

use std::fmt;

use tracing::debug;
use uuid::Uuid;

/// Opaque, process-unique holder identity.
///
/// Generated once per process and never changed. The hostname prefix keeps
/// identities readable in `kubectl get lease` output; the UUID suffix keeps
/// two processes on the same host from both becoming active.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity(String);

impl Identity {
    /// Generate an identity from the hostname, falling back to a bare UUID.
    #[must_use]
    pub fn generate() -> Self {
        let hostname = match hostname::get() {
            Ok(name) => Some(name.to_string_lossy().into_owned()),
            Err(e) => {
                debug!(error = %e, "Hostname lookup failed, using random identity");
                None
            }
        };
        Self::compose(hostname.as_deref())
    }

    fn compose(hostname: Option<&str>) -> Self {
        let suffix = Uuid::new_v4();
        match hostname.map(str::trim) {
            Some(host) if !host.is_empty() => Self(format!("{host}_{suffix}")),
            _ => Self(suffix.to_string()),
        }
    }

    /// Wrap an explicit identity string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_hostname_prefix() {
        let id = Identity::compose(Some("node-a"));
        assert!(id.as_str().starts_with("node-a_"));
        assert!(Uuid::parse_str(&id.as_str()["node-a_".len()..]).is_ok());
    }

    #[test]
    fn test_missing_hostname_falls_back_to_uuid() {
        let id = Identity::compose(None);
        assert!(Uuid::parse_str(id.as_str()).is_ok());

        let blank = Identity::compose(Some("  "));
        assert!(Uuid::parse_str(blank.as_str()).is_ok());
    }

    #[test]
    fn test_fallback_identities_never_collide() {
        let ids: HashSet<Identity> = (0..10_000).map(|_| Identity::compose(None)).collect();
        assert_eq!(ids.len(), 10_000);
    }

    #[test]
    fn test_same_host_identities_differ() {
        let a = Identity::compose(Some("node-a"));
        let b = Identity::compose(Some("node-a"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_generate_is_non_empty() {
        assert!(!Identity::generate().as_str().is_empty());
    }
}
