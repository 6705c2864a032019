//! Normalisation of provider status vocabularies into canonical lifecycle
//! states.
//!
//! Vultr reports three overlapping fields for cloud instances (`status`,
//! `power_status` and `server_status`) while bare-metal servers only expose
//! `status`. Automation built on top of the driver branches on the canonical
//! values, so the mapping below is part of the external contract.

use std::fmt;

use serde::{Deserialize, Serialize};

const STATUS_PENDING: &str = "pending";
const STATUS_RESIZING: &str = "resizing";
const STATUS_SUSPENDED: &str = "suspended";
const STATUS_ACTIVE: &str = "active";
const POWER_RUNNING: &str = "running";
const POWER_STOPPED: &str = "stopped";

/// Fine-grained server state reported once installation and boot finished.
pub const SERVER_STATE_OK: &str = "ok";

/// Canonical lifecycle state surfaced to the orchestrator.
///
/// `Unknown` is never conflated with `Error`: callers treat `Error` as a
/// signal to stop retrying, whereas `Unknown` only means the provider returned
/// a combination the driver does not recognise.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CanonicalState {
    /// Provisioning, resizing, or booting.
    Starting,
    /// Powered on and fully booted.
    Running,
    /// Powered off.
    Stopped,
    /// Suspended by the provider.
    Error,
    /// Unrecognised status combination.
    Unknown,
}

impl CanonicalState {
    /// Returns the lowercase name used in command output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Error => "error",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for CanonicalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps the cloud-instance status triple to a [`CanonicalState`].
#[must_use]
pub fn normalize_instance(
    status: &str,
    power_status: Option<&str>,
    server_state: Option<&str>,
) -> CanonicalState {
    match status {
        STATUS_PENDING | STATUS_RESIZING => CanonicalState::Starting,
        STATUS_SUSPENDED => CanonicalState::Error,
        STATUS_ACTIVE => match power_status {
            Some(POWER_RUNNING) if server_state == Some(SERVER_STATE_OK) => CanonicalState::Running,
            Some(POWER_RUNNING) => CanonicalState::Starting,
            Some(POWER_STOPPED) => CanonicalState::Stopped,
            _ => CanonicalState::Unknown,
        },
        _ => CanonicalState::Unknown,
    }
}

/// Maps a bare-metal `status` to a [`CanonicalState`].
#[must_use]
pub fn normalize_bare_metal(status: &str) -> CanonicalState {
    match status {
        STATUS_PENDING => CanonicalState::Starting,
        STATUS_ACTIVE => CanonicalState::Running,
        _ => CanonicalState::Stopped,
    }
}

/// Returns `true` once the provider has assigned a usable main IP.
///
/// Vultr reports an unassigned address as an empty string, `"0"`, or the
/// all-zeros placeholder.
#[must_use]
pub fn main_ip_is_set(address: &str) -> bool {
    !matches!(address, "" | "0" | "0.0.0.0")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("pending", None, None, CanonicalState::Starting)]
    #[case("resizing", Some("running"), Some("ok"), CanonicalState::Starting)]
    #[case("suspended", Some("running"), Some("ok"), CanonicalState::Error)]
    #[case("suspended", None, None, CanonicalState::Error)]
    #[case("active", Some("running"), Some("ok"), CanonicalState::Running)]
    #[case(
        "active",
        Some("running"),
        Some("installingbooting"),
        CanonicalState::Starting
    )]
    #[case("active", Some("running"), None, CanonicalState::Starting)]
    #[case("active", Some("stopped"), Some("ok"), CanonicalState::Stopped)]
    #[case("active", Some("stopped"), Some("none"), CanonicalState::Stopped)]
    #[case("active", Some("rebooting"), Some("ok"), CanonicalState::Unknown)]
    #[case("active", None, None, CanonicalState::Unknown)]
    #[case("closed", Some("stopped"), None, CanonicalState::Unknown)]
    fn instance_status_table(
        #[case] status: &str,
        #[case] power: Option<&str>,
        #[case] server_state: Option<&str>,
        #[case] expected: CanonicalState,
    ) {
        assert_eq!(normalize_instance(status, power, server_state), expected);
    }

    #[rstest]
    #[case("pending", CanonicalState::Starting)]
    #[case("active", CanonicalState::Running)]
    #[case("suspended", CanonicalState::Stopped)]
    #[case("", CanonicalState::Stopped)]
    fn bare_metal_status_table(#[case] status: &str, #[case] expected: CanonicalState) {
        assert_eq!(normalize_bare_metal(status), expected);
    }

    #[rstest]
    #[case("", false)]
    #[case("0", false)]
    #[case("0.0.0.0", false)]
    #[case("203.0.113.5", true)]
    #[case("2001:db8::1", true)]
    fn main_ip_placeholders(#[case] address: &str, #[case] expected: bool) {
        assert_eq!(main_ip_is_set(address), expected);
    }

    #[test]
    fn unknown_is_distinct_from_error() {
        let unknown = normalize_instance("mystery", None, None);
        assert_ne!(unknown, CanonicalState::Error);
        assert_eq!(unknown.to_string(), "unknown");
    }
}
