//! Bounded post-create readiness poll.

use std::time::{Duration, Instant};

use tokio::time::sleep;
use tracing::{debug, warn};

use super::error::DriverError;
use super::flavor::ServerFlavor;
use crate::provider::{InstanceRecord, ProviderApi};
use crate::state::CanonicalState;

/// Poll interval used when no configuration overrides it.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Poll attempts allowed when no configuration overrides it.
pub const DEFAULT_POLL_ATTEMPTS: u32 = 60;

/// How long to wait for a new server to become ready.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ReadinessPolicy {
    /// Delay between two polls.
    pub interval: Duration,
    /// Maximum number of polls before giving up.
    pub max_attempts: u32,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_POLL_ATTEMPTS,
        }
    }
}

/// Polls `id` until `flavor` reports it ready.
///
/// Every successful poll is passed to `observe` so the caller can cache the
/// latest record. Transient provider failures count as a spent attempt and the
/// poll carries on; any other failure aborts it.
pub(crate) async fn wait_until_ready(
    provider: &dyn ProviderApi,
    flavor: &dyn ServerFlavor,
    id: &str,
    policy: ReadinessPolicy,
    deadline: Option<Instant>,
    mut observe: impl FnMut(&InstanceRecord) + Send,
) -> Result<InstanceRecord, DriverError> {
    let mut last_state = CanonicalState::Unknown;
    let mut attempts = 0;
    while attempts < policy.max_attempts {
        attempts += 1;
        match flavor.fetch(provider, id).await {
            Ok(record) => {
                observe(&record);
                last_state = flavor.normalize(&record);
                if flavor.is_ready(&record) {
                    debug!(instance_id = id, attempts, "instance ready");
                    return Ok(record);
                }
                debug!(
                    instance_id = id,
                    attempt = attempts,
                    state = %last_state,
                    main_ip = %record.main_ip,
                    "instance not ready yet"
                );
            }
            Err(err) if err.is_transient() => {
                warn!(instance_id = id, attempt = attempts, error = %err, "poll failed; retrying");
            }
            Err(err) => return Err(err.into()),
        }

        if attempts >= policy.max_attempts {
            break;
        }
        let next_poll = Instant::now().checked_add(policy.interval);
        if deadline.is_some_and(|limit| next_poll.is_none_or(|next| next > limit)) {
            warn!(instance_id = id, attempts, "readiness deadline reached");
            break;
        }
        sleep(policy.interval).await;
    }

    Err(DriverError::ReadinessTimeout {
        instance_id: id.to_owned(),
        attempts,
        last_state,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::flavor::{BareMetalServer, StandardServer};
    use crate::provider::ProviderError;
    use crate::test_support::{FAKE_INSTANCE_ID, FakeProvider};

    const FAST: ReadinessPolicy = ReadinessPolicy {
        interval: Duration::from_millis(1),
        max_attempts: 5,
    };

    #[tokio::test]
    async fn waits_for_ok_server_state() {
        let provider = FakeProvider::new();
        provider.push_status("0.0.0.0", "pending", None, None);
        provider.push_status("203.0.113.5", "active", Some("running"), Some("installingbooting"));
        provider.push_status("203.0.113.5", "active", Some("running"), Some("ok"));

        let mut seen = 0;
        let record = wait_until_ready(&provider, &StandardServer, FAKE_INSTANCE_ID, FAST, None, |_| {
            seen += 1;
        })
        .await
        .unwrap_or_else(|err| panic!("poll should succeed: {err}"));

        assert_eq!(record.main_ip, "203.0.113.5");
        assert_eq!(seen, 3);
        assert_eq!(provider.call_count("get_instance"), 3);
    }

    #[tokio::test]
    async fn bare_metal_is_ready_with_an_ip() {
        let provider = FakeProvider::new();
        provider.push_status("", "pending", None, None);
        provider.push_status("198.51.100.7", "pending", None, None);

        let record = wait_until_ready(&provider, &BareMetalServer, FAKE_INSTANCE_ID, FAST, None, |_| {})
            .await
            .unwrap_or_else(|err| panic!("poll should succeed: {err}"));

        assert_eq!(record.main_ip, "198.51.100.7");
        assert_eq!(provider.call_count("get_bare_metal"), 2);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let provider = FakeProvider::new();
        provider.push_status("203.0.113.5", "active", Some("running"), Some("installingbooting"));

        let err = wait_until_ready(&provider, &StandardServer, FAKE_INSTANCE_ID, FAST, None, |_| {})
            .await
            .expect_err("poll should time out");

        match err {
            DriverError::ReadinessTimeout {
                attempts,
                last_state,
                ..
            } => {
                assert_eq!(attempts, 5);
                assert_eq!(last_state, CanonicalState::Starting);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(provider.call_count("get_instance"), 5);
    }

    #[tokio::test]
    async fn stops_at_the_deadline() {
        let provider = FakeProvider::new();
        provider.push_status("0.0.0.0", "pending", None, None);
        let policy = ReadinessPolicy {
            interval: Duration::from_secs(60),
            max_attempts: 100,
        };

        let err = wait_until_ready(
            &provider,
            &StandardServer,
            FAKE_INSTANCE_ID,
            policy,
            Some(Instant::now() + Duration::from_secs(1)),
            |_| {},
        )
        .await
        .expect_err("deadline should abort the poll");

        assert!(matches!(err, DriverError::ReadinessTimeout { attempts: 1, .. }));
    }

    #[tokio::test]
    async fn transient_failures_spend_an_attempt() {
        let provider = FakeProvider::new();
        provider.push_status("203.0.113.5", "active", Some("running"), Some("ok"));
        provider.fail_next(
            "get_instance",
            ProviderError::Transport {
                resource: String::from("instance"),
                message: String::from("connection reset"),
            },
        );

        let record = wait_until_ready(&provider, &StandardServer, FAKE_INSTANCE_ID, FAST, None, |_| {})
            .await
            .unwrap_or_else(|err| panic!("poll should recover: {err}"));

        assert_eq!(record.id, FAKE_INSTANCE_ID);
        assert_eq!(provider.call_count("get_instance"), 2);
    }

    #[tokio::test]
    async fn permanent_failures_abort() {
        let provider = FakeProvider::new();
        provider.push_status("203.0.113.5", "active", Some("running"), Some("ok"));
        provider.fail_next(
            "get_instance",
            ProviderError::Unauthorized {
                message: String::from("invalid key"),
            },
        );

        let err = wait_until_ready(&provider, &StandardServer, FAKE_INSTANCE_ID, FAST, None, |_| {})
            .await
            .expect_err("unauthorised poll should abort");

        assert!(matches!(
            err,
            DriverError::Provider(ProviderError::Unauthorized { .. })
        ));
    }

    #[tokio::test]
    async fn huge_interval_hits_the_deadline_instead_of_overflowing() {
        let provider = FakeProvider::new();
        provider.push_status("0.0.0.0", "pending", None, None);
        let policy = ReadinessPolicy {
            interval: Duration::MAX,
            max_attempts: 3,
        };

        let err = wait_until_ready(
            &provider,
            &StandardServer,
            FAKE_INSTANCE_ID,
            policy,
            Some(Instant::now() + Duration::from_secs(60)),
            |_| {},
        )
        .await
        .expect_err("deadline should abort the poll");

        assert!(matches!(
            err,
            DriverError::ReadinessTimeout { attempts: 1, .. }
        ));
        assert_eq!(provider.call_count("get_instance"), 1);
    }
}
