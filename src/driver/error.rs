//! Error types for the lifecycle controller.

use thiserror::Error;

use super::keys::KeyError;
use crate::preflight::PreflightError;
use crate::provider::ProviderError;
use crate::state::CanonicalState;

/// Errors raised by [`super::Driver`] operations.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Raised when pre-flight validation rejects the request.
    #[error(transparent)]
    Preflight(#[from] PreflightError),
    /// Raised when a provider call fails.
    #[error(transparent)]
    Provider(#[from] ProviderError),
    /// Raised when SSH key generation fails.
    #[error(transparent)]
    Keys(#[from] KeyError),
    /// Raised when an operation needs an instance that was never created.
    #[error("machine has no instance id; it was never created")]
    NotCreated,
    /// Raised when `create` is called on a driver that already owns a server.
    #[error("machine already owns instance {instance_id}")]
    AlreadyCreated {
        /// Provider instance identifier.
        instance_id: String,
    },
    /// Raised when a key pair is needed but no key source was configured.
    #[error("no SSH key ids were supplied and no key source is configured")]
    MissingKeySource,
    /// Raised when the provider has not assigned a main IP yet.
    #[error("IP address for instance {instance_id} is not yet available")]
    IpNotYetAvailable {
        /// Provider instance identifier.
        instance_id: String,
    },
    /// Raised when the instance does not become ready in time.
    #[error(
        "instance {instance_id} not ready after {attempts} polls (last state: {last_state})"
    )]
    ReadinessTimeout {
        /// Provider instance identifier.
        instance_id: String,
        /// Polls performed before giving up.
        attempts: u32,
        /// Canonical state observed on the last successful poll.
        last_state: CanonicalState,
    },
    /// Raised when the Docker URL is requested for a machine that is not running.
    #[error("machine is {state}, not running")]
    NotRunning {
        /// Current canonical state.
        state: CanonicalState,
    },
}

impl DriverError {
    /// Returns `true` for conditions expected to clear on their own: an IP
    /// that is not assigned yet, or a transient provider failure.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::IpNotYetAvailable { .. } => true,
            Self::Provider(err) => err.is_transient(),
            Self::Preflight(err) => err.is_transient(),
            Self::Keys(_)
            | Self::NotCreated
            | Self::AlreadyCreated { .. }
            | Self::MissingKeySource
            | Self::ReadinessTimeout { .. }
            | Self::NotRunning { .. } => false,
        }
    }
}
