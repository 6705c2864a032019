//! Error types for pre-flight validation.

use thiserror::Error;

use crate::provider::ProviderError;
use crate::request::{OsSource, RequestError};

/// Errors raised when a request fails a catalog check.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum PreflightError {
    /// Raised when the credential check fails.
    #[error("invalid credentials: {0}")]
    Credentials(#[source] ProviderError),
    /// Raised when a catalog cannot be listed.
    #[error("failed to list {catalog}: {source}")]
    Catalog {
        /// Catalog being listed.
        catalog: &'static str,
        /// Underlying provider failure.
        #[source]
        source: ProviderError,
    },
    /// Raised when requested values are absent from a catalog.
    #[error(
        "{field}: {} not available; valid values: {}",
        missing.join(", "),
        render_alternatives(available)
    )]
    NotInCatalog {
        /// Flag or field being checked.
        field: &'static str,
        /// Requested values that were not found.
        missing: Vec<String>,
        /// Values the catalog does offer.
        available: Vec<String>,
    },
    /// Raised when a field is supplied with an OS source it cannot be used with.
    #[error("{field} requires {required}, but the request uses {actual}")]
    OsSourceMismatch {
        /// Flag being checked.
        field: &'static str,
        /// OS source the field requires.
        required: OsSource,
        /// OS source the request uses.
        actual: OsSource,
    },
    /// Raised when a startup script type does not fit the request.
    #[error("startup script {script_id} of type {kind} {reason}")]
    ScriptIncompatible {
        /// Script id.
        script_id: String,
        /// Declared script type.
        kind: String,
        /// Why the combination is rejected.
        reason: String,
    },
    /// Raised when the reserved IPv4 is not a dotted quad.
    #[error("reserved IPv4 `{0}` is not a valid IPv4 address")]
    InvalidIpv4(String),
    /// Raised when DDoS protection is requested in a region without it.
    #[error("DDoS protection is not available in region {region}")]
    DdosUnavailable {
        /// Region requested.
        region: String,
    },
    /// Raised when SSH keys are requested for an OS family that cannot take
    /// them.
    #[error(
        "--vultr-ssh-key-ids is not valid for OS family `{family}`; only Linux and FreeBSD images accept SSH keys"
    )]
    SshKeysUnsupported {
        /// OS family reported by the catalog.
        family: String,
    },
    /// Raised when request-level invariants are violated.
    #[error(transparent)]
    Request(#[from] RequestError),
}

fn render_alternatives(available: &[String]) -> String {
    if available.is_empty() {
        String::from("(none)")
    } else {
        available.join(", ")
    }
}

impl PreflightError {
    /// Returns `true` when the failure came from the provider rather than the
    /// request and may succeed on a later attempt.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Catalog { source, .. } | Self::Credentials(source) => source.is_transient(),
            _ => false,
        }
    }
}
