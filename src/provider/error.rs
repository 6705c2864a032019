//! Error types for the provider client.

use thiserror::Error;

/// Errors raised by provider API calls.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ProviderError {
    /// Raised when the API key is rejected.
    #[error("provider rejected the API key: {message}")]
    Unauthorized {
        /// Message returned by the provider.
        message: String,
    },
    /// Raised when the addressed resource does not exist.
    #[error("{resource} not found")]
    NotFound {
        /// Path or description of the missing resource.
        resource: String,
    },
    /// Raised for any other unsuccessful HTTP status.
    #[error("provider returned HTTP {status} for {resource}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Path of the failed call.
        resource: String,
        /// Message returned by the provider.
        message: String,
    },
    /// Raised when the request never produced a response.
    #[error("request to {resource} failed: {message}")]
    Transport {
        /// Path of the failed call.
        resource: String,
        /// Underlying transport error.
        message: String,
    },
    /// Raised when a response body cannot be decoded.
    #[error("failed to decode response from {resource}: {message}")]
    Decode {
        /// Path of the call.
        resource: String,
        /// Decoder error.
        message: String,
    },
}

impl ProviderError {
    /// Returns `true` for failures worth retrying: transport errors, rate
    /// limiting and server-side errors.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::Unauthorized { .. } | Self::NotFound { .. } | Self::Decode { .. } => false,
        }
    }

    /// Classifies an unsuccessful HTTP status.
    #[must_use]
    pub fn from_status(status: u16, resource: &str, message: String) -> Self {
        match status {
            401 | 403 => Self::Unauthorized { message },
            404 => Self::NotFound {
                resource: resource.to_owned(),
            },
            _ => Self::Api {
                status,
                resource: resource.to_owned(),
                message,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(401, false)]
    #[case(403, false)]
    #[case(404, false)]
    #[case(400, false)]
    #[case(429, true)]
    #[case(500, true)]
    #[case(503, true)]
    fn classifies_statuses(#[case] status: u16, #[case] transient: bool) {
        let err = ProviderError::from_status(status, "/instances", String::from("boom"));
        assert_eq!(err.is_transient(), transient);
    }

    #[test]
    fn not_found_is_distinct_from_transport_failure() {
        let missing = ProviderError::from_status(404, "/instances/abc", String::new());
        let transport = ProviderError::Transport {
            resource: String::from("/instances/abc"),
            message: String::from("connection reset"),
        };
        assert!(matches!(missing, ProviderError::NotFound { .. }));
        assert!(!missing.is_transient());
        assert!(transport.is_transient());
    }
}
