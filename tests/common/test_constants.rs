//! Shared constants for integration tests.
//!
//! Integration tests are compiled as separate crates (one per top-level file in
//! `tests/`). Placing shared constants under `tests/common/` avoids creating an
//! additional integration test binary while still allowing reuse via:
//!
//! ```rust
//! #[path = "common/test_constants.rs"]
//! mod test_constants;
//! ```

/// API key accepted by the fake provider.
pub const API_KEY: &str = "VULTRTESTKEYEXAMPLE";

/// Machine name used throughout the behavioural tests.
pub const MACHINE_NAME: &str = "worker-1";

/// Main IP reported once the fake server is ready.
pub const READY_IP: &str = "198.51.100.20";
