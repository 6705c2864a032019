//! Vultr provisioning driver for a container-host orchestrator.
//!
//! The crate turns the orchestrator's flat option map into a typed request
//! ([`resolver`]), checks it against the live provider catalog
//! ([`preflight`]), drives the server through create, power and delete
//! operations ([`driver`]) and folds provider status fields into one
//! canonical machine state ([`state`]).

pub mod cloud_init;
pub mod config;
pub mod driver;
pub mod flags;
pub mod preflight;
pub mod process;
pub mod provider;
pub mod record;
pub mod request;
pub mod resolver;
pub mod state;
pub mod test_support;

pub use config::{ConfigError, RuntimeConfig};
pub use driver::{Driver, DriverError, ReadinessPolicy};
pub use flags::{DriverOptions, FlagValue, OptionMap};
pub use preflight::{Preflight, PreflightError, ValidatedRequest};
pub use provider::{ProviderApi, ProviderError, VultrClient};
pub use record::{MachineRecord, MachineStore};
pub use request::{InstanceRequest, OsSource, ServerType};
pub use resolver::{DriverSettings, ResolveError, ResolvedMachine, resolve};
pub use state::{CanonicalState, normalize_bare_metal, normalize_instance};
