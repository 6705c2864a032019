//! Configuration resolver: orchestrator flags to a validated
//! [`InstanceRequest`].
//!
//! Resolution is synchronous and all-or-nothing. Nothing here talks to the
//! provider; catalog checks happen later in [`crate::preflight`].

use thiserror::Error;
use tracing::debug;

use crate::cloud_init::{CloudInitError, resolve_user_data};
use crate::flags::{self, DriverOptions};
use crate::request::{BackupPolicy, InstanceRequest, RequestError, ServerType};

/// Driver settings that never reach the provider.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DriverSettings {
    /// Orchestrator-assigned machine name.
    pub machine_name: String,
    /// Docker engine port advertised in the machine URL.
    pub docker_port: u16,
    /// SSH port.
    pub ssh_port: u16,
    /// SSH login user.
    pub ssh_user: String,
    /// Add a firewall-group rule for the Docker port on create.
    pub open_docker_port: bool,
}

/// Output of [`resolve`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResolvedMachine {
    /// Provider API key.
    pub api_key: String,
    /// Local driver settings.
    pub settings: DriverSettings,
    /// Request to validate and submit.
    pub request: InstanceRequest,
}

/// Errors raised while resolving flags.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ResolveError {
    /// Raised when no API key was supplied.
    #[error("missing API key: set --{flag} or VULTR_API_KEY", flag = flags::API_KEY)]
    MissingApiKey,
    /// Raised when the orchestrator did not supply a machine name.
    #[error("machine name must not be empty")]
    MissingMachineName,
    /// Raised for an unknown server type value.
    #[error("invalid --{flag} value {value}: expected 1 (standard), 2 (bare-metal) or 3 (dedicated-cloud)", flag = flags::SERVER_TYPE)]
    InvalidServerType {
        /// Value supplied.
        value: i64,
    },
    /// Raised when an integer flag is outside its valid range.
    #[error("invalid --{flag} value {value}")]
    OutOfRange {
        /// Flag name.
        flag: &'static str,
        /// Value supplied.
        value: i64,
    },
    /// Raised when request invariants do not hold.
    #[error(transparent)]
    Request(#[from] RequestError),
    /// Raised when user-data cannot be resolved.
    #[error(transparent)]
    CloudInit(#[from] CloudInitError),
}

/// Resolves orchestrator options into a validated request.
///
/// Hostname and label default to `machine_name` when not supplied explicitly.
///
/// # Errors
///
/// Returns [`ResolveError`] when the API key or machine name is missing, an
/// integer flag is out of range, mutually exclusive options are combined, or
/// user-data cannot be resolved.
pub fn resolve(
    options: &impl DriverOptions,
    machine_name: &str,
) -> Result<ResolvedMachine, ResolveError> {
    let api_key = options.string(flags::API_KEY).trim().to_owned();
    if api_key.is_empty() {
        return Err(ResolveError::MissingApiKey);
    }
    let machine_name = machine_name.trim();
    if machine_name.is_empty() {
        return Err(ResolveError::MissingMachineName);
    }

    let server_type_flag = options.int(flags::SERVER_TYPE);
    let server_type = ServerType::from_flag(server_type_flag).ok_or(
        ResolveError::InvalidServerType {
            value: server_type_flag,
        },
    )?;

    let enable_private_network = options.bool(flags::ENABLE_VPC);
    let network_ids = options.string_list(flags::VPC_IDS);
    if enable_private_network && network_ids.iter().any(|id| !id.trim().is_empty()) {
        return Err(RequestError::Conflict {
            first: "--vultr-enable-vpc",
            second: "--vultr-vpc-ids",
        }
        .into());
    }

    let encoded = options.string(flags::CLOUD_INIT_USER_DATA);
    let file = options.string(flags::CLOUD_INIT_USER_DATA_FILE);
    let user_data = resolve_user_data(Some(&encoded), Some(&file))?;

    let request = InstanceRequest::builder()
        .server_type(server_type)
        .region(options.string(flags::REGION))
        .plan(options.string(flags::PLAN))
        .os_id(u32_flag(options, flags::OS_ID)?)
        .iso_id(options.string(flags::ISO_ID))
        .snapshot_id(options.string(flags::SNAPSHOT_ID))
        .app_id(u32_flag(options, flags::APP_ID)?)
        .image_id(options.string(flags::IMAGE_ID))
        .ipxe_chain_url(options.string(flags::IPXE_CHAIN_URL))
        .script_id(options.string(flags::STARTUP_SCRIPT_ID))
        .hostname(or_machine_name(options.string(flags::HOSTNAME), machine_name))
        .label(or_machine_name(options.string(flags::LABEL), machine_name))
        .tags(options.string_list(flags::TAGS))
        .ssh_key_ids(options.string_list(flags::SSH_KEY_IDS))
        .network_ids(network_ids)
        .enable_private_network(enable_private_network)
        .firewall_group_id(options.string(flags::FIREWALL_GROUP_ID))
        .backups(BackupPolicy::from_flag(options.bool(flags::AUTO_BACKUPS)))
        .ddos_protection(options.bool(flags::DDOS_PROTECTION))
        .enable_ipv6(options.bool(flags::ENABLE_IPV6))
        .reserved_ipv4(options.string(flags::FLOATING_IPV4_ID))
        .activation_email(options.bool(flags::SEND_ACTIVATION_EMAIL))
        .user_data(user_data)
        .build()?;

    let settings = DriverSettings {
        machine_name: machine_name.to_owned(),
        docker_port: port_flag(options, flags::DOCKER_PORT)?,
        ssh_port: port_flag(options, flags::SSH_PORT)?,
        ssh_user: non_empty_or(options.string(flags::SSH_USER), "root"),
        open_docker_port: options.bool(flags::OPEN_DOCKER_PORT),
    };

    debug!(
        machine = %settings.machine_name,
        server_type = %request.server_type,
        region = %request.region,
        plan = %request.plan,
        os = %request.os_source,
        "resolved machine configuration"
    );

    Ok(ResolvedMachine {
        api_key,
        settings,
        request,
    })
}

fn or_machine_name(value: String, machine_name: &str) -> String {
    non_empty_or(value, machine_name)
}

fn non_empty_or(value: String, fallback: &str) -> String {
    if value.trim().is_empty() {
        fallback.to_owned()
    } else {
        value
    }
}

fn u32_flag(options: &impl DriverOptions, flag: &'static str) -> Result<u32, ResolveError> {
    let value = options.int(flag);
    u32::try_from(value).map_err(|_| ResolveError::OutOfRange { flag, value })
}

fn port_flag(options: &impl DriverOptions, flag: &'static str) -> Result<u16, ResolveError> {
    let value = options.int(flag);
    match u16::try_from(value) {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(ResolveError::OutOfRange { flag, value }),
    }
}
