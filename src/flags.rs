//! Inbound configuration flags.
//!
//! The host orchestrator hands the driver a flat mapping of named options.
//! Names, environment aliases and defaults are an external contract, so they
//! live here as data ([`FLAGS`]) and every other surface (the clap arguments,
//! the resolver) refers back to this table.

use std::collections::BTreeMap;

use thiserror::Error;

/// Vultr API key.
pub const API_KEY: &str = "vultr-api-key";
/// Server type (1 standard, 2 bare-metal, 3 dedicated-cloud).
pub const SERVER_TYPE: &str = "vultr-server-type";
/// Region identifier.
pub const REGION: &str = "vultr-region";
/// Plan identifier.
pub const PLAN: &str = "vultr-vps-plan";
/// Catalog OS id.
pub const OS_ID: &str = "vultr-os-id";
/// Control-panel label.
pub const LABEL: &str = "vultr-label";
/// Server hostname.
pub const HOSTNAME: &str = "vultr-hostname";
/// Server tags.
pub const TAGS: &str = "vultr-tags";
/// ISO identifier.
pub const ISO_ID: &str = "vultr-iso-id";
/// Marketplace application id.
pub const APP_ID: &str = "vultr-app-id";
/// Marketplace image id.
pub const IMAGE_ID: &str = "vultr-image-id";
/// Firewall group id.
pub const FIREWALL_GROUP_ID: &str = "vultr-firewall-group-id";
/// Open the Docker port in the firewall group.
pub const OPEN_DOCKER_PORT: &str = "vultr-open-docker-port";
/// iPXE chain URL.
pub const IPXE_CHAIN_URL: &str = "vultr-ipxe-chain-url";
/// Startup script id.
pub const STARTUP_SCRIPT_ID: &str = "vultr-startup-script-id";
/// Snapshot id.
pub const SNAPSHOT_ID: &str = "vultr-snapshot-id";
/// Assign an IPv6 subnet.
pub const ENABLE_IPV6: &str = "vultr-enabled-ipv6";
/// Attach the default private network.
pub const ENABLE_VPC: &str = "vultr-enable-vpc";
/// Explicit private network ids.
pub const VPC_IDS: &str = "vultr-vpc-ids";
/// Existing SSH key ids.
pub const SSH_KEY_IDS: &str = "vultr-ssh-key-ids";
/// Enable automatic backups.
pub const AUTO_BACKUPS: &str = "vultr-auto-backups";
/// Enable DDoS protection.
pub const DDOS_PROTECTION: &str = "vultr-ddos-protection";
/// Base64-encoded cloud-init user-data.
pub const CLOUD_INIT_USER_DATA: &str = "vultr-cloud-init-user-data";
/// Path to a cloud-init user-data file.
pub const CLOUD_INIT_USER_DATA_FILE: &str = "vultr-cloud-init-user-data-file";
/// Reserved IPv4 address.
pub const FLOATING_IPV4_ID: &str = "vultr-floating-ipv4-id";
/// Send an activation email.
pub const SEND_ACTIVATION_EMAIL: &str = "vultr-send-activation-email";
/// Docker engine port.
pub const DOCKER_PORT: &str = "vultr-docker-port";
/// SSH port.
pub const SSH_PORT: &str = "vultr-ssh-port";
/// SSH login user.
pub const SSH_USER: &str = "vultr-ssh-user";

/// Value type of a flag.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FlagKind {
    /// Free-form string.
    String,
    /// Signed integer.
    Int,
    /// Boolean switch.
    Bool,
    /// List of strings.
    StringList,
}

/// Default applied when the orchestrator supplies no value.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FlagDefault {
    /// No default; the flag is empty or `false` or zero.
    None,
    /// String default.
    Str(&'static str),
    /// Integer default.
    Int(i64),
}

/// Declaration of a single flag.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FlagSpec {
    /// Flag name without the leading dashes.
    pub name: &'static str,
    /// Environment variable alias.
    pub env_var: &'static str,
    /// Value type.
    pub kind: FlagKind,
    /// Default value.
    pub default: FlagDefault,
    /// Help text.
    pub usage: &'static str,
}

impl FlagSpec {
    /// Default rendered as a string, for CLI help and parity checks.
    #[must_use]
    pub fn default_text(&self) -> Option<String> {
        match self.default {
            FlagDefault::None => None,
            FlagDefault::Str(text) => Some(text.to_owned()),
            FlagDefault::Int(value) => Some(value.to_string()),
        }
    }

    const fn default_value(&self) -> FlagValueRef {
        match (self.kind, self.default) {
            (FlagKind::Int, FlagDefault::Int(value)) => FlagValueRef::Int(value),
            (FlagKind::Int, _) => FlagValueRef::Int(0),
            (FlagKind::String, FlagDefault::Str(text)) => FlagValueRef::Str(text),
            (FlagKind::Bool, _) => FlagValueRef::Bool(false),
            _ => FlagValueRef::Empty,
        }
    }
}

#[derive(Clone, Copy)]
enum FlagValueRef {
    Empty,
    Str(&'static str),
    Int(i64),
    Bool(bool),
}

const fn flag(
    name: &'static str,
    env_var: &'static str,
    kind: FlagKind,
    default: FlagDefault,
    usage: &'static str,
) -> FlagSpec {
    FlagSpec {
        name,
        env_var,
        kind,
        default,
        usage,
    }
}

/// Every flag the driver accepts, in declaration order.
pub const FLAGS: &[FlagSpec] = &[
    flag(API_KEY, "VULTR_API_KEY", FlagKind::String, FlagDefault::None, "Vultr API key"),
    flag(
        SERVER_TYPE,
        "VULTR_SERVER_TYPE",
        FlagKind::Int,
        FlagDefault::Int(1),
        "Server type: 1 standard, 2 bare-metal, 3 dedicated-cloud",
    ),
    flag(REGION, "VULTR_REGION", FlagKind::String, FlagDefault::Str("ewr"), "Region to deploy in"),
    flag(
        PLAN,
        "VULTR_VPS_PLAN",
        FlagKind::String,
        FlagDefault::Str("vc2-1c-2gb"),
        "Plan to use for the server",
    ),
    flag(OS_ID, "VULTR_OSID", FlagKind::Int, FlagDefault::Int(445), "Operating system id"),
    flag(LABEL, "VULTR_LABEL", FlagKind::String, FlagDefault::None, "Label shown in the control panel"),
    flag(HOSTNAME, "VULTR_HOSTNAME", FlagKind::String, FlagDefault::None, "Hostname of the server"),
    flag(TAGS, "VULTR_TAGS", FlagKind::StringList, FlagDefault::None, "Tags to attach"),
    flag(ISO_ID, "VULTR_ISOID", FlagKind::String, FlagDefault::None, "ISO to mount (custom OS only)"),
    flag(
        APP_ID,
        "VULTR_APPID",
        FlagKind::Int,
        FlagDefault::Int(0),
        "Marketplace application id (application OS only)",
    ),
    flag(
        IMAGE_ID,
        "VULTR_IMAGEID",
        FlagKind::String,
        FlagDefault::None,
        "Marketplace image id (application OS only)",
    ),
    flag(
        FIREWALL_GROUP_ID,
        "VULTR_FIREWALL_GROUP_ID",
        FlagKind::String,
        FlagDefault::None,
        "Firewall group to attach",
    ),
    flag(
        OPEN_DOCKER_PORT,
        "VULTR_OPEN_DOCKER_PORT",
        FlagKind::Bool,
        FlagDefault::None,
        "Add a firewall group rule for the Docker port",
    ),
    flag(
        IPXE_CHAIN_URL,
        "VULTR_IPXE_CHAIN_URL",
        FlagKind::String,
        FlagDefault::None,
        "iPXE chain URL (custom OS only)",
    ),
    flag(
        STARTUP_SCRIPT_ID,
        "VULTR_STARTUP_SCRIPT_ID",
        FlagKind::String,
        FlagDefault::None,
        "Startup script to run",
    ),
    flag(
        SNAPSHOT_ID,
        "VULTR_SNAPSHOT_ID",
        FlagKind::String,
        FlagDefault::None,
        "Snapshot to restore (snapshot OS only)",
    ),
    flag(ENABLE_IPV6, "VULTR_ENABLE_IPV6", FlagKind::Bool, FlagDefault::None, "Assign an IPv6 subnet"),
    flag(
        ENABLE_VPC,
        "VULTR_ENABLE_VPC",
        FlagKind::Bool,
        FlagDefault::None,
        "Attach the default private network",
    ),
    flag(VPC_IDS, "VULTR_VPC_IDS", FlagKind::StringList, FlagDefault::None, "Private networks to attach"),
    flag(
        SSH_KEY_IDS,
        "VULTR_SSH_KEY_IDS",
        FlagKind::StringList,
        FlagDefault::None,
        "Existing SSH keys to install",
    ),
    flag(
        AUTO_BACKUPS,
        "VULTR_AUTO_BACKUPS",
        FlagKind::Bool,
        FlagDefault::None,
        "Enable automatic backups",
    ),
    flag(
        DDOS_PROTECTION,
        "VULTR_DDOS_PROTECTION",
        FlagKind::Bool,
        FlagDefault::None,
        "Enable DDoS protection",
    ),
    flag(
        CLOUD_INIT_USER_DATA,
        "VULTR_CLOUD_INIT_USER_DATA",
        FlagKind::String,
        FlagDefault::None,
        "Base64-encoded cloud-init user-data",
    ),
    flag(
        CLOUD_INIT_USER_DATA_FILE,
        "VULTR_CLOUD_INIT_USER_DATA_FILE",
        FlagKind::String,
        FlagDefault::None,
        "Path to a cloud-init user-data file",
    ),
    flag(
        FLOATING_IPV4_ID,
        "VULTR_FLOATING_IPV4_ID",
        FlagKind::String,
        FlagDefault::None,
        "Reserved IPv4 address to use as the main IP",
    ),
    flag(
        SEND_ACTIVATION_EMAIL,
        "VULTR_SEND_ACTIVATION_EMAIL",
        FlagKind::Bool,
        FlagDefault::None,
        "Send an activation email when deployment starts",
    ),
    flag(DOCKER_PORT, "VULTR_DOCKER_PORT", FlagKind::Int, FlagDefault::Int(2376), "Docker engine port"),
    flag(SSH_PORT, "VULTR_SSH_PORT", FlagKind::Int, FlagDefault::Int(22), "SSH port"),
    flag(SSH_USER, "VULTR_SSH_USER", FlagKind::String, FlagDefault::Str("root"), "SSH login user"),
];

/// Looks up a flag declaration by name.
#[must_use]
pub fn find(name: &str) -> Option<&'static FlagSpec> {
    FLAGS.iter().find(|spec| spec.name == name)
}

/// Typed read access to the orchestrator-supplied options.
///
/// Getters never fail: unset flags yield their declared default, and flags of
/// a different kind yield the kind's zero value.
pub trait DriverOptions {
    /// Returns a string flag.
    fn string(&self, name: &str) -> String;
    /// Returns an integer flag.
    fn int(&self, name: &str) -> i64;
    /// Returns a boolean flag.
    fn bool(&self, name: &str) -> bool;
    /// Returns a string-list flag.
    fn string_list(&self, name: &str) -> Vec<String>;
}

/// Value supplied for a flag.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FlagValue {
    /// String value.
    String(String),
    /// Integer value.
    Int(i64),
    /// Boolean value.
    Bool(bool),
    /// String-list value.
    StringList(Vec<String>),
}

impl FlagValue {
    const fn kind(&self) -> FlagKind {
        match self {
            Self::String(_) => FlagKind::String,
            Self::Int(_) => FlagKind::Int,
            Self::Bool(_) => FlagKind::Bool,
            Self::StringList(_) => FlagKind::StringList,
        }
    }
}

/// Errors raised while populating an [`OptionMap`].
#[derive(Debug, Error, Eq, PartialEq)]
pub enum FlagError {
    /// Raised when the flag is not declared in [`FLAGS`].
    #[error("unknown flag --{0}")]
    Unknown(String),
    /// Raised when the value kind does not match the declaration.
    #[error("flag --{name} expects a {expected:?} value, got {actual:?}")]
    KindMismatch {
        /// Flag name.
        name: String,
        /// Declared kind.
        expected: FlagKind,
        /// Supplied kind.
        actual: FlagKind,
    },
}

/// In-memory [`DriverOptions`] keyed by flag name.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct OptionMap {
    values: BTreeMap<&'static str, FlagValue>,
}

impl OptionMap {
    /// Creates an empty map; every flag reads as its default.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a flag after checking its name and kind.
    ///
    /// # Errors
    ///
    /// Returns [`FlagError`] for undeclared flags or mismatched kinds.
    pub fn set(&mut self, name: &str, value: FlagValue) -> Result<(), FlagError> {
        let spec = find(name).ok_or_else(|| FlagError::Unknown(name.to_owned()))?;
        if spec.kind != value.kind() {
            return Err(FlagError::KindMismatch {
                name: name.to_owned(),
                expected: spec.kind,
                actual: value.kind(),
            });
        }
        self.values.insert(spec.name, value);
        Ok(())
    }

    /// Builder-style [`OptionMap::set`].
    ///
    /// # Errors
    ///
    /// Returns [`FlagError`] for undeclared flags or mismatched kinds.
    pub fn with(mut self, name: &str, value: FlagValue) -> Result<Self, FlagError> {
        self.set(name, value)?;
        Ok(self)
    }

    fn default_for(name: &str) -> FlagValueRef {
        find(name).map_or(FlagValueRef::Empty, FlagSpec::default_value)
    }
}

impl DriverOptions for OptionMap {
    fn string(&self, name: &str) -> String {
        match self.values.get(name) {
            Some(FlagValue::String(value)) => value.clone(),
            Some(_) => String::new(),
            None => match Self::default_for(name) {
                FlagValueRef::Str(text) => text.to_owned(),
                _ => String::new(),
            },
        }
    }

    fn int(&self, name: &str) -> i64 {
        match self.values.get(name) {
            Some(FlagValue::Int(value)) => *value,
            Some(_) => 0,
            None => match Self::default_for(name) {
                FlagValueRef::Int(value) => value,
                _ => 0,
            },
        }
    }

    fn bool(&self, name: &str) -> bool {
        match self.values.get(name) {
            Some(FlagValue::Bool(value)) => *value,
            Some(_) => false,
            None => matches!(Self::default_for(name), FlagValueRef::Bool(true)),
        }
    }

    fn string_list(&self, name: &str) -> Vec<String> {
        match self.values.get(name) {
            Some(FlagValue::StringList(values)) => values.clone(),
            _ => Vec::new(),
        }
    }
}
