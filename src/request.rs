//! Desired-state description submitted to the provider on create.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Catalog OS id that selects a custom (ISO or iPXE) installation.
pub const OS_ID_CUSTOM: u32 = 159;
/// Catalog OS id that restores a snapshot.
pub const OS_ID_SNAPSHOT: u32 = 164;
/// Catalog OS id that restores a backup.
pub const OS_ID_BACKUP: u32 = 180;
/// Catalog OS id that deploys a marketplace application.
pub const OS_ID_APPLICATION: u32 = 186;

/// Prefix for labels and hostnames generated when no name is available.
pub const DEFAULT_LABEL_PREFIX: &str = "vultr-rancher-node";

/// How the boot disk of a new server is populated.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OsSource {
    /// A regular operating system from the catalog.
    Catalog(u32),
    /// Custom installation from an ISO or an iPXE chain URL.
    Custom,
    /// Restore from a snapshot.
    Snapshot,
    /// Restore from a backup.
    Backup,
    /// Marketplace application.
    Application,
}

impl OsSource {
    /// Classifies a catalog OS id.
    #[must_use]
    pub const fn from_os_id(os_id: u32) -> Self {
        match os_id {
            OS_ID_CUSTOM => Self::Custom,
            OS_ID_SNAPSHOT => Self::Snapshot,
            OS_ID_BACKUP => Self::Backup,
            OS_ID_APPLICATION => Self::Application,
            other => Self::Catalog(other),
        }
    }

    /// Returns the catalog OS id sent to the provider.
    #[must_use]
    pub const fn os_id(self) -> u32 {
        match self {
            Self::Catalog(id) => id,
            Self::Custom => OS_ID_CUSTOM,
            Self::Snapshot => OS_ID_SNAPSHOT,
            Self::Backup => OS_ID_BACKUP,
            Self::Application => OS_ID_APPLICATION,
        }
    }
}

impl fmt::Display for OsSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Catalog(id) => write!(f, "catalog OS {id}"),
            Self::Custom => write!(f, "custom OS (OSID:{OS_ID_CUSTOM})"),
            Self::Snapshot => write!(f, "snapshot OS (OSID:{OS_ID_SNAPSHOT})"),
            Self::Backup => write!(f, "backup OS (OSID:{OS_ID_BACKUP})"),
            Self::Application => write!(f, "application OS (OSID:{OS_ID_APPLICATION})"),
        }
    }
}

/// Hardware family of the server, selected once at resolve time.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServerType {
    /// Shared-CPU cloud compute.
    Standard,
    /// Dedicated bare-metal machine.
    BareMetal,
    /// Dedicated-CPU cloud compute.
    DedicatedCloud,
}

impl ServerType {
    /// Maps the numeric `vultr-server-type` flag value.
    #[must_use]
    pub const fn from_flag(value: i64) -> Option<Self> {
        match value {
            1 => Some(Self::Standard),
            2 => Some(Self::BareMetal),
            3 => Some(Self::DedicatedCloud),
            _ => None,
        }
    }
}

impl fmt::Display for ServerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Standard => "standard",
            Self::BareMetal => "bare-metal",
            Self::DedicatedCloud => "dedicated-cloud",
        })
    }
}

/// Automatic backup policy in the provider's two-valued vocabulary.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupPolicy {
    /// Backups are taken automatically.
    Enabled,
    /// No automatic backups.
    #[default]
    Disabled,
}

impl BackupPolicy {
    /// Maps the boolean `vultr-auto-backups` flag.
    #[must_use]
    pub const fn from_flag(enabled: bool) -> Self {
        if enabled { Self::Enabled } else { Self::Disabled }
    }

    /// Provider wire value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Enabled => "enabled",
            Self::Disabled => "disabled",
        }
    }
}

/// Parameters of a single provisioning attempt.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstanceRequest {
    /// Hardware family of the server.
    pub server_type: ServerType,
    /// Region identifier (for example `ewr`).
    pub region: String,
    /// Plan identifier (for example `vc2-1c-2gb`).
    pub plan: String,
    /// How the boot disk is populated.
    pub os_source: OsSource,
    /// ISO to mount; only coherent with [`OsSource::Custom`].
    pub iso_id: Option<String>,
    /// Snapshot to restore; only coherent with [`OsSource::Snapshot`].
    pub snapshot_id: Option<String>,
    /// Marketplace application; only coherent with [`OsSource::Application`].
    pub app_id: Option<u32>,
    /// Marketplace image; only coherent with [`OsSource::Application`].
    pub image_id: Option<String>,
    /// iPXE chain URL; only coherent with [`OsSource::Custom`].
    pub ipxe_chain_url: Option<String>,
    /// Startup script to attach.
    pub script_id: Option<String>,
    /// Hostname assigned to the server.
    pub hostname: String,
    /// Label shown in the control panel.
    pub label: String,
    /// Tags attached to the server.
    pub tags: Vec<String>,
    /// SSH key identifiers installed on first boot.
    pub ssh_key_ids: Vec<String>,
    /// Private networks (VPCs) to attach.
    pub network_ids: Vec<String>,
    /// Attach the default private network instead of explicit ids.
    pub enable_private_network: bool,
    /// Firewall group to attach.
    pub firewall_group_id: Option<String>,
    /// Automatic backup policy.
    pub backups: BackupPolicy,
    /// Enable DDoS protection.
    pub ddos_protection: bool,
    /// Assign an IPv6 subnet.
    pub enable_ipv6: bool,
    /// Reserved IPv4 address used as the main IP.
    pub reserved_ipv4: Option<String>,
    /// Send an activation email when deployment starts.
    pub activation_email: bool,
    /// Base64-encoded user-data blob.
    pub user_data: String,
}

/// Errors raised while assembling an [`InstanceRequest`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum RequestError {
    /// Raised when a required field is missing or blank.
    #[error("missing or empty field: {0}")]
    Missing(&'static str),
    /// Raised when mutually exclusive options are both supplied.
    #[error("use either {first} or {second}, not both")]
    Conflict {
        /// First option name.
        first: &'static str,
        /// Second option name.
        second: &'static str,
    },
}

impl InstanceRequest {
    /// Starts a builder for an [`InstanceRequest`].
    #[must_use]
    pub fn builder() -> InstanceRequestBuilder {
        InstanceRequestBuilder::new()
    }

    /// Validates invariants that need no provider data.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError`] when a required field is blank or when
    /// private networking is combined with explicit network ids.
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.region.is_empty() {
            return Err(RequestError::Missing("region"));
        }
        if self.plan.is_empty() {
            return Err(RequestError::Missing("plan"));
        }
        if self.hostname.is_empty() {
            return Err(RequestError::Missing("hostname"));
        }
        if self.label.is_empty() {
            return Err(RequestError::Missing("label"));
        }
        if self.user_data.is_empty() {
            return Err(RequestError::Missing("user_data"));
        }
        if self.enable_private_network && !self.network_ids.is_empty() {
            return Err(RequestError::Conflict {
                first: "--vultr-enable-vpc",
                second: "--vultr-vpc-ids",
            });
        }
        Ok(())
    }
}

/// Builder for [`InstanceRequest`] that trims inputs, drops blank optional
/// values, and fills in generated names.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct InstanceRequestBuilder {
    server_type: Option<ServerType>,
    region: String,
    plan: String,
    os_id: u32,
    iso_id: String,
    snapshot_id: String,
    app_id: u32,
    image_id: String,
    ipxe_chain_url: String,
    script_id: String,
    hostname: String,
    label: String,
    tags: Vec<String>,
    ssh_key_ids: Vec<String>,
    network_ids: Vec<String>,
    enable_private_network: bool,
    firewall_group_id: String,
    backups: BackupPolicy,
    ddos_protection: bool,
    enable_ipv6: bool,
    reserved_ipv4: String,
    activation_email: bool,
    user_data: String,
}

macro_rules! string_setter {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[must_use]
        pub fn $name(mut self, value: impl Into<String>) -> Self {
            self.$name = value.into();
            self
        }
    };
}

macro_rules! flag_setter {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[must_use]
        pub const fn $name(mut self, value: bool) -> Self {
            self.$name = value;
            self
        }
    };
}

impl InstanceRequestBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the server type (defaults to [`ServerType::Standard`]).
    #[must_use]
    pub const fn server_type(mut self, value: ServerType) -> Self {
        self.server_type = Some(value);
        self
    }

    /// Sets the catalog OS id.
    #[must_use]
    pub const fn os_id(mut self, value: u32) -> Self {
        self.os_id = value;
        self
    }

    /// Sets the marketplace application id (`0` means unset).
    #[must_use]
    pub const fn app_id(mut self, value: u32) -> Self {
        self.app_id = value;
        self
    }

    /// Sets the backup policy.
    #[must_use]
    pub const fn backups(mut self, value: BackupPolicy) -> Self {
        self.backups = value;
        self
    }

    string_setter!(
        /// Sets the region identifier.
        region
    );
    string_setter!(
        /// Sets the plan identifier.
        plan
    );
    string_setter!(
        /// Sets the ISO identifier.
        iso_id
    );
    string_setter!(
        /// Sets the snapshot identifier.
        snapshot_id
    );
    string_setter!(
        /// Sets the marketplace image identifier.
        image_id
    );
    string_setter!(
        /// Sets the iPXE chain URL.
        ipxe_chain_url
    );
    string_setter!(
        /// Sets the startup script identifier.
        script_id
    );
    string_setter!(
        /// Sets the hostname.
        hostname
    );
    string_setter!(
        /// Sets the label.
        label
    );
    string_setter!(
        /// Sets the firewall group identifier.
        firewall_group_id
    );
    string_setter!(
        /// Sets the reserved IPv4 address.
        reserved_ipv4
    );
    string_setter!(
        /// Sets the base64-encoded user-data.
        user_data
    );
    flag_setter!(
        /// Attaches the default private network.
        enable_private_network
    );
    flag_setter!(
        /// Enables DDoS protection.
        ddos_protection
    );
    flag_setter!(
        /// Assigns an IPv6 subnet.
        enable_ipv6
    );
    flag_setter!(
        /// Sends an activation email.
        activation_email
    );

    /// Sets the tags.
    #[must_use]
    pub fn tags(mut self, value: Vec<String>) -> Self {
        self.tags = value;
        self
    }

    /// Sets the SSH key identifiers.
    #[must_use]
    pub fn ssh_key_ids(mut self, value: Vec<String>) -> Self {
        self.ssh_key_ids = value;
        self
    }

    /// Sets the private network identifiers.
    #[must_use]
    pub fn network_ids(mut self, value: Vec<String>) -> Self {
        self.network_ids = value;
        self
    }

    /// Builds and validates the [`InstanceRequest`].
    ///
    /// Blank hostnames and labels fall back to
    /// `vultr-rancher-node-<unix-timestamp>`.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError`] when [`InstanceRequest::validate`] fails.
    pub fn build(self) -> Result<InstanceRequest, RequestError> {
        let generated = generated_name();
        let request = InstanceRequest {
            server_type: self.server_type.unwrap_or(ServerType::Standard),
            region: self.region.trim().to_owned(),
            plan: self.plan.trim().to_owned(),
            os_source: OsSource::from_os_id(self.os_id),
            iso_id: non_blank(&self.iso_id),
            snapshot_id: non_blank(&self.snapshot_id),
            app_id: (self.app_id != 0).then_some(self.app_id),
            image_id: non_blank(&self.image_id),
            ipxe_chain_url: non_blank(&self.ipxe_chain_url),
            script_id: non_blank(&self.script_id),
            hostname: non_blank(&self.hostname).unwrap_or_else(|| generated.clone()),
            label: non_blank(&self.label).unwrap_or(generated),
            tags: trimmed_list(self.tags),
            ssh_key_ids: trimmed_list(self.ssh_key_ids),
            network_ids: trimmed_list(self.network_ids),
            enable_private_network: self.enable_private_network,
            firewall_group_id: non_blank(&self.firewall_group_id),
            backups: self.backups,
            ddos_protection: self.ddos_protection,
            enable_ipv6: self.enable_ipv6,
            reserved_ipv4: non_blank(&self.reserved_ipv4),
            activation_email: self.activation_email,
            user_data: self.user_data.trim().to_owned(),
        };
        request.validate()?;
        Ok(request)
    }
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}

fn trimmed_list(values: Vec<String>) -> Vec<String> {
    values
        .into_iter()
        .filter_map(|value| non_blank(&value))
        .collect()
}

/// Returns `vultr-rancher-node-<unix-timestamp>`.
#[must_use]
pub fn generated_name() -> String {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs());
    format!("{DEFAULT_LABEL_PREFIX}-{timestamp}")
}
