//! Wire types for the Vultr v2 API.
//!
//! Catalog entries only carry the fields the pre-flight checks read; unknown
//! fields in responses are ignored.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Authenticated account summary.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
pub struct Account {
    /// Account holder name.
    #[serde(default)]
    pub name: String,
    /// Account email.
    #[serde(default)]
    pub email: String,
}

/// Operating system catalog entry.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct OperatingSystem {
    /// Catalog id.
    pub id: u32,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// OS family (`ubuntu`, `windows`, `iso`, `snapshot`, ...).
    #[serde(default)]
    pub family: String,
}

/// Region catalog entry.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct Region {
    /// Region id (for example `ewr`).
    pub id: String,
    /// City name.
    #[serde(default)]
    pub city: String,
    /// Optional features offered in the region.
    #[serde(default)]
    pub options: Vec<String>,
}

/// Snapshot catalog entry.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct Snapshot {
    /// Snapshot id.
    pub id: String,
    /// Description.
    #[serde(default)]
    pub description: String,
}

/// ISO catalog entry.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct Iso {
    /// ISO id.
    pub id: String,
    /// File name.
    #[serde(default)]
    pub filename: String,
}

/// Marketplace application catalog entry.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct Application {
    /// Application id.
    pub id: u32,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Marketplace image id.
    #[serde(default)]
    pub image_id: String,
}

/// Startup script catalog entry.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct StartupScript {
    /// Script id.
    pub id: String,
    /// Script name.
    #[serde(default)]
    pub name: String,
    /// Script type: `boot` or `pxe`.
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// Private network (VPC) catalog entry.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct Network {
    /// Network id.
    pub id: String,
    /// Description.
    #[serde(default)]
    pub description: String,
}

/// Firewall group catalog entry.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct FirewallGroup {
    /// Group id.
    pub id: String,
    /// Description.
    #[serde(default)]
    pub description: String,
}

/// Registered SSH key.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct SshKey {
    /// Key id.
    pub id: String,
    /// Key name.
    #[serde(default)]
    pub name: String,
}

/// Plan family queried by the region availability endpoint.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AvailabilityKind {
    /// Every cloud compute plan.
    All,
    /// Dedicated-CPU cloud plans.
    DedicatedCloud,
    /// Bare-metal plans.
    BareMetal,
}

impl AvailabilityKind {
    /// Value of the `type` query parameter.
    #[must_use]
    pub const fn as_query(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::DedicatedCloud => "vdc",
            Self::BareMetal => "vbm",
        }
    }
}

impl fmt::Display for AvailabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_query())
    }
}

/// Provider view of an instance or bare-metal server.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
pub struct InstanceRecord {
    /// Provider-assigned id.
    pub id: String,
    /// Main IP; empty, `"0"` or `"0.0.0.0"` until assigned.
    #[serde(default)]
    pub main_ip: String,
    /// Main IPv6 address, when assigned.
    #[serde(default)]
    pub v6_main_ip: Option<String>,
    /// Private network address.
    #[serde(default)]
    pub internal_ip: Option<String>,
    /// Coarse status (`pending`, `active`, `suspended`, `resizing`).
    #[serde(default)]
    pub status: String,
    /// Power status (`running`, `stopped`).
    #[serde(default)]
    pub power_status: Option<String>,
    /// Fine-grained server state (`none`, `locked`, `installingbooting`, `ok`).
    #[serde(default)]
    pub server_status: Option<String>,
}

/// Create payload for standard and dedicated-cloud instances.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct InstanceCreatePayload {
    /// Region id.
    pub region: String,
    /// Plan id.
    pub plan: String,
    /// Catalog OS id.
    pub os_id: u32,
    /// ISO to mount.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iso_id: Option<String>,
    /// Snapshot to restore.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_id: Option<String>,
    /// Marketplace application.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_id: Option<u32>,
    /// Marketplace image.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,
    /// Startup script.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script_id: Option<String>,
    /// iPXE chain URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipxe_chain_url: Option<String>,
    /// Assign an IPv6 subnet.
    pub enable_ipv6: bool,
    /// Attach the default private network.
    pub enable_vpc: bool,
    /// Explicit private networks.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attach_vpc: Vec<String>,
    /// Control-panel label.
    pub label: String,
    /// Hostname.
    pub hostname: String,
    /// Tags.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// SSH keys.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sshkey_id: Vec<String>,
    /// `enabled` or `disabled`.
    pub backups: String,
    /// DDoS protection.
    pub ddos_protection: bool,
    /// Send an activation email.
    pub activation_email: bool,
    /// Firewall group.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firewall_group_id: Option<String>,
    /// Reserved IPv4 used as the main IP.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reserved_ipv4: Option<String>,
    /// Base64 user-data.
    pub user_data: String,
}

/// Create payload for bare-metal servers.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct BareMetalCreatePayload {
    /// Region id.
    pub region: String,
    /// Plan id.
    pub plan: String,
    /// Catalog OS id.
    pub os_id: u32,
    /// Snapshot to restore.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_id: Option<String>,
    /// Marketplace application.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_id: Option<u32>,
    /// Marketplace image.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,
    /// Startup script.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script_id: Option<String>,
    /// iPXE chain URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipxe_chain_url: Option<String>,
    /// Assign an IPv6 subnet.
    pub enable_ipv6: bool,
    /// Control-panel label.
    pub label: String,
    /// Hostname.
    pub hostname: String,
    /// Tags.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// SSH keys.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sshkey_id: Vec<String>,
    /// Send an activation email.
    pub activation_email: bool,
    /// Reserved IPv4 used as the main IP.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reserved_ipv4: Option<String>,
    /// Base64 user-data.
    pub user_data: String,
}

/// Payload registering a public key.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct SshKeyPayload {
    /// Key name.
    pub name: String,
    /// OpenSSH public key line.
    pub ssh_key: String,
}

/// Payload adding an inbound rule to a firewall group.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct FirewallRulePayload {
    /// `v4` or `v6`.
    pub ip_type: String,
    /// `tcp`, `udp`, `icmp` or `gre`.
    pub protocol: String,
    /// Source subnet.
    pub subnet: String,
    /// Source subnet prefix length.
    pub subnet_size: u8,
    /// Port or port range.
    pub port: String,
    /// Free-form note.
    pub notes: String,
}

impl FirewallRulePayload {
    /// Rule opening `port` over TCP to every IPv4 source.
    #[must_use]
    pub fn open_tcp_port(port: u16, notes: impl Into<String>) -> Self {
        Self {
            ip_type: String::from("v4"),
            protocol: String::from("tcp"),
            subnet: String::from("0.0.0.0"),
            subnet_size: 0,
            port: port.to_string(),
            notes: notes.into(),
        }
    }
}
