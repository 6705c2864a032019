//! Command-line interface definitions for the `vultr-machine` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page. It
//! must therefore depend on nothing but clap.

use clap::{Args, Parser};

/// Top-level CLI for the `vultr-machine` binary.
#[derive(Debug, Parser)]
#[command(
    name = "vultr-machine",
    version,
    about = "Provision and manage Vultr servers for a host orchestrator",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Validate the request, create the server and wait until it is ready.
    #[command(name = "create")]
    Create(Box<CreateCommand>),
    /// Power the server on.
    #[command(name = "start")]
    Start(MachineCommand),
    /// Halt the server.
    #[command(name = "stop")]
    Stop(MachineCommand),
    /// Halt the server immediately.
    #[command(name = "kill")]
    Kill(MachineCommand),
    /// Reboot the server.
    #[command(name = "restart")]
    Restart(MachineCommand),
    /// Stop and delete the server and forget the machine.
    #[command(name = "rm")]
    Remove(MachineCommand),
    /// Print the main IP address.
    #[command(name = "ip")]
    Ip(MachineCommand),
    /// Print the canonical state.
    #[command(name = "status")]
    State(MachineCommand),
    /// Print the Docker daemon URL.
    #[command(name = "url")]
    Url(MachineCommand),
    /// Print the SSH host name, port and user.
    #[command(name = "ssh-info")]
    SshInfo(MachineCommand),
}

/// Arguments shared by every command acting on an existing machine.
#[derive(Debug, Args)]
pub(crate) struct MachineCommand {
    /// Machine name.
    pub(crate) name: String,
    /// Vultr API key.
    #[arg(long = "vultr-api-key", env = "VULTR_API_KEY", hide_env_values = true)]
    pub(crate) api_key: String,
}

/// Arguments for `vultr-machine create`, one per driver flag.
#[derive(Debug, Args)]
pub(crate) struct CreateCommand {
    /// Machine name; also the default hostname and label.
    pub(crate) name: String,
    /// Vultr API key.
    #[arg(long = "vultr-api-key", env = "VULTR_API_KEY", hide_env_values = true)]
    pub(crate) api_key: String,
    /// Server type: 1 standard, 2 bare-metal, 3 dedicated-cloud.
    #[arg(long = "vultr-server-type", env = "VULTR_SERVER_TYPE", default_value_t = 1)]
    pub(crate) server_type: i64,
    /// Region to deploy in.
    #[arg(long = "vultr-region", env = "VULTR_REGION", default_value = "ewr")]
    pub(crate) region: String,
    /// Plan to use for the server.
    #[arg(long = "vultr-vps-plan", env = "VULTR_VPS_PLAN", default_value = "vc2-1c-2gb")]
    pub(crate) plan: String,
    /// Operating system id.
    #[arg(long = "vultr-os-id", env = "VULTR_OSID", default_value_t = 445)]
    pub(crate) os_id: i64,
    /// Label shown in the control panel.
    #[arg(long = "vultr-label", env = "VULTR_LABEL")]
    pub(crate) label: Option<String>,
    /// Hostname of the server.
    #[arg(long = "vultr-hostname", env = "VULTR_HOSTNAME")]
    pub(crate) hostname: Option<String>,
    /// Tags to attach.
    #[arg(long = "vultr-tags", env = "VULTR_TAGS", value_delimiter = ',')]
    pub(crate) tags: Vec<String>,
    /// ISO to mount (custom OS only).
    #[arg(long = "vultr-iso-id", env = "VULTR_ISOID")]
    pub(crate) iso_id: Option<String>,
    /// Marketplace application id (application OS only).
    #[arg(long = "vultr-app-id", env = "VULTR_APPID", default_value_t = 0)]
    pub(crate) app_id: i64,
    /// Marketplace image id (application OS only).
    #[arg(long = "vultr-image-id", env = "VULTR_IMAGEID")]
    pub(crate) image_id: Option<String>,
    /// Firewall group to attach.
    #[arg(long = "vultr-firewall-group-id", env = "VULTR_FIREWALL_GROUP_ID")]
    pub(crate) firewall_group_id: Option<String>,
    /// Add a firewall group rule for the Docker port.
    #[arg(long = "vultr-open-docker-port", env = "VULTR_OPEN_DOCKER_PORT")]
    pub(crate) open_docker_port: bool,
    /// iPXE chain URL (custom OS only).
    #[arg(long = "vultr-ipxe-chain-url", env = "VULTR_IPXE_CHAIN_URL")]
    pub(crate) ipxe_chain_url: Option<String>,
    /// Startup script to run.
    #[arg(long = "vultr-startup-script-id", env = "VULTR_STARTUP_SCRIPT_ID")]
    pub(crate) startup_script_id: Option<String>,
    /// Snapshot to restore (snapshot OS only).
    #[arg(long = "vultr-snapshot-id", env = "VULTR_SNAPSHOT_ID")]
    pub(crate) snapshot_id: Option<String>,
    /// Assign an IPv6 subnet.
    #[arg(long = "vultr-enabled-ipv6", env = "VULTR_ENABLE_IPV6")]
    pub(crate) enable_ipv6: bool,
    /// Attach the default private network.
    #[arg(long = "vultr-enable-vpc", env = "VULTR_ENABLE_VPC")]
    pub(crate) enable_vpc: bool,
    /// Private networks to attach.
    #[arg(long = "vultr-vpc-ids", env = "VULTR_VPC_IDS", value_delimiter = ',')]
    pub(crate) vpc_ids: Vec<String>,
    /// Existing SSH keys to install.
    #[arg(long = "vultr-ssh-key-ids", env = "VULTR_SSH_KEY_IDS", value_delimiter = ',')]
    pub(crate) ssh_key_ids: Vec<String>,
    /// Enable automatic backups.
    #[arg(long = "vultr-auto-backups", env = "VULTR_AUTO_BACKUPS")]
    pub(crate) auto_backups: bool,
    /// Enable DDoS protection.
    #[arg(long = "vultr-ddos-protection", env = "VULTR_DDOS_PROTECTION")]
    pub(crate) ddos_protection: bool,
    /// Base64-encoded cloud-init user-data.
    #[arg(
        long = "vultr-cloud-init-user-data",
        env = "VULTR_CLOUD_INIT_USER_DATA",
        hide_env_values = true
    )]
    pub(crate) user_data: Option<String>,
    /// Path to a cloud-init user-data file.
    #[arg(long = "vultr-cloud-init-user-data-file", env = "VULTR_CLOUD_INIT_USER_DATA_FILE")]
    pub(crate) user_data_file: Option<String>,
    /// Reserved IPv4 address to use as the main IP.
    #[arg(long = "vultr-floating-ipv4-id", env = "VULTR_FLOATING_IPV4_ID")]
    pub(crate) floating_ipv4: Option<String>,
    /// Send an activation email when deployment starts.
    #[arg(long = "vultr-send-activation-email", env = "VULTR_SEND_ACTIVATION_EMAIL")]
    pub(crate) activation_email: bool,
    /// Docker engine port.
    #[arg(long = "vultr-docker-port", env = "VULTR_DOCKER_PORT", default_value_t = 2376)]
    pub(crate) docker_port: i64,
    /// SSH port.
    #[arg(long = "vultr-ssh-port", env = "VULTR_SSH_PORT", default_value_t = 22)]
    pub(crate) ssh_port: i64,
    /// SSH login user.
    #[arg(long = "vultr-ssh-user", env = "VULTR_SSH_USER", default_value = "root")]
    pub(crate) ssh_user: String,
}
