//! Provider client capability.
//!
//! [`ProviderApi`] is the seam between the driver and Vultr. It is object
//! safe so the driver can hold it as `Arc<dyn ProviderApi>` and tests can
//! substitute [`crate::test_support::FakeProvider`].

use std::future::Future;
use std::pin::Pin;

mod client;
mod error;
mod types;

pub use client::{ClientSettings, RetryPolicy, VultrClient};
pub use error::ProviderError;
pub use types::{
    Account, Application, AvailabilityKind, BareMetalCreatePayload, FirewallGroup,
    FirewallRulePayload, InstanceCreatePayload, InstanceRecord, Iso, Network, OperatingSystem,
    Region, Snapshot, SshKey, SshKeyPayload, StartupScript,
};

/// Future returned by provider operations.
pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ProviderError>> + Send + 'a>>;

/// Read and write operations the driver needs from the provider.
pub trait ProviderApi: Send + Sync {
    /// Fetches the account; used as a credential check.
    fn account(&self) -> ProviderFuture<'_, Account>;

    /// Lists the operating system catalog.
    fn list_os(&self) -> ProviderFuture<'_, Vec<OperatingSystem>>;

    /// Lists regions.
    fn list_regions(&self) -> ProviderFuture<'_, Vec<Region>>;

    /// Lists plan ids available in `region` for the given plan family.
    fn list_available_plans<'a>(
        &'a self,
        region: &'a str,
        kind: AvailabilityKind,
    ) -> ProviderFuture<'a, Vec<String>>;

    /// Lists snapshots.
    fn list_snapshots(&self) -> ProviderFuture<'_, Vec<Snapshot>>;

    /// Lists ISOs.
    fn list_isos(&self) -> ProviderFuture<'_, Vec<Iso>>;

    /// Lists marketplace applications.
    fn list_applications(&self) -> ProviderFuture<'_, Vec<Application>>;

    /// Lists startup scripts.
    fn list_startup_scripts(&self) -> ProviderFuture<'_, Vec<StartupScript>>;

    /// Lists private networks.
    fn list_networks(&self) -> ProviderFuture<'_, Vec<Network>>;

    /// Lists firewall groups.
    fn list_firewall_groups(&self) -> ProviderFuture<'_, Vec<FirewallGroup>>;

    /// Lists registered SSH keys.
    fn list_ssh_keys(&self) -> ProviderFuture<'_, Vec<SshKey>>;

    /// Registers a public key.
    fn create_ssh_key<'a>(&'a self, payload: &'a SshKeyPayload) -> ProviderFuture<'a, SshKey>;

    /// Creates a standard or dedicated-cloud instance.
    fn create_instance<'a>(
        &'a self,
        payload: &'a InstanceCreatePayload,
    ) -> ProviderFuture<'a, InstanceRecord>;

    /// Fetches an instance.
    fn get_instance<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, InstanceRecord>;

    /// Powers an instance on.
    fn start_instance<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, ()>;

    /// Powers an instance off.
    fn halt_instance<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, ()>;

    /// Reboots an instance.
    fn reboot_instance<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, ()>;

    /// Deletes an instance.
    fn delete_instance<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, ()>;

    /// Creates a bare-metal server.
    fn create_bare_metal<'a>(
        &'a self,
        payload: &'a BareMetalCreatePayload,
    ) -> ProviderFuture<'a, InstanceRecord>;

    /// Fetches a bare-metal server.
    fn get_bare_metal<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, InstanceRecord>;

    /// Powers a bare-metal server on.
    fn start_bare_metal<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, ()>;

    /// Powers a bare-metal server off.
    fn halt_bare_metal<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, ()>;

    /// Reboots a bare-metal server.
    fn reboot_bare_metal<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, ()>;

    /// Deletes a bare-metal server.
    fn delete_bare_metal<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, ()>;

    /// Adds a rule to a firewall group and returns the rule id.
    fn create_firewall_rule<'a>(
        &'a self,
        group_id: &'a str,
        payload: &'a FirewallRulePayload,
    ) -> ProviderFuture<'a, u64>;

    /// Deletes a firewall group rule.
    fn delete_firewall_rule<'a>(&'a self, group_id: &'a str, rule_id: u64)
    -> ProviderFuture<'a, ()>;
}
