//! Server flavours: the per-server-type half of the lifecycle controller.
//!
//! Each flavour knows which endpoints its server type uses, how to shape the
//! create payload, how to read state from the provider record, and when a new
//! server counts as ready. The flavour is picked once from the resolved
//! [`ServerType`] and never switched afterwards.

use std::fmt;

use crate::provider::{
    BareMetalCreatePayload, InstanceCreatePayload, InstanceRecord, ProviderApi, ProviderFuture,
};
use crate::request::{InstanceRequest, ServerType};
use crate::state::{
    CanonicalState, SERVER_STATE_OK, main_ip_is_set, normalize_bare_metal, normalize_instance,
};

/// Operation set implemented by every server type.
pub trait ServerFlavor: Send + Sync + fmt::Debug {
    /// Server type served by this flavour.
    fn server_type(&self) -> ServerType;

    /// Creates the server with the given SSH keys attached.
    fn create<'a>(
        &'a self,
        provider: &'a dyn ProviderApi,
        request: &'a InstanceRequest,
        ssh_key_ids: &'a [String],
    ) -> ProviderFuture<'a, InstanceRecord>;

    /// Fetches the provider record.
    fn fetch<'a>(&'a self, provider: &'a dyn ProviderApi, id: &'a str)
    -> ProviderFuture<'a, InstanceRecord>;

    /// Powers the server on.
    fn start<'a>(&'a self, provider: &'a dyn ProviderApi, id: &'a str) -> ProviderFuture<'a, ()>;

    /// Powers the server off.
    fn halt<'a>(&'a self, provider: &'a dyn ProviderApi, id: &'a str) -> ProviderFuture<'a, ()>;

    /// Reboots the server.
    fn reboot<'a>(&'a self, provider: &'a dyn ProviderApi, id: &'a str) -> ProviderFuture<'a, ()>;

    /// Deletes the server.
    fn delete<'a>(&'a self, provider: &'a dyn ProviderApi, id: &'a str) -> ProviderFuture<'a, ()>;

    /// Maps the provider record to a canonical state.
    fn normalize(&self, record: &InstanceRecord) -> CanonicalState;

    /// Returns `true` once a freshly created server may be handed over.
    fn is_ready(&self, record: &InstanceRecord) -> bool;
}

/// Returns the flavour for `server_type`.
#[must_use]
pub fn flavor_for(server_type: ServerType) -> Box<dyn ServerFlavor> {
    match server_type {
        ServerType::Standard => Box::new(StandardServer),
        ServerType::BareMetal => Box::new(BareMetalServer),
        ServerType::DedicatedCloud => Box::new(DedicatedCloudServer),
    }
}

/// Shared-CPU cloud compute.
#[derive(Clone, Copy, Debug, Default)]
pub struct StandardServer;

/// Dedicated-CPU cloud compute. Uses the instance endpoints like
/// [`StandardServer`]; only plan availability differs.
#[derive(Clone, Copy, Debug, Default)]
pub struct DedicatedCloudServer;

/// Bare-metal server.
#[derive(Clone, Copy, Debug, Default)]
pub struct BareMetalServer;

/// Builds the create payload for standard and dedicated-cloud instances.
#[must_use]
pub fn instance_payload(request: &InstanceRequest, ssh_key_ids: &[String]) -> InstanceCreatePayload {
    InstanceCreatePayload {
        region: request.region.clone(),
        plan: request.plan.clone(),
        os_id: request.os_source.os_id(),
        iso_id: request.iso_id.clone(),
        snapshot_id: request.snapshot_id.clone(),
        app_id: request.app_id,
        image_id: request.image_id.clone(),
        script_id: request.script_id.clone(),
        ipxe_chain_url: request.ipxe_chain_url.clone(),
        enable_ipv6: request.enable_ipv6,
        enable_vpc: request.enable_private_network,
        attach_vpc: request.network_ids.clone(),
        label: request.label.clone(),
        hostname: request.hostname.clone(),
        tags: request.tags.clone(),
        sshkey_id: ssh_key_ids.to_vec(),
        backups: request.backups.as_str().to_owned(),
        ddos_protection: request.ddos_protection,
        activation_email: request.activation_email,
        firewall_group_id: request.firewall_group_id.clone(),
        reserved_ipv4: request.reserved_ipv4.clone(),
        user_data: request.user_data.clone(),
    }
}

/// Builds the bare-metal create payload. Bare metal takes no ISO, private
/// network, backup, DDoS or firewall settings.
#[must_use]
pub fn bare_metal_payload(
    request: &InstanceRequest,
    ssh_key_ids: &[String],
) -> BareMetalCreatePayload {
    BareMetalCreatePayload {
        region: request.region.clone(),
        plan: request.plan.clone(),
        os_id: request.os_source.os_id(),
        snapshot_id: request.snapshot_id.clone(),
        app_id: request.app_id,
        image_id: request.image_id.clone(),
        script_id: request.script_id.clone(),
        ipxe_chain_url: request.ipxe_chain_url.clone(),
        enable_ipv6: request.enable_ipv6,
        label: request.label.clone(),
        hostname: request.hostname.clone(),
        tags: request.tags.clone(),
        sshkey_id: ssh_key_ids.to_vec(),
        activation_email: request.activation_email,
        reserved_ipv4: request.reserved_ipv4.clone(),
        user_data: request.user_data.clone(),
    }
}

fn normalize_cloud(record: &InstanceRecord) -> CanonicalState {
    normalize_instance(
        &record.status,
        record.power_status.as_deref(),
        record.server_status.as_deref(),
    )
}

fn cloud_ready(record: &InstanceRecord) -> bool {
    main_ip_is_set(&record.main_ip)
        && normalize_cloud(record) == CanonicalState::Running
        && record.server_status.as_deref() == Some(SERVER_STATE_OK)
}

macro_rules! cloud_flavor {
    ($flavor:ty, $server_type:expr) => {
        impl ServerFlavor for $flavor {
            fn server_type(&self) -> ServerType {
                $server_type
            }

            fn create<'a>(
                &'a self,
                provider: &'a dyn ProviderApi,
                request: &'a InstanceRequest,
                ssh_key_ids: &'a [String],
            ) -> ProviderFuture<'a, InstanceRecord> {
                Box::pin(async move {
                    let payload = instance_payload(request, ssh_key_ids);
                    provider.create_instance(&payload).await
                })
            }

            fn fetch<'a>(
                &'a self,
                provider: &'a dyn ProviderApi,
                id: &'a str,
            ) -> ProviderFuture<'a, InstanceRecord> {
                provider.get_instance(id)
            }

            fn start<'a>(
                &'a self,
                provider: &'a dyn ProviderApi,
                id: &'a str,
            ) -> ProviderFuture<'a, ()> {
                provider.start_instance(id)
            }

            fn halt<'a>(
                &'a self,
                provider: &'a dyn ProviderApi,
                id: &'a str,
            ) -> ProviderFuture<'a, ()> {
                provider.halt_instance(id)
            }

            fn reboot<'a>(
                &'a self,
                provider: &'a dyn ProviderApi,
                id: &'a str,
            ) -> ProviderFuture<'a, ()> {
                provider.reboot_instance(id)
            }

            fn delete<'a>(
                &'a self,
                provider: &'a dyn ProviderApi,
                id: &'a str,
            ) -> ProviderFuture<'a, ()> {
                provider.delete_instance(id)
            }

            fn normalize(&self, record: &InstanceRecord) -> CanonicalState {
                normalize_cloud(record)
            }

            fn is_ready(&self, record: &InstanceRecord) -> bool {
                cloud_ready(record)
            }
        }
    };
}

cloud_flavor!(StandardServer, ServerType::Standard);
cloud_flavor!(DedicatedCloudServer, ServerType::DedicatedCloud);

impl ServerFlavor for BareMetalServer {
    fn server_type(&self) -> ServerType {
        ServerType::BareMetal
    }

    fn create<'a>(
        &'a self,
        provider: &'a dyn ProviderApi,
        request: &'a InstanceRequest,
        ssh_key_ids: &'a [String],
    ) -> ProviderFuture<'a, InstanceRecord> {
        Box::pin(async move {
            let payload = bare_metal_payload(request, ssh_key_ids);
            provider.create_bare_metal(&payload).await
        })
    }

    fn fetch<'a>(
        &'a self,
        provider: &'a dyn ProviderApi,
        id: &'a str,
    ) -> ProviderFuture<'a, InstanceRecord> {
        provider.get_bare_metal(id)
    }

    fn start<'a>(&'a self, provider: &'a dyn ProviderApi, id: &'a str) -> ProviderFuture<'a, ()> {
        provider.start_bare_metal(id)
    }

    fn halt<'a>(&'a self, provider: &'a dyn ProviderApi, id: &'a str) -> ProviderFuture<'a, ()> {
        provider.halt_bare_metal(id)
    }

    fn reboot<'a>(&'a self, provider: &'a dyn ProviderApi, id: &'a str) -> ProviderFuture<'a, ()> {
        provider.reboot_bare_metal(id)
    }

    fn delete<'a>(&'a self, provider: &'a dyn ProviderApi, id: &'a str) -> ProviderFuture<'a, ()> {
        provider.delete_bare_metal(id)
    }

    fn normalize(&self, record: &InstanceRecord) -> CanonicalState {
        normalize_bare_metal(&record.status)
    }

    // Bare metal exposes no fine-grained server state to confirm boot.
    fn is_ready(&self, record: &InstanceRecord) -> bool {
        main_ip_is_set(&record.main_ip)
    }
}
