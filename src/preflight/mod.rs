//! Pre-flight validation against the provider catalogs.
//!
//! Every field that depends on provider-side data is checked here before any
//! mutating call is issued. Checks run in a fixed order because the SSH key
//! check depends on the OS family found by the OS check. Catalogs are only
//! listed when the request actually uses the corresponding field.

use tracing::{debug, info};

mod catalog;
mod error;

pub use catalog::{inspect, is_ipv4, remove, ssh_key_injection_supported};
pub use error::PreflightError;

use crate::provider::{AvailabilityKind, ProviderApi, ProviderError};
use crate::request::{InstanceRequest, OsSource, RequestError, ServerType};

const DDOS_OPTION: &str = "ddos_protection";
const SCRIPT_TYPE_PXE: &str = "pxe";
const SCRIPT_TYPE_BOOT: &str = "boot";

/// An [`InstanceRequest`] that passed every catalog check.
///
/// Only [`Preflight::validate`] constructs this token, and
/// [`crate::driver::Driver::create`] consumes it, so a request cannot reach
/// the create call unchecked.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ValidatedRequest {
    request: InstanceRequest,
    os_family: String,
    ssh_key_injection: bool,
    ddos_available: bool,
}

impl ValidatedRequest {
    /// The validated request.
    #[must_use]
    pub const fn request(&self) -> &InstanceRequest {
        &self.request
    }

    /// Family of the requested OS.
    #[must_use]
    pub fn os_family(&self) -> &str {
        &self.os_family
    }

    /// Whether SSH keys can be attached for the requested OS.
    #[must_use]
    pub const fn ssh_key_injection(&self) -> bool {
        self.ssh_key_injection
    }

    /// Whether the region offers DDoS protection.
    #[must_use]
    pub const fn ddos_available(&self) -> bool {
        self.ddos_available
    }

    /// Releases the request.
    #[must_use]
    pub fn into_request(self) -> InstanceRequest {
        self.request
    }
}

/// Runs the catalog checks against a provider.
pub struct Preflight<'a> {
    provider: &'a dyn ProviderApi,
}

impl<'a> Preflight<'a> {
    /// Creates a validator backed by `provider`.
    #[must_use]
    pub const fn new(provider: &'a dyn ProviderApi) -> Self {
        Self { provider }
    }

    /// Validates `request`, returning a [`ValidatedRequest`] on success.
    ///
    /// # Errors
    ///
    /// Returns the first [`PreflightError`] encountered; later checks are not
    /// run.
    pub async fn validate(&self, request: InstanceRequest) -> Result<ValidatedRequest, PreflightError> {
        self.check_credentials().await?;
        let os_family = self.check_os(&request).await?;
        let ssh_key_injection = ssh_key_injection_supported(&os_family);
        let ddos_available = self.check_region(&request).await?;
        self.check_plan(&request).await?;
        self.check_snapshot(&request).await?;
        self.check_iso(&request).await?;
        self.check_application(&request).await?;
        check_ipxe(&request)?;
        self.check_script(&request).await?;
        check_reserved_ipv4(&request)?;
        check_ddos(&request, ddos_available)?;
        check_network_conflict(&request)?;
        self.check_networks(&request).await?;
        self.check_firewall_group(&request).await?;
        self.check_ssh_keys(&request, &os_family, ssh_key_injection).await?;

        info!(
            region = %request.region,
            plan = %request.plan,
            os = %request.os_source,
            os_family = %os_family,
            "pre-flight checks passed"
        );
        Ok(ValidatedRequest {
            request,
            os_family,
            ssh_key_injection,
            ddos_available,
        })
    }

    async fn check_credentials(&self) -> Result<(), PreflightError> {
        self.provider
            .account()
            .await
            .map_err(PreflightError::Credentials)?;
        debug!("credentials accepted");
        Ok(())
    }

    async fn check_os(&self, request: &InstanceRequest) -> Result<String, PreflightError> {
        let catalog = self
            .provider
            .list_os()
            .await
            .map_err(catalog_error("operating systems"))?;
        let os_id = request.os_source.os_id();
        catalog
            .iter()
            .find(|os| os.id == os_id)
            .map(|os| os.family.clone())
            .ok_or_else(|| PreflightError::NotInCatalog {
                field: "--vultr-os-id",
                missing: vec![os_id.to_string()],
                available: catalog
                    .iter()
                    .map(|os| format!("{} ({})", os.id, os.name))
                    .collect(),
            })
    }

    async fn check_region(&self, request: &InstanceRequest) -> Result<bool, PreflightError> {
        let regions = self
            .provider
            .list_regions()
            .await
            .map_err(catalog_error("regions"))?;
        regions
            .iter()
            .find(|region| region.id == request.region)
            .map(|region| region.options.iter().any(|option| option == DDOS_OPTION))
            .ok_or_else(|| PreflightError::NotInCatalog {
                field: "--vultr-region",
                missing: vec![request.region.clone()],
                available: regions.iter().map(|region| region.id.clone()).collect(),
            })
    }

    async fn check_plan(&self, request: &InstanceRequest) -> Result<(), PreflightError> {
        let kind = availability_kind(request.server_type);
        let plans = self
            .provider
            .list_available_plans(&request.region, kind)
            .await
            .map_err(catalog_error("plan availability"))?;
        let (_, missing) = inspect(std::slice::from_ref(&request.plan), &plans);
        if missing.is_empty() {
            return Ok(());
        }
        Err(PreflightError::NotInCatalog {
            field: "--vultr-vps-plan",
            missing,
            available: plans,
        })
    }

    async fn check_snapshot(&self, request: &InstanceRequest) -> Result<(), PreflightError> {
        let Some(snapshot_id) = request.snapshot_id.as_ref() else {
            return Ok(());
        };
        require_os_source(request, "--vultr-snapshot-id", OsSource::Snapshot)?;
        let snapshots = self
            .provider
            .list_snapshots()
            .await
            .map_err(catalog_error("snapshots"))?;
        let ids: Vec<String> = snapshots.into_iter().map(|snapshot| snapshot.id).collect();
        require_present("--vultr-snapshot-id", snapshot_id, ids)
    }

    async fn check_iso(&self, request: &InstanceRequest) -> Result<(), PreflightError> {
        let Some(iso_id) = request.iso_id.as_ref() else {
            return Ok(());
        };
        require_os_source(request, "--vultr-iso-id", OsSource::Custom)?;
        let isos = self
            .provider
            .list_isos()
            .await
            .map_err(catalog_error("ISOs"))?;
        let ids: Vec<String> = isos.into_iter().map(|iso| iso.id).collect();
        require_present("--vultr-iso-id", iso_id, ids)
    }

    async fn check_application(&self, request: &InstanceRequest) -> Result<(), PreflightError> {
        if request.app_id.is_none() && request.image_id.is_none() {
            return Ok(());
        }
        if request.app_id.is_some() {
            require_os_source(request, "--vultr-app-id", OsSource::Application)?;
        }
        if request.image_id.is_some() {
            require_os_source(request, "--vultr-image-id", OsSource::Application)?;
        }
        let applications = self
            .provider
            .list_applications()
            .await
            .map_err(catalog_error("applications"))?;
        if let Some(app_id) = request.app_id {
            let ids: Vec<String> = applications.iter().map(|app| app.id.to_string()).collect();
            require_present("--vultr-app-id", &app_id.to_string(), ids)?;
        }
        if let Some(image_id) = request.image_id.as_ref() {
            let ids: Vec<String> = applications
                .iter()
                .filter(|app| !app.image_id.is_empty())
                .map(|app| app.image_id.clone())
                .collect();
            require_present("--vultr-image-id", image_id, ids)?;
        }
        Ok(())
    }

    async fn check_script(&self, request: &InstanceRequest) -> Result<(), PreflightError> {
        let Some(script_id) = request.script_id.as_ref() else {
            return Ok(());
        };
        let scripts = self
            .provider
            .list_startup_scripts()
            .await
            .map_err(catalog_error("startup scripts"))?;
        let Some(script) = scripts.iter().find(|script| &script.id == script_id) else {
            return Err(PreflightError::NotInCatalog {
                field: "--vultr-startup-script-id",
                missing: vec![script_id.clone()],
                available: scripts
                    .iter()
                    .map(|script| format!("{} ({}, {})", script.id, script.name, script.kind))
                    .collect(),
            });
        };
        check_script_compatibility(script_id, &script.kind, request.os_source, request.server_type)
    }

    async fn check_networks(&self, request: &InstanceRequest) -> Result<(), PreflightError> {
        if request.network_ids.is_empty() {
            return Ok(());
        }
        let networks = self
            .provider
            .list_networks()
            .await
            .map_err(catalog_error("private networks"))?;
        let ids: Vec<String> = networks.into_iter().map(|network| network.id).collect();
        let (_, missing) = inspect(&request.network_ids, &ids);
        if missing.is_empty() {
            return Ok(());
        }
        Err(PreflightError::NotInCatalog {
            field: "--vultr-vpc-ids",
            missing,
            available: ids,
        })
    }

    async fn check_firewall_group(&self, request: &InstanceRequest) -> Result<(), PreflightError> {
        let Some(group_id) = request.firewall_group_id.as_ref() else {
            return Ok(());
        };
        let groups = self
            .provider
            .list_firewall_groups()
            .await
            .map_err(catalog_error("firewall groups"))?;
        let ids: Vec<String> = groups.into_iter().map(|group| group.id).collect();
        require_present("--vultr-firewall-group-id", group_id, ids)
    }

    async fn check_ssh_keys(
        &self,
        request: &InstanceRequest,
        os_family: &str,
        ssh_key_injection: bool,
    ) -> Result<(), PreflightError> {
        if request.ssh_key_ids.is_empty() {
            return Ok(());
        }
        if !ssh_key_injection {
            return Err(PreflightError::SshKeysUnsupported {
                family: os_family.to_owned(),
            });
        }
        let keys = self
            .provider
            .list_ssh_keys()
            .await
            .map_err(catalog_error("SSH keys"))?;
        let ids: Vec<String> = keys.into_iter().map(|key| key.id).collect();
        let (_, missing) = inspect(&request.ssh_key_ids, &ids);
        if missing.is_empty() {
            return Ok(());
        }
        Err(PreflightError::NotInCatalog {
            field: "--vultr-ssh-key-ids",
            missing,
            available: ids,
        })
    }
}

/// Maps the server type to the availability query it needs.
#[must_use]
pub const fn availability_kind(server_type: ServerType) -> AvailabilityKind {
    match server_type {
        ServerType::Standard => AvailabilityKind::All,
        ServerType::BareMetal => AvailabilityKind::BareMetal,
        ServerType::DedicatedCloud => AvailabilityKind::DedicatedCloud,
    }
}

/// Checks a startup script type against the OS source and server type.
///
/// # Errors
///
/// Returns [`PreflightError::ScriptIncompatible`] when a `pxe` script is used
/// without a custom OS or on bare metal, or a `boot` script is used with a
/// custom, snapshot or backup OS.
pub fn check_script_compatibility(
    script_id: &str,
    kind: &str,
    os_source: OsSource,
    server_type: ServerType,
) -> Result<(), PreflightError> {
    let reason = match kind {
        SCRIPT_TYPE_PXE if os_source != OsSource::Custom => {
            Some(format!("requires {}, got {os_source}", OsSource::Custom))
        }
        SCRIPT_TYPE_PXE if server_type == ServerType::BareMetal => {
            Some(String::from("cannot be used on bare-metal servers"))
        }
        SCRIPT_TYPE_BOOT
            if matches!(
                os_source,
                OsSource::Custom | OsSource::Snapshot | OsSource::Backup
            ) =>
        {
            Some(format!("cannot be used with {os_source}"))
        }
        _ => None,
    };
    reason.map_or(Ok(()), |reason| {
        Err(PreflightError::ScriptIncompatible {
            script_id: script_id.to_owned(),
            kind: kind.to_owned(),
            reason,
        })
    })
}

fn check_ipxe(request: &InstanceRequest) -> Result<(), PreflightError> {
    if request.ipxe_chain_url.is_some() {
        require_os_source(request, "--vultr-ipxe-chain-url", OsSource::Custom)?;
    }
    Ok(())
}

fn check_reserved_ipv4(request: &InstanceRequest) -> Result<(), PreflightError> {
    match request.reserved_ipv4.as_deref() {
        Some(address) if !is_ipv4(address) => Err(PreflightError::InvalidIpv4(address.to_owned())),
        _ => Ok(()),
    }
}

fn check_ddos(request: &InstanceRequest, ddos_available: bool) -> Result<(), PreflightError> {
    if request.ddos_protection && !ddos_available {
        return Err(PreflightError::DdosUnavailable {
            region: request.region.clone(),
        });
    }
    Ok(())
}

fn check_network_conflict(request: &InstanceRequest) -> Result<(), PreflightError> {
    if request.enable_private_network && !request.network_ids.is_empty() {
        return Err(RequestError::Conflict {
            first: "--vultr-enable-vpc",
            second: "--vultr-vpc-ids",
        }
        .into());
    }
    Ok(())
}

fn require_os_source(
    request: &InstanceRequest,
    field: &'static str,
    required: OsSource,
) -> Result<(), PreflightError> {
    if request.os_source == required {
        return Ok(());
    }
    Err(PreflightError::OsSourceMismatch {
        field,
        required,
        actual: request.os_source,
    })
}

fn require_present(
    field: &'static str,
    value: &str,
    available: Vec<String>,
) -> Result<(), PreflightError> {
    if available.iter().any(|candidate| candidate == value) {
        return Ok(());
    }
    Err(PreflightError::NotInCatalog {
        field,
        missing: vec![value.to_owned()],
        available,
    })
}

fn catalog_error(catalog: &'static str) -> impl Fn(ProviderError) -> PreflightError {
    move |source| PreflightError::Catalog { catalog, source }
}
