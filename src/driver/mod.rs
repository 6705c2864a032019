//! Instance lifecycle controller.
//!
//! A [`Driver`] owns the provider identifier of exactly one server. It creates
//! the server from a [`ValidatedRequest`], waits for it to become reachable,
//! and afterwards drives power operations, teardown and state queries. Every
//! state-dependent operation fetches a fresh record before deciding to act, so
//! out-of-band changes made in the provider console are honoured.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

mod cache;
mod error;
mod flavor;
mod keys;
mod readiness;

pub use error::DriverError;
pub use flavor::{
    BareMetalServer, DedicatedCloudServer, ServerFlavor, StandardServer, bare_metal_payload,
    flavor_for, instance_payload,
};
pub use keys::{KeyError, KeySource, PRIVATE_KEY_FILE, SshKeygen};
pub use readiness::{DEFAULT_POLL_ATTEMPTS, DEFAULT_POLL_INTERVAL, ReadinessPolicy};

use cache::InstanceCache;
use readiness::wait_until_ready;

use crate::preflight::{PreflightError, ValidatedRequest, inspect};
use crate::provider::{FirewallRulePayload, ProviderApi, SshKeyPayload};
use crate::record::MachineRecord;
use crate::request::{InstanceRequest, ServerType};
use crate::resolver::DriverSettings;
use crate::state::CanonicalState;

/// Lifecycle controller for a single Vultr server.
pub struct Driver {
    provider: Arc<dyn ProviderApi>,
    flavor: Box<dyn ServerFlavor>,
    settings: DriverSettings,
    readiness: ReadinessPolicy,
    key_source: Option<Box<dyn KeySource>>,
    cache: InstanceCache,
    ssh_key_ids: Vec<String>,
    firewall_group_id: Option<String>,
    firewall_rule_id: Option<u64>,
}

impl Driver {
    /// Creates a driver for a machine that does not exist yet.
    #[must_use]
    pub fn new(
        provider: Arc<dyn ProviderApi>,
        server_type: ServerType,
        settings: DriverSettings,
    ) -> Self {
        Self {
            provider,
            flavor: flavor_for(server_type),
            settings,
            readiness: ReadinessPolicy::default(),
            key_source: None,
            cache: InstanceCache::default(),
            ssh_key_ids: Vec::new(),
            firewall_group_id: None,
            firewall_rule_id: None,
        }
    }

    /// Rebuilds a driver from a persisted [`MachineRecord`].
    #[must_use]
    pub fn from_record(provider: Arc<dyn ProviderApi>, record: &MachineRecord) -> Self {
        let settings = DriverSettings {
            machine_name: record.machine_name.clone(),
            docker_port: record.docker_port,
            ssh_port: record.ssh_port,
            ssh_user: record.ssh_user.clone(),
            open_docker_port: record.firewall_rule_id.is_some(),
        };
        let mut driver = Self::new(provider, record.server_type, settings);
        driver.cache = InstanceCache::restore(
            record.instance_id.clone(),
            record.ip_address.clone(),
            record.internal_ip.clone(),
        );
        driver.ssh_key_ids.clone_from(&record.ssh_key_ids);
        driver.firewall_group_id.clone_from(&record.firewall_group_id);
        driver.firewall_rule_id = record.firewall_rule_id;
        driver
    }

    /// Overrides the readiness poll bounds.
    #[must_use]
    pub const fn with_readiness(mut self, readiness: ReadinessPolicy) -> Self {
        self.readiness = readiness;
        self
    }

    /// Sets the key source used when the request names no SSH keys.
    #[must_use]
    pub fn with_key_source(mut self, key_source: impl KeySource + 'static) -> Self {
        self.key_source = Some(Box::new(key_source));
        self
    }

    /// Exports the fields the orchestrator must persist.
    #[must_use]
    pub fn record(&self) -> MachineRecord {
        MachineRecord {
            machine_name: self.settings.machine_name.clone(),
            server_type: self.flavor.server_type(),
            instance_id: self.cache.id().map(str::to_owned),
            ip_address: self.cache.main_ip().map(str::to_owned),
            internal_ip: self.cache.internal_ip().map(str::to_owned),
            docker_port: self.settings.docker_port,
            ssh_port: self.settings.ssh_port,
            ssh_user: self.settings.ssh_user.clone(),
            ssh_key_ids: self.ssh_key_ids.clone(),
            firewall_group_id: self.firewall_group_id.clone(),
            firewall_rule_id: self.firewall_rule_id,
        }
    }

    /// Provider identifier, once the server was created.
    #[must_use]
    pub fn instance_id(&self) -> Option<&str> {
        self.cache.id()
    }

    /// Server type this driver controls.
    #[must_use]
    pub fn server_type(&self) -> ServerType {
        self.flavor.server_type()
    }

    /// Creates the server and waits until it is ready.
    ///
    /// The server type of the request replaces the one the driver was built
    /// with. On error the instance id, if one was assigned, stays available
    /// through [`Driver::record`] so the caller can clean up.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::AlreadyCreated`] when the driver already owns a
    /// server, [`DriverError::ReadinessTimeout`] when the poll runs out of
    /// attempts, or the first key, catalog or provider failure.
    pub async fn create(&mut self, validated: ValidatedRequest) -> Result<(), DriverError> {
        self.provision(validated, None).await
    }

    /// Like [`Driver::create`], but abandons the readiness poll once
    /// `deadline` passes.
    ///
    /// # Errors
    ///
    /// See [`Driver::create`].
    pub async fn create_until(
        &mut self,
        validated: ValidatedRequest,
        deadline: Instant,
    ) -> Result<(), DriverError> {
        self.provision(validated, Some(deadline)).await
    }

    async fn provision(
        &mut self,
        validated: ValidatedRequest,
        deadline: Option<Instant>,
    ) -> Result<(), DriverError> {
        if let Some(instance_id) = self.cache.id() {
            return Err(DriverError::AlreadyCreated {
                instance_id: instance_id.to_owned(),
            });
        }
        self.flavor = flavor_for(validated.request().server_type);
        let ssh_key_ids = self.prepare_ssh_keys(&validated).await?;
        let request = validated.into_request();

        let created = self
            .flavor
            .create(self.provider.as_ref(), &request, &ssh_key_ids)
            .await?;
        self.cache.store(&created);
        self.ssh_key_ids = ssh_key_ids;
        self.firewall_group_id.clone_from(&request.firewall_group_id);
        let instance_id = self.cache.require_id()?.to_owned();
        info!(
            instance_id = %instance_id,
            server_type = %self.flavor.server_type(),
            label = %request.label,
            "server created"
        );

        self.open_docker_port(&request).await?;

        let cache = &mut self.cache;
        let ready = wait_until_ready(
            self.provider.as_ref(),
            self.flavor.as_ref(),
            &instance_id,
            self.readiness,
            deadline,
            |record| cache.store(record),
        )
        .await?;
        info!(instance_id = %instance_id, ip = %ready.main_ip, "server ready");
        Ok(())
    }

    async fn prepare_ssh_keys(
        &self,
        validated: &ValidatedRequest,
    ) -> Result<Vec<String>, DriverError> {
        let request = validated.request();
        if !validated.ssh_key_injection() {
            debug!(
                os_family = validated.os_family(),
                "OS family takes no SSH keys; skipping key setup"
            );
            return Ok(Vec::new());
        }

        if !request.ssh_key_ids.is_empty() {
            let keys = self.provider.list_ssh_keys().await?;
            let available: Vec<String> = keys.into_iter().map(|key| key.id).collect();
            let (_, missing) = inspect(&request.ssh_key_ids, &available);
            if !missing.is_empty() {
                return Err(PreflightError::NotInCatalog {
                    field: "--vultr-ssh-key-ids",
                    missing,
                    available,
                }
                .into());
            }
            return Ok(request.ssh_key_ids.clone());
        }

        let key_source = self
            .key_source
            .as_ref()
            .ok_or(DriverError::MissingKeySource)?;
        let public_key = key_source.public_key(&self.settings.machine_name)?;
        let payload = SshKeyPayload {
            name: self.settings.machine_name.clone(),
            ssh_key: public_key,
        };
        let key = self.provider.create_ssh_key(&payload).await?;
        info!(key_id = %key.id, name = %payload.name, "registered SSH key");
        Ok(vec![key.id])
    }

    async fn open_docker_port(&mut self, request: &InstanceRequest) -> Result<(), DriverError> {
        if !self.settings.open_docker_port {
            return Ok(());
        }
        let Some(group_id) = request.firewall_group_id.as_deref() else {
            warn!("docker port not opened: no firewall group attached");
            return Ok(());
        };
        let payload = FirewallRulePayload::open_tcp_port(
            self.settings.docker_port,
            format!("docker-machine {}", self.settings.machine_name),
        );
        let rule_id = self.provider.create_firewall_rule(group_id, &payload).await?;
        info!(group_id, rule_id, port = self.settings.docker_port, "opened docker port");
        self.firewall_rule_id = Some(rule_id);
        Ok(())
    }

    /// Powers the server on unless it is already running or starting.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::NotCreated`] without an instance id, or the
    /// provider failure.
    pub async fn start(&mut self) -> Result<(), DriverError> {
        let state = self.state().await?;
        if matches!(state, CanonicalState::Running | CanonicalState::Starting) {
            debug!(%state, "start skipped");
            return Ok(());
        }
        let id = self.cache.require_id()?;
        self.flavor.start(self.provider.as_ref(), id).await?;
        info!(instance_id = id, "start requested");
        Ok(())
    }

    /// Halts the server. Vultr has no graceful shutdown, so this is the same
    /// call as [`Driver::kill`].
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::NotCreated`] without an instance id, or the
    /// provider failure.
    pub async fn stop(&mut self) -> Result<(), DriverError> {
        self.halt().await
    }

    /// Halts the server immediately unless it is already stopped.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::NotCreated`] without an instance id, or the
    /// provider failure.
    pub async fn kill(&mut self) -> Result<(), DriverError> {
        self.halt().await
    }

    async fn halt(&mut self) -> Result<(), DriverError> {
        let state = self.state().await?;
        if state == CanonicalState::Stopped {
            debug!("halt skipped: already stopped");
            return Ok(());
        }
        let id = self.cache.require_id()?;
        self.flavor.halt(self.provider.as_ref(), id).await?;
        info!(instance_id = id, "halt requested");
        Ok(())
    }

    /// Reboots the server unless it is stopped or still starting.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::NotCreated`] without an instance id, or the
    /// provider failure.
    pub async fn restart(&mut self) -> Result<(), DriverError> {
        let state = self.state().await?;
        if matches!(state, CanonicalState::Stopped | CanonicalState::Starting) {
            debug!(%state, "restart skipped");
            return Ok(());
        }
        let id = self.cache.require_id()?;
        self.flavor.reboot(self.provider.as_ref(), id).await?;
        info!(instance_id = id, "reboot requested");
        Ok(())
    }

    /// Stops and deletes the server, then drops the Docker port rule.
    ///
    /// A driver that never created a server has nothing to remove and
    /// succeeds. Failing to delete the firewall rule is logged, not returned.
    ///
    /// # Errors
    ///
    /// Returns the provider failure of the stop or delete call.
    pub async fn remove(&mut self) -> Result<(), DriverError> {
        let Some(id) = self.cache.id().map(str::to_owned) else {
            debug!("remove skipped: no server was created");
            return Ok(());
        };
        self.halt().await?;
        self.flavor.delete(self.provider.as_ref(), &id).await?;
        info!(instance_id = %id, "server deleted");

        if let (Some(group_id), Some(rule_id)) =
            (self.firewall_group_id.as_deref(), self.firewall_rule_id)
        {
            match self.provider.delete_firewall_rule(group_id, rule_id).await {
                Ok(()) => debug!(group_id, rule_id, "docker port rule deleted"),
                Err(err) => warn!(
                    group_id,
                    rule_id,
                    error = %err,
                    "failed to delete docker port rule"
                ),
            }
        }
        self.firewall_rule_id = None;
        self.cache.clear();
        Ok(())
    }

    /// Main IP of the server, fetching a fresh record when none is cached.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::IpNotYetAvailable`] while the provider has not
    /// assigned an address, [`DriverError::NotCreated`] without an instance
    /// id, or the provider failure.
    pub async fn ip(&mut self) -> Result<String, DriverError> {
        if let Some(address) = self.cache.main_ip() {
            return Ok(address.to_owned());
        }
        self.cache
            .refresh(self.provider.as_ref(), self.flavor.as_ref())
            .await?;
        match self.cache.main_ip() {
            Some(address) => Ok(address.to_owned()),
            None => Err(DriverError::IpNotYetAvailable {
                instance_id: self.cache.require_id()?.to_owned(),
            }),
        }
    }

    /// Current canonical state, always fetched fresh.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::NotCreated`] without an instance id, or the
    /// provider failure.
    pub async fn state(&mut self) -> Result<CanonicalState, DriverError> {
        let record = self
            .cache
            .refresh(self.provider.as_ref(), self.flavor.as_ref())
            .await?;
        Ok(self.flavor.normalize(record))
    }

    /// Docker daemon URL, `tcp://<ip>:<docker-port>`.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::NotRunning`] unless the server is running, or
    /// any error of [`Driver::ip`].
    pub async fn url(&mut self) -> Result<String, DriverError> {
        let state = self.state().await?;
        if state != CanonicalState::Running {
            return Err(DriverError::NotRunning { state });
        }
        let address = self.ip().await?;
        Ok(docker_url(&address, self.settings.docker_port))
    }

    /// Host name to use for SSH, which is the main IP.
    ///
    /// # Errors
    ///
    /// See [`Driver::ip`].
    pub async fn ssh_hostname(&mut self) -> Result<String, DriverError> {
        self.ip().await
    }

    /// SSH port.
    #[must_use]
    pub const fn ssh_port(&self) -> u16 {
        self.settings.ssh_port
    }

    /// SSH login user.
    #[must_use]
    pub fn ssh_username(&self) -> &str {
        &self.settings.ssh_user
    }
}

/// Renders the Docker URL, bracketing IPv6 hosts.
#[must_use]
pub fn docker_url(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("tcp://[{host}]:{port}")
    } else {
        format!("tcp://{host}:{port}")
    }
}

#[cfg(test)]
mod tests;
