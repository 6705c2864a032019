//! Single cached view of the provisioned server.

use super::error::DriverError;
use super::flavor::ServerFlavor;
use crate::provider::{InstanceRecord, ProviderApi};
use crate::state::main_ip_is_set;

/// Last known provider record plus the id it belongs to.
///
/// There is exactly one cache per driver. It is only ever written by
/// [`InstanceCache::store`] and [`InstanceCache::refresh`], so the id, IP and
/// status fields never drift apart.
#[derive(Clone, Debug, Default)]
pub(crate) struct InstanceCache {
    id: Option<String>,
    record: Option<InstanceRecord>,
}

impl InstanceCache {
    /// Rebuilds a cache from persisted identifiers.
    pub(crate) fn restore(
        id: Option<String>,
        main_ip: Option<String>,
        internal_ip: Option<String>,
    ) -> Self {
        let record = id.as_ref().map(|instance_id| InstanceRecord {
            id: instance_id.clone(),
            main_ip: main_ip.unwrap_or_default(),
            internal_ip,
            ..InstanceRecord::default()
        });
        Self { id, record }
    }

    pub(crate) fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub(crate) fn require_id(&self) -> Result<&str, DriverError> {
        self.id().ok_or(DriverError::NotCreated)
    }

    /// Main IP, if the provider has assigned one.
    pub(crate) fn main_ip(&self) -> Option<&str> {
        self.record
            .as_ref()
            .map(|record| record.main_ip.as_str())
            .filter(|address| main_ip_is_set(address))
    }

    pub(crate) fn internal_ip(&self) -> Option<&str> {
        self.record
            .as_ref()
            .and_then(|record| record.internal_ip.as_deref())
            .filter(|address| !address.is_empty())
    }

    /// Replaces the cached record. An empty id in `record` keeps the known id.
    pub(crate) fn store(&mut self, record: &InstanceRecord) {
        if !record.id.is_empty() {
            self.id = Some(record.id.clone());
        }
        self.record = Some(record.clone());
    }

    /// Fetches the current record and caches it.
    pub(crate) async fn refresh(
        &mut self,
        provider: &dyn ProviderApi,
        flavor: &dyn ServerFlavor,
    ) -> Result<&InstanceRecord, DriverError> {
        let id = self.require_id()?.to_owned();
        let record = flavor.fetch(provider, &id).await?;
        Ok(self.record.insert(record))
    }

    pub(crate) fn clear(&mut self) {
        self.id = None;
        self.record = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::flavor::StandardServer;
    use crate::test_support::{FAKE_INSTANCE_ID, FakeProvider};

    #[test]
    fn placeholder_ip_is_not_reported() {
        let cache = InstanceCache::restore(
            Some(String::from("i-1")),
            Some(String::from("0.0.0.0")),
            None,
        );
        assert_eq!(cache.id(), Some("i-1"));
        assert_eq!(cache.main_ip(), None);
    }

    #[test]
    fn empty_cache_has_no_id() {
        let cache = InstanceCache::default();
        assert!(matches!(cache.require_id(), Err(DriverError::NotCreated)));
    }

    #[tokio::test]
    async fn refresh_replaces_the_record() {
        let provider = FakeProvider::new();
        provider.push_status("203.0.113.5", "active", Some("running"), Some("ok"));
        let mut cache = InstanceCache::restore(Some(FAKE_INSTANCE_ID.to_owned()), None, None);

        let record = cache
            .refresh(&provider, &StandardServer)
            .await
            .unwrap_or_else(|err| panic!("refresh should succeed: {err}"));
        assert_eq!(record.status, "active");
        assert_eq!(cache.main_ip(), Some("203.0.113.5"));
    }
}
