//! reqwest-backed client for the Vultr v2 REST API.

use std::time::Duration;

use reqwest::{Method, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, warn};

use super::{
    Account, Application, AvailabilityKind, BareMetalCreatePayload, FirewallGroup,
    FirewallRulePayload, InstanceCreatePayload, InstanceRecord, Iso, Network, OperatingSystem,
    ProviderApi, ProviderError, ProviderFuture, Region, Snapshot, SshKey, SshKeyPayload,
    StartupScript,
};
use crate::config::DEFAULT_API_BASE_URL;

const PER_PAGE: u32 = 500;

/// Retry policy for idempotent requests.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    /// Delay before the first retry; doubles for each later retry.
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    /// Delay to wait after the `retry`-th failed attempt (1-based).
    #[must_use]
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2_u32.saturating_pow(retry.saturating_sub(1));
        self.initial_backoff.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_backoff: Duration::from_millis(500),
        }
    }
}

/// Connection settings for [`VultrClient`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClientSettings {
    /// API base URL without a trailing slash.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Retry policy for GET requests.
    pub retry: RetryPolicy,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_owned(),
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

/// Vultr API client authenticated with a bearer API key.
#[derive(Clone, Debug)]
pub struct VultrClient {
    http: reqwest::Client,
    api_key: String,
    settings: ClientSettings,
}

impl VultrClient {
    /// Builds a client.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Transport`] when the HTTP client cannot be
    /// constructed (for example when the TLS backend fails to initialise).
    pub fn new(api_key: impl Into<String>, settings: ClientSettings) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|err| ProviderError::Transport {
                resource: settings.base_url.clone(),
                message: err.to_string(),
            })?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            settings,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.settings.base_url)
    }

    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value, ProviderError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.get_once(path, query).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.settings.retry.attempts => {
                    let delay = self.settings.retry.backoff(attempt);
                    warn!(
                        resource = path,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "retrying provider request"
                    );
                    sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn get_once(&self, path: &str, query: &[(&str, String)]) -> Result<Value, ProviderError> {
        let response = self
            .http
            .get(self.url(path))
            .bearer_auth(&self.api_key)
            .query(query)
            .send()
            .await
            .map_err(|err| transport(path, &err))?;
        read_json(path, response).await
    }

    async fn send_json<B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Value, ProviderError>
    where
        B: Serialize + Sync + ?Sized,
    {
        debug!(method = %method, resource = path, "provider call");
        let mut request = self
            .http
            .request(method, self.url(path))
            .bearer_auth(&self.api_key);
        if let Some(payload) = body {
            request = request.json(payload);
        }
        let response = request.send().await.map_err(|err| transport(path, &err))?;
        read_json(path, response).await
    }

    async fn post_empty(&self, path: &str) -> Result<(), ProviderError> {
        self.send_json::<Value>(Method::POST, path, None).await?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), ProviderError> {
        self.send_json::<Value>(Method::DELETE, path, None).await?;
        Ok(())
    }

    async fn fetch<T: DeserializeOwned>(&self, path: &str, key: &str) -> Result<T, ProviderError> {
        let body = self.get_json(path, &[]).await?;
        take_field(path, key, body)
    }

    async fn list<T: DeserializeOwned>(&self, path: &str, key: &str) -> Result<Vec<T>, ProviderError> {
        let mut items = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut query = vec![("per_page", PER_PAGE.to_string())];
            if let Some(next) = cursor.take() {
                query.push(("cursor", next));
            }
            let body = self.get_json(path, &query).await?;
            let (page, next) = parse_page::<T>(path, key, body)?;
            items.extend(page);
            match next {
                Some(next) => cursor = Some(next),
                None => return Ok(items),
            }
        }
    }
}

async fn read_json(path: &str, response: Response) -> Result<Value, ProviderError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::from_status(
            status.as_u16(),
            path,
            error_message(&body),
        ));
    }
    if status == StatusCode::NO_CONTENT {
        return Ok(Value::Null);
    }
    let body = response
        .text()
        .await
        .map_err(|err| transport(path, &err))?;
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&body).map_err(|err| ProviderError::Decode {
        resource: path.to_owned(),
        message: err.to_string(),
    })
}

fn transport(path: &str, err: &reqwest::Error) -> ProviderError {
    ProviderError::Transport {
        resource: path.to_owned(),
        message: err.to_string(),
    }
}

/// Extracts the `error` string Vultr puts in failure bodies.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("error")
                .and_then(Value::as_str)
                .map(str::to_owned)
        })
        .unwrap_or_else(|| body.trim().to_owned())
}

fn take_field<T: DeserializeOwned>(path: &str, key: &str, body: Value) -> Result<T, ProviderError> {
    let Value::Object(mut object) = body else {
        return Err(ProviderError::Decode {
            resource: path.to_owned(),
            message: String::from("expected a JSON object"),
        });
    };
    let field = object.remove(key).ok_or_else(|| ProviderError::Decode {
        resource: path.to_owned(),
        message: format!("missing `{key}` field"),
    })?;
    serde_json::from_value(field).map_err(|err| ProviderError::Decode {
        resource: path.to_owned(),
        message: err.to_string(),
    })
}

fn parse_page<T: DeserializeOwned>(
    path: &str,
    key: &str,
    body: Value,
) -> Result<(Vec<T>, Option<String>), ProviderError> {
    let next = body
        .pointer("/meta/links/next")
        .and_then(Value::as_str)
        .filter(|cursor| !cursor.is_empty())
        .map(str::to_owned);
    let items = take_field(path, key, body)?;
    Ok((items, next))
}

impl ProviderApi for VultrClient {
    fn account(&self) -> ProviderFuture<'_, Account> {
        Box::pin(async move { self.fetch("/account", "account").await })
    }

    fn list_os(&self) -> ProviderFuture<'_, Vec<OperatingSystem>> {
        Box::pin(async move { self.list("/os", "os").await })
    }

    fn list_regions(&self) -> ProviderFuture<'_, Vec<Region>> {
        Box::pin(async move { self.list("/regions", "regions").await })
    }

    fn list_available_plans<'a>(
        &'a self,
        region: &'a str,
        kind: AvailabilityKind,
    ) -> ProviderFuture<'a, Vec<String>> {
        Box::pin(async move {
            let path = format!("/regions/{region}/availability");
            let body = self
                .get_json(&path, &[("type", kind.as_query().to_owned())])
                .await?;
            take_field(&path, "available_plans", body)
        })
    }

    fn list_snapshots(&self) -> ProviderFuture<'_, Vec<Snapshot>> {
        Box::pin(async move { self.list("/snapshots", "snapshots").await })
    }

    fn list_isos(&self) -> ProviderFuture<'_, Vec<Iso>> {
        Box::pin(async move { self.list("/iso", "isos").await })
    }

    fn list_applications(&self) -> ProviderFuture<'_, Vec<Application>> {
        Box::pin(async move { self.list("/applications", "applications").await })
    }

    fn list_startup_scripts(&self) -> ProviderFuture<'_, Vec<StartupScript>> {
        Box::pin(async move { self.list("/startup-scripts", "startup_scripts").await })
    }

    fn list_networks(&self) -> ProviderFuture<'_, Vec<Network>> {
        Box::pin(async move { self.list("/vpcs", "vpcs").await })
    }

    fn list_firewall_groups(&self) -> ProviderFuture<'_, Vec<FirewallGroup>> {
        Box::pin(async move { self.list("/firewalls", "firewall_groups").await })
    }

    fn list_ssh_keys(&self) -> ProviderFuture<'_, Vec<SshKey>> {
        Box::pin(async move { self.list("/ssh-keys", "ssh_keys").await })
    }

    fn create_ssh_key<'a>(&'a self, payload: &'a SshKeyPayload) -> ProviderFuture<'a, SshKey> {
        Box::pin(async move {
            let body = self
                .send_json(Method::POST, "/ssh-keys", Some(payload))
                .await?;
            take_field("/ssh-keys", "ssh_key", body)
        })
    }

    fn create_instance<'a>(
        &'a self,
        payload: &'a InstanceCreatePayload,
    ) -> ProviderFuture<'a, InstanceRecord> {
        Box::pin(async move {
            let body = self
                .send_json(Method::POST, "/instances", Some(payload))
                .await?;
            take_field("/instances", "instance", body)
        })
    }

    fn get_instance<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, InstanceRecord> {
        Box::pin(async move { self.fetch(&format!("/instances/{id}"), "instance").await })
    }

    fn start_instance<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, ()> {
        Box::pin(async move { self.post_empty(&format!("/instances/{id}/start")).await })
    }

    fn halt_instance<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, ()> {
        Box::pin(async move { self.post_empty(&format!("/instances/{id}/halt")).await })
    }

    fn reboot_instance<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, ()> {
        Box::pin(async move { self.post_empty(&format!("/instances/{id}/reboot")).await })
    }

    fn delete_instance<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, ()> {
        Box::pin(async move { self.delete(&format!("/instances/{id}")).await })
    }

    fn create_bare_metal<'a>(
        &'a self,
        payload: &'a BareMetalCreatePayload,
    ) -> ProviderFuture<'a, InstanceRecord> {
        Box::pin(async move {
            let body = self
                .send_json(Method::POST, "/bare-metals", Some(payload))
                .await?;
            take_field("/bare-metals", "bare_metal", body)
        })
    }

    fn get_bare_metal<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, InstanceRecord> {
        Box::pin(async move { self.fetch(&format!("/bare-metals/{id}"), "bare_metal").await })
    }

    fn start_bare_metal<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, ()> {
        Box::pin(async move { self.post_empty(&format!("/bare-metals/{id}/start")).await })
    }

    fn halt_bare_metal<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, ()> {
        Box::pin(async move { self.post_empty(&format!("/bare-metals/{id}/halt")).await })
    }

    fn reboot_bare_metal<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, ()> {
        Box::pin(async move { self.post_empty(&format!("/bare-metals/{id}/reboot")).await })
    }

    fn delete_bare_metal<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, ()> {
        Box::pin(async move { self.delete(&format!("/bare-metals/{id}")).await })
    }

    fn create_firewall_rule<'a>(
        &'a self,
        group_id: &'a str,
        payload: &'a FirewallRulePayload,
    ) -> ProviderFuture<'a, u64> {
        Box::pin(async move {
            let path = format!("/firewalls/{group_id}/rules");
            let body = self.send_json(Method::POST, &path, Some(payload)).await?;
            let rule: Value = take_field(&path, "firewall_rule", body)?;
            rule.get("id")
                .and_then(Value::as_u64)
                .ok_or_else(|| ProviderError::Decode {
                    resource: path,
                    message: String::from("firewall rule id missing"),
                })
        })
    }

    fn delete_firewall_rule<'a>(
        &'a self,
        group_id: &'a str,
        rule_id: u64,
    ) -> ProviderFuture<'a, ()> {
        Box::pin(async move {
            self.delete(&format!("/firewalls/{group_id}/rules/{rule_id}"))
                .await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(1, 100)]
    #[case(2, 200)]
    #[case(3, 400)]
    fn backoff_doubles(#[case] retry: u32, #[case] expected_ms: u64) {
        let policy = RetryPolicy {
            attempts: 4,
            initial_backoff: Duration::from_millis(100),
        };
        assert_eq!(policy.backoff(retry), Duration::from_millis(expected_ms));
    }

    #[test]
    fn urls_join_base_and_path() {
        let client = VultrClient::new(
            "key",
            ClientSettings {
                base_url: String::from("http://127.0.0.1:9"),
                ..ClientSettings::default()
            },
        )
        .expect("client builds");
        assert_eq!(client.url("/os"), "http://127.0.0.1:9/os");
    }

    #[test]
    fn parses_page_with_next_cursor() {
        let body = json!({
            "os": [{"id": 445, "name": "Ubuntu", "family": "ubuntu"}],
            "meta": {"total": 2, "links": {"next": "abc", "prev": ""}}
        });
        let (page, next) =
            parse_page::<OperatingSystem>("/os", "os", body).expect("page parses");
        assert_eq!(page.len(), 1);
        assert_eq!(next.as_deref(), Some("abc"));
    }

    #[test]
    fn last_page_has_no_cursor() {
        let body = json!({
            "regions": [],
            "meta": {"total": 0, "links": {"next": "", "prev": ""}}
        });
        let (page, next) = parse_page::<Region>("/regions", "regions", body).expect("page parses");
        assert!(page.is_empty());
        assert_eq!(next, None);
    }

    #[test]
    fn missing_field_is_a_decode_error() {
        let err = take_field::<Vec<Region>>("/regions", "regions", json!({"other": []}))
            .expect_err("missing key");
        assert!(matches!(err, ProviderError::Decode { .. }));
    }

    #[rstest]
    #[case(r#"{"error":"Invalid API token.","status":401}"#, "Invalid API token.")]
    #[case("  plain text  ", "plain text")]
    fn extracts_error_messages(#[case] body: &str, #[case] expected: &str) {
        assert_eq!(error_message(body), expected);
    }
}
