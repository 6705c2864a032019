//! Unit tests for the lifecycle controller.

use std::sync::Arc;
use std::time::Duration;

use rstest::{fixture, rstest};

use super::*;
use crate::preflight::Preflight;
use crate::provider::ProviderError;
use crate::request::{InstanceRequestBuilder, OS_ID_CUSTOM};
use crate::test_support::{
    FAKE_INSTANCE_ID, FAKE_PUBLIC_KEY, FAKE_SSH_KEY_ID, FakeProvider, StaticKeySource,
};

const FAST: ReadinessPolicy = ReadinessPolicy {
    interval: Duration::from_millis(1),
    max_attempts: 4,
};

const READY_IP: &str = "203.0.113.5";

fn settings(open_docker_port: bool) -> DriverSettings {
    DriverSettings {
        machine_name: String::from("node-1"),
        docker_port: 2376,
        ssh_port: 22,
        ssh_user: String::from("root"),
        open_docker_port,
    }
}

fn request() -> InstanceRequestBuilder {
    InstanceRequest::builder()
        .region("ewr")
        .plan("vc2-1c-2gb")
        .os_id(445)
        .hostname("node-1")
        .label("node-1")
        .user_data("I2Nsb3VkLWNvbmZpZwo=")
}

async fn validate(provider: &FakeProvider, builder: InstanceRequestBuilder) -> ValidatedRequest {
    let request = builder
        .build()
        .unwrap_or_else(|err| panic!("request should build: {err}"));
    Preflight::new(provider)
        .validate(request)
        .await
        .unwrap_or_else(|err| panic!("pre-flight should pass: {err}"))
}

fn new_driver(provider: &FakeProvider, open_docker_port: bool) -> Driver {
    Driver::new(
        Arc::new(provider.clone()),
        ServerType::Standard,
        settings(open_docker_port),
    )
    .with_readiness(FAST)
}

fn existing_record() -> MachineRecord {
    MachineRecord {
        machine_name: String::from("node-1"),
        server_type: ServerType::Standard,
        instance_id: Some(FAKE_INSTANCE_ID.to_owned()),
        ip_address: None,
        internal_ip: None,
        docker_port: 2376,
        ssh_port: 22,
        ssh_user: String::from("root"),
        ssh_key_ids: vec![FAKE_SSH_KEY_ID.to_owned()],
        firewall_group_id: None,
        firewall_rule_id: None,
    }
}

#[fixture]
fn provider() -> FakeProvider {
    FakeProvider::with_default_catalog()
}

fn push_running(provider: &FakeProvider) {
    provider.push_status(READY_IP, "active", Some("running"), Some("ok"));
}

#[rstest]
#[tokio::test]
async fn create_registers_a_generated_key(provider: FakeProvider) {
    push_running(&provider);
    let keys = StaticKeySource::default();
    let mut driver = new_driver(&provider, false).with_key_source(keys.clone());

    driver
        .create(validate(&provider, request()).await)
        .await
        .unwrap_or_else(|err| panic!("create should succeed: {err}"));

    assert_eq!(keys.requests(), vec![String::from("node-1")]);
    let registered = provider.created_ssh_keys();
    let key = registered
        .first()
        .unwrap_or_else(|| panic!("no SSH key registered"));
    assert_eq!(key.ssh_key, FAKE_PUBLIC_KEY);
    let created = provider.created_instances();
    let payload = created
        .first()
        .unwrap_or_else(|| panic!("no instance created"));
    assert_eq!(payload.sshkey_id, vec![FAKE_SSH_KEY_ID.to_owned()]);

    let record = driver.record();
    assert_eq!(record.instance_id.as_deref(), Some(FAKE_INSTANCE_ID));
    assert_eq!(record.ip_address.as_deref(), Some(READY_IP));
    assert_eq!(record.ssh_key_ids, vec![FAKE_SSH_KEY_ID.to_owned()]);
}

#[rstest]
#[tokio::test]
async fn create_rechecks_supplied_keys(#[from(provider)] catalog: FakeProvider) {
    let provider = catalog.with_ssh_key("key-1");
    push_running(&provider);
    let keys = StaticKeySource::default();
    let mut driver = new_driver(&provider, false).with_key_source(keys.clone());

    driver
        .create(validate(&provider, request().ssh_key_ids(vec![String::from("key-1")])).await)
        .await
        .unwrap_or_else(|err| panic!("create should succeed: {err}"));

    assert!(keys.requests().is_empty());
    assert!(provider.created_ssh_keys().is_empty());
    assert_eq!(provider.call_count("list_ssh_keys"), 2);
    let created = provider.created_instances();
    assert_eq!(
        created.first().map(|payload| payload.sshkey_id.clone()),
        Some(vec![String::from("key-1")])
    );
}

#[rstest]
#[tokio::test]
async fn create_skips_keys_for_keyless_os_families(#[from(provider)] catalog: FakeProvider) {
    let provider = catalog.with_os(OS_ID_CUSTOM, "Custom", "iso");
    push_running(&provider);
    let keys = StaticKeySource::default();
    let mut driver = new_driver(&provider, false).with_key_source(keys.clone());

    driver
        .create(validate(&provider, request().os_id(OS_ID_CUSTOM)).await)
        .await
        .unwrap_or_else(|err| panic!("create should succeed: {err}"));

    assert!(keys.requests().is_empty());
    assert_eq!(provider.call_count("create_ssh_key"), 0);
}

#[rstest]
#[tokio::test]
async fn create_without_key_source_fails_before_creating(provider: FakeProvider) {
    let mut driver = new_driver(&provider, false);

    let err = driver
        .create(validate(&provider, request()).await)
        .await
        .expect_err("create needs a key source");

    assert!(matches!(err, DriverError::MissingKeySource));
    assert_eq!(provider.call_count("create_instance"), 0);
    assert_eq!(driver.instance_id(), None);
}

#[rstest]
#[tokio::test]
async fn bare_metal_uses_bare_metal_endpoints(provider: FakeProvider) {
    provider.push_status("198.51.100.7", "pending", None, None);
    let mut driver = new_driver(&provider, false).with_key_source(StaticKeySource::default());

    driver
        .create(validate(&provider, request().server_type(ServerType::BareMetal)).await)
        .await
        .unwrap_or_else(|err| panic!("create should succeed: {err}"));

    assert_eq!(provider.created_bare_metals().len(), 1);
    assert!(provider.created_instances().is_empty());
    assert_eq!(provider.call_count("get_bare_metal"), 1);
    assert_eq!(driver.server_type(), ServerType::BareMetal);
    assert_eq!(driver.record().server_type, ServerType::BareMetal);
}

#[rstest]
#[tokio::test]
async fn readiness_timeout_keeps_the_instance_id(provider: FakeProvider) {
    provider.push_status(READY_IP, "active", Some("running"), Some("installingbooting"));
    let mut driver = new_driver(&provider, false).with_key_source(StaticKeySource::default());

    let err = driver
        .create(validate(&provider, request()).await)
        .await
        .expect_err("create should time out");

    assert!(matches!(
        err,
        DriverError::ReadinessTimeout {
            attempts: 4,
            last_state: CanonicalState::Starting,
            ..
        }
    ));
    assert!(!err.is_transient());
    assert_eq!(driver.instance_id(), Some(FAKE_INSTANCE_ID));
    assert_eq!(driver.record().ip_address.as_deref(), Some(READY_IP));
}

#[rstest]
#[tokio::test]
async fn create_until_honours_the_deadline(provider: FakeProvider) {
    provider.push_status("0.0.0.0", "pending", None, None);
    let mut driver = new_driver(&provider, false)
        .with_key_source(StaticKeySource::default())
        .with_readiness(ReadinessPolicy {
            interval: Duration::from_secs(30),
            max_attempts: 1_000,
        });

    let err = driver
        .create_until(
            validate(&provider, request()).await,
            Instant::now() + Duration::from_millis(50),
        )
        .await
        .expect_err("deadline should abort create");

    assert!(matches!(err, DriverError::ReadinessTimeout { attempts: 1, .. }));
}

#[rstest]
#[tokio::test]
async fn create_twice_is_rejected(provider: FakeProvider) {
    let mut driver = Driver::from_record(Arc::new(provider.clone()), &existing_record());

    let err = driver
        .create(validate(&provider, request()).await)
        .await
        .expect_err("second create should fail");

    assert!(matches!(err, DriverError::AlreadyCreated { .. }));
    assert_eq!(provider.call_count("create_instance"), 0);
}

#[rstest]
#[tokio::test]
async fn docker_port_rule_is_opened_and_removed(#[from(provider)] catalog: FakeProvider) {
    let provider = catalog.with_firewall_group("fw-1");
    push_running(&provider);
    let mut driver = new_driver(&provider, true).with_key_source(StaticKeySource::default());

    driver
        .create(validate(&provider, request().firewall_group_id("fw-1")).await)
        .await
        .unwrap_or_else(|err| panic!("create should succeed: {err}"));

    let rules = provider.firewall_rules();
    let (group, rule) = rules
        .first()
        .unwrap_or_else(|| panic!("no firewall rule created"));
    assert_eq!(group, "fw-1");
    assert_eq!(rule.port, "2376");
    assert_eq!(rule.protocol, "tcp");
    assert_eq!(driver.record().firewall_rule_id, Some(1));

    driver
        .remove()
        .await
        .unwrap_or_else(|err| panic!("remove should succeed: {err}"));
    let calls = provider.calls();
    assert!(calls.contains(&format!("halt_instance:{FAKE_INSTANCE_ID}")));
    assert!(calls.contains(&format!("delete_instance:{FAKE_INSTANCE_ID}")));
    assert!(calls.contains(&String::from("delete_firewall_rule:fw-1/1")));
    assert_eq!(driver.instance_id(), None);
}

#[rstest]
#[tokio::test]
async fn docker_port_needs_a_firewall_group(provider: FakeProvider) {
    push_running(&provider);
    let mut driver = new_driver(&provider, true).with_key_source(StaticKeySource::default());

    driver
        .create(validate(&provider, request()).await)
        .await
        .unwrap_or_else(|err| panic!("create should succeed: {err}"));

    assert!(provider.firewall_rules().is_empty());
    assert_eq!(driver.record().firewall_rule_id, None);
}

#[rstest]
#[tokio::test]
async fn remove_ignores_firewall_rule_failures(provider: FakeProvider) {
    provider.push_status(READY_IP, "active", Some("stopped"), Some("ok"));
    let record = MachineRecord {
        firewall_group_id: Some(String::from("fw-1")),
        firewall_rule_id: Some(7),
        ..existing_record()
    };
    provider.fail_next(
        "delete_firewall_rule",
        ProviderError::NotFound {
            resource: String::from("firewall rule 7"),
        },
    );
    let mut driver = Driver::from_record(Arc::new(provider.clone()), &record);

    driver
        .remove()
        .await
        .unwrap_or_else(|err| panic!("remove should succeed: {err}"));

    assert_eq!(provider.call_count("halt_instance"), 0);
    assert_eq!(provider.call_count("delete_instance"), 1);
    assert_eq!(provider.call_count("delete_firewall_rule"), 1);
}

#[rstest]
#[tokio::test]
async fn remove_propagates_stop_failures(provider: FakeProvider) {
    push_running(&provider);
    provider.fail_next(
        "halt_instance",
        ProviderError::Api {
            status: 400,
            resource: String::from("instance"),
            message: String::from("locked"),
        },
    );
    let mut driver = Driver::from_record(Arc::new(provider.clone()), &existing_record());

    let err = driver.remove().await.expect_err("remove should fail");

    assert!(matches!(err, DriverError::Provider(ProviderError::Api { status: 400, .. })));
    assert_eq!(provider.call_count("delete_instance"), 0);
    assert_eq!(driver.instance_id(), Some(FAKE_INSTANCE_ID));
}

#[rstest]
#[tokio::test]
async fn remove_without_instance_is_a_no_op(provider: FakeProvider) {
    let mut driver = new_driver(&provider, false);

    driver
        .remove()
        .await
        .unwrap_or_else(|err| panic!("remove should succeed: {err}"));

    assert!(provider.calls().is_empty());
}

#[rstest]
#[case::running("active", Some("running"), Some("ok"), 0)]
#[case::booting("active", Some("running"), Some("installingbooting"), 0)]
#[case::pending("pending", None, None, 0)]
#[case::stopped("active", Some("stopped"), Some("ok"), 1)]
#[case::suspended("suspended", None, None, 1)]
#[tokio::test]
async fn start_short_circuits_when_up(
    #[case] status: &str,
    #[case] power: Option<&str>,
    #[case] server: Option<&str>,
    #[case] start_calls: usize,
) {
    let provider = FakeProvider::new();
    provider.push_status(READY_IP, status, power, server);
    let mut driver = Driver::from_record(Arc::new(provider.clone()), &existing_record());

    driver
        .start()
        .await
        .unwrap_or_else(|err| panic!("start should succeed: {err}"));

    assert_eq!(provider.call_count("start_instance"), start_calls);
}

#[rstest]
#[case::running("active", Some("running"), Some("ok"), 1)]
#[case::booting("active", Some("running"), Some("installingbooting"), 1)]
#[case::stopped("active", Some("stopped"), Some("ok"), 0)]
#[tokio::test]
async fn stop_and_kill_halt_unless_stopped(
    #[case] status: &str,
    #[case] power: Option<&str>,
    #[case] server: Option<&str>,
    #[case] halt_calls: usize,
) {
    let provider = FakeProvider::new();
    provider.push_status(READY_IP, status, power, server);
    let mut driver = Driver::from_record(Arc::new(provider.clone()), &existing_record());

    driver
        .stop()
        .await
        .unwrap_or_else(|err| panic!("stop should succeed: {err}"));
    driver
        .kill()
        .await
        .unwrap_or_else(|err| panic!("kill should succeed: {err}"));

    assert_eq!(provider.call_count("halt_instance"), halt_calls * 2);
}

#[rstest]
#[case::running("active", Some("running"), Some("ok"), 1)]
#[case::booting("active", Some("running"), Some("installingbooting"), 0)]
#[case::stopped("active", Some("stopped"), Some("ok"), 0)]
#[tokio::test]
async fn restart_skips_stopped_and_starting(
    #[case] status: &str,
    #[case] power: Option<&str>,
    #[case] server: Option<&str>,
    #[case] reboot_calls: usize,
) {
    let provider = FakeProvider::new();
    provider.push_status(READY_IP, status, power, server);
    let mut driver = Driver::from_record(Arc::new(provider.clone()), &existing_record());

    driver
        .restart()
        .await
        .unwrap_or_else(|err| panic!("restart should succeed: {err}"));

    assert_eq!(provider.call_count("reboot_instance"), reboot_calls);
}

#[tokio::test]
async fn power_operations_refetch_state_every_time() {
    let provider = FakeProvider::new();
    provider.push_status(READY_IP, "active", Some("running"), Some("ok"));
    provider.push_status(READY_IP, "active", Some("stopped"), Some("ok"));
    let mut driver = Driver::from_record(Arc::new(provider.clone()), &existing_record());

    driver
        .start()
        .await
        .unwrap_or_else(|err| panic!("start should succeed: {err}"));
    driver
        .start()
        .await
        .unwrap_or_else(|err| panic!("start should succeed: {err}"));

    assert_eq!(provider.call_count("get_instance"), 2);
    assert_eq!(provider.call_count("start_instance"), 1);
}

#[tokio::test]
async fn bare_metal_power_operations_use_metal_endpoints() {
    let provider = FakeProvider::new();
    provider.push_status("198.51.100.7", "active", None, None);
    let record = MachineRecord {
        server_type: ServerType::BareMetal,
        ..existing_record()
    };
    let mut driver = Driver::from_record(Arc::new(provider.clone()), &record);

    driver
        .restart()
        .await
        .unwrap_or_else(|err| panic!("restart should succeed: {err}"));

    assert_eq!(provider.call_count("get_bare_metal"), 1);
    assert_eq!(provider.call_count("reboot_bare_metal"), 1);
    assert_eq!(provider.call_count("get_instance"), 0);
}

#[tokio::test]
async fn operations_need_an_instance() {
    let provider = FakeProvider::new();
    let mut driver = new_driver(&provider, false);

    assert!(matches!(driver.start().await, Err(DriverError::NotCreated)));
    assert!(matches!(driver.state().await, Err(DriverError::NotCreated)));
    assert!(matches!(driver.ip().await, Err(DriverError::NotCreated)));
}

#[tokio::test]
async fn ip_uses_the_cached_address() {
    let provider = FakeProvider::new();
    let record = MachineRecord {
        ip_address: Some(String::from(READY_IP)),
        ..existing_record()
    };
    let mut driver = Driver::from_record(Arc::new(provider.clone()), &record);

    let address = driver
        .ip()
        .await
        .unwrap_or_else(|err| panic!("ip should succeed: {err}"));

    assert_eq!(address, READY_IP);
    assert!(provider.calls().is_empty());
}

#[tokio::test]
async fn ip_reports_a_transient_error_until_assigned() {
    let provider = FakeProvider::new();
    provider.push_status("0.0.0.0", "pending", None, None);
    provider.push_status(READY_IP, "pending", None, None);
    let mut driver = Driver::from_record(Arc::new(provider.clone()), &existing_record());

    let err = driver.ip().await.expect_err("IP should not be assigned yet");
    assert!(matches!(err, DriverError::IpNotYetAvailable { .. }));
    assert!(err.is_transient());

    let address = driver
        .ip()
        .await
        .unwrap_or_else(|err| panic!("ip should succeed: {err}"));
    assert_eq!(address, READY_IP);
}

#[tokio::test]
async fn url_requires_a_running_server() {
    let provider = FakeProvider::new();
    provider.push_status(READY_IP, "active", Some("stopped"), Some("ok"));
    push_running(&provider);
    let mut driver = Driver::from_record(Arc::new(provider.clone()), &existing_record());

    let err = driver.url().await.expect_err("stopped server has no URL");
    assert!(matches!(
        err,
        DriverError::NotRunning {
            state: CanonicalState::Stopped
        }
    ));

    let url = driver
        .url()
        .await
        .unwrap_or_else(|err| panic!("url should succeed: {err}"));
    assert_eq!(url, format!("tcp://{READY_IP}:2376"));
}

#[rstest]
#[case("203.0.113.5", 2376, "tcp://203.0.113.5:2376")]
#[case("2001:db8::1", 2376, "tcp://[2001:db8::1]:2376")]
fn docker_url_brackets_ipv6(#[case] host: &str, #[case] port: u16, #[case] expected: &str) {
    assert_eq!(docker_url(host, port), expected);
}

#[tokio::test]
async fn ssh_details_come_from_settings_and_ip() {
    let provider = FakeProvider::new();
    push_running(&provider);
    let record = MachineRecord {
        ssh_port: 2222,
        ssh_user: String::from("ubuntu"),
        ..existing_record()
    };
    let mut driver = Driver::from_record(Arc::new(provider.clone()), &record);

    let host = driver
        .ssh_hostname()
        .await
        .unwrap_or_else(|err| panic!("ssh hostname should resolve: {err}"));

    assert_eq!(host, READY_IP);
    assert_eq!(driver.ssh_port(), 2222);
    assert_eq!(driver.ssh_username(), "ubuntu");
}

#[test]
fn record_round_trips_through_the_driver() {
    let record = MachineRecord {
        ip_address: Some(String::from(READY_IP)),
        internal_ip: Some(String::from("10.0.0.4")),
        firewall_group_id: Some(String::from("fw-1")),
        firewall_rule_id: Some(3),
        ..existing_record()
    };
    let driver = Driver::from_record(Arc::new(FakeProvider::new()), &record);
    assert_eq!(driver.record(), record);
}
