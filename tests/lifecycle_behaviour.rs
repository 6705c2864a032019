//! End-to-end behaviour of a machine: resolve, validate, create, persist,
//! reload and tear down against the scripted provider.

#[path = "common/test_constants.rs"]
mod test_constants;

use std::sync::Arc;
use std::time::Duration;

use camino::Utf8PathBuf;
use rstest::*;
use tempfile::TempDir;
use vultr_machine::driver::{Driver, DriverError, ReadinessPolicy};
use vultr_machine::flags::{self, FlagValue, OptionMap};
use vultr_machine::preflight::Preflight;
use vultr_machine::record::{MachineStore, RecordError};
use vultr_machine::resolver::{ResolvedMachine, resolve};
use vultr_machine::state::CanonicalState;
use vultr_machine::test_support::{
    FAKE_INSTANCE_ID, FAKE_SSH_KEY_ID, FakeProvider, StaticKeySource,
};

use test_constants::{API_KEY, MACHINE_NAME, READY_IP};

const FAST: ReadinessPolicy = ReadinessPolicy {
    interval: Duration::from_millis(1),
    max_attempts: 5,
};

struct Workspace {
    _tmp: TempDir,
    store: MachineStore,
}

#[fixture]
fn workspace() -> Workspace {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let root = Utf8PathBuf::from_path_buf(tmp.path().join("machines"))
        .unwrap_or_else(|path| panic!("temp dir should be utf8: {}", path.display()));
    Workspace {
        store: MachineStore::new(root.as_str()),
        _tmp: tmp,
    }
}

fn resolved(extra: &[(&str, FlagValue)]) -> ResolvedMachine {
    let mut options = OptionMap::new()
        .with(flags::API_KEY, FlagValue::String(String::from(API_KEY)))
        .unwrap_or_else(|err| panic!("set api key: {err}"));
    for (name, value) in extra {
        options
            .set(name, value.clone())
            .unwrap_or_else(|err| panic!("set --{name}: {err}"));
    }
    resolve(&options, MACHINE_NAME).unwrap_or_else(|err| panic!("resolve: {err}"))
}

async fn create(provider: &FakeProvider, machine: ResolvedMachine) -> Driver {
    let validated = Preflight::new(provider)
        .validate(machine.request)
        .await
        .unwrap_or_else(|err| panic!("pre-flight should pass: {err}"));
    let mut driver = Driver::new(
        Arc::new(provider.clone()),
        validated.request().server_type,
        machine.settings,
    )
    .with_readiness(FAST)
    .with_key_source(StaticKeySource::default());
    driver
        .create(validated)
        .await
        .unwrap_or_else(|err| panic!("create should succeed: {err}"));
    driver
}

fn boot_sequence(provider: &FakeProvider) {
    provider.push_status("0.0.0.0", "pending", None, None);
    provider.push_status(READY_IP, "active", Some("running"), Some("installingbooting"));
    provider.push_status(READY_IP, "active", Some("running"), Some("ok"));
}

#[rstest]
#[tokio::test]
async fn created_machine_reports_endpoints_and_survives_reload(workspace: Workspace) {
    let provider = FakeProvider::with_default_catalog();
    boot_sequence(&provider);

    let mut driver = create(&provider, resolved(&[])).await;

    assert_eq!(provider.call_count("get_instance"), 3);
    assert_eq!(
        driver.ip().await.unwrap_or_else(|err| panic!("ip: {err}")),
        READY_IP
    );
    assert_eq!(
        driver.url().await.unwrap_or_else(|err| panic!("url: {err}")),
        format!("tcp://{READY_IP}:2376")
    );

    workspace
        .store
        .save(&driver.record())
        .unwrap_or_else(|err| panic!("save record: {err}"));
    let record = workspace
        .store
        .load(MACHINE_NAME)
        .unwrap_or_else(|err| panic!("load record: {err}"));
    assert_eq!(record.instance_id.as_deref(), Some(FAKE_INSTANCE_ID));
    assert_eq!(record.ip_address.as_deref(), Some(READY_IP));
    assert_eq!(record.ssh_key_ids, vec![FAKE_SSH_KEY_ID.to_owned()]);

    let later = FakeProvider::new();
    later.push_status(READY_IP, "active", Some("stopped"), Some("ok"));
    let mut reloaded = Driver::from_record(Arc::new(later.clone()), &record).with_readiness(FAST);

    assert_eq!(
        reloaded.ssh_hostname().await.unwrap_or_else(|err| panic!("ssh host: {err}")),
        READY_IP
    );
    assert_eq!(reloaded.ssh_port(), 22);
    assert_eq!(reloaded.ssh_username(), "root");
    assert!(later.calls().is_empty(), "cached IP should avoid a fetch");

    assert_eq!(
        reloaded.state().await.unwrap_or_else(|err| panic!("state: {err}")),
        CanonicalState::Stopped
    );
    let Err(error) = reloaded.url().await else {
        panic!("url of a stopped machine should fail");
    };
    assert!(matches!(
        error,
        DriverError::NotRunning {
            state: CanonicalState::Stopped
        }
    ));

    reloaded
        .start()
        .await
        .unwrap_or_else(|err| panic!("start: {err}"));
    assert_eq!(later.call_count("start_instance"), 1);
}

#[rstest]
#[tokio::test]
async fn removal_deletes_server_rule_and_record(workspace: Workspace) {
    let provider = FakeProvider::with_default_catalog().with_firewall_group("fw-1");
    boot_sequence(&provider);
    let machine = resolved(&[
        (
            flags::FIREWALL_GROUP_ID,
            FlagValue::String(String::from("fw-1")),
        ),
        (flags::OPEN_DOCKER_PORT, FlagValue::Bool(true)),
    ]);

    let mut driver = create(&provider, machine).await;
    let record = driver.record();
    assert_eq!(record.firewall_rule_id, Some(1));
    let rules = provider.firewall_rules();
    assert_eq!(
        rules.first().map(|(group, rule)| (group.as_str(), rule.port.as_str())),
        Some(("fw-1", "2376"))
    );
    workspace
        .store
        .save(&record)
        .unwrap_or_else(|err| panic!("save record: {err}"));

    driver
        .remove()
        .await
        .unwrap_or_else(|err| panic!("remove: {err}"));
    workspace
        .store
        .forget(MACHINE_NAME)
        .unwrap_or_else(|err| panic!("forget: {err}"));

    let calls = provider.calls();
    let tail: Vec<&str> = calls.iter().rev().take(3).rev().map(String::as_str).collect();
    assert_eq!(
        tail,
        vec![
            "halt_instance:inst-0001",
            "delete_instance:inst-0001",
            "delete_firewall_rule:fw-1/1",
        ]
    );
    assert!(matches!(
        workspace.store.load(MACHINE_NAME),
        Err(RecordError::NotFound { .. })
    ));
    assert!(driver.instance_id().is_none());
}

#[tokio::test]
async fn bare_metal_machine_uses_bare_metal_endpoints() {
    let provider = FakeProvider::with_default_catalog();
    provider.push_status("0.0.0.0", "pending", None, None);
    provider.push_status(READY_IP, "active", None, None);

    let mut driver = create(
        &provider,
        resolved(&[(flags::SERVER_TYPE, FlagValue::Int(2))]),
    )
    .await;

    assert_eq!(provider.created_bare_metals().len(), 1);
    assert!(provider.created_instances().is_empty());
    assert_eq!(
        driver.state().await.unwrap_or_else(|err| panic!("state: {err}")),
        CanonicalState::Running
    );
    assert!(provider.call_count("get_bare_metal") >= 2);
    assert_eq!(provider.call_count("get_instance"), 0);
}
