//! Test support utilities shared across unit and integration tests.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::env;
use std::ffi::OsString;
use std::sync::{Arc, Mutex, MutexGuard as StdMutexGuard, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, MutexGuard};

use crate::driver::{KeyError, KeySource};
use crate::process::{CommandOutput, CommandRunner, ProcessError};
use crate::provider::{
    Account, Application, AvailabilityKind, BareMetalCreatePayload, FirewallGroup,
    FirewallRulePayload, InstanceCreatePayload, InstanceRecord, Iso, Network, OperatingSystem,
    ProviderApi, ProviderError, ProviderFuture, Region, Snapshot, SshKey, SshKeyPayload,
    StartupScript,
};

fn lock<T>(mutex: &Mutex<T>) -> StdMutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct FakeState {
    operating_systems: Vec<OperatingSystem>,
    regions: Vec<Region>,
    plans: HashMap<(String, &'static str), Vec<String>>,
    snapshots: Vec<Snapshot>,
    isos: Vec<Iso>,
    applications: Vec<Application>,
    scripts: Vec<StartupScript>,
    networks: Vec<Network>,
    firewall_groups: Vec<FirewallGroup>,
    ssh_keys: Vec<SshKey>,
    instance_states: VecDeque<InstanceRecord>,
    failures: HashMap<&'static str, VecDeque<ProviderError>>,
    calls: Vec<String>,
    created_instances: Vec<InstanceCreatePayload>,
    created_bare_metals: Vec<BareMetalCreatePayload>,
    created_ssh_keys: Vec<SshKeyPayload>,
    firewall_rules: Vec<(String, FirewallRulePayload)>,
    next_rule_id: u64,
}

/// Scripted in-memory [`ProviderApi`].
///
/// Catalogs are seeded with the `with_*` builders. Instance fetches replay the
/// records queued by [`FakeProvider::push_instance`] in FIFO order and keep
/// returning the last one once the queue drains. Clones share state, so a
/// test can keep one handle while the driver owns another.
#[derive(Clone, Debug, Default)]
pub struct FakeProvider {
    state: Arc<Mutex<FakeState>>,
}

/// Id returned by the fake create calls.
pub const FAKE_INSTANCE_ID: &str = "inst-0001";

/// Id returned by the fake SSH key create call.
pub const FAKE_SSH_KEY_ID: &str = "key-generated";

impl FakeProvider {
    /// Creates a provider with empty catalogs.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a provider whose catalogs accept the default flags: OS 445
    /// (`ubuntu`), region `ewr` with DDoS protection, and plan `vc2-1c-2gb`
    /// for every plan family.
    #[must_use]
    pub fn with_default_catalog() -> Self {
        let provider = Self::new()
            .with_os(445, "Ubuntu 22.04 x64", "ubuntu")
            .with_region("ewr", &["ddos_protection"]);
        for kind in [
            AvailabilityKind::All,
            AvailabilityKind::BareMetal,
            AvailabilityKind::DedicatedCloud,
        ] {
            provider.set_plans("ewr", kind, &["vc2-1c-2gb"]);
        }
        provider
    }

    /// Adds an operating system.
    #[must_use]
    pub fn with_os(self, id: u32, name: &str, family: &str) -> Self {
        lock(&self.state).operating_systems.push(OperatingSystem {
            id,
            name: name.to_owned(),
            family: family.to_owned(),
        });
        self
    }

    /// Adds a region with the given options.
    #[must_use]
    pub fn with_region(self, id: &str, options: &[&str]) -> Self {
        lock(&self.state).regions.push(Region {
            id: id.to_owned(),
            city: String::new(),
            options: options.iter().map(|option| (*option).to_owned()).collect(),
        });
        self
    }

    /// Sets the plans available in `region` for `kind`.
    pub fn set_plans(&self, region: &str, kind: AvailabilityKind, plans: &[&str]) {
        lock(&self.state).plans.insert(
            (region.to_owned(), kind.as_query()),
            plans.iter().map(|plan| (*plan).to_owned()).collect(),
        );
    }

    /// Adds a snapshot.
    #[must_use]
    pub fn with_snapshot(self, id: &str) -> Self {
        lock(&self.state).snapshots.push(Snapshot {
            id: id.to_owned(),
            description: String::new(),
        });
        self
    }

    /// Adds an ISO.
    #[must_use]
    pub fn with_iso(self, id: &str) -> Self {
        lock(&self.state).isos.push(Iso {
            id: id.to_owned(),
            filename: String::new(),
        });
        self
    }

    /// Adds a marketplace application.
    #[must_use]
    pub fn with_application(self, id: u32, image_id: &str) -> Self {
        lock(&self.state).applications.push(Application {
            id,
            name: String::new(),
            image_id: image_id.to_owned(),
        });
        self
    }

    /// Adds a startup script of type `kind`.
    #[must_use]
    pub fn with_script(self, id: &str, kind: &str) -> Self {
        lock(&self.state).scripts.push(StartupScript {
            id: id.to_owned(),
            name: String::new(),
            kind: kind.to_owned(),
        });
        self
    }

    /// Adds a private network.
    #[must_use]
    pub fn with_network(self, id: &str) -> Self {
        lock(&self.state).networks.push(Network {
            id: id.to_owned(),
            description: String::new(),
        });
        self
    }

    /// Adds a firewall group.
    #[must_use]
    pub fn with_firewall_group(self, id: &str) -> Self {
        lock(&self.state).firewall_groups.push(FirewallGroup {
            id: id.to_owned(),
            description: String::new(),
        });
        self
    }

    /// Adds a registered SSH key.
    #[must_use]
    pub fn with_ssh_key(self, id: &str) -> Self {
        lock(&self.state).ssh_keys.push(SshKey {
            id: id.to_owned(),
            name: String::new(),
        });
        self
    }

    /// Queues a record returned by the next instance or bare-metal fetch.
    pub fn push_instance(&self, record: InstanceRecord) {
        lock(&self.state).instance_states.push_back(record);
    }

    /// Queues a record built from the status triple.
    pub fn push_status(
        &self,
        main_ip: &str,
        status: &str,
        power_status: Option<&str>,
        server_status: Option<&str>,
    ) {
        self.push_instance(InstanceRecord {
            id: FAKE_INSTANCE_ID.to_owned(),
            main_ip: main_ip.to_owned(),
            v6_main_ip: None,
            internal_ip: None,
            status: status.to_owned(),
            power_status: power_status.map(str::to_owned),
            server_status: server_status.map(str::to_owned),
        });
    }

    /// Makes the next call named `call` fail with `error`.
    ///
    /// Call names match the [`ProviderApi`] method names.
    pub fn fail_next(&self, call: &'static str, error: ProviderError) {
        lock(&self.state)
            .failures
            .entry(call)
            .or_default()
            .push_back(error);
    }

    /// Calls made so far, as `name` or `name:argument`.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        lock(&self.state).calls.clone()
    }

    /// Returns how many recorded calls start with `prefix`.
    #[must_use]
    pub fn call_count(&self, prefix: &str) -> usize {
        lock(&self.state)
            .calls
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }

    /// Instance create payloads received.
    #[must_use]
    pub fn created_instances(&self) -> Vec<InstanceCreatePayload> {
        lock(&self.state).created_instances.clone()
    }

    /// Bare-metal create payloads received.
    #[must_use]
    pub fn created_bare_metals(&self) -> Vec<BareMetalCreatePayload> {
        lock(&self.state).created_bare_metals.clone()
    }

    /// SSH key payloads received.
    #[must_use]
    pub fn created_ssh_keys(&self) -> Vec<SshKeyPayload> {
        lock(&self.state).created_ssh_keys.clone()
    }

    /// Firewall rules created, keyed by group id.
    #[must_use]
    pub fn firewall_rules(&self) -> Vec<(String, FirewallRulePayload)> {
        lock(&self.state).firewall_rules.clone()
    }

    fn begin(&self, call: &'static str, argument: Option<&str>) -> Result<(), ProviderError> {
        let mut state = lock(&self.state);
        state.calls.push(argument.map_or_else(
            || call.to_owned(),
            |argument| format!("{call}:{argument}"),
        ));
        state
            .failures
            .get_mut(call)
            .and_then(VecDeque::pop_front)
            .map_or(Ok(()), Err)
    }

    fn respond<T: Send + 'static>(
        &self,
        call: &'static str,
        argument: Option<&str>,
        value: impl FnOnce(&mut FakeState) -> T,
    ) -> ProviderFuture<'static, T> {
        let result = self.begin(call, argument).map(|()| {
            let mut state = lock(&self.state);
            value(&mut state)
        });
        Box::pin(async move { result })
    }

    fn current_instance(state: &mut FakeState, id: &str) -> Result<InstanceRecord, ProviderError> {
        let record = if state.instance_states.len() > 1 {
            state.instance_states.pop_front()
        } else {
            state.instance_states.front().cloned()
        };
        record.ok_or_else(|| ProviderError::NotFound {
            resource: format!("instance {id}"),
        })
    }

    fn fetch(&self, call: &'static str, id: &str) -> ProviderFuture<'static, InstanceRecord> {
        let result = self.begin(call, Some(id)).and_then(|()| {
            let mut state = lock(&self.state);
            Self::current_instance(&mut state, id)
        });
        Box::pin(async move { result })
    }

    fn created_record() -> InstanceRecord {
        InstanceRecord {
            id: FAKE_INSTANCE_ID.to_owned(),
            main_ip: String::from("0.0.0.0"),
            status: String::from("pending"),
            ..InstanceRecord::default()
        }
    }
}

impl ProviderApi for FakeProvider {
    fn account(&self) -> ProviderFuture<'_, Account> {
        self.respond("account", None, |_| Account::default())
    }

    fn list_os(&self) -> ProviderFuture<'_, Vec<OperatingSystem>> {
        self.respond("list_os", None, |state| state.operating_systems.clone())
    }

    fn list_regions(&self) -> ProviderFuture<'_, Vec<Region>> {
        self.respond("list_regions", None, |state| state.regions.clone())
    }

    fn list_available_plans<'a>(
        &'a self,
        region: &'a str,
        kind: AvailabilityKind,
    ) -> ProviderFuture<'a, Vec<String>> {
        let key = (region.to_owned(), kind.as_query());
        let argument = format!("{region}/{kind}");
        self.respond("list_available_plans", Some(&argument), move |state| {
            state.plans.get(&key).cloned().unwrap_or_default()
        })
    }

    fn list_snapshots(&self) -> ProviderFuture<'_, Vec<Snapshot>> {
        self.respond("list_snapshots", None, |state| state.snapshots.clone())
    }

    fn list_isos(&self) -> ProviderFuture<'_, Vec<Iso>> {
        self.respond("list_isos", None, |state| state.isos.clone())
    }

    fn list_applications(&self) -> ProviderFuture<'_, Vec<Application>> {
        self.respond("list_applications", None, |state| state.applications.clone())
    }

    fn list_startup_scripts(&self) -> ProviderFuture<'_, Vec<StartupScript>> {
        self.respond("list_startup_scripts", None, |state| state.scripts.clone())
    }

    fn list_networks(&self) -> ProviderFuture<'_, Vec<Network>> {
        self.respond("list_networks", None, |state| state.networks.clone())
    }

    fn list_firewall_groups(&self) -> ProviderFuture<'_, Vec<FirewallGroup>> {
        self.respond("list_firewall_groups", None, |state| {
            state.firewall_groups.clone()
        })
    }

    fn list_ssh_keys(&self) -> ProviderFuture<'_, Vec<SshKey>> {
        self.respond("list_ssh_keys", None, |state| state.ssh_keys.clone())
    }

    fn create_ssh_key<'a>(&'a self, payload: &'a SshKeyPayload) -> ProviderFuture<'a, SshKey> {
        let payload = payload.clone();
        let name = payload.name.clone();
        self.respond("create_ssh_key", Some(&name), move |state| {
            let key = SshKey {
                id: FAKE_SSH_KEY_ID.to_owned(),
                name: payload.name.clone(),
            };
            state.created_ssh_keys.push(payload);
            state.ssh_keys.push(key.clone());
            key
        })
    }

    fn create_instance<'a>(
        &'a self,
        payload: &'a InstanceCreatePayload,
    ) -> ProviderFuture<'a, InstanceRecord> {
        let payload = payload.clone();
        self.respond("create_instance", None, move |state| {
            state.created_instances.push(payload);
            Self::created_record()
        })
    }

    fn get_instance<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, InstanceRecord> {
        self.fetch("get_instance", id)
    }

    fn start_instance<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, ()> {
        self.respond("start_instance", Some(id), |_| ())
    }

    fn halt_instance<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, ()> {
        self.respond("halt_instance", Some(id), |_| ())
    }

    fn reboot_instance<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, ()> {
        self.respond("reboot_instance", Some(id), |_| ())
    }

    fn delete_instance<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, ()> {
        self.respond("delete_instance", Some(id), |_| ())
    }

    fn create_bare_metal<'a>(
        &'a self,
        payload: &'a BareMetalCreatePayload,
    ) -> ProviderFuture<'a, InstanceRecord> {
        let payload = payload.clone();
        self.respond("create_bare_metal", None, move |state| {
            state.created_bare_metals.push(payload);
            Self::created_record()
        })
    }

    fn get_bare_metal<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, InstanceRecord> {
        self.fetch("get_bare_metal", id)
    }

    fn start_bare_metal<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, ()> {
        self.respond("start_bare_metal", Some(id), |_| ())
    }

    fn halt_bare_metal<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, ()> {
        self.respond("halt_bare_metal", Some(id), |_| ())
    }

    fn reboot_bare_metal<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, ()> {
        self.respond("reboot_bare_metal", Some(id), |_| ())
    }

    fn delete_bare_metal<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, ()> {
        self.respond("delete_bare_metal", Some(id), |_| ())
    }

    fn create_firewall_rule<'a>(
        &'a self,
        group_id: &'a str,
        payload: &'a FirewallRulePayload,
    ) -> ProviderFuture<'a, u64> {
        let group = group_id.to_owned();
        let payload = payload.clone();
        self.respond("create_firewall_rule", Some(group_id), move |state| {
            state.next_rule_id += 1;
            state.firewall_rules.push((group, payload));
            state.next_rule_id
        })
    }

    fn delete_firewall_rule<'a>(
        &'a self,
        group_id: &'a str,
        rule_id: u64,
    ) -> ProviderFuture<'a, ()> {
        let argument = format!("{group_id}/{rule_id}");
        self.respond("delete_firewall_rule", Some(&argument), |_| ())
    }
}

/// Public key returned by [`StaticKeySource::default`].
pub const FAKE_PUBLIC_KEY: &str = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIFakeKeyForTests test";

/// [`KeySource`] that hands out a fixed public key and records the names it
/// was asked for.
#[derive(Clone, Debug)]
pub struct StaticKeySource {
    public_key: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl Default for StaticKeySource {
    fn default() -> Self {
        Self::new(FAKE_PUBLIC_KEY)
    }
}

impl StaticKeySource {
    /// Creates a source returning `public_key`.
    #[must_use]
    pub fn new(public_key: &str) -> Self {
        Self {
            public_key: public_key.to_owned(),
            requests: Arc::default(),
        }
    }

    /// Names passed to [`KeySource::public_key`] so far.
    #[must_use]
    pub fn requests(&self) -> Vec<String> {
        lock(&self.requests).clone()
    }
}

impl KeySource for StaticKeySource {
    fn public_key(&self, name: &str) -> Result<String, KeyError> {
        lock(&self.requests).push(name.to_owned());
        Ok(self.public_key.clone())
    }
}

/// Scripted command runner that returns pre-seeded outputs in FIFO order.
///
/// Used to drive deterministic command outcomes without spawning processes.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    responses: Arc<Mutex<VecDeque<CommandOutput>>>,
    invocations: Arc<Mutex<Vec<CommandInvocation>>>,
}

/// Records a single invocation made through [`ScriptedRunner`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandInvocation {
    /// Program name as passed to the runner.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
}

impl CommandInvocation {
    /// Returns a shell-like command string for assertions.
    #[must_use]
    pub fn command_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(
            self.args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned()),
        );
        parts.join(" ")
    }
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        lock(&self.invocations).clone()
    }

    /// Pushes a successful exit status.
    pub fn push_success(&self) {
        self.push_output(Some(0), "", "");
    }

    /// Pushes a failing exit code with stderr text.
    pub fn push_failure(&self, code: i32) {
        self.push_output(Some(code), "", "simulated failure");
    }

    /// Pushes an explicit command output response.
    pub fn push_output(
        &self,
        code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) {
        lock(&self.responses).push_back(CommandOutput {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        });
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, ProcessError> {
        lock(&self.invocations).push(CommandInvocation {
            program: program.to_owned(),
            args: args.to_vec(),
        });
        lock(&self.responses)
            .pop_front()
            .ok_or_else(|| ProcessError::Spawn {
                program: program.to_owned(),
                message: String::from("no scripted response available"),
            })
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());

/// Guard that holds the env mutex and restores variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets multiple environment variables while holding a global mutex.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::set_var(key, value) };
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
