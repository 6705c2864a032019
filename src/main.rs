//! Binary entry point for the `vultr-machine` CLI.
//!
//! Each invocation acts on one machine. State that must survive between
//! invocations lives in the machine store configured by
//! [`vultr_machine::config::RuntimeConfig`].

use std::io::{self, Write};
use std::process;
use std::sync::Arc;

use clap::Parser;
use thiserror::Error;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use vultr_machine::config::{ConfigError, RuntimeConfig};
use vultr_machine::driver::{Driver, DriverError, SshKeygen};
use vultr_machine::flags::{self, FlagError, FlagValue, OptionMap};
use vultr_machine::preflight::{Preflight, PreflightError};
use vultr_machine::provider::{ProviderApi, ProviderError, VultrClient};
use vultr_machine::record::{MachineStore, RecordError};
use vultr_machine::resolver::{ResolveError, resolve};

mod cli;

use cli::{Cli, CreateCommand, MachineCommand};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Flags(#[from] FlagError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Record(#[from] RecordError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("pre-flight check failed: {0}")]
    Preflight(#[from] PreflightError),
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error("interrupted while creating {name}; run `vultr-machine rm {name}` to clean up")]
    Interrupted { name: String },
    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(io::stderr)
        .init();
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    let config = RuntimeConfig::load_without_cli_args()?;
    config.validate()?;
    let store = MachineStore::new(&config.store_path);

    match cli {
        Cli::Create(args) => create(&config, &store, &args).await,
        Cli::Start(args) => {
            let mut driver = open(&config, &store, &args)?;
            let result = driver.start().await;
            finish(&store, &driver, result)
        }
        Cli::Stop(args) => {
            let mut driver = open(&config, &store, &args)?;
            let result = driver.stop().await;
            finish(&store, &driver, result)
        }
        Cli::Kill(args) => {
            let mut driver = open(&config, &store, &args)?;
            let result = driver.kill().await;
            finish(&store, &driver, result)
        }
        Cli::Restart(args) => {
            let mut driver = open(&config, &store, &args)?;
            let result = driver.restart().await;
            finish(&store, &driver, result)
        }
        Cli::Remove(args) => {
            let mut driver = open(&config, &store, &args)?;
            driver.remove().await?;
            store.forget(&args.name)?;
            info!(name = %args.name, "machine removed");
            Ok(())
        }
        Cli::Ip(args) => {
            let mut driver = open(&config, &store, &args)?;
            let result = driver.ip().await;
            print_result(&store, &driver, result)
        }
        Cli::State(args) => {
            let mut driver = open(&config, &store, &args)?;
            let result = driver.state().await.map(|state| state.to_string());
            print_result(&store, &driver, result)
        }
        Cli::Url(args) => {
            let mut driver = open(&config, &store, &args)?;
            let result = driver.url().await;
            print_result(&store, &driver, result)
        }
        Cli::SshInfo(args) => {
            let mut driver = open(&config, &store, &args)?;
            let result = driver.ssh_hostname().await.map(|host| {
                format!("{}@{host}:{}", driver.ssh_username(), driver.ssh_port())
            });
            print_result(&store, &driver, result)
        }
    }
}

async fn create(
    config: &RuntimeConfig,
    store: &MachineStore,
    args: &CreateCommand,
) -> Result<(), CliError> {
    let name = args.name.clone();
    store.ensure_absent(&name)?;
    let options = option_map(args)?;
    let resolved = resolve(&options, &name)?;
    let provider: Arc<dyn ProviderApi> =
        Arc::new(VultrClient::new(resolved.api_key, config.client_settings())?);
    let validated = Preflight::new(provider.as_ref())
        .validate(resolved.request)
        .await?;

    let key_dir = store.machine_dir(&name)?;
    let mut driver = Driver::new(
        Arc::clone(&provider),
        validated.request().server_type,
        resolved.settings,
    )
    .with_readiness(config.readiness_policy())
    .with_key_source(SshKeygen::new(key_dir));

    let outcome = tokio::select! {
        result = driver.create(validated) => result.map_err(CliError::from),
        _ = signal::ctrl_c() => Err(CliError::Interrupted { name: name.clone() }),
    };

    if driver.instance_id().is_some() {
        let path = store.save(&driver.record())?;
        info!(name = %name, path = %path, "machine record saved");
    }
    outcome?;

    let address = driver.ip().await?;
    print_line(&address)
}

fn open(
    config: &RuntimeConfig,
    store: &MachineStore,
    args: &MachineCommand,
) -> Result<Driver, CliError> {
    let record = store.load(&args.name)?;
    let provider: Arc<dyn ProviderApi> =
        Arc::new(VultrClient::new(args.api_key.clone(), config.client_settings())?);
    Ok(Driver::from_record(provider, &record).with_readiness(config.readiness_policy()))
}

fn finish(
    store: &MachineStore,
    driver: &Driver,
    result: Result<(), DriverError>,
) -> Result<(), CliError> {
    persist(store, driver);
    Ok(result?)
}

fn print_result(
    store: &MachineStore,
    driver: &Driver,
    result: Result<String, DriverError>,
) -> Result<(), CliError> {
    persist(store, driver);
    print_line(&result?)
}

// Saving refreshed fields is an optimisation; the record stays usable
// without them.
fn persist(store: &MachineStore, driver: &Driver) {
    if let Err(err) = store.save(&driver.record()) {
        warn!(error = %err, "failed to update machine record");
    }
}

fn option_map(args: &CreateCommand) -> Result<OptionMap, FlagError> {
    let text = |value: Option<&str>| FlagValue::String(value.unwrap_or_default().to_owned());
    OptionMap::new()
        .with(flags::API_KEY, FlagValue::String(args.api_key.clone()))?
        .with(flags::SERVER_TYPE, FlagValue::Int(args.server_type))?
        .with(flags::REGION, FlagValue::String(args.region.clone()))?
        .with(flags::PLAN, FlagValue::String(args.plan.clone()))?
        .with(flags::OS_ID, FlagValue::Int(args.os_id))?
        .with(flags::LABEL, text(args.label.as_deref()))?
        .with(flags::HOSTNAME, text(args.hostname.as_deref()))?
        .with(flags::TAGS, FlagValue::StringList(args.tags.clone()))?
        .with(flags::ISO_ID, text(args.iso_id.as_deref()))?
        .with(flags::APP_ID, FlagValue::Int(args.app_id))?
        .with(flags::IMAGE_ID, text(args.image_id.as_deref()))?
        .with(flags::FIREWALL_GROUP_ID, text(args.firewall_group_id.as_deref()))?
        .with(flags::OPEN_DOCKER_PORT, FlagValue::Bool(args.open_docker_port))?
        .with(flags::IPXE_CHAIN_URL, text(args.ipxe_chain_url.as_deref()))?
        .with(flags::STARTUP_SCRIPT_ID, text(args.startup_script_id.as_deref()))?
        .with(flags::SNAPSHOT_ID, text(args.snapshot_id.as_deref()))?
        .with(flags::ENABLE_IPV6, FlagValue::Bool(args.enable_ipv6))?
        .with(flags::ENABLE_VPC, FlagValue::Bool(args.enable_vpc))?
        .with(flags::VPC_IDS, FlagValue::StringList(args.vpc_ids.clone()))?
        .with(flags::SSH_KEY_IDS, FlagValue::StringList(args.ssh_key_ids.clone()))?
        .with(flags::AUTO_BACKUPS, FlagValue::Bool(args.auto_backups))?
        .with(flags::DDOS_PROTECTION, FlagValue::Bool(args.ddos_protection))?
        .with(flags::CLOUD_INIT_USER_DATA, text(args.user_data.as_deref()))?
        .with(flags::CLOUD_INIT_USER_DATA_FILE, text(args.user_data_file.as_deref()))?
        .with(flags::FLOATING_IPV4_ID, text(args.floating_ipv4.as_deref()))?
        .with(flags::SEND_ACTIVATION_EMAIL, FlagValue::Bool(args.activation_email))?
        .with(flags::DOCKER_PORT, FlagValue::Int(args.docker_port))?
        .with(flags::SSH_PORT, FlagValue::Int(args.ssh_port))?
        .with(flags::SSH_USER, FlagValue::String(args.ssh_user.clone()))
}

fn print_line(value: &str) -> Result<(), CliError> {
    writeln!(io::stdout(), "{value}")?;
    Ok(())
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}

#[cfg(test)]
mod main_tests;
