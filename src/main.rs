//! Binary entry point for the gce-machines CLI.

mod cli;

use std::io::{self, Write};
use std::process;

use clap::Parser;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use gce_machines::{
    ComputeConfig, ComputeGateway, ConfigError, HttpExecutor, InstanceRegistry, KeyPairError,
    KeyPairOutcome, KeyPairReconciler, MachineError, MachineOptions, MachineOrchestrator,
    MachineReference, MachineSpec, OpenSshPublicKey, OperationTracker, ProjectMetadataStore,
    StaticToken, TracingProgress, TransportError, files,
};

use cli::{
    AllocateCommand, Cli, ConnectionArgs, KeyPairCommand, MachineTarget, ReadyCommand,
};

type Executor = HttpExecutor<StaticToken>;

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Machine(#[from] MachineError),
    #[error(transparent)]
    KeyPair(#[from] KeyPairError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("failed to write output: {0}")]
    Output(String),
}

/// Clients built once per invocation from the loaded configuration.
struct Clients {
    machines: MachineOrchestrator<Executor>,
    key_pairs: KeyPairReconciler<Executor>,
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
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr))
        .init();
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    let config = ComputeConfig::load_without_cli_args()?;
    let clients = connect(&config)?;
    let progress = TracingProgress;

    match cli {
        Cli::Allocate(command) => {
            let options = allocate_options(&command)?;
            let spec = clients
                .machines
                .allocate(&progress, &MachineSpec::new(command.name), &options)
                .await?;
            let rendered = serde_json::to_string_pretty(&spec.reference)
                .map_err(|err| CliError::Output(err.to_string()))?;
            write_line(&rendered)
        }
        Cli::Ready(command) => {
            let options = ready_options(&command);
            let spec = load_spec(&command.target)?;
            let target = clients.machines.ready(&progress, &spec, &options).await?;
            write_line(&target.login())
        }
        Cli::Stop(target) => {
            let spec = load_spec(&target)?;
            clients.machines.stop(&progress, &spec).await?;
            write_line(&format!("{}: stopped", spec.name))
        }
        Cli::Destroy(target) => {
            let spec = load_spec(&target)?;
            clients.machines.destroy(&progress, &spec).await?;
            write_line(&format!("{}: destroyed", spec.name))
        }
        Cli::KeyPair(KeyPairCommand::Create(command)) => {
            let key = OpenSshPublicKey::from_file(&command.public_key)?;
            let outcome = clients
                .key_pairs
                .reconcile(&progress, &command.name, &key, command.allow_overwrite)
                .await?;
            let verb = match outcome {
                KeyPairOutcome::Uploaded => "uploaded",
                KeyPairOutcome::Replaced => "replaced",
                KeyPairOutcome::Unchanged => "unchanged",
            };
            write_line(&format!("{}: {verb}", command.name))
        }
        Cli::KeyPair(KeyPairCommand::Destroy(command)) => {
            let removed = clients.key_pairs.destroy(&progress, &command.name).await?;
            let verb = if removed { "deleted" } else { "not present" };
            write_line(&format!("{}: {verb}", command.name))
        }
    }
}

fn connect(config: &ComputeConfig) -> Result<Clients, CliError> {
    config.validate()?;
    if let Some(credentials) = config.credentials()? {
        debug!(issuer = credentials.issuer(), "credentials file is complete");
    }
    let driver_url = config.resolve_driver_url()?;
    let policy = config.poll_policy();
    let executor = HttpExecutor::new(config.api_base.clone(), config.token_source()?)?;
    let gateway = ComputeGateway::new(executor, driver_url.project(), driver_url.zone());
    let tracker = OperationTracker::new(gateway.clone(), policy);

    let machines = MachineOrchestrator::new(
        InstanceRegistry::new(gateway.clone(), policy),
        tracker.clone(),
        driver_url,
    )
    .with_template(config.create_template())
    .with_default_username(config.default_ssh_username.clone());
    let key_pairs = KeyPairReconciler::new(
        ProjectMetadataStore::new(gateway, config.change_policy()),
        tracker,
        config.default_ssh_username.clone(),
    );
    Ok(Clients {
        machines,
        key_pairs,
    })
}

fn connection_options(args: &ConnectionArgs) -> MachineOptions {
    MachineOptions {
        ssh_username: args.ssh_username.clone(),
        sudo: args.sudo,
        ssh_gateway: args.ssh_gateway.clone(),
        key_name: args.key_name.clone(),
        ..MachineOptions::default()
    }
}

fn allocate_options(command: &AllocateCommand) -> Result<MachineOptions, CliError> {
    let insert_options = command
        .insert_options
        .as_deref()
        .map(parse_insert_options)
        .transpose()?;
    Ok(MachineOptions {
        insert_options,
        host_node: command.host_node.clone(),
        ..connection_options(&command.connection)
    })
}

fn ready_options(command: &ReadyCommand) -> MachineOptions {
    MachineOptions {
        ssh_port: command.ssh_port,
        ..connection_options(&command.connection)
    }
}

/// Parses inline JSON, or JSON read from a file when prefixed with `@`.
fn parse_insert_options(raw: &str) -> Result<Value, CliError> {
    let contents = match raw.strip_prefix('@') {
        Some(path) => files::read_to_string(&files::expand_tilde(path))
            .map_err(|message| CliError::InvalidArgument(format!("{path}: {message}")))?,
        None => raw.to_owned(),
    };
    let value: Value = serde_json::from_str(&contents)
        .map_err(|err| CliError::InvalidArgument(format!("insert options: {err}")))?;
    if !value.is_object() {
        return Err(CliError::InvalidArgument(String::from(
            "insert options must be a JSON object",
        )));
    }
    Ok(value)
}

fn load_spec(target: &MachineTarget) -> Result<MachineSpec, CliError> {
    let Some(path) = target.reference.as_deref() else {
        return Ok(MachineSpec::new(target.name.clone()));
    };
    let contents = files::read_to_string(&files::expand_tilde(path))
        .map_err(|message| CliError::InvalidArgument(format!("{path}: {message}")))?;
    let reference: MachineReference = serde_json::from_str(&contents)
        .map_err(|err| CliError::InvalidArgument(format!("machine reference {path}: {err}")))?;
    Ok(MachineSpec::with_reference(target.name.clone(), reference))
}

fn write_line(line: &str) -> Result<(), CliError> {
    writeln!(io::stdout(), "{line}").map_err(|err| CliError::Output(err.to_string()))
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}
