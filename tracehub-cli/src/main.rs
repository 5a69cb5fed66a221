// tracehub-cli/src/main.rs
// ============================================================================
// Module: TraceHub CLI Entry Point
// Description: Command dispatcher for local operational tasks: config
//              validation, store initialization, and policy activation.
// Purpose: Give an operator a way to stand up and maintain a TraceHub
//          deployment without an HTTP surface.
// Dependencies: clap, tracehub-config, tracehub-core, tracehub-engine,
//               tracehub-store-sqlite, tokio.
// ============================================================================

//! ## Overview
//! This binary never routes HTTP traffic; it is ambient tooling around a
//! deployment, not a server. Every subcommand opens its own short-lived
//! `SqliteStore` handle and exits — there is no long-running process here.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::ArgAction;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use tracehub_config::TraceHubConfig;
use tracehub_core::ids::PolicyId;
use tracehub_core::ids::ProjectId;
use tracehub_engine::PolicyService;
use tracehub_store_sqlite::SqliteStore;
use tracehub_store_sqlite::SqliteStoreConfig;

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(
    name = "tracehub",
    disable_help_subcommand = true,
    disable_version_flag = true,
    arg_required_else_help = true
)]
struct Cli {
    /// Print version information and exit.
    #[arg(long = "version", action = ArgAction::SetTrue, global = true)]
    show_version: bool,
    /// Path to a TOML config file. Falls back to built-in defaults and
    /// environment overrides if omitted or missing.
    #[arg(long, global = true, value_name = "PATH", default_value = "tracehub.toml")]
    config: PathBuf,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Configuration inspection.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Store lifecycle management.
    Store {
        /// Selected store subcommand.
        #[command(subcommand)]
        command: StoreCommand,
    },
    /// Policy version management.
    Policy {
        /// Selected policy subcommand.
        #[command(subcommand)]
        command: PolicyCommand,
    },
}

/// Configuration subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Loads the configuration and reports whether it validates.
    Check,
}

/// Store subcommands.
#[derive(Subcommand, Debug)]
enum StoreCommand {
    /// Opens (creating if necessary) the configured `SQLite` database and
    /// bootstraps its schema.
    Init,
}

/// Policy subcommands.
#[derive(Subcommand, Debug)]
enum PolicyCommand {
    /// Activates a specific version of a policy, deactivating every other
    /// version of that policy.
    Activate(PolicyActivateCommand),
}

/// Arguments for `policy activate`.
#[derive(Args, Debug)]
struct PolicyActivateCommand {
    /// The owning project.
    #[arg(long, value_name = "UUID")]
    project_id: ProjectId,
    /// The policy whose version is being activated.
    #[arg(long, value_name = "UUID")]
    policy_id: PolicyId,
    /// The version number to activate.
    #[arg(long)]
    version: u32,
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, String>;

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.show_version {
        if let Err(err) = write_stdout_line(&format!("tracehub {}", env!("CARGO_PKG_VERSION"))) {
            return emit_error(&output_error("stdout", &err));
        }
        return ExitCode::SUCCESS;
    }

    let result = match cli.command {
        Commands::Config { command } => run_config(&cli.config, command),
        Commands::Store { command } => run_store(&cli.config, command),
        Commands::Policy { command } => run_policy(&cli.config, command).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => emit_error(&message),
    }
}

/// Dispatches `config` subcommands.
fn run_config(config_path: &PathBuf, command: ConfigCommand) -> CliResult<()> {
    match command {
        ConfigCommand::Check => {
            let config = load_config(config_path)?;
            write_stdout_line(&format!(
                "config ok: app_name={}, environment={}",
                config.app_name, config.environment
            ))
            .map_err(|err| output_error("stdout", &err))?;
            write_stdout_line(&format!("database_url={}", config.database_url))
                .map_err(|err| output_error("stdout", &err))?;
            write_stdout_line(&format!(
                "webhook_url={}",
                config.webhook_url.as_deref().unwrap_or("(disabled)")
            ))
            .map_err(|err| output_error("stdout", &err))?;
            Ok(())
        }
    }
}

/// Dispatches `store` subcommands.
fn run_store(config_path: &PathBuf, command: StoreCommand) -> CliResult<()> {
    match command {
        StoreCommand::Init => {
            let config = load_config(config_path)?;
            SqliteStore::open(&SqliteStoreConfig::new(&config.database_url))
                .map_err(|err| format!("failed to initialize store: {err}"))?;
            write_stdout_line(&format!("store initialized at {}", config.database_url))
                .map_err(|err| output_error("stdout", &err))?;
            Ok(())
        }
    }
}

/// Dispatches `policy` subcommands.
async fn run_policy(config_path: &PathBuf, command: PolicyCommand) -> CliResult<()> {
    match command {
        PolicyCommand::Activate(args) => {
            let config = load_config(config_path)?;
            let store = SqliteStore::open(&SqliteStoreConfig::new(&config.database_url))
                .map_err(|err| format!("failed to open store: {err}"))?;
            let service = PolicyService::new(std::sync::Arc::new(store));
            let version = service
                .activate(args.project_id, args.policy_id, args.version)
                .await
                .map_err(|err| format!("failed to activate policy version: {err}"))?;
            write_stdout_line(&format!(
                "activated policy {} version {} (effective {})",
                version.policy_id, version.version, version.effective_from
            ))
            .map_err(|err| output_error("stdout", &err))?;
            Ok(())
        }
    }
}

/// Loads configuration from `path`, falling back to defaults and
/// environment overrides when the file is absent.
fn load_config(path: &PathBuf) -> CliResult<TraceHubConfig> {
    TraceHubConfig::load(path).map_err(|err| format!("invalid configuration: {err}"))
}

/// Writes a single line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes a single line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Formats an output-stream error message.
fn output_error(stream: &str, error: &std::io::Error) -> String {
    format!("failed to write to {stream}: {error}")
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(&format!("error: {message}"));
    ExitCode::FAILURE
}
