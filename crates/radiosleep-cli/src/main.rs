#![deny(unsafe_code)]

//! radiosleep CLI: lifecycle controller and daemon entry point.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};

use radiosleep_config::AppConfig;
use radiosleep_core::daemon::EXIT_ALREADY_RUNNING;
use radiosleep_core::events::source_from_config;
use radiosleep_core::supervisor::{self, StartOutcome, StopOutcome};
use radiosleep_core::{
    Daemon, DaemonError, FallbackRadio, InstanceStatus, RadioPower, build_info, instance, logging,
};

/// radiosleep: turn the radio off when the machine has really gone to sleep.
#[derive(Parser)]
#[command(name = "radiosleep", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, default_value = "radiosleep.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon in the foreground.
    Run,

    /// Start the daemon in the background.
    Start,

    /// Stop a running daemon.
    Stop,

    /// Show daemon status.
    Status {
        /// Print machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Query or switch the radio directly.
    Radio {
        #[command(subcommand)]
        action: RadioAction,
    },

    /// Validate and display configuration.
    Config {
        /// Show the resolved configuration.
        #[arg(long)]
        show: bool,
    },
}

#[derive(Subcommand, Clone, Copy)]
enum RadioAction {
    On,
    Off,
    Status,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match dispatch(&cli).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("radiosleep: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(cli: &Cli) -> Result<ExitCode> {
    let config = load_config(&cli.config).await?;

    let log_file = match cli.command {
        Commands::Run => {
            // Turned away before logging starts, so nothing lands in the
            // running instance's log. `Daemon::run` still makes the final call.
            if let InstanceStatus::Running { pid } = instance::probe(&config.daemon.pid_path())
                && pid != std::process::id()
            {
                eprintln!("radiosleep: {}", DaemonError::AlreadyRunning { pid });
                return Ok(ExitCode::from(EXIT_ALREADY_RUNNING));
            }
            Some(config.daemon.log_path())
        }
        _ => None,
    };
    logging::init(&config.logging.level, log_file.as_deref(), cli.verbose)?;

    match cli.command {
        Commands::Run => cmd_run(config).await,
        Commands::Start => cmd_start(&cli.config, &config, cli.verbose).await,
        Commands::Stop => cmd_stop(&config).await,
        Commands::Status { json } => cmd_status(&config, json),
        Commands::Radio { action } => cmd_radio(&config, action).await,
        Commands::Config { show } => cmd_config(&cli.config, &config, show),
    }
}

async fn cmd_run(config: AppConfig) -> Result<ExitCode> {
    let radio: Arc<dyn RadioPower> = Arc::new(FallbackRadio::from_config(&config.radio));
    let source = source_from_config(&config.events);
    let daemon = Daemon::new(config, radio, source);

    match daemon.run().await {
        Ok(status) => {
            info!(
                sleeps = status.sleeps,
                wakes = status.wakes,
                toggle_failures = status.toggle_failures,
                "Exiting"
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            error!(error = %e, "Daemon failed");
            eprintln!("radiosleep: {e}");
            Ok(ExitCode::from(e.exit_code()))
        }
    }
}

async fn cmd_start(config_path: &Path, config: &AppConfig, verbose: u8) -> Result<ExitCode> {
    let exe = std::env::current_exe().context("Failed to locate the radiosleep executable")?;
    let mut args = vec!["--config".to_string(), config_path.display().to_string()];
    if verbose > 0 {
        args.push(format!("-{}", "v".repeat(usize::from(verbose))));
    }
    args.push("run".to_string());

    let outcome = supervisor::start_detached(
        &exe,
        &args,
        &config.daemon.pid_path(),
        config.daemon.startup_timeout(),
    )
    .await?;
    match outcome {
        StartOutcome::Started { pid } => println!("radiosleep started (pid {pid})"),
        StartOutcome::AlreadyRunning { pid } => println!("radiosleep is already running (pid {pid})"),
    }
    Ok(ExitCode::SUCCESS)
}

async fn cmd_stop(config: &AppConfig) -> Result<ExitCode> {
    match supervisor::stop(&config.daemon.pid_path(), config.daemon.stop_timeout()).await {
        Ok(StopOutcome::Graceful { pid }) => println!("radiosleep stopped (pid {pid})"),
        Ok(StopOutcome::Killed { pid }) => {
            println!("radiosleep did not stop in time and was killed (pid {pid})");
        }
        Err(supervisor::SupervisorError::NotRunning) => println!("radiosleep is not running"),
        Err(e) => return Err(e.into()),
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_status(config: &AppConfig, json: bool) -> Result<ExitCode> {
    let pid_path = config.daemon.pid_path();
    let status = supervisor::status(&pid_path)?;

    if json {
        let report = serde_json::json!({
            "instance": status,
            "pid_file": pid_path.display().to_string(),
            "build": build_info::BuildInfo::current(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("radiosleep {}", build_info::version_string());
        println!("  status:   {status}");
        println!("  pid file: {}", pid_path.display());
        if let InstanceStatus::Running { .. } = status {
            println!("  log file: {}", config.daemon.log_path().display());
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn cmd_radio(config: &AppConfig, action: RadioAction) -> Result<ExitCode> {
    let radio = FallbackRadio::from_config(&config.radio);
    match action {
        RadioAction::On => {
            radio.enable().await?;
            println!("radio on");
        }
        RadioAction::Off => {
            radio.disable().await?;
            println!("radio off");
        }
        RadioAction::Status => {
            let state = if radio.is_enabled().await { "on" } else { "off" };
            println!("radio {state}");
            println!("strategies: {}", radio.strategy_names().join(", "));
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_config(config_path: &Path, config: &AppConfig, show: bool) -> Result<ExitCode> {
    if show {
        let toml_str =
            toml::to_string_pretty(config).map_err(|e| anyhow::anyhow!("TOML error: {e}"))?;
        println!("{toml_str}");
    } else {
        println!("Configuration at '{}' is valid.", config_path.display());
    }
    Ok(ExitCode::SUCCESS)
}

async fn load_config(path: &Path) -> Result<AppConfig> {
    if path.exists() {
        AppConfig::load(path)
            .await
            .with_context(|| format!("Invalid configuration at '{}'", path.display()))
    } else {
        Ok(AppConfig::default())
    }
}
