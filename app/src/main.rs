// rigrelayd -- supervisory daemon for a fleet of radio transceivers.
//
// Loads the station configuration, attaches every radio's PTT, power, and
// squelch lines, runs the time-out/receive supervisor, and reads operator
// commands from stdin until `quit`, EOF, or Ctrl-C.
//
// Usage:
//   rigrelayd --config /etc/rigrelay.conf
//   rigrelayd --config station.conf --mock          (no hardware, lines simulated)
//   rigrelayd --config station.conf check           (validate and print, then exit)
//   rigrelayd --no-console --events                 (run as a service, log events)
//   RUST_LOG=rigrelay=debug rigrelayd --config station.conf

mod console;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use rigrelay::{
    LineController, RadioEvent, RegistryBuilder, StationConfig, Supervisor, format_duration,
};
use rigrelay_test_harness::MockLineController;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::console::{Command, Console};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// rigrelayd -- supervises PTT, power, and squelch lines for a radio fleet.
#[derive(Parser)]
#[command(name = "rigrelayd", version, about)]
struct Cli {
    /// Station configuration file.
    #[arg(long, short, default_value = "/etc/rigrelay.conf")]
    config: PathBuf,

    /// Use a simulated line controller instead of real hardware.
    #[arg(long)]
    mock: bool,

    /// Log level used when RUST_LOG is not set.
    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,

    /// Print radio events to stdout as they happen.
    #[arg(long)]
    events: bool,

    /// Do not read commands from stdin; run until interrupted.
    #[arg(long)]
    no_console: bool,

    #[command(subcommand)]
    command: Option<Mode>,
}

#[derive(Subcommand, Clone, Copy)]
enum Mode {
    /// Run the supervisor and the operator console (default).
    Run,
    /// Validate the configuration file and print the station layout.
    Check,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

// ---------------------------------------------------------------------------
// Setup helpers
// ---------------------------------------------------------------------------

fn init_logging(level: LogLevel) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Open the line controller a configuration names, or a mock one.
pub(crate) async fn open_lines(config: &StationConfig, mock: bool) -> Result<Arc<dyn LineController>> {
    if mock {
        info!("using simulated line controller");
        return Ok(Arc::new(MockLineController::new()));
    }
    let Some(spec) = config.general.gpiochip.as_deref() else {
        bail!("no gpiochip configured in [general] (use --mock to run without hardware)");
    };
    rigrelay::transport::open_controller(spec)
        .await
        .with_context(|| format!("failed to open line controller {spec}"))
}

// ---------------------------------------------------------------------------
// Modes
// ---------------------------------------------------------------------------

fn cmd_check(cli: &Cli, config: &StationConfig) -> Result<()> {
    let general = &config.general;
    println!("Configuration:  {}", cli.config.display());
    println!("Max radios:     {}", general.max_radios);
    println!(
        "Poll interval:  {}",
        format_duration(general.poll_interval.as_duration())
    );
    println!(
        "Controller:     {}",
        general.gpiochip.as_deref().unwrap_or("(none)")
    );
    println!(
        "ID:             every {} ({})",
        format_duration(general.id_timeout),
        general.id_type
    );
    println!();

    if config.radios.is_empty() {
        bail!("no [radioN] sections configured");
    }
    for (id, radio) in &config.radios {
        println!(
            "{id}: {:<24} enabled={:<5} rx={:<6} tot={} holdoff={}",
            radio.description,
            radio.enabled,
            radio.rx_mode,
            format_duration(radio.timeout_talk),
            format_duration(radio.timeout_holdoff)
        );
    }
    Ok(())
}

async fn cmd_run(cli: &Cli, config: StationConfig) -> Result<()> {
    let controller = open_lines(&config, cli.mock).await?;
    let registry = Arc::new(
        RegistryBuilder::new(config)
            .controller(controller)
            .build()
            .await
            .context("failed to build radio registry")?,
    );

    if cli.events {
        let mut rx = registry.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => print_event(&event),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        warn!(missed = n, "event printer lagged");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    let supervisor = Supervisor::new(Arc::clone(&registry)).spawn();
    let console = Console::new(Arc::clone(&registry), cli.config.clone(), cli.mock);

    println!(
        "rigrelayd ready: {} radios on {}. Type 'help' for commands.",
        registry.max_radios().await,
        registry.controller_name().await
    );

    if cli.no_console {
        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for Ctrl-C")?;
        info!("interrupted");
        supervisor.stop().await;
        registry.shutdown().await;
        return Ok(());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        info!("stdin closed");
                        break;
                    }
                    Err(e) => {
                        error!(error = %e, "failed to read stdin");
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                let cmd = match line.parse::<Command>() {
                    Ok(cmd) => cmd,
                    Err(e) => {
                        println!("{e}");
                        continue;
                    }
                };
                if cmd == Command::Quit {
                    break;
                }
                match console.execute(cmd).await {
                    Ok(text) => print!("{text}"),
                    Err(e) => {
                        error!(error = %format!("{e:#}"), "command failed");
                        println!("ERROR: {e:#}");
                    }
                }
            }
        }
    }

    supervisor.stop().await;
    registry.shutdown().await;
    println!("All radios shut down.");
    Ok(())
}

fn print_event(event: &RadioEvent) {
    match event {
        RadioEvent::StateChanged { radio, from, to } => println!("[event] {radio}: {from} -> {to}"),
        RadioEvent::EnabledChanged { radio, enabled } => {
            println!("[event] {radio}: {}", if *enabled { "enabled" } else { "disabled" })
        }
        RadioEvent::TransmitBlocked { radio, penalty } => {
            println!("[event] {radio}: transmit blocked, penalty {}", format_duration(*penalty))
        }
        RadioEvent::TimeoutExpired { radio, penalty } => {
            println!("[event] {radio}: time-out, penalty {}", format_duration(*penalty))
        }
        RadioEvent::PenaltyCleared { radio } => println!("[event] {radio}: penalty cleared"),
        RadioEvent::Identified { radio, mode } => println!("[event] {radio}: identify ({mode})"),
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level);

    let config = StationConfig::load(&cli.config)
        .await
        .with_context(|| format!("failed to load {}", cli.config.display()))?;

    match cli.command.unwrap_or(Mode::Run) {
        Mode::Check => cmd_check(&cli, &config),
        Mode::Run => cmd_run(&cli, config).await,
    }
}
