//! CLI entry point for the monitor-and-control client.
//!
//! Thin operator interface over the library: a one-shot status dump, a
//! periodic watch loop, and direct control actions (gain, RF on/off, IF
//! switch, register writes, firmware loading). A `--mock` flag runs every
//! command against the built-in simulated supervisor instead of a live
//! one, which is handy on a desk without the observatory network.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use std::path::PathBuf;
use std::time::Duration;

use roach_mc::client::McClient;
use roach_mc::config::Settings;
use roach_mc::dispatch::{ApplyOutcome, ChangeObserver, Notification};
use roach_mc::layout::{overview_rows, GridPlan};
use roach_mc::proxy::mock::MockSupervisor;
use roach_mc::state::{ControlValue, RfPath, TargetPath};
use roach_mc::McError;

#[derive(Parser)]
#[command(name = "roach-mc")]
#[command(about = "Monitor and control client for the ROACH spectrometer backend", long_about = None)]
struct Cli {
    /// Configuration file (TOML); environment variables prefixed with
    /// ROACH_MC_ override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use the built-in simulated supervisor instead of connecting.
    #[arg(long, global = true)]
    mock: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect, refresh once and print a status summary.
    Status,

    /// Refresh on the configured interval and report changes.
    Watch {
        /// Override the refresh interval, e.g. "5s".
        #[arg(long, value_parser = humantime::parse_duration)]
        interval: Option<Duration>,
    },

    /// Set the gain of one RF section in dB.
    SetGain {
        board: String,
        adc: u32,
        rf: u32,
        gain: f64,
    },

    /// Turn one RF section on or off.
    SetRf {
        board: String,
        adc: u32,
        rf: u32,
        /// "on" or "off"
        state: String,
    },

    /// Select the IF-switch input feeding one RF section.
    SetSwitch {
        board: String,
        adc: u32,
        rf: u32,
        input: u32,
    },

    /// Write a named firmware register (with readback verification).
    SetRegister {
        board: String,
        name: String,
        value: i64,
    },

    /// Load a firmware build onto a board.
    LoadFirmware { board: String, firmware: String },

    /// Print the register values of one board.
    Registers { board: String },
}

/// Prints dispatcher notifications as transient status lines.
struct ConsoleObserver;

impl ChangeObserver for ConsoleObserver {
    fn notify(&mut self, event: &Notification) {
        match event {
            Notification::Changed {
                path, kind, new, ..
            } => println!("  {path} {kind} -> {new}"),
            Notification::Unconfirmed {
                path,
                kind,
                requested,
                actual,
            } => println!("  {path} {kind} UNCONFIRMED: wrote {requested}, device holds {actual}"),
            Notification::ApplyFailed { path, kind, reason } => {
                println!("  {path} {kind} FAILED: {reason}")
            }
            Notification::StructureChanged { board } => {
                println!("  {board}: firmware changed, panel layout is stale")
            }
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = match &cli.config {
        Some(path) => Settings::load_from(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => Settings::load().context("loading configuration")?,
    };
    if let Commands::Watch {
        interval: Some(interval),
    } = &cli.command
    {
        settings.refresh_interval = *interval;
    }
    settings
        .validate()
        .map_err(McError::Configuration)
        .context("invalid configuration")?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(settings.log_level.as_str()),
    )
    .init();

    let mut client = if cli.mock {
        info!("using the simulated supervisor");
        McClient::start(
            Box::new(MockSupervisor::two_boards()),
            settings.refresh_interval,
        )?
    } else {
        info!("connecting to {}", settings.endpoint());
        McClient::connect(&settings)
            .with_context(|| format!("connecting to supervisor at {}", settings.endpoint()))?
    };
    client.subscribe(Box::new(ConsoleObserver));

    match cli.command {
        Commands::Status => print_status(&client)?,

        Commands::Watch { .. } => {
            println!(
                "watching (refresh every {:?}); interrupt to stop",
                client.refresh_interval()
            );
            loop {
                if client.tick() {
                    print_status(&client)?;
                }
                std::thread::sleep(Duration::from_millis(250));
            }
        }

        Commands::SetGain {
            board,
            adc,
            rf,
            gain,
        } => {
            let path = TargetPath::Rf(RfPath::new(board, adc, rf));
            report(client.apply_change(&path, ControlValue::Gain(gain))?);
        }

        Commands::SetRf {
            board,
            adc,
            rf,
            state,
        } => {
            let enabled = match state.as_str() {
                "on" => true,
                "off" => false,
                other => anyhow::bail!("state must be 'on' or 'off', got '{other}'"),
            };
            let path = TargetPath::Rf(RfPath::new(board, adc, rf));
            report(client.apply_change(&path, ControlValue::Enabled(enabled))?);
        }

        Commands::SetSwitch {
            board,
            adc,
            rf,
            input,
        } => {
            let path = TargetPath::Rf(RfPath::new(board, adc, rf));
            report(client.apply_change(&path, ControlValue::SwitchInput(input))?);
        }

        Commands::SetRegister { board, name, value } => {
            let path = TargetPath::Register { board, name };
            report(client.apply_change(&path, ControlValue::Register(value))?);
        }

        Commands::LoadFirmware { board, firmware } => {
            let path = TargetPath::Board(board);
            report(client.apply_change(&path, ControlValue::Firmware(firmware))?);
        }

        Commands::Registers { board } => {
            let registers = client.cache().registers(&board)?;
            if registers.is_empty() {
                println!("{board}: no registers (no firmware loaded)");
            }
            for (name, value) in registers {
                println!("{name:>32}  {value}");
            }
        }
    }

    Ok(())
}

fn report(outcome: ApplyOutcome) {
    match outcome {
        ApplyOutcome::Applied => println!("confirmed"),
        ApplyOutcome::Unconfirmed { requested, actual } => {
            println!("unconfirmed: wrote {requested}, device holds {actual}")
        }
        ApplyOutcome::Failed { reason } => println!("failed: {reason}"),
    }
}

fn print_status(client: &McClient) -> Result<()> {
    let cache = client.cache();
    println!("boards:");
    for board in cache.board_keys() {
        let status = cache.board(board)?;
        let firmware = cache.firmware(board)?.unwrap_or("none");
        println!(
            "  {board:<8} {:<15} alive={} power={:?} firmware={firmware}",
            status.ip, status.alive, status.power
        );
    }

    // A key set the inference cannot reconcile loses this panel, not the
    // whole client.
    match GridPlan::build(overview_rows(cache)?) {
        Ok(plan) => {
            println!("panel ({} columns):", plan.columns.len());
            for row in &plan.rows {
                let cells: Vec<String> = row
                    .cells
                    .iter()
                    .map(|cell| match &cell.value {
                        Some(value) => format!("{value}"),
                        None => "-".to_string(),
                    })
                    .collect();
                println!("  {:<16} {}", row.name, cells.join("  "));
            }
        }
        Err(err) => log::warn!("cannot lay out the overview panel: {err}"),
    }

    if !cache.fan_rpm().is_empty() {
        let fans: Vec<String> = cache
            .fan_rpm()
            .iter()
            .map(|(fan, rpm)| format!("{fan}={rpm:.0}"))
            .collect();
        println!("fans: {}", fans.join(" "));
    }
    Ok(())
}
