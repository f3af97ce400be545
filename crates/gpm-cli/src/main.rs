//! `gpm` – GPM (Grasp Primary Module) command line
//!
//! Starts the arm's control core against the in-process simulated hardware.
//!
//! ```text
//! gpm [--config <path>] [run [--ticks <n>]]   run the control loop
//! gpm [--config <path>] demo                  cycle through every grip once
//! gpm [--config <path>] init-config           write a default config file
//! ```
//!
//! Configuration comes from `~/.gpm/config.toml` (or `--config`), then the
//! `GPM_*` environment overrides.  **Ctrl-C** asks the loop to stop; the arm
//! relaxes to REST and releases the sensor before the process exits.

mod config;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::warn;

use gpm_hal::SimHardware;
use gpm_middleware::{EventBus, Topic};
use gpm_runtime::{ControlLoop, LoopExit, init_tracing, init_tracing_with_level};
use gpm_types::{ArmState, Event, EventPayload, Observer};

/// Pause after each demo grip so the movement can be watched.
const DEMO_SETTLE: Duration = Duration::from_secs(2);

#[derive(Parser, Debug)]
#[command(name = "gpm")]
#[command(about = "GPM - Grasp Primary Module: prosthetic arm control core")]
#[command(version)]
struct Cli {
    /// Config file to use instead of ~/.gpm/config.toml
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
enum Command {
    /// Run the control loop until Ctrl-C or a fault (default)
    Run {
        /// Stop after this many ticks
        #[arg(long, value_name = "N")]
        ticks: Option<u64>,
    },
    /// Cycle through every grip once
    Demo,
    /// Write a default config file
    InitConfig,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Run { ticks: None });
    let path = cli.config.unwrap_or_else(config::config_path);

    if command == Command::InitConfig {
        return match config::save_to(&config::Config::default(), &path) {
            Ok(()) => {
                println!(
                    "  {} Config written to {}",
                    "✓".green().bold(),
                    path.display().to_string().bold()
                );
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("{}: {}", "Error saving config".red(), e);
                ExitCode::FAILURE
            }
        };
    }

    // ── Configuration ─────────────────────────────────────────────────────
    let mut cfg = match config::load_from(&path) {
        Ok(Some(cfg)) => {
            println!("  Config loaded from {}", path.display().to_string().bold());
            cfg
        }
        Ok(None) => {
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
        Err(e) => {
            eprintln!("{}: {}", "Config error".red(), e);
            return ExitCode::FAILURE;
        }
    };
    if let Command::Run { ticks: Some(ticks) } = command {
        cfg.control.max_ticks = Some(ticks);
    }
    if let Err(e) = cfg.validate() {
        eprintln!("{}: {}", "Invalid config".red(), e);
        return ExitCode::FAILURE;
    }

    // ── Structured logging ────────────────────────────────────────────────
    let _tracing = if cfg.debug {
        init_tracing_with_level("gpm", "debug")
    } else {
        init_tracing("gpm")
    };

    print_banner();

    // ── Core wiring ───────────────────────────────────────────────────────
    let bus = EventBus::default();
    let printers = [
        spawn_printer(&bus, Topic::Lifecycle),
        spawn_printer(&bus, Topic::Safety),
    ];

    let sim = SimHardware::new().with_positions(cfg.grip_positions.clone());
    let control = ControlLoop::new(
        sim.hardware_set(),
        Box::new(cfg.classifier),
        cfg.safety,
        cfg.control.clone(),
    );
    let mut control = match control {
        Ok(control) => control.with_observer(Observer::new(Arc::new(bus.clone()))),
        Err(e) => {
            eprintln!("{}: {}", "Startup error".red(), e);
            return ExitCode::FAILURE;
        }
    };

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let handle = control.shutdown_handle();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping the control loop …".yellow().bold());
        handle.request();
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; graceful shutdown on Ctrl-C will not be available");
    }

    let code = drive(&mut control, &command);

    // Dropping the last senders closes the printer threads.
    drop(control);
    drop(bus);
    for printer in printers {
        let _ = printer.join();
    }
    code
}

/// Initialise the arm, run `command`, and always finish in SHUTDOWN.
fn drive(control: &mut ControlLoop, command: &Command) -> ExitCode {
    if let Err(e) = control.initialize() {
        eprintln!("{}: {}", "Initialisation failed".red().bold(), e);
        control.shutdown();
        return ExitCode::FAILURE;
    }
    println!("  {} Arm ready ({})", "✓".green().bold(), control.state());

    let code = match command {
        Command::Demo => match control.run_demo(DEMO_SETTLE) {
            Ok(()) => {
                println!("  {} Demo complete", "✓".green().bold());
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("{}: {}", "Demo aborted".red().bold(), e);
                ExitCode::FAILURE
            }
        },
        _ => {
            println!(
                "  Control loop running at {} Hz.  Press {} to stop.",
                control.period().as_secs_f64().recip().round(),
                "Ctrl-C".bold()
            );
            let exit = control.run();
            report_exit(&exit, control.tick_count());
            if exit.is_fault() || matches!(exit, LoopExit::NotReady(_)) {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
    };

    if control.state() != ArmState::Shutdown {
        control.shutdown();
    }
    println!("  {} Exiting GPM.", "✓".green());
    code
}

fn report_exit(exit: &LoopExit, ticks: u64) {
    match exit {
        LoopExit::Stopped => println!("  Loop stopped after {ticks} ticks"),
        LoopExit::TickLimit => println!("  Tick limit reached ({ticks} ticks)"),
        LoopExit::NotReady(state) => {
            eprintln!("{}: arm is {}", "Loop not started".red(), state)
        }
        LoopExit::NotOperational(state) => {
            println!("  {} Arm left operation ({})", "⚠".yellow(), state)
        }
        LoopExit::SafetyFault(reason) => {
            eprintln!("{}: {}", "Safety fault".red().bold(), reason)
        }
        LoopExit::CapabilityFault(reason) => {
            eprintln!("{}: {}", "Hardware fault".red().bold(), reason)
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Event printers
// ─────────────────────────────────────────────────────────────────────────────

fn spawn_printer(bus: &EventBus, topic: Topic) -> JoinHandle<()> {
    let mut rx = bus.subscribe_to(topic);
    std::thread::spawn(move || {
        while let Some(event) = rx.blocking_recv() {
            print_event(&event);
        }
    })
}

fn print_event(event: &Event) {
    match &event.payload {
        EventPayload::StateTransition { from, to, error } => match error {
            Some(reason) => println!(
                "  {} {} → {} ({})",
                "state".dimmed(),
                from,
                to.to_string().red().bold(),
                reason
            ),
            None => println!("  {} {} → {}", "state".dimmed(), from, to.to_string().bold()),
        },
        EventPayload::TransitionRejected { from, to } => {
            println!("  {} {} → {} rejected", "state".dimmed(), from, to.to_string().yellow())
        }
        EventPayload::SafetyViolation(violation) => {
            println!("  {} {}", "safety".red(), violation)
        }
        EventPayload::DispatchBlocked { intent, .. } => {
            println!("  {} {} grip blocked", "safety".red(), intent)
        }
        _ => {}
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   ____ ____  __  __ "#.bold().cyan());
    println!("{}", r#"  / ___|  _ \|  \/  |"#.bold().cyan());
    println!("{}", r#" | |  _| |_) | |\/| |"#.bold().cyan());
    println!("{}", r#" | |_| |  __/| |  | |"#.bold().cyan());
    println!("{}", r#"  \____|_|   |_|  |_|"#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "GPM".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Grasp Primary Module – prosthetic arm control core");
    println!();
}
