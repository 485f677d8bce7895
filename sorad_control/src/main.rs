//! # So-Rad Controller
//!
//! Autonomous operation of hyperspectral radiometers on a rotating platform
//! with dual-GPS heading and solar tracking.
//!
//! # Usage
//!
//! ```bash
//! # Run against real hardware
//! sorad_control --config_file config/sorad.toml
//!
//! # Run every device as its software twin
//! sorad_control -c config/sorad.toml --simulate
//!
//! # Quiet down to warnings
//! sorad_control -c config/sorad.toml -v 1
//! ```
//!
//! Exit code 0 on a manual interrupt, non-zero on any fatal error; both
//! paths run the full teardown (pins OFF, threads joined) first.

use clap::Parser;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;

use sorad_common::config::Config;
use sorad_control::cycle::CycleRunner;
use sorad_control::lifecycle;

/// So-Rad — autonomous above-water radiometry
#[derive(Parser, Debug)]
#[command(name = "sorad_control")]
#[command(author = "Plymouth Marine Laboratory")]
#[command(version)]
#[command(about = "Autonomous solar-tracking radiometry platform controller")]
struct Args {
    /// Path to the platform configuration TOML.
    #[arg(short = 'c', long = "config_file", value_name = "FILE")]
    config_file: PathBuf,

    /// Output verbosity, 0 (errors only) to 4 (trace).
    #[arg(short, long, default_value_t = 3,
          value_parser = clap::value_parser!(u8).range(0..=4))]
    verbose: u8,

    /// Run every device as its software twin (no serial hardware).
    #[arg(short, long)]
    simulate: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();
    setup_tracing(&args);

    info!("So-Rad controller v{} starting...", env!("CARGO_PKG_VERSION"));

    if let Err(code) = run(&args) {
        process::exit(code);
    }
    info!("So-Rad controller shutdown complete");
}

fn run(args: &Args) -> Result<(), i32> {
    // Config problems must surface before any hardware is touched.
    let config = match Config::load(&args.config_file) {
        Ok(config) => config,
        Err(e) => {
            error!("Config file {:?}: {e}", args.config_file);
            return Err(1);
        }
    };

    let interrupt = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupt);
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        flag.store(true, Ordering::Relaxed);
    }) {
        error!("Unable to install the shutdown handler: {e}");
        return Err(1);
    }

    let handles = match lifecycle::init_all(&config, args.simulate, &interrupt) {
        Ok(handles) => handles,
        Err(mut failure) => {
            error!("Exception during initialisation: {}", failure.error);
            lifecycle::stop_all(&mut failure.handles);
            return Err(1);
        }
    };
    info!("===Initialisation complete===");

    let mut runner = CycleRunner::new(config, handles, Arc::clone(&interrupt), args.verbose);
    let outcome = runner.run();

    // The one teardown path, whatever ended the loop.
    lifecycle::stop_all(runner.handles_mut());

    match outcome {
        Ok(()) => Ok(()),
        Err(e) => {
            error!("Unhandled cycle error: {e}");
            Err(1)
        }
    }
}

/// Map the CLI verbosity onto the tracing subscriber.
fn setup_tracing(args: &Args) {
    let level = match args.verbose {
        0 => Level::ERROR,
        1 => Level::WARN,
        2 => Level::INFO,
        3 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init();
    }
}
