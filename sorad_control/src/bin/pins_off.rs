//! Shortcut to switch every configured output pin OFF.
//!
//! For use after a crash or from a supervisor script: reads the same config
//! as the controller, drives the pins low, releases them, exits.

use clap::Parser;
use std::path::PathBuf;
use std::process;
use tracing::{error, info};

use sorad_common::config::Config;
use sorad_hal::pins::PinBank;

/// Force all configured output pins OFF
#[derive(Parser, Debug)]
#[command(name = "pins_off")]
#[command(author = "Plymouth Marine Laboratory")]
#[command(version)]
#[command(about = "Force all configured output pins OFF and release them")]
struct Args {
    /// Path to the platform configuration TOML.
    #[arg(short = 'c', long = "config_file", value_name = "FILE")]
    config_file: PathBuf,
}

fn main() {
    tracing_subscriber::fmt().compact().init();
    let args = Args::parse();

    let config = match Config::load(&args.config_file) {
        Ok(config) => config,
        Err(e) => {
            error!("Config file {:?}: {e}", args.config_file);
            process::exit(1);
        }
    };

    let mut pins = match PinBank::open(&config.gpio) {
        Ok(pins) => pins,
        Err(e) => {
            error!("Pin subsystem: {e}");
            process::exit(1);
        }
    };
    if let Err(e) = pins.all_off() {
        error!("Pin OFF write: {e}");
        process::exit(1);
    }
    pins.release();
    info!("done");
}
