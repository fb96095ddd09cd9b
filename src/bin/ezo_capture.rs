// Copyright 2026, the ezo_i2c contributors
//
// Licensed under the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>,
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Headless logging run: poll every EZO circuit into a CSV file and upload
//! it when the run ends.

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{bail, Result};
use chrono::Local;
use clap::Parser;
use tracing::info;

use ezo_i2c::config::Config;
use ezo_i2c::csvlog::log_path;
use ezo_i2c::discovery::discover;
use ezo_i2c::ezo::{LinuxBus, Timeouts};
use ezo_i2c::interrupt::Interrupt;
use ezo_i2c::poll::{self, LogPlan, DEFAULT_DURATION_HOURS};
use ezo_i2c::upload::GcsStore;

#[derive(Parser)]
#[command(name = "ezo-capture", version, about = "Log EZO sensor data to CSV and upload to GCS")]
struct Cli {
    /// poll rate in seconds
    #[arg(short = 'r', long = "poll_rate", value_name = "N", default_value_t = 5.0)]
    poll_rate: f64,
    /// length of run in hours
    #[arg(short = 'd', long = "duration", value_name = "N", default_value_t = DEFAULT_DURATION_HOURS)]
    duration: f64,
    /// i2c character device, overrides EZO_I2C_BUS
    #[arg(long)]
    bus: Option<PathBuf>,
    #[arg(long, default_value = "pershing_caron_data")]
    data_dir: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    ezo_i2c::init_tracing()?;
    let config = Config::from_env()?.with_bus(cli.bus);

    let bus = LinuxBus::new(&config.bus_path);
    let mut devices = discover(&bus, Timeouts::default());
    if devices.is_empty() {
        bail!("No Devices Found");
    }

    let mut out = io::stdout();
    let plan = LogPlan {
        interval: poll::clamp_interval(cli.poll_rate, poll::minimum_interval(&devices), &mut out)?,
        max_hours: cli.duration,
        path: log_path(&cli.data_dir, Local::now()),
    };
    let store = GcsStore::new(config.storage)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let summary = runtime.block_on(async {
        let mut interrupt = Interrupt::listen()?;
        poll::log_and_upload(&mut devices, &plan, &store, &mut out, interrupt.wait()).await
    })?;
    out.flush()?;
    info!(cycles = summary.cycles, path = %plan.path.display(), "capture finished");
    Ok(())
}
