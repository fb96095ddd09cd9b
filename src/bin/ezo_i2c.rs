// Copyright 2026, the ezo_i2c contributors
//
// Licensed under the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>,
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Interactive console for the EZO circuits on one bus.

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;
use tracing::info;

use ezo_i2c::config::Config;
use ezo_i2c::discovery::discover;
use ezo_i2c::dispatcher::Dispatcher;
use ezo_i2c::ezo::{LinuxBus, Timeouts};
use ezo_i2c::interrupt::Interrupt;
use ezo_i2c::upload::GcsStore;

#[derive(Parser)]
#[command(name = "ezo-i2c", version, about = "Interactive console for Atlas Scientific EZO circuits")]
struct Cli {
    /// i2c character device, overrides EZO_I2C_BUS
    #[arg(long)]
    bus: Option<PathBuf>,
    /// Directory for LOG output files
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    ezo_i2c::init_tracing()?;
    let config = Config::from_env()?.with_bus(cli.bus);

    let bus = LinuxBus::new(&config.bus_path);
    info!(bus = %bus.path().display(), "scanning for EZO devices");
    let devices = discover(&bus, Timeouts::default());
    if devices.is_empty() {
        bail!("No EZO devices found on {}", bus.path().display());
    }

    let store = GcsStore::new(config.storage)?;
    let mut dispatcher = Dispatcher::new(devices, store, cli.data_dir, std::io::stdout())?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(async {
        let mut interrupt = Interrupt::listen()?;
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        dispatcher.run(stdin, &mut interrupt).await
    });
    // the stdin reader thread may still be parked in a blocking read
    runtime.shutdown_background();
    result
}
