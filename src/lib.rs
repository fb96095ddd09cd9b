// Copyright 2026, the ezo_i2c contributors
//
// Licensed under the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>,
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Polling and logging for Atlas Scientific EZO circuits (ORP, pH, RTD)
//! on a Linux I2C bus.
//!
//! Operations taken from the EZO circuit datasheets: every command is ASCII
//! terminated by a NUL byte, every reply is a status byte followed by ASCII.
//! Calibration is not implemented beyond passing the raw commands through.
//!
//! Two binaries are built on top of the library:
//!
//! - `ezo-i2c` an interactive console (`list`, `help`, `poll`, `log`,
//!   `all:<cmd>`, `<address>:<cmd>` or any raw command)
//! - `ezo-capture` a headless logging run
//!
//! Logging runs write `<data dir>/<start time>_octopi.csv` and upload it to
//! Google Cloud Storage when the run ends.
//!
//! ## Basic Example
//!
//! Reading every circuit on the bus once
//!
//!```no_run
//!use ezo_i2c::discovery::discover;
//!use ezo_i2c::ezo::{LinuxBus, Timeouts};
//!use std::thread;
//!
//!fn main() {
//!    let bus = LinuxBus::new("/dev/i2c-1");
//!    let mut devices = discover(&bus, Timeouts::default());
//!
//!    for device in devices.iter_mut() {
//!        device.write("R").unwrap();
//!    }
//!    thread::sleep(Timeouts::default().long);
//!    for device in devices.iter_mut() {
//!        match device.read() {
//!            Ok(reply) => println!("{}", reply),
//!            Err(e) => println!("Error reading {}: {}", device.info(), e),
//!        }
//!    }
//!}
//!```
//!

pub mod command;
pub mod config;
pub mod csvlog;
pub mod discovery;
pub mod dispatcher;
/// EZO circuit handle, reply decoding and the bus seam
pub mod ezo;
pub mod interrupt;
pub mod poll;
pub mod upload;

#[cfg(test)]
mod testing;

use anyhow::Result;

/// Install the `tracing` subscriber, filtered by `RUST_LOG`.
///
/// Output goes to stderr so it does not interleave with readings.
pub fn init_tracing() -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,ezo_i2c=info".into());
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!(err.to_string()))?;
    Ok(())
}
