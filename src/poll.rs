// Copyright 2026, the ezo_i2c contributors
//
// Licensed under the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>,
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Fixed cadence polling of every device, optionally logged to CSV.
//!
//! A cycle writes the read request to every device, waits one interval and
//! then reads every device back in the same order. The wait is the only
//! point where an interrupt is observed.

use std::future::Future;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;
use tokio::time::{sleep, Instant};
use tracing::{info, warn};

use crate::csvlog::{self, CsvLog, ReadingRow};
use crate::ezo::{EzoDevice, Transport};
use crate::upload::ObjectStore;

pub const READ_COMMAND: &str = "R";
pub const DEFAULT_DURATION_HOURS: f64 = 80.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    DurationElapsed,
    Interrupted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub stop: StopReason,
    pub cycles: u64,
}

/// Parameters of a logging run.
#[derive(Debug, Clone)]
pub struct LogPlan {
    pub interval: Duration,
    pub max_hours: f64,
    pub path: PathBuf,
}

/// Shortest interval that still gives every device time to answer.
pub fn minimum_interval<T: Transport>(devices: &[EzoDevice<T>]) -> Duration {
    devices
        .iter()
        .map(EzoDevice::long_timeout)
        .max()
        .unwrap_or_default()
}

/// Raise `requested` seconds to `floor`, telling the user when it happens.
pub fn clamp_interval<W: Write>(requested: f64, floor: Duration, out: &mut W) -> Result<Duration> {
    if requested < floor.as_secs_f64() {
        writeln!(
            out,
            "Polling time is shorter than timeout, setting polling time to {:.2}",
            floor.as_secs_f64()
        )?;
        warn!(requested, floor = floor.as_secs_f64(), "polling time raised to device timeout");
        return Ok(floor);
    }
    Duration::try_from_secs_f64(requested)
        .with_context(|| format!("invalid polling time {requested}"))
}

/// Poll until interrupted, printing every reply.
pub async fn poll<T, W, F>(
    devices: &mut [EzoDevice<T>],
    interval: Duration,
    out: &mut W,
    interrupt: F,
) -> Result<RunSummary>
where
    T: Transport,
    W: Write,
    F: Future<Output = ()>,
{
    info!(interval = ?interval, devices = devices.len(), "polling started");
    let summary = run_cycles(devices, interval, None, None, out, interrupt).await?;
    info!(cycles = summary.cycles, "polling stopped");
    Ok(summary)
}

/// Poll into a CSV file until the duration elapses or the run is
/// interrupted, then upload the file.
///
/// Errors while polling abort the run before the upload; rows already
/// written stay on disk.
pub async fn log_and_upload<T, W, S, F>(
    devices: &mut [EzoDevice<T>],
    plan: &LogPlan,
    store: &S,
    out: &mut W,
    interrupt: F,
) -> Result<RunSummary>
where
    T: Transport,
    W: Write,
    S: ObjectStore,
    F: Future<Output = ()>,
{
    let header = csvlog::header(devices.iter().map(|device| device.module()));
    let mut log = CsvLog::create(&plan.path, &header)?;
    info!(
        path = %plan.path.display(),
        interval = ?plan.interval,
        max_hours = plan.max_hours,
        "log run started"
    );

    let summary = run_cycles(
        devices,
        plan.interval,
        Some(&mut log),
        Some(plan.max_hours),
        out,
        interrupt,
    )
    .await?;
    info!(stop = ?summary.stop, cycles = summary.cycles, "log run finished");

    writeln!(out, "Uploading file...")?;
    store.put_file(log.path()).await?;
    if summary.stop == StopReason::Interrupted {
        writeln!(out, "Continuous polling stopped")?;
    }
    Ok(summary)
}

async fn run_cycles<T, W, F>(
    devices: &mut [EzoDevice<T>],
    interval: Duration,
    mut log: Option<&mut CsvLog>,
    max_hours: Option<f64>,
    out: &mut W,
    interrupt: F,
) -> Result<RunSummary>
where
    T: Transport,
    W: Write,
    F: Future<Output = ()>,
{
    let banner = if log.is_some() {
        "-------press ctrl-c to stop the run"
    } else {
        "-------press ctrl-c to stop the polling"
    };
    let start = Instant::now();
    let mut cycles = 0;
    tokio::pin!(interrupt);

    loop {
        writeln!(out, "{banner}")?;
        for device in devices.iter_mut() {
            device.write(READ_COMMAND)?;
        }

        tokio::select! {
            _ = &mut interrupt => {
                return Ok(RunSummary { stop: StopReason::Interrupted, cycles });
            }
            _ = sleep(interval) => {}
        }

        let timestamp = Local::now();
        let elapsed_minutes = start.elapsed().as_secs_f64() / 60.0;
        let mut values = Vec::with_capacity(devices.len());
        for device in devices.iter_mut() {
            let reply = device.read()?;
            writeln!(out, "{reply}")?;
            if log.is_some() {
                values.push(reply.value()?);
            }
        }
        cycles += 1;

        if let Some(log) = log.as_deref_mut() {
            log.append(&ReadingRow {
                timestamp,
                elapsed_minutes,
                values,
            })?;
        }

        if let Some(max_hours) = max_hours {
            if elapsed_minutes / 60.0 > max_hours {
                return Ok(RunSummary {
                    stop: StopReason::DurationElapsed,
                    cycles,
                });
            }
        }
    }
}
