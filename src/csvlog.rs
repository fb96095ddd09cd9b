// Copyright 2026, the ezo_i2c contributors
//
// Licensed under the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>,
// This file may not be copied, modified, or distributed
// except according to those terms.

//! CSV output of a logging run.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};

pub const TIMESTAMP_COLUMN: &str = "t_stamp";
pub const ELAPSED_COLUMN: &str = "t_rel (min)";

const ROW_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const FILE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H:%M:%S";
const FILE_SUFFIX: &str = "_octopi.csv";

/// One poll cycle worth of readings.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadingRow {
    pub timestamp: DateTime<Local>,
    pub elapsed_minutes: f64,
    /// One value per device, in device order.
    pub values: Vec<f64>,
}

impl ReadingRow {
    fn record(&self) -> Vec<String> {
        let mut record = Vec::with_capacity(self.values.len() + 2);
        record.push(self.timestamp.format(ROW_TIMESTAMP_FORMAT).to_string());
        // `{:?}` keeps the decimal point on whole numbers: 7.0, not 7
        record.push(format!("{:?}", self.elapsed_minutes));
        record.extend(self.values.iter().map(|value| format!("{value:?}")));
        record
    }
}

/// `<data_dir>/<start timestamp>_octopi.csv`
pub fn log_path(data_dir: &Path, started: DateTime<Local>) -> PathBuf {
    data_dir.join(format!(
        "{}{}",
        started.format(FILE_TIMESTAMP_FORMAT),
        FILE_SUFFIX
    ))
}

/// Header for a run over devices of the given module types.
pub fn header<'a>(modules: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    [TIMESTAMP_COLUMN, ELAPSED_COLUMN]
        .into_iter()
        .chain(modules)
        .map(str::to_string)
        .collect()
}

/// Append-only CSV file, flushed after every row so an interrupted run
/// keeps everything written so far.
pub struct CsvLog {
    path: PathBuf,
    writer: csv::Writer<File>,
}

impl CsvLog {
    pub fn create(path: impl Into<PathBuf>, header: &[String]) -> Result<CsvLog> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let file = File::options()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        let mut writer = csv::Writer::from_writer(file);
        writer.write_record(header)?;
        writer.flush()?;
        Ok(CsvLog { path, writer })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&mut self, row: &ReadingRow) -> Result<()> {
        self.writer
            .write_record(row.record())
            .with_context(|| format!("failed to write row to {}", self.path.display()))?;
        self.writer.flush()?;
        Ok(())
    }
}
