// Copyright 2026, the ezo_i2c contributors
//
// Licensed under the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>,
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Parsing of the interactive command line.

/// One line typed at the prompt.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    List,
    Help,
    /// `POLL[,interval]`
    Poll { interval: Option<f64> },
    /// `LOG[,interval[,hours]]`
    Log {
        interval: Option<f64>,
        hours: Option<f64>,
    },
    /// `ALL:<cmd>`
    All(String),
    /// `<address>:<cmd>`
    Addressed { address: String, command: String },
    /// Anything else goes to the active device untouched.
    Raw(String),
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum CommandError {
    #[error("invalid {field} {value:?}, expected a number")]
    InvalidNumber { field: &'static str, value: String },
}

impl Command {
    pub fn parse(line: &str) -> Result<Command, CommandError> {
        let line = line.trim();
        let upper = line.to_uppercase();

        if upper.starts_with("LIST") {
            Ok(Command::List)
        } else if upper.starts_with("HELP") {
            Ok(Command::Help)
        } else if upper.starts_with("POLL") {
            let mut args = line.split(',').skip(1);
            Ok(Command::Poll {
                interval: number(args.next(), "polling time")?,
            })
        } else if upper.starts_with("LOG") {
            let mut args = line.split(',').skip(1);
            Ok(Command::Log {
                interval: number(args.next(), "polling time")?,
                hours: number(args.next(), "duration")?,
            })
        } else if upper.starts_with("ALL:") {
            Ok(Command::All(field(line, 1)))
        } else if line.contains(':') {
            Ok(Command::Addressed {
                address: field(line, 0).trim().to_string(),
                command: field(line, 1),
            })
        } else {
            Ok(Command::Raw(line.to_string()))
        }
    }
}

fn field(line: &str, index: usize) -> String {
    line.split(':').nth(index).unwrap_or("").to_string()
}

fn number(arg: Option<&str>, field: &'static str) -> Result<Option<f64>, CommandError> {
    let Some(arg) = arg else {
        return Ok(None);
    };
    match arg.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(Some(value)),
        _ => Err(CommandError::InvalidNumber {
            field,
            value: arg.to_string(),
        }),
    }
}
