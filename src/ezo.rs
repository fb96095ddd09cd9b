// Copyright 2026, the ezo_i2c contributors
//
// Licensed under the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>,
// This file may not be copied, modified, or distributed
// except according to those terms.

use i2cdev::core::I2CDevice;
use i2cdev::linux::LinuxI2CDevice;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::{thread, time::Duration};

/// Bytes returned by a single EZO read: one status byte plus the payload.
pub const READ_LEN: usize = 31;

/// Delay the circuits need before a reading or calibration reply is valid.
pub const LONG_TIMEOUT: Duration = Duration::from_millis(1500);

/// Delay for every other command.
pub const SHORT_TIMEOUT: Duration = Duration::from_millis(300);

const LONG_TIMEOUT_COMMANDS: [&str; 2] = ["R", "CAL"];
const SLEEP_COMMANDS: [&str; 1] = ["SLEEP"];

///
///EZO error enum. Io wraps any failure of the
///underlying bus transfer, Status is a reply whose
///status byte is not success, Reading is a reply
///payload that is not a number
///
#[derive(Debug, thiserror::Error)]
pub enum EzoError {
    /// Input/output error on the bus
    #[error("i2c transfer failed: {0}")]
    Io(#[from] io::Error),
    /// The device answered with a non-success status code
    #[error("{device} replied with status {code}")]
    Status { device: String, code: u8 },
    /// The reply payload could not be parsed as a reading
    #[error("malformed sensor reading {raw:?}")]
    Reading { raw: String },
}

/// Raw byte access to a single device on the bus.
///
/// Implemented for `LinuxI2CDevice`; tests provide an in-memory bus.
pub trait Transport {
    fn write(&mut self, data: &[u8]) -> io::Result<()>;
    fn read(&mut self, buf: &mut [u8]) -> io::Result<()>;
}

/// Opens a [`Transport`] bound to one slave address.
pub trait Bus {
    type Handle: Transport;

    fn open(&self, address: u16) -> io::Result<Self::Handle>;
}

impl Transport for LinuxI2CDevice {
    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        I2CDevice::write(self, data).map_err(io::Error::other)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<()> {
        I2CDevice::read(self, buf).map_err(io::Error::other)
    }
}

/// A Linux i2c-dev character device such as `/dev/i2c-1`.
#[derive(Debug, Clone)]
pub struct LinuxBus {
    path: PathBuf,
}

impl LinuxBus {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Bus for LinuxBus {
    type Handle = LinuxI2CDevice;

    fn open(&self, address: u16) -> io::Result<LinuxI2CDevice> {
        LinuxI2CDevice::new(&self.path, address).map_err(io::Error::other)
    }
}

/// Settle delays used when talking to a circuit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timeouts {
    pub long: Duration,
    pub short: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            long: LONG_TIMEOUT,
            short: SHORT_TIMEOUT,
        }
    }
}

/// Status byte at the head of every EZO reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCode {
    Success,
    SyntaxError,
    Pending,
    NoData,
    Unknown(u8),
}

impl ResponseCode {
    pub fn code(self) -> u8 {
        match self {
            ResponseCode::Success => 1,
            ResponseCode::SyntaxError => 2,
            ResponseCode::Pending => 254,
            ResponseCode::NoData => 255,
            ResponseCode::Unknown(code) => code,
        }
    }
}

impl From<u8> for ResponseCode {
    fn from(code: u8) -> Self {
        match code {
            1 => ResponseCode::Success,
            2 => ResponseCode::SyntaxError,
            254 => ResponseCode::Pending,
            255 => ResponseCode::NoData,
            other => ResponseCode::Unknown(other),
        }
    }
}

/// One decoded answer from a circuit.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    /// Label of the device that answered, see [`EzoDevice::info`]
    pub device: String,
    pub status: ResponseCode,
    /// ASCII payload without NUL padding
    pub text: String,
}

impl Reply {
    /// Decode a raw read buffer.
    ///
    /// Some Raspberry Pi i2c controllers set the MSB on returned bytes,
    /// so it is masked off before the payload is turned into text.
    pub fn decode(device: impl Into<String>, raw: &[u8]) -> Reply {
        let status = raw.first().copied().map(ResponseCode::from).unwrap_or(ResponseCode::NoData);
        let text = raw
            .iter()
            .skip(1)
            .map(|byte| byte & 0x7f)
            .take_while(|byte| *byte != 0)
            .map(char::from)
            .collect();
        Reply {
            device: device.into(),
            status,
            text,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseCode::Success
    }

    /// The reply as a sensor reading.
    pub fn value(&self) -> Result<f64, EzoError> {
        if !self.is_success() {
            return Err(EzoError::Status {
                device: self.device.clone(),
                code: self.status.code(),
            });
        }
        parse_reading(&self.text)
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_success() {
            write!(f, "Success {}: {}", self.device, self.text)
        } else {
            write!(f, "Error {}: {}", self.device, self.status.code())
        }
    }
}

/// Parse a reading of the form `"<label>: <value>"` or a bare value.
///
/// Only the text after the last `": "` is used and NUL padding is dropped.
pub fn parse_reading(raw: &str) -> Result<f64, EzoError> {
    let value = raw.rsplit(": ").next().unwrap_or(raw).replace('\0', "");
    value.trim().parse::<f64>().map_err(|_| EzoError::Reading {
        raw: raw.to_string(),
    })
}

/// Settle delay before `command` can be answered, `None` for sleep commands.
pub fn command_timeout(command: &str, timeouts: &Timeouts) -> Option<Duration> {
    let upper = command.trim().to_uppercase();
    if LONG_TIMEOUT_COMMANDS.iter().any(|prefix| upper.starts_with(prefix)) {
        Some(timeouts.long)
    } else if SLEEP_COMMANDS.iter().any(|prefix| upper.starts_with(prefix)) {
        None
    } else {
        Some(timeouts.short)
    }
}

/// EZO circuit handle, wraps a [`Transport`] bound
/// to the circuit address and implements the
/// EZO command/response exchange
///
pub struct EzoDevice<T> {
    address: u16,
    module: String,
    name: String,
    timeouts: Timeouts,
    transport: T,
}

/// Implementation of EZO related
/// operations
///
///
impl<T: Transport> EzoDevice<T> {
    /// Create a handle for the circuit at `address`.
    ///
    /// `module` is the circuit type reported by the `i` command
    /// (`ORP`, `pH`, `RTD`...), `name` the user assigned name.
    ///
    pub fn new(
        transport: T,
        address: u16,
        module: impl Into<String>,
        name: impl Into<String>,
        timeouts: Timeouts,
    ) -> EzoDevice<T> {
        EzoDevice {
            address,
            module: module.into(),
            name: name.into(),
            timeouts,
            transport,
        }
    }

    /// Same circuit, labelled with what the `i` and `name,?` queries returned.
    pub fn with_identity(self, module: impl Into<String>, name: impl Into<String>) -> EzoDevice<T> {
        EzoDevice {
            module: module.into(),
            name: name.into(),
            ..self
        }
    }

    pub fn address(&self) -> u16 {
        self.address
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Minimum delay between a read request and a valid reading.
    pub fn long_timeout(&self) -> Duration {
        self.timeouts.long
    }

    pub fn timeouts(&self) -> &Timeouts {
        &self.timeouts
    }

    /// Label used in listings and reply lines.
    pub fn info(&self) -> String {
        if self.name.is_empty() {
            format!("{} {}", self.module, self.address)
        } else {
            format!("{} {} {}", self.module, self.address, self.name)
        }
    }

    /// Sends `command` terminated by a NUL byte.
    /// If fails return the bus error.
    ///
    pub fn write(&mut self, command: &str) -> Result<(), EzoError> {
        let mut buffer = Vec::with_capacity(command.len() + 1);
        buffer.extend_from_slice(command.as_bytes());
        buffer.push(0);
        self.transport.write(&buffer)?;
        Ok(())
    }

    /// Reads the pending reply of the circuit.
    /// A non-success status is still returned as a [`Reply`],
    /// only bus failures are errors.
    ///
    pub fn read(&mut self) -> Result<Reply, EzoError> {
        let mut data_buffer = [0u8; READ_LEN];
        self.transport.read(&mut data_buffer)?;
        Ok(Reply::decode(self.info(), &data_buffer))
    }

    pub fn command_timeout(&self, command: &str) -> Option<Duration> {
        command_timeout(command, &self.timeouts)
    }

    /// Write `command`, wait for its settle delay and read the reply.
    /// Returns `None` for sleep commands, which never answer.
    ///
    pub fn query(&mut self, command: &str) -> Result<Option<Reply>, EzoError> {
        self.write(command)?;
        match self.command_timeout(command) {
            Some(timeout) => {
                thread::sleep(timeout);
                self.read().map(Some)
            }
            None => Ok(None),
        }
    }
}
