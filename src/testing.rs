// Copyright 2026, the ezo_i2c contributors
//
// Licensed under the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>,
// This file may not be copied, modified, or distributed
// except according to those terms.

//! In-memory i2c bus for unit tests.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::ezo::{Bus, EzoDevice, Timeouts, Transport};
use crate::upload::ObjectStore;

impl Timeouts {
    pub fn instant() -> Self {
        Self {
            long: Duration::ZERO,
            short: Duration::ZERO,
        }
    }
}

/// Scripted circuit: replies are keyed by the upper-cased command text.
#[derive(Debug, Clone, Default)]
pub struct MockDevice {
    replies: HashMap<String, (u8, String)>,
    last_command: Option<String>,
    written: Vec<Vec<u8>>,
    reads: usize,
    failing: bool,
}

impl MockDevice {
    /// A circuit answering the identity and name queries.
    pub fn ezo(module: &str, name: &str) -> Self {
        MockDevice::foreign()
            .reply("I", &format!("?I,{module},2.10"))
            .reply("NAME,?", &format!("?NAME,{name}"))
    }

    /// Something on the bus that acknowledges reads but speaks no EZO.
    pub fn foreign() -> Self {
        MockDevice::default()
    }

    pub fn reply(mut self, command: &str, text: &str) -> Self {
        self.replies
            .insert(command.to_uppercase(), (1, text.to_string()));
        self
    }

    pub fn status(mut self, command: &str, code: u8) -> Self {
        self.replies
            .insert(command.to_uppercase(), (code, String::new()));
        self
    }

    pub fn reading(self, value: &str) -> Self {
        self.reply("R", value)
    }

    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockBus {
    devices: Arc<Mutex<HashMap<u16, MockDevice>>>,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, address: u16, device: MockDevice) {
        self.devices.lock().unwrap().insert(address, device);
    }

    pub fn written(&self, address: u16) -> Vec<Vec<u8>> {
        self.devices.lock().unwrap()[&address].written.clone()
    }

    pub fn reads(&self, address: u16) -> usize {
        self.devices.lock().unwrap()[&address].reads
    }

    /// Opened handles for every attached address, in address order.
    pub fn handles(&self, timeouts: Timeouts) -> Vec<EzoDevice<MockTransport>> {
        let devices = self.devices.lock().unwrap();
        let mut addresses: Vec<u16> = devices.keys().copied().collect();
        addresses.sort_unstable();
        addresses
            .into_iter()
            .map(|address| {
                let module = devices[&address]
                    .replies
                    .get("I")
                    .and_then(|(_, text)| text.split(',').nth(1))
                    .unwrap_or("")
                    .to_string();
                let transport = MockTransport {
                    address,
                    devices: self.devices.clone(),
                };
                EzoDevice::new(transport, address, module, "", timeouts)
            })
            .collect()
    }
}

impl Bus for MockBus {
    type Handle = MockTransport;

    fn open(&self, address: u16) -> io::Result<MockTransport> {
        Ok(MockTransport {
            address,
            devices: self.devices.clone(),
        })
    }
}

#[derive(Debug)]
pub struct MockTransport {
    address: u16,
    devices: Arc<Mutex<HashMap<u16, MockDevice>>>,
}

fn no_device() -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, "no such device or address")
}

impl Transport for MockTransport {
    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        let mut devices = self.devices.lock().unwrap();
        let device = devices.get_mut(&self.address).ok_or_else(no_device)?;
        if device.failing {
            return Err(io::Error::new(io::ErrorKind::Other, "remote i/o error"));
        }
        device.written.push(data.to_vec());
        let command = String::from_utf8_lossy(data).trim_end_matches('\0').to_uppercase();
        device.last_command = Some(command);
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<()> {
        let mut devices = self.devices.lock().unwrap();
        let device = devices.get_mut(&self.address).ok_or_else(no_device)?;
        if device.failing {
            return Err(io::Error::new(io::ErrorKind::Other, "remote i/o error"));
        }
        device.reads += 1;
        buf.fill(0);
        let (status, text) = match &device.last_command {
            None => (1, String::new()),
            Some(command) => device
                .replies
                .get(command)
                .cloned()
                .unwrap_or((2, String::new())),
        };
        if let Some(first) = buf.first_mut() {
            *first = status;
        }
        for (slot, byte) in buf.iter_mut().skip(1).zip(text.bytes()) {
            *slot = byte;
        }
        Ok(())
    }
}

/// Object store that keeps a copy of every uploaded file.
#[derive(Debug, Clone, Default)]
pub struct RecordingStore {
    uploads: Arc<Mutex<Vec<(PathBuf, String)>>>,
}

impl RecordingStore {
    pub fn uploads(&self) -> Vec<(PathBuf, String)> {
        self.uploads.lock().unwrap().clone()
    }
}

impl ObjectStore for RecordingStore {
    async fn put_file(&self, local: &Path) -> anyhow::Result<()> {
        let contents = std::fs::read_to_string(local)?;
        self.uploads
            .lock()
            .unwrap()
            .push((local.to_path_buf(), contents));
        Ok(())
    }
}
