// Copyright 2026, the ezo_i2c contributors
//
// Licensed under the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>,
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Bus scan and EZO identification.

use tracing::{debug, info};

use crate::ezo::{Bus, EzoDevice, EzoError, Timeouts, Transport};

/// Highest 7-bit slave address.
const MAX_ADDRESS: u16 = 0x7f;

/// Addresses that acknowledge a one byte read.
pub fn scan<B: Bus>(bus: &B) -> Vec<u16> {
    (0..=MAX_ADDRESS)
        .filter(|&address| match bus.open(address) {
            Ok(mut handle) => handle.read(&mut [0u8; 1]).is_ok(),
            Err(_) => false,
        })
        .collect()
}

/// Scan the bus and keep every address that identifies as an EZO circuit.
///
/// The result is ordered by address and may be empty; callers decide
/// whether that is fatal.
pub fn discover<B: Bus>(bus: &B, timeouts: Timeouts) -> Vec<EzoDevice<B::Handle>> {
    let mut devices = Vec::new();
    for address in scan(bus) {
        match identify(bus, address, timeouts) {
            Ok(Some(device)) => {
                info!(address, module = device.module(), name = device.name(), "found EZO device");
                devices.push(device);
            }
            Ok(None) => debug!(address, "not an EZO device"),
            Err(err) => debug!(address, error = %err, "identity query failed"),
        }
    }
    devices
}

fn identify<B: Bus>(
    bus: &B,
    address: u16,
    timeouts: Timeouts,
) -> Result<Option<EzoDevice<B::Handle>>, EzoError> {
    let mut candidate = EzoDevice::new(bus.open(address)?, address, "", "", timeouts);
    let identity = match candidate.query("i")? {
        Some(reply) => reply.text,
        None => return Ok(None),
    };
    let module = match module_type(&identity) {
        Some(module) => module.to_string(),
        None => return Ok(None),
    };

    let name = candidate
        .query("name,?")?
        .and_then(|reply| reply.text.split(',').nth(1).map(str::to_string))
        .unwrap_or_default();

    Ok(Some(candidate.with_identity(module, name)))
}

/// Module type from an `i` reply such as `?I,pH,2.10`.
pub fn module_type(identity: &str) -> Option<&str> {
    let mut fields = identity.split(',');
    if !fields.next()?.ends_with("?I") {
        return None;
    }
    fields.next()
}
