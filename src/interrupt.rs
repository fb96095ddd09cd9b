// Copyright 2026, the ezo_i2c contributors
//
// Licensed under the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>,
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Process wide Ctrl-C latch.
//!
//! One SIGINT listener lives for the whole process and bumps a counter.
//! A press that lands while nothing is waiting (a device query, the i2c
//! writes of a cycle, an upload) is still seen by the next [`Interrupt::wait`].

use std::future::pending;
use std::io;

use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::debug;

#[derive(Debug)]
pub struct Interrupt {
    presses: watch::Receiver<u64>,
}

impl Interrupt {
    /// Install the SIGINT handler and start counting presses.
    ///
    /// Must be called from inside a tokio runtime.
    pub fn listen() -> io::Result<Interrupt> {
        let mut sigint = signal(SignalKind::interrupt())?;
        let (presses, interrupt) = Interrupt::channel();
        tokio::spawn(async move {
            while sigint.recv().await.is_some() {
                debug!("interrupt received");
                presses.send_modify(|count| *count += 1);
            }
        });
        Ok(interrupt)
    }

    /// A latch driven by the returned sender instead of SIGINT.
    pub fn channel() -> (watch::Sender<u64>, Interrupt) {
        let (tx, rx) = watch::channel(0);
        (tx, Interrupt { presses: rx })
    }

    /// Resolves once for every press not yet consumed, including presses
    /// made before this call. Never resolves once the sender is gone.
    pub async fn wait(&mut self) {
        if self.presses.changed().await.is_err() {
            pending::<()>().await;
        }
    }
}
