// Copyright 2026, the ezo_i2c contributors
//
// Licensed under the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>,
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Interactive command loop over the discovered devices.

use std::future::Future;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{ensure, Result};
use chrono::Local;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::command::Command;
use crate::csvlog;
use crate::ezo::{EzoDevice, EzoError, Reply, Transport};
use crate::interrupt::Interrupt;
use crate::poll::{self, LogPlan, StopReason, DEFAULT_DURATION_HOURS};
use crate::upload::ObjectStore;

const PROMPT: &str = ">> Enter command: ";
const QUERY_FAILED: &str =
    "Query failed \n - Address may be invalid, use list command to see available addresses";

pub fn help_text(long_timeout: Duration) -> String {
    let timeout = long_timeout.as_secs_f64();
    format!(
        r#"
>> Atlas Scientific EZO I2C console
>> Any commands entered are passed to the default target device via I2C except:
  - Help
      brings up this menu
  - List
      lists the available I2C circuits.
      the --> indicates the target device that will receive individual commands
  - xxx:[command]
      sends the command to the device at I2C address xxx
      and sets future communications to that address
      Ex: "102:status" will send the command status to address 102
  - all:[command]
      sends the command to all devices
  - Poll[,x.xx]
      command continuously polls all devices
      the optional argument [,x.xx] lets you set a polling time
      where x.xx is greater than the minimum {timeout:.2} second timeout.
      by default it will poll every {timeout:.2} seconds
  - Log[,x.xx,hh]
      continuously polls all devices at polling rate x.xx seconds
      logs values to csv file YYYY-MM-DD-HH:MM:SS_octopi.csv
      terminates logging after hh hours, or defaults to {hours} hrs
>> Pressing ctrl-c will stop the polling
"#,
        hours = DEFAULT_DURATION_HOURS
    )
}

/// Holds the device list and the active target between commands.
pub struct Dispatcher<T, S, W> {
    devices: Vec<EzoDevice<T>>,
    active: usize,
    store: S,
    data_dir: PathBuf,
    out: W,
}

impl<T, S, W> Dispatcher<T, S, W>
where
    T: Transport,
    S: ObjectStore,
    W: Write,
{
    /// The first device becomes the active target.
    pub fn new(devices: Vec<EzoDevice<T>>, store: S, data_dir: PathBuf, out: W) -> Result<Self> {
        ensure!(!devices.is_empty(), "No EZO devices found");
        Ok(Self {
            devices,
            active: 0,
            store,
            data_dir,
            out,
        })
    }

    pub fn active(&self) -> &EzoDevice<T> {
        &self.devices[self.active]
    }

    pub fn into_output(self) -> W {
        self.out
    }

    pub fn print_help(&mut self) -> io::Result<()> {
        let text = help_text(poll::minimum_interval(&self.devices));
        writeln!(self.out, "{text}")
    }

    pub fn print_devices(&mut self) -> io::Result<()> {
        for (index, device) in self.devices.iter().enumerate() {
            let marker = if index == self.active { "--> " } else { " - " };
            writeln!(self.out, "{marker}{}", device.info())?;
        }
        Ok(())
    }

    /// Read lines from `input` until it ends or `interrupt` fires at the
    /// prompt. The same latch stops each POLL or LOG run.
    pub async fn run<R>(&mut self, input: R, interrupt: &mut Interrupt) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        self.print_help()?;
        self.print_devices()?;

        let mut lines = input.lines();
        loop {
            write!(self.out, "{PROMPT}")?;
            self.out.flush()?;

            let line = tokio::select! {
                line = lines.next_line() => line?,
                _ = interrupt.wait() => {
                    writeln!(self.out)?;
                    break;
                }
            };
            let Some(line) = line else {
                break;
            };
            if line.trim().is_empty() {
                continue;
            }
            self.handle_line(&line, interrupt.wait()).await?;
        }
        Ok(())
    }

    /// Execute one command line.
    ///
    /// Device communication failures are reported and swallowed; failures
    /// inside a POLL or LOG run are returned.
    pub async fn handle_line<F>(&mut self, line: &str, interrupt: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let command = match Command::parse(line) {
            Ok(command) => command,
            Err(err) => {
                writeln!(self.out, "{err}")?;
                return Ok(());
            }
        };
        debug!(?command, "dispatching");

        match command {
            Command::List => self.print_devices()?,
            Command::Help => self.print_help()?,
            Command::Poll { interval } => self.poll(interval, interrupt).await?,
            Command::Log { interval, hours } => self.log(interval, hours, interrupt).await?,
            Command::All(command) => {
                let result = self.broadcast(&command).await;
                match result {
                    Ok(replies) => {
                        for reply in replies {
                            writeln!(self.out, "{reply}")?;
                        }
                    }
                    Err(err) => self.query_failed(&err)?,
                }
            }
            Command::Addressed { address, command } => {
                let index = address
                    .parse::<u16>()
                    .ok()
                    .and_then(|address| self.devices.iter().position(|d| d.address() == address));
                match index {
                    Some(index) => {
                        self.active = index;
                        let result = self.query(index, &command).await;
                        self.print_query(result)?;
                    }
                    None => writeln!(self.out, "No device found at address {address}")?,
                }
            }
            Command::Raw(command) => {
                let result = self.query(self.active, &command).await;
                self.print_query(result)?;
            }
        }
        Ok(())
    }

    /// Write `command` to every device, then read them all back unless the
    /// command never answers.
    async fn broadcast(&mut self, command: &str) -> Result<Vec<Reply>, EzoError> {
        for device in self.devices.iter_mut() {
            device.write(command)?;
        }
        let Some(timeout) = self.devices[0].command_timeout(command) else {
            return Ok(Vec::new());
        };
        sleep(timeout).await;
        self.devices.iter_mut().map(|device| device.read()).collect()
    }

    /// Write, settle and read one device without blocking the runtime.
    async fn query(&mut self, index: usize, command: &str) -> Result<Option<Reply>, EzoError> {
        let device = &mut self.devices[index];
        device.write(command)?;
        let Some(timeout) = device.command_timeout(command) else {
            return Ok(None);
        };
        sleep(timeout).await;
        device.read().map(Some)
    }

    fn print_query(&mut self, result: Result<Option<Reply>, EzoError>) -> io::Result<()> {
        match result {
            Ok(Some(reply)) => writeln!(self.out, "{reply}"),
            Ok(None) => writeln!(self.out, "sleep mode"),
            Err(err) => self.query_failed(&err),
        }
    }

    fn query_failed(&mut self, err: &EzoError) -> io::Result<()> {
        warn!(error = %err, "device query failed");
        writeln!(self.out, "{QUERY_FAILED}")
    }

    fn interval(&mut self, requested: Option<f64>) -> Result<Duration> {
        let floor = poll::minimum_interval(&self.devices);
        poll::clamp_interval(
            requested.unwrap_or(floor.as_secs_f64()),
            floor,
            &mut self.out,
        )
    }

    async fn poll<F>(&mut self, interval: Option<f64>, interrupt: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let interval = self.interval(interval)?;
        poll::poll(&mut self.devices, interval, &mut self.out, interrupt).await?;
        writeln!(self.out, "Continuous polling stopped")?;
        self.print_devices()?;
        Ok(())
    }

    async fn log<F>(&mut self, interval: Option<f64>, hours: Option<f64>, interrupt: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let plan = LogPlan {
            interval: self.interval(interval)?,
            max_hours: hours.unwrap_or(DEFAULT_DURATION_HOURS),
            path: csvlog::log_path(&self.data_dir, Local::now()),
        };
        let summary =
            poll::log_and_upload(&mut self.devices, &plan, &self.store, &mut self.out, interrupt)
                .await?;
        if summary.stop == StopReason::Interrupted {
            self.print_devices()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ezo::Timeouts;
    use crate::testing::{MockBus, MockDevice, MockTransport, RecordingStore};
    use std::future::pending;

    type TestDispatcher = Dispatcher<MockTransport, RecordingStore, Vec<u8>>;

    fn rig(timeouts: Timeouts) -> (MockBus, TestDispatcher, RecordingStore, tempfile::TempDir) {
        let bus = MockBus::new();
        bus.attach(98, MockDevice::ezo("ORP", "").reading("231.4"));
        bus.attach(99, MockDevice::ezo("pH", "").reading("7.021"));
        bus.attach(
            102,
            MockDevice::ezo("RTD", "").reading("25.104").reply("STATUS", "?STATUS,P,3.82"),
        );
        let store = RecordingStore::default();
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = Dispatcher::new(
            bus.handles(timeouts),
            store.clone(),
            dir.path().join("data"),
            Vec::new(),
        )
        .unwrap();
        (bus, dispatcher, store, dir)
    }

    fn output(dispatcher: TestDispatcher) -> String {
        String::from_utf8(dispatcher.into_output()).unwrap()
    }

    #[test]
    fn empty_device_list_is_fatal() {
        let result: Result<TestDispatcher> = Dispatcher::new(
            Vec::new(),
            RecordingStore::default(),
            PathBuf::from("data"),
            Vec::new(),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn list_marks_active_device() {
        let (_bus, mut dispatcher, _store, _dir) = rig(Timeouts::instant());
        dispatcher.handle_line("LIST", pending()).await.unwrap();
        assert_eq!(
            output(dispatcher),
            "--> ORP 98\n - pH 99\n - RTD 102\n"
        );
    }

    #[tokio::test]
    async fn address_prefix_switches_target_and_queries() {
        let (bus, mut dispatcher, _store, _dir) = rig(Timeouts::instant());

        dispatcher.handle_line("102:status", pending()).await.unwrap();

        assert_eq!(dispatcher.active().address(), 102);
        assert_eq!(bus.written(102), vec![b"status\0".to_vec()]);
        dispatcher.handle_line("list", pending()).await.unwrap();
        assert_eq!(
            output(dispatcher),
            "Success RTD 102: ?STATUS,P,3.82\n - ORP 98\n - pH 99\n--> RTD 102\n"
        );
    }

    #[tokio::test]
    async fn unknown_address_keeps_target() {
        let (_bus, mut dispatcher, _store, _dir) = rig(Timeouts::instant());

        dispatcher.handle_line("77:status", pending()).await.unwrap();
        dispatcher.handle_line("abc:status", pending()).await.unwrap();

        assert_eq!(dispatcher.active().address(), 98);
        assert_eq!(
            output(dispatcher),
            "No device found at address 77\nNo device found at address abc\n"
        );
    }

    #[tokio::test]
    async fn raw_command_goes_to_active_device() {
        let (bus, mut dispatcher, _store, _dir) = rig(Timeouts::instant());

        dispatcher.handle_line("r", pending()).await.unwrap();

        assert_eq!(bus.written(98), vec![b"r\0".to_vec()]);
        assert!(bus.written(99).is_empty());
        assert_eq!(output(dispatcher), "Success ORP 98: 231.4\n");
    }

    #[tokio::test]
    async fn failed_query_is_reported_and_loop_continues() {
        let bus = MockBus::new();
        bus.attach(98, MockDevice::ezo("ORP", "").failing());
        let mut dispatcher = Dispatcher::new(
            bus.handles(Timeouts::instant()),
            RecordingStore::default(),
            PathBuf::from("data"),
            Vec::new(),
        )
        .unwrap();

        dispatcher.handle_line("status", pending()).await.unwrap();
        dispatcher.handle_line("all:status", pending()).await.unwrap();

        let out = output(dispatcher);
        assert_eq!(out.matches("Query failed").count(), 2);
    }

    #[tokio::test]
    async fn broadcast_sleep_does_not_read() {
        let (bus, mut dispatcher, _store, _dir) = rig(Timeouts::instant());

        dispatcher.handle_line("ALL:Sleep", pending()).await.unwrap();

        for address in [98, 99, 102] {
            assert_eq!(bus.written(address), vec![b"Sleep\0".to_vec()]);
            assert_eq!(bus.reads(address), 0);
        }
        assert!(output(dispatcher).is_empty());
    }

    #[tokio::test]
    async fn broadcast_with_timeout_reads_every_device() {
        let (bus, mut dispatcher, _store, _dir) = rig(Timeouts::instant());

        dispatcher.handle_line("all:r", pending()).await.unwrap();

        for address in [98, 99, 102] {
            assert_eq!(bus.reads(address), 1);
        }
        assert_eq!(
            output(dispatcher),
            "Success ORP 98: 231.4\nSuccess pH 99: 7.021\nSuccess RTD 102: 25.104\n"
        );
    }

    #[tokio::test]
    async fn invalid_poll_argument_is_reported() {
        let (_bus, mut dispatcher, _store, _dir) = rig(Timeouts::instant());
        dispatcher.handle_line("poll,soon", pending()).await.unwrap();
        assert_eq!(
            output(dispatcher),
            "invalid polling time \"soon\", expected a number\n"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn poll_below_timeout_is_raised() {
        let (_bus, mut dispatcher, _store, _dir) = rig(Timeouts::default());

        dispatcher
            .handle_line("poll,0.2", tokio::time::sleep(Duration::from_secs(2)))
            .await
            .unwrap();

        let out = output(dispatcher);
        assert!(out.starts_with(
            "Polling time is shorter than timeout, setting polling time to 1.50\n"
        ));
        assert!(out.contains("Continuous polling stopped\n--> ORP 98\n"));
    }

    #[tokio::test(start_paused = true)]
    async fn log_with_zero_duration_uploads_one_row() {
        let (_bus, mut dispatcher, store, dir) = rig(Timeouts::default());

        dispatcher.handle_line("log,1.5,0", pending()).await.unwrap();

        let uploads = store.uploads();
        assert_eq!(uploads.len(), 1);
        assert!(uploads[0].0.starts_with(dir.path().join("data")));
        assert!(uploads[0]
            .0
            .to_string_lossy()
            .ends_with("_octopi.csv"));
        let lines: Vec<&str> = uploads[0].1.lines().collect();
        assert_eq!(lines[0], "t_stamp,t_rel (min),ORP,pH,RTD");
        assert_eq!(lines.len(), 2);
    }

    #[tokio::test]
    async fn run_reads_lines_until_end_of_input() {
        let (bus, mut dispatcher, _store, _dir) = rig(Timeouts::instant());
        let input: &[u8] = b"\n99:r\nhelp\n";
        let (_presses, mut interrupt) = Interrupt::channel();

        dispatcher.run(input, &mut interrupt).await.unwrap();

        assert_eq!(bus.written(99), vec![b"r\0".to_vec()]);
        let out = output(dispatcher);
        assert!(out.contains("Success pH 99: 7.021\n"));
        assert_eq!(out.matches(PROMPT).count(), 4);
        assert_eq!(out.matches(">> Atlas Scientific EZO I2C console").count(), 2);
    }

    #[tokio::test]
    async fn interrupt_at_prompt_ends_loop() {
        let (bus, mut dispatcher, _store, _dir) = rig(Timeouts::instant());
        let (_stdin, input) = tokio::io::duplex(64);
        let (presses, mut interrupt) = Interrupt::channel();
        presses.send_modify(|count| *count += 1);

        dispatcher
            .run(tokio::io::BufReader::new(input), &mut interrupt)
            .await
            .unwrap();

        assert!(bus.written(98).is_empty());
        assert!(output(dispatcher).ends_with(&format!("{PROMPT}\n")));
    }

    #[tokio::test(start_paused = true)]
    async fn press_made_between_commands_stops_the_next_poll() {
        let (bus, mut dispatcher, _store, _dir) = rig(Timeouts::default());
        let (presses, mut interrupt) = Interrupt::channel();

        dispatcher.handle_line("status", interrupt.wait()).await.unwrap();
        presses.send_modify(|count| *count += 1);
        dispatcher.handle_line("poll", interrupt.wait()).await.unwrap();

        assert_eq!(bus.written(98), vec![b"status\0".to_vec(), b"R\0".to_vec()]);
        assert_eq!(bus.reads(98), 1);
        assert!(output(dispatcher).contains("Continuous polling stopped\n"));
    }

    #[tokio::test(start_paused = true)]
    async fn queries_wait_on_the_runtime_clock() {
        let (_bus, mut dispatcher, _store, _dir) = rig(Timeouts::default());
        let wall = std::time::Instant::now();
        let virtual_start = tokio::time::Instant::now();

        dispatcher.handle_line("r", pending()).await.unwrap();
        dispatcher.handle_line("all:r", pending()).await.unwrap();

        assert!(virtual_start.elapsed() >= Duration::from_secs(3));
        assert!(wall.elapsed() < Duration::from_secs(1));
    }
}
