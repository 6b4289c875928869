// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Serial transport: record streaming out, console lines in.

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use serialport::SerialPort;

use modem_dfu_common::{Record, MAX_WIRE_SIZE};

use crate::console::{self, DeviceEvent};

/// Read timeout of the console monitor; bounds how long `stop` takes.
const MONITOR_POLL_MS: u64 = 100;

/// Serial link to the DFU target.
pub struct Transport {
    port: Box<dyn SerialPort>,
    buf: [u8; MAX_WIRE_SIZE],
}

impl Transport {
    /// Open the serial port.
    pub fn open(port_name: &str, baud: u32) -> Result<Self> {
        let port = serialport::new(port_name, baud)
            .timeout(Duration::from_millis(MONITOR_POLL_MS))
            .open()
            .with_context(|| format!("Failed to open serial port {}", port_name))?;

        Ok(Self {
            port,
            buf: [0; MAX_WIRE_SIZE],
        })
    }

    /// Get the port name.
    pub fn port_name(&self) -> String {
        self.port.name().unwrap_or_else(|| "?".to_string())
    }

    /// Send one record in wire format. Returns the number of bytes written.
    pub fn send_record(&mut self, record: &Record) -> Result<usize> {
        let n = record
            .encode_into(&mut self.buf)
            .map_err(|e| anyhow::anyhow!("Failed to encode record: {}", e))?;
        self.port
            .write_all(&self.buf[..n])
            .map_err(|e| anyhow::anyhow!("Failed to write to serial port: {}", e))?;
        Ok(n)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.port.flush().context("Failed to flush serial port")
    }

    /// Start a thread that echoes the target console to stdout and reports
    /// the lines the upload flow waits on.
    pub fn spawn_monitor(&self) -> Result<Monitor> {
        let port = self
            .port
            .try_clone()
            .context("Failed to clone serial port for the console monitor")?;
        let stop = Arc::new(AtomicBool::new(false));
        let (tx, events) = mpsc::channel();

        let handle = {
            let stop = stop.clone();
            thread::Builder::new()
                .name("console".into())
                .spawn(move || echo_console(port, &stop, &tx))
                .context("Failed to start console monitor")?
        };

        Ok(Monitor {
            handle: Some(handle),
            stop,
            events,
        })
    }
}

fn echo_console(mut port: Box<dyn SerialPort>, stop: &AtomicBool, events: &Sender<DeviceEvent>) {
    let mut line = Vec::with_capacity(256);
    let mut buf = [0u8; 64];

    while !stop.load(Ordering::Relaxed) {
        let n = match port.read(&mut buf) {
            Ok(0) => continue,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::TimedOut => continue,
            Err(e) => {
                log::error!("Serial read error: {}", e);
                let _ = events.send(DeviceEvent::Disconnected);
                return;
            }
        };

        for &byte in &buf[..n] {
            line.push(byte);
            if byte != b'\n' {
                continue;
            }

            let text = String::from_utf8_lossy(&line);
            print!("{}", text);
            let _ = io::stdout().flush();
            if let Some(event) = console::parse_line(&text) {
                log::debug!("Console event: {:?}", event);
                let _ = events.send(event);
            }
            line.clear();
        }
    }
}

/// Handle on the console monitor thread.
pub struct Monitor {
    handle: Option<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
    events: Receiver<DeviceEvent>,
}

impl Monitor {
    /// Wait for the first event accepted by `want`, discarding the others.
    pub fn wait_for<T>(
        &self,
        what: &str,
        timeout: Duration,
        mut want: impl FnMut(&DeviceEvent) -> Option<T>,
    ) -> Result<T> {
        let deadline = Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.events.recv_timeout(remaining) {
                Ok(DeviceEvent::Disconnected) => bail!("Serial link lost while waiting for {}", what),
                Ok(event) => {
                    if let Some(value) = want(&event) {
                        return Ok(value);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    bail!("Timeout waiting for {} ({} s)", what, timeout.as_secs())
                }
                Err(RecvTimeoutError::Disconnected) => bail!("Console monitor stopped"),
            }
        }
    }

    /// Block until the link goes away.
    pub fn wait_disconnected(&self) {
        while let Ok(event) = self.events.recv() {
            if event == DeviceEvent::Disconnected {
                break;
            }
        }
    }

    /// Stop the thread and wait for it.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Console monitor panicked");
            }
        }
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.shutdown();
    }
}
