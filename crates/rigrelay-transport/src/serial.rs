//! Serial-port modem-control lines as a line controller.
//!
//! Many stations key their radios through the DTR/RTS lines of a USB serial
//! adapter and read squelch back on CTS or DCD. [`SerialLineController`]
//! exposes those lines as numbered pins:
//!
//! | pin | line | direction |
//! |-----|------|-----------|
//! | 1   | DTR  | output    |
//! | 2   | RTS  | output    |
//! | 3   | CTS  | input     |
//! | 4   | DSR  | input     |
//! | 5   | DCD  | input     |
//! | 6   | RI   | input     |
//!
//! # Example
//!
//! ```no_run
//! use rigrelay_core::{LineController, LineRequest};
//! use rigrelay_transport::SerialLineController;
//!
//! # async fn example() -> rigrelay_core::Result<()> {
//! let port = SerialLineController::open("/dev/ttyUSB0").await?;
//!
//! // Key the radio through RTS.
//! let ptt = port.attach(LineRequest::output(2, false, "radio0-ptt")).await?;
//! port.set(ptt, true).await?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use rigrelay_core::error::{Error, Result};
use rigrelay_core::line::{LineController, LineDirection, LineHandle, LineRequest};
use tokio::sync::Mutex;
use tokio_serial::{SerialPort, SerialPortBuilderExt, SerialStream};

/// A modem-control line on a serial port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModemLine {
    /// Data Terminal Ready.
    Dtr,
    /// Request To Send.
    Rts,
    /// Clear To Send.
    Cts,
    /// Data Set Ready.
    Dsr,
    /// Data Carrier Detect.
    Dcd,
    /// Ring Indicator.
    Ri,
}

impl ModemLine {
    /// Map a configured pin number to a modem line.
    pub fn from_pin(pin: u32) -> Option<Self> {
        match pin {
            1 => Some(ModemLine::Dtr),
            2 => Some(ModemLine::Rts),
            3 => Some(ModemLine::Cts),
            4 => Some(ModemLine::Dsr),
            5 => Some(ModemLine::Dcd),
            6 => Some(ModemLine::Ri),
            _ => None,
        }
    }

    /// Whether this line can be driven or only sampled.
    pub fn direction(&self) -> LineDirection {
        match self {
            ModemLine::Dtr | ModemLine::Rts => LineDirection::Output,
            _ => LineDirection::Input,
        }
    }
}

impl fmt::Display for ModemLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ModemLine::Dtr => "DTR",
            ModemLine::Rts => "RTS",
            ModemLine::Cts => "CTS",
            ModemLine::Dsr => "DSR",
            ModemLine::Dcd => "DCD",
            ModemLine::Ri => "RI",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy)]
struct Attached {
    line: ModemLine,
    active_low: bool,
}

/// Line controller backed by a serial port's modem-control lines.
pub struct SerialLineController {
    port: Mutex<Option<SerialStream>>,
    port_name: String,
    lines: Mutex<HashMap<LineHandle, Attached>>,
    next_handle: AtomicU32,
}

impl SerialLineController {
    /// Open a serial port for line control.
    ///
    /// The baud rate is irrelevant for modem lines and left at 9600.
    /// DTR and RTS are de-asserted immediately after opening.
    pub async fn open(port: &str) -> Result<Self> {
        tracing::debug!(port = %port, "Opening serial port for line control");

        let mut stream = tokio_serial::new(port, 9600)
            .open_native_async()
            .map_err(|e| {
                tracing::error!(port = %port, error = %e, "Failed to open serial port");
                Error::Line(format!("failed to open serial port {port}: {e}"))
            })?;

        // The OS commonly asserts DTR on open, which keys any radio wired to
        // it until the line is attached.
        if let Err(e) = stream.write_data_terminal_ready(false) {
            tracing::warn!(port = %port, error = %e, "Failed to de-assert DTR");
        }
        if let Err(e) = stream.write_request_to_send(false) {
            tracing::warn!(port = %port, error = %e, "Failed to de-assert RTS");
        }

        tracing::info!(port = %port, "Serial port opened for line control");

        Ok(Self {
            port: Mutex::new(Some(stream)),
            port_name: port.to_string(),
            lines: Mutex::new(HashMap::new()),
            next_handle: AtomicU32::new(1),
        })
    }

    /// Get the name of the serial port.
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Close the port. Outputs are de-asserted first; later calls fail with
    /// [`Error::NotConnected`].
    pub async fn close(&self) -> Result<()> {
        if let Some(mut port) = self.port.lock().await.take() {
            tracing::debug!(port = %self.port_name, "Closing serial port");
            let _ = port.write_data_terminal_ready(false);
            let _ = port.write_request_to_send(false);
            tracing::info!(port = %self.port_name, "Serial port closed");
        }
        self.lines.lock().await.clear();
        Ok(())
    }

    async fn attached(&self, handle: LineHandle) -> Result<Attached> {
        self.lines
            .lock()
            .await
            .get(&handle)
            .copied()
            .ok_or_else(|| Error::InvalidParameter(format!("{handle} is not attached")))
    }

    fn line_error(&self, line: ModemLine, e: tokio_serial::Error) -> Error {
        tracing::error!(port = %self.port_name, line = %line, error = %e, "Modem line access failed");
        Error::Line(format!("{} {line}: {e}", self.port_name))
    }
}

#[async_trait]
impl LineController for SerialLineController {
    fn name(&self) -> &str {
        &self.port_name
    }

    async fn attach(&self, request: LineRequest) -> Result<LineHandle> {
        let line = ModemLine::from_pin(request.pin).ok_or_else(|| {
            Error::InvalidParameter(format!(
                "pin {} is not a modem line on {} (use 1-6)",
                request.pin, self.port_name
            ))
        })?;
        if line.direction() != request.direction {
            return Err(Error::InvalidParameter(format!(
                "{line} cannot be used as an {:?} line",
                request.direction
            )));
        }

        let mut lines = self.lines.lock().await;
        if lines.values().any(|a| a.line == line) {
            return Err(Error::Line(format!("{line} on {} is already in use", self.port_name)));
        }

        let attached = Attached {
            line,
            active_low: request.active_low,
        };
        if line.direction() == LineDirection::Output {
            let mut port = self.port.lock().await;
            let port = port.as_mut().ok_or(Error::NotConnected)?;
            write_line(port, line, request.active_low).map_err(|e| self.line_error(line, e))?;
        }

        let handle = LineHandle::from_raw(self.next_handle.fetch_add(1, Ordering::Relaxed));
        lines.insert(handle, attached);
        tracing::debug!(
            port = %self.port_name,
            line = %line,
            consumer = %request.consumer,
            %handle,
            "Attached modem line"
        );
        Ok(handle)
    }

    async fn set(&self, handle: LineHandle, value: bool) -> Result<()> {
        let attached = self.attached(handle).await?;
        if attached.line.direction() != LineDirection::Output {
            return Err(Error::InvalidParameter(format!("{} is an input", attached.line)));
        }
        let mut port = self.port.lock().await;
        let port = port.as_mut().ok_or(Error::NotConnected)?;
        write_line(port, attached.line, value ^ attached.active_low)
            .map_err(|e| self.line_error(attached.line, e))?;
        tracing::trace!(port = %self.port_name, line = %attached.line, value, "Set modem line");
        Ok(())
    }

    async fn read(&self, handle: LineHandle) -> Result<bool> {
        let attached = self.attached(handle).await?;
        let mut port = self.port.lock().await;
        let port = port.as_mut().ok_or(Error::NotConnected)?;
        let level = match attached.line {
            // Outputs cannot be read back from the UART.
            ModemLine::Dtr | ModemLine::Rts => {
                return Err(Error::Unsupported(format!(
                    "reading back {} on {}",
                    attached.line, self.port_name
                )));
            }
            ModemLine::Cts => port.read_clear_to_send(),
            ModemLine::Dsr => port.read_data_set_ready(),
            ModemLine::Dcd => port.read_carrier_detect(),
            ModemLine::Ri => port.read_ring_indicator(),
        }
        .map_err(|e| self.line_error(attached.line, e))?;
        Ok(level ^ attached.active_low)
    }

    async fn release(&self, handle: LineHandle) -> Result<()> {
        let Some(attached) = self.lines.lock().await.remove(&handle) else {
            return Ok(());
        };
        if attached.line.direction() == LineDirection::Output {
            let mut port = self.port.lock().await;
            if let Some(port) = port.as_mut() {
                write_line(port, attached.line, attached.active_low)
                    .map_err(|e| self.line_error(attached.line, e))?;
            }
        }
        tracing::debug!(port = %self.port_name, line = %attached.line, "Released modem line");
        Ok(())
    }
}

fn write_line(port: &mut SerialStream, line: ModemLine, level: bool) -> tokio_serial::Result<()> {
    match line {
        ModemLine::Dtr => port.write_data_terminal_ready(level),
        ModemLine::Rts => port.write_request_to_send(level),
        _ => Ok(()),
    }
}

impl Drop for SerialLineController {
    fn drop(&mut self) {
        if let Some(port) = self.port.get_mut().as_mut() {
            tracing::debug!(port = %self.port_name, "SerialLineController dropped, de-asserting outputs");
            let _ = port.write_data_terminal_ready(false);
            let _ = port.write_request_to_send(false);
        }
    }
}
