//! Linux GPIO character-device line controller.
//!
//! Lines are requested one at a time through `tokio-gpiod`, so each radio
//! line can carry its own consumer label and polarity. Inversion is done by
//! the kernel (`active_low`), which means the values passed to
//! [`LineController::set`] are already logical.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use rigrelay_core::error::{Error, Result};
use rigrelay_core::line::{LineController, LineDirection, LineHandle, LineRequest};
use tokio::sync::Mutex;
use tokio_gpiod::{Active, Chip, Input, Lines, Options, Output};

enum Attached {
    Input(Lines<Input>),
    Output(Lines<Output>),
}

/// Normalize a chip name to a device path.
///
/// `gpiochip0` becomes `/dev/gpiochip0`; absolute paths are kept.
pub fn chip_path(name: &str) -> String {
    if name.starts_with('/') {
        name.to_string()
    } else {
        format!("/dev/{name}")
    }
}

/// Line controller for a GPIO chip.
pub struct GpiodLineController {
    chip: Chip,
    path: String,
    lines: Mutex<HashMap<LineHandle, (u32, Attached)>>,
    next_handle: AtomicU32,
}

impl GpiodLineController {
    /// Open a GPIO chip by name (`gpiochip0`) or path.
    pub async fn open(name: &str) -> Result<Self> {
        let path = chip_path(name);
        let chip = Chip::new(&path).await.map_err(|e| {
            tracing::error!(chip = %path, error = %e, "Failed to open GPIO chip");
            Error::Line(format!("failed to open {path}: {e}"))
        })?;
        tracing::info!(chip = %path, "GPIO chip opened");
        Ok(Self {
            chip,
            path,
            lines: Mutex::new(HashMap::new()),
            next_handle: AtomicU32::new(1),
        })
    }

    fn active(active_low: bool) -> Active {
        if active_low { Active::Low } else { Active::High }
    }
}

#[async_trait]
impl LineController for GpiodLineController {
    fn name(&self) -> &str {
        &self.path
    }

    async fn attach(&self, request: LineRequest) -> Result<LineHandle> {
        let pin = request.pin;
        let failed = |e: std::io::Error| {
            tracing::error!(chip = %self.path, pin, error = %e, "GPIO line request failed");
            Error::Line(format!("{} line {pin}: {e}", self.path))
        };
        let active = Self::active(request.active_low);

        let attached = match request.direction {
            LineDirection::Output => {
                let opts = Options::output([pin])
                    .values([false])
                    .active(active)
                    .consumer(request.consumer.as_str());
                Attached::Output(self.chip.request_lines(opts).await.map_err(failed)?)
            }
            LineDirection::Input => {
                let opts = Options::input([pin])
                    .active(active)
                    .consumer(request.consumer.as_str());
                Attached::Input(self.chip.request_lines(opts).await.map_err(failed)?)
            }
        };

        let handle = LineHandle::from_raw(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.lines.lock().await.insert(handle, (pin, attached));
        tracing::debug!(chip = %self.path, pin, consumer = %request.consumer, %handle, "Attached GPIO line");
        Ok(handle)
    }

    async fn set(&self, handle: LineHandle, value: bool) -> Result<()> {
        let lines = self.lines.lock().await;
        match lines.get(&handle) {
            Some((pin, Attached::Output(line))) => {
                line.set_values([value]).await.map_err(|e| {
                    tracing::error!(chip = %self.path, pin, error = %e, "GPIO write failed");
                    Error::Line(format!("{} line {pin}: {e}", self.path))
                })?;
                tracing::trace!(chip = %self.path, pin, value, "Set GPIO line");
                Ok(())
            }
            Some((pin, Attached::Input(_))) => Err(Error::InvalidParameter(format!(
                "{} line {pin} is an input",
                self.path
            ))),
            None => Err(Error::InvalidParameter(format!("{handle} is not attached"))),
        }
    }

    async fn read(&self, handle: LineHandle) -> Result<bool> {
        let lines = self.lines.lock().await;
        let (pin, result) = match lines.get(&handle) {
            Some((pin, Attached::Input(line))) => (*pin, line.get_values([false]).await),
            Some((pin, Attached::Output(line))) => (*pin, line.get_values([false]).await),
            None => return Err(Error::InvalidParameter(format!("{handle} is not attached"))),
        };
        let values = result.map_err(|e| {
            tracing::error!(chip = %self.path, pin, error = %e, "GPIO read failed");
            Error::Line(format!("{} line {pin}: {e}", self.path))
        })?;
        Ok(values[0])
    }

    async fn release(&self, handle: LineHandle) -> Result<()> {
        if let Some((pin, attached)) = self.lines.lock().await.remove(&handle) {
            if let Attached::Output(line) = &attached {
                if let Err(e) = line.set_values([false]).await {
                    tracing::warn!(chip = %self.path, pin, error = %e, "Failed to de-assert line on release");
                }
            }
            // Dropping the request hands the line back to the kernel.
            drop(attached);
            tracing::debug!(chip = %self.path, pin, "Released GPIO line");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chip_names_become_device_paths() {
        assert_eq!(chip_path("gpiochip0"), "/dev/gpiochip0");
        assert_eq!(chip_path("/dev/gpiochip2"), "/dev/gpiochip2");
    }

    #[tokio::test]
    async fn open_missing_chip_fails() {
        let result = GpiodLineController::open("gpiochip-rigrelay-missing").await;
        assert!(matches!(result, Err(Error::Line(_))));
    }
}
