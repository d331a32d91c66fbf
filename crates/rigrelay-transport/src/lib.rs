//! Line controller backends for rigrelay.
//!
//! This crate provides concrete implementations of the
//! [`LineController`](rigrelay_core::LineController) trait from
//! `rigrelay-core`:
//!
//! - [`SerialLineController`]: DTR/RTS outputs and CTS/DSR/DCD/RI inputs of
//!   a serial port, for radios keyed through a USB serial adapter
//! - `GpiodLineController`: Linux GPIO character devices (`gpiod` feature)
//!
//! [`open_controller`] picks the backend from the `gpiochip` setting.
//!
//! # Example
//!
//! ```no_run
//! # async fn example() -> rigrelay_core::Result<()> {
//! let controller = rigrelay_transport::open_controller("serial:/dev/ttyUSB0").await?;
//! println!("using {}", controller.name());
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use rigrelay_core::error::{Error, Result};
use rigrelay_core::line::LineController;

pub mod serial;

#[cfg(feature = "gpiod")]
pub mod gpiod;

pub use serial::{ModemLine, SerialLineController};

#[cfg(feature = "gpiod")]
pub use gpiod::GpiodLineController;

/// Which backend a `gpiochip` setting refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerSpec {
    /// A GPIO chip name or path (`gpiochip0`, `/dev/gpiochip0`).
    Gpiochip(String),
    /// A serial port (`serial:/dev/ttyUSB0`).
    Serial(String),
}

impl FromStr for ControllerSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Some(port) = s.strip_prefix("serial:") {
            if port.is_empty() {
                return Err(Error::InvalidParameter("serial: needs a port path".into()));
            }
            return Ok(ControllerSpec::Serial(port.to_string()));
        }
        if s.is_empty() {
            return Err(Error::InvalidParameter("empty controller name".into()));
        }
        Ok(ControllerSpec::Gpiochip(s.to_string()))
    }
}

impl fmt::Display for ControllerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerSpec::Gpiochip(name) => f.write_str(name),
            ControllerSpec::Serial(port) => write!(f, "serial:{port}"),
        }
    }
}

/// Open the line controller named by a `gpiochip` setting.
pub async fn open_controller(spec: &str) -> Result<Arc<dyn LineController>> {
    match spec.parse::<ControllerSpec>()? {
        ControllerSpec::Serial(port) => Ok(Arc::new(SerialLineController::open(&port).await?)),
        #[cfg(feature = "gpiod")]
        ControllerSpec::Gpiochip(name) => Ok(Arc::new(GpiodLineController::open(&name).await?)),
        #[cfg(not(feature = "gpiod"))]
        ControllerSpec::Gpiochip(name) => {
            tracing::error!(chip = %name, "GPIO support not compiled in");
            Err(Error::Unsupported(format!(
                "{name}: rebuild rigrelay-transport with the `gpiod` feature"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_controller_spec() {
        assert_eq!(
            "gpiochip0".parse::<ControllerSpec>().unwrap(),
            ControllerSpec::Gpiochip("gpiochip0".into())
        );
        assert_eq!(
            "serial:/dev/ttyUSB0".parse::<ControllerSpec>().unwrap(),
            ControllerSpec::Serial("/dev/ttyUSB0".into())
        );
        assert!("serial:".parse::<ControllerSpec>().is_err());
        assert!("".parse::<ControllerSpec>().is_err());
    }

    #[test]
    fn controller_spec_display() {
        let spec = ControllerSpec::Serial("/dev/ttyS0".into());
        assert_eq!(spec.to_string(), "serial:/dev/ttyS0");
    }

    #[cfg(not(feature = "gpiod"))]
    #[tokio::test]
    async fn gpiochip_without_feature_is_unsupported() {
        let result = open_controller("gpiochip0").await;
        assert!(matches!(result, Err(Error::Unsupported(_))));
    }
}
