//! rigrelay-core: Core types, traits, and configuration for rigrelay.
//!
//! This crate defines the pieces shared by every part of a rigrelay
//! station: the radio state vocabulary, the line-controller abstraction
//! that backends implement, the configuration model and its parser, and
//! the hooks the supervisor calls out through. It has no knowledge of any
//! particular I/O hardware.
//!
//! # Key types
//!
//! - [`RadioState`] / [`Outcome`] -- per-radio state and transition results
//! - [`LineController`] -- logical on/off lines (GPIO, serial modem lines)
//! - [`StationConfig`] -- station and per-radio settings
//! - [`RadioEvent`] -- asynchronous state change notifications
//! - [`Error`] / [`Result`] -- error handling

pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod helpers;
pub mod hooks;
pub mod line;
pub mod types;

// Re-export key types at crate root for ergonomic `use rigrelay_core::*`.
pub use clock::{Clock, SystemClock};
pub use config::{GeneralConfig, PinConfig, RadioConfig, StationConfig};
pub use error::{Error, Result};
pub use events::RadioEvent;
pub use helpers::{format_duration, parse_bool, parse_duration};
pub use hooks::{Notifier, NullNotifier, NullSquelch, SquelchSource};
pub use line::{LineController, LineDirection, LineHandle, LineRequest};
pub use types::*;
