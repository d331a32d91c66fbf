//! Line controller trait for digital I/O.
//!
//! The [`LineController`] trait abstracts over the I/O controller that the
//! radios' relays and squelch inputs are wired to. Implementations exist for
//! Linux GPIO character devices, serial-port modem-control lines, and a mock
//! controller for testing (in `rigrelay-test-harness`).
//!
//! The registry never talks to hardware directly; it attaches lines through
//! this trait once at build time and then drives them by [`LineHandle`].

use std::fmt;

use async_trait::async_trait;

use crate::error::Result;

/// Opaque handle to an attached line.
///
/// Handles are issued by a [`LineController`] and are only meaningful to the
/// controller that issued them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LineHandle(u32);

impl LineHandle {
    /// Wrap a raw controller-assigned identifier.
    pub fn from_raw(raw: u32) -> Self {
        LineHandle(raw)
    }

    /// The raw controller-assigned identifier.
    pub fn raw(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for LineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line#{}", self.0)
    }
}

/// Direction of a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LineDirection {
    /// Driven by us (power relay, PTT relay).
    Output,
    /// Sampled by us (squelch / COS).
    Input,
}

/// Parameters for attaching a single line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineRequest {
    /// Pin (line offset) on the controller.
    pub pin: u32,
    /// Whether the line is driven or sampled.
    pub direction: LineDirection,
    /// Invert the electrical level, so that `true` means "low".
    pub active_low: bool,
    /// Consumer label shown by the OS (e.g. `"radio0-ptt"`).
    pub consumer: String,
}

impl LineRequest {
    /// An output line, initially de-asserted.
    pub fn output(pin: u32, active_low: bool, consumer: impl Into<String>) -> Self {
        LineRequest {
            pin,
            direction: LineDirection::Output,
            active_low,
            consumer: consumer.into(),
        }
    }

    /// An input line.
    pub fn input(pin: u32, consumer: impl Into<String>) -> Self {
        LineRequest {
            pin,
            direction: LineDirection::Input,
            active_low: false,
            consumer: consumer.into(),
        }
    }
}

/// Access to digital lines on a single I/O controller.
///
/// All calls are expected to complete quickly (local bus). Implementations
/// must not retry: a failure is reported immediately and the caller decides
/// what to do.
///
/// Values passed to [`set`](LineController::set) and returned by
/// [`read`](LineController::read) are *logical*: `true` means asserted,
/// after any `active_low` inversion.
#[async_trait]
pub trait LineController: Send + Sync {
    /// Controller name for logs (e.g. `gpiochip0`, `/dev/ttyUSB0`).
    fn name(&self) -> &str;

    /// Attach a line. Output lines start de-asserted.
    async fn attach(&self, request: LineRequest) -> Result<LineHandle>;

    /// Drive an output line.
    async fn set(&self, handle: LineHandle, value: bool) -> Result<()>;

    /// Sample a line.
    async fn read(&self, handle: LineHandle) -> Result<bool>;

    /// Release a line. The handle is invalid afterwards.
    async fn release(&self, handle: LineHandle) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_request_defaults() {
        let req = LineRequest::output(17, true, "radio0-ptt");
        assert_eq!(req.pin, 17);
        assert_eq!(req.direction, LineDirection::Output);
        assert!(req.active_low);
        assert_eq!(req.consumer, "radio0-ptt");
    }

    #[test]
    fn input_request_is_active_high() {
        let req = LineRequest::input(22, "radio1-squelch");
        assert_eq!(req.direction, LineDirection::Input);
        assert!(!req.active_low);
    }

    #[test]
    fn handle_round_trips_raw() {
        let h = LineHandle::from_raw(9);
        assert_eq!(h.raw(), 9);
        assert_eq!(h.to_string(), "line#9");
    }
}
