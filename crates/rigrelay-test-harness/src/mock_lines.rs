//! Mock line controller for deterministic testing.
//!
//! [`MockLineController`] implements the [`LineController`] trait entirely
//! in memory. Tests drive input levels with
//! [`set_input`](MockLineController::set_input), inspect outputs with
//! [`is_asserted`](MockLineController::is_asserted), and inject failures per
//! pin.
//!
//! # Example
//!
//! ```
//! use rigrelay_core::{LineController, LineRequest};
//! use rigrelay_test_harness::MockLineController;
//!
//! # async fn example() -> rigrelay_core::Result<()> {
//! let mock = MockLineController::new();
//! let ptt = mock.attach(LineRequest::output(17, false, "radio0-ptt")).await?;
//! mock.set(ptt, true).await?;
//! assert!(mock.is_asserted(17));
//! # Ok(())
//! # }
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rigrelay_core::error::{Error, Result};
use rigrelay_core::line::{LineController, LineDirection, LineHandle, LineRequest};

/// One recorded output write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineWrite {
    /// Pin that was written.
    pub pin: u32,
    /// Logical value written.
    pub value: bool,
}

#[derive(Debug)]
struct Line {
    pin: u32,
    direction: LineDirection,
    active_low: bool,
    consumer: String,
    value: bool,
}

#[derive(Debug, Default)]
struct State {
    lines: HashMap<LineHandle, Line>,
    inputs: HashMap<u32, bool>,
    fail_attach: HashSet<u32>,
    fail_writes: HashSet<u32>,
    fail_reads: HashSet<u32>,
    writes: Vec<LineWrite>,
    released: Vec<u32>,
    next_handle: u32,
    closed: bool,
}

/// An in-memory [`LineController`].
///
/// Unlike real controllers it is shared by reference: wrap it in an `Arc`
/// and hand a clone to the registry while the test keeps its own.
#[derive(Debug, Default)]
pub struct MockLineController {
    state: Mutex<State>,
}

impl MockLineController {
    /// Create an empty controller.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Set the logical level an input pin reports.
    pub fn set_input(&self, pin: u32, value: bool) {
        self.state().inputs.insert(pin, value);
    }

    /// `true` if an attached output on `pin` is currently asserted.
    pub fn is_asserted(&self, pin: u32) -> bool {
        self.state()
            .lines
            .values()
            .any(|l| l.pin == pin && l.direction == LineDirection::Output && l.value)
    }

    /// `true` if a line is attached on `pin`.
    pub fn is_attached(&self, pin: u32) -> bool {
        self.state().lines.values().any(|l| l.pin == pin)
    }

    /// Polarity an attached line on `pin` was requested with.
    pub fn active_low(&self, pin: u32) -> Option<bool> {
        self.state()
            .lines
            .values()
            .find(|l| l.pin == pin)
            .map(|l| l.active_low)
    }

    /// Consumer label an attached line on `pin` was requested with.
    pub fn consumer(&self, pin: u32) -> Option<String> {
        self.state()
            .lines
            .values()
            .find(|l| l.pin == pin)
            .map(|l| l.consumer.clone())
    }

    /// Number of currently attached lines.
    pub fn attached_count(&self) -> usize {
        self.state().lines.len()
    }

    /// Make the next and all later attach requests for `pin` fail.
    pub fn fail_attach(&self, pin: u32) {
        self.state().fail_attach.insert(pin);
    }

    /// Make writes to `pin` fail (or succeed again).
    pub fn fail_writes(&self, pin: u32, fail: bool) {
        let mut state = self.state();
        if fail {
            state.fail_writes.insert(pin);
        } else {
            state.fail_writes.remove(&pin);
        }
    }

    /// Make reads of `pin` fail (or succeed again).
    pub fn fail_reads(&self, pin: u32, fail: bool) {
        let mut state = self.state();
        if fail {
            state.fail_reads.insert(pin);
        } else {
            state.fail_reads.remove(&pin);
        }
    }

    /// All successful output writes, in order.
    pub fn writes(&self) -> Vec<LineWrite> {
        self.state().writes.clone()
    }

    /// Successful writes to one pin, in order.
    pub fn writes_to(&self, pin: u32) -> Vec<bool> {
        self.state()
            .writes
            .iter()
            .filter(|w| w.pin == pin)
            .map(|w| w.value)
            .collect()
    }

    /// Forget recorded writes.
    pub fn clear_writes(&self) {
        self.state().writes.clear();
    }

    /// Pins released so far, in order.
    pub fn released(&self) -> Vec<u32> {
        self.state().released.clone()
    }

    /// Simulate the controller going away; every later call fails with
    /// [`Error::NotConnected`].
    pub fn close(&self) {
        self.state().closed = true;
    }
}

#[async_trait]
impl LineController for MockLineController {
    fn name(&self) -> &str {
        "mock"
    }

    async fn attach(&self, request: LineRequest) -> Result<LineHandle> {
        let mut state = self.state();
        if state.closed {
            return Err(Error::NotConnected);
        }
        if state.fail_attach.contains(&request.pin) {
            return Err(Error::Line(format!("mock: pin {} unavailable", request.pin)));
        }
        if state.lines.values().any(|l| l.pin == request.pin) {
            return Err(Error::Line(format!("mock: pin {} busy", request.pin)));
        }
        state.next_handle += 1;
        let handle = LineHandle::from_raw(state.next_handle);
        tracing::trace!(pin = request.pin, consumer = %request.consumer, %handle, "mock attach");
        state.lines.insert(
            handle,
            Line {
                pin: request.pin,
                direction: request.direction,
                active_low: request.active_low,
                consumer: request.consumer,
                value: false,
            },
        );
        Ok(handle)
    }

    async fn set(&self, handle: LineHandle, value: bool) -> Result<()> {
        let mut state = self.state();
        if state.closed {
            return Err(Error::NotConnected);
        }
        let State {
            lines,
            fail_writes,
            writes,
            ..
        } = &mut *state;
        let line = lines
            .get_mut(&handle)
            .ok_or_else(|| Error::InvalidParameter(format!("{handle} is not attached")))?;
        if line.direction != LineDirection::Output {
            return Err(Error::InvalidParameter(format!("pin {} is an input", line.pin)));
        }
        if fail_writes.contains(&line.pin) {
            return Err(Error::Line(format!("mock: write to pin {} failed", line.pin)));
        }
        line.value = value;
        writes.push(LineWrite {
            pin: line.pin,
            value,
        });
        Ok(())
    }

    async fn read(&self, handle: LineHandle) -> Result<bool> {
        let state = self.state();
        if state.closed {
            return Err(Error::NotConnected);
        }
        let line = state
            .lines
            .get(&handle)
            .ok_or_else(|| Error::InvalidParameter(format!("{handle} is not attached")))?;
        if state.fail_reads.contains(&line.pin) {
            return Err(Error::Line(format!("mock: read of pin {} failed", line.pin)));
        }
        match line.direction {
            LineDirection::Output => Ok(line.value),
            LineDirection::Input => Ok(state.inputs.get(&line.pin).copied().unwrap_or(false)),
        }
    }

    async fn release(&self, handle: LineHandle) -> Result<()> {
        let mut state = self.state();
        if let Some(line) = state.lines.remove(&handle) {
            state.released.push(line.pin);
        }
        Ok(())
    }
}
