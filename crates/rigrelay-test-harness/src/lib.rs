//! rigrelay-test-harness: Test doubles for rigrelay.
//!
//! This crate provides [`MockLineController`] for deterministic testing of
//! the radio registry without GPIO hardware, a [`ManualClock`] so timers
//! can be driven explicitly, and recording implementations of the
//! supervisor hooks.

pub mod manual_clock;
pub mod mock_hooks;
pub mod mock_lines;

pub use manual_clock::ManualClock;
pub use mock_hooks::{Notification, RecordingNotifier, ScriptedSquelch};
pub use mock_lines::{LineWrite, MockLineController};
