//! Pluggable collaborators for the supervisor.
//!
//! Voice-activity detection and tone/ID playback live outside this
//! workspace. The supervisor reaches them only through these two traits,
//! and the no-op implementations here are used when nothing is plugged in.

use crate::types::{IdMode, RadioId};

/// Decides whether a VOX-mode radio is currently hearing something.
pub trait SquelchSource: Send + Sync + 'static {
    /// `true` if the channel behind `radio` carries voice right now.
    fn is_active(&self, radio: RadioId) -> bool;
}

/// Squelch source that never reports activity.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSquelch;

impl SquelchSource for NullSquelch {
    fn is_active(&self, _radio: RadioId) -> bool {
        false
    }
}

/// Receives audible-notification requests from the supervisor.
///
/// Calls are made while the radio's record is locked, so implementations
/// must hand the work off (queue a tone, spawn a task) rather than block.
pub trait Notifier: Send + Sync + 'static {
    /// The time-out penalty on `radio` has just run out.
    fn penalty_cleared(&self, radio: RadioId);

    /// `radio` is due for station identification.
    fn identify(&self, radio: RadioId, mode: IdMode);
}

/// Notifier that drops every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn penalty_cleared(&self, _radio: RadioId) {}

    fn identify(&self, _radio: RadioId, _mode: IdMode) {}
}
