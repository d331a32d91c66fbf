//! Recording and scripted implementations of the supervisor hooks.

use std::collections::HashSet;
use std::sync::Mutex;

use rigrelay_core::hooks::{Notifier, SquelchSource};
use rigrelay_core::types::{IdMode, RadioId};

/// A request received by [`RecordingNotifier`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    /// `penalty_cleared` was called.
    PenaltyCleared(RadioId),
    /// `identify` was called.
    Identify(RadioId, IdMode),
}

/// A [`Notifier`] that remembers every call.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    calls: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call so far, in order.
    pub fn calls(&self) -> Vec<Notification> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// How many times `penalty_cleared` was called for `radio`.
    pub fn cleared_count(&self, radio: RadioId) -> usize {
        self.calls()
            .iter()
            .filter(|n| **n == Notification::PenaltyCleared(radio))
            .count()
    }

    /// How many times `identify` was called for `radio`.
    pub fn identify_count(&self, radio: RadioId) -> usize {
        self.calls()
            .iter()
            .filter(|n| matches!(n, Notification::Identify(r, _) if *r == radio))
            .count()
    }

    fn push(&self, n: Notification) {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).push(n);
    }
}

impl Notifier for RecordingNotifier {
    fn penalty_cleared(&self, radio: RadioId) {
        self.push(Notification::PenaltyCleared(radio));
    }

    fn identify(&self, radio: RadioId, mode: IdMode) {
        self.push(Notification::Identify(radio, mode));
    }
}

/// A [`SquelchSource`] whose answers are set by the test.
#[derive(Debug, Default)]
pub struct ScriptedSquelch {
    active: Mutex<HashSet<RadioId>>,
}

impl ScriptedSquelch {
    /// All radios quiet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open or close the detector for `radio`.
    pub fn set_active(&self, radio: RadioId, active: bool) {
        let mut set = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if active {
            set.insert(radio);
        } else {
            set.remove(&radio);
        }
    }
}

impl SquelchSource for ScriptedSquelch {
    fn is_active(&self, radio: RadioId) -> bool {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&radio)
    }
}
