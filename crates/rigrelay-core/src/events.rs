//! Radio event types.
//!
//! Events are emitted by the registry and the supervisor through a
//! [`tokio::sync::broadcast`] channel whenever a radio changes state or a
//! timer fires. Consoles and status displays subscribe to these instead of
//! polling the registry.

use std::time::Duration;

use crate::types::{IdMode, RadioId, RadioState};

/// An event emitted when something happens to a radio.
///
/// Events are delivered on a best-effort basis through a bounded broadcast
/// channel; slow consumers may miss events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioEvent {
    /// A transition was committed.
    StateChanged {
        /// Which radio changed.
        radio: RadioId,
        /// State before the transition.
        from: RadioState,
        /// State after the transition.
        to: RadioState,
    },

    /// The administrative gate was opened or closed.
    EnabledChanged {
        /// Which radio changed.
        radio: RadioId,
        /// New value of the gate.
        enabled: bool,
    },

    /// A transmit request was refused because of a running penalty.
    TransmitBlocked {
        /// Which radio was blocked.
        radio: RadioId,
        /// Penalty remaining after re-arming.
        penalty: Duration,
    },

    /// The time-out timer forced the transmitter off.
    TimeoutExpired {
        /// Which radio timed out.
        radio: RadioId,
        /// Penalty remaining after arming the holdoff.
        penalty: Duration,
    },

    /// A penalty ran down to zero.
    PenaltyCleared {
        /// Which radio is free to transmit again.
        radio: RadioId,
    },

    /// Station identification was requested.
    Identified {
        /// Which radio is identifying.
        radio: RadioId,
        /// Identification style.
        mode: IdMode,
    },
}

impl RadioEvent {
    /// The radio this event is about.
    pub fn radio(&self) -> RadioId {
        match self {
            RadioEvent::StateChanged { radio, .. }
            | RadioEvent::EnabledChanged { radio, .. }
            | RadioEvent::TransmitBlocked { radio, .. }
            | RadioEvent::TimeoutExpired { radio, .. }
            | RadioEvent::PenaltyCleared { radio }
            | RadioEvent::Identified { radio, .. } => *radio,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_reports_its_radio() {
        let r = RadioId::from_index(2);
        let ev = RadioEvent::TimeoutExpired {
            radio: r,
            penalty: Duration::from_secs(10),
        };
        assert_eq!(ev.radio(), r);
        assert_eq!(RadioEvent::PenaltyCleared { radio: r }.radio(), r);
    }
}
