//! Core types used throughout rigrelay.
//!
//! The central design point here is the split between [`RadioState`], which
//! is what a radio record stores, and [`Outcome`], which is what a control
//! operation returns. Only `Outcome` can express "disabled", "blocked", or an
//! error, so those sentinels can never be written back into a record.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Index of a radio in the station.
///
/// Radio ids are small non-negative integers. They are bounds-checked
/// against the configured `max_radios` by every registry operation before
/// any record is touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RadioId(u8);

impl RadioId {
    /// Create a `RadioId` from a raw index.
    pub fn from_index(index: u8) -> Self {
        RadioId(index)
    }

    /// Return the raw numeric index of this radio.
    pub fn index(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for RadioId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "radio{}", self.0)
    }
}

/// Error returned when a string cannot be parsed into a [`RadioId`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseRadioIdError(String);

impl fmt::Display for ParseRadioIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid radio id: {}", self.0)
    }
}

impl std::error::Error for ParseRadioIdError {}

impl FromStr for RadioId {
    type Err = ParseRadioIdError;

    /// Accepts `"3"` as well as `"radio3"`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .get(..5)
            .filter(|p| p.eq_ignore_ascii_case("radio"))
            .map_or(trimmed, |_| &trimmed[5..]);
        digits
            .parse::<u8>()
            .map(RadioId)
            .map_err(|_| ParseRadioIdError(s.to_string()))
    }
}

/// Stored state of a radio.
///
/// The ordering is by severity and is used for display and for the
/// "already powered up" check when a radio is enabled:
/// `Off < Idle < Rx < Tx < TxData`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum RadioState {
    /// Power relay released, PTT released.
    #[default]
    Off,
    /// Powered and listening, nothing heard.
    Idle,
    /// Powered and receiving (squelch open or manual RX).
    Rx,
    /// Transmitting voice.
    Tx,
    /// Transmitting data.
    TxData,
}

impl RadioState {
    /// `true` for [`Tx`](RadioState::Tx) and [`TxData`](RadioState::TxData).
    pub fn is_transmitting(&self) -> bool {
        matches!(self, RadioState::Tx | RadioState::TxData)
    }

    /// `true` for every state except [`Off`](RadioState::Off).
    pub fn is_powered(&self) -> bool {
        !matches!(self, RadioState::Off)
    }
}

impl fmt::Display for RadioState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RadioState::Off => "OFF",
            RadioState::Idle => "Idle",
            RadioState::Rx => "Receiving",
            RadioState::Tx => "Transmitting",
            RadioState::TxData => "TX Data",
        };
        write!(f, "{s}")
    }
}

/// Error returned when a string cannot be parsed into a [`RadioState`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseRadioStateError(String);

impl fmt::Display for ParseRadioStateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown radio state: {}", self.0)
    }
}

impl std::error::Error for ParseRadioStateError {}

impl FromStr for RadioState {
    type Err = ParseRadioStateError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" => Ok(RadioState::Off),
            "idle" => Ok(RadioState::Idle),
            "rx" | "receiving" => Ok(RadioState::Rx),
            "tx" | "transmitting" => Ok(RadioState::Tx),
            "txdata" | "tx-data" | "tx_data" | "data" => Ok(RadioState::TxData),
            _ => Err(ParseRadioStateError(s.to_string())),
        }
    }
}

/// Why a control operation was refused outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RadioFault {
    /// The radio id is outside `[0, max_radios)`.
    InvalidRadio,
    /// A pin is configured for this radio but its line is not attached.
    NotPlumbed,
    /// The I/O controller failed while applying the transition.
    LineFault,
}

impl fmt::Display for RadioFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RadioFault::InvalidRadio => "invalid radio",
            RadioFault::NotPlumbed => "I/O lines not plumbed",
            RadioFault::LineFault => "I/O line failure",
        };
        write!(f, "{s}")
    }
}

/// Result of a control operation. Never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// The radio is (now) in this state.
    State(RadioState),
    /// The radio is administratively disabled; nothing changed.
    Disabled,
    /// Transmit was refused because a time-out penalty is running.
    Blocked,
    /// The request was rejected; nothing changed.
    Error(RadioFault),
}

impl Outcome {
    /// The committed state, if this outcome carries one.
    pub fn state(&self) -> Option<RadioState> {
        match self {
            Outcome::State(s) => Some(*s),
            _ => None,
        }
    }

    /// `true` for [`Outcome::Error`].
    pub fn is_error(&self) -> bool {
        matches!(self, Outcome::Error(_))
    }
}

impl From<RadioState> for Outcome {
    fn from(state: RadioState) -> Self {
        Outcome::State(state)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::State(s) => write!(f, "{s}"),
            Outcome::Disabled => write!(f, "DISABLED"),
            Outcome::Blocked => write!(f, "Blocked"),
            Outcome::Error(fault) => write!(f, "ERROR ({fault})"),
        }
    }
}

/// How a radio's receive state is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RxMode {
    /// Receive state is only changed by explicit control requests.
    #[default]
    Manual,
    /// Receive state follows the squelch (COS) input line.
    GpioSquelch,
    /// Receive state follows an external voice-activity detector.
    Vox,
}

impl fmt::Display for RxMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RxMode::Manual => "manual",
            RxMode::GpioSquelch => "gpio",
            RxMode::Vox => "vox",
        };
        write!(f, "{s}")
    }
}

/// Error returned when a string cannot be parsed into an [`RxMode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseRxModeError(String);

impl fmt::Display for ParseRxModeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown rx mode: {}", self.0)
    }
}

impl std::error::Error for ParseRxModeError {}

impl FromStr for RxMode {
    type Err = ParseRxModeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "manual" => Ok(RxMode::Manual),
            "gpio" | "squelch" | "cos" => Ok(RxMode::GpioSquelch),
            "vox" | "vad" => Ok(RxMode::Vox),
            _ => Err(ParseRxModeError(s.to_string())),
        }
    }
}

/// Station identification style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IdMode {
    /// No automatic identification.
    #[default]
    None,
    /// Morse code identification.
    Cw,
    /// Recorded voice identification.
    Voice,
    /// Morse followed by voice.
    Both,
}

impl fmt::Display for IdMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IdMode::None => "none",
            IdMode::Cw => "cw",
            IdMode::Voice => "voice",
            IdMode::Both => "both",
        };
        write!(f, "{s}")
    }
}

/// Error returned when a string cannot be parsed into an [`IdMode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdModeError(String);

impl fmt::Display for ParseIdModeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown id type: {}", self.0)
    }
}

impl std::error::Error for ParseIdModeError {}

impl FromStr for IdMode {
    type Err = ParseIdModeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(IdMode::None),
            "cw" | "morse" => Ok(IdMode::Cw),
            "voice" => Ok(IdMode::Voice),
            "both" => Ok(IdMode::Both),
            _ => Err(ParseIdModeError(s.to_string())),
        }
    }
}

/// Supervisor polling period.
///
/// Either zero (no throttling, the supervisor only yields between sweeps)
/// or at least [`PollInterval::MIN`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PollInterval(Duration);

impl PollInterval {
    /// Shortest accepted non-zero interval.
    pub const MIN: Duration = Duration::from_millis(25);

    /// Interval used when the configuration does not set one.
    pub const DEFAULT: PollInterval = PollInterval(Duration::from_millis(100));

    /// Unthrottled polling.
    pub const UNTHROTTLED: PollInterval = PollInterval(Duration::ZERO);

    /// Build an interval from milliseconds.
    ///
    /// Returns `None` for values between 1 and 24 ms.
    pub fn from_millis(ms: u64) -> Option<Self> {
        let d = Duration::from_millis(ms);
        if ms == 0 || d >= Self::MIN {
            Some(PollInterval(d))
        } else {
            None
        }
    }

    /// The interval as a [`Duration`] (zero when unthrottled).
    pub fn as_duration(&self) -> Duration {
        self.0
    }

    /// `false` when the supervisor runs unthrottled.
    pub fn is_throttled(&self) -> bool {
        !self.0.is_zero()
    }
}

impl Default for PollInterval {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn radio_id_display() {
        assert_eq!(RadioId::from_index(0).to_string(), "radio0");
        assert_eq!(RadioId::from_index(7).to_string(), "radio7");
    }

    #[test]
    fn radio_id_parse_forms() {
        assert_eq!("3".parse::<RadioId>().unwrap(), RadioId::from_index(3));
        assert_eq!("radio3".parse::<RadioId>().unwrap(), RadioId::from_index(3));
        assert_eq!("Radio12".parse::<RadioId>().unwrap(), RadioId::from_index(12));
        assert!("-1".parse::<RadioId>().is_err());
        assert!("radio".parse::<RadioId>().is_err());
        assert!("x".parse::<RadioId>().is_err());
    }

    #[test]
    fn radio_state_severity_order() {
        assert!(RadioState::Off < RadioState::Idle);
        assert!(RadioState::Idle < RadioState::Rx);
        assert!(RadioState::Rx < RadioState::Tx);
        assert!(RadioState::Tx < RadioState::TxData);
    }

    #[test]
    fn radio_state_predicates() {
        assert!(RadioState::Tx.is_transmitting());
        assert!(RadioState::TxData.is_transmitting());
        assert!(!RadioState::Rx.is_transmitting());
        assert!(!RadioState::Off.is_powered());
        assert!(RadioState::Idle.is_powered());
    }

    #[test]
    fn radio_state_parse_rejects_sentinels() {
        assert_eq!("tx".parse::<RadioState>().unwrap(), RadioState::Tx);
        assert_eq!("TX-DATA".parse::<RadioState>().unwrap(), RadioState::TxData);
        assert!("blocked".parse::<RadioState>().is_err());
        assert!("disabled".parse::<RadioState>().is_err());
        assert!("error".parse::<RadioState>().is_err());
    }

    #[test]
    fn outcome_state_accessor() {
        assert_eq!(Outcome::State(RadioState::Rx).state(), Some(RadioState::Rx));
        assert_eq!(Outcome::Blocked.state(), None);
        assert!(Outcome::Error(RadioFault::NotPlumbed).is_error());
        assert!(!Outcome::Disabled.is_error());
    }

    #[test]
    fn outcome_display() {
        assert_eq!(Outcome::from(RadioState::Tx).to_string(), "Transmitting");
        assert_eq!(Outcome::Disabled.to_string(), "DISABLED");
        assert_eq!(
            Outcome::Error(RadioFault::InvalidRadio).to_string(),
            "ERROR (invalid radio)"
        );
    }

    #[test]
    fn rx_mode_parse() {
        assert_eq!("gpio".parse::<RxMode>().unwrap(), RxMode::GpioSquelch);
        assert_eq!("VOX".parse::<RxMode>().unwrap(), RxMode::Vox);
        assert_eq!("manual".parse::<RxMode>().unwrap(), RxMode::Manual);
        assert!("auto".parse::<RxMode>().is_err());
    }

    #[test]
    fn id_mode_parse() {
        assert_eq!("cw".parse::<IdMode>().unwrap(), IdMode::Cw);
        assert_eq!("Both".parse::<IdMode>().unwrap(), IdMode::Both);
        assert!("semaphore".parse::<IdMode>().is_err());
    }

    #[test]
    fn poll_interval_bounds() {
        assert_eq!(PollInterval::from_millis(0), Some(PollInterval::UNTHROTTLED));
        assert!(PollInterval::from_millis(10).is_none());
        assert!(PollInterval::from_millis(24).is_none());
        let p = PollInterval::from_millis(25).unwrap();
        assert_eq!(p.as_duration(), Duration::from_millis(25));
        assert!(p.is_throttled());
        assert!(!PollInterval::UNTHROTTLED.is_throttled());
        assert_eq!(PollInterval::default().as_duration(), Duration::from_millis(100));
    }
}
