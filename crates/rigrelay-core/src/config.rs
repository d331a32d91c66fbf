//! Station configuration.
//!
//! [`StationConfig`] is what the registry is built from. It can be
//! constructed in code or parsed from an ini-style file:
//!
//! ```text
//! [general]
//! max_radios = 2
//! poll_interval = 100
//! gpiochip = gpiochip0
//! id_timeout = 10m
//! id_type = cw
//!
//! [radio0]
//! enabled = true
//! description = "2m FM simplex"
//! rx_mode = gpio
//! pin_power = 27
//! pin_ptt = 17,invert
//! pin_squelch = 22
//! timeout_talk = 180
//! timeout_holdoff = 30s
//! ```
//!
//! Lines starting with `;`, `#`, or `//` are comments, `/* ... */` spans
//! lines, and `@END` closes the current section. `[tones]` and
//! `[conference*]` sections are accepted and skipped.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::helpers::{parse_bool, parse_duration};
use crate::types::{IdMode, PollInterval, RadioId, RxMode};

/// Highest pin number accepted in a configuration.
pub const MAX_PIN: u32 = 128;

/// Longest accepted timer setting (`timeout_talk`, `timeout_holdoff`,
/// `id_timeout`).
pub const MAX_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Number of radio slots when `max_radios` is not configured.
pub const DEFAULT_MAX_RADIOS: u8 = 4;

/// Wiring of one line.
///
/// A pin of `None` means the line is not wired, which is a valid
/// configuration (receivers have no PTT, some radios have no power relay).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PinConfig {
    /// Pin number on the I/O controller.
    pub pin: Option<u32>,
    /// Drive the line active-low.
    pub invert: bool,
}

impl PinConfig {
    /// A wired, active-high pin.
    pub fn wired(pin: u32) -> Self {
        PinConfig {
            pin: Some(pin),
            invert: false,
        }
    }

    /// Builder-style inversion.
    pub fn inverted(mut self) -> Self {
        self.invert = true;
        self
    }

    /// `true` if a pin number is configured.
    pub fn is_wired(&self) -> bool {
        self.pin.is_some()
    }

    /// Parse `"17"`, `"17,invert"`, or `"-1"`.
    ///
    /// Any value `<= 0` means "not wired".
    fn parse(value: &str) -> std::result::Result<Self, String> {
        let mut parts = value.split(',').map(str::trim);
        let number = parts.next().unwrap_or_default();
        let n: i64 = number
            .parse()
            .map_err(|_| format!("'{number}' is not a pin number"))?;
        let mut invert = false;
        for flag in parts {
            match flag.to_ascii_lowercase().as_str() {
                "invert" | "inverted" | "active_low" => invert = true,
                other => return Err(format!("unknown pin flag '{other}'")),
            }
        }
        if n > i64::from(MAX_PIN) {
            return Err(format!("pin {n} is above the maximum of {MAX_PIN}"));
        }
        let pin = if n <= 0 { None } else { Some(n as u32) };
        Ok(PinConfig { pin, invert })
    }
}

/// Per-radio settings.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RadioConfig {
    /// Bring the radio up when the registry is built.
    pub enabled: bool,
    /// Free-form label for status output.
    pub description: String,
    /// How receive activity is detected.
    pub rx_mode: RxMode,
    /// The squelch input is active-low.
    pub squelch_invert: bool,
    /// The radio passes CTCSS tones through its audio (informational).
    pub ctcss_inband: bool,
    /// Transmit time-out; zero disables the TOT.
    pub timeout_talk: Duration,
    /// Lockout applied after a TOT trip.
    pub timeout_holdoff: Duration,
    /// Power / ignition relay output.
    pub power: PinConfig,
    /// Push-to-talk relay output.
    pub ptt: PinConfig,
    /// Squelch (COS) input. Polarity comes from `squelch_invert`.
    pub squelch: PinConfig,
}

/// Station-wide settings from the `[general]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneralConfig {
    /// Number of radio slots.
    pub max_radios: u8,
    /// Supervisor polling period.
    pub poll_interval: PollInterval,
    /// I/O controller name (`gpiochip0`, `/dev/gpiochip0`, `serial:/dev/ttyUSB0`).
    pub gpiochip: Option<String>,
    /// Identification interval while transmitting; zero disables it.
    pub id_timeout: Duration,
    /// Identification style.
    pub id_type: IdMode,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        GeneralConfig {
            max_radios: DEFAULT_MAX_RADIOS,
            poll_interval: PollInterval::DEFAULT,
            gpiochip: None,
            id_timeout: Duration::ZERO,
            id_type: IdMode::None,
        }
    }
}

/// Complete configuration for a station.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StationConfig {
    /// Station-wide settings.
    pub general: GeneralConfig,
    /// Configured radios. Slots without an entry get a default, disabled
    /// record.
    pub radios: BTreeMap<RadioId, RadioConfig>,
}

/// Which section the parser is in.
enum Section {
    General,
    Radio(RadioId),
    Skipped,
}

impl StationConfig {
    /// Read and parse a configuration file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "loading station configuration");
        let text = tokio::fs::read_to_string(path).await?;
        Self::parse(&text)
    }

    /// Parse configuration text.
    pub fn parse(text: &str) -> Result<Self> {
        let mut config = StationConfig::default();
        let mut section: Option<Section> = None;
        let mut in_block_comment = false;

        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim();

            if in_block_comment {
                if line.contains("*/") {
                    in_block_comment = false;
                }
                continue;
            }
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }
            if line.starts_with("//") {
                continue;
            }
            if let Some(rest) = line.strip_prefix("/*") {
                in_block_comment = !rest.contains("*/");
                continue;
            }

            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                section = Some(Self::open_section(name.trim()));
                continue;
            }

            let Some(current) = section.as_ref() else {
                return Err(Error::Config {
                    line: line_no,
                    message: format!("line outside of a section: {line}"),
                });
            };

            if line.eq_ignore_ascii_case("@END") {
                section = None;
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                return Err(Error::Config {
                    line: line_no,
                    message: format!("missing '=' in '{line}'"),
                });
            };
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim();

            let applied = match current {
                Section::General => config.general.apply(&key, value),
                Section::Radio(id) => config.radios.entry(*id).or_default().apply(&key, value),
                Section::Skipped => Ok(()),
            };
            applied.map_err(|message| Error::Config {
                line: line_no,
                message,
            })?;
        }

        let max = config.general.max_radios;
        config.radios.retain(|id, _| {
            let keep = id.index() < max;
            if !keep {
                warn!(radio = %id, max_radios = max, "radio section ignored, above max_radios");
            }
            keep
        });

        Ok(config)
    }

    /// Configuration for one radio, if it has a section.
    pub fn radio(&self, id: RadioId) -> Option<&RadioConfig> {
        self.radios.get(&id)
    }

    fn open_section(name: &str) -> Section {
        let lower = name.to_ascii_lowercase();
        if lower == "general" {
            return Section::General;
        }
        if lower == "tones" || lower.starts_with("conference") {
            debug!(section = name, "skipping section");
            return Section::Skipped;
        }
        if let Some(index) = lower.strip_prefix("radio") {
            if let Ok(n) = index.parse::<u8>() {
                return Section::Radio(RadioId::from_index(n));
            }
        }
        warn!(section = name, "unknown configuration section, skipping");
        Section::Skipped
    }
}

fn bool_value(key: &str, value: &str) -> std::result::Result<bool, String> {
    parse_bool(value).ok_or_else(|| format!("{key}: '{value}' is not a boolean"))
}

fn duration_value(key: &str, value: &str) -> std::result::Result<Duration, String> {
    parse_duration(value).ok_or_else(|| format!("{key}: '{value}' is not a duration"))
}

fn timeout_value(key: &str, value: &str) -> std::result::Result<Duration, String> {
    let d = duration_value(key, value)?;
    if d > MAX_TIMEOUT {
        return Err(format!("{key}: '{value}' exceeds the 24h maximum"));
    }
    Ok(d)
}

fn unquote(value: &str) -> std::result::Result<String, String> {
    match value.strip_prefix('"') {
        Some(rest) => rest
            .strip_suffix('"')
            .map(str::to_string)
            .ok_or_else(|| "missing closing quote".to_string()),
        None => Ok(value.to_string()),
    }
}

impl GeneralConfig {
    fn apply(&mut self, key: &str, value: &str) -> std::result::Result<(), String> {
        match key {
            "max_radios" => {
                self.max_radios = value
                    .parse::<u8>()
                    .ok()
                    .filter(|n| *n > 0)
                    .ok_or_else(|| format!("max_radios: '{value}' must be 1-255"))?;
            }
            "poll_interval" => {
                let ms: u64 = value
                    .parse()
                    .map_err(|_| format!("poll_interval: '{value}' is not a number of ms"))?;
                match PollInterval::from_millis(ms) {
                    Some(p) => {
                        if !p.is_throttled() {
                            debug!("poll_interval is 0, supervisor will run unthrottled");
                        }
                        self.poll_interval = p;
                    }
                    None => warn!(
                        poll_interval_ms = ms,
                        "poll_interval below 25ms ignored, keeping {}ms",
                        self.poll_interval.as_duration().as_millis()
                    ),
                }
            }
            "gpiochip" => self.gpiochip = Some(unquote(value)?),
            "id_timeout" => {
                self.id_timeout = timeout_value(key, value)?;
                if self.id_timeout.is_zero() {
                    warn!("id_timeout should be non-zero for amateur use");
                }
            }
            "id_type" => {
                self.id_type = value.parse().map_err(|e| format!("id_type: {e}"))?;
                if self.id_type == IdMode::None {
                    warn!("id_type should be cw, voice, or both for amateur use");
                }
            }
            "max_conferences" => debug!("max_conferences is not used"),
            _ => warn!(key, "unknown key in [general], skipping"),
        }
        Ok(())
    }
}

impl RadioConfig {
    fn apply(&mut self, key: &str, value: &str) -> std::result::Result<(), String> {
        match key {
            "enabled" => self.enabled = bool_value(key, value)?,
            "description" => self.description = unquote(value)?,
            "ctcss_inband" => self.ctcss_inband = bool_value(key, value)?,
            "rx_mode" | "squelch_mode" => {
                self.rx_mode = value.parse().map_err(|e| format!("{key}: {e}"))?;
            }
            "squelch_invert" => self.squelch_invert = bool_value(key, value)?,
            "timeout_talk" => self.timeout_talk = timeout_value(key, value)?,
            "timeout_holdoff" => self.timeout_holdoff = timeout_value(key, value)?,
            "pin_power" | "gpio_power" => merge_pin(&mut self.power, key, value)?,
            "pin_ptt" | "gpio_ptt" => merge_pin(&mut self.ptt, key, value)?,
            "pin_squelch" | "gpio_squelch" => merge_pin(&mut self.squelch, key, value)?,
            "gpio_power_invert" | "pin_power_invert" => {
                self.power.invert = bool_value(key, value)?;
            }
            "gpio_ptt_invert" | "pin_ptt_invert" => self.ptt.invert = bool_value(key, value)?,
            "cat_type" | "cat_model" | "cat_port" | "pa_indev" | "pa_outdev" => {
                debug!(key, "rig-control/audio key not used");
            }
            _ => warn!(key, "unknown radio key, skipping"),
        }
        Ok(())
    }
}

/// Apply a pin value without losing an inversion set by a separate key.
fn merge_pin(target: &mut PinConfig, key: &str, value: &str) -> std::result::Result<(), String> {
    let parsed = PinConfig::parse(value).map_err(|e| format!("{key}: {e}"))?;
    if parsed.pin.is_none() {
        debug!(key, "line not wired");
    }
    target.pin = parsed.pin;
    target.invert |= parsed.invert;
    Ok(())
}
