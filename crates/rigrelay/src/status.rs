//! Point-in-time views of radio records for display.

use std::fmt::Write as _;
use std::time::{Duration, Instant};

use rigrelay_core::config::PinConfig;
use rigrelay_core::helpers::format_duration;
use rigrelay_core::types::{RadioId, RadioState, RxMode};

use crate::record::RadioRecord;

/// A copy of every public field of one radio.
///
/// Timestamps are converted to ages relative to the capture time, since
/// monotonic instants mean nothing to a reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadioSnapshot {
    pub id: RadioId,
    pub description: String,
    pub enabled: bool,
    pub status: RadioState,
    pub rx_mode: RxMode,
    pub squelch_invert: bool,
    pub ctcss_inband: bool,
    pub timeout_talk: Duration,
    pub timeout_holdoff: Duration,
    pub penalty: Duration,
    pub power_pin: PinConfig,
    pub ptt_pin: PinConfig,
    pub squelch_pin: PinConfig,
    /// `true` when every wired output is attached.
    pub plumbed: bool,
    pub total_rx: Duration,
    pub total_tx: Duration,
    /// Length of the reception in progress.
    pub current_rx: Option<Duration>,
    /// Length of the transmission in progress.
    pub current_tx: Option<Duration>,
    pub since_last_rx: Option<Duration>,
    pub since_last_tx: Option<Duration>,
    pub since_last_id: Option<Duration>,
}

impl RadioSnapshot {
    pub(crate) fn capture(rec: &RadioRecord, now: Instant) -> Self {
        let age = |t: Option<Instant>| t.map(|t| now.saturating_duration_since(t));
        RadioSnapshot {
            id: rec.id,
            description: rec.config.description.clone(),
            enabled: rec.enabled,
            status: rec.status,
            rx_mode: rec.config.rx_mode,
            squelch_invert: rec.config.squelch_invert,
            ctcss_inband: rec.config.ctcss_inband,
            timeout_talk: rec.config.timeout_talk,
            timeout_holdoff: rec.config.timeout_holdoff,
            penalty: rec.penalty,
            power_pin: rec.config.power,
            ptt_pin: rec.config.ptt,
            squelch_pin: rec.config.squelch,
            plumbed: rec.is_plumbed(),
            total_rx: rec.stats.total_rx,
            total_tx: rec.stats.total_tx,
            current_rx: age(rec.listen_start),
            current_tx: age(rec.talk_start),
            since_last_rx: age(rec.stats.last_rx),
            since_last_tx: age(rec.stats.last_tx),
            since_last_id: age(rec.stats.last_id),
        }
    }

    /// Status word as an operator sees it: `DISABLED` overrides the state.
    pub fn status_label(&self) -> String {
        if self.enabled {
            self.status.to_string()
        } else {
            "DISABLED".to_string()
        }
    }

    /// Human-readable dump. The short form is two lines; `detailed` adds
    /// mode, timers, statistics, and wiring.
    pub fn render(&self, detailed: bool) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "* {}: {}", self.id, self.description);
        let _ = writeln!(
            out,
            "    enabled: {:<8} status: {}",
            self.enabled,
            self.status_label()
        );
        if !detailed {
            return out;
        }

        let invert = if self.squelch_invert { " (invert)" } else { "" };
        let _ = writeln!(
            out,
            "    rx mode: {:<10} inband ctcss: {}",
            format!("{}{invert}", self.rx_mode),
            self.ctcss_inband
        );
        let _ = writeln!(
            out,
            "   total_rx: {:<10} total_tx: {}",
            format_duration(self.total_rx),
            format_duration(self.total_tx)
        );
        let _ = writeln!(
            out,
            "    last_rx: {:<10} last_tx: {}",
            ago(self.since_last_rx),
            ago(self.since_last_tx)
        );
        let _ = writeln!(
            out,
            "    curr_rx: {:<10} curr_tx: {}",
            running(self.current_rx),
            running(self.current_tx)
        );
        let _ = writeln!(
            out,
            "        tot: {:<10} holdoff: {:<8} penalty: {}",
            format_duration(self.timeout_talk),
            format_duration(self.timeout_holdoff),
            format_duration(self.penalty)
        );
        let _ = writeln!(
            out,
            "      lines: ptt {} power {} squelch {}{}",
            pin(&self.ptt_pin),
            pin(&self.power_pin),
            pin(&self.squelch_pin),
            if self.plumbed { "" } else { " (NOT PLUMBED)" }
        );
        out
    }
}

fn ago(d: Option<Duration>) -> String {
    match d {
        Some(d) => format!("{} ago", format_duration(d)),
        None => "Never".to_string(),
    }
}

fn running(d: Option<Duration>) -> String {
    d.map(format_duration).unwrap_or_else(|| "off".to_string())
}

fn pin(p: &PinConfig) -> String {
    match p.pin {
        Some(n) if p.invert => format!("{n}(inv)"),
        Some(n) => n.to_string(),
        None => "-".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rigrelay_core::config::RadioConfig;

    fn record() -> RadioRecord {
        let config = RadioConfig {
            description: "2m simplex".into(),
            ptt: PinConfig::wired(17).inverted(),
            power: PinConfig::wired(27),
            timeout_talk: Duration::from_secs(180),
            timeout_holdoff: Duration::from_secs(30),
            ..RadioConfig::default()
        };
        RadioRecord::new(RadioId::from_index(0), config)
    }

    #[test]
    fn capture_converts_instants_to_ages() {
        let now = Instant::now();
        let mut rec = record();
        rec.enabled = true;
        rec.status = RadioState::Tx;
        rec.talk_start = Some(now - Duration::from_secs(12));
        rec.stats.last_rx = Some(now - Duration::from_secs(60));

        let snap = RadioSnapshot::capture(&rec, now);
        assert_eq!(snap.current_tx, Some(Duration::from_secs(12)));
        assert_eq!(snap.current_rx, None);
        assert_eq!(snap.since_last_rx, Some(Duration::from_secs(60)));
        assert_eq!(snap.since_last_tx, None);
        // No lines attached in this record.
        assert!(!snap.plumbed);
    }

    #[test]
    fn short_render() {
        let snap = RadioSnapshot::capture(&record(), Instant::now());
        let text = snap.render(false);
        assert_eq!(text.lines().count(), 2);
        assert!(text.starts_with("* radio0: 2m simplex\n"));
        assert!(text.contains("status: DISABLED"));
    }

    #[test]
    fn detailed_render() {
        let mut rec = record();
        rec.enabled = true;
        rec.status = RadioState::Idle;
        rec.penalty = Duration::from_secs(7);
        let text = RadioSnapshot::capture(&rec, Instant::now()).render(true);

        assert!(text.contains("status: Idle"));
        assert!(text.contains("last_rx: Never"));
        assert!(text.contains("curr_tx: off"));
        assert!(text.contains("tot: 3m00s"));
        assert!(text.contains("penalty: 7s"));
        assert!(text.contains("ptt 17(inv) power 27 squelch -"));
        assert!(text.contains("(NOT PLUMBED)"));
    }
}
