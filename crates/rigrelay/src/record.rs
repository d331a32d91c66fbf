//! Per-radio record held by the registry.

use std::time::{Duration, Instant};

use rigrelay_core::config::RadioConfig;
use rigrelay_core::line::{LineController, LineHandle, LineRequest};
use rigrelay_core::types::{RadioId, RadioState, RxMode};
use tracing::{debug, error, warn};

/// Lines attached for one radio. `None` means not wired or attach failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct RadioLines {
    pub power: Option<LineHandle>,
    pub ptt: Option<LineHandle>,
    pub squelch: Option<LineHandle>,
}

/// Cumulative statistics.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct RadioStats {
    pub total_rx: Duration,
    pub total_tx: Duration,
    pub last_rx: Option<Instant>,
    pub last_tx: Option<Instant>,
    pub last_id: Option<Instant>,
}

#[derive(Debug)]
pub(crate) struct RadioRecord {
    pub id: RadioId,
    pub config: RadioConfig,
    pub enabled: bool,
    pub lines: RadioLines,
    pub status: RadioState,
    pub talk_start: Option<Instant>,
    pub listen_start: Option<Instant>,
    pub penalty: Duration,
    pub stats: RadioStats,
}

impl RadioRecord {
    pub fn new(id: RadioId, config: RadioConfig) -> Self {
        RadioRecord {
            id,
            config,
            enabled: false,
            lines: RadioLines::default(),
            status: RadioState::Off,
            talk_start: None,
            listen_start: None,
            penalty: Duration::ZERO,
            stats: RadioStats::default(),
        }
    }

    /// Every output the configuration wires is attached.
    pub fn is_plumbed(&self) -> bool {
        let ok = |wired: bool, line: Option<LineHandle>| !wired || line.is_some();
        ok(self.config.ptt.is_wired(), self.lines.ptt)
            && ok(self.config.power.is_wired(), self.lines.power)
    }

    /// Attach the configured lines. Failures are logged and leave the line
    /// unset, which makes the radio report `NotPlumbed`.
    pub async fn attach_lines(&mut self, controller: &dyn LineController) {
        let id = self.id;

        if let Some(pin) = self.config.power.pin {
            let req = LineRequest::output(pin, self.config.power.invert, format!("{id}-power"));
            self.lines.power = attach(controller, id, "power", req).await;
        }
        if let Some(pin) = self.config.ptt.pin {
            let req = LineRequest::output(pin, self.config.ptt.invert, format!("{id}-ptt"));
            self.lines.ptt = attach(controller, id, "ptt", req).await;
        }
        match (self.config.rx_mode, self.config.squelch.pin) {
            (RxMode::GpioSquelch, Some(pin)) => {
                let req = LineRequest::input(pin, format!("{id}-squelch"));
                self.lines.squelch = attach(controller, id, "squelch", req).await;
            }
            (RxMode::GpioSquelch, None) => {
                warn!(radio = %id, "rx_mode is gpio but no squelch pin is wired");
            }
            (_, Some(pin)) => {
                debug!(radio = %id, pin, rx_mode = %self.config.rx_mode, "squelch pin unused in this rx_mode");
            }
            (_, None) => {}
        }
    }

    /// Release every attached line. Errors are logged; the handles are
    /// dropped either way.
    pub async fn release_lines(&mut self, controller: &dyn LineController) {
        let lines = std::mem::take(&mut self.lines);
        for (role, handle) in [
            ("ptt", lines.ptt),
            ("power", lines.power),
            ("squelch", lines.squelch),
        ] {
            let Some(handle) = handle else { continue };
            if let Err(e) = controller.release(handle).await {
                error!(radio = %self.id, role, error = %e, "failed to release line");
            }
        }
    }
}

async fn attach(
    controller: &dyn LineController,
    id: RadioId,
    role: &'static str,
    req: LineRequest,
) -> Option<LineHandle> {
    let pin = req.pin;
    match controller.attach(req).await {
        Ok(handle) => {
            debug!(radio = %id, role, pin, %handle, "line attached");
            Some(handle)
        }
        Err(e) => {
            error!(
                radio = %id,
                role,
                pin,
                controller = controller.name(),
                error = %e,
                "failed to attach line, radio will not be usable"
            );
            None
        }
    }
}
