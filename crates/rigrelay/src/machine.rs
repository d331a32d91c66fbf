//! The per-radio transition function.
//!
//! Everything here operates on a record the caller has already locked, so
//! the registry and the supervisor can run several steps on one radio
//! without releasing it in between.

use std::time::Instant;

use rigrelay_core::error::Result;
use rigrelay_core::events::RadioEvent;
use rigrelay_core::line::LineController;
use rigrelay_core::types::{Outcome, RadioFault, RadioState};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::record::RadioRecord;

/// What a transition needs besides the record itself.
pub(crate) struct Effects<'a> {
    pub controller: &'a dyn LineController,
    pub now: Instant,
    pub events: &'a broadcast::Sender<RadioEvent>,
}

impl Effects<'_> {
    pub fn emit(&self, event: RadioEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

/// Move `rec` to `requested`.
///
/// Rejections leave the record untouched. Line effects are applied before
/// the new status is committed, so a failed write never leaves `status`
/// claiming something the hardware is not doing.
pub(crate) async fn set_state(
    rec: &mut RadioRecord,
    requested: RadioState,
    fx: &Effects<'_>,
) -> Outcome {
    let id = rec.id;

    if !rec.is_plumbed() {
        error!(radio = %id, requested = %requested, "radio lines are not plumbed");
        return Outcome::Error(RadioFault::NotPlumbed);
    }

    if !rec.enabled && requested != RadioState::Off {
        debug!(radio = %id, requested = %requested, "radio is disabled");
        return Outcome::Disabled;
    }

    if requested.is_transmitting() && !rec.penalty.is_zero() {
        rec.penalty = rec.penalty.max(rec.config.timeout_holdoff);
        warn!(radio = %id, penalty = ?rec.penalty, "transmit blocked by time-out penalty");
        fx.emit(RadioEvent::TransmitBlocked {
            radio: id,
            penalty: rec.penalty,
        });
        return Outcome::Blocked;
    }

    if let Err(e) = drive_lines(rec, requested, fx.controller).await {
        error!(radio = %id, requested = %requested, error = %e, "line write failed, state unchanged");
        if requested.is_transmitting() {
            if let Some(ptt) = rec.lines.ptt {
                if let Err(e) = fx.controller.set(ptt, false).await {
                    error!(radio = %id, error = %e, "failed to release PTT after keying fault");
                }
            }
        }
        return Outcome::Error(RadioFault::LineFault);
    }

    commit(rec, requested, fx);
    Outcome::State(requested)
}

/// Force a radio dark and close its gate, whatever state it is in.
///
/// Used on shutdown and reload. Every attached output is cleared even if
/// an earlier one fails.
pub(crate) async fn force_off(rec: &mut RadioRecord, fx: &Effects<'_>) {
    let id = rec.id;
    for (role, line) in [("ptt", rec.lines.ptt), ("power", rec.lines.power)] {
        let Some(handle) = line else { continue };
        if let Err(e) = fx.controller.set(handle, false).await {
            error!(radio = %id, role, error = %e, "failed to clear line on shutdown");
        }
    }
    commit(rec, RadioState::Off, fx);
    if rec.enabled {
        rec.enabled = false;
        fx.emit(RadioEvent::EnabledChanged {
            radio: id,
            enabled: false,
        });
    }
}

async fn drive_lines(
    rec: &RadioRecord,
    target: RadioState,
    controller: &dyn LineController,
) -> Result<()> {
    let lines = rec.lines;
    match target {
        RadioState::Off => {
            // Attempt both even if the first fails.
            let ptt = match lines.ptt {
                Some(h) => controller.set(h, false).await,
                None => Ok(()),
            };
            let power = match lines.power {
                Some(h) => controller.set(h, false).await,
                None => Ok(()),
            };
            ptt.and(power)
        }
        RadioState::Idle | RadioState::Rx => {
            if let Some(h) = lines.ptt {
                controller.set(h, false).await?;
            }
            if let Some(h) = lines.power {
                controller.set(h, true).await?;
            }
            Ok(())
        }
        RadioState::Tx | RadioState::TxData => {
            if let Some(h) = lines.ptt {
                controller.set(h, true).await?;
            }
            Ok(())
        }
    }
}

/// Update timers and statistics, then store the new status.
fn commit(rec: &mut RadioRecord, to: RadioState, fx: &Effects<'_>) {
    let from = rec.status;
    let now = fx.now;

    if from.is_transmitting() && !to.is_transmitting() {
        if let Some(start) = rec.talk_start.take() {
            rec.stats.total_tx += now.saturating_duration_since(start);
        }
        rec.stats.last_tx = Some(now);
    }
    if to.is_transmitting() && rec.talk_start.is_none() {
        rec.talk_start = Some(now);
    }

    if from == RadioState::Rx && to != RadioState::Rx {
        if let Some(start) = rec.listen_start.take() {
            rec.stats.total_rx += now.saturating_duration_since(start);
        }
        rec.stats.last_rx = Some(now);
    }
    if to == RadioState::Rx && from != RadioState::Rx {
        rec.listen_start = Some(now);
    }

    rec.status = to;
    if from != to {
        info!(radio = %rec.id, from = %from, to = %to, "state changed");
        fx.emit(RadioEvent::StateChanged {
            radio: rec.id,
            from,
            to,
        });
    }
}
