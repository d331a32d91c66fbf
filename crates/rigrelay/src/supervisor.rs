//! The supervisory poller.
//!
//! Every tick the supervisor visits each radio once, holding that radio's
//! lock for the whole visit:
//!
//! 1. decay the time-out penalty by the wall-clock time since the last tick
//! 2. sample squelch (GPIO input or the VOX predicate)
//! 3. move an idle radio to `Rx` when activity starts, and back when it stops
//! 4. power down a disabled radio whose forced `Off` failed earlier
//! 5. release a transmitter that has exceeded its time-out and arm the penalty
//! 6. request station identification when it is due
//!
//! A failing step is logged and the remaining steps still run, so a broken
//! squelch input never stops the time-out timer.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rigrelay_core::config::GeneralConfig;
use rigrelay_core::events::RadioEvent;
use rigrelay_core::types::{IdMode, Outcome, PollInterval, RadioState, RxMode};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::machine::{self, Effects};
use crate::record::RadioRecord;
use crate::registry::Registry;

/// Drives the periodic checks for a [`Registry`].
///
/// Tests call [`tick`](Supervisor::tick) directly with a manual clock;
/// applications use [`spawn`](Supervisor::spawn).
pub struct Supervisor {
    registry: Arc<Registry>,
    last_tick: Option<Instant>,
}

/// Handle to a spawned supervisor task.
pub struct SupervisorHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SupervisorHandle {
    /// Stop the loop and wait for it to finish its current sweep.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            error!(error = %e, "supervisor task ended abnormally");
        }
    }

    /// `false` once the task has exited.
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Supervisor {
    /// A supervisor for `registry`; nothing runs until it is ticked or spawned.
    pub fn new(registry: Arc<Registry>) -> Self {
        Supervisor {
            registry,
            last_tick: None,
        }
    }

    /// Run the loop on the current Tokio runtime.
    pub fn spawn(self) -> SupervisorHandle {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(self.run(cancel.clone()));
        SupervisorHandle { cancel, task }
    }

    async fn run(mut self, cancel: CancellationToken) {
        info!("supervisor started");
        loop {
            self.tick().await;
            let interval = self.registry.poll_interval().await;

            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!("supervisor cancelled");
                    break;
                }

                _ = pause(interval) => {}
            }
        }
        info!("supervisor stopped");
    }

    /// One sweep over every radio.
    pub async fn tick(&mut self) {
        let now = self.registry.clock.now();
        let elapsed = self
            .last_tick
            .map(|t| now.saturating_duration_since(t))
            .unwrap_or(Duration::ZERO);
        self.last_tick = Some(now);

        let registry = &self.registry;
        let fleet = registry.fleet.read().await;
        let fx = Effects {
            controller: fleet.controller.as_ref(),
            now,
            events: &registry.event_tx,
        };
        for slot in &fleet.radios {
            let mut rec = slot.lock().await;
            supervise(&mut rec, registry, &fleet.general, &fx, elapsed).await;
        }
    }
}

async fn pause(interval: PollInterval) {
    if interval.is_throttled() {
        tokio::time::sleep(interval.as_duration()).await;
    } else {
        tokio::task::yield_now().await;
    }
}

async fn supervise(
    rec: &mut RadioRecord,
    registry: &Registry,
    general: &GeneralConfig,
    fx: &Effects<'_>,
    elapsed: Duration,
) {
    let id = rec.id;
    let now = fx.now;

    // Penalty decay.
    if !rec.penalty.is_zero() {
        rec.penalty = rec.penalty.saturating_sub(elapsed);
        if rec.penalty.is_zero() {
            info!(radio = %id, "time-out penalty cleared");
            registry.notifier.penalty_cleared(id);
            fx.emit(RadioEvent::PenaltyCleared { radio: id });
        }
    }

    // Squelch sampling.
    let activity = match rec.config.rx_mode {
        RxMode::Manual => None,
        RxMode::GpioSquelch => match rec.lines.squelch {
            Some(handle) => match fx.controller.read(handle).await {
                Ok(level) => Some(level ^ rec.config.squelch_invert),
                Err(e) => {
                    error!(radio = %id, error = %e, "squelch read failed, receive state unchanged");
                    None
                }
            },
            None => None,
        },
        RxMode::Vox => Some(registry.squelch.is_active(id)),
    };

    // Receive-state derivation. Never touches a transmitting radio.
    if let Some(active) = activity {
        match (active, rec.status) {
            (true, RadioState::Idle) if rec.enabled => {
                let outcome = machine::set_state(rec, RadioState::Rx, fx).await;
                if outcome == Outcome::State(RadioState::Rx) {
                    rec.stats.last_rx = Some(now);
                } else {
                    warn!(radio = %id, outcome = %outcome, "could not enter receive");
                }
            }
            (true, RadioState::Rx) => rec.stats.last_rx = Some(now),
            (false, RadioState::Rx) => {
                let outcome = machine::set_state(rec, RadioState::Idle, fx).await;
                if outcome != Outcome::State(RadioState::Idle) {
                    warn!(radio = %id, outcome = %outcome, "could not leave receive");
                }
                rec.stats.last_rx = Some(now);
            }
            _ => {}
        }
    }

    // A disabled radio left powered by a failed disable.
    if !rec.enabled && rec.status != RadioState::Off {
        let outcome = machine::set_state(rec, RadioState::Off, fx).await;
        if outcome == Outcome::State(RadioState::Off) {
            info!(radio = %id, "disabled radio powered down on retry");
        } else {
            error!(radio = %id, outcome = %outcome, "disabled radio still powered");
        }
    }

    // Time-out timer. An unrepresentable expiry never fires.
    let tot = rec.config.timeout_talk;
    if rec.status.is_transmitting() && !tot.is_zero() {
        if let Some(expiry) = rec.talk_start.and_then(|start| start.checked_add(tot)) {
            if now >= expiry {
                let outcome = machine::set_state(rec, RadioState::Idle, fx).await;
                if outcome == Outcome::State(RadioState::Idle) {
                    rec.penalty = rec.penalty.saturating_add(rec.config.timeout_holdoff);
                    rec.stats.last_tx = Some(now);
                    warn!(radio = %id, penalty = ?rec.penalty, "transmit time-out, transmitter released");
                    fx.emit(RadioEvent::TimeoutExpired {
                        radio: id,
                        penalty: rec.penalty,
                    });
                } else {
                    error!(radio = %id, outcome = %outcome, "failed to release timed-out transmitter");
                }
            }
        }
    }

    // Identification.
    if rec.status.is_transmitting()
        && !general.id_timeout.is_zero()
        && general.id_type != IdMode::None
    {
        let due = rec
            .stats
            .last_id
            .is_none_or(|t| now.saturating_duration_since(t) >= general.id_timeout);
        if due {
            debug!(radio = %id, mode = %general.id_type, "identification due");
            registry.notifier.identify(id, general.id_type);
            rec.stats.last_id = Some(now);
            fx.emit(RadioEvent::Identified {
                radio: id,
                mode: general.id_type,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rigrelay_core::config::{PinConfig, RadioConfig, StationConfig};
    use rigrelay_core::types::{RadioFault, RadioId};
    use rigrelay_test_harness::{
        ManualClock, MockLineController, Notification, RecordingNotifier, ScriptedSquelch,
    };

    use crate::registry::RegistryBuilder;

    fn r(n: u8) -> RadioId {
        RadioId::from_index(n)
    }

    struct Station {
        registry: Arc<Registry>,
        supervisor: Supervisor,
        mock: Arc<MockLineController>,
        clock: Arc<ManualClock>,
        notifier: Arc<RecordingNotifier>,
        vox: Arc<ScriptedSquelch>,
    }

    impl Station {
        async fn new(config: StationConfig) -> Self {
            let mock = Arc::new(MockLineController::new());
            let clock = Arc::new(ManualClock::new());
            let notifier = Arc::new(RecordingNotifier::new());
            let vox = Arc::new(ScriptedSquelch::new());
            let registry = Arc::new(
                RegistryBuilder::new(config)
                    .controller(mock.clone())
                    .clock(clock.clone())
                    .notifier(notifier.clone())
                    .squelch(vox.clone())
                    .build()
                    .await
                    .unwrap(),
            );
            let supervisor = Supervisor::new(registry.clone());
            Station {
                registry,
                supervisor,
                mock,
                clock,
                notifier,
                vox,
            }
        }

        async fn advance(&mut self, secs: u64) {
            self.clock.advance(Duration::from_secs(secs));
            self.supervisor.tick().await;
        }

        async fn penalty(&self, id: RadioId) -> Duration {
            self.registry.snapshot(id).await.unwrap().penalty
        }
    }

    /// pin_ptt=17, pin_power=27, 5s TOT, 10s holdoff.
    fn tot_station() -> StationConfig {
        let mut config = StationConfig::default();
        config.general.max_radios = 1;
        config.radios.insert(
            r(0),
            RadioConfig {
                enabled: true,
                ptt: PinConfig::wired(17),
                power: PinConfig::wired(27),
                timeout_talk: Duration::from_secs(5),
                timeout_holdoff: Duration::from_secs(10),
                ..RadioConfig::default()
            },
        );
        config
    }

    fn squelch_station(rx_mode: RxMode) -> StationConfig {
        let mut config = StationConfig::default();
        config.general.max_radios = 1;
        config.radios.insert(
            r(0),
            RadioConfig {
                enabled: true,
                rx_mode,
                squelch_invert: true,
                ptt: PinConfig::wired(17),
                squelch: PinConfig::wired(22),
                ..RadioConfig::default()
            },
        );
        config
    }

    #[tokio::test]
    async fn tot_trip_then_blocked() {
        let mut st = Station::new(tot_station()).await;
        assert_eq!(st.registry.get_state(r(0)).await, Outcome::State(RadioState::Idle));
        st.supervisor.tick().await;

        assert_eq!(
            st.registry.set_state(r(0), RadioState::Tx).await,
            Outcome::State(RadioState::Tx)
        );
        assert!(st.mock.is_asserted(17));

        st.advance(4).await;
        assert_eq!(st.registry.get_state(r(0)).await, Outcome::State(RadioState::Tx));

        st.advance(1).await;
        assert_eq!(st.registry.get_state(r(0)).await, Outcome::State(RadioState::Idle));
        assert!(!st.mock.is_asserted(17));
        assert_eq!(st.penalty(r(0)).await, Duration::from_secs(10));

        assert_eq!(st.registry.set_state(r(0), RadioState::Tx).await, Outcome::Blocked);
        assert!(!st.mock.is_asserted(17));
        assert_eq!(st.penalty(r(0)).await, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn tot_adds_exactly_holdoff() {
        let mut st = Station::new(tot_station()).await;
        st.supervisor.tick().await;
        st.registry.set_state(r(0), RadioState::Tx).await;
        st.advance(5).await;
        let first = st.penalty(r(0)).await;

        // Let the penalty run out, then trip again.
        st.advance(10).await;
        assert_eq!(st.penalty(r(0)).await, Duration::ZERO);
        st.registry.set_state(r(0), RadioState::Tx).await;
        st.advance(6).await;
        assert_eq!(first, Duration::from_secs(10));
        assert_eq!(st.penalty(r(0)).await, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn penalty_decays_by_wall_clock_and_clears_once() {
        let mut st = Station::new(tot_station()).await;
        let mut events = st.registry.subscribe();
        st.supervisor.tick().await;
        st.registry.set_state(r(0), RadioState::Tx).await;
        st.advance(5).await;

        st.advance(3).await;
        assert_eq!(st.penalty(r(0)).await, Duration::from_secs(7));
        st.advance(0).await;
        assert_eq!(st.penalty(r(0)).await, Duration::from_secs(7));
        st.advance(20).await;
        assert_eq!(st.penalty(r(0)).await, Duration::ZERO);
        st.advance(1).await;
        st.advance(1).await;

        assert_eq!(st.notifier.cleared_count(r(0)), 1);
        let mut cleared = 0;
        while let Ok(ev) = events.try_recv() {
            if matches!(ev, RadioEvent::PenaltyCleared { .. }) {
                cleared += 1;
            }
        }
        assert_eq!(cleared, 1);
    }

    #[tokio::test]
    async fn total_tx_matches_transmission_length() {
        let mut st = Station::new(tot_station()).await;
        st.supervisor.tick().await;
        st.registry.set_state(r(0), RadioState::Tx).await;
        st.advance(3).await;
        st.registry.ptt_off(r(0)).await;
        let snap = st.registry.snapshot(r(0)).await.unwrap();
        assert_eq!(snap.total_tx, Duration::from_secs(3));
        assert_eq!(snap.penalty, Duration::ZERO);
    }

    #[tokio::test]
    async fn gpio_squelch_drives_rx() {
        let mut st = Station::new(squelch_station(RxMode::GpioSquelch)).await;
        // Inverted: a low input means carrier present.
        st.mock.set_input(22, true);
        st.supervisor.tick().await;
        assert_eq!(st.registry.get_state(r(0)).await, Outcome::State(RadioState::Idle));

        st.mock.set_input(22, false);
        st.advance(1).await;
        assert_eq!(st.registry.get_state(r(0)).await, Outcome::State(RadioState::Rx));

        st.advance(4).await;
        let snap = st.registry.snapshot(r(0)).await.unwrap();
        assert_eq!(snap.current_rx, Some(Duration::from_secs(4)));

        st.mock.set_input(22, true);
        st.advance(1).await;
        assert_eq!(st.registry.get_state(r(0)).await, Outcome::State(RadioState::Idle));
        let snap = st.registry.snapshot(r(0)).await.unwrap();
        assert_eq!(snap.total_rx, Duration::from_secs(5));
        assert_eq!(snap.since_last_rx, Some(Duration::ZERO));
    }

    #[tokio::test]
    async fn squelch_never_overrides_tx() {
        let mut st = Station::new(squelch_station(RxMode::GpioSquelch)).await;
        st.mock.set_input(22, true);
        st.supervisor.tick().await;
        st.registry.set_state(r(0), RadioState::Tx).await;

        st.mock.set_input(22, false);
        st.advance(1).await;
        assert_eq!(st.registry.get_state(r(0)).await, Outcome::State(RadioState::Tx));
        assert!(st.mock.is_asserted(17));
    }

    #[tokio::test]
    async fn vox_uses_squelch_source() {
        let mut st = Station::new(squelch_station(RxMode::Vox)).await;
        assert!(!st.mock.is_attached(22));
        st.supervisor.tick().await;
        assert_eq!(st.registry.get_state(r(0)).await, Outcome::State(RadioState::Idle));

        st.vox.set_active(r(0), true);
        st.advance(1).await;
        assert_eq!(st.registry.get_state(r(0)).await, Outcome::State(RadioState::Rx));

        st.vox.set_active(r(0), false);
        st.advance(1).await;
        assert_eq!(st.registry.get_state(r(0)).await, Outcome::State(RadioState::Idle));
    }

    #[tokio::test]
    async fn manual_radios_are_left_alone() {
        let mut st = Station::new(squelch_station(RxMode::Manual)).await;
        st.vox.set_active(r(0), true);
        st.supervisor.tick().await;
        st.registry.set_state(r(0), RadioState::Rx).await;
        st.advance(1).await;
        assert_eq!(st.registry.get_state(r(0)).await, Outcome::State(RadioState::Rx));
    }

    #[tokio::test]
    async fn squelch_read_error_skips_only_that_radio() {
        let mut config = squelch_station(RxMode::GpioSquelch);
        config.general.max_radios = 2;
        config.radios.insert(
            r(1),
            RadioConfig {
                enabled: true,
                rx_mode: RxMode::Vox,
                ..RadioConfig::default()
            },
        );
        let mut st = Station::new(config).await;
        st.mock.fail_reads(22, true);
        st.vox.set_active(r(1), true);
        st.supervisor.tick().await;

        assert_eq!(st.registry.get_state(r(0)).await, Outcome::State(RadioState::Idle));
        assert_eq!(st.registry.get_state(r(1)).await, Outcome::State(RadioState::Rx));
    }

    #[tokio::test]
    async fn squelch_read_error_still_enforces_tot() {
        let mut config = squelch_station(RxMode::GpioSquelch);
        {
            let r0 = config.radios.get_mut(&r(0)).unwrap();
            r0.timeout_talk = Duration::from_secs(5);
            r0.timeout_holdoff = Duration::from_secs(10);
        }
        let mut st = Station::new(config).await;
        st.mock.set_input(22, true);
        st.supervisor.tick().await;
        st.registry.set_state(r(0), RadioState::Tx).await;
        st.mock.fail_reads(22, true);

        st.advance(30).await;
        assert_eq!(st.registry.get_state(r(0)).await, Outcome::State(RadioState::Idle));
        assert!(!st.mock.is_asserted(17));
        assert_eq!(st.penalty(r(0)).await, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn huge_timers_do_not_overflow() {
        let mut config = tot_station();
        config.general.max_radios = 2;
        config.radios.get_mut(&r(0)).unwrap().timeout_talk = Duration::MAX;
        config.radios.insert(
            r(1),
            RadioConfig {
                enabled: true,
                ptt: PinConfig::wired(5),
                timeout_talk: Duration::from_secs(5),
                timeout_holdoff: Duration::MAX,
                ..RadioConfig::default()
            },
        );
        let mut st = Station::new(config).await;
        st.supervisor.tick().await;
        st.registry.set_state(r(0), RadioState::Tx).await;
        st.registry.set_state(r(1), RadioState::Tx).await;

        st.advance(30).await;
        // Radio 0 never times out; radio 1 trips with a saturated penalty.
        assert_eq!(st.registry.get_state(r(0)).await, Outcome::State(RadioState::Tx));
        assert_eq!(st.registry.get_state(r(1)).await, Outcome::State(RadioState::Idle));
        assert!(!st.mock.is_asserted(5));
        assert_eq!(st.penalty(r(1)).await, Duration::MAX);

        st.advance(1).await;
        assert_eq!(st.penalty(r(1)).await, Duration::MAX - Duration::from_secs(1));
    }

    #[tokio::test]
    async fn failed_disable_is_retried_until_dark() {
        let mut st = Station::new(tot_station()).await;
        st.supervisor.tick().await;
        st.registry.set_state(r(0), RadioState::Tx).await;

        st.mock.fail_writes(17, true);
        assert_eq!(
            st.registry.disable(r(0)).await,
            Outcome::Error(RadioFault::LineFault)
        );
        st.advance(1).await;
        assert!(st.mock.is_asserted(17));

        st.mock.fail_writes(17, false);
        st.advance(30).await;
        let snap = st.registry.snapshot(r(0)).await.unwrap();
        assert_eq!(snap.status, RadioState::Off);
        assert!(!snap.enabled);
        assert!(!st.mock.is_asserted(17));
        assert!(!st.mock.is_asserted(27));
        assert_eq!(st.registry.get_state(r(0)).await, Outcome::Disabled);
    }

    #[tokio::test]
    async fn failed_release_does_not_arm_penalty() {
        let mut st = Station::new(tot_station()).await;
        st.supervisor.tick().await;
        st.registry.set_state(r(0), RadioState::Tx).await;
        st.mock.fail_writes(17, true);
        st.advance(6).await;
        st.advance(1).await;
        assert_eq!(st.penalty(r(0)).await, Duration::ZERO);
        assert_eq!(st.registry.get_state(r(0)).await, Outcome::State(RadioState::Tx));

        st.mock.fail_writes(17, false);
        st.advance(1).await;
        assert_eq!(st.registry.get_state(r(0)).await, Outcome::State(RadioState::Idle));
        assert_eq!(st.penalty(r(0)).await, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn identification_while_transmitting() {
        let mut config = tot_station();
        config.general.id_timeout = Duration::from_secs(60);
        config.general.id_type = IdMode::Cw;
        config.radios.get_mut(&r(0)).unwrap().timeout_talk = Duration::ZERO;
        let mut st = Station::new(config).await;

        st.supervisor.tick().await;
        assert_eq!(st.notifier.identify_count(r(0)), 0);

        st.registry.set_state(r(0), RadioState::Tx).await;
        st.advance(1).await;
        assert_eq!(st.notifier.calls(), vec![Notification::Identify(r(0), IdMode::Cw)]);

        st.advance(30).await;
        assert_eq!(st.notifier.identify_count(r(0)), 1);
        st.advance(30).await;
        assert_eq!(st.notifier.identify_count(r(0)), 2);
    }

    #[tokio::test]
    async fn spawned_loop_stops_on_cancel() {
        let mut config = tot_station();
        config.general.poll_interval = PollInterval::from_millis(25).unwrap();
        let st = Station::new(config).await;
        let handle = Supervisor::new(st.registry.clone()).spawn();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(handle.is_running());
        handle.stop().await;
    }

    #[tokio::test]
    async fn unthrottled_loop_still_yields() {
        let mut config = tot_station();
        config.general.poll_interval = PollInterval::UNTHROTTLED;
        let st = Station::new(config).await;
        let handle = Supervisor::new(st.registry.clone()).spawn();
        tokio::task::yield_now().await;
        handle.stop().await;
    }
}
