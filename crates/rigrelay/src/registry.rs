//! The radio registry: record store, control surface, and lifecycle.
//!
//! A [`Registry`] owns one record per radio slot and the line controller
//! those radios are wired to. Every control operation locks only the
//! record it touches, so commands for different radios never contend.
//! [`reload`](Registry::reload) and [`shutdown`](Registry::shutdown) take
//! the whole store exclusively.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use rigrelay::{RadioId, RadioState, RegistryBuilder, StationConfig};
//!
//! # async fn example(controller: Arc<dyn rigrelay::LineController>) -> rigrelay::Result<()> {
//! let config = StationConfig::load("/etc/rigrelay.conf").await?;
//! let registry = RegistryBuilder::new(config)
//!     .controller(controller)
//!     .build()
//!     .await?;
//!
//! let radio = RadioId::from_index(0);
//! registry.enable(radio).await;
//! registry.set_state(radio, RadioState::Tx).await;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use rigrelay_core::clock::{Clock, SystemClock};
use rigrelay_core::config::{GeneralConfig, StationConfig};
use rigrelay_core::error::{Error, Result};
use rigrelay_core::events::RadioEvent;
use rigrelay_core::hooks::{Notifier, NullNotifier, NullSquelch, SquelchSource};
use rigrelay_core::line::LineController;
use rigrelay_core::types::{Outcome, PollInterval, RadioFault, RadioId, RadioState};
use tokio::sync::{Mutex, MutexGuard, RwLock, broadcast};
use tracing::{debug, info, warn};

use crate::machine::{self, Effects};
use crate::record::RadioRecord;
use crate::status::RadioSnapshot;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Everything a reload replaces.
pub(crate) struct Fleet {
    pub general: GeneralConfig,
    pub controller: Arc<dyn LineController>,
    pub radios: Vec<Mutex<RadioRecord>>,
}

/// Fluent builder for [`Registry`].
///
/// Only the line controller is mandatory; the clock defaults to the system
/// clock and both hooks default to no-ops.
pub struct RegistryBuilder {
    config: StationConfig,
    controller: Option<Arc<dyn LineController>>,
    clock: Arc<dyn Clock>,
    squelch: Arc<dyn SquelchSource>,
    notifier: Arc<dyn Notifier>,
    event_capacity: usize,
}

impl RegistryBuilder {
    /// Start from a station configuration.
    pub fn new(config: StationConfig) -> Self {
        RegistryBuilder {
            config,
            controller: None,
            clock: Arc::new(SystemClock),
            squelch: Arc::new(NullSquelch),
            notifier: Arc::new(NullNotifier),
            event_capacity: EVENT_CHANNEL_CAPACITY,
        }
    }

    /// The I/O controller the radios are wired to.
    pub fn controller(mut self, controller: Arc<dyn LineController>) -> Self {
        self.controller = Some(controller);
        self
    }

    /// Replace the time source (tests use a manual clock).
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Voice-activity predicate for VOX-mode radios.
    pub fn squelch(mut self, squelch: Arc<dyn SquelchSource>) -> Self {
        self.squelch = squelch;
        self
    }

    /// Receiver of penalty-cleared and identification requests.
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Capacity of the event broadcast channel (default 256).
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Attach every configured line and bring up radios configured
    /// `enabled`.
    ///
    /// A line that fails to attach does not fail the build: that radio
    /// reports `NotPlumbed` and the others come up normally.
    pub async fn build(self) -> Result<Registry> {
        let controller = self.controller.ok_or_else(|| {
            Error::InvalidParameter("a line controller is required to build a registry".into())
        })?;
        let (event_tx, _) = broadcast::channel(self.event_capacity);

        let registry = Registry {
            fleet: RwLock::new(Fleet {
                general: self.config.general.clone(),
                controller: Arc::clone(&controller),
                radios: Vec::new(),
            }),
            clock: self.clock,
            squelch: self.squelch,
            notifier: self.notifier,
            event_tx,
        };
        {
            let mut fleet = registry.fleet.write().await;
            *fleet = registry.populate(&self.config, controller).await;
        }
        Ok(registry)
    }
}

/// The radio record store and its control surface.
pub struct Registry {
    pub(crate) fleet: RwLock<Fleet>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) squelch: Arc<dyn SquelchSource>,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) event_tx: broadcast::Sender<RadioEvent>,
}

impl Registry {
    /// Subscribe to radio events.
    pub fn subscribe(&self) -> broadcast::Receiver<RadioEvent> {
        self.event_tx.subscribe()
    }

    /// Number of radio slots.
    pub async fn max_radios(&self) -> u8 {
        self.fleet.read().await.general.max_radios
    }

    /// Configured supervisor polling period.
    pub async fn poll_interval(&self) -> PollInterval {
        self.fleet.read().await.general.poll_interval
    }

    /// Name of the line controller in use.
    pub async fn controller_name(&self) -> String {
        self.fleet.read().await.controller.name().to_string()
    }

    /// Request a state transition.
    pub async fn set_state(&self, id: RadioId, requested: RadioState) -> Outcome {
        let fleet = self.fleet.read().await;
        let Some(mut rec) = Self::lock(&fleet, id).await else {
            return invalid(id);
        };
        machine::set_state(&mut rec, requested, &self.effects(&fleet)).await
    }

    /// Current state, folding in the enabled gate.
    pub async fn get_state(&self, id: RadioId) -> Outcome {
        let fleet = self.fleet.read().await;
        let Some(rec) = Self::lock(&fleet, id).await else {
            return invalid(id);
        };
        if rec.enabled {
            Outcome::State(rec.status)
        } else {
            Outcome::Disabled
        }
    }

    /// Whether the administrative gate is open.
    pub async fn is_enabled(&self, id: RadioId) -> std::result::Result<bool, RadioFault> {
        let fleet = self.fleet.read().await;
        match Self::lock(&fleet, id).await {
            Some(rec) => Ok(rec.enabled),
            None => Err(RadioFault::InvalidRadio),
        }
    }

    /// Open the gate and power the radio up.
    ///
    /// Calling this on a radio that is already enabled and powered is a
    /// no-op returning its current state.
    pub async fn enable(&self, id: RadioId) -> Outcome {
        let fleet = self.fleet.read().await;
        let Some(mut rec) = Self::lock(&fleet, id).await else {
            return invalid(id);
        };
        let fx = self.effects(&fleet);
        enable_record(&mut rec, &fx).await
    }

    /// Power the radio down and close the gate.
    pub async fn disable(&self, id: RadioId) -> Outcome {
        let fleet = self.fleet.read().await;
        let Some(mut rec) = Self::lock(&fleet, id).await else {
            return invalid(id);
        };
        if !rec.enabled {
            debug!(radio = %id, "already disabled");
            return Outcome::Disabled;
        }
        let outcome = machine::set_state(&mut rec, RadioState::Off, &self.effects(&fleet)).await;
        rec.enabled = false;
        info!(radio = %id, outcome = %outcome, "radio disabled");
        let _ = self.event_tx.send(RadioEvent::EnabledChanged {
            radio: id,
            enabled: false,
        });
        outcome
    }

    /// Key the transmitter.
    ///
    /// Refused with `Disabled` on a disabled radio and ignored (returning
    /// `Off`) on a powered-off one.
    pub async fn ptt_on(&self, id: RadioId) -> Outcome {
        let fleet = self.fleet.read().await;
        let Some(mut rec) = Self::lock(&fleet, id).await else {
            return invalid(id);
        };
        if !rec.enabled {
            warn!(radio = %id, "denying PTT on a disabled radio");
            return Outcome::Disabled;
        }
        if rec.status == RadioState::Off {
            warn!(radio = %id, "ignoring PTT on a powered-off radio");
            return Outcome::State(RadioState::Off);
        }
        machine::set_state(&mut rec, RadioState::Tx, &self.effects(&fleet)).await
    }

    /// Unkey the transmitter, leaving the radio powered.
    pub async fn ptt_off(&self, id: RadioId) -> Outcome {
        let fleet = self.fleet.read().await;
        let Some(mut rec) = Self::lock(&fleet, id).await else {
            return invalid(id);
        };
        if !rec.enabled {
            return Outcome::Disabled;
        }
        if rec.status == RadioState::Off {
            return Outcome::State(RadioState::Off);
        }
        machine::set_state(&mut rec, RadioState::Idle, &self.effects(&fleet)).await
    }

    /// Power the radio up without touching the gate.
    pub async fn power_on(&self, id: RadioId) -> Outcome {
        let fleet = self.fleet.read().await;
        let Some(mut rec) = Self::lock(&fleet, id).await else {
            return invalid(id);
        };
        if !rec.enabled {
            warn!(radio = %id, "ignoring power on for a disabled radio");
            return Outcome::Disabled;
        }
        machine::set_state(&mut rec, RadioState::Idle, &self.effects(&fleet)).await
    }

    /// Power the radio down without touching the gate.
    pub async fn power_off(&self, id: RadioId) -> Outcome {
        self.set_state(id, RadioState::Off).await
    }

    /// Ask the notifier to identify on `id` now and restart its ID timer.
    pub async fn identify(&self, id: RadioId) -> Outcome {
        let fleet = self.fleet.read().await;
        let Some(mut rec) = Self::lock(&fleet, id).await else {
            return invalid(id);
        };
        if !rec.enabled {
            return Outcome::Disabled;
        }
        let mode = fleet.general.id_type;
        self.notifier.identify(id, mode);
        rec.stats.last_id = Some(self.clock.now());
        let _ = self.event_tx.send(RadioEvent::Identified { radio: id, mode });
        Outcome::State(rec.status)
    }

    /// Snapshot of one radio for display.
    pub async fn snapshot(&self, id: RadioId) -> std::result::Result<RadioSnapshot, RadioFault> {
        let fleet = self.fleet.read().await;
        let rec = Self::lock(&fleet, id)
            .await
            .ok_or(RadioFault::InvalidRadio)?;
        Ok(RadioSnapshot::capture(&rec, self.clock.now()))
    }

    /// Snapshots of every radio slot, in id order.
    pub async fn snapshot_all(&self) -> Vec<RadioSnapshot> {
        let fleet = self.fleet.read().await;
        let now = self.clock.now();
        let mut out = Vec::with_capacity(fleet.radios.len());
        for slot in &fleet.radios {
            out.push(RadioSnapshot::capture(&*slot.lock().await, now));
        }
        out
    }

    /// Number of enabled radios above `Off`.
    pub async fn active_count(&self) -> usize {
        let fleet = self.fleet.read().await;
        let mut n = 0;
        for slot in &fleet.radios {
            let rec = slot.lock().await;
            if rec.enabled && rec.status > RadioState::Off {
                n += 1;
            }
        }
        n
    }

    /// Force every radio dark, close every gate, and release all lines.
    ///
    /// The registry stays usable afterwards, but radios with wired pins
    /// report `NotPlumbed` until the next [`reload`](Self::reload).
    pub async fn shutdown(&self) {
        let mut fleet = self.fleet.write().await;
        self.teardown(&mut fleet).await;
        info!("all radios shut down");
    }

    /// Replace the configuration and the line controller.
    ///
    /// The old store is torn down exactly as on shutdown before the new one
    /// is built; the supervisor cannot observe a half-built store.
    pub async fn reload(&self, config: StationConfig, controller: Arc<dyn LineController>) {
        let mut fleet = self.fleet.write().await;
        self.teardown(&mut fleet).await;
        *fleet = self.populate(&config, controller).await;
        info!(
            max_radios = fleet.general.max_radios,
            controller = fleet.controller.name(),
            "configuration reloaded"
        );
    }

    async fn teardown(&self, fleet: &mut Fleet) {
        let controller = Arc::clone(&fleet.controller);
        let fx = Effects {
            controller: controller.as_ref(),
            now: self.clock.now(),
            events: &self.event_tx,
        };
        for slot in &mut fleet.radios {
            let rec = slot.get_mut();
            machine::force_off(rec, &fx).await;
            rec.release_lines(controller.as_ref()).await;
        }
    }

    async fn populate(&self, config: &StationConfig, controller: Arc<dyn LineController>) -> Fleet {
        let general = config.general.clone();
        let fx = Effects {
            controller: controller.as_ref(),
            now: self.clock.now(),
            events: &self.event_tx,
        };

        let mut radios = Vec::with_capacity(usize::from(general.max_radios));
        for index in 0..general.max_radios {
            let id = RadioId::from_index(index);
            let radio_config = config.radio(id).cloned().unwrap_or_default();
            let wants_enable = radio_config.enabled;
            let mut rec = RadioRecord::new(id, radio_config);
            rec.attach_lines(controller.as_ref()).await;
            if wants_enable {
                let outcome = enable_record(&mut rec, &fx).await;
                debug!(radio = %id, outcome = %outcome, "enabled from configuration");
            }
            radios.push(Mutex::new(rec));
        }

        info!(
            radios = radios.len(),
            controller = controller.name(),
            "radio registry built"
        );
        Fleet {
            general,
            controller,
            radios,
        }
    }

    pub(crate) fn effects<'a>(&'a self, fleet: &'a Fleet) -> Effects<'a> {
        Effects {
            controller: fleet.controller.as_ref(),
            now: self.clock.now(),
            events: &self.event_tx,
        }
    }

    async fn lock(fleet: &Fleet, id: RadioId) -> Option<MutexGuard<'_, RadioRecord>> {
        match fleet.radios.get(usize::from(id.index())) {
            Some(slot) => Some(slot.lock().await),
            None => None,
        }
    }
}

async fn enable_record(rec: &mut RadioRecord, fx: &Effects<'_>) -> Outcome {
    if rec.enabled && rec.status >= RadioState::Idle {
        debug!(radio = %rec.id, "already enabled");
        return Outcome::State(rec.status);
    }
    let was_enabled = rec.enabled;
    rec.enabled = true;
    let outcome = machine::set_state(rec, RadioState::Idle, fx).await;
    if !was_enabled {
        info!(radio = %rec.id, outcome = %outcome, "radio enabled");
        fx.emit(RadioEvent::EnabledChanged {
            radio: rec.id,
            enabled: true,
        });
    }
    outcome
}

fn invalid(id: RadioId) -> Outcome {
    warn!(radio = %id, "invalid radio");
    Outcome::Error(RadioFault::InvalidRadio)
}
