//! # rigrelay -- Supervisory control for radio transceivers
//!
//! `rigrelay` controls a small fleet of half-duplex transceivers wired to
//! the host through digital lines: a power relay, a push-to-talk relay, and
//! a squelch (carrier-sense) input. It turns requests such as "key up
//! radio 3" into relay changes, turns squelch activity into receive state,
//! and enforces a transmit time-out timer with a lockout period afterwards.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use rigrelay::{RadioId, RadioState, RegistryBuilder, StationConfig, Supervisor};
//!
//! #[tokio::main]
//! async fn main() -> rigrelay::Result<()> {
//!     let config = StationConfig::load("/etc/rigrelay.conf").await?;
//!     let controller = rigrelay::transport::open_controller("serial:/dev/ttyUSB0").await?;
//!
//!     let registry = Arc::new(
//!         RegistryBuilder::new(config)
//!             .controller(controller)
//!             .build()
//!             .await?,
//!     );
//!     let supervisor = Supervisor::new(registry.clone()).spawn();
//!
//!     let radio = RadioId::from_index(0);
//!     println!("{}", registry.set_state(radio, RadioState::Tx).await);
//!
//!     supervisor.stop().await;
//!     registry.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! | Crate                    | Purpose                                              |
//! |--------------------------|------------------------------------------------------|
//! | `rigrelay-core`          | Types, errors, configuration, [`LineController`] trait |
//! | `rigrelay-transport`     | Serial modem-line and Linux GPIO line controllers    |
//! | `rigrelay-test-harness`  | Mock line controller, manual clock, recording hooks  |
//! | **`rigrelay`**           | This crate -- registry, supervisor, status snapshots |
//!
//! The [`Registry`] is the only thing that drives lines. Control requests
//! and the [`Supervisor`] both go through it, and it locks one radio record
//! at a time.
//!
//! ## Outcomes
//!
//! Transitions return an [`Outcome`] rather than a `Result`. `Disabled` and
//! `Blocked` are normal answers (the radio is administratively off, or it
//! is serving a time-out penalty), and `Error` carries a [`RadioFault`].
//! Stored radio state is a separate [`RadioState`] type, so a rejection can
//! never end up recorded as the radio's state.
//!
//! ## Event Subscription
//!
//! ```no_run
//! use rigrelay::RadioEvent;
//! # async fn example(registry: &rigrelay::Registry) {
//! let mut events = registry.subscribe();
//! while let Ok(event) = events.recv().await {
//!     match event {
//!         RadioEvent::TimeoutExpired { radio, penalty } => {
//!             println!("{radio} timed out, locked out for {penalty:?}");
//!         }
//!         other => println!("{other:?}"),
//!     }
//! }
//! # }
//! ```

pub use rigrelay_core::*;

/// Line controller backends.
///
/// Re-exports `rigrelay-transport`, including [`open_controller`](transport::open_controller).
pub mod transport {
    pub use rigrelay_transport::*;
}

mod machine;
mod record;
pub mod registry;
pub mod status;
pub mod supervisor;

pub use registry::{Registry, RegistryBuilder};
pub use status::RadioSnapshot;
pub use supervisor::{Supervisor, SupervisorHandle};
