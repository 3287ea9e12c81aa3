//! Analysis run orchestration.
//!
//! Leaf to root: [`run_status`] guards the single active user visible run,
//! [`queue`] holds deferred jobs, [`tracking`] and [`reconcile`] carry
//! finding identity across runs, [`streamer`] publishes partial results,
//! [`watchdog`] bridges host cancellation into engine calls, [`dispatcher`]
//! executes one run and [`manager`] is the public entry point.

pub mod dispatcher;
pub mod event_bus;
pub mod events;
pub mod manager;
pub mod queue;
pub mod reconcile;
pub mod run_status;
pub mod streamer;
pub mod tracking;
pub mod watchdog;

pub use dispatcher::*;
pub use event_bus::*;
pub use events::*;
pub use manager::*;
pub use queue::*;
pub use reconcile::*;
pub use run_status::*;
pub use streamer::*;
pub use tracking::*;
pub use watchdog::*;
