//! Cadence Environment Abstraction Layer
//!
//! This crate provides the seam between the Cadence engines and the world
//! they run in, so the same engine code drives both **Production** (tokio)
//! and **Test** (manually advanced clock) environments.
//!
//! # Core Concept
//!
//! All sources of non-determinism are routed through a context:
//! - Time (`now()`, `sleep()`)
//! - Task scheduling (`spawn()`)
//! - Entropy (`seed()`)
//!
//! By deriving all randomness from a single 64-bit seed, any simulation run
//! becomes reproducible via its seed number.
//!
//! # Example
//!
//! ```ignore
//! use cadence_env::{EngineContext, EventSink};
//!
//! async fn drive_loop<Ctx: EngineContext, S: EventSink>(
//!     ctx: &Ctx,
//!     sink: &S,
//! ) {
//!     loop {
//!         tokio::select! {
//!             _ = ctx.sleep(Duration::from_secs(1)) => tick(),
//!             _ = stop.notified() => break,
//!         }
//!     }
//! }
//! ```

mod context;
mod error;
mod manual;
mod sink;
mod tokio_impl;
mod types;

pub use context::EngineContext;
pub use error::DeliveryError;
pub use manual::ManualContext;
pub use sink::EventSink;
pub use tokio_impl::TokioContext;
pub use types::{DeliveryReceipt, EventCategory, EventDescriptor, Priority};
