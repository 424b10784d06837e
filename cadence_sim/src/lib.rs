//! Cadence continuous simulation harness.
//!
//! Assembles the core engines into a continuously cycling simulation:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     SimulationEngine                        │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │ EngineContext (time, sleeps, spawns, master seed)    │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │       │                                                     │
//! │  ┌────▼─────────┐    ticks    ┌───────────────────┐         │
//! │  │ VirtualClock ├────────────►│ CycleOrchestrator │         │
//! │  └──────────────┘             └──────────┬────────┘         │
//! │                                          │ descriptors      │
//! │  ┌───────────────────┐          ┌────────▼────────┐         │
//! │  │ LifecycleMonitor  │◄─────────┤  DispatchQueue  ├──► sink │
//! │  └───────────────────┘  errors  └─────────────────┘         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The orchestrator polls the scenario generator once per simulated hour,
//! generated descriptors flow through the rate-limited dispatch queue to
//! the external sender, and delivery outcomes feed the lifecycle monitor
//! that `status()` polling exposes.

pub mod engine;
pub mod orchestrator;

pub use engine::{EngineConfig, SimulationEngine, StatusSnapshot};
pub use orchestrator::{CycleOrchestrator, CycleState, OrchestratorConfig};
