// src/rotation/mod.rs
//! Key rotation: the orchestrating state machine, the re-encryption sweep
//! that migrates items to the current KEK, and the periodic scheduler.

pub mod orchestrator;
pub mod scheduler;
pub mod sweep;

pub use orchestrator::{RotationOrchestrator, RotationResult};
pub use scheduler::SchedulerHandle;
pub use sweep::{Sweeper, SweepReport};
