//! Decision core for pcgated
//!
//! This crate is the heart of pcgated, containing:
//! - Snapshot evaluation (grant or block, and why)
//! - Access state machine (Blocking <-> Granting with a grace period before hiding)
//! - Periodic and one-shot timers keyed by cancellable tokens
//! - The agent loop, the single place where machine state is mutated

mod agent;
mod events;
mod machine;
mod scheduler;

pub use agent::*;
pub use events::*;
pub use machine::*;
pub use scheduler::*;
