//! Protocol types for pcgate
//!
//! This crate defines the data shared between the agent crates and the
//! stable API between pcgated and display clients:
//! - Status snapshots and access modes
//! - Overlay commands
//! - Commands (requests from clients), responses and events
//! - Versioning

mod commands;
mod events;
mod types;

pub use commands::*;
pub use events::*;
pub use types::*;

/// Current API version
pub const API_VERSION: u32 = 1;
