//! Shared utilities for pcgate
//!
//! This crate provides:
//! - ID types (DeviceId, ClientId)
//! - Time utilities (UTC clock with mock support, timestamp parsing)
//! - Error taxonomy
//! - Default paths for config and socket

mod error;
mod ids;
mod paths;
mod time;

pub use error::*;
pub use ids::*;
pub use paths::*;
pub use time::*;
