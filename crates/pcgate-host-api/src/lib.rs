//! Seam traits for pcgated
//!
//! This crate defines the interface between the decision core and the two
//! external collaborators: the remote authority that holds session records,
//! and the display that draws the blocking overlay. It contains no network
//! or windowing code itself.

mod mock;
mod traits;

pub use mock::*;
pub use traits::*;
