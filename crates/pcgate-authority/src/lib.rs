//! Remote authority client for pcgated
//!
//! This crate provides:
//! - `StatusClient`, an HTTP implementation of `StatusSource`
//! - Normalization of raw session records into `StatusSnapshot`s

mod client;
mod record;

pub use client::*;
pub use record::*;
