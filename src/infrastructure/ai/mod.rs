//! AI Service Integration
//!
//! Client contract and wire types for the external vision service.

mod client;
mod types;

pub use client::*;
pub use types::*;
