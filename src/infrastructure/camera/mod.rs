//! Camera Infrastructure
//!
//! Stream supervision for monitored cameras.

mod supervisor;

pub use supervisor::*;
