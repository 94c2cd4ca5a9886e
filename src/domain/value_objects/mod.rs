//! Value Objects
//!
//! Immutable domain objects defined by their attributes rather than identity.

mod bounding_box;
mod face_embedding;
mod face_quality;
mod profile_snapshot;

pub use bounding_box::*;
pub use face_embedding::*;
pub use face_quality::*;
pub use profile_snapshot::*;
