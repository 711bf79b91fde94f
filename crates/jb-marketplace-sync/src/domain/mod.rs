//! # Domain Module
//!
//! Core types for the marketplace read model and accept workflow.

pub mod acceptance;
pub mod entities;
pub mod errors;
pub mod invariants;
pub mod value_objects;

pub use acceptance::*;
pub use entities::*;
pub use errors::*;
pub use invariants::*;
pub use value_objects::*;
