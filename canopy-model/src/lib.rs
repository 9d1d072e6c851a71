//! Core data model definitions shared across Canopy crates.
//!
//! Everything a fetcher emits travels through the collector as a
//! [`ResourceInfo`] envelope: an opaque [`Resource`] paired with the
//! [`CycleMetadata`] of the collection cycle that produced it.
#![allow(missing_docs)]

pub mod cycle;
pub mod error;
pub mod kinds;
pub mod resource;

pub use cycle::CycleMetadata;
pub use error::{ModelError, Result as ModelResult};
pub use resource::{
    CloudAccountMetadata, Resource, ResourceFields, ResourceInfo,
    ResourceMetadata,
};
