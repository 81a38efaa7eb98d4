//! Ports layer: Trait definitions for external operations.
//!
//! Following Hexagonal Architecture, these traits define the boundaries
//! between the pipeline and external systems (record store, model storage).

mod records;
mod registry;

pub use records::{RecordSink, RecordSource};
pub use registry::ModelRegistry;
