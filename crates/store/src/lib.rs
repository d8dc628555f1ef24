//! Keel store: kind registry and in-memory versioned resource state.

#![forbid(unsafe_code)]

pub mod registry;
pub mod state;

pub use registry::{KindEntry, Registry, RegistryError};
pub use state::{Snapshot, State, StateError, StateResult};
