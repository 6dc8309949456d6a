//! Memory-facing layer: provenance-checked entries with bounded capacity.
//!
//! Every write carries a [`Provenance`] naming the task and step that
//! produced it. Writes without one are rejected before anything changes.
//! Once the store grows past its configured limit the oldest entries are
//! pruned, each removal leaving a `memory_prune` audit entry.

pub mod entry;
pub mod provenance;
pub mod store;

pub use entry::{MemoryEntry, MemoryPointer};
pub use provenance::{Provenance, ValidationError};
pub use store::{MemoryError, MemoryResult, MemoryStore, MemoryWrite};
