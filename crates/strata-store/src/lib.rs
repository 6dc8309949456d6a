//! Strata-Store: persistence adapter contracts for the strata core
//!
//! The core keeps its own state in memory and treats persistence as a
//! durability add-on. This crate defines what an adapter must offer and ships
//! two implementations.
//!
//! ## Layer 0 - Data/Persistence
//!
//! - `RecordStore`: save/load/load_all/query over `PersistedRecord`s
//! - `fakes`: in-memory and always-failing stores for tests
//! - `fs`: one JSON file per record, written atomically

mod error;
pub mod fakes;
pub mod fs;
pub mod record;

pub use error::StorageError;
pub use fs::FsRecordStore;
pub use record::{Collection, PersistedRecord, RecordQuery, RecordStore, StorageResult};
