//! Append-only logging, content-addressed storage, and size estimation
//! shared by every headroom component

mod hash;
mod io;
mod paths;
mod store;
mod tokens;
mod types;

pub use hash::{content_hash, short_hash};
pub use io::{atomic_write, JsonlLog};
pub use paths::{Paths, HOME_ENV};
pub use store::{MemoryStore, Persistence, StorageError};
pub use tokens::estimate_units;
pub use types::{LogEntry, RecordKind};
