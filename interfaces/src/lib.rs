pub mod defs;
pub mod state;

pub use defs::{CanonicalItem, ClickRecord, Clock, SourceConfig, SourceKind, SystemClock};
pub use state::{KeyValueStore, MemoryStore, SqliteStore};
