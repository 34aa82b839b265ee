//! State store adapters.

mod in_memory;
mod sqlite;

pub use in_memory::InMemoryStateStore;
pub use sqlite::SqliteStateStore;
