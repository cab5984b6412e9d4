//! Collaborator implementations
//!
//! - `memory`: in-process registries for tests and standalone hosts
//! - `sqlite`: durable user store backed by SQLite

pub mod memory;
pub mod sqlite;

pub use memory::{MemoryBooth, MemoryPresence, MemoryUserStore};
pub use sqlite::SqliteUserStore;
