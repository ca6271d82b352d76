//! Leaf backends.

pub mod lmdb;
pub mod memory;

pub use lmdb::{LmdbBackend, LmdbError};
pub use memory::MemoryBackend;
