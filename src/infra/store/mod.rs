//! Durable store backends.

pub mod file;
pub mod memory;

pub use file::FileWorkStore;
pub use memory::InMemoryWorkStore;
