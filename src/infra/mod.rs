//! Infrastructure adapters for durable work storage.

pub mod store;
pub use store::{FileWorkStore, InMemoryWorkStore};
