//! Append-only event store boundary.
//!
//! Organization-scoped event streams without storage assumptions. The
//! in-memory backend is the only one shipped; anything durable plugs in
//! behind [`EventStore`].

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
