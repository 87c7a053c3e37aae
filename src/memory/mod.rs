//! In-memory implementations of the three backend collaborators, used by
//! tests and the demo binary. The document store runs as an actor so
//! every operation is serialized; put-if-absent is therefore atomic.

pub mod auth;
pub mod blob;
pub mod store;

pub use auth::MemoryAuth;
pub use blob::MemoryBlobs;
pub use store::{MemoryStore, StoreActor};
