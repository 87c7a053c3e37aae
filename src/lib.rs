pub mod blob;
pub mod calls;
pub mod chat;
pub mod chat_service;
pub mod error;
pub mod feed;
pub mod live;
pub mod media;
#[cfg(feature = "memory")]
pub mod memory;
pub mod metrics;
pub mod profile;
pub mod session;
pub mod state;
pub mod stories;
pub mod store;

#[cfg(all(test, feature = "memory"))]
pub(crate) mod testutil;

pub use error::{Error, Result};
pub use state::{App, AppBuilder};
