//! Persistence gateways.

mod file;
mod gateway;

pub use file::FileGateway;
pub use gateway::{MemoryGateway, PersistenceGateway};
