pub mod memory;
pub mod snapshot;
pub mod transactional;

#[cfg(feature = "mongodb")]
pub mod mongo;

pub use memory::MemoryClient;
pub use snapshot::{RefreshOutcome, RefreshScheduler, SnapshotCache, SnapshotDriver};
pub use transactional::{DocumentClient, TransactionalDriver};

#[cfg(feature = "mongodb")]
pub use mongo::MongoDocumentClient;
