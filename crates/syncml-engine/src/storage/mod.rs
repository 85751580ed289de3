pub mod handler;
pub mod memory;
pub mod plugin;

pub use handler::{CommitConflict, CommitResult, CommitStatus, ItemId, StorageHandler};
pub use memory::MemoryStorage;
pub use plugin::{ContentFormat, StoragePlugin, StorageProvider, StorageStatus};
