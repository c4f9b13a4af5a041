pub mod file;
pub mod memory;
mod models;
mod store;

pub use file::FileTreeStore;
pub use memory::MemoryTreeStore;
pub use models::*;
pub use store::{BookmarkTreeStore, CreateDetails, MoveDestination, TreeStoreError};
