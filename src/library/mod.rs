pub mod kv;
pub mod models;
pub mod store;

pub use kv::{FileStore, KeyValueStore, MemoryStore};
pub use models::{CustomPlaylist, MoveDirection};
pub use store::{Library, LibraryStore, RECENTLY_PLAYED_LIMIT, SUGGESTION_SEED_LIMIT};
