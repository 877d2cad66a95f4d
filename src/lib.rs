pub mod catalog;
pub mod config;
pub mod download;
pub mod error;
pub mod library;
pub mod playback;

pub use catalog::{CatalogClient, SaavnClient, SearchSession, Track};
pub use config::Config;
pub use download::{DownloadOutcome, Downloader};
pub use error::{AppError, Result};
pub use library::{CustomPlaylist, FileStore, Library, LibraryStore, MemoryStore};
pub use playback::{
    AudioTransport, ConsoleTransport, EventRelay, PlaybackCoordinator, PlaybackNotice,
    PlaybackState, TransportEvent,
};
