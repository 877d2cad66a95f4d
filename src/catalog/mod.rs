pub mod client;
pub mod models;
pub mod search;
pub mod suggestions;

pub use client::{CatalogClient, SaavnClient};
pub use models::{
    AlbumDetails, AlbumSummary, ApiSong, ArtistSummary, ModuleItem, Modules, Page,
    PlaylistDetails, PlaylistSummary, Track,
};
pub use search::{AlbumSearch, ArtistSearch, ArtistSongs, PlaylistSearch, SearchSession, SongSearch};
pub use suggestions::suggested_songs;
