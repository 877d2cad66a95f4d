use async_trait::async_trait;
use rand::seq::SliceRandom;
use serde::Serialize;
use serde::de::DeserializeOwned;
use strsim::jaro_winkler;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::catalog::Track;
use crate::error::Result;
use crate::library::kv::KeyValueStore;
use crate::library::models::{CustomPlaylist, MoveDirection};

pub const LIKED_SONGS_KEY: &str = "@liked_songs";
pub const CUSTOM_PLAYLISTS_KEY: &str = "@custom_playlists";
pub const RECENTLY_PLAYED_KEY: &str = "@recently_played_songs";

pub const RECENTLY_PLAYED_LIMIT: usize = 20;
pub const SUGGESTION_SEED_LIMIT: usize = 10;

const PLAYLIST_NAME_THRESHOLD: f64 = 0.85;

/// Persisted user collections: liked songs, custom playlists and
/// recently played history.
///
/// Nothing here returns an error. Storage failures are logged and the
/// operation degrades to an empty list, `false` or `None`, so callers
/// cannot tell "no data" from "could not read".
#[async_trait]
pub trait LibraryStore: Send + Sync {
    async fn liked(&self) -> Vec<Track>;

    /// Adds the track unless one with the same id is already liked.
    async fn like(&self, track: &Track) -> Vec<Track>;

    async fn unlike(&self, song_id: &str) -> Vec<Track>;

    async fn is_liked(&self, song_id: &str) -> bool {
        self.liked().await.iter().any(|t| t.id == song_id)
    }

    /// Up to `max` liked ids, shuffled when there are more than `max`.
    async fn random_liked_ids(&self, max: usize) -> Vec<String>;

    async fn recently_played(&self) -> Vec<Track>;

    /// Front-inserts the track, dropping any older entry with the same id
    /// and evicting the oldest past the cap.
    async fn record_play(&self, track: &Track);

    async fn playlists(&self) -> Vec<CustomPlaylist>;

    /// Replaces the whole playlist collection.
    async fn save_playlists(&self, playlists: &[CustomPlaylist]) -> bool;

    async fn create_playlist(&self, name: &str) -> Option<CustomPlaylist>;

    async fn add_song_to_playlist(&self, playlist_id: &str, track: &Track) -> bool;

    async fn remove_song_from_playlist(&self, playlist_id: &str, song_id: &str) -> bool;

    async fn rename_playlist(&self, playlist_id: &str, name: &str) -> bool;

    async fn delete_playlist(&self, playlist_id: &str) -> bool;

    async fn move_song(&self, playlist_id: &str, index: usize, direction: MoveDirection) -> bool;

    /// Case-insensitive exact match first, then the closest fuzzy match.
    async fn find_playlist(&self, name: &str) -> Option<CustomPlaylist> {
        let playlists = self.playlists().await;
        let wanted = name.trim().to_lowercase();

        if let Some(exact) = playlists.iter().find(|p| p.name.to_lowercase() == wanted) {
            return Some(exact.clone());
        }

        playlists
            .into_iter()
            .map(|p| (jaro_winkler(&p.name.to_lowercase(), &wanted), p))
            .filter(|(score, _)| *score >= PLAYLIST_NAME_THRESHOLD)
            .max_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, p)| p)
    }
}

/// `LibraryStore` over any key-value backend, one JSON list per key.
pub struct Library<K> {
    store: K,
    // Serializes read-modify-write cycles so concurrent updates don't
    // overwrite each other.
    write_lock: Mutex<()>,
}

impl<K: KeyValueStore> Library<K> {
    pub fn new(store: K) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    async fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Vec<T>> {
        match self.store.get(key).await? {
            Some(raw) if !raw.trim().is_empty() => Ok(serde_json::from_str(&raw)?),
            _ => Ok(Vec::new()),
        }
    }

    async fn persist<T: Serialize + Sync>(&self, key: &str, items: &[T]) -> Result<()> {
        let raw = serde_json::to_string(items)?;
        self.store.set(key, raw).await
    }

    async fn load_or_empty<T: DeserializeOwned>(&self, key: &str) -> Vec<T> {
        self.load(key).await.unwrap_or_else(|e| {
            warn!("Error reading {}: {}", key, e);
            Vec::new()
        })
    }

    /// Applies `edit` to the stored playlist with `playlist_id` and saves
    /// when it reports a change.
    async fn edit_playlist<F>(&self, playlist_id: &str, edit: F) -> bool
    where
        F: FnOnce(&mut CustomPlaylist) -> bool + Send,
    {
        let _guard = self.write_lock.lock().await;

        let mut playlists: Vec<CustomPlaylist> = match self.load(CUSTOM_PLAYLISTS_KEY).await {
            Ok(p) => p,
            Err(e) => {
                warn!("Error reading custom playlists: {}", e);
                return false;
            }
        };

        let Some(playlist) = playlists.iter_mut().find(|p| p.id == playlist_id) else {
            debug!("Playlist {} not found", playlist_id);
            return false;
        };

        if !edit(playlist) {
            return false;
        }

        match self.persist(CUSTOM_PLAYLISTS_KEY, &playlists).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Error saving custom playlists: {}", e);
                false
            }
        }
    }
}

#[async_trait]
impl<K: KeyValueStore> LibraryStore for Library<K> {
    async fn liked(&self) -> Vec<Track> {
        self.load_or_empty(LIKED_SONGS_KEY).await
    }

    async fn like(&self, track: &Track) -> Vec<Track> {
        let _guard = self.write_lock.lock().await;

        let result: Result<Vec<Track>> = async {
            let mut liked: Vec<Track> = self.load(LIKED_SONGS_KEY).await?;
            if !liked.iter().any(|t| t.id == track.id) {
                liked.push(track.clone());
                self.persist(LIKED_SONGS_KEY, &liked).await?;
                info!("Liked: {}", track.title);
            }
            Ok(liked)
        }
        .await;

        result.unwrap_or_else(|e| {
            warn!("Error liking song {}: {}", track.id, e);
            Vec::new()
        })
    }

    async fn unlike(&self, song_id: &str) -> Vec<Track> {
        let _guard = self.write_lock.lock().await;

        let result: Result<Vec<Track>> = async {
            let mut liked: Vec<Track> = self.load(LIKED_SONGS_KEY).await?;
            liked.retain(|t| t.id != song_id);
            self.persist(LIKED_SONGS_KEY, &liked).await?;
            Ok(liked)
        }
        .await;

        result.unwrap_or_else(|e| {
            warn!("Error unliking song {}: {}", song_id, e);
            Vec::new()
        })
    }

    async fn random_liked_ids(&self, max: usize) -> Vec<String> {
        let mut ids: Vec<String> = self.liked().await.into_iter().map(|t| t.id).collect();
        if ids.len() > max {
            ids.shuffle(&mut rand::thread_rng());
            ids.truncate(max);
        }
        ids
    }

    async fn recently_played(&self) -> Vec<Track> {
        self.load_or_empty(RECENTLY_PLAYED_KEY).await
    }

    async fn record_play(&self, track: &Track) {
        let _guard = self.write_lock.lock().await;

        let result: Result<()> = async {
            let mut recents: Vec<Track> = self.load(RECENTLY_PLAYED_KEY).await?;
            recents.retain(|t| t.id != track.id);
            recents.insert(0, track.clone());
            recents.truncate(RECENTLY_PLAYED_LIMIT);
            self.persist(RECENTLY_PLAYED_KEY, &recents).await
        }
        .await;

        if let Err(e) = result {
            warn!("Error recording play of {}: {}", track.id, e);
        }
    }

    async fn playlists(&self) -> Vec<CustomPlaylist> {
        self.load_or_empty(CUSTOM_PLAYLISTS_KEY).await
    }

    async fn save_playlists(&self, playlists: &[CustomPlaylist]) -> bool {
        let _guard = self.write_lock.lock().await;

        match self.persist(CUSTOM_PLAYLISTS_KEY, playlists).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Error saving custom playlists: {}", e);
                false
            }
        }
    }

    async fn create_playlist(&self, name: &str) -> Option<CustomPlaylist> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        let _guard = self.write_lock.lock().await;

        let result: Result<CustomPlaylist> = async {
            let mut playlists: Vec<CustomPlaylist> = self.load(CUSTOM_PLAYLISTS_KEY).await?;

            let mut stamp = chrono::Utc::now().timestamp_millis();
            while playlists.iter().any(|p| p.id == stamp.to_string()) {
                stamp += 1;
            }

            let playlist = CustomPlaylist::new(stamp.to_string(), name.to_string());
            playlists.push(playlist.clone());
            self.persist(CUSTOM_PLAYLISTS_KEY, &playlists).await?;
            Ok(playlist)
        }
        .await;

        match result {
            Ok(playlist) => {
                info!("Created playlist: {} ({})", playlist.name, playlist.id);
                Some(playlist)
            }
            Err(e) => {
                warn!("Error creating playlist {}: {}", name, e);
                None
            }
        }
    }

    async fn add_song_to_playlist(&self, playlist_id: &str, track: &Track) -> bool {
        let track = track.clone();
        self.edit_playlist(playlist_id, move |p| p.add(track)).await
    }

    async fn remove_song_from_playlist(&self, playlist_id: &str, song_id: &str) -> bool {
        self.edit_playlist(playlist_id, |p| p.remove(song_id)).await
    }

    async fn rename_playlist(&self, playlist_id: &str, name: &str) -> bool {
        let name = name.trim();
        if name.is_empty() {
            return false;
        }
        self.edit_playlist(playlist_id, |p| {
            p.name = name.to_string();
            true
        })
        .await
    }

    async fn delete_playlist(&self, playlist_id: &str) -> bool {
        let _guard = self.write_lock.lock().await;

        let result: Result<bool> = async {
            let mut playlists: Vec<CustomPlaylist> = self.load(CUSTOM_PLAYLISTS_KEY).await?;
            let before = playlists.len();
            playlists.retain(|p| p.id != playlist_id);
            if playlists.len() == before {
                return Ok(false);
            }
            self.persist(CUSTOM_PLAYLISTS_KEY, &playlists).await?;
            Ok(true)
        }
        .await;

        result.unwrap_or_else(|e| {
            warn!("Error deleting playlist {}: {}", playlist_id, e);
            false
        })
    }

    async fn move_song(&self, playlist_id: &str, index: usize, direction: MoveDirection) -> bool {
        self.edit_playlist(playlist_id, |p| p.move_song(index, direction))
            .await
    }
}
