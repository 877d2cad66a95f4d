use serde::{Deserialize, Serialize};

use crate::catalog::Track;

/// A user-created playlist stored on-device.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CustomPlaylist {
    /// Millisecond timestamp of creation, as a string.
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub songs: Vec<Track>,
}

impl CustomPlaylist {
    pub fn new(id: String, name: String) -> Self {
        Self {
            id,
            name,
            songs: Vec::new(),
        }
    }

    pub fn contains(&self, song_id: &str) -> bool {
        self.songs.iter().any(|s| s.id == song_id)
    }

    /// Appends unless a song with the same id is already present.
    pub fn add(&mut self, track: Track) -> bool {
        if self.contains(&track.id) {
            return false;
        }
        self.songs.push(track);
        true
    }

    pub fn remove(&mut self, song_id: &str) -> bool {
        let before = self.songs.len();
        self.songs.retain(|s| s.id != song_id);
        self.songs.len() != before
    }

    /// Swaps the song at `index` with its neighbour. Moving the first song
    /// up or the last song down does nothing.
    pub fn move_song(&mut self, index: usize, direction: MoveDirection) -> bool {
        let target = match direction {
            MoveDirection::Up if index > 0 => index - 1,
            MoveDirection::Down if index + 1 < self.songs.len() => index + 1,
            _ => return false,
        };
        if index >= self.songs.len() {
            return false;
        }
        self.songs.swap(index, target);
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveDirection {
    Up,
    Down,
}
