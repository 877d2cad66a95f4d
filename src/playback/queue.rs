use crate::catalog::Track;

/// The list being traversed by next/previous. Traversal wraps in both
/// directions. When non-empty the index is always in `0..len`.
#[derive(Debug, Clone, Default)]
pub struct PlayQueue {
    tracks: Vec<Track>,
    index: usize,
}

impl PlayQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole queue and positions it on `selected_id`, or on
    /// the first track when that id is not in `tracks`.
    pub fn replace(&mut self, tracks: Vec<Track>, selected_id: &str) -> usize {
        self.index = tracks
            .iter()
            .position(|t| t.id == selected_id)
            .unwrap_or(0);
        self.tracks = tracks;
        self.index
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
        self.index = 0;
    }

    pub fn advance(&mut self) -> Option<&Track> {
        if self.tracks.is_empty() {
            return None;
        }
        self.index = (self.index + 1) % self.tracks.len();
        self.tracks.get(self.index)
    }

    pub fn retreat(&mut self) -> Option<&Track> {
        if self.tracks.is_empty() {
            return None;
        }
        self.index = if self.index == 0 {
            self.tracks.len() - 1
        } else {
            self.index - 1
        };
        self.tracks.get(self.index)
    }

    /// `None` for an empty queue.
    pub fn index(&self) -> Option<usize> {
        (!self.tracks.is_empty()).then_some(self.index)
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}
