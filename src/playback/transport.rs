use async_trait::async_trait;

use crate::catalog::Track;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Idle,
    Loading,
    Playing,
    Paused,
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Idle => write!(f, "idle"),
            PlaybackState::Loading => write!(f, "loading"),
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::Paused => write!(f, "paused"),
        }
    }
}

/// What the audio engine needs to start a track.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackDescriptor {
    pub id: String,
    pub url: String,
    pub title: String,
    pub artist: String,
    pub artwork: String,
    pub album: String,
    pub duration_ms: Option<u64>,
}

impl From<&Track> for TrackDescriptor {
    fn from(track: &Track) -> Self {
        Self {
            id: track.id.clone(),
            url: track.stream_url.clone(),
            title: track.title.clone(),
            artist: track.artist_name.clone(),
            artwork: track.artwork_url.clone(),
            album: track.album_name.clone(),
            duration_ms: track.duration_secs().map(|s| s * 1000),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlaybackPosition {
    pub position_ms: u64,
    pub duration_ms: u64,
}

/// Asynchronous notifications from the audio engine.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    StateChanged(PlaybackState),
    Progress { position_ms: u64, duration_ms: u64 },
    TrackEnded,
    /// Next pressed on a lock screen, headset or car display.
    RemoteNext,
    RemotePrevious,
    PlaybackError(String),
}

/// The native playback engine. Commands are fire-and-forget: an `Ok`
/// means the command was accepted, not that audio is playing.
#[async_trait]
pub trait AudioTransport: Send + Sync {
    async fn load(&self, track: TrackDescriptor, autoplay: bool) -> Result<()>;

    async fn pause(&self) -> Result<()>;

    async fn resume(&self) -> Result<()>;

    async fn stop(&self) -> Result<()>;

    /// Stops playback and forgets the loaded track.
    async fn clear(&self) -> Result<()>;

    async fn seek(&self, position_ms: u64) -> Result<()>;

    async fn state(&self) -> PlaybackState;

    async fn position(&self) -> PlaybackPosition;
}
