use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{AppError, Result};
use crate::playback::transport::{
    AudioTransport, PlaybackPosition, PlaybackState, TrackDescriptor, TransportEvent,
};

#[derive(Default)]
struct EngineState {
    loaded: Option<TrackDescriptor>,
    state: PlaybackState,
    position_ms: u64,
    duration_ms: u64,
}

/// Stand-in engine for terminals without an audio backend. It keeps
/// transport state in memory, logs every command and reports lifecycle
/// events like a real engine would.
pub struct ConsoleTransport {
    engine: Mutex<EngineState>,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl ConsoleTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (
            Self {
                engine: Mutex::new(EngineState::default()),
                events,
            },
            rx,
        )
    }

    /// Injects an event as if it came from the engine or a remote control.
    pub fn simulate(&self, event: TransportEvent) {
        self.emit(event);
    }

    pub fn loaded(&self) -> Option<TrackDescriptor> {
        self.engine().ok().and_then(|e| e.loaded.clone())
    }

    fn emit(&self, event: TransportEvent) {
        if self.events.send(event).is_err() {
            debug!("No transport event listener attached");
        }
    }

    fn engine(&self) -> Result<std::sync::MutexGuard<'_, EngineState>> {
        self.engine
            .lock()
            .map_err(|_| AppError::Transport("engine state poisoned".into()))
    }

    fn set_state(&self, state: PlaybackState) -> Result<()> {
        self.engine()?.state = state;
        self.emit(TransportEvent::StateChanged(state));
        Ok(())
    }
}

#[async_trait]
impl AudioTransport for ConsoleTransport {
    async fn load(&self, track: TrackDescriptor, autoplay: bool) -> Result<()> {
        if track.url.is_empty() {
            warn!(id = %track.id, "Engine rejected track without stream URL");
            {
                let mut engine = self.engine()?;
                engine.loaded = None;
                engine.state = PlaybackState::Idle;
            }
            self.emit(TransportEvent::PlaybackError(format!(
                "No playable stream for {}",
                track.title
            )));
            return Ok(());
        }

        info!(title = %track.title, artist = %track.artist, url = %track.url, "Engine loading");
        {
            let mut engine = self.engine()?;
            engine.duration_ms = track.duration_ms.unwrap_or_default();
            engine.position_ms = 0;
            engine.loaded = Some(track);
        }

        let state = if autoplay {
            PlaybackState::Playing
        } else {
            PlaybackState::Paused
        };
        self.set_state(state)
    }

    async fn pause(&self) -> Result<()> {
        self.set_state(PlaybackState::Paused)
    }

    async fn resume(&self) -> Result<()> {
        if self.engine()?.loaded.is_none() {
            debug!("Resume ignored, nothing loaded");
            return Ok(());
        }
        self.set_state(PlaybackState::Playing)
    }

    async fn stop(&self) -> Result<()> {
        self.engine()?.position_ms = 0;
        self.set_state(PlaybackState::Idle)
    }

    async fn clear(&self) -> Result<()> {
        {
            let mut engine = self.engine()?;
            engine.loaded = None;
            engine.position_ms = 0;
            engine.duration_ms = 0;
        }
        self.set_state(PlaybackState::Idle)
    }

    async fn seek(&self, position_ms: u64) -> Result<()> {
        let (position_ms, duration_ms) = {
            let mut engine = self.engine()?;
            engine.position_ms = if engine.duration_ms > 0 {
                position_ms.min(engine.duration_ms)
            } else {
                position_ms
            };
            (engine.position_ms, engine.duration_ms)
        };

        self.emit(TransportEvent::Progress {
            position_ms,
            duration_ms,
        });
        Ok(())
    }

    async fn state(&self) -> PlaybackState {
        self.engine().map(|e| e.state).unwrap_or_default()
    }

    async fn position(&self) -> PlaybackPosition {
        self.engine()
            .map(|e| PlaybackPosition {
                position_ms: e.position_ms,
                duration_ms: e.duration_ms,
            })
            .unwrap_or_default()
    }
}
