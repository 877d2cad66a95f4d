//! The playback-and-queue coordinator.
//!
//! One coordinator exists per session. Screens hold clones of the same
//! handle and never touch queue state directly; they call operations and
//! follow changes through [`PlaybackCoordinator::subscribe`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::catalog::Track;
use crate::error::{AppError, Result};
use crate::library::LibraryStore;
use crate::playback::queue::PlayQueue;
use crate::playback::transport::{AudioTransport, PlaybackState, TrackDescriptor, TransportEvent};

/// Relative seek step for skip forward/backward.
pub const SKIP_INTERVAL_MS: u64 = 15_000;
const NOTICE_CAPACITY: usize = 64;

/// Broadcast to every subscriber when coordinator state changes.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackNotice {
    TrackChanged {
        track: Track,
        index: Option<usize>,
    },
    Stopped,
    PlaybackError(String),
}

/// Point-in-time copy of the coordinator's state for rendering.
#[derive(Debug, Clone)]
pub struct PlaybackSnapshot {
    pub current_track: Option<Track>,
    pub queue: Vec<Track>,
    pub index: Option<usize>,
    pub state: PlaybackState,
}

#[derive(Default)]
struct SessionState {
    current: Option<Track>,
    queue: PlayQueue,
}

struct Inner<T, L> {
    transport: T,
    library: L,
    state: Mutex<SessionState>,
    notices: broadcast::Sender<PlaybackNotice>,
    relay_attached: Arc<AtomicBool>,
}

pub struct PlaybackCoordinator<T, L> {
    inner: Arc<Inner<T, L>>,
}

impl<T, L> Clone for PlaybackCoordinator<T, L> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T, L> PlaybackCoordinator<T, L>
where
    T: AudioTransport + 'static,
    L: LibraryStore + 'static,
{
    pub fn new(transport: T, library: L) -> Self {
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);

        Self {
            inner: Arc::new(Inner {
                transport,
                library,
                state: Mutex::new(SessionState::default()),
                notices,
                relay_attached: Arc::new(AtomicBool::new(false)),
            }),
        }
    }

    pub fn transport(&self) -> &T {
        &self.inner.transport
    }

    pub fn library(&self) -> &L {
        &self.inner.library
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackNotice> {
        self.inner.notices.subscribe()
    }

    /// Starts `track` with `queue` as the new play context. The queue is
    /// positioned on `track` when it is a member, otherwise on the first
    /// entry; the track itself plays either way.
    ///
    /// `None` is the stop signal: state is cleared, nothing is loaded and
    /// nothing is recorded.
    pub async fn play(&self, track: Option<Track>, queue: Vec<Track>) -> Option<Track> {
        let mut state = self.inner.state.lock().await;

        let Some(track) = track else {
            state.current = None;
            state.queue.clear();
            debug!("Play called without a track, playback state reset");
            self.notify(PlaybackNotice::Stopped);
            return None;
        };

        let index = state.queue.replace(queue, &track.id);
        state.current = Some(track.clone());
        info!(
            track = %track.title,
            id = %track.id,
            queue_len = state.queue.len(),
            index,
            "Starting playback"
        );

        self.start(&track, state.queue.index()).await;
        Some(track)
    }

    /// Moves to the following queue entry, wrapping past the end.
    /// Does nothing on an empty queue.
    pub async fn next(&self) -> Option<Track> {
        let mut state = self.inner.state.lock().await;

        let track = state.queue.advance()?.clone();
        state.current = Some(track.clone());
        debug!(index = ?state.queue.index(), track = %track.title, "Advanced to next track");

        self.start(&track, state.queue.index()).await;
        Some(track)
    }

    /// Moves to the preceding queue entry, wrapping past the start.
    /// Does nothing on an empty queue.
    pub async fn previous(&self) -> Option<Track> {
        let mut state = self.inner.state.lock().await;

        let track = state.queue.retreat()?.clone();
        state.current = Some(track.clone());
        debug!(index = ?state.queue.index(), track = %track.title, "Moved to previous track");

        self.start(&track, state.queue.index()).await;
        Some(track)
    }

    /// Clears the transport and forgets the current track and queue.
    pub async fn close(&self) {
        let mut state = self.inner.state.lock().await;

        if let Err(e) = self.inner.transport.clear().await {
            self.report_error(format!("Failed to clear transport: {}", e));
        }

        let was_active = state.current.is_some() || !state.queue.is_empty();
        state.current = None;
        state.queue.clear();

        if was_active {
            info!("Player closed");
            self.notify(PlaybackNotice::Stopped);
        }
    }

    /// Pauses when the transport reports playing, resumes otherwise.
    /// Returns the state that was requested.
    pub async fn toggle_playback(&self) -> PlaybackState {
        let _state = self.inner.state.lock().await;

        let (requested, result) = match self.inner.transport.state().await {
            PlaybackState::Playing => (PlaybackState::Paused, self.inner.transport.pause().await),
            _ => (PlaybackState::Playing, self.inner.transport.resume().await),
        };

        if let Err(e) = result {
            self.report_error(format!("Failed to toggle playback: {}", e));
        }
        requested
    }

    pub async fn seek(&self, position_ms: u64) {
        let _state = self.inner.state.lock().await;

        if let Err(e) = self.inner.transport.seek(position_ms).await {
            self.report_error(format!("Failed to seek: {}", e));
        }
    }

    pub async fn skip_forward(&self) {
        let position = self.inner.transport.position().await;
        self.seek(position.position_ms.saturating_add(SKIP_INTERVAL_MS))
            .await;
    }

    pub async fn skip_backward(&self) {
        let position = self.inner.transport.position().await;
        self.seek(position.position_ms.saturating_sub(SKIP_INTERVAL_MS))
            .await;
    }

    /// The transport's state, except that no current track always reads
    /// as idle.
    pub async fn playback_state(&self) -> PlaybackState {
        let state = self.inner.state.lock().await;
        if state.current.is_none() {
            return PlaybackState::Idle;
        }
        self.inner.transport.state().await
    }

    pub async fn current_track(&self) -> Option<Track> {
        self.inner.state.lock().await.current.clone()
    }

    pub async fn snapshot(&self) -> PlaybackSnapshot {
        let state = self.inner.state.lock().await;
        let playback = if state.current.is_some() {
            self.inner.transport.state().await
        } else {
            PlaybackState::Idle
        };

        PlaybackSnapshot {
            current_track: state.current.clone(),
            queue: state.queue.tracks().to_vec(),
            index: state.queue.index(),
            state: playback,
        }
    }

    /// Likes the current track, or unlikes it when already liked.
    /// Returns the new liked status, `None` when nothing is playing.
    pub async fn toggle_like_current(&self) -> Option<bool> {
        let track = self.current_track().await?;
        let library = &self.inner.library;

        if library.is_liked(&track.id).await {
            library.unlike(&track.id).await;
            Some(false)
        } else {
            library.like(&track).await;
            Some(true)
        }
    }

    /// Maps one transport event onto coordinator operations.
    pub async fn handle_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::TrackEnded | TransportEvent::RemoteNext => {
                debug!("Relaying track end or remote next");
                self.next().await;
            }
            TransportEvent::RemotePrevious => {
                debug!("Relaying remote previous");
                self.previous().await;
            }
            TransportEvent::PlaybackError(message) => {
                self.report_error(message);
            }
            TransportEvent::StateChanged(state) => {
                trace!(%state, "Transport state changed");
            }
            TransportEvent::Progress {
                position_ms,
                duration_ms,
            } => {
                trace!(position_ms, duration_ms, "Transport progress");
            }
        }
    }

    /// Relays transport events into this coordinator for the rest of the
    /// session. Only one relay may be attached at a time. The slot stays
    /// taken until the returned guard is dropped or shut down, even if the
    /// event stream closes first.
    pub fn attach(&self, mut events: mpsc::UnboundedReceiver<TransportEvent>) -> Result<EventRelay> {
        if self.inner.relay_attached.swap(true, Ordering::SeqCst) {
            return Err(AppError::RelayActive);
        }

        let token = CancellationToken::new();
        let shutdown = token.clone();
        let coordinator = self.clone();

        let handle = tokio::spawn(async move {
            info!("Transport event relay started");
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    event = events.recv() => match event {
                        Some(event) => coordinator.handle_event(event).await,
                        None => {
                            debug!("Transport event stream closed");
                            break;
                        }
                    },
                }
            }
            info!("Transport event relay stopped");
        });

        Ok(EventRelay {
            token,
            handle: Some(handle),
            attached: self.inner.relay_attached.clone(),
        })
    }

    async fn start(&self, track: &Track, index: Option<usize>) {
        if track.stream_url.is_empty() {
            warn!(id = %track.id, "No playable stream variant, handing empty URL to transport");
        }

        if let Err(e) = self
            .inner
            .transport
            .load(TrackDescriptor::from(track), true)
            .await
        {
            self.report_error(format!("Failed to start {}: {}", track.title, e));
        }

        self.notify(PlaybackNotice::TrackChanged {
            track: track.clone(),
            index,
        });

        self.inner.library.record_play(track).await;
    }

    fn report_error(&self, message: String) {
        error!("Playback error: {}", message);
        self.notify(PlaybackNotice::PlaybackError(message));
    }

    fn notify(&self, notice: PlaybackNotice) {
        // No subscribers is fine.
        let _ = self.inner.notices.send(notice);
    }
}

/// Live transport event relay. Dropping it stops the relay and frees the
/// coordinator's relay slot immediately.
pub struct EventRelay {
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
    attached: Arc<AtomicBool>,
}

impl EventRelay {
    /// Stops the relay and waits for it to finish.
    pub async fn shutdown(mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!("Transport event relay ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for EventRelay {
    fn drop(&mut self) {
        self.token.cancel();
        self.attached.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::{Library, MemoryStore};
    use crate::playback::transport::PlaybackPosition;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    enum Command {
        Load(String),
        Pause,
        Resume,
        Stop,
        Clear,
        Seek(u64),
    }

    #[derive(Default)]
    struct RecordingTransport {
        commands: StdMutex<Vec<Command>>,
        state: StdMutex<PlaybackState>,
        position_ms: StdMutex<u64>,
        fail_loads: bool,
    }

    impl RecordingTransport {
        fn commands(&self) -> Vec<Command> {
            self.commands.lock().unwrap().clone()
        }

        fn record(&self, command: Command) {
            self.commands.lock().unwrap().push(command);
        }
    }

    #[async_trait]
    impl AudioTransport for RecordingTransport {
        async fn load(&self, track: TrackDescriptor, autoplay: bool) -> Result<()> {
            assert!(autoplay);
            self.record(Command::Load(track.id));
            if self.fail_loads {
                return Err(AppError::Transport("engine unavailable".into()));
            }
            *self.state.lock().unwrap() = PlaybackState::Playing;
            Ok(())
        }

        async fn pause(&self) -> Result<()> {
            self.record(Command::Pause);
            *self.state.lock().unwrap() = PlaybackState::Paused;
            Ok(())
        }

        async fn resume(&self) -> Result<()> {
            self.record(Command::Resume);
            *self.state.lock().unwrap() = PlaybackState::Playing;
            Ok(())
        }

        async fn stop(&self) -> Result<()> {
            self.record(Command::Stop);
            Ok(())
        }

        async fn clear(&self) -> Result<()> {
            self.record(Command::Clear);
            *self.state.lock().unwrap() = PlaybackState::Idle;
            Ok(())
        }

        async fn seek(&self, position_ms: u64) -> Result<()> {
            self.record(Command::Seek(position_ms));
            *self.position_ms.lock().unwrap() = position_ms;
            Ok(())
        }

        async fn state(&self) -> PlaybackState {
            *self.state.lock().unwrap()
        }

        async fn position(&self) -> PlaybackPosition {
            PlaybackPosition {
                position_ms: *self.position_ms.lock().unwrap(),
                duration_ms: 200_000,
            }
        }
    }

    type TestCoordinator = PlaybackCoordinator<RecordingTransport, Library<MemoryStore>>;

    fn coordinator() -> TestCoordinator {
        PlaybackCoordinator::new(RecordingTransport::default(), Library::new(MemoryStore::new()))
    }

    fn tracks(ids: &[&str]) -> Vec<Track> {
        ids.iter().map(|id| Track::mock(id, id)).collect()
    }

    async fn current_id(c: &TestCoordinator) -> Option<String> {
        c.current_track().await.map(|t| t.id)
    }

    async fn index(c: &TestCoordinator) -> Option<usize> {
        c.snapshot().await.index
    }

    async fn wait_for_track(rx: &mut broadcast::Receiver<PlaybackNotice>) -> Track {
        loop {
            let notice = tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .expect("timed out waiting for notice")
                .expect("notice channel closed");
            if let PlaybackNotice::TrackChanged { track, .. } = notice {
                return track;
            }
        }
    }

    #[tokio::test]
    async fn test_next_wraps_around_queue() {
        let c = coordinator();
        let queue = tracks(&["A", "B", "C"]);

        c.play(Some(queue[1].clone()), queue.clone()).await;
        assert_eq!(index(&c).await, Some(1));

        c.next().await;
        assert_eq!(current_id(&c).await.as_deref(), Some("C"));
        assert_eq!(index(&c).await, Some(2));

        c.next().await;
        assert_eq!(current_id(&c).await.as_deref(), Some("A"));
        assert_eq!(index(&c).await, Some(0));

        assert_eq!(
            c.transport().commands(),
            vec![
                Command::Load("B".into()),
                Command::Load("C".into()),
                Command::Load("A".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_previous_inverts_next() {
        let c = coordinator();
        let queue = tracks(&["A", "B", "C", "D"]);

        for start in 0..queue.len() {
            c.play(Some(queue[start].clone()), queue.clone()).await;
            c.next().await;
            c.previous().await;
            assert_eq!(index(&c).await, Some(start));
            assert_eq!(current_id(&c).await, Some(queue[start].id.clone()));
        }
    }

    #[tokio::test]
    async fn test_play_track_outside_queue_starts_at_zero() {
        let c = coordinator();
        let outsider = Track::mock("X", "outsider");

        c.play(Some(outsider.clone()), tracks(&["A", "B"])).await;

        assert_eq!(current_id(&c).await.as_deref(), Some("X"));
        assert_eq!(index(&c).await, Some(0));

        c.next().await;
        assert_eq!(current_id(&c).await.as_deref(), Some("B"));
    }

    #[tokio::test]
    async fn test_play_with_empty_queue_then_next_is_noop() {
        let c = coordinator();

        c.play(Some(Track::mock("solo", "solo")), Vec::new()).await;
        assert_eq!(index(&c).await, None);

        assert!(c.next().await.is_none());
        assert!(c.previous().await.is_none());
        assert_eq!(current_id(&c).await.as_deref(), Some("solo"));
        assert_eq!(c.transport().commands().len(), 1);
    }

    #[tokio::test]
    async fn test_stop_signal_clears_without_recording() {
        let c = coordinator();
        c.play(Some(Track::mock("A", "A")), tracks(&["A", "B"])).await;

        c.play(None, tracks(&["C"])).await;

        assert!(current_id(&c).await.is_none());
        assert!(c.snapshot().await.queue.is_empty());
        assert_eq!(c.playback_state().await, PlaybackState::Idle);

        let recents = c.library().recently_played().await;
        assert_eq!(recents.len(), 1);
        assert_eq!(recents[0].id, "A");
    }

    #[tokio::test]
    async fn test_close_always_resets() {
        let c = coordinator();

        c.close().await;
        assert!(current_id(&c).await.is_none());

        let queue = tracks(&["A", "B", "C"]);
        c.play(Some(queue[2].clone()), queue).await;
        c.close().await;
        c.close().await;

        let snapshot = c.snapshot().await;
        assert!(snapshot.current_track.is_none());
        assert!(snapshot.queue.is_empty());
        assert_eq!(snapshot.index, None);
        assert_eq!(snapshot.state, PlaybackState::Idle);
        assert!(c.next().await.is_none());
    }

    #[tokio::test]
    async fn test_new_play_context_replaces_queue() {
        let c = coordinator();
        let first = tracks(&["A", "B", "C"]);
        let second = tracks(&["X", "Y"]);

        c.play(Some(first[0].clone()), first).await;
        c.play(Some(second[0].clone()), second).await;

        let mut reachable = Vec::new();
        for _ in 0..4 {
            reachable.push(c.next().await.unwrap().id);
        }
        for _ in 0..4 {
            reachable.push(c.previous().await.unwrap().id);
        }

        assert!(reachable.iter().all(|id| id == "X" || id == "Y"));
    }

    #[tokio::test]
    async fn test_plays_are_recorded_most_recent_first() {
        let c = coordinator();
        let queue = tracks(&["A", "B"]);

        c.play(Some(queue[0].clone()), queue).await;
        c.next().await;
        c.next().await;

        let recents: Vec<String> = c
            .library()
            .recently_played()
            .await
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(recents, vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_toggle_follows_transport_state() {
        let c = coordinator();
        c.play(Some(Track::mock("A", "A")), Vec::new()).await;

        assert_eq!(c.toggle_playback().await, PlaybackState::Paused);
        assert_eq!(c.playback_state().await, PlaybackState::Paused);
        assert_eq!(c.toggle_playback().await, PlaybackState::Playing);

        assert_eq!(
            c.transport().commands()[1..],
            [Command::Pause, Command::Resume]
        );
        assert_eq!(current_id(&c).await.as_deref(), Some("A"));
    }

    #[tokio::test]
    async fn test_skip_moves_relative_to_position() {
        let c = coordinator();
        c.seek(20_000).await;
        c.skip_forward().await;
        c.skip_backward().await;
        c.skip_backward().await;
        c.skip_backward().await;

        assert_eq!(
            c.transport().commands(),
            vec![
                Command::Seek(20_000),
                Command::Seek(35_000),
                Command::Seek(20_000),
                Command::Seek(5_000),
                Command::Seek(0),
            ]
        );
    }

    #[tokio::test]
    async fn test_load_failure_is_reported_not_fatal() {
        let transport = RecordingTransport {
            fail_loads: true,
            ..Default::default()
        };
        let c = PlaybackCoordinator::new(transport, Library::new(MemoryStore::new()));
        let mut notices = c.subscribe();

        c.play(Some(Track::mock("A", "A")), Vec::new()).await;

        assert!(matches!(
            notices.recv().await.unwrap(),
            PlaybackNotice::PlaybackError(_)
        ));
        assert_eq!(
            c.current_track().await.map(|t| t.id).as_deref(),
            Some("A")
        );
    }

    #[tokio::test]
    async fn test_toggle_like_current() {
        let c = coordinator();
        assert_eq!(c.toggle_like_current().await, None);

        c.play(Some(Track::mock("A", "A")), Vec::new()).await;
        assert_eq!(c.toggle_like_current().await, Some(true));
        assert!(c.library().is_liked("A").await);
        assert_eq!(c.toggle_like_current().await, Some(false));
        assert!(!c.library().is_liked("A").await);
    }

    #[tokio::test]
    async fn test_track_ended_at_last_index_wraps_like_next() {
        let c = coordinator();
        let (tx, rx) = mpsc::unbounded_channel();
        let relay = c.attach(rx).unwrap();
        let mut notices = c.subscribe();

        let queue = tracks(&["A", "B", "C"]);
        c.play(Some(queue[2].clone()), queue).await;
        assert_eq!(wait_for_track(&mut notices).await.id, "C");

        tx.send(TransportEvent::TrackEnded).unwrap();
        assert_eq!(wait_for_track(&mut notices).await.id, "A");
        assert_eq!(index(&c).await, Some(0));

        relay.shutdown().await;
    }

    #[tokio::test]
    async fn test_relay_reads_current_queue() {
        let c = coordinator();
        let (tx, rx) = mpsc::unbounded_channel();
        let _relay = c.attach(rx).unwrap();
        let mut notices = c.subscribe();

        let first = tracks(&["A", "B"]);
        c.play(Some(first[0].clone()), first).await;
        let second = tracks(&["X", "Y", "Z"]);
        c.play(Some(second[1].clone()), second).await;

        tx.send(TransportEvent::RemoteNext).unwrap();
        tx.send(TransportEvent::RemotePrevious).unwrap();
        tx.send(TransportEvent::RemotePrevious).unwrap();

        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(wait_for_track(&mut notices).await.id);
        }
        assert_eq!(seen, vec!["A", "Y", "Z", "Y", "X"]);
    }

    #[tokio::test]
    async fn test_playback_error_event_leaves_queue_alone() {
        let c = coordinator();
        let (tx, rx) = mpsc::unbounded_channel();
        let relay = c.attach(rx).unwrap();

        let queue = tracks(&["A", "B"]);
        c.play(Some(queue[0].clone()), queue).await;
        let mut notices = c.subscribe();

        tx.send(TransportEvent::PlaybackError("decoder failed".into()))
            .unwrap();
        let notice = tokio::time::timeout(Duration::from_secs(2), notices.recv())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(notice, PlaybackNotice::PlaybackError("decoder failed".into()));
        assert_eq!(current_id(&c).await.as_deref(), Some("A"));
        assert_eq!(index(&c).await, Some(0));
        assert_eq!(c.transport().commands().len(), 1);

        relay.shutdown().await;
    }

    #[tokio::test]
    async fn test_relay_attaches_once_per_session() {
        let c = coordinator();
        let (_tx, rx) = mpsc::unbounded_channel();
        let relay = c.attach(rx).unwrap();

        let (_tx2, rx2) = mpsc::unbounded_channel();
        assert!(matches!(c.attach(rx2), Err(AppError::RelayActive)));

        relay.shutdown().await;

        let (_tx3, rx3) = mpsc::unbounded_channel();
        assert!(c.attach(rx3).is_ok());
    }

    #[tokio::test]
    async fn test_dropped_relay_frees_slot_immediately() {
        let c = coordinator();
        let (_tx, rx) = mpsc::unbounded_channel();
        let relay = c.attach(rx).unwrap();
        drop(relay);

        let (tx2, rx2) = mpsc::unbounded_channel();
        let relay = c.attach(rx2).unwrap();
        let mut notices = c.subscribe();

        let queue = tracks(&["A", "B"]);
        c.play(Some(queue[0].clone()), queue).await;
        assert_eq!(wait_for_track(&mut notices).await.id, "A");

        tx2.send(TransportEvent::TrackEnded).unwrap();
        assert_eq!(wait_for_track(&mut notices).await.id, "B");

        relay.shutdown().await;
    }

    #[tokio::test]
    async fn test_closed_stream_keeps_slot_until_guard_released() {
        let c = coordinator();
        let (tx, rx) = mpsc::unbounded_channel();
        let relay = c.attach(rx).unwrap();
        drop(tx);
        tokio::time::sleep(Duration::from_millis(20)).await;

        let (_tx2, rx2) = mpsc::unbounded_channel();
        assert!(matches!(c.attach(rx2), Err(AppError::RelayActive)));

        relay.shutdown().await;
        let (_tx3, rx3) = mpsc::unbounded_channel();
        assert!(c.attach(rx3).is_ok());
    }
}
