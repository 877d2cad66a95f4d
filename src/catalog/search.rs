//! Paginated, cancellable searches as driven by a single screen.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::catalog::client::{CatalogClient, LISTING_LIMIT, SONG_PAGE_LIMIT};
use crate::catalog::models::{AlbumSummary, ArtistSummary, CatalogId, Page, PlaylistSummary, Track};
use crate::error::{AppError, Result};

/// One paginated listing the session can walk through.
#[async_trait]
pub trait PageSource: Send + Sync {
    type Item: CatalogId + Clone + Send + Sync + 'static;

    async fn fetch(&self, query: &str, page: u32) -> Result<Page<Self::Item>>;

    fn page_limit(&self) -> u32;

    /// Whether another page is worth requesting after one that yielded
    /// `new_items` previously unseen entries.
    fn has_more(&self, new_items: usize) -> bool {
        new_items as u32 == self.page_limit()
    }
}

pub struct SongSearch<C>(pub Arc<C>);
pub struct AlbumSearch<C>(pub Arc<C>);
pub struct PlaylistSearch<C>(pub Arc<C>);
pub struct ArtistSearch<C>(pub Arc<C>);

/// Songs of one artist. The query string is ignored.
pub struct ArtistSongs<C> {
    pub catalog: Arc<C>,
    pub artist_id: String,
}

#[async_trait]
impl<C: CatalogClient> PageSource for SongSearch<C> {
    type Item = Track;

    async fn fetch(&self, query: &str, page: u32) -> Result<Page<Track>> {
        self.0.search_songs(query, page, SONG_PAGE_LIMIT).await
    }

    fn page_limit(&self) -> u32 {
        SONG_PAGE_LIMIT
    }
}

#[async_trait]
impl<C: CatalogClient> PageSource for AlbumSearch<C> {
    type Item = AlbumSummary;

    async fn fetch(&self, query: &str, page: u32) -> Result<Page<AlbumSummary>> {
        self.0.search_albums(query, page, SONG_PAGE_LIMIT).await
    }

    fn page_limit(&self) -> u32 {
        SONG_PAGE_LIMIT
    }
}

#[async_trait]
impl<C: CatalogClient> PageSource for PlaylistSearch<C> {
    type Item = PlaylistSummary;

    async fn fetch(&self, query: &str, page: u32) -> Result<Page<PlaylistSummary>> {
        self.0.search_playlists(query, page, SONG_PAGE_LIMIT).await
    }

    fn page_limit(&self) -> u32 {
        SONG_PAGE_LIMIT
    }
}

#[async_trait]
impl<C: CatalogClient> PageSource for ArtistSearch<C> {
    type Item = ArtistSummary;

    async fn fetch(&self, query: &str, page: u32) -> Result<Page<ArtistSummary>> {
        self.0.search_artists(query, page, LISTING_LIMIT).await
    }

    fn page_limit(&self) -> u32 {
        LISTING_LIMIT
    }

    // Artist search is a single listing.
    fn has_more(&self, _new_items: usize) -> bool {
        false
    }
}

#[async_trait]
impl<C: CatalogClient> PageSource for ArtistSongs<C> {
    type Item = Track;

    async fn fetch(&self, _query: &str, page: u32) -> Result<Page<Track>> {
        self.catalog.artist_songs(&self.artist_id, page).await
    }

    fn page_limit(&self) -> u32 {
        SONG_PAGE_LIMIT
    }

    fn has_more(&self, new_items: usize) -> bool {
        new_items > 0
    }
}

struct SessionState<T> {
    query: String,
    page: u32,
    seen: HashSet<String>,
    results: Vec<T>,
    has_more: bool,
    total: Option<u64>,
    loading: bool,
    generation: u64,
    in_flight: Option<CancellationToken>,
}

impl<T> Default for SessionState<T> {
    fn default() -> Self {
        Self {
            query: String::new(),
            page: 0,
            seen: HashSet::new(),
            results: Vec::new(),
            has_more: false,
            total: None,
            loading: false,
            generation: 0,
            in_flight: None,
        }
    }
}

/// Pagination bookkeeping for one screen: at most one request in flight,
/// and a new search cancels whatever was running before it.
pub struct SearchSession<S: PageSource> {
    source: S,
    state: Mutex<SessionState<S::Item>>,
}

impl<S: PageSource> SearchSession<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            state: Mutex::new(SessionState::default()),
        }
    }

    /// Starts a fresh search from page 1. Blank queries are ignored and
    /// leave the current results untouched.
    pub async fn search(&self, query: &str) -> Result<Vec<S::Item>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(self.results().await);
        }

        let (token, generation) = {
            let mut state = self.state.lock().await;
            if let Some(previous) = state.in_flight.take() {
                debug!(previous = %state.query, "Cancelling superseded search");
                previous.cancel();
            }
            let token = CancellationToken::new();
            state.generation += 1;
            state.query = query.to_string();
            state.page = 1;
            state.seen.clear();
            state.results.clear();
            state.total = None;
            state.has_more = false;
            state.loading = true;
            state.in_flight = Some(token.clone());
            (token, state.generation)
        };

        self.run(query, 1, token, generation, false).await
    }

    /// Fetches the next page when more results are expected and nothing
    /// is currently loading. Returns only the newly added items.
    pub async fn load_more(&self) -> Result<Vec<S::Item>> {
        let (query, page, token, generation) = {
            let mut state = self.state.lock().await;
            if state.loading || !state.has_more || state.query.is_empty() {
                return Ok(Vec::new());
            }
            let token = CancellationToken::new();
            state.loading = true;
            state.in_flight = Some(token.clone());
            (state.query.clone(), state.page + 1, token, state.generation)
        };

        self.run(&query, page, token, generation, true).await
    }

    /// Cancels the in-flight request, if any.
    pub async fn cancel(&self) {
        let mut state = self.state.lock().await;
        if let Some(token) = state.in_flight.take() {
            token.cancel();
        }
        state.loading = false;
    }

    async fn run(
        &self,
        query: &str,
        page: u32,
        token: CancellationToken,
        generation: u64,
        is_load_more: bool,
    ) -> Result<Vec<S::Item>> {
        let outcome = tokio::select! {
            _ = token.cancelled() => None,
            result = self.source.fetch(query, page) => Some(result),
        };

        let mut state = self.state.lock().await;

        // A newer search replaced this one while it was in flight.
        let outcome = match outcome {
            Some(result) if state.generation == generation && !token.is_cancelled() => result,
            _ => {
                debug!(query, page, "Search request cancelled");
                return Err(AppError::Cancelled(format!("search for '{}'", query)));
            }
        };

        state.loading = false;
        state.in_flight = None;

        match outcome {
            Ok(fetched) => {
                let SessionState { seen, .. } = &mut *state;
                let fresh: Vec<S::Item> = fetched
                    .results
                    .into_iter()
                    .filter(|item| seen.insert(item.catalog_id().to_string()))
                    .collect();

                state.page = page;
                state.has_more = self.source.has_more(fresh.len());
                if !is_load_more {
                    state.total = fetched.total;
                }
                state.results.extend(fresh.iter().cloned());

                debug!(
                    query,
                    page,
                    new_items = fresh.len(),
                    has_more = state.has_more,
                    "Search page applied"
                );

                Ok(if is_load_more {
                    fresh
                } else {
                    state.results.clone()
                })
            }
            Err(e) => {
                warn!("Search for '{}' (page {}) failed: {}", query, page, e);
                state.has_more = false;
                if !is_load_more {
                    state.results.clear();
                }
                Ok(Vec::new())
            }
        }
    }

    pub async fn results(&self) -> Vec<S::Item> {
        self.state.lock().await.results.clone()
    }

    pub async fn has_more(&self) -> bool {
        self.state.lock().await.has_more
    }

    pub async fn is_loading(&self) -> bool {
        self.state.lock().await.loading
    }

    pub async fn total(&self) -> Option<u64> {
        self.state.lock().await.total
    }

    pub async fn page(&self) -> u32 {
        self.state.lock().await.page
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::catalog::models::{AlbumDetails, PlaylistDetails};
    use std::collections::HashMap;
    use std::time::Duration;

    /// Catalog fake that serves scripted song pages and can stall a query.
    #[derive(Default)]
    pub(crate) struct ScriptedCatalog {
        pub pages: HashMap<(String, u32), Vec<Track>>,
        pub slow_queries: HashSet<String>,
        pub failing_queries: HashSet<String>,
        pub suggestions: HashMap<String, Vec<Track>>,
    }

    impl ScriptedCatalog {
        pub fn with_page(mut self, query: &str, page: u32, ids: &[&str]) -> Self {
            let tracks = ids.iter().map(|id| Track::mock(id, id)).collect();
            self.pages.insert((query.to_string(), page), tracks);
            self
        }
    }

    #[async_trait]
    impl CatalogClient for ScriptedCatalog {
        async fn search_songs(&self, query: &str, page: u32, _limit: u32) -> Result<Page<Track>> {
            if self.slow_queries.contains(query) {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
            if self.failing_queries.contains(query) {
                return Err(AppError::CatalogApi("scripted failure".into()));
            }
            let results = self
                .pages
                .get(&(query.to_string(), page))
                .cloned()
                .unwrap_or_default();
            Ok(Page {
                total: Some(results.len() as u64),
                results,
            })
        }

        async fn search_albums(&self, _: &str, _: u32, _: u32) -> Result<Page<AlbumSummary>> {
            Ok(Page::empty())
        }

        async fn search_playlists(&self, _: &str, _: u32, _: u32) -> Result<Page<PlaylistSummary>> {
            Ok(Page::empty())
        }

        async fn search_artists(&self, _: &str, _: u32, _: u32) -> Result<Page<ArtistSummary>> {
            Ok(Page::empty())
        }

        async fn song(&self, id: &str) -> Result<Track> {
            self.pages
                .values()
                .flatten()
                .find(|t| t.id == id)
                .cloned()
                .ok_or_else(|| AppError::NotFound(id.to_string()))
        }

        async fn album(&self, id: &str) -> Result<AlbumDetails> {
            Err(AppError::NotFound(id.to_string()))
        }

        async fn playlist(&self, id: &str, _: u32) -> Result<PlaylistDetails> {
            Err(AppError::NotFound(id.to_string()))
        }

        async fn artist_songs(&self, artist_id: &str, page: u32) -> Result<Page<Track>> {
            self.search_songs(artist_id, page, SONG_PAGE_LIMIT).await
        }

        async fn song_suggestions(&self, song_id: &str) -> Result<Vec<Track>> {
            if self.failing_queries.contains(song_id) {
                return Err(AppError::CatalogApi("scripted failure".into()));
            }
            Ok(self.suggestions.get(song_id).cloned().unwrap_or_default())
        }
    }

    fn ids(tracks: &[Track]) -> Vec<&str> {
        tracks.iter().map(|t| t.id.as_str()).collect()
    }

    fn full_page(prefix: &str) -> Vec<String> {
        (0..SONG_PAGE_LIMIT).map(|i| format!("{}{}", prefix, i)).collect()
    }

    #[tokio::test]
    async fn test_pages_are_deduplicated_across_load_more() {
        let first = full_page("s");
        let first_refs: Vec<&str> = first.iter().map(String::as_str).collect();
        let catalog = ScriptedCatalog::default()
            .with_page("arijit", 1, &first_refs)
            .with_page("arijit", 2, &["s0", "s1", "new"]);

        let session = SearchSession::new(SongSearch(Arc::new(catalog)));

        let results = session.search("arijit").await.unwrap();
        assert_eq!(results.len(), SONG_PAGE_LIMIT as usize);
        assert!(session.has_more().await);

        let more = session.load_more().await.unwrap();
        assert_eq!(ids(&more), vec!["new"]);
        assert!(!session.has_more().await);
        assert_eq!(session.results().await.len(), SONG_PAGE_LIMIT as usize + 1);
        assert_eq!(session.page().await, 2);

        // Nothing more expected, so no request is made.
        assert!(session.load_more().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_blank_query_is_ignored() {
        let catalog = ScriptedCatalog::default().with_page("lofi", 1, &["a"]);
        let session = SearchSession::new(SongSearch(Arc::new(catalog)));

        session.search("lofi").await.unwrap();
        let results = session.search("   ").await.unwrap();

        assert_eq!(ids(&results), vec!["a"]);
    }

    #[tokio::test]
    async fn test_new_search_cancels_in_flight_one() {
        let mut catalog = ScriptedCatalog::default().with_page("fast", 1, &["f1", "f2"]);
        catalog.slow_queries.insert("slow".to_string());
        let session = Arc::new(SearchSession::new(SongSearch(Arc::new(catalog))));

        let stalled = {
            let session = session.clone();
            tokio::spawn(async move { session.search("slow").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let fresh = session.search("fast").await.unwrap();
        assert_eq!(ids(&fresh), vec!["f1", "f2"]);

        let superseded = stalled.await.unwrap();
        assert!(matches!(superseded, Err(AppError::Cancelled(_))));
        assert_eq!(ids(&session.results().await), vec!["f1", "f2"]);
    }

    #[tokio::test]
    async fn test_cancel_abandons_stalled_search() {
        let mut catalog = ScriptedCatalog::default().with_page("after", 1, &["x"]);
        catalog.slow_queries.insert("stuck".to_string());
        let session = Arc::new(SearchSession::new(SongSearch(Arc::new(catalog))));

        let stalled = {
            let session = session.clone();
            tokio::spawn(async move { session.search("stuck").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(session.is_loading().await);

        session.cancel().await;

        let outcome = tokio::time::timeout(Duration::from_secs(2), stalled)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(outcome, Err(AppError::Cancelled(_))));
        assert!(!session.is_loading().await);
        assert!(session.results().await.is_empty());

        let results = session.search("after").await.unwrap();
        assert_eq!(ids(&results), vec!["x"]);
    }

    #[tokio::test]
    async fn test_failed_search_degrades_to_empty() {
        let mut catalog = ScriptedCatalog::default();
        catalog.failing_queries.insert("broken".to_string());
        let session = SearchSession::new(SongSearch(Arc::new(catalog)));

        let results = session.search("broken").await.unwrap();

        assert!(results.is_empty());
        assert!(!session.has_more().await);
        assert!(!session.is_loading().await);
    }

    #[tokio::test]
    async fn test_artist_songs_continue_while_pages_add_items() {
        let catalog = Arc::new(
            ScriptedCatalog::default()
                .with_page("artist-1", 1, &["a", "b"])
                .with_page("artist-1", 2, &["b"]),
        );
        let session = SearchSession::new(ArtistSongs {
            catalog,
            artist_id: "artist-1".to_string(),
        });

        session.search("artist").await.unwrap();
        assert!(session.has_more().await);

        let more = session.load_more().await.unwrap();
        assert!(more.is_empty());
        assert!(!session.has_more().await);
    }
}
