use std::collections::HashSet;

use async_trait::async_trait;
use rand::Rng;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::catalog::models::{
    AlbumDetails, AlbumSummary, ArtistSummary, ModuleItem, Modules, Page, PlaylistDetails,
    PlaylistSummary, Track,
};
use crate::config::Config;
use crate::error::{AppError, Result};

pub const SONG_PAGE_LIMIT: u32 = 40;
pub const LISTING_LIMIT: u32 = 100;
const RANDOM_PAGE_MAX: u32 = 10;

/// Read-only access to the music catalog.
#[async_trait]
pub trait CatalogClient: Send + Sync {
    async fn search_songs(&self, query: &str, page: u32, limit: u32) -> Result<Page<Track>>;

    async fn search_albums(&self, query: &str, page: u32, limit: u32)
    -> Result<Page<AlbumSummary>>;

    async fn search_playlists(
        &self,
        query: &str,
        page: u32,
        limit: u32,
    ) -> Result<Page<PlaylistSummary>>;

    async fn search_artists(&self, query: &str, page: u32, limit: u32)
    -> Result<Page<ArtistSummary>>;

    async fn song(&self, id: &str) -> Result<Track>;

    async fn album(&self, id: &str) -> Result<AlbumDetails>;

    async fn playlist(&self, id: &str, limit: u32) -> Result<PlaylistDetails>;

    async fn artist_songs(&self, artist_id: &str, page: u32) -> Result<Page<Track>>;

    async fn song_suggestions(&self, song_id: &str) -> Result<Vec<Track>>;
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    #[serde(default)]
    success: bool,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct SearchData<T> {
    results: Option<Vec<T>>,
    #[serde(default)]
    total: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ArtistSongsData {
    #[serde(default)]
    songs: Option<Vec<Track>>,
    #[serde(default)]
    total: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ModulesEnvelope {
    #[serde(default)]
    status: String,
    data: Option<ModulesData>,
}

#[derive(Debug, Deserialize)]
struct ModulesData {
    #[serde(default)]
    albums: Option<Vec<ModuleItem>>,
    #[serde(default)]
    playlists: Option<Vec<ModuleItem>>,
    #[serde(default)]
    charts: Option<Vec<ModuleItem>>,
}

/// HTTP client for the JioSaavn mirror APIs.
pub struct SaavnClient {
    http_client: Client,
    api_base: String,
    catalog_base: String,
    modules_url: String,
}

impl SaavnClient {
    pub fn new(config: &Config) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            http_client,
            api_base: config.api_base.clone(),
            catalog_base: config.catalog_base.clone(),
            modules_url: config.modules_url.clone(),
        })
    }

    async fn get_envelope<T: DeserializeOwned + Send>(
        &self,
        url: &str,
        params: &[(&str, String)],
    ) -> Result<Option<T>> {
        debug!(url, ?params, "Catalog request started");

        let response = self.http_client.get(url).query(params).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::CatalogApi(format!(
                "{} returned {}: {}",
                url, status, error_text
            )));
        }

        let envelope: ApiEnvelope<T> = response.json().await?;
        if !envelope.success {
            debug!(url, "Catalog responded without success flag");
            return Ok(None);
        }

        Ok(envelope.data)
    }

    async fn search<T: DeserializeOwned + Send>(
        &self,
        base: &str,
        kind: &str,
        query: &str,
        page: u32,
        limit: u32,
    ) -> Result<Page<T>> {
        let url = format!("{}/search/{}", base, kind);
        let params = [
            ("query", query.to_string()),
            ("page", page.to_string()),
            ("limit", limit.to_string()),
        ];

        let data: Option<SearchData<T>> = self.get_envelope(&url, &params).await?;

        Ok(match data {
            Some(SearchData {
                results: Some(results),
                total,
            }) => Page { results, total },
            _ => Page::empty(),
        })
    }

    /// Home feed: a page of songs for a language, duplicates removed.
    /// A random page between 1 and 10 is used when `page` is `None`.
    pub async fn random_songs(&self, language: &str, page: Option<u32>) -> Vec<Track> {
        let page = page.unwrap_or_else(|| rand::thread_rng().gen_range(1..=RANDOM_PAGE_MAX));

        match self.search_songs(language, page, SONG_PAGE_LIMIT).await {
            Ok(page) => {
                let mut seen = HashSet::new();
                page.results
                    .into_iter()
                    .filter(|t| seen.insert(t.id.clone()))
                    .collect()
            }
            Err(e) => {
                warn!("Failed to fetch songs for {}: {}", language, e);
                Vec::new()
            }
        }
    }

    /// Albums, playlists and charts featured for a language.
    pub async fn modules(&self, language: &str) -> Modules {
        let url = format!("{}/modules", self.modules_url);

        let result: Result<ModulesEnvelope> = async {
            let response = self
                .http_client
                .get(&url)
                .query(&[("language", language)])
                .send()
                .await?;
            Ok(response.json().await?)
        }
        .await;

        match result {
            Ok(ModulesEnvelope {
                status,
                data: Some(data),
            }) if status == "SUCCESS" => Modules {
                albums: data.albums.unwrap_or_default(),
                playlists: data.playlists.unwrap_or_default(),
                charts: data.charts.unwrap_or_default(),
            },
            Ok(_) => Modules::default(),
            Err(e) => {
                warn!("Failed to fetch modules for {}: {}", language, e);
                Modules::default()
            }
        }
    }
}

#[async_trait]
impl CatalogClient for SaavnClient {
    async fn search_songs(&self, query: &str, page: u32, limit: u32) -> Result<Page<Track>> {
        self.search(&self.api_base, "songs", query, page, limit).await
    }

    async fn search_albums(
        &self,
        query: &str,
        page: u32,
        limit: u32,
    ) -> Result<Page<AlbumSummary>> {
        self.search(&self.catalog_base, "albums", query, page, limit)
            .await
    }

    async fn search_playlists(
        &self,
        query: &str,
        page: u32,
        limit: u32,
    ) -> Result<Page<PlaylistSummary>> {
        self.search(&self.catalog_base, "playlists", query, page, limit)
            .await
    }

    async fn search_artists(
        &self,
        query: &str,
        page: u32,
        limit: u32,
    ) -> Result<Page<ArtistSummary>> {
        self.search(&self.catalog_base, "artists", query, page, limit)
            .await
    }

    async fn song(&self, id: &str) -> Result<Track> {
        let url = format!("{}/songs/{}", self.api_base, id);
        let songs: Option<Vec<Track>> = self.get_envelope(&url, &[]).await?;

        songs
            .and_then(|s| s.into_iter().next())
            .ok_or_else(|| AppError::NotFound(format!("song {}", id)))
    }

    async fn album(&self, id: &str) -> Result<AlbumDetails> {
        let url = format!("{}/albums", self.catalog_base);
        let album: Option<AlbumDetails> =
            self.get_envelope(&url, &[("id", id.to_string())]).await?;

        let album = album.ok_or_else(|| AppError::NotFound(format!("album {}", id)))?;
        info!("Fetched album: {} ({} songs)", album.name, album.songs.len());
        Ok(album)
    }

    async fn playlist(&self, id: &str, limit: u32) -> Result<PlaylistDetails> {
        let url = format!("{}/playlists", self.catalog_base);
        let playlist: Option<PlaylistDetails> = self
            .get_envelope(&url, &[("id", id.to_string()), ("limit", limit.to_string())])
            .await?;

        let playlist = playlist.ok_or_else(|| AppError::NotFound(format!("playlist {}", id)))?;
        info!(
            "Fetched playlist: {} ({} songs)",
            playlist.name,
            playlist.songs.len()
        );
        Ok(playlist)
    }

    async fn artist_songs(&self, artist_id: &str, page: u32) -> Result<Page<Track>> {
        let url = format!("{}/artists/{}/songs", self.catalog_base, artist_id);
        let data: Option<ArtistSongsData> = self
            .get_envelope(&url, &[("page", page.to_string())])
            .await?;

        Ok(match data {
            Some(ArtistSongsData {
                songs: Some(results),
                total,
            }) => Page { results, total },
            _ => Page::empty(),
        })
    }

    async fn song_suggestions(&self, song_id: &str) -> Result<Vec<Track>> {
        let url = format!("{}/songs/{}/suggestions", self.api_base, song_id);
        let songs: Option<Vec<Track>> = self.get_envelope(&url, &[]).await?;
        Ok(songs.unwrap_or_default())
    }
}
