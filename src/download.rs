use std::path::{Path, PathBuf};

use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::catalog::Track;
use crate::config::Config;
use crate::error::{AppError, Result};

const FILE_EXTENSION: &str = "m4a";
const UNSAFE_FILENAME_CHARS: &[char] = &['/', '\\', '?', '%', '*', ':', '|', '"', '<', '>'];

#[derive(Debug, Clone)]
pub struct DownloadOutcome {
    pub path: PathBuf,
    pub bytes_written: u64,
}

/// Saves songs through the remote transcode server, which tags the audio
/// with title, artists, album, year and artwork before returning it.
pub struct Downloader {
    http_client: Client,
    server_url: String,
    target_dir: PathBuf,
}

impl Downloader {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            http_client: Client::builder().build()?,
            server_url: config.download_server.clone(),
            target_dir: config.download_dir.clone(),
        })
    }

    pub fn target_dir(&self) -> &Path {
        &self.target_dir
    }

    /// Transcode server URL for `track`.
    pub fn request_url(&self, track: &Track) -> Result<String> {
        let audio_url = track.download_source_url().ok_or_else(|| {
            AppError::Download(format!("no downloadable variant for {}", track.title))
        })?;

        let params = [
            ("audioUrl", audio_url.to_string()),
            ("imageUrl", track.artwork_url.clone()),
            ("songName", track.title.clone()),
            ("artist", track.all_artists()),
            ("album", track.album_name.clone()),
            ("year", track.year()),
        ];

        let query = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        Ok(format!("{}?{}", self.server_url, query))
    }

    /// Streams the transcoded file to disk. `on_progress` receives the
    /// completed percentage when the server reports a content length.
    pub async fn download<F>(&self, track: &Track, mut on_progress: F) -> Result<DownloadOutcome>
    where
        F: FnMut(f64),
    {
        let url = self.request_url(track)?;
        let path = self.target_dir.join(safe_file_name(&track.title));

        tokio::fs::create_dir_all(&self.target_dir).await?;

        debug!("Requesting download for {}", track.title);
        let mut response = self.http_client.get(&url).send().await?;

        let status = response.status();
        if status.as_u16() != 200 {
            return Err(AppError::Download(format!("HTTP Status {}", status.as_u16())));
        }

        let total = response.content_length();
        let written: Result<u64> = async {
            let mut file = tokio::fs::File::create(&path).await?;
            let mut bytes_written: u64 = 0;

            while let Some(chunk) = response.chunk().await? {
                file.write_all(&chunk).await?;
                bytes_written += chunk.len() as u64;
                if let Some(total) = total.filter(|t| *t > 0) {
                    on_progress(bytes_written as f64 / total as f64 * 100.0);
                }
            }
            file.flush().await?;
            Ok(bytes_written)
        }
        .await;

        let bytes_written = match written {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Download of {} failed, removing partial file: {}", track.title, e);
                if let Err(remove_err) = tokio::fs::remove_file(&path).await {
                    debug!("Could not remove {}: {}", path.display(), remove_err);
                }
                return Err(e);
            }
        };

        info!("Downloaded {} to {}", track.title, path.display());

        Ok(DownloadOutcome {
            path,
            bytes_written,
        })
    }
}

/// Replaces characters file systems reject with `-`, collapses whitespace
/// runs to `_` and appends the audio extension.
pub fn safe_file_name(song_name: &str) -> String {
    let replaced: String = song_name
        .chars()
        .map(|c| if UNSAFE_FILENAME_CHARS.contains(&c) { '-' } else { c })
        .collect();

    let mut name = String::with_capacity(replaced.len());
    let mut in_whitespace = false;
    for c in replaced.chars() {
        if c.is_whitespace() {
            if !in_whitespace {
                name.push('_');
            }
            in_whitespace = true;
        } else {
            name.push(c);
            in_whitespace = false;
        }
    }

    format!("{}.{}", name, FILE_EXTENSION)
}
