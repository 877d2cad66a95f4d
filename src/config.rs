use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::error::{AppError, Result};

pub const DEFAULT_API_BASE: &str = "https://jiosaavan-api-2-harsh-patel.vercel.app/api";
pub const DEFAULT_CATALOG_BASE: &str = "https://jiosavan-api-with-playlist.vercel.app/api";
pub const DEFAULT_MODULES_URL: &str = "https://jiosaavan-harsh-patel.vercel.app";
pub const DEFAULT_DOWNLOAD_SERVER: &str =
    "https://the-ultimate-songs-download-server-python.vercel.app/generate-audio";

#[derive(Debug, Clone)]
pub struct Config {
    /// Song search and suggestions.
    pub api_base: String,
    /// Album, playlist and artist endpoints.
    pub catalog_base: String,
    pub modules_url: String,
    pub download_server: String,
    pub library_dir: PathBuf,
    pub download_dir: PathBuf,
    pub request_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            catalog_base: DEFAULT_CATALOG_BASE.to_string(),
            modules_url: DEFAULT_MODULES_URL.to_string(),
            download_server: DEFAULT_DOWNLOAD_SERVER.to_string(),
            library_dir: PathBuf::from(".library"),
            download_dir: PathBuf::from("downloads"),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        let request_timeout = match std::env::var("REQUEST_TIMEOUT_SECS") {
            Ok(raw) => {
                let secs: u64 = raw.trim().parse().map_err(|_| {
                    AppError::Config(format!("REQUEST_TIMEOUT_SECS is not a number: {}", raw))
                })?;
                Duration::from_secs(secs)
            }
            Err(_) => defaults.request_timeout,
        };

        let config = Self {
            api_base: env_or("SAAVN_API_BASE", defaults.api_base),
            catalog_base: env_or("SAAVN_CATALOG_BASE", defaults.catalog_base),
            modules_url: env_or("SAAVN_MODULES_URL", defaults.modules_url),
            download_server: env_or("DOWNLOAD_SERVER_URL", defaults.download_server),
            library_dir: std::env::var("LIBRARY_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.library_dir),
            download_dir: std::env::var("DOWNLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.download_dir),
            request_timeout,
        };

        if let Some(first) = config.get_missing_config().first() {
            return Err(AppError::Config(format!("{} is not a valid URL", first)));
        }

        Ok(config)
    }

    /// Names of the URL settings that are empty or unparsable.
    pub fn get_missing_config(&self) -> Vec<String> {
        let mut missing = Vec::new();

        let urls = [
            ("SAAVN_API_BASE", &self.api_base),
            ("SAAVN_CATALOG_BASE", &self.catalog_base),
            ("SAAVN_MODULES_URL", &self.modules_url),
            ("DOWNLOAD_SERVER_URL", &self.download_server),
        ];

        for (name, value) in urls {
            if Url::parse(value).is_err() {
                missing.push(name.to_string());
            }
        }

        missing
    }
}

fn env_or(name: &str, default: String) -> String {
    std::env::var(name)
        .map(|v| v.trim_end_matches('/').to_string())
        .unwrap_or(default)
}
