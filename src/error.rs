use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Catalog API error: {0}")]
    CatalogApi(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Audio transport error: {0}")]
    Transport(String),

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Request cancelled: {0}")]
    Cancelled(String),

    #[error("A transport event relay is already attached")]
    RelayActive,
}

pub type Result<T> = std::result::Result<T, AppError>;
