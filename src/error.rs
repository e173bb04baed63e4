use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("plist parsing failed: {0}")]
    Plist(#[from] plist::Error),

    #[error("download failed: {0}")]
    Download(String),

    #[error("no download link found on vendor page")]
    LinkNotFound,

    #[error("failed to open disk image: {0}")]
    Mount(String),

    #[error("version metadata not found: {0}")]
    MetadataNotFound(String),

    #[error("release publishing failed: {0}")]
    Publish(String),
}

pub type Result<T> = std::result::Result<T, Error>;
