use thiserror::Error;

pub type Result<T> = std::result::Result<T, CatalogError>;

#[derive(Debug, Error)]
pub enum CatalogError {
  #[error("database error: {0}")]
  Database(#[from] rusqlite::Error),
  #[error("i/o error: {0}")]
  Io(#[from] std::io::Error),
  #[error("csv error: {0}")]
  Csv(#[from] csv::Error),
  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),
  #[error("invalid base64 image data: {0}")]
  Base64(#[from] base64::DecodeError),
  #[error("invalid config file: {0}")]
  Config(#[from] toml::de::Error),
  #[error("http request failed: {0}")]
  Http(#[from] reqwest::Error),
  #[error("no valid rows found in the imported file")]
  NoValidRows,
  #[error("book {0} not found")]
  BookNotFound(i64),
  #[error("invalid book: {0}")]
  InvalidBook(String),
  #[error("invalid asset name: {0}")]
  InvalidAssetName(String),
  #[error("checksum mismatch for image {0}")]
  ChecksumMismatch(String),
}
