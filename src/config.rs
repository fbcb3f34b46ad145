use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DATA_DIR_ENV: &str = "BOOKCASE_DATA_DIR";
const CONFIG_FILE: &str = "config.toml";

/// Library settings, read from `config.toml` inside the data directory.
///
/// Every field has a default so an empty or missing file is valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  #[serde(skip)]
  pub data_dir: PathBuf,
  pub database_file: String,
  pub covers_dir: String,
  pub http_timeout_secs: u64,
  pub reading_goal: Option<u32>,
  pub import: ImportOptions,
}

/// Per-call import settings. Passed explicitly into the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportOptions {
  /// Localized "yes" accepted for the `Read` and `Favorite` columns.
  pub affirmative_token: String,
  /// Shelf name that marks a book as wishlisted.
  pub wishlist_shelf: String,
  /// Forces a delimiter instead of sniffing it from the header line.
  pub delimiter: Option<char>,
}

impl Default for ImportOptions {
  fn default() -> Self {
    Self {
      affirmative_token: "tak".to_string(),
      wishlist_shelf: "Do kupienia".to_string(),
      delimiter: None,
    }
  }
}

impl Default for Config {
  fn default() -> Self {
    Self {
      data_dir: default_data_dir(),
      database_file: "bookcase.db".to_string(),
      covers_dir: "covers".to_string(),
      http_timeout_secs: 10,
      reading_goal: None,
      import: ImportOptions::default(),
    }
  }
}

impl Config {
  /// Loads `config.toml` from `data_dir` (or the default data dir), falling
  /// back to defaults when the file does not exist.
  pub fn load(data_dir: Option<&Path>) -> Result<Self> {
    let data_dir = data_dir
      .map(Path::to_path_buf)
      .or_else(|| std::env::var_os(DATA_DIR_ENV).map(PathBuf::from))
      .unwrap_or_else(default_data_dir);
    let config_path = data_dir.join(CONFIG_FILE);
    let mut config = if config_path.exists() {
      let raw = std::fs::read_to_string(&config_path)?;
      log::debug!("loading config from {}", config_path.display());
      toml::from_str::<Config>(&raw)?
    } else {
      Config::default()
    };
    config.data_dir = data_dir;
    Ok(config)
  }

  /// Config rooted at an explicit directory, ignoring any file on disk.
  pub fn in_dir(data_dir: impl Into<PathBuf>) -> Self {
    Self {
      data_dir: data_dir.into(),
      ..Config::default()
    }
  }

  pub fn database_path(&self) -> PathBuf {
    self.data_dir.join(&self.database_file)
  }

  pub fn covers_path(&self) -> PathBuf {
    self.data_dir.join(&self.covers_dir)
  }
}

fn default_data_dir() -> PathBuf {
  dirs::data_dir()
    .unwrap_or_else(|| PathBuf::from("."))
    .join("bookcase")
}
