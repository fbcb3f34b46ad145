use rusqlite::{Connection, TransactionBehavior};
use std::io::Write;
use std::time::Duration;

pub mod config;
pub mod covers;
pub mod db;
pub mod duplicates;
pub mod error;
pub mod export;
pub mod import;
pub mod models;
pub mod normalize;
pub mod restore;
pub mod search;
pub mod stats;
pub mod store;

pub use config::{Config, ImportOptions};
pub use covers::CoverStore;
pub use error::{CatalogError, Result};
pub use models::{Backup, Book, BookDraft, BookFilter, BookPatch, ImportSummary, RestoreSummary, SkippedBook};
pub use search::MetadataCandidate;
pub use stats::LibraryStats;

use covers::{CoverBatch, ReferenceSource};

/// Manual-entry ratings are kept within [0, 5]. Imports are not clamped.
pub fn clamp_rating(rating: f64) -> f64 {
  rating.clamp(0.0, 5.0)
}

/// One opened catalog: the SQLite store plus its cover directory.
///
/// Batch operations take `&mut self`, so a single handle never runs two
/// imports or restores at once.
pub struct Library {
  conn: Connection,
  covers: CoverStore,
  config: Config,
}

impl Library {
  pub fn open(config: Config) -> Result<Self> {
    let conn = db::open_db(&config.database_path())?;
    Ok(Self::with_connection(conn, config))
  }

  /// In-memory records with covers under `config.covers_path()`.
  pub fn open_in_memory(config: Config) -> Result<Self> {
    let conn = db::open_in_memory()?;
    Ok(Self::with_connection(conn, config))
  }

  fn with_connection(conn: Connection, config: Config) -> Self {
    let covers = CoverStore::new(
      config.covers_path(),
      Duration::from_secs(config.http_timeout_secs),
    );
    Self { conn, covers, config }
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  pub fn connection(&self) -> &Connection {
    &self.conn
  }

  pub fn covers(&self) -> &CoverStore {
    &self.covers
  }

  pub fn import_csv(&mut self, input: &[u8]) -> Result<ImportSummary> {
    let options = self.config.import.clone();
    self.import_csv_with(input, &options)
  }

  pub fn import_csv_with(&mut self, input: &[u8], options: &ImportOptions) -> Result<ImportSummary> {
    import::import_csv(&mut self.conn, &self.covers, options, input)
  }

  pub fn import_json(&mut self, input: &[u8]) -> Result<ImportSummary> {
    let options = self.config.import.clone();
    import::import_json(&mut self.conn, &self.covers, &options, input)
  }

  /// Imports search results as if they were rows of an uploaded file.
  pub fn import_candidates(&mut self, candidates: Vec<MetadataCandidate>) -> Result<ImportSummary> {
    let options = self.config.import.clone();
    let rows = candidates
      .into_iter()
      .map(|candidate| Ok(candidate.into_raw_row()));
    import::import_rows(&mut self.conn, &self.covers, &options, rows)
  }

  pub fn export_csv<W: Write>(&self, writer: W) -> Result<usize> {
    export::export_csv(&self.conn, writer)
  }

  pub fn backup<W: Write>(&self, writer: W) -> Result<Backup<Book>> {
    export::write_backup(&self.conn, &self.covers, writer)
  }

  pub fn restore_json(&mut self, input: &[u8]) -> Result<RestoreSummary> {
    restore::restore_json(&mut self.conn, &self.covers, input)
  }

  pub fn get_book(&self, id: i64) -> Result<Option<Book>> {
    store::get_book(&self.conn, id)
  }

  pub fn list_books(&self, filter: &BookFilter) -> Result<Vec<Book>> {
    store::list_books(&self.conn, filter)
  }

  /// Manual entry. Title and author are required, the rating is clamped and
  /// `Image Url` (or a given `Icon Path`) becomes a cover owned by the book.
  pub fn add_book(&mut self, mut draft: BookDraft) -> Result<Book> {
    if !draft.has_required_fields() {
      return Err(CatalogError::InvalidBook("title and author are required".to_string()));
    }
    draft.rating = draft.rating.map(clamp_rating);

    let mut batch = CoverBatch::new(&self.covers);
    let reference = draft.image_url.take().or_else(|| draft.icon_path.take());
    draft.icon_path = match reference {
      Some(reference) => batch.resolve_reference(&reference, ReferenceSource::Manual)?,
      None => None,
    };
    let book = store::insert_book(&self.conn, &draft)?;
    batch.commit();
    log::info!("book {} added: {}", book.id, book.title);
    Ok(book)
  }

  /// Edits a book. A changed `Image Url` replaces the cover: the new asset
  /// is stored, the record updated, then the old asset deleted. An empty
  /// `Image Url` removes the cover.
  pub fn update_book(&mut self, id: i64, mut patch: BookPatch) -> Result<Book> {
    validate_patch(&patch)?;
    patch.rating = patch.rating.map(clamp_rating);
    let image_url = patch.image_url.take();

    let tx = self.conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let current = store::get_book(&tx, id)?.ok_or(CatalogError::BookNotFound(id))?;
    let mut batch = CoverBatch::new(&self.covers);
    let mut released: Option<String> = None;

    if let Some(image_url) = image_url.as_deref().map(str::trim) {
      if current.icon_path.as_deref() != Some(image_url) {
        let replacement = if image_url.is_empty() {
          None
        } else {
          batch.resolve_reference(image_url, ReferenceSource::Manual)?
        };
        if replacement.is_some() || image_url.is_empty() {
          store::set_icon_path(&tx, id, replacement.as_deref())?;
          released = current.icon_path.clone();
        }
      }
    }

    let book = store::update_book(&tx, id, &patch)?;
    tx.commit()?;
    batch.commit();
    if let Some(old) = released {
      self.release_cover(&old, id);
    }
    Ok(book)
  }

  /// Applies one patch to many books in a single transaction. Covers cannot
  /// be changed in bulk.
  pub fn bulk_update(&mut self, ids: &[i64], mut patch: BookPatch) -> Result<Vec<Book>> {
    if patch.image_url.is_some() {
      return Err(CatalogError::InvalidBook("covers cannot be bulk updated".to_string()));
    }
    validate_patch(&patch)?;
    patch.rating = patch.rating.map(clamp_rating);

    let tx = self.conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let mut updated = Vec::with_capacity(ids.len());
    for id in ids {
      updated.push(store::update_book(&tx, *id, &patch)?);
    }
    tx.commit()?;
    log::info!("bulk update applied to {} book(s)", updated.len());
    Ok(updated)
  }

  pub fn delete_book(&mut self, id: i64) -> Result<bool> {
    Ok(self.delete_books(&[id])? == 1)
  }

  /// Deletes records, then releases their covers once the deletion is
  /// committed. Unknown ids are ignored.
  pub fn delete_books(&mut self, ids: &[i64]) -> Result<usize> {
    let tx = self.conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let mut removed = vec![];
    for id in ids {
      if let Some(book) = store::delete_book(&tx, *id)? {
        removed.push(book);
      }
    }
    tx.commit()?;
    for book in &removed {
      if let Some(icon) = book.icon_path.as_deref() {
        self.release_cover(icon, book.id);
      }
    }
    log::info!("deleted {} book(s)", removed.len());
    Ok(removed.len())
  }

  /// Deletes a cover no record references any more. Runs after the owning
  /// change is committed, so failures are only logged.
  fn release_cover(&self, icon: &str, book_id: i64) {
    match store::count_icon_references(&self.conn, icon) {
      Ok(0) => {
        if let Err(err) = self.covers.delete(icon) {
          log::warn!("failed to delete cover {} of book {}: {}", icon, book_id, err);
        }
      }
      Ok(count) => log::debug!("cover {} still used by {} book(s), kept", icon, count),
      Err(err) => log::warn!("could not check references of cover {}: {}", icon, err),
    }
  }

  /// `goal` overrides the configured yearly reading goal.
  pub fn stats(&self, goal: Option<u32>) -> Result<LibraryStats> {
    let goal = goal.or(self.config.reading_goal);
    stats::library_stats(&self.conn, goal, chrono::Local::now().date_naive())
  }

  pub fn search_metadata(&self, query: &str) -> Vec<MetadataCandidate> {
    search::MetadataClient::new(Duration::from_secs(self.config.http_timeout_secs)).search(query)
  }
}

fn validate_patch(patch: &BookPatch) -> Result<()> {
  let blank = |value: &Option<String>| value.as_deref().map(|text| text.trim().is_empty()).unwrap_or(false);
  if blank(&patch.title) || blank(&patch.author) {
    return Err(CatalogError::InvalidBook("title and author cannot be empty".to_string()));
  }
  Ok(())
}
