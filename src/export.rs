use base64::{engine::general_purpose, Engine as _};
use rusqlite::Connection;
use sha2::{Digest, Sha256};
use std::io::Write;

use crate::covers::CoverStore;
use crate::error::Result;
use crate::models::{Backup, Book, BACKUP_VERSION};
use crate::normalize::*;
use crate::store;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Export header, in [`Book`] field order.
pub const EXPORT_COLUMNS: [&str; 28] = [
  "ID",
  TITLE,
  AUTHOR,
  PUBLISHER,
  PUBLISHED_DATE,
  FORMAT,
  SERIES,
  LANGUAGE,
  ISBN,
  LOCATION,
  SUMMARY,
  COMMENTS,
  TAGS,
  GENRES,
  BOOKSHELF,
  PAGES,
  VOLUME,
  PAGE_READ,
  PRICE,
  RATING,
  COPY_INDEX,
  ADDED_DATE,
  STARTED_READING_DATE,
  FINISHED_READING_DATE,
  READ,
  FAVORITE,
  IS_WISHLIST,
  ICON_PATH,
];

/// Writes every record as CSV: UTF-8 BOM, header row, one row per book.
/// Returns the number of records written.
pub fn export_csv<W: Write>(conn: &Connection, mut writer: W) -> Result<usize> {
  let books = store::list_all(conn)?;
  writer.write_all(UTF8_BOM)?;
  let mut csv_writer = csv::WriterBuilder::new()
    .has_headers(false)
    .from_writer(writer);
  csv_writer.write_record(EXPORT_COLUMNS)?;
  for book in &books {
    csv_writer.serialize(book)?;
  }
  csv_writer.flush()?;
  log::info!("exported {} book(s) to csv", books.len());
  Ok(books.len())
}

pub fn sha256_hex(bytes: &[u8]) -> String {
  let result = Sha256::digest(bytes);
  result.iter().map(|byte| format!("{:02x}", byte)).collect()
}

/// Collects every record plus the bytes of its internally stored cover.
/// Records that own a cover carry its bare filename in `Icon Path`.
pub fn build_backup(conn: &Connection, covers: &CoverStore) -> Result<Backup<Book>> {
  let mut books = store::list_all(conn)?;
  let mut backup = Backup {
    version: BACKUP_VERSION,
    created_at: Some(chrono::Utc::now()),
    books: Vec::new(),
    images: Default::default(),
    checksums: Default::default(),
  };

  for book in books.iter_mut() {
    let Some(reference) = book.icon_path.clone() else {
      continue;
    };
    let Some(filename) = CoverStore::filename_of(&reference) else {
      continue;
    };
    if !covers.exists(&reference) {
      log::warn!("book {} references missing cover {}", book.id, reference);
      continue;
    }
    let bytes = covers.read(&reference)?;
    backup
      .checksums
      .insert(filename.to_string(), sha256_hex(&bytes));
    backup
      .images
      .insert(filename.to_string(), general_purpose::STANDARD.encode(&bytes));
    book.icon_path = Some(filename.to_string());
  }
  backup.books = books;
  log::info!(
    "backup built: {} book(s), {} image(s)",
    backup.books.len(),
    backup.images.len()
  );
  Ok(backup)
}

pub fn write_backup<W: Write>(conn: &Connection, covers: &CoverStore, writer: W) -> Result<Backup<Book>> {
  let backup = build_backup(conn, covers)?;
  serde_json::to_writer_pretty(writer, &backup)?;
  Ok(backup)
}
