use base64::{engine::general_purpose, Engine as _};
use rusqlite::{Connection, TransactionBehavior};
use std::collections::HashMap;

use crate::covers::{extension_of, CoverBatch, CoverStore, NamedWrite};
use crate::error::{CatalogError, Result};
use crate::export::sha256_hex;
use crate::models::{Backup, BookDraft, RestoreSummary};
use crate::store;

fn is_bare_filename(value: &str) -> bool {
  !value.is_empty() && !value.contains(['/', '\\']) && !value.contains("://")
}

/// Restores a full backup: cover files first, then every record as a new
/// row. No duplicate resolution is done.
///
/// Record inserts share one transaction. If it fails, cover files this call
/// created are removed again. Existing files are never overwritten: an image
/// whose name is taken by different bytes is stored under a fresh name and
/// its records point there.
pub fn restore_backup(
  conn: &mut Connection,
  covers: &CoverStore,
  backup: Backup<BookDraft>,
) -> Result<RestoreSummary> {
  let mut decoded = Vec::with_capacity(backup.images.len());
  for (filename, encoded) in &backup.images {
    let bytes = general_purpose::STANDARD.decode(encoded.trim())?;
    if let Some(expected) = backup.checksums.get(filename) {
      if !expected.eq_ignore_ascii_case(&sha256_hex(&bytes)) {
        return Err(CatalogError::ChecksumMismatch(filename.clone()));
      }
    }
    decoded.push((filename.as_str(), bytes));
  }

  let mut batch = CoverBatch::new(covers);
  let mut anchors: HashMap<&str, String> = HashMap::new();
  for (filename, bytes) in &decoded {
    let reference = match covers.write_named(filename, bytes)? {
      NamedWrite::Created(reference) => batch.track(reference),
      NamedWrite::Existing(reference) => reference,
      NamedWrite::Conflict => {
        let reference = covers.store(bytes, extension_of(filename).as_deref())?;
        log::info!("backup image {} restored as {}", filename, reference);
        batch.track(reference)
      }
    };
    anchors.insert(*filename, reference);
  }

  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
  let mut restored = 0usize;
  for mut draft in backup.books {
    draft.image_url = None;
    if let Some(icon) = draft.icon_path.as_deref() {
      if is_bare_filename(icon) {
        let anchored = anchors
          .get(icon)
          .cloned()
          .unwrap_or_else(|| CoverStore::asset_ref(icon));
        draft.icon_path = Some(anchored);
      }
    }
    store::insert_book(&tx, &draft)?;
    restored += 1;
  }
  tx.commit()?;
  batch.commit();

  let summary = RestoreSummary {
    restored_books_count: restored,
    restored_images_count: decoded.len(),
  };
  log::info!(
    "restore finished: {} book(s), {} image(s)",
    summary.restored_books_count,
    summary.restored_images_count
  );
  Ok(summary)
}

pub fn restore_json(conn: &mut Connection, covers: &CoverStore, input: &[u8]) -> Result<RestoreSummary> {
  let input = input.strip_prefix(b"\xEF\xBB\xBF".as_slice()).unwrap_or(input);
  let backup: Backup<BookDraft> = serde_json::from_slice(input)?;
  restore_backup(conn, covers, backup)
}
