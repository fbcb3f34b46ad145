use rusqlite::{Connection, TransactionBehavior};
use serde_json::Value;

use crate::config::ImportOptions;
use crate::covers::{CoverBatch, CoverStore, ReferenceSource};
use crate::duplicates::{find_duplicate, DuplicateMatch};
use crate::error::{CatalogError, Result};
use crate::models::{ImportSummary, SkippedBook};
use crate::normalize::{normalize_row, RawRow};
use crate::store;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

fn strip_bom(input: &[u8]) -> &[u8] {
  input.strip_prefix(UTF8_BOM).unwrap_or(input)
}

/// `;` when the header line uses it and has no commas, `,` otherwise.
fn sniff_delimiter(input: &[u8]) -> u8 {
  let header = input.split(|byte| *byte == b'\n').next().unwrap_or(&[]);
  if header.contains(&b';') && !header.contains(&b',') {
    b';'
  } else {
    b','
  }
}

/// Reads a header-driven delimited file into raw rows. Cells past the
/// header width are dropped, missing trailing cells are absent.
pub fn read_csv_rows(input: &[u8], delimiter: Option<char>) -> Result<Vec<RawRow>> {
  let input = strip_bom(input);
  let delimiter = match delimiter {
    Some(ch) if ch.is_ascii() => ch as u8,
    _ => sniff_delimiter(input),
  };
  let mut reader = csv::ReaderBuilder::new()
    .delimiter(delimiter)
    .flexible(true)
    .from_reader(input);
  let headers = reader
    .headers()?
    .iter()
    .map(|header| header.trim().to_string())
    .collect::<Vec<_>>();

  let mut rows = Vec::new();
  for record in reader.records() {
    let record = record?;
    if record.iter().all(|cell| cell.trim().is_empty()) {
      continue;
    }
    let row = headers
      .iter()
      .zip(record.iter())
      .filter(|(header, _)| !header.is_empty())
      .map(|(header, cell)| (header.clone(), cell.to_string()))
      .collect::<RawRow>();
    rows.push(row);
  }
  Ok(rows)
}

/// Reads a JSON array of objects (or `{ "books": [...] }`) into raw rows.
/// Scalars are stringified so they go through the same normalizer as CSV
/// cells.
pub fn read_json_rows(input: &[u8]) -> Result<Vec<RawRow>> {
  let document: Value = serde_json::from_slice(strip_bom(input))?;
  let entries = match document {
    Value::Array(entries) => entries,
    Value::Object(mut map) => match map.remove("books") {
      Some(Value::Array(entries)) => entries,
      _ => vec![Value::Object(map)],
    },
    _ => vec![],
  };

  let rows = entries
    .into_iter()
    .filter_map(|entry| match entry {
      Value::Object(map) => Some(map),
      _ => None,
    })
    .map(|map| {
      map
        .into_iter()
        .filter_map(|(key, value)| json_cell(value).map(|cell| (key, cell)))
        .collect::<RawRow>()
    })
    .collect();
  Ok(rows)
}

fn json_cell(value: Value) -> Option<String> {
  match value {
    Value::String(text) => Some(text),
    Value::Number(number) => Some(number.to_string()),
    Value::Bool(flag) => Some(flag.to_string()),
    Value::Array(items) => {
      let parts = items
        .into_iter()
        .filter_map(json_cell)
        .collect::<Vec<_>>();
      Some(parts.join(", "))
    }
    Value::Null | Value::Object(_) => None,
  }
}

/// Runs the import pipeline over `rows` inside one immediate transaction.
///
/// Duplicates are counted and reported, rows without a title or author are
/// dropped silently. Any error rolls back every insert of the batch and
/// removes the covers it stored.
pub fn import_rows<I>(
  conn: &mut Connection,
  covers: &CoverStore,
  options: &ImportOptions,
  rows: I,
) -> Result<ImportSummary>
where
  I: IntoIterator<Item = Result<RawRow>>,
{
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
  let mut batch = CoverBatch::new(covers);
  let mut summary = ImportSummary::default();

  for (index, row) in rows.into_iter().enumerate() {
    let row = row?;
    let mut draft = normalize_row(&row, options);

    if let Some(found) = find_duplicate(&tx, &draft)? {
      let rule = match &found {
        DuplicateMatch::Isbn(_) => "isbn",
        DuplicateMatch::TitleAuthor(_) => "title+author",
      };
      log::debug!(
        "row {} skipped as duplicate of book {} ({})",
        index + 1,
        found.existing().id,
        rule
      );
      summary.skipped_books_count += 1;
      summary.skipped_books.push(SkippedBook {
        title: draft.title.clone(),
        author: draft.author.clone(),
      });
      continue;
    }

    if !draft.has_required_fields() {
      log::debug!("row {} skipped: missing title or author", index + 1);
      continue;
    }

    let reference = draft.image_url.take().or_else(|| draft.icon_path.take());
    draft.icon_path = match reference {
      Some(reference) => batch.resolve_reference(&reference, ReferenceSource::Import)?,
      None => None,
    };

    store::insert_book(&tx, &draft)?;
    summary.new_books_count += 1;
  }

  if summary.new_books_count == 0 && summary.skipped_books_count == 0 {
    return Err(CatalogError::NoValidRows);
  }

  tx.commit()?;
  let stored_covers = batch.written().len();
  batch.commit();
  log::info!(
    "import finished: {} new, {} skipped, {} cover(s) stored",
    summary.new_books_count,
    summary.skipped_books_count,
    stored_covers
  );
  Ok(summary)
}

pub fn import_csv(
  conn: &mut Connection,
  covers: &CoverStore,
  options: &ImportOptions,
  input: &[u8],
) -> Result<ImportSummary> {
  let rows = read_csv_rows(input, options.delimiter)?;
  import_rows(conn, covers, options, rows.into_iter().map(Ok))
}

pub fn import_json(
  conn: &mut Connection,
  covers: &CoverStore,
  options: &ImportOptions,
  input: &[u8],
) -> Result<ImportSummary> {
  let rows = read_json_rows(input)?;
  import_rows(conn, covers, options, rows.into_iter().map(Ok))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::db::open_in_memory;
  use crate::models::BookDraft;
  use std::time::Duration;

  fn setup() -> (tempfile::TempDir, Connection, CoverStore) {
    let dir = tempfile::tempdir().unwrap();
    let covers = CoverStore::new(dir.path().join("covers"), Duration::from_secs(2));
    (dir, open_in_memory().unwrap(), covers)
  }

  #[test]
  fn csv_rows_with_bom_and_semicolons() {
    let input = "\u{FEFF}Title;Author;Rating\nLalka;Bolesław Prus;4,5\n;;\n";
    let rows = read_csv_rows(input.as_bytes(), None).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["Title"], "Lalka");
    assert_eq!(rows[0]["Rating"], "4,5");
  }

  #[test]
  fn csv_quoted_fields_keep_commas() {
    let input = "Title,Author,Tags\n\"Dune, Part One\",Frank Herbert,\"sf, classic\"\nShort,Only\n";
    let rows = read_csv_rows(input.as_bytes(), None).unwrap();
    assert_eq!(rows[0]["Title"], "Dune, Part One");
    assert_eq!(rows[0]["Tags"], "sf, classic");
    assert!(!rows[1].contains_key("Tags"));
  }

  #[test]
  fn json_values_are_stringified() {
    let input = r#"[{"Title": "Dune", "Author": "Frank Herbert", "Pages": 412, "Read": true, "Tags": ["sf", "classic"], "Series": null}]"#;
    let rows = read_json_rows(input.as_bytes()).unwrap();
    assert_eq!(rows[0]["Pages"], "412");
    assert_eq!(rows[0]["Read"], "true");
    assert_eq!(rows[0]["Tags"], "sf, classic");
    assert!(!rows[0].contains_key("Series"));

    let wrapped = r#"{"books": [{"Title": "Dune", "Author": "Frank Herbert"}]}"#;
    assert_eq!(read_json_rows(wrapped.as_bytes()).unwrap().len(), 1);
  }

  #[test]
  fn later_rows_see_earlier_inserts() {
    let (_dir, mut conn, covers) = setup();
    let input = "Title,Author,ISBN\nA,X,978-1\nB,Y,9781\nA,X,\n";
    let summary = import_csv(&mut conn, &covers, &ImportOptions::default(), input.as_bytes()).unwrap();
    assert_eq!(summary.new_books_count, 1);
    assert_eq!(summary.skipped_books_count, 2);
    assert_eq!(summary.skipped_books[0].title, "B");
    assert_eq!(store::count_books(&conn).unwrap(), 1);
  }

  #[test]
  fn rows_missing_required_fields_are_not_counted() {
    let (_dir, mut conn, covers) = setup();
    let input = "Title,Author\nDune,\n,Frank Herbert\nDune,Frank Herbert\n";
    let summary = import_csv(&mut conn, &covers, &ImportOptions::default(), input.as_bytes()).unwrap();
    assert_eq!(summary.new_books_count, 1);
    assert_eq!(summary.skipped_books_count, 0);
  }

  #[test]
  fn file_without_valid_rows_fails() {
    let (_dir, mut conn, covers) = setup();
    let err = import_csv(&mut conn, &covers, &ImportOptions::default(), b"Title,Author\n,\n")
      .unwrap_err();
    assert!(matches!(err, CatalogError::NoValidRows));
    let err = import_csv(&mut conn, &covers, &ImportOptions::default(), b"").unwrap_err();
    assert!(matches!(err, CatalogError::NoValidRows));
  }

  #[test]
  fn failed_batch_removes_stored_covers() {
    let (_dir, mut conn, covers) = setup();
    let source = covers.store(b"cover", Some("jpg")).unwrap();
    conn
      .execute_batch(
        "CREATE TRIGGER fail_on_boom BEFORE INSERT ON books WHEN NEW.title = 'Boom'
         BEGIN SELECT RAISE(ABORT, 'injected fault'); END;",
      )
      .unwrap();
    let rows = vec![
      Ok(RawRow::from([
        ("Title".to_string(), "Fine".to_string()),
        ("Author".to_string(), "X".to_string()),
        ("Image Url".to_string(), source.clone()),
      ])),
      Ok(RawRow::from([
        ("Title".to_string(), "Boom".to_string()),
        ("Author".to_string(), "Y".to_string()),
      ])),
    ];
    let err = import_rows(&mut conn, &covers, &ImportOptions::default(), rows).unwrap_err();
    assert!(matches!(err, CatalogError::Database(_)));
    assert_eq!(store::count_books(&conn).unwrap(), 0);
    let remaining = std::fs::read_dir(covers.root()).unwrap().count();
    assert_eq!(remaining, 1, "only the pre-existing source cover should remain");
  }

  #[test]
  fn imported_cover_reference_becomes_internal_copy() {
    let (_dir, mut conn, covers) = setup();
    let source = covers.store(b"cover", Some("png")).unwrap();
    let rows = vec![Ok(RawRow::from([
      ("Title".to_string(), "Dune".to_string()),
      ("Author".to_string(), "Frank Herbert".to_string()),
      ("Icon Path".to_string(), source.clone()),
    ]))];
    import_rows(&mut conn, &covers, &ImportOptions::default(), rows).unwrap();
    let book = store::find_by_title_author(&conn, "Dune", "Frank Herbert").unwrap().unwrap();
    let icon = book.icon_path.unwrap();
    assert_ne!(icon, source);
    assert_eq!(covers.read(&icon).unwrap(), b"cover");
  }

  #[test]
  fn local_file_paths_in_rows_are_not_read() {
    let (dir, mut conn, covers) = setup();
    let secret = dir.path().join("secret.txt");
    std::fs::write(&secret, b"password=hunter2").unwrap();
    let input = format!("Title,Author,Image Url\nX,Y,{}\n", secret.display());
    let summary = import_csv(&mut conn, &covers, &ImportOptions::default(), input.as_bytes()).unwrap();
    assert_eq!(summary.new_books_count, 1);
    let book = store::find_by_title_author(&conn, "X", "Y").unwrap().unwrap();
    assert_eq!(book.icon_path, None);
    assert!(!covers.root().exists());
  }

  #[test]
  fn existing_record_is_never_modified() {
    let (_dir, mut conn, covers) = setup();
    let existing = store::insert_book(
      &conn,
      &BookDraft {
        isbn: Some("123".to_string()),
        ..BookDraft::new("Dune", "Frank Herbert")
      },
    )
    .unwrap();
    let input = "Title,Author,ISBN,Rating\nDune (2nd ed),F. Herbert,1-2-3,5\n";
    import_csv(&mut conn, &covers, &ImportOptions::default(), input.as_bytes()).unwrap();
    let after = store::get_book(&conn, existing.id).unwrap().unwrap();
    assert_eq!(after, existing);
  }
}
