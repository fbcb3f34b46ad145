use chrono::NaiveDate;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use crate::duplicates::normalize_isbn;
use crate::error::{CatalogError, Result};
use crate::models::{Book, BookDraft, BookFilter, BookPatch};

const BOOK_COLUMNS: &str = "id, title, author, publisher, published_date, format, series, language, \
  isbn, location, summary, comments, tags, genres, bookshelf, pages, volume, page_read, price, \
  rating, copy_index, added_date, started_reading_date, finished_reading_date, read, favorite, \
  is_wishlist, icon_path";

fn map_book(row: &Row<'_>) -> rusqlite::Result<Book> {
  Ok(Book {
    id: row.get(0)?,
    title: row.get(1)?,
    author: row.get(2)?,
    publisher: row.get(3)?,
    published_date: row.get(4)?,
    format: row.get(5)?,
    series: row.get(6)?,
    language: row.get(7)?,
    isbn: row.get(8)?,
    location: row.get(9)?,
    summary: row.get(10)?,
    comments: row.get(11)?,
    tags: row.get(12)?,
    genres: row.get(13)?,
    bookshelf: row.get(14)?,
    pages: row.get(15)?,
    volume: row.get(16)?,
    page_read: row.get(17)?,
    price: row.get(18)?,
    rating: row.get(19)?,
    copy_index: row.get(20)?,
    added_date: row.get(21)?,
    started_reading_date: row.get(22)?,
    finished_reading_date: row.get(23)?,
    read: row.get(24)?,
    favorite: row.get(25)?,
    is_wishlist: row.get(26)?,
    icon_path: row.get(27)?,
  })
}

fn text_value(value: &Option<String>) -> Option<Value> {
  value
    .as_deref()
    .map(str::trim)
    .filter(|value| !value.is_empty())
    .map(|value| Value::Text(value.to_string()))
}

fn date_value(date: NaiveDate) -> Value {
  Value::Text(date.format("%Y-%m-%d").to_string())
}

fn isbn_key_value(isbn: &str) -> Value {
  let key = normalize_isbn(isbn);
  if key.is_empty() {
    Value::Null
  } else {
    Value::Text(key)
  }
}

/// Column list for an insert. Empty fields are left out so the table
/// defaults apply.
fn draft_columns(draft: &BookDraft) -> Vec<(&'static str, Value)> {
  let mut columns: Vec<(&'static str, Value)> = vec![
    ("title", Value::Text(draft.title.trim().to_string())),
    ("author", Value::Text(draft.author.trim().to_string())),
  ];
  let texts = [
    ("publisher", &draft.publisher),
    ("published_date", &draft.published_date),
    ("format", &draft.format),
    ("series", &draft.series),
    ("language", &draft.language),
    ("isbn", &draft.isbn),
    ("location", &draft.location),
    ("summary", &draft.summary),
    ("comments", &draft.comments),
    ("tags", &draft.tags),
    ("genres", &draft.genres),
    ("bookshelf", &draft.bookshelf),
    ("icon_path", &draft.icon_path),
  ];
  for (name, value) in texts {
    if let Some(value) = text_value(value) {
      columns.push((name, value));
    }
  }
  if let Some(isbn) = draft.isbn.as_deref() {
    let key = isbn_key_value(isbn);
    if key != Value::Null {
      columns.push(("isbn_key", key));
    }
  }
  let numbers = [
    ("pages", draft.pages),
    ("volume", draft.volume),
    ("page_read", draft.page_read),
    ("price", draft.price),
    ("rating", draft.rating),
    ("copy_index", draft.copy_index),
  ];
  for (name, value) in numbers {
    if let Some(value) = value {
      columns.push((name, Value::Real(value)));
    }
  }
  let dates = [
    ("added_date", draft.added_date),
    ("started_reading_date", draft.started_reading_date),
    ("finished_reading_date", draft.finished_reading_date),
  ];
  for (name, value) in dates {
    if let Some(value) = value {
      columns.push((name, date_value(value)));
    }
  }
  columns.push(("read", Value::Integer(draft.read as i64)));
  columns.push(("favorite", Value::Integer(draft.favorite as i64)));
  columns.push(("is_wishlist", Value::Integer(draft.is_wishlist as i64)));
  columns
}

/// Column assignments for an update. An empty string clears an optional
/// text column.
fn patch_columns(patch: &BookPatch) -> Vec<(&'static str, Value)> {
  let mut columns: Vec<(&'static str, Value)> = vec![];
  if let Some(title) = &patch.title {
    columns.push(("title", Value::Text(title.trim().to_string())));
  }
  if let Some(author) = &patch.author {
    columns.push(("author", Value::Text(author.trim().to_string())));
  }
  let texts = [
    ("publisher", &patch.publisher),
    ("published_date", &patch.published_date),
    ("format", &patch.format),
    ("series", &patch.series),
    ("language", &patch.language),
    ("isbn", &patch.isbn),
    ("location", &patch.location),
    ("summary", &patch.summary),
    ("comments", &patch.comments),
    ("tags", &patch.tags),
    ("genres", &patch.genres),
    ("bookshelf", &patch.bookshelf),
  ];
  for (name, value) in texts {
    if value.is_some() {
      columns.push((name, text_value(value).unwrap_or(Value::Null)));
    }
  }
  if let Some(isbn) = &patch.isbn {
    columns.push(("isbn_key", isbn_key_value(isbn)));
  }
  let numbers = [
    ("pages", patch.pages),
    ("volume", patch.volume),
    ("page_read", patch.page_read),
    ("price", patch.price),
    ("rating", patch.rating),
    ("copy_index", patch.copy_index),
  ];
  for (name, value) in numbers {
    if let Some(value) = value {
      columns.push((name, Value::Real(value)));
    }
  }
  let dates = [
    ("started_reading_date", patch.started_reading_date),
    ("finished_reading_date", patch.finished_reading_date),
  ];
  for (name, value) in dates {
    if let Some(value) = value {
      columns.push((name, date_value(value)));
    }
  }
  let flags = [
    ("read", patch.read),
    ("favorite", patch.favorite),
    ("is_wishlist", patch.is_wishlist),
  ];
  for (name, value) in flags {
    if let Some(value) = value {
      columns.push((name, Value::Integer(value as i64)));
    }
  }
  columns
}

pub fn insert_book(conn: &Connection, draft: &BookDraft) -> Result<Book> {
  let columns = draft_columns(draft);
  let names = columns.iter().map(|(name, _)| *name).collect::<Vec<_>>();
  let placeholders = (1..=columns.len())
    .map(|index| format!("?{}", index))
    .collect::<Vec<_>>();
  let sql = format!(
    "INSERT INTO books ({}) VALUES ({})",
    names.join(", "),
    placeholders.join(", ")
  );
  conn.execute(&sql, params_from_iter(columns.into_iter().map(|(_, value)| value)))?;
  let id = conn.last_insert_rowid();
  get_book(conn, id)?.ok_or(CatalogError::BookNotFound(id))
}

pub fn get_book(conn: &Connection, id: i64) -> Result<Option<Book>> {
  let book = conn
    .query_row(
      &format!("SELECT {} FROM books WHERE id = ?1", BOOK_COLUMNS),
      params![id],
      map_book,
    )
    .optional()?;
  Ok(book)
}

/// First stored book whose ISBN, with hyphens and whitespace removed, equals
/// the normalized form of `isbn`.
pub fn find_by_normalized_isbn(conn: &Connection, isbn: &str) -> Result<Option<Book>> {
  let key = normalize_isbn(isbn);
  if key.is_empty() {
    return Ok(None);
  }
  let book = conn
    .query_row(
      &format!(
        "SELECT {} FROM books WHERE isbn_key = ?1 ORDER BY id LIMIT 1",
        BOOK_COLUMNS
      ),
      params![key],
      map_book,
    )
    .optional()?;
  Ok(book)
}

/// Exact, case-sensitive title and author match.
pub fn find_by_title_author(conn: &Connection, title: &str, author: &str) -> Result<Option<Book>> {
  let book = conn
    .query_row(
      &format!(
        "SELECT {} FROM books WHERE title = ?1 AND author = ?2 ORDER BY id LIMIT 1",
        BOOK_COLUMNS
      ),
      params![title, author],
      map_book,
    )
    .optional()?;
  Ok(book)
}

pub fn list_books(conn: &Connection, filter: &BookFilter) -> Result<Vec<Book>> {
  let mut clauses: Vec<String> = vec![];
  let mut values: Vec<Value> = vec![];
  let flags = [
    ("is_wishlist", filter.wishlist),
    ("read", filter.read),
    ("favorite", filter.favorite),
  ];
  for (name, value) in flags {
    if let Some(value) = value {
      values.push(Value::Integer(value as i64));
      clauses.push(format!("{} = ?{}", name, values.len()));
    }
  }
  if let Some(shelf) = filter.shelf.as_deref() {
    values.push(Value::Text(shelf.to_string()));
    clauses.push(format!("bookshelf = ?{} COLLATE NOCASE", values.len()));
  }
  if let Some(text) = filter.text.as_deref().map(str::trim).filter(|text| !text.is_empty()) {
    values.push(Value::Text(format!("%{}%", text)));
    let index = values.len();
    clauses.push(format!(
      "(title LIKE ?{0} OR author LIKE ?{0} OR series LIKE ?{0} OR isbn LIKE ?{0})",
      index
    ));
  }
  let where_clause = if clauses.is_empty() {
    String::new()
  } else {
    format!(" WHERE {}", clauses.join(" AND "))
  };
  let mut stmt = conn.prepare(&format!(
    "SELECT {} FROM books{} ORDER BY id",
    BOOK_COLUMNS, where_clause
  ))?;
  let rows = stmt.query_map(params_from_iter(values), map_book)?;
  let mut books = Vec::new();
  for row in rows {
    books.push(row?);
  }
  Ok(books)
}

pub fn list_all(conn: &Connection) -> Result<Vec<Book>> {
  list_books(conn, &BookFilter::default())
}

pub fn count_books(conn: &Connection) -> Result<i64> {
  let total = conn.query_row("SELECT COUNT(*) FROM books", [], |row| row.get(0))?;
  Ok(total)
}

/// Applies the patch's column changes. `image_url` is ignored here; covers
/// are handled by the caller through [`set_icon_path`].
pub fn update_book(conn: &Connection, id: i64, patch: &BookPatch) -> Result<Book> {
  let columns = patch_columns(patch);
  if !columns.is_empty() {
    let assignments = columns
      .iter()
      .enumerate()
      .map(|(index, (name, _))| format!("{} = ?{}", name, index + 1))
      .collect::<Vec<_>>();
    let sql = format!(
      "UPDATE books SET {} WHERE id = ?{}",
      assignments.join(", "),
      columns.len() + 1
    );
    let mut values = columns.into_iter().map(|(_, value)| value).collect::<Vec<_>>();
    values.push(Value::Integer(id));
    let changed = conn.execute(&sql, params_from_iter(values))?;
    if changed == 0 {
      return Err(CatalogError::BookNotFound(id));
    }
  }
  get_book(conn, id)?.ok_or(CatalogError::BookNotFound(id))
}

pub fn set_icon_path(conn: &Connection, id: i64, icon_path: Option<&str>) -> Result<()> {
  let changed = conn.execute(
    "UPDATE books SET icon_path = ?1 WHERE id = ?2",
    params![icon_path, id],
  )?;
  if changed == 0 {
    return Err(CatalogError::BookNotFound(id));
  }
  Ok(())
}

/// Number of records whose `Icon Path` is exactly `icon_path`.
pub fn count_icon_references(conn: &Connection, icon_path: &str) -> Result<i64> {
  let total = conn.query_row(
    "SELECT COUNT(*) FROM books WHERE icon_path = ?1",
    params![icon_path],
    |row| row.get(0),
  )?;
  Ok(total)
}

/// Deletes the record and returns it so the caller can release its cover.
pub fn delete_book(conn: &Connection, id: i64) -> Result<Option<Book>> {
  let Some(book) = get_book(conn, id)? else {
    return Ok(None);
  };
  conn.execute("DELETE FROM books WHERE id = ?1", params![id])?;
  Ok(Some(book))
}
