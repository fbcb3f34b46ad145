use rusqlite::Connection;

use crate::error::Result;
use crate::models::{Book, BookDraft};
use crate::store;

/// Why a candidate row was judged to be already in the library.
#[derive(Debug, Clone, PartialEq)]
pub enum DuplicateMatch {
  Isbn(Book),
  TitleAuthor(Book),
}

impl DuplicateMatch {
  pub fn existing(&self) -> &Book {
    match self {
      DuplicateMatch::Isbn(book) | DuplicateMatch::TitleAuthor(book) => book,
    }
  }
}

/// ISBN with hyphens and whitespace removed. Used for comparison only.
pub fn normalize_isbn(value: &str) -> String {
  value
    .chars()
    .filter(|ch| *ch != '-' && !ch.is_whitespace())
    .collect()
}

/// ISBN first, exact title + author second. Runs against whatever the
/// connection currently sees, so rows inserted earlier in the same
/// transaction count.
pub fn find_duplicate(conn: &Connection, candidate: &BookDraft) -> Result<Option<DuplicateMatch>> {
  if let Some(isbn) = candidate.isbn.as_deref() {
    if !isbn.trim().is_empty() {
      if let Some(book) = store::find_by_normalized_isbn(conn, isbn)? {
        return Ok(Some(DuplicateMatch::Isbn(book)));
      }
    }
  }

  if candidate.title.is_empty() || candidate.author.is_empty() {
    return Ok(None);
  }
  let found = store::find_by_title_author(conn, &candidate.title, &candidate.author)?;
  Ok(found.map(DuplicateMatch::TitleAuthor))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::db::open_in_memory;

  fn seed(conn: &Connection, title: &str, author: &str, isbn: Option<&str>) -> Book {
    store::insert_book(
      conn,
      &BookDraft {
        isbn: isbn.map(str::to_string),
        ..BookDraft::new(title, author)
      },
    )
    .unwrap()
  }

  #[test]
  fn normalizes_hyphens_and_whitespace() {
    assert_eq!(normalize_isbn(" 978-83 7469\t0-12-3 "), "9788374690123");
    assert_eq!(normalize_isbn("--"), "");
  }

  #[test]
  fn isbn_match_wins_over_different_title() {
    let conn = open_in_memory().unwrap();
    let stored = seed(&conn, "Lalka", "Bolesław Prus", Some("978-83-7469-012-3"));
    let candidate = BookDraft {
      isbn: Some("9788374690123".to_string()),
      ..BookDraft::new("The Doll", "B. Prus")
    };
    let found = find_duplicate(&conn, &candidate).unwrap().unwrap();
    assert!(matches!(found, DuplicateMatch::Isbn(_)));
    assert_eq!(found.existing().id, stored.id);
  }

  #[test]
  fn falls_back_to_exact_title_and_author() {
    let conn = open_in_memory().unwrap();
    seed(&conn, "Lalka", "Bolesław Prus", None);

    let same = BookDraft::new("Lalka", "Bolesław Prus");
    assert!(matches!(
      find_duplicate(&conn, &same).unwrap(),
      Some(DuplicateMatch::TitleAuthor(_))
    ));

    let different_case = BookDraft::new("lalka", "Bolesław Prus");
    assert!(find_duplicate(&conn, &different_case).unwrap().is_none());
  }

  #[test]
  fn unmatched_isbn_still_checks_title_and_author() {
    let conn = open_in_memory().unwrap();
    seed(&conn, "Lalka", "Bolesław Prus", Some("111"));
    let candidate = BookDraft {
      isbn: Some("222".to_string()),
      ..BookDraft::new("Lalka", "Bolesław Prus")
    };
    assert!(matches!(
      find_duplicate(&conn, &candidate).unwrap(),
      Some(DuplicateMatch::TitleAuthor(_))
    ));
  }

  #[test]
  fn blank_isbn_is_not_compared() {
    let conn = open_in_memory().unwrap();
    seed(&conn, "Lalka", "Bolesław Prus", None);
    let candidate = BookDraft {
      isbn: Some("   ".to_string()),
      ..BookDraft::new("Faraon", "Bolesław Prus")
    };
    assert!(find_duplicate(&conn, &candidate).unwrap().is_none());
  }
}
