use chrono::{Datelike, NaiveDate};
use rusqlite::{params, Connection};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::Result;

#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LibraryStats {
  pub total: i64,
  pub read: i64,
  pub wishlist: i64,
  pub favorites: i64,
  pub pages_read: f64,
  pub average_rating: Option<f64>,
  pub by_shelf: BTreeMap<String, i64>,
  pub by_genre: BTreeMap<String, i64>,
  pub finished_by_year: BTreeMap<i32, i64>,
  pub reading_goal: Option<GoalProgress>,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GoalProgress {
  pub year: i32,
  pub target: u32,
  pub finished: i64,
  pub percent: f64,
}

/// Aggregate views over the catalog. `goal` is the yearly reading target,
/// measured against books finished in `today`'s year.
pub fn library_stats(conn: &Connection, goal: Option<u32>, today: NaiveDate) -> Result<LibraryStats> {
  let (total, read, wishlist, favorites): (i64, i64, i64, i64) = conn.query_row(
    "SELECT COUNT(*), COALESCE(SUM(read), 0), COALESCE(SUM(is_wishlist), 0), COALESCE(SUM(favorite), 0) FROM books",
    params![],
    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
  )?;
  // finished books count in full, unfinished ones by their bookmark
  let pages_read: f64 = conn.query_row(
    "SELECT COALESCE(SUM(CASE WHEN read = 1 THEN COALESCE(pages, 0) ELSE COALESCE(page_read, 0) END), 0.0) FROM books",
    params![],
    |row| row.get(0),
  )?;
  let average_rating: Option<f64> = conn.query_row(
    "SELECT AVG(rating) FROM books WHERE rating IS NOT NULL",
    params![],
    |row| row.get(0),
  )?;

  let mut by_shelf = BTreeMap::new();
  let mut stmt = conn.prepare(
    "SELECT bookshelf, COUNT(*) FROM books WHERE bookshelf IS NOT NULL GROUP BY bookshelf",
  )?;
  let rows = stmt.query_map(params![], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
  for row in rows {
    let (shelf, count) = row?;
    by_shelf.insert(shelf, count);
  }

  let mut by_genre: BTreeMap<String, i64> = BTreeMap::new();
  let mut stmt = conn.prepare("SELECT genres FROM books WHERE genres IS NOT NULL")?;
  let rows = stmt.query_map(params![], |row| row.get::<_, String>(0))?;
  for row in rows {
    let genres = row?;
    for genre in genres.split(',').map(str::trim).filter(|genre| !genre.is_empty()) {
      *by_genre.entry(genre.to_string()).or_default() += 1;
    }
  }

  let mut finished_by_year = BTreeMap::new();
  let mut stmt = conn.prepare(
    "SELECT CAST(strftime('%Y', finished_reading_date) AS INTEGER), COUNT(*) FROM books \
     WHERE finished_reading_date IS NOT NULL GROUP BY 1",
  )?;
  let rows = stmt.query_map(params![], |row| Ok((row.get::<_, Option<i32>>(0)?, row.get::<_, i64>(1)?)))?;
  for row in rows {
    if let (Some(year), count) = row? {
      finished_by_year.insert(year, count);
    }
  }

  let reading_goal = goal.filter(|target| *target > 0).map(|target| {
    let year = today.year();
    let finished = finished_by_year.get(&year).copied().unwrap_or(0);
    GoalProgress {
      year,
      target,
      finished,
      percent: finished as f64 * 100.0 / target as f64,
    }
  });

  Ok(LibraryStats {
    total,
    read,
    wishlist,
    favorites,
    pages_read,
    average_rating,
    by_shelf,
    by_genre,
    finished_by_year,
    reading_goal,
  })
}
