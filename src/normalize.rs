//! Canonicalizes raw import rows into typed [`BookDraft`]s.
//!
//! Everything here is permissive: a value that cannot be parsed degrades to
//! "absent" instead of failing the row.

use chrono::NaiveDate;
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

use crate::config::ImportOptions;
use crate::models::BookDraft;

/// One import row: column header to raw cell text.
pub type RawRow = HashMap<String, String>;

pub const TITLE: &str = "Title";
pub const AUTHOR: &str = "Author";
pub const PUBLISHER: &str = "Publisher";
pub const PUBLISHED_DATE: &str = "Published Date";
pub const FORMAT: &str = "Format";
pub const SERIES: &str = "Series";
pub const LANGUAGE: &str = "Language";
pub const ISBN: &str = "ISBN";
pub const LOCATION: &str = "Location";
pub const SUMMARY: &str = "Summary";
pub const COMMENTS: &str = "Comments";
pub const TAGS: &str = "Tags";
pub const GENRES: &str = "Genres";
pub const BOOKSHELF: &str = "BookShelf";
pub const PAGES: &str = "Pages";
pub const VOLUME: &str = "Volume";
pub const PAGE_READ: &str = "Page Read";
pub const PRICE: &str = "Price";
pub const RATING: &str = "Rating";
pub const COPY_INDEX: &str = "Copy Index";
pub const ADDED_DATE: &str = "Added Date";
pub const STARTED_READING_DATE: &str = "Started Reading Date";
pub const FINISHED_READING_DATE: &str = "Finished Reading Date";
pub const READ: &str = "Read";
pub const FAVORITE: &str = "Favorite";
pub const IS_WISHLIST: &str = "is_wishlist";
pub const ICON_PATH: &str = "Icon Path";
pub const IMAGE_URL: &str = "Image Url";

static DAY_FIRST_DATE: OnceLock<Regex> = OnceLock::new();

fn day_first_date() -> &'static Regex {
  DAY_FIRST_DATE.get_or_init(|| {
    Regex::new(r"^(\d{2})-(\d{2})-(\d{4})$").expect("valid DD-MM-YYYY pattern")
  })
}

/// Parses a `DD-MM-YYYY` date. Any other shape, or an impossible calendar
/// date, yields `None`.
pub fn parse_import_date(value: &str) -> Option<NaiveDate> {
  let captures = day_first_date().captures(value.trim())?;
  let day: u32 = captures.get(1)?.as_str().parse().ok()?;
  let month: u32 = captures.get(2)?.as_str().parse().ok()?;
  let year: i32 = captures.get(3)?.as_str().parse().ok()?;
  NaiveDate::from_ymd_opt(year, month, day)
}

/// Trims, accepts a comma decimal separator and parses as `f64`.
/// No range clamping.
pub fn parse_number(value: &str) -> Option<f64> {
  let cleaned = value.trim().replace(',', ".");
  if cleaned.is_empty() {
    return None;
  }
  cleaned.parse::<f64>().ok().filter(|number| number.is_finite())
}

/// Boolean parsing used for every flag column.
pub fn parse_bool(value: &str) -> bool {
  matches!(
    value.trim().to_lowercase().as_str(),
    "true" | "1" | "yes" | "y" | "t" | "on"
  )
}

/// The localized affirmative token counts as true, everything else goes
/// through [`parse_bool`].
pub fn parse_flag(value: &str, affirmative: &str) -> bool {
  let trimmed = value.trim();
  if !affirmative.is_empty() && trimmed.to_lowercase() == affirmative.to_lowercase() {
    return true;
  }
  parse_bool(trimmed)
}

fn text(row: &RawRow, column: &str) -> Option<String> {
  row
    .get(column)
    .map(|value| value.trim())
    .filter(|value| !value.is_empty())
    .map(|value| value.to_string())
}

fn number(row: &RawRow, column: &str) -> Option<f64> {
  row.get(column).and_then(|value| parse_number(value))
}

fn date(row: &RawRow, column: &str) -> Option<NaiveDate> {
  row.get(column).and_then(|value| parse_import_date(value))
}

fn flag(row: &RawRow, column: &str, affirmative: &str) -> bool {
  row
    .get(column)
    .map(|value| parse_flag(value, affirmative))
    .unwrap_or(false)
}

pub fn normalize_row(row: &RawRow, options: &ImportOptions) -> BookDraft {
  let bookshelf = text(row, BOOKSHELF);
  let on_wishlist_shelf = bookshelf
    .as_deref()
    .map(|shelf| shelf.to_lowercase() == options.wishlist_shelf.trim().to_lowercase())
    .unwrap_or(false);
  let affirmative = options.affirmative_token.as_str();

  BookDraft {
    title: text(row, TITLE).unwrap_or_default(),
    author: text(row, AUTHOR).unwrap_or_default(),
    publisher: text(row, PUBLISHER),
    published_date: text(row, PUBLISHED_DATE),
    format: text(row, FORMAT),
    series: text(row, SERIES),
    language: text(row, LANGUAGE),
    isbn: text(row, ISBN),
    location: text(row, LOCATION),
    summary: text(row, SUMMARY),
    comments: text(row, COMMENTS),
    tags: text(row, TAGS),
    genres: text(row, GENRES),
    bookshelf,
    pages: number(row, PAGES),
    volume: number(row, VOLUME),
    page_read: number(row, PAGE_READ),
    price: number(row, PRICE),
    rating: number(row, RATING),
    copy_index: number(row, COPY_INDEX),
    added_date: date(row, ADDED_DATE),
    started_reading_date: date(row, STARTED_READING_DATE),
    finished_reading_date: date(row, FINISHED_READING_DATE),
    read: flag(row, READ, affirmative),
    favorite: flag(row, FAVORITE, affirmative),
    is_wishlist: on_wishlist_shelf || flag(row, IS_WISHLIST, affirmative),
    icon_path: text(row, ICON_PATH),
    image_url: text(row, IMAGE_URL),
  }
}
