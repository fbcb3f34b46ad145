use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A stored catalog record. Serde names match the import/export columns.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Book {
  #[serde(rename = "ID")]
  pub id: i64,
  #[serde(rename = "Title")]
  pub title: String,
  #[serde(rename = "Author")]
  pub author: String,
  #[serde(rename = "Publisher")]
  pub publisher: Option<String>,
  #[serde(rename = "Published Date")]
  pub published_date: Option<String>,
  #[serde(rename = "Format")]
  pub format: Option<String>,
  #[serde(rename = "Series")]
  pub series: Option<String>,
  #[serde(rename = "Language")]
  pub language: Option<String>,
  #[serde(rename = "ISBN")]
  pub isbn: Option<String>,
  #[serde(rename = "Location")]
  pub location: Option<String>,
  #[serde(rename = "Summary")]
  pub summary: Option<String>,
  #[serde(rename = "Comments")]
  pub comments: Option<String>,
  #[serde(rename = "Tags")]
  pub tags: Option<String>,
  #[serde(rename = "Genres")]
  pub genres: Option<String>,
  #[serde(rename = "BookShelf")]
  pub bookshelf: Option<String>,
  #[serde(rename = "Pages")]
  pub pages: Option<f64>,
  #[serde(rename = "Volume")]
  pub volume: Option<f64>,
  #[serde(rename = "Page Read")]
  pub page_read: Option<f64>,
  #[serde(rename = "Price")]
  pub price: Option<f64>,
  #[serde(rename = "Rating")]
  pub rating: Option<f64>,
  #[serde(rename = "Copy Index")]
  pub copy_index: Option<f64>,
  #[serde(rename = "Added Date")]
  pub added_date: NaiveDate,
  #[serde(rename = "Started Reading Date")]
  pub started_reading_date: Option<NaiveDate>,
  #[serde(rename = "Finished Reading Date")]
  pub finished_reading_date: Option<NaiveDate>,
  #[serde(rename = "Read")]
  pub read: bool,
  #[serde(rename = "Favorite")]
  pub favorite: bool,
  #[serde(rename = "is_wishlist")]
  pub is_wishlist: bool,
  #[serde(rename = "Icon Path")]
  pub icon_path: Option<String>,
}

/// A record that has not been stored yet: output of the field normalizer,
/// input of manual entry and restore.
///
/// `image_url` is transient. It is resolved into `icon_path` before insert
/// and never written to the store.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct BookDraft {
  #[serde(rename = "Title")]
  pub title: String,
  #[serde(rename = "Author")]
  pub author: String,
  #[serde(rename = "Publisher")]
  pub publisher: Option<String>,
  #[serde(rename = "Published Date")]
  pub published_date: Option<String>,
  #[serde(rename = "Format")]
  pub format: Option<String>,
  #[serde(rename = "Series")]
  pub series: Option<String>,
  #[serde(rename = "Language")]
  pub language: Option<String>,
  #[serde(rename = "ISBN")]
  pub isbn: Option<String>,
  #[serde(rename = "Location")]
  pub location: Option<String>,
  #[serde(rename = "Summary")]
  pub summary: Option<String>,
  #[serde(rename = "Comments")]
  pub comments: Option<String>,
  #[serde(rename = "Tags")]
  pub tags: Option<String>,
  #[serde(rename = "Genres")]
  pub genres: Option<String>,
  #[serde(rename = "BookShelf")]
  pub bookshelf: Option<String>,
  #[serde(rename = "Pages")]
  pub pages: Option<f64>,
  #[serde(rename = "Volume")]
  pub volume: Option<f64>,
  #[serde(rename = "Page Read")]
  pub page_read: Option<f64>,
  #[serde(rename = "Price")]
  pub price: Option<f64>,
  #[serde(rename = "Rating")]
  pub rating: Option<f64>,
  #[serde(rename = "Copy Index")]
  pub copy_index: Option<f64>,
  #[serde(rename = "Added Date")]
  pub added_date: Option<NaiveDate>,
  #[serde(rename = "Started Reading Date")]
  pub started_reading_date: Option<NaiveDate>,
  #[serde(rename = "Finished Reading Date")]
  pub finished_reading_date: Option<NaiveDate>,
  #[serde(rename = "Read")]
  pub read: bool,
  #[serde(rename = "Favorite")]
  pub favorite: bool,
  #[serde(rename = "is_wishlist")]
  pub is_wishlist: bool,
  #[serde(rename = "Icon Path")]
  pub icon_path: Option<String>,
  #[serde(rename = "Image Url", skip_serializing)]
  pub image_url: Option<String>,
}

impl BookDraft {
  pub fn new(title: impl Into<String>, author: impl Into<String>) -> Self {
    Self {
      title: title.into(),
      author: author.into(),
      ..Self::default()
    }
  }

  pub fn has_required_fields(&self) -> bool {
    !self.title.trim().is_empty() && !self.author.trim().is_empty()
  }
}

/// Partial edit of a stored book. `None` leaves the column untouched.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct BookPatch {
  #[serde(rename = "Title")]
  pub title: Option<String>,
  #[serde(rename = "Author")]
  pub author: Option<String>,
  #[serde(rename = "Publisher")]
  pub publisher: Option<String>,
  #[serde(rename = "Published Date")]
  pub published_date: Option<String>,
  #[serde(rename = "Format")]
  pub format: Option<String>,
  #[serde(rename = "Series")]
  pub series: Option<String>,
  #[serde(rename = "Language")]
  pub language: Option<String>,
  #[serde(rename = "ISBN")]
  pub isbn: Option<String>,
  #[serde(rename = "Location")]
  pub location: Option<String>,
  #[serde(rename = "Summary")]
  pub summary: Option<String>,
  #[serde(rename = "Comments")]
  pub comments: Option<String>,
  #[serde(rename = "Tags")]
  pub tags: Option<String>,
  #[serde(rename = "Genres")]
  pub genres: Option<String>,
  #[serde(rename = "BookShelf")]
  pub bookshelf: Option<String>,
  #[serde(rename = "Pages")]
  pub pages: Option<f64>,
  #[serde(rename = "Volume")]
  pub volume: Option<f64>,
  #[serde(rename = "Page Read")]
  pub page_read: Option<f64>,
  #[serde(rename = "Price")]
  pub price: Option<f64>,
  #[serde(rename = "Rating")]
  pub rating: Option<f64>,
  #[serde(rename = "Copy Index")]
  pub copy_index: Option<f64>,
  #[serde(rename = "Started Reading Date")]
  pub started_reading_date: Option<NaiveDate>,
  #[serde(rename = "Finished Reading Date")]
  pub finished_reading_date: Option<NaiveDate>,
  #[serde(rename = "Read")]
  pub read: Option<bool>,
  #[serde(rename = "Favorite")]
  pub favorite: Option<bool>,
  #[serde(rename = "is_wishlist")]
  pub is_wishlist: Option<bool>,
  #[serde(rename = "Image Url")]
  pub image_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SkippedBook {
  #[serde(rename = "Title")]
  pub title: String,
  #[serde(rename = "Author")]
  pub author: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
  pub new_books_count: usize,
  pub skipped_books_count: usize,
  pub skipped_books: Vec<SkippedBook>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RestoreSummary {
  pub restored_books_count: usize,
  pub restored_images_count: usize,
}

pub const BACKUP_VERSION: u32 = 1;

/// Full backup document. Written with `Book` records, read back as
/// `BookDraft` so identities are dropped on restore.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Backup<B> {
  #[serde(default)]
  pub version: u32,
  #[serde(default)]
  pub created_at: Option<DateTime<Utc>>,
  pub books: Vec<B>,
  #[serde(default)]
  pub images: BTreeMap<String, String>,
  #[serde(default)]
  pub checksums: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookFilter {
  pub wishlist: Option<bool>,
  pub read: Option<bool>,
  pub favorite: Option<bool>,
  pub shelf: Option<String>,
  /// Substring match against title, author, series and ISBN.
  pub text: Option<String>,
}
