use regex::Regex;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::OnceLock;
use std::time::Duration;

use crate::duplicates::normalize_isbn;
use crate::normalize::{self, RawRow};

const HTTP_MAX_RETRIES: u64 = 1;
const HTTP_USER_AGENT: &str = "Bookcase/0.1";
const MAX_RESULTS: usize = 5;

/// A book suggested by an online provider. Feeding it through
/// [`MetadataCandidate::into_raw_row`] gives an ordinary import row.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MetadataCandidate {
  pub title: Option<String>,
  pub authors: Vec<String>,
  pub publisher: Option<String>,
  pub published_date: Option<String>,
  pub summary: Option<String>,
  pub isbn: Option<String>,
  pub pages: Option<f64>,
  pub image_url: Option<String>,
  pub rating: Option<f64>,
  pub source: String,
}

impl MetadataCandidate {
  pub fn into_raw_row(self) -> RawRow {
    let mut row = RawRow::new();
    let mut put = |column: &str, value: Option<String>| {
      if let Some(value) = value {
        row.insert(column.to_string(), value);
      }
    };
    put(normalize::TITLE, self.title);
    put(
      normalize::AUTHOR,
      Some(self.authors.join(", ")).filter(|authors| !authors.is_empty()),
    );
    put(normalize::PUBLISHER, self.publisher);
    put(normalize::PUBLISHED_DATE, self.published_date);
    put(normalize::SUMMARY, self.summary);
    put(normalize::ISBN, self.isbn);
    put(normalize::PAGES, self.pages.map(|pages| pages.to_string()));
    put(normalize::IMAGE_URL, self.image_url);
    put(normalize::RATING, self.rating.map(|rating| rating.to_string()));
    row
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchQuery {
  Isbn(String),
  TitleAuthor { title: String, author: Option<String> },
}

/// Recognizes bare ISBNs and `"<title> by <author>"` / `"<title> - <author>"`.
pub fn parse_search_query(query: &str) -> SearchQuery {
  let compact = normalize_isbn(query);
  let looks_like_isbn = (compact.len() == 10 || compact.len() == 13)
    && compact
      .chars()
      .enumerate()
      .all(|(index, ch)| ch.is_ascii_digit() || (index == 9 && compact.len() == 10 && (ch == 'X' || ch == 'x')));
  if looks_like_isbn {
    return SearchQuery::Isbn(compact.to_uppercase());
  }

  let query = query.trim();
  for separator in separators() {
    if let Some((title, author)) = split_search_query(query, separator) {
      return SearchQuery::TitleAuthor { title, author };
    }
  }
  SearchQuery::TitleAuthor {
    title: query.to_string(),
    author: None,
  }
}

static SEPARATORS: OnceLock<[Regex; 2]> = OnceLock::new();

// "by" wins over a dash when both appear.
fn separators() -> &'static [Regex; 2] {
  SEPARATORS.get_or_init(|| {
    [
      Regex::new(r"(?i)\s+by\s+").expect("valid by separator"),
      Regex::new(r"\s+-\s+").expect("valid dash separator"),
    ]
  })
}

fn split_search_query(query: &str, separator: &Regex) -> Option<(String, Option<String>)> {
  let found = separator.find(query)?;
  let title = query[..found.start()].trim();
  let author = query[found.end()..].trim();
  if title.is_empty() {
    return None;
  }
  let author = if author.is_empty() {
    None
  } else {
    Some(author.to_string())
  };
  Some((title.to_string(), author))
}

/// Client for the public Google Books and Open Library search APIs.
#[derive(Debug, Clone)]
pub struct MetadataClient {
  timeout: Duration,
}

impl MetadataClient {
  pub fn new(timeout: Duration) -> Self {
    Self { timeout }
  }

  /// Google Books first, Open Library after. Provider failures are logged
  /// and produce no candidates.
  pub fn search(&self, query: &str) -> Vec<MetadataCandidate> {
    let parsed = parse_search_query(query);
    let (google_url, openlibrary_url) = match &parsed {
      SearchQuery::Isbn(isbn) => (
        format!("https://www.googleapis.com/books/v1/volumes?q=isbn:{}", isbn),
        format!("https://openlibrary.org/search.json?isbn={}&limit={}", isbn, MAX_RESULTS),
      ),
      SearchQuery::TitleAuthor { title, author } => {
        let mut terms = vec![format!("intitle:{}", title)];
        let mut openlibrary = format!("https://openlibrary.org/search.json?title={}", urlencoding::encode(title));
        if let Some(author) = author {
          terms.push(format!("inauthor:{}", author));
          openlibrary.push_str(&format!("&author={}", urlencoding::encode(author)));
        }
        openlibrary.push_str(&format!("&limit={}", MAX_RESULTS));
        (
          format!(
            "https://www.googleapis.com/books/v1/volumes?q={}",
            urlencoding::encode(&terms.join("+"))
          ),
          openlibrary,
        )
      }
    };

    let mut candidates = vec![];
    if let Some(data) = self.fetch_json(&google_url) {
      candidates.extend(parse_google_volumes(&data));
    }
    if let Some(data) = self.fetch_json(&openlibrary_url) {
      candidates.extend(parse_openlibrary_docs(&data));
    }
    log::info!("metadata search \"{}\": {} candidate(s)", query, candidates.len());
    candidates
  }

  fn fetch_json(&self, url: &str) -> Option<Value> {
    let client = Client::builder().timeout(self.timeout).build().ok()?;
    for attempt in 0..=HTTP_MAX_RETRIES {
      let response = client
        .get(url)
        .header(reqwest::header::ACCEPT, "application/json")
        .header(reqwest::header::USER_AGENT, HTTP_USER_AGENT)
        .send();
      let response = match response {
        Ok(value) => value,
        Err(err) => {
          log::warn!("metadata http transport_error url={} attempt={}: {}", url, attempt + 1, err);
          if attempt < HTTP_MAX_RETRIES {
            std::thread::sleep(Duration::from_millis(350 * (attempt + 1)));
            continue;
          }
          return None;
        }
      };
      let status = response.status();
      if status.is_success() {
        return response.json::<Value>().ok();
      }
      log::warn!("metadata http status={} url={}", status, url);
      if status.is_server_error() && attempt < HTTP_MAX_RETRIES {
        std::thread::sleep(Duration::from_millis(350 * (attempt + 1)));
        continue;
      }
      return None;
    }
    None
  }
}

fn string_at(value: &Value, key: &str) -> Option<String> {
  value
    .get(key)
    .and_then(|entry| entry.as_str())
    .map(str::trim)
    .filter(|entry| !entry.is_empty())
    .map(|entry| entry.to_string())
}

fn strings_at(value: &Value, key: &str) -> Vec<String> {
  value
    .get(key)
    .and_then(|entry| entry.as_array())
    .map(|values| {
      values
        .iter()
        .filter_map(|entry| entry.as_str().map(|text| text.trim().to_string()))
        .filter(|text| !text.is_empty())
        .collect()
    })
    .unwrap_or_default()
}

pub fn parse_google_volumes(data: &Value) -> Vec<MetadataCandidate> {
  let items = data.get("items").and_then(|value| value.as_array()).cloned().unwrap_or_default();
  items
    .iter()
    .take(MAX_RESULTS)
    .map(|item| {
      let info = item.get("volumeInfo").cloned().unwrap_or(Value::Null);
      let identifiers = info
        .get("industryIdentifiers")
        .and_then(|value| value.as_array())
        .cloned()
        .unwrap_or_default();
      let isbn = ["ISBN_13", "ISBN_10"].iter().find_map(|kind| {
        identifiers
          .iter()
          .find(|entry| entry.get("type").and_then(|value| value.as_str()) == Some(*kind))
          .and_then(|entry| string_at(entry, "identifier"))
      });
      let image_url = info
        .get("imageLinks")
        .and_then(|value| value.get("thumbnail").or_else(|| value.get("smallThumbnail")))
        .and_then(|value| value.as_str())
        .map(|value| value.replace("http://", "https://"));

      MetadataCandidate {
        title: string_at(&info, "title"),
        authors: strings_at(&info, "authors"),
        publisher: string_at(&info, "publisher"),
        published_date: string_at(&info, "publishedDate"),
        summary: string_at(&info, "description"),
        isbn,
        pages: info.get("pageCount").and_then(|value| value.as_f64()),
        image_url,
        rating: info.get("averageRating").and_then(|value| value.as_f64()),
        source: "Google Books".to_string(),
      }
    })
    .collect()
}

pub fn parse_openlibrary_docs(data: &Value) -> Vec<MetadataCandidate> {
  let docs = data.get("docs").and_then(|value| value.as_array()).cloned().unwrap_or_default();
  docs
    .iter()
    .take(MAX_RESULTS)
    .map(|doc| {
      let image_url = doc
        .get("cover_i")
        .and_then(|value| value.as_i64())
        .map(|id| format!("https://covers.openlibrary.org/b/id/{}-L.jpg", id));
      MetadataCandidate {
        title: string_at(doc, "title"),
        authors: strings_at(doc, "author_name").into_iter().take(3).collect(),
        publisher: strings_at(doc, "publisher").into_iter().next(),
        published_date: doc
          .get("first_publish_year")
          .and_then(|value| value.as_i64())
          .map(|year| year.to_string()),
        summary: None,
        isbn: strings_at(doc, "isbn").into_iter().next(),
        pages: doc.get("number_of_pages_median").and_then(|value| value.as_f64()),
        image_url,
        rating: doc.get("ratings_average").and_then(|value| value.as_f64()),
        source: "Open Library".to_string(),
      }
    })
    .collect()
}
