use reqwest::blocking::Client;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

use crate::error::{CatalogError, Result};

/// Prefix of every internal cover reference stored in `Icon Path`.
pub const ASSET_PREFIX: &str = "/covers/";
const HTTP_USER_AGENT: &str = "Bookcase/0.1";
// Open Library answers missing covers with a tiny placeholder image.
const MIN_COVER_BYTES: usize = 1024;

/// File-backed cover images, addressed by `/covers/<filename>` references.
#[derive(Debug, Clone)]
pub struct CoverStore {
  root: PathBuf,
  timeout: Duration,
}

impl CoverStore {
  pub fn new(root: impl Into<PathBuf>, timeout: Duration) -> Self {
    Self {
      root: root.into(),
      timeout,
    }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn asset_ref(filename: &str) -> String {
    format!("{}{}", ASSET_PREFIX, filename)
  }

  pub fn is_internal(reference: &str) -> bool {
    reference.starts_with(ASSET_PREFIX)
  }

  /// Bare filename of an internal reference.
  pub fn filename_of(reference: &str) -> Option<&str> {
    let name = reference.strip_prefix(ASSET_PREFIX)?;
    if is_valid_filename(name) {
      Some(name)
    } else {
      None
    }
  }

  fn path_for(&self, reference: &str) -> Option<PathBuf> {
    Self::filename_of(reference).map(|name| self.root.join(name))
  }

  pub fn exists(&self, reference: &str) -> bool {
    self
      .path_for(reference)
      .map(|path| path.is_file())
      .unwrap_or(false)
  }

  /// Writes `bytes` under a fresh name and returns its reference.
  pub fn store(&self, bytes: &[u8], suggested_ext: Option<&str>) -> Result<String> {
    let extension = suggested_ext
      .and_then(clean_extension)
      .or_else(|| sniff_extension(bytes))
      .unwrap_or_else(|| "jpg".to_string());
    let filename = format!("{}.{}", Uuid::new_v4(), extension);
    fs::create_dir_all(&self.root)?;
    let path = self.root.join(&filename);
    fs::write(&path, bytes)?;
    log::info!("cover saved: {} ({} bytes)", path.display(), bytes.len());
    Ok(Self::asset_ref(&filename))
  }

  /// Writes `bytes` under an exact filename. An existing file is never
  /// overwritten: identical bytes reuse it, different bytes are a conflict.
  pub fn write_named(&self, filename: &str, bytes: &[u8]) -> Result<NamedWrite> {
    if !is_valid_filename(filename) {
      return Err(CatalogError::InvalidAssetName(filename.to_string()));
    }
    fs::create_dir_all(&self.root)?;
    let path = self.root.join(filename);
    if path.exists() {
      if fs::read(&path)? == bytes {
        return Ok(NamedWrite::Existing(Self::asset_ref(filename)));
      }
      log::warn!("cover {} already exists with different content", path.display());
      return Ok(NamedWrite::Conflict);
    }
    fs::write(&path, bytes)?;
    Ok(NamedWrite::Created(Self::asset_ref(filename)))
  }

  pub fn read(&self, reference: &str) -> Result<Vec<u8>> {
    let path = self
      .path_for(reference)
      .ok_or_else(|| CatalogError::InvalidAssetName(reference.to_string()))?;
    Ok(fs::read(path)?)
  }

  /// Removes the asset. Missing files and external references are ignored.
  pub fn delete(&self, reference: &str) -> Result<bool> {
    let Some(path) = self.path_for(reference) else {
      return Ok(false);
    };
    match fs::remove_file(&path) {
      Ok(()) => {
        log::info!("cover deleted: {}", path.display());
        Ok(true)
      }
      Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
      Err(err) => Err(err.into()),
    }
  }

  /// Downloads an image and stores it. Never fails: transport errors, bad
  /// statuses and placeholder images all yield `None`.
  pub fn fetch_and_store(&self, url: &str) -> Option<String> {
    log::info!("fetching cover from url: {}", url);
    let client = match Client::builder()
      .timeout(self.timeout)
      .user_agent(HTTP_USER_AGENT)
      .build()
    {
      Ok(client) => client,
      Err(err) => {
        log::warn!("could not build http client: {}", err);
        return None;
      }
    };
    let response = match client.get(url).send() {
      Ok(resp) => resp,
      Err(err) => {
        log::warn!("cover fetch failed for {}: {}", url, err);
        return None;
      }
    };
    if !response.status().is_success() {
      log::warn!("cover fetch returned status {} for {}", response.status(), url);
      return None;
    }
    let content_type = response
      .headers()
      .get(reqwest::header::CONTENT_TYPE)
      .and_then(|value| value.to_str().ok())
      .unwrap_or("")
      .to_string();
    let bytes = match response.bytes() {
      Ok(bytes) => bytes.to_vec(),
      Err(err) => {
        log::warn!("cover body read failed for {}: {}", url, err);
        return None;
      }
    };
    if bytes.len() < MIN_COVER_BYTES {
      log::info!("cover too small ({} bytes), likely a placeholder: {}", bytes.len(), url);
      return None;
    }
    let extension = map_cover_extension(&content_type)
      .map(str::to_string)
      .or_else(|| sniff_extension(&bytes));
    let Some(extension) = extension else {
      log::warn!("cover at {} is not an image ({})", url, content_type);
      return None;
    };
    match self.store(&bytes, Some(&extension)) {
      Ok(reference) => Some(reference),
      Err(err) => {
        log::warn!("failed to store cover from {}: {}", url, err);
        None
      }
    }
  }

  /// Turns an `Image Url`/`Icon Path` value into a newly stored asset.
  ///
  /// Accepts http(s) URLs and internal references (copied so each record
  /// owns its file). Local file paths are only read for
  /// [`ReferenceSource::Manual`] and must hold a recognizable image.
  /// Unusable references yield `Ok(None)`; only local write failures are
  /// errors.
  pub fn resolve_reference(&self, reference: &str, source: ReferenceSource) -> Result<Option<String>> {
    let reference = reference.trim();
    if reference.is_empty() {
      return Ok(None);
    }
    if reference.starts_with("http://") || reference.starts_with("https://") {
      return Ok(self.fetch_and_store(reference));
    }
    if Self::is_internal(reference) {
      if !self.exists(reference) {
        log::warn!("cover reference {} does not exist", reference);
        return Ok(None);
      }
      let bytes = self.read(reference)?;
      let extension = extension_of(reference);
      return self.store(&bytes, extension.as_deref()).map(Some);
    }
    if source == ReferenceSource::Import {
      log::warn!("ignoring non-url cover reference in imported row: {}", reference);
      return Ok(None);
    }
    let local = Path::new(reference);
    if local.is_file() {
      let bytes = fs::read(local)?;
      let Some(sniffed) = sniff_extension(&bytes) else {
        log::warn!("local cover {} is not an image", reference);
        return Ok(None);
      };
      let extension = extension_of(reference).unwrap_or(sniffed);
      return self.store(&bytes, Some(extension.as_str())).map(Some);
    }
    log::warn!("unrecognized cover reference: {}", reference);
    Ok(None)
  }
}

/// Outcome of [`CoverStore::write_named`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamedWrite {
  Created(String),
  /// The file was already there with the same bytes.
  Existing(String),
  /// A different file already uses the name; nothing was written.
  Conflict,
}

/// Who supplied a cover reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceSource {
  /// Typed by the user; local file paths are allowed.
  Manual,
  /// A cell of an imported file; only URLs and internal references.
  Import,
}

/// Tracks assets written during one batch so they can be removed if the
/// batch's transaction does not commit.
pub struct CoverBatch<'a> {
  store: &'a CoverStore,
  written: Vec<String>,
  committed: bool,
}

impl<'a> CoverBatch<'a> {
  pub fn new(store: &'a CoverStore) -> Self {
    Self {
      store,
      written: vec![],
      committed: false,
    }
  }

  pub fn track(&mut self, reference: String) -> String {
    self.written.push(reference.clone());
    reference
  }

  pub fn resolve_reference(&mut self, reference: &str, source: ReferenceSource) -> Result<Option<String>> {
    let resolved = self.store.resolve_reference(reference, source)?;
    Ok(resolved.map(|value| self.track(value)))
  }

  pub fn written(&self) -> &[String] {
    &self.written
  }

  pub fn commit(mut self) {
    self.committed = true;
  }
}

impl Drop for CoverBatch<'_> {
  fn drop(&mut self) {
    if self.committed {
      return;
    }
    for reference in &self.written {
      if let Err(err) = self.store.delete(reference) {
        log::warn!("failed to remove orphaned cover {}: {}", reference, err);
      }
    }
    if !self.written.is_empty() {
      log::info!("removed {} cover(s) from an uncommitted batch", self.written.len());
    }
  }
}

fn is_valid_filename(name: &str) -> bool {
  !name.is_empty()
    && name != "."
    && name != ".."
    && !name.contains(['/', '\\', '\0'])
}

fn clean_extension(extension: &str) -> Option<String> {
  let cleaned = extension.trim().trim_start_matches('.').to_lowercase();
  if cleaned.is_empty() || cleaned.len() > 5 || !cleaned.chars().all(|ch| ch.is_ascii_alphanumeric()) {
    return None;
  }
  Some(cleaned)
}

pub(crate) fn extension_of(reference: &str) -> Option<String> {
  Path::new(reference)
    .extension()
    .and_then(|ext| ext.to_str())
    .and_then(clean_extension)
}

fn sniff_extension(bytes: &[u8]) -> Option<String> {
  let format = image::guess_format(bytes).ok()?;
  format.extensions_str().first().map(|ext| ext.to_string())
}

pub fn map_cover_extension(mime: &str) -> Option<&'static str> {
  let mime = mime.split(';').next().unwrap_or("").trim();
  match mime {
    "image/jpeg" | "image/jpg" => Some("jpg"),
    "image/png" => Some("png"),
    "image/webp" => Some("webp"),
    "image/gif" => Some("gif"),
    _ => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

  fn cover_store() -> (tempfile::TempDir, CoverStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = CoverStore::new(dir.path().join("covers"), Duration::from_secs(2));
    (dir, store)
  }

  #[test]
  fn store_read_delete_cycle() {
    let (_dir, store) = cover_store();
    let reference = store.store(b"cover-bytes", Some(".JPG")).unwrap();
    assert!(reference.starts_with(ASSET_PREFIX));
    assert!(reference.ends_with(".jpg"));
    assert!(store.exists(&reference));
    assert_eq!(store.read(&reference).unwrap(), b"cover-bytes");
    assert!(store.delete(&reference).unwrap());
    assert!(!store.exists(&reference));
    assert!(!store.delete(&reference).unwrap());
  }

  #[test]
  fn extension_is_sniffed_when_not_suggested() {
    let (_dir, store) = cover_store();
    let reference = store.store(PNG_MAGIC, None).unwrap();
    assert!(reference.ends_with(".png"));
    let reference = store.store(b"????", Some("../x")).unwrap();
    assert!(reference.ends_with(".jpg"));
  }

  #[test]
  fn write_named_never_overwrites() {
    let (_dir, store) = cover_store();
    assert!(matches!(
      store.write_named("../escape.jpg", b"x"),
      Err(CatalogError::InvalidAssetName(_))
    ));
    assert_eq!(
      store.write_named("a.jpg", b"x").unwrap(),
      NamedWrite::Created("/covers/a.jpg".to_string())
    );
    assert_eq!(
      store.write_named("a.jpg", b"x").unwrap(),
      NamedWrite::Existing("/covers/a.jpg".to_string())
    );
    assert_eq!(store.write_named("a.jpg", b"y").unwrap(), NamedWrite::Conflict);
    assert_eq!(store.read("/covers/a.jpg").unwrap(), b"x");
  }

  #[test]
  fn external_references_are_not_deleted() {
    let (_dir, store) = cover_store();
    assert!(!store.delete("https://example.com/cover.jpg").unwrap());
    assert!(CoverStore::filename_of("/covers/../x").is_none());
  }

  #[test]
  fn internal_reference_is_copied() {
    let (_dir, store) = cover_store();
    let original = store.store(b"bytes", Some("png")).unwrap();
    for source in [ReferenceSource::Manual, ReferenceSource::Import] {
      let copy = store.resolve_reference(&original, source).unwrap().unwrap();
      assert_ne!(copy, original);
      assert_eq!(store.read(&copy).unwrap(), b"bytes");
    }
    assert!(store
      .resolve_reference("/covers/missing.png", ReferenceSource::Manual)
      .unwrap()
      .is_none());
    assert!(store
      .resolve_reference("not a path", ReferenceSource::Manual)
      .unwrap()
      .is_none());
  }

  #[test]
  fn local_image_is_read_for_manual_entry_only() {
    let (dir, store) = cover_store();
    let local = dir.path().join("scan.png");
    std::fs::write(&local, PNG_MAGIC).unwrap();
    let path = local.to_str().unwrap();

    let reference = store
      .resolve_reference(path, ReferenceSource::Manual)
      .unwrap()
      .unwrap();
    assert!(reference.ends_with(".png"));
    assert_eq!(store.read(&reference).unwrap(), PNG_MAGIC);

    assert!(store
      .resolve_reference(path, ReferenceSource::Import)
      .unwrap()
      .is_none());
  }

  #[test]
  fn local_file_that_is_not_an_image_is_ignored() {
    let (dir, store) = cover_store();
    let secret = dir.path().join("secret.txt");
    std::fs::write(&secret, b"password=hunter2").unwrap();
    let resolved = store
      .resolve_reference(secret.to_str().unwrap(), ReferenceSource::Manual)
      .unwrap();
    assert!(resolved.is_none());
    assert!(!store.root().exists() || std::fs::read_dir(store.root()).unwrap().count() == 0);
  }

  #[test]
  fn unreachable_url_is_tolerated() {
    let (_dir, store) = cover_store();
    assert!(store.fetch_and_store("http://127.0.0.1:9/cover.jpg").is_none());
  }

  #[test]
  fn uncommitted_batch_removes_its_files() {
    let (_dir, store) = cover_store();
    let kept = {
      let mut batch = CoverBatch::new(&store);
      let reference = store.store(b"kept", None).unwrap();
      let kept = batch.track(reference);
      batch.commit();
      kept
    };
    let dropped = {
      let mut batch = CoverBatch::new(&store);
      let reference = store.store(b"dropped", None).unwrap();
      batch.track(reference)
    };
    assert!(store.exists(&kept));
    assert!(!store.exists(&dropped));
  }

  #[test]
  fn content_type_parameters_are_ignored() {
    assert_eq!(map_cover_extension("image/jpeg; charset=binary"), Some("jpg"));
    assert_eq!(map_cover_extension("text/html"), None);
  }
}
