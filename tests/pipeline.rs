use bookcase::{BookDraft, BookFilter, CatalogError, Config, Library};
use std::collections::HashMap;
use tempfile::TempDir;

const PNG_SIGNATURE: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

fn png(payload: &[u8]) -> Vec<u8> {
  [PNG_SIGNATURE, payload].concat()
}

fn library() -> (TempDir, Library) {
  let dir = tempfile::tempdir().unwrap();
  let library = Library::open(Config::in_dir(dir.path())).unwrap();
  (dir, library)
}

fn all_books(library: &Library) -> Vec<bookcase::Book> {
  library.list_books(&BookFilter::default()).unwrap()
}

#[test]
fn isbn_duplicate_of_stored_record_is_skipped() {
  let (_dir, mut library) = library();
  library
    .add_book(BookDraft {
      isbn: Some("9788375780635".to_string()),
      ..BookDraft::new("Wiedźmin", "Andrzej Sapkowski")
    })
    .unwrap();

  let csv = "Title,Author,ISBN\n\
             Solaris,Stanisław Lem,978-83-08-04948-0\n\
             Ostatnie życzenie,A. Sapkowski,978-83-7578-063-5\n\
             Lalka,Bolesław Prus,\n";
  let summary = library.import_csv(csv.as_bytes()).unwrap();

  assert_eq!(summary.new_books_count, 2);
  assert_eq!(summary.skipped_books_count, 1);
  assert_eq!(summary.skipped_books.len(), 1);
  assert_eq!(summary.skipped_books[0].title, "Ostatnie życzenie");
  assert_eq!(summary.skipped_books[0].author, "A. Sapkowski");
  assert_eq!(all_books(&library).len(), 3);
}

#[test]
fn comma_decimal_rating_is_stored_as_float() {
  let (_dir, mut library) = library();
  let csv = "Title;Author;Rating;Pages\nDune;Frank Herbert;4,5;612\n";
  library.import_csv(csv.as_bytes()).unwrap();
  let books = all_books(&library);
  assert_eq!(books[0].rating, Some(4.5));
  assert_eq!(books[0].pages, Some(612.0));
}

#[test]
fn fault_on_third_of_five_rows_rolls_back_everything() {
  let (_dir, mut library) = library();
  let cover = library.covers().store(&png(b"cover"), Some("png")).unwrap();
  library
    .connection()
    .execute_batch(
      "CREATE TRIGGER fail_third BEFORE INSERT ON books WHEN NEW.title = 'Third'
       BEGIN SELECT RAISE(ABORT, 'injected fault'); END;",
    )
    .unwrap();

  let csv = format!(
    "Title,Author,Icon Path\nFirst,A,{0}\nSecond,B,{0}\nThird,C,\nFourth,D,\nFifth,E,\n",
    cover
  );
  let err = library.import_csv(csv.as_bytes()).unwrap_err();
  assert!(matches!(err, CatalogError::Database(_)));
  assert!(all_books(&library).is_empty());

  let remaining = std::fs::read_dir(library.covers().root()).unwrap().count();
  assert_eq!(remaining, 1, "only the pre-existing cover should remain");
}

#[test]
fn imported_rows_cannot_pull_in_local_files() {
  let (dir, mut library) = library();
  let secret = dir.path().join("secret.txt");
  std::fs::write(&secret, b"password=hunter2").unwrap();
  let csv = format!("Title,Author,Image Url\nX,Y,{}\n", secret.display());
  library.import_csv(csv.as_bytes()).unwrap();

  let books = all_books(&library);
  assert_eq!(books[0].icon_path, None);
  let mut document = vec![];
  let backup = library.backup(&mut document).unwrap();
  assert!(backup.images.is_empty());
}

#[test]
fn export_then_import_keeps_record_count() {
  let (_source_dir, mut source) = library();
  let csv = "Title,Author,ISBN,Tags,Read\n\
             \"Pan Tadeusz, czyli ostatni zajazd\",Adam Mickiewicz,,\"epika, klasyka\",tak\n\
             Solaris,Stanisław Lem,978-83-08-04948-0,,\n\
             Dune,Frank Herbert,,,\n";
  source.import_csv(csv.as_bytes()).unwrap();

  let mut exported = vec![];
  assert_eq!(source.export_csv(&mut exported).unwrap(), 3);

  let (_target_dir, mut target) = library();
  let summary = target.import_csv(&exported).unwrap();
  assert_eq!(summary.new_books_count, 3);
  assert_eq!(summary.skipped_books_count, 0);

  let titles: Vec<String> = all_books(&target).into_iter().map(|book| book.title).collect();
  assert!(titles.contains(&"Pan Tadeusz, czyli ostatni zajazd".to_string()));
  let pan_tadeusz = all_books(&target)
    .into_iter()
    .find(|book| book.author == "Adam Mickiewicz")
    .unwrap();
  assert_eq!(pan_tadeusz.tags.as_deref(), Some("epika, klasyka"));
  assert!(pan_tadeusz.read);
}

#[test]
fn reimporting_the_same_file_skips_every_row() {
  let (_dir, mut library) = library();
  let csv = "Title,Author,ISBN\n\
             Solaris,Stanisław Lem,978-83-08-04948-0\n\
             Dune,Frank Herbert,\n\
             Lalka,Bolesław Prus,\n";
  let first = library.import_csv(csv.as_bytes()).unwrap();
  assert_eq!(first.new_books_count, 3);

  let second = library.import_csv(csv.as_bytes()).unwrap();
  assert_eq!(second.new_books_count, 0);
  assert_eq!(second.skipped_books_count, 3);
  assert_eq!(all_books(&library).len(), 3);
}

#[test]
fn rows_without_title_or_author_are_not_counted() {
  let (_dir, mut library) = library();
  let csv = "Title,Author\n,Nobody\nNo author,\nDune,Frank Herbert\n";
  let summary = library.import_csv(csv.as_bytes()).unwrap();
  assert_eq!(summary.new_books_count, 1);
  assert_eq!(summary.skipped_books_count, 0);

  let err = library.import_csv(b"Title,Author\n,Nobody\n").unwrap_err();
  assert!(matches!(err, CatalogError::NoValidRows));
}

#[test]
fn backup_restores_identical_cover_bytes() {
  let (source_dir, mut source) = library();
  let mut originals = HashMap::new();
  for (index, title) in ["Dune", "Solaris"].iter().enumerate() {
    let path = source_dir.path().join(format!("{}.png", index));
    let bytes = png(format!("cover-{}", title).as_bytes());
    std::fs::write(&path, &bytes).unwrap();
    source
      .add_book(BookDraft {
        image_url: Some(path.to_string_lossy().to_string()),
        ..BookDraft::new(*title, "Someone")
      })
      .unwrap();
    originals.insert(title.to_string(), bytes);
  }
  source.add_book(BookDraft::new("Lalka", "Bolesław Prus")).unwrap();

  let mut document = vec![];
  let backup = source.backup(&mut document).unwrap();
  assert_eq!(backup.images.len(), 2);

  let (_target_dir, mut target) = library();
  let summary = target.restore_json(&document).unwrap();
  assert_eq!(summary.restored_books_count, 3);
  assert_eq!(summary.restored_images_count, 2);

  let restored = all_books(&target);
  assert_eq!(restored.len(), 3);
  for book in restored {
    match originals.get(&book.title) {
      Some(bytes) => {
        let reference = book.icon_path.unwrap();
        assert_eq!(&target.covers().read(&reference).unwrap(), bytes);
      }
      None => assert_eq!(book.icon_path, None),
    }
  }
}

#[test]
fn deleting_one_restored_copy_keeps_the_shared_cover() {
  let (dir, mut library) = library();
  let path = dir.path().join("dune.png");
  std::fs::write(&path, png(b"dune")).unwrap();
  library
    .add_book(BookDraft {
      image_url: Some(path.to_string_lossy().to_string()),
      ..BookDraft::new("Dune", "Frank Herbert")
    })
    .unwrap();

  let mut document = vec![];
  library.backup(&mut document).unwrap();
  library.restore_json(&document).unwrap();
  library.restore_json(&document).unwrap();

  let books = all_books(&library);
  assert_eq!(books.len(), 3);
  let icon = books[0].icon_path.clone().unwrap();
  assert!(books.iter().all(|book| book.icon_path.as_deref() == Some(icon.as_str())));

  assert!(library.delete_book(books[0].id).unwrap());
  assert!(library.delete_book(books[1].id).unwrap());
  assert_eq!(library.covers().read(&icon).unwrap(), png(b"dune"));

  assert!(library.delete_book(books[2].id).unwrap());
  assert!(!library.covers().exists(&icon));
}

// Known inconsistency: manual entry clamps Rating to [0, 5], import does not.
#[test]
fn rating_clamp_applies_to_manual_entry_only() {
  let (_dir, mut library) = library();
  library.import_csv(b"Title,Author,Rating\nImported,X,9\n").unwrap();
  let manual = library
    .add_book(BookDraft { rating: Some(9.0), ..BookDraft::new("Manual", "Y") })
    .unwrap();

  let imported = all_books(&library)
    .into_iter()
    .find(|book| book.title == "Imported")
    .unwrap();
  assert_eq!(imported.rating, Some(9.0));
  assert_eq!(manual.rating, Some(5.0));
}

#[test]
fn configured_wishlist_shelf_marks_imports() {
  let dir = tempfile::tempdir().unwrap();
  std::fs::write(
    dir.path().join("config.toml"),
    "[import]\nwishlist_shelf = \"To buy\"\naffirmative_token = \"yes\"\n",
  )
  .unwrap();
  let config = Config::load(Some(dir.path())).unwrap();
  let mut library = Library::open(config).unwrap();
  library
    .import_csv(b"Title,Author,BookShelf,Favorite\nDune,Frank Herbert,To buy,yes\n")
    .unwrap();

  let wishlist = library
    .list_books(&BookFilter { wishlist: Some(true), ..BookFilter::default() })
    .unwrap();
  assert_eq!(wishlist.len(), 1);
  assert!(wishlist[0].favorite);
}
