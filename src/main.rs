//! Bookcase CLI
//!
//! Command-line front end for a personal book catalog. Every command prints
//! its result as JSON on stdout; logs go to stderr.

use bookcase::{BookDraft, BookFilter, BookPatch, Config, Library};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Personal book catalog tools.
#[derive(Parser)]
#[command(name = "bookcase")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Data directory holding the database, covers and config.toml
  #[arg(global = true, short, long)]
  data_dir: Option<PathBuf>,

  /// Enable verbose output
  #[arg(global = true, short, long)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum InputFormat {
  Csv,
  Json,
}

#[derive(Subcommand)]
enum Commands {
  /// Import books from a CSV or JSON file
  Import {
    file: PathBuf,

    /// Input format (guessed from the file extension when omitted)
    #[arg(short, long, value_enum)]
    format: Option<InputFormat>,

    /// Field delimiter for CSV input
    #[arg(long)]
    delimiter: Option<char>,
  },

  /// Export every book as CSV
  Export {
    /// Output file (stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,
  },

  /// Write a full JSON backup including cover images
  Backup {
    /// Output file (stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,
  },

  /// Restore a JSON backup
  Restore { file: PathBuf },

  /// List books
  List {
    #[arg(long)]
    wishlist: Option<bool>,

    #[arg(long)]
    read: Option<bool>,

    #[arg(long)]
    favorite: Option<bool>,

    #[arg(long)]
    shelf: Option<String>,

    /// Substring to look for in title, author, series or ISBN
    #[arg(short, long)]
    text: Option<String>,
  },

  /// Show one book
  Show { id: i64 },

  /// Add a book by hand
  Add {
    #[arg(long)]
    title: String,

    #[arg(long)]
    author: String,

    #[command(flatten)]
    fields: BookFields,
  },

  /// Edit one or more books
  Update {
    #[arg(required = true)]
    ids: Vec<i64>,

    #[arg(long)]
    title: Option<String>,

    #[arg(long)]
    author: Option<String>,

    #[command(flatten)]
    fields: BookFields,
  },

  /// Delete books and their covers
  Delete {
    #[arg(required = true)]
    ids: Vec<i64>,
  },

  /// Show library statistics
  Stats {
    /// Yearly reading goal (overrides the configured one)
    #[arg(short, long)]
    goal: Option<u32>,
  },

  /// Search online metadata providers
  Search {
    query: String,

    /// Import the first result
    #[arg(long)]
    import: bool,
  },
}

#[derive(Args)]
struct BookFields {
  #[arg(long)]
  isbn: Option<String>,

  #[arg(long)]
  publisher: Option<String>,

  #[arg(long)]
  series: Option<String>,

  #[arg(long)]
  shelf: Option<String>,

  #[arg(long)]
  tags: Option<String>,

  #[arg(long)]
  genres: Option<String>,

  #[arg(long)]
  pages: Option<f64>,

  #[arg(long)]
  page_read: Option<f64>,

  #[arg(long)]
  rating: Option<f64>,

  #[arg(long)]
  started: Option<NaiveDate>,

  #[arg(long)]
  finished: Option<NaiveDate>,

  #[arg(long)]
  read: Option<bool>,

  #[arg(long)]
  favorite: Option<bool>,

  #[arg(long)]
  wishlist: Option<bool>,

  /// Cover image: http(s) URL or local file
  #[arg(long)]
  image_url: Option<String>,
}

impl BookFields {
  fn into_draft(self, title: String, author: String) -> BookDraft {
    BookDraft {
      isbn: self.isbn,
      publisher: self.publisher,
      series: self.series,
      bookshelf: self.shelf,
      tags: self.tags,
      genres: self.genres,
      pages: self.pages,
      page_read: self.page_read,
      rating: self.rating,
      started_reading_date: self.started,
      finished_reading_date: self.finished,
      read: self.read.unwrap_or(false),
      favorite: self.favorite.unwrap_or(false),
      is_wishlist: self.wishlist.unwrap_or(false),
      image_url: self.image_url,
      ..BookDraft::new(title, author)
    }
  }

  fn into_patch(self, title: Option<String>, author: Option<String>) -> BookPatch {
    BookPatch {
      title,
      author,
      isbn: self.isbn,
      publisher: self.publisher,
      series: self.series,
      bookshelf: self.shelf,
      tags: self.tags,
      genres: self.genres,
      pages: self.pages,
      page_read: self.page_read,
      rating: self.rating,
      started_reading_date: self.started,
      finished_reading_date: self.finished,
      read: self.read,
      favorite: self.favorite,
      is_wishlist: self.wishlist,
      image_url: self.image_url,
      ..BookPatch::default()
    }
  }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
  let stdout = io::stdout();
  let mut out = stdout.lock();
  serde_json::to_writer_pretty(&mut out, value)?;
  writeln!(out)?;
  Ok(())
}

fn output_writer(path: Option<&Path>) -> io::Result<Box<dyn Write>> {
  Ok(match path {
    Some(path) => Box::new(BufWriter::new(File::create(path)?)),
    None => Box::new(BufWriter::new(io::stdout())),
  })
}

fn guess_format(path: &Path) -> InputFormat {
  match path.extension().and_then(|ext| ext.to_str()) {
    Some(ext) if ext.eq_ignore_ascii_case("json") => InputFormat::Json,
    _ => InputFormat::Csv,
  }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
  let cli = Cli::parse();

  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
    if cli.verbose {
      EnvFilter::new("debug")
    } else {
      EnvFilter::new("info")
    }
  });
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(io::stderr)
    .init();

  let config = Config::load(cli.data_dir.as_deref())?;
  log::debug!("data directory: {}", config.data_dir.display());
  let mut library = Library::open(config)?;

  match cli.command {
    Commands::Import { file, format, delimiter } => {
      let mut input = vec![];
      File::open(&file)?.read_to_end(&mut input)?;
      let summary = match format.unwrap_or_else(|| guess_format(&file)) {
        InputFormat::Csv => {
          let mut options = library.config().import.clone();
          if delimiter.is_some() {
            options.delimiter = delimiter;
          }
          library.import_csv_with(&input, &options)?
        }
        InputFormat::Json => library.import_json(&input)?,
      };
      print_json(&summary)?;
    }
    Commands::Export { output } => {
      let mut writer = output_writer(output.as_deref())?;
      let count = library.export_csv(&mut writer)?;
      writer.flush()?;
      if output.is_some() {
        print_json(&serde_json::json!({ "exportedBooksCount": count }))?;
      }
    }
    Commands::Backup { output } => {
      let mut writer = output_writer(output.as_deref())?;
      let backup = library.backup(&mut writer)?;
      writer.flush()?;
      if output.is_some() {
        print_json(&serde_json::json!({
          "books": backup.books.len(),
          "images": backup.images.len(),
        }))?;
      }
    }
    Commands::Restore { file } => {
      let input = std::fs::read(&file)?;
      print_json(&library.restore_json(&input)?)?;
    }
    Commands::List { wishlist, read, favorite, shelf, text } => {
      let filter = BookFilter { wishlist, read, favorite, shelf, text };
      print_json(&library.list_books(&filter)?)?;
    }
    Commands::Show { id } => {
      let book = library.get_book(id)?.ok_or_else(|| format!("book {} not found", id))?;
      print_json(&book)?;
    }
    Commands::Add { title, author, fields } => {
      print_json(&library.add_book(fields.into_draft(title, author))?)?;
    }
    Commands::Update { ids, title, author, fields } => {
      let patch = fields.into_patch(title, author);
      if let [id] = ids.as_slice() {
        print_json(&library.update_book(*id, patch)?)?;
      } else {
        print_json(&library.bulk_update(&ids, patch)?)?;
      }
    }
    Commands::Delete { ids } => {
      let deleted = library.delete_books(&ids)?;
      print_json(&serde_json::json!({ "deletedBooksCount": deleted }))?;
    }
    Commands::Stats { goal } => {
      print_json(&library.stats(goal)?)?;
    }
    Commands::Search { query, import } => {
      let candidates = library.search_metadata(&query);
      if import {
        let first = candidates.into_iter().next().ok_or("no results")?;
        print_json(&library.import_candidates(vec![first])?)?;
      } else {
        print_json(&candidates)?;
      }
    }
  }

  Ok(())
}
