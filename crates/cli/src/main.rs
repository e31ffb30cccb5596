//! Folio CLI - reading progress for EPUB books.

use std::path::{Path, PathBuf};
use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use folio_core::{BookId, Chapter, ChapterId, ReadingProgress, SessionState, UserId};
use folio_progress::{CfiAddress, ProgressConfig, ProgressWarning, ReadingProgressEngine};
use folio_storage::{JsonStorage, Storage};

#[derive(Parser)]
#[command(name = "folio")]
#[command(about = "Reading progress tracking for EPUB books", long_about = None)]
struct Cli {
    /// Data directory
    #[arg(long, global = true, default_value = ".folio")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// A reader and a book.
#[derive(Args)]
struct Target {
    /// Reader ID
    #[arg(long)]
    user: UserId,
    /// Book ID (ULID)
    #[arg(long)]
    book: BookId,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a progress record for a reader opening a book
    Init {
        #[command(flatten)]
        target: Target,
    },
    /// Import a book's chapter list from a JSON file
    ImportChapters {
        /// Book ID (ULID)
        #[arg(long)]
        book: BookId,
        /// JSON array of chapters
        file: PathBuf,
    },
    /// Record a new reading position
    Position {
        #[command(flatten)]
        target: Target,
        /// Position as an epubcfi(...) string
        cfi: String,
        /// Chapter to record instead of the one derived from the CFI
        #[arg(long)]
        chapter: Option<ChapterId>,
        /// Reading minutes to add
        #[arg(long)]
        minutes: Option<u64>,
    },
    /// Mark a chapter as completed
    Complete {
        #[command(flatten)]
        target: Target,
        /// Chapter ID
        chapter: ChapterId,
    },
    /// Mark a completed chapter as unread again
    Reopen {
        #[command(flatten)]
        target: Target,
        /// Chapter ID
        chapter: ChapterId,
    },
    /// Start a reading session
    Start {
        #[command(flatten)]
        target: Target,
    },
    /// Stop the reading session
    Stop {
        #[command(flatten)]
        target: Target,
    },
    /// Show reading statistics
    Stats {
        #[command(flatten)]
        target: Target,
    },
    /// Validate a CFI and show how it is read
    CheckCfi {
        /// Position as an epubcfi(...) string
        cfi: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    if let Commands::CheckCfi { cfi } = &cli.command {
        return check_cfi(cfi);
    }

    let engine = ReadingProgressEngine::new().with_config(load_config(&cli.data_dir)?)?;
    let mut storage = JsonStorage::new(&cli.data_dir).await?;

    match cli.command {
        Commands::Init { target } => {
            if storage.load_progress(&target.user, target.book).await?.is_some() {
                println!("Progress for {} on {} already exists", target.user, target.book);
                return Ok(());
            }
            let progress = ReadingProgress::new(target.user, target.book);
            storage.save_progress(&progress).await?;
            storage.commit("Create progress").await?;
            println!("Created progress {}", progress.id);
        }
        Commands::ImportChapters { book, file } => {
            let json = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let chapters: Vec<Chapter> = serde_json::from_str(&json)
                .with_context(|| format!("parsing chapters from {}", file.display()))?;
            if chapters.is_empty() {
                bail!("{} contains no chapters", file.display());
            }
            storage.save_chapters(book, &chapters).await?;
            storage.commit("Import chapters").await?;
            println!("Imported {} chapters for {}", chapters.len(), book);
        }
        Commands::Position { target, cfi, chapter, minutes } => {
            let chapters = load_chapters(&storage, target.book).await?;
            let mut progress = load_progress(&storage, &target).await?;
            let outcome = engine.update_position(&mut progress, &cfi, chapter, minutes, &chapters)?;
            report_warnings(&outcome.warnings);
            storage.save_progress(&progress).await?;
            storage.commit("Update position").await?;
            println!(
                "Position: {:.2}% (position {:.2}%, chapters {:.2}%)",
                progress.overall_progress_percent,
                progress.cfi_progress_percent,
                progress.chapter_progress_percent,
            );
        }
        Commands::Complete { target, chapter } => {
            let chapters = load_chapters(&storage, target.book).await?;
            let mut progress = load_progress(&storage, &target).await?;
            let outcome = engine.complete_chapter(&mut progress, &chapter, &chapters)?;
            report_warnings(&outcome.warnings);
            storage.save_progress(&progress).await?;
            storage.commit("Complete chapter").await?;
            if outcome.changed {
                println!("Completed {}: {:.2}% overall", chapter, progress.overall_progress_percent);
            } else {
                println!("{} was already completed", chapter);
            }
        }
        Commands::Reopen { target, chapter } => {
            let chapters = load_chapters(&storage, target.book).await?;
            let mut progress = load_progress(&storage, &target).await?;
            let outcome = engine.reopen_chapter(&mut progress, &chapter, &chapters)?;
            report_warnings(&outcome.warnings);
            storage.save_progress(&progress).await?;
            storage.commit("Reopen chapter").await?;
            println!("Reopened {}: {:.2}% overall", chapter, progress.overall_progress_percent);
        }
        Commands::Start { target } => {
            let mut progress = load_progress(&storage, &target).await?;
            let already_open = progress.session_state() == SessionState::InSession;
            engine.start_session(&mut progress);
            storage.save_progress(&progress).await?;
            storage.commit("Start session").await?;
            if already_open {
                println!("Session already running");
            } else {
                println!("Session started");
            }
        }
        Commands::Stop { target } => {
            let mut progress = load_progress(&storage, &target).await?;
            let minutes = engine.end_session(&mut progress);
            storage.save_progress(&progress).await?;
            storage.commit("End session").await?;
            println!(
                "Session stopped: +{} min ({} min total)",
                minutes, progress.total_reading_time_minutes
            );
        }
        Commands::Stats { target } => {
            let chapters = load_chapters(&storage, target.book).await?;
            let progress = load_progress(&storage, &target).await?;
            let stats = engine.get_stats(&progress, &chapters);

            println!("Book {}", target.book);
            println!("  Overall: {:.2}%", stats.overall_progress_percent);
            println!("  Position: {:.2}%", stats.cfi_progress_percent);
            println!("  Chapters: {}/{} ({:.2}%)",
                stats.completed_chapters,
                stats.total_chapters,
                stats.chapter_progress_percent,
            );
            println!("  Current chapter: {}", stats.current_chapter_title);
            println!("  Reading time: {} min", stats.total_reading_time_minutes);
            println!("  Time to finish: ~{} min", stats.estimated_time_to_complete_minutes);
            println!("  Session: {}", format_state(stats.session_state));
            println!("  Last read: {}", stats.last_read_at);
        }
        Commands::CheckCfi { .. } => unreachable!("handled before storage is opened"),
    }

    Ok(())
}

fn check_cfi(raw: &str) -> Result<()> {
    match CfiAddress::parse(raw) {
        Ok(addr) => {
            println!("Valid CFI");
            println!("  Canonical: {}", addr);
            println!("  Spine index: {}", addr.spine_index());
            println!("  Path depth: {}", addr.path().len());
            if let Some(offset) = addr.offset() {
                println!("  Offset: {}", offset);
            }
            Ok(())
        }
        Err(e) => bail!("Invalid CFI: {}", e),
    }
}

fn load_config(data_dir: &Path) -> Result<ProgressConfig> {
    let path = data_dir.join("config.json");
    match std::fs::read_to_string(&path) {
        Ok(json) => {
            info!("Loading configuration from {}", path.display());
            serde_json::from_str(&json).with_context(|| format!("parsing {}", path.display()))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ProgressConfig::default()),
        Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
    }
}

async fn load_progress(storage: &JsonStorage, target: &Target) -> Result<ReadingProgress> {
    let Some(progress) = storage.load_progress(&target.user, target.book).await? else {
        bail!("No progress for {} on {}; run `folio init` first", target.user, target.book);
    };
    Ok(progress)
}

async fn load_chapters(storage: &JsonStorage, book: BookId) -> Result<Vec<Chapter>> {
    let Some(chapters) = storage.load_chapters(book).await? else {
        bail!("No chapters for {}; run `folio import-chapters` first", book);
    };
    Ok(chapters)
}

fn report_warnings(warnings: &[ProgressWarning]) {
    for warning in warnings {
        warn!("{}", warning);
    }
}

fn format_state(state: SessionState) -> &'static str {
    match state {
        SessionState::Idle => "IDLE",
        SessionState::InSession => "IN SESSION",
    }
}
