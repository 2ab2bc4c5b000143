//! Bible CLI - Command-line interface for the offline bible reader.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use bible_core::{Book, NewCommentary, ReaderConfig, StoreName, SyncSnapshot};
use bible_query::{QueryConfig, QueryOutcome, ReaderData, SubmitOutcome};
use bible_remote::SqliteRemote;
use bible_store::SqliteStore;
use bible_sync::{SyncController, SyncReport, SyncStage};

type Reader = ReaderData<SqliteStore, SqliteRemote>;
type Controller = SyncController<SqliteStore, SqliteRemote>;

/// Bible - Offline-first scripture reader
#[derive(Parser)]
#[command(name = "bible")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (default: platform config dir, then ./bible-reader.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Local store path (overrides config)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Canonical database path (overrides config)
    #[arg(long, global = true)]
    remote: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Seed the canonical database from a JSON snapshot
    Import {
        /// Snapshot file with verses, commentaries and themes
        snapshot: PathBuf,
    },

    /// Copy the canonical data into the local store
    Sync {
        /// Sync again even if a previous run completed
        #[arg(short, long)]
        force: bool,
    },

    /// Show sync state and local store contents
    Status,

    /// Print the verses of a chapter
    Verses {
        /// Book short name or full title
        book: String,

        /// Chapter number
        chapter: u32,
    },

    /// Print the themes of a book
    Themes {
        /// Book short name or full title
        book: String,
    },

    /// List the chapters of a book
    Chapters {
        /// Book short name or full title
        book: String,
    },

    /// Search verse text
    Search {
        /// Text to look for (at least two characters)
        text: String,
    },

    /// Read and write commentaries
    Commentary {
        #[command(subcommand)]
        action: CommentaryAction,
    },
}

#[derive(Subcommand)]
enum CommentaryAction {
    /// List commentaries on a verse
    List {
        /// Verse id
        verse_id: i64,
    },

    /// Add a commentary to a verse
    Add {
        /// Book short name or full title
        book: String,

        /// Chapter number
        chapter: u32,

        /// Verse number
        verse: u32,

        /// Author name
        #[arg(long)]
        author: String,

        /// Commentary text
        #[arg(long)]
        text: String,
    },
}

fn setup_logging(verbose: bool) {
    let builder = FmtSubscriber::builder()
        .with_target(false)
        .with_writer(std::io::stderr);

    if std::env::var_os("RUST_LOG").is_some() {
        let subscriber = builder.with_env_filter(EnvFilter::from_default_env()).finish();
        tracing::subscriber::set_global_default(subscriber).ok();
    } else {
        let level = if verbose { Level::DEBUG } else { Level::WARN };
        let subscriber = builder.with_max_level(level).finish();
        tracing::subscriber::set_global_default(subscriber).ok();
    }
}

fn load_config(cli: &Cli) -> Result<ReaderConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => ReaderConfig::load(path)?,
        None => ReaderConfig::load_default()?,
    };

    if let Some(path) = &cli.store {
        config.store.path = path.clone();
    }
    if let Some(path) = &cli.remote {
        config.remote.path = path.clone();
    }

    Ok(config)
}

/// Full title for a book argument; unknown names pass through unchanged.
fn book_name(arg: &str) -> String {
    match Book::resolve(arg) {
        Some(book) => book.name.to_string(),
        None => arg.trim().to_string(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let config = load_config(&cli)?;

    let remote = Arc::new(SqliteRemote::open(&config.remote.path)?);

    if let Commands::Import { snapshot } = &cli.command {
        import(&remote, snapshot).await?;
        return Ok(());
    }

    let store = Arc::new(SqliteStore::open_with_config(&config.store)?);
    let controller = SyncController::new(Arc::clone(&store), Arc::clone(&remote));
    let data = ReaderData::new(Arc::clone(&store), remote, QueryConfig::from(&config));

    let reads_data = !matches!(cli.command, Commands::Sync { .. } | Commands::Status);
    if config.sync.auto_sync && reads_data {
        if let Err(e) = controller.ensure_synced(|_| {}).await {
            warn!("Automatic sync failed, reading from the canonical database: {}", e);
        }
    }

    match cli.command {
        Commands::Import { .. } => {}
        Commands::Sync { force } => {
            sync(&controller, force).await;
        }
        Commands::Status => {
            status(&store, &controller).await?;
        }
        Commands::Verses { book, chapter } => {
            let outcome = data.get_verses_for(&book_name(&book), chapter).await;
            print_outcome(outcome, |v| format!("{:>3}  {}", v.verse, v.text));
        }
        Commands::Themes { book } => {
            let outcome = data.get_themes_for(&book_name(&book)).await;
            print_outcome(outcome, |t| format!("{:>3}  {}", t.chapter, t.topic));
        }
        Commands::Chapters { book } => {
            let outcome = data.chapters_for(&book_name(&book)).await;
            print_outcome(outcome, |c| c.to_string());
        }
        Commands::Search { text } => {
            let outcome = data.search(&text).await;
            print_outcome(outcome, |v| {
                format!("{} {}:{}  {}", v.book, v.chapter, v.verse, v.text)
            });
        }
        Commands::Commentary { action } => match action {
            CommentaryAction::List { verse_id } => {
                let outcome = data.commentaries_for(verse_id).await;
                print_outcome(outcome, |c| format!("[{}] {}: {}", c.id, c.author, c.text));
            }
            CommentaryAction::Add {
                book,
                chapter,
                verse,
                author,
                text,
            } => {
                add_commentary(&data, &book_name(&book), chapter, verse, &author, &text).await;
            }
        },
    }

    Ok(())
}

async fn import(remote: &SqliteRemote, path: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let content = fs::read_to_string(path)?;
    let snapshot: SyncSnapshot = serde_json::from_str(&content)?;

    let (verses, commentaries, themes) = (
        snapshot.verses.len(),
        snapshot.commentaries.len(),
        snapshot.themes.len(),
    );

    remote.import_snapshot(snapshot).await?;
    println!(
        "Imported {} verses, {} commentaries, {} themes from {}",
        verses,
        commentaries,
        themes,
        path.display()
    );
    Ok(())
}

fn print_progress(stage: SyncStage) {
    println!("[{:>3}%] {}", stage.percent(), stage);
}

fn print_report(report: &SyncReport) {
    println!(
        "Synced {} verses, {} commentaries, {} themes in {}ms",
        report.verses,
        report.commentaries,
        report.themes,
        report.elapsed.as_millis()
    );
}

async fn sync(controller: &Controller, force: bool) {
    let result = if force {
        controller.run_sync(print_progress).await.map(Some)
    } else {
        controller.ensure_synced(print_progress).await
    };

    match result {
        Ok(Some(report)) => print_report(&report),
        Ok(None) => println!("Already synced"),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

async fn status(store: &SqliteStore, controller: &Controller) -> Result<(), Box<dyn std::error::Error>> {
    match bible_sync::read_status(store).await {
        Ok(Some(s)) if s.completed => println!("Sync:           completed at {} (unix ms)", s.timestamp),
        Ok(_) => println!("Sync:           not synced"),
        Err(e) => println!("Sync:           unreadable ({})", e),
    }
    println!("State:          {:?}", controller.state());
    println!("Store:          {}", store.path().display());
    println!("Schema version: {}", store.schema_version().await?);

    for name in StoreName::ALL {
        println!("{:<15} {}", format!("{}:", name), store.count(name).await?);
    }
    Ok(())
}

async fn add_commentary(
    data: &Reader,
    book: &str,
    chapter: u32,
    verse: u32,
    author: &str,
    text: &str,
) {
    let verse_id = match data.find_verse(book, chapter, verse).await {
        QueryOutcome::Found(verses) => verses[0].id,
        QueryOutcome::Empty => fail(&format!("No verse {} {}:{}", book, chapter, verse)),
        other => {
            report_failure(&other);
            return;
        }
    };

    match data
        .submit_commentary(NewCommentary::new(verse_id, author, text))
        .await
    {
        SubmitOutcome::Saved { id } => println!("Saved commentary {}", id),
        SubmitOutcome::Invalid(errors) => {
            for error in &errors {
                eprintln!("Invalid {}", error);
            }
            std::process::exit(1);
        }
        SubmitOutcome::Failed { reason } => fail(&reason),
    }
}

fn print_outcome<T, F>(outcome: QueryOutcome<T>, format: F)
where
    F: Fn(&T) -> String,
{
    match outcome {
        QueryOutcome::Found(records) => {
            for record in &records {
                println!("{}", format(record));
            }
        }
        QueryOutcome::Empty => println!("No results"),
        other => report_failure(&other),
    }
}

fn report_failure<T>(outcome: &QueryOutcome<T>) {
    match outcome {
        QueryOutcome::TimedOut { after } => fail(&format!(
            "Request timed out after {}s, try again",
            after.as_secs()
        )),
        QueryOutcome::Failed { reason } => fail(reason),
        QueryOutcome::Found(_) | QueryOutcome::Empty => {}
    }
}

fn fail(message: &str) -> ! {
    eprintln!("Error: {}", message);
    std::process::exit(1);
}
