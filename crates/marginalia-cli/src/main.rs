//! Marginalia CLI
//!
//! - `sync`: mirror the changed books of an annotation export into a document store
//! - `ledger`: inspect and maintain the sync ledger
//! - `show`: print the outline of a synced book

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use marginalia_ledger::{FileLedger, Ledger};
use marginalia_sync::local::{StoredBlock, StoredPage};
use marginalia_sync::{
    BlockKind, ExportSource, LocalDocumentStore, SyncConfig, SyncManager, SyncSummary, Throttled,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "marginalia")]
#[command(
    author,
    version,
    about = "Marginalia: incremental sync of reading notes into block documents"
)]
struct Cli {
    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync every changed book of an export into a document store
    Sync(SyncArgs),

    /// Inspect or maintain the sync ledger
    Ledger {
        #[command(flatten)]
        location: LedgerLocation,
        #[command(subcommand)]
        command: LedgerCommands,
    },

    /// Print the page outline of a synced book
    Show {
        /// Document store JSON file
        #[arg(long)]
        store: PathBuf,
        /// Book id
        #[arg(long)]
        book: String,
    },
}

#[derive(Args)]
struct SyncArgs {
    /// Annotation export JSON file
    #[arg(long)]
    export: PathBuf,
    /// Document store JSON file (created if missing)
    #[arg(long)]
    store: PathBuf,
    #[command(flatten)]
    location: LedgerLocation,
    /// Sync books even if their notes did not change
    #[arg(long)]
    force: bool,
    /// Print the summary as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct LedgerLocation {
    /// Config JSON file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Ledger file, overrides the config
    #[arg(long)]
    ledger: Option<PathBuf>,
}

impl LedgerLocation {
    fn resolve(&self) -> Result<SyncConfig> {
        let mut config = match &self.config {
            Some(path) => SyncConfig::load(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => SyncConfig::default(),
        };
        if let Some(ledger) = &self.ledger {
            config.ledger_path = ledger.clone();
        }
        Ok(config)
    }
}

#[derive(Subcommand)]
enum LedgerCommands {
    /// List the entries of a scope, or every scope
    List {
        #[arg(long)]
        scope: Option<String>,
    },
    /// Forget a scope, or a single logical id inside it
    Forget {
        #[arg(long)]
        scope: String,
        #[arg(long)]
        logical: Option<String>,
    },
    /// Rewrite the ledger log without dead records
    Compact,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Sync(args) => cmd_sync(args),
        Commands::Ledger { location, command } => cmd_ledger(&location, command),
        Commands::Show { store, book } => cmd_show(&store, &book),
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    let level = if quiet {
        tracing::Level::ERROR
    } else {
        match verbose {
            0 => tracing::Level::INFO,
            1 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        }
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn open_ledger(config: &SyncConfig) -> Result<FileLedger> {
    FileLedger::open(&config.ledger_path)
        .with_context(|| format!("opening ledger {}", config.ledger_path.display()))
}

// ============================================================================
// sync
// ============================================================================

fn cmd_sync(args: SyncArgs) -> Result<()> {
    let mut config = args.location.resolve()?;
    config.force |= args.force;

    let ledger = open_ledger(&config)?;
    let source = ExportSource::open(&args.export)
        .with_context(|| format!("reading export {}", args.export.display()))?;
    let store = LocalDocumentStore::open(&args.store)
        .with_context(|| format!("opening store {}", args.store.display()))?;

    let interval = config.call_interval();
    let manager = SyncManager::new(
        Arc::new(Throttled::new(source, interval)),
        Arc::new(Throttled::new(store, interval)),
        Arc::new(ledger),
        config,
    );
    let summary = manager.sync_all().context("sync aborted")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }

    if !summary.is_success() {
        bail!("{} book(s) failed to sync", summary.failed.len());
    }
    Ok(())
}

fn print_summary(summary: &SyncSummary) {
    for report in &summary.synced {
        println!(
            "{} {} ({} recorded, {} retired, {} append calls{})",
            "synced".green().bold(),
            report.book_id.bold(),
            report.recorded,
            report.retired,
            report.append_calls,
            if report.created_page { ", new page" } else { "" },
        );
        if report.orphans > 0 {
            println!(
                "  {} {} annotation(s) without a chapter were skipped",
                "warning".yellow().bold(),
                report.orphans
            );
        }
    }
    for failure in &summary.failed {
        println!(
            "{} {} ({}): {}",
            "failed".red().bold(),
            failure.book_id.bold(),
            failure.title,
            failure.error
        );
    }
    println!(
        "{} synced, {} unchanged, {} failed",
        summary.synced.len(),
        summary.skipped.len(),
        summary.failed.len()
    );
}

// ============================================================================
// ledger
// ============================================================================

fn cmd_ledger(location: &LedgerLocation, command: LedgerCommands) -> Result<()> {
    let config = location.resolve()?;
    let ledger = open_ledger(&config)?;

    match command {
        LedgerCommands::List { scope: Some(scope) } => {
            let entries = ledger.entries(&scope)?;
            if entries.is_empty() {
                println!("{}", format!("no entries for scope {scope}").dimmed());
            }
            for entry in entries {
                println!(
                    "{:<24} {} {}",
                    entry.logical_id,
                    entry.materialized_id,
                    entry.recorded_at.format("%Y-%m-%d %H:%M:%S").to_string().dimmed()
                );
            }
        }
        LedgerCommands::List { scope: None } => {
            for scope in ledger.scopes() {
                let count = ledger.entries(&scope)?.len();
                println!("{:<32} {count} entries", scope.bold());
            }
        }
        LedgerCommands::Forget {
            scope,
            logical: Some(logical),
        } => {
            ledger.delete_entry(&scope, &logical)?;
            println!("{} {scope}/{logical}", "forgot".green().bold());
        }
        LedgerCommands::Forget {
            scope,
            logical: None,
        } => {
            ledger.delete_scope(&scope)?;
            println!("{} scope {scope}", "forgot".green().bold());
        }
        LedgerCommands::Compact => {
            let dropped = ledger.compact()?;
            println!(
                "{} {} ({dropped} dead records dropped)",
                "compacted".green().bold(),
                ledger.path().display()
            );
        }
    }
    Ok(())
}

// ============================================================================
// show
// ============================================================================

/// One printable line of a page outline.
#[derive(Debug, Clone, PartialEq, Eq)]
struct OutlineLine {
    indent: usize,
    kind: BlockKind,
    text: String,
}

fn outline(page: &StoredPage) -> Vec<OutlineLine> {
    let mut lines = Vec::new();
    let mut section = 0;
    for block in &page.blocks {
        let kind = block.payload.kind();
        if let BlockKind::Heading(level) = kind {
            section = usize::from(level);
            push_block(&mut lines, block, section.saturating_sub(1));
        } else {
            push_block(&mut lines, block, section);
        }
    }
    lines
}

fn push_block(lines: &mut Vec<OutlineLine>, block: &StoredBlock, indent: usize) {
    let kind = block.payload.kind();
    let text = match &kind {
        BlockKind::TableOfContents => "[table of contents]".to_string(),
        BlockKind::Divider => "---".to_string(),
        BlockKind::Table => block
            .payload
            .as_json()
            .pointer("/table/children/0")
            .map(|header| marginalia_sync::BlockPayload(header.clone()).plain_text())
            .unwrap_or_default(),
        _ => block.payload.plain_text(),
    };
    lines.push(OutlineLine { indent, kind, text });
    for child in &block.children {
        push_block(lines, child, indent + 1);
    }
}

fn cmd_show(store: &Path, book_id: &str) -> Result<()> {
    let store = LocalDocumentStore::open(store)
        .with_context(|| format!("opening store {}", store.display()))?;
    let Some(page) = store.page_for(book_id) else {
        bail!("no page for book {book_id}");
    };

    let props = &page.properties;
    println!("{} {}", props.title.bold(), format!("({})", props.author).dimmed());
    if let Some(status) = &props.status {
        let time = props.reading_time.as_deref().unwrap_or_default();
        println!("{}", format!("{status}, {time} read").dimmed());
    }
    println!("{}", props.url.dimmed());
    for line in outline(&page) {
        let pad = "  ".repeat(line.indent);
        let text = match line.kind {
            BlockKind::Heading(_) => line.text.cyan().bold(),
            BlockKind::Quote => format!("> {}", line.text).italic(),
            BlockKind::Divider | BlockKind::TableOfContents => line.text.dimmed(),
            BlockKind::Table | BlockKind::TableRow => line.text.normal(),
            _ => format!("- {}", line.text).normal(),
        };
        println!("{pad}{text}");
    }
    Ok(())
}
