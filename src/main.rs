mod config;
mod dates;
mod embed;
mod engine;
mod ingest;
mod ledger;
mod message;
mod models;
mod ner;
mod reminder;
mod rules;
mod source;
mod state;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use config::Settings;
use engine::create_engine;
use ingest::Ingestor;
use ledger::SqliteStore;
use message::normalize;
use source::{JsonDirSource, read_message_file};
use state::StateStore;

#[derive(Parser)]
#[command(name = "applog")]
#[command(about = "Application email tracker - classify, extract, and log application events")]
struct Cli {
    /// Path to the config file (default: APPLOG_CONFIG or the XDG config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one ingestion pass over the mail source
    Run {
        /// Override the configured extraction engine (rules, ner, semantic)
        #[arg(short, long)]
        engine: Option<String>,

        /// Do not create reminders; print what would be created
        #[arg(long)]
        dry_run: bool,
    },

    /// Parse a single message file and print the extracted record
    Parse {
        /// Provider-shaped JSON message file
        file: PathBuf,

        /// Override the configured extraction engine
        #[arg(short, long)]
        engine: Option<String>,
    },

    /// List ledger rows
    List {
        /// Filter by status (Applied, Interview, OA, Rejected, Offer, Other)
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Show one ledger row by its source message id
    Show {
        /// Source message id (the ledger key)
        email_id: String,
    },

    /// Export the ledger as CSV
    Export {
        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show processing state
    State,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run { engine, dry_run } => {
            if let Some(name) = engine {
                settings.nlp.engine = name;
            }
            let engine = create_engine(&settings)?;
            let source = JsonDirSource::new(&settings.mail.source_dir);
            let store = SqliteStore::open(settings.ledger.db_path.as_deref())?;
            let state_store = StateStore::new(StateStore::default_path()?);
            let mut state = state_store.load()?;

            println!(
                "Ingesting from {} with the '{}' engine...",
                settings.mail.source_dir.display(),
                engine.name()
            );
            let ingestor = Ingestor {
                engine: engine.as_ref(),
                source: &source,
                ledger: &store,
                reminders: &store,
                settings: &settings,
                state_store: &state_store,
            };
            let stats = ingestor.run(&mut state, dry_run)?;

            println!("\nResults:");
            println!("  Messages fetched:   {}", stats.fetched);
            println!("  Already processed:  {}", stats.skipped);
            println!("  Newly logged:       {}", stats.processed);
            if dry_run || settings.app.dry_run {
                println!("\n(Dry run - no reminders were actually created)");
            }
        }

        Commands::Parse { file, engine } => {
            if let Some(name) = engine {
                settings.nlp.engine = name;
            }
            let engine = create_engine(&settings)?;
            let msg = read_message_file(&file)?;
            let email = normalize(&msg);
            let parsed = engine.parse(&email.subject, &email.sender, &email.body, msg.received_at());

            println!("Engine:  {}", engine.name());
            println!("Subject: {}", email.subject);
            println!("Sender:  {}", email.sender);
            println!("Status:  {}", parsed.status);
            println!("Company: {}", parsed.company);
            println!("Role:    {}", parsed.role);
            println!("Applied: {}", parsed.date_applied.date_naive());
        }

        Commands::List { status } => {
            let status = status
                .map(|s| s.parse::<models::Status>())
                .transpose()
                .with_context(|| {
                    format!(
                        "Valid statuses: {}",
                        models::Status::all().map(|s| s.as_str()).join(", ")
                    )
                })?;
            let store = SqliteStore::open(settings.ledger.db_path.as_deref())?;
            let rows = store.list_rows(status.map(|s| s.as_str()))?;
            if rows.is_empty() {
                println!("No ledger rows found.");
            } else {
                println!(
                    "{:<12} {:<20} {:<28} {:<12} {:<12}",
                    "STATUS", "COMPANY", "ROLE", "APPLIED", "FOLLOW-UP"
                );
                println!("{}", "-".repeat(88));
                for row in rows {
                    println!(
                        "{:<12} {:<20} {:<28} {:<12} {:<12}",
                        row.status.as_str(),
                        truncate(&row.company, 18),
                        truncate(&row.role, 26),
                        row.date_applied,
                        row.followup_due
                    );
                }
            }
        }

        Commands::Show { email_id } => {
            let store = SqliteStore::open(settings.ledger.db_path.as_deref())?;
            match store.get_row(&email_id)? {
                Some(row) => {
                    println!("EmailId:     {}", row.email_id);
                    println!("ThreadId:    {}", row.thread_id);
                    println!("Company:     {}", row.company);
                    println!("Role:        {}", row.role);
                    println!("Status:      {}", row.status);
                    println!("Applied:     {}", row.date_applied);
                    println!("Follow-up:   {}", row.followup_due);
                    println!("Logged:      {}", row.timestamp);
                    if !row.notes.is_empty() {
                        println!("Notes:       {}", row.notes);
                    }
                }
                None => println!("No ledger row for message '{}'.", email_id),
            }
        }

        Commands::Export { output } => {
            let store = SqliteStore::open(settings.ledger.db_path.as_deref())?;
            let rows = store.list_rows(None)?;
            let csv = SqliteStore::to_csv(&rows);
            match output {
                Some(path) => {
                    std::fs::write(&path, csv)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    println!("Exported {} row(s) to {}", rows.len(), path.display());
                }
                None => print!("{}", csv),
            }
        }

        Commands::State => {
            let state_store = StateStore::new(StateStore::default_path()?);
            let state = state_store.load()?;
            println!("State file: {}", state_store.path().display());
            println!("Processed messages: {}", state.processed_ids.len());
            match &state.last_message_id {
                Some(id) => println!("Last message id: {}", id),
                None => println!("Last message id: (none)"),
            }
            let store = SqliteStore::open(settings.ledger.db_path.as_deref())?;
            println!("Ledger db: {} ({} row(s))", store.path().display(), store.count_rows()?);
        }
    }

    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
