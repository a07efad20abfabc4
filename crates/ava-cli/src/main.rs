//! Ava - command-line interface
//!
//! The `ava` command talks to Ava and inspects its state.
//!
//! ## Commands
//!
//! - `chat`: Interactive conversation
//! - `analyze`: Emotional analysis of a piece of text
//! - `status`: System status as JSON
//! - `memory`: List, show and search memories
//! - `backup`: Create, list and restore memory backups

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use ava_core::backup::BackupManager;
use ava_core::obs;
use ava_core::telemetry::{init_tracing, LoggingOptions};
use ava_core::{
    client_from_config, ConversationHandler, EmotionAnalyzer, EmotionalContext, FileMemoryStore,
    Memory, MemoryManager, MemoryQuery, MemoryType, Orchestrator, Settings,
};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{Instrument, Level};

/// Characters of memory content shown in listings.
const SNIPPET_CHARS: usize = 72;

#[derive(Parser)]
#[command(name = "ava")]
#[command(version = ava_core::VERSION)]
#[command(about = "Ava - An autonomous AI being", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// TOML configuration file (overrides AVA_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive conversation with Ava
    Chat {
        /// Language model to use instead of the configured one
        #[arg(long)]
        model: Option<String>,
    },

    /// Analyze the emotional content of a text
    Analyze {
        /// Text to analyze
        text: String,
    },

    /// Show the system status
    Status,

    /// Inspect memories
    Memory {
        #[command(subcommand)]
        action: MemoryAction,
    },

    /// Manage memory backups
    Backup {
        #[command(subcommand)]
        action: BackupAction,
    },
}

#[derive(Subcommand)]
enum MemoryAction {
    /// List memories, newest first
    List {
        /// Only memories of this type (core, personal, conversation, ...)
        #[arg(long = "type")]
        memory_type: Option<MemoryType>,

        /// Maximum number of memories to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Show one memory as JSON
    Show {
        /// Memory id
        id: String,
    },

    /// Search memories by similarity
    Search {
        /// Search text
        query: String,

        /// Minimum similarity in [0, 1]
        #[arg(long, default_value_t = 0.1)]
        min_similarity: f64,
    },
}

#[derive(Subcommand)]
enum BackupAction {
    /// Back up all memories
    Create {
        /// Free-form description stored with the backup
        #[arg(short, long, default_value = "")]
        description: String,
    },

    /// List backups, newest first
    List,

    /// Replace the current memories with a backup
    Restore {
        /// Backup id
        id: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut settings =
        Settings::load(cli.config.as_deref()).context("Failed to load configuration")?;

    // Keep the terminal quiet unless asked; chat output shares it.
    let level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    init_tracing(&LoggingOptions {
        level,
        json: cli.json,
        log_dir: None,
    })
    .context("Failed to initialise logging")?;

    let mut stdout = std::io::stdout();
    match cli.command {
        Commands::Chat { model } => {
            if let Some(model) = model {
                settings.llm.model = model;
                settings.validate().context("Invalid --model")?;
            }
            cmd_chat(&settings).await
        }
        Commands::Analyze { text } => cmd_analyze(&settings, &text, &mut stdout),
        Commands::Status => cmd_status(&settings, &mut stdout).await,
        Commands::Memory { action } => cmd_memory(&settings, action, &mut stdout).await,
        Commands::Backup { action } => cmd_backup(&settings, action, &mut stdout),
    }
}

// ---------------------------------------------------------------------------
// analyze
// ---------------------------------------------------------------------------

fn cmd_analyze(settings: &Settings, text: &str, out: &mut impl Write) -> Result<()> {
    let analyzer = EmotionAnalyzer::new(settings.emotional.sentiment_model.clone());
    let ctx = analyzer.analyze(text)?;
    print_emotional_context(&ctx, out)
}

fn print_emotional_context(ctx: &EmotionalContext, out: &mut impl Write) -> Result<()> {
    writeln!(out, "Emotional Context")?;
    writeln!(out, "  Primary Emotion: {}", ctx.primary)?;
    writeln!(out, "  Intensity: {:.2}", ctx.intensity)?;
    writeln!(out, "  Valence: {:.2}", ctx.valence)?;
    writeln!(out, "  Arousal: {:.2}", ctx.arousal)?;
    writeln!(out, "  Confidence: {:.2}", ctx.confidence)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// chat
// ---------------------------------------------------------------------------

async fn cmd_chat(settings: &Settings) -> Result<()> {
    settings
        .setup_directories()
        .context("Failed to create data directories")?;
    let llm = client_from_config(&settings.llm).context("Failed to set up language model")?;
    let orchestrator = Orchestrator::from_settings(settings)?;
    orchestrator.start().await.context("Failed to start Ava")?;

    let mut handler = orchestrator.conversation(llm);
    let analyzer = EmotionAnalyzer::new(settings.emotional.sentiment_model.clone());
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut stdout = std::io::stdout();
    let span = obs::session_span(&format!("chat-{}", std::process::id()));
    let session = chat_loop(&mut handler, &analyzer, stdin, &mut stdout).instrument(span);

    let outcome = tokio::select! {
        result = session => result,
        _ = tokio::signal::ctrl_c() => {
            println!("\nChat session interrupted");
            Ok(())
        }
    };

    if let Err(e) = handler.end_conversation().await {
        tracing::warn!(error = %e, "failed to store conversation summary");
    }
    orchestrator.shutdown().await;
    outcome
}

/// Read messages from `input` until `exit`, `quit` or end of input.
async fn chat_loop<R, W>(
    handler: &mut ConversationHandler,
    analyzer: &EmotionAnalyzer,
    input: R,
    out: &mut W,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    writeln!(
        out,
        "Welcome to Ava! Type 'exit' or 'quit' to end the conversation."
    )?;
    let mut lines = input.lines();
    loop {
        write!(out, "\nYou: ")?;
        out.flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let message = line.trim();
        if message.is_empty() {
            continue;
        }
        if message.eq_ignore_ascii_case("exit") || message.eq_ignore_ascii_case("quit") {
            break;
        }

        let emotion = analyzer.analyze(message)?;
        writeln!(out, "\nEmotional Analysis:")?;
        writeln!(out, "  Primary Emotion: {}", emotion.primary)?;
        writeln!(out, "  Intensity: {:.2}", emotion.intensity)?;

        let reply = handler.process_message(message).await;
        writeln!(out, "\nAva: {reply}")?;
    }
    writeln!(out, "\nGoodbye!")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// status
// ---------------------------------------------------------------------------

async fn cmd_status(settings: &Settings, out: &mut impl Write) -> Result<()> {
    let orchestrator = Orchestrator::from_settings(settings)?;
    orchestrator
        .initialize()
        .await
        .context("Failed to load Ava's state")?;
    orchestrator.check_system_health().await;
    let status = orchestrator.get_system_status().await?;
    writeln!(out, "{}", serde_json::to_string_pretty(&status)?)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// memory
// ---------------------------------------------------------------------------

async fn open_store(settings: &Settings) -> Result<FileMemoryStore> {
    let store = FileMemoryStore::from_settings(settings)?;
    store
        .initialize()
        .await
        .with_context(|| format!("Failed to open memory store {}", store.root().display()))?;
    Ok(store)
}

fn snippet(memory: &Memory) -> String {
    let flat = memory.content.replace('\n', " ");
    if flat.chars().count() > SNIPPET_CHARS {
        let cut: String = flat.chars().take(SNIPPET_CHARS - 3).collect();
        format!("{cut}...")
    } else {
        flat
    }
}

async fn cmd_memory(
    settings: &Settings,
    action: MemoryAction,
    out: &mut impl Write,
) -> Result<()> {
    let store = open_store(settings).await?;
    match action {
        MemoryAction::List { memory_type, limit } => {
            let mut query = MemoryQuery::all().with_limit(limit);
            if let Some(t) = memory_type {
                query = query.with_type(t);
            }
            let memories = store.get_memories(&query).await?;
            if memories.is_empty() {
                writeln!(out, "No memories found.")?;
            }
            for m in &memories {
                writeln!(
                    out,
                    "{}  [{}]  {:.2}  {}",
                    m.id,
                    m.memory_type,
                    m.importance,
                    snippet(m)
                )?;
            }
        }
        MemoryAction::Show { id } => {
            let memory = store
                .get_memory(&id)
                .await?
                .with_context(|| format!("Memory not found: {id}"))?;
            writeln!(out, "{}", serde_json::to_string_pretty(&memory)?)?;
        }
        MemoryAction::Search {
            query,
            min_similarity,
        } => {
            let hits = store.search_memories(&query, min_similarity).await?;
            if hits.is_empty() {
                writeln!(out, "No matching memories.")?;
            }
            for (m, similarity) in &hits {
                writeln!(out, "{similarity:.2}  {}  {}", m.id, snippet(m))?;
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// backup
// ---------------------------------------------------------------------------

fn cmd_backup(settings: &Settings, action: BackupAction, out: &mut impl Write) -> Result<()> {
    let backups = BackupManager::new(settings.memory_dir(), settings.backup_dir());
    match action {
        BackupAction::Create { description } => {
            let id = backups.create_backup(&description)?;
            writeln!(out, "Created backup {id}")?;
        }
        BackupAction::List => {
            let manifests = backups.list_backups()?;
            if manifests.is_empty() {
                writeln!(out, "No backups found.")?;
            }
            for m in &manifests {
                writeln!(
                    out,
                    "{}  {}  {} memories  {}",
                    m.id,
                    m.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    m.memory_count,
                    m.description
                )?;
            }
        }
        BackupAction::Restore { id } => {
            let manifest = backups
                .restore_from_backup(&id)
                .with_context(|| format!("Failed to restore backup {id}"))?;
            writeln!(
                out,
                "Restored backup {} ({} memories)",
                manifest.id, manifest.memory_count
            )?;
        }
    }
    Ok(())
}
