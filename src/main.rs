//! Daily Quiz - daily practice questions over Telegram
//!
//! Entry point for the bot process and its administrative commands.

use anyhow::Context;
use clap::{Parser, Subcommand};
use daily_quiz_core::{
    error::Result,
    quiz::{read_corpus, write_corpus},
    BotConfig, BotServices, CorpusEntry, Credentials, DeliveryScheduler, LlmEvaluator,
    ProgressTracker, QuestionFormatter, QuestionStore, QuizBot, SqliteStore, TelegramClient,
    UserId, UserRegistry,
};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, Level};
use tracing_subscriber::{self, EnvFilter};

#[derive(Parser)]
#[command(name = "daily-quiz")]
#[command(about = "Daily practice-question chat bot with LLM-judged answers", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Set log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Configuration file (TOML); missing files fall back to defaults
    #[arg(short, long, default_value = "daily-quiz.toml")]
    config: PathBuf,

    /// Database path (overrides the configured one)
    #[arg(long, env = "DAILY_QUIZ_DB_PATH")]
    db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bot: update dispatcher plus daily delivery scheduler
    Serve,

    /// Initialize database
    Init,

    /// Seed questions from a JSON corpus file
    Import {
        /// Corpus file (array of question entries)
        file: PathBuf,
    },

    /// Export all questions to a JSON corpus file
    Export {
        /// Output path
        file: PathBuf,
    },

    /// Show registered user count
    Users,

    /// Show progress stats of one user
    Stats {
        /// Telegram user id
        telegram_id: i64,
    },

    /// Run one delivery pass now
    Deliver,
}

async fn open_store(config: &BotConfig) -> Result<Arc<SqliteStore>> {
    let path = &config.database.path;
    let store = SqliteStore::open(path)
        .with_context(|| format!("Failed to open database at {}", path.display()))?;
    store
        .init_schema()
        .await
        .context("Failed to initialize storage")?;
    Ok(Arc::new(store))
}

/// Formatter snapshot from the configured corpus, or an empty one
fn load_formatter(config: &BotConfig) -> Result<QuestionFormatter> {
    match &config.quiz.corpus_path {
        Some(path) => Ok(QuestionFormatter::from_entries(&read_corpus(path)?)),
        None => {
            debug!("No corpus configured, question texts are shown as stored");
            Ok(QuestionFormatter::empty())
        }
    }
}

async fn serve(config: BotConfig) -> Result<()> {
    // Fail before touching anything else when a credential is missing
    let credentials = Credentials::from_env().context("Cannot start the bot")?;

    let store = open_store(&config).await?;
    let formatter = Arc::new(load_formatter(&config)?);
    let evaluator = Arc::new(LlmEvaluator::new(
        config.llm_config(credentials.openai_api_key),
    )?);
    let transport = Arc::new(TelegramClient::new(
        config.telegram_config(credentials.telegram_token),
    )?);

    let services = BotServices {
        store: store.clone(),
        registry: store,
        evaluator,
        transport,
        formatter,
    };
    let scheduler = Arc::new(services.scheduler(config.scheduler.clone()));
    let bot = Arc::new(QuizBot::new(
        services,
        config.quiz.tracks.clone(),
        Arc::clone(&scheduler),
    ));

    let scheduler_task = {
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move { scheduler.start().await })
    };

    // Run bot with graceful shutdown on signals
    tokio::select! {
        result = Arc::clone(&bot).run() => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal, stopping bot gracefully...");
        }
    }

    scheduler.stop();
    match scheduler_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Scheduler ended with error: {}", e),
        Err(e) => error!("Scheduler task failed: {}", e),
    }

    info!("Bot shut down complete");
    Ok(())
}

async fn deliver(config: BotConfig) -> Result<()> {
    let token = Credentials::telegram_token_from_env().context("Cannot deliver questions")?;
    let store = open_store(&config).await?;
    let transport = Arc::new(TelegramClient::new(config.telegram_config(token))?);

    let scheduler = DeliveryScheduler::new(
        store.clone(),
        store,
        transport,
        Arc::new(load_formatter(&config)?),
        config.scheduler.clone(),
    );

    let report = scheduler.run_once(Utc::now()).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn export(config: BotConfig, file: PathBuf) -> Result<()> {
    let store = open_store(&config).await?;
    let formatter = load_formatter(&config)?;

    let entries: Vec<CorpusEntry> = store
        .fetch_all_questions()
        .await?
        .iter()
        .map(|q| CorpusEntry {
            formatted_text: formatter.rendering_for(&q.question_text).map(str::to_string),
            ..CorpusEntry::from(q)
        })
        .collect();

    write_corpus(&file, &entries)?;
    println!("✓ Exported {} questions to {}", entries.len(), file.display());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = match cli.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Our crates at the requested level, HTTP internals only when they complain
    let filter = EnvFilter::new(format!(
        "daily_quiz={level},daily_quiz_core={level},reqwest=warn,hyper=warn",
        level = level.as_str().to_lowercase()
    ));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr) // Write logs to stderr, not stdout
        .init();

    debug!("Daily Quiz v{} starting...", env!("CARGO_PKG_VERSION"));

    let mut config = BotConfig::load(Some(&cli.config))?;
    if let Some(path) = cli.db_path {
        config.database.path = path;
    }

    match cli.command {
        Commands::Serve => serve(config).await,
        Commands::Init => {
            open_store(&config).await?;
            println!("✓ Database initialized: {}", config.database.path.display());
            Ok(())
        }
        Commands::Import { file } => {
            let store = open_store(&config).await?;
            let entries = read_corpus(&file)
                .with_context(|| format!("Failed to read corpus {}", file.display()))?;
            let summary = store
                .import_corpus(entries)
                .await
                .context("Failed to import questions")?;
            println!(
                "✓ Imported {} questions, {} already present ({} total)",
                summary.inserted,
                summary.skipped,
                store.count_questions().await?
            );
            Ok(())
        }
        Commands::Export { file } => export(config, file).await,
        Commands::Users => {
            let store = open_store(&config).await?;
            println!("Registered users: {}", store.count_users().await?);
            Ok(())
        }
        Commands::Stats { telegram_id } => {
            let store = open_store(&config).await?;
            let user_id = UserId(telegram_id);
            if store.get(user_id).await?.is_none() {
                println!("User {} is not registered", telegram_id);
                return Ok(());
            }

            let stats = ProgressTracker::new(store)
                .user_stats(user_id, Utc::now().date_naive())
                .await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }
        Commands::Deliver => deliver(config).await,
    }
}
