//! CLI interface for smartskill

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{self, Config};
use crate::scoring::generate_keywords;
use crate::store::{self, SqliteStore};
use crate::tutor::{self, ContentGenerator, DifficultyPredictor, ScriptPredictor};

#[derive(Parser)]
#[command(name = "smartskill")]
#[command(about = "SmartSkill quiz backend: justification scoring, tutor chat and progress tracking", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the web server
    Serve {
        /// Port to listen on (default: config, then 5000)
        #[arg(short, long)]
        port: Option<u16>,
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,
        /// Enable HTTPS
        #[arg(long)]
        https: bool,
        /// Path to SSL certificate
        #[arg(long)]
        cert: Option<String>,
        /// Path to SSL private key
        #[arg(long)]
        key: Option<String>,
    },
    /// Import questions from a JSON file or a directory of JSON files
    Import {
        path: PathBuf,
    },
    /// Generate missing justifications and keywords with the LLM
    Backfill {
        /// Questions per batch
        #[arg(short, long)]
        batch_size: Option<usize>,
        /// Run a single batch and exit
        #[arg(long)]
        once: bool,
    },
    /// Print the keywords extracted from a piece of text
    Keywords {
        text: String,
    },
    /// Predict the difficulty of a question with the configured script
    Predict {
        question: String,
    },
    /// Show database statistics
    Stats,
    /// Show or initialize configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
        /// Write a default config file
        #[arg(long)]
        init: bool,
    },
}

async fn open_store(config: &Config) -> Result<SqliteStore> {
    SqliteStore::open(&config.database.path)
        .await
        .with_context(|| format!("Failed to open database {}", config.database.path.display()))
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load()?;

    match cli.command {
        Commands::Serve { port, host, https, cert, key } => {
            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);
            crate::server::start(config, &host, port, https, cert, key).await?;
        }
        Commands::Import { path } => {
            let store = open_store(&config).await?;
            let count = store::import_path(&store, &path).await?;
            println!("Imported {} question(s) from {}", count, path.display());
        }
        Commands::Backfill { batch_size, once } => {
            if let Some(size) = batch_size {
                config.content.batch_size = size.max(1);
            }
            anyhow::ensure!(
                config.api_key().is_some(),
                "OPENROUTER_API_KEY is not set; content generation needs an OpenRouter key"
            );

            let store = open_store(&config).await?;
            let generator = ContentGenerator::new(
                crate::server::chat_backend(&config),
                config.openrouter.default_model.clone(),
            );

            if once {
                let outcome = tutor::content::process_batch(&store, &generator, config.content.batch_size).await?;
                println!(
                    "Updated {} of {} question(s), {} failed",
                    outcome.updated, outcome.attempted, outcome.failed
                );
            } else {
                let report = tutor::run_backfill(&store, &generator, &config.content).await?;
                println!(
                    "Updated {} question(s) in {} batch(es){}",
                    report.updated,
                    report.batches,
                    if report.completed { "" } else { " before giving up" }
                );
            }
        }
        Commands::Keywords { text } => {
            for keyword in generate_keywords(&text) {
                println!("{}", keyword);
            }
        }
        Commands::Predict { question } => {
            let predictor = ScriptPredictor::new(&config.predictor);
            println!("{}", predictor.predict(&question).await);
        }
        Commands::Stats => {
            let store = open_store(&config).await?;
            let stats = store.stats().await?;
            println!("Database: {}", config.database.path.display());
            println!("  Users:              {}", stats.users);
            println!("  Questions:          {}", stats.questions);
            println!("  Missing content:    {}", stats.questions_missing_content);
            println!("  Quizzes taken:      {}", stats.quizzes_taken);
        }
        Commands::Config { show, init } => {
            if init {
                let path = config::config_path()?;
                if path.exists() {
                    println!("Config already exists at {}", path.display());
                } else {
                    let path = Config::default().save()?;
                    println!("Wrote default config to {}", path.display());
                }
            } else if show {
                config::show_config(&config)?;
            } else {
                println!("Use --show to view configuration or --init to create a config file.");
            }
        }
    }

    Ok(())
}
