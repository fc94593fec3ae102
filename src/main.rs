use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;

mod app;
mod backend;
mod config;
mod document;
mod handler;
mod logging;
mod session;
mod tui;
mod ui;

#[cfg(test)]
mod testing;

use app::App;
use backend::BackendClient;
use config::Config;
use document::{format_size, Document};

#[derive(Parser)]
#[command(name = "docqa")]
#[command(version, about = "Ask questions about a document through a Q&A backend")]
struct Cli {
    /// Backend base URL (overrides config file and DOCQA_BACKEND_URL)
    #[arg(long, global = true)]
    url: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive chat (default)
    Tui,
    /// Upload a document to the backend
    Upload {
        /// Path to a .txt, .pdf, .doc or .docx file
        path: PathBuf,
    },
    /// Ask a single question and print the answer
    Ask {
        /// Your question
        question: String,
        /// Upload this document before asking
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Clear the backend session
    Clear,
    /// Check whether the backend is reachable
    Status,
    /// Write the current settings to the config file
    InitConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::resolve(cli.url.as_deref())?;

    match cli.command.unwrap_or(Commands::Tui) {
        Commands::Tui => {
            logging::init_file(&config.log_filter, &Config::log_path()?)?;
            run_tui(&config).await
        }
        Commands::Upload { path } => upload(&cli_client(&config)?, &config, &path).await,
        Commands::Ask { question, file } => {
            let client = cli_client(&config)?;
            if let Some(path) = file {
                upload(&client, &config, &path).await?;
            }
            ask(&client, &question).await
        }
        Commands::Clear => clear(&cli_client(&config)?).await,
        Commands::Status => status(&cli_client(&config)?).await,
        Commands::InitConfig => {
            config.save()?;
            println!("{} Wrote {}", "✓".green(), Config::path()?.display());
            Ok(())
        }
    }
}

/// One-shot commands log to stderr
fn cli_client(config: &Config) -> Result<BackendClient> {
    logging::init_stderr(&config.log_filter)?;
    Ok(BackendClient::from_config(config))
}

async fn run_tui(config: &Config) -> Result<()> {
    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    tracing::info!(backend = %config.base_url, "starting chat");

    let mut app = App::new(config);
    let mut events = tui::EventHandler::new(config.probe_interval());

    let result = async {
        while !app.should_quit {
            terminal.draw(|frame| ui::render(&mut app, frame))?;
            match events.next().await {
                Some(event) => handler::handle_event(&mut app, event).await?,
                None => break,
            }
        }
        Ok::<(), anyhow::Error>(())
    }
    .await;

    tui::restore()?;
    result
}

async fn upload(client: &BackendClient, config: &Config, path: &Path) -> Result<()> {
    let document = Document::open(path, config.max_upload_bytes)
        .with_context(|| format!("cannot use {}", path.display()))?;

    println!(
        "📄 Uploading {} ({})...",
        document.name.bold().cyan(),
        format_size(document.size)
    );
    let receipt = client.upload(&document).await.context("upload failed")?;
    println!(
        "{} {}",
        "✓".green(),
        receipt.message.unwrap_or_else(|| "Document uploaded".to_string())
    );
    Ok(())
}

async fn ask(client: &BackendClient, question: &str) -> Result<()> {
    if question.trim().is_empty() {
        anyhow::bail!("question must not be empty");
    }

    println!("\n{} {}", "Question:".bold().blue(), question);
    let answer = client.ask(question).await.context("could not get an answer")?;

    println!("{} {}", "Answer:".bold().green(), answer.answer);
    if !answer.sources.is_empty() {
        println!("\n{}", "Sources:".bold());
        for (i, source) in answer.sources.iter().enumerate() {
            println!("{}. {}", (i + 1).to_string().bold(), source);
        }
    }
    println!(
        "{}",
        format!("Response time: {:.2} seconds", answer.elapsed.as_secs_f64()).dimmed()
    );
    Ok(())
}

async fn clear(client: &BackendClient) -> Result<()> {
    client.clear().await.context("could not clear the backend session")?;
    println!("{} Backend session cleared", "✓".green());
    Ok(())
}

async fn status(client: &BackendClient) -> Result<()> {
    match client.probe().await {
        Ok(()) => {
            println!("{} {} at {}", "●".green(), "Connected".green(), client.base_url());
            Ok(())
        }
        Err(err) => {
            println!("{} {} at {}", "●".red(), "Disconnected".red(), client.base_url());
            Err(err).context("backend probe failed")
        }
    }
}
