//! `docqa`: answer questions from a fixed document corpus.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docqa_retrieval::{Answer, AppConfig, AskEngine, IngestReport};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "docqa", version, about = "Answer questions strictly from a document corpus")]
struct Cli {
    /// Config file (defaults to ./docqa.toml when present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    /// Build the index and print an ingestion summary.
    Ingest,

    /// Answer one question.
    Ask {
        question: String,

        /// Print `{"answer": ...}` instead of plain text.
        #[arg(long)]
        json: bool,
    },

    /// Answer questions read from stdin, one per line.
    Repl,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config =
        AppConfig::load_or_default(cli.config.as_deref()).context("failed to load configuration")?;
    debug!("Using configuration: {config:?}");

    let engine = AskEngine::from_config(&config)?;
    let report = engine
        .ingest()
        .await
        .with_context(|| format!("failed to ingest {}", config.corpus.dir.display()))?;

    match cli.command {
        Command::Ingest => print!("{}", format_report(&report)),
        Command::Ask { question, json } => {
            let answer = engine.answer(&question).await;
            println!("{}", format_answer(&answer, json)?);
        }
        Command::Repl => repl(&engine).await?,
    }
    Ok(())
}

async fn repl(engine: &AskEngine) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if matches!(question, "exit" | "quit") {
            break;
        }

        let answer = engine.answer(question).await;
        println!("{}", answer.text);
    }
    Ok(())
}

fn format_answer(answer: &Answer, json: bool) -> Result<String> {
    if json {
        Ok(serde_json::to_string(&serde_json::json!({ "answer": answer.text }))?)
    } else {
        Ok(answer.text.clone())
    }
}

fn format_report(report: &IngestReport) -> String {
    let mut out = format!(
        "documents read: {}\nskipped:        {}\nfrom cache:     {}\nembedded:       {}\nmissing:        {}\nindexed:        {}\n",
        report.documents_read,
        report.skipped.len(),
        report.from_cache,
        report.embedded,
        report.missing.len(),
        report.indexed,
    );
    for skipped in &report.skipped {
        out.push_str(&format!("  skipped {skipped}\n"));
    }
    for id in &report.missing {
        out.push_str(&format!("  missing embedding for {id}\n"));
    }
    out
}
