//! One-shot command line entrypoint.
//!
//! Runs the same pipeline as the HTTP server against a PDF on disk and prints one answer per
//! line. Shares all runtime configuration with the server binary; `--in-memory` swaps Qdrant for
//! a process-local store so nothing is persisted.
use anyhow::{Context, Result, bail};
use clap::Parser;
use pnl_qa::{
    config::Config,
    logging,
    pipeline::{QaRequest, QaService, SAMPLE_QUERIES},
    store::MemoryVectorStore,
};
use std::{fs, path::PathBuf, sync::Arc};

#[derive(Parser)]
#[command(
    name = "pnl-ask",
    about = "Ask questions about the Profit & Loss table of a PDF statement"
)]
struct Cli {
    /// PDF financial statement to analyse.
    #[arg(long, required_unless_present = "list_samples")]
    pdf: Option<PathBuf>,
    /// Query to ask; repeat for several. Defaults to the first sample query.
    #[arg(long = "query")]
    queries: Vec<String>,
    /// Comma-separated queries; take precedence over `--query`.
    #[arg(long)]
    custom: Option<String>,
    /// Keep row vectors in memory instead of Qdrant.
    #[arg(long)]
    in_memory: bool,
    /// Print the full response as JSON.
    #[arg(long)]
    json: bool,
    /// List the sample queries and exit.
    #[arg(long)]
    list_samples: bool,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    if cli.list_samples {
        for query in SAMPLE_QUERIES {
            println!("{query}");
        }
        return Ok(());
    }

    dotenvy::dotenv().ok();
    logging::init_tracing();
    let config = Config::from_env().context("failed to load config from environment")?;

    let Some(pdf) = cli.pdf else {
        bail!("--pdf is required");
    };
    let document =
        fs::read(&pdf).with_context(|| format!("failed to read PDF at {}", pdf.display()))?;
    if document.is_empty() {
        bail!("{} is empty", pdf.display());
    }

    let service = if cli.in_memory {
        let service = QaService::from_config(&config, Arc::new(MemoryVectorStore::new()));
        service
            .prepare()
            .await
            .context("failed to prepare in-memory collection")?;
        service
    } else {
        QaService::bootstrap(&config)
            .await
            .context("failed to initialize the question-answering service")?
    };
    tracing::debug!(
        collection = %service.options().collection,
        in_memory = cli.in_memory,
        "Service ready"
    );

    let selected_queries = if cli.queries.is_empty() {
        vec![SAMPLE_QUERIES[0].to_string()]
    } else {
        cli.queries
    };
    let response = service
        .process(QaRequest {
            document,
            selected_queries,
            custom_queries: cli.custom,
        })
        .await;

    if cli.json {
        let text =
            serde_json::to_string_pretty(&response).context("failed to serialize response")?;
        println!("{text}");
    } else {
        println!("{}", response.answers);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::Cli;
    use clap::Parser;
    use std::path::Path;

    #[test]
    fn listing_samples_needs_no_pdf() {
        let cli = Cli::try_parse_from(["pnl-ask", "--list-samples"]).expect("parse");
        assert!(cli.list_samples);
        assert!(cli.pdf.is_none());
    }

    #[test]
    fn pdf_is_required_for_questions() {
        let error = Cli::try_parse_from(["pnl-ask", "--query", "What is the revenue?"])
            .err()
            .expect("missing pdf");
        assert_eq!(error.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn repeated_queries_are_collected() {
        let cli = Cli::try_parse_from([
            "pnl-ask",
            "--pdf",
            "statement.pdf",
            "--query",
            "What is the revenue?",
            "--query",
            "What are the total expenses?",
            "--in-memory",
        ])
        .expect("parse");
        assert_eq!(cli.pdf.as_deref(), Some(Path::new("statement.pdf")));
        assert_eq!(cli.queries.len(), 2);
        assert!(cli.in_memory);
    }
}
