//! Interactive question answering over the medical document corpus
//!
//! Run with: cargo run -p medrag --features cli -- --clean-data false

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use medrag::pipeline::QueryResponse;
use medrag::{Pipeline, PlainTextCleaner, Providers, QueryEngine, RagConfig};

#[derive(Parser, Debug)]
#[command(name = "medrag", version, about = "Ask questions about trusted medical-education documents")]
struct Args {
    /// Clean the raw documents (false reuses the last cleaned set)
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    clean_data: bool,

    /// Chunk, embed and index the documents (false reuses the last index)
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    vectorize_data: bool,

    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of chunks retrieved per question
    #[arg(long)]
    top_k: Option<usize>,

    /// Directory of raw input documents
    #[arg(long)]
    input_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "medrag=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => RagConfig::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => RagConfig::default(),
    };
    if let Some(top_k) = args.top_k {
        config.retrieval.top_k = top_k;
    }
    if let Some(input_dir) = args.input_dir {
        config.pipeline.input_dir = input_dir;
    }
    config.validate()?;

    tracing::info!("Configuration loaded");
    tracing::info!("  - Embedding model: {}", config.embeddings.model);
    tracing::info!("  - LLM model: {}", config.llm.generate_model);
    tracing::info!(
        "  - Chunking: {} tokens, {} overlap",
        config.chunking.max_tokens,
        config.chunking.overlap_tokens
    );
    tracing::info!("  - Artifacts: {}", config.pipeline.artifact_dir.display());

    let providers = Providers::from_config(&config)?;
    if !providers.ollama.health_check().await? {
        anyhow::bail!(
            "Ollama is not reachable at {}; start it with `ollama serve`",
            config.llm.base_url
        );
    }
    providers
        .ensure_models(&config)
        .await
        .context("preparing Ollama models")?;

    let cleaner = Arc::new(PlainTextCleaner::new(config.pipeline.default_trust_tier));
    let pipeline = Pipeline::from_config(&config, cleaner, Arc::clone(&providers.embedder));
    let output = pipeline
        .run(args.clean_data, args.vectorize_data)
        .await
        .context("running pipeline")?;

    let engine = QueryEngine::from_config(&config, &output, providers.embedder, providers.llm);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("Enter your question (or type 'q' to quit): ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let question = line.trim();
        if question.eq_ignore_ascii_case("q") {
            println!("Exiting...");
            break;
        }
        if question.is_empty() {
            continue;
        }

        match engine.ask(question).await {
            Ok(response) => print_response(&response),
            Err(e) => eprintln!("Could not answer: {}", e),
        }
    }

    Ok(())
}

fn print_response(response: &QueryResponse) {
    for (i, hit) in response.sources.iter().enumerate() {
        println!(
            "[{}] {} ({}, score {:.3})",
            i + 1,
            hit.document.title,
            hit.document.trust_tier,
            hit.score
        );
        println!("{}\n", hit.chunk.content.trim());
    }

    println!("Answer:\n{}\n", response.answer.text);

    for warning in &response.answer.warnings {
        println!("Warning: {:?}", warning);
    }

    if !response.answer.citations.is_empty() {
        println!("References:");
        for citation in &response.answer.citations {
            println!("  {}", citation.format_reference());
        }
        println!("Documents: {}", response.answer.references().join("; "));
    }
    println!();
}
