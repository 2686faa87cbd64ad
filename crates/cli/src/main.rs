use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

use restyle_core::{parse_generation_output, EntityGuard, QualityScorer, TextNormalizer};
use restyle_index::{load_corpus, JsonlWriter, LexicalRetriever, SampleDocument};
use restyle_llm::{LlmClient, LlmProvider};

mod config;
mod pipeline;
mod prompt;

use config::{load_config, AppConfig, DEFAULT_CONFIG};
use pipeline::{RewriteEngine, Sampling};
use prompt::resolve_category;

#[derive(Parser, Debug)]
#[command(name = "restyle", version, about = "Entity-safe article restyling toolkit")]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Raise the default log level to debug.
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Extract locked entities and print the placeholder-encoded text.
    Guard {
        /// Article text file, or `-` for stdin.
        input: PathBuf,
    },
    /// Rank corpus exemplars for a query.
    Retrieve {
        query: String,
        #[arg(long)]
        corpus: PathBuf,
        #[arg(short, long)]
        k: Option<usize>,
        /// Prefer exemplars carrying this tag.
        #[arg(long)]
        filter: Option<String>,
    },
    /// Score a sectioned rewrite against its original.
    Check {
        original: PathBuf,
        candidate: PathBuf,
        #[arg(long, default_value = "news_general")]
        category: String,
        /// Also compare unit-bearing figures both ways.
        #[arg(long)]
        strict: bool,
    },
    /// Apply title, lead and punctuation rules to a sectioned rewrite.
    Normalize {
        input: PathBuf,
        #[arg(long, default_value = "news_general")]
        category: String,
    },
    /// Run the full encode, generate, verify, normalize and score pipeline.
    Rewrite {
        input: PathBuf,
        #[arg(long)]
        corpus: Option<PathBuf>,
        #[arg(long, default_value = "news_general")]
        category: String,
        #[arg(long)]
        strict: bool,
        /// openai, deepseek or local; overrides the config file.
        #[arg(long)]
        provider: Option<String>,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Print corpus statistics.
    Stats {
        #[arg(long)]
        corpus: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    let app = load_config(&config_path)?;

    match cli.command {
        Commands::Guard { input } => {
            let text = read_input(&input)?;
            let guard = EntityGuard::new(&app.engine.guard);
            let entities = guard.extract(&text);
            let (encoded, mapping) = guard.encode(&text, &entities);
            print_json(&json!({
                "encoded": encoded,
                "mapping": mapping,
                "entities": entities,
            }))?;
        }
        Commands::Retrieve {
            query,
            corpus,
            k,
            filter,
        } => {
            let retriever = build_retriever(Some(corpus.as_path()), &app)?;
            let k = k.unwrap_or(retriever.config().top_k);
            let hits = retriever.retrieve(&query, k, filter.as_deref());
            let stdout = io::stdout();
            let mut writer = JsonlWriter::new(stdout.lock());
            for hit in &hits {
                writer.write_record(hit)?;
            }
            writer.into_inner().flush()?;
        }
        Commands::Check {
            original,
            candidate,
            category,
            strict,
        } => {
            let original = read_input(&original)?;
            let parsed = parse_generation_output(&read_input(&candidate)?);
            let category = resolve_category(&category);
            let guard = EntityGuard::new(&app.engine.guard);
            let rewritten = parsed.article.full_text();
            let numbers = guard.check_new_numbers(&original, &rewritten);
            let strict_report = strict.then(|| guard.strict_number_check(&original, &rewritten));
            let quality = QualityScorer::new(app.engine.quality.clone()).check(
                &parsed.article,
                &original,
                Some(category),
            );
            print_json(&json!({
                "category": category,
                "parse_fallback": parsed.parse_fallback,
                "numbers": numbers,
                "strict": strict_report,
                "quality": quality,
            }))?;
        }
        Commands::Normalize { input, category } => {
            let parsed = parse_generation_output(&read_input(&input)?);
            let normalizer = TextNormalizer::new(app.engine.normalizer.clone());
            let article = normalizer.process(&parsed.article, resolve_category(&category));
            print_json(&article)?;
        }
        Commands::Rewrite {
            input,
            corpus,
            category,
            strict,
            provider,
            model,
            out,
        } => {
            let original = read_input(&input)?;
            let provider = match provider {
                Some(name) => LlmProvider::parse(&name)
                    .ok_or_else(|| anyhow!("unknown provider '{name}'"))?,
                None => app.llm.provider,
            };
            let model = model.unwrap_or_else(|| app.llm.model.clone());
            let client = LlmClient::new(
                provider,
                model,
                Duration::from_secs(app.llm.timeout_secs),
            )
            .context("failed to configure generation client")?;
            info!(
                provider = client.provider().as_str(),
                model = client.model(),
                "generation client ready"
            );
            let retriever = build_retriever(corpus.as_deref(), &app)?;
            let engine = RewriteEngine::new(
                &app.engine,
                retriever,
                app.retry.clone(),
                Sampling {
                    temperature: app.llm.temperature,
                    max_tokens: app.llm.max_tokens,
                },
            );
            let runtime = tokio::runtime::Runtime::new().context("failed to start runtime")?;
            let report = runtime
                .block_on(engine.rewrite(&client, &original, resolve_category(&category), strict))
                .context("rewrite failed")?;
            match out {
                Some(path) => {
                    let payload = serde_json::to_string_pretty(&report)?;
                    fs::write(&path, payload)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                }
                None => print_json(&report)?,
            }
            if !report.accepted {
                eprintln!("warning: rewrite failed entity verification");
            }
        }
        Commands::Stats { corpus } => {
            let retriever = build_retriever(Some(corpus.as_path()), &app)?;
            print_json(&retriever.stats())?;
        }
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn build_retriever(corpus: Option<&Path>, app: &AppConfig) -> Result<LexicalRetriever> {
    let docs: Vec<SampleDocument> = match corpus {
        Some(path) => load_corpus(path)
            .with_context(|| format!("failed to load corpus {}", path.display()))?,
        None => Vec::new(),
    };
    Ok(LexicalRetriever::build(docs, app.retriever.clone()))
}

fn read_input(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read stdin")?;
        return Ok(buf);
    }
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
