//! Recommendation binary entry point.
//!
//! Loads a prebuilt corpus snapshot and recommends related papers for arXiv
//! identifiers, either once from the command line or repeatedly from an
//! interactive prompt.
//!
//! # Examples
//!
//! Single paper:
//! ```bash
//! recommend --library library/ --id 2101.00001
//! ```
//!
//! Several papers, JSON output:
//! ```bash
//! recommend --library library/ --id 2101.00001 --id 2102.00002 --format json
//! ```
//!
//! Interactive mode:
//! ```bash
//! recommend --library library/ --interactive
//! ```

use anyhow::{Context, Result};
use arxiv_recommender::{
    corpus::Corpus,
    embedding::{fastembed::FastEmbedProvider, Embedder},
    models::{Recommendation, Record, RelevanceLevel, SearchResult},
    pipeline::RecommendationPipeline,
    provider::{
        arxiv::{ArxivConfig, ArxivProvider},
        json::JsonFilePaperProvider,
        DynamicPaperProvider,
    },
    storage::{parquet::ParquetCorpusStore, CorpusStorage},
    tags::{scoring::TagScorer, TagMapper},
    DEFAULT_TOP_K,
};
use clap::{Parser, ValueEnum};
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

type Pipeline = RecommendationPipeline<DynamicPaperProvider, FastEmbedProvider>;

/// Output format for recommendations
#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    /// Human-friendly table with colored relevance levels
    Table,
    /// Machine-readable JSON format
    Json,
}

/// Recommend related arXiv papers from a prebuilt corpus
#[derive(Parser, Debug)]
#[command(
    name = "recommend",
    version,
    about = "Recommend related arXiv papers by semantic similarity",
    long_about = "Fetch an arXiv paper, embed its title and abstract, and list the most similar \
                  papers of a prebuilt corpus snapshot.

EXAMPLES:
  Single paper:
    recommend --library library/ --id 2101.00001

  JSON output for several papers:
    recommend --library library/ --id 2101.00001 --id 2102.00002 --format json

  Free-text query:
    recommend --library library/ --text \"blow-up for semilinear heat equations\"

  Interactive mode with tag annotations:
    recommend --library library/ --interactive --show-tags"
)]
struct Args {
    /// Corpus snapshot directory (created by build_library)
    #[arg(long, value_name = "DIR")]
    library: PathBuf,

    /// arXiv identifier to recommend for (repeatable)
    #[arg(long = "id", value_name = "ID", conflicts_with = "interactive")]
    ids: Vec<String>,

    /// Free-text query instead of a paper
    #[arg(long, value_name = "TEXT", conflicts_with_all = ["ids", "interactive"])]
    text: Option<String>,

    /// Enable interactive REPL mode
    #[arg(long, short = 'i')]
    interactive: bool,

    /// Number of recommendations per paper
    #[arg(long, value_name = "N", default_value_t = DEFAULT_TOP_K)]
    top_k: usize,

    /// Output format
    #[arg(long, value_enum, default_value = "table")]
    format: OutputFormat,

    /// Omit abstracts from table output
    #[arg(long)]
    brief: bool,

    /// Annotate input papers with subject and MSC labels
    #[arg(long)]
    show_tags: bool,

    /// arXiv subject lookup table
    #[arg(long, value_name = "FILE", default_value = "data/arxiv_subjects.json")]
    subjects: PathBuf,

    /// MSC lookup table
    #[arg(long, value_name = "FILE", default_value = "data/msc.json")]
    msc: PathBuf,

    /// Read input papers from a JSON record file instead of the arXiv API
    #[arg(long, value_name = "FILE")]
    records: Option<PathBuf>,

    /// Logging verbosity level
    #[arg(long, default_value = "warn", value_name = "LEVEL")]
    log_level: String,

    /// FastEmbed model cache directory
    #[arg(long, value_name = "DIR")]
    cache_dir: Option<PathBuf>,
}

/// Setup logging with the specified level
fn setup_logging(log_level: &str) {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .init();
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .map(|p| p.join("fastembed"))
        .unwrap_or_else(|| PathBuf::from(".cache/fastembed"))
}

fn create_paper_provider(records: Option<&PathBuf>) -> Result<DynamicPaperProvider> {
    match records {
        Some(path) => {
            info!("Reading input papers from {}", path.display());
            let provider = JsonFilePaperProvider::from_file(path)
                .with_context(|| format!("Failed to load records from {}", path.display()))?;
            Ok(DynamicPaperProvider::Json(provider))
        }
        None => {
            let provider = ArxivProvider::new(ArxivConfig::default())
                .context("Failed to create arXiv client")?;
            Ok(DynamicPaperProvider::Arxiv(provider))
        }
    }
}

/// Tag lookups used to annotate input papers.
struct Annotator {
    mapper: TagMapper,
    scorer: TagScorer,
}

impl Annotator {
    async fn load(args: &Args, embedder: &Embedder<FastEmbedProvider>) -> Result<Self> {
        let mapper = TagMapper::from_files(&args.subjects, &args.msc)
            .context("Failed to load tag lookup tables")?;
        let scorer = TagScorer::build(embedder, mapper.msc_table())
            .await
            .context("Failed to embed MSC labels")?;
        debug!("Tag scorer ready with {} labels", scorer.len());
        Ok(Self { mapper, scorer })
    }

    async fn describe(&self, record: &Record, embedder: &Embedder<FastEmbedProvider>) -> Result<String> {
        let tags = self.mapper.tag_set(&record.categories);
        let subjects = self.mapper.subject_labels(&tags.subjects);
        let mut lines = vec![format!(
            "Subjects: {}",
            if subjects.is_empty() {
                "-".to_string()
            } else {
                subjects.into_iter().collect::<Vec<_>>().join("; ")
            }
        )];

        if tags.has_msc() {
            let vector = embedder.embed_one(record.doc_string()).await?;
            if let Some(scored) = self.scorer.score(&vector, &tags) {
                let ranked: Vec<String> = scored
                    .iter()
                    .map(|t| format!("{} ({:.3})", t.label, t.score))
                    .collect();
                lines.push(format!("MSC: {}", ranked.join("; ")));
            }
        }
        Ok(lines.join("\n"))
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        format!("{}...", text.chars().take(max - 3).collect::<String>())
    } else {
        text.to_string()
    }
}

/// Format results as a pretty table
fn format_results_table(results: &[SearchResult]) -> String {
    if results.is_empty() {
        return "No results found.".to_string();
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("Rank").add_attribute(Attribute::Bold),
        Cell::new("Title").add_attribute(Attribute::Bold),
        Cell::new("arXiv ID").add_attribute(Attribute::Bold),
        Cell::new("Authors").add_attribute(Attribute::Bold),
        Cell::new("Relevance").add_attribute(Attribute::Bold),
        Cell::new("Score").add_attribute(Attribute::Bold),
    ]);

    for (idx, result) in results.iter().enumerate() {
        let color = match result.relevance {
            RelevanceLevel::Identical => Color::Green,
            RelevanceLevel::HighlySimilar => Color::Cyan,
            RelevanceLevel::Similar => Color::Yellow,
            RelevanceLevel::Relevant => Color::White,
        };

        table.add_row(vec![
            Cell::new(format!("{}", idx + 1)),
            Cell::new(truncate(&result.record.title, 60)),
            Cell::new(&result.record.id),
            Cell::new(truncate(&result.record.authors.join(", "), 40)),
            Cell::new(result.relevance.label()).fg(color),
            Cell::new(format!("{:.4}", result.score)),
        ]);
    }

    table.to_string()
}

fn display_record(record: &Record) {
    println!("{}", "═".repeat(80));
    println!("Title: {}", record.title);
    println!("arXiv ID: {}", record.id);
    if !record.authors.is_empty() {
        println!("Authors: {}", record.authors.join(", "));
    }
    println!("\nAbstract:\n{}", record.abstract_text.trim());
    println!("{}", "═".repeat(80));
}

/// Display detailed view of a single result
fn display_result_detail(result: &SearchResult, rank: usize) {
    println!("\nRank: {}  Relevance: {}  Score: {:.4}", rank, result.relevance.label(), result.score);
    display_record(&result.record);
}

struct Presenter {
    format: OutputFormat,
    brief: bool,
}

impl Presenter {
    async fn show(
        &self,
        recommendations: &[Recommendation],
        annotator: Option<&Annotator>,
        embedder: &Embedder<FastEmbedProvider>,
    ) -> Result<()> {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(recommendations)
                    .context("Failed to serialize recommendations to JSON")?;
                println!("{}", json);
            }
            OutputFormat::Table => {
                for rec in recommendations {
                    println!("\nInput paper:");
                    display_record(&rec.input);
                    if let Some(annotator) = annotator {
                        println!("{}", annotator.describe(&rec.input, embedder).await?);
                    }
                    println!("\n{}", format_results_table(&rec.results));
                    if !self.brief {
                        for (idx, result) in rec.results.iter().enumerate() {
                            display_result_detail(result, idx + 1);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn show_results(&self, results: &[SearchResult]) -> Result<()> {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(results)
                    .context("Failed to serialize results to JSON")?;
                println!("{}", json);
            }
            OutputFormat::Table => println!("{}", format_results_table(results)),
        }
        Ok(())
    }
}

fn print_help() {
    println!("Commands:");
    println!("  <arXiv id> [id...] - Recommend papers related to the given ids");
    println!("  /text QUERY        - Search the corpus with free text");
    println!("  /top N             - Set number of recommendations to N");
    println!("  /format table      - Use table output format");
    println!("  /format json       - Use JSON output format");
    println!("  /detail N          - Show full details for result rank N");
    println!("  /help              - Show this help");
    println!("  Ctrl+D or Ctrl+C   - Exit");
}

/// Run interactive REPL mode
async fn run_interactive(
    pipeline: &Pipeline,
    annotator: Option<&Annotator>,
    mut top_k: usize,
    mut presenter: Presenter,
) -> Result<()> {
    println!("Interactive Paper Recommender ({} papers in corpus)", pipeline.corpus().len());
    print_help();
    println!();

    let mut rl = DefaultEditor::new().context("Failed to create readline editor")?;
    let mut last_results: Vec<SearchResult> = Vec::new();

    loop {
        match rl.readline("arXiv> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                rl.add_history_entry(line).ok();

                if line.starts_with('/') {
                    let parts: Vec<&str> = line.split_whitespace().collect();
                    match parts[0] {
                        "/help" => print_help(),
                        "/top" => match parts.get(1).map(|n| n.parse::<usize>()) {
                            Some(Ok(n)) if n > 0 => {
                                top_k = n;
                                println!("Set top-k to {}", top_k);
                            }
                            _ => eprintln!("Usage: /top N (positive integer)"),
                        },
                        "/format" => match parts.get(1).copied() {
                            Some("table") => {
                                presenter.format = OutputFormat::Table;
                                println!("Set output format to table");
                            }
                            Some("json") => {
                                presenter.format = OutputFormat::Json;
                                println!("Set output format to JSON");
                            }
                            _ => eprintln!("Usage: /format [table|json]"),
                        },
                        "/detail" => match parts.get(1).map(|n| n.parse::<usize>()) {
                            Some(Ok(rank)) if rank > 0 && rank <= last_results.len() => {
                                display_result_detail(&last_results[rank - 1], rank);
                            }
                            Some(Ok(rank)) => eprintln!(
                                "Rank {} out of range (last run had {} results)",
                                rank,
                                last_results.len()
                            ),
                            _ => eprintln!("Usage: /detail N"),
                        },
                        "/text" => {
                            let query = line["/text".len()..].trim();
                            match pipeline.search_text(query, top_k).await {
                                Ok(results) => {
                                    presenter.show_results(&results)?;
                                    last_results = results;
                                }
                                Err(e) => eprintln!("Search failed: {}", e),
                            }
                        }
                        _ => eprintln!("Unknown command: {}. Type /help for available commands.", parts[0]),
                    }
                } else {
                    let ids: Vec<String> = line.split_whitespace().map(str::to_string).collect();
                    let start = Instant::now();
                    match pipeline.recommend(&ids, top_k).await {
                        Ok(recs) => {
                            presenter.show(&recs, annotator, pipeline.embedder()).await?;
                            println!("\nDone in {:.2}s", start.elapsed().as_secs_f64());
                            last_results = recs.into_iter().last().map(|r| r.results).unwrap_or_default();
                        }
                        Err(e) => eprintln!("Recommendation failed: {}", e),
                    }
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                error!("Error reading input: {}", err);
                break;
            }
        }
    }

    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(&args.log_level);

    if !args.interactive && args.ids.is_empty() && args.text.is_none() {
        anyhow::bail!(
            "One of --id, --text or --interactive must be specified.\n\
             Use --help for usage information."
        );
    }
    if args.top_k == 0 {
        anyhow::bail!("--top-k must be positive");
    }

    let store = ParquetCorpusStore::new(&args.library);
    if !store.exists().await {
        anyhow::bail!(
            "No corpus snapshot found in {}\n\
             Please run build_library first.",
            args.library.display()
        );
    }
    let corpus = Corpus::load_from_snapshot(&store)
        .await
        .with_context(|| format!("Failed to load corpus from {}", args.library.display()))?;
    if corpus.is_empty() {
        anyhow::bail!("Corpus in {} is empty", args.library.display());
    }

    info!(
        "Using embedding model: {} (dimension: {})",
        corpus.config().model_name,
        corpus.config().dimension
    );
    let cache_dir = args.cache_dir.clone().unwrap_or_else(default_cache_dir);
    let embedder = Embedder::new(
        FastEmbedProvider::from_name(&corpus.config().model_name, Some(cache_dir))
            .context("Failed to initialize the corpus embedding model")?,
    );

    let provider = create_paper_provider(args.records.as_ref())?;
    let pipeline = RecommendationPipeline::new(provider, embedder, corpus)
        .context("Embedding model does not match the corpus")?;

    let annotator = if args.show_tags {
        Some(Annotator::load(&args, pipeline.embedder()).await?)
    } else {
        None
    };

    let presenter = Presenter {
        format: args.format.clone(),
        brief: args.brief,
    };

    if args.interactive {
        run_interactive(&pipeline, annotator.as_ref(), args.top_k, presenter).await?;
    } else if let Some(text) = &args.text {
        let results = pipeline
            .search_text(text, args.top_k)
            .await
            .context("Free-text search failed")?;
        presenter.show_results(&results)?;
    } else {
        let start = Instant::now();
        let recs = pipeline
            .recommend(&args.ids, args.top_k)
            .await
            .with_context(|| format!("Failed to recommend for {}", args.ids.join(", ")))?;
        presenter.show(&recs, annotator.as_ref(), pipeline.embedder()).await?;
        if matches!(args.format, OutputFormat::Table) {
            println!("\nDone in {:.2}s", start.elapsed().as_secs_f64());
        }
    }

    Ok(())
}
