//! Corpus build binary entry point.
//!
//! Fetches paper metadata, embeds every title and abstract, and writes the
//! result as a corpus snapshot that `recommend` can search.
//!
//! # Examples
//!
//! Build from an arXiv category:
//! ```bash
//! build_library --output library/ --category math.AP --max-results 2000
//! ```
//!
//! Build from a frozen JSON record file:
//! ```bash
//! build_library --output library/ --input records.json
//! ```

use anyhow::{Context, Result};
use arxiv_recommender::{
    cleaning::hyphenated_terms,
    embedding::{
        fastembed::{parse_model_name, FastEmbedProvider},
        Embedder, EmbeddingProvider,
    },
    pipeline::{BuildStats, CorpusBuilder, DEFAULT_BATCH_SIZE},
    provider::{
        arxiv::{ArxivConfig, ArxivProvider},
        format_query,
        json::JsonFilePaperProvider,
        DynamicPaperProvider, FetchRequest,
    },
    storage::parquet::ParquetCorpusStore,
    tags::TagMapper,
    Corpus, DEFAULT_EMBEDDING_MODEL,
};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_MAX_RESULTS: usize = 100;

/// Corpus builder CLI
#[derive(Parser, Debug)]
#[command(
    name = "build_library",
    version,
    about = "Build a corpus snapshot for the recommender",
    long_about = "Fetch paper metadata, embed titles and abstracts, and persist the result as a \
                  Parquet snapshot directory.

EXAMPLES:
  Recent papers of a category:
    build_library --output library/ --category math.AP --max-results 2000

  Raw arXiv query:
    build_library --output library/ --query \"cat:math.AP AND abs:blow-up\"

  Frozen record file with a different model:
    build_library --output library/ --input records.json --embedding-model BGESmallENV15"
)]
struct BuildArgs {
    /// Snapshot directory to create
    #[arg(short, long, value_name = "DIR")]
    output: PathBuf,

    /// Raw arXiv search query
    #[arg(long, value_name = "QUERY", conflicts_with_all = ["author", "title", "category", "abstract_text", "input"])]
    query: Option<String>,

    /// Author filter
    #[arg(long, value_name = "NAME", conflicts_with = "input")]
    author: Option<String>,

    /// Title filter
    #[arg(long, value_name = "TEXT", conflicts_with = "input")]
    title: Option<String>,

    /// Category filter (e.g. math.AP)
    #[arg(long, value_name = "CODE", conflicts_with = "input")]
    category: Option<String>,

    /// Abstract filter
    #[arg(long = "abstract-text", value_name = "TEXT", conflicts_with = "input")]
    abstract_text: Option<String>,

    /// Read every record of a JSON file instead of querying the arXiv API
    #[arg(short, long, value_name = "FILE")]
    input: Option<PathBuf>,

    /// Maximum number of papers to fetch [default: 100 from arXiv, all from --input]
    #[arg(long, value_name = "N")]
    max_results: Option<usize>,

    /// Entries per arXiv API call
    #[arg(long, value_name = "N", default_value = "100")]
    page_size: usize,

    /// Retries per failed arXiv API call
    #[arg(long, value_name = "N", default_value = "3")]
    num_retries: u32,

    /// FastEmbed model name
    #[arg(long, value_name = "MODEL", default_value = DEFAULT_EMBEDDING_MODEL)]
    embedding_model: String,

    /// Number of papers per embedding batch
    #[arg(long, value_name = "N", default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// arXiv subject lookup table, for the build summary
    #[arg(long, value_name = "FILE")]
    subjects: Option<PathBuf>,

    /// MSC lookup table, for the build summary
    #[arg(long, value_name = "FILE", requires = "subjects")]
    msc: Option<PathBuf>,

    /// Number of hyphenated keywords to list in the summary
    #[arg(long, value_name = "N", default_value = "10")]
    keywords: usize,

    /// Logging verbosity level
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    log_level: String,

    /// FastEmbed model cache directory
    #[arg(long, value_name = "DIR")]
    cache_dir: Option<PathBuf>,
}

/// Initialize logging subsystem with the specified level
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    Ok(())
}

/// Translate CLI arguments into a fetch request
///
/// A JSON input file is taken whole unless `--max-results` caps it; the
/// arXiv search syntax of the field flags only applies to the API.
fn fetch_request(args: &BuildArgs) -> Result<FetchRequest> {
    if args.input.is_some() {
        return Ok(FetchRequest::query("", args.max_results.unwrap_or(usize::MAX)));
    }

    let query = match &args.query {
        Some(q) => q.trim().to_string(),
        None => format_query(
            args.author.as_deref().unwrap_or(""),
            args.title.as_deref().unwrap_or(""),
            args.category.as_deref().unwrap_or(""),
            args.abstract_text.as_deref().unwrap_or(""),
        ),
    };
    if query.is_empty() {
        anyhow::bail!(
            "No search given. Use --query, one of --author/--title/--category/--abstract-text, \
             or --input FILE."
        );
    }
    Ok(FetchRequest::query(
        query,
        args.max_results.unwrap_or(DEFAULT_MAX_RESULTS),
    ))
}

/// Upper bound on the number of records a build will embed.
fn expected_records(request: &FetchRequest, provider: &DynamicPaperProvider) -> usize {
    let requested = match request {
        FetchRequest::Ids(ids) => ids.len(),
        FetchRequest::Query { max_results, .. } => *max_results,
    };
    match provider {
        DynamicPaperProvider::Json(p) => p.records().len().min(requested),
        DynamicPaperProvider::Arxiv(_) => requested,
    }
}

fn create_paper_provider(args: &BuildArgs) -> Result<DynamicPaperProvider> {
    match &args.input {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("Input file not found: {}", path.display());
            }
            let provider = JsonFilePaperProvider::from_file(path)
                .with_context(|| format!("Failed to load records from {}", path.display()))?;
            Ok(DynamicPaperProvider::Json(provider))
        }
        None => {
            let provider = ArxivProvider::new(ArxivConfig {
                page_size: args.page_size,
                num_retries: args.num_retries,
                ..Default::default()
            })
            .context("Failed to create arXiv client")?;
            Ok(DynamicPaperProvider::Arxiv(provider))
        }
    }
}

/// Create the embedding provider based on CLI arguments
fn create_embedding_provider(args: &BuildArgs) -> Result<FastEmbedProvider> {
    let model = parse_model_name(&args.embedding_model)
        .with_context(|| format!("Unsupported embedding model '{}'", args.embedding_model))?;

    let cache_dir = args.cache_dir.clone().unwrap_or_else(|| {
        dirs::cache_dir()
            .map(|p| p.join("fastembed"))
            .unwrap_or_else(|| PathBuf::from(".cache/fastembed"))
    });
    debug!("Using cache directory: {}", cache_dir.display());

    let provider = FastEmbedProvider::new(Some(model), Some(cache_dir))
        .context("Failed to initialize FastEmbed provider")?;
    info!(
        "FastEmbed provider initialized: model={}, dimension={}",
        provider.model_name(),
        provider.dimension()
    );
    Ok(provider)
}

/// Create a progress bar for tracking embedding
fn create_progress_bar(total: usize) -> Result<ProgressBar> {
    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} papers embedded")
            .context("Invalid progress bar template")?
            .progress_chars("##-"),
    );
    Ok(pb)
}

/// Most frequent hyphenated compounds across the corpus.
fn top_keywords(corpus: &Corpus, n: usize) -> Vec<(String, usize)> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for record in corpus.records() {
        for term in hyphenated_terms(&record.abstract_text).unwrap_or_default() {
            *counts.entry(term.to_lowercase()).or_default() += 1;
        }
    }
    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked.truncate(n);
    ranked
}

fn print_summary(stats: &BuildStats, keywords: &[(String, usize)], elapsed: Duration) {
    println!("\n╔════════════════════════════════════════╗");
    println!("║      Corpus Build Completed            ║");
    println!("╠════════════════════════════════════════╣");
    println!("║ Papers fetched:       {:>16} ║", stats.fetched);
    println!("║ Papers embedded:      {:>16} ║", stats.embedded);
    println!("║ Dimension:            {:>16} ║", stats.dimension);
    println!("║ Elapsed time:         {:>13.2?} ║", elapsed);
    println!("╚════════════════════════════════════════╝");
    println!("Model: {}", stats.model_name);

    if !stats.subject_counts.is_empty() {
        println!("\nSubjects:");
        let mut subjects: Vec<_> = stats.subject_counts.iter().collect();
        subjects.sort_by(|a, b| b.1.cmp(a.1));
        for (label, count) in subjects {
            println!("  {:>6}  {}", count, label);
        }
        println!("Papers with MSC tags: {}", stats.msc_tagged);
    }

    if !keywords.is_empty() {
        println!("\nFrequent hyphenated terms:");
        for (term, count) in keywords {
            println!("  {:>6}  {}", count, term);
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = BuildArgs::parse();
    init_logging(&args.log_level).context("Failed to initialize logging")?;

    info!("Starting corpus build");
    debug!("CLI arguments: {:?}", args);
    let start_time = Instant::now();

    let request = fetch_request(&args)?;
    let provider = create_paper_provider(&args)?;
    let progress = create_progress_bar(expected_records(&request, &provider))?;
    let embedder = Embedder::new(create_embedding_provider(&args)?);
    let storage = ParquetCorpusStore::new(&args.output);

    let mut builder = CorpusBuilder::new(provider, embedder, storage, Some(args.batch_size));
    if let Some(subjects) = &args.subjects {
        let msc = args
            .msc
            .clone()
            .unwrap_or_else(|| PathBuf::from("data/msc.json"));
        let mapper = TagMapper::from_files(subjects, &msc).context("Failed to load tag lookup tables")?;
        builder = builder.with_tag_mapper(mapper);
    }

    let (corpus, stats) = builder
        .build_with_progress(&request, |done| {
            progress.set_length(progress.length().unwrap_or(0).max(done as u64));
            progress.set_position(done as u64);
        })
        .await
        .with_context(|| format!("Failed to build corpus in {}", args.output.display()))?;
    progress.finish();

    if corpus.is_empty() {
        warn!("The fetch returned no papers; the snapshot is empty");
    }

    print_summary(&stats, &top_keywords(&corpus, args.keywords), start_time.elapsed());
    info!("Snapshot written to {}", args.output.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arxiv_recommender::{PaperProvider, Record};

    fn parse(extra: &[&str]) -> Result<BuildArgs, clap::Error> {
        let mut argv = vec!["build_library", "--output", "library"];
        argv.extend_from_slice(extra);
        BuildArgs::try_parse_from(argv)
    }

    #[test]
    fn test_field_flags_build_arxiv_query() {
        let args = parse(&["--category", "math.AP", "--author", "Tao"]).unwrap();
        assert_eq!(
            fetch_request(&args).unwrap(),
            FetchRequest::query("au:Tao AND cat:math.AP", DEFAULT_MAX_RESULTS)
        );
    }

    #[test]
    fn test_field_flags_conflict_with_input() {
        for flag in ["--author", "--title", "--category", "--abstract-text", "--query"] {
            let err = parse(&["--input", "records.json", flag, "math.AP"]).unwrap_err();
            assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict, "{}", flag);
        }
    }

    #[test]
    fn test_input_file_is_taken_whole_by_default() {
        let args = parse(&["--input", "records.json"]).unwrap();
        assert_eq!(fetch_request(&args).unwrap(), FetchRequest::query("", usize::MAX));

        let args = parse(&["--input", "records.json", "--max-results", "5"]).unwrap();
        assert_eq!(fetch_request(&args).unwrap(), FetchRequest::query("", 5));
    }

    #[test]
    fn test_missing_search_is_rejected() {
        let args = parse(&[]).unwrap();
        assert!(fetch_request(&args).is_err());
    }

    #[tokio::test]
    async fn test_input_request_fetches_every_record() {
        let records: Vec<Record> = (0..150)
            .map(|i| {
                Record::new(
                    format!("2101.{:05}v1", i),
                    format!("Paper {}", i),
                    "Abstract",
                    vec!["math.AP".to_string()],
                )
            })
            .collect();
        let provider = DynamicPaperProvider::Json(JsonFilePaperProvider::from_records(records));
        let request = fetch_request(&parse(&["--input", "records.json"]).unwrap()).unwrap();

        assert_eq!(expected_records(&request, &provider), 150);
        assert_eq!(provider.fetch(&request).await.unwrap().len(), 150);
    }
}
