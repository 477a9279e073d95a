//! End-to-end checks across cleaning, tagging, search, snapshot storage and
//! the recommendation pipeline, with a deterministic in-process embedder.

use arxiv_recommender::{
    cleaning::LATEX_PLACEHOLDER,
    embedding::{EmbeddingProvider, EmbeddingResult},
    provider::json::JsonFilePaperProvider,
    query::BruteForceIndex,
    storage::parquet::ParquetCorpusStore,
    Corpus, CorpusBuilder, Embedder, EmbeddingConfig, FetchRequest, Record,
    RecommendationPipeline, TagMapper,
};
use async_trait::async_trait;
use std::collections::BTreeSet;

/// Bag-of-words embedder: each lowercase word lands in a bucket chosen by a
/// byte checksum.
#[derive(Debug, Clone)]
struct WordBucketProvider {
    dimension: usize,
}

impl WordBucketProvider {
    fn vector(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimension];
        for word in text.split_whitespace() {
            let word = word.to_lowercase();
            let bucket = word
                .bytes()
                .fold(7usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize));
            v[bucket % self.dimension] += 1.0;
        }
        v
    }
}

#[async_trait]
impl EmbeddingProvider for WordBucketProvider {
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        Ok(self.vector(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.vector(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "word-bucket"
    }
}

fn categories(codes: &[&str]) -> Vec<String> {
    codes.iter().map(|c| c.to_string()).collect()
}

fn library() -> Vec<Record> {
    vec![
        Record::new(
            "2101.00001v1",
            "Blow-up for the nonlinear heat equation",
            "We prove finite time blow-up of solutions to a semilinear heat equation.",
            categories(&["math.AP", "35K58"]),
        ),
        Record::new(
            "2101.00002v1",
            "Scattering for nonlinear Schrodinger equations",
            "Global well-posedness and scattering in the energy space for NLS.",
            categories(&["math.AP", "math-ph", "35Q55"]),
        ),
        Record::new(
            "2101.00003v2",
            "Prime gaps in short intervals",
            "We bound the number of primes in intervals of length x to the theta.",
            categories(&["math.NT"]),
        ),
        Record::new(
            "2101.00004v1",
            "Spectral sequences in etale cohomology",
            "A descent spectral sequence for etale cohomology of schemes.",
            categories(&["math.AG", "14F20"]),
        ),
    ]
}

#[test]
fn test_inline_math_becomes_placeholder_in_doc_string() {
    let record = Record::new(
        "2101.00005v1",
        "Quadratic forms",
        "We study the map $x^2$ on finite fields.",
        vec![],
    );
    assert!(record.doc_string().contains(LATEX_PLACEHOLDER));
    assert!(!record.doc_string().contains('$'));
    assert!(record.doc_string().starts_with("Quadratic forms "));
}

#[test]
fn test_query_equal_to_corpus_vector_ranks_it_first() {
    let records: Vec<Record> = (0..10)
        .map(|i| Record::new(format!("2101.{:05}v1", i), format!("Paper {}", i), "", vec![]))
        .collect();
    let embeddings: Vec<Vec<f32>> = (0..10)
        .map(|i| {
            let theta = i as f32 * 0.3;
            vec![theta.cos(), theta.sin()]
        })
        .collect();
    let query = embeddings[3].clone();
    let corpus = Corpus::new(
        records,
        embeddings,
        EmbeddingConfig {
            model_name: "fixed".to_string(),
            dimension: 2,
        },
    )
    .unwrap();

    let results = BruteForceIndex::new(&corpus).search(&query, 1).unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].record.id, "2101.00003v1");
    assert!((results[0].score - 1.0).abs() < 1e-6);
}

#[test]
fn test_bundled_tables_tag_pde_paper() {
    let mapper = TagMapper::from_files("data/arxiv_subjects.json", "data/msc.json").unwrap();
    let tags = mapper.tag_set(&categories(&["math.AP", "35Q99"]));

    let expected: BTreeSet<String> = ["Analysis of PDEs".to_string()].into_iter().collect();
    assert_eq!(mapper.subject_labels(&tags.subjects), expected);

    let msc = tags.msc.expect("35Q99 is in the MSC table");
    assert_eq!(
        msc,
        vec!["Partial differential equations of mathematical physics and other areas of application"]
    );
}

#[tokio::test]
async fn test_build_snapshot_then_recommend() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = dir.path().join("library");
    let embedder = Embedder::new(WordBucketProvider { dimension: 64 });

    let builder = CorpusBuilder::new(
        JsonFilePaperProvider::from_records(library()),
        embedder.clone(),
        ParquetCorpusStore::new(&snapshot),
        Some(3),
    );
    let (built, stats) = builder
        .build(&FetchRequest::query("", 10))
        .await
        .unwrap();
    assert_eq!(stats.fetched, 4);
    assert_eq!(built.len(), 4);

    let corpus = Corpus::load_from_snapshot(&ParquetCorpusStore::new(&snapshot))
        .await
        .unwrap();
    assert_eq!(corpus.records(), built.records());
    assert_eq!(corpus.config(), built.config());

    let pipeline = RecommendationPipeline::new(
        JsonFilePaperProvider::from_records(library()),
        embedder,
        corpus,
    )
    .unwrap();
    let recs = pipeline
        .recommend(&["2101.00002".to_string()], 2)
        .await
        .unwrap();

    assert_eq!(recs.len(), 1);
    assert_eq!(recs[0].input.id, "2101.00002v1");
    assert_eq!(recs[0].results.len(), 2);
    assert_eq!(recs[0].results[0].record.id, "2101.00002v1");
    assert!(recs[0].results[0].score > 0.999);
    assert!(recs[0].results[0].score >= recs[0].results[1].score);
}
