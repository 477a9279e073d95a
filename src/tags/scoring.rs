//! Rank a paper's MSC labels by semantic closeness to the paper itself.
//!
//! Every label in the MSC table is embedded once with the same [`Embedder`]
//! that produced the corpus vectors. A paper's labels are then scored against
//! its document vector without further model calls.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::LookupTable;
use crate::embedding::{Embedder, EmbeddingProvider, EmbeddingResult};
use crate::models::TagSet;
use crate::query::{cosine_similarity, rank};

/// An MSC label with its similarity to the document vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredTag {
    pub label: String,
    pub score: f32,
}

/// Precomputed label vectors.
#[derive(Debug, Clone, Default)]
pub struct TagScorer {
    label_vectors: HashMap<String, Vec<f32>>,
}

impl TagScorer {
    /// Embed every label of `table` in one batch.
    pub async fn build<E: EmbeddingProvider>(
        embedder: &Embedder<E>,
        table: &LookupTable,
    ) -> EmbeddingResult<Self> {
        let labels: Vec<&str> = table.labels().collect();
        let vectors = embedder.embed_batch(&labels).await?;
        debug!("Embedded {} MSC labels", labels.len());

        Ok(Self {
            label_vectors: labels
                .into_iter()
                .map(str::to_string)
                .zip(vectors)
                .collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.label_vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.label_vectors.is_empty()
    }

    /// Score a record's MSC labels against its document vector, best first.
    ///
    /// Untagged records yield `None`. Labels without a precomputed vector
    /// are skipped; equal scores keep the order the labels were listed in.
    pub fn score(&self, doc_vector: &[f32], tags: &TagSet) -> Option<Vec<ScoredTag>> {
        let labels = tags.msc.as_ref()?;

        let known: Vec<(&String, &Vec<f32>)> = labels
            .iter()
            .filter_map(|label| self.label_vectors.get(label).map(|v| (label, v)))
            .filter(|(_, v)| v.len() == doc_vector.len())
            .collect();

        let scored = known
            .iter()
            .enumerate()
            .map(|(idx, (_, v))| (idx, cosine_similarity(doc_vector, v)))
            .collect();

        Some(
            rank(scored, known.len())
                .into_iter()
                .map(|(idx, score)| ScoredTag {
                    label: known[idx].0.clone(),
                    score,
                })
                .collect(),
        )
    }
}
