//! Hybrid retrieval: vector and lexical channels fused into one ranking.
//!
//! Both channels run independently against the same index snapshot, each
//! channel's raw scores are min-max normalized over its own candidate set,
//! and the normalized scores are combined as
//! `fused = wv * vector + wl * lexical`. With weights `(1, 0)` the result is
//! exactly the vector ranking; with `(0, 1)` exactly the lexical ranking.
//!
//! The whole function is pure given an index snapshot: identical inputs
//! always produce the identical ordered result.

use std::collections::HashMap;
use thiserror::Error;

use crate::config::RetrievalConfig;
use crate::embedding::{cosine_similarity, EmbeddingError, EmbeddingProvider};
use crate::store::{tokenize, IndexStore};

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("index is empty — nothing has been ingested")]
    EmptyIndex,

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error("index query failed: {0}")]
    Store(String),
}

/// Fusion weights and candidate caps. Defaults follow the engine's
/// standard profile: equal weights, 5 vector / 4 lexical candidates,
/// 5 final results.
#[derive(Debug, Clone)]
pub struct RetrievalOptions {
    pub vector_weight: f64,
    pub lexical_weight: f64,
    pub candidate_k_vector: usize,
    pub candidate_k_lexical: usize,
    pub final_limit: usize,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            vector_weight: 0.5,
            lexical_weight: 0.5,
            candidate_k_vector: 5,
            candidate_k_lexical: 4,
            final_limit: 5,
        }
    }
}

impl From<&RetrievalConfig> for RetrievalOptions {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            vector_weight: config.vector_weight,
            lexical_weight: config.lexical_weight,
            candidate_k_vector: config.candidate_k_vector,
            candidate_k_lexical: config.candidate_k_lexical,
            final_limit: config.final_limit,
        }
    }
}

/// One fused result. `vector_score` and `lexical_score` are the normalized
/// per-channel scores that entered the weighted sum (0 when the chunk was
/// absent from that channel).
#[derive(Debug, Clone)]
pub struct RetrievalResult {
    pub chunk_id: i64,
    pub document_path: String,
    pub chunk_index: i64,
    pub text: String,
    pub vector_score: f64,
    pub lexical_score: f64,
    pub fused_score: f64,
}

/// Run hybrid retrieval for `query` against an index snapshot.
pub async fn retrieve(
    store: &IndexStore,
    embedder: &dyn EmbeddingProvider,
    query: &str,
    opts: &RetrievalOptions,
) -> Result<Vec<RetrievalResult>, RetrievalError> {
    let chunk_count = store
        .chunk_count()
        .await
        .map_err(|e| RetrievalError::Store(e.to_string()))?;
    if chunk_count == 0 {
        return Err(RetrievalError::EmptyIndex);
    }

    let vector_candidates = fetch_vector_candidates(store, embedder, query, opts.candidate_k_vector)
        .await?;
    let lexical_candidates =
        fetch_lexical_candidates(store, query, opts.candidate_k_lexical).await?;

    let fused = fuse(&vector_candidates, &lexical_candidates, opts);

    let ids: Vec<i64> = fused.iter().map(|f| f.chunk_id).collect();
    let records = store
        .chunks_by_ids(&ids)
        .await
        .map_err(|e| RetrievalError::Store(e.to_string()))?;

    let mut results = Vec::with_capacity(fused.len());
    for f in fused {
        let record = records
            .get(&f.chunk_id)
            .ok_or_else(|| RetrievalError::Store(format!("missing chunk row {}", f.chunk_id)))?;
        results.push(RetrievalResult {
            chunk_id: f.chunk_id,
            document_path: record.document_path.clone(),
            chunk_index: record.chunk_index,
            text: record.text.clone(),
            vector_score: f.vector_score,
            lexical_score: f.lexical_score,
            fused_score: f.fused_score,
        });
    }

    Ok(results)
}

// ============ Candidate channels ============

/// Cosine similarity over every stored vector, top `candidate_k` kept.
/// Ordering is deterministic: score descending, chunk id ascending.
async fn fetch_vector_candidates(
    store: &IndexStore,
    embedder: &dyn EmbeddingProvider,
    query: &str,
    candidate_k: usize,
) -> Result<Vec<(i64, f64)>, RetrievalError> {
    let query_vec = embedder.embed_query(query).await?;

    let vectors = store
        .all_vectors()
        .await
        .map_err(|e| RetrievalError::Store(e.to_string()))?;

    let mut candidates: Vec<(i64, f64)> = vectors
        .iter()
        .map(|(id, vec)| (*id, cosine_similarity(&query_vec, vec) as f64))
        .collect();

    sort_candidates(&mut candidates);
    candidates.truncate(candidate_k);
    Ok(candidates)
}

/// Frequency/length-normalized keyword scoring: for each chunk matching any
/// query term, `score = Σ freq(term) / token_count`. Zero-score chunks are
/// never candidates.
async fn fetch_lexical_candidates(
    store: &IndexStore,
    query: &str,
    candidate_k: usize,
) -> Result<Vec<(i64, f64)>, RetrievalError> {
    let terms = tokenize(query);
    if terms.is_empty() {
        return Ok(Vec::new());
    }

    let postings = store
        .term_postings(&terms)
        .await
        .map_err(|e| RetrievalError::Store(e.to_string()))?;

    let mut candidates: Vec<(i64, f64)> = postings
        .iter()
        .filter(|(_, _, token_count)| *token_count > 0)
        .map(|(chunk_id, total_freq, token_count)| {
            (*chunk_id, *total_freq as f64 / *token_count as f64)
        })
        .collect();

    sort_candidates(&mut candidates);
    candidates.truncate(candidate_k);
    Ok(candidates)
}

fn sort_candidates(candidates: &mut [(i64, f64)]) {
    candidates.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
}

// ============ Fusion ============

#[derive(Debug, Clone)]
struct FusedCandidate {
    chunk_id: i64,
    vector_score: f64,
    lexical_score: f64,
    fused_score: f64,
}

/// Min-max normalize raw scores to `[0, 1]` over one candidate set.
/// A degenerate set (all scores equal, including a singleton) maps to 1.0.
fn normalize_scores(candidates: &[(i64, f64)]) -> HashMap<i64, f64> {
    if candidates.is_empty() {
        return HashMap::new();
    }

    let s_min = candidates
        .iter()
        .map(|(_, s)| *s)
        .fold(f64::INFINITY, f64::min);
    let s_max = candidates
        .iter()
        .map(|(_, s)| *s)
        .fold(f64::NEG_INFINITY, f64::max);

    candidates
        .iter()
        .map(|(id, s)| {
            let norm = if (s_max - s_min).abs() < f64::EPSILON {
                1.0
            } else {
                (s - s_min) / (s_max - s_min)
            };
            (*id, norm)
        })
        .collect()
}

/// Combine the two ranked candidate lists per the fusion rules.
///
/// Ties on fused score break by vector rank, then lexical rank, then chunk
/// id (insertion order); absence from a channel ranks behind every present
/// candidate of that channel.
fn fuse(
    vector_candidates: &[(i64, f64)],
    lexical_candidates: &[(i64, f64)],
    opts: &RetrievalOptions,
) -> Vec<FusedCandidate> {
    let norm_vector = normalize_scores(vector_candidates);
    let norm_lexical = normalize_scores(lexical_candidates);

    let vector_rank: HashMap<i64, usize> = vector_candidates
        .iter()
        .enumerate()
        .map(|(rank, (id, _))| (*id, rank))
        .collect();
    let lexical_rank: HashMap<i64, usize> = lexical_candidates
        .iter()
        .enumerate()
        .map(|(rank, (id, _))| (*id, rank))
        .collect();

    // Union of candidate ids, vector channel first
    let mut ids: Vec<i64> = Vec::new();
    for (id, _) in vector_candidates {
        ids.push(*id);
    }
    for (id, _) in lexical_candidates {
        if !vector_rank.contains_key(id) {
            ids.push(*id);
        }
    }

    let mut fused: Vec<FusedCandidate> = ids
        .into_iter()
        .map(|id| {
            let v = norm_vector.get(&id).copied().unwrap_or(0.0);
            let l = norm_lexical.get(&id).copied().unwrap_or(0.0);
            FusedCandidate {
                chunk_id: id,
                vector_score: v,
                lexical_score: l,
                fused_score: opts.vector_weight * v + opts.lexical_weight * l,
            }
        })
        .collect();

    fused.sort_by(|a, b| {
        b.fused_score
            .partial_cmp(&a.fused_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                let ra = vector_rank.get(&a.chunk_id).copied().unwrap_or(usize::MAX);
                let rb = vector_rank.get(&b.chunk_id).copied().unwrap_or(usize::MAX);
                ra.cmp(&rb)
            })
            .then_with(|| {
                let ra = lexical_rank.get(&a.chunk_id).copied().unwrap_or(usize::MAX);
                let rb = lexical_rank.get(&b.chunk_id).copied().unwrap_or(usize::MAX);
                ra.cmp(&rb)
            })
            .then(a.chunk_id.cmp(&b.chunk_id))
    });

    fused.truncate(opts.final_limit);
    fused
}
