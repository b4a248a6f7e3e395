//! Reciprocal Rank Fusion over vector and lexical candidate lists.
//!
//! `score(p) = Σ_source 1 / (k + rank_source(p))` with 1-based ranks. Results
//! are ordered by fused score (descending), then by the original vector
//! similarity score (descending, passages the vector source did not return
//! sort last), then by passage id for determinism.

use crate::core::ids::PassageId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Conventional RRF constant.
pub const DEFAULT_RRF_K: u32 = 60;

/// One entry of a source's ranked list. Position in the list is the rank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub passage_id: PassageId,
    /// Source-native score (similarity or lexical score)
    pub score: f64,
}

impl RankedCandidate {
    pub fn new(passage_id: impl Into<PassageId>, score: f64) -> Self {
        Self {
            passage_id: passage_id.into(),
            score,
        }
    }
}

/// A passage after fusion, as handed to the summarizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedPassage {
    pub passage_id: PassageId,
    /// Fused RRF score
    pub score: f64,
    /// Original vector similarity, if the vector source returned the passage
    pub vector_score: Option<f64>,
    pub vector_rank: Option<usize>,
    pub lexical_rank: Option<usize>,
}

#[derive(Default)]
struct Accumulator {
    fused: f64,
    vector_score: Option<f64>,
    vector_rank: Option<usize>,
    lexical_rank: Option<usize>,
}

/// Fuse the two ranked lists and keep the best `top_n`.
///
/// A passage listed twice by the same source only counts at its best rank.
pub fn reciprocal_rank_fusion(
    vector: &[RankedCandidate],
    lexical: &[RankedCandidate],
    k: u32,
    top_n: usize,
) -> Vec<RankedPassage> {
    let mut acc: HashMap<PassageId, Accumulator> = HashMap::new();
    let k = f64::from(k);

    for (position, candidate) in vector.iter().enumerate() {
        let entry = acc.entry(candidate.passage_id.clone()).or_default();
        if entry.vector_rank.is_none() {
            let rank = position + 1;
            entry.vector_rank = Some(rank);
            entry.vector_score = Some(candidate.score);
            entry.fused += 1.0 / (k + rank as f64);
        }
    }

    for (position, candidate) in lexical.iter().enumerate() {
        let entry = acc.entry(candidate.passage_id.clone()).or_default();
        if entry.lexical_rank.is_none() {
            let rank = position + 1;
            entry.lexical_rank = Some(rank);
            entry.fused += 1.0 / (k + rank as f64);
        }
    }

    let mut fused: Vec<RankedPassage> = acc
        .into_iter()
        .map(|(passage_id, a)| RankedPassage {
            passage_id,
            score: a.fused,
            vector_score: a.vector_score,
            vector_rank: a.vector_rank,
            lexical_rank: a.lexical_rank,
        })
        .collect();

    fused.sort_by(compare);
    fused.truncate(top_n);
    fused
}

fn compare(a: &RankedPassage, b: &RankedPassage) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| {
            let av = a.vector_score.unwrap_or(f64::NEG_INFINITY);
            let bv = b.vector_score.unwrap_or(f64::NEG_INFINITY);
            bv.total_cmp(&av)
        })
        .then_with(|| a.passage_id.cmp(&b.passage_id))
}
