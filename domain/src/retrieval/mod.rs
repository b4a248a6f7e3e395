//! Retrieval domain module
//!
//! Hybrid search re-ranking. The retrieval index returns one ranked list per
//! source; [`fusion::reciprocal_rank_fusion`] merges them deterministically.

pub mod fusion;

pub use fusion::{DEFAULT_RRF_K, RankedCandidate, RankedPassage, reciprocal_rank_fusion};
