//! Hybrid retriever: embed the query, search both index sources scoped to
//! the requesting user, fuse the rankings with RRF.

use async_trait::async_trait;
use attest_application::{Agent, AgentError, EmbeddingClient, IndexQuery, RetrievalIndex};
use attest_domain::retrieval::DEFAULT_RRF_K;
use attest_domain::{AgentInput, AgentOutput, AgentType, RetrieverOutput, reciprocal_rank_fusion};
use std::sync::Arc;
use tracing::debug;

/// Candidates requested per source, as a multiple of `top_n`.
const CANDIDATE_FACTOR: usize = 4;

pub struct FusionRetriever {
    embedding: Arc<dyn EmbeddingClient>,
    index: Arc<dyn RetrievalIndex>,
    rrf_k: u32,
}

impl FusionRetriever {
    pub fn new(embedding: Arc<dyn EmbeddingClient>, index: Arc<dyn RetrievalIndex>) -> Self {
        Self {
            embedding,
            index,
            rrf_k: DEFAULT_RRF_K,
        }
    }

    pub fn with_rrf_k(mut self, k: u32) -> Self {
        self.rrf_k = k;
        self
    }
}

#[async_trait]
impl Agent for FusionRetriever {
    fn agent_type(&self) -> AgentType {
        AgentType::Retriever
    }

    async fn execute(&self, input: AgentInput) -> Result<AgentOutput, AgentError> {
        let input = match input {
            AgentInput::Retriever(input) => input,
            other => return Err(AgentError::wrong_stage(AgentType::Retriever, &other)),
        };

        let vector = self
            .embedding
            .embed(std::slice::from_ref(&input.query))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AgentError::invalid_output("embedding returned no vector"))?;

        let results = self
            .index
            .search(IndexQuery {
                vector,
                text: input.query.clone(),
                owner: input.user_id.clone(),
                limit: input.top_n.max(1) * CANDIDATE_FACTOR,
            })
            .await?;

        let passages =
            reciprocal_rank_fusion(&results.vector, &results.lexical, self.rrf_k, input.top_n);
        debug!(
            vector = results.vector.len(),
            lexical = results.lexical.len(),
            fused = passages.len(),
            "Retrieval fused"
        );
        Ok(AgentOutput::Retriever(RetrieverOutput { passages }))
    }
}
