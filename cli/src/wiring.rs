//! Dependency injection: builds adapters from configuration and hands them
//! to the use cases.

use anyhow::{Context, Result};
use attest_application::{
    ActionConnector, AgentRegistry, ApprovalGate, AuditUseCase, DocumentsUseCase,
    EmbeddingClient, IngestDocumentUseCase, IngestionClient, LlmClient, RequestOrchestrator,
    RetrievalIndex, StaticApprovers, TaskFabric,
};
use attest_infrastructure::{
    ConnectorActionAgent, FileConfig, FusionRetriever, HttpEmbeddingClient, HttpIngestionClient,
    HttpLlmClient, HttpRetrievalIndex, HttpService, LlmDecision, LlmPlanner, LlmSummarizer,
    MemoryIndex, PlainTextIngestion, RuleBasedDecision, SqliteStore, WebhookConnector,
};
use std::sync::Arc;
use tracing::{debug, info};

/// External services, present only when configured.
struct Collaborators {
    ingestion: Arc<dyn IngestionClient>,
    embedding: Option<Arc<dyn EmbeddingClient>>,
    index: Option<Arc<dyn RetrievalIndex>>,
    llm: Option<Arc<dyn LlmClient>>,
}

impl Collaborators {
    fn from_config(config: &FileConfig) -> Result<Self> {
        let c = &config.collaborators;
        let timeout = c.request_timeout();

        let ingestion: Arc<dyn IngestionClient> = match &c.ingestion_url {
            Some(url) => Arc::new(HttpIngestionClient::new(HttpService::new(
                "ingestion",
                url,
                timeout,
            )?)),
            None => Arc::new(PlainTextIngestion::new()),
        };
        let embedding = match &c.embedding_url {
            Some(url) => Some(Arc::new(HttpEmbeddingClient::new(HttpService::new(
                "embedding",
                url,
                timeout,
            )?)) as Arc<dyn EmbeddingClient>),
            None => None,
        };
        let index = match &c.index_url {
            Some(url) => Some(Arc::new(HttpRetrievalIndex::new(HttpService::new(
                "index", url, timeout,
            )?)) as Arc<dyn RetrievalIndex>),
            None => None,
        };
        let llm = match &c.llm_url {
            Some(url) => Some(Arc::new(HttpLlmClient::new(
                HttpService::new("llm", url, timeout)?.with_bearer(c.llm_api_key.clone()),
                c.llm_model.clone(),
            )) as Arc<dyn LlmClient>),
            None => None,
        };

        Ok(Self {
            ingestion,
            embedding,
            index,
            llm,
        })
    }
}

fn require<T: Clone>(value: &Option<T>, key: &str) -> Result<T> {
    value
        .clone()
        .with_context(|| format!("collaborators.{} is not configured", key))
}

/// Everything a command may need, built once per process.
pub struct Services {
    pub store: Arc<SqliteStore>,
    pub orchestrator: RequestOrchestrator,
    pub approval: ApprovalGate,
    pub audit: AuditUseCase,
    fabric: Arc<TaskFabric>,
    registry_missing: Vec<String>,
    collaborators: Collaborators,
}

impl Services {
    pub fn build(config: &FileConfig) -> Result<Self> {
        let store_path = config.store.resolved_path();
        let store = Arc::new(
            SqliteStore::open(&store_path)
                .with_context(|| format!("opening store at {}", store_path.display()))?,
        );
        let collaborators = Collaborators::from_config(config)?;
        let registry = Self::registry(config, &collaborators)?;
        let registry_missing = registry
            .missing()
            .iter()
            .map(|t| t.to_string())
            .collect::<Vec<_>>();
        debug!(missing = ?registry_missing, "Agent registry built");

        let fabric = Arc::new(TaskFabric::start(
            &registry,
            &config.fabric.to_fabric_config(),
        ));
        let approvers = Arc::new(StaticApprovers::new(config.approval.approvers.clone()));
        let orchestrator_config = config.orchestrator_config()?;

        Ok(Self {
            orchestrator: RequestOrchestrator::new(
                store.clone(),
                fabric.clone(),
                orchestrator_config.clone(),
            ),
            approval: ApprovalGate::new(store.clone(), fabric.clone(), approvers.clone())
                .with_action_timeout(orchestrator_config.agent_timeout),
            audit: AuditUseCase::new(store.clone(), store.clone(), approvers),
            store,
            fabric,
            registry_missing,
            collaborators,
        })
    }

    fn registry(config: &FileConfig, collaborators: &Collaborators) -> Result<AgentRegistry> {
        let mut action = ConnectorActionAgent::new();
        for (service, url) in &config.connectors.urls {
            let connector: Arc<dyn ActionConnector> = Arc::new(WebhookConnector::new(
                service.clone(),
                url.clone(),
                config.collaborators.request_timeout(),
                config.connectors.token.clone(),
            )?);
            action = action.with_connector(connector);
        }
        info!(services = ?action.services(), "Action connectors configured");
        let mut registry = AgentRegistry::new().register(Arc::new(action));

        if let (Some(embedding), Some(index)) = (&collaborators.embedding, &collaborators.index) {
            registry = registry.register(Arc::new(
                FusionRetriever::new(embedding.clone(), index.clone())
                    .with_rrf_k(config.orchestrator.rrf_k),
            ));
        }
        if let Some(llm) = &collaborators.llm {
            registry = registry
                .register(Arc::new(LlmPlanner::new(llm.clone())))
                .register(Arc::new(LlmSummarizer::new(llm.clone())));
            if config.orchestrator.llm_decision() {
                registry = registry.register(Arc::new(LlmDecision::new(llm.clone())));
            }
        }
        if !config.orchestrator.llm_decision() {
            registry = registry.register(Arc::new(
                RuleBasedDecision::new()?
                    .with_alert_recipient(config.approval.alert_recipient.clone()),
            ));
        }
        Ok(registry)
    }

    /// Fail fast when the pipeline cannot run with this configuration.
    pub fn ensure_pipeline(&self) -> Result<()> {
        if self.registry_missing.is_empty() {
            return Ok(());
        }
        anyhow::bail!(
            "no agent for {}; configure collaborators.llm_url, embedding_url and index_url",
            self.registry_missing.join(", ")
        )
    }

    pub fn ingest(&self) -> Result<IngestDocumentUseCase> {
        Ok(IngestDocumentUseCase::new(
            self.store.clone(),
            self.collaborators.ingestion.clone(),
            require(&self.collaborators.embedding, "embedding_url")?,
            require(&self.collaborators.index, "index_url")?,
        ))
    }

    /// Document use cases. Listing passages works without an index;
    /// deleting needs one.
    pub fn documents(&self, need_index: bool) -> Result<DocumentsUseCase> {
        let index: Arc<dyn RetrievalIndex> = match (&self.collaborators.index, need_index) {
            (Some(index), _) => index.clone(),
            (None, true) => require(&self.collaborators.index, "index_url")?,
            (None, false) => Arc::new(MemoryIndex::new()),
        };
        Ok(DocumentsUseCase::new(self.store.clone(), index))
    }

    pub fn shutdown(&self) {
        self.fabric.shutdown();
    }
}
