//! Audit and inspection use case
//!
//! Read-only views over the ledger and the durable records: filtered event
//! queries, chain verification, histories replayed from events alone, and a
//! request's full record with its tasks and actions.

use crate::ports::approvers::ApproverDirectory;
use crate::ports::ledger::AuditLedger;
use crate::ports::store::{ActionQuery, PersistentStore, StoreError};
use attest_domain::audit::{action_status_history, request_phase_history};
use attest_domain::{
    ActionId, ActionStatus, AuditEvent, AuditFilter, ChainVerification, HistoryEntry,
    PendingAction, Request, RequestId, RequestPhase, Task,
};
use futures::TryStreamExt;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

/// Errors that can occur when reading audit data
#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Request {0} not found")]
    NotFound(RequestId),

    #[error("User {user_id} may not inspect request {request_id}")]
    Unauthorized {
        request_id: RequestId,
        user_id: String,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// A request with everything recorded about it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestDetails {
    pub request: Request,
    pub tasks: Vec<Task>,
    pub actions: Vec<PendingAction>,
}

/// Use case for audit queries and request inspection
pub struct AuditUseCase {
    store: Arc<dyn PersistentStore>,
    ledger: Arc<dyn AuditLedger>,
    approvers: Arc<dyn ApproverDirectory>,
}

impl AuditUseCase {
    pub fn new(
        store: Arc<dyn PersistentStore>,
        ledger: Arc<dyn AuditLedger>,
        approvers: Arc<dyn ApproverDirectory>,
    ) -> Self {
        Self {
            store,
            ledger,
            approvers,
        }
    }

    /// Matching events in ledger order.
    pub async fn events(&self, filter: AuditFilter) -> Result<Vec<AuditEvent>, AuditError> {
        Ok(self.ledger.query(filter).try_collect().await?)
    }

    pub async fn verify(&self) -> Result<ChainVerification, AuditError> {
        let verification = self.ledger.verify_chain().await?;
        if let Some(broken) = &verification.broken {
            warn!(
                sequence = broken.sequence,
                event_id = %broken.event_id,
                reason = %broken.reason,
                "Audit chain broken"
            );
        }
        Ok(verification)
    }

    /// Status history of an action rebuilt from its request's events.
    pub async fn action_history(
        &self,
        action_id: &ActionId,
    ) -> Result<Vec<HistoryEntry<ActionStatus>>, AuditError> {
        let Some(action) = self.store.get_action(action_id).await? else {
            return Ok(Vec::new());
        };
        let events = self
            .events(AuditFilter::for_request(action.request_id))
            .await?;
        Ok(action_status_history(&events, action_id.as_str()))
    }

    /// Phase history of a request rebuilt from its events.
    pub async fn request_history(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<HistoryEntry<RequestPhase>>, AuditError> {
        let events = self
            .events(AuditFilter::for_request(request_id.clone()))
            .await?;
        Ok(request_phase_history(&events, request_id.as_str()))
    }

    /// A request with its tasks and actions, for its owner or an approver.
    ///
    /// Failed requests keep their partial results here.
    pub async fn inspect(
        &self,
        request_id: &RequestId,
        user_id: &str,
    ) -> Result<RequestDetails, AuditError> {
        let request = self
            .store
            .get_request(request_id)
            .await?
            .ok_or_else(|| AuditError::NotFound(request_id.clone()))?;
        if !request.is_owned_by(user_id) && !self.approvers.is_approver(user_id) {
            return Err(AuditError::Unauthorized {
                request_id: request_id.clone(),
                user_id: user_id.to_string(),
            });
        }

        let tasks = self.store.list_tasks(request_id).await?;
        let actions = self
            .store
            .list_actions(&ActionQuery::for_request(request_id.clone()))
            .await?;
        Ok(RequestDetails {
            request,
            tasks,
            actions,
        })
    }
}
