//! Audit ledger port
//!
//! The ledger accepts appends and nothing else. Queries return a lazily
//! produced, time-ordered stream; every call re-executes the filtered scan.

use crate::ports::store::StoreError;
use async_trait::async_trait;
use attest_domain::{AuditEvent, AuditFilter, ChainVerification, NewAuditEvent};
use futures::stream::BoxStream;

#[async_trait]
pub trait AuditLedger: Send + Sync {
    /// Append a standalone event and return it sealed.
    async fn append(&self, event: NewAuditEvent) -> Result<AuditEvent, StoreError>;

    /// Matching events in insertion order.
    fn query(&self, filter: AuditFilter) -> BoxStream<'_, Result<AuditEvent, StoreError>>;

    /// Walk the whole hash chain and report the first broken link.
    async fn verify_chain(&self) -> Result<ChainVerification, StoreError>;
}
