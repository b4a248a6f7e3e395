//! Live request handles.
//!
//! Every request driven by this process registers a cancellation token here
//! for as long as its orchestrator runs. Cancellation and orphan recovery use
//! it to tell in-process requests from abandoned ones.

use attest_domain::RequestId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

#[derive(Clone, Default)]
pub struct RequestHandles {
    inner: Arc<Mutex<HashMap<RequestId, CancellationToken>>>,
}

impl RequestHandles {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<RequestId, CancellationToken>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a live request. The handle is removed when the guard drops.
    pub fn register(&self, request_id: &RequestId) -> HandleGuard {
        let token = CancellationToken::new();
        self.lock().insert(request_id.clone(), token.clone());
        HandleGuard {
            handles: self.clone(),
            request_id: request_id.clone(),
            token,
        }
    }

    /// Fire the request's token. Returns false if it is not live here.
    pub fn cancel(&self, request_id: &RequestId) -> bool {
        match self.lock().get(request_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_live(&self, request_id: &RequestId) -> bool {
        self.lock().contains_key(request_id)
    }

    pub fn live_count(&self) -> usize {
        self.lock().len()
    }
}

pub struct HandleGuard {
    handles: RequestHandles,
    request_id: RequestId,
    token: CancellationToken,
}

impl HandleGuard {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for HandleGuard {
    fn drop(&mut self) {
        self.handles.lock().remove(&self.request_id);
    }
}
