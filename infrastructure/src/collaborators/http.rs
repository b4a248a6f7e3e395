//! Shared JSON-over-HTTP plumbing for collaborator services.

use attest_application::CollaboratorError;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

/// A base URL plus a client with a bounded request timeout.
#[derive(Debug, Clone)]
pub struct HttpService {
    name: &'static str,
    base_url: String,
    client: reqwest::Client,
    bearer: Option<String>,
}

impl HttpService {
    pub fn new(
        name: &'static str,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, CollaboratorError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("attest/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CollaboratorError::Unavailable(format!("{}: {}", name, e)))?;
        Ok(Self {
            name,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            bearer: None,
        })
    }

    /// Send `Authorization: Bearer <token>` with every request.
    pub fn with_bearer(mut self, token: Option<String>) -> Self {
        self.bearer = token.filter(|t| !t.is_empty());
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Join `path` onto the base URL; an empty path is the base URL itself.
    pub fn url(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        if path.is_empty() {
            self.base_url.clone()
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    pub fn post(&self, path: &str) -> RequestBuilder {
        let builder = self.client.post(self.url(path));
        match &self.bearer {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// POST a JSON body and decode a JSON reply.
    pub async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R, CollaboratorError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.send_json(self.post(path).json(body)).await
    }

    /// Send a prepared request and decode a JSON reply.
    pub async fn send_json<R: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<R, CollaboratorError> {
        let response = self.send(request).await?;
        response
            .json()
            .await
            .map_err(|e| CollaboratorError::InvalidResponse(format!("{}: {}", self.name, e)))
    }

    /// Send a prepared request, mapping transport and status failures.
    pub async fn send(&self, request: RequestBuilder) -> Result<Response, CollaboratorError> {
        let response = request.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status();
        debug!(service = self.name, status = status.as_u16(), "Collaborator replied");
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(status_error(self.name, status, &body))
    }

    fn transport_error(&self, err: reqwest::Error) -> CollaboratorError {
        if err.is_timeout() {
            CollaboratorError::Timeout
        } else if err.is_decode() {
            CollaboratorError::InvalidResponse(format!("{}: {}", self.name, err))
        } else {
            CollaboratorError::Unavailable(format!("{}: {}", self.name, err))
        }
    }
}

/// 5xx and 429 are worth retrying; other 4xx are not.
fn status_error(service: &str, status: StatusCode, body: &str) -> CollaboratorError {
    let detail = body.chars().take(200).collect::<String>();
    let message = format!("{} returned {}: {}", service, status.as_u16(), detail.trim());
    if status == StatusCode::REQUEST_TIMEOUT || status == StatusCode::GATEWAY_TIMEOUT {
        CollaboratorError::Timeout
    } else if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        CollaboratorError::Unavailable(message)
    } else {
        CollaboratorError::Rejected(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joining() {
        let service =
            HttpService::new("embedding", "http://localhost:8002/", Duration::from_secs(1))
                .unwrap();
        assert_eq!(service.url("/embed"), "http://localhost:8002/embed");
        assert_eq!(service.url("embed"), "http://localhost:8002/embed");
        assert_eq!(service.url(""), "http://localhost:8002");
        assert_eq!(service.name(), "embedding");
    }

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            status_error("index", StatusCode::SERVICE_UNAVAILABLE, "down"),
            CollaboratorError::Unavailable(_)
        ));
        assert!(matches!(
            status_error("index", StatusCode::TOO_MANY_REQUESTS, ""),
            CollaboratorError::Unavailable(_)
        ));
        assert_eq!(
            status_error("index", StatusCode::GATEWAY_TIMEOUT, ""),
            CollaboratorError::Timeout
        );
        assert!(matches!(
            status_error("index", StatusCode::BAD_REQUEST, "bad vector"),
            CollaboratorError::Rejected(m) if m.contains("bad vector")
        ));
    }

    #[tokio::test]
    async fn test_unreachable_service_is_unavailable() {
        // Port 9 (discard) is closed on test hosts
        let service =
            HttpService::new("ingestion", "http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let err = service
            .post_json::<_, serde_json::Value>("extract", &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CollaboratorError::Unavailable(_) | CollaboratorError::Timeout
        ));
    }
}
