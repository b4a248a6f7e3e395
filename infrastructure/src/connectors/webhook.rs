//! Generic webhook connector.
//!
//! Approved actions are POSTed as `{"action_type", "payload"}` to a URL
//! configured per service. The receiving end owns the actual integration
//! (ticket creation, chat message, mail relay).

use crate::collaborators::HttpService;
use async_trait::async_trait;
use attest_application::{ActionConnector, CollaboratorError};
use serde_json::{Value, json};
use std::time::Duration;

pub struct WebhookConnector {
    service: String,
    aliases: Vec<String>,
    http: HttpService,
}

impl WebhookConnector {
    pub fn new(
        service: impl Into<String>,
        url: impl Into<String>,
        timeout: Duration,
        token: Option<String>,
    ) -> Result<Self, CollaboratorError> {
        let service = service.into();
        let aliases = match service.as_str() {
            "email" => vec!["smtp".to_string()],
            _ => Vec::new(),
        };
        Ok(Self {
            service,
            aliases,
            http: HttpService::new("connector", url, timeout)?.with_bearer(token),
        })
    }
}

#[async_trait]
impl ActionConnector for WebhookConnector {
    fn services(&self) -> Vec<String> {
        std::iter::once(self.service.clone())
            .chain(self.aliases.iter().cloned())
            .collect()
    }

    async fn execute(&self, action_type: &str, payload: &Value) -> Result<Value, CollaboratorError> {
        let body = json!({
            "service": self.service,
            "action_type": action_type,
            "payload": payload,
        });
        let reply: Value = self.http.post_json("", &body).await?;
        if reply.is_object() {
            Ok(reply)
        } else {
            Ok(json!({"status": "executed", "response": reply}))
        }
    }
}
