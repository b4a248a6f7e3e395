//! Action agent: routes an approved action to the connector serving its
//! target service.
//!
//! Only the approval gate dispatches to this agent, so everything reaching
//! it has already been approved by a human.

use async_trait::async_trait;
use attest_application::{ActionConnector, Agent, AgentError};
use attest_domain::{ActionOutput, AgentInput, AgentOutput, AgentType};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

pub struct ConnectorActionAgent {
    connectors: HashMap<String, Arc<dyn ActionConnector>>,
}

impl ConnectorActionAgent {
    pub fn new() -> Self {
        Self {
            connectors: HashMap::new(),
        }
    }

    /// Register a connector under every service it serves. Later
    /// registrations win for a shared service name.
    pub fn with_connector(mut self, connector: Arc<dyn ActionConnector>) -> Self {
        for service in connector.services() {
            self.connectors.insert(service, connector.clone());
        }
        self
    }

    pub fn services(&self) -> Vec<String> {
        let mut names: Vec<String> = self.connectors.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for ConnectorActionAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for ConnectorActionAgent {
    fn agent_type(&self) -> AgentType {
        AgentType::Action
    }

    async fn execute(&self, input: AgentInput) -> Result<AgentOutput, AgentError> {
        let input = match input {
            AgentInput::Action(input) => input,
            other => return Err(AgentError::wrong_stage(AgentType::Action, &other)),
        };
        let connector = self
            .connectors
            .get(&input.target_service)
            .ok_or_else(|| {
                AgentError::UpstreamUnavailable(format!(
                    "no connector for service '{}'",
                    input.target_service
                ))
            })?;

        let result = connector
            .execute(&input.action_type, &input.payload)
            .await?;
        let status = result
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("executed")
            .to_string();
        info!(
            action_id = %input.action_id,
            service = %input.target_service,
            status = %status,
            "Connector call completed"
        );
        Ok(AgentOutput::Action(ActionOutput { status, result }))
    }
}
