//! Outbound action connectors.

pub mod webhook;

pub use webhook::WebhookConnector;
