// src/gateway/mod.rs
//! Generation gateway
//!
//! "Produce text as this character." The simulator only sees
//! `GenerationGateway`; which backend answers, how often it is retried and
//! how calls are throttled is the gateway's business.
//!
//! ```text
//!  compose task ──▶ PersonaGateway ──binding──▶ throttle (per character)
//!                                                  │
//!                          preferred provider ──▶ fallback providers
//! ```

pub mod persona_gateway;
pub mod provider;

pub use persona_gateway::PersonaGateway;
pub use provider::{PersonaProvider, TemplateProvider};

use crate::world::ids::CharacterId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Gateway failures, split by whether retrying can help
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// Transient backend failure (timeout, rate limit, outage)
    #[error("provider error: {0}")]
    Provider(String),

    /// The character has no usable persona binding
    #[error("binding error: {0}")]
    Binding(String),
}

impl GatewayError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Provider(_))
    }
}

/// What the author can see while writing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationContext {
    pub world: String,
    pub event: String,

    /// Display names of the recipients
    pub recipients: Vec<String>,

    /// Facts the author may draw on; only ones the author holds
    pub facts: Vec<String>,

    /// Earlier messages in the thread, oldest first
    pub thread: Vec<String>,
}

#[async_trait]
pub trait GenerationGateway: Send + Sync {
    async fn generate_as_persona(
        &self,
        character: &CharacterId,
        prompt: &str,
        context: &GenerationContext,
    ) -> Result<String, GatewayError>;
}
