// src/engine/tasks.rs
//! Task types the tick engine schedules

use crate::gateway::{GatewayError, GenerationContext, GenerationGateway};
use crate::scheduler::{TaskContext, TaskFailure, TaskOutput, TaskScheduler};
use crate::utils::errors::Result;
use crate::world::event::Artifact;
use crate::world::ids::{ArtifactId, CharacterId, EventId, KnowledgeId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::trace;

/// "Character X writes one message for event E"
pub const COMPOSE_ARTIFACT: &str = "compose_artifact";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComposePayload {
    pub artifact_id: ArtifactId,
    pub event_id: EventId,
    pub tick: u64,
    pub author: CharacterId,
    pub recipients: Vec<CharacterId>,
    pub subject: String,
    pub prompt: String,
    pub context: GenerationContext,
    pub knowledge_refs: Vec<KnowledgeId>,
    pub in_reply_to: Option<ArtifactId>,
    pub sent_at: DateTime<Utc>,
}

/// Register the compose handler bound to `gateway`
///
/// Fails with `HandlerAlreadyRegistered` when `scheduler` already composes
/// through another gateway; one scheduler serves one tick engine.
pub fn register_compose_handler(
    scheduler: &TaskScheduler,
    gateway: Arc<dyn GenerationGateway>,
) -> Result<()> {
    scheduler.register_handler(COMPOSE_ARTIFACT, move |ctx: TaskContext| {
        let gateway = Arc::clone(&gateway);
        async move { compose(ctx, gateway.as_ref()).await }
    })
}

async fn compose(
    ctx: TaskContext,
    gateway: &dyn GenerationGateway,
) -> std::result::Result<TaskOutput, TaskFailure> {
    let payload: ComposePayload = ctx.payload_as()?;

    // the parent message is quoted into the thread
    let mut context = payload.context;
    let mut parents: Vec<Artifact> = ctx
        .dependency_outputs
        .values()
        .filter_map(|value| serde_json::from_value(value.clone()).ok())
        .collect();
    parents.sort_by(|a, b| a.id.cmp(&b.id));
    context.thread.extend(parents.into_iter().map(|a| a.body));

    trace!(
        "Composing {} as {} (attempt {})",
        payload.artifact_id,
        payload.author,
        ctx.attempt
    );

    let body = gateway
        .generate_as_persona(&payload.author, &payload.prompt, &context)
        .await
        .map_err(|e| match e {
            GatewayError::Provider(msg) => TaskFailure::Retryable(msg),
            GatewayError::Binding(msg) => TaskFailure::Fatal(msg),
        })?;

    let artifact = Artifact {
        id: payload.artifact_id,
        event_id: payload.event_id,
        tick: payload.tick,
        author: payload.author,
        recipients: payload.recipients,
        subject: payload.subject,
        body,
        in_reply_to: payload.in_reply_to,
        knowledge_refs: payload.knowledge_refs,
        sent_at: payload.sent_at,
    };

    serde_json::to_value(&artifact)
        .map_err(|e| TaskFailure::Fatal(format!("failed to encode artifact: {}", e)))
}
