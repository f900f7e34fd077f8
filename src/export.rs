// src/export.rs
//! Export generated mail for inspection
//!
//! Supports:
//! - JSON (world header plus every artifact, for analysis)
//! - mbox (opens in any mail client)

use crate::utils::errors::{EngineError, Result};
use crate::world::event::Artifact;
use crate::world::ids::CharacterId;
use crate::world::state::WorldState;
use serde::Serialize;
use std::path::Path;
use tracing::debug;

/// Export formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Mbox,
}

impl ExportFormat {
    /// Guess the format from a file extension; JSON unless `.mbox`
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("mbox") => ExportFormat::Mbox,
            _ => ExportFormat::Json,
        }
    }
}

/// Renders a world's artifacts
pub struct Exporter {
    format: ExportFormat,
}

impl Exporter {
    pub fn new(format: ExportFormat) -> Self {
        Self { format }
    }

    /// Export to string
    pub fn export(&self, world: &WorldState) -> Result<String> {
        debug!(
            "Exporting {} artifacts of {} as {:?}",
            world.artifacts().len(),
            world.id(),
            self.format
        );

        match self.format {
            ExportFormat::Json => self.export_json(world),
            ExportFormat::Mbox => Ok(self.export_mbox(world)),
        }
    }

    /// Export to a file, creating parent directories
    pub async fn export_to(&self, world: &WorldState, path: &Path) -> Result<()> {
        let rendered = self.export(world)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                EngineError::ExportFailed(format!("failed to create {}: {}", parent.display(), e))
            })?;
        }
        tokio::fs::write(path, rendered)
            .await
            .map_err(|e| EngineError::ExportFailed(format!("failed to write {}: {}", path.display(), e)))
    }

    fn export_json(&self, world: &WorldState) -> Result<String> {
        let document = JsonExport {
            world_id: world.id().as_str(),
            name: world.name(),
            tick: world.tick(),
            status: world.status().as_str(),
            artifacts: world.artifacts(),
        };

        serde_json::to_string_pretty(&document)
            .map_err(|e| EngineError::ExportFailed(format!("JSON serialization error: {}", e)))
    }

    fn export_mbox(&self, world: &WorldState) -> String {
        let mut out = String::new();
        for artifact in world.artifacts() {
            write_message(&mut out, world, artifact);
        }
        out
    }
}

#[derive(Serialize)]
struct JsonExport<'a> {
    world_id: &'a str,
    name: &'a str,
    tick: u64,
    status: &'a str,
    artifacts: &'a [Artifact],
}

fn write_message(out: &mut String, world: &WorldState, artifact: &Artifact) {
    let (_, from_email) = address(world, &artifact.author);
    let to = artifact
        .recipients
        .iter()
        .map(|r| mailbox(world, r))
        .collect::<Vec<_>>()
        .join(", ");

    out.push_str(&format!(
        "From {} {}\n",
        from_email,
        artifact.sent_at.format("%a %b %e %H:%M:%S %Y")
    ));
    out.push_str(&format!("From: {}\n", mailbox(world, &artifact.author)));
    if !to.is_empty() {
        out.push_str(&format!("To: {}\n", to));
    }
    out.push_str(&format!("Subject: {}\n", artifact.subject));
    out.push_str(&format!("Date: {}\n", artifact.sent_at.to_rfc2822()));
    out.push_str(&format!("Message-ID: <{}@{}>\n", artifact.id, world.id()));
    if let Some(parent) = &artifact.in_reply_to {
        out.push_str(&format!("In-Reply-To: <{}@{}>\n", parent, world.id()));
    }
    out.push_str(&format!("X-Worldsim-Event: {}\n", artifact.event_id));
    out.push_str(&format!("X-Worldsim-Tick: {}\n\n", artifact.tick));

    for line in artifact.body.lines() {
        // mboxrd quoting
        if line.trim_start_matches('>').starts_with("From ") {
            out.push('>');
        }
        out.push_str(line);
        out.push('\n');
    }
    out.push('\n');
}

fn address(world: &WorldState, id: &CharacterId) -> (String, String) {
    match world.character(id) {
        Some(c) => (c.name.clone(), c.email.clone()),
        None => (id.to_string(), format!("{}@unknown", id)),
    }
}

fn mailbox(world: &WorldState, id: &CharacterId) -> String {
    let (name, email) = address(world, id);
    format!("{} <{}>", name, email)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::event::{EventKind, WorldEvent};
    use crate::world::ids::{ArtifactId, EventId};
    use crate::world::testing::office_world;

    fn world_with_thread() -> WorldState {
        let mut world = office_world();
        let event = EventId::for_tick(1, 0);
        let sent_at = world.clock().current;
        world
            .record_event(WorldEvent {
                id: event.clone(),
                tick: 1,
                kind: EventKind::Meeting,
                description: "Budget sync".into(),
                participants: vec!["alice".into(), "bob".into()],
                impacts: vec![],
                spawned_tensions: vec![],
                revealed: None,
                sim_time: sent_at,
            })
            .unwrap();

        let first = ArtifactId::for_message(&event, 0);
        world
            .record_artifact(Artifact {
                id: first.clone(),
                event_id: event.clone(),
                tick: 1,
                author: "alice".into(),
                recipients: vec!["bob".into()],
                subject: "Budget".into(),
                body: "Hi Bob,\nFrom the numbers we are over.\nAlice".into(),
                in_reply_to: None,
                knowledge_refs: vec![],
                sent_at,
            })
            .unwrap();
        world
            .record_artifact(Artifact {
                id: ArtifactId::for_message(&event, 1),
                event_id: event,
                tick: 1,
                author: "bob".into(),
                recipients: vec!["alice".into()],
                subject: "Re: Budget".into(),
                body: "Noted.".into(),
                in_reply_to: Some(first),
                knowledge_refs: vec![],
                sent_at: sent_at + chrono::Duration::minutes(20),
            })
            .unwrap();
        world
    }

    #[test]
    fn test_export_json() {
        let world = world_with_thread();
        let json = Exporter::new(ExportFormat::Json).export(&world).unwrap();

        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["world_id"], "world_test");
        assert_eq!(parsed["artifacts"].as_array().unwrap().len(), 2);
        assert_eq!(parsed["artifacts"][1]["subject"], "Re: Budget");
    }

    #[test]
    fn test_export_mbox() {
        let world = world_with_thread();
        let mbox = Exporter::new(ExportFormat::Mbox).export(&world).unwrap();

        assert_eq!(mbox.matches("\nMessage-ID: ").count(), 2);
        assert!(mbox.starts_with("From "));
        assert!(mbox.contains("Subject: Re: Budget"));
        assert!(mbox.contains("In-Reply-To: <art_"));
        // body lines that look like separators are quoted
        assert!(mbox.contains("\n>From the numbers"));
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(ExportFormat::from_path(Path::new("out/mail.mbox")), ExportFormat::Mbox);
        assert_eq!(ExportFormat::from_path(Path::new("out/world.json")), ExportFormat::Json);
    }

    #[tokio::test]
    async fn test_export_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("mail.mbox");
        let world = world_with_thread();

        Exporter::new(ExportFormat::Mbox).export_to(&world, &path).await.unwrap();

        let written = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(written.contains("X-Worldsim-Tick: 1"));
    }
}
