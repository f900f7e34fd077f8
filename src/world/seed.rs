// src/world/seed.rs
//! Initial world seed
//!
//! The document pipeline hands over characters, relationships, tensions and
//! knowledge once, at tick 0. `SeedFile` reads the same shape from YAML or
//! JSON on disk.

use crate::utils::errors::{EngineError, Result};
use crate::world::character::Persona;
use crate::world::ids::{CharacterId, KnowledgeId, TensionId};
use crate::world::relationship::RelationshipKind;
use crate::world::tension::{TensionKind, TensionStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSeed {
    pub name: String,

    /// Simulated clock start
    #[serde(default = "default_start")]
    pub start_time: DateTime<Utc>,

    /// Seeds the event planner
    #[serde(default)]
    pub planner_seed: u64,

    #[serde(default)]
    pub characters: Vec<CharacterSeed>,

    #[serde(default)]
    pub relationships: Vec<RelationshipSeed>,

    #[serde(default)]
    pub tensions: Vec<TensionSeed>,

    #[serde(default)]
    pub knowledge: Vec<KnowledgeSeed>,
}

fn default_start() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(1_704_096_000, 0).unwrap_or_default()
}

fn default_strength() -> f64 {
    0.5
}

fn default_intensity() -> f64 {
    0.2
}

fn default_confidence() -> f64 {
    1.0
}

fn default_document() -> String {
    "seed".to_string()
}

fn default_building() -> TensionStatus {
    TensionStatus::Building
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterSeed {
    pub id: CharacterId,
    pub name: String,

    /// Derived from the id when absent
    #[serde(default)]
    pub email: Option<String>,

    #[serde(default)]
    pub role: String,

    #[serde(default)]
    pub persona: Option<Persona>,

    #[serde(default)]
    pub goals: Vec<String>,

    #[serde(default)]
    pub emotional_baseline: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipSeed {
    pub a: CharacterId,
    pub b: CharacterId,
    pub kind: RelationshipKind,

    #[serde(default = "default_strength")]
    pub strength: f64,

    #[serde(default)]
    pub sentiment: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensionSeed {
    pub id: TensionId,
    pub kind: TensionKind,
    pub description: String,
    pub participants: Vec<CharacterId>,

    #[serde(default = "default_intensity")]
    pub intensity: f64,

    #[serde(default = "default_building")]
    pub status: TensionStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeSeed {
    pub id: KnowledgeId,
    pub fact: String,

    /// Source document the fact was extracted from
    #[serde(default = "default_document")]
    pub document: String,

    #[serde(default = "default_confidence")]
    pub confidence: f64,

    /// Characters who know this fact at tick 0
    #[serde(default)]
    pub holders: Vec<CharacterId>,
}

/// Supplies the tick-0 seed; consumed once per universe
#[async_trait]
pub trait SeedProvider: Send + Sync {
    async fn load_seed(&self) -> Result<WorldSeed>;
}

/// An already-built seed
#[async_trait]
impl SeedProvider for WorldSeed {
    async fn load_seed(&self) -> Result<WorldSeed> {
        Ok(self.clone())
    }
}

/// Seed document on disk, format chosen by extension
#[derive(Debug, Clone)]
pub struct SeedFile {
    path: PathBuf,
}

impl SeedFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse seed text; `.json` is JSON, anything else is YAML
    pub fn parse(path: &Path, contents: &str) -> Result<WorldSeed> {
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        if is_json {
            serde_json::from_str(contents).map_err(|e| {
                EngineError::SeedError(format!("Invalid JSON seed {}: {}", path.display(), e))
            })
        } else {
            serde_yaml::from_str(contents).map_err(|e| {
                EngineError::SeedError(format!("Invalid YAML seed {}: {}", path.display(), e))
            })
        }
    }
}

#[async_trait]
impl SeedProvider for SeedFile {
    async fn load_seed(&self) -> Result<WorldSeed> {
        debug!("Reading seed from {}", self.path.display());

        let contents = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            EngineError::SeedError(format!("Failed to read {}: {}", self.path.display(), e))
        })?;

        let seed = Self::parse(&self.path, &contents)?;
        info!(
            "Loaded seed '{}' ({} characters, {} tensions, {} facts)",
            seed.name,
            seed.characters.len(),
            seed.tensions.len(),
            seed.knowledge.len()
        );
        Ok(seed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const YAML_SEED: &str = r#"
name: Harbor Logistics
planner_seed: 42
characters:
  - id: alice
    name: Alice Moreau
    role: CFO
    persona:
      name: Alice
      voice: clipped and precise
    goals: ["close the audit"]
  - id: bob
    name: Bob Lin
relationships:
  - { a: alice, b: bob, kind: colleague }
tensions:
  - id: t_budget
    kind: conflict
    description: Budget overrun nobody owns
    participants: [alice, bob]
    intensity: 0.4
knowledge:
  - id: k_overrun
    fact: Q3 freight costs are 18% over plan
    holders: [alice]
"#;

    #[test]
    fn test_parse_yaml_with_defaults() {
        let seed = SeedFile::parse(Path::new("world.yaml"), YAML_SEED).unwrap();

        assert_eq!(seed.name, "Harbor Logistics");
        assert_eq!(seed.planner_seed, 42);
        assert_eq!(seed.characters.len(), 2);
        assert!(seed.characters[1].persona.is_none());
        assert_eq!(seed.relationships[0].strength, 0.5);
        assert_eq!(seed.tensions[0].status, TensionStatus::Building);
        assert_eq!(seed.knowledge[0].document, "seed");
        assert_eq!(seed.knowledge[0].confidence, 1.0);
    }

    #[test]
    fn test_parse_json_by_extension() {
        let json = r#"{"name": "tiny", "characters": [{"id": "a", "name": "A"}]}"#;
        let seed = SeedFile::parse(Path::new("seed.JSON"), json).unwrap();
        assert_eq!(seed.characters[0].id.as_str(), "a");
    }

    #[test]
    fn test_parse_error_is_seed_error() {
        let err = SeedFile::parse(Path::new("seed.yaml"), "name: [unclosed").unwrap_err();
        assert!(matches!(err, EngineError::SeedError(_)));
    }

    #[tokio::test]
    async fn test_seed_file_provider() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("world.yaml");
        std::fs::write(&path, YAML_SEED).unwrap();

        let seed = SeedFile::new(&path).load_seed().await.unwrap();
        assert_eq!(seed.tensions[0].id.as_str(), "t_budget");
    }

    #[tokio::test]
    async fn test_missing_file() {
        let err = SeedFile::new("/nonexistent/seed.yaml").load_seed().await.unwrap_err();
        assert!(matches!(err, EngineError::SeedError(_)));
    }
}
