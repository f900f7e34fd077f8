// src/world/tension.rs
//! Tension lifecycle
//!
//! ```text
//! building ──▶ active ──▶ climax ──▶ resolving ──▶ resolved
//!                ▲                       │
//!                └────── reescalate ─────┘
//! ```
//!
//! States only move forward, with one exception: a `resolving` tension can be
//! pulled back to `active` by an explicit re-escalation. Intensity never drops
//! while rising (building/active/climax) and never grows while falling
//! (resolving/resolved); out-of-range requests are clamped.

use crate::utils::errors::{EngineError, Result};
use crate::world::ids::{CharacterId, TensionId};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TensionKind {
    Conflict,
    Secret,
    Desire,
    Mystery,
    Alliance,
    Competition,
    Revelation,
    Betrayal,
    Opportunity,
}

impl TensionKind {
    pub const ALL: [TensionKind; 9] = [
        TensionKind::Conflict,
        TensionKind::Secret,
        TensionKind::Desire,
        TensionKind::Mystery,
        TensionKind::Alliance,
        TensionKind::Competition,
        TensionKind::Revelation,
        TensionKind::Betrayal,
        TensionKind::Opportunity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TensionKind::Conflict => "conflict",
            TensionKind::Secret => "secret",
            TensionKind::Desire => "desire",
            TensionKind::Mystery => "mystery",
            TensionKind::Alliance => "alliance",
            TensionKind::Competition => "competition",
            TensionKind::Revelation => "revelation",
            TensionKind::Betrayal => "betrayal",
            TensionKind::Opportunity => "opportunity",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TensionStatus {
    Building,
    Active,
    Climax,
    Resolving,
    Resolved,
}

impl TensionStatus {
    fn rank(&self) -> u8 {
        match self {
            TensionStatus::Building => 0,
            TensionStatus::Active => 1,
            TensionStatus::Climax => 2,
            TensionStatus::Resolving => 3,
            TensionStatus::Resolved => 4,
        }
    }

    /// Building, active or climax
    pub fn is_rising(&self) -> bool {
        self.rank() <= TensionStatus::Climax.rank()
    }

    pub fn is_terminal(&self) -> bool {
        *self == TensionStatus::Resolved
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TensionStatus::Building => "building",
            TensionStatus::Active => "active",
            TensionStatus::Climax => "climax",
            TensionStatus::Resolving => "resolving",
            TensionStatus::Resolved => "resolved",
        }
    }
}

impl fmt::Display for TensionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an event does to a tension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum TensionEffect {
    /// Raise intensity by `delta`
    Intensify { delta: f64 },

    /// Lower intensity by `delta`
    Ease { delta: f64 },

    /// Jump to climax
    Climax,

    /// Start winding down
    BeginResolution,

    /// Close the tension
    Resolve,

    /// Pull a resolving tension back to active
    Reescalate,
}

/// Thresholds that drive automatic forward transitions
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TensionRules {
    pub activation_threshold: f64,
    pub climax_threshold: f64,
    pub allow_reescalation: bool,
}

impl Default for TensionRules {
    fn default() -> Self {
        Self {
            activation_threshold: 0.35,
            climax_threshold: 0.8,
            allow_reescalation: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tension {
    pub id: TensionId,
    pub kind: TensionKind,
    pub description: String,
    pub participants: Vec<CharacterId>,
    intensity: f64,
    peak_intensity: f64,
    status: TensionStatus,
    pub created_tick: u64,
    resolved_tick: Option<u64>,
    escalations: u32,
}

impl Tension {
    pub fn new(
        id: TensionId,
        kind: TensionKind,
        description: impl Into<String>,
        participants: Vec<CharacterId>,
        intensity: f64,
        created_tick: u64,
    ) -> Self {
        let intensity = intensity.clamp(0.0, 1.0);
        Self {
            id,
            kind,
            description: description.into(),
            participants,
            intensity,
            peak_intensity: intensity,
            status: TensionStatus::Building,
            created_tick,
            resolved_tick: None,
            escalations: 0,
        }
    }

    /// Seeded tensions may start past `building`
    pub fn with_status(mut self, status: TensionStatus, tick: u64) -> Self {
        self.status = status;
        if status.is_terminal() {
            self.resolved_tick = Some(tick);
        }
        self
    }

    pub fn intensity(&self) -> f64 {
        self.intensity
    }

    pub fn peak_intensity(&self) -> f64 {
        self.peak_intensity
    }

    pub fn status(&self) -> TensionStatus {
        self.status
    }

    pub fn resolved_tick(&self) -> Option<u64> {
        self.resolved_tick
    }

    /// Times this tension came back from `resolving`
    pub fn escalations(&self) -> u32 {
        self.escalations
    }

    pub fn is_resolved(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn involves(&self, character: &CharacterId) -> bool {
        self.participants.contains(character)
    }

    /// Request a new intensity; returns the value actually applied
    pub fn set_intensity(&mut self, requested: f64) -> f64 {
        let requested = requested.clamp(0.0, 1.0);

        self.intensity = if self.status.is_rising() {
            self.intensity.max(requested)
        } else {
            self.intensity.min(requested)
        };

        if self.status.is_rising() {
            self.peak_intensity = self.peak_intensity.max(self.intensity);
        }

        self.intensity
    }

    /// Move forward through the lifecycle
    pub fn transition(&mut self, to: TensionStatus, tick: u64) -> Result<()> {
        if to == self.status {
            return Ok(());
        }
        if to.rank() < self.status.rank() {
            return Err(EngineError::InvalidTensionTransition {
                tension: self.id.to_string(),
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }

        self.status = to;
        if to.is_terminal() {
            self.resolved_tick = Some(tick);
        }
        Ok(())
    }

    /// `resolving -> active`; intensity returns to its recorded peak
    pub fn reescalate(&mut self) -> Result<()> {
        if self.status != TensionStatus::Resolving {
            return Err(EngineError::InvalidTensionTransition {
                tension: self.id.to_string(),
                from: self.status.to_string(),
                to: TensionStatus::Active.to_string(),
            });
        }

        self.status = TensionStatus::Active;
        self.intensity = self.peak_intensity;
        self.escalations += 1;
        Ok(())
    }

    /// Apply threshold-driven transitions (building -> active -> climax)
    pub fn settle(&mut self, rules: &TensionRules, tick: u64) -> Result<()> {
        if self.status == TensionStatus::Building && self.intensity >= rules.activation_threshold {
            self.transition(TensionStatus::Active, tick)?;
        }
        if self.status == TensionStatus::Active && self.intensity >= rules.climax_threshold {
            self.transition(TensionStatus::Climax, tick)?;
        }
        Ok(())
    }

    /// Apply one effect, then settle thresholds
    ///
    /// `reescalation_permitted` is decided by the caller from the triggering
    /// event; a re-escalation without it is rejected.
    pub fn apply(
        &mut self,
        effect: &TensionEffect,
        rules: &TensionRules,
        reescalation_permitted: bool,
        tick: u64,
    ) -> Result<()> {
        if self.is_resolved() {
            return Err(EngineError::InvalidTensionTransition {
                tension: self.id.to_string(),
                from: self.status.to_string(),
                to: format!("{:?}", effect).to_lowercase(),
            });
        }

        match effect {
            TensionEffect::Intensify { delta } => {
                self.set_intensity(self.intensity + delta.abs());
            }
            TensionEffect::Ease { delta } => {
                self.set_intensity(self.intensity - delta.abs());
            }
            TensionEffect::Climax => {
                self.transition(TensionStatus::Climax, tick)?;
                self.set_intensity(rules.climax_threshold);
            }
            TensionEffect::BeginResolution => {
                self.transition(TensionStatus::Resolving, tick)?;
            }
            TensionEffect::Resolve => {
                self.transition(TensionStatus::Resolved, tick)?;
            }
            TensionEffect::Reescalate => {
                if !(rules.allow_reescalation && reescalation_permitted) {
                    return Err(EngineError::InvalidTensionTransition {
                        tension: self.id.to_string(),
                        from: self.status.to_string(),
                        to: "active (re-escalation not permitted)".to_string(),
                    });
                }
                self.reescalate()?;
            }
        }

        self.settle(rules, tick)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tension(intensity: f64) -> Tension {
        Tension::new(
            TensionId::from("ten_1"),
            TensionKind::Conflict,
            "budget fight",
            vec![CharacterId::from("a"), CharacterId::from("b")],
            intensity,
            0,
        )
    }

    #[test]
    fn test_intensity_clamped_while_rising() {
        let mut t = tension(0.3);
        assert_eq!(t.set_intensity(0.1), 0.3);
        assert_eq!(t.set_intensity(0.5), 0.5);
        assert_eq!(t.set_intensity(4.0), 1.0);
    }

    #[test]
    fn test_intensity_clamped_while_falling() {
        let mut t = tension(0.9);
        t.transition(TensionStatus::Resolving, 3).unwrap();
        assert_eq!(t.set_intensity(0.95), 0.9);
        assert_eq!(t.set_intensity(0.4), 0.4);
        assert_eq!(t.set_intensity(0.6), 0.4);
    }

    #[test]
    fn test_no_backward_transitions() {
        let mut t = tension(0.5);
        t.transition(TensionStatus::Climax, 2).unwrap();
        let err = t.transition(TensionStatus::Active, 3).unwrap_err();
        assert!(matches!(err, EngineError::InvalidTensionTransition { .. }));
    }

    #[test]
    fn test_resolve_records_tick() {
        let mut t = tension(0.5);
        t.transition(TensionStatus::Resolved, 7).unwrap();
        assert_eq!(t.resolved_tick(), Some(7));
        assert!(t
            .apply(&TensionEffect::Intensify { delta: 0.1 }, &TensionRules::default(), false, 8)
            .is_err());
    }

    #[test]
    fn test_threshold_settling() {
        let rules = TensionRules::default();
        let mut t = tension(0.2);

        t.apply(&TensionEffect::Intensify { delta: 0.2 }, &rules, false, 1).unwrap();
        assert_eq!(t.status(), TensionStatus::Active);

        t.apply(&TensionEffect::Intensify { delta: 0.5 }, &rules, false, 2).unwrap();
        assert_eq!(t.status(), TensionStatus::Climax);
    }

    #[test]
    fn test_reescalation_requires_permission() {
        let rules = TensionRules::default();
        let mut t = tension(0.7);
        t.transition(TensionStatus::Resolving, 4).unwrap();

        assert!(t.apply(&TensionEffect::Reescalate, &rules, false, 5).is_err());
        assert_eq!(t.status(), TensionStatus::Resolving);

        let disabled = TensionRules {
            allow_reescalation: false,
            ..rules
        };
        assert!(t.apply(&TensionEffect::Reescalate, &disabled, true, 5).is_err());
    }

    #[test]
    fn test_reescalation_restores_peak() {
        let rules = TensionRules::default();
        let mut t = tension(0.6);
        t.transition(TensionStatus::Active, 1).unwrap();
        t.transition(TensionStatus::Resolving, 2).unwrap();
        t.apply(&TensionEffect::Ease { delta: 0.3 }, &rules, false, 3).unwrap();
        assert!((t.intensity() - 0.3).abs() < 1e-9);

        t.apply(&TensionEffect::Reescalate, &rules, true, 4).unwrap();
        assert_eq!(t.status(), TensionStatus::Active);
        assert!((t.intensity() - 0.6).abs() < 1e-9);
        assert_eq!(t.escalations(), 1);
    }

    #[test]
    fn test_reescalate_only_from_resolving() {
        let mut t = tension(0.6);
        assert!(t.reescalate().is_err());
    }

    #[test]
    fn test_climax_effect() {
        let rules = TensionRules::default();
        let mut t = tension(0.2);
        t.apply(&TensionEffect::Climax, &rules, false, 1).unwrap();
        assert_eq!(t.status(), TensionStatus::Climax);
        assert!(t.intensity() >= rules.climax_threshold);
    }
}
