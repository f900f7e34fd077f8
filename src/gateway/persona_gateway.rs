// src/gateway/persona_gateway.rs
//! Persona-bound gateway with provider fallback
//!
//! Each character is bound once per universe to a persona and an ordered list
//! of providers (its preferred provider first, then the rest in registration
//! order). The binding also owns the character's throttle: calls for the same
//! character queue on it, calls for different characters never touch each
//! other's state.

use crate::gateway::provider::PersonaProvider;
use crate::gateway::{GatewayError, GenerationContext, GenerationGateway};
use crate::utils::config::GatewayConfig;
use crate::utils::errors::{EngineError, Result};
use crate::world::character::Persona;
use crate::world::ids::CharacterId;
use crate::world::state::WorldState;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Per-binding rate-limit and backoff state
#[derive(Debug, Default)]
struct Throttle {
    last_call: Option<Instant>,

    /// Zero until a provider error; doubles on each further error
    backoff: Duration,
}

impl Throttle {
    /// Sleep until the binding may call out again
    async fn wait(&self, min_interval: Duration) {
        let Some(last) = self.last_call else {
            return;
        };
        let ready = last + min_interval.max(self.backoff);
        if ready > Instant::now() {
            tokio::time::sleep_until(ready).await;
        }
    }

    fn record_failure(&mut self, initial: Duration, max: Duration) {
        self.backoff = if self.backoff.is_zero() {
            initial
        } else {
            self.backoff.saturating_mul(2)
        }
        .min(max);
    }

    fn record_success(&mut self) {
        self.backoff = Duration::ZERO;
    }
}

struct Binding {
    persona: Persona,
    providers: Vec<Arc<dyn PersonaProvider>>,
    throttle: Mutex<Throttle>,
}

pub struct PersonaGateway {
    config: GatewayConfig,
    providers: Vec<Arc<dyn PersonaProvider>>,
    bindings: DashMap<CharacterId, Arc<Binding>>,
}

impl PersonaGateway {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            providers: Vec::new(),
            bindings: DashMap::new(),
        }
    }

    /// Register a backend; registration order is the fallback order
    pub fn with_provider(mut self, provider: Arc<dyn PersonaProvider>) -> Self {
        info!("Registered generation provider '{}'", provider.name());
        self.providers.push(provider);
        self
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Bind a character to a persona for the life of the universe
    ///
    /// Binding the same persona again is a no-op; a different persona is
    /// rejected so a character's voice never changes mid-universe.
    pub fn bind(&self, character: &CharacterId, persona: &Persona) -> Result<()> {
        if self.providers.is_empty() {
            return Err(EngineError::BindingError(
                "no generation providers registered".to_string(),
            ));
        }

        let providers = self.provider_order(persona)?;

        match self.bindings.entry(character.clone()) {
            Entry::Occupied(existing) => {
                if &existing.get().persona == persona {
                    Ok(())
                } else {
                    Err(EngineError::BindingError(format!(
                        "{} is already bound to persona '{}'",
                        character,
                        existing.get().persona.name
                    )))
                }
            }
            Entry::Vacant(slot) => {
                debug!(
                    "Bound {} to persona '{}' via {}",
                    character,
                    persona.name,
                    providers[0].name()
                );
                slot.insert(Arc::new(Binding {
                    persona: persona.clone(),
                    providers,
                    throttle: Mutex::new(Throttle::default()),
                }));
                Ok(())
            }
        }
    }

    /// Bind every character in the world that carries a persona
    pub fn bind_world(&self, world: &WorldState) -> Result<usize> {
        let mut bound = 0;
        for character in world.characters() {
            if let Some(persona) = &character.persona {
                self.bind(&character.id, persona)?;
                bound += 1;
            }
        }
        info!("Bound {} personas for world {}", bound, world.id());
        Ok(bound)
    }

    pub fn is_bound(&self, character: &CharacterId) -> bool {
        self.bindings.contains_key(character)
    }

    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    fn provider_order(&self, persona: &Persona) -> Result<Vec<Arc<dyn PersonaProvider>>> {
        let Some(preferred) = &persona.provider else {
            return Ok(self.providers.clone());
        };

        let position = self
            .providers
            .iter()
            .position(|p| p.name() == preferred)
            .ok_or_else(|| {
                EngineError::BindingError(format!(
                    "persona '{}' prefers unknown provider '{}'",
                    persona.name, preferred
                ))
            })?;

        let mut order = Vec::with_capacity(self.providers.len());
        order.push(Arc::clone(&self.providers[position]));
        order.extend(
            self.providers
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != position)
                .map(|(_, p)| Arc::clone(p)),
        );
        Ok(order)
    }
}

#[async_trait]
impl GenerationGateway for PersonaGateway {
    async fn generate_as_persona(
        &self,
        character: &CharacterId,
        prompt: &str,
        context: &GenerationContext,
    ) -> std::result::Result<String, GatewayError> {
        // clone the Arc out so no map shard lock is held across an await
        let binding = self
            .bindings
            .get(character)
            .map(|b| Arc::clone(b.value()))
            .ok_or_else(|| {
                GatewayError::Binding(format!("{} has no persona binding", character))
            })?;

        let min_interval = Duration::from_millis(self.config.min_interval_ms);
        let initial = Duration::from_millis(self.config.initial_backoff_ms);
        let max = Duration::from_millis(self.config.max_backoff_ms);
        let attempts = self.config.attempts_per_provider.max(1);

        let mut throttle = binding.throttle.lock().await;
        let mut last_error = String::new();

        for (index, provider) in binding.providers.iter().enumerate() {
            if index > 0 {
                debug!("{}: falling back to provider '{}'", character, provider.name());
                metrics::counter!("worldsim_gateway_fallbacks_total").increment(1);
            }

            for attempt in 1..=attempts {
                throttle.wait(min_interval).await;
                throttle.last_call = Some(Instant::now());

                match provider.generate(&binding.persona, prompt, context).await {
                    Ok(text) => {
                        throttle.record_success();
                        metrics::counter!(
                            "worldsim_gateway_calls_total",
                            "provider" => provider.name().to_string(),
                            "outcome" => "ok"
                        )
                        .increment(1);
                        return Ok(text);
                    }
                    Err(GatewayError::Binding(reason)) => {
                        return Err(GatewayError::Binding(reason));
                    }
                    Err(GatewayError::Provider(reason)) => {
                        warn!(
                            "{}: provider '{}' attempt {}/{} failed: {}",
                            character,
                            provider.name(),
                            attempt,
                            attempts,
                            reason
                        );
                        metrics::counter!(
                            "worldsim_gateway_calls_total",
                            "provider" => provider.name().to_string(),
                            "outcome" => "error"
                        )
                        .increment(1);
                        throttle.record_failure(initial, max);
                        last_error = reason;
                    }
                }
            }
        }

        Err(GatewayError::Provider(format!(
            "all providers failed for {}: {}",
            character, last_error
        )))
    }
}
