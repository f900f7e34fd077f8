// src/gateway/provider.rs
//! Raw generation backends

use crate::gateway::{GatewayError, GenerationContext};
use crate::world::character::Persona;
use async_trait::async_trait;

/// One text-generation backend
#[async_trait]
pub trait PersonaProvider: Send + Sync {
    /// Name personas use to prefer this provider
    fn name(&self) -> &str;

    async fn generate(
        &self,
        persona: &Persona,
        prompt: &str,
        context: &GenerationContext,
    ) -> Result<String, GatewayError>;
}

/// Offline backend that renders messages from a fixed template
///
/// Output depends only on its inputs, which keeps runs reproducible.
#[derive(Debug, Clone)]
pub struct TemplateProvider {
    name: String,
}

impl TemplateProvider {
    pub fn new() -> Self {
        Self::named("template")
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for TemplateProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PersonaProvider for TemplateProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        persona: &Persona,
        prompt: &str,
        context: &GenerationContext,
    ) -> Result<String, GatewayError> {
        let greeting = match context.recipients.as_slice() {
            [] => "Hi all,".to_string(),
            [one] => format!("Hi {},", one),
            many => format!("Hi {},", many.join(", ")),
        };

        let mut body = vec![greeting, String::new(), prompt.trim().to_string()];

        if !context.facts.is_empty() {
            body.push(String::new());
            body.push("For context:".to_string());
            body.extend(context.facts.iter().map(|f| format!("- {}", f)));
        }

        if let Some(previous) = context.thread.last() {
            body.push(String::new());
            let quoted: Vec<String> = previous.lines().map(|l| format!("> {}", l)).collect();
            body.push(quoted.join("\n"));
        }

        body.push(String::new());
        if persona.voice.is_empty() {
            body.push(persona.name.clone());
        } else {
            body.push(format!("{} ({})", persona.name, persona.voice));
        }

        Ok(body.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn persona() -> Persona {
        Persona {
            name: "Alice".into(),
            voice: "terse".into(),
            provider: None,
        }
    }

    #[tokio::test]
    async fn test_template_is_deterministic() {
        let provider = TemplateProvider::new();
        let ctx = GenerationContext {
            recipients: vec!["Bob".into()],
            facts: vec!["Freight is over plan".into()],
            ..Default::default()
        };

        let a = provider.generate(&persona(), "Can we talk?", &ctx).await.unwrap();
        let b = provider.generate(&persona(), "Can we talk?", &ctx).await.unwrap();

        assert_eq!(a, b);
        assert!(a.starts_with("Hi Bob,"));
        assert!(a.contains("- Freight is over plan"));
        assert!(a.ends_with("Alice (terse)"));
    }

    #[tokio::test]
    async fn test_template_quotes_thread() {
        let provider = TemplateProvider::named("offline");
        let ctx = GenerationContext {
            thread: vec!["first line\nsecond line".into()],
            ..Default::default()
        };

        let text = provider.generate(&persona(), "Agreed.", &ctx).await.unwrap();
        assert!(text.contains("> first line\n> second line"));
        assert_eq!(provider.name(), "offline");
    }
}
