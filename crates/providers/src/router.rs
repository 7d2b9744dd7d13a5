//! Gateway router: selects the completion gateway named by config.
//!
//! Handles gateway creation and routing requests to the right backend.

use std::collections::HashMap;
use std::sync::Arc;

use agentrelay_core::error::ProviderError;
use agentrelay_core::gateway::CompletionGateway;

use crate::openai_compat::OpenAiCompatGateway;

/// Routes completion requests to the correct gateway.
pub struct GatewayRouter {
    gateways: HashMap<String, Arc<dyn CompletionGateway>>,
    default_gateway: String,
}

impl GatewayRouter {
    /// Create a new router with a default gateway name.
    pub fn new(default_gateway: impl Into<String>) -> Self {
        Self {
            gateways: HashMap::new(),
            default_gateway: default_gateway.into(),
        }
    }

    /// Register a gateway.
    pub fn register(&mut self, name: impl Into<String>, gateway: Arc<dyn CompletionGateway>) {
        self.gateways.insert(name.into(), gateway);
    }

    /// Get the default gateway.
    pub fn default_gateway(&self) -> Result<Arc<dyn CompletionGateway>, ProviderError> {
        self.get(&self.default_gateway)
            .ok_or_else(|| ProviderError::NotConfigured(self.default_gateway.clone()))
    }

    /// Get a specific gateway by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn CompletionGateway>> {
        self.gateways.get(name).cloned()
    }

    /// List all registered gateway names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.gateways.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

/// Build gateways from configuration.
pub fn build_from_config(config: &agentrelay_config::AppConfig) -> GatewayRouter {
    let mut router = GatewayRouter::new(&config.default_provider);

    for (name, provider_config) in &config.providers {
        let api_key = provider_config
            .api_key
            .clone()
            .or_else(|| config.api_key.clone())
            .unwrap_or_default();

        let base_url = provider_config
            .api_url
            .clone()
            .unwrap_or_else(|| default_base_url(name));

        router.register(
            name.clone(),
            Arc::new(OpenAiCompatGateway::new(name, &base_url, &api_key)),
        );
    }

    // Ensure the default gateway exists (even if not explicitly configured)
    if router.get(&config.default_provider).is_none() {
        let api_key = config.api_key.clone().unwrap_or_default();
        let base_url = default_base_url(&config.default_provider);
        router.register(
            config.default_provider.clone(),
            Arc::new(OpenAiCompatGateway::new(
                &config.default_provider,
                &base_url,
                &api_key,
            )),
        );
    }

    router
}

/// Whether a provider runs locally and needs no API key.
pub fn is_local_provider(provider_name: &str) -> bool {
    matches!(provider_name, "ollama" | "vllm" | "llamacpp" | "llama.cpp")
}

/// Get the default base URL for well-known providers.
fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "openai" => "https://api.openai.com/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "deepseek" => "https://api.deepseek.com/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "fireworks" => "https://api.fireworks.ai/inference/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        "llamacpp" | "llama.cpp" => "http://localhost:8080/v1".into(),
        _ => format!("https://{provider_name}.api.example.com/v1"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn router_register_and_lookup() {
        let mut router = GatewayRouter::new("openrouter");
        router.register("openrouter", Arc::new(OpenAiCompatGateway::openrouter("sk-test")));

        assert!(router.get("openrouter").is_some());
        assert!(router.get("nonexistent").is_none());
        assert!(router.default_gateway().is_ok());
    }

    #[test]
    fn missing_default_is_not_configured() {
        let router = GatewayRouter::new("openai");
        let err = router.default_gateway().err().unwrap();
        assert!(matches!(err, ProviderError::NotConfigured(name) if name == "openai"));
    }

    #[test]
    fn default_base_urls() {
        assert!(default_base_url("openrouter").contains("openrouter.ai"));
        assert!(default_base_url("openai").contains("api.openai.com"));
        assert!(default_base_url("ollama").contains("localhost:11434"));
        assert!(is_local_provider("ollama"));
        assert!(!is_local_provider("openai"));
    }

    #[test]
    fn build_from_default_config() {
        let config = agentrelay_config::AppConfig::default();
        let router = build_from_config(&config);
        let gateway = router.default_gateway().unwrap();
        assert_eq!(gateway.name(), "openai");
    }

    #[test]
    fn configured_providers_are_registered() {
        let mut config = agentrelay_config::AppConfig::default();
        config.providers.insert(
            "ollama".into(),
            agentrelay_config::ProviderConfig {
                api_key: None,
                api_url: Some("http://gpu-box:11434/v1".into()),
                default_model: None,
            },
        );
        let router = build_from_config(&config);
        assert_eq!(router.list(), vec!["ollama", "openai"]);
    }
}
