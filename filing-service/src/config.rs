use anyhow::{Context as _, Result, bail};
use std::path::PathBuf;
use std::time::Duration;

use filing_flow::{AgentRegistry, llm::gemini::API_KEY_VARS};

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_CHAT_MODEL: &str = "gemini-2.5-flash";

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub api_key: Option<String>,
    pub port: u16,
    pub chat_model: String,
    pub agents_file: Option<PathBuf>,
    pub model_timeout: Option<Duration>,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_key = API_KEY_VARS.iter().find_map(|var| get(var));

        let port = match get("PORT") {
            Some(port) => port
                .trim()
                .parse::<u16>()
                .with_context(|| format!("PORT must be a port number, got '{port}'"))?,
            None => DEFAULT_PORT,
        };

        let model_timeout = match get("MODEL_TIMEOUT_SECS") {
            Some(secs) => {
                let secs = secs
                    .trim()
                    .parse::<u64>()
                    .with_context(|| format!("MODEL_TIMEOUT_SECS must be an integer, got '{secs}'"))?;
                if secs == 0 {
                    bail!("MODEL_TIMEOUT_SECS must be positive");
                }
                Some(Duration::from_secs(secs))
            }
            None => None,
        };

        Ok(Self {
            api_key,
            port,
            chat_model: get("CHAT_MODEL").unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
            agents_file: get("AGENTS_FILE").map(PathBuf::from),
            model_timeout,
        })
    }

    /// Registry from `AGENTS_FILE`, or the built-in two agents.
    pub fn agent_registry(&self) -> Result<AgentRegistry> {
        match &self.agents_file {
            Some(path) => AgentRegistry::from_yaml_file(path)
                .with_context(|| format!("failed to load agents from {}", path.display())),
            None => Ok(AgentRegistry::default_510k()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.api_key, None);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.chat_model, DEFAULT_CHAT_MODEL);
        assert!(config.agents_file.is_none());
        assert!(config.model_timeout.is_none());
        assert_eq!(config.agent_registry().unwrap().len(), 2);
    }

    #[test]
    fn test_api_key_precedence() {
        let config = ServiceConfig::from_lookup(lookup(&[
            ("GEMINI_API_KEY", "gemini-key"),
            ("API_KEY", "generic-key"),
        ]))
        .unwrap();
        assert_eq!(config.api_key.as_deref(), Some("gemini-key"));

        let config =
            ServiceConfig::from_lookup(lookup(&[("GEMINI_API_KEY", " "), ("API_KEY", "generic-key")]))
                .unwrap();
        assert_eq!(config.api_key.as_deref(), Some("generic-key"));
    }

    #[test]
    fn test_parsed_values() {
        let config = ServiceConfig::from_lookup(lookup(&[
            ("PORT", "8080"),
            ("MODEL_TIMEOUT_SECS", "45"),
            ("CHAT_MODEL", "gemini-2.5-pro"),
        ]))
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.model_timeout, Some(Duration::from_secs(45)));
        assert_eq!(config.chat_model, "gemini-2.5-pro");
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(ServiceConfig::from_lookup(lookup(&[("PORT", "http")])).is_err());
        assert!(ServiceConfig::from_lookup(lookup(&[("MODEL_TIMEOUT_SECS", "0")])).is_err());
        let missing = ServiceConfig::from_lookup(lookup(&[("AGENTS_FILE", "/nonexistent/agents.yaml")]))
            .unwrap();
        assert!(missing.agent_registry().is_err());
    }
}
