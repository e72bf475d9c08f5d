// src/config/oracle.rs
use serde::{Deserialize, Serialize};
use std::env;

fn default_enabled() -> bool {
    true
}
fn default_base_url() -> String {
    "https://api.deepseek.com".to_string()
}
fn default_model() -> String {
    "deepseek-chat".to_string()
}
fn default_api_key() -> String {
    "ENV".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// OpenAI-compatible API root; `/chat/completions` is appended.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// "ENV" means: read from DEEPSEEK_API_KEY, then OPENAI_API_KEY.
    #[serde(default = "default_api_key")]
    pub api_key: String,
    /// Topics the oracle should prefer.
    #[serde(default)]
    pub key_topics: Vec<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            base_url: default_base_url(),
            model: default_model(),
            api_key: default_api_key(),
            key_topics: Vec::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl OracleConfig {
    /// Resolve `"ENV"` placeholders and tidy topics. A missing key is left
    /// empty; the oracle factory then falls back to the disabled oracle.
    pub fn resolve(&mut self) {
        if self.api_key.trim().eq_ignore_ascii_case("env") {
            self.api_key = env::var("DEEPSEEK_API_KEY")
                .or_else(|_| env::var("OPENAI_API_KEY"))
                .unwrap_or_default();
        }
        self.key_topics = self
            .key_topics
            .iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        if self.timeout_secs == 0 {
            self.timeout_secs = default_timeout_secs();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[serial_test::serial]
    #[test]
    fn env_placeholder_prefers_deepseek_key() {
        env::set_var("DEEPSEEK_API_KEY", "ds-key");
        env::set_var("OPENAI_API_KEY", "oa-key");
        let mut cfg = OracleConfig::default();
        cfg.resolve();
        assert_eq!(cfg.api_key, "ds-key");

        env::remove_var("DEEPSEEK_API_KEY");
        let mut cfg = OracleConfig::default();
        cfg.resolve();
        assert_eq!(cfg.api_key, "oa-key");
        env::remove_var("OPENAI_API_KEY");
    }

    #[test]
    fn literal_key_and_topics_are_kept_trimmed() {
        let mut cfg: OracleConfig = toml::from_str(
            r#"
api_key = "sk-literal"
key_topics = [" rust ", "", "space"]
"#,
        )
        .unwrap();
        cfg.resolve();
        assert_eq!(cfg.api_key, "sk-literal");
        assert_eq!(cfg.key_topics, vec!["rust".to_string(), "space".to_string()]);
        assert!(cfg.enabled);
        assert_eq!(cfg.base_url, "https://api.deepseek.com");
    }
}
