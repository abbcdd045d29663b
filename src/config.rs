use serde::{Deserialize, Serialize};

fn default_listen() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_database_path() -> String {
    "./tokencap.db".to_string()
}

fn default_project_id() -> String {
    "default".to_string()
}

fn default_max_output_tokens() -> u32 {
    4096
}

fn default_budget_warning_percent() -> f64 {
    80.0
}

fn default_openai_base_url() -> String {
    "https://api.openai.com".to_string()
}

fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_request_timeout_secs() -> u64 {
    300
}

fn default_stream_idle_timeout_secs() -> u64 {
    120
}

/// Runtime configuration, loadable from a JSON file with every field
/// optional. Upstream API keys fall back to `OPENAI_API_KEY` /
/// `ANTHROPIC_API_KEY` when absent.
#[derive(Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default = "default_project_id")]
    pub default_project_id: String,
    #[serde(default = "default_max_output_tokens")]
    pub default_max_output_tokens: u32,
    #[serde(default = "default_budget_warning_percent")]
    pub budget_warning_percent: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anthropic_api_key: Option<String>,
    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,
    #[serde(default = "default_anthropic_base_url")]
    pub anthropic_base_url: String,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_stream_idle_timeout_secs")]
    pub stream_idle_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            database_path: default_database_path(),
            default_project_id: default_project_id(),
            default_max_output_tokens: default_max_output_tokens(),
            budget_warning_percent: default_budget_warning_percent(),
            openai_api_key: None,
            anthropic_api_key: None,
            openai_base_url: default_openai_base_url(),
            anthropic_base_url: default_anthropic_base_url(),
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            stream_idle_timeout_secs: default_stream_idle_timeout_secs(),
        }
    }
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("listen", &self.listen)
            .field("database_path", &self.database_path)
            .field("default_project_id", &self.default_project_id)
            .field("default_max_output_tokens", &self.default_max_output_tokens)
            .field("budget_warning_percent", &self.budget_warning_percent)
            .field("openai_api_key", &self.openai_api_key.as_ref().map(|_| "<redacted>"))
            .field(
                "anthropic_api_key",
                &self.anthropic_api_key.as_ref().map(|_| "<redacted>"),
            )
            .field("openai_base_url", &self.openai_base_url)
            .field("anthropic_base_url", &self.anthropic_base_url)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("stream_idle_timeout_secs", &self.stream_idle_timeout_secs)
            .finish()
    }
}

impl GatewayConfig {
    /// Applies `OPENAI_API_KEY` / `ANTHROPIC_API_KEY` from the environment
    /// for keys the file did not set.
    pub fn with_env_credentials(mut self) -> Self {
        if self.openai_api_key.is_none() {
            self.openai_api_key = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty());
        }
        if self.anthropic_api_key.is_none() {
            self.anthropic_api_key = std::env::var("ANTHROPIC_API_KEY")
                .ok()
                .filter(|k| !k.is_empty());
        }
        self
    }
}
