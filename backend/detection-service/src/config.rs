//! Configuration for the detection service
use serde::Deserialize;

/// Main configuration struct, loaded from environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// OpenAI API key (optional, the deterministic stub is used when unset)
    #[serde(default = "default_openai_api_key")]
    pub openai_api_key: String,

    /// OpenAI API base URL, or a full chat-completions endpoint
    #[serde(default = "default_openai_api_url")]
    pub openai_api_url: String,

    /// Vision-capable model identifier
    #[serde(default = "default_openai_model")]
    pub openai_model: String,

    /// Read timeout for outbound vision calls, in milliseconds
    #[serde(default = "default_openai_timeout_ms")]
    pub openai_timeout_ms: u64,

    /// Use the detailed detection prompt (larger reply budget)
    #[serde(default = "default_use_detailed_prompt")]
    pub use_detailed_prompt: bool,

    /// Minimum aggregate confidence before a result is flagged for review
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,

    /// Detection cache TTL in seconds
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_seconds: u64,

    /// Redis URL for the cache and budget counters; an in-process store is
    /// used when empty
    #[serde(default)]
    pub redis_url: String,

    // ============================================
    // Budget limits
    // ============================================
    /// Maximum vision requests per hour
    #[serde(default = "default_max_requests_per_hour")]
    pub max_requests_per_hour: i64,

    /// Maximum vision requests per day
    #[serde(default = "default_max_requests_per_day")]
    pub max_requests_per_day: i64,

    /// Maximum daily spend (USD)
    #[serde(default = "default_max_cost_per_day")]
    pub max_cost_per_day: f64,

    /// Estimated cost per analyzed image (USD)
    #[serde(default = "default_cost_per_image")]
    pub cost_per_image: f64,

    /// Optional path to a taxonomy JSON file; the built-in catalog is used
    /// when unset
    #[serde(default)]
    pub taxonomy_path: Option<String>,
}

fn default_openai_api_key() -> String {
    String::new()
}

fn default_openai_api_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_openai_model() -> String {
    "gpt-5-mini".to_string()
}

fn default_openai_timeout_ms() -> u64 {
    30_000
}

fn default_use_detailed_prompt() -> bool {
    true
}

fn default_confidence_threshold() -> f64 {
    0.85
}

fn default_cache_ttl() -> u64 {
    3600 // 1 hour
}

fn default_max_requests_per_hour() -> i64 {
    300
}

fn default_max_requests_per_day() -> i64 {
    3000
}

fn default_max_cost_per_day() -> f64 {
    150.0
}

fn default_cost_per_image() -> f64 {
    0.01
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::from_env()
    }
}
