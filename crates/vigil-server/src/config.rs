use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// How long recovered alerts are kept before the eviction task
    /// removes them.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
    /// Interval between eviction runs.
    #[serde(default = "default_eviction_interval_secs")]
    pub eviction_interval_secs: u64,
    /// CORS allowed origins; empty allows every origin (development mode).
    #[serde(default)]
    pub cors_allowed_origins: Vec<String>,
}

fn default_http_port() -> u16 {
    8428
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_retention_secs() -> u64 {
    7 * 24 * 3600
}

fn default_eviction_interval_secs() -> u64 {
    3600
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: default_http_port(),
            data_dir: default_data_dir(),
            retention_secs: default_retention_secs(),
            eviction_interval_secs: default_eviction_interval_secs(),
            cors_allowed_origins: Vec::new(),
        }
    }
}

impl ServerConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }
}
