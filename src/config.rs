//! Run settings loaded from an optional `config.yaml`.
//!
//! Every field has a default, so a partial file (or none at all) is valid.
//! Command-line flags are applied on top by [`crate::cli`].
//!
//! ```yaml
//! query: "fusão aquisição M&A"
//! days: 7
//! max_pages: 3
//! parallel: true
//! sources: [pipeline-valor, fusoes-aquisicoes]
//! http:
//!   timeout_secs: 10
//!   max_retries: 3
//! pacing:
//!   min_delay_ms: 1000
//!   max_delay_ms: 3000
//! ```

use crate::fetch::{IdentityPool, Pacing, RetryPolicy};
use crate::models::Source;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::path::Path;
use std::time::Duration;
use tracing::{info, instrument};

pub const DEFAULT_QUERY: &str = "fusão aquisição M&A";

const DEFAULT_USER_AGENTS: [&str; 5] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Mobile/15E148 Safari/604.1",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    pub query: String,
    pub days: u32,
    pub max_pages: u32,
    pub parallel: bool,
    pub output_dir: String,
    pub sources: Vec<Source>,
    pub http: HttpSettings,
    /// Random delay before each request to Fusões e Aquisições.
    pub pacing: PacingSettings,
    /// Fixed pause between result pages for the other sources.
    pub page_delay_ms: u64,
    pub user_agents: Vec<String>,
    pub credentials: FileCredentials,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            query: DEFAULT_QUERY.to_string(),
            days: 30,
            max_pages: 5,
            parallel: true,
            output_dir: "./output".to_string(),
            sources: Source::ALL.to_vec(),
            http: HttpSettings::default(),
            pacing: PacingSettings::default(),
            page_delay_ms: 2000,
            user_agents: DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect(),
            credentials: FileCredentials::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_ms: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            max_retries: 3,
            base_delay_ms: 2000,
            max_delay_ms: 30_000,
            jitter_ms: 250,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingSettings {
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for PacingSettings {
    fn default() -> Self {
        Self {
            min_delay_ms: 1000,
            max_delay_ms: 3000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileCredentials {
    pub valor_email: Option<String>,
    pub valor_password: Option<String>,
}

impl ExtractorConfig {
    /// Load from `path`, or fall back to defaults when no path is given.
    #[instrument(level = "info")]
    pub fn load(path: Option<&str>) -> Result<Self, Box<dyn Error>> {
        let Some(path) = path else {
            info!("No config file given; using defaults");
            return Ok(Self::default());
        };
        if !Path::new(path).exists() {
            return Err(format!("config file not found: {path}").into());
        }
        let raw = std::fs::read_to_string(path)?;
        let config = Self::from_yaml(&raw)?;
        info!(path, "Loaded configuration");
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.http.max_retries,
            base_delay: Duration::from_millis(self.http.base_delay_ms),
            max_delay: Duration::from_millis(self.http.max_delay_ms),
            jitter: Duration::from_millis(self.http.jitter_ms),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.http.timeout_secs)
    }

    pub fn pacing(&self) -> Pacing {
        Pacing {
            min: Duration::from_millis(self.pacing.min_delay_ms),
            max: Duration::from_millis(self.pacing.max_delay_ms),
        }
    }

    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }

    pub fn identity_pool(&self) -> IdentityPool {
        IdentityPool::new(self.user_agents.clone())
    }
}
