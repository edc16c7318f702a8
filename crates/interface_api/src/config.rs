//! Application configuration
//!
//! Layers, lowest precedence first:
//!
//! 1. built-in defaults (`AppConfig::default()`)
//! 2. optional TOML/JSON file (`ADJUDICATOR_CONFIG` or an explicit path)
//! 3. environment variables prefixed `ADJUDICATOR__`, nested with `__`
//!    (e.g. `ADJUDICATOR__SERVER__PORT=9090`,
//!    `ADJUDICATOR__CONFIDENCE__ROUTER__GREEN_THRESHOLD=0.85`)
//!
//! `.env` files are read by the server binary before loading.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use domain_confidence::{RouterConfig, ScorerConfig, SignalCollectorConfig, TriggerConfig};
use domain_coverage::adapters::HttpModelConfig;
use domain_coverage::OrchestratorConfig;

pub const ENV_PREFIX: &str = "ADJUDICATOR";
pub const ENV_SEPARATOR: &str = "__";
pub const CONFIG_PATH_VAR: &str = "ADJUDICATOR_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is not set
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Root directory of the claim-run store
    pub root: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./data/claims"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Without a model the generative stages are skipped
    pub enabled: bool,
    pub http: HttpModelConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoverageConfig {
    pub orchestrator: OrchestratorConfig,
    /// JSON rules file replacing the built-in rule tables
    pub rules_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    /// Registered engine name
    pub engine: String,
    /// Engine-specific settings passed to its factory
    pub settings: serde_json::Value,
    /// Attempts at allocating a dossier version
    pub max_attempts: u32,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            engine: "reference".to_string(),
            settings: serde_json::Value::Object(Default::default()),
            max_attempts: 5,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceConfig {
    pub collector: SignalCollectorConfig,
    pub scorer: ScorerConfig,
    pub triggers: TriggerConfig,
    pub router: RouterConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub store: StoreConfig,
    pub model: ModelConfig,
    pub coverage: CoverageConfig,
    pub decision: DecisionConfig,
    pub confidence: ConfidenceConfig,
}

impl AppConfig {
    /// Loads defaults, the file named by `ADJUDICATOR_CONFIG` if set, then the environment
    pub fn load() -> Result<Self, config::ConfigError> {
        let path = std::env::var(CONFIG_PATH_VAR).ok().map(PathBuf::from);
        Self::load_from(path)
    }

    pub fn load_from(path: Option<PathBuf>) -> Result<Self, config::ConfigError> {
        let defaults = config::Config::try_from(&AppConfig::default())?;
        let mut builder = config::Config::builder().add_source(defaults);
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator(ENV_SEPARATOR)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.decision.engine, "reference");
        assert_eq!(config.server_addr(), "0.0.0.0:8080");
        assert!(!config.model.enabled);
        assert_eq!(config.confidence.router.green_threshold, 0.80);
    }

    #[test]
    fn test_file_layer_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[server]\nport = 9191\n\n[decision]\nengine = \"strict\"\n\n[confidence.router]\ngreen_threshold = 0.9"
        )
        .unwrap();

        let config = AppConfig::load_from(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.server.port, 9191);
        assert_eq!(config.decision.engine, "strict");
        assert_eq!(config.confidence.router.green_threshold, 0.9);
        assert_eq!(config.confidence.router.yellow_threshold, 0.55);
        assert_eq!(config.server.host, "0.0.0.0");
    }
}
