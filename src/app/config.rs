use crate::core::models::creative::Creative;
use crate::core::models::metrics::FormatPerformanceMetrics;
use crate::core::models::principal::Principal;
use crate::core::models::product::{CurrencyLimit, Product};
use crate::core::models::property::{AuthorizedProperty, PropertyTag};
use crate::core::models::tenant::Tenant;
use crate::core::spec::formats::Format;
use config::Config;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
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

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Local,
    Firestore,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, Builder)]
#[serde(default)]
pub struct FirestoreConfig {
    pub project_id: String,
    pub database_id: Option<String>,
    pub credentials_path: Option<String>,
    pub emulator_host: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, Builder)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub firestore: Option<FirestoreConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
#[serde(default)]
pub struct AdaptersConfig {
    /// Per-call timeout on adapter RPCs. Elapsed calls fail the step
    /// with ADAPTER_TIMEOUT and are never retried.
    #[serde(with = "humantime_serde")]
    pub call_timeout: Duration,
}

impl Default for AdaptersConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
#[serde(default)]
pub struct ReviewConfig {
    pub workers: usize,
    pub queue_depth: usize,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            queue_depth: 64,
        }
    }
}

/// Declarative seed data loaded into the store at startup when the
/// entities are not already present. Lets a fresh deployment or a dev
/// box come up with working tenants straight from the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedTenant {
    pub tenant: Tenant,
    #[serde(default)]
    pub principals: Vec<Principal>,
    #[serde(default)]
    pub products: Vec<Product>,
    #[serde(default)]
    pub currency_limits: Vec<CurrencyLimit>,
    #[serde(default)]
    pub properties: Vec<AuthorizedProperty>,
    #[serde(default)]
    pub property_tags: Vec<PropertyTag>,
    #[serde(default)]
    pub creative_formats: Vec<Format>,
    #[serde(default)]
    pub creatives: Vec<Creative>,
    #[serde(default)]
    pub format_metrics: Vec<FormatPerformanceMetrics>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, Builder)]
#[serde(default)]
pub struct SageConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub storage: StorageConfig,
    pub adapters: AdaptersConfig,
    pub review: ReviewConfig,
    /// Key for the AI creative reviewer; its presence gates the
    /// ai-powered approval mode in the setup checklist.
    pub ai_api_key: Option<String>,
    pub seed: Vec<SeedTenant>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OtelProto {
    Http,
    Grpc,
}

impl Default for OtelProto {
    fn default() -> Self {
        OtelProto::Grpc
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileRotation {
    Daily,
    Hourly,
    Never,
}

impl Default for FileRotation {
    fn default() -> Self {
        FileRotation::Daily
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSink {
    /// Whether spans should be exported to this sink
    pub spans: bool,
    /// The kind of observability sink
    pub dest: LogType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LogType {
    Stdout {
        #[serde(default = "default_logtype_color")]
        color: bool,
        #[serde(default)]
        json: bool,
    },
    File {
        path: PathBuf,
        #[serde(default)]
        json: bool,
        #[serde(default)]
        rotation: FileRotation,
        #[serde(default)]
        max_files: usize,
    },
    Otel {
        endpoint: String,
        #[serde(default)]
        proto: OtelProto,
    },
}

fn default_logtype_color() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub span_sample_rate: f32,
    #[serde(default)]
    pub sinks: Vec<LogSink>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            span_sample_rate: 0.01,
            sinks: vec![LogSink {
                spans: true,
                dest: LogType::Stdout {
                    color: true,
                    json: false,
                },
            }],
        }
    }
}

impl LoggingConfig {
    /// Validates the logging configuration
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.sinks.is_empty() {
            anyhow::bail!("At least one logging sink must be configured");
        }

        self.level.parse::<tracing::Level>().map_err(|_| {
            anyhow::anyhow!(
                "Invalid log level: '{}'. Valid levels: trace, debug, info, warn, error",
                self.level
            )
        })?;

        if !(0.0..=1.0).contains(&self.span_sample_rate) {
            anyhow::bail!(
                "span_sample_rate must be between 0.0 and 1.0, got {}",
                self.span_sample_rate
            );
        }

        Ok(())
    }
}

impl SageConfig {
    pub fn load(path: &PathBuf) -> Result<SageConfig, anyhow::Error> {
        let cfg = Config::builder()
            .add_source(config::File::from(path.to_path_buf()))
            .build()?;

        Ok(cfg.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SageConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.storage.backend, StorageBackend::Local);
        assert_eq!(config.adapters.call_timeout, Duration::from_secs(30));
        assert_eq!(config.review.workers, 2);
        assert!(config.seed.is_empty());
        assert!(config.logging.validate().is_ok());
    }

    #[test]
    fn test_logging_validation() {
        let mut logging = LoggingConfig::default();
        logging.level = "verbose".to_string();
        assert!(logging.validate().is_err());

        let mut logging = LoggingConfig::default();
        logging.span_sample_rate = 2.0;
        assert!(logging.validate().is_err());

        let mut logging = LoggingConfig::default();
        logging.sinks.clear();
        assert!(logging.validate().is_err());
    }
}
