//! Service configuration.
//!
//! Read from `cohortyx.toml` (or a YAML file) at a path given explicitly,
//! via the COHORTYX_CONFIG env var, or from the current directory. Every
//! field has a default so an absent file yields a usable configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::entities::{EnrichmentType, Projection};
use crate::error::{CohortyxError, Result};

/// Env var naming the configuration file.
pub const CONFIG_ENV_VAR: &str = "COHORTYX_CONFIG";

/// File looked up in the working directory when nothing else is given.
pub const DEFAULT_CONFIG_FILE: &str = "cohortyx.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CohortyxConfig {
    #[serde(default)]
    pub enrichment: EnrichmentConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

// ── Enrichment ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    /// Alteration-type codes counted when a request names none (empty = all)
    #[serde(default)]
    pub default_alteration_types: Vec<i32>,

    /// Granularity used when a request names none
    #[serde(default)]
    pub default_enrichment_type: EnrichmentType,

    /// Unit count from which per-unit statistics run on the rayon pool
    #[serde(default = "default_parallel_threshold")]
    pub parallel_threshold: usize,

    /// Attach Benjamini–Hochberg q-values to every comparison
    #[serde(default = "default_true")]
    pub adjust_p_values: bool,
}

fn default_parallel_threshold() -> usize { 256 }
fn default_true() -> bool { true }

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            default_alteration_types: vec![],
            default_enrichment_type: EnrichmentType::Sample,
            parallel_threshold: default_parallel_threshold(),
            adjust_p_values: true,
        }
    }
}

// ── Output ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Projection used when a request names none
    #[serde(default)]
    pub default_projection: Projection,

    /// Pretty-print JSON output
    #[serde(default = "default_true")]
    pub pretty: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            default_projection: Projection::Summary,
            pretty: true,
        }
    }
}

// ── Logging ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing` filter directive used when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String { "info".to_string() }

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level() }
    }
}

// ── Loading ──────────────────────────────────────────────────────────────────

impl CohortyxConfig {
    /// Resolve and load the configuration from [`Self::resolve_path`], or the
    /// defaults when it names no file.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match Self::resolve_path(explicit) {
            Some(path) => Self::from_path(&path),
            None => Ok(Self::default()),
        }
    }

    /// The file `load` reads. An explicit path is returned as is and must
    /// exist. Otherwise COHORTYX_CONFIG is consulted, then `cohortyx.toml`;
    /// `None` when neither names an existing file.
    pub fn resolve_path(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }
        let candidate = PathBuf::from(
            std::env::var(CONFIG_ENV_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string()),
        );
        candidate.exists().then_some(candidate)
    }

    /// Load from a TOML or YAML file, chosen by extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CohortyxError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        let content = std::fs::read_to_string(path)?;
        let config = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&content)?,
            _ => Self::from_toml_str(&content)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| CohortyxError::Config(e.to_string()))
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| CohortyxError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.enrichment.parallel_threshold == 0 {
            return Err(CohortyxError::Config(
                "enrichment.parallel_threshold must be at least 1".to_string(),
            ));
        }
        if self.logging.level.trim().is_empty() {
            return Err(CohortyxError::Config("logging.level must not be empty".to_string()));
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CohortyxConfig::default();
        assert!(config.enrichment.default_alteration_types.is_empty());
        assert_eq!(config.enrichment.default_enrichment_type, EnrichmentType::Sample);
        assert_eq!(config.output.default_projection, Projection::Summary);
        assert!(config.enrichment.adjust_p_values);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config = CohortyxConfig::from_toml_str(
            r#"
            [enrichment]
            default_alteration_types = [2]
            default_enrichment_type = "PATIENT"

            [output]
            default_projection = "DETAILED"
            "#,
        )
        .unwrap();
        assert_eq!(config.enrichment.default_alteration_types, vec![2]);
        assert_eq!(config.enrichment.default_enrichment_type, EnrichmentType::Patient);
        assert_eq!(config.enrichment.parallel_threshold, 256);
        assert_eq!(config.output.default_projection, Projection::Detailed);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_yaml_config() {
        let config = CohortyxConfig::from_yaml_str(
            "enrichment:\n  parallel_threshold: 8\n  adjust_p_values: false\nlogging:\n  level: debug\n",
        )
        .unwrap();
        assert_eq!(config.enrichment.parallel_threshold, 8);
        assert!(!config.enrichment.adjust_p_values);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let mut config = CohortyxConfig::default();
        config.enrichment.parallel_threshold = 0;
        assert!(matches!(config.validate(), Err(CohortyxError::Config(_))));
    }

    #[test]
    fn test_missing_explicit_path_is_error() {
        let err = CohortyxConfig::load(Some(Path::new("/nonexistent/cohortyx.toml"))).unwrap_err();
        assert!(matches!(err, CohortyxError::Config(_)));
    }

    #[test]
    fn test_explicit_path_wins_resolution() {
        let explicit = Path::new("/nonexistent/cohortyx.toml");
        assert_eq!(CohortyxConfig::resolve_path(Some(explicit)), Some(explicit.to_path_buf()));
    }
}
