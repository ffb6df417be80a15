//! Application configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};
use vela_lifecycle::LifecycleConfig;
use vela_risk::{KellyConfig, MultiplierConfig, TailRiskConfig};
use vela_router::{FillModelConfig, RouterConfig};

use crate::error::{AppError, AppResult};

/// Environment variable overriding the config path.
pub const CONFIG_ENV: &str = "VELA_CONFIG";

/// Default config path, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Top-level configuration; one TOML section per component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default)]
    pub kelly: KellyConfig,
    #[serde(default)]
    pub multipliers: MultiplierConfig,
    #[serde(default)]
    pub tail_risk: TailRiskConfig,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub fill_model: FillModelConfig,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
}

impl AppConfig {
    /// Load from `VELA_CONFIG`, else the default path, else built-in defaults.
    pub fn load() -> AppResult<Self> {
        let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        if Path::new(&path).exists() {
            Self::from_file(&path)
        } else {
            tracing::warn!(path = %path, "Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load and validate a specific file.
    pub fn from_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate TOML. Unknown keys are rejected.
    pub fn from_toml_str(content: &str) -> AppResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        self.kelly.validate()?;
        self.multipliers.validate()?;
        self.tail_risk.validate()?;
        self.router.validate()?;
        self.fill_model.validate()?;
        self.lifecycle.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.router.p_min_fill, 0.55);
        assert_eq!(config.lifecycle.ttl_child_ms, 1500);
        assert_eq!(config.kelly.kelly_bounds.f_max, 0.25);
        assert!(config.tail_risk.cvar_limit_usd.is_none());
    }

    #[test]
    fn test_shipped_default_file_matches_builtin_defaults() {
        let config = AppConfig::from_toml_str(include_str!("../../../config/default.toml")).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_sections_override_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            [router]
            p_min_fill = 0.6
            rebate_mode = true

            [kelly]
            leverage_max = "5"

            [kelly.kelly_bounds]
            m_min = 0.2
            m_max = 1.0
            f_max = 0.1

            [tail_risk]
            cvar_limit_usd = 55.0

            [lifecycle]
            max_children = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.router.p_min_fill, 0.6);
        assert!(config.router.rebate_mode);
        assert_eq!(config.kelly.leverage_max, dec!(5));
        assert_eq!(config.kelly.kelly_bounds.m_max, 1.0);
        assert_eq!(config.tail_risk.cvar_limit_usd, Some(55.0));
        assert_eq!(config.lifecycle.max_children, 2);
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(AppConfig::from_toml_str("[router]\nbogus = 1\n").is_err());
        assert!(AppConfig::from_toml_str("[nonsense]\nx = 1\n").is_err());
    }

    #[test]
    fn test_invalid_ranges_rejected() {
        assert!(AppConfig::from_toml_str("[router]\np_min_fill = 1.5\n").is_err());
        assert!(AppConfig::from_toml_str("[lifecycle]\nmax_children = 0\n").is_err());
        assert!(AppConfig::from_toml_str(
            "[kelly.kelly_bounds]\nm_min = 1.2\nm_max = 0.5\nf_max = 0.25\n"
        )
        .is_err());
    }
}
