use serde::{Deserialize, Serialize};

use crate::codegen::{CodegenOptLevel, CodegenOptions};

pub const TIER_ENABLED_ENV: &str = "TIERJIT_TIER_ENABLED";
pub const HOT_THRESHOLD_ENV: &str = "TIERJIT_HOT_THRESHOLD";
pub const DEFAULT_HOT_THRESHOLD: u64 = 5;

/// Tiered compilation configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TieredConfig {
    /// Enable tiered compilation; when off every call is interpreted
    pub enabled: bool,
    /// Call count at which a function is promoted to native code
    pub hot_threshold: u64,
    /// Optimization level handed to the codegen backend
    pub opt_level: CodegenOptLevel,
}

impl Default for TieredConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            hot_threshold: DEFAULT_HOT_THRESHOLD,
            opt_level: CodegenOptLevel::Default,
        }
    }
}

impl TieredConfig {
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Applies overrides from `lookup` on top of the defaults. Values that fail
    /// to parse keep the default.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(val) = lookup(TIER_ENABLED_ENV) {
            config.enabled = val.trim().parse().unwrap_or(true);
        }
        if let Some(val) = lookup(HOT_THRESHOLD_ENV) {
            config.hot_threshold = val.trim().parse().unwrap_or(DEFAULT_HOT_THRESHOLD);
        }
        config
    }

    pub fn with_threshold(mut self, hot_threshold: u64) -> Self {
        self.hot_threshold = hot_threshold;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_opt_level(mut self, opt_level: CodegenOptLevel) -> Self {
        self.opt_level = opt_level;
        self
    }

    pub fn codegen_options(&self) -> CodegenOptions {
        CodegenOptions {
            opt_level: self.opt_level,
        }
    }

    /// Parses a TOML document; missing keys keep their defaults.
    #[cfg(feature = "toml-config")]
    pub fn from_toml_str(source: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(source)
    }

    /// Layers a TOML file over `self`: keys present in the file win.
    #[cfg(feature = "toml-config")]
    pub fn merge_toml_file(self, path: &std::path::Path) -> anyhow::Result<Self> {
        use anyhow::Context;

        #[derive(Deserialize)]
        struct Overrides {
            enabled: Option<bool>,
            hot_threshold: Option<u64>,
            opt_level: Option<CodegenOptLevel>,
        }

        let source = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let overrides: Overrides = toml::from_str(&source)
            .with_context(|| format!("invalid config {}", path.display()))?;

        Ok(Self {
            enabled: overrides.enabled.unwrap_or(self.enabled),
            hot_threshold: overrides.hot_threshold.unwrap_or(self.hot_threshold),
            opt_level: overrides.opt_level.unwrap_or(self.opt_level),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_promote_after_five_calls() {
        let config = TieredConfig::default();
        assert!(config.enabled);
        assert_eq!(config.hot_threshold, 5);
        assert_eq!(config.opt_level, CodegenOptLevel::Default);
    }

    #[test]
    fn env_overrides_and_bad_values() {
        let config = TieredConfig::from_vars(|key| match key {
            TIER_ENABLED_ENV => Some("false".to_string()),
            HOT_THRESHOLD_ENV => Some(" 12 ".to_string()),
            _ => None,
        });
        assert!(!config.enabled);
        assert_eq!(config.hot_threshold, 12);

        let config = TieredConfig::from_vars(|key| {
            (key == HOT_THRESHOLD_ENV).then(|| "lots".to_string())
        });
        assert_eq!(config.hot_threshold, DEFAULT_HOT_THRESHOLD);
    }

    #[cfg(feature = "toml-config")]
    #[test]
    fn toml_fills_missing_keys_with_defaults() {
        let config = TieredConfig::from_toml_str("hot_threshold = 2\nopt_level = \"aggressive\"")
            .expect("valid toml");
        assert!(config.enabled);
        assert_eq!(config.hot_threshold, 2);
        assert_eq!(config.opt_level, CodegenOptLevel::Aggressive);
    }
}
