//! Configuration loading and management.

use std::fmt;
use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use wl_core::CoreConfig;
use wl_llm::Provider;

/// Application configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the pull-mark cache.
    pub database_path: PathBuf,

    /// Session and overlap tuning.
    #[serde(default)]
    pub analysis: CoreConfig,

    /// Summary generation.
    #[serde(default)]
    pub llm: LlmConfig,
}

/// Settings for `wl report --summary`.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: Provider,
    /// Model name. Default: the provider's default model.
    pub model: Option<String>,
    /// API key. Falls back to the provider's conventional variable
    /// (`OPENAI_API_KEY` or `DEEPSEEK_API_KEY`).
    pub api_key: Option<String>,
    /// Custom OpenAI-compatible endpoint.
    pub endpoint: Option<String>,
    /// File holding a custom system prompt.
    pub system_prompt_file: Option<PathBuf>,
}

impl fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("endpoint", &self.endpoint)
            .field("system_prompt_file", &self.system_prompt_file)
            .finish()
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_path", &self.database_path)
            .field("analysis", &self.analysis)
            .field("llm", &self.llm)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            database_path: data_dir.join("wl.db"),
            analysis: CoreConfig::default(),
            llm: LlmConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    ///
    /// Later layers win: defaults, `~/.config/wl/config.toml`, the given
    /// file, then `WL_` variables (`__` separates nested keys, e.g.
    /// `WL_ANALYSIS__GAP_MINUTES`).
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed("WL_").split("__"));

        figment.extract()
    }
}

/// Returns the platform-specific config directory for wl.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("wl"))
}

/// Returns the platform-specific data directory for wl.
///
/// On Linux: `~/.local/share/wl`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("wl"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dirs_data_path_ends_with_wl() {
        let path = dirs_data_path().unwrap();
        assert_eq!(path.file_name().unwrap(), "wl");
    }

    #[test]
    fn default_config_uses_data_dir_for_db() {
        let config = Config::default();
        assert_eq!(config.database_path, dirs_data_path().unwrap().join("wl.db"));
        assert_eq!(config.analysis, CoreConfig::default());
        assert_eq!(config.llm.provider, Provider::OpenAi);
    }

    #[test]
    fn explicit_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wl.toml");
        std::fs::write(
            &path,
            r#"
database_path = "/tmp/custom.db"

[analysis]
gap_minutes = 45

[llm]
provider = "deepseek"
model = "deepseek-reasoner"
"#,
        )
        .unwrap();

        let config = Config::load_from(Some(&path)).unwrap();
        assert_eq!(config.database_path, PathBuf::from("/tmp/custom.db"));
        assert_eq!(config.analysis.gap_minutes, 45);
        assert_eq!(config.analysis.pull_lookback_minutes, 120);
        assert_eq!(config.llm.provider, Provider::DeepSeek);
        assert_eq!(config.llm.model.as_deref(), Some("deepseek-reasoner"));
    }

    #[test]
    fn debug_redacts_api_key() {
        let config = Config {
            llm: LlmConfig {
                api_key: Some("sk-secret".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
