// Configuration management for symgraph

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration structure, loaded from `.symgraph.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub project: ProjectConfig,
    pub languages: LanguagesConfig,
    pub parsing: ParsingConfig,
    pub reindex: ReindexConfig,
    pub indexing: IndexingConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    pub root: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguagesConfig {
    pub enabled: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsingConfig {
    /// Files above this size go straight to the line tier.
    pub large_file_bytes: usize,
    /// Size cap for the syntax-tree tier.
    pub tree_max_bytes: usize,
    pub external_tool: String,
    pub external_timeout_secs: u64,
    /// Path markers that earn a large file a background deep pass.
    pub critical_markers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReindexConfig {
    pub interval_secs: u64,
    pub debounce_ms: u64,
    /// Bounded worker pool size for the initial full index.
    pub workers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    pub exclude: Vec<String>,
    pub include: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project: ProjectConfig {
                name: "unnamed-project".to_string(),
                root: ".".to_string(),
            },
            languages: LanguagesConfig {
                enabled: vec![
                    "cpp".to_string(),
                    "python".to_string(),
                    "rust".to_string(),
                    "go".to_string(),
                    "java".to_string(),
                ],
            },
            parsing: ParsingConfig {
                large_file_bytes: 1024 * 1024,
                tree_max_bytes: 2 * 1024 * 1024,
                external_tool: "ctags".to_string(),
                external_timeout_secs: 10,
                critical_markers: vec![
                    "core".to_string(),
                    "engine".to_string(),
                    "interface".to_string(),
                    "api".to_string(),
                ],
            },
            reindex: ReindexConfig {
                interval_secs: 300,
                debounce_ms: 500,
                workers: 4,
            },
            indexing: IndexingConfig {
                exclude: vec![
                    "target/".to_string(),
                    "node_modules/".to_string(),
                    "build/".to_string(),
                    ".git/".to_string(),
                    ".symgraph.db".to_string(),
                ],
                include: vec![],
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the project root, falling back to defaults
    /// when `.symgraph.toml` is absent or broken.
    pub fn from_project_dir<P: AsRef<Path>>(project_dir: P) -> Self {
        let config_path = project_dir.as_ref().join(".symgraph.toml");

        match Self::from_file(&config_path) {
            Ok(config) => {
                tracing::info!("Loaded configuration from {}", config_path.display());
                config
            }
            Err(e) => {
                tracing::debug!("Could not load config from {}: {}", config_path.display(), e);
                tracing::info!("Using default configuration");
                Self::default()
            }
        }
    }

    pub fn external_timeout(&self) -> Duration {
        Duration::from_secs(self.parsing.external_timeout_secs)
    }

    pub fn reindex_interval(&self) -> Duration {
        Duration::from_secs(self.reindex.interval_secs)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.reindex.debounce_ms)
    }

    /// Check if a file path should be indexed based on include/exclude patterns
    pub fn should_index_file(&self, file_path: &str) -> bool {
        for pattern in &self.indexing.exclude {
            if self.matches_pattern(file_path, pattern) {
                return false;
            }
        }

        if !self.indexing.include.is_empty() {
            return self
                .indexing
                .include
                .iter()
                .any(|pattern| self.matches_pattern(file_path, pattern));
        }

        true
    }

    /// Simple pattern matching (supports glob-style patterns)
    fn matches_pattern(&self, file_path: &str, pattern: &str) -> bool {
        if pattern.ends_with('/') {
            file_path.starts_with(pattern)
                || file_path.contains(&format!("/{}", pattern.trim_end_matches('/')))
        } else if let Some(suffix) = pattern.strip_prefix("*.") {
            file_path.contains(suffix)
        } else {
            file_path.contains(pattern)
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.project.name.is_empty() {
            return Err(anyhow::anyhow!("Project name cannot be empty"));
        }

        let supported_languages = ["cpp", "python", "rust", "go", "java"];
        for lang in &self.languages.enabled {
            if !supported_languages.contains(&lang.as_str()) {
                return Err(anyhow::anyhow!("Unsupported language: {}", lang));
            }
        }

        if self.parsing.large_file_bytes == 0 {
            return Err(anyhow::anyhow!("Large-file threshold must be greater than 0"));
        }
        if self.parsing.external_timeout_secs == 0 {
            return Err(anyhow::anyhow!("External tool timeout must be greater than 0"));
        }
        if self.reindex.interval_secs == 0 {
            return Err(anyhow::anyhow!("Re-index interval must be greater than 0"));
        }
        if self.reindex.workers == 0 {
            return Err(anyhow::anyhow!("Worker count must be greater than 0"));
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(anyhow::anyhow!("Invalid log level: {}", self.logging.level));
        }
        let valid_formats = ["compact", "pretty", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(anyhow::anyhow!("Invalid log format: {}", self.logging.format));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.project.name, "unnamed-project");
        assert!(config.languages.enabled.contains(&"cpp".to_string()));
        assert!(config.indexing.exclude.contains(&"target/".to_string()));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_should_index_file() {
        let config = Config::default();

        assert!(config.should_index_file("src/main.rs"));
        assert!(config.should_index_file("lib/utils.py"));

        assert!(!config.should_index_file("target/debug/binary"));
        assert!(!config.should_index_file("node_modules/package/file.js"));
        assert!(!config.should_index_file(".symgraph.db"));
    }

    #[test]
    fn test_include_patterns_restrict() {
        let mut config = Config::default();
        config.indexing.include = vec!["src/".to_string()];

        assert!(config.should_index_file("src/engine.cpp"));
        assert!(!config.should_index_file("scripts/tool.py"));
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.project.name = "".to_string();
        assert!(config.validate().is_err());
        config.project.name = "test".to_string();

        config.languages.enabled = vec!["cobol".to_string()];
        assert!(config.validate().is_err());
        config.languages.enabled = vec!["cpp".to_string()];

        config.reindex.workers = 0;
        assert!(config.validate().is_err());
        config.reindex.workers = 4;

        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());
        config.logging.level = "debug".to_string();

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_round_trip_toml() {
        let config = Config::default();
        let text = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.parsing.external_tool, "ctags");
        assert_eq!(parsed.reindex.interval_secs, 300);
    }
}
