//! Session configuration and parsing for lazyquery.yml

use crate::error::{LazyError, LazyResult};
use lq_sql::DialectKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// SQL dialect relations are translated to
    #[serde(default)]
    pub dialect: DialectKind,

    /// Database connection configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Named target configurations (e.g., dev, prod)
    /// Each target can override the dialect and database settings
    #[serde(default)]
    pub targets: HashMap<String, TargetConfig>,
}

/// Target-specific configuration overrides
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TargetConfig {
    /// Dialect override
    #[serde(default)]
    pub dialect: Option<DialectKind>,

    /// Database configuration override
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
}

/// Database connection configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Database path (a DuckDB file or :memory:)
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    ":memory:".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dialect: DialectKind::default(),
            database: DatabaseConfig::default(),
            targets: HashMap::new(),
        }
    }
}

impl Config {
    /// In-memory DuckDB with the given dialect
    pub fn in_memory(dialect: DialectKind) -> Self {
        Self {
            dialect,
            ..Self::default()
        }
    }

    /// Load configuration from a file
    pub fn load(path: &Path) -> LazyResult<Self> {
        if !path.exists() {
            return Err(LazyError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| LazyError::IoWithPath {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_yaml_str(&content)
    }

    /// Parse and validate configuration from YAML text
    pub fn from_yaml_str(content: &str) -> LazyResult<Self> {
        let config: Config = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve a named target, applying its overrides to the base settings
    pub fn with_target(&self, target: &str) -> LazyResult<Self> {
        let Some(overrides) = self.targets.get(target) else {
            let mut known: Vec<&str> = self.targets.keys().map(String::as_str).collect();
            known.sort_unstable();
            return Err(LazyError::ConfigInvalid {
                message: format!(
                    "unknown target '{}' (available: {})",
                    target,
                    known.join(", ")
                ),
            });
        };

        let resolved = Self {
            dialect: overrides.dialect.unwrap_or(self.dialect),
            database: overrides
                .database
                .clone()
                .unwrap_or_else(|| self.database.clone()),
            targets: HashMap::new(),
        };
        resolved.validate()?;
        Ok(resolved)
    }

    /// Validate the configuration
    pub fn validate(&self) -> LazyResult<()> {
        if self.database.path.trim().is_empty() {
            return Err(LazyError::ConfigInvalid {
                message: "database.path cannot be empty (use \":memory:\" for an in-memory database)"
                    .to_string(),
            });
        }
        for (name, target) in &self.targets {
            if let Some(db) = &target.database {
                if db.path.trim().is_empty() {
                    return Err(LazyError::ConfigInvalid {
                        message: format!("targets.{}.database.path cannot be empty", name),
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
