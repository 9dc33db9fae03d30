use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::dataset::DEFAULT_EXCLUDED;
pub use crate::error::ConfigError;

const CONFIG_NAMES: [&str; 3] = ["cityscope.yaml", "cityscope.yml", ".cityscope.yaml"];

/// Hub connection settings
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct HubConfig {
    /// Hub base URL, e.g. `https://hub.example.org/hub/`
    pub base_url: String,

    /// User whose services are managed
    pub user: String,

    /// API token (overridden by `CITYSCOPE_TOKEN`)
    #[serde(default)]
    pub token: Option<String>,

    /// Upper bound for any single hub request
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    30_000
}

/// Where dataset candidates come from
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct DatasetConfig {
    #[serde(default = "default_search_url")]
    pub search_url: String,

    /// Account whose repositories are offered as datasets
    #[serde(default = "default_owner")]
    pub owner: String,

    /// Repository names never offered as datasets
    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,
}

fn default_search_url() -> String {
    "https://api.github.com/search/repositories".into()
}
fn default_owner() -> String {
    "EdinburghCityScope".into()
}
fn default_exclude() -> Vec<String> {
    DEFAULT_EXCLUDED.iter().map(|s| s.to_string()).collect()
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            search_url: default_search_url(),
            owner: default_owner(),
            exclude: default_exclude(),
        }
    }
}

/// Root configuration file structure
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CityscopeConfig {
    pub hub: HubConfig,

    #[serde(default)]
    pub datasets: DatasetConfig,
}

impl CityscopeConfig {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a string (useful for testing)
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: CityscopeConfig = serde_yaml::from_str(content)?;
        if let Ok(token) = std::env::var("CITYSCOPE_TOKEN") {
            if !token.is_empty() {
                config.hub.token = Some(token);
            }
        }
        config.validate()?;
        Ok(config)
    }

    /// Search for config file in standard locations
    pub fn discover(start_dir: &Path) -> Result<(PathBuf, Self), ConfigError> {
        let mut searched = Vec::new();

        if let Ok(env_path) = std::env::var("CITYSCOPE_CONFIG") {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                return Ok((path.clone(), Self::load(&path)?));
            }
            searched.push(path);
        }

        let mut dir = Some(start_dir);
        while let Some(current) = dir {
            for name in &CONFIG_NAMES {
                let path = current.join(name);
                if path.exists() {
                    return Ok((path.clone(), Self::load(&path)?));
                }
                searched.push(path);
            }
            dir = current.parent();
        }

        Err(ConfigError::NotFound { searched })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.hub.timeout_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.hub.user.trim().is_empty() {
            return Err(ConfigError::Invalid("hub.user must not be empty".into()));
        }
        if self.hub.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("hub.base_url must not be empty".into()));
        }
        if self.hub.timeout_ms == 0 {
            return Err(ConfigError::Invalid("hub.timeout_ms must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let yaml = r#"
hub:
  base_url: http://localhost:8000/hub/
  user: alice
"#;
        let config = CityscopeConfig::from_str(yaml).unwrap();
        assert_eq!(config.hub.user, "alice");
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.datasets.owner, "EdinburghCityScope");
        assert_eq!(config.datasets.exclude.len(), 3);
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
hub:
  base_url: https://hub.example.org/hub/
  user: bob
  timeout_ms: 5000
datasets:
  search_url: https://index.example.org/search
  owner: SomeCity
  exclude: [infra]
"#;
        let config = CityscopeConfig::from_str(yaml).unwrap();
        assert_eq!(config.timeout(), Duration::from_millis(5000));
        assert_eq!(config.datasets.search_url, "https://index.example.org/search");
        assert_eq!(config.datasets.exclude, vec!["infra".to_string()]);
    }

    #[test]
    fn test_empty_user_rejected() {
        let yaml = r#"
hub:
  base_url: http://localhost:8000/hub/
  user: ""
"#;
        assert!(matches!(
            CityscopeConfig::from_str(yaml),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let yaml = r#"
hub:
  base_url: http://localhost:8000/hub/
  user: alice
  timeout_ms: 0
"#;
        assert!(matches!(
            CityscopeConfig::from_str(yaml),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_missing_hub_section() {
        assert!(matches!(
            CityscopeConfig::from_str("datasets: {}\n"),
            Err(ConfigError::Yaml(_))
        ));
    }
}
