use crate::matcher::{images_from_file, pattern_for_images};
use crate::runtime::ConnectOptions;
use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Reported when no usable source host is configured.
pub const MISSING_SOURCE_HOST: &str = "from or targethost has not right values";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_host: Option<String>,
    pub destination_hosts: Vec<String>,
    pub image_pattern: String,
    /// Compose file whose `image:` lines select the images instead of
    /// `image_pattern`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_file: Option<PathBuf>,
    /// Budget for the whole migration.
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub api_version: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_host: None,
            destination_hosts: Vec::new(),
            // Every image
            image_pattern: ".*".into(),
            image_file: None,
            timeout_secs: 120,
            connect_timeout_secs: 10,
            api_version: "1.41".into(),
        }
    }
}

impl Config {
    /// Layers defaults, config files, `DOCKER_MIGRATE_*` variables and
    /// finally `overrides` (usually the parsed command line).
    pub fn figment<T: Serialize>(overrides: T) -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file("docker-migrate.toml"))
            .merge(Json::file("docker-migrate.json"))
            .merge(Env::prefixed("DOCKER_MIGRATE_"))
            .merge(Serialized::globals(overrides))
    }

    pub fn load<T: Serialize>(overrides: T) -> anyhow::Result<Self> {
        let config: Config = Self::figment(overrides)
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        match &self.source_host {
            Some(host) if !host.trim().is_empty() => Ok(()),
            _ => Err(anyhow::anyhow!(MISSING_SOURCE_HOST)),
        }
    }

    /// The source host; only call after [`Config::validate`].
    pub fn source_host(&self) -> &str {
        self.source_host.as_deref().unwrap_or_default().trim()
    }

    /// The regex used to select images, built from `image_file` when set.
    pub fn selection_pattern(&self) -> anyhow::Result<String> {
        let Some(path) = &self.image_file else {
            return Ok(self.image_pattern.clone());
        };

        let images = images_from_file(path)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
        pattern_for_images(&images)
            .ok_or_else(|| anyhow::anyhow!("No `image:` lines found in {}", path.display()))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            api_version: self.api_version.clone(),
            timeout_secs: self.connect_timeout_secs,
        }
    }
}
