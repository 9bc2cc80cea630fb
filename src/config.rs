//! Configuration Management
//!
//! YAML settings for the CF endpoints, the org/space context and the Vault
//! endpoint. Passwords are supplied by the caller at connect time and are
//! never read from or written to disk.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::cf::client::CfClient;
use crate::cf::http::build_client;
use crate::cf::token::UaaCredentials;
use crate::error::{Error, Result};

/// Cloud Foundry connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CfSettings {
    /// API base URL, e.g. `https://api.sys.example.com`
    pub api_url: String,
    /// UAA base URL, e.g. `https://login.sys.example.com`
    pub login_url: String,
    pub username: String,
    #[serde(default)]
    pub org_name: Option<String>,
    #[serde(default)]
    pub space_name: Option<String>,
}

/// Vault connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VaultSettings {
    /// Vault base URL (typically a proxy endpoint in front of the store)
    pub endpoint: String,
    /// Name of the secret-service instance whose binding carries the
    /// AppRole credentials
    pub service_instance: String,
    /// Transit engine mount for encrypted writes
    #[serde(default)]
    pub transit_mount: Option<String>,
}

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    pub cf: CfSettings,
    #[serde(default)]
    pub vault: Option<VaultSettings>,
    /// Pagination bound override
    #[serde(default)]
    pub max_pages: Option<usize>,
}

impl Settings {
    /// Default config file location (`<config dir>/cfvault/config.yaml`).
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("cfvault").join("config.yaml"))
    }

    /// Load settings from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        serde_yaml::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Load settings from the default location.
    pub fn load_default() -> Result<Self> {
        let path = Self::default_path()
            .ok_or_else(|| Error::Config("no config directory on this platform".to_string()))?;
        Self::load(&path)
    }

    /// Build a connected CF client from these settings, resolving the
    /// configured org/space context when present.
    pub async fn connect(&self, password: &str) -> Result<CfClient> {
        let credentials = UaaCredentials::new(
            &self.cf.login_url,
            &self.cf.username,
            password,
            build_client()?,
        );
        let mut client = CfClient::new(&self.cf.api_url, credentials)?;
        if let Some(max_pages) = self.max_pages {
            client = client.with_max_pages(max_pages);
        }
        if let Some(org_name) = &self.cf.org_name {
            client = client
                .with_context(org_name, self.cf.space_name.as_deref())
                .await?;
        }
        Ok(client)
    }
}
