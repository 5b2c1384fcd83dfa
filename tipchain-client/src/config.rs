use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::amount::AmountCodec;
use crate::discovery::{DEFAULT_FETCH_SIZE, DEFAULT_PAGE_SIZE};
use crate::ledger::Identity;
use crate::profile::{ProfileOptions, MAX_USERNAME_LEN};
use crate::tip::{TipOptions, DEFAULT_TIP_AMOUNT};
use crate::upload::DEFAULT_UPLOAD_BASE_URL;

/// Client configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Directory for local state (profile handoff, pending records)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub tip: TipConfig,
    #[serde(default)]
    pub profile: ProfileConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub upload: UploadConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// JSON-RPC endpoints, in failover order
    #[serde(default = "default_endpoints")]
    pub endpoints: Vec<String>,
    /// Address of the profile/tip registry contract
    #[serde(default)]
    pub contract_address: String,
    /// Minimal unit denomination
    #[serde(default = "default_denom")]
    pub denom: String,
    #[serde(default = "default_display_denom")]
    pub display_denom: String,
    #[serde(default = "default_decimals")]
    pub decimals: u32,
}

fn default_endpoints() -> Vec<String> {
    vec!["http://127.0.0.1:26657".to_string()]
}

fn default_denom() -> String {
    "uxion".to_string()
}

fn default_display_denom() -> String {
    "XION".to_string()
}

fn default_decimals() -> u32 {
    6
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            endpoints: default_endpoints(),
            contract_address: String::new(),
            denom: default_denom(),
            display_denom: default_display_denom(),
            decimals: default_decimals(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Signed-in wallet address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TipConfig {
    #[serde(default = "default_tip_amount")]
    pub default_amount: String,
    #[serde(default = "default_success_display_secs")]
    pub success_display_secs: u64,
    /// Re-read the balance after a tip settles
    #[serde(default = "default_true")]
    pub refresh_after_settle: bool,
}

fn default_tip_amount() -> String {
    DEFAULT_TIP_AMOUNT.to_string()
}

fn default_success_display_secs() -> u64 {
    5
}

fn default_true() -> bool {
    true
}

impl Default for TipConfig {
    fn default() -> Self {
        Self {
            default_amount: default_tip_amount(),
            success_display_secs: default_success_display_secs(),
            refresh_after_settle: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileConfig {
    #[serde(default = "default_debounce_ms")]
    pub availability_debounce_ms: u64,
    #[serde(default = "default_max_username_len")]
    pub max_username_len: usize,
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_max_username_len() -> usize {
    MAX_USERNAME_LEN
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            availability_debounce_ms: default_debounce_ms(),
            max_username_len: default_max_username_len(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Profiles fetched per registry call
    #[serde(default = "default_fetch_size")]
    pub fetch_size: u32,
    /// Profiles shown per page
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_fetch_size() -> u32 {
    DEFAULT_FETCH_SIZE
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            fetch_size: default_fetch_size(),
            page_size: default_page_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    #[serde(default)]
    pub cloud_name: String,
    #[serde(default)]
    pub upload_preset: String,
    #[serde(default = "default_upload_base_url")]
    pub base_url: String,
}

fn default_upload_base_url() -> String {
    DEFAULT_UPLOAD_BASE_URL.to_string()
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            cloud_name: String::new(),
            upload_preset: String::new(),
            base_url: default_upload_base_url(),
        }
    }
}

impl ClientConfig {
    /// Load config from a file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Save config to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, contents)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;

        Ok(())
    }

    /// Signed-in identity, if any
    pub fn identity(&self) -> Option<Identity> {
        self.session.identity.clone().and_then(Identity::new)
    }

    pub fn codec(&self) -> AmountCodec {
        AmountCodec::new(
            self.network.decimals,
            &self.network.display_denom,
            &self.network.denom,
        )
    }

    pub fn tip_options(&self) -> TipOptions {
        TipOptions {
            default_amount: self.tip.default_amount.clone(),
            success_display: Duration::from_secs(self.tip.success_display_secs),
            refresh_after_settle: self.tip.refresh_after_settle,
        }
    }

    pub fn profile_options(&self) -> ProfileOptions {
        ProfileOptions {
            availability_debounce: Duration::from_millis(self.profile.availability_debounce_ms),
            max_username_len: self.profile.max_username_len,
        }
    }

    /// Data directory, falling back to the default location
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(default_data_dir)
    }
}

/// Get the default data directory path
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".tipchain")
}

/// Get the default config file path
pub fn default_config_path() -> PathBuf {
    default_data_dir().join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let config = ClientConfig::load(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config.network.denom, "uxion");
        assert_eq!(config.tip.default_amount, "5");
        assert_eq!(config.profile.availability_debounce_ms, 500);
        assert_eq!(config.discovery.fetch_size, 50);
        assert_eq!(config.discovery.page_size, 9);
        assert!(config.identity().is_none());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[network]
contract_address = "xion1registry"

[session]
identity = "xion1alice"

[tip]
refresh_after_settle = false
"#,
        )
        .unwrap();

        let config = ClientConfig::load(&path).unwrap();
        assert_eq!(config.network.contract_address, "xion1registry");
        assert_eq!(config.network.decimals, 6);
        assert_eq!(config.identity().unwrap().as_str(), "xion1alice");
        assert!(!config.tip_options().refresh_after_settle);
        assert_eq!(config.tip_options().success_display, Duration::from_secs(5));
    }

    #[test]
    fn test_save_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = ClientConfig::default();
        config.upload.cloud_name = "demo".to_string();
        config.save(&path).unwrap();

        let loaded = ClientConfig::load(&path).unwrap();
        assert_eq!(loaded.upload.cloud_name, "demo");
        assert_eq!(loaded.network.endpoints, config.network.endpoints);
    }
}
