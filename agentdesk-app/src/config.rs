use agentdesk_http::normalize_base_url;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    /// Base for profile photos; falls back to `api_base_url`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_base_url: Option<String>,
    pub data_dir: PathBuf,
    pub request_timeout_secs: u64,
    /// Zero disables polling; the reconciler then reacts to local changes only.
    pub reconcile_interval_secs: u64,
    pub check_subscription: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000/".to_string(),
            media_base_url: None,
            data_dir: PathBuf::from("./data"),
            request_timeout_secs: 30,
            reconcile_interval_secs: 5,
            check_subscription: true,
        }
    }
}

impl Config {
    /// Load from `path` (or `config.toml`), then apply `AGENTDESK_*` overrides.
    /// The default path may be absent; an explicitly given one may not.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default = Path::new(DEFAULT_CONFIG_PATH);
                if default.exists() {
                    Self::from_file(default)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("AGENTDESK_API_BASE_URL") {
            self.api_base_url = url;
        }
        if let Some(url) = lookup("AGENTDESK_MEDIA_BASE_URL") {
            self.media_base_url = Some(url);
        }
        if let Some(dir) = lookup("AGENTDESK_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
    }

    pub fn validate(&self) -> Result<()> {
        normalize_base_url(&self.api_base_url)
            .with_context(|| format!("api_base_url '{}' is not usable", self.api_base_url))?;
        if let Some(media) = &self.media_base_url {
            normalize_base_url(media)
                .with_context(|| format!("media_base_url '{}' is not usable", media))?;
        }
        if self.request_timeout_secs == 0 {
            bail!("request_timeout_secs must be greater than zero");
        }
        Ok(())
    }

    pub fn media_base_url(&self) -> &str {
        self.media_base_url.as_deref().unwrap_or(&self.api_base_url)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn reconcile_interval(&self) -> Option<Duration> {
        (self.reconcile_interval_secs > 0).then(|| Duration::from_secs(self.reconcile_interval_secs))
    }

    pub fn credentials_dir(&self) -> PathBuf {
        self.data_dir.join("credentials")
    }

    pub fn master_key_path(&self) -> PathBuf {
        self.data_dir.join("master.key")
    }
}
