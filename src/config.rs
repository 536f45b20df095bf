use std::{fmt, fs, path::Path, path::PathBuf, time::Duration};

use serde::Deserialize;
use thiserror::Error;

use crate::setlistfm::PageMath;

pub const DEFAULT_BASE_URL: &str = "https://api.setlist.fm";
pub const DEFAULT_REQUEST_DELAY_MS: u64 = 150;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("cannot parse {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
    #[error("missing required setting: {0}")]
    Missing(&'static str),
}

/// Shape of `configuration.json`.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct FileConfig {
    pub user: String,
    pub api_key: String,
    pub output_path: Option<PathBuf>,
    pub base_url: Option<String>,
    pub request_delay_ms: Option<u64>,
    pub page_math: Option<PageMath>,
}

/// Everything one run needs, resolved once and shared by reference.
#[derive(Clone)]
pub struct Settings {
    pub user: String,
    pub api_key: String,
    pub output_path: PathBuf,
    pub base_url: String,
    /// Pause between consecutive page requests.
    pub request_delay: Duration,
    pub page_math: PageMath,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("user", &self.user)
            .field("api_key", &"<redacted>")
            .field("output_path", &self.output_path)
            .field("base_url", &self.base_url)
            .field("request_delay", &self.request_delay)
            .field("page_math", &self.page_math)
            .finish()
    }
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let file = read_config(path)?;
        Self::from_file_config(with_env_overrides(file, |key| std::env::var(key).ok()))
    }

    pub fn from_file_config(file: FileConfig) -> Result<Self, ConfigError> {
        let user = file.user.trim().to_string();
        if user.is_empty() {
            return Err(ConfigError::Missing("user"));
        }
        let api_key = file.api_key.trim().to_string();
        if api_key.is_empty() {
            return Err(ConfigError::Missing("apiKey"));
        }
        let output_path = file
            .output_path
            .filter(|path| !path.as_os_str().is_empty())
            .ok_or(ConfigError::Missing("outputPath"))?;

        Ok(Self {
            user,
            api_key,
            output_path,
            base_url: file
                .base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            request_delay: Duration::from_millis(
                file.request_delay_ms.unwrap_or(DEFAULT_REQUEST_DELAY_MS),
            ),
            page_math: file.page_math.unwrap_or_default(),
        })
    }
}

fn read_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}

/// `SETLIST_USER`, `SETLIST_API_KEY` and `SETLIST_OUTPUT_PATH` win over the file.
pub fn with_env_overrides<F>(mut file: FileConfig, lookup: F) -> FileConfig
where
    F: Fn(&str) -> Option<String>,
{
    let non_blank = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
    if let Some(user) = non_blank("SETLIST_USER") {
        file.user = user;
    }
    if let Some(api_key) = non_blank("SETLIST_API_KEY") {
        file.api_key = api_key;
    }
    if let Some(output_path) = non_blank("SETLIST_OUTPUT_PATH") {
        file.output_path = Some(PathBuf::from(output_path));
    }
    file
}
