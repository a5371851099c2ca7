use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};
use crate::paths::Paths;

/// Options applied to `Runtime.evaluate` / `Runtime.callFunctionOn` requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateConfig {
    #[serde(default = "default_await_promise")]
    pub await_promise: bool,
    /// Object group the remote handles are allocated in.
    #[serde(default = "default_object_group")]
    pub object_group: Option<String>,
    #[serde(default)]
    pub user_gesture: bool,
    #[serde(default)]
    pub include_command_line_api: bool,
}

fn default_await_promise() -> bool {
    true
}

fn default_object_group() -> Option<String> {
    Some("apparition".to_string())
}

impl EvaluateConfig {
    /// Object group, ignoring blank values.
    pub fn object_group(&self) -> Option<&str> {
        self.object_group
            .as_deref()
            .map(str::trim)
            .filter(|g| !g.is_empty())
    }
}

impl Default for EvaluateConfig {
    fn default() -> Self {
        Self {
            await_promise: default_await_promise(),
            object_group: default_object_group(),
            user_gesture: false,
            include_command_line_api: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputConfig {
    #[serde(default = "default_pretty")]
    pub pretty: bool,
}

fn default_pretty() -> bool {
    true
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            pretty: default_pretty(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub evaluate: EvaluateConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn load_or_default(paths: &Paths) -> Result<Self> {
        let config_path = paths.config_file();
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }
}
