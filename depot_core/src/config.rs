use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

const APP_QUALIFIER: &str = "net";
const APP_ORGANIZATION: &str = "depot";
const APP_NAME: &str = "depot";
const CONFIG_FILE: &str = "config.json";

/// Persisted defaults for the CLI: which server to talk to, where the
/// server stores archives, and where downloads land. Command-line flags
/// override all of these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Default server address for client operations (`host` or
    /// `host:port`).
    pub server_addr: Option<String>,
    /// Directory the server keeps published archives in.
    pub store_dir: PathBuf,
    /// Directory downloads are written and extracted into.
    pub download_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_addr: None,
            store_dir: PathBuf::from("serve"),
            download_dir: PathBuf::from("."),
        }
    }
}

impl AppConfig {
    /// Get the config file path
    fn config_path() -> Option<PathBuf> {
        if let Ok(test_path) = std::env::var("DEPOT_TEST_CONFIG_DIR") {
            return Some(PathBuf::from(test_path).join(CONFIG_FILE));
        }

        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
    }

    /// Load config from disk or return default
    pub fn load() -> Self {
        let path = match Self::config_path() {
            Some(p) => p,
            None => return Self::default(),
        };

        match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }

    /// Save config to disk
    pub fn save(&self) {
        let path = match Self::config_path() {
            Some(p) => p,
            None => return,
        };

        if let Some(parent) = path.parent() {
            let _ = fs::create_dir_all(parent);
        }

        if let Ok(json) = serde_json::to_string_pretty(self) {
            let _ = fs::write(path, json);
        }
    }
}
