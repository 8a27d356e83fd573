// Engine configuration and secrets

use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::errors::{Error, Result};

pub const ARL_VAR: &str = "DEEZER_ARL";
pub const SPOTIFY_APP_ID_VAR: &str = "SPOTIFY_APP_ID";
pub const SPOTIFY_APP_SECRET_VAR: &str = "SPOTIFY_APP_SECRET";

/// Looks up one configuration variable by name
pub type Lookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Lookup backed by the process environment
pub fn env_lookup() -> Lookup {
    Arc::new(|name: &str| std::env::var(name).ok())
}

/// Secrets the music client authenticates with
#[derive(Clone, PartialEq, Eq)]
pub struct Secrets {
    /// Session-linking secret of the music service
    pub arl: String,
    pub spotify_app_id: String,
    pub spotify_app_secret: String,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("arl", &"<redacted>")
            .field("spotify_app_id", &self.spotify_app_id)
            .field("spotify_app_secret", &"<redacted>")
            .finish()
    }
}

impl Secrets {
    pub fn load(lookup: &Lookup) -> Result<Self> {
        let require = |name: &str| -> Result<String> {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| Error::Configuration(format!("{} is not set", name)))
        };

        Ok(Self {
            spotify_app_id: require(SPOTIFY_APP_ID_VAR)?,
            spotify_app_secret: require(SPOTIFY_APP_SECRET_VAR)?,
            arl: require(ARL_VAR)?,
        })
    }
}

/// Where the external tools live and how they are run
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub ytdlp_path: String,
    pub deemix_path: String,
    /// Kill engine subprocesses after this many seconds
    pub timeout_seconds: Option<u64>,
    /// Proxy url for yt-dlp and the HTTP clients
    pub proxy: Option<String>,
    /// Working directory deemix runs in (portable mode keeps `config/` here)
    pub deemix_workdir: PathBuf,
    /// Folder the link plugin keeps its configuration in
    pub plugin_config_dir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("mediadl");
        let config_dir = dirs::config_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("mediadl");

        Self {
            ytdlp_path: find_ytdlp(),
            deemix_path: std::env::var("DEEMIX_PATH").unwrap_or_else(|_| "deemix".to_string()),
            timeout_seconds: None,
            proxy: None,
            deemix_workdir: data_dir.join("deemix"),
            plugin_config_dir: config_dir.join("spotify"),
        }
    }
}

impl EngineConfig {
    pub fn with_ytdlp_path(mut self, path: impl Into<String>) -> Self {
        self.ytdlp_path = path.into();
        self
    }

    pub fn with_deemix_path(mut self, path: impl Into<String>) -> Self {
        self.deemix_path = path.into();
        self
    }

    pub fn with_timeout(mut self, seconds: Option<u64>) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn with_deemix_workdir(mut self, dir: impl AsRef<Path>) -> Self {
        self.deemix_workdir = dir.as_ref().to_path_buf();
        self
    }

    pub fn with_plugin_config_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.plugin_config_dir = dir.as_ref().to_path_buf();
        self
    }
}

/// Find yt-dlp: `YTDLP_PATH`, then common install locations, then `PATH`
fn find_ytdlp() -> String {
    if let Ok(custom) = std::env::var("YTDLP_PATH") {
        return custom;
    }

    let common_paths = ["/opt/homebrew/bin/yt-dlp", "/usr/local/bin/yt-dlp", "/usr/bin/yt-dlp"];
    common_paths
        .iter()
        .find(|p| Path::new(p).exists())
        .map(|p| p.to_string())
        .unwrap_or_else(|| "yt-dlp".to_string())
}
