// Seams between the facades and the engines

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::errors::{BackendError, Result};
use super::models::{Bitrate, DownloadObject, Format, FormatSelectorContext, Info, Params, Settings, Track};

/// Four-severity logger shape the video engine calls into
pub trait EngineLogger: Send + Sync {
    fn debug(&self, msg: &str);
    fn info(&self, msg: &str);
    fn warning(&self, msg: &str);
    fn error(&self, msg: &str);
}

/// Event sink the music engine reports progress through
pub trait Listener: Send + Sync {
    fn send(&self, key: &str, value: Option<&Value>);
}

/// Custom format selector, called once per item with the formats it offers
pub trait FormatSelectorHook: Send + Sync {
    fn select(&self, ctx: &FormatSelectorContext) -> Result<Vec<Format>>;
}

/// Per-item hook the video engine runs before selecting formats.
///
/// Returns a reason to skip the item, or `None` to keep it.
pub trait MatchFilterHook: Send + Sync {
    fn filter(&self, info: &Info, incomplete: bool) -> Option<String>;
}

/// A video engine instance scoped to one parameter set
#[async_trait]
pub trait VideoEngine: Send + Sync {
    /// Name of the engine (for logging)
    fn name(&self) -> &'static str;

    /// Extract info for a url or a search query, optionally downloading it.
    /// `process = false` returns the raw, unresolved result.
    async fn extract_info(&self, query_or_url: &str, download: bool, process: bool) -> Result<Info>;
}

/// Builds transient video engine instances
pub trait VideoEngineFactory: Send + Sync {
    fn create(&self, params: Params) -> Box<dyn VideoEngine>;
}

/// Base client of the music engine
#[async_trait]
pub trait MusicApi: Send + Sync {
    /// Authenticate with a session-linking secret; `false` when rejected
    async fn login_via_arl(&self, arl: &str) -> Result<bool, BackendError>;

    async fn search_track(&self, query: &str) -> Result<Info, BackendError>;

    async fn get_track(&self, id: &str) -> Result<Track, BackendError>;

    async fn get_track_by_isrc(&self, isrc: &str) -> Result<Track, BackendError>;

    /// Album info including its track list
    async fn get_album(&self, id: &str) -> Result<Info, BackendError>;

    async fn get_album_by_upc(&self, upc: &str) -> Result<Info, BackendError>;

    /// Playlist info including its track list
    async fn get_playlist(&self, id: &str) -> Result<Info, BackendError>;

    /// Expand a share link into the link it redirects to
    async fn expand_link(&self, url: &str) -> Result<String, BackendError>;
}

/// Credential-linking plugin resolving third-party links into catalogue items
#[async_trait]
pub trait LinkPlugin: Send + Sync {
    fn name(&self) -> &'static str;

    /// Local folder the plugin keeps its configuration and cache in
    fn config_folder(&self) -> &Path;

    /// Validate the configured credentials against the linked platform
    async fn check_credentials(&self) -> Result<(), BackendError>;

    /// Whether `url` belongs to the linked platform
    fn handles(&self, url: &str) -> bool;

    async fn resolve(
        &self,
        api: &dyn MusicApi,
        url: &str,
        bitrate: Option<Bitrate>,
        listener: &dyn Listener,
    ) -> Result<DownloadObject>;
}

/// Credentials of a link plugin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Download routine of the music engine
#[async_trait]
pub trait TrackDownloader: Send + Sync {
    async fn start(
        &self,
        arl: &str,
        object: &DownloadObject,
        settings: &Settings,
        listener: &dyn Listener,
    ) -> Result<()>;
}

/// Builds the pieces of a music client
pub trait MusicEngine: Send + Sync {
    fn api(&self) -> Arc<dyn MusicApi>;
    fn plugin(&self, credentials: PluginCredentials) -> Arc<dyn LinkPlugin>;
    fn downloader(&self) -> Arc<dyn TrackDownloader>;
}
