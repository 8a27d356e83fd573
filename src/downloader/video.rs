// Video facade: search and download through the video engine

use std::path::Path;
use std::sync::Arc;

use serde_json::json;

use super::errors::Result;
use super::format_selector::{wrap_format_selector, SelectFn};
use super::logs::VideoLogger;
use super::models::{Entry, Info, Param, Params};
use super::normalize::normalize;
use super::registry::BackendRegistry;

/// Fragment workers the engine runs per download
pub const CONCURRENT_FRAGMENTS: u64 = 16;

/// Default search size
pub const DEFAULT_SEARCH_LIMIT: usize = 50;

/// Parameters every engine instance starts from
pub fn defaults() -> Params {
    Params::new()
        .with("verbose", true)
        .with("logger", Param::Logger(Arc::new(VideoLogger)))
        .with("restrictfilenames", true)
        .with("concurrent_fragment_downloads", CONCURRENT_FRAGMENTS)
        .with("postprocessors", json!([{"key": "FFmpegMetadata"}]))
}

pub struct VideoBackend<'a> {
    registry: &'a BackendRegistry,
}

impl<'a> VideoBackend<'a> {
    pub(crate) fn new(registry: &'a BackendRegistry) -> Self {
        Self { registry }
    }

    /// Download `url` into `destination`.
    ///
    /// With `select` the caller picks the format ids per item; otherwise the
    /// engine's own format choice (or a static `format` override) applies.
    /// The engine's result is returned as is.
    pub async fn download(
        &self,
        url: &str,
        destination: &Path,
        select: Option<Box<SelectFn>>,
        overrides: Params,
    ) -> Result<Info> {
        let format = select.map(wrap_format_selector).unwrap_or_default();
        let params = defaults()
            | Params::new().with("paths", json!({"home": destination.to_string_lossy()}))
            | format
            | overrides;

        let engine = self.registry.video_engine(params);
        tracing::info!(engine = engine.name(), %url, destination = %destination.display(), "downloading");
        engine.extract_info(url, true, true).await
    }

    /// Search the video platform, returning deduplicated entries with
    /// channel-less results last
    pub async fn search(&self, query: &str, limit: usize, overrides: Params) -> Result<Info> {
        let params = defaults() | Params::new().with("extract_flat", "in_playlist") | overrides;

        let engine = self.registry.video_engine(params);
        let full_query = format!("ytsearch{}:{}", limit, query);
        tracing::debug!(engine = engine.name(), query = %full_query, "searching");
        let info = engine.extract_info(&full_query, false, false).await?;
        Ok(normalize(info))
    }

    /// [`search`](Self::search) with typed entries
    pub async fn search_entries(&self, query: &str, limit: usize) -> Result<Vec<Entry>> {
        let info = self.search(query, limit, Params::new()).await?;
        Ok(Entry::from_info(&info)?)
    }
}
