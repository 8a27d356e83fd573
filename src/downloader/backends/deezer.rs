// Deezer music engine: public API client, link resolution, engine assembly

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Value};

use super::deemix::DeemixCli;
use super::spotify::SpotifyPlugin;
use crate::downloader::config::EngineConfig;
use crate::downloader::errors::{BackendError, Result};
use crate::downloader::logs::MUSIC_TARGET;
use crate::downloader::models::{Bitrate, Collection, CollectionKind, DownloadObject, Info, Single, Track};
use crate::downloader::traits::{LinkPlugin, Listener, MusicApi, MusicEngine, PluginCredentials, TrackDownloader};
use crate::downloader::utils::http_client;

const API_BASE: &str = "https://api.deezer.com";
const GW_URL: &str = "https://www.deezer.com/ajax/gw-light.php";

lazy_static! {
    static ref LINK_RE: Regex =
        Regex::new(r"(?i)deezer\.com/(?:[a-z]{2}(?:-[a-z]{2})?/)?(track|album|playlist|artist)/(\d+)").unwrap();
    static ref SHORT_LINK_RE: Regex = Regex::new(r"(?i)^https?://(?:deezer\.page\.link|link\.deezer\.com)/").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LinkKind {
    Track,
    Album,
    Playlist,
    Artist,
}

/// Kind and id of a catalogue link
pub(crate) fn parse_link(url: &str) -> Option<(LinkKind, String)> {
    let caps = LINK_RE.captures(url)?;
    let kind = match caps[1].to_lowercase().as_str() {
        "track" => LinkKind::Track,
        "album" => LinkKind::Album,
        "playlist" => LinkKind::Playlist,
        _ => LinkKind::Artist,
    };
    Some((kind, caps[2].to_string()))
}

pub(crate) fn is_short_link(url: &str) -> bool {
    SHORT_LINK_RE.is_match(url)
}

/// Turn a `{"error": {...}}` body into an error
fn check_api_error(value: Value) -> Result<Value, BackendError> {
    match value.get("error") {
        Some(err) => Err(BackendError::Api {
            code: err.get("code").and_then(Value::as_i64).unwrap_or(0),
            message: err
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown api error")
                .to_string(),
        }),
        None => Ok(value),
    }
}

fn into_info(value: Value) -> Result<Info, BackendError> {
    match value {
        Value::Object(info) => Ok(info),
        other => Err(BackendError::Parse(format!("expected an object, got {}", other))),
    }
}

fn parse_track(value: Value) -> Result<Track, BackendError> {
    serde_json::from_value(value).map_err(|e| BackendError::Parse(format!("track: {}", e)))
}

fn id_string(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// Build an album or playlist download object from its API info.
///
/// Album track listings omit the album, so it is filled in from the parent.
/// Tracks that do not parse are dropped with a warning.
pub(crate) fn collection_from_info(kind: CollectionKind, info: &Info, bitrate: Option<Bitrate>) -> Collection {
    let title = info.get("title").and_then(Value::as_str).unwrap_or_default().to_string();
    let owner = match kind {
        CollectionKind::Album => info.get("artist"),
        CollectionKind::Playlist => info.get("creator"),
    };
    let artist = owner
        .and_then(|o| o.get("name"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let parent_album = json!({"id": info.get("id").cloned().unwrap_or(Value::Null), "title": title});
    let raw_tracks = info
        .get("tracks")
        .and_then(|t| t.get("data"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut tracks = Vec::with_capacity(raw_tracks.len());
    for mut raw in raw_tracks {
        if kind == CollectionKind::Album {
            if let Some(obj) = raw.as_object_mut() {
                obj.entry("album").or_insert_with(|| parent_album.clone());
            }
        }
        match parse_track(raw) {
            Ok(track) => tracks.push(track),
            Err(e) => tracing::warn!(target: MUSIC_TARGET, collection = %title, "skipping track: {}", e),
        }
    }

    Collection {
        kind,
        id: id_string(info.get("id")),
        title,
        artist,
        link: info.get("link").and_then(Value::as_str).unwrap_or_default().to_string(),
        tracks,
        bitrate,
    }
}

/// Resolve a link into a download object.
///
/// Share links are expanded first. Links a plugin claims are handed to it;
/// everything else must be a track, album or playlist link of the catalogue.
pub async fn generate_download_object(
    api: &dyn MusicApi,
    url: &str,
    bitrate: Option<Bitrate>,
    plugins: &[Arc<dyn LinkPlugin>],
    listener: &dyn Listener,
) -> Result<DownloadObject> {
    let mut link = url.trim().to_string();
    if is_short_link(&link) {
        link = api.expand_link(&link).await?;
        tracing::debug!(target: MUSIC_TARGET, "expanded {} to {}", url, link);
    }

    if let Some(plugin) = plugins.iter().find(|p| p.handles(&link)) {
        tracing::debug!(target: MUSIC_TARGET, plugin = plugin.name(), "resolving {}", link);
        return plugin.resolve(api, &link, bitrate, listener).await;
    }

    let (kind, id) = parse_link(&link).ok_or_else(|| BackendError::InvalidUrl(link.clone()))?;
    let object = match kind {
        LinkKind::Track => DownloadObject::Single(Single {
            track: api.get_track(&id).await?,
            bitrate,
        }),
        LinkKind::Album => {
            let info = api.get_album(&id).await?;
            DownloadObject::Collection(collection_from_info(CollectionKind::Album, &info, bitrate))
        }
        LinkKind::Playlist => {
            let info = api.get_playlist(&id).await?;
            DownloadObject::Collection(collection_from_info(CollectionKind::Playlist, &info, bitrate))
        }
        LinkKind::Artist => {
            return Err(BackendError::InvalidUrl(format!("artist links cannot be downloaded: {}", link)).into());
        }
    };
    Ok(object)
}

/// Client of the public catalogue API plus the session endpoint
pub struct DeezerApi {
    client: reqwest::Client,
    api_base: String,
    gw_url: String,
    arl: Mutex<Option<String>>,
}

impl DeezerApi {
    pub fn new(config: &EngineConfig) -> Self {
        let client = http_client(config);

        Self {
            client,
            api_base: API_BASE.to_string(),
            gw_url: GW_URL.to_string(),
            arl: Mutex::new(None),
        }
    }

    pub fn with_base_urls(mut self, api_base: impl Into<String>, gw_url: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self.gw_url = gw_url.into();
        self
    }

    pub fn is_logged_in(&self) -> bool {
        self.arl.lock().map(|a| a.is_some()).unwrap_or(false)
    }

    async fn get_json(&self, path: &str, query: &[(&str, &str)]) -> Result<Value, BackendError> {
        let url = format!("{}/{}", self.api_base, path);
        tracing::trace!(target: MUSIC_TARGET, %url, "api request");

        let value: Value = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        check_api_error(value)
    }

    async fn get_info(&self, path: &str) -> Result<Info, BackendError> {
        into_info(self.get_json(path, &[]).await?)
    }
}

#[async_trait]
impl MusicApi for DeezerApi {
    async fn login_via_arl(&self, arl: &str) -> Result<bool, BackendError> {
        let arl = arl.trim();
        let body: Value = self
            .client
            .post(&self.gw_url)
            .query(&[
                ("method", "deezer.getUserData"),
                ("input", "3"),
                ("api_version", "1.0"),
                ("api_token", ""),
            ])
            .header(reqwest::header::COOKIE, format!("arl={}", arl))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let user_id = body
            .pointer("/results/USER/USER_ID")
            .map(|v| id_string(Some(v)))
            .unwrap_or_default();
        let logged_in = !user_id.is_empty() && user_id != "0";

        if logged_in {
            tracing::debug!(target: MUSIC_TARGET, user_id = %user_id, "session linked");
            if let Ok(mut slot) = self.arl.lock() {
                *slot = Some(arl.to_string());
            }
        }
        Ok(logged_in)
    }

    async fn search_track(&self, query: &str) -> Result<Info, BackendError> {
        into_info(self.get_json("search/track", &[("q", query)]).await?)
    }

    async fn get_track(&self, id: &str) -> Result<Track, BackendError> {
        parse_track(self.get_json(&format!("track/{}", id), &[]).await?)
    }

    async fn get_track_by_isrc(&self, isrc: &str) -> Result<Track, BackendError> {
        self.get_track(&format!("isrc:{}", isrc)).await
    }

    async fn get_album(&self, id: &str) -> Result<Info, BackendError> {
        self.get_info(&format!("album/{}", id)).await
    }

    async fn get_album_by_upc(&self, upc: &str) -> Result<Info, BackendError> {
        self.get_info(&format!("album/upc:{}", upc)).await
    }

    async fn get_playlist(&self, id: &str) -> Result<Info, BackendError> {
        self.get_info(&format!("playlist/{}", id)).await
    }

    async fn expand_link(&self, url: &str) -> Result<String, BackendError> {
        let resp = self.client.get(url).send().await?;
        Ok(resp.url().to_string())
    }
}

/// Music engine over the public API, the Spotify link plugin and deemix
pub struct DeezerEngine {
    config: EngineConfig,
}

impl DeezerEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }
}

impl MusicEngine for DeezerEngine {
    fn api(&self) -> Arc<dyn MusicApi> {
        Arc::new(DeezerApi::new(&self.config))
    }

    fn plugin(&self, credentials: PluginCredentials) -> Arc<dyn LinkPlugin> {
        Arc::new(SpotifyPlugin::new(credentials, &self.config))
    }

    fn downloader(&self) -> Arc<dyn TrackDownloader> {
        Arc::new(DeemixCli::new(self.config.clone()))
    }
}
