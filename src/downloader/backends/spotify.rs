// Spotify link plugin
//
// Spotify links are converted into catalogue items by their external ids:
// tracks by ISRC, albums by UPC, playlists track by track. Conversions are
// cached in `cache.json` inside the plugin's config folder.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::deezer::collection_from_info;
use crate::downloader::config::EngineConfig;
use crate::downloader::errors::{BackendError, Result};
use crate::downloader::logs::MUSIC_TARGET;
use crate::downloader::models::{Bitrate, Collection, CollectionKind, DownloadObject, Single, Track};
use crate::downloader::traits::{LinkPlugin, Listener, MusicApi, PluginCredentials};
use crate::downloader::utils::http_client;

const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const API_BASE: &str = "https://api.spotify.com/v1";
const CACHE_FILE: &str = "cache.json";
/// Refresh tokens this long before they actually expire
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

lazy_static! {
    static ref LINK_RE: Regex = Regex::new(
        r"(?i)(?:open\.spotify\.com/(?:intl-[a-z]{2}/)?(track|album|playlist)/|spotify:(track|album|playlist):)([A-Za-z0-9]+)"
    )
    .unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SpotifyKind {
    Track,
    Album,
    Playlist,
}

pub(crate) fn parse_link(url: &str) -> Option<(SpotifyKind, String)> {
    let caps = LINK_RE.captures(url)?;
    let kind = caps.get(1).or_else(|| caps.get(2))?.as_str().to_lowercase();
    let kind = match kind.as_str() {
        "track" => SpotifyKind::Track,
        "album" => SpotifyKind::Album,
        _ => SpotifyKind::Playlist,
    };
    Some((kind, caps[3].to_string()))
}

/// Spotify id -> catalogue id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct ConversionCache {
    #[serde(default)]
    pub tracks: HashMap<String, u64>,
    #[serde(default)]
    pub albums: HashMap<String, u64>,
}

impl ConversionCache {
    pub(crate) async fn load(path: &Path) -> Self {
        match tokio::fs::read(path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                tracing::warn!(target: MUSIC_TARGET, path = %path.display(), "discarding unreadable cache: {}", e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }
}

fn default_expires_in() -> u64 {
    3600
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    expires_at: Instant,
}

impl AccessToken {
    fn new(value: String, expires_in: u64) -> Self {
        Self {
            value,
            expires_at: Instant::now() + Duration::from_secs(expires_in),
        }
    }

    fn is_fresh(&self) -> bool {
        Instant::now() + EXPIRY_MARGIN < self.expires_at
    }
}

pub struct SpotifyPlugin {
    credentials: PluginCredentials,
    config_folder: PathBuf,
    client: reqwest::Client,
    token_url: String,
    api_base: String,
    token: Mutex<Option<AccessToken>>,
    cache: Mutex<ConversionCache>,
}

impl SpotifyPlugin {
    pub fn new(credentials: PluginCredentials, config: &EngineConfig) -> Self {
        Self {
            credentials,
            config_folder: config.plugin_config_dir.clone(),
            client: http_client(config),
            token_url: TOKEN_URL.to_string(),
            api_base: API_BASE.to_string(),
            token: Mutex::new(None),
            cache: Mutex::new(ConversionCache::default()),
        }
    }

    pub fn with_endpoints(mut self, token_url: impl Into<String>, api_base: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self.api_base = api_base.into();
        self
    }

    fn cache_path(&self) -> PathBuf {
        self.config_folder.join(CACHE_FILE)
    }

    async fn fetch_token(&self) -> Result<String, BackendError> {
        let resp = self
            .client
            .post(&self.token_url)
            .basic_auth(&self.credentials.client_id, Some(&self.credentials.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        let status = resp.status();
        if status.is_client_error() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BackendError::Auth(format!("spotify token request rejected ({}): {}", status, body)));
        }

        let token: TokenResponse = resp.error_for_status()?.json().await?;
        tracing::debug!(target: MUSIC_TARGET, expires_in = token.expires_in, "fetched spotify token");
        if let Ok(mut slot) = self.token.lock() {
            *slot = Some(AccessToken::new(token.access_token.clone(), token.expires_in));
        }
        Ok(token.access_token)
    }

    /// Cached token while it is fresh, a new one otherwise
    async fn token(&self) -> Result<String, BackendError> {
        let cached = self
            .token
            .lock()
            .ok()
            .and_then(|slot| slot.as_ref().filter(|t| t.is_fresh()).map(|t| t.value.clone()));
        match cached {
            Some(token) => Ok(token),
            None => self.fetch_token().await,
        }
    }

    fn clear_token(&self) {
        if let Ok(mut slot) = self.token.lock() {
            *slot = None;
        }
    }

    /// GET an API url; a rejected token is replaced once before giving up
    async fn get(&self, url: &str) -> Result<Value, BackendError> {
        let token = self.token().await?;
        let mut resp = self.client.get(url).bearer_auth(token).send().await?;
        if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
            tracing::debug!(target: MUSIC_TARGET, "spotify token rejected, fetching a new one");
            self.clear_token();
            let token = self.fetch_token().await?;
            resp = self.client.get(url).bearer_auth(token).send().await?;
        }

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 => BackendError::Auth(message),
                429 => BackendError::Blocked(message),
                code => BackendError::Api {
                    code: i64::from(code),
                    message,
                },
            });
        }
        Ok(resp.json().await?)
    }

    async fn save_cache(&self) {
        let bytes = match self.cache.lock() {
            Ok(cache) => serde_json::to_vec_pretty(&*cache),
            Err(_) => return,
        };
        let result = match bytes {
            Ok(bytes) => tokio::fs::write(self.cache_path(), bytes).await,
            Err(e) => Err(std::io::Error::other(e)),
        };
        if let Err(e) = result {
            tracing::warn!(target: MUSIC_TARGET, "could not write conversion cache: {}", e);
        }
    }

    fn cached_track(&self, spotify_id: &str) -> Option<u64> {
        self.cache.lock().ok()?.tracks.get(spotify_id).copied()
    }

    fn cached_album(&self, spotify_id: &str) -> Option<u64> {
        self.cache.lock().ok()?.albums.get(spotify_id).copied()
    }

    async fn convert_track(&self, api: &dyn MusicApi, spotify_id: &str, isrc: Option<&str>) -> Result<Track, BackendError> {
        if let Some(id) = self.cached_track(spotify_id) {
            return api.get_track(&id.to_string()).await;
        }

        let isrc = match isrc {
            Some(isrc) => isrc.to_string(),
            None => {
                let info = self.get(&format!("{}/tracks/{}", self.api_base, spotify_id)).await?;
                external_id(&info, "isrc")
                    .ok_or_else(|| BackendError::Parse(format!("spotify track {} has no isrc", spotify_id)))?
            }
        };

        let track = api.get_track_by_isrc(&isrc).await?;
        if let Ok(mut cache) = self.cache.lock() {
            cache.tracks.insert(spotify_id.to_string(), track.id);
        }
        Ok(track)
    }

    async fn convert_album(
        &self,
        api: &dyn MusicApi,
        spotify_id: &str,
        bitrate: Option<Bitrate>,
    ) -> Result<Collection, BackendError> {
        let info = match self.cached_album(spotify_id) {
            Some(id) => api.get_album(&id.to_string()).await?,
            None => {
                let spotify = self.get(&format!("{}/albums/{}", self.api_base, spotify_id)).await?;
                let upc = external_id(&spotify, "upc")
                    .ok_or_else(|| BackendError::Parse(format!("spotify album {} has no upc", spotify_id)))?;
                let info = api.get_album_by_upc(&upc).await?;
                if let (Some(id), Ok(mut cache)) = (info.get("id").and_then(Value::as_u64), self.cache.lock()) {
                    cache.albums.insert(spotify_id.to_string(), id);
                }
                info
            }
        };
        Ok(collection_from_info(CollectionKind::Album, &info, bitrate))
    }

    async fn convert_playlist(
        &self,
        api: &dyn MusicApi,
        url: &str,
        spotify_id: &str,
        bitrate: Option<Bitrate>,
        listener: &dyn Listener,
    ) -> Result<Collection, BackendError> {
        let playlist = self.get(&format!("{}/playlists/{}", self.api_base, spotify_id)).await?;

        let mut items: Vec<Value> = Vec::new();
        let mut page = playlist.get("tracks").cloned();
        while let Some(current) = page.take() {
            if let Some(batch) = current.get("items").and_then(Value::as_array) {
                items.extend(batch.iter().filter_map(|i| i.get("track").cloned()));
            }
            if let Some(next) = current.get("next").and_then(Value::as_str) {
                page = Some(self.get(next).await?);
            }
        }

        let total = items.len();
        let mut tracks = Vec::with_capacity(total);
        for (done, item) in items.iter().enumerate() {
            let Some(id) = item.get("id").and_then(Value::as_str) else { continue };
            let isrc = external_id(item, "isrc");
            match self.convert_track(api, id, isrc.as_deref()).await {
                Ok(track) => tracks.push(track),
                Err(e) => listener.send("conversionFailed", Some(&json!({"id": id, "error": e.to_string()}))),
            }
            listener.send("playlistConversion", Some(&json!({"done": done + 1, "total": total})));
        }

        Ok(Collection {
            kind: CollectionKind::Playlist,
            id: spotify_id.to_string(),
            title: playlist.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
            artist: playlist
                .pointer("/owner/display_name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            link: url.to_string(),
            tracks,
            bitrate,
        })
    }
}

fn external_id(info: &Value, kind: &str) -> Option<String> {
    info.get("external_ids")
        .and_then(|ids| ids.get(kind))
        .and_then(Value::as_str)
        .map(|s| s.to_uppercase())
}

#[async_trait]
impl LinkPlugin for SpotifyPlugin {
    fn name(&self) -> &'static str {
        "spotify"
    }

    fn config_folder(&self) -> &Path {
        &self.config_folder
    }

    async fn check_credentials(&self) -> Result<(), BackendError> {
        if self.credentials.client_id.is_empty() || self.credentials.client_secret.is_empty() {
            return Err(BackendError::Auth("spotify client id and secret are required".to_string()));
        }
        self.fetch_token().await?;

        let loaded = ConversionCache::load(&self.cache_path()).await;
        if let Ok(mut cache) = self.cache.lock() {
            *cache = loaded;
        }
        Ok(())
    }

    fn handles(&self, url: &str) -> bool {
        parse_link(url).is_some()
    }

    async fn resolve(
        &self,
        api: &dyn MusicApi,
        url: &str,
        bitrate: Option<Bitrate>,
        listener: &dyn Listener,
    ) -> Result<DownloadObject> {
        let (kind, id) = parse_link(url).ok_or_else(|| BackendError::InvalidUrl(url.to_string()))?;

        let object = match kind {
            SpotifyKind::Track => DownloadObject::Single(Single {
                track: self.convert_track(api, &id, None).await?,
                bitrate,
            }),
            SpotifyKind::Album => DownloadObject::Collection(self.convert_album(api, &id, bitrate).await?),
            SpotifyKind::Playlist => {
                DownloadObject::Collection(self.convert_playlist(api, url, &id, bitrate, listener).await?)
            }
        };

        self.save_cache().await;
        Ok(object)
    }
}
