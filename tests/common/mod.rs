//! Fake engines for driving the facades without network or external tools

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use mediadl::downloader::config::{Lookup, ARL_VAR, SPOTIFY_APP_ID_VAR, SPOTIFY_APP_SECRET_VAR};
use mediadl::downloader::errors::{BackendError, Result};
use mediadl::downloader::models::{
    Album, Artist, Bitrate, DownloadObject, Format, FormatSelectorContext, Info, Params, Settings, Single, Track,
};
use mediadl::downloader::traits::{
    LinkPlugin, Listener, MusicApi, MusicEngine, PluginCredentials, TrackDownloader, VideoEngine,
    VideoEngineFactory,
};
use mediadl::{BackendRegistry, EngineConfig};

pub fn info(value: Value) -> Info {
    value.as_object().cloned().unwrap_or_default()
}

pub fn lookup(pairs: &[(&str, &str)]) -> Lookup {
    let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    Arc::new(move |name: &str| map.get(name).cloned())
}

pub fn all_secrets() -> Lookup {
    lookup(&[
        (ARL_VAR, "arl-secret"),
        (SPOTIFY_APP_ID_VAR, "app-id"),
        (SPOTIFY_APP_SECRET_VAR, "app-secret"),
    ])
}

pub fn track(id: u64, title: &str) -> Track {
    Track {
        id,
        link: format!("https://www.deezer.com/track/{}", id),
        title: title.to_string(),
        artist: Artist {
            id: 1,
            name: "Skeler".to_string(),
        },
        album: Album {
            id: 2,
            title: "Tel Aviv".to_string(),
        },
        duration: 200,
        isrc: None,
    }
}

// --- video ---------------------------------------------------------------

pub struct VideoCall {
    pub query: String,
    pub download: bool,
    pub process: bool,
    pub params: Params,
}

/// Video engine that plays the hook protocol over canned items: per item,
/// match filter first, then selector.
#[derive(Clone, Default)]
pub struct FakeVideo {
    pub calls: Arc<Mutex<Vec<VideoCall>>>,
    pub items: Vec<Info>,
    pub listing: Info,
}

impl FakeVideo {
    pub fn with_items(items: Vec<Info>) -> Self {
        Self {
            items,
            ..Self::default()
        }
    }

    pub fn with_listing(listing: Info) -> Self {
        Self {
            listing,
            ..Self::default()
        }
    }

    pub fn take_calls(&self) -> Vec<VideoCall> {
        std::mem::take(&mut *self.calls.lock().unwrap())
    }
}

impl VideoEngineFactory for FakeVideo {
    fn create(&self, params: Params) -> Box<dyn VideoEngine> {
        Box::new(FakeVideoEngine {
            fake: self.clone(),
            params,
        })
    }
}

struct FakeVideoEngine {
    fake: FakeVideo,
    params: Params,
}

#[async_trait]
impl VideoEngine for FakeVideoEngine {
    fn name(&self) -> &'static str {
        "fake-video"
    }

    async fn extract_info(&self, query_or_url: &str, download: bool, process: bool) -> Result<Info> {
        self.fake.calls.lock().unwrap().push(VideoCall {
            query: query_or_url.to_string(),
            download,
            process,
            params: self.params.clone(),
        });

        if !download {
            return Ok(self.fake.listing.clone());
        }

        let mut done = Vec::new();
        for item in &self.fake.items {
            if let Some(filter) = self.params.match_filter() {
                if filter.filter(item, false).is_some() {
                    continue;
                }
            }
            let mut item = item.clone();
            if let Some(selector) = self.params.selector() {
                let formats: Vec<Format> = item
                    .get("formats")
                    .cloned()
                    .map(|f| serde_json::from_value(f).unwrap())
                    .unwrap_or_default();
                let chosen = selector.select(&FormatSelectorContext::new(formats))?;
                item.insert("format_id".to_string(), json!(chosen[0].format_id));
                item.insert("chosen".to_string(), serde_json::to_value(&chosen).unwrap());
            }
            done.push(Value::Object(item));
        }
        Ok(info(json!({"entries": done})))
    }
}

// --- music ---------------------------------------------------------------

#[derive(Default)]
pub struct Counters {
    pub api_builds: AtomicUsize,
    pub plugin_builds: AtomicUsize,
    pub logins: AtomicUsize,
    pub credential_checks: AtomicUsize,
    pub plugin_resolves: AtomicUsize,
}

pub struct FakeMusic {
    pub counters: Arc<Counters>,
    pub config_folder: PathBuf,
    /// Logins with an index below this are rejected
    pub reject_logins: usize,
    pub reject_credentials: bool,
    pub login_delay: Duration,
    pub starts: Arc<Mutex<Vec<(String, DownloadObject, Settings)>>>,
}

impl FakeMusic {
    pub fn new(config_folder: &Path) -> Self {
        Self {
            counters: Arc::new(Counters::default()),
            config_folder: config_folder.to_path_buf(),
            reject_logins: 0,
            reject_credentials: false,
            login_delay: Duration::from_millis(0),
            starts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

impl MusicEngine for FakeMusic {
    fn api(&self) -> Arc<dyn MusicApi> {
        self.counters.api_builds.fetch_add(1, Ordering::SeqCst);
        Arc::new(FakeApi {
            counters: self.counters.clone(),
            reject_logins: self.reject_logins,
            login_delay: self.login_delay,
        })
    }

    fn plugin(&self, credentials: PluginCredentials) -> Arc<dyn LinkPlugin> {
        self.counters.plugin_builds.fetch_add(1, Ordering::SeqCst);
        Arc::new(FakePlugin {
            counters: self.counters.clone(),
            credentials,
            config_folder: self.config_folder.clone(),
            reject: self.reject_credentials,
        })
    }

    fn downloader(&self) -> Arc<dyn TrackDownloader> {
        Arc::new(FakeDownloader {
            starts: self.starts.clone(),
        })
    }
}

struct FakeApi {
    counters: Arc<Counters>,
    reject_logins: usize,
    login_delay: Duration,
}

#[async_trait]
impl MusicApi for FakeApi {
    async fn login_via_arl(&self, arl: &str) -> Result<bool, BackendError> {
        tokio::time::sleep(self.login_delay).await;
        let attempt = self.counters.logins.fetch_add(1, Ordering::SeqCst);
        Ok(attempt >= self.reject_logins && arl == "arl-secret")
    }

    async fn search_track(&self, query: &str) -> Result<Info, BackendError> {
        let hit = serde_json::to_value(track(894382952, query)).unwrap();
        Ok(info(json!({"data": [hit], "total": 1})))
    }

    async fn get_track(&self, id: &str) -> Result<Track, BackendError> {
        let id: u64 = id.parse().map_err(|_| BackendError::InvalidUrl(id.to_string()))?;
        Ok(track(id, "Pale Light"))
    }

    async fn get_track_by_isrc(&self, _isrc: &str) -> Result<Track, BackendError> {
        Ok(track(894382952, "Pale Light"))
    }

    async fn get_album(&self, id: &str) -> Result<Info, BackendError> {
        let hit = serde_json::to_value(track(1, "One")).unwrap();
        Ok(info(json!({
            "id": id.parse::<u64>().unwrap_or(0),
            "title": "Tel Aviv",
            "link": format!("https://www.deezer.com/album/{}", id),
            "artist": {"id": 1, "name": "Skeler"},
            "tracks": {"data": [hit]}
        })))
    }

    async fn get_album_by_upc(&self, _upc: &str) -> Result<Info, BackendError> {
        self.get_album("2").await
    }

    async fn get_playlist(&self, _id: &str) -> Result<Info, BackendError> {
        Err(BackendError::Api {
            code: 800,
            message: "no data".to_string(),
        })
    }

    async fn expand_link(&self, _url: &str) -> Result<String, BackendError> {
        Ok("https://www.deezer.com/track/894382952".to_string())
    }
}

struct FakePlugin {
    counters: Arc<Counters>,
    credentials: PluginCredentials,
    config_folder: PathBuf,
    reject: bool,
}

#[async_trait]
impl LinkPlugin for FakePlugin {
    fn name(&self) -> &'static str {
        "fake-spotify"
    }

    fn config_folder(&self) -> &Path {
        &self.config_folder
    }

    async fn check_credentials(&self) -> Result<(), BackendError> {
        self.counters.credential_checks.fetch_add(1, Ordering::SeqCst);
        if self.reject || self.credentials.client_id != "app-id" {
            return Err(BackendError::Auth("invalid client".to_string()));
        }
        Ok(())
    }

    fn handles(&self, url: &str) -> bool {
        url.contains("open.spotify.com")
    }

    async fn resolve(
        &self,
        api: &dyn MusicApi,
        _url: &str,
        bitrate: Option<Bitrate>,
        listener: &dyn Listener,
    ) -> mediadl::Result<DownloadObject> {
        self.counters.plugin_resolves.fetch_add(1, Ordering::SeqCst);
        listener.send("converting", None);
        Ok(DownloadObject::Single(Single {
            track: api.get_track_by_isrc("GBUM71029604").await?,
            bitrate,
        }))
    }
}

struct FakeDownloader {
    starts: Arc<Mutex<Vec<(String, DownloadObject, Settings)>>>,
}

#[async_trait]
impl TrackDownloader for FakeDownloader {
    async fn start(&self, arl: &str, object: &DownloadObject, settings: &Settings, listener: &dyn Listener) -> Result<()> {
        listener.send("startDownload", Some(&json!(object.link())));
        self.starts
            .lock()
            .unwrap()
            .push((arl.to_string(), object.clone(), settings.clone()));
        Ok(())
    }
}

pub fn registry(video: FakeVideo, music: FakeMusic, lookup: Lookup) -> BackendRegistry {
    BackendRegistry::with_engines(EngineConfig::default(), lookup, Arc::new(video), Arc::new(music))
}
