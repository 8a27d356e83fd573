// Backend client registry
//
// The music client is built lazily, once per registry, behind an async
// once-cell: concurrent first callers wait on the same construction. A failed
// construction leaves the cell empty, so the next caller tries again.
// The video engine has no persistent client; every call gets a fresh engine.

use std::sync::Arc;

use tokio::sync::OnceCell;

use super::backends::deezer::DeezerEngine;
use super::backends::ytdlp::YtDlpFactory;
use super::config::{env_lookup, EngineConfig, Lookup, Secrets};
use super::errors::{Error, Result};
use super::logs::LogListener;
use super::models::Params;
use super::music::{MusicBackend, MusicClient};
use super::traits::{Listener, MusicEngine, PluginCredentials, VideoEngine, VideoEngineFactory};
use super::video::VideoBackend;

pub struct BackendRegistry {
    config: EngineConfig,
    lookup: Lookup,
    video: Arc<dyn VideoEngineFactory>,
    music_engine: Arc<dyn MusicEngine>,
    music: OnceCell<Arc<MusicClient>>,
}

impl BackendRegistry {
    /// Registry over yt-dlp and deemix, with secrets read from the environment
    pub fn new(config: EngineConfig) -> Self {
        let video = Arc::new(YtDlpFactory::new(config.clone()));
        let music = Arc::new(DeezerEngine::new(config.clone()));
        Self::with_engines(config, env_lookup(), video, music)
    }

    pub fn with_engines(
        config: EngineConfig,
        lookup: Lookup,
        video: Arc<dyn VideoEngineFactory>,
        music_engine: Arc<dyn MusicEngine>,
    ) -> Self {
        Self {
            config,
            lookup,
            video,
            music_engine,
            music: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Facade over the video engine
    pub fn video(&self) -> VideoBackend<'_> {
        VideoBackend::new(self)
    }

    /// Facade over the music engine
    pub fn music(&self) -> MusicBackend<'_> {
        MusicBackend::new(self)
    }

    /// Fresh video engine scoped to `params`
    pub fn video_engine(&self, params: Params) -> Box<dyn VideoEngine> {
        self.video.create(params)
    }

    /// The music client, built on first use
    pub async fn music_client(&self) -> Result<Arc<MusicClient>> {
        self.music
            .get_or_try_init(|| async {
                tracing::debug!("building music client");
                let client = connect(self.music_engine.as_ref(), &self.lookup).await?;
                tracing::info!("music client ready");
                Ok::<_, Error>(Arc::new(client))
            })
            .await
            .cloned()
    }

    pub fn music_client_ready(&self) -> bool {
        self.music.initialized()
    }
}

async fn connect(engine: &dyn MusicEngine, lookup: &Lookup) -> Result<MusicClient> {
    let secrets = Secrets::load(lookup)?;

    let api = engine.api();
    let listener: Arc<dyn Listener> = Arc::new(LogListener);

    let plugin = engine.plugin(PluginCredentials {
        client_id: secrets.spotify_app_id.clone(),
        client_secret: secrets.spotify_app_secret.clone(),
    });
    tokio::fs::create_dir_all(plugin.config_folder()).await?;
    plugin
        .check_credentials()
        .await
        .map_err(|e| Error::Configuration(format!("{} credentials rejected: {}", plugin.name(), e)))?;

    let logged_in = api
        .login_via_arl(&secrets.arl)
        .await
        .map_err(|e| Error::Configuration(format!("login failed: {}", e)))?;
    if !logged_in {
        return Err(Error::Configuration("login rejected: session secret is invalid or expired".to_string()));
    }

    Ok(MusicClient::new(api, listener, vec![plugin], engine.downloader(), secrets.arl))
}
