// Music facade: search, resolve and download through the music engine

use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Value};

use super::backends::deezer::generate_download_object;
use super::errors::{Error, Result};
use super::models::{Bitrate, DownloadObject, Info, Settings, Track};
use super::registry::BackendRegistry;
use super::traits::{LinkPlugin, Listener, MusicApi, TrackDownloader};

/// Authenticated music client, shared process-wide through the registry
pub struct MusicClient {
    api: Arc<dyn MusicApi>,
    listener: Arc<dyn Listener>,
    plugins: Vec<Arc<dyn LinkPlugin>>,
    downloader: Arc<dyn TrackDownloader>,
    arl: String,
}

impl MusicClient {
    pub fn new(
        api: Arc<dyn MusicApi>,
        listener: Arc<dyn Listener>,
        plugins: Vec<Arc<dyn LinkPlugin>>,
        downloader: Arc<dyn TrackDownloader>,
        arl: String,
    ) -> Self {
        Self {
            api,
            listener,
            plugins,
            downloader,
            arl,
        }
    }

    pub fn api(&self) -> &dyn MusicApi {
        self.api.as_ref()
    }

    pub fn listener(&self) -> &dyn Listener {
        self.listener.as_ref()
    }

    pub fn plugins(&self) -> &[Arc<dyn LinkPlugin>] {
        &self.plugins
    }

    pub fn plugin(&self, name: &str) -> Option<&dyn LinkPlugin> {
        self.plugins.iter().find(|p| p.name() == name).map(|p| p.as_ref())
    }
}

impl std::fmt::Debug for MusicClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let plugins: Vec<&str> = self.plugins.iter().map(|p| p.name()).collect();
        f.debug_struct("MusicClient")
            .field("plugins", &plugins)
            .finish_non_exhaustive()
    }
}

/// Default settings of the download routine
pub fn default_settings() -> Settings {
    let defaults: [(&str, Value); 40] = [
        ("downloadLocation", json!("")),
        ("tracknameTemplate", json!("%artist% - %title%")),
        ("albumTracknameTemplate", json!("%tracknumber% - %title%")),
        ("playlistTracknameTemplate", json!("%position% - %artist% - %title%")),
        ("createPlaylistFolder", json!(true)),
        ("playlistNameTemplate", json!("%playlist%")),
        ("createArtistFolder", json!(false)),
        ("artistNameTemplate", json!("%artist%")),
        ("createAlbumFolder", json!(true)),
        ("albumNameTemplate", json!("%artist% - %album%")),
        ("createCDFolder", json!(true)),
        ("createStructurePlaylist", json!(false)),
        ("createSingleFolder", json!(false)),
        ("padTracks", json!(true)),
        ("paddingSize", json!("0")),
        ("illegalCharacterReplacer", json!("_")),
        ("queueConcurrency", json!(3)),
        ("maxBitrate", json!("1")),
        ("fallbackBitrate", json!(true)),
        ("fallbackSearch", json!(false)),
        ("logErrors", json!(true)),
        ("logSearched", json!(false)),
        ("overwriteFile", json!("n")),
        ("createM3U8File", json!(false)),
        ("syncedLyrics", json!(false)),
        ("embeddedArtworkSize", json!(800)),
        ("localArtworkSize", json!(1400)),
        ("saveArtwork", json!(true)),
        ("coverImageTemplate", json!("cover")),
        ("saveArtworkArtist", json!(false)),
        ("artistImageTemplate", json!("folder")),
        ("jpegImageQuality", json!(90)),
        ("dateFormat", json!("Y-M-D")),
        ("albumVariousArtists", json!(true)),
        ("removeAlbumVersion", json!(false)),
        ("removeDuplicateArtists", json!(true)),
        ("featuredToTitle", json!("0")),
        ("titleCasing", json!("nothing")),
        ("artistCasing", json!("nothing")),
        ("executeCommand", json!("")),
    ];

    defaults.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

pub struct MusicBackend<'a> {
    registry: &'a BackendRegistry,
}

impl<'a> MusicBackend<'a> {
    pub(crate) fn new(registry: &'a BackendRegistry) -> Self {
        Self { registry }
    }

    /// Raw track search result (hits under `data`)
    pub async fn search(&self, query: &str) -> Result<Info> {
        let client = self.registry.music_client().await?;
        Ok(client.api().search_track(query).await?)
    }

    /// [`search`](Self::search) with typed tracks
    pub async fn search_tracks(&self, query: &str) -> Result<Vec<Track>> {
        let info = self.search(query).await?;
        let data = info.get("data").cloned().unwrap_or(Value::Array(Vec::new()));
        Ok(serde_json::from_value(data)?)
    }

    /// Resolve `url` into a download object at the bitrate named by `bitrate`
    /// (`flac`, `320`, `128`, ...). Links of the linked platform go through
    /// the link plugin. An unknown label leaves the bitrate to the engine.
    pub async fn resolve(&self, url: &str, bitrate: &str) -> Result<DownloadObject> {
        let br = Bitrate::from_label(bitrate);
        if br.is_none() {
            tracing::warn!(label = bitrate, "unknown bitrate label, using the engine default");
        }

        let client = self.registry.music_client().await?;
        let object = generate_download_object(client.api(), url, br, client.plugins(), client.listener()).await?;
        tracing::debug!(title = object.title(), artist = object.artist(), "resolved {}", url);
        Ok(object)
    }

    /// Download a single track into `destination`; anything else is rejected
    /// before touching the engine
    pub async fn download(&self, object: &DownloadObject, destination: &Path) -> Result<()> {
        if object.as_single().is_none() {
            return Err(Error::Precondition("single tracks only".to_string()));
        }

        let client = self.registry.music_client().await?;
        let mut settings = default_settings();
        settings.insert("downloadLocation".to_string(), json!(destination.to_string_lossy()));

        tracing::info!(title = object.title(), destination = %destination.display(), "downloading track");
        client
            .downloader
            .start(&client.arl, object, &settings, client.listener())
            .await
    }

    /// Resolve then download; returns the downloaded track
    pub async fn fetch(&self, url: &str, bitrate: &str, destination: &Path) -> Result<Track> {
        let object = self.resolve(url, bitrate).await?;
        self.download(&object, destination).await?;
        match object {
            DownloadObject::Single(single) => Ok(single.track),
            DownloadObject::Collection(_) => Err(Error::Precondition("single tracks only".to_string())),
        }
    }
}
