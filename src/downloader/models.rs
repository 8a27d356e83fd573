// Common data models shared by the facades and the engines

use std::collections::BTreeMap;
use std::fmt;
use std::ops::BitOr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::traits::{EngineLogger, FormatSelectorHook, MatchFilterHook};

/// Result map returned by a search or an extraction
pub type Info = Map<String, Value>;

/// Settings map handed to the music download routine
pub type Settings = Map<String, Value>;

/// One value of a parameter map: plain data or an engine hook
#[derive(Clone)]
pub enum Param {
    Value(Value),
    Selector(Arc<dyn FormatSelectorHook>),
    MatchFilter(Arc<dyn MatchFilterHook>),
    Logger(Arc<dyn EngineLogger>),
}

impl fmt::Debug for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => write!(f, "{}", v),
            Self::Selector(_) => write!(f, "<format selector>"),
            Self::MatchFilter(_) => write!(f, "<match filter>"),
            Self::Logger(_) => write!(f, "<logger>"),
        }
    }
}

macro_rules! param_from {
    ( $( $t:ty ),+ $(,)? ) => {
        $(
            impl From<$t> for Param {
                fn from(v: $t) -> Self {
                    Self::Value(Value::from(v))
                }
            }
        )+
    };
}

param_from!(Value, &str, String, bool, u32, u64, i64, usize);

/// Configuration map passed to a video engine.
///
/// Merging is a right-biased union: a key present on the right wholly
/// replaces the left value, nested maps included.
#[derive(Debug, Clone, Default)]
pub struct Params(BTreeMap<String, Param>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a JSON object; any other JSON value yields empty params
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map.into_iter().map(|(k, v)| (k, Param::Value(v))).collect()),
            _ => Self::default(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Param>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Param>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn merge(mut self, other: Params) -> Self {
        self.0.extend(other.0);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Param> {
        self.0.get(key)
    }

    pub fn value(&self, key: &str) -> Option<&Value> {
        match self.0.get(key) {
            Some(Param::Value(v)) => Some(v),
            _ => None,
        }
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.value(key).and_then(Value::as_str)
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.value(key).and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.value(key).and_then(Value::as_u64)
    }

    pub fn selector(&self) -> Option<Arc<dyn FormatSelectorHook>> {
        match self.0.get("format") {
            Some(Param::Selector(s)) => Some(s.clone()),
            _ => None,
        }
    }

    pub fn match_filter(&self) -> Option<Arc<dyn MatchFilterHook>> {
        match self.0.get("match_filter") {
            Some(Param::MatchFilter(m)) => Some(m.clone()),
            _ => None,
        }
    }

    pub fn logger(&self) -> Option<Arc<dyn EngineLogger>> {
        match self.0.get("logger") {
            Some(Param::Logger(l)) => Some(l.clone()),
            _ => None,
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl BitOr for Params {
    type Output = Params;

    fn bitor(self, rhs: Params) -> Params {
        self.merge(rhs)
    }
}

impl<K: Into<String>, V: Into<Param>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// One search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub channel: Option<String>,
}

impl Entry {
    /// Typed view of the `entries` of a search result
    pub fn from_info(info: &Info) -> Result<Vec<Entry>, serde_json::Error> {
        match info.get("entries") {
            Some(entries) => Vec::<Entry>::deserialize(entries),
            None => Ok(Vec::new()),
        }
    }
}

/// One candidate encoded stream of a media item.
///
/// A composite format (several streams merged into one artifact) carries its
/// constituents in `requested_formats`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Format {
    pub format_id: String,
    #[serde(default)]
    pub ext: String,
    #[serde(default)]
    pub protocol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_formats: Option<Vec<Format>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Format {
    pub fn new(format_id: impl Into<String>, ext: impl Into<String>, protocol: impl Into<String>) -> Self {
        Self {
            format_id: format_id.into(),
            ext: ext.into(),
            protocol: protocol.into(),
            requested_formats: None,
            extra: Map::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn is_composite(&self) -> bool {
        self.requested_formats.is_some()
    }

    fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(Value::as_str)
    }

    fn extra_f64(&self, key: &str) -> Option<f64> {
        self.extra.get(key).and_then(Value::as_f64)
    }

    pub fn vcodec(&self) -> Option<&str> {
        self.extra_str("vcodec")
    }

    pub fn acodec(&self) -> Option<&str> {
        self.extra_str("acodec")
    }

    pub fn height(&self) -> Option<u32> {
        self.extra.get("height").and_then(Value::as_u64).map(|h| h as u32)
    }

    pub fn abr(&self) -> Option<f64> {
        self.extra_f64("abr")
    }

    pub fn tbr(&self) -> Option<f64> {
        self.extra_f64("tbr")
    }

    /// Exact size, or the approximate one when exact is unknown
    pub fn size(&self) -> Option<u64> {
        self.extra
            .get("filesize")
            .and_then(Value::as_u64)
            .or_else(|| self.extra.get("filesize_approx").and_then(Value::as_u64))
    }

    fn has_codec(codec: Option<&str>) -> bool {
        codec.is_some_and(|c| c != "none" && !c.is_empty())
    }

    pub fn is_audio(&self) -> bool {
        Self::has_codec(self.acodec()) && !Self::has_codec(self.vcodec())
    }

    pub fn is_video(&self) -> bool {
        Self::has_codec(self.vcodec()) && !Self::has_codec(self.acodec())
    }

    pub fn is_h264(&self) -> bool {
        self.vcodec().is_some_and(|v| v.starts_with("avc1"))
    }

    pub fn is_aac(&self) -> bool {
        self.acodec().is_some_and(|a| a.starts_with("mp4a"))
    }
}

/// Formats available for one media item at selection time, as the video
/// engine hands them to a selector
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormatSelectorContext {
    #[serde(default)]
    pub formats: Vec<Format>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FormatSelectorContext {
    pub fn new(formats: Vec<Format>) -> Self {
        Self {
            formats,
            extra: Map::new(),
        }
    }

    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = self.extra.clone();
        map.insert(
            "formats".to_string(),
            Value::Array(self.formats.iter().filter_map(|f| serde_json::to_value(f).ok()).collect()),
        );
        map
    }
}

/// Selector context enriched with the most recent full item info
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnrichedContext {
    fields: Map<String, Value>,
    available: Vec<Format>,
}

impl EnrichedContext {
    /// Captured `info` wins over `ctx` on key collision
    pub fn new(ctx: &FormatSelectorContext, info: &Info) -> Self {
        let mut fields = ctx.to_map();
        fields.extend(info.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self {
            fields,
            available: ctx.formats.clone(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn title(&self) -> Option<&str> {
        self.get_str("title")
    }

    pub fn duration(&self) -> Option<f64> {
        self.get("duration").and_then(Value::as_f64)
    }

    /// Formats the selection is resolved against
    pub fn formats(&self) -> &[Format] {
        &self.available
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

/// Audio quality codes understood by the music engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Bitrate {
    Flac,
    Mp3_320,
    Mp3_128,
    Mp4Ra3,
    Mp4Ra2,
    Mp4Ra1,
}

impl Bitrate {
    /// Translate a human label (`flac`, `320`, `360_mq`, ...)
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "flac" | "lossless" | "9" => Some(Self::Flac),
            "mp3" | "320" | "3" => Some(Self::Mp3_320),
            "128" | "1" => Some(Self::Mp3_128),
            "360" | "360_hq" | "15" => Some(Self::Mp4Ra3),
            "360_mq" | "14" => Some(Self::Mp4Ra2),
            "360_lq" | "13" => Some(Self::Mp4Ra1),
            _ => None,
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            Self::Flac => 9,
            Self::Mp3_320 => 3,
            Self::Mp3_128 => 1,
            Self::Mp4Ra3 => 15,
            Self::Mp4Ra2 => 14,
            Self::Mp4Ra1 => 13,
        }
    }

    /// Label accepted back by the engine's command line
    pub fn label(&self) -> &'static str {
        match self {
            Self::Flac => "flac",
            Self::Mp3_320 => "320",
            Self::Mp3_128 => "128",
            Self::Mp4Ra3 => "360_hq",
            Self::Mp4Ra2 => "360_mq",
            Self::Mp4Ra1 => "360_lq",
        }
    }
}

impl fmt::Display for Bitrate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artist {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Album {
    pub id: u64,
    pub title: String,
}

/// One track of the music catalogue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: u64,
    pub link: String,
    pub title: String,
    pub artist: Artist,
    pub album: Album,
    #[serde(default)]
    pub duration: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isrc: Option<String>,
}

/// Resolved download target of the music engine
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadObject {
    Single(Single),
    Collection(Collection),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Single {
    pub track: Track,
    pub bitrate: Option<Bitrate>,
}

/// Album or playlist
#[derive(Debug, Clone, PartialEq)]
pub struct Collection {
    pub kind: CollectionKind,
    pub id: String,
    pub title: String,
    pub artist: String,
    pub link: String,
    pub tracks: Vec<Track>,
    pub bitrate: Option<Bitrate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionKind {
    Album,
    Playlist,
}

impl DownloadObject {
    pub fn title(&self) -> &str {
        match self {
            Self::Single(s) => &s.track.title,
            Self::Collection(c) => &c.title,
        }
    }

    pub fn artist(&self) -> &str {
        match self {
            Self::Single(s) => &s.track.artist.name,
            Self::Collection(c) => &c.artist,
        }
    }

    /// Catalogue link the download routine is pointed at
    pub fn link(&self) -> &str {
        match self {
            Self::Single(s) => &s.track.link,
            Self::Collection(c) => &c.link,
        }
    }

    pub fn bitrate(&self) -> Option<Bitrate> {
        match self {
            Self::Single(s) => s.bitrate,
            Self::Collection(c) => c.bitrate,
        }
    }

    pub fn as_single(&self) -> Option<&Single> {
        match self {
            Self::Single(s) => Some(s),
            Self::Collection(_) => None,
        }
    }
}
