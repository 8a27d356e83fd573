// Downloader module: video and music facades over pluggable engines

pub mod backends;
pub mod config;
pub mod errors;
pub mod format_selector;
pub mod logs;
pub mod models;
pub mod music;
pub mod normalize;
pub mod registry;
pub mod tools;
pub mod traits;
pub mod utils;
pub mod video;

pub use config::{EngineConfig, Secrets};
pub use errors::{BackendError, Error, Result};
pub use format_selector::{merge_formats, presets, wrap_format_selector, SelectFn, SelectionSession};
pub use models::{Bitrate, DownloadObject, EnrichedContext, Entry, Format, FormatSelectorContext, Info, Param, Params, Track};
pub use music::{MusicBackend, MusicClient};
pub use registry::BackendRegistry;
pub use video::VideoBackend;
