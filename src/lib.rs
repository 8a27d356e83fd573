pub mod downloader;

pub use downloader::logs::init as init_logging;
pub use downloader::{BackendError, BackendRegistry, EngineConfig, Error, Params, Result};
