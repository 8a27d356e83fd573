// Logging bridge: engine log callbacks -> tracing

use serde_json::Value;
use tracing::Level;

use super::traits::{EngineLogger, Listener};

/// Target the video engine's messages are republished under
pub const VIDEO_TARGET: &str = "mediadl::video";
/// Target the music engine's events are republished under
pub const MUSIC_TARGET: &str = "mediadl::music";

const MAX_MESSAGE_CHARS: usize = 1000;

/// Install a stderr subscriber filtered by `RUST_LOG` (default `debug`).
///
/// Safe to call more than once; only the first call installs anything.
pub fn init() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}

/// Resolve the level a message on the video engine's debug channel belongs to.
///
/// The engine prefixes its own chatter with `[debug] ` or `[info] `; those
/// prefixes are stripped and the remainder dispatched again.
pub(crate) fn route_debug(msg: &str) -> (Level, &str) {
    if let Some(rest) = msg.strip_prefix("[debug] ") {
        return route_debug(rest);
    }
    if let Some(rest) = msg.strip_prefix("[info] ") {
        return (Level::INFO, rest);
    }
    (Level::DEBUG, msg)
}

fn ignore_reason(msg: &str) -> Option<&'static str> {
    match msg {
        m if m.contains('\n') => Some("multi-line"),
        m if m.chars().nth(MAX_MESSAGE_CHARS).is_some() => Some("too long"),
        _ => None,
    }
}

macro_rules! republish {
    ($target:expr, $level:expr, $msg:expr) => {{
        let msg: &str = $msg;
        let level: Level = $level;
        if let Some(reason) = ignore_reason(msg) {
            tracing::trace!(target: $target, ?level, "ignored log entry ({})", reason);
        } else if level == Level::ERROR {
            tracing::error!(target: $target, "{}", msg);
        } else if level == Level::WARN {
            tracing::warn!(target: $target, "{}", msg);
        } else if level == Level::INFO {
            tracing::info!(target: $target, "{}", msg);
        } else if level == Level::DEBUG {
            tracing::debug!(target: $target, "{}", msg);
        } else {
            tracing::trace!(target: $target, "{}", msg);
        }
    }};
}

/// Logger handed to the video engine through its `logger` parameter
#[derive(Debug, Clone, Copy, Default)]
pub struct VideoLogger;

impl EngineLogger for VideoLogger {
    fn debug(&self, msg: &str) {
        let (level, msg) = route_debug(msg);
        republish!(VIDEO_TARGET, level, msg);
    }

    fn info(&self, msg: &str) {
        republish!(VIDEO_TARGET, Level::INFO, msg);
    }

    fn warning(&self, msg: &str) {
        republish!(VIDEO_TARGET, Level::WARN, msg);
    }

    fn error(&self, msg: &str) {
        republish!(VIDEO_TARGET, Level::ERROR, msg);
    }
}

/// Listener attached to the music client; every event is a debug line
#[derive(Debug, Clone, Copy, Default)]
pub struct LogListener;

impl LogListener {
    pub(crate) fn render(key: &str, value: Option<&Value>) -> String {
        match value {
            Some(value) => format!("{} {}", key, value),
            None => key.to_string(),
        }
    }
}

impl Listener for LogListener {
    fn send(&self, key: &str, value: Option<&Value>) {
        let line = Self::render(key, value);
        republish!(MUSIC_TARGET, Level::DEBUG, &line);
    }
}
