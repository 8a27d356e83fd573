use serde::{Deserialize, Serialize};

use super::config::EngineConfig;
use super::utils::tool_version;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ToolType {
    YtDlp,
    Deemix,
}

impl ToolType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolType::YtDlp => "yt-dlp",
            ToolType::Deemix => "deemix",
        }
    }

    /// Binary the engine config points at for this tool
    pub fn binary<'a>(&self, config: &'a EngineConfig) -> &'a str {
        match self {
            ToolType::YtDlp => &config.ytdlp_path,
            ToolType::Deemix => &config.deemix_path,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolInfo {
    pub name: String,
    pub tool_type: ToolType,
    pub version: Option<String>,
    pub path: String,
    pub is_available: bool,
}

pub async fn tool_info(config: &EngineConfig, tool_type: ToolType) -> ToolInfo {
    let path = tool_type.binary(config).to_string();
    let version = tool_version(&path).await;
    tracing::debug!(tool = tool_type.as_str(), %path, ?version, "probed tool");

    ToolInfo {
        name: tool_type.as_str().to_string(),
        tool_type,
        is_available: version.is_some(),
        version,
        path,
    }
}

/// Status of every external tool the engines run
pub async fn status(config: &EngineConfig) -> Vec<ToolInfo> {
    let (ytdlp, deemix) = tokio::join!(
        tool_info(config, ToolType::YtDlp),
        tool_info(config, ToolType::Deemix)
    );
    vec![ytdlp, deemix]
}

/// `(name, version)` of each external tool; `None` when it does not run
pub async fn versions(config: &EngineConfig) -> Vec<(String, Option<String>)> {
    status(config)
        .await
        .into_iter()
        .map(|info| (info.name, info.version))
        .collect()
}
