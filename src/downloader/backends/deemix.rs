// deemix download routine, run as a portable-mode subprocess
//
// Portable mode reads its configuration from the working directory, so runs
// sharing a directory take turns and the files are replaced by rename.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use lazy_static::lazy_static;
use serde_json::{json, Value};
use tokio::sync::Mutex as AsyncMutex;

use crate::downloader::config::EngineConfig;
use crate::downloader::errors::{BackendError, Result};
use crate::downloader::logs::MUSIC_TARGET;
use crate::downloader::models::{DownloadObject, Settings};
use crate::downloader::traits::{Listener, TrackDownloader};
use crate::downloader::utils::run_streaming;

lazy_static! {
    static ref WORKDIR_LOCKS: Mutex<HashMap<PathBuf, Arc<AsyncMutex<()>>>> = Mutex::new(HashMap::new());
}

/// Lock shared by every run in `workdir`
fn workdir_lock(workdir: &Path) -> Arc<AsyncMutex<()>> {
    let mut locks = WORKDIR_LOCKS.lock().unwrap_or_else(|e| e.into_inner());
    locks.entry(workdir.to_path_buf()).or_default().clone()
}

pub struct DeemixCli {
    config: EngineConfig,
}

impl DeemixCli {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    fn build_args(object: &DownloadObject, settings: &Settings) -> Vec<String> {
        let mut args = vec!["--portable".to_string()];
        if let Some(bitrate) = object.bitrate() {
            args.push("-b".to_string());
            args.push(bitrate.label().to_string());
        }
        if let Some(dest) = settings.get("downloadLocation").and_then(Value::as_str).filter(|d| !d.is_empty()) {
            args.push("-p".to_string());
            args.push(dest.to_string());
        }
        args.push(object.link().to_string());
        args
    }
}

/// Write next to `path`, then rename over it
async fn replace_file(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, contents).await?;
    tokio::fs::rename(&tmp, path).await
}

/// Lay out `config/.arl` and `config/config.json` the way portable mode reads them
async fn prepare_workdir(workdir: &Path, arl: &str, settings: &Settings) -> std::io::Result<()> {
    let config_dir = workdir.join("config");
    tokio::fs::create_dir_all(&config_dir).await?;
    replace_file(&config_dir.join(".arl"), arl.trim().as_bytes()).await?;

    let body = serde_json::to_vec_pretty(settings).map_err(std::io::Error::other)?;
    replace_file(&config_dir.join("config.json"), &body).await
}

#[async_trait]
impl TrackDownloader for DeemixCli {
    async fn start(&self, arl: &str, object: &DownloadObject, settings: &Settings, listener: &dyn Listener) -> Result<()> {
        let workdir = &self.config.deemix_workdir;
        let lock = workdir_lock(workdir);
        let _turn = match lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                tracing::debug!(target: MUSIC_TARGET, workdir = %workdir.display(), "waiting for another deemix run");
                lock.lock().await
            }
        };
        prepare_workdir(workdir, arl, settings).await?;

        let args = Self::build_args(object, settings);
        tracing::debug!("[deemix] Running: {} {}", self.config.deemix_path, args.join(" "));
        listener.send("startDownload", Some(&json!(object.link())));

        let output = run_streaming(
            &self.config.deemix_path,
            &args,
            Some(workdir),
            self.config.timeout_seconds,
            |line| listener.send("downloadInfo", Some(&json!(line))),
        )
        .await?;

        for line in String::from_utf8_lossy(&output.stdout).lines().filter(|l| !l.trim().is_empty()) {
            listener.send("downloadInfo", Some(&json!(line)));
        }

        if !output.status.success() {
            return Err(BackendError::from(output.stderr_text()).into());
        }

        listener.send("finishDownload", Some(&json!(object.link())));
        Ok(())
    }
}
