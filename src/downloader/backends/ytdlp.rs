// yt-dlp engine - one subprocess-backed instance per parameter set
//
// Parameter keys are translated into command line flags. Custom format
// selection cannot cross the process boundary, so when a selector or a match
// filter is installed the engine probes first and then, for every item in
// order, runs the match filter, runs the selector, and downloads the item with
// the ids the selector picked.

use async_trait::async_trait;
use serde_json::Value;

use crate::downloader::config::EngineConfig;
use crate::downloader::errors::{BackendError, Result};
use crate::downloader::models::{Format, FormatSelectorContext, Info, Params};
use crate::downloader::traits::{VideoEngine, VideoEngineFactory};
use crate::downloader::utils::run_streaming;

pub struct YtDlpFactory {
    config: EngineConfig,
}

impl YtDlpFactory {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }
}

impl VideoEngineFactory for YtDlpFactory {
    fn create(&self, params: Params) -> Box<dyn VideoEngine> {
        Box::new(YtDlp::new(&self.config, params))
    }
}

pub struct YtDlp {
    bin: String,
    timeout_seconds: Option<u64>,
    proxy: Option<String>,
    params: Params,
}

impl YtDlp {
    pub fn new(config: &EngineConfig, params: Params) -> Self {
        Self {
            bin: config.ytdlp_path.clone(),
            timeout_seconds: config.timeout_seconds,
            proxy: config.proxy.clone(),
            params,
        }
    }

    /// Flags derived from the parameter map
    pub fn build_args(&self) -> Vec<String> {
        let p = &self.params;
        let mut args = vec!["--no-progress".to_string()];

        if p.get_bool("verbose") {
            args.push("--verbose".to_string());
        }
        if p.get_bool("restrictfilenames") {
            args.push("--restrict-filenames".to_string());
        }
        if p.get_bool("noplaylist") {
            args.push("--no-playlist".to_string());
        }
        if let Some(n) = p.get_u64("concurrent_fragment_downloads") {
            args.push("--concurrent-fragments".to_string());
            args.push(n.to_string());
        }

        if let Some(Value::Object(paths)) = p.value("paths") {
            for (kind, path) in paths {
                let Some(path) = path.as_str() else { continue };
                args.push("--paths".to_string());
                if kind == "home" {
                    args.push(path.to_string());
                } else {
                    args.push(format!("{}:{}", kind, path));
                }
            }
        }

        if let Some(template) = p.get_str("outtmpl") {
            args.push("--output".to_string());
            args.push(template.to_string());
        }

        if let Some(Value::Array(pps)) = p.value("postprocessors") {
            for pp in pps {
                args.extend(self.postprocessor_args(pp));
            }
        }

        match p.value("extract_flat") {
            Some(Value::String(s)) if s == "in_playlist" => args.push("--flat-playlist".to_string()),
            Some(Value::Bool(true)) => args.push("--flat-playlist".to_string()),
            _ => {}
        }

        // a selector hook under `format` is handled per item instead
        if let Some(format) = p.get_str("format") {
            args.push("--format".to_string());
            args.push(format.to_string());
        }

        if let Some(proxy) = p.get_str("proxy").map(str::to_string).or_else(|| self.proxy.clone()) {
            args.push("--proxy".to_string());
            args.push(proxy);
        }

        args
    }

    fn postprocessor_args(&self, pp: &Value) -> Vec<String> {
        match pp.get("key").and_then(Value::as_str) {
            Some("FFmpegMetadata") => vec!["--embed-metadata".to_string()],
            Some("EmbedThumbnail") => vec!["--embed-thumbnail".to_string()],
            Some("FFmpegExtractAudio") => {
                let mut args = vec!["--extract-audio".to_string()];
                if let Some(codec) = pp.get("preferredcodec").and_then(Value::as_str) {
                    args.push("--audio-format".to_string());
                    args.push(codec.to_string());
                }
                args
            }
            other => {
                if let Some(logger) = self.params.logger() {
                    logger.warning(&format!("unsupported postprocessor {:?}, skipping", other));
                }
                Vec::new()
            }
        }
    }

    fn log_line(&self, line: &str) {
        let Some(logger) = self.params.logger() else { return };
        if let Some(msg) = line.strip_prefix("WARNING: ") {
            logger.warning(msg);
        } else if let Some(msg) = line.strip_prefix("ERROR: ") {
            logger.error(msg);
        } else {
            logger.debug(line);
        }
    }

    async fn run_json(&self, args: Vec<String>) -> Result<Info> {
        tracing::debug!("[yt-dlp] Running: {} {}", self.bin, args.join(" "));

        let mut last_error = None;
        let output = run_streaming(&self.bin, &args, None, self.timeout_seconds, |line| {
            if let Some(msg) = line.strip_prefix("ERROR: ") {
                last_error = Some(msg.to_string());
            }
            self.log_line(line)
        })
        .await?;
        if !output.status.success() {
            // verbose output mentions json, urls and the like; only the error line says what failed
            let message = last_error.unwrap_or_else(|| output.stderr_text());
            return Err(BackendError::from(message).into());
        }

        parse_info(&output.stdout)
    }

    async fn extract_with_hooks(&self, query_or_url: &str, download: bool) -> Result<Info> {
        let mut probe_args = self.build_args();
        probe_args.extend(["--dump-single-json".to_string(), "--skip-download".to_string()]);
        probe_args.push(query_or_url.to_string());
        let mut probe = self.run_json(probe_args).await?;

        let playlist = match probe.remove("entries") {
            Some(Value::Array(entries)) => Some(entries),
            Some(other) => {
                probe.insert("entries".to_string(), other);
                None
            }
            None => None,
        };

        match playlist {
            Some(entries) => {
                let mut done = Vec::with_capacity(entries.len());
                for entry in entries {
                    let Value::Object(item) = entry else { continue };
                    if let Some(item) = self.process_item(item, download).await? {
                        done.push(Value::Object(item));
                    }
                }
                probe.insert("entries".to_string(), Value::Array(done));
                Ok(probe)
            }
            None => Ok(self.process_item(probe, download).await?.unwrap_or_default()),
        }
    }

    /// Match filter, then selector, then download for one item.
    /// `None` when the match filter rejects the item.
    async fn process_item(&self, mut item: Info, download: bool) -> Result<Option<Info>> {
        if let Some(filter) = self.params.match_filter() {
            if let Some(reason) = filter.filter(&item, false) {
                if let Some(logger) = self.params.logger() {
                    logger.info(&format!("skipping {}: {}", item_label(&item), reason));
                }
                return Ok(None);
            }
        }

        let chosen = match self.params.selector() {
            Some(selector) => Some(selector.select(&selector_context(&item))?),
            None => None,
        };

        if download {
            let url = item_url(&item)
                .ok_or_else(|| BackendError::InvalidUrl(format!("no url for {}", item_label(&item))))?
                .to_string();

            let mut args = self.build_args();
            if let Some(chosen) = &chosen {
                let ids: Vec<&str> = chosen.iter().map(|f| f.format_id.as_str()).collect();
                args.push("--format".to_string());
                args.push(ids.join("+"));
            }
            args.extend([
                "--no-playlist".to_string(),
                "--dump-single-json".to_string(),
                "--no-simulate".to_string(),
                url,
            ]);
            item = self.run_json(args).await?;
        }

        if let Some(format) = chosen.as_ref().and_then(|c| c.first()) {
            record_selection(&mut item, format);
        }
        Ok(Some(item))
    }
}

#[async_trait]
impl VideoEngine for YtDlp {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn extract_info(&self, query_or_url: &str, download: bool, process: bool) -> Result<Info> {
        let hooked = self.params.selector().is_some() || self.params.match_filter().is_some();
        if process && hooked {
            return self.extract_with_hooks(query_or_url, download).await;
        }

        let mut args = self.build_args();
        args.push("--dump-single-json".to_string());
        if !process && !args.iter().any(|a| a == "--flat-playlist") {
            args.push("--flat-playlist".to_string());
        }
        args.push(if download { "--no-simulate" } else { "--skip-download" }.to_string());
        args.push(query_or_url.to_string());

        self.run_json(args).await
    }
}

fn parse_info(stdout: &[u8]) -> Result<Info> {
    let text = String::from_utf8_lossy(stdout);
    // one JSON document per processed url; the last one is the outermost
    let last = text
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .ok_or_else(|| BackendError::Parse("yt-dlp printed no info".to_string()))?;

    match serde_json::from_str::<Value>(last)? {
        Value::Object(info) => Ok(info),
        _ => Err(BackendError::Parse("yt-dlp info is not an object".to_string()).into()),
    }
}

fn item_url(item: &Info) -> Option<&str> {
    ["webpage_url", "original_url", "url"]
        .iter()
        .find_map(|key| item.get(*key).and_then(Value::as_str))
}

fn item_label(item: &Info) -> String {
    item.get("title")
        .or_else(|| item.get("id"))
        .and_then(Value::as_str)
        .unwrap_or("item")
        .to_string()
}

/// Selector context for one item, shaped like the one yt-dlp builds
fn selector_context(item: &Info) -> FormatSelectorContext {
    let formats: Vec<Format> = item
        .get("formats")
        .and_then(Value::as_array)
        .map(|fs| fs.iter().filter_map(|f| serde_json::from_value(f.clone()).ok()).collect())
        .unwrap_or_default();

    let has_merged_format = formats.iter().any(|f| !f.is_audio() && !f.is_video());
    let incomplete_formats = formats.iter().all(Format::is_video) || formats.iter().all(Format::is_audio);

    let mut ctx = FormatSelectorContext::new(formats);
    ctx.extra.insert("has_merged_format".to_string(), Value::Bool(has_merged_format));
    ctx.extra.insert("incomplete_formats".to_string(), Value::Bool(incomplete_formats));
    ctx
}

fn record_selection(item: &mut Info, format: &Format) {
    item.insert("format_id".to_string(), Value::String(format.format_id.clone()));
    item.insert("ext".to_string(), Value::String(format.ext.clone()));
    item.insert("protocol".to_string(), Value::String(format.protocol.clone()));
    if let Some(requested) = &format.requested_formats {
        if let Ok(value) = serde_json::to_value(requested) {
            item.insert("requested_formats".to_string(), value);
        }
    }
}
