// Helper functions for engine implementations

use std::collections::HashSet;
use std::hash::Hash;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command as TokioCommand;
use tokio::time::timeout;

use super::config::EngineConfig;
use super::errors::BackendError;
use super::logs::MUSIC_TARGET;

/// Keep the first item for every key, preserving order. Items without a
/// key are always kept.
pub fn unique_by<T, K, F>(items: impl IntoIterator<Item = T>, mut key: F) -> Vec<T>
where
    K: Eq + Hash,
    F: FnMut(&T) -> Option<K>,
{
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| key(item).map_or(true, |k| seen.insert(k)))
        .collect()
}

/// HTTP client honouring the configured timeout and proxy
pub fn http_client(config: &EngineConfig) -> reqwest::Client {
    let mut builder = reqwest::Client::builder();
    if let Some(secs) = config.timeout_seconds {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    if let Some(proxy) = config.proxy.as_deref() {
        match reqwest::Proxy::all(proxy) {
            Ok(p) => builder = builder.proxy(p),
            Err(e) => tracing::warn!(target: MUSIC_TARGET, "ignoring invalid proxy {}: {}", proxy, e),
        }
    }

    builder.build().unwrap_or_else(|e| {
        tracing::warn!(target: MUSIC_TARGET, "falling back to a default http client: {}", e);
        reqwest::Client::new()
    })
}

/// Output of a finished command; stderr has already been handed out line by line
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    /// Last stderr lines, kept for error reporting
    pub stderr_tail: Vec<String>,
}

impl CommandOutput {
    pub fn stderr_text(&self) -> String {
        self.stderr_tail.join("\n")
    }
}

const STDERR_TAIL: usize = 20;

/// Run a command, feeding every stderr line to `on_line` as it arrives.
///
/// With `timeout_secs` set the child is killed once the deadline passes.
pub async fn run_streaming<F>(
    program: &str,
    args: &[String],
    cwd: Option<&Path>,
    timeout_secs: Option<u64>,
    mut on_line: F,
) -> Result<CommandOutput, BackendError>
where
    F: FnMut(&str),
{
    let mut cmd = TokioCommand::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    let mut child = cmd.spawn().map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => BackendError::ToolNotFound(program.to_string()),
        _ => BackendError::Execution(format!("Failed to start {}: {}", program, e)),
    })?;

    let mut stdout_pipe = child
        .stdout
        .take()
        .ok_or_else(|| BackendError::Execution(format!("Failed to capture stdout from {}", program)))?;
    let stderr_pipe = child
        .stderr
        .take()
        .ok_or_else(|| BackendError::Execution(format!("Failed to capture stderr from {}", program)))?;

    let run = async {
        let read_stdout = async {
            let mut buf = Vec::new();
            stdout_pipe.read_to_end(&mut buf).await.map(|_| buf)
        };
        let read_stderr = async {
            let mut tail = Vec::new();
            let mut lines = BufReader::new(stderr_pipe).lines();
            while let Some(line) = lines.next_line().await? {
                on_line(&line);
                if tail.len() == STDERR_TAIL {
                    tail.remove(0);
                }
                tail.push(line);
            }
            Ok::<_, std::io::Error>(tail)
        };

        let (stdout, stderr_tail) = tokio::try_join!(read_stdout, read_stderr)?;
        let status = child.wait().await?;
        Ok::<_, std::io::Error>(CommandOutput {
            status,
            stdout,
            stderr_tail,
        })
    };

    match timeout_secs {
        Some(secs) => match timeout(Duration::from_secs(secs), run).await {
            Ok(res) => res.map_err(|e| BackendError::Execution(format!("{}: {}", program, e))),
            Err(_) => Err(BackendError::NetworkTimeout(format!("{} timed out after {}s", program, secs))),
        },
        None => run.await.map_err(|e| BackendError::Execution(format!("{}: {}", program, e))),
    }
}

/// First line printed by `program --version`, if it runs at all
pub async fn tool_version(program: &str) -> Option<String> {
    let args = ["--version".to_string()];
    let output = run_streaming(program, &args, None, Some(10), |_| {}).await.ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
}
