//! Rendering of `spec.ytt` template bodies through an external `ytt` binary.

use std::process::Stdio;
use std::time::Duration;

use serde_json::Value as Json;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

fn ytt_path() -> String {
    std::env::var("CARTO_YTT_PATH").ok().filter(|s| !s.is_empty()).unwrap_or_else(|| "ytt".to_string())
}

fn ytt_timeout() -> Duration {
    std::env::var("CARTO_YTT_TIMEOUT_SECS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(Duration::from_secs(4))
}

#[derive(Debug, Error)]
pub enum YttError {
    #[error("unable to marshal template context: {0}")]
    Context(String),
    #[error("unable to apply ytt template: {0}")]
    Exec(#[from] std::io::Error),
    #[error("unable to apply ytt template: timed out after {0:?}")]
    Timeout(Duration),
    #[error("unable to apply ytt template: {0}")]
    Failed(String),
    #[error("unable to parse ytt output: {0}")]
    Output(#[from] serde_yaml::Error),
}

/// Runs `ytt -f -` with each top-level context key passed as `--data-value-yaml key=<json>`.
#[derive(Debug, Clone)]
pub struct Ytt {
    binary: String,
    timeout: Duration,
}

impl Default for Ytt {
    fn default() -> Self {
        Self::from_env()
    }
}

impl Ytt {
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        Self { binary: binary.into(), timeout }
    }

    /// `CARTO_YTT_PATH` (default `ytt`) and `CARTO_YTT_TIMEOUT_SECS` (default 4).
    pub fn from_env() -> Self {
        Self::new(ytt_path(), ytt_timeout())
    }

    pub fn args(context: &Json) -> Result<Vec<String>, YttError> {
        let map = context.as_object().ok_or_else(|| YttError::Context("context is not an object".into()))?;
        let mut args = vec!["-f".to_string(), "-".to_string()];
        for (key, value) in map {
            args.push("--data-value-yaml".to_string());
            args.push(format!("{key}={value}"));
        }
        Ok(args)
    }

    pub async fn render(&self, template: &str, context: &Json) -> Result<Json, YttError> {
        let args = Self::args(context)?;
        debug!(binary = %self.binary, args = ?args, "ytt call");

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(template.as_bytes()).await?;
        }

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(res) => res?,
            Err(_) => return Err(YttError::Timeout(self.timeout)),
        };
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let msg = if stderr.is_empty() { output.status.to_string() } else { stderr };
            return Err(YttError::Failed(msg));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        debug!(output = %stdout, "ytt result");
        Ok(serde_yaml::from_str::<Json>(&stdout)?)
    }
}
