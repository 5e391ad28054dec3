//! TSX → CommonJS transformation.
//!
//! The default transformer is an `esbuild` child process fed over stdin. The trait
//! seam lets tests and embedders swap in something cheaper.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Default upper bound on one transform.
pub const DEFAULT_TRANSFORM_TIMEOUT: Duration = Duration::from_secs(30);

/// Failure inside a [`SourceTransform`].
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {secs} seconds")]
    TimedOut { program: String, secs: u64 },

    #[error("{}", failure_text(.program, .code, .stderr))]
    Failed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("transform output is not valid UTF-8")]
    InvalidOutput,

    #[error("transform I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Rejected(String),
}

fn failure_text(program: &str, code: &Option<i32>, stderr: &str) -> String {
    let stderr = stderr.trim();
    if !stderr.is_empty() {
        return stderr.to_string();
    }
    match code {
        Some(code) => format!("{program} exited with status {code}"),
        None => format!("{program} was terminated by a signal"),
    }
}

/// Turns widget TSX into CommonJS that uses `React.createElement`.
#[async_trait]
pub trait SourceTransform: Send + Sync + std::fmt::Debug {
    async fn transform(&self, code: &str) -> Result<String, TransformError>;

    /// Short label for logs.
    fn name(&self) -> &str;
}

/// Runs the `esbuild` CLI with the playground's transform options.
#[derive(Debug, Clone)]
pub struct EsbuildTransform {
    program: PathBuf,
    timeout: Duration,
}

impl Default for EsbuildTransform {
    fn default() -> Self {
        Self::new("esbuild")
    }
}

impl EsbuildTransform {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            timeout: DEFAULT_TRANSFORM_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &std::path::Path {
        &self.program
    }

    /// Arguments passed to esbuild; the source arrives on stdin.
    pub fn args() -> [&'static str; 8] {
        [
            "--loader=tsx",
            "--format=cjs",
            "--jsx=transform",
            "--jsx-factory=React.createElement",
            "--jsx-fragment=React.Fragment",
            "--target=es2020",
            "--sourcemap=inline",
            "--sourcefile=widget.tsx",
        ]
    }
}

#[async_trait]
impl SourceTransform for EsbuildTransform {
    async fn transform(&self, code: &str) -> Result<String, TransformError> {
        let program = self.program.display().to_string();

        let mut child = Command::new(&self.program)
            .args(Self::args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| TransformError::Spawn {
                program: program.clone(),
                source,
            })?;

        let mut stdin = child.stdin.take().ok_or_else(|| {
            TransformError::Io(std::io::Error::other("child stdin was not captured"))
        })?;
        let input = code.as_bytes().to_vec();
        let feed = async move {
            let result = stdin.write_all(&input).await;
            drop(stdin);
            result
        };

        let (fed, output) = tokio::time::timeout(self.timeout, async {
            tokio::join!(feed, child.wait_with_output())
        })
        .await
        .map_err(|_| TransformError::TimedOut {
            program: program.clone(),
            secs: self.timeout.as_secs(),
        })?;
        let output = output?;

        if !output.status.success() {
            return Err(TransformError::Failed {
                program,
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        // A broken pipe only matters if esbuild also failed.
        fed.ok();

        String::from_utf8(output.stdout).map_err(|_| TransformError::InvalidOutput)
    }

    fn name(&self) -> &str {
        "esbuild"
    }
}

/// Returns the input untouched. For sources that are already CommonJS.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughTransform;

#[async_trait]
impl SourceTransform for PassthroughTransform {
    async fn transform(&self, code: &str) -> Result<String, TransformError> {
        Ok(code.to_string())
    }

    fn name(&self) -> &str {
        "passthrough"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_passthrough_returns_input() {
        let out = PassthroughTransform
            .transform("module.exports = 1;")
            .await
            .unwrap();
        assert_eq!(out, "module.exports = 1;");
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let transform = EsbuildTransform::new("widgetlab-no-such-esbuild-binary");
        let err = transform.transform("export default 1").await.unwrap_err();
        assert!(matches!(err, TransformError::Spawn { .. }), "{err:?}");
        assert!(err.to_string().contains("widgetlab-no-such-esbuild-binary"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_without_stderr() {
        let transform = EsbuildTransform::new("false");
        let err = transform.transform("x").await.unwrap_err();
        assert_eq!(err.to_string(), "false exited with status 1");
    }

    #[test]
    fn test_failed_prefers_stderr() {
        let err = TransformError::Failed {
            program: "esbuild".into(),
            code: Some(1),
            stderr: "  widget.tsx:1:6: ERROR: Expected \";\"\n".into(),
        };
        assert_eq!(err.to_string(), "widget.tsx:1:6: ERROR: Expected \";\"");
    }

    #[test]
    fn test_esbuild_args_use_react_factory() {
        let args = EsbuildTransform::args();
        assert!(args.contains(&"--format=cjs"));
        assert!(args.contains(&"--jsx-factory=React.createElement"));
        assert!(args.contains(&"--jsx-fragment=React.Fragment"));
    }
}
