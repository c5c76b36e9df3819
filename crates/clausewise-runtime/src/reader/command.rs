//! External converter / OCR commands as extraction tools.

use async_trait::async_trait;
use std::io::ErrorKind as IoErrorKind;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use clausewise_core::{sniff_kind, DocumentKind};

use super::tools::ExtractionTool;
use super::ReaderError;
use crate::config::CommandSpec;

/// Runs a command with the document on stdin and reads text from stdout.
#[derive(Debug, Clone)]
pub struct CommandTool {
    name: String,
    spec: CommandSpec,
    accepts: Vec<DocumentKind>,
    timeout: Duration,
}

impl CommandTool {
    pub fn new(name: impl Into<String>, spec: CommandSpec, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            spec,
            accepts: Vec::new(),
            timeout,
        }
    }

    /// Restrict the tool to these document kinds; others are reported as
    /// unsupported without running the command.
    pub fn accepting(mut self, kinds: &[DocumentKind]) -> Self {
        self.accepts = kinds.to_vec();
        self
    }

    fn args(&self, attempt: u32) -> Vec<&str> {
        let mut args: Vec<&str> = self.spec.args.iter().map(String::as_str).collect();
        if attempt > 0 {
            args.extend(self.spec.retry_args.iter().map(String::as_str));
        }
        args
    }
}

#[async_trait]
impl ExtractionTool for CommandTool {
    fn name(&self) -> &str {
        &self.name
    }

    async fn extract(
        &self,
        bytes: &[u8],
        hint: Option<&str>,
        attempt: u32,
    ) -> Result<String, ReaderError> {
        let kind = sniff_kind(bytes, hint);
        if !self.accepts.is_empty() && !self.accepts.contains(&kind) {
            return Err(ReaderError::UnsupportedFormat(format!(
                "{} does not handle {} documents",
                self.name, kind
            )));
        }

        let args = self.args(attempt);
        tracing::debug!(tool = %self.name, program = %self.spec.program, ?args, attempt, "Running extraction command");

        let mut child = Command::new(&self.spec.program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                IoErrorKind::NotFound => ReaderError::ExtractionFailed(format!(
                    "{} is not installed",
                    self.spec.program
                )),
                _ => ReaderError::ExtractionFailed(format!(
                    "failed to start {}: {}",
                    self.spec.program, e
                )),
            })?;

        // stdin must be written while stdout is drained
        if let Some(mut stdin) = child.stdin.take() {
            let input = bytes.to_vec();
            let program = self.spec.program.clone();
            tokio::spawn(async move {
                let written = match stdin.write_all(&input).await {
                    Ok(()) => stdin.shutdown().await,
                    Err(e) => Err(e),
                };
                if let Err(e) = written {
                    tracing::debug!(program = %program, error = %e, "Could not feed document to stdin");
                }
            });
        }

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(ReaderError::ExtractionFailed(format!(
                    "{} failed: {}",
                    self.spec.program, e
                )))
            }
            Err(_) => return Err(ReaderError::Timeout(self.timeout)),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let first_line = stderr.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
            return Err(ReaderError::ExtractionFailed(format!(
                "{} exited with {}: {}",
                self.spec.program,
                output.status,
                first_line.trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        if text.trim().is_empty() {
            return Err(ReaderError::ExtractionFailed(format!(
                "{} produced no text",
                self.spec.program
            )));
        }
        Ok(text)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn tool(program: &str, args: &[&str]) -> CommandTool {
        CommandTool::new("test", CommandSpec::new(program, args), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_stdin_round_trip() {
        let text = tool("cat", &[]).extract(b"Clause text", None, 0).await.unwrap();
        assert_eq!(text, "Clause text");
    }

    #[tokio::test]
    async fn test_retry_args_only_on_retry() {
        let echo = CommandTool::new(
            "test",
            CommandSpec::new("echo", &["base"]).with_retry_args(&["retry"]),
            Duration::from_secs(5),
        );
        assert_eq!(echo.extract(b"", None, 0).await.unwrap().trim(), "base");
        assert_eq!(echo.extract(b"", None, 1).await.unwrap().trim(), "base retry");
    }

    #[tokio::test]
    async fn test_program_closing_stdin_early_still_reports_output() {
        let input = vec![b'x'; 1 << 20];
        let text = tool("sh", &["-c", "exec 0<&-; echo done"])
            .extract(&input, None, 0)
            .await
            .unwrap();
        assert_eq!(text.trim(), "done");
    }

    #[tokio::test]
    async fn test_missing_program() {
        let err = tool("clausewise-no-such-program", &[])
            .extract(b"x", None, 0)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ReaderError::ExtractionFailed("clausewise-no-such-program is not installed".into())
        );
    }

    #[tokio::test]
    async fn test_nonzero_exit() {
        let err = tool("sh", &["-c", "echo broken >&2; exit 3"])
            .extract(b"x", None, 0)
            .await
            .unwrap_err();
        match err {
            ReaderError::ExtractionFailed(message) => assert!(message.contains("broken")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_timeout() {
        let slow = CommandTool::new(
            "test",
            CommandSpec::new("sleep", &["5"]),
            Duration::from_millis(50),
        );
        let err = slow.extract(b"", None, 0).await.unwrap_err();
        assert_eq!(err, ReaderError::Timeout(Duration::from_millis(50)));
    }

    #[tokio::test]
    async fn test_rejects_other_kinds() {
        let docx_only = tool("cat", &[]).accepting(&[DocumentKind::Docx]);
        let err = docx_only.extract(b"%PDF-1.4", None, 0).await.unwrap_err();
        assert!(matches!(err, ReaderError::UnsupportedFormat(_)));
    }
}
