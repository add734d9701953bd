//! Document formatting through an external formatter process

use std::path::PathBuf;
use std::process::Stdio;

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

const CLANG_FORMAT: &str = "clang-format";

/// Placeholder in formatter arguments replaced by the document's file name.
const FILE_PLACEHOLDER: &str = "{file}";

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: PathBuf,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("{program} produced invalid UTF-8")]
    InvalidOutput { program: PathBuf },
}

/// A command that reads a proto file on stdin and writes it formatted to stdout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Formatter {
    program: PathBuf,
    args: Vec<String>,
}

impl Formatter {
    /// `clang-format`, from `PATH` unless `program` is given.
    pub fn clang_format(program: Option<PathBuf>) -> Self {
        Self {
            program: program.unwrap_or_else(|| PathBuf::from(CLANG_FORMAT)),
            args: vec![format!("--assume-filename={FILE_PLACEHOLDER}")],
        }
    }

    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub async fn format(&self, file_name: &str, text: &str) -> Result<String, FormatError> {
        let args = self
            .args
            .iter()
            .map(|arg| arg.replace(FILE_PLACEHOLDER, file_name));
        let spawn_error = |source| FormatError::Spawn {
            program: self.program.clone(),
            source,
        };

        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_error)?;

        // Feed stdin while collecting output so a large file cannot fill both pipes.
        let stdin = child.stdin.take();
        let write = async move {
            match stdin {
                Some(mut stdin) => stdin.write_all(text.as_bytes()).await,
                None => Ok(()),
            }
        };
        let (written, output) = tokio::join!(write, child.wait_with_output());
        if let Err(err) = written {
            // the exit status below says what went wrong
            debug!(program = ?self.program, error = %err, "formatter closed stdin early");
        }
        let output = output.map_err(spawn_error)?;

        if !output.status.success() {
            return Err(FormatError::Failed {
                program: self.program.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        String::from_utf8(output.stdout).map_err(|_| FormatError::InvalidOutput {
            program: self.program.clone(),
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Formatter {
        Formatter::new("sh", vec!["-c".to_string(), script.to_string()])
    }

    #[test]
    fn clang_format_passes_file_name_placeholder() {
        let formatter = Formatter::clang_format(None);
        assert_eq!(
            formatter,
            Formatter::new("clang-format", vec!["--assume-filename={file}".to_string()])
        );
    }

    #[tokio::test]
    async fn format_pipes_text_through_program() {
        let formatted = sh("tr a-z A-Z")
            .format("a.proto", "message a {}\n")
            .await
            .unwrap();
        assert_eq!(formatted, "MESSAGE A {}\n");
    }

    #[tokio::test]
    async fn format_substitutes_file_name() {
        let formatted = sh("cat >/dev/null; echo {file}")
            .format("api.proto", "")
            .await
            .unwrap();
        assert_eq!(formatted, "api.proto\n");
    }

    #[tokio::test]
    async fn format_reports_failing_program() {
        let err = sh("echo broken >&2; exit 3")
            .format("a.proto", "message A {}")
            .await
            .unwrap_err();
        let FormatError::Failed { stderr, status, .. } = err else {
            panic!("expected a failure, got {err:?}");
        };
        assert_eq!(stderr, "broken");
        assert_eq!(status.code(), Some(3));
    }

    #[tokio::test]
    async fn format_reports_missing_program() {
        let err = Formatter::new("/nonexistent/clang-format", Vec::new())
            .format("a.proto", "")
            .await
            .unwrap_err();
        assert!(matches!(err, FormatError::Spawn { .. }));
    }
}
