use lazy_static::lazy_static;
use regex::Regex;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::models::tool::ToolOutput;

/// Default upper bound on how long a single command may run
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Default cap on captured output, per stream
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

/// Substrings in stderr that mark a run as failed even when it exited cleanly
pub const DEFAULT_ERROR_MARKERS: [&str; 6] = [
    "error",
    "failed",
    "cannot",
    "not found",
    "permission denied",
    "access denied",
];

lazy_static! {
    static ref POWERSHELL_SYNTAX: Regex = Regex::new(r"Set-Content|New-Item|Get-Content|@'").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Unix,
    Windows,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else {
            Platform::Unix
        }
    }

    /// Name shown to the model in the system instruction
    pub fn name(&self) -> &'static str {
        match self {
            Platform::Unix => std::env::consts::OS,
            Platform::Windows => "windows",
        }
    }
}

/// The program and arguments used to run a command string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellInvocation {
    pub program: String,
    pub args: Vec<String>,
}

/// Pick the shell for `command`. On windows, commands that use powershell
/// cmdlets, here-strings or pipes go through powershell instead of cmd.
pub fn shell_invocation(platform: Platform, command: &str) -> ShellInvocation {
    match platform {
        Platform::Windows if POWERSHELL_SYNTAX.is_match(command) || command.contains('|') => {
            ShellInvocation {
                program: "powershell.exe".to_string(),
                args: vec!["-Command".to_string(), command.to_string()],
            }
        }
        Platform::Windows => ShellInvocation {
            program: "cmd".to_string(),
            args: vec!["/C".to_string(), command.to_string()],
        },
        Platform::Unix => ShellInvocation {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), command.to_string()],
        },
    }
}

/// What a finished command left behind
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
}

/// Decides whether a finished command succeeded
pub trait OutputClassifier: Send + Sync {
    fn classify(&self, command: &str, output: &CommandOutput) -> ToolOutput;
}

/// Trusts the exit status first, then scans stderr for error markers.
///
/// Plenty of tools write progress to stderr, so stderr alone is only treated
/// as a failure when it mentions one of the markers.
#[derive(Debug, Clone)]
pub struct DefaultClassifier {
    markers: Vec<String>,
}

impl Default for DefaultClassifier {
    fn default() -> Self {
        Self::with_markers(DEFAULT_ERROR_MARKERS)
    }
}

impl DefaultClassifier {
    pub fn with_markers<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            markers: markers
                .into_iter()
                .map(|m| m.as_ref().to_lowercase())
                .collect(),
        }
    }

    pub fn stderr_signals_error(&self, stderr: &str) -> bool {
        let stderr = stderr.to_lowercase();
        self.markers.iter().any(|marker| stderr.contains(marker))
    }
}

impl OutputClassifier for DefaultClassifier {
    fn classify(&self, command: &str, output: &CommandOutput) -> ToolOutput {
        match output.exit_code {
            // 127 from sh, 9009 from cmd
            Some(127) | Some(9009) => {
                return ToolOutput::error(format!(
                    "Command not found or path does not exist. Command: {}",
                    command
                ))
            }
            Some(126) => {
                return ToolOutput::error(format!("Permission denied. Command: {}", command))
            }
            Some(0) => {}
            Some(code) => {
                let detail = if output.stderr.trim().is_empty() {
                    output.stdout.trim()
                } else {
                    output.stderr.trim()
                };
                return ToolOutput::error(format!(
                    "Command failed with exit code {}: {}",
                    code, detail
                ));
            }
            None => {
                return ToolOutput::error(format!(
                    "Command was terminated by a signal. Command: {}",
                    command
                ))
            }
        }

        if !output.stderr.is_empty() && self.stderr_signals_error(&output.stderr) {
            return ToolOutput::error(output.stderr.clone());
        }

        let stdout = if output.stdout.is_empty() {
            "Command executed successfully"
        } else {
            output.stdout.as_str()
        };
        if output.stderr.is_empty() {
            ToolOutput::success(stdout)
        } else {
            ToolOutput::success(format!("{} (Note: {})", stdout, output.stderr))
        }
    }
}

#[derive(Debug, Clone)]
pub struct ShellConfig {
    pub timeout: Duration,
    pub max_output_bytes: usize,
    pub platform: Platform,
    pub working_dir: Option<PathBuf>,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            platform: Platform::current(),
            working_dir: None,
        }
    }
}

/// Runs command strings through the host shell with a time and output budget
pub struct ShellExecutor {
    config: ShellConfig,
    classifier: Box<dyn OutputClassifier>,
}

impl ShellExecutor {
    pub fn new(config: ShellConfig) -> Self {
        Self {
            config,
            classifier: Box::new(DefaultClassifier::default()),
        }
    }

    pub fn with_classifier(mut self, classifier: Box<dyn OutputClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn config(&self) -> &ShellConfig {
        &self.config
    }

    /// Run `command` and classify the result. Never fails: every problem is
    /// turned into an `Error:` output.
    pub async fn execute(&self, command: &str) -> ToolOutput {
        let invocation = shell_invocation(self.config.platform, command);
        info!(command, program = %invocation.program, "executing command");

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.config.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(command, error = %e, "failed to spawn command");
                return spawn_error(command, &e);
            }
        };

        let limit = self.config.max_output_bytes;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let collect = async {
            // the first stream to pass the cap ends collection for both
            let (out, err) =
                tokio::try_join!(read_capped(stdout, limit), read_capped(stderr, limit))?;
            let status = child.wait().await.map_err(CaptureError::Io)?;
            Ok::<_, CaptureError>((out, err, status))
        };

        let collected = tokio::time::timeout(self.config.timeout, collect).await;
        let (stdout, stderr, status) = match collected {
            Ok(Ok(collected)) => collected,
            Ok(Err(CaptureError::Overflow)) => {
                warn!(command, limit, "command output exceeded limit");
                let _ = child.start_kill();
                return ToolOutput::error(format!(
                    "Command output exceeded {} bytes. Command: {}",
                    limit, command
                ));
            }
            Ok(Err(CaptureError::Io(e))) => {
                warn!(command, error = %e, "failed while waiting for command");
                let _ = child.start_kill();
                return ToolOutput::error(format!("Failed to execute command - {}", e));
            }
            Err(_) => {
                warn!(command, timeout = ?self.config.timeout, "command timed out");
                let _ = child.start_kill();
                return ToolOutput::error(format!("Command timed out. Command: {}", command));
            }
        };

        let output = CommandOutput {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            exit_code: status.code(),
        };
        debug!(
            exit_code = ?output.exit_code,
            stdout = %output.stdout,
            stderr = %output.stderr,
            "command finished"
        );
        self.classifier.classify(command, &output)
    }
}

fn spawn_error(command: &str, error: &io::Error) -> ToolOutput {
    match error.kind() {
        io::ErrorKind::NotFound => ToolOutput::error(format!(
            "Command not found or path does not exist. Command: {}",
            command
        )),
        io::ErrorKind::PermissionDenied => {
            ToolOutput::error(format!("Permission denied. Command: {}", command))
        }
        _ => ToolOutput::error(format!("Failed to execute command - {}", error)),
    }
}

enum CaptureError {
    /// More than the allowed number of bytes arrived on one stream
    Overflow,
    Io(io::Error),
}

/// Read `reader` to the end, giving up as soon as it yields more than
/// `limit` bytes.
async fn read_capped<R: AsyncRead + Unpin>(
    reader: Option<R>,
    limit: usize,
) -> Result<Vec<u8>, CaptureError> {
    let Some(mut reader) = reader else {
        return Ok(Vec::new());
    };
    let mut kept = Vec::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = reader.read(&mut buf).await.map_err(CaptureError::Io)?;
        if n == 0 {
            return Ok(kept);
        }
        if n > limit.saturating_sub(kept.len()) {
            return Err(CaptureError::Overflow);
        }
        kept.extend_from_slice(&buf[..n]);
    }
}
