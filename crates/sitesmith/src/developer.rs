mod dev_server;
mod files;
mod shell;

pub use dev_server::{DevServerLauncher, LaunchStrategy, DEFAULT_SETTLE};
pub use shell::{
    shell_invocation, CommandOutput, DefaultClassifier, OutputClassifier, Platform, ShellConfig,
    ShellExecutor, ShellInvocation, DEFAULT_ERROR_MARKERS, DEFAULT_MAX_OUTPUT_BYTES,
    DEFAULT_TIMEOUT,
};

use async_trait::async_trait;
use indoc::indoc;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{AgentError, AgentResult};
use crate::models::tool::{Tool, ToolCall, ToolOutput};
use crate::systems::System;

pub const EXECUTE_COMMAND: &str = "executeCommand";
pub const WRITE_FILE: &str = "writeFile";
pub const READ_FILE: &str = "readFile";
pub const START_LIVE_SERVER: &str = "startLiveServer";

#[derive(Debug, Clone)]
pub struct DeveloperConfig {
    /// Relative paths given by the model are resolved against this directory
    pub working_dir: PathBuf,
    pub shell: ShellConfig,
    pub server_settle: Duration,
}

impl Default for DeveloperConfig {
    fn default() -> Self {
        Self {
            working_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            shell: ShellConfig::default(),
            server_settle: DEFAULT_SETTLE,
        }
    }
}

/// The tools a model needs to build and preview a website: a shell, file
/// reads and writes, and a local static server.
pub struct WebDeveloperSystem {
    tools: Vec<Tool>,
    working_dir: PathBuf,
    shell: ShellExecutor,
    launcher: DevServerLauncher,
}

impl Default for WebDeveloperSystem {
    fn default() -> Self {
        Self::new(DeveloperConfig::default())
    }
}

impl WebDeveloperSystem {
    pub fn new(config: DeveloperConfig) -> Self {
        let mut shell_config = config.shell;
        if shell_config.working_dir.is_none() {
            shell_config.working_dir = Some(config.working_dir.clone());
        }
        Self {
            tools: tools(),
            working_dir: config.working_dir,
            shell: ShellExecutor::new(shell_config),
            launcher: DevServerLauncher::new(config.server_settle),
        }
    }

    pub fn with_classifier(mut self, classifier: Box<dyn OutputClassifier>) -> Self {
        self.shell = self.shell.with_classifier(classifier);
        self
    }

    pub fn platform(&self) -> Platform {
        self.shell.config().platform
    }

    fn resolve_path(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.working_dir.join(path)
        }
    }

    async fn execute_command(&self, tool_call: &ToolCall) -> AgentResult<ToolOutput> {
        let command = required(tool_call, "command")?;
        Ok(self.shell.execute(command).await)
    }

    async fn write_file(&self, tool_call: &ToolCall) -> AgentResult<ToolOutput> {
        let file_path = required(tool_call, "filePath")?;
        let content = required(tool_call, "content")?;
        Ok(files::write_file(&self.resolve_path(file_path), file_path, content).await)
    }

    async fn read_file(&self, tool_call: &ToolCall) -> AgentResult<ToolOutput> {
        let file_path = required(tool_call, "filePath")?;
        Ok(files::read_file(&self.resolve_path(file_path)).await)
    }

    async fn start_live_server(&self, tool_call: &ToolCall) -> AgentResult<ToolOutput> {
        let project_path = required(tool_call, "projectPath")?;
        Ok(self.launcher.launch(&self.resolve_path(project_path)).await)
    }
}

fn required<'a>(tool_call: &'a ToolCall, name: &str) -> AgentResult<&'a str> {
    tool_call.str_arg(name).ok_or_else(|| {
        AgentError::InvalidParameters(format!("Missing required parameter '{}'", name))
    })
}

fn tools() -> Vec<Tool> {
    let execute_command = Tool::new(
        EXECUTE_COMMAND,
        indoc! {"
            Execute a command in the terminal. Use it to create directories, install
            packages or run build steps. On windows, multi-line file content should be
            written with writeFile rather than through the shell.
        "},
        json!({
            "type": "object",
            "required": ["command"],
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The command to execute."
                }
            }
        }),
    );

    let write_file = Tool::new(
        WRITE_FILE,
        "Create a file, or overwrite an existing one, with the given content.",
        json!({
            "type": "object",
            "required": ["filePath", "content"],
            "properties": {
                "filePath": {
                    "type": "string",
                    "description": "Path of the file to write, absolute or relative to the working directory."
                },
                "content": {
                    "type": "string",
                    "description": "The full content of the file."
                }
            }
        }),
    );

    let read_file = Tool::new(
        READ_FILE,
        "Read the content of a file.",
        json!({
            "type": "object",
            "required": ["filePath"],
            "properties": {
                "filePath": {
                    "type": "string",
                    "description": "Path of the file to read."
                }
            }
        }),
    );

    let start_live_server = Tool::new(
        START_LIVE_SERVER,
        indoc! {"
            Start a local development server for a website project and open it in the
            browser. Call this once the site's files are in place.
        "},
        json!({
            "type": "object",
            "required": ["projectPath"],
            "properties": {
                "projectPath": {
                    "type": "string",
                    "description": "Path of the directory containing index.html."
                }
            }
        }),
    );

    vec![execute_command, write_file, read_file, start_live_server]
}

#[async_trait]
impl System for WebDeveloperSystem {
    fn name(&self) -> &str {
        "WebDeveloperSystem"
    }

    fn description(&self) -> &str {
        "Builds websites with a shell, file access and a local preview server"
    }

    fn instructions(&self) -> &str {
        indoc! {"
            Create every file of the website with writeFile, then preview it with
            startLiveServer. Use executeCommand for directories and tooling. Every tool
            result starts with `Success:` or `Error:`; when a call fails, read the error
            and try a different approach.
        "}
    }

    fn tools(&self) -> &[Tool] {
        &self.tools
    }

    async fn call(&self, tool_call: ToolCall) -> ToolOutput {
        let result = match tool_call.name.as_str() {
            EXECUTE_COMMAND => self.execute_command(&tool_call).await,
            WRITE_FILE => self.write_file(&tool_call).await,
            READ_FILE => self.read_file(&tool_call).await,
            START_LIVE_SERVER => self.start_live_server(&tool_call).await,
            _ => Err(AgentError::ToolNotFound(tool_call.name.clone())),
        };
        result.unwrap_or_else(ToolOutput::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn system_in(dir: &TempDir) -> WebDeveloperSystem {
        WebDeveloperSystem::new(DeveloperConfig {
            working_dir: dir.path().to_path_buf(),
            shell: ShellConfig::default(),
            server_settle: Duration::ZERO,
        })
    }

    #[test]
    fn test_tool_specs() {
        let system = WebDeveloperSystem::default();
        let names: Vec<_> = system.tools().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["executeCommand", "writeFile", "readFile", "startLiveServer"]);

        let write = &system.tools()[1];
        assert_eq!(write.required_parameters(), vec!["filePath", "content"]);
    }

    #[tokio::test]
    async fn test_relative_paths_resolve_against_working_dir() {
        let dir = TempDir::new().unwrap();
        let system = system_in(&dir);

        let written = system
            .call(ToolCall::new(
                WRITE_FILE,
                json!({"filePath": "index.html", "content": "<h1>hi</h1>"}),
            ))
            .await;
        assert_eq!(
            written.to_string(),
            "Success: File written successfully to index.html"
        );
        assert_eq!(
            std::fs::read_to_string(dir.path().join("index.html")).unwrap(),
            "<h1>hi</h1>"
        );

        let read = system
            .call(ToolCall::new(READ_FILE, json!({"filePath": "index.html"})))
            .await;
        assert_eq!(read.to_string(), "Success: File content:\n<h1>hi</h1>");
    }

    #[tokio::test]
    async fn test_missing_parameter() {
        let system = WebDeveloperSystem::default();
        let output = system
            .call(ToolCall::new(WRITE_FILE, json!({"filePath": "a.txt"})))
            .await;
        assert_eq!(
            output.to_string(),
            "Error: Invalid parameters: Missing required parameter 'content'"
        );

        let output = system.call(ToolCall::new(EXECUTE_COMMAND, json!({}))).await;
        assert_eq!(
            output.to_string(),
            "Error: Invalid parameters: Missing required parameter 'command'"
        );
    }

    #[tokio::test]
    async fn test_non_string_parameter_is_missing() {
        let system = WebDeveloperSystem::default();
        let output = system
            .call(ToolCall::new(READ_FILE, json!({"filePath": 42})))
            .await;
        assert!(output.is_error());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_commands_run_in_working_dir() {
        let dir = TempDir::new().unwrap();
        let system = system_in(&dir);
        let output = system
            .call(ToolCall::new(
                EXECUTE_COMMAND,
                json!({"command": "mkdir site && ls"}),
            ))
            .await;
        assert_eq!(output.to_string(), "Success: site\n");
        assert!(dir.path().join("site").is_dir());
    }

    #[tokio::test]
    async fn test_unknown_tool_is_error_output() {
        let system = WebDeveloperSystem::default();
        let output = system.call(ToolCall::new("deploy", json!({}))).await;
        assert_eq!(output.to_string(), "Error: Tool not found: deploy");
    }
}
