use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{info, warn};

use crate::models::tool::ToolOutput;

/// How long to let a freshly spawned server settle before reporting back
pub const DEFAULT_SETTLE: Duration = Duration::from_secs(2);

/// One way of serving a directory over http
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchStrategy {
    pub label: String,
    pub program: String,
    pub args: Vec<String>,
    pub current_dir: Option<PathBuf>,
}

impl LaunchStrategy {
    pub fn new<L, P>(label: L, program: P, args: &[&str]) -> Self
    where
        L: Into<String>,
        P: Into<String>,
    {
        Self {
            label: label.into(),
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
            current_dir: None,
        }
    }

    pub fn in_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// The strategies tried for `project`, most preferred first
    pub fn defaults_for(project: &Path) -> Vec<LaunchStrategy> {
        let npx = if cfg!(windows) { "npx.cmd" } else { "npx" };
        let path = project.display().to_string();
        vec![
            LaunchStrategy::new(
                "live-server",
                npx,
                &["live-server", &path, "--port=3000", "--open"],
            ),
            LaunchStrategy::new("python http.server", "python", &["-m", "http.server", "8000"])
                .in_dir(project),
            LaunchStrategy::new("http-server", npx, &["http-server", &path, "-p", "8080", "-o"]),
            LaunchStrategy::new("python3 http.server", "python3", &["-m", "http.server", "8000"])
                .in_dir(project),
        ]
    }

    /// The server keeps no pipes to this process, so it outlives the session
    /// without dying on a broken pipe.
    fn spawn(&self) -> std::io::Result<Child> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }
        cmd.spawn()
    }
}

/// Starts a dev server by walking an ordered list of strategies.
///
/// The first strategy whose process spawns wins. Whether that server stays up
/// afterwards is not tracked: the child is handed to a background task that
/// only logs its exit.
#[derive(Debug, Clone)]
pub struct DevServerLauncher {
    settle: Duration,
}

impl Default for DevServerLauncher {
    fn default() -> Self {
        Self::new(DEFAULT_SETTLE)
    }
}

impl DevServerLauncher {
    pub fn new(settle: Duration) -> Self {
        Self { settle }
    }

    pub async fn launch(&self, project: &Path) -> ToolOutput {
        info!(project = %project.display(), "starting live server");
        self.launch_with(&LaunchStrategy::defaults_for(project)).await
    }

    pub async fn launch_with(&self, strategies: &[LaunchStrategy]) -> ToolOutput {
        for strategy in strategies {
            info!(strategy = %strategy.label, program = %strategy.program, "trying to start server");
            let mut child = match strategy.spawn() {
                Ok(child) => child,
                Err(e) => {
                    warn!(strategy = %strategy.label, error = %e, "failed to start server");
                    continue;
                }
            };

            tokio::time::sleep(self.settle).await;
            if let Ok(Some(status)) = child.try_wait() {
                warn!(strategy = %strategy.label, %status, "server process already exited");
            }
            detach(strategy.label.clone(), child);

            return ToolOutput::success(format!(
                "Live server started with {}! The website should open automatically in your browser. \
                 If not, check the console for the URL.",
                strategy.label
            ));
        }

        ToolOutput::error(
            "Could not start live server. Please install live-server globally with: npm install -g live-server",
        )
    }
}

fn detach(label: String, mut child: Child) {
    tokio::spawn(async move {
        match child.wait().await {
            Ok(status) => info!(server = %label, %status, "server exited"),
            Err(e) => warn!(server = %label, error = %e, "lost track of server"),
        }
    });
}
