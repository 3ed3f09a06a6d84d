use std::path::Path;
use tracing::{info, warn};

use crate::models::tool::ToolOutput;

/// Create or overwrite `path` with `content`. `display` is the path as the
/// model wrote it, which is what gets echoed back.
pub async fn write_file(path: &Path, display: &str, content: &str) -> ToolOutput {
    match tokio::fs::write(path, content).await {
        Ok(()) => {
            info!(path = %path.display(), bytes = content.len(), "wrote file");
            ToolOutput::success(format!("File written successfully to {}", display))
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to write file");
            ToolOutput::error(format!("Failed to write file - {}", e))
        }
    }
}

/// Read the whole of `path` as UTF-8 text
pub async fn read_file(path: &Path) -> ToolOutput {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => {
            info!(path = %path.display(), bytes = content.len(), "read file");
            ToolOutput::success(format!("File content:\n{}", content))
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read file");
            ToolOutput::error(format!("Failed to read file - {}", e))
        }
    }
}
