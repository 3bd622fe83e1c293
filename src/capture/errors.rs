//! Error types for frame capture.

use std::path::PathBuf;

/// Errors that can occur while grabbing a frame from the live preview.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// No grab command configured
    #[error("no capture command configured")]
    EmptyCommand,

    /// The external tool is not installed
    #[error("'{program}' not found. Please install it (e.g. `sudo apt install scrot imagemagick`)")]
    ToolNotFound { program: String },

    /// The external tool ran but reported failure
    #[error("'{program}' exited with code {code:?}{}", format_stderr(.stderr))]
    ToolFailed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    /// The tool reported success but left no image behind
    #[error("capture produced no image at '{}'", .path.display())]
    NoOutput { path: PathBuf },

    #[error("I/O error during capture: {0}")]
    Io(#[from] std::io::Error),
}

fn format_stderr(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {}", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_not_found_mentions_program() {
        let err = CaptureError::ToolNotFound {
            program: "scrot".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("'scrot' not found"));
        assert!(msg.contains("apt install"));
    }

    #[test]
    fn test_tool_failed_includes_stderr() {
        let err = CaptureError::ToolFailed {
            program: "convert".to_string(),
            code: Some(1),
            stderr: "convert: unable to open image\n".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("'convert' exited with code Some(1)"));
        assert!(msg.contains("unable to open image"));
    }

    #[test]
    fn test_tool_failed_without_stderr() {
        let err = CaptureError::ToolFailed {
            program: "scrot".to_string(),
            code: None,
            stderr: "  ".to_string(),
        };
        assert_eq!(err.to_string(), "'scrot' exited with code None");
    }

    #[test]
    fn test_no_output_shows_path() {
        let err = CaptureError::NoOutput {
            path: PathBuf::from("/frames/Frame00001.jpg"),
        };
        assert!(err.to_string().contains("/frames/Frame00001.jpg"));
    }
}
