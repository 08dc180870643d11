//! `execute_command`: run one shell command and report its exit code and output.
//! A non-zero exit flags the result as an error but the full output is still returned.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::exec::run_shell;
use crate::tools::{ToolDefinition, ToolExecutor, ToolInput, ToolOutput};

pub struct ShellTool {
    /// Directory commands run in when no working_directory is given; relative
    /// working directories are resolved against it.
    default_dir: Option<PathBuf>,
}

impl ShellTool {
    pub fn new(default_dir: Option<PathBuf>) -> Self {
        Self { default_dir }
    }

    fn working_dir(&self, requested: Option<&str>) -> Option<PathBuf> {
        match (requested.map(Path::new), &self.default_dir) {
            (Some(p), Some(base)) if p.is_relative() => Some(base.join(p)),
            (Some(p), _) => Some(p.to_path_buf()),
            (None, base) => base.clone(),
        }
    }
}

#[async_trait]
impl ToolExecutor for ShellTool {
    fn definitions(&self) -> Vec<ToolDefinition> {
        vec![ToolDefinition::new(
            "execute_command",
            "Execute a shell command and return its output. Use with caution.",
        )
        .param("command", "string", "The shell command to execute", true)
        .param(
            "working_directory",
            "string",
            "Optional working directory for the command",
            false,
        )]
    }

    async fn execute(&self, name: &str, input: &ToolInput) -> ToolOutput {
        if name != "execute_command" {
            return ToolOutput::error(format!("Unknown tool: {}", name));
        }
        let Some(command) = input.str("command") else {
            return ToolOutput::error("Missing 'command' parameter");
        };
        let requested_dir = input.str("working_directory");
        let dir = self.working_dir(requested_dir);
        let outcome = run_shell(command, dir.as_deref()).await;

        let mut out = String::new();
        let _ = writeln!(out, "Command: {}", command);
        if let Some(d) = requested_dir {
            let _ = writeln!(out, "Working directory: {}", d);
        }
        let _ = writeln!(out, "Exit code: {}", outcome.exit_code);
        out.push('\n');
        out.push_str("Output:\n");
        out.push_str(&outcome.output);
        ToolOutput {
            output: out,
            is_error: !outcome.success(),
        }
    }
}
