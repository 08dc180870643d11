//! Subprocess execution for the shell tool.
//! Commands run through the platform shell with stdout and stderr captured; the caller waits
//! on the child without blocking a runtime worker.

use std::path::Path;

use tokio::process::Command;

/// Combined output and exit code of one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    /// stdout followed by stderr.
    pub output: String,
    /// Process exit code; -1 when the process could not be started or was killed by a signal.
    pub exit_code: i32,
}

impl CommandOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

fn shell_command(command: &str) -> Command {
    if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(command);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(command);
        c
    }
}

/// Run `command` in the platform shell, optionally in `working_dir`. Never fails: a spawn
/// error is reported as output with exit code -1.
pub async fn run_shell(command: &str, working_dir: Option<&Path>) -> CommandOutcome {
    let mut cmd = shell_command(command);
    if let Some(dir) = working_dir {
        cmd.current_dir(dir);
    }
    cmd.stdin(std::process::Stdio::null());
    let output = match cmd.output().await {
        Ok(o) => o,
        Err(e) => {
            return CommandOutcome {
                output: format!("Failed to execute command: {}", e),
                exit_code: -1,
            }
        }
    };
    let mut msg = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.is_empty() {
        if !msg.is_empty() && !msg.ends_with('\n') {
            msg.push('\n');
        }
        msg.push_str(&stderr);
    }
    CommandOutcome {
        output: msg,
        exit_code: output.status.code().unwrap_or(-1),
    }
}
