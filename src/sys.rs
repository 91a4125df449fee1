use std::path::Path;
use std::process::{Command, Output};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// One log line for an invocation: command, exit code, then stderr if
    /// there is any, otherwise stdout.
    fn log_line(&self, program: &Path, args: &[String]) -> String {
        let mut line = format!("{} {}", program.display(), args.join(" "));
        if let Some(code) = self.exit_code {
            line.push_str(&format!(" => exit {code}"));
        }
        let (label, text) = match (self.stderr.trim(), self.stdout.trim()) {
            ("", "") => return line,
            ("", out) => ("stdout", out),
            (err, _) => ("stderr", err),
        };
        line.push_str(&format!(" | {label}: {text}"));
        line
    }
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

/// Something that can run an external program to completion.
pub trait CommandRunner {
    fn run(&self, program: &Path, args: &[String]) -> Result<CommandOutput>;
}

/// Runs programs on the host with [`run_command`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &Path, args: &[String]) -> Result<CommandOutput> {
        run_command(program, args)
    }
}

/// Run `program` to completion without a console window and capture its output.
pub fn run_command(program: &Path, args: &[String]) -> Result<CommandOutput> {
    let mut cmd = Command::new(program);
    cmd.args(args);
    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        use windows_sys::Win32::System::Threading::CREATE_NO_WINDOW;

        cmd.creation_flags(CREATE_NO_WINDOW);
    }

    let output: CommandOutput = cmd
        .output()
        .map_err(|e| AppError::Message(format!("Failed to run {}: {e}", program.display())))?
        .into();
    info!("{}", output.log_line(program, args));
    Ok(output)
}
