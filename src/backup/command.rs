//! External programs the backup delegates to (`wp`, `rsync`).
//!
//! Orchestrators build a [`ToolCommand`] and hand it to a [`ToolRunner`];
//! the system runner blocks until the program exits and captures its output.

use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::AddMsg;
use itertools::Itertools;
use std::fmt::{Display, Formatter};
use std::process::{Command, Stdio};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ToolCommand {
    pub fn new<S: Into<String>>(program: S) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I: IntoIterator<Item = S>, S: Into<String>>(mut self, args: I) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl Display for ToolCommand {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.contains(char::is_whitespace) {
                write!(f, " {:?}", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success() -> Self {
        Self {
            code: Some(0),
            ..Default::default()
        }
    }

    pub fn failure(code: i32, stderr: &str) -> Self {
        Self {
            code: Some(code),
            stderr: stderr.to_string(),
            ..Default::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }

    /// Turns a non-zero exit into [`Error::ToolFailure`].
    pub fn check(self, cmd: &ToolCommand) -> Result<ToolOutput> {
        if self.is_success() {
            return Ok(self);
        }
        let status = match self.code {
            Some(code) => format!("exit code {code}"),
            None => "no exit code (killed by signal)".to_string(),
        };
        let stderr = match self.stderr.trim() {
            "" => self.stdout.lines().rev().take(5).collect_vec().into_iter().rev().join("\n"),
            s => s.to_string(),
        };
        Err(Error::tool_failure(cmd.to_string(), status, stderr))
    }
}

pub trait ToolRunner {
    fn run(&self, cmd: &ToolCommand) -> Result<ToolOutput>;
}

/// Runs commands as child processes of this one.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemToolRunner;

impl ToolRunner for SystemToolRunner {
    fn run(&self, cmd: &ToolCommand) -> Result<ToolOutput> {
        tracing::debug!("Running {}", cmd);
        let output = Command::new(&cmd.program)
            .args(&cmd.args)
            .stdin(Stdio::null())
            .output()
            .map_err(Error::from)
            .add_msg(format!("Failed to start {:?}", cmd.program))?;

        let out = ToolOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        tracing::trace!("{} finished with {:?}", cmd.program, out.code);
        Ok(out)
    }
}
