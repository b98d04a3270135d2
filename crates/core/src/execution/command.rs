//! Process invocation
//!
//! Every external program a target runs goes through a [`CommandRunner`], so
//! actions never touch `std::process` directly. [`ProcessCommandRunner`] spawns
//! real processes; [`RecordingRunner`] records invocations and answers with
//! canned output.

use std::cell::RefCell;
use std::fmt;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use tracing::debug;

use crate::types::ActionError;

/// Lines of output kept in failure diagnostics
pub const FAILURE_OUTPUT_LINES: usize = 40;

/// A single external program invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
        }
    }

    /// Run `script` through `sh -c`
    pub fn shell(script: impl Into<String>) -> Self {
        Self::new("sh").arg("-c").arg(script)
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " '{}'", arg.replace('\'', "'\\''"))?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Captured result of a finished process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn succeeded(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            success: true,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Last `lines` lines of stdout followed by stderr
    pub fn tail(&self, lines: usize) -> String {
        let combined: Vec<&str> = self
            .stdout
            .lines()
            .chain(self.stderr.lines())
            .collect();
        let start = combined.len().saturating_sub(lines);
        combined[start..].join("\n")
    }

    /// Turn a non-zero exit into [`ActionError::CommandFailed`]
    pub fn check(self, invocation: &Invocation) -> Result<CommandOutput, ActionError> {
        if self.success {
            Ok(self)
        } else {
            Err(ActionError::CommandFailed {
                command: invocation.to_string(),
                code: self.code,
                output: self.tail(FAILURE_OUTPUT_LINES),
            })
        }
    }
}

/// Capability to run external programs.
///
/// Implementations return `Err` only when the program could not be started;
/// a non-zero exit is reported through [`CommandOutput::success`].
pub trait CommandRunner {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput, ActionError>;
}

/// Runs invocations as blocking child processes with captured output
#[derive(Debug, Default, Clone)]
pub struct ProcessCommandRunner {
    env: Vec<(String, String)>,
}

impl ProcessCommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Environment variable added to every invocation
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

impl CommandRunner for ProcessCommandRunner {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput, ActionError> {
        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdin(Stdio::null())
            .envs(self.env.iter().map(|(k, v)| (k, v)))
            .envs(invocation.env.iter().map(|(k, v)| (k, v)));
        if let Some(dir) = &invocation.cwd {
            command.current_dir(dir);
        }

        debug!(command = %invocation, cwd = ?invocation.cwd, "running");

        let output = command.output().map_err(|source| ActionError::Spawn {
            command: invocation.to_string(),
            source,
        })?;

        let result = CommandOutput {
            code: output.status.code(),
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        for line in result.stdout.lines() {
            debug!(target: "kiln_core::output", "{}", line);
        }
        for line in result.stderr.lines() {
            debug!(target: "kiln_core::output", "{}", line);
        }

        Ok(result)
    }
}

/// Runner that records every invocation instead of spawning it. Invocations
/// whose rendered command line contains a registered pattern get the canned
/// output; everything else succeeds with empty output.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    invocations: RefCell<Vec<Invocation>>,
    responses: Vec<(String, CommandOutput)>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, pattern: impl Into<String>, output: CommandOutput) -> Self {
        self.responses.push((pattern.into(), output));
        self
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.borrow().clone()
    }

    /// Rendered command lines, in invocation order
    pub fn commands(&self) -> Vec<String> {
        self.invocations
            .borrow()
            .iter()
            .map(ToString::to_string)
            .collect()
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput, ActionError> {
        self.invocations.borrow_mut().push(invocation.clone());
        let rendered = invocation.to_string();
        let output = self
            .responses
            .iter()
            .find(|(pattern, _)| rendered.contains(pattern.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or_else(|| CommandOutput::succeeded(""));
        Ok(output)
    }
}
