//! Child process execution.

use anyhow::{Context, Result};
use log::debug;
use std::fmt;
use std::process::{ExitStatus, Stdio};
use tokio::process::Command;

use super::RealRuntime;

/// A program and its arguments, ready to be spawned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
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
}

impl fmt::Display for Invocation {
    /// Shell-like rendering, quoting words that contain whitespace or quotes.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", quote(&self.program))?;
        for arg in &self.args {
            write!(f, " {}", quote(arg))?;
        }
        Ok(())
    }
}

fn quote(word: &str) -> String {
    if word.is_empty() {
        return "''".to_string();
    }
    if word
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '\'' | '"' | '<' | '>' | ';' | '|' | '&'))
    {
        format!("'{}'", word.replace('\'', r"'\''"))
    } else {
        word.to_string()
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Map an exit status to a process exit code.
///
/// A child terminated by a signal reports `128 + signal`, as shells do.
pub fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    1
}

impl RealRuntime {
    #[tracing::instrument(skip(self))]
    pub(crate) async fn run_impl(&self, invocation: &Invocation) -> Result<i32> {
        debug!("Running: {}", invocation);
        let status = Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .status()
            .await
            .with_context(|| format!("Failed to launch '{}'", invocation.program))?;

        let code = exit_code_of(status);
        debug!("'{}' exited with code {}", invocation, code);
        Ok(code)
    }

    #[tracing::instrument(skip(self))]
    pub(crate) async fn output_impl(&self, invocation: &Invocation) -> Result<CommandOutput> {
        debug!("Capturing: {}", invocation);
        let output = Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .output()
            .await
            .with_context(|| format!("Failed to launch '{}'", invocation.program))?;

        Ok(CommandOutput {
            code: exit_code_of(output.status),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
