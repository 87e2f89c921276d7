//! Runtime abstraction for system operations.
//!
//! This module provides a trait-based abstraction over system operations,
//! enabling dependency injection and testability.
//!
//! # Structure
//!
//! - `path` - Path utility functions (normalize, absolutize)
//! - `env` - Working directory, config directory and privilege
//! - `fs` - File system operations (read, write, remove)
//! - `process` - Child process execution (installer invocations)

mod env;
mod fs;
pub mod path;
mod process;

use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

pub use path::absolutize;
pub use process::{CommandOutput, Invocation, exit_code_of};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Runtime: Send + Sync {
    // Environment
    fn current_dir(&self) -> Result<PathBuf>;

    // File System
    fn write(&self, path: &Path, contents: &[u8]) -> Result<()>;
    fn read_to_string(&self, path: &Path) -> Result<String>;
    fn remove_file(&self, path: &Path) -> Result<()>;
    fn exists(&self, path: &Path) -> bool;

    // Directories
    fn config_dir(&self) -> Option<PathBuf>;

    // Privilege
    fn is_privileged(&self) -> bool;

    // Processes
    /// Run a command with inherited stdio and wait for it to finish.
    /// Returns the exit code; a spawn failure is an error.
    async fn run(&self, invocation: &Invocation) -> Result<i32>;

    /// Run a command and capture its stdout and stderr.
    async fn output(&self, invocation: &Invocation) -> Result<CommandOutput>;
}

pub struct RealRuntime;

#[async_trait]
impl Runtime for RealRuntime {
    fn current_dir(&self) -> Result<PathBuf> {
        self.current_dir_impl()
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.write_impl(path, contents)
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        self.read_to_string_impl(path)
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        self.remove_file_impl(path)
    }

    fn exists(&self, path: &Path) -> bool {
        self.exists_impl(path)
    }

    fn config_dir(&self) -> Option<PathBuf> {
        self.config_dir_impl()
    }

    fn is_privileged(&self) -> bool {
        self.is_privileged_impl()
    }

    async fn run(&self, invocation: &Invocation) -> Result<i32> {
        self.run_impl(invocation).await
    }

    async fn output(&self, invocation: &Invocation) -> Result<CommandOutput> {
        self.output_impl(invocation).await
    }
}
