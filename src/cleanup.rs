use log::debug;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

/// Exit code used when the run is interrupted with Ctrl-C.
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Tracks generated files that must not outlive an interrupted run
#[derive(Default)]
pub struct CleanupContext {
    #[cfg(test)]
    pub paths: Vec<PathBuf>,
    #[cfg(not(test))]
    paths: Vec<PathBuf>,
}

impl CleanupContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, path: PathBuf) {
        self.paths.push(path);
    }

    /// Stop tracking a path (e.g., after it was removed normally)
    pub fn remove(&mut self, path: &Path) {
        self.paths.retain(|p| p != path);
    }

    /// Remove all tracked files, ignoring errors
    pub fn cleanup(&self) {
        for path in &self.paths {
            debug!("Cleaning up: {:?}", path);
            let _ = std::fs::remove_file(path);
        }
    }
}

pub type SharedCleanupContext = Arc<Mutex<CleanupContext>>;

pub fn new_shared() -> SharedCleanupContext {
    Arc::new(Mutex::new(CleanupContext::new()))
}

/// Spawn a task that cleans up `ctx` and exits with 130 on Ctrl-C.
/// Abort the returned handle once the guarded section is over.
pub fn cleanup_on_interrupt(ctx: SharedCleanupContext) -> JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nInterrupted, cleaning up...");
            if let Ok(guard) = ctx.lock() {
                guard.cleanup();
            }
            std::process::exit(INTERRUPTED_EXIT_CODE);
        }
    })
}
