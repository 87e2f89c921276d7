pub mod bootstrap;
pub mod cleanup;
pub mod commands;
pub mod installer;
pub mod package;
pub mod plan;
pub mod runtime;
pub mod verify;

/// Test utilities for mock runtimes and cross-platform paths.
#[cfg(test)]
pub mod test_utils {
    use crate::runtime::MockRuntime;
    use std::path::PathBuf;

    /// Working directory the mock runtime reports.
    /// - Unix: `/srv/app`
    /// - Windows: `C:\srv\app`
    pub fn test_workdir() -> PathBuf {
        #[cfg(not(windows))]
        {
            PathBuf::from("/srv/app")
        }
        #[cfg(windows)]
        {
            PathBuf::from(r"C:\srv\app")
        }
    }

    /// Config directory the mock runtime reports.
    pub fn test_config_dir() -> PathBuf {
        #[cfg(not(windows))]
        {
            PathBuf::from("/home/user/.config")
        }
        #[cfg(windows)]
        {
            PathBuf::from(r"C:\Users\user\AppData\Roaming")
        }
    }

    /// Configure a mock runtime with common defaults for tests.
    /// - current dir set to [`test_workdir`]
    /// - config dir set to [`test_config_dir`]
    /// - not privileged
    pub fn configure_mock_runtime_basics(runtime: &mut MockRuntime) {
        runtime.expect_current_dir().returning(|| Ok(test_workdir()));
        runtime
            .expect_config_dir()
            .returning(|| Some(test_config_dir()));
        runtime.expect_is_privileged().returning(|| false);
    }
}
