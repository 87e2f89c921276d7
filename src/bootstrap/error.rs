use crate::plan::Step;

/// Exit code reported when the interpreter cannot be launched, as shells do.
pub const SPAWN_FAILED_EXIT_CODE: i32 = 127;

/// Failures that decide the process exit code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapError {
    /// An install command ran and exited non-zero
    StepFailed { step: Step, code: i32 },
    /// The install command could not be started at all
    SpawnFailed {
        step: Step,
        program: String,
        reason: String,
    },
    /// Installed versions differ from the pins
    VerificationFailed { mismatches: usize },
}

impl BootstrapError {
    pub fn exit_code(&self) -> i32 {
        match self {
            BootstrapError::StepFailed { code, .. } => *code,
            BootstrapError::SpawnFailed { .. } => SPAWN_FAILED_EXIT_CODE,
            BootstrapError::VerificationFailed { .. } => 1,
        }
    }
}

impl std::fmt::Display for BootstrapError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BootstrapError::StepFailed { step, code } => {
                write!(
                    f,
                    "Step {} failed with exit code {}; remaining steps were skipped.",
                    step, code
                )
            }
            BootstrapError::SpawnFailed {
                step,
                program,
                reason,
            } => {
                write!(
                    f,
                    "Step {} could not start '{}': {}. Is Python installed? Use --python to choose an interpreter.",
                    step, program, reason
                )
            }
            BootstrapError::VerificationFailed { mismatches } => {
                write!(
                    f,
                    "{} pinned package(s) are not installed at their pinned version.",
                    mismatches
                )
            }
        }
    }
}

impl std::error::Error for BootstrapError {}

/// Process exit code for any error coming out of a command.
pub fn exit_code_for(error: &anyhow::Error) -> i32 {
    match error.downcast_ref::<BootstrapError>() {
        Some(e) => e.exit_code(),
        None => 1,
    }
}
