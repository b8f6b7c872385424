//! Build validation: run the configured setup, compile and test commands
//! against a working tree and classify the first failure by stage.

mod workdir;

pub use workdir::WorkingDirectory;

use std::path::Path;
use std::process::Command;

use tracing::{debug, info, warn};

use crate::config::BuildStepConfig;
use crate::error::{BuildError, MergerError, StepFailure};

/// Captured output is truncated to this many bytes, keeping the tail.
const MAX_CAPTURED_OUTPUT: usize = 16 * 1024;

#[derive(Debug, Clone)]
pub struct BuildValidator {
    steps: Vec<BuildStepConfig>,
}

impl BuildValidator {
    pub fn new(steps: Vec<BuildStepConfig>) -> Self {
        Self { steps }
    }

    pub fn steps(&self) -> &[BuildStepConfig] {
        &self.steps
    }

    /// Run every step in order inside `tree`. Returns `MergerError::Build` for
    /// the first failing step; the caller's working directory is always restored.
    pub fn validate(&self, tree: &Path) -> Result<(), MergerError> {
        let _guard = WorkingDirectory::enter(tree)?;
        info!("Validating build in {}", tree.display());

        for step in &self.steps {
            let command = describe(step);
            debug!("[{}] running `{}`", step.stage, command);

            let failure = match Command::new(&step.program).args(&step.args).output() {
                Ok(output) if output.status.success() => continue,
                Ok(output) => {
                    let mut combined = output.stdout;
                    combined.extend_from_slice(&output.stderr);
                    StepFailure {
                        command,
                        status: output.status.code(),
                        output: tail(&combined),
                    }
                }
                Err(e) => StepFailure {
                    command,
                    status: None,
                    output: e.to_string(),
                },
            };

            let error = BuildError::new(step.stage, failure);
            warn!("{}", error);
            return Err(error.into());
        }

        info!("Build validated in {}", tree.display());
        Ok(())
    }
}

fn describe(step: &BuildStepConfig) -> String {
    std::iter::once(step.program.as_str())
        .chain(step.args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

fn tail(output: &[u8]) -> String {
    let start = output.len().saturating_sub(MAX_CAPTURED_OUTPUT);
    String::from_utf8_lossy(&output[start..]).into_owned()
}
