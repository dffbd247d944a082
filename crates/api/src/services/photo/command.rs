//! Local optimizer program (file in, file out).

use std::process::Stdio;

use async_trait::async_trait;
use tracing::{debug, instrument};

use super::optimizer::{ImageOptimizer, OptimizeError};
use super::staging::StagedFile;
use crate::config::CommandConfig;

/// Runs a configured program that reads `{input}` and writes `{output}`.
pub struct CommandOptimizer {
    config: CommandConfig,
}

impl CommandOptimizer {
    #[must_use]
    pub const fn new(config: CommandConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ImageOptimizer for CommandOptimizer {
    #[instrument(skip_all, fields(program = %self.config.program))]
    async fn optimize(&self, source: &StagedFile) -> Result<Vec<u8>, OptimizeError> {
        // Removed on every exit path, including timeouts
        let output = source.sibling();

        let input_path = source.path().to_string_lossy();
        let output_path = output.path().to_string_lossy();
        let args = self.config.args.iter().map(|arg| {
            arg.replace(CommandConfig::INPUT_PLACEHOLDER, &input_path)
                .replace(CommandConfig::OUTPUT_PLACEHOLDER, &output_path)
        });

        let mut command = tokio::process::Command::new(&self.config.program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let result = tokio::time::timeout(self.config.timeout, command.output())
            .await
            .map_err(|_| OptimizeError::Timeout(self.config.timeout))??;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(OptimizeError::Command(format!(
                "{} exited with {}: {}",
                self.config.program,
                result.status,
                stderr.trim()
            )));
        }

        let bytes = match tokio::fs::read(output.path()).await {
            Ok(bytes) if !bytes.is_empty() => bytes,
            Ok(_) => return Err(OptimizeError::MissingOutput),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(OptimizeError::MissingOutput);
            }
            Err(e) => return Err(e.into()),
        };

        debug!(bytes = bytes.len(), "Optimizer command finished");
        Ok(bytes)
    }
}
