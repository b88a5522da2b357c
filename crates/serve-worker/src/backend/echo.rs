use crate::base::error::{PredictError, UnloadError};

use super::ModelMetadata;

/// Passthrough runtime. Useful for wiring checks between the orchestrator
/// and a worker without real weights.
#[derive(Debug)]
pub struct EchoBackend {
    metadata: ModelMetadata,
    #[cfg(test)]
    unload_failure: Option<String>,
}

impl EchoBackend {
    pub fn load(metadata: ModelMetadata) -> Self {
        tracing::info!("Echo backend ready for model '{}'", metadata.model_name);
        Self {
            metadata,
            #[cfg(test)]
            unload_failure: None,
        }
    }

    /// Make the next `unload` report a teardown failure.
    #[cfg(test)]
    pub(crate) fn fail_unload(&mut self, reason: &str) {
        self.unload_failure = Some(reason.to_string());
    }

    pub fn predict(&mut self, input: &[u8]) -> Result<Vec<u8>, PredictError> {
        Ok(input.to_vec())
    }

    pub fn describe(&self) -> &ModelMetadata {
        &self.metadata
    }

    pub fn unload(self) -> Result<(), UnloadError> {
        #[cfg(test)]
        {
            if let Some(reason) = self.unload_failure {
                return Err(UnloadError::Backend(reason));
            }
        }
        tracing::debug!("Echo backend for '{}' released", self.metadata.model_name);
        Ok(())
    }
}
