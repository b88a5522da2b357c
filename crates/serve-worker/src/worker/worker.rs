//! Model Worker
//!
//! Holds the lifecycle state, the (at most one) loaded model and the predict
//! counters. Mutated only from the serving loop, so nothing here locks.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::Serialize;
use serve_protocol::{Command, LoadParams, Response};

use crate::backend::{Backend, LoadSpec, ModelMetadata};
use crate::config::ModelConfig;

use super::handlers;
use super::state_machine::{ModelState, StateTransitionError};

/// A loaded model: the resolved LOAD request plus the backend serving it.
#[derive(Debug)]
pub struct ModelHandle {
    pub spec: LoadSpec,
    pub backend: Backend,
    pub loaded_at: Instant,
    pub load_time_ms: u64,
}

/// Predict counters, reset on every successful LOAD.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PredictStats {
    pub total_requests: u64,
    pub failed_requests: u64,
    pub total_time_ms: f64,
}

impl PredictStats {
    pub fn record(&mut self, elapsed: Duration, ok: bool) {
        self.total_requests += 1;
        if !ok {
            self.failed_requests += 1;
        }
        self.total_time_ms += elapsed.as_secs_f64() * 1000.0;
    }

    pub fn avg_time_ms(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.total_time_ms / self.total_requests as f64
        }
    }
}

/// Snapshot reported by PING.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatus {
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fault: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime_secs: Option<u64>,
    pub predict: PredictStats,
    pub avg_predict_ms: f64,
}

pub struct ModelWorker {
    /// Startup defaults for fields a LOAD leaves empty
    defaults: ModelConfig,
    state: ModelState,
    model: Option<ModelHandle>,
    stats: PredictStats,
}

impl ModelWorker {
    pub fn new(defaults: ModelConfig) -> Self {
        Self {
            defaults,
            state: ModelState::Unloaded,
            model: None,
            stats: PredictStats::default(),
        }
    }

    /// Execute one command. Every command yields exactly one response.
    pub fn handle(&mut self, command: Command) -> Response {
        handlers::dispatch(self, command)
    }

    pub fn state(&self) -> &ModelState {
        &self.state
    }

    pub fn transition_state(&mut self, target: ModelState) -> Result<(), StateTransitionError> {
        let from = self.state.clone();
        self.state.transition(target)?;
        tracing::debug!("Model state: {} -> {}", from, self.state);
        Ok(())
    }

    pub fn is_model_loaded(&self) -> bool {
        self.model.is_some()
    }

    pub fn metadata(&self) -> Option<&ModelMetadata> {
        self.model.as_ref().map(|m| m.backend.describe())
    }

    pub fn stats(&self) -> &PredictStats {
        &self.stats
    }

    /// Merge a LOAD body over the startup configuration.
    pub fn resolve_load_spec(&self, params: LoadParams) -> LoadSpec {
        fn given(value: Option<String>) -> Option<String> {
            value.filter(|v| !v.trim().is_empty())
        }

        let model_dir = given(params.model_dir)
            .map(PathBuf::from)
            .or_else(|| self.defaults.model_dir.clone())
            .unwrap_or_default();

        LoadSpec {
            model_name: params.model_name,
            model_dir,
            runtime_type: given(params.runtime_type)
                .unwrap_or_else(|| self.defaults.runtime_type.clone()),
            device_type: given(params.device_type)
                .unwrap_or_else(|| self.defaults.device_type.clone()),
        }
    }

    pub(super) fn install(&mut self, handle: ModelHandle) {
        self.stats = PredictStats::default();
        self.model = Some(handle);
    }

    pub(super) fn take_model(&mut self) -> Option<ModelHandle> {
        self.model.take()
    }

    pub(super) fn backend_mut(&mut self) -> Option<&mut Backend> {
        self.model.as_mut().map(|m| &mut m.backend)
    }

    pub(super) fn record_predict(&mut self, elapsed: Duration, ok: bool) {
        self.stats.record(elapsed, ok);
    }

    pub fn status(&self) -> WorkerStatus {
        let fault = match &self.state {
            ModelState::Faulted(reason) => Some(reason.clone()),
            _ => None,
        };

        WorkerStatus {
            state: self.state.label().to_string(),
            fault,
            model: self.metadata().cloned(),
            load_time_ms: self.model.as_ref().map(|m| m.load_time_ms),
            uptime_secs: self.model.as_ref().map(|m| m.loaded_at.elapsed().as_secs()),
            predict: self.stats.clone(),
            avg_predict_ms: self.stats.avg_time_ms(),
        }
    }
}
