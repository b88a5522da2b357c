//! Backend Adapter - closed set of (runtime type, device type) executors
//!
//! ```text
//!                  LoadSpec { runtime tag, device tag, model_dir }
//!                                    │
//!                           Variant::select()        ← UnsupportedRuntime / UnsupportedDevice
//!                                    │
//!              ┌─────────────────────┴─────────────────────┐
//!              ▼                                           ▼
//!      Backend::Echo (cpu)                        Backend::Linear (cpu)
//! ```
//!
//! Selection happens once per LOAD. A variant is either fully constructed or
//! not constructed at all; there is no half-loaded backend.
//!
//! Adapters are not reentrant. The model worker owns the single instance and
//! calls it from the serving loop only.

mod echo;
mod linear;
mod manifest;

use std::path::PathBuf;

use serde::Serialize;

use crate::base::error::{LoadError, PredictError, UnloadError};
use crate::base::{DeviceType, RuntimeType};

pub use echo::EchoBackend;
pub use linear::{Activation, LinearBackend, ACTIVATION_METADATA_KEY, DEFAULT_WEIGHTS_FILE};
pub use manifest::{Manifest, ManifestModel, MANIFEST_PATH};

#[cfg(test)]
pub(crate) use linear::{f32_bytes, from_f32_bytes, write_test_model};

/// Fully resolved LOAD request (command fields merged over startup config).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadSpec {
    pub model_name: String,
    pub model_dir: PathBuf,
    pub runtime_type: String,
    pub device_type: String,
}

/// What `describe()` reports about a loaded model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelMetadata {
    pub model_name: String,
    pub runtime: String,
    pub device: String,
    pub model_dir: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serialized_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handler: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_dim: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dim: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activation: Option<String>,
}

impl ModelMetadata {
    fn base(spec: &LoadSpec, runtime: RuntimeType, device: DeviceType, manifest: Option<&Manifest>) -> Self {
        let model_name = if spec.model_name.is_empty() {
            manifest
                .and_then(|m| m.model.model_name.clone())
                .unwrap_or_default()
        } else {
            spec.model_name.clone()
        };

        Self {
            model_name,
            runtime: runtime.tag().to_string(),
            device: device.to_string(),
            model_dir: spec.model_dir.clone(),
            serialized_file: None,
            handler: manifest.and_then(|m| m.model.handler.clone()),
            input_dim: None,
            output_dim: None,
            activation: None,
        }
    }
}

/// Every (runtime, device) pair compiled into this build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Variant {
    EchoCpu,
    LinearCpu,
}

impl Variant {
    fn select(runtime: RuntimeType, device: DeviceType) -> Result<Self, LoadError> {
        match (runtime, device) {
            (RuntimeType::Echo, DeviceType::Cpu) => Ok(Variant::EchoCpu),
            (RuntimeType::Linear, DeviceType::Cpu) => Ok(Variant::LinearCpu),
            (runtime, device @ DeviceType::Gpu(_)) => Err(LoadError::UnsupportedDevice {
                runtime: runtime.tag().to_string(),
                device: device.to_string(),
            }),
        }
    }
}

#[derive(Debug)]
pub enum Backend {
    Echo(EchoBackend),
    Linear(LinearBackend),
}

impl Backend {
    pub fn load(spec: &LoadSpec) -> Result<Self, LoadError> {
        let runtime = RuntimeType::from_tag(&spec.runtime_type)?;
        let device = DeviceType::from_tag(&spec.device_type)?;
        let variant = Variant::select(runtime, device)?;

        if !spec.model_dir.is_dir() {
            return Err(LoadError::ModelNotFound(spec.model_dir.clone()));
        }
        let manifest = Manifest::read(&spec.model_dir)?;
        let metadata = ModelMetadata::base(spec, runtime, device, manifest.as_ref());

        tracing::debug!(
            "Selected backend variant {:?} for {} on {}",
            variant,
            runtime,
            device
        );

        match variant {
            Variant::EchoCpu => Ok(Backend::Echo(EchoBackend::load(metadata))),
            Variant::LinearCpu => {
                let weights_file = match &manifest {
                    Some(manifest) => manifest.model.weights_file()?,
                    None => None,
                };
                LinearBackend::load(weights_file.unwrap_or(DEFAULT_WEIGHTS_FILE), metadata)
                    .map(Backend::Linear)
            }
        }
    }

    pub fn predict(&mut self, input: &[u8]) -> Result<Vec<u8>, PredictError> {
        match self {
            Backend::Echo(backend) => backend.predict(input),
            Backend::Linear(backend) => backend.predict(input),
        }
    }

    pub fn describe(&self) -> &ModelMetadata {
        match self {
            Backend::Echo(backend) => backend.describe(),
            Backend::Linear(backend) => backend.describe(),
        }
    }

    pub fn unload(self) -> Result<(), UnloadError> {
        match self {
            Backend::Echo(backend) => backend.unload(),
            Backend::Linear(backend) => backend.unload(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(dir: &std::path::Path, runtime: &str, device: &str) -> LoadSpec {
        LoadSpec {
            model_name: "test".to_string(),
            model_dir: dir.to_path_buf(),
            runtime_type: runtime.to_string(),
            device_type: device.to_string(),
        }
    }

    #[test]
    fn test_select_echo_cpu() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = Backend::load(&spec(dir.path(), "echo", "cpu")).unwrap();
        assert!(matches!(backend, Backend::Echo(_)));
        assert_eq!(backend.predict(b"abc").unwrap(), b"abc");
        assert_eq!(backend.describe().runtime, "echo");
        assert!(backend.unload().is_ok());
    }

    #[test]
    fn test_unsupported_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let err = Backend::load(&spec(dir.path(), "LSP", "cpu")).unwrap_err();
        assert_eq!(err, LoadError::UnsupportedRuntime("LSP".to_string()));
    }

    #[test]
    fn test_gpu_has_no_variant() {
        let dir = tempfile::tempdir().unwrap();
        for runtime in ["echo", "linear"] {
            let err = Backend::load(&spec(dir.path(), runtime, "gpu")).unwrap_err();
            assert!(matches!(err, LoadError::UnsupportedDevice { .. }));
        }
    }

    #[test]
    fn test_device_checked_before_model_dir() {
        let err = Backend::load(&spec(std::path::Path::new("/nonexistent/model"), "echo", "cuda:1"))
            .unwrap_err();
        assert!(matches!(err, LoadError::UnsupportedDevice { .. }));
    }

    #[test]
    fn test_missing_model_dir() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");
        let err = Backend::load(&spec(&missing, "echo", "cpu")).unwrap_err();
        assert_eq!(err, LoadError::ModelNotFound(missing));
    }

    #[test]
    fn test_manifest_names_model() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("MAR-INF")).unwrap();
        std::fs::write(
            dir.path().join(MANIFEST_PATH),
            r#"{"model": {"modelName": "from-manifest", "handler": "echo"}}"#,
        )
        .unwrap();

        let mut load = spec(dir.path(), "echo", "cpu");
        load.model_name.clear();
        let backend = Backend::load(&load).unwrap();
        assert_eq!(backend.describe().model_name, "from-manifest");
        assert_eq!(backend.describe().handler.as_deref(), Some("echo"));
    }

    #[test]
    fn test_serialized_file_outside_model_dir_rejected() {
        let root = tempfile::tempdir().unwrap();
        write_test_model(root.path(), &[1.0, 2.0], [1, 2], None, None);
        let model_dir = root.path().join("model");
        std::fs::create_dir_all(model_dir.join("MAR-INF")).unwrap();
        std::fs::write(
            model_dir.join(MANIFEST_PATH),
            format!(r#"{{"model": {{"serializedFile": "../{}"}}}}"#, DEFAULT_WEIGHTS_FILE),
        )
        .unwrap();

        let err = Backend::load(&spec(&model_dir, "linear", "cpu")).unwrap_err();
        assert!(matches!(err, LoadError::Backend(ref msg) if msg.contains("escapes")));
        assert_eq!(err.kind(), serve_protocol::ErrorKind::LoadFailed);
    }
}
