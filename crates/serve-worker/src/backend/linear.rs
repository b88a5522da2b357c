//! Linear runtime: `y = act(x · Wᵀ + b)`
//!
//! Weights are read from a safetensors file in the model directory:
//!
//! | tensor   | dtype | shape        |          |
//! |----------|-------|--------------|----------|
//! | `weight` | F32   | `[out, in]`  | required |
//! | `bias`   | F32   | `[out]`      | optional |
//!
//! The activation comes from the `activation` entry of the safetensors
//! metadata (`identity` when absent). Requests carry a row-major batch of
//! little-endian f32 values `[n, in]`; responses carry `[n, out]`.

use std::fs::File;

use memmap2::MmapOptions;
use ndarray::{Array1, Array2};
use safetensors::tensor::TensorView;
use safetensors::{Dtype, SafeTensors};

use crate::base::error::{LoadError, PredictError, UnloadError};

use super::ModelMetadata;

pub const DEFAULT_WEIGHTS_FILE: &str = "model.safetensors";
pub const ACTIVATION_METADATA_KEY: &str = "activation";

const F32_SIZE: usize = std::mem::size_of::<f32>();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Identity,
    Relu,
    Sigmoid,
}

impl Activation {
    pub fn from_tag(tag: &str) -> Result<Self, LoadError> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "" | "identity" | "none" => Ok(Activation::Identity),
            "relu" => Ok(Activation::Relu),
            "sigmoid" => Ok(Activation::Sigmoid),
            other => Err(LoadError::Backend(format!("unknown activation: {}", other))),
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Activation::Identity => "identity",
            Activation::Relu => "relu",
            Activation::Sigmoid => "sigmoid",
        }
    }

    fn apply(&self, values: &mut Array2<f32>) {
        match self {
            Activation::Identity => {}
            Activation::Relu => values.mapv_inplace(|v| v.max(0.0)),
            Activation::Sigmoid => values.mapv_inplace(|v| 1.0 / (1.0 + (-v).exp())),
        }
    }
}

#[derive(Debug)]
pub struct LinearBackend {
    /// [out, in]
    weight: Array2<f32>,
    /// [out]
    bias: Option<Array1<f32>>,
    activation: Activation,
    metadata: ModelMetadata,
}

fn f32_values(name: &str, view: &TensorView<'_>) -> Result<Vec<f32>, LoadError> {
    if view.dtype() != Dtype::F32 {
        return Err(LoadError::Backend(format!(
            "tensor '{}' must be F32, found {:?}",
            name,
            view.dtype()
        )));
    }
    Ok(view
        .data()
        .chunks_exact(F32_SIZE)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

impl LinearBackend {
    pub fn load(weights_file: &str, mut metadata: ModelMetadata) -> Result<Self, LoadError> {
        let path = metadata.model_dir.join(weights_file);
        if !path.is_file() {
            return Err(LoadError::ModelNotFound(path));
        }

        let file = File::open(&path)
            .map_err(|e| LoadError::Backend(format!("failed to open {:?}: {}", path, e)))?;
        // Read-only mapping; weights are copied out before it is dropped.
        let mmap = unsafe { MmapOptions::new().map(&file) }
            .map_err(|e| LoadError::Backend(format!("failed to mmap {:?}: {}", path, e)))?;

        let (_, header) = SafeTensors::read_metadata(&mmap)
            .map_err(|e| LoadError::Backend(format!("failed to read safetensors header: {}", e)))?;
        let activation = match header
            .metadata()
            .as_ref()
            .and_then(|m| m.get(ACTIVATION_METADATA_KEY))
        {
            Some(tag) => Activation::from_tag(tag)?,
            None => Activation::Identity,
        };

        let tensors = SafeTensors::deserialize(&mmap)
            .map_err(|e| LoadError::Backend(format!("failed to deserialize safetensors: {}", e)))?;

        let weight_view = tensors
            .tensor("weight")
            .map_err(|e| LoadError::Backend(format!("missing 'weight' tensor: {}", e)))?;
        let shape = weight_view.shape().to_vec();
        let (out_dim, in_dim) = match shape[..] {
            [out_dim, in_dim] if out_dim > 0 && in_dim > 0 => (out_dim, in_dim),
            _ => {
                return Err(LoadError::Backend(format!(
                    "'weight' must be a non-empty [out, in] matrix, found shape {:?}",
                    shape
                )))
            }
        };
        let weight = Array2::from_shape_vec((out_dim, in_dim), f32_values("weight", &weight_view)?)
            .map_err(|e| LoadError::Backend(format!("bad 'weight' layout: {}", e)))?;

        let bias = if tensors.names().iter().any(|name| name.as_str() == "bias") {
            let view = tensors
                .tensor("bias")
                .map_err(|e| LoadError::Backend(e.to_string()))?;
            if view.shape() != [out_dim].as_slice() {
                return Err(LoadError::Backend(format!(
                    "'bias' must have shape [{}], found {:?}",
                    out_dim,
                    view.shape()
                )));
            }
            Some(Array1::from_vec(f32_values("bias", &view)?))
        } else {
            None
        };

        metadata.serialized_file = Some(weights_file.to_string());
        metadata.input_dim = Some(in_dim);
        metadata.output_dim = Some(out_dim);
        metadata.activation = Some(activation.tag().to_string());

        tracing::info!(
            "Linear backend loaded '{}' from {:?}: [{} -> {}], bias={}, activation={}",
            metadata.model_name,
            path,
            in_dim,
            out_dim,
            bias.is_some(),
            activation.tag()
        );

        Ok(Self {
            weight,
            bias,
            activation,
            metadata,
        })
    }

    pub fn predict(&mut self, input: &[u8]) -> Result<Vec<u8>, PredictError> {
        let in_dim = self.weight.ncols();
        let row_bytes = in_dim * F32_SIZE;
        if input.is_empty() || input.len() % row_bytes != 0 {
            return Err(PredictError::InvalidInput(format!(
                "expected a non-empty multiple of {} bytes ({} f32 features per row), got {} bytes",
                row_bytes,
                in_dim,
                input.len()
            )));
        }

        let rows = input.len() / row_bytes;
        let values: Vec<f32> = input
            .chunks_exact(F32_SIZE)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        if let Some(pos) = values.iter().position(|v| !v.is_finite()) {
            return Err(PredictError::InvalidInput(format!(
                "non-finite value at row {}, column {}",
                pos / in_dim,
                pos % in_dim
            )));
        }

        let x = Array2::from_shape_vec((rows, in_dim), values)
            .map_err(|e| PredictError::Execution(e.to_string()))?;
        let mut y = x.dot(&self.weight.t());
        if let Some(bias) = &self.bias {
            y += bias;
        }
        self.activation.apply(&mut y);

        Ok(y.iter().flat_map(|v| v.to_le_bytes()).collect())
    }

    pub fn describe(&self) -> &ModelMetadata {
        &self.metadata
    }

    pub fn unload(self) -> Result<(), UnloadError> {
        tracing::debug!("Releasing linear weights for '{}'", self.metadata.model_name);
        Ok(())
    }
}

/// Write a `model.safetensors` for tests.
#[cfg(test)]
pub(crate) fn write_test_model(
    dir: &std::path::Path,
    weight: &[f32],
    shape: [usize; 2],
    bias: Option<&[f32]>,
    activation: Option<&str>,
) {
    use std::collections::HashMap;

    let to_bytes = |values: &[f32]| -> Vec<u8> { values.iter().flat_map(|v| v.to_le_bytes()).collect() };
    let weight_bytes = to_bytes(weight);
    let bias_bytes = bias.map(to_bytes);

    let mut views = vec![(
        "weight",
        TensorView::new(Dtype::F32, shape.to_vec(), &weight_bytes).unwrap(),
    )];
    if let Some(bytes) = &bias_bytes {
        views.push((
            "bias",
            TensorView::new(Dtype::F32, vec![bytes.len() / F32_SIZE], bytes).unwrap(),
        ));
    }

    let metadata =
        activation.map(|a| HashMap::from([(ACTIVATION_METADATA_KEY.to_string(), a.to_string())]));
    let serialized = safetensors::serialize(views.iter().map(|(name, view)| (*name, view)), &metadata).unwrap();
    std::fs::write(dir.join(DEFAULT_WEIGHTS_FILE), serialized).unwrap();
}

/// Little-endian f32 bytes, as carried in PREDICT payloads.
#[cfg(test)]
pub(crate) fn f32_bytes(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

#[cfg(test)]
pub(crate) fn from_f32_bytes(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(F32_SIZE)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}
