pub mod error;

use std::fmt;

use error::LoadError;

/// Where a model executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceType {
    Cpu,
    /// GPU with its ordinal
    Gpu(u32),
}

impl DeviceType {
    /// Parse a device tag: `cpu`, `gpu`, `cuda`, `gpu:N`, `cuda:N`.
    pub fn from_tag(tag: &str) -> Result<Self, LoadError> {
        let tag = tag.trim().to_ascii_lowercase();
        let (kind, ordinal) = match tag.split_once(':') {
            Some((kind, ordinal)) => (kind, Some(ordinal)),
            None => (tag.as_str(), None),
        };

        match (kind, ordinal) {
            ("cpu", None) => Ok(DeviceType::Cpu),
            ("gpu" | "cuda", None) => Ok(DeviceType::Gpu(0)),
            ("gpu" | "cuda", Some(ordinal)) => ordinal
                .parse::<u32>()
                .map(DeviceType::Gpu)
                .map_err(|_| LoadError::UnknownDevice(tag.clone())),
            _ => Err(LoadError::UnknownDevice(tag.clone())),
        }
    }

    pub fn is_cpu(&self) -> bool {
        matches!(self, DeviceType::Cpu)
    }

    pub fn is_gpu(&self) -> bool {
        matches!(self, DeviceType::Gpu(_))
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceType::Cpu => write!(f, "cpu"),
            DeviceType::Gpu(ordinal) => write!(f, "gpu:{}", ordinal),
        }
    }
}

/// Runtime family that executes the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeType {
    /// Passthrough runtime, returns its input
    Echo,
    /// Dense affine layer read from safetensors weights
    Linear,
}

impl RuntimeType {
    pub fn from_tag(tag: &str) -> Result<Self, LoadError> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "echo" => Ok(RuntimeType::Echo),
            "linear" => Ok(RuntimeType::Linear),
            _ => Err(LoadError::UnsupportedRuntime(tag.to_string())),
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            RuntimeType::Echo => "echo",
            RuntimeType::Linear => "linear",
        }
    }
}

impl fmt::Display for RuntimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_tags() {
        assert_eq!(DeviceType::from_tag("cpu").unwrap(), DeviceType::Cpu);
        assert_eq!(DeviceType::from_tag(" CPU ").unwrap(), DeviceType::Cpu);
        assert_eq!(DeviceType::from_tag("gpu").unwrap(), DeviceType::Gpu(0));
        assert_eq!(DeviceType::from_tag("cuda:3").unwrap(), DeviceType::Gpu(3));
        assert!(matches!(
            DeviceType::from_tag("tpu"),
            Err(LoadError::UnknownDevice(_))
        ));
        assert!(DeviceType::from_tag("gpu:x").is_err());
        assert!(DeviceType::from_tag("cpu:1").is_err());
    }

    #[test]
    fn test_runtime_tags() {
        assert_eq!(RuntimeType::from_tag("Linear").unwrap(), RuntimeType::Linear);
        assert_eq!(RuntimeType::from_tag("echo").unwrap(), RuntimeType::Echo);
        assert_eq!(
            RuntimeType::from_tag("LSP").unwrap_err(),
            LoadError::UnsupportedRuntime("LSP".to_string())
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(DeviceType::Gpu(1).to_string(), "gpu:1");
        assert_eq!(RuntimeType::Linear.to_string(), "linear");
    }
}
