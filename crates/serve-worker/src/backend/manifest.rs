// Model archive manifest (`MAR-INF/MANIFEST.json`).

use std::path::{Component, Path};

use serde::Deserialize;

use crate::base::error::LoadError;

pub const MANIFEST_PATH: &str = "MAR-INF/MANIFEST.json";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    #[serde(default)]
    pub model: ManifestModel,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestModel {
    pub model_name: Option<String>,
    pub serialized_file: Option<String>,
    pub handler: Option<String>,
}

impl Manifest {
    /// Read the manifest if the model directory carries one.
    pub fn read(model_dir: &Path) -> Result<Option<Self>, LoadError> {
        let path = model_dir.join(MANIFEST_PATH);
        if !path.is_file() {
            return Ok(None);
        }

        let file = std::fs::File::open(&path)
            .map_err(|e| LoadError::Backend(format!("failed to open {:?}: {}", path, e)))?;
        let manifest = serde_json::from_reader(file)
            .map_err(|e| LoadError::Backend(format!("failed to parse {:?}: {}", path, e)))?;
        Ok(Some(manifest))
    }
}

impl ManifestModel {
    /// `serializedFile`, if set. It must name a file inside the model
    /// directory: absolute paths and `..` parts are rejected.
    pub fn weights_file(&self) -> Result<Option<&str>, LoadError> {
        let Some(file) = self.serialized_file.as_deref().filter(|f| !f.is_empty()) else {
            return Ok(None);
        };
        let contained = Path::new(file)
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !contained {
            return Err(LoadError::Backend(format!(
                "serializedFile {:?} escapes the model directory",
                file
            )));
        }
        Ok(Some(file))
    }
}
