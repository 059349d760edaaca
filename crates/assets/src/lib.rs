//! Model import and image decoding.
//!
//! Every supported format is normalized to [`ImportedScene`]: a flat list of
//! meshes, each a vertex/index/texture triple. Node hierarchies are flattened
//! in traversal order and their transforms dropped. Texture paths are kept
//! exactly as the asset stores them; resolving them is the renderer's job.
//!
//! # Formats
//! - Wavefront OBJ (+ MTL) via `tobj`. Texture v coordinates are flipped so
//!   every format shares the glTF convention of v = 0 at the top.
//! - glTF 2.0 (`.gltf`, `.glb`) via `gltf`. Only the first UV set is read.
//! - Anything else, FBX included, is [`AssetError::Unsupported`].

mod gltf_scene;
mod images;
mod obj;

pub use images::{DiskImageLoader, save_image};

use modelview_common::ImportedScene;
use std::path::{Path, PathBuf};
use tracing::info;

/// Errors from asset operations.
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("IO error reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("OBJ parse error in {}: {source}", .path.display())]
    Obj {
        path: PathBuf,
        #[source]
        source: tobj::LoadError,
    },
    #[error("glTF error in {}: {source}", .path.display())]
    Gltf {
        path: PathBuf,
        #[source]
        source: gltf::Error,
    },
    #[error("unsupported model format `{extension}` ({})", .path.display())]
    Unsupported { path: PathBuf, extension: String },
}

/// Model formats the importer understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFormat {
    Obj,
    Gltf,
}

impl ModelFormat {
    /// Picks the format from the file extension, case-insensitively.
    pub fn from_path(path: &Path) -> Result<Self, AssetError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        match extension.as_str() {
            "obj" => Ok(Self::Obj),
            "gltf" | "glb" => Ok(Self::Gltf),
            _ => Err(AssetError::Unsupported {
                path: path.to_path_buf(),
                extension,
            }),
        }
    }
}

/// Imports the model at `path`.
pub fn import_model(path: impl AsRef<Path>) -> Result<ImportedScene, AssetError> {
    let path = path.as_ref();
    let meshes = match ModelFormat::from_path(path)? {
        ModelFormat::Obj => obj::load(path)?,
        ModelFormat::Gltf => gltf_scene::load(path)?,
    };
    let scene = ImportedScene {
        source: path.to_path_buf(),
        directory: path.parent().map(Path::to_path_buf).unwrap_or_default(),
        meshes,
    };
    info!(
        path = %path.display(),
        meshes = scene.meshes.len(),
        vertices = scene.vertex_count(),
        indices = scene.index_count(),
        "model imported"
    );
    Ok(scene)
}

pub fn crate_info() -> &'static str {
    "modelview-assets v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_follows_extension() {
        assert_eq!(
            ModelFormat::from_path(Path::new("Models/Car/Car.OBJ")).unwrap(),
            ModelFormat::Obj
        );
        assert_eq!(
            ModelFormat::from_path(Path::new("boat.glb")).unwrap(),
            ModelFormat::Gltf
        );
    }

    #[test]
    fn fbx_is_unsupported() {
        let err = import_model("Models/Player/Player.fbx").unwrap_err();
        match err {
            AssetError::Unsupported { extension, .. } => assert_eq!(extension, "fbx"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_extension_is_unsupported() {
        assert!(matches!(
            import_model("Models/model"),
            Err(AssetError::Unsupported { .. })
        ));
    }

    #[test]
    fn missing_file_reports_the_path() {
        let err = import_model("does/not/exist.obj").unwrap_err();
        assert!(err.to_string().contains("exist.obj"));
    }
}
