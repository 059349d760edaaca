use crate::context::RenderContext;
use crate::gpu::{GpuDevice, TextureId};
use crate::mesh::{Mesh, MeshData};
use crate::program::ShaderProgram;
use crate::texture::{TextureRef, blank_texture, upload_image};
use modelview_common::{ImageLoader, ImportedScene, TextureSource};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, error, info, warn};

/// Every mesh of an imported scene, uploaded, with each referenced texture
/// file loaded once no matter how many meshes use it.
#[derive(Debug, Default)]
pub struct Model {
    meshes: Vec<Mesh>,
    textures: BTreeMap<String, TextureRef>,
}

impl Model {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_scene<G: GpuDevice + ?Sized>(
        ctx: &mut RenderContext<'_, G>,
        scene: ImportedScene,
        images: &dyn ImageLoader,
    ) -> Self {
        let mut model = Self::empty();
        for imported in scene.meshes {
            let textures: Vec<TextureRef> = imported
                .textures
                .iter()
                .filter_map(|source| model.texture_for(ctx, &scene.directory, source, images))
                .collect();
            let data = MeshData::from_vertices(imported.vertices, imported.indices, textures);
            model.meshes.push(Mesh::generate(ctx, data, None));
        }

        if model.meshes.is_empty() {
            warn!(source = %scene.source.display(), "model has no meshes, nothing will be drawn");
        } else {
            info!(
                source = %scene.source.display(),
                meshes = model.meshes.len(),
                textures = model.textures.len(),
                "model uploaded"
            );
        }
        model
    }

    fn texture_for<G: GpuDevice + ?Sized>(
        &mut self,
        ctx: &mut RenderContext<'_, G>,
        directory: &Path,
        source: &TextureSource,
        images: &dyn ImageLoader,
    ) -> Option<TextureRef> {
        let file_name = texture_file_name(&source.path);
        if file_name.is_empty() {
            warn!(path = %source.path, "texture reference has no file name, skipped");
            return None;
        }

        if let Some(cached) = self.textures.get(&file_name) {
            debug!(texture = %file_name, "texture already loaded");
            return Some(TextureRef {
                role: source.role,
                ..cached.clone()
            });
        }

        let handle = match images.load(&directory.join(&file_name)) {
            Ok(image) => upload_image(ctx.gpu(), &image),
            Err(e) => {
                error!("{e}");
                blank_texture(ctx.gpu())
            }
        };
        let texture = TextureRef {
            handle,
            role: source.role,
            path: file_name.clone(),
        };
        self.textures.insert(file_name, texture.clone());
        Some(texture)
    }

    pub fn meshes(&self) -> &[Mesh] {
        &self.meshes
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }

    /// Distinct texture files loaded for this model.
    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    /// Draws every mesh; roles a mesh has no texture for sample `blank`.
    pub fn draw<G: GpuDevice + ?Sized>(
        &self,
        ctx: &mut RenderContext<'_, G>,
        program: &ShaderProgram,
        blank: TextureId,
    ) {
        for mesh in &self.meshes {
            mesh.draw_textured(ctx, program, blank);
        }
    }

    pub fn dispose<G: GpuDevice + ?Sized>(self, ctx: &mut RenderContext<'_, G>) {
        for mesh in self.meshes {
            mesh.dispose(ctx);
        }
        for texture in self.textures.into_values() {
            ctx.gpu().delete_texture(texture.handle);
        }
    }
}

/// File name component of a texture path as stored in an asset.
///
/// Asset files often carry absolute paths from the authoring machine, with
/// either separator. Only the final component is kept and resolved against
/// the model's own directory.
pub fn texture_file_name(raw: &str) -> String {
    raw.rsplit(['/', '\\']).next().unwrap_or_default().to_string()
}
