use crate::gpu::{GpuDevice, TextureId};
use modelview_common::{ImageData, TextureRole};
use std::collections::HashMap;
use tracing::warn;

/// A GPU texture as a mesh references it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureRef {
    pub handle: TextureId,
    pub role: TextureRole,
    /// File name the texture was loaded from; the cache key.
    pub path: String,
}

/// Sampler uniform names for `textures`, in order.
///
/// The n-th texture of each role maps to `texture_<role><n>`, counting from
/// one per role: diffuse, specular, diffuse gives `texture_diffuse1`,
/// `texture_specular1`, `texture_diffuse2`.
pub fn sampler_uniform_names(textures: &[TextureRef]) -> Vec<String> {
    let mut counters: HashMap<TextureRole, u32> = HashMap::new();
    textures
        .iter()
        .map(|t| {
            let n = counters.entry(t.role).or_insert(0);
            *n += 1;
            format!("{}{}", t.role.uniform_prefix(), n)
        })
        .collect()
}

/// Uploads a decoded image as an RGBA8 texture.
pub fn upload_image<G: GpuDevice + ?Sized>(gpu: &mut G, image: &ImageData) -> TextureId {
    if !image.is_consistent() || image.width == 0 || image.height == 0 {
        warn!(
            width = image.width,
            height = image.height,
            "image data does not match its size, using a blank texture"
        );
        return blank_texture(gpu);
    }
    gpu.create_texture(image.width, image.height, Some(&image.rgba))
}

/// An allocated 1×1 texture with zeroed contents, standing in for one that
/// failed to load.
pub fn blank_texture<G: GpuDevice + ?Sized>(gpu: &mut G) -> TextureId {
    gpu.create_texture(1, 1, None)
}
