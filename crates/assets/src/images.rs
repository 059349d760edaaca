use modelview_common::{ImageData, ImageError, ImageLoader};
use std::path::Path;
use tracing::debug;

/// Decodes image files from disk with the `image` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiskImageLoader;

impl ImageLoader for DiskImageLoader {
    fn load(&self, path: &Path) -> Result<ImageData, ImageError> {
        let decoded = image::open(path).map_err(|err| ImageError {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        let channels = decoded.color().channel_count();
        let rgba = decoded.into_rgba8();
        debug!(
            path = %path.display(),
            width = rgba.width(),
            height = rgba.height(),
            channels,
            "image decoded"
        );
        Ok(ImageData {
            width: rgba.width(),
            height: rgba.height(),
            channels,
            rgba: rgba.into_raw(),
        })
    }
}

/// Encodes `image` as RGBA8; the format follows the file extension.
pub fn save_image(path: &Path, image: &ImageData) -> Result<(), ImageError> {
    let error = |message: String| ImageError {
        path: path.to_path_buf(),
        message,
    };
    let buffer = image::RgbaImage::from_raw(image.width, image.height, image.rgba.clone())
        .ok_or_else(|| error("pixel buffer does not match the image size".into()))?;
    buffer.save(path).map_err(|err| error(err.to_string()))
}
