use std::path::{Path, PathBuf};

/// Decoded image, always expanded to RGBA8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    /// Channel count of the source file before expansion.
    pub channels: u8,
    pub rgba: Vec<u8>,
}

impl ImageData {
    /// A single-color image.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let texels = (width as usize) * (height as usize);
        Self {
            width,
            height,
            channels: 4,
            rgba: rgba.repeat(texels),
        }
    }

    /// True when the pixel buffer matches the declared dimensions.
    pub fn is_consistent(&self) -> bool {
        self.rgba.len() == (self.width as usize) * (self.height as usize) * 4
    }
}

#[derive(Debug, thiserror::Error)]
#[error("failed to load image {}: {message}", .path.display())]
pub struct ImageError {
    pub path: PathBuf,
    pub message: String,
}

/// Decodes images from some storage. Implemented by the asset layer.
pub trait ImageLoader {
    fn load(&self, path: &Path) -> Result<ImageData, ImageError>;
}
