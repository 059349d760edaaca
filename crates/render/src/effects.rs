//! CPU reference of the post-process effects.
//!
//! Mirrors the screen shader texel for texel (nearest sampling, edges
//! clamped) so effect output can be checked without a GPU and applied to
//! image files from the command line.

use glam::{Vec3, Vec4};
use modelview_common::{ImageData, PostEffect};

/// Luma weights (Rec. 709).
pub const LUMA: Vec3 = Vec3::new(0.2126, 0.7152, 0.0722);
/// Half width of the box blur kernel; the kernel is 9×9.
pub const BLUR_RADIUS: i32 = 4;

const SOBEL_X: [[f32; 3]; 3] = [[-1.0, 0.0, 1.0], [-2.0, 0.0, 2.0], [-1.0, 0.0, 1.0]];
const SOBEL_Y: [[f32; 3]; 3] = [[-1.0, -2.0, -1.0], [0.0, 0.0, 0.0], [1.0, 2.0, 1.0]];

/// Linear RGBA color buffer, row-major from the top-left texel.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorBuffer {
    width: u32,
    height: u32,
    pixels: Vec<Vec4>,
}

impl ColorBuffer {
    pub fn solid(width: u32, height: u32, color: Vec4) -> Self {
        Self {
            width,
            height,
            pixels: vec![color; (width as usize) * (height as usize)],
        }
    }

    pub fn from_fn(width: u32, height: u32, f: impl Fn(u32, u32) -> Vec4) -> Self {
        let pixels = (0..height)
            .flat_map(|y| (0..width).map(move |x| (x, y)))
            .map(|(x, y)| f(x, y))
            .collect();
        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn from_image(image: &ImageData) -> Self {
        let pixels = image
            .rgba
            .chunks_exact(4)
            .map(|px| Vec4::new(px[0] as f32, px[1] as f32, px[2] as f32, px[3] as f32) / 255.0)
            .collect();
        Self {
            width: image.width,
            height: image.height,
            pixels,
        }
    }

    pub fn to_image(&self) -> ImageData {
        let rgba = self
            .pixels
            .iter()
            .flat_map(|p| {
                (p.clamp(Vec4::ZERO, Vec4::ONE) * 255.0)
                    .round()
                    .to_array()
                    .map(|c| c as u8)
            })
            .collect();
        ImageData {
            width: self.width,
            height: self.height,
            channels: 4,
            rgba,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[Vec4] {
        &self.pixels
    }

    /// Texel at `(x, y)` with coordinates clamped to the edges.
    pub fn sample(&self, x: i32, y: i32) -> Vec4 {
        if self.pixels.is_empty() {
            return Vec4::ZERO;
        }
        let x = x.clamp(0, self.width as i32 - 1) as usize;
        let y = y.clamp(0, self.height as i32 - 1) as usize;
        self.pixels[y * self.width as usize + x]
    }

    pub fn fill(&mut self, color: Vec4) {
        self.pixels.fill(color);
    }
}

/// Applies `effect` to every texel of `source`. Every effect except
/// passthrough writes opaque alpha.
pub fn apply(effect: PostEffect, source: &ColorBuffer) -> ColorBuffer {
    let (w, h) = (source.width, source.height);
    match effect {
        PostEffect::Passthrough => source.clone(),
        PostEffect::Invert => ColorBuffer::from_fn(w, h, |x, y| {
            let c = source.sample(x as i32, y as i32);
            (Vec3::ONE - c.truncate()).extend(1.0)
        }),
        PostEffect::Greyscale => ColorBuffer::from_fn(w, h, |x, y| {
            let l = luma(source.sample(x as i32, y as i32));
            Vec3::splat(l).extend(1.0)
        }),
        PostEffect::Blur => ColorBuffer::from_fn(w, h, |x, y| {
            let mut sum = Vec3::ZERO;
            for dy in -BLUR_RADIUS..=BLUR_RADIUS {
                for dx in -BLUR_RADIUS..=BLUR_RADIUS {
                    sum += source.sample(x as i32 + dx, y as i32 + dy).truncate();
                }
            }
            let taps = (2 * BLUR_RADIUS + 1).pow(2) as f32;
            (sum / taps).extend(1.0)
        }),
        PostEffect::EdgeDetect => ColorBuffer::from_fn(w, h, |x, y| {
            let mut gx = 0.0;
            let mut gy = 0.0;
            for (row, dy) in (-1..=1).enumerate() {
                for (col, dx) in (-1..=1).enumerate() {
                    let l = luma(source.sample(x as i32 + dx, y as i32 + dy));
                    gx += SOBEL_X[row][col] * l;
                    gy += SOBEL_Y[row][col] * l;
                }
            }
            let magnitude = (gx * gx + gy * gy).sqrt().min(1.0);
            Vec3::splat(magnitude).extend(1.0)
        }),
    }
}

fn luma(c: Vec4) -> f32 {
    c.truncate().dot(LUMA)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient() -> ColorBuffer {
        ColorBuffer::from_fn(6, 4, |x, y| Vec4::new(x as f32 / 5.0, y as f32 / 3.0, 0.5, 1.0))
    }

    fn close(a: Vec4, b: Vec4) -> bool {
        (a - b).abs().max_element() < 1e-5
    }

    #[test]
    fn passthrough_is_identity() {
        let src = gradient();
        assert_eq!(apply(PostEffect::Passthrough, &src), src);
    }

    #[test]
    fn invert_twice_restores_color() {
        let src = gradient();
        let twice = apply(PostEffect::Invert, &apply(PostEffect::Invert, &src));
        assert!(src.pixels().iter().zip(twice.pixels()).all(|(a, b)| close(*a, *b)));
    }

    #[test]
    fn greyscale_keeps_white_and_weights_green() {
        let white = ColorBuffer::solid(2, 2, Vec4::ONE);
        assert!(close(apply(PostEffect::Greyscale, &white).sample(0, 0), Vec4::ONE));

        let green = ColorBuffer::solid(1, 1, Vec4::new(0.0, 1.0, 0.0, 1.0));
        let g = apply(PostEffect::Greyscale, &green).sample(0, 0);
        assert!((g.x - 0.7152).abs() < 1e-6);
    }

    #[test]
    fn blur_and_edges_of_solid_color() {
        let color = Vec4::new(0.2, 0.4, 0.6, 1.0);
        let solid = ColorBuffer::solid(5, 5, color);
        let blurred = apply(PostEffect::Blur, &solid);
        assert!(blurred.pixels().iter().all(|p| close(*p, color)));

        let edges = apply(PostEffect::EdgeDetect, &solid);
        assert!(edges.pixels().iter().all(|p| close(*p, Vec4::W)));
    }

    #[test]
    fn edge_detect_finds_a_step() {
        let step = ColorBuffer::from_fn(8, 3, |x, _| if x < 4 { Vec4::W } else { Vec4::ONE });
        let edges = apply(PostEffect::EdgeDetect, &step);
        assert!(edges.sample(0, 1).x < 1e-6);
        assert!(edges.sample(3, 1).x > 0.5);
        assert!(edges.sample(4, 1).x > 0.5);
        assert!(edges.sample(7, 1).x < 1e-6);
    }

    #[test]
    fn image_conversion_round_trips_bytes() {
        let image = ImageData::solid(2, 1, [0, 128, 255, 255]);
        assert_eq!(ColorBuffer::from_image(&image).to_image(), image);
    }
}
