use crate::context::RenderContext;
use crate::gpu::{FramebufferId, GpuDevice, RenderbufferId, TextureId};
use tracing::{debug, error};

/// Offscreen framebuffer the scene pass renders into: an RGBA8 color texture
/// plus a combined depth/stencil attachment, both at viewport size.
#[derive(Debug)]
pub struct OffscreenTarget {
    framebuffer: Option<FramebufferId>,
    color: TextureId,
    depth_stencil: RenderbufferId,
    width: u32,
    height: u32,
}

impl OffscreenTarget {
    /// Allocates the attachments. An incomplete framebuffer is logged and the
    /// target then falls back to the default framebuffer.
    pub fn create<G: GpuDevice + ?Sized>(
        ctx: &mut RenderContext<'_, G>,
        width: u32,
        height: u32,
    ) -> Self {
        let gpu = ctx.gpu();
        let color = gpu.create_texture(width, height, None);
        let depth_stencil = gpu.create_renderbuffer(width, height);
        let framebuffer = match gpu.create_framebuffer(color, depth_stencil) {
            Ok(id) => {
                debug!(width, height, "offscreen target ready");
                Some(id)
            }
            Err(e) => {
                error!("{e}");
                None
            }
        };
        Self {
            framebuffer,
            color,
            depth_stencil,
            width,
            height,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.framebuffer.is_some()
    }

    pub fn framebuffer(&self) -> Option<FramebufferId> {
        self.framebuffer
    }

    pub fn color_texture(&self) -> TextureId {
        self.color
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn bind<G: GpuDevice + ?Sized>(&self, ctx: &mut RenderContext<'_, G>) {
        ctx.bind_framebuffer(self.framebuffer);
    }

    pub fn destroy<G: GpuDevice + ?Sized>(self, ctx: &mut RenderContext<'_, G>) {
        let gpu = ctx.gpu();
        if let Some(framebuffer) = self.framebuffer {
            gpu.delete_framebuffer(framebuffer);
        }
        gpu.delete_renderbuffer(self.depth_stencil);
        gpu.delete_texture(self.color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockGpu;

    #[test]
    fn allocates_viewport_sized_attachments() {
        let mut gpu = MockGpu::new(16, 9);
        let mut ctx = RenderContext::new(&mut gpu);
        let target = OffscreenTarget::create(&mut ctx, 16, 9);
        assert!(target.is_complete());
        assert_eq!(ctx.gpu().texture_size(target.color_texture()), Some((16, 9)));

        target.bind(&mut ctx);
        assert_eq!(ctx.state().framebuffer, target.framebuffer());
        target.destroy(&mut ctx);
        assert_eq!(gpu.live_handles(), 0);
    }

    #[test]
    fn zero_sized_target_is_incomplete() {
        let mut gpu = MockGpu::new(16, 9);
        let mut ctx = RenderContext::new(&mut gpu);
        let target = OffscreenTarget::create(&mut ctx, 0, 0);
        assert!(!target.is_complete());
        target.destroy(&mut ctx);
        assert!(gpu.double_frees().is_empty());
    }
}
