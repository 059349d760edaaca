use crate::camera::OrientationCamera;
use crate::config::ViewerConfig;
use crate::context::RenderContext;
use crate::gpu::{GpuDevice, GpuError};
use crate::pipeline::{FrameStats, RenderPipeline, ShaderSet};
use modelview_common::{Action, ImageLoader, ImportedScene, SceneParams};
use std::time::{Duration, Instant};
use tracing::info;

/// Longest frame step fed to the camera, so a stall does not teleport it.
pub const MAX_FRAME_STEP: Duration = Duration::from_millis(100);

/// Measures time between frames.
#[derive(Debug, Clone)]
pub struct FrameClock {
    last: Option<Instant>,
    max_step: Duration,
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameClock {
    pub fn new() -> Self {
        Self {
            last: None,
            max_step: MAX_FRAME_STEP,
        }
    }

    /// Seconds since the previous tick; zero on the first.
    pub fn tick(&mut self) -> f32 {
        self.tick_at(Instant::now())
    }

    pub fn tick_at(&mut self, now: Instant) -> f32 {
        let dt = self
            .last
            .map(|last| now.saturating_duration_since(last).min(self.max_step))
            .unwrap_or_default();
        self.last = Some(now);
        dt.as_secs_f32()
    }
}

/// A device, a camera and the pipeline that draws with them.
///
/// One call to [`Viewer::frame`] runs the whole per-frame procedure: step the
/// clock, apply input to the camera, render both passes and present.
pub struct Viewer<G: GpuDevice> {
    gpu: G,
    camera: OrientationCamera,
    pipeline: RenderPipeline,
    clock: FrameClock,
}

impl<G: GpuDevice> Viewer<G> {
    pub fn new(
        mut gpu: G,
        config: &ViewerConfig,
        shaders: &ShaderSet,
        scene: Option<ImportedScene>,
        images: &dyn ImageLoader,
    ) -> Self {
        let pipeline = {
            let mut ctx = RenderContext::new(&mut gpu);
            RenderPipeline::new(&mut ctx, &config.render, shaders, scene, images)
        };
        let camera = config.camera.build();
        info!(position = %camera.position, "viewer ready");
        Self {
            gpu,
            camera,
            pipeline,
            clock: FrameClock::new(),
        }
    }

    pub fn camera(&self) -> &OrientationCamera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut OrientationCamera {
        &mut self.camera
    }

    pub fn pipeline(&self) -> &RenderPipeline {
        &self.pipeline
    }

    pub fn gpu(&self) -> &G {
        &self.gpu
    }

    pub fn gpu_mut(&mut self) -> &mut G {
        &mut self.gpu
    }

    pub fn frame(
        &mut self,
        actions: &[Action],
        params: &SceneParams,
    ) -> Result<FrameStats, GpuError> {
        let dt = self.clock.tick();
        self.frame_with_step(dt, actions, params)
    }

    /// [`Viewer::frame`] with an explicit time step in seconds.
    pub fn frame_with_step(
        &mut self,
        dt: f32,
        actions: &[Action],
        params: &SceneParams,
    ) -> Result<FrameStats, GpuError> {
        for action in actions {
            self.camera.apply(action, dt);
        }
        let view = self.camera.view_matrix();
        let mut ctx = RenderContext::new(&mut self.gpu);
        let stats = self.pipeline.render_frame(&mut ctx, view, params);
        ctx.present()?;
        Ok(stats)
    }

    /// Releases every GPU resource and hands the device back.
    pub fn shutdown(self) -> G {
        let Viewer {
            mut gpu, pipeline, ..
        } = self;
        pipeline.dispose(&mut RenderContext::new(&mut gpu));
        info!("viewer shut down");
        gpu
    }
}
