use crate::attributes::AttributeTable;
use crate::config::RenderConfig;
use crate::context::RenderContext;
use crate::gpu::{GpuDevice, ScalarType, ShaderStage, TextureId};
use crate::mesh::{Mesh, MeshData};
use crate::model::Model;
use crate::primitives;
use crate::program::ShaderProgram;
use crate::shader::{ShaderSource, ShaderUnit};
use crate::target::OffscreenTarget;
use crate::texture::blank_texture;
use glam::{Mat4, Vec3};
use modelview_common::{ImageLoader, ImportedScene, PostEffect, SceneParams};
use std::path::Path;
use tracing::{info, warn};

/// Vertex + fragment source of one program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramSources {
    pub vertex: ShaderSource,
    pub fragment: ShaderSource,
}

impl ProgramSources {
    pub fn inline(vertex: &str, fragment: &str) -> Self {
        Self {
            vertex: ShaderSource::Inline(vertex.to_owned()),
            fragment: ShaderSource::Inline(fragment.to_owned()),
        }
    }

    /// `<dir>/<name>.vert.wgsl` and `<dir>/<name>.frag.wgsl`.
    pub fn from_dir(dir: &Path, name: &str) -> Self {
        Self {
            vertex: ShaderSource::File(dir.join(format!("{name}.vert.wgsl"))),
            fragment: ShaderSource::File(dir.join(format!("{name}.frag.wgsl"))),
        }
    }

    fn link<G: GpuDevice + ?Sized>(
        &self,
        ctx: &mut RenderContext<'_, G>,
        label: &str,
    ) -> ShaderProgram {
        ShaderProgram::link(
            ctx,
            label,
            ShaderUnit::new(self.vertex.clone(), ShaderStage::Vertex),
            ShaderUnit::new(self.fragment.clone(), ShaderStage::Fragment),
        )
    }
}

/// Sources of the four programs the pipeline runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderSet {
    pub grid: ProgramSources,
    pub model: ProgramSources,
    pub light: ProgramSources,
    pub screen: ProgramSources,
}

impl ShaderSet {
    pub const NAMES: [&'static str; 4] = ["grid", "model", "light", "screen"];

    pub fn from_dir(dir: &Path) -> Self {
        Self {
            grid: ProgramSources::from_dir(dir, "grid"),
            model: ProgramSources::from_dir(dir, "model"),
            light: ProgramSources::from_dir(dir, "light"),
            screen: ProgramSources::from_dir(dir, "screen"),
        }
    }
}

/// Result of one rendered frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameStats {
    pub draw_calls: u32,
    pub effect: PostEffect,
}

/// The two-pass renderer: scene into an offscreen target, then a
/// full-screen quad through the post-process program onto the window.
///
/// All programs, meshes and the target are created up front; a frame only
/// sets uniforms and issues draws.
#[derive(Debug)]
pub struct RenderPipeline {
    grid_program: ShaderProgram,
    model_program: ShaderProgram,
    light_program: ShaderProgram,
    screen_program: ShaderProgram,
    grid: Mesh,
    model: Model,
    light_marker: Mesh,
    screen_quad: Mesh,
    /// Sampled for any texture role a mesh does not supply.
    blank_texture: TextureId,
    target: OffscreenTarget,
    projection: Mat4,
    clear_color: [f32; 4],
}

impl RenderPipeline {
    pub fn new<G: GpuDevice + ?Sized>(
        ctx: &mut RenderContext<'_, G>,
        config: &RenderConfig,
        shaders: &ShaderSet,
        scene: Option<ImportedScene>,
        images: &dyn ImageLoader,
    ) -> Self {
        let projection = config.projection().matrix();

        let mut screen_program = shaders.screen.link(ctx, "screen");
        let quad_stride = (primitives::SCREEN_QUAD_FLOATS_PER_VERTEX * 4) as u32;
        screen_program
            .attributes_mut()
            .add(2, ScalarType::Float, false, quad_stride, "position", 0)
            .add(2, ScalarType::Float, false, quad_stride, "texcoord", 8);
        let screen_quad = Mesh::generate(ctx, primitives::screen_quad(), Some(&screen_program));
        screen_program.activate(ctx);
        screen_program.set_uniform(ctx, "screenTexture", 0);

        let mut grid_program = shaders.grid.link(ctx, "grid");
        *grid_program.attributes_mut() = AttributeTable::interleaved_vertex();
        let grid_settings = &config.grid;
        grid_program.activate(ctx);
        grid_program.set_uniform(ctx, "projection", projection);
        grid_program.set_uniform(ctx, "cellSize", grid_settings.cell_size);
        grid_program.set_uniform(ctx, "lineWidth", grid_settings.line_width);
        grid_program.set_uniform(ctx, "fadeDistance", grid_settings.fade_distance);
        grid_program.set_uniform(ctx, "gridColor", Vec3::from(grid_settings.grid_color));
        grid_program.set_uniform(ctx, "bgColor", Vec3::from(grid_settings.bg_color));
        let grid = Mesh::generate(
            ctx,
            primitives::ground_plane(grid_settings.half_extent, grid_settings.uv_repeat),
            Some(&grid_program),
        );

        let model_program = shaders.model.link(ctx, "model");
        let model = match scene {
            Some(scene) => Model::from_scene(ctx, scene, images),
            None => {
                warn!("no model loaded, rendering grid and light only");
                Model::empty()
            }
        };

        let light_program = shaders.light.link(ctx, "light");
        light_program.activate(ctx);
        light_program.set_uniform(ctx, "color", Vec3::from(config.light_marker.color));
        let marker = &config.light_marker;
        let (vertices, indices) = primitives::uv_sphere(marker.radius, marker.stacks, marker.sectors);
        let light_marker = Mesh::generate(ctx, MeshData::from_vertices(vertices, indices, Vec::new()), None);

        let blank_texture = blank_texture(ctx.gpu());
        let target = OffscreenTarget::create(ctx, config.width, config.height);

        info!(
            width = config.width,
            height = config.height,
            meshes = model.meshes().len(),
            "render pipeline ready"
        );

        Self {
            grid_program,
            model_program,
            light_program,
            screen_program,
            grid,
            model,
            light_marker,
            screen_quad,
            blank_texture,
            target,
            projection,
            clear_color: config.clear_color,
        }
    }

    pub fn projection(&self) -> Mat4 {
        self.projection
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn target(&self) -> &OffscreenTarget {
        &self.target
    }

    /// Draws the scene into the offscreen target, then the post-processed
    /// quad onto the default framebuffer. Presenting is left to the caller.
    pub fn render_frame<G: GpuDevice + ?Sized>(
        &self,
        ctx: &mut RenderContext<'_, G>,
        view: Mat4,
        params: &SceneParams,
    ) -> FrameStats {
        let draws_before = ctx.draw_calls();

        self.target.bind(ctx);
        ctx.set_depth_test(true);
        ctx.clear(self.clear_color);

        self.grid_program.activate(ctx);
        self.grid_program.set_uniform(ctx, "model", Mat4::IDENTITY);
        self.grid_program.set_uniform(ctx, "view", view);
        self.grid_program.set_uniform(ctx, "projection", self.projection);
        ctx.set_blend(true);
        self.grid.draw_arrays(ctx, &self.grid_program);
        ctx.set_blend(false);

        let program = &self.model_program;
        program.activate(ctx);
        program.set_uniform(ctx, "model", params.model_matrix());
        program.set_uniform(ctx, "view", view);
        program.set_uniform(ctx, "projection", self.projection);
        program.set_uniform(ctx, "texture_diffuse1", 0);
        program.set_uniform(ctx, "texture_specular1", 1);
        program.set_uniform(ctx, "lightPos", params.light_position);
        program.set_uniform(ctx, "ambientLight", params.ambient_light());
        self.model.draw(ctx, program, self.blank_texture);

        let program = &self.light_program;
        program.activate(ctx);
        program.set_uniform(ctx, "model", params.light_matrix());
        program.set_uniform(ctx, "view", view);
        program.set_uniform(ctx, "projection", self.projection);
        self.light_marker.draw_indexed(ctx, program);

        self.screen_quad.draw_post_process(
            ctx,
            &self.screen_program,
            params.effect,
            self.target.color_texture(),
        );

        FrameStats {
            draw_calls: ctx.draw_calls() - draws_before,
            effect: params.effect,
        }
    }

    /// Releases every program, mesh, texture and the offscreen target.
    pub fn dispose<G: GpuDevice + ?Sized>(self, ctx: &mut RenderContext<'_, G>) {
        self.grid.dispose(ctx);
        self.light_marker.dispose(ctx);
        self.screen_quad.dispose(ctx);
        self.model.dispose(ctx);
        ctx.gpu().delete_texture(self.blank_texture);
        self.target.destroy(ctx);
        self.grid_program.delete(ctx);
        self.model_program.delete(ctx);
        self.light_program.delete(ctx);
        self.screen_program.delete(ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::UniformValue;
    use crate::mock::{self, MockGpu};
    use modelview_common::{ImportedMesh, Vertex};

    fn small_config() -> RenderConfig {
        RenderConfig {
            width: 8,
            height: 6,
            ..RenderConfig::default()
        }
    }

    #[test]
    fn offscreen_draws_precede_the_post_process_pass() {
        let mut gpu = MockGpu::new(8, 6);
        let mut ctx = RenderContext::new(&mut gpu);
        let pipeline = RenderPipeline::new(
            &mut ctx,
            &small_config(),
            &mock::shader_set(),
            None,
            &mock::NoImages,
        );
        let stats = pipeline.render_frame(&mut ctx, Mat4::IDENTITY, &SceneParams::default());
        let offscreen = pipeline.target().framebuffer();
        pipeline.dispose(&mut ctx);

        // grid + light + quad
        assert_eq!(stats.draw_calls, 3);
        let draws = gpu.draws();
        let (last, scene) = draws.split_last().unwrap();
        assert!(scene.iter().all(|d| d.framebuffer == offscreen && d.depth_test));
        assert_eq!(last.framebuffer, None);
        assert!(!last.depth_test);
        assert_eq!(last.uniforms.get("selector"), Some(&UniformValue::Int(0)));
    }

    fn triangle_scene() -> ImportedScene {
        ImportedScene {
            meshes: vec![ImportedMesh {
                vertices: vec![Vertex::default(); 3],
                indices: vec![0, 1, 2],
                ..ImportedMesh::default()
            }],
            ..ImportedScene::default()
        }
    }

    #[test]
    fn model_uniforms_come_from_scene_params() {
        let mut gpu = MockGpu::new(8, 6);
        let mut ctx = RenderContext::new(&mut gpu);
        let pipeline = RenderPipeline::new(
            &mut ctx,
            &small_config(),
            &mock::shader_set(),
            Some(triangle_scene()),
            &mock::NoImages,
        );
        let params = SceneParams {
            model_scale: 3.0,
            light_position: Vec3::new(2.0, 5.0, -1.0),
            ambient_intensity: 0.5,
            ..SceneParams::default()
        };
        pipeline.render_frame(&mut ctx, Mat4::IDENTITY, &params);
        pipeline.dispose(&mut ctx);

        let draws = gpu.draws();
        let model_draw = &draws[1];
        assert_eq!(
            model_draw.uniforms.get("model"),
            Some(&UniformValue::Mat4(params.model_matrix()))
        );
        assert_eq!(
            model_draw.uniforms.get("lightPos"),
            Some(&UniformValue::Vec3(params.light_position))
        );
        assert_eq!(
            model_draw.uniforms.get("ambientLight"),
            Some(&UniformValue::Vec4(params.ambient_light()))
        );

        let light_draw = &draws[2];
        assert_eq!(
            light_draw.uniforms.get("model"),
            Some(&UniformValue::Mat4(params.light_matrix()))
        );
    }

    #[test]
    fn dispose_leaves_nothing_alive() {
        let mut gpu = MockGpu::new(8, 6);
        let mut ctx = RenderContext::new(&mut gpu);
        let pipeline = RenderPipeline::new(
            &mut ctx,
            &small_config(),
            &mock::shader_set(),
            None,
            &mock::NoImages,
        );
        pipeline.dispose(&mut ctx);
        assert_eq!(gpu.live_handles(), 0);
        assert!(gpu.double_frees().is_empty());
    }

    #[test]
    fn broken_program_skips_its_draws() {
        let mut gpu = MockGpu::new(8, 6);
        let mut ctx = RenderContext::new(&mut gpu);
        let mut shaders = mock::shader_set();
        shaders.model = ProgramSources::inline("fail", "fail");
        let pipeline = RenderPipeline::new(
            &mut ctx,
            &small_config(),
            &shaders,
            Some(triangle_scene()),
            &mock::NoImages,
        );
        let stats = pipeline.render_frame(&mut ctx, Mat4::IDENTITY, &SceneParams::default());
        pipeline.dispose(&mut ctx);

        assert_eq!(stats.draw_calls, 3);
        assert!(gpu.double_frees().is_empty());
        assert_eq!(gpu.live_handles(), 0);
    }
    #[test]
    fn later_frames_never_sample_the_target_they_draw_into() {
        let mut gpu = MockGpu::new(8, 6);
        let mut ctx = RenderContext::new(&mut gpu);
        let pipeline = RenderPipeline::new(
            &mut ctx,
            &small_config(),
            &mock::shader_set(),
            Some(triangle_scene()),
            &mock::NoImages,
        );
        let params = SceneParams {
            effect: PostEffect::Invert,
            ..SceneParams::default()
        };
        for _ in 0..3 {
            pipeline.render_frame(&mut ctx, Mat4::IDENTITY, &params);
        }
        let offscreen = pipeline.target().framebuffer();
        let color = pipeline.target().color_texture();
        pipeline.dispose(&mut ctx);

        // grid + model + light + quad, three times
        let draws = gpu.draws();
        assert_eq!(draws.len(), 12);
        for (i, draw) in draws.iter().enumerate() {
            if draw.framebuffer == offscreen {
                assert!(
                    !draw.textures.values().any(|t| *t == color),
                    "draw {i} samples its own render target: {:?}",
                    draw.textures
                );
            } else {
                assert_eq!(draw.textures.get(&0), Some(&color), "draw {i}");
            }
        }
        for frame in draws.chunks(4) {
            let model = &frame[1];
            for sampler in ["texture_diffuse1", "texture_specular1"] {
                let Some(UniformValue::Int(unit)) = model.uniforms.get(sampler) else {
                    panic!("{sampler} not set");
                };
                assert!(model.textures.contains_key(&(*unit as u32)));
            }
        }
    }

    #[test]
    fn every_frame_shows_the_selected_effect() {
        let mut gpu = MockGpu::new(8, 6);
        let mut ctx = RenderContext::new(&mut gpu);
        let pipeline = RenderPipeline::new(
            &mut ctx,
            &small_config(),
            &mock::shader_set(),
            None,
            &mock::NoImages,
        );
        let effects = [PostEffect::Passthrough, PostEffect::Greyscale, PostEffect::Passthrough];
        let selectors: Vec<Option<UniformValue>> = effects
            .iter()
            .map(|&effect| {
                let params = SceneParams {
                    effect,
                    ..SceneParams::default()
                };
                let stats = pipeline.render_frame(&mut ctx, Mat4::IDENTITY, &params);
                assert_eq!(stats.effect, effect);
                ctx.gpu().draws().last().and_then(|d| d.uniforms.get("selector").cloned())
            })
            .collect();
        pipeline.dispose(&mut ctx);

        assert_eq!(
            selectors,
            vec![
                Some(UniformValue::Int(0)),
                Some(UniformValue::Int(2)),
                Some(UniformValue::Int(0)),
            ]
        );
    }
}
