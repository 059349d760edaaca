use crate::context::RenderContext;
use crate::gpu::{AttributeLayout, BufferId, BufferKind, GpuDevice, TextureId, VertexArrayId};
use crate::program::ShaderProgram;
use crate::texture::{TextureRef, sampler_uniform_names};
use modelview_common::{PostEffect, TextureRole, Vertex};
use tracing::{debug, trace, warn};

#[derive(Debug, Clone, PartialEq)]
enum VertexData {
    /// Flat floats whose layout comes from a program's attribute table.
    Raw {
        floats: Vec<f32>,
        floats_per_vertex: usize,
    },
    /// [`Vertex`] records bound to slots 0, 1, 2.
    Interleaved(Vec<Vertex>),
}

/// CPU-side geometry waiting to be uploaded.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshData {
    vertices: VertexData,
    indices: Vec<u32>,
    textures: Vec<TextureRef>,
}

impl MeshData {
    pub fn raw(floats: Vec<f32>, floats_per_vertex: usize) -> Self {
        Self {
            vertices: VertexData::Raw {
                floats,
                floats_per_vertex,
            },
            indices: Vec::new(),
            textures: Vec::new(),
        }
    }

    pub fn from_vertices(
        vertices: Vec<Vertex>,
        indices: Vec<u32>,
        textures: Vec<TextureRef>,
    ) -> Self {
        Self {
            vertices: VertexData::Interleaved(vertices),
            indices,
            textures,
        }
    }

    pub fn with_indices(mut self, indices: Vec<u32>) -> Self {
        self.indices = indices;
        self
    }

    pub fn vertex_count(&self) -> usize {
        match &self.vertices {
            VertexData::Raw {
                floats,
                floats_per_vertex,
            } => floats.len().checked_div(*floats_per_vertex).unwrap_or(0),
            VertexData::Interleaved(vertices) => vertices.len(),
        }
    }

    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    fn vertex_bytes(&self) -> &[u8] {
        match &self.vertices {
            VertexData::Raw { floats, .. } => bytemuck::cast_slice(floats),
            VertexData::Interleaved(vertices) => bytemuck::cast_slice(vertices),
        }
    }
}

/// Geometry resident on the GPU: a vertex array, its vertex buffer and an
/// optional index buffer, plus the textures it samples.
///
/// Drawing is indexed whenever the mesh has indices, whichever draw method
/// is called. Buffers are released by [`Mesh::dispose`]; the textures belong
/// to whoever loaded them.
#[derive(Debug)]
pub struct Mesh {
    vertex_array: VertexArrayId,
    vertex_buffer: BufferId,
    index_buffer: Option<BufferId>,
    vertex_count: u32,
    index_count: u32,
    textures: Vec<TextureRef>,
    disposed: bool,
}

impl Mesh {
    /// Uploads `data` and records its attribute layout in a new vertex array.
    ///
    /// Raw data is laid out by `program`'s attribute table; without a program
    /// no attributes are configured. Interleaved data always uses the fixed
    /// [`Vertex`] layout.
    pub fn generate<G: GpuDevice + ?Sized>(
        ctx: &mut RenderContext<'_, G>,
        data: MeshData,
        program: Option<&ShaderProgram>,
    ) -> Self {
        let vertex_count = data.vertex_count() as u32;
        let index_count = data.index_count() as u32;

        let vertex_array = ctx.gpu().create_vertex_array();
        let vertex_buffer = ctx.gpu().create_buffer(BufferKind::Vertex, data.vertex_bytes());
        ctx.bind_vertex_array(Some(vertex_array));
        ctx.bind_buffer(BufferKind::Vertex, Some(vertex_buffer));

        let index_buffer = if data.indices.is_empty() {
            None
        } else {
            let id = ctx
                .gpu()
                .create_buffer(BufferKind::Index, bytemuck::cast_slice(&data.indices));
            ctx.bind_buffer(BufferKind::Index, Some(id));
            Some(id)
        };

        match (&data.vertices, program) {
            (VertexData::Raw { .. }, Some(program)) => {
                program.attributes().apply(ctx, program);
            }
            (VertexData::Raw { .. }, None) => {
                warn!("raw mesh generated without a program, no attributes configured");
            }
            (VertexData::Interleaved(_), _) => {
                let stride = Vertex::STRIDE as u32;
                let slots = [
                    (0, 3, Vertex::POSITION_OFFSET),
                    (1, 3, Vertex::NORMAL_OFFSET),
                    (2, 2, Vertex::TEX_COORDS_OFFSET),
                ];
                for (location, components, offset) in slots {
                    ctx.vertex_attrib_pointer(
                        location,
                        AttributeLayout::floats(components, stride, offset as u32),
                    );
                    ctx.enable_vertex_attrib(location);
                }
            }
        }

        ctx.bind_vertex_array(None);
        debug!(vertex_count, index_count, "mesh uploaded");

        Self {
            vertex_array,
            vertex_buffer,
            index_buffer,
            vertex_count,
            index_count,
            textures: data.textures,
            disposed: false,
        }
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    pub fn is_indexed(&self) -> bool {
        self.index_count > 0
    }

    pub fn textures(&self) -> &[TextureRef] {
        &self.textures
    }

    pub fn vertex_array(&self) -> VertexArrayId {
        self.vertex_array
    }

    fn issue<G: GpuDevice + ?Sized>(&self, ctx: &mut RenderContext<'_, G>) {
        ctx.bind_vertex_array(Some(self.vertex_array));
        if self.is_indexed() {
            ctx.draw_elements(self.index_count);
        } else {
            ctx.draw_arrays(0, self.vertex_count);
        }
        ctx.bind_vertex_array(None);
    }

    /// Activates `program` and draws the whole mesh. Nothing is drawn
    /// through a program that failed to link.
    pub fn draw<G: GpuDevice + ?Sized>(
        &self,
        ctx: &mut RenderContext<'_, G>,
        program: &ShaderProgram,
    ) {
        if !program.is_valid() {
            trace!(program = program.label(), "draw skipped");
            return;
        }
        program.activate(ctx);
        self.issue(ctx);
    }

    /// Non-indexed draw request. Meshes with indices still draw indexed.
    pub fn draw_arrays<G: GpuDevice + ?Sized>(
        &self,
        ctx: &mut RenderContext<'_, G>,
        program: &ShaderProgram,
    ) {
        if self.is_indexed() {
            debug!("mesh has indices, drawing indexed");
        }
        self.draw(ctx, program);
    }

    /// Indexed draw request. Meshes without indices fall back to arrays.
    pub fn draw_indexed<G: GpuDevice + ?Sized>(
        &self,
        ctx: &mut RenderContext<'_, G>,
        program: &ShaderProgram,
    ) {
        if !self.is_indexed() {
            warn!("indexed draw requested for a mesh without indices");
        }
        self.draw(ctx, program);
    }

    /// Binds each texture to its own unit, points the role-numbered sampler
    /// uniform at that unit, then draws.
    ///
    /// Every role in [`TextureRole::ALL`] the mesh does not supply gets
    /// `blank` on a unit of its own, so nothing bound by an earlier draw is
    /// sampled.
    pub fn draw_textured<G: GpuDevice + ?Sized>(
        &self,
        ctx: &mut RenderContext<'_, G>,
        program: &ShaderProgram,
        blank: TextureId,
    ) {
        if !program.is_valid() {
            trace!(program = program.label(), "draw skipped");
            return;
        }
        program.activate(ctx);
        let names = sampler_uniform_names(&self.textures);
        let missing: Vec<String> = TextureRole::ALL
            .iter()
            .map(|role| format!("{}1", role.uniform_prefix()))
            .filter(|name| !names.contains(name))
            .collect();
        let bindings = self
            .textures
            .iter()
            .map(|t| t.handle)
            .zip(&names)
            .chain(std::iter::repeat(blank).zip(&missing));
        for (unit, (texture, name)) in bindings.enumerate() {
            ctx.active_texture(unit as u32);
            program.set_uniform(ctx, name, unit as i32);
            ctx.bind_texture(Some(texture));
        }
        self.issue(ctx);
        ctx.active_texture(0);
    }

    /// Draws `source` through `program` onto the default framebuffer with
    /// depth testing off, selecting `effect`.
    pub fn draw_post_process<G: GpuDevice + ?Sized>(
        &self,
        ctx: &mut RenderContext<'_, G>,
        program: &ShaderProgram,
        effect: PostEffect,
        source: TextureId,
    ) {
        ctx.bind_framebuffer(None);
        ctx.set_depth_test(false);
        if !program.is_valid() {
            trace!(program = program.label(), "post-process skipped");
            return;
        }
        program.activate(ctx);
        program.set_uniform(ctx, "selector", effect.selector());
        ctx.active_texture(0);
        ctx.bind_texture(Some(source));
        self.issue(ctx);
        // The source is usually a render target; leave it unbound.
        ctx.bind_texture(None);
    }

    /// Releases the vertex array and buffers, each exactly once.
    pub fn dispose<G: GpuDevice + ?Sized>(mut self, ctx: &mut RenderContext<'_, G>) {
        let gpu = ctx.gpu();
        gpu.delete_vertex_array(self.vertex_array);
        gpu.delete_buffer(self.vertex_buffer);
        if let Some(index_buffer) = self.index_buffer {
            gpu.delete_buffer(index_buffer);
        }
        self.disposed = true;
    }
}

impl Drop for Mesh {
    fn drop(&mut self) {
        if !self.disposed {
            warn!(
                vertex_array = %self.vertex_array,
                "mesh dropped without dispose, GPU buffers leaked"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::ShaderStage;
    use crate::mock::{DrawKind, MockGpu};
    use crate::shader::ShaderUnit;
    use glam::{Vec2, Vec3};

    fn model_program<G: GpuDevice + ?Sized>(ctx: &mut RenderContext<'_, G>) -> ShaderProgram {
        ShaderProgram::link(
            ctx,
            "model",
            ShaderUnit::inline(
                "attribute position\nattribute normal\nattribute texcoord",
                ShaderStage::Vertex,
            ),
            ShaderUnit::inline(
                "uniform texture_diffuse1\nuniform texture_specular1\nuniform texture_diffuse2\noutput outColor",
                ShaderStage::Fragment,
            ),
        )
    }

    fn quad() -> (Vec<Vertex>, Vec<u32>) {
        let v = |x, y| Vertex::new(Vec3::new(x, y, 0.0), Vec3::Z, Vec2::new(x, y));
        (
            vec![v(0.0, 0.0), v(1.0, 0.0), v(1.0, 1.0), v(0.0, 1.0)],
            vec![0, 1, 2, 0, 2, 3],
        )
    }

    #[test]
    fn indexed_mesh_always_draws_its_indices() {
        let mut gpu = MockGpu::new(1, 1);
        let mut ctx = RenderContext::new(&mut gpu);
        let program = model_program(&mut ctx);
        let (vertices, indices) = quad();
        let mesh = Mesh::generate(&mut ctx, MeshData::from_vertices(vertices, indices, vec![]), None);

        mesh.draw_arrays(&mut ctx, &program);
        mesh.draw_indexed(&mut ctx, &program);
        mesh.dispose(&mut ctx);

        let kinds: Vec<DrawKind> = gpu.draws().iter().map(|d| d.kind.clone()).collect();
        assert_eq!(kinds, vec![DrawKind::Elements { count: 6 }; 2]);
        assert!(gpu.draws().iter().all(|d| d.element_buffer.is_some()));
    }

    #[test]
    fn unindexed_mesh_draws_arrays() {
        let mut gpu = MockGpu::new(1, 1);
        let mut ctx = RenderContext::new(&mut gpu);
        let program = model_program(&mut ctx);
        let mesh = Mesh::generate(&mut ctx, MeshData::raw(vec![0.0; 24], 8), Some(&program));
        assert_eq!(mesh.vertex_count(), 3);

        mesh.draw_indexed(&mut ctx, &program);
        mesh.dispose(&mut ctx);
        assert_eq!(gpu.draws()[0].kind, DrawKind::Arrays { first: 0, count: 3 });
    }

    #[test]
    fn dispose_releases_every_handle_once() {
        let mut gpu = MockGpu::new(1, 1);
        let mut ctx = RenderContext::new(&mut gpu);
        let (vertices, indices) = quad();
        let mesh = Mesh::generate(&mut ctx, MeshData::from_vertices(vertices, indices, vec![]), None);
        mesh.dispose(&mut ctx);

        assert_eq!(gpu.counts("buffer").created, 2);
        assert_eq!(gpu.counts("buffer").deleted, 2);
        assert_eq!(gpu.counts("vertex_array").deleted, 1);
        assert!(gpu.double_frees().is_empty());
        assert_eq!(gpu.live_handles(), 0);
    }

    #[test]
    fn interleaved_layout_uses_fixed_slots() {
        let mut gpu = MockGpu::new(1, 1);
        let mut ctx = RenderContext::new(&mut gpu);
        let (vertices, indices) = quad();
        let mesh = Mesh::generate(&mut ctx, MeshData::from_vertices(vertices, indices, vec![]), None);
        let vao = mesh.vertex_array();
        mesh.dispose(&mut ctx);

        let enabled = gpu.enabled_attributes(vao);
        let slots: Vec<(u32, u32)> = enabled.iter().map(|(loc, l)| (*loc, l.offset)).collect();
        assert_eq!(slots, vec![(0, 0), (1, 12), (2, 24)]);
    }

    #[test]
    fn textured_draw_binds_role_numbered_samplers() {
        let mut gpu = MockGpu::new(1, 1);
        let mut ctx = RenderContext::new(&mut gpu);
        let program = model_program(&mut ctx);
        let diffuse = ctx.gpu().create_texture(1, 1, None);
        let specular = ctx.gpu().create_texture(1, 1, None);
        let textures = vec![
            TextureRef {
                handle: diffuse,
                role: TextureRole::Diffuse,
                path: "d.png".into(),
            },
            TextureRef {
                handle: specular,
                role: TextureRole::Specular,
                path: "s.png".into(),
            },
        ];
        let (vertices, indices) = quad();
        let mesh = Mesh::generate(
            &mut ctx,
            MeshData::from_vertices(vertices, indices, textures),
            None,
        );
        let blank = ctx.gpu().create_texture(1, 1, None);
        mesh.draw_textured(&mut ctx, &program, blank);
        assert_eq!(ctx.state().active_texture_unit, 0);
        mesh.dispose(&mut ctx);

        let draw = &gpu.draws()[0];
        assert_eq!(draw.textures.get(&0), Some(&diffuse));
        assert_eq!(draw.textures.get(&1), Some(&specular));
        assert_eq!(
            draw.uniforms.get("texture_specular1"),
            Some(&crate::gpu::UniformValue::Int(1))
        );
    }
    fn textured_mesh<G: GpuDevice + ?Sized>(
        ctx: &mut RenderContext<'_, G>,
        textures: Vec<TextureRef>,
    ) -> Mesh {
        let (vertices, indices) = quad();
        Mesh::generate(ctx, MeshData::from_vertices(vertices, indices, textures), None)
    }

    #[test]
    fn missing_roles_sample_the_blank_texture() {
        let mut gpu = MockGpu::new(1, 1);
        let mut ctx = RenderContext::new(&mut gpu);
        let program = model_program(&mut ctx);
        let blank = ctx.gpu().create_texture(1, 1, None);
        let diffuse = ctx.gpu().create_texture(1, 1, None);
        let specular = ctx.gpu().create_texture(1, 1, None);
        let first = textured_mesh(
            &mut ctx,
            vec![
                TextureRef {
                    handle: diffuse,
                    role: TextureRole::Diffuse,
                    path: "d.png".into(),
                },
                TextureRef {
                    handle: specular,
                    role: TextureRole::Specular,
                    path: "s.png".into(),
                },
            ],
        );
        let second = textured_mesh(
            &mut ctx,
            vec![TextureRef {
                handle: diffuse,
                role: TextureRole::Diffuse,
                path: "d.png".into(),
            }],
        );
        let bare = textured_mesh(&mut ctx, vec![]);

        first.draw_textured(&mut ctx, &program, blank);
        second.draw_textured(&mut ctx, &program, blank);
        bare.draw_textured(&mut ctx, &program, blank);
        for mesh in [first, second, bare] {
            mesh.dispose(&mut ctx);
        }

        let sampled = |draw: &crate::mock::DrawRecord, name: &str| match draw.uniforms.get(name) {
            Some(crate::gpu::UniformValue::Int(unit)) => draw.textures.get(&(*unit as u32)).copied(),
            _ => None,
        };
        let draws = gpu.draws();
        assert_eq!(sampled(&draws[1], "texture_diffuse1"), Some(diffuse));
        assert_eq!(sampled(&draws[1], "texture_specular1"), Some(blank));
        assert_eq!(sampled(&draws[2], "texture_diffuse1"), Some(blank));
        assert_eq!(sampled(&draws[2], "texture_specular1"), Some(blank));
    }

    #[test]
    fn post_process_leaves_no_texture_bound() {
        let mut gpu = MockGpu::new(1, 1);
        let mut ctx = RenderContext::new(&mut gpu);
        let program = ShaderProgram::link(
            &mut ctx,
            "screen",
            ShaderUnit::inline("attribute position", ShaderStage::Vertex),
            ShaderUnit::inline("uniform selector\noutput outColor", ShaderStage::Fragment),
        );
        let source = ctx.gpu().create_texture(1, 1, None);
        let mesh = textured_mesh(&mut ctx, vec![]);
        mesh.draw_post_process(&mut ctx, &program, PostEffect::Invert, source);
        mesh.draw(&mut ctx, &program);
        mesh.dispose(&mut ctx);

        let draws = gpu.draws();
        assert_eq!(draws[0].textures.get(&0), Some(&source));
        assert!(draws[1].textures.is_empty());
    }
}
