//! Recording [`GpuDevice`] for tests.
//!
//! Shader "source" is a list of declarations, one per line:
//! `attribute <name>`, `uniform <name>`, `output <name>`, or `fail <log>` to
//! make compilation fail. Clears and post-process draws are simulated on
//! CPU color buffers so presented output can be inspected.

use crate::effects::{self, ColorBuffer};
use crate::gpu::{
    AttributeLayout, BufferId, BufferKind, FragmentOutput, FramebufferId, GpuDevice, GpuError,
    ProgramId, RenderbufferId, ShaderId, ShaderStage, TextureId, UniformLocation, UniformValue,
    VertexArrayId,
};
use crate::pipeline::{ProgramSources, ShaderSet};
use glam::Vec4;
use modelview_common::{ImageData, ImageError, ImageLoader, PostEffect};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceCounts {
    pub created: u32,
    pub deleted: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrawKind {
    Arrays { first: u32, count: u32 },
    Elements { count: u32 },
}

/// Device state captured at a draw call.
#[derive(Debug, Clone)]
pub struct DrawRecord {
    pub kind: DrawKind,
    pub program: Option<ProgramId>,
    pub vertex_array: Option<VertexArrayId>,
    pub element_buffer: Option<BufferId>,
    pub framebuffer: Option<FramebufferId>,
    pub depth_test: bool,
    pub blend: bool,
    pub textures: BTreeMap<u32, TextureId>,
    pub uniforms: BTreeMap<String, UniformValue>,
}

#[derive(Debug)]
struct MockShader {
    attributes: Vec<String>,
    uniforms: Vec<String>,
    outputs: Vec<String>,
}

impl MockShader {
    fn parse(source: &str) -> Result<Self, String> {
        let mut shader = Self {
            attributes: Vec::new(),
            uniforms: Vec::new(),
            outputs: Vec::new(),
        };
        for line in source.lines() {
            let line = line.trim();
            let (keyword, rest) = line.split_once(' ').unwrap_or((line, ""));
            match keyword {
                "attribute" => shader.attributes.push(rest.trim().to_owned()),
                "uniform" => shader.uniforms.push(rest.trim().to_owned()),
                "output" => shader.outputs.push(rest.trim().to_owned()),
                "fail" => return Err(format!("error: {}", rest.trim())),
                _ => {}
            }
        }
        Ok(shader)
    }
}

#[derive(Debug, Default)]
struct MockProgram {
    attributes: Vec<String>,
    uniforms: Vec<String>,
    values: BTreeMap<String, UniformValue>,
}

#[derive(Debug, Default)]
struct MockVertexArray {
    attributes: BTreeMap<u32, AttributeLayout>,
    enabled: BTreeSet<u32>,
    element_buffer: Option<BufferId>,
}

#[derive(Debug)]
pub struct MockGpu {
    next_id: u32,
    counts: BTreeMap<&'static str, ResourceCounts>,
    live: BTreeSet<(&'static str, u32)>,
    double_frees: Vec<String>,
    compile_attempts: u32,

    shaders: HashMap<u32, MockShader>,
    programs: HashMap<u32, MockProgram>,
    vertex_arrays: HashMap<u32, MockVertexArray>,
    textures: HashMap<u32, ColorBuffer>,
    renderbuffers: HashMap<u32, (u32, u32)>,
    framebuffers: HashMap<u32, TextureId>,

    program: Option<ProgramId>,
    vertex_array: Option<VertexArrayId>,
    active_unit: u32,
    units: BTreeMap<u32, TextureId>,
    framebuffer: Option<FramebufferId>,
    depth_test: bool,
    blend: bool,

    screen: ColorBuffer,
    presented: Vec<ColorBuffer>,
    draws: Vec<DrawRecord>,
}

impl MockGpu {
    /// A device whose default framebuffer is `width` × `height`.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            next_id: 1,
            counts: BTreeMap::new(),
            live: BTreeSet::new(),
            double_frees: Vec::new(),
            compile_attempts: 0,
            shaders: HashMap::new(),
            programs: HashMap::new(),
            vertex_arrays: HashMap::new(),
            textures: HashMap::new(),
            renderbuffers: HashMap::new(),
            framebuffers: HashMap::new(),
            program: None,
            vertex_array: None,
            active_unit: 0,
            units: BTreeMap::new(),
            framebuffer: None,
            depth_test: false,
            blend: false,
            screen: ColorBuffer::solid(width, height, Vec4::ZERO),
            presented: Vec::new(),
            draws: Vec::new(),
        }
    }

    pub fn counts(&self, kind: &str) -> ResourceCounts {
        self.counts.get(kind).copied().unwrap_or_default()
    }

    /// Handles created and not yet deleted, across all kinds.
    pub fn live_handles(&self) -> usize {
        self.live.len()
    }

    pub fn double_frees(&self) -> &[String] {
        &self.double_frees
    }

    pub fn compile_attempts(&self) -> u32 {
        self.compile_attempts
    }

    pub fn draws(&self) -> &[DrawRecord] {
        &self.draws
    }

    pub fn presented(&self) -> &[ColorBuffer] {
        &self.presented
    }

    pub fn uniform_value(&self, program: ProgramId, name: &str) -> Option<UniformValue> {
        self.programs.get(&program.0)?.values.get(name).copied()
    }

    /// Enabled attribute slots of a vertex array, by location. Still
    /// available after the array is deleted.
    pub fn enabled_attributes(&self, vertex_array: VertexArrayId) -> Vec<(u32, AttributeLayout)> {
        self.vertex_arrays
            .get(&vertex_array.0)
            .map(|vao| {
                vao.attributes
                    .iter()
                    .filter(|(loc, _)| vao.enabled.contains(loc))
                    .map(|(loc, layout)| (*loc, *layout))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn texture_size(&self, texture: TextureId) -> Option<(u32, u32)> {
        self.textures
            .get(&texture.0)
            .map(|buffer| (buffer.width(), buffer.height()))
    }

    fn allocate(&mut self, kind: &'static str) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        self.counts.entry(kind).or_default().created += 1;
        self.live.insert((kind, id));
        id
    }

    /// Returns false, and records the attempt, if `id` is not live.
    fn release(&mut self, kind: &'static str, id: u32) -> bool {
        if self.live.remove(&(kind, id)) {
            self.counts.entry(kind).or_default().deleted += 1;
            true
        } else {
            self.double_frees.push(format!("{kind}#{id}"));
            false
        }
    }

    fn target_buffer(&mut self) -> Option<&mut ColorBuffer> {
        match self.framebuffer {
            None => Some(&mut self.screen),
            Some(fb) => {
                let color = *self.framebuffers.get(&fb.0)?;
                self.textures.get_mut(&color.0)
            }
        }
    }

    fn record_draw(&mut self, kind: DrawKind) {
        let uniforms = self
            .program
            .and_then(|p| self.programs.get(&p.0))
            .map(|p| p.values.clone())
            .unwrap_or_default();

        let effect = match uniforms.get("selector") {
            Some(UniformValue::Int(selector)) => PostEffect::from_selector(*selector),
            _ => None,
        };
        if let Some(effect) = effect {
            let source = self
                .units
                .get(&0)
                .and_then(|t| self.textures.get(&t.0))
                .cloned();
            if let Some(source) = source {
                let output = effects::apply(effect, &source);
                if let Some(target) = self.target_buffer() {
                    if target.width() == output.width() && target.height() == output.height() {
                        *target = output;
                    }
                }
            }
        }

        let element_buffer = self
            .vertex_array
            .and_then(|v| self.vertex_arrays.get(&v.0))
            .and_then(|vao| vao.element_buffer);
        self.draws.push(DrawRecord {
            kind,
            program: self.program,
            vertex_array: self.vertex_array,
            element_buffer,
            framebuffer: self.framebuffer,
            depth_test: self.depth_test,
            blend: self.blend,
            textures: self.units.clone(),
            uniforms,
        });
    }
}

impl GpuDevice for MockGpu {
    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<ShaderId, GpuError> {
        self.compile_attempts += 1;
        let shader = MockShader::parse(source).map_err(|log| GpuError::Compile { stage, log })?;
        let id = self.allocate("shader");
        self.shaders.insert(id, shader);
        Ok(ShaderId(id))
    }

    fn delete_shader(&mut self, shader: ShaderId) {
        if self.release("shader", shader.0) {
            self.shaders.remove(&shader.0);
        }
    }

    fn link_program(
        &mut self,
        vertex: ShaderId,
        fragment: ShaderId,
        output: FragmentOutput<'_>,
    ) -> Result<ProgramId, GpuError> {
        let (Some(vs), Some(fs)) = (self.shaders.get(&vertex.0), self.shaders.get(&fragment.0))
        else {
            return Err(GpuError::Link("unknown shader handle".into()));
        };
        if !fs.outputs.iter().any(|o| o == output.name) {
            return Err(GpuError::Link(format!(
                "fragment shader has no output `{}`",
                output.name
            )));
        }
        let mut uniforms = vs.uniforms.clone();
        for name in &fs.uniforms {
            if !uniforms.contains(name) {
                uniforms.push(name.clone());
            }
        }
        let program = MockProgram {
            attributes: vs.attributes.clone(),
            uniforms,
            values: BTreeMap::new(),
        };
        let id = self.allocate("program");
        self.programs.insert(id, program);
        Ok(ProgramId(id))
    }

    fn delete_program(&mut self, program: ProgramId) {
        self.release("program", program.0);
    }

    fn use_program(&mut self, program: Option<ProgramId>) {
        self.program = program;
    }

    fn attribute_location(&self, program: ProgramId, name: &str) -> Option<u32> {
        let program = self.programs.get(&program.0)?;
        program
            .attributes
            .iter()
            .position(|a| a == name)
            .map(|i| i as u32)
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        let index = self
            .programs
            .get(&program.0)?
            .uniforms
            .iter()
            .position(|u| u == name)?;
        Some(UniformLocation {
            program,
            index: index as u32,
        })
    }

    fn set_uniform(&mut self, location: &UniformLocation, value: UniformValue) {
        if let Some(program) = self.programs.get_mut(&location.program.0) {
            if let Some(name) = program.uniforms.get(location.index as usize).cloned() {
                program.values.insert(name, value);
            }
        }
    }

    fn create_buffer(&mut self, _kind: BufferKind, _contents: &[u8]) -> BufferId {
        BufferId(self.allocate("buffer"))
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        self.release("buffer", buffer.0);
    }

    fn bind_buffer(&mut self, kind: BufferKind, buffer: Option<BufferId>) {
        if kind == BufferKind::Index {
            if let Some(vao) = self
                .vertex_array
                .and_then(|v| self.vertex_arrays.get_mut(&v.0))
            {
                vao.element_buffer = buffer;
            }
        }
    }

    fn create_vertex_array(&mut self) -> VertexArrayId {
        let id = self.allocate("vertex_array");
        self.vertex_arrays.insert(id, MockVertexArray::default());
        VertexArrayId(id)
    }

    fn delete_vertex_array(&mut self, vertex_array: VertexArrayId) {
        self.release("vertex_array", vertex_array.0);
    }

    fn bind_vertex_array(&mut self, vertex_array: Option<VertexArrayId>) {
        self.vertex_array = vertex_array;
    }

    fn vertex_attrib_pointer(&mut self, location: u32, layout: AttributeLayout) {
        if let Some(vao) = self
            .vertex_array
            .and_then(|v| self.vertex_arrays.get_mut(&v.0))
        {
            vao.attributes.insert(location, layout);
        }
    }

    fn enable_vertex_attrib(&mut self, location: u32) {
        if let Some(vao) = self
            .vertex_array
            .and_then(|v| self.vertex_arrays.get_mut(&v.0))
        {
            vao.enabled.insert(location);
        }
    }

    fn create_texture(&mut self, width: u32, height: u32, rgba: Option<&[u8]>) -> TextureId {
        let id = self.allocate("texture");
        let buffer = match rgba {
            Some(bytes) => ColorBuffer::from_image(&ImageData {
                width,
                height,
                channels: 4,
                rgba: bytes.to_vec(),
            }),
            None => ColorBuffer::solid(width, height, Vec4::ZERO),
        };
        self.textures.insert(id, buffer);
        TextureId(id)
    }

    fn delete_texture(&mut self, texture: TextureId) {
        if self.release("texture", texture.0) {
            self.textures.remove(&texture.0);
        }
    }

    fn active_texture(&mut self, unit: u32) {
        self.active_unit = unit;
    }

    fn bind_texture(&mut self, texture: Option<TextureId>) {
        match texture {
            Some(texture) => self.units.insert(self.active_unit, texture),
            None => self.units.remove(&self.active_unit),
        };
    }

    fn create_renderbuffer(&mut self, width: u32, height: u32) -> RenderbufferId {
        let id = self.allocate("renderbuffer");
        self.renderbuffers.insert(id, (width, height));
        RenderbufferId(id)
    }

    fn delete_renderbuffer(&mut self, renderbuffer: RenderbufferId) {
        self.release("renderbuffer", renderbuffer.0);
    }

    fn create_framebuffer(
        &mut self,
        color: TextureId,
        depth_stencil: RenderbufferId,
    ) -> Result<FramebufferId, GpuError> {
        let color_size = self.texture_size(color);
        let depth_size = self.renderbuffers.get(&depth_stencil.0).copied();
        match (color_size, depth_size) {
            (Some(c), Some(d)) if c == d && c.0 > 0 && c.1 > 0 => {
                let id = self.allocate("framebuffer");
                self.framebuffers.insert(id, color);
                Ok(FramebufferId(id))
            }
            _ => Err(GpuError::IncompleteFramebuffer(format!(
                "color {color_size:?} vs depth {depth_size:?}"
            ))),
        }
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId) {
        if self.release("framebuffer", framebuffer.0) {
            self.framebuffers.remove(&framebuffer.0);
        }
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>) {
        self.framebuffer = framebuffer;
    }

    fn set_depth_test(&mut self, enabled: bool) {
        self.depth_test = enabled;
    }

    fn set_blend(&mut self, enabled: bool) {
        self.blend = enabled;
    }

    fn clear(&mut self, color: [f32; 4]) {
        if let Some(target) = self.target_buffer() {
            target.fill(Vec4::from_array(color));
        }
    }

    fn draw_arrays(&mut self, first: u32, count: u32) {
        self.record_draw(DrawKind::Arrays { first, count });
    }

    fn draw_elements(&mut self, count: u32) {
        self.record_draw(DrawKind::Elements { count });
    }

    fn present(&mut self) -> Result<(), GpuError> {
        self.presented.push(self.screen.clone());
        Ok(())
    }
}

/// Image loader that never finds anything.
pub struct NoImages;

impl ImageLoader for NoImages {
    fn load(&self, path: &Path) -> Result<ImageData, ImageError> {
        Err(ImageError {
            path: path.to_path_buf(),
            message: "no images in tests".into(),
        })
    }
}

/// Mock sources declaring the same names as the real shaders.
pub fn shader_set() -> ShaderSet {
    const SCENE_VS: &str = "attribute position\nattribute normal\nattribute texcoord\n\
                            uniform model\nuniform view\nuniform projection";
    ShaderSet {
        grid: ProgramSources::inline(
            SCENE_VS,
            "uniform cellSize\nuniform lineWidth\nuniform fadeDistance\n\
             uniform gridColor\nuniform bgColor\noutput outColor",
        ),
        model: ProgramSources::inline(
            SCENE_VS,
            "uniform lightPos\nuniform ambientLight\nuniform texture_diffuse1\n\
             uniform texture_specular1\noutput outColor",
        ),
        light: ProgramSources::inline(SCENE_VS, "uniform color\noutput outColor"),
        screen: ProgramSources::inline(
            "attribute position\nattribute texcoord",
            "uniform selector\nuniform screenTexture\noutput outColor",
        ),
    }
}
