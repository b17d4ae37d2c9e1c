//! The abstract GPU execution context the scheduler drives.
//!
//! Everything behind [`GpuContext`] is owned by the backend: buffers, textures
//! and shaders are referred to by opaque ids, and pipeline state objects are
//! created on request from content descriptors (see
//! [`descriptors`](super::descriptors)). The scheduler never reads anything
//! back from the context.

use super::descriptors::{BlendDesc, DepthDesc, RasterDesc, SamplerDesc, VertexFormatDesc};

pub const MAX_COLOR_TARGETS: usize = 4;
pub const MAX_VERTEX_SLOTS: usize = 8;
pub const MAX_TEXTURE_SLOTS: usize = 16;
pub const MAX_SAMPLER_SLOTS: usize = 8;
pub const MAX_CONSTANT_SLOTS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShaderId(pub u32);

/// Backend handle for a cached blend/depth/raster/sampler/vertex-format object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateObjectId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Geometry,
    Fragment,
}

impl ShaderStage {
    pub const COUNT: usize = 3;
    pub const ALL: [ShaderStage; Self::COUNT] =
        [ShaderStage::Vertex, ShaderStage::Geometry, ShaderStage::Fragment];

    pub fn index(self) -> usize {
        match self {
            ShaderStage::Vertex => 0,
            ShaderStage::Geometry => 1,
            ShaderStage::Fragment => 2,
        }
    }
}

/// One shader per pipeline stage; `None` leaves the stage disabled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ShaderSet {
    pub vertex: Option<ShaderId>,
    pub geometry: Option<ShaderId>,
    pub fragment: Option<ShaderId>,
}

impl ShaderSet {
    pub fn vertex_only(vertex: ShaderId) -> Self {
        Self {
            vertex: Some(vertex),
            ..Self::default()
        }
    }

    pub fn new(vertex: ShaderId, fragment: ShaderId) -> Self {
        Self {
            vertex: Some(vertex),
            geometry: None,
            fragment: Some(fragment),
        }
    }

    pub fn get(&self, stage: ShaderStage) -> Option<ShaderId> {
        match stage {
            ShaderStage::Vertex => self.vertex,
            ShaderStage::Geometry => self.geometry,
            ShaderStage::Fragment => self.fragment,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct RenderTargets {
    pub colors: [Option<TextureId>; MAX_COLOR_TARGETS],
    pub depth: Option<TextureId>,
}

impl RenderTargets {
    pub fn color_depth(color: TextureId, depth: TextureId) -> Self {
        let mut colors = [None; MAX_COLOR_TARGETS];
        colors[0] = Some(color);
        Self {
            colors,
            depth: Some(depth),
        }
    }

    pub fn depth_only(depth: TextureId) -> Self {
        Self {
            colors: [None; MAX_COLOR_TARGETS],
            depth: Some(depth),
        }
    }

    pub fn contains(&self, texture: TextureId) -> bool {
        self.depth == Some(texture) || self.colors.contains(&Some(texture))
    }
}

/// A one-shot clear, executed with the next reconciliation and then dropped.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ClearRequest {
    pub color: Option<[f32; 4]>,
    pub depth: Option<f32>,
    pub stencil: Option<u8>,
}

impl ClearRequest {
    pub fn depth(value: f32) -> Self {
        Self {
            depth: Some(value),
            ..Self::default()
        }
    }

    pub fn color_depth(color: [f32; 4], depth: f32) -> Self {
        Self {
            color: Some(color),
            depth: Some(depth),
            stencil: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(0.0, 0.0, 0.0, 0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexBufferBinding {
    pub buffer: BufferId,
    pub stride: u32,
    pub offset: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexBufferBinding {
    pub buffer: BufferId,
    pub format: wgpu::IndexFormat,
    pub offset: u32,
}

/// Calls the scheduler emits against a GPU. Implementations are expected to be
/// stateful and expensive to reconfigure; the state differ guarantees each
/// call here corresponds to an actual change.
pub trait GpuContext {
    fn create_blend_state(&mut self, desc: &BlendDesc) -> StateObjectId;
    fn create_depth_state(&mut self, desc: &DepthDesc) -> StateObjectId;
    fn create_raster_state(&mut self, desc: &RasterDesc) -> StateObjectId;
    fn create_sampler(&mut self, desc: &SamplerDesc) -> StateObjectId;
    fn create_vertex_format(&mut self, desc: &VertexFormatDesc, vertex_shader: ShaderId)
        -> StateObjectId;

    fn set_render_targets(&mut self, targets: &RenderTargets);
    fn clear(&mut self, targets: &RenderTargets, request: &ClearRequest);
    fn set_viewport(&mut self, viewport: &Viewport);
    fn bind_shaders(&mut self, shaders: &ShaderSet, vertex_format: Option<StateObjectId>);
    fn set_vertex_buffers(&mut self, start_slot: u32, buffers: &[Option<VertexBufferBinding>]);
    fn set_index_buffer(&mut self, buffer: Option<IndexBufferBinding>);
    fn set_textures(&mut self, stage: ShaderStage, start_slot: u32, textures: &[Option<TextureId>]);
    fn set_samplers(
        &mut self,
        stage: ShaderStage,
        start_slot: u32,
        samplers: &[Option<StateObjectId>],
    );
    fn set_constant_buffers(
        &mut self,
        stage: ShaderStage,
        start_slot: u32,
        buffers: &[Option<BufferId>],
    );
    fn set_blend_state(&mut self, state: StateObjectId);
    fn set_depth_state(&mut self, state: StateObjectId);
    fn set_raster_state(&mut self, state: StateObjectId);
    fn set_topology(&mut self, topology: wgpu::PrimitiveTopology);

    fn upload_constants(&mut self, buffer: BufferId, bytes: &[u8]);
    fn draw(&mut self, vertex_count: u32, first_vertex: u32, instance_count: u32);
    fn draw_indexed(
        &mut self,
        index_count: u32,
        first_index: u32,
        base_vertex: i32,
        instance_count: u32,
    );
}
