use std::collections::HashMap;

use crate::renderer::context::{GpuContext, ShaderId, StateObjectId};
use crate::renderer::descriptors::{
    content_hash, BlendDesc, DepthDesc, RasterDesc, SamplerDesc, VertexFormatDesc,
};

/// Backend state objects keyed by descriptor content hash.
///
/// Objects are created on first use and reused for the rest of the process.
/// Nothing is ever evicted.
#[derive(Default)]
pub struct StateObjectCache {
    blend: HashMap<u64, StateObjectId>,
    depth: HashMap<u64, StateObjectId>,
    raster: HashMap<u64, StateObjectId>,
    samplers: HashMap<u64, StateObjectId>,
    vertex_formats: HashMap<u64, StateObjectId>,
}

impl StateObjectCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn blend<C: GpuContext + ?Sized>(&mut self, ctx: &mut C, desc: &BlendDesc) -> StateObjectId {
        *self
            .blend
            .entry(content_hash(desc))
            .or_insert_with(|| ctx.create_blend_state(desc))
    }

    pub fn depth<C: GpuContext + ?Sized>(&mut self, ctx: &mut C, desc: &DepthDesc) -> StateObjectId {
        *self
            .depth
            .entry(content_hash(desc))
            .or_insert_with(|| ctx.create_depth_state(desc))
    }

    pub fn raster<C: GpuContext + ?Sized>(&mut self, ctx: &mut C, desc: &RasterDesc) -> StateObjectId {
        *self
            .raster
            .entry(content_hash(desc))
            .or_insert_with(|| ctx.create_raster_state(desc))
    }

    pub fn sampler<C: GpuContext + ?Sized>(&mut self, ctx: &mut C, desc: &SamplerDesc) -> StateObjectId {
        *self
            .samplers
            .entry(content_hash(desc))
            .or_insert_with(|| ctx.create_sampler(desc))
    }

    /// Input layouts are validated against the vertex shader's signature, so
    /// the shader is part of the key.
    pub fn vertex_format<C: GpuContext + ?Sized>(
        &mut self,
        ctx: &mut C,
        desc: &VertexFormatDesc,
        vertex_shader: ShaderId,
    ) -> StateObjectId {
        *self
            .vertex_formats
            .entry(content_hash(&(desc, vertex_shader)))
            .or_insert_with(|| ctx.create_vertex_format(desc, vertex_shader))
    }

    pub fn len(&self) -> usize {
        self.blend.len()
            + self.depth.len()
            + self.raster.len()
            + self.samplers.len()
            + self.vertex_formats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
