use crate::renderer::context::{IndexBufferBinding, VertexBufferBinding, MAX_VERTEX_SLOTS};
use crate::renderer::descriptors::VertexFormatDesc;
use crate::renderer::state::StateCache;
use crate::renderer::{Aabb, Surface};

/// GPU-resident vertex/index buffers plus the sub-ranges drawn from them.
///
/// The buffers themselves belong to the backend; a render source only records
/// how to bind them.
#[derive(Debug, Clone)]
pub struct RenderSource {
    pub label: String,
    pub vertex_buffers: [Option<VertexBufferBinding>; MAX_VERTEX_SLOTS],
    pub index_buffer: Option<IndexBufferBinding>,
    pub vertex_format: VertexFormatDesc,
    pub surfaces: Vec<Surface>,
    pub bounds: Aabb,
}

impl RenderSource {
    pub fn new(label: impl Into<String>, vertex_format: VertexFormatDesc) -> Self {
        Self {
            label: label.into(),
            vertex_buffers: [None; MAX_VERTEX_SLOTS],
            index_buffer: None,
            vertex_format,
            surfaces: Vec::new(),
            bounds: Aabb::UNIT,
        }
    }

    pub fn with_vertex_buffer(mut self, slot: usize, binding: VertexBufferBinding) -> Self {
        self.vertex_buffers[slot] = Some(binding);
        self
    }

    pub fn with_index_buffer(mut self, binding: IndexBufferBinding) -> Self {
        self.index_buffer = Some(binding);
        self
    }

    pub fn with_surface(mut self, surface: Surface) -> Self {
        self.surfaces.push(surface);
        self
    }

    pub fn with_bounds(mut self, bounds: Aabb) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn is_indexed(&self) -> bool {
        self.index_buffer.is_some()
    }

    /// Writes every vertex slot, so buffers of a previously bound source
    /// never leak into this one.
    pub fn bind(&self, state: &mut StateCache) {
        for (slot, binding) in self.vertex_buffers.iter().enumerate() {
            state.set_vertex_buffer(slot, *binding);
        }
        state.set_index_buffer(self.index_buffer);
        state.set_vertex_format(Some(self.vertex_format));
    }
}
