use crate::renderer::context::{BufferId, ShaderSet, ShaderStage, TextureId};
use crate::renderer::descriptors::{BlendDesc, DepthDesc, RasterDesc, SamplerDesc};
use crate::renderer::state::StateCache;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotBinding<T> {
    pub stage: ShaderStage,
    pub slot: usize,
    pub value: T,
}

/// Shader set plus the resources and fixed-function state it renders with.
///
/// Binding a pass only writes the slots it declares. Slots below
/// [`FIRST_PASS_CONSTANT_SLOT`](crate::renderer::frame::FIRST_PASS_CONSTANT_SLOT)
/// in the vertex stage are owned by the frame orchestrator.
#[derive(Debug, Clone)]
pub struct ShadingPass {
    pub label: String,
    pub shaders: ShaderSet,
    pub textures: Vec<SlotBinding<TextureId>>,
    pub samplers: Vec<SlotBinding<SamplerDesc>>,
    pub constant_buffers: Vec<SlotBinding<BufferId>>,
    pub blend: BlendDesc,
    pub depth: DepthDesc,
    pub raster: RasterDesc,
}

impl ShadingPass {
    pub fn new(label: impl Into<String>, shaders: ShaderSet) -> Self {
        Self {
            label: label.into(),
            shaders,
            textures: Vec::new(),
            samplers: Vec::new(),
            constant_buffers: Vec::new(),
            blend: BlendDesc::OPAQUE,
            depth: DepthDesc::LESS_EQUAL,
            raster: RasterDesc::default(),
        }
    }

    /// Vertex-only pass that writes depth and nothing else.
    pub fn depth_only(label: impl Into<String>, shaders: ShaderSet) -> Self {
        let mut pass = Self::new(label, shaders);
        pass.blend = BlendDesc::NO_COLOR;
        pass
    }

    pub fn with_texture(mut self, stage: ShaderStage, slot: usize, texture: TextureId) -> Self {
        self.textures.push(SlotBinding {
            stage,
            slot,
            value: texture,
        });
        self
    }

    pub fn with_sampler(mut self, stage: ShaderStage, slot: usize, sampler: SamplerDesc) -> Self {
        self.samplers.push(SlotBinding {
            stage,
            slot,
            value: sampler,
        });
        self
    }

    pub fn with_constant_buffer(mut self, stage: ShaderStage, slot: usize, buffer: BufferId) -> Self {
        self.constant_buffers.push(SlotBinding {
            stage,
            slot,
            value: buffer,
        });
        self
    }

    pub fn with_blend(mut self, blend: BlendDesc) -> Self {
        self.blend = blend;
        self
    }

    pub fn with_depth(mut self, depth: DepthDesc) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_raster(mut self, raster: RasterDesc) -> Self {
        self.raster = raster;
        self
    }

    pub fn bind(&self, state: &mut StateCache) {
        state.set_shaders(self.shaders);
        for binding in &self.textures {
            state.set_texture(binding.stage, binding.slot, Some(binding.value));
        }
        for binding in &self.samplers {
            state.set_sampler(binding.stage, binding.slot, Some(binding.value));
        }
        for binding in &self.constant_buffers {
            state.set_constant_buffer(binding.stage, binding.slot, Some(binding.value));
        }
        state.set_blend(self.blend);
        state.set_depth(self.depth);
        state.set_raster(self.raster);
    }
}
