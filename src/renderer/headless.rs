//! A [`GpuContext`] that records every call instead of executing it.
//!
//! Used by the tests and the demo binary to inspect exactly what the
//! scheduler would send to a GPU.

use super::context::{
    BufferId, ClearRequest, GpuContext, IndexBufferBinding, RenderTargets, ShaderId, ShaderSet,
    ShaderStage, StateObjectId, TextureId, VertexBufferBinding, Viewport,
};
use super::descriptors::{BlendDesc, DepthDesc, RasterDesc, SamplerDesc, VertexFormatDesc};

#[derive(Debug, Clone, PartialEq)]
pub enum GpuCall {
    CreateBlendState(BlendDesc),
    CreateDepthState(DepthDesc),
    CreateRasterState(RasterDesc),
    CreateSampler(SamplerDesc),
    CreateVertexFormat(VertexFormatDesc, ShaderId),
    SetRenderTargets(RenderTargets),
    Clear(RenderTargets, ClearRequest),
    SetViewport(Viewport),
    BindShaders(ShaderSet, Option<StateObjectId>),
    SetVertexBuffers {
        start_slot: u32,
        buffers: Vec<Option<VertexBufferBinding>>,
    },
    SetIndexBuffer(Option<IndexBufferBinding>),
    SetTextures {
        stage: ShaderStage,
        start_slot: u32,
        textures: Vec<Option<TextureId>>,
    },
    SetSamplers {
        stage: ShaderStage,
        start_slot: u32,
        samplers: Vec<Option<StateObjectId>>,
    },
    SetConstantBuffers {
        stage: ShaderStage,
        start_slot: u32,
        buffers: Vec<Option<BufferId>>,
    },
    SetBlendState(StateObjectId),
    SetDepthState(StateObjectId),
    SetRasterState(StateObjectId),
    SetTopology(wgpu::PrimitiveTopology),
    UploadConstants {
        buffer: BufferId,
        bytes: Vec<u8>,
    },
    Draw {
        vertex_count: u32,
        first_vertex: u32,
        instance_count: u32,
    },
    DrawIndexed {
        index_count: u32,
        first_index: u32,
        base_vertex: i32,
        instance_count: u32,
    },
}

impl GpuCall {
    pub fn is_draw(&self) -> bool {
        matches!(self, GpuCall::Draw { .. } | GpuCall::DrawIndexed { .. })
    }

    pub fn is_create(&self) -> bool {
        matches!(
            self,
            GpuCall::CreateBlendState(_)
                | GpuCall::CreateDepthState(_)
                | GpuCall::CreateRasterState(_)
                | GpuCall::CreateSampler(_)
                | GpuCall::CreateVertexFormat(..)
        )
    }

    /// Changes pipeline binding state; excludes object creation, constant
    /// uploads and draws.
    pub fn is_state_change(&self) -> bool {
        !self.is_draw() && !self.is_create() && !matches!(self, GpuCall::UploadConstants { .. })
    }

    pub fn instance_count(&self) -> Option<u32> {
        match self {
            GpuCall::Draw { instance_count, .. } | GpuCall::DrawIndexed { instance_count, .. } => {
                Some(*instance_count)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct HeadlessContext {
    calls: Vec<GpuCall>,
    next_object: u32,
}

impl HeadlessContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> &[GpuCall] {
        &self.calls
    }

    pub fn take_calls(&mut self) -> Vec<GpuCall> {
        std::mem::take(&mut self.calls)
    }

    /// Drops the log; object ids keep counting.
    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    pub fn draw_count(&self) -> usize {
        self.calls.iter().filter(|call| call.is_draw()).count()
    }

    pub fn state_call_count(&self) -> usize {
        self.calls.iter().filter(|call| call.is_state_change()).count()
    }

    pub fn instances_drawn(&self) -> u64 {
        self.calls
            .iter()
            .filter_map(GpuCall::instance_count)
            .map(u64::from)
            .sum()
    }

    fn object(&mut self, call: GpuCall) -> StateObjectId {
        self.calls.push(call);
        let id = StateObjectId(self.next_object);
        self.next_object += 1;
        id
    }
}

impl GpuContext for HeadlessContext {
    fn create_blend_state(&mut self, desc: &BlendDesc) -> StateObjectId {
        self.object(GpuCall::CreateBlendState(*desc))
    }

    fn create_depth_state(&mut self, desc: &DepthDesc) -> StateObjectId {
        self.object(GpuCall::CreateDepthState(*desc))
    }

    fn create_raster_state(&mut self, desc: &RasterDesc) -> StateObjectId {
        self.object(GpuCall::CreateRasterState(*desc))
    }

    fn create_sampler(&mut self, desc: &SamplerDesc) -> StateObjectId {
        self.object(GpuCall::CreateSampler(*desc))
    }

    fn create_vertex_format(
        &mut self,
        desc: &VertexFormatDesc,
        vertex_shader: ShaderId,
    ) -> StateObjectId {
        self.object(GpuCall::CreateVertexFormat(*desc, vertex_shader))
    }

    fn set_render_targets(&mut self, targets: &RenderTargets) {
        self.calls.push(GpuCall::SetRenderTargets(*targets));
    }

    fn clear(&mut self, targets: &RenderTargets, request: &ClearRequest) {
        self.calls.push(GpuCall::Clear(*targets, *request));
    }

    fn set_viewport(&mut self, viewport: &Viewport) {
        self.calls.push(GpuCall::SetViewport(*viewport));
    }

    fn bind_shaders(&mut self, shaders: &ShaderSet, vertex_format: Option<StateObjectId>) {
        self.calls.push(GpuCall::BindShaders(*shaders, vertex_format));
    }

    fn set_vertex_buffers(&mut self, start_slot: u32, buffers: &[Option<VertexBufferBinding>]) {
        self.calls.push(GpuCall::SetVertexBuffers {
            start_slot,
            buffers: buffers.to_vec(),
        });
    }

    fn set_index_buffer(&mut self, buffer: Option<IndexBufferBinding>) {
        self.calls.push(GpuCall::SetIndexBuffer(buffer));
    }

    fn set_textures(&mut self, stage: ShaderStage, start_slot: u32, textures: &[Option<TextureId>]) {
        self.calls.push(GpuCall::SetTextures {
            stage,
            start_slot,
            textures: textures.to_vec(),
        });
    }

    fn set_samplers(
        &mut self,
        stage: ShaderStage,
        start_slot: u32,
        samplers: &[Option<StateObjectId>],
    ) {
        self.calls.push(GpuCall::SetSamplers {
            stage,
            start_slot,
            samplers: samplers.to_vec(),
        });
    }

    fn set_constant_buffers(
        &mut self,
        stage: ShaderStage,
        start_slot: u32,
        buffers: &[Option<BufferId>],
    ) {
        self.calls.push(GpuCall::SetConstantBuffers {
            stage,
            start_slot,
            buffers: buffers.to_vec(),
        });
    }

    fn set_blend_state(&mut self, state: StateObjectId) {
        self.calls.push(GpuCall::SetBlendState(state));
    }

    fn set_depth_state(&mut self, state: StateObjectId) {
        self.calls.push(GpuCall::SetDepthState(state));
    }

    fn set_raster_state(&mut self, state: StateObjectId) {
        self.calls.push(GpuCall::SetRasterState(state));
    }

    fn set_topology(&mut self, topology: wgpu::PrimitiveTopology) {
        self.calls.push(GpuCall::SetTopology(topology));
    }

    fn upload_constants(&mut self, buffer: BufferId, bytes: &[u8]) {
        self.calls.push(GpuCall::UploadConstants {
            buffer,
            bytes: bytes.to_vec(),
        });
    }

    fn draw(&mut self, vertex_count: u32, first_vertex: u32, instance_count: u32) {
        self.calls.push(GpuCall::Draw {
            vertex_count,
            first_vertex,
            instance_count,
        });
    }

    fn draw_indexed(
        &mut self,
        index_count: u32,
        first_index: u32,
        base_vertex: i32,
        instance_count: u32,
    ) {
        self.calls.push(GpuCall::DrawIndexed {
            index_count,
            first_index,
            base_vertex,
            instance_count,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_ids_are_unique_across_kinds() {
        let mut ctx = HeadlessContext::new();
        let a = ctx.create_blend_state(&BlendDesc::OPAQUE);
        let b = ctx.create_depth_state(&DepthDesc::LESS_EQUAL);
        assert_ne!(a, b);
        assert_eq!(ctx.state_call_count(), 0);

        ctx.draw(3, 0, 4);
        ctx.draw_indexed(6, 0, 0, 2);
        assert_eq!(ctx.draw_count(), 2);
        assert_eq!(ctx.instances_drawn(), 6);
    }
}
