//! Pipeline binding state: the Current/Pending snapshot pair and the differ
//! that reconciles them against a [`GpuContext`](super::GpuContext).

mod cache;
mod differ;
mod reflection;

pub use cache::StateObjectCache;
pub use differ::{StateCache, StateStats};
pub use reflection::{PipelineInfo, ReflectionRegistry, ShaderReflection};

use bitflags::bitflags;

use super::context::{
    BufferId, ClearRequest, IndexBufferBinding, RenderTargets, ShaderSet, ShaderStage, TextureId,
    VertexBufferBinding, Viewport, MAX_CONSTANT_SLOTS, MAX_SAMPLER_SLOTS, MAX_TEXTURE_SLOTS,
    MAX_VERTEX_SLOTS,
};
use super::descriptors::{BlendDesc, DepthDesc, RasterDesc, SamplerDesc, VertexFormatDesc};

bitflags! {
    /// Aspects of [`StateData`] that differ between two snapshots.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StateDiff: u32 {
        const RENDER_TARGETS = 1 << 0;
        const CLEAR = 1 << 1;
        const VIEWPORT = 1 << 2;
        const SHADERS = 1 << 3;
        const VERTEX_FORMAT = 1 << 4;
        const VERTEX_BUFFERS = 1 << 5;
        const INDEX_BUFFER = 1 << 6;
        const TEXTURES_VS = 1 << 7;
        const TEXTURES_GS = 1 << 8;
        const TEXTURES_FS = 1 << 9;
        const SAMPLERS_VS = 1 << 10;
        const SAMPLERS_GS = 1 << 11;
        const SAMPLERS_FS = 1 << 12;
        const CONSTANTS_VS = 1 << 13;
        const CONSTANTS_GS = 1 << 14;
        const CONSTANTS_FS = 1 << 15;
        const BLEND = 1 << 16;
        const DEPTH = 1 << 17;
        const RASTER = 1 << 18;
        const TOPOLOGY = 1 << 19;
    }
}

impl StateDiff {
    pub fn textures(stage: ShaderStage) -> Self {
        Self::from_bits_retain(Self::TEXTURES_VS.bits() << stage.index())
    }

    pub fn samplers(stage: ShaderStage) -> Self {
        Self::from_bits_retain(Self::SAMPLERS_VS.bits() << stage.index())
    }

    pub fn constants(stage: ShaderStage) -> Self {
        Self::from_bits_retain(Self::CONSTANTS_VS.bits() << stage.index())
    }
}

/// Full pipeline-binding snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateData {
    pub render_targets: RenderTargets,
    /// One-shot; cleared after every reconciliation.
    pub clear: Option<ClearRequest>,
    pub viewport: Viewport,
    pub shaders: ShaderSet,
    pub vertex_format: Option<VertexFormatDesc>,
    pub vertex_buffers: [Option<VertexBufferBinding>; MAX_VERTEX_SLOTS],
    pub index_buffer: Option<IndexBufferBinding>,
    pub textures: [[Option<TextureId>; MAX_TEXTURE_SLOTS]; ShaderStage::COUNT],
    pub samplers: [[Option<SamplerDesc>; MAX_SAMPLER_SLOTS]; ShaderStage::COUNT],
    pub constant_buffers: [[Option<BufferId>; MAX_CONSTANT_SLOTS]; ShaderStage::COUNT],
    pub blend: BlendDesc,
    pub depth: DepthDesc,
    pub raster: RasterDesc,
    pub topology: wgpu::PrimitiveTopology,
}

impl Default for StateData {
    fn default() -> Self {
        Self {
            render_targets: RenderTargets::default(),
            clear: None,
            viewport: Viewport::default(),
            shaders: ShaderSet::default(),
            vertex_format: None,
            vertex_buffers: [None; MAX_VERTEX_SLOTS],
            index_buffer: None,
            textures: [[None; MAX_TEXTURE_SLOTS]; ShaderStage::COUNT],
            samplers: [[None; MAX_SAMPLER_SLOTS]; ShaderStage::COUNT],
            constant_buffers: [[None; MAX_CONSTANT_SLOTS]; ShaderStage::COUNT],
            blend: BlendDesc::default(),
            depth: DepthDesc::default(),
            raster: RasterDesc::default(),
            topology: wgpu::PrimitiveTopology::TriangleList,
        }
    }
}

impl StateData {
    /// Field-wise comparison; empty when the snapshots are equal.
    pub fn diff(&self, other: &StateData) -> StateDiff {
        let mut diff = StateDiff::empty();
        diff.set(
            StateDiff::RENDER_TARGETS,
            self.render_targets != other.render_targets,
        );
        diff.set(StateDiff::CLEAR, self.clear != other.clear);
        diff.set(StateDiff::VIEWPORT, self.viewport != other.viewport);
        diff.set(StateDiff::SHADERS, self.shaders != other.shaders);
        diff.set(
            StateDiff::VERTEX_FORMAT,
            self.vertex_format != other.vertex_format,
        );
        diff.set(
            StateDiff::VERTEX_BUFFERS,
            self.vertex_buffers != other.vertex_buffers,
        );
        diff.set(
            StateDiff::INDEX_BUFFER,
            self.index_buffer != other.index_buffer,
        );
        for stage in ShaderStage::ALL {
            let s = stage.index();
            diff.set(
                StateDiff::textures(stage),
                self.textures[s] != other.textures[s],
            );
            diff.set(
                StateDiff::samplers(stage),
                self.samplers[s] != other.samplers[s],
            );
            diff.set(
                StateDiff::constants(stage),
                self.constant_buffers[s] != other.constant_buffers[s],
            );
        }
        diff.set(StateDiff::BLEND, self.blend != other.blend);
        diff.set(StateDiff::DEPTH, self.depth != other.depth);
        diff.set(StateDiff::RASTER, self.raster != other.raster);
        diff.set(StateDiff::TOPOLOGY, self.topology != other.topology);
        diff
    }
}

/// Bitmask of slots whose values differ between two binding tables.
pub(crate) fn changed_slots<T: PartialEq>(a: &[T], b: &[T]) -> u32 {
    a.iter()
        .zip(b)
        .enumerate()
        .filter(|(_, (x, y))| x != y)
        .fold(0, |mask, (slot, _)| mask | (1 << slot))
}

/// Smallest contiguous slot range covering every set bit.
pub(crate) fn slot_span(mask: u32) -> Option<std::ops::RangeInclusive<usize>> {
    if mask == 0 {
        return None;
    }
    let first = mask.trailing_zeros() as usize;
    let last = 31 - mask.leading_zeros() as usize;
    Some(first..=last)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_snapshots_have_empty_diff() {
        let a = StateData::default();
        assert!(a.diff(&a).is_empty());
    }

    #[test]
    fn per_stage_resource_bits_are_distinct() {
        let mut a = StateData::default();
        let b = StateData::default();
        a.textures[ShaderStage::Fragment.index()][2] = Some(TextureId(1));
        a.constant_buffers[ShaderStage::Vertex.index()][0] = Some(BufferId(4));

        let diff = a.diff(&b);
        assert_eq!(
            diff,
            StateDiff::TEXTURES_FS | StateDiff::CONSTANTS_VS,
            "{diff:?}"
        );
        assert_eq!(StateDiff::samplers(ShaderStage::Geometry), StateDiff::SAMPLERS_GS);
    }

    #[test]
    fn slot_helpers() {
        let a = [None, Some(1), None, Some(3)];
        let b = [None, Some(2), None, None];
        assert_eq!(changed_slots(&a, &b), 0b1010);
        assert_eq!(slot_span(0b1010), Some(1..=3));
        assert_eq!(slot_span(0), None);
    }
}
