// renderer/batch.rs
//! Instance batching and the sorted submission walk.

use bytemuck::{Pod, Zeroable};

use super::context::{BufferId, GpuContext, ShaderStage};
use super::sort_key::{SortEntry, SortKey};
use super::state::StateCache;
use super::store::{InstanceTransform, ItemView, RenderItemStore, Surface};
use crate::asset::{Assets, Handle, RenderSource, ShadingPass};

/// Upper bound on instances per draw; the GPU-side instance array is sized
/// for this many entries.
pub const INSTANCE_BATCH_CAPACITY: usize = 16;

/// Vertex-stage constant slots owned by the scheduler. Shading passes bind
/// their own buffers from [`FIRST_PASS_CONSTANT_SLOT`](super::frame::FIRST_PASS_CONSTANT_SLOT) up.
pub const VIEW_CONSTANT_SLOT: usize = 0;
pub const INSTANCE_CONSTANT_SLOT: usize = 1;

/// A contiguous run of an item's instances drawn with one instanced call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceBatch {
    pub first: u32,
    pub count: u32,
}

/// Greedy splitter: yields `min(remaining, capacity)` sized batches.
#[derive(Debug, Clone)]
pub struct InstanceBatches {
    next: u32,
    remaining: u32,
    capacity: u32,
}

impl Iterator for InstanceBatches {
    type Item = InstanceBatch;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let count = self.remaining.min(self.capacity);
        let batch = InstanceBatch {
            first: self.next,
            count,
        };
        self.next += count;
        self.remaining -= count;
        Some(batch)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining.div_ceil(self.capacity) as usize;
        (n, Some(n))
    }
}

impl ExactSizeIterator for InstanceBatches {}

/// Splits `count` instances into batches of at most `capacity` (clamped to
/// `1..=INSTANCE_BATCH_CAPACITY`).
pub fn instance_batches(count: u32, capacity: usize) -> InstanceBatches {
    InstanceBatches {
        next: 0,
        remaining: count,
        capacity: capacity.clamp(1, INSTANCE_BATCH_CAPACITY) as u32,
    }
}

/// Per-instance record as laid out in the instance constant buffer.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, PartialEq, Debug)]
pub struct InstanceGpuData {
    pub world: [[f32; 4]; 4],
    pub normal: [[f32; 4]; 4],
}

impl From<&InstanceTransform> for InstanceGpuData {
    fn from(instance: &InstanceTransform) -> Self {
        Self {
            world: instance.world.to_cols_array_2d(),
            normal: instance.normal.to_cols_array_2d(),
        }
    }
}

/// CPU staging for one batch of instance data.
pub struct InstanceStaging {
    data: [InstanceGpuData; INSTANCE_BATCH_CAPACITY],
    len: usize,
}

impl Default for InstanceStaging {
    fn default() -> Self {
        Self {
            data: [InstanceGpuData::zeroed(); INSTANCE_BATCH_CAPACITY],
            len: 0,
        }
    }
}

impl InstanceStaging {
    /// Copies `instances` (truncated to the batch capacity) and returns the
    /// bytes to upload.
    pub fn fill(&mut self, instances: &[InstanceTransform]) -> &[u8] {
        self.len = instances.len().min(INSTANCE_BATCH_CAPACITY);
        for (dst, src) in self.data.iter_mut().zip(instances) {
            *dst = src.into();
        }
        bytemuck::cast_slice(&self.data[..self.len])
    }
}

/// Where shading state comes from while walking a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassBinding {
    /// Each item's own shading pass (color passes).
    Material,
    /// One pass for everything (depth prepass, shadow maps).
    Override(Handle<ShadingPass>),
}

impl PassBinding {
    pub fn resolve(&self, material: Handle<ShadingPass>) -> Handle<ShadingPass> {
        match self {
            PassBinding::Material => material,
            PassBinding::Override(pass) => *pass,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkStats {
    pub entries: u32,
    pub batches: u32,
    pub draws: u32,
    pub source_binds: u32,
    pub pass_binds: u32,
    /// Entries skipped because their item or assets could not be resolved.
    pub dropped: u32,
}

impl std::ops::AddAssign for WalkStats {
    fn add_assign(&mut self, rhs: Self) {
        self.entries += rhs.entries;
        self.batches += rhs.batches;
        self.draws += rhs.draws;
        self.source_binds += rhs.source_binds;
        self.pass_binds += rhs.pass_binds;
        self.dropped += rhs.dropped;
    }
}

/// Issues one draw per surface, indexed when the source has an index buffer.
pub fn draw_surface<C: GpuContext + ?Sized>(
    state: &mut StateCache,
    ctx: &mut C,
    indexed: bool,
    surface: &Surface,
    instance_count: u32,
) {
    state.set_topology(surface.topology);
    if indexed {
        state.draw_indexed(ctx, surface.count, surface.start, 0, instance_count);
    } else {
        state.draw(ctx, surface.count, surface.start, instance_count);
    }
}

/// Walks sorted entries of one pass, rebinding source and pass only when
/// they change from one entry to the next.
pub struct SubmissionWalk<'a> {
    assets: &'a Assets,
    store: &'a RenderItemStore,
    binding: PassBinding,
    instance_buffer: BufferId,
    batch_capacity: usize,
    last_source: Option<Handle<RenderSource>>,
    last_pass: Option<Handle<ShadingPass>>,
    staging: InstanceStaging,
    stats: WalkStats,
}

impl<'a> SubmissionWalk<'a> {
    pub fn new(
        assets: &'a Assets,
        store: &'a RenderItemStore,
        binding: PassBinding,
        instance_buffer: BufferId,
        batch_capacity: usize,
    ) -> Self {
        Self {
            assets,
            store,
            binding,
            instance_buffer,
            batch_capacity,
            last_source: None,
            last_pass: None,
            staging: InstanceStaging::default(),
            stats: WalkStats::default(),
        }
    }

    pub fn stats(&self) -> WalkStats {
        self.stats
    }

    pub fn submit<K: SortKey, C: GpuContext + ?Sized>(
        &mut self,
        state: &mut StateCache,
        ctx: &mut C,
        entries: &[SortEntry<K>],
    ) {
        state.set_constant_buffer(
            ShaderStage::Vertex,
            INSTANCE_CONSTANT_SLOT,
            Some(self.instance_buffer),
        );
        for entry in entries {
            self.submit_entry(state, ctx, entry);
        }
    }

    fn submit_entry<K: SortKey, C: GpuContext + ?Sized>(
        &mut self,
        state: &mut StateCache,
        ctx: &mut C,
        entry: &SortEntry<K>,
    ) {
        self.stats.entries += 1;
        let store = self.store;
        let Some(item) = store.item(entry.item) else {
            log::warn!("Sort entry {:?} refers to a missing item", entry.item);
            self.stats.dropped += 1;
            return;
        };
        let Some(indexed) = self.bind(state, &item) else {
            self.stats.dropped += 1;
            return;
        };

        for batch in instance_batches(item.instances.len() as u32, self.batch_capacity) {
            let range = batch.first as usize..(batch.first + batch.count) as usize;
            let bytes = self.staging.fill(&item.instances[range]);
            ctx.upload_constants(self.instance_buffer, bytes);
            self.stats.batches += 1;

            for surface in item.surfaces {
                draw_surface(state, ctx, indexed, surface, batch.count);
                self.stats.draws += 1;
            }
        }
    }

    /// Returns whether the bound source is indexed, or `None` if either
    /// handle does not resolve.
    fn bind(&mut self, state: &mut StateCache, item: &ItemView<'_>) -> Option<bool> {
        let source_handle = item.render_data.source;
        let pass_handle = self.binding.resolve(item.render_data.pass);
        let assets = self.assets;

        let Some(source) = assets.sources.get(source_handle) else {
            log::warn!("Item {:?} uses unknown render source {:?}", item.index, source_handle);
            return None;
        };
        let Some(pass) = assets.passes.get(pass_handle) else {
            log::warn!("Item {:?} uses unknown shading pass {:?}", item.index, pass_handle);
            return None;
        };

        if self.last_source != Some(source_handle) {
            source.bind(state);
            self.last_source = Some(source_handle);
            self.stats.source_binds += 1;
        }
        if self.last_pass != Some(pass_handle) {
            pass.bind(state);
            self.last_pass = Some(pass_handle);
            self.stats.pass_binds += 1;
        }
        Some(source.is_indexed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Mat4;

    #[test]
    fn batches_cover_every_instance_exactly_once() {
        for count in [0u32, 1, 15, 16, 17, 33, 100] {
            for capacity in [1usize, 4, 16] {
                let batches: Vec<_> = instance_batches(count, capacity).collect();
                let expected = count.div_ceil(capacity as u32) as usize;
                assert_eq!(batches.len(), expected, "n={count} c={capacity}");
                assert_eq!(batches.iter().map(|b| b.count).sum::<u32>(), count);
                assert!(batches.iter().all(|b| b.count as usize <= capacity));

                let mut next = 0;
                for batch in &batches {
                    assert_eq!(batch.first, next);
                    next += batch.count;
                }
            }
        }
    }

    #[test]
    fn capacity_is_clamped() {
        assert_eq!(instance_batches(40, 0).len(), 40);
        assert_eq!(instance_batches(40, 64).len(), 3);
    }

    #[test]
    fn staging_uploads_only_filled_instances() {
        let mut staging = InstanceStaging::default();
        let instances = [
            InstanceTransform::new(Mat4::from_translation(glam::Vec3::X)),
            InstanceTransform::new(Mat4::IDENTITY),
        ];
        let bytes = staging.fill(&instances);
        assert_eq!(bytes.len(), 2 * std::mem::size_of::<InstanceGpuData>());
        assert_eq!(std::mem::size_of::<InstanceGpuData>(), 128);
    }

    #[test]
    fn override_binding_ignores_material() {
        let material = Handle::new(3);
        let shadow = Handle::new(9);
        assert_eq!(PassBinding::Material.resolve(material), material);
        assert_eq!(PassBinding::Override(shadow).resolve(material), shadow);
    }
}
