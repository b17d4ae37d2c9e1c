use std::ops::RangeInclusive;

use super::reflection::{PipelineInfo, ReflectionRegistry, ShaderReflection};
use super::{changed_slots, slot_span, StateData, StateDiff, StateObjectCache};
use crate::renderer::context::{
    BufferId, ClearRequest, GpuContext, IndexBufferBinding, RenderTargets, ShaderId, ShaderSet,
    ShaderStage, StateObjectId, TextureId, VertexBufferBinding, Viewport, MAX_SAMPLER_SLOTS,
    MAX_TEXTURE_SLOTS,
};
use crate::renderer::descriptors::{BlendDesc, DepthDesc, RasterDesc, SamplerDesc, VertexFormatDesc};

/// Slots whose pending value was committed without being sent to the GPU
/// because the bound shaders did not read them at the time.
#[derive(Debug, Clone, Copy, Default)]
struct DeferredSlots {
    vertex_buffers: u32,
    textures: [u32; ShaderStage::COUNT],
    samplers: [u32; ShaderStage::COUNT],
    constant_buffers: [u32; ShaderStage::COUNT],
}

/// Counters since the last [`StateCache::take_stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateStats {
    pub reconciliations: u32,
    /// State-changing calls issued, draws excluded.
    pub state_calls: u32,
    pub draws: u32,
    pub hazards_resolved: u32,
}

/// Redundancy-eliminating front end to a [`GpuContext`].
///
/// Callers write the state they want into the Pending snapshot through the
/// setters. Nothing reaches the GPU until a draw (or [`flush`](Self::flush)),
/// which diffs Pending against Current, emits the minimal set of calls in
/// dependency order and then makes Current equal to Pending.
pub struct StateCache {
    current: StateData,
    pending: StateData,
    deferred: DeferredSlots,
    force: bool,
    reflections: ReflectionRegistry,
    objects: StateObjectCache,
    stats: StateStats,
}

impl Default for StateCache {
    fn default() -> Self {
        Self::new()
    }
}

fn low_bits(count: usize) -> u32 {
    if count >= 32 {
        u32::MAX
    } else {
        (1u32 << count) - 1
    }
}

/// Picks the slot span to emit for one binding table and updates its deferred
/// mask. Slots inside the span are sent even if unchanged, so they are no
/// longer deferred afterwards.
fn resource_span<T: PartialEq>(
    current: &[T],
    pending: &[T],
    deferred: &mut u32,
    used: u32,
    force: bool,
) -> Option<RangeInclusive<usize>> {
    let all = low_bits(pending.len());
    let changed = if force {
        all
    } else {
        changed_slots(current, pending)
    };
    let candidates = (changed | *deferred) & all;
    let span = slot_span(candidates & used);

    let sent = span
        .as_ref()
        .map_or(0, |span| low_bits(*span.end() + 1) & !low_bits(*span.start()));
    *deferred = candidates & !sent;
    span
}

impl StateCache {
    pub fn new() -> Self {
        Self {
            current: StateData::default(),
            pending: StateData::default(),
            deferred: DeferredSlots::default(),
            force: true,
            reflections: ReflectionRegistry::new(),
            objects: StateObjectCache::new(),
            stats: StateStats::default(),
        }
    }

    pub fn register_reflection(&mut self, shader: ShaderId, reflection: ShaderReflection) {
        self.reflections.insert(shader, reflection);
    }

    pub fn current(&self) -> &StateData {
        &self.current
    }

    pub fn pending(&self) -> &StateData {
        &self.pending
    }

    /// Aspects the next reconciliation would look at.
    pub fn diff(&self) -> StateDiff {
        self.current.diff(&self.pending)
    }

    pub fn objects(&self) -> &StateObjectCache {
        &self.objects
    }

    pub fn stats(&self) -> StateStats {
        self.stats
    }

    pub fn take_stats(&mut self) -> StateStats {
        std::mem::take(&mut self.stats)
    }

    /// Returns both snapshots to defaults and forgets what the GPU has bound.
    /// The next reconciliation re-emits every aspect.
    pub fn reset(&mut self) {
        self.current = StateData::default();
        self.pending = StateData::default();
        self.deferred = DeferredSlots::default();
        self.force = true;
    }

    pub fn set_render_targets(&mut self, targets: RenderTargets) {
        self.pending.render_targets = targets;
    }

    pub fn request_clear(&mut self, request: ClearRequest) {
        self.pending.clear = Some(request);
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.pending.viewport = viewport;
    }

    pub fn set_shaders(&mut self, shaders: ShaderSet) {
        self.pending.shaders = shaders;
    }

    pub fn set_vertex_format(&mut self, format: Option<VertexFormatDesc>) {
        self.pending.vertex_format = format;
    }

    pub fn set_vertex_buffer(&mut self, slot: usize, binding: Option<VertexBufferBinding>) {
        debug_assert!(slot < self.pending.vertex_buffers.len(), "vertex slot {slot}");
        if let Some(dst) = self.pending.vertex_buffers.get_mut(slot) {
            *dst = binding;
        }
    }

    pub fn set_index_buffer(&mut self, binding: Option<IndexBufferBinding>) {
        self.pending.index_buffer = binding;
    }

    pub fn set_texture(&mut self, stage: ShaderStage, slot: usize, texture: Option<TextureId>) {
        debug_assert!(slot < MAX_TEXTURE_SLOTS, "texture slot {slot}");
        if let Some(dst) = self.pending.textures[stage.index()].get_mut(slot) {
            *dst = texture;
        }
    }

    pub fn set_sampler(&mut self, stage: ShaderStage, slot: usize, sampler: Option<SamplerDesc>) {
        debug_assert!(slot < MAX_SAMPLER_SLOTS, "sampler slot {slot}");
        if let Some(dst) = self.pending.samplers[stage.index()].get_mut(slot) {
            *dst = sampler;
        }
    }

    pub fn set_constant_buffer(&mut self, stage: ShaderStage, slot: usize, buffer: Option<BufferId>) {
        debug_assert!(
            slot < self.pending.constant_buffers[0].len(),
            "constant slot {slot}"
        );
        if let Some(dst) = self.pending.constant_buffers[stage.index()].get_mut(slot) {
            *dst = buffer;
        }
    }

    pub fn set_blend(&mut self, blend: BlendDesc) {
        self.pending.blend = blend;
    }

    pub fn set_depth(&mut self, depth: DepthDesc) {
        self.pending.depth = depth;
    }

    pub fn set_raster(&mut self, raster: RasterDesc) {
        self.pending.raster = raster;
    }

    pub fn set_topology(&mut self, topology: wgpu::PrimitiveTopology) {
        self.pending.topology = topology;
    }

    pub fn draw<C: GpuContext + ?Sized>(
        &mut self,
        ctx: &mut C,
        vertex_count: u32,
        first_vertex: u32,
        instance_count: u32,
    ) {
        self.flush(ctx);
        ctx.draw(vertex_count, first_vertex, instance_count);
        self.stats.draws += 1;
    }

    pub fn draw_indexed<C: GpuContext + ?Sized>(
        &mut self,
        ctx: &mut C,
        index_count: u32,
        first_index: u32,
        base_vertex: i32,
        instance_count: u32,
    ) {
        self.flush(ctx);
        ctx.draw_indexed(index_count, first_index, base_vertex, instance_count);
        self.stats.draws += 1;
    }

    /// Reconciles without drawing, e.g. to execute a clear on an empty pass.
    pub fn flush<C: GpuContext + ?Sized>(&mut self, ctx: &mut C) {
        let force = self.force;
        let mut dirty = self.current.diff(&self.pending);
        if force {
            dirty = StateDiff::all();
            if self.pending.clear.is_none() {
                dirty.remove(StateDiff::CLEAR);
            }
        }

        let has_deferred = self.deferred.vertex_buffers != 0
            || self.deferred.textures.iter().any(|mask| *mask != 0)
            || self.deferred.samplers.iter().any(|mask| *mask != 0)
            || self.deferred.constant_buffers.iter().any(|mask| *mask != 0);
        if dirty.is_empty() && !has_deferred {
            return;
        }

        self.stats.reconciliations += 1;
        let before = self.stats.state_calls;
        let info = PipelineInfo::resolve(&self.pending.shaders, &self.reflections);

        if dirty.contains(StateDiff::RENDER_TARGETS) {
            self.resolve_target_hazards(ctx);
            ctx.set_render_targets(&self.pending.render_targets);
            self.stats.state_calls += 1;
        }
        if let Some(request) = self.pending.clear {
            ctx.clear(&self.pending.render_targets, &request);
            self.stats.state_calls += 1;
        }
        if dirty.contains(StateDiff::VIEWPORT) {
            ctx.set_viewport(&self.pending.viewport);
            self.stats.state_calls += 1;
        }

        if dirty.intersects(StateDiff::SHADERS | StateDiff::VERTEX_FORMAT) {
            let format = match (self.pending.vertex_format, self.pending.shaders.vertex) {
                (Some(desc), Some(vertex_shader)) => {
                    Some(self.objects.vertex_format(ctx, &desc, vertex_shader))
                }
                _ => None,
            };
            ctx.bind_shaders(&self.pending.shaders, format);
            self.stats.state_calls += 1;
        }

        if let Some(span) = resource_span(
            &self.current.vertex_buffers,
            &self.pending.vertex_buffers,
            &mut self.deferred.vertex_buffers,
            info.vertex_inputs,
            force,
        ) {
            ctx.set_vertex_buffers(*span.start() as u32, &self.pending.vertex_buffers[span]);
            self.stats.state_calls += 1;
        }
        if dirty.contains(StateDiff::INDEX_BUFFER) {
            ctx.set_index_buffer(self.pending.index_buffer);
            self.stats.state_calls += 1;
        }

        for stage in ShaderStage::ALL {
            self.emit_stage_resources(ctx, stage, &info, force);
        }

        if dirty.contains(StateDiff::BLEND) {
            let id = self.objects.blend(ctx, &self.pending.blend);
            ctx.set_blend_state(id);
            self.stats.state_calls += 1;
        }
        if dirty.contains(StateDiff::DEPTH) {
            let id = self.objects.depth(ctx, &self.pending.depth);
            ctx.set_depth_state(id);
            self.stats.state_calls += 1;
        }
        if dirty.contains(StateDiff::RASTER) {
            let id = self.objects.raster(ctx, &self.pending.raster);
            ctx.set_raster_state(id);
            self.stats.state_calls += 1;
        }
        if dirty.contains(StateDiff::TOPOLOGY) {
            ctx.set_topology(self.pending.topology);
            self.stats.state_calls += 1;
        }

        self.pending.clear = None;
        self.current = self.pending;
        self.force = false;

        log::trace!(
            "Reconciled {:?} with {} calls",
            dirty,
            self.stats.state_calls - before
        );
    }

    fn emit_stage_resources<C: GpuContext + ?Sized>(
        &mut self,
        ctx: &mut C,
        stage: ShaderStage,
        info: &PipelineInfo,
        force: bool,
    ) {
        let s = stage.index();
        let active = info.active[s];
        let mask = |used: u32| if active { used } else { 0 };

        if let Some(span) = resource_span(
            &self.current.textures[s],
            &self.pending.textures[s],
            &mut self.deferred.textures[s],
            mask(info.textures[s]),
            force,
        ) {
            ctx.set_textures(stage, *span.start() as u32, &self.pending.textures[s][span]);
            self.stats.state_calls += 1;
        }

        if let Some(span) = resource_span(
            &self.current.samplers[s],
            &self.pending.samplers[s],
            &mut self.deferred.samplers[s],
            mask(info.samplers[s]),
            force,
        ) {
            let mut ids: [Option<StateObjectId>; MAX_SAMPLER_SLOTS] = [None; MAX_SAMPLER_SLOTS];
            for slot in span.clone() {
                ids[slot] = self.pending.samplers[s][slot]
                    .map(|desc| self.objects.sampler(ctx, &desc));
            }
            ctx.set_samplers(stage, *span.start() as u32, &ids[span]);
            self.stats.state_calls += 1;
        }

        if let Some(span) = resource_span(
            &self.current.constant_buffers[s],
            &self.pending.constant_buffers[s],
            &mut self.deferred.constant_buffers[s],
            mask(info.constant_buffers[s]),
            force,
        ) {
            ctx.set_constant_buffers(
                stage,
                *span.start() as u32,
                &self.pending.constant_buffers[s][span],
            );
            self.stats.state_calls += 1;
        }
    }

    /// A texture about to become a render target must not stay bound as a
    /// shader input. Unbinds it on the GPU and drops it from both snapshots.
    fn resolve_target_hazards<C: GpuContext + ?Sized>(&mut self, ctx: &mut C) {
        let targets = self.pending.render_targets;
        for stage in ShaderStage::ALL {
            let s = stage.index();
            for slot in 0..MAX_TEXTURE_SLOTS {
                let bound = self.current.textures[s][slot];
                if let Some(texture) = bound {
                    if targets.contains(texture) {
                        log::trace!(
                            "Unbinding {:?} from {:?} slot {} before use as a render target",
                            texture,
                            stage,
                            slot
                        );
                        ctx.set_textures(stage, slot as u32, &[None]);
                        self.current.textures[s][slot] = None;
                        self.stats.state_calls += 1;
                        self.stats.hazards_resolved += 1;
                    }
                }
                if let Some(texture) = self.pending.textures[s][slot] {
                    // Carried over from an earlier pass, not newly requested.
                    if targets.contains(texture) && bound == Some(texture) {
                        self.pending.textures[s][slot] = None;
                    } else if targets.contains(texture) {
                        log::warn!(
                            "{:?} requested as {:?} input slot {} while also a render target; dropping the input binding",
                            texture,
                            stage,
                            slot
                        );
                        self.pending.textures[s][slot] = None;
                    }
                }
            }
        }
    }
}
