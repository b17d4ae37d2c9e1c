//! Per-frame orchestration: shadow cascades, depth prepass, color pass.
//!
//! A frame runs in this order:
//!
//! 1. [`FrameOrchestrator::begin_frame`] clears the store and key lists.
//! 2. The caller fills [`FrameOrchestrator::store_mut`] (usually through
//!    [`scene::extract`](crate::scene::extract)).
//! 3. [`FrameOrchestrator::render`] builds cascades, produces and sorts keys,
//!    then walks each pass against the GPU context.

use std::time::Duration;

use instant::Instant;

use super::batch::{
    instance_batches, InstanceStaging, PassBinding, SubmissionWalk, WalkStats,
    INSTANCE_CONSTANT_SLOT, VIEW_CONSTANT_SLOT,
};
use super::cascades::CascadeSet;
use super::command::{Command, CommandBucket, SubmitStats};
use super::context::{
    BufferId, ClearRequest, GpuContext, RenderTargets, ShaderStage, TextureId, Viewport,
};
use super::keys::{push_color_keys, push_depth_keys, push_shadow_keys};
use super::sort_key::{ColorKey, DepthKey, ListId, ShadowKey, SortEntry, SortKeyList};
use super::state::StateCache;
use super::store::RenderItemStore;
use super::uniforms::ViewUniform;
use super::Frustum;
use crate::asset::{Assets, Handle, ShadingPass};
use crate::error::ScheduleResult;
use crate::scene::{Camera, DirectionalLight};
use crate::settings::SchedulerSettings;

/// First vertex-stage constant slot free for shading passes; lower slots
/// hold the view and instance constants.
pub const FIRST_PASS_CONSTANT_SLOT: usize = 2;

/// The single store every sort entry of a frame refers to.
const MAIN_LIST: ListId = ListId(0);

/// Backend resources the passes render into.
#[derive(Debug, Clone, Copy)]
pub struct FrameResources {
    pub color_target: TextureId,
    pub depth_target: TextureId,
    /// Cascades are laid out side by side, one `map_size` square each.
    pub shadow_atlas: TextureId,
    pub view_constants: BufferId,
    pub instance_constants: BufferId,
    pub depth_pass: Handle<ShadingPass>,
    pub shadow_pass: Handle<ShadingPass>,
    pub width: u32,
    pub height: u32,
    pub clear_color: [f32; 4],
}

impl FrameResources {
    fn viewport(&self) -> Viewport {
        Viewport::new(0.0, 0.0, self.width as f32, self.height as f32)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FrameView {
    pub camera: Camera,
    pub light: Option<DirectionalLight>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FrameStats {
    pub items: u32,
    pub cascades: u32,
    pub shadow_entries: u32,
    pub depth_entries: u32,
    pub color_entries: u32,
    pub batches: u32,
    pub draws: u32,
    pub state_calls: u32,
    pub hazards_resolved: u32,
    pub source_binds: u32,
    pub pass_binds: u32,
    pub dropped: u32,
    pub cpu_time: Duration,
}

impl FrameStats {
    fn add_walk(&mut self, walk: WalkStats) {
        self.batches += walk.batches;
        self.draws += walk.draws;
        self.source_binds += walk.source_binds;
        self.pass_binds += walk.pass_binds;
        self.dropped += walk.dropped;
    }
}

pub struct FrameOrchestrator {
    settings: SchedulerSettings,
    store: RenderItemStore,
    color_keys: SortKeyList<ColorKey>,
    depth_keys: SortKeyList<DepthKey>,
    shadow_keys: SortKeyList<ShadowKey>,
    cascades: CascadeSet,
    state: StateCache,
}

impl FrameOrchestrator {
    pub fn new(settings: SchedulerSettings) -> Self {
        let settings = settings.validate();
        log::info!(
            "Frame orchestrator: store {:?}, sort {:?}, batch capacity {}, depth prepass {}, {} cascades",
            settings.store,
            settings.sort,
            settings.instance_batch_capacity,
            settings.depth_prepass,
            if settings.shadows.enabled {
                settings.shadows.cascade_count
            } else {
                0
            }
        );

        Self {
            store: RenderItemStore::with_capacity(settings.store),
            color_keys: SortKeyList::with_capacity(settings.sort.color),
            depth_keys: SortKeyList::with_capacity(settings.sort.depth),
            shadow_keys: SortKeyList::with_capacity(settings.sort.shadow),
            cascades: CascadeSet::default(),
            state: StateCache::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    pub fn store(&self) -> &RenderItemStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut RenderItemStore {
        &mut self.store
    }

    pub fn state(&self) -> &StateCache {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut StateCache {
        &mut self.state
    }

    pub fn cascades(&self) -> &CascadeSet {
        &self.cascades
    }

    pub fn color_entries(&self) -> &[SortEntry<ColorKey>] {
        self.color_keys.entries()
    }

    pub fn depth_entries(&self) -> &[SortEntry<DepthKey>] {
        self.depth_keys.entries()
    }

    pub fn shadow_entries(&self) -> &[SortEntry<ShadowKey>] {
        self.shadow_keys.entries()
    }

    pub fn begin_frame(&mut self) {
        self.store.clear();
        self.color_keys.clear();
        self.depth_keys.clear();
        self.shadow_keys.clear();
    }

    fn shadows_active(&self, view: &FrameView) -> bool {
        self.settings.shadows.enabled && view.light.is_some()
    }

    /// Builds this frame's cascades and fills and sorts every pass's key list.
    pub fn prepare(&mut self, view: &FrameView) {
        self.color_keys.clear();
        self.depth_keys.clear();
        self.shadow_keys.clear();

        let camera = &view.camera;
        let frustum = Frustum::from_matrix(camera.view_projection());

        self.cascades = match view.light {
            Some(light) if self.settings.shadows.enabled => {
                CascadeSet::build(camera, light.direction, &self.settings.shadows)
            }
            _ => CascadeSet::default(),
        };
        if self.shadows_active(view) {
            push_shadow_keys(&self.store, &mut self.shadow_keys, MAIN_LIST, &self.cascades);
            self.shadow_keys.sort_ascending();
        }

        if self.settings.depth_prepass {
            push_depth_keys(
                &self.store,
                &mut self.depth_keys,
                MAIN_LIST,
                &camera.view(),
                &frustum,
            );
            self.depth_keys.sort_ascending();
        }

        push_color_keys(&self.store, &mut self.color_keys, MAIN_LIST, Some(&frustum));
        self.color_keys.sort_ascending();
    }

    /// Runs every enabled pass for the current store contents.
    pub fn render<C: GpuContext + ?Sized>(
        &mut self,
        ctx: &mut C,
        assets: &Assets,
        view: &FrameView,
        resources: &FrameResources,
    ) -> FrameStats {
        let start = Instant::now();
        self.prepare(view);

        let mut stats = FrameStats {
            items: self.store.len() as u32,
            cascades: self.cascades.len() as u32,
            shadow_entries: self.shadow_keys.len() as u32,
            depth_entries: self.depth_keys.len() as u32,
            color_entries: self.color_keys.len() as u32,
            ..FrameStats::default()
        };

        if self.shadows_active(view) {
            let walk = self.shadow_pass(ctx, assets, resources);
            stats.add_walk(walk);
        }

        ctx.upload_constants(
            resources.view_constants,
            ViewUniform::from_camera(&view.camera).as_bytes(),
        );
        self.state.set_constant_buffer(
            ShaderStage::Vertex,
            VIEW_CONSTANT_SLOT,
            Some(resources.view_constants),
        );

        if self.settings.depth_prepass {
            let walk = self.depth_prepass(ctx, assets, resources);
            stats.add_walk(walk);
        }

        let walk = self.color_pass(ctx, assets, resources);
        stats.add_walk(walk);

        let state_stats = self.state.take_stats();
        stats.state_calls = state_stats.state_calls;
        stats.hazards_resolved = state_stats.hazards_resolved;
        stats.cpu_time = start.elapsed();

        log::debug!(
            "Frame: {} items, {} draws in {} batches, {} state calls, {} dropped, {:?}",
            stats.items,
            stats.draws,
            stats.batches,
            stats.state_calls,
            stats.dropped,
            stats.cpu_time
        );
        stats
    }

    fn shadow_pass<C: GpuContext + ?Sized>(
        &mut self,
        ctx: &mut C,
        assets: &Assets,
        resources: &FrameResources,
    ) -> WalkStats {
        self.state
            .set_render_targets(RenderTargets::depth_only(resources.shadow_atlas));
        self.state.request_clear(ClearRequest::depth(1.0));
        self.state.set_constant_buffer(
            ShaderStage::Vertex,
            VIEW_CONSTANT_SLOT,
            Some(resources.view_constants),
        );

        let mut walk = SubmissionWalk::new(
            assets,
            &self.store,
            PassBinding::Override(resources.shadow_pass),
            resources.instance_constants,
            self.settings.instance_batch_capacity,
        );

        let entries = self.shadow_keys.entries();
        let mut start = 0;
        while start < entries.len() {
            let cascade_index = entries[start].key.cascade();
            let end = entries[start..]
                .iter()
                .position(|entry| entry.key.cascade() != cascade_index)
                .map_or(entries.len(), |offset| start + offset);

            if let Some(cascade) = self.cascades.get(cascade_index) {
                self.state.set_viewport(cascade.viewport);
                ctx.upload_constants(
                    resources.view_constants,
                    ViewUniform::from_cascade(cascade).as_bytes(),
                );
                walk.submit(&mut self.state, ctx, &entries[start..end]);
            }
            start = end;
        }

        // Nothing drawn still owes the atlas its clear.
        if walk.stats().draws == 0 {
            self.state.flush(ctx);
        }

        log::debug!(
            "Shadow pass: {} cascades, {} entries",
            self.cascades.len(),
            entries.len()
        );
        walk.stats()
    }

    fn depth_prepass<C: GpuContext + ?Sized>(
        &mut self,
        ctx: &mut C,
        assets: &Assets,
        resources: &FrameResources,
    ) -> WalkStats {
        self.state
            .set_render_targets(RenderTargets::depth_only(resources.depth_target));
        self.state.request_clear(ClearRequest::depth(1.0));
        self.state.set_viewport(resources.viewport());

        let mut walk = SubmissionWalk::new(
            assets,
            &self.store,
            PassBinding::Override(resources.depth_pass),
            resources.instance_constants,
            self.settings.instance_batch_capacity,
        );
        walk.submit(&mut self.state, ctx, self.depth_keys.entries());
        if walk.stats().draws == 0 {
            self.state.flush(ctx);
        }
        walk.stats()
    }

    fn begin_color_pass(&mut self, resources: &FrameResources) {
        self.state.set_render_targets(RenderTargets::color_depth(
            resources.color_target,
            resources.depth_target,
        ));
        // The prepass already laid down (and cleared) depth.
        let clear = if self.settings.depth_prepass {
            ClearRequest {
                color: Some(resources.clear_color),
                ..ClearRequest::default()
            }
        } else {
            ClearRequest::color_depth(resources.clear_color, 1.0)
        };
        self.state.request_clear(clear);
        self.state.set_viewport(resources.viewport());
    }

    fn color_pass<C: GpuContext + ?Sized>(
        &mut self,
        ctx: &mut C,
        assets: &Assets,
        resources: &FrameResources,
    ) -> WalkStats {
        self.begin_color_pass(resources);

        let mut walk = SubmissionWalk::new(
            assets,
            &self.store,
            PassBinding::Material,
            resources.instance_constants,
            self.settings.instance_batch_capacity,
        );
        walk.submit(&mut self.state, ctx, self.color_keys.entries());
        if walk.stats().draws == 0 {
            self.state.flush(ctx);
        }
        walk.stats()
    }

    /// Records the sorted color pass into `bucket` instead of drawing it.
    ///
    /// Needs only shared access, so it can run on a worker thread once
    /// [`prepare`](Self::prepare) has been called. Each instance batch
    /// becomes one chain: its upload followed by one draw per surface.
    pub fn record_color_pass(
        &self,
        resources: &FrameResources,
        bucket: &mut CommandBucket<ColorKey>,
    ) -> ScheduleResult<usize> {
        let mut staging = InstanceStaging::default();
        let mut chains = 0;

        for entry in self.color_keys.entries() {
            let Some(item) = self.store.item(entry.item) else {
                continue;
            };
            let source = item.render_data.source;
            let pass = item.render_data.pass;

            for batch in instance_batches(
                item.instances.len() as u32,
                self.settings.instance_batch_capacity,
            ) {
                let range = batch.first as usize..(batch.first + batch.count) as usize;
                let bytes = bucket.alloc_bytes(staging.fill(&item.instances[range]))?;
                let mut tail = bucket.record(
                    entry.key,
                    Command::UploadConstants {
                        buffer: resources.instance_constants,
                        bytes,
                    },
                )?;
                for surface in item.surfaces {
                    tail = bucket.chain_after(
                        tail,
                        Command::Draw {
                            source,
                            pass,
                            surface: *surface,
                            instance_count: batch.count,
                        },
                    )?;
                }
                chains += 1;
            }
        }

        Ok(chains)
    }

    /// Replays a recorded color pass. The bucket is sorted first.
    pub fn submit_recorded_color_pass<C: GpuContext + ?Sized>(
        &mut self,
        ctx: &mut C,
        assets: &Assets,
        view: &FrameView,
        resources: &FrameResources,
        bucket: &mut CommandBucket<ColorKey>,
    ) -> SubmitStats {
        ctx.upload_constants(
            resources.view_constants,
            ViewUniform::from_camera(&view.camera).as_bytes(),
        );
        self.state.set_constant_buffer(
            ShaderStage::Vertex,
            VIEW_CONSTANT_SLOT,
            Some(resources.view_constants),
        );
        self.state.set_constant_buffer(
            ShaderStage::Vertex,
            INSTANCE_CONSTANT_SLOT,
            Some(resources.instance_constants),
        );
        self.begin_color_pass(resources);

        bucket.sort();
        let stats = bucket.submit(assets, &mut self.state, ctx);
        if stats.draws == 0 {
            self.state.flush(ctx);
        }
        stats
    }
}
