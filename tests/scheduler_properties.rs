use draw_scheduler::asset::{Assets, Handle, RenderSource, ShadingPass};
use draw_scheduler::error::Pool;
use draw_scheduler::renderer::batch::{PassBinding, SubmissionWalk};
use draw_scheduler::renderer::cascades::CascadeSet;
use draw_scheduler::renderer::context::{
    BufferId, ClearRequest, RenderTargets, ShaderId, ShaderSet, ShaderStage, TextureId, Viewport,
};
use draw_scheduler::renderer::descriptors::{BlendDesc, SamplerDesc, VertexFormatDesc};
use draw_scheduler::renderer::keys::push_shadow_keys;
use draw_scheduler::renderer::sort_key::{quantize_depth, ListId};
use draw_scheduler::renderer::store::{ItemIndex, RenderDataIndex};
use draw_scheduler::renderer::{
    Aabb, ColorKey, DepthKey, GpuCall, HeadlessContext, RenderItemStore, RenderMask, ShadowKey,
    SortKey, SortKeyList, StateCache, StoreCapacity, Surface,
};
use draw_scheduler::scene::Camera;
use draw_scheduler::settings::ShadowSettings;
use draw_scheduler::ScheduleError;
use glam::{Mat4, Vec3};

const LIST: ListId = ListId(0);

fn small_store() -> RenderItemStore {
    RenderItemStore::with_capacity(StoreCapacity {
        render_data: 2,
        items: 2,
        surfaces: 2,
        instances: 4,
    })
}

fn handles() -> (Handle<RenderSource>, Handle<ShadingPass>) {
    (Handle::new(0), Handle::new(0))
}

#[test]
fn store_scenario_rejects_the_third_item() {
    let (source, pass) = handles();
    let mut store = small_store();

    let a = store.add_render_data(source, pass, Aabb::UNIT).unwrap();
    let b = store.add_render_data(source, pass, Aabb::UNIT).unwrap();
    assert!(store.add_render_data(source, pass, Aabb::UNIT).is_err());

    let surfaces_a = store.add_surfaces(&[Surface::triangles(0, 3)]).unwrap();
    let surfaces_b = store.add_surfaces(&[Surface::triangles(3, 3)]).unwrap();
    let instances_a = store.add_instances(&[Mat4::IDENTITY; 2]).unwrap();
    let instances_b = store.add_instances(&[Mat4::IDENTITY; 2]).unwrap();
    assert_eq!(
        store.add_instances(&[Mat4::IDENTITY]).unwrap_err(),
        ScheduleError::capacity(Pool::Instances, 4)
    );

    store
        .submit_item(a, surfaces_a, instances_a, RenderMask::all(), 0)
        .unwrap();
    store
        .submit_item(b, surfaces_b, instances_b, RenderMask::all(), 0)
        .unwrap();
    let third = store.submit_item(a, surfaces_a, instances_a, RenderMask::all(), 0);
    assert_eq!(third.unwrap_err(), ScheduleError::capacity(Pool::Items, 2));

    for item in store.raw_items() {
        assert!(item.surfaces.end() as usize <= store.surfaces_len());
        assert!(item.instances.end() as usize <= store.instances_len());
    }
    assert_eq!(store.len(), 2);
}

#[test]
fn release_builds_reject_unknown_render_data() {
    if cfg!(debug_assertions) {
        return;
    }
    let mut store = small_store();
    let surfaces = store.add_surfaces(&[Surface::triangles(0, 3)]).unwrap();
    let instances = store.add_instances(&[Mat4::IDENTITY]).unwrap();
    let result = store.submit_item(RenderDataIndex(1), surfaces, instances, RenderMask::all(), 0);
    assert_eq!(
        result.unwrap_err(),
        ScheduleError::InvalidReference { index: 1 }
    );
}

#[test]
fn shader_bits_outrank_layer_bits() {
    let mut list = SortKeyList::with_capacity(4);
    list.add(ColorKey::new(5, 100, 0), LIST, ItemIndex(0)).unwrap();
    list.add(ColorKey::new(5, 50, 255), LIST, ItemIndex(1)).unwrap();
    list.sort_ascending();

    let shaders: Vec<u32> = list.entries().iter().map(|e| e.key.shader()).collect();
    assert_eq!(shaders, vec![50, 100]);
    assert_eq!(list.entries()[0].item, ItemIndex(1));
}

#[test]
fn sorting_is_monotonic_and_idempotent() {
    let depths = [7.5f32, 0.25, 90.0, 3.0, 3.0, 0.0, 12.0, 1e-3];
    let mut list = SortKeyList::with_capacity(depths.len());
    for (i, depth) in depths.iter().enumerate() {
        list.add(DepthKey::new(*depth), LIST, ItemIndex(i as u32)).unwrap();
    }

    list.sort_ascending();
    let ascending: Vec<u64> = list.entries().iter().map(|e| e.key.bits()).collect();
    assert!(ascending.windows(2).all(|w| w[0] <= w[1]));

    let before = list.entries().to_vec();
    list.sort_ascending();
    assert_eq!(list.entries(), &before[..]);

    list.sort_descending();
    let descending: Vec<u64> = list.entries().iter().map(|e| e.key.bits()).collect();
    assert!(descending.windows(2).all(|w| w[0] >= w[1]));
}

#[test]
fn order_depends_on_keys_not_insertion() {
    // Same mesh and shader, different layer tiebreak.
    let keys = [ColorKey::new(3, 9, 2), ColorKey::new(3, 9, 1)];

    let mut forward = SortKeyList::with_capacity(2);
    let mut backward = SortKeyList::with_capacity(2);
    for key in keys {
        forward.add(key, LIST, ItemIndex(key.layer() as u32)).unwrap();
    }
    for key in keys.iter().rev() {
        backward.add(*key, LIST, ItemIndex(key.layer() as u32)).unwrap();
    }
    forward.sort_ascending();
    backward.sort_ascending();

    let items = |list: &SortKeyList<ColorKey>| -> Vec<ItemIndex> {
        list.entries().iter().map(|e| e.item).collect()
    };
    assert_eq!(items(&forward), vec![ItemIndex(1), ItemIndex(2)]);
    assert_eq!(items(&forward), items(&backward));
}

#[test]
fn sort_list_reports_its_capacity() {
    let mut list = SortKeyList::with_capacity(1);
    list.add(DepthKey::new(1.0), LIST, ItemIndex(0)).unwrap();
    let err = list.add(DepthKey::new(2.0), LIST, ItemIndex(1)).unwrap_err();
    assert_eq!(err, ScheduleError::capacity(Pool::SortEntries, 1));
}

#[test]
fn reconciliation_is_idempotent() {
    let mut state = StateCache::new();
    let mut ctx = HeadlessContext::new();

    state.set_render_targets(RenderTargets::color_depth(TextureId(1), TextureId(2)));
    state.request_clear(ClearRequest::color_depth([0.0; 4], 1.0));
    state.set_viewport(Viewport::new(0.0, 0.0, 640.0, 480.0));
    state.set_shaders(ShaderSet::new(ShaderId(1), ShaderId(2)));
    state.set_vertex_format(Some(VertexFormatDesc::position_normal_uv()));
    state.set_texture(ShaderStage::Fragment, 0, Some(TextureId(9)));
    state.set_sampler(ShaderStage::Fragment, 0, Some(SamplerDesc::LINEAR_REPEAT));
    state.set_constant_buffer(ShaderStage::Vertex, 0, Some(BufferId(4)));
    state.set_blend(BlendDesc::ALPHA);

    state.flush(&mut ctx);
    assert_eq!(state.current(), state.pending());
    assert!(state.diff().is_empty());
    assert!(ctx.calls().iter().any(|c| matches!(c, GpuCall::Clear(..))));

    ctx.clear_calls();
    state.flush(&mut ctx);
    assert!(ctx.calls().is_empty());

    // Rewriting the same values is still not a change.
    state.set_texture(ShaderStage::Fragment, 0, Some(TextureId(9)));
    state.set_blend(BlendDesc::ALPHA);
    state.draw(&mut ctx, 3, 0, 1);
    assert_eq!(ctx.calls().len(), 1);
    assert!(ctx.calls()[0].is_draw());
}

#[test]
fn instance_batches_cover_each_item_exactly() {
    let mut assets = Assets::new();
    let source = assets.sources.insert(
        RenderSource::new("strip", VertexFormatDesc::position_normal_uv())
            .with_surface(Surface::triangles(0, 6))
            .with_surface(Surface::triangles(6, 12)),
    );
    let pass = assets
        .passes
        .insert(ShadingPass::new("flat", ShaderSet::new(ShaderId(1), ShaderId(2))));

    let mut store = RenderItemStore::with_capacity(StoreCapacity::default());
    let rd = store.add_render_data(source, pass, Aabb::UNIT).unwrap();
    let surfaces = store.add_surfaces(&assets.sources.get(source).unwrap().surfaces).unwrap();
    let matrices: Vec<Mat4> = (0..37)
        .map(|i| Mat4::from_translation(Vec3::X * i as f32))
        .collect();
    let instances = store.add_instances(&matrices).unwrap();
    let item = store
        .submit_item(rd, surfaces, instances, RenderMask::all(), 0)
        .unwrap();

    let mut list = SortKeyList::with_capacity(1);
    list.add(DepthKey::new(0.0), LIST, item).unwrap();

    for capacity in [1usize, 5, 16] {
        let mut state = StateCache::new();
        let mut ctx = HeadlessContext::new();
        let mut walk = SubmissionWalk::new(
            &assets,
            &store,
            PassBinding::Material,
            BufferId(7),
            capacity,
        );
        walk.submit(&mut state, &mut ctx, list.entries());

        let uploads: Vec<usize> = ctx
            .calls()
            .iter()
            .filter_map(|call| match call {
                GpuCall::UploadConstants { buffer, bytes } if *buffer == BufferId(7) => {
                    Some(bytes.len())
                }
                _ => None,
            })
            .collect();
        let expected_batches = 37usize.div_ceil(capacity);
        assert_eq!(uploads.len(), expected_batches, "capacity {capacity}");
        assert_eq!(uploads.iter().sum::<usize>(), 37 * 128);

        let counts: Vec<u32> = ctx
            .calls()
            .iter()
            .filter_map(GpuCall::instance_count)
            .collect();
        assert_eq!(counts.len(), expected_batches * 2);
        assert!(counts.iter().all(|&c| c as usize <= capacity));
        // Each batch draws both surfaces.
        assert_eq!(ctx.instances_drawn(), 37 * 2);
        assert_eq!(walk.stats().batches as usize, expected_batches);
    }
}

#[test]
fn shadow_fan_out_matches_cascade_visibility() {
    let camera = Camera::default();
    let light = Vec3::new(-0.4, -1.0, -0.3);
    let settings = ShadowSettings::default();
    let cascades = CascadeSet::build(&camera, light, &settings);
    assert_eq!(cascades.len(), settings.cascade_count);

    let (source, pass) = handles();
    let mut store = RenderItemStore::with_capacity(StoreCapacity::default());
    let positions = [
        Vec3::ZERO,
        Vec3::new(0.0, 0.0, -85.0),
        Vec3::new(2.0, -1.0, -20.0),
        Vec3::new(0.0, 500.0, 0.0),
    ];
    for position in positions {
        let rd = store.add_render_data(source, pass, Aabb::UNIT).unwrap();
        let surfaces = store.add_surfaces(&[Surface::triangles(0, 3)]).unwrap();
        let instances = store
            .add_instances(&[Mat4::from_translation(position)])
            .unwrap();
        store
            .submit_item(rd, surfaces, instances, RenderMask::all(), 0)
            .unwrap();
    }

    let mut list: SortKeyList<ShadowKey> = SortKeyList::with_capacity(64);
    let pushed = push_shadow_keys(&store, &mut list, LIST, &cascades);
    assert_eq!(pushed, list.len());

    for item in store.items() {
        let bounds = item.world_bounds();
        let expected: Vec<u8> = cascades
            .cascades()
            .iter()
            .filter(|c| c.frustum.intersects_aabb(&bounds))
            .map(|c| c.index)
            .collect();
        let mut produced: Vec<u8> = list
            .entries()
            .iter()
            .filter(|e| e.item == item.index)
            .map(|e| e.key.cascade())
            .collect();
        produced.sort_unstable();
        assert_eq!(produced, expected, "item {:?}", item.index);

        for entry in list.entries().iter().filter(|e| e.item == item.index) {
            let cascade = cascades.get(entry.key.cascade()).unwrap();
            let depth = quantize_depth(cascade.light_depth(bounds.center()));
            assert_eq!(entry.key.depth(), depth);
        }
    }

    let cascades_of = |index: u32| -> Vec<u8> {
        list.entries()
            .iter()
            .filter(|e| e.item == ItemIndex(index))
            .map(|e| e.key.cascade())
            .collect()
    };
    assert!(cascades_of(0).contains(&0));
    let far = cascades_of(1);
    assert!(!far.contains(&0));
    assert!(far.contains(&(settings.cascade_count as u8 - 1)));
    assert!(cascades_of(3).is_empty());
}
