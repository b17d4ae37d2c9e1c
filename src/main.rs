use draw_scheduler::asset::{Assets, Handle, RenderSource, ShadingPass};
use draw_scheduler::renderer::command::CommandBucket;
use draw_scheduler::renderer::context::{
    BufferId, IndexBufferBinding, ShaderId, ShaderSet, ShaderStage, TextureId, VertexBufferBinding,
};
use draw_scheduler::renderer::descriptors::{DepthDesc, SamplerDesc, VertexFormatDesc};
use draw_scheduler::renderer::frame::{FrameResources, FrameView, FIRST_PASS_CONSTANT_SLOT};
use draw_scheduler::renderer::state::ShaderReflection;
use draw_scheduler::renderer::{Aabb, FrameOrchestrator, HeadlessContext, Surface};
use draw_scheduler::scene::{
    self, Camera, DirectionalLight, InstanceGroup, Layer, Name, Transform,
};
use draw_scheduler::SchedulerSettings;
use glam::{Quat, Vec3};
use hecs::World;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

const FRAMES: u32 = 4;
const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;

struct DemoAssets {
    assets: Assets,
    sources: Vec<Handle<RenderSource>>,
    passes: Vec<Handle<ShadingPass>>,
    depth_pass: Handle<ShadingPass>,
    shadow_pass: Handle<ShadingPass>,
}

fn build_assets() -> DemoAssets {
    let mut assets = Assets::new();
    let format = VertexFormatDesc::position_normal_uv();

    let cube = assets.sources.insert(
        RenderSource::new("cube", format)
            .with_vertex_buffer(
                0,
                VertexBufferBinding {
                    buffer: BufferId(100),
                    stride: 32,
                    offset: 0,
                },
            )
            .with_index_buffer(IndexBufferBinding {
                buffer: BufferId(101),
                format: wgpu::IndexFormat::Uint16,
                offset: 0,
            })
            .with_surface(Surface::triangles(0, 36))
            .with_bounds(Aabb::UNIT),
    );
    let rock = assets.sources.insert(
        RenderSource::new("rock", format)
            .with_vertex_buffer(
                0,
                VertexBufferBinding {
                    buffer: BufferId(102),
                    stride: 32,
                    offset: 0,
                },
            )
            .with_surface(Surface::triangles(0, 960))
            .with_surface(Surface::triangles(960, 240))
            .with_bounds(Aabb::new(Vec3::splat(-1.5), Vec3::splat(1.5))),
    );

    let material = BufferId(200);
    let lit = assets.passes.insert(
        ShadingPass::new("lit", ShaderSet::new(ShaderId(1), ShaderId(2)))
            .with_texture(ShaderStage::Fragment, 0, TextureId(10))
            .with_texture(ShaderStage::Fragment, 1, TextureId(3))
            .with_sampler(ShaderStage::Fragment, 0, SamplerDesc::LINEAR_REPEAT)
            .with_sampler(ShaderStage::Fragment, 1, SamplerDesc::SHADOW_COMPARE)
            .with_constant_buffer(ShaderStage::Vertex, FIRST_PASS_CONSTANT_SLOT, material),
    );
    let unlit = assets.passes.insert(
        ShadingPass::new("unlit", ShaderSet::new(ShaderId(1), ShaderId(3)))
            .with_texture(ShaderStage::Fragment, 0, TextureId(11))
            .with_sampler(ShaderStage::Fragment, 0, SamplerDesc::LINEAR_REPEAT)
            .with_depth(DepthDesc::TEST_ONLY),
    );
    let depth_pass = assets.passes.insert(ShadingPass::depth_only(
        "depth prepass",
        ShaderSet::vertex_only(ShaderId(4)),
    ));
    let shadow_pass = assets.passes.insert(
        ShadingPass::depth_only("shadow", ShaderSet::vertex_only(ShaderId(5)))
            .with_depth(DepthDesc::LESS_EQUAL.with_bias(2, 2.0)),
    );

    DemoAssets {
        assets,
        sources: vec![cube, rock],
        passes: vec![lit, unlit],
        depth_pass,
        shadow_pass,
    }
}

fn build_world(demo: &DemoAssets, rng: &mut SmallRng) -> World {
    let mut world = World::new();
    world.spawn((Name::new("sun"), DirectionalLight::default()));

    for i in 0..48 {
        let source = demo.sources[rng.gen_range(0..demo.sources.len())];
        let pass = demo.passes[rng.gen_range(0..demo.passes.len())];
        let position = Vec3::new(
            rng.gen_range(-20.0..20.0),
            rng.gen_range(0.0..4.0),
            rng.gen_range(-40.0..0.0),
        );
        let transform = Transform::from_translation(position)
            .with_rotation(Quat::from_rotation_y(rng.gen_range(0.0..std::f32::consts::TAU)));
        let entity = scene::spawn_renderable(&mut world, source, pass, transform);

        let _ = world.insert_one(entity, Name::new(format!("prop {i}")));
        if i % 8 == 0 {
            let _ = world.insert_one(entity, Layer(1));
        }
        if i % 5 == 0 {
            let locals = (0..rng.gen_range(2..40))
                .map(|_| {
                    Transform::from_translation(Vec3::new(
                        rng.gen_range(-3.0..3.0),
                        0.0,
                        rng.gen_range(-3.0..3.0),
                    ))
                    .with_scale(Vec3::splat(rng.gen_range(0.2..0.6)))
                })
                .collect();
            let _ = world.insert_one(entity, InstanceGroup(locals));
        }
    }

    world
}

fn main() {
    draw_scheduler::init_logging();
    log::info!("Starting headless draw scheduler demo");

    let settings = SchedulerSettings::load_from_path("scheduler_settings.json");
    let command_capacity = settings.commands;
    let mut rng = SmallRng::seed_from_u64(7);

    let demo = build_assets();
    let world = build_world(&demo, &mut rng);

    let mut orchestrator = FrameOrchestrator::new(settings);
    orchestrator
        .state_mut()
        .register_reflection(ShaderId(4), ShaderReflection::position_only());
    orchestrator
        .state_mut()
        .register_reflection(ShaderId(5), ShaderReflection::position_only());

    let resources = FrameResources {
        color_target: TextureId(1),
        depth_target: TextureId(2),
        shadow_atlas: TextureId(3),
        view_constants: BufferId(1),
        instance_constants: BufferId(2),
        depth_pass: demo.depth_pass,
        shadow_pass: demo.shadow_pass,
        width: WIDTH,
        height: HEIGHT,
        clear_color: [0.05, 0.05, 0.08, 1.0],
    };

    let mut ctx = HeadlessContext::new();
    let light = scene::find_directional_light(&world);

    for frame in 0..FRAMES {
        let angle = frame as f32 * 0.2;
        let camera = Camera {
            eye: Vec3::new(angle.sin() * 12.0, 6.0, 10.0 + angle.cos() * 4.0),
            target: Vec3::new(0.0, 0.0, -15.0),
            ..Camera::default()
        }
        .with_aspect(WIDTH as f32, HEIGHT as f32);
        let view = FrameView { camera, light };

        orchestrator.begin_frame();
        let extracted = scene::extract(&world, &demo.assets, orchestrator.store_mut());
        let stats = orchestrator.render(&mut ctx, &demo.assets, &view, &resources);

        log::info!(
            "Frame {}: {} entities -> {} items, {} cascades, entries shadow/depth/color {}/{}/{}, \
             {} draws in {} batches, {} state calls ({} GPU calls), {:?}",
            frame,
            extracted.entities,
            stats.items,
            stats.cascades,
            stats.shadow_entries,
            stats.depth_entries,
            stats.color_entries,
            stats.draws,
            stats.batches,
            stats.state_calls,
            ctx.calls().len(),
            stats.cpu_time
        );
        ctx.clear_calls();
    }

    // Same scene through the deferred recorder: record, sort, replay.
    let mut bucket = CommandBucket::with_capacity(command_capacity.packets, command_capacity.bytes);
    match orchestrator.record_color_pass(&resources, &mut bucket) {
        Ok(chains) => {
            let camera = Camera::default().with_aspect(WIDTH as f32, HEIGHT as f32);
            let view = FrameView { camera, light };
            let submitted = orchestrator.submit_recorded_color_pass(
                &mut ctx,
                &demo.assets,
                &view,
                &resources,
                &mut bucket,
            );
            log::info!(
                "Recorded {} chains ({} packets, {} bytes); replayed {} uploads and {} draws",
                chains,
                bucket.packet_count(),
                bucket.bytes_used(),
                submitted.uploads,
                submitted.draws
            );
        }
        Err(err) => log::error!("Recording the color pass failed: {}", err),
    }

    log::info!("Demo complete");
}
