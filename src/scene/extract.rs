//! Scene to render item store extraction.
//!
//! Visible entities sharing a render source, shading pass, layer and render
//! mask collapse into a single item whose instances are the entities' world
//! matrices. Items with the same source and pass share one render data entry.

use std::collections::HashMap;

use glam::Mat4;
use hecs::World;
use rayon::prelude::*;

use crate::asset::{Assets, Handle, RenderSource, ShadingPass};
use crate::error::ScheduleResult;
use crate::renderer::store::{RenderDataIndex, RenderItemStore, RenderMask};
use crate::renderer::Aabb;
use crate::scene::components::{
    DirectionalLight, InstanceGroup, Layer, Renderable, RenderFlags, TransformComponent, Visible,
};
use crate::scene::Transform;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct GroupKey {
    renderable: Renderable,
    layer: u8,
    mask: u8,
}

struct ExtractEntity {
    key: GroupKey,
    transform: Transform,
    group: Option<Vec<Transform>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractStats {
    pub entities: u32,
    pub items: u32,
    pub instances: u32,
    /// Groups that could not be stored this frame.
    pub dropped: u32,
}

fn collect_entities(world: &World) -> Vec<ExtractEntity> {
    world
        .query::<(
            &TransformComponent,
            &Renderable,
            Option<&Layer>,
            Option<&RenderFlags>,
            Option<&Visible>,
            Option<&InstanceGroup>,
        )>()
        .iter()
        .filter(|(_, (_, _, _, _, visible, _))| visible.map_or(true, |v| v.0))
        .map(
            |(_entity, (transform, renderable, layer, flags, _visible, group))| ExtractEntity {
                key: GroupKey {
                    renderable: *renderable,
                    layer: layer.map_or(0, |l| l.0),
                    mask: flags.map_or(RenderMask::all(), |f| f.0).bits(),
                },
                transform: transform.0,
                group: group.map(|g| g.0.clone()),
            },
        )
        .collect()
}

fn world_matrices(entity: &ExtractEntity) -> Vec<Mat4> {
    let base = entity.transform.matrix();
    match &entity.group {
        Some(locals) => locals.iter().map(|local| base * local.matrix()).collect(),
        None => vec![base],
    }
}

/// First directional light in the world, if any.
pub fn find_directional_light(world: &World) -> Option<DirectionalLight> {
    world
        .query::<&DirectionalLight>()
        .iter()
        .next()
        .map(|(_, light)| *light)
}

/// Fills `store` from every visible renderable entity. The store is not
/// cleared first.
pub fn extract(world: &World, assets: &Assets, store: &mut RenderItemStore) -> ExtractStats {
    let entities = collect_entities(world);
    let matrices: Vec<Vec<Mat4>> = entities.par_iter().map(world_matrices).collect();

    // Group in first-seen order so extraction is deterministic.
    let mut order: Vec<GroupKey> = Vec::new();
    let mut groups: HashMap<GroupKey, Vec<Mat4>> = HashMap::new();
    for (entity, mats) in entities.iter().zip(matrices) {
        groups
            .entry(entity.key)
            .or_insert_with(|| {
                order.push(entity.key);
                Vec::new()
            })
            .extend(mats);
    }

    let mut stats = ExtractStats {
        entities: entities.len() as u32,
        ..ExtractStats::default()
    };
    let mut render_data: HashMap<Renderable, RenderDataIndex> = HashMap::new();

    for key in order {
        let Some(instances) = groups.get(&key) else {
            continue;
        };
        match submit_group(store, assets, &mut render_data, key, instances) {
            Ok(true) => {
                stats.items += 1;
                stats.instances += instances.len() as u32;
            }
            Ok(false) => stats.dropped += 1,
            Err(err) => {
                log::warn!(
                    "Dropping {} instances of {:?}: {}",
                    instances.len(),
                    key.renderable,
                    err
                );
                stats.dropped += 1;
            }
        }
    }

    log::debug!(
        "Extracted {} entities into {} items ({} instances, {} dropped)",
        stats.entities,
        stats.items,
        stats.instances,
        stats.dropped
    );
    stats
}

fn submit_group(
    store: &mut RenderItemStore,
    assets: &Assets,
    render_data: &mut HashMap<Renderable, RenderDataIndex>,
    key: GroupKey,
    instances: &[Mat4],
) -> ScheduleResult<bool> {
    let Renderable { source, pass } = key.renderable;
    let Some(source_data) = assets.sources.get(source) else {
        log::warn!("Renderable refers to unknown render source {:?}", source);
        return Ok(false);
    };

    let rd = match render_data.get(&key.renderable) {
        Some(index) => *index,
        None => {
            let index = store.add_render_data(source, pass, bounds_of(source_data))?;
            render_data.insert(key.renderable, index);
            index
        }
    };
    let surfaces = store.add_surfaces(&source_data.surfaces)?;
    let instance_bucket = store.add_instances(instances)?;
    store.submit_item(
        rd,
        surfaces,
        instance_bucket,
        RenderMask::from_bits_truncate(key.mask),
        key.layer,
    )?;
    Ok(true)
}

fn bounds_of(source: &RenderSource) -> Aabb {
    if source.bounds.is_empty() {
        Aabb::UNIT
    } else {
        source.bounds
    }
}

/// Shorthand for spawning a drawable entity.
pub fn spawn_renderable(
    world: &mut World,
    source: Handle<RenderSource>,
    pass: Handle<ShadingPass>,
    transform: Transform,
) -> hecs::Entity {
    world.spawn((TransformComponent(transform), Renderable { source, pass }, Visible(true)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::context::{ShaderId, ShaderSet};
    use crate::renderer::descriptors::VertexFormatDesc;
    use crate::renderer::store::{StoreCapacity, Surface};
    use glam::Vec3;

    fn assets() -> (Assets, Handle<RenderSource>, Handle<ShadingPass>) {
        let mut assets = Assets::new();
        let source = assets.sources.insert(
            RenderSource::new("cube", VertexFormatDesc::position_normal_uv())
                .with_surface(Surface::triangles(0, 36)),
        );
        let pass = assets
            .passes
            .insert(ShadingPass::new("lit", ShaderSet::new(ShaderId(1), ShaderId(2))));
        (assets, source, pass)
    }

    #[test]
    fn entities_sharing_source_and_pass_become_one_item() {
        let (assets, source, pass) = assets();
        let mut world = World::new();
        for i in 0..5 {
            spawn_renderable(
                &mut world,
                source,
                pass,
                Transform::from_translation(Vec3::X * i as f32),
            );
        }
        let hidden = spawn_renderable(&mut world, source, pass, Transform::IDENTITY);
        world.insert_one(hidden, Visible(false)).unwrap();

        let mut store = RenderItemStore::with_capacity(StoreCapacity::default());
        let stats = extract(&world, &assets, &mut store);

        assert_eq!(stats.entities, 5);
        assert_eq!(stats.items, 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.instances_len(), 5);
    }

    #[test]
    fn layers_split_items_but_share_render_data() {
        let (assets, source, pass) = assets();
        let mut world = World::new();
        let a = spawn_renderable(&mut world, source, pass, Transform::IDENTITY);
        spawn_renderable(&mut world, source, pass, Transform::IDENTITY);
        world.insert_one(a, Layer(3)).unwrap();

        let mut store = RenderItemStore::with_capacity(StoreCapacity::default());
        extract(&world, &assets, &mut store);

        assert_eq!(store.len(), 2);
        assert_eq!(store.render_data_len(), 1);
        let layers: Vec<u8> = store.items().map(|item| item.layer).collect();
        assert!(layers.contains(&3) && layers.contains(&0));
    }

    #[test]
    fn instance_groups_expand_relative_to_the_entity() {
        let (assets, source, pass) = assets();
        let mut world = World::new();
        let e = spawn_renderable(
            &mut world,
            source,
            pass,
            Transform::from_translation(Vec3::new(0.0, 10.0, 0.0)),
        );
        world
            .insert_one(
                e,
                InstanceGroup(vec![
                    Transform::from_translation(Vec3::X),
                    Transform::from_translation(-Vec3::X),
                ]),
            )
            .unwrap();

        let mut store = RenderItemStore::with_capacity(StoreCapacity::default());
        extract(&world, &assets, &mut store);

        let item = store.items().next().unwrap();
        assert_eq!(item.instances.len(), 2);
        let p = item.instances[0].world.transform_point3(Vec3::ZERO);
        assert!(p.abs_diff_eq(Vec3::new(1.0, 10.0, 0.0), 1e-6));
    }

    #[test]
    fn capacity_failures_drop_groups_without_panicking() {
        let (assets, source, pass) = assets();
        let mut world = World::new();
        let a = spawn_renderable(&mut world, source, pass, Transform::IDENTITY);
        spawn_renderable(&mut world, source, pass, Transform::IDENTITY);
        world.insert_one(a, Layer(1)).unwrap();

        let mut store = RenderItemStore::with_capacity(StoreCapacity {
            items: 1,
            ..StoreCapacity::default()
        });
        let stats = extract(&world, &assets, &mut store);
        assert_eq!(stats.items, 1);
        assert_eq!(stats.dropped, 1);
    }
}
