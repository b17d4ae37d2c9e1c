//! Per-frame render item store.
//!
//! Four fixed-capacity arrays (render data, surfaces, instances, items) filled
//! append-only during a frame and cleared wholesale at the start of the next.
//! Items refer into the other arrays through [`Bucket`]s, so nothing is ever
//! reallocated or individually freed.

use bitflags::bitflags;
use glam::Mat4;
use serde::{Deserialize, Serialize};

use super::Aabb;
use crate::asset::{Handle, RenderSource, ShadingPass};
use crate::error::{Pool, ScheduleError, ScheduleResult};

bitflags! {
    /// Passes an item takes part in.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RenderMask: u8 {
        const COLOR = 1 << 0;
        const DEPTH = 1 << 1;
        const SHADOW = 1 << 2;
    }
}

impl Default for RenderMask {
    fn default() -> Self {
        Self::all()
    }
}

/// Sub-range draw description over a render source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Surface {
    pub topology: wgpu::PrimitiveTopology,
    pub start: u32,
    pub count: u32,
}

impl Surface {
    pub fn triangles(start: u32, count: u32) -> Self {
        Self {
            topology: wgpu::PrimitiveTopology::TriangleList,
            start,
            count,
        }
    }
}

/// Contiguous run inside one of the store's arrays.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Bucket {
    pub index: u32,
    pub count: u32,
}

impl Bucket {
    pub fn end(&self) -> u32 {
        self.index + self.count
    }

    pub fn range(&self) -> std::ops::Range<usize> {
        self.index as usize..self.end() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderDataIndex(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemIndex(pub u32);

/// Shared by every item drawing the same source with the same pass; this
/// sharing is what the sort keys batch on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderData {
    pub source: Handle<RenderSource>,
    pub pass: Handle<ShadingPass>,
    pub local_bounds: Aabb,
}

/// World transform plus the inverse-transpose used for normals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InstanceTransform {
    pub world: Mat4,
    pub normal: Mat4,
}

impl InstanceTransform {
    pub fn new(world: Mat4) -> Self {
        let normal = if world.determinant().abs() > f32::EPSILON {
            world.inverse().transpose()
        } else {
            Mat4::IDENTITY
        };
        Self { world, normal }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderItem {
    pub render_data: RenderDataIndex,
    pub surfaces: Bucket,
    pub instances: Bucket,
    pub mask: RenderMask,
    /// Manual paint-order tiebreak, lowest first.
    pub layer: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreCapacity {
    pub render_data: usize,
    pub items: usize,
    pub surfaces: usize,
    pub instances: usize,
}

impl Default for StoreCapacity {
    fn default() -> Self {
        Self {
            render_data: 4096,
            items: 8192,
            surfaces: 16384,
            instances: 65536,
        }
    }
}

/// Read-only view of one submitted item with its buckets resolved.
#[derive(Debug, Clone, Copy)]
pub struct ItemView<'a> {
    pub index: ItemIndex,
    pub render_data: &'a RenderData,
    pub surfaces: &'a [Surface],
    pub instances: &'a [InstanceTransform],
    pub mask: RenderMask,
    pub layer: u8,
}

impl ItemView<'_> {
    /// Union of the local bounds under every instance transform.
    pub fn world_bounds(&self) -> Aabb {
        self.instances.iter().fold(Aabb::EMPTY, |bounds, instance| {
            bounds.union(&self.render_data.local_bounds.transformed(&instance.world))
        })
    }
}

pub struct RenderItemStore {
    capacity: StoreCapacity,
    render_data: Vec<RenderData>,
    surfaces: Vec<Surface>,
    instances: Vec<InstanceTransform>,
    items: Vec<RenderItem>,
}

impl RenderItemStore {
    /// Allocates every array up front; nothing grows afterwards.
    pub fn with_capacity(capacity: StoreCapacity) -> Self {
        Self {
            capacity,
            render_data: Vec::with_capacity(capacity.render_data),
            surfaces: Vec::with_capacity(capacity.surfaces),
            instances: Vec::with_capacity(capacity.instances),
            items: Vec::with_capacity(capacity.items),
        }
    }

    pub fn capacity(&self) -> StoreCapacity {
        self.capacity
    }

    /// Frame-start reset. Entries are `Copy`, so this only resets lengths.
    pub fn clear(&mut self) {
        self.render_data.clear();
        self.surfaces.clear();
        self.instances.clear();
        self.items.clear();
    }

    pub fn add_render_data(
        &mut self,
        source: Handle<RenderSource>,
        pass: Handle<ShadingPass>,
        local_bounds: Aabb,
    ) -> ScheduleResult<RenderDataIndex> {
        if self.render_data.len() >= self.capacity.render_data {
            return Err(ScheduleError::capacity(
                Pool::RenderData,
                self.capacity.render_data,
            ));
        }
        let index = RenderDataIndex(self.render_data.len() as u32);
        self.render_data.push(RenderData {
            source,
            pass,
            local_bounds,
        });
        Ok(index)
    }

    pub fn add_surfaces(&mut self, surfaces: &[Surface]) -> ScheduleResult<Bucket> {
        if self.surfaces.len() + surfaces.len() > self.capacity.surfaces {
            return Err(ScheduleError::capacity(Pool::Surfaces, self.capacity.surfaces));
        }
        let bucket = Bucket {
            index: self.surfaces.len() as u32,
            count: surfaces.len() as u32,
        };
        self.surfaces.extend_from_slice(surfaces);
        Ok(bucket)
    }

    pub fn add_instances(&mut self, matrices: &[Mat4]) -> ScheduleResult<Bucket> {
        if self.instances.len() + matrices.len() > self.capacity.instances {
            return Err(ScheduleError::capacity(
                Pool::Instances,
                self.capacity.instances,
            ));
        }
        let bucket = Bucket {
            index: self.instances.len() as u32,
            count: matrices.len() as u32,
        };
        self.instances
            .extend(matrices.iter().map(|world| InstanceTransform::new(*world)));
        Ok(bucket)
    }

    /// Submitting against a render data index not added this frame is a
    /// caller bug: it halts debug builds and returns `InvalidReference` in
    /// release builds.
    pub fn submit_item(
        &mut self,
        render_data: RenderDataIndex,
        surfaces: Bucket,
        instances: Bucket,
        mask: RenderMask,
        layer: u8,
    ) -> ScheduleResult<ItemIndex> {
        let valid = (render_data.0 as usize) < self.render_data.len();
        debug_assert!(
            valid,
            "render data index {} submitted but only {} added this frame",
            render_data.0,
            self.render_data.len()
        );
        if !valid {
            return Err(ScheduleError::InvalidReference {
                index: render_data.0,
            });
        }
        debug_assert!(surfaces.end() as usize <= self.surfaces.len());
        debug_assert!(instances.end() as usize <= self.instances.len());

        if self.items.len() >= self.capacity.items {
            return Err(ScheduleError::capacity(Pool::Items, self.capacity.items));
        }
        let index = ItemIndex(self.items.len() as u32);
        self.items.push(RenderItem {
            render_data,
            surfaces,
            instances,
            mask,
            layer,
        });
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn render_data_len(&self) -> usize {
        self.render_data.len()
    }

    pub fn surfaces_len(&self) -> usize {
        self.surfaces.len()
    }

    pub fn instances_len(&self) -> usize {
        self.instances.len()
    }

    pub fn raw_items(&self) -> &[RenderItem] {
        &self.items
    }

    pub fn item(&self, index: ItemIndex) -> Option<ItemView<'_>> {
        let item = self.items.get(index.0 as usize)?;
        Some(ItemView {
            index,
            render_data: &self.render_data[item.render_data.0 as usize],
            surfaces: &self.surfaces[item.surfaces.range()],
            instances: &self.instances[item.instances.range()],
            mask: item.mask,
            layer: item.layer,
        })
    }

    /// Forward iteration in submission order; the only downstream read path.
    pub fn items(&self) -> impl Iterator<Item = ItemView<'_>> + '_ {
        (0..self.items.len() as u32).filter_map(move |index| self.item(ItemIndex(index)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn store(render_data: usize, items: usize, surfaces: usize, instances: usize) -> RenderItemStore {
        RenderItemStore::with_capacity(StoreCapacity {
            render_data,
            items,
            surfaces,
            instances,
        })
    }

    #[test]
    fn buckets_stay_within_array_sizes() {
        let mut store = store(8, 8, 8, 8);
        for n in 0..4 {
            let data = store
                .add_render_data(Handle::new(n), Handle::new(0), Aabb::UNIT)
                .unwrap();
            let surfaces = store.add_surfaces(&[Surface::triangles(0, 36)]).unwrap();
            let matrices = vec![Mat4::IDENTITY; n as usize];
            let instances = store.add_instances(&matrices).unwrap();
            store
                .submit_item(data, surfaces, instances, RenderMask::all(), 0)
                .unwrap();
        }

        for item in store.raw_items() {
            assert!(item.surfaces.end() as usize <= store.surfaces_len());
            assert!(item.instances.end() as usize <= store.instances_len());
        }
        assert_eq!(store.items().count(), 4);
    }

    #[test]
    fn instances_fail_atomically_at_capacity() {
        let mut store = store(1, 1, 1, 3);
        store.add_instances(&[Mat4::IDENTITY; 2]).unwrap();
        let err = store.add_instances(&[Mat4::IDENTITY; 2]).unwrap_err();
        assert_eq!(err, ScheduleError::capacity(Pool::Instances, 3));
        assert_eq!(store.instances_len(), 2);
    }

    #[test]
    fn clear_resets_every_array() {
        let mut store = store(2, 2, 2, 2);
        let data = store
            .add_render_data(Handle::new(0), Handle::new(0), Aabb::UNIT)
            .unwrap();
        let surfaces = store.add_surfaces(&[Surface::triangles(0, 3)]).unwrap();
        let instances = store.add_instances(&[Mat4::IDENTITY]).unwrap();
        store
            .submit_item(data, surfaces, instances, RenderMask::COLOR, 3)
            .unwrap();

        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.render_data_len(), 0);
        assert_eq!(store.surfaces_len(), 0);
        assert_eq!(store.instances_len(), 0);
    }

    #[test]
    fn instance_normals_are_inverse_transpose() {
        let world = Mat4::from_scale(Vec3::new(2.0, 1.0, 1.0));
        let instance = InstanceTransform::new(world);
        let n = instance.normal.transform_vector3(Vec3::X);
        assert!(n.abs_diff_eq(Vec3::new(0.5, 0.0, 0.0), 1e-6));

        let degenerate = InstanceTransform::new(Mat4::from_scale(Vec3::ZERO));
        assert_eq!(degenerate.normal, Mat4::IDENTITY);
    }

    #[test]
    fn world_bounds_cover_all_instances() {
        let mut store = store(1, 1, 1, 2);
        let data = store
            .add_render_data(Handle::new(0), Handle::new(0), Aabb::UNIT)
            .unwrap();
        let surfaces = store.add_surfaces(&[Surface::triangles(0, 3)]).unwrap();
        let instances = store
            .add_instances(&[
                Mat4::from_translation(Vec3::new(-4.0, 0.0, 0.0)),
                Mat4::from_translation(Vec3::new(4.0, 0.0, 0.0)),
            ])
            .unwrap();
        let index = store
            .submit_item(data, surfaces, instances, RenderMask::all(), 0)
            .unwrap();

        let bounds = store.item(index).unwrap().world_bounds();
        assert!(bounds.min.abs_diff_eq(Vec3::new(-4.5, -0.5, -0.5), 1e-6));
        assert!(bounds.max.abs_diff_eq(Vec3::new(4.5, 0.5, 0.5), 1e-6));
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "render data index 5")]
    fn submitting_unknown_render_data_halts_debug_builds() {
        let mut store = store(1, 1, 1, 1);
        let _ = store.submit_item(
            RenderDataIndex(5),
            Bucket::default(),
            Bucket::default(),
            RenderMask::all(),
            0,
        );
    }
}
