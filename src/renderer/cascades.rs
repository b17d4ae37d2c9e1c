//! Cascaded shadow map frustums.
//!
//! Derived once per frame: split the camera depth range, take each split's
//! eight frustum corners into light space, and fit a tight orthographic volume
//! whose eye sits at the split centroid pulled back along the light direction.

use glam::{Mat4, Vec3};

use super::context::Viewport;
use super::Frustum;
use crate::scene::Camera;
use crate::settings::ShadowSettings;

pub const MAX_CASCADES: usize = 4;

/// Far distance of each split using the practical split scheme.
///
/// `lambda` blends uniform (`0.0`) and logarithmic (`1.0`) distribution. The
/// last split always lands exactly on `far`.
pub fn compute_cascade_splits(count: usize, near: f32, far: f32, lambda: f32) -> [f32; MAX_CASCADES] {
    let mut splits = [0.0f32; MAX_CASCADES];
    let n = count.clamp(1, MAX_CASCADES);

    for (i, split) in splits.iter_mut().enumerate().take(n) {
        let p = (i + 1) as f32 / n as f32;
        let log_split = near * (far / near).powf(p);
        let uniform_split = near + (far - near) * p;
        *split = lambda * log_split + (1.0 - lambda) * uniform_split;
    }
    splits[n - 1] = far;

    splits
}

/// World-space corners of the view-space slice `[slice_near, slice_far]`.
/// Near face first, counter-clockwise from bottom-left.
pub fn frustum_corners_world(camera: &Camera, slice_near: f32, slice_far: f32) -> [Vec3; 8] {
    let tan_half_fov = (camera.fov_y_radians * 0.5).tan();
    let h_near = tan_half_fov * slice_near;
    let w_near = h_near * camera.aspect;
    let h_far = tan_half_fov * slice_far;
    let w_far = h_far * camera.aspect;

    let corners_view = [
        Vec3::new(-w_near, -h_near, -slice_near),
        Vec3::new(w_near, -h_near, -slice_near),
        Vec3::new(w_near, h_near, -slice_near),
        Vec3::new(-w_near, h_near, -slice_near),
        Vec3::new(-w_far, -h_far, -slice_far),
        Vec3::new(w_far, -h_far, -slice_far),
        Vec3::new(w_far, h_far, -slice_far),
        Vec3::new(-w_far, h_far, -slice_far),
    ];

    let inv_view = camera.view().inverse();
    corners_view.map(|corner| inv_view.transform_point3(corner))
}

#[derive(Debug, Clone, Copy)]
pub struct Cascade {
    pub index: u8,
    pub near: f32,
    pub far: f32,
    pub light_position: Vec3,
    pub view: Mat4,
    pub projection: Mat4,
    pub view_projection: Mat4,
    pub frustum: Frustum,
    /// Region of the shadow atlas this cascade renders into.
    pub viewport: Viewport,
}

impl Cascade {
    /// Distance from the cascade's light plane, non-negative inside its volume.
    pub fn light_depth(&self, world: Vec3) -> f32 {
        (-self.view.transform_point3(world).z).max(0.0)
    }
}

fn light_up(direction: Vec3) -> Vec3 {
    if direction.y.abs() > 0.99 {
        Vec3::X
    } else {
        Vec3::Y
    }
}

/// Fits a light-space orthographic volume around `corners`.
///
/// Returns `(light_position, view, projection)`. The eye is pulled back by the
/// corner radius plus `caster_extension`, so casters between the light and the
/// split still land inside the volume.
pub fn fit_cascade(direction: Vec3, corners: &[Vec3; 8], caster_extension: f32) -> (Vec3, Mat4, Mat4) {
    let direction = if direction.length_squared() > 1e-6 {
        direction.normalize()
    } else {
        Vec3::NEG_Y
    };

    let centroid = corners.iter().copied().sum::<Vec3>() / 8.0;
    let radius = corners
        .iter()
        .map(|corner| corner.distance(centroid))
        .fold(0.0f32, f32::max);

    let light_position = centroid - direction * (radius + caster_extension.max(0.0));
    let view = Mat4::look_at_rh(light_position, centroid, light_up(direction));

    let mut min = Vec3::splat(f32::MAX);
    let mut max = Vec3::splat(f32::MIN);
    for corner in corners {
        let ls = view.transform_point3(*corner);
        min = min.min(ls);
        max = max.max(ls);
    }

    // RH view space looks down -Z: the farthest corner has the smallest z.
    let far = (-min.z).max(1e-3);
    let projection = Mat4::orthographic_rh(min.x, max.x, min.y, max.y, 0.0, far);

    (light_position, view, projection)
}

/// All cascades of one directional light for the current frame.
#[derive(Debug, Clone, Default)]
pub struct CascadeSet {
    cascades: Vec<Cascade>,
    splits: [f32; MAX_CASCADES],
}

impl CascadeSet {
    pub fn build(camera: &Camera, light_direction: Vec3, settings: &ShadowSettings) -> Self {
        let count = settings.cascade_count.clamp(1, MAX_CASCADES);
        let near = camera.near.max(1e-3);
        let far = settings
            .max_distance
            .map_or(camera.far, |distance| distance.min(camera.far))
            .max(near + 1e-3);

        let splits = compute_cascade_splits(count, near, far, settings.split_lambda);
        let map_size = settings.map_size as f32;

        let mut cascades = Vec::with_capacity(count);
        let mut slice_near = near;
        for (index, &slice_far) in splits.iter().enumerate().take(count) {
            let corners = frustum_corners_world(camera, slice_near, slice_far);
            let (light_position, view, projection) =
                fit_cascade(light_direction, &corners, settings.caster_extension);
            let view_projection = projection * view;

            cascades.push(Cascade {
                index: index as u8,
                near: slice_near,
                far: slice_far,
                light_position,
                view,
                projection,
                view_projection,
                frustum: Frustum::from_matrix(view_projection),
                viewport: Viewport::new(index as f32 * map_size, 0.0, map_size, map_size),
            });
            slice_near = slice_far;
        }

        log::debug!(
            "Built {} shadow cascades over [{:.2}, {:.2}]: splits {:?}",
            count,
            near,
            far,
            &splits[..count]
        );

        Self { cascades, splits }
    }

    pub fn cascades(&self) -> &[Cascade] {
        &self.cascades
    }

    pub fn get(&self, index: u8) -> Option<&Cascade> {
        self.cascades.get(index as usize)
    }

    pub fn splits(&self) -> &[f32] {
        &self.splits[..self.cascades.len()]
    }

    pub fn len(&self) -> usize {
        self.cascades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cascades.is_empty()
    }
}
