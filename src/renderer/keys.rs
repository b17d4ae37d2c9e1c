//! Sort-key producers: walk a store once per pass and fill that pass's list.
//!
//! Each producer skips items whose render mask excludes the pass or that
//! have no instances, and stops at the list's capacity, logging how many
//! items were dropped.

use glam::Mat4;

use super::cascades::CascadeSet;
use super::sort_key::{ColorKey, DepthKey, ListId, ShadowKey, SortKey, SortKeyList};
use super::store::{ItemView, RenderItemStore, RenderMask};
use super::Frustum;

fn eligible(item: &ItemView<'_>, pass: RenderMask) -> bool {
    item.mask.contains(pass) && !item.instances.is_empty() && !item.surfaces.is_empty()
}

fn warn_dropped<K: SortKey>(pass: &str, dropped: usize, list: &SortKeyList<K>) {
    if dropped > 0 {
        log::warn!(
            "{} pass dropped {} entries: sort list capacity {} reached",
            pass,
            dropped,
            list.capacity()
        );
    }
}

/// View-space distance (positive in front of the camera) of the nearest
/// instance's bounds center.
fn nearest_view_depth(item: &ItemView<'_>, view: &Mat4) -> f32 {
    let center = item.render_data.local_bounds.center();
    item.instances
        .iter()
        .map(|instance| -view.transform_point3(instance.world.transform_point3(center)).z)
        .fold(f32::MAX, f32::min)
        .max(0.0)
}

/// Mesh bits come from the render source, shader bits from the shading pass.
pub fn color_key(item: &ItemView<'_>) -> ColorKey {
    ColorKey::new(
        item.render_data.source.index(),
        item.render_data.pass.index(),
        item.layer,
    )
}

/// Returns the number of entries pushed. Items outside `frustum` are culled
/// when one is given.
pub fn push_color_keys(
    store: &RenderItemStore,
    list: &mut SortKeyList<ColorKey>,
    list_id: ListId,
    frustum: Option<&Frustum>,
) -> usize {
    let mut pushed = 0;
    let mut dropped = 0;
    for item in store.items().filter(|item| eligible(item, RenderMask::COLOR)) {
        if let Some(frustum) = frustum {
            if !frustum.intersects_aabb(&item.world_bounds()) {
                continue;
            }
        }
        match list.add(color_key(&item), list_id, item.index) {
            Ok(_) => pushed += 1,
            Err(_) => dropped += 1,
        }
    }
    warn_dropped("Color", dropped, list);
    pushed
}

/// Front-to-back keys for the depth prepass. `view` is the camera view
/// matrix; items outside `frustum` are culled so every keyed depth is
/// non-negative.
pub fn push_depth_keys(
    store: &RenderItemStore,
    list: &mut SortKeyList<DepthKey>,
    list_id: ListId,
    view: &Mat4,
    frustum: &Frustum,
) -> usize {
    let mut pushed = 0;
    let mut dropped = 0;
    for item in store.items().filter(|item| eligible(item, RenderMask::DEPTH)) {
        if !frustum.intersects_aabb(&item.world_bounds()) {
            continue;
        }
        let key = DepthKey::new(nearest_view_depth(&item, view));
        match list.add(key, list_id, item.index) {
            Ok(_) => pushed += 1,
            Err(_) => dropped += 1,
        }
    }
    warn_dropped("Depth", dropped, list);
    pushed
}

/// One entry per (item, cascade) pair whose bounds intersect the cascade
/// volume, keyed by distance from that cascade's light plane.
pub fn push_shadow_keys(
    store: &RenderItemStore,
    list: &mut SortKeyList<ShadowKey>,
    list_id: ListId,
    cascades: &CascadeSet,
) -> usize {
    let mut pushed = 0;
    let mut dropped = 0;
    for item in store.items().filter(|item| eligible(item, RenderMask::SHADOW)) {
        let bounds = item.world_bounds();
        let center = bounds.center();
        for cascade in cascades.cascades() {
            if !cascade.frustum.intersects_aabb(&bounds) {
                continue;
            }
            let key = ShadowKey::new(cascade.index, cascade.light_depth(center));
            match list.add(key, list_id, item.index) {
                Ok(_) => pushed += 1,
                Err(_) => dropped += 1,
            }
        }
    }
    warn_dropped("Shadow", dropped, list);
    pushed
}
