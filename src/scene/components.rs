// scene/components.rs
// Plain hecs components consumed by extraction.

use glam::Vec3;

use crate::asset::{Handle, RenderSource, ShadingPass};
use crate::renderer::store::RenderMask;
use crate::scene::Transform;

/// Entity transform in world space.
#[derive(Debug, Clone, Copy)]
pub struct TransformComponent(pub Transform);

/// What to draw and how to shade it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Renderable {
    pub source: Handle<RenderSource>,
    pub pass: Handle<ShadingPass>,
}

/// Paint-order tiebreak; entities without one use layer 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Layer(pub u8);

/// Passes the entity takes part in; entities without one take part in all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderFlags(pub RenderMask);

#[derive(Debug, Clone, Copy)]
pub struct Visible(pub bool);

impl Default for Visible {
    fn default() -> Self {
        Self(true)
    }
}

/// Draws the entity once per local transform, each relative to the entity's
/// own transform.
#[derive(Debug, Clone, Default)]
pub struct InstanceGroup(pub Vec<Transform>);

/// Shadow-casting light; the first one found drives the shadow pass.
#[derive(Debug, Clone, Copy)]
pub struct DirectionalLight {
    /// Direction the light travels, not the direction towards it.
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            direction: Vec3::new(-0.4, -1.0, -0.3).normalize(),
            color: Vec3::ONE,
            intensity: 1.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Name(pub String);

impl Name {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}
