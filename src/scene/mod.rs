// scene/mod.rs

pub mod camera;
pub mod components;
pub mod extract;
pub mod transform;

pub use camera::Camera;
pub use transform::Transform;

pub use components::{
    DirectionalLight, InstanceGroup, Layer, Name, RenderFlags, Renderable, TransformComponent,
    Visible,
};
pub use extract::{extract, find_directional_light, spawn_renderable, ExtractStats};
