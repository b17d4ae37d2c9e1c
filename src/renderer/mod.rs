// renderer/mod.rs

pub mod batch;
pub mod bounds;
pub mod cascades;
pub mod command;
pub mod context;
pub mod descriptors;
pub mod frame;
pub mod headless;
pub mod keys;
pub mod sort_key;
pub mod state;
pub mod store;
pub mod uniforms;

pub use bounds::{Aabb, Frustum};
pub use command::{Command, CommandBucket};
pub use context::GpuContext;
pub use frame::{FrameOrchestrator, FrameResources, FrameStats, FrameView};
pub use headless::{GpuCall, HeadlessContext};
pub use sort_key::{ColorKey, DepthKey, ShadowKey, SortKey, SortKeyList};
pub use state::{StateCache, StateDiff};
pub use store::{RenderItemStore, RenderMask, StoreCapacity, Surface};
pub use uniforms::ViewUniform;
