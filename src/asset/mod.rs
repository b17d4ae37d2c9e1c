pub mod cache;
pub mod handle;
pub mod pass;
pub mod source;

pub use cache::Registry;
pub use handle::Handle;
pub use pass::{ShadingPass, SlotBinding};
pub use source::RenderSource;

/// Registries the scheduler reads render sources and shading passes from.
pub struct Assets {
    pub sources: Registry<RenderSource>,
    pub passes: Registry<ShadingPass>,
}

impl Assets {
    pub fn new() -> Self {
        Self {
            sources: Registry::new(),
            passes: Registry::new(),
        }
    }
}

impl Default for Assets {
    fn default() -> Self {
        Self::new()
    }
}
