pub mod asset;
pub mod error;
pub mod renderer;
pub mod scene;
pub mod settings;

pub use error::{ScheduleError, ScheduleResult};
pub use settings::SchedulerSettings;

pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .try_init();
}
