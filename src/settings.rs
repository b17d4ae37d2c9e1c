use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::renderer::batch::INSTANCE_BATCH_CAPACITY;
use crate::renderer::cascades::MAX_CASCADES;
use crate::renderer::store::StoreCapacity;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchedulerSettings {
    #[serde(default)]
    pub store: StoreCapacity,
    #[serde(default)]
    pub sort: SortCapacity,
    #[serde(default = "SchedulerSettings::default_instance_batch_capacity")]
    pub instance_batch_capacity: usize,
    #[serde(default = "SchedulerSettings::default_depth_prepass")]
    pub depth_prepass: bool,
    #[serde(default)]
    pub shadows: ShadowSettings,
    #[serde(default)]
    pub commands: CommandCapacity,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            store: StoreCapacity::default(),
            sort: SortCapacity::default(),
            instance_batch_capacity: Self::default_instance_batch_capacity(),
            depth_prepass: Self::default_depth_prepass(),
            shadows: ShadowSettings::default(),
            commands: CommandCapacity::default(),
        }
    }
}

impl SchedulerSettings {
    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Self {
        use std::fs;

        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|err| {
                warn!(
                    "Failed to parse {:?} ({}). Falling back to default scheduler settings.",
                    path, err
                );
                SchedulerSettings::default()
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    "Scheduler settings file {:?} not found. Using default settings.",
                    path
                );
                SchedulerSettings::default()
            }
            Err(err) => {
                warn!(
                    "Failed to read {:?} ({}). Falling back to default scheduler settings.",
                    path, err
                );
                SchedulerSettings::default()
            }
        }
    }

    /// Parses and validates settings from a JSON document.
    pub fn from_json(contents: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<SchedulerSettings>(contents).map(SchedulerSettings::validate)
    }

    pub fn validate(mut self) -> Self {
        let store = &mut self.store;
        let store_defaults = StoreCapacity::default();
        for (name, value, default) in [
            ("render data", &mut store.render_data, store_defaults.render_data),
            ("item", &mut store.items, store_defaults.items),
            ("surface", &mut store.surfaces, store_defaults.surfaces),
            ("instance", &mut store.instances, store_defaults.instances),
        ] {
            if *value == 0 {
                warn!("Store {} capacity must be greater than zero. Using {}.", name, default);
                *value = default;
            }
        }

        let sort_defaults = SortCapacity::default();
        for (name, value, default) in [
            ("color", &mut self.sort.color, sort_defaults.color),
            ("depth", &mut self.sort.depth, sort_defaults.depth),
            ("shadow", &mut self.sort.shadow, sort_defaults.shadow),
        ] {
            if *value == 0 {
                warn!("{} sort capacity must be greater than zero. Using {}.", name, default);
                *value = default;
            }
        }

        if !(1..=INSTANCE_BATCH_CAPACITY).contains(&self.instance_batch_capacity) {
            let clamped = self.instance_batch_capacity.clamp(1, INSTANCE_BATCH_CAPACITY);
            warn!(
                "Instance batch capacity {} is outside 1..={}. Using {}.",
                self.instance_batch_capacity, INSTANCE_BATCH_CAPACITY, clamped
            );
            self.instance_batch_capacity = clamped;
        }

        self.shadows = self.shadows.validate();

        if self.commands.packets == 0 {
            warn!("Command packet capacity must be greater than zero. Using default value.");
            self.commands.packets = CommandCapacity::default().packets;
        }

        if self.commands.bytes == 0 {
            warn!("Command byte capacity must be greater than zero. Using default value.");
            self.commands.bytes = CommandCapacity::default().bytes;
        }

        self
    }

    const fn default_instance_batch_capacity() -> usize {
        INSTANCE_BATCH_CAPACITY
    }

    const fn default_depth_prepass() -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SortCapacity {
    pub color: usize,
    pub depth: usize,
    pub shadow: usize,
}

impl Default for SortCapacity {
    fn default() -> Self {
        Self {
            color: 8192,
            depth: 8192,
            // Fan-out: one entry per (item, cascade).
            shadow: 8192 * MAX_CASCADES,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CommandCapacity {
    pub packets: usize,
    pub bytes: usize,
}

impl Default for CommandCapacity {
    fn default() -> Self {
        Self {
            packets: 32 * 1024,
            bytes: 4 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ShadowSettings {
    pub enabled: bool,
    pub cascade_count: usize,
    /// 0 = uniform splits, 1 = logarithmic.
    pub split_lambda: f32,
    /// Edge length of one cascade's square region in the atlas.
    pub map_size: u32,
    /// How far behind each split the light volume reaches for casters.
    pub caster_extension: f32,
    /// Shadows end here even when the camera sees further.
    pub max_distance: Option<f32>,
}

impl Default for ShadowSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            cascade_count: MAX_CASCADES,
            split_lambda: 0.75,
            map_size: 2048,
            caster_extension: 50.0,
            max_distance: Some(150.0),
        }
    }
}

impl ShadowSettings {
    fn validate(mut self) -> Self {
        let defaults = ShadowSettings::default();

        if !(1..=MAX_CASCADES).contains(&self.cascade_count) {
            let clamped = self.cascade_count.clamp(1, MAX_CASCADES);
            warn!(
                "Cascade count {} is outside 1..={}. Using {}.",
                self.cascade_count, MAX_CASCADES, clamped
            );
            self.cascade_count = clamped;
        }

        if !(0.0..=1.0).contains(&self.split_lambda) {
            warn!(
                "Split lambda {} is outside 0..=1. Using {}.",
                self.split_lambda, defaults.split_lambda
            );
            self.split_lambda = defaults.split_lambda;
        }

        if self.map_size == 0 {
            warn!("Shadow map size must be greater than zero. Using default value.");
            self.map_size = defaults.map_size;
        }

        if !(self.caster_extension >= 0.0) {
            warn!("Caster extension must be non-negative. Using default value.");
            self.caster_extension = defaults.caster_extension;
        }

        if let Some(distance) = self.max_distance {
            if !(distance > 0.0) {
                warn!("Shadow max distance must be positive. Shadows will use the camera far plane.");
                self.max_distance = None;
            }
        }

        self
    }
}
