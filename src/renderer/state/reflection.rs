use std::collections::HashMap;

use crate::renderer::context::{ShaderId, ShaderSet, ShaderStage};

/// Slot usage of one compiled shader, supplied by the shader layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderReflection {
    /// Vertex buffer slots read by the input assembler (vertex shaders only).
    pub vertex_inputs: u32,
    pub textures: u32,
    pub samplers: u32,
    pub constant_buffers: u32,
}

impl ShaderReflection {
    /// Assumed for shaders nobody registered reflection for.
    pub const EVERYTHING: Self = Self {
        vertex_inputs: u32::MAX,
        textures: u32::MAX,
        samplers: u32::MAX,
        constant_buffers: u32::MAX,
    };

    /// Vertex shader reading positions from slot 0 plus the view and
    /// instance constants.
    pub const fn position_only() -> Self {
        Self {
            vertex_inputs: 0b1,
            textures: 0,
            samplers: 0,
            constant_buffers: 0b11,
        }
    }
}

pub type ReflectionRegistry = HashMap<ShaderId, ShaderReflection>;

/// What the currently pending shader set actually consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineInfo {
    pub active: [bool; ShaderStage::COUNT],
    pub vertex_inputs: u32,
    pub textures: [u32; ShaderStage::COUNT],
    pub samplers: [u32; ShaderStage::COUNT],
    pub constant_buffers: [u32; ShaderStage::COUNT],
}

impl PipelineInfo {
    pub fn resolve(shaders: &ShaderSet, reflections: &ReflectionRegistry) -> Self {
        let mut info = Self {
            active: [false; ShaderStage::COUNT],
            vertex_inputs: 0,
            textures: [0; ShaderStage::COUNT],
            samplers: [0; ShaderStage::COUNT],
            constant_buffers: [0; ShaderStage::COUNT],
        };

        for stage in ShaderStage::ALL {
            let Some(shader) = shaders.get(stage) else {
                continue;
            };
            let reflection = reflections
                .get(&shader)
                .copied()
                .unwrap_or(ShaderReflection::EVERYTHING);
            let s = stage.index();
            info.active[s] = true;
            info.textures[s] = reflection.textures;
            info.samplers[s] = reflection.samplers;
            info.constant_buffers[s] = reflection.constant_buffers;
            if stage == ShaderStage::Vertex {
                info.vertex_inputs = reflection.vertex_inputs;
            }
        }

        info
    }
}
