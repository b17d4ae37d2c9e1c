//! Content descriptors for pipeline state objects.
//!
//! Descriptors are plain values: two equal descriptors always map to the same
//! backend object through [`StateObjectCache`](super::state::StateObjectCache),
//! which keys on [`content_hash`].

use std::hash::{Hash, Hasher};

use xxhash_rust::xxh3::Xxh3;

pub const MAX_VERTEX_ATTRIBUTES: usize = 8;

/// Hash of a descriptor's content, stable for the process lifetime.
pub fn content_hash<T: Hash + ?Sized>(value: &T) -> u64 {
    let mut hasher = Xxh3::new();
    value.hash(&mut hasher);
    hasher.finish()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendComponentDesc {
    pub src: wgpu::BlendFactor,
    pub dst: wgpu::BlendFactor,
    pub op: wgpu::BlendOperation,
}

impl BlendComponentDesc {
    pub const REPLACE: Self = Self {
        src: wgpu::BlendFactor::One,
        dst: wgpu::BlendFactor::Zero,
        op: wgpu::BlendOperation::Add,
    };

    pub const OVER: Self = Self {
        src: wgpu::BlendFactor::SrcAlpha,
        dst: wgpu::BlendFactor::OneMinusSrcAlpha,
        op: wgpu::BlendOperation::Add,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendDesc {
    pub enabled: bool,
    pub color: BlendComponentDesc,
    pub alpha: BlendComponentDesc,
    /// RGBA write mask, bit 0 = red.
    pub write_mask: u8,
}

impl BlendDesc {
    pub const OPAQUE: Self = Self {
        enabled: false,
        color: BlendComponentDesc::REPLACE,
        alpha: BlendComponentDesc::REPLACE,
        write_mask: 0b1111,
    };

    pub const ALPHA: Self = Self {
        enabled: true,
        color: BlendComponentDesc::OVER,
        alpha: BlendComponentDesc::OVER,
        write_mask: 0b1111,
    };

    /// Depth-only passes still bind a blend object; this one writes nothing.
    pub const NO_COLOR: Self = Self {
        enabled: false,
        color: BlendComponentDesc::REPLACE,
        alpha: BlendComponentDesc::REPLACE,
        write_mask: 0,
    };
}

impl Default for BlendDesc {
    fn default() -> Self {
        Self::OPAQUE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthDesc {
    pub test: bool,
    pub write: bool,
    pub compare: wgpu::CompareFunction,
    pub bias_constant: i32,
    /// Slope-scaled bias stored as raw `f32` bits so the descriptor stays `Eq`.
    pub bias_slope_bits: u32,
}

impl DepthDesc {
    pub const LESS_EQUAL: Self = Self {
        test: true,
        write: true,
        compare: wgpu::CompareFunction::LessEqual,
        bias_constant: 0,
        bias_slope_bits: 0,
    };

    /// Color pass after a depth prepass: test against the laid-down depth only.
    pub const TEST_ONLY: Self = Self {
        test: true,
        write: false,
        compare: wgpu::CompareFunction::LessEqual,
        bias_constant: 0,
        bias_slope_bits: 0,
    };

    pub fn with_bias(mut self, constant: i32, slope_scale: f32) -> Self {
        self.bias_constant = constant;
        self.bias_slope_bits = slope_scale.to_bits();
        self
    }

    pub fn slope_scale(&self) -> f32 {
        f32::from_bits(self.bias_slope_bits)
    }
}

impl Default for DepthDesc {
    fn default() -> Self {
        Self::LESS_EQUAL
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RasterDesc {
    pub cull: Option<wgpu::Face>,
    pub front_face: wgpu::FrontFace,
    pub polygon_mode: wgpu::PolygonMode,
    pub scissor: bool,
}

impl Default for RasterDesc {
    fn default() -> Self {
        Self {
            cull: Some(wgpu::Face::Back),
            front_face: wgpu::FrontFace::Ccw,
            polygon_mode: wgpu::PolygonMode::Fill,
            scissor: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerDesc {
    pub address: [wgpu::AddressMode; 3],
    pub mag_filter: wgpu::FilterMode,
    pub min_filter: wgpu::FilterMode,
    pub mip_filter: wgpu::FilterMode,
    pub compare: Option<wgpu::CompareFunction>,
    pub max_anisotropy: u16,
}

impl SamplerDesc {
    pub const LINEAR_REPEAT: Self = Self {
        address: [wgpu::AddressMode::Repeat; 3],
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mip_filter: wgpu::FilterMode::Linear,
        compare: None,
        max_anisotropy: 1,
    };

    /// Comparison sampler used to read shadow atlases.
    pub const SHADOW_COMPARE: Self = Self {
        address: [wgpu::AddressMode::ClampToEdge; 3],
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mip_filter: wgpu::FilterMode::Nearest,
        compare: Some(wgpu::CompareFunction::LessEqual),
        max_anisotropy: 1,
    };
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self::LINEAR_REPEAT
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttributeDesc {
    pub slot: u32,
    pub location: u32,
    pub format: wgpu::VertexFormat,
    pub offset: u32,
    pub per_instance: bool,
}

/// Vertex input layout. Fixed-size so the whole binding snapshot stays `Copy`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct VertexFormatDesc {
    pub attributes: [Option<VertexAttributeDesc>; MAX_VERTEX_ATTRIBUTES],
}

impl VertexFormatDesc {
    pub fn from_attributes(attributes: &[VertexAttributeDesc]) -> Self {
        debug_assert!(attributes.len() <= MAX_VERTEX_ATTRIBUTES);
        let mut desc = Self::default();
        for (dst, src) in desc.attributes.iter_mut().zip(attributes) {
            *dst = Some(*src);
        }
        desc
    }

    /// Position/normal/uv interleaved in slot 0.
    pub fn position_normal_uv() -> Self {
        Self::from_attributes(&[
            VertexAttributeDesc {
                slot: 0,
                location: 0,
                format: wgpu::VertexFormat::Float32x3,
                offset: 0,
                per_instance: false,
            },
            VertexAttributeDesc {
                slot: 0,
                location: 1,
                format: wgpu::VertexFormat::Float32x3,
                offset: 12,
                per_instance: false,
            },
            VertexAttributeDesc {
                slot: 0,
                location: 2,
                format: wgpu::VertexFormat::Float32x2,
                offset: 24,
                per_instance: false,
            },
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_descriptors_hash_equal() {
        let a = DepthDesc::LESS_EQUAL.with_bias(2, 2.0);
        let b = DepthDesc::LESS_EQUAL.with_bias(2, 2.0);
        assert_eq!(content_hash(&a), content_hash(&b));
        assert_ne!(content_hash(&a), content_hash(&DepthDesc::LESS_EQUAL));
        assert_eq!(a.slope_scale(), 2.0);
    }
}
