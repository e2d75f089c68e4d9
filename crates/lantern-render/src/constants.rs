//! Per-frame constant buffer structs.
//!
//! These structs are copied verbatim into uniform buffers and accessed from
//! shaders. Layout must match the shader blocks exactly (std140 with every
//! member 16-byte sized or padded).

use glam::{Mat4, Vec4};

/// Camera constants bound once per frame.
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ViewConstants {
    /// World-to-view matrix.
    pub view: Mat4,
    /// View-to-clip matrix.
    pub projection: Mat4,
    /// Camera position, w unused.
    pub camera_position: Vec4,
}

impl ViewConstants {
    /// Size in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();
}

/// Sky dome shading constants.
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SkyConstants {
    /// Normalized direction toward the sun, w unused.
    pub sun_direction: Vec4,
    /// Sky color straight up.
    pub zenith_color: Vec4,
    /// Sky color at the horizon.
    pub horizon_color: Vec4,
    /// x = time in seconds, yzw unused.
    pub params: Vec4,
}

impl SkyConstants {
    /// Size in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();
}

/// Per-object constants.
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ObjectConstants {
    /// Object-to-world matrix.
    pub model: Mat4,
    /// Base color multiplier.
    pub tint: Vec4,
}

impl ObjectConstants {
    /// Size in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_constants_layout() {
        assert_eq!(ViewConstants::SIZE, 144);
        assert_eq!(std::mem::offset_of!(ViewConstants, view), 0);
        assert_eq!(std::mem::offset_of!(ViewConstants, projection), 64);
        assert_eq!(std::mem::offset_of!(ViewConstants, camera_position), 128);
    }

    #[test]
    fn sky_constants_layout() {
        assert_eq!(SkyConstants::SIZE, 64);
        assert_eq!(std::mem::offset_of!(SkyConstants, sun_direction), 0);
        assert_eq!(std::mem::offset_of!(SkyConstants, zenith_color), 16);
        assert_eq!(std::mem::offset_of!(SkyConstants, horizon_color), 32);
        assert_eq!(std::mem::offset_of!(SkyConstants, params), 48);
    }

    #[test]
    fn object_constants_layout() {
        assert_eq!(ObjectConstants::SIZE, 80);
        assert_eq!(std::mem::offset_of!(ObjectConstants, model), 0);
        assert_eq!(std::mem::offset_of!(ObjectConstants, tint), 64);
    }
}
