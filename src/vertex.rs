use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3, Vec4};

/// A single mesh vertex, laid out exactly as the vertex shader consumes it.
///
/// Stored as plain float arrays so the whole vertex array can be byte-copied into a
/// staging buffer with no padding surprises.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    /// Object-space position
    pub position: [f32; 3],
    /// RGBA color
    pub color: [f32; 4],
    /// Surface normal
    pub normal: [f32; 3],
    /// Tangent
    pub tangent: [f32; 3],
    /// Texture coordinates
    pub uv: [f32; 2],
}

impl Vertex {
    /// Create a vertex with just a position and color; normal, tangent and uv zeroed.
    pub fn colored(position: Vec3, color: Vec4) -> Self {
        Self {
            position: position.to_array(),
            color: color.to_array(),
            ..Default::default()
        }
    }

    /// Create a fully specified vertex.
    pub fn new(position: Vec3, color: Vec4, normal: Vec3, tangent: Vec3, uv: Vec2) -> Self {
        Self {
            position: position.to_array(),
            color: color.to_array(),
            normal: normal.to_array(),
            tangent: tangent.to_array(),
            uv: uv.to_array(),
        }
    }
}
