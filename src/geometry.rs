//! Procedural mesh generators.
//!
//! Small shapes for bootstrapping a scene before any asset pipeline exists. Every
//! generator returns a [`MeshGeometry`] with a single submesh covering all of its
//! indices, ready for [`crate::rendering::resources::Resources::add_mesh`].

use glam::{Vec3, Vec4};

use crate::{rendering::mesh::MeshGeometry, vertex::Vertex};

const WHITE: Vec4 = Vec4::new(1.0, 1.0, 1.0, 1.0);
const BLACK: Vec4 = Vec4::new(0.0, 0.0, 0.0, 1.0);
const RED: Vec4 = Vec4::new(1.0, 0.0, 0.0, 1.0);
const GREEN: Vec4 = Vec4::new(0.0, 0.5, 0.0, 1.0);
const BLUE: Vec4 = Vec4::new(0.0, 0.0, 1.0, 1.0);
const YELLOW: Vec4 = Vec4::new(1.0, 1.0, 0.0, 1.0);
const CYAN: Vec4 = Vec4::new(0.0, 1.0, 1.0, 1.0);
const MAGENTA: Vec4 = Vec4::new(1.0, 0.0, 1.0, 1.0);

/// A 2x2x2 box centered at the origin, one color per corner.
///
/// Indices wind clockwise when a face is viewed from outside.
pub fn unit_box() -> MeshGeometry {
    let vertices = vec![
        Vertex::colored(Vec3::new(-1.0, -1.0, -1.0), WHITE),
        Vertex::colored(Vec3::new(-1.0, 1.0, -1.0), BLACK),
        Vertex::colored(Vec3::new(1.0, 1.0, -1.0), RED),
        Vertex::colored(Vec3::new(1.0, -1.0, -1.0), GREEN),
        Vertex::colored(Vec3::new(-1.0, -1.0, 1.0), BLUE),
        Vertex::colored(Vec3::new(-1.0, 1.0, 1.0), YELLOW),
        Vertex::colored(Vec3::new(1.0, 1.0, 1.0), CYAN),
        Vertex::colored(Vec3::new(1.0, -1.0, 1.0), MAGENTA),
    ];

    #[rustfmt::skip]
    let indices = vec![
        // front
        0, 1, 2,  0, 2, 3,
        // back
        4, 6, 5,  4, 7, 6,
        // left
        4, 5, 1,  4, 1, 0,
        // right
        3, 2, 6,  3, 6, 7,
        // top
        1, 5, 6,  1, 6, 2,
        // bottom
        4, 0, 3,  4, 3, 7,
    ];

    MeshGeometry::new(vertices, indices)
}

/// A flat `width` x `length` field of unit quads at y = -1, centered on the
/// origin, colored as a checkerboard. Both dimensions must be at least 2.
pub fn grid(width: u32, length: u32) -> MeshGeometry {
    assert!(
        width >= 2 && length >= 2,
        "a grid needs at least 2 vertices per axis"
    );

    let mut vertices = Vec::with_capacity((width * length) as usize);
    for row in 0..width {
        for col in 0..length {
            let color = if (row + col) % 2 == 0 { BLACK } else { WHITE };
            vertices.push(Vertex::colored(
                Vec3::new(
                    row as f32 - width as f32 / 2.0,
                    -1.0,
                    col as f32 - length as f32 / 2.0,
                ),
                color,
            ));
        }
    }

    let mut indices = Vec::with_capacity(((width - 1) * (length - 1) * 6) as usize);
    for row in 0..width - 1 {
        for col in 0..length - 1 {
            let corner = row * length + col;
            let above = corner + length;
            let above_right = above + 1;
            let next = corner + 1;

            indices.extend_from_slice(&[corner, above_right, above]);
            indices.extend_from_slice(&[corner, next, above_right]);
        }
    }

    MeshGeometry::new(vertices, indices)
}

/// A single triangle through `a`, `b` and `c`, in that winding order.
pub fn triangle(a: Vec3, b: Vec3, c: Vec3) -> MeshGeometry {
    let vertices = vec![
        Vertex::colored(a, RED),
        Vertex::colored(b, GREEN),
        Vertex::colored(c, BLUE),
    ];
    MeshGeometry::new(vertices, vec![0, 1, 2])
}

/// A unit-radius disc in the xy plane, triangulated as a fan of `segments`
/// triangles around a center vertex.
pub fn unit_circle(segments: u32) -> MeshGeometry {
    assert!(segments >= 3, "a circle needs at least 3 segments");

    let mut vertices = Vec::with_capacity(segments as usize + 2);
    vertices.push(Vertex::colored(Vec3::ZERO, WHITE));
    for segment in 0..=segments {
        let angle = segment as f32 / segments as f32 * std::f32::consts::TAU;
        vertices.push(Vertex::colored(
            Vec3::new(angle.cos(), angle.sin(), 0.0),
            BLUE,
        ));
    }

    let mut indices = Vec::with_capacity(segments as usize * 3);
    for segment in 1..=segments {
        indices.extend_from_slice(&[0, segment, segment + 1]);
    }

    MeshGeometry::new(vertices, indices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn box_has_eight_corners_and_twelve_triangles() {
        let geometry = unit_box();
        assert_eq!(geometry.vertices.len(), 8);
        assert_eq!(geometry.indices.len(), 36);
        geometry.validate("box").unwrap();

        for vertex in &geometry.vertices {
            for component in vertex.position {
                assert_eq!(component.abs(), 1.0);
            }
        }
    }

    #[test]
    fn grid_tessellates_every_interior_quad() {
        let geometry = grid(20, 25);
        assert_eq!(geometry.vertices.len(), 20 * 25);
        assert_eq!(geometry.indices.len(), 19 * 24 * 6);
        geometry.validate("grid").unwrap();

        // Every vertex sits on the ground plane.
        assert!(geometry.vertices.iter().all(|v| v.position[1] == -1.0));
        // Every index refers to a real vertex.
        let count = geometry.vertices.len() as u32;
        assert!(geometry.indices.iter().all(|&i| i < count));
    }

    #[test]
    #[should_panic(expected = "at least 2 vertices per axis")]
    fn grid_rejects_degenerate_dimensions() {
        grid(0, 4);
    }

    #[test]
    fn triangle_keeps_its_winding() {
        let (a, b, c) = (Vec3::ZERO, Vec3::X, Vec3::Y);
        let geometry = triangle(a, b, c);
        assert_eq!(geometry.indices, vec![0, 1, 2]);
        assert_eq!(geometry.vertices[1].position, [1.0, 0.0, 0.0]);
        geometry.validate("triangle").unwrap();
    }

    #[test]
    fn circle_rim_sits_at_unit_radius() {
        let geometry = unit_circle(16);
        assert_eq!(geometry.vertices.len(), 18);
        assert_eq!(geometry.indices.len(), 16 * 3);
        geometry.validate("circle").unwrap();

        for vertex in &geometry.vertices[1..] {
            let radius = (vertex.position[0].powi(2) + vertex.position[1].powi(2)).sqrt();
            assert_relative_eq!(radius, 1.0, epsilon = 1e-6);
        }
        // The fan closes: the last rim vertex coincides with the first.
        assert_relative_eq!(
            geometry.vertices[1].position[0],
            geometry.vertices[17].position[0],
            epsilon = 1e-6
        );
    }
}
