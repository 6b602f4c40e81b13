//! Mesh geometry, on the CPU and on the GPU.

use std::collections::HashMap;

use glam::Affine3A;

use crate::{
    gpu::{GpuBuffer, GpuDevice},
    vertex::Vertex,
    QuendaError, QuendaResult,
};

/// Width of the indices in an index buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexFormat {
    /// 16-bit indices.
    Uint16,
    /// 32-bit indices.
    Uint32,
}

impl IndexFormat {
    /// Bytes per index.
    pub fn stride(self) -> u64 {
        match self {
            IndexFormat::Uint16 => 2,
            IndexFormat::Uint32 => 4,
        }
    }
}

/// A draw range within a mesh's buffers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Submesh {
    /// Number of indices to draw.
    pub index_count: u32,
    /// First index within the index buffer.
    pub start_index: u32,
    /// Value added to each index before vertex lookup.
    pub base_vertex: i32,
}

/// CPU-side geometry, ready to be handed to the registry for upload.
#[derive(Clone, Debug)]
pub struct MeshGeometry {
    /// Vertex data.
    pub vertices: Vec<Vertex>,
    /// 32-bit index data.
    pub indices: Vec<u32>,
    /// Named draw ranges. At least one.
    pub submeshes: HashMap<String, Submesh>,
}

/// Name of the submesh [`MeshGeometry::new`] creates over the whole index range.
pub const WHOLE_MESH: &str = "all";

impl MeshGeometry {
    /// Geometry drawn as a single range, [`WHOLE_MESH`], covering all of `indices`.
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        let mut submeshes = HashMap::new();
        submeshes.insert(
            WHOLE_MESH.to_string(),
            Submesh {
                index_count: indices.len() as u32,
                start_index: 0,
                base_vertex: 0,
            },
        );
        Self {
            vertices,
            indices,
            submeshes,
        }
    }

    /// Check that the geometry is uploadable: non-empty buffers and every submesh
    /// range inside them.
    pub fn validate(&self, name: &str) -> QuendaResult<()> {
        if self.vertices.is_empty() {
            return Err(QuendaError::EmptyUpload {
                resource: format!("{name} vertices"),
            });
        }
        if self.indices.is_empty() {
            return Err(QuendaError::EmptyUpload {
                resource: format!("{name} indices"),
            });
        }
        for (submesh_name, submesh) in &self.submeshes {
            let end = submesh.start_index as u64 + submesh.index_count as u64;
            if end > self.indices.len() as u64 {
                return Err(QuendaError::IndexOutOfRange {
                    name: format!("{name}/{submesh_name}"),
                    index: end as usize,
                    capacity: self.indices.len(),
                });
            }
        }
        Ok(())
    }
}

/// A mesh whose geometry lives on the GPU.
#[derive(Debug)]
pub struct Mesh {
    /// Device-local vertex buffer.
    pub vertex_buffer: GpuBuffer,
    /// Device-local index buffer.
    pub index_buffer: GpuBuffer,
    /// Width of the indices in `index_buffer`.
    pub index_format: IndexFormat,
    /// Named draw ranges.
    pub submeshes: HashMap<String, Submesh>,
    /// The per-object constant slot this mesh was assigned.
    pub object_slot: u32,
    /// World transform, flushed into the object constant pool each frame.
    pub transform: Affine3A,
}

impl Mesh {
    pub(crate) fn destroy(self, device: &dyn GpuDevice) {
        device.destroy_buffer(self.vertex_buffer);
        device.destroy_buffer(self.index_buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Vec3, Vec4};

    fn quad() -> MeshGeometry {
        let vertices = vec![
            Vertex::colored(Vec3::new(-1., -1., 0.), Vec4::ONE),
            Vertex::colored(Vec3::new(1., -1., 0.), Vec4::ONE),
            Vertex::colored(Vec3::new(1., 1., 0.), Vec4::ONE),
            Vertex::colored(Vec3::new(-1., 1., 0.), Vec4::ONE),
        ];
        MeshGeometry::new(vertices, vec![0, 1, 2, 0, 2, 3])
    }

    #[test]
    fn single_submesh_covers_all_indices() {
        let geometry = quad();
        assert_eq!(
            geometry.submeshes[WHOLE_MESH],
            Submesh {
                index_count: 6,
                start_index: 0,
                base_vertex: 0,
            }
        );
        geometry.validate("quad").unwrap();
    }

    #[test]
    fn empty_geometry_is_rejected() {
        let mut geometry = quad();
        geometry.indices.clear();
        assert!(matches!(
            geometry.validate("quad"),
            Err(QuendaError::EmptyUpload { .. })
        ));

        let geometry = MeshGeometry::new(Vec::new(), vec![0]);
        assert!(matches!(
            geometry.validate("empty"),
            Err(QuendaError::EmptyUpload { .. })
        ));
    }

    #[test]
    fn submesh_ranges_must_fit() {
        let mut geometry = quad();
        geometry.submeshes.insert(
            "tail".to_string(),
            Submesh {
                index_count: 3,
                start_index: 4,
                base_vertex: 0,
            },
        );
        assert!(matches!(
            geometry.validate("quad"),
            Err(QuendaError::IndexOutOfRange { .. })
        ));
    }
}
