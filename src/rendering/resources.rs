//! The resource registry.
//!
//! Owns every named mesh and constant pool, the descriptor-slot frontier and the
//! per-object slot free list. All creation and destruction of GPU resources above
//! the device seam funnels through here, so the registry is the one place that
//! knows which staging buffers are still feeding in-flight copies.

use std::collections::HashMap;

use bytemuck::Pod;
use glam::Affine3A;

use crate::{
    gpu::{BufferUsage, CommandBufferId, GpuBuffer, GpuDevice},
    rendering::{
        constants::ConstantPool,
        descriptors::DescriptorSlotAllocator,
        mesh::{IndexFormat, Mesh, MeshGeometry},
        slots::ObjectSlotAllocator,
        transfer,
    },
    QuendaError, QuendaResult,
};

/// Named GPU resources and the allocators backing them.
#[derive(Debug)]
pub struct Resources {
    meshes: HashMap<String, Mesh>,
    constant_pools: HashMap<String, ConstantPool>,
    descriptor_slots: DescriptorSlotAllocator,
    object_slots: ObjectSlotAllocator,
    max_objects: usize,
    // Staging buffers feeding copies that have been recorded but whose submission
    // has not yet retired.
    staging: Vec<GpuBuffer>,
}

impl Resources {
    /// An empty registry over a device, drawing at most `max_objects` meshes.
    pub fn new(device: &dyn GpuDevice, max_objects: usize) -> Self {
        Self {
            meshes: HashMap::new(),
            constant_pools: HashMap::new(),
            descriptor_slots: DescriptorSlotAllocator::new(device.descriptor_capacity()),
            object_slots: ObjectSlotAllocator::default(),
            max_objects,
            staging: Vec::new(),
        }
    }

    /// Maximum number of live meshes.
    pub fn max_objects(&self) -> usize {
        self.max_objects
    }

    /// Schedule `geometry` for upload on `commands` and register it under `name`.
    /// Returns the object slot the mesh was assigned.
    ///
    /// The upload executes when `commands` is submitted; until that submission
    /// retires the geometry is not drawable and the staging memory is parked in the
    /// registry. Call [`Resources::release_staging`] once the token retires.
    pub fn add_mesh(
        &mut self,
        device: &dyn GpuDevice,
        commands: CommandBufferId,
        name: &str,
        geometry: &MeshGeometry,
    ) -> QuendaResult<u32> {
        if self.meshes.contains_key(name) {
            return Err(QuendaError::DuplicateResource {
                name: name.to_string(),
            });
        }
        geometry.validate(name)?;

        let object_slot = self.object_slots.acquire();
        if object_slot as usize >= self.max_objects {
            self.object_slots.release(object_slot);
            return Err(QuendaError::PoolExhausted {
                name: "objects".to_string(),
                capacity: self.max_objects,
            });
        }

        let vertices = match transfer::upload_slice(
            device,
            commands,
            BufferUsage::Vertex,
            &geometry.vertices,
            &format!("{name} vertices"),
        ) {
            Ok(upload) => upload,
            Err(err) => {
                self.object_slots.release(object_slot);
                return Err(err);
            }
        };
        let indices = match transfer::upload_slice(
            device,
            commands,
            BufferUsage::Index,
            &geometry.indices,
            &format!("{name} indices"),
        ) {
            Ok(upload) => upload,
            Err(err) => {
                // The vertex copy may already be recorded, so its buffers must
                // survive until the submission retires. Park both for
                // release_staging to reclaim.
                self.object_slots.release(object_slot);
                self.staging.push(vertices.staging);
                self.staging.push(vertices.buffer);
                return Err(err);
            }
        };
        self.staging.push(vertices.staging);
        self.staging.push(indices.staging);

        log::debug!(
            "mesh '{name}': {} vertices, {} indices, object slot {object_slot}",
            geometry.vertices.len(),
            geometry.indices.len()
        );
        self.meshes.insert(
            name.to_string(),
            Mesh {
                vertex_buffer: vertices.buffer,
                index_buffer: indices.buffer,
                index_format: IndexFormat::Uint32,
                submeshes: geometry.submeshes.clone(),
                object_slot,
                transform: Affine3A::IDENTITY,
            },
        );
        Ok(object_slot)
    }

    /// Unregister `name`, release its object slot for reuse and destroy its
    /// buffers.
    ///
    /// The caller must know that no in-flight submission still reads the mesh,
    /// which in practice means waiting for its last draw's token first.
    pub fn remove_mesh(&mut self, device: &dyn GpuDevice, name: &str) -> QuendaResult<()> {
        let mesh = self.meshes.remove(name).ok_or_else(|| QuendaError::NotFound {
            name: name.to_string(),
        })?;
        self.object_slots.release(mesh.object_slot);
        mesh.destroy(device);
        Ok(())
    }

    /// The mesh registered under `name`.
    pub fn mesh(&self, name: &str) -> QuendaResult<&Mesh> {
        self.meshes.get(name).ok_or_else(|| QuendaError::NotFound {
            name: name.to_string(),
        })
    }

    /// Mutable access to the mesh registered under `name`, for transform updates.
    pub fn mesh_mut(&mut self, name: &str) -> QuendaResult<&mut Mesh> {
        self.meshes.get_mut(name).ok_or_else(|| QuendaError::NotFound {
            name: name.to_string(),
        })
    }

    /// Every registered mesh, in no particular order.
    pub fn meshes(&self) -> impl Iterator<Item = (&str, &Mesh)> {
        self.meshes.iter().map(|(name, mesh)| (name.as_str(), mesh))
    }

    /// Create a persistently mapped pool of `capacity` records of `raw_stride`
    /// bytes, registered under `name`.
    pub fn create_constant_pool(
        &mut self,
        device: &dyn GpuDevice,
        name: &str,
        raw_stride: usize,
        capacity: usize,
    ) -> QuendaResult<()> {
        if self.constant_pools.contains_key(name) {
            return Err(QuendaError::DuplicateResource {
                name: name.to_string(),
            });
        }
        let pool = ConstantPool::new(device, &mut self.descriptor_slots, name, raw_stride, capacity)?;
        self.constant_pools.insert(name.to_string(), pool);
        Ok(())
    }

    /// Write `record` into element `index` of pool `name`, in the generation
    /// belonging to frame context `frame_index`.
    pub fn write_constants<T: Pod>(
        &mut self,
        frame_index: usize,
        name: &str,
        index: usize,
        record: &T,
    ) -> QuendaResult<()> {
        let pool = self
            .constant_pools
            .get_mut(name)
            .ok_or_else(|| QuendaError::NotFound {
                name: name.to_string(),
            })?;
        pool.write(frame_index, index, record)
    }

    /// The pool registered under `name`.
    pub fn constant_pool(&self, name: &str) -> QuendaResult<&ConstantPool> {
        self.constant_pools
            .get(name)
            .ok_or_else(|| QuendaError::NotFound {
                name: name.to_string(),
            })
    }

    /// Unregister pool `name` and destroy its backing buffers. Its descriptor
    /// slots are not reclaimed; the table is append-only.
    pub fn remove_constant_pool(&mut self, device: &dyn GpuDevice, name: &str) -> QuendaResult<()> {
        let pool = self
            .constant_pools
            .remove(name)
            .ok_or_else(|| QuendaError::NotFound {
                name: name.to_string(),
            })?;
        pool.destroy(device);
        Ok(())
    }

    /// Destroy the staging buffers parked by [`Resources::add_mesh`].
    ///
    /// Call only once the submission carrying their copies has retired.
    pub fn release_staging(&mut self, device: &dyn GpuDevice) {
        for buffer in self.staging.drain(..) {
            device.destroy_buffer(buffer);
        }
    }

    /// Destroy everything. The caller must have drained the pipeline first.
    pub fn destroy(mut self, device: &dyn GpuDevice) {
        self.release_staging(device);
        for (_, mesh) in self.meshes.drain() {
            mesh.destroy(device);
        }
        for (_, pool) in self.constant_pools.drain() {
            pool.destroy(device);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        gpu::dummy::{DummyDevice, Op},
        rendering::constants::{padded_stride, ObjectConstants},
        vertex::Vertex,
    };
    use glam::{Vec3, Vec4};

    fn triangle() -> MeshGeometry {
        let vertices = vec![
            Vertex::colored(Vec3::new(0., 1., 0.), Vec4::ONE),
            Vertex::colored(Vec3::new(-1., -1., 0.), Vec4::ONE),
            Vertex::colored(Vec3::new(1., -1., 0.), Vec4::ONE),
        ];
        MeshGeometry::new(vertices, vec![0, 1, 2])
    }

    // The lifecycle walk-through: a pool padded 84 -> 256, meshes A and B taking
    // slots 0 and 1, A removed, C reusing slot 0.
    #[test]
    fn lifecycle_end_to_end() {
        let device = DummyDevice::new(64);
        let commands = device.create_command_buffer().unwrap();
        device.begin_commands(commands).unwrap();

        let mut resources = Resources::new(&device, 16);
        resources
            .create_constant_pool(&device, "pass", 84, 1)
            .unwrap();
        assert_eq!(resources.constant_pool("pass").unwrap().padded_stride(), 256);
        assert_eq!(padded_stride(84), 256);

        let a = resources.add_mesh(&device, commands, "a", &triangle()).unwrap();
        let b = resources.add_mesh(&device, commands, "b", &triangle()).unwrap();
        assert_eq!((a, b), (0, 1));

        device.end_commands(commands).unwrap();
        device.submit(commands, 1).unwrap();
        device.wait_for_token(1).unwrap();
        resources.release_staging(&device);

        resources.remove_mesh(&device, "a").unwrap();
        let commands = device.create_command_buffer().unwrap();
        device.begin_commands(commands).unwrap();
        let c = resources.add_mesh(&device, commands, "c", &triangle()).unwrap();
        assert_eq!(c, 0);

        assert!(resources.mesh("a").is_err());
        assert!(resources.mesh("b").is_ok());
        assert_eq!(resources.mesh("c").unwrap().object_slot, 0);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let device = DummyDevice::new(64);
        let commands = device.create_command_buffer().unwrap();
        device.begin_commands(commands).unwrap();

        let mut resources = Resources::new(&device, 16);
        resources.add_mesh(&device, commands, "a", &triangle()).unwrap();
        assert!(matches!(
            resources.add_mesh(&device, commands, "a", &triangle()),
            Err(QuendaError::DuplicateResource { .. })
        ));

        resources.create_constant_pool(&device, "pass", 84, 1).unwrap();
        assert!(matches!(
            resources.create_constant_pool(&device, "pass", 84, 1),
            Err(QuendaError::DuplicateResource { .. })
        ));
    }

    #[test]
    fn object_pool_exhaustion_releases_the_slot() {
        let device = DummyDevice::new(64);
        let commands = device.create_command_buffer().unwrap();
        device.begin_commands(commands).unwrap();

        let mut resources = Resources::new(&device, 1);
        resources.add_mesh(&device, commands, "a", &triangle()).unwrap();
        assert!(matches!(
            resources.add_mesh(&device, commands, "b", &triangle()),
            Err(QuendaError::PoolExhausted { capacity: 1, .. })
        ));

        // The failed add must not leak its slot: removing "a" and re-adding
        // still yields slot 0.
        resources.remove_mesh(&device, "a").unwrap();
        assert_eq!(
            resources.add_mesh(&device, commands, "b", &triangle()).unwrap(),
            0
        );
    }

    #[test]
    fn constants_route_to_the_named_pool() {
        let device = DummyDevice::new(64);
        let mut resources = Resources::new(&device, 16);
        resources
            .create_constant_pool(&device, "objects", std::mem::size_of::<ObjectConstants>(), 4)
            .unwrap();

        resources
            .write_constants(0, "objects", 2, &ObjectConstants::default())
            .unwrap();
        assert!(matches!(
            resources.write_constants(0, "nonexistent", 0, &ObjectConstants::default()),
            Err(QuendaError::NotFound { .. })
        ));
        assert!(matches!(
            resources.write_constants(0, "objects", 4, &ObjectConstants::default()),
            Err(QuendaError::IndexOutOfRange { .. })
        ));
    }

    // Delegates to a DummyDevice but refuses to create index buffers, to drive
    // the partial-upload failure path.
    struct NoIndexBuffers(DummyDevice);

    impl GpuDevice for NoIndexBuffers {
        fn create_buffer(
            &self,
            usage: BufferUsage,
            size: u64,
            label: &str,
        ) -> crate::QuendaResult<crate::gpu::GpuBuffer> {
            if usage == BufferUsage::Index {
                return Err(QuendaError::AllocationFailure {
                    resource: label.to_string(),
                });
            }
            self.0.create_buffer(usage, size, label)
        }

        fn destroy_buffer(&self, buffer: crate::gpu::GpuBuffer) {
            self.0.destroy_buffer(buffer)
        }

        fn create_command_buffer(&self) -> crate::QuendaResult<CommandBufferId> {
            self.0.create_command_buffer()
        }

        fn begin_commands(&self, commands: CommandBufferId) -> crate::QuendaResult<()> {
            self.0.begin_commands(commands)
        }

        fn end_commands(&self, commands: CommandBufferId) -> crate::QuendaResult<()> {
            self.0.end_commands(commands)
        }

        fn record_copy(
            &self,
            commands: CommandBufferId,
            src: crate::gpu::BufferId,
            dst: crate::gpu::BufferId,
            size: u64,
        ) {
            self.0.record_copy(commands, src, dst, size)
        }

        fn record_transfer_barrier(&self, commands: CommandBufferId, buffer: crate::gpu::BufferId) {
            self.0.record_transfer_barrier(commands, buffer)
        }

        fn bind_constant_slot(
            &self,
            frame_index: usize,
            slot: u32,
            buffer: crate::gpu::BufferId,
            offset: u64,
            range: u64,
        ) {
            self.0.bind_constant_slot(frame_index, slot, buffer, offset, range)
        }

        fn descriptor_capacity(&self) -> u32 {
            self.0.descriptor_capacity()
        }

        fn submit(&self, commands: CommandBufferId, token: u64) -> crate::QuendaResult<()> {
            self.0.submit(commands, token)
        }

        fn completed_token(&self) -> crate::QuendaResult<u64> {
            self.0.completed_token()
        }

        fn wait_for_token(&self, token: u64) -> crate::QuendaResult<()> {
            self.0.wait_for_token(token)
        }
    }

    #[test]
    fn failed_index_upload_releases_the_slot_and_parks_vertex_buffers() {
        let device = NoIndexBuffers(DummyDevice::new(64));
        let commands = device.create_command_buffer().unwrap();
        device.begin_commands(commands).unwrap();

        let mut resources = Resources::new(&device, 16);
        assert!(matches!(
            resources.add_mesh(&device, commands, "a", &triangle()),
            Err(QuendaError::AllocationFailure { .. })
        ));

        // The failed add leaked nothing: its slot is reused, and the vertex
        // staging and device buffers it created are reclaimed with the staging.
        assert_eq!(
            resources.add_mesh(&device.0, commands, "a", &triangle()).unwrap(),
            0
        );
        resources.release_staging(&device.0);
        let destroyed = device
            .0
            .ops()
            .into_iter()
            .filter(|op| matches!(op, Op::DestroyBuffer(_)))
            .count();
        // Two parked by the failure, two staging from the successful add.
        assert_eq!(destroyed, 4);
    }

    #[test]
    fn release_staging_frees_exactly_the_parked_buffers() {
        let device = DummyDevice::new(64);
        let commands = device.create_command_buffer().unwrap();
        device.begin_commands(commands).unwrap();

        let mut resources = Resources::new(&device, 16);
        resources.add_mesh(&device, commands, "a", &triangle()).unwrap();
        device.end_commands(commands).unwrap();
        device.submit(commands, 1).unwrap();

        resources.release_staging(&device);
        let destroyed: Vec<_> = device
            .ops()
            .into_iter()
            .filter(|op| matches!(op, Op::DestroyBuffer(_)))
            .collect();
        // One vertex staging buffer, one index staging buffer.
        assert_eq!(destroyed.len(), 2);

        // The mesh's own buffers survive.
        assert!(resources.mesh("a").is_ok());
    }
}
