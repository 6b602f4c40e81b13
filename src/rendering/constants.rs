//! Persistent constant pools.
//!
//! A pool is one host-visible, shader-readable buffer per frame in flight, mapped
//! once at creation and never unmapped until destruction. Elements are padded to the
//! hardware's 256-byte constant-buffer alignment; a write touches exactly the raw
//! stride's bytes of its element and nothing else. No GPU synchronization happens in
//! here - the frame pacer guarantees that the generation being written has already
//! retired.

use bytemuck::Pod;
use glam::Mat4;

use crate::{
    gpu::{BufferUsage, GpuBuffer, GpuDevice},
    rendering::descriptors::DescriptorSlotAllocator,
    QuendaError, QuendaResult, CONSTANT_BUFFER_ALIGNMENT, PIPELINE_DEPTH,
};

/// Round `raw_stride` up to the constant-buffer alignment.
pub fn padded_stride(raw_stride: u64) -> u64 {
    (raw_stride + CONSTANT_BUFFER_ALIGNMENT - 1) & !(CONSTANT_BUFFER_ALIGNMENT - 1)
}

/// Constants shared by everything drawn in a pass.
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PassConstants {
    /// View-projection matrix of the active camera.
    pub view_proj: Mat4,
    /// Seconds since the previous frame.
    pub delta_time: f64,
    /// Seconds since startup.
    pub total_time: f64,
}

impl Default for PassConstants {
    fn default() -> Self {
        Self {
            view_proj: Mat4::IDENTITY,
            delta_time: 0.0,
            total_time: 0.0,
        }
    }
}

/// Constants belonging to a single mesh, indexed by its object slot.
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ObjectConstants {
    /// World transform of the mesh.
    pub world: Mat4,
}

impl Default for ObjectConstants {
    fn default() -> Self {
        Self {
            world: Mat4::IDENTITY,
        }
    }
}

/// A named collection of fixed-size, alignment-padded constant records.
#[derive(Debug)]
pub struct ConstantPool {
    name: String,
    raw_stride: usize,
    padded_stride: usize,
    capacity: usize,
    base_slot: u32,
    // One persistently mapped generation per frame in flight.
    generations: Vec<GpuBuffer>,
}

impl ConstantPool {
    /// Allocate the pool's backing buffers, map them for their whole lifetime, and
    /// bind one descriptor slot per element into every frame's table.
    pub(crate) fn new(
        device: &dyn GpuDevice,
        slots: &mut DescriptorSlotAllocator,
        name: &str,
        raw_stride: usize,
        capacity: usize,
    ) -> QuendaResult<Self> {
        let padded = padded_stride(raw_stride as u64) as usize;
        let base_slot = slots.register(capacity as u32)?;

        let mut generations = Vec::with_capacity(PIPELINE_DEPTH);
        for frame_index in 0..PIPELINE_DEPTH {
            let buffer = device.create_buffer(
                BufferUsage::Constant,
                (padded * capacity) as u64,
                &format!("{name} constants [{frame_index}]"),
            )?;
            for element in 0..capacity {
                device.bind_constant_slot(
                    frame_index,
                    base_slot + element as u32,
                    buffer.id,
                    (element * padded) as u64,
                    padded as u64,
                );
            }
            generations.push(buffer);
        }
        log::debug!(
            "constant pool '{name}': stride {raw_stride} -> {padded}, {capacity} elements, \
             base slot {base_slot}"
        );

        Ok(Self {
            name: name.to_string(),
            raw_stride,
            padded_stride: padded,
            capacity,
            base_slot,
            generations,
        })
    }

    /// Byte-copy `record` into element `index` of frame `frame_index`'s generation.
    pub fn write<T: Pod>(&mut self, frame_index: usize, index: usize, record: &T) -> QuendaResult<()> {
        self.write_bytes(frame_index, index, bytemuck::bytes_of(record))
    }

    /// As [`ConstantPool::write`], for callers that already hold raw bytes.
    pub fn write_bytes(
        &mut self,
        frame_index: usize,
        index: usize,
        bytes: &[u8],
    ) -> QuendaResult<()> {
        if bytes.len() != self.raw_stride {
            return Err(QuendaError::StrideMismatch {
                name: self.name.clone(),
                expected: self.raw_stride,
                actual: bytes.len(),
            });
        }
        if index >= self.capacity {
            return Err(QuendaError::IndexOutOfRange {
                name: self.name.clone(),
                index,
                capacity: self.capacity,
            });
        }
        self.generations[frame_index].write((index * self.padded_stride) as u64, bytes);
        Ok(())
    }

    /// The pool's logical name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stride of a record as registered, before padding.
    pub fn raw_stride(&self) -> usize {
        self.raw_stride
    }

    /// Stride of an element in the backing buffer, after alignment padding.
    pub fn padded_stride(&self) -> usize {
        self.padded_stride
    }

    /// Number of elements per generation.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// First descriptor slot of this pool's contiguous range.
    pub fn base_slot(&self) -> u32 {
        self.base_slot
    }

    /// The backing buffer of frame `frame_index`'s generation.
    pub fn buffer(&self, frame_index: usize) -> &GpuBuffer {
        &self.generations[frame_index]
    }

    /// Release the backing buffers. Descriptor slots are append-only and are not
    /// reclaimed.
    pub(crate) fn destroy(self, device: &dyn GpuDevice) {
        for buffer in self.generations {
            device.destroy_buffer(buffer);
        }
    }
}
