//! The seam between the resource layer and a concrete graphics device.
//!
//! Everything above this module speaks in terms of [`GpuDevice`]: buffers, recorded
//! copies and barriers, descriptor-slot writes and completion tokens. Two devices
//! implement it:
//!
//! - [`vulkan::VulkanDevice`] - the real thing, via `ash` (feature `vulkan`)
//! - [`dummy::DummyDevice`] - host-memory buffers plus a manually advanced
//!   completion clock, for tests and headless runs

pub mod dummy;
#[cfg(feature = "vulkan")]
pub mod vulkan;

use std::ptr::NonNull;

use crate::QuendaResult;

/// Identifies a buffer created by a [`GpuDevice`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferId(pub u32);

/// Identifies a command buffer allocated from a [`GpuDevice`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CommandBufferId(pub u32);

/// What a buffer will be used for. Drives memory placement and usage flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    /// Device-local vertex data, filled by a scheduled copy.
    Vertex,
    /// Device-local index data, filled by a scheduled copy.
    Index,
    /// Host-visible relay used to feed copies into device-local memory.
    Staging,
    /// Host-visible, persistently mapped, shader-readable constants.
    Constant,
}

impl BufferUsage {
    /// Whether buffers of this usage live in host-visible memory and carry a
    /// persistent mapping.
    pub fn host_visible(self) -> bool {
        matches!(self, BufferUsage::Staging | BufferUsage::Constant)
    }
}

/// A buffer created by a [`GpuDevice`].
///
/// Host-visible buffers are mapped once at creation and stay mapped until the buffer
/// is destroyed.
#[derive(Debug)]
pub struct GpuBuffer {
    /// Backend handle.
    pub id: BufferId,
    /// Size in bytes.
    pub size: u64,
    /// The usage the buffer was created with.
    pub usage: BufferUsage,
    /// The persistent mapping, present for host-visible usages only.
    pub mapped: Option<NonNull<u8>>,
}

impl GpuBuffer {
    /// Copy `bytes` into the persistent mapping at `offset`.
    ///
    /// No GPU synchronization happens here; the caller must know the GPU has
    /// finished reading the bytes being overwritten.
    pub fn write(&self, offset: u64, bytes: &[u8]) {
        let mapped = self
            .mapped
            .expect("write to a buffer without a persistent mapping");
        assert!(offset + bytes.len() as u64 <= self.size);
        unsafe {
            std::ptr::copy_nonoverlapping(
                bytes.as_ptr(),
                mapped.as_ptr().add(offset as usize),
                bytes.len(),
            );
        }
    }

    /// View the persistent mapping as a byte slice.
    ///
    /// Safety: the caller must ensure nothing writes to the mapping for the lifetime
    /// of the returned slice.
    pub unsafe fn mapped_bytes(&self) -> &[u8] {
        let mapped = self.mapped.expect("buffer has no persistent mapping");
        std::slice::from_raw_parts(mapped.as_ptr(), self.size as usize)
    }
}

/// The operations the resource layer needs from a graphics device.
///
/// Command-recording methods (`record_*`) only *schedule* work; nothing has executed
/// until the enclosing command buffer is submitted and its token retires. Token
/// methods expose the monotonic completion counter that the frame pacer builds its
/// guarantees on: `completed_token` is non-decreasing, and a submission's effects are
/// visible once the counter reaches its token.
pub trait GpuDevice {
    /// Create a buffer. Host-visible usages come back persistently mapped.
    fn create_buffer(&self, usage: BufferUsage, size: u64, label: &str) -> QuendaResult<GpuBuffer>;

    /// Release a buffer and its memory. The caller must know that every submission
    /// referencing the buffer has retired.
    fn destroy_buffer(&self, buffer: GpuBuffer);

    /// Allocate a primary command buffer.
    fn create_command_buffer(&self) -> QuendaResult<CommandBufferId>;

    /// Begin recording into `commands`, resetting any previous recording.
    fn begin_commands(&self, commands: CommandBufferId) -> QuendaResult<()>;

    /// Finish recording into `commands`.
    fn end_commands(&self, commands: CommandBufferId) -> QuendaResult<()>;

    /// Record a copy of `size` bytes from `src` to `dst`.
    fn record_copy(&self, commands: CommandBufferId, src: BufferId, dst: BufferId, size: u64);

    /// Record the ownership transition of `buffer` from copy destination to generic
    /// read, so shader and vertex-input stages observe the copied bytes.
    fn record_transfer_barrier(&self, commands: CommandBufferId, buffer: BufferId);

    /// Bind `range` bytes of `buffer` starting at `offset` to `slot` of the
    /// descriptor table belonging to frame context `frame_index`.
    fn bind_constant_slot(
        &self,
        frame_index: usize,
        slot: u32,
        buffer: BufferId,
        offset: u64,
        range: u64,
    );

    /// Number of slots in each frame context's descriptor table.
    fn descriptor_capacity(&self) -> u32;

    /// Submit `commands` for execution and instruct the queue to signal `token`
    /// once it completes.
    fn submit(&self, commands: CommandBufferId, token: u64) -> QuendaResult<()>;

    /// The highest token the GPU has reported as complete.
    fn completed_token(&self) -> QuendaResult<u64>;

    /// Block until the GPU reports completion of `token`. Returns immediately if it
    /// already has.
    fn wait_for_token(&self, token: u64) -> QuendaResult<()>;
}
