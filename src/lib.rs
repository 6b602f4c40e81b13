#![deny(missing_docs)]
// TODO Safety doc would be nice
#![allow(clippy::missing_safety_doc)]

//! Welcome to Quenda! 👋
//!
//! Quenda is a small renderer core for explicit graphics APIs - the kind where the
//! application, not the driver, is responsible for memory allocation, command
//! submission and CPU/GPU synchronization. It takes care of the parts that have real
//! invariants:
//!
//! - moving mesh geometry from host memory into device-local buffers via staged copies
//! - keeping persistently-mapped, 256-byte-aligned constant pools that can be updated
//!   in place every frame
//! - handing out descriptor-table slots and stable per-object constant indices
//! - pacing frame submission with monotonic completion tokens so the CPU never
//!   overwrites memory the GPU is still reading
//!
//! Everything else - windowing, input, shader compilation, presentation - is a thin,
//! swappable collaborator. The [`gpu::GpuDevice`] seam has two implementations: a
//! Vulkan backend (feature `vulkan`, on by default) and a host-memory device for
//! tests and headless use.

#[cfg(feature = "vulkan")]
pub use ash::vk;

pub use camera::{Camera, FirstPersonCamera};
pub use engine::Engine;
pub use quenda_error::{QuendaError, Severity};

pub mod camera;
pub mod engine;
pub mod events;
pub mod geometry;
pub mod gpu;
mod quenda_error;
pub mod rendering;
mod vertex;

pub use vertex::Vertex;

/// Quenda result type
pub type QuendaResult<T> = std::result::Result<T, QuendaError>;

/// Number of frames that may be in flight at once.
///
/// Each frame in flight gets its own command buffer, constant-pool generation and
/// descriptor table, so the CPU can record frame `n + 1` while the GPU executes
/// frame `n`.
pub const PIPELINE_DEPTH: usize = 2;

/// Alignment the hardware requires of a constant-buffer element, in bytes.
pub const CONSTANT_BUFFER_ALIGNMENT: u64 = 256;
