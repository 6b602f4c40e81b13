//! The GPU resource lifecycle layer: staged uploads, persistent constant pools,
//! slot allocators, the resource registry and the frame pacer.

pub mod constants;
pub mod descriptors;
pub mod frame;
pub mod mesh;
pub mod resources;
pub mod slots;
pub mod transfer;
