#[cfg(feature = "vulkan")]
use ash::vk::Result as VulkanResult;
use thiserror::Error;

/// How bad an error is, and what the caller can do about it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    /// Device state is gone or unusable. Terminate the session; retrying is unsafe.
    Fatal,
    /// A programming defect in the caller. Fail fast; retrying is meaningless.
    Logic,
    /// A configured capacity was exhausted. No device state was lost; recoverable
    /// only by reconfiguring with larger limits.
    Capacity,
}

/// All the ways the resource layer can fail.
///
/// Every variant carries enough context (resource name, sizes) to diagnose the
/// failure without inspecting internals. Nothing in this layer retries.
#[derive(Error, Debug)]
pub enum QuendaError {
    /// There was a problem with a raw Vulkan operation
    #[cfg(feature = "vulkan")]
    #[error("there was a problem with a Vulkan operation")]
    Vulkan(#[from] VulkanResult),
    /// The device could not create a buffer or back it with memory
    #[error("failed to allocate GPU memory for '{resource}'")]
    AllocationFailure {
        /// Name of the resource being created
        resource: String,
    },
    /// The device was lost mid-session
    #[error("the GPU device was lost")]
    DeviceLost,
    /// A lookup named a resource that was never registered
    #[error("no resource named '{name}' is registered")]
    NotFound {
        /// The name that was looked up
        name: String,
    },
    /// A registration named a resource that already exists
    #[error("a resource named '{name}' is already registered")]
    DuplicateResource {
        /// The conflicting name
        name: String,
    },
    /// A constant write or submesh referenced an element outside its pool
    #[error("index {index} is out of range for '{name}' (capacity {capacity})")]
    IndexOutOfRange {
        /// The pool or mesh involved
        name: String,
        /// The offending index
        index: usize,
        /// The registered capacity
        capacity: usize,
    },
    /// A constant record's size did not match the stride its pool was registered with
    #[error("record size {actual} does not match the registered stride {expected} of '{name}'")]
    StrideMismatch {
        /// The pool involved
        name: String,
        /// The registered raw stride
        expected: usize,
        /// The size of the record that was passed
        actual: usize,
    },
    /// An upload was requested for zero bytes of data
    #[error("attempted to upload zero bytes for '{resource}'")]
    EmptyUpload {
        /// Name of the resource being uploaded
        resource: String,
    },
    /// The shader-visible descriptor table has no room left
    #[error("descriptor heap exhausted: requested {requested} slots but only {available} remain")]
    HeapExhausted {
        /// Slots the registration asked for
        requested: u32,
        /// Slots still unassigned
        available: u32,
    },
    /// A constant pool has no element left for another live object
    #[error("constant pool '{name}' is full (capacity {capacity})")]
    PoolExhausted {
        /// The pool involved
        name: String,
        /// The registered capacity
        capacity: usize,
    },
    /// Anything else
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl QuendaError {
    /// Classify this error per the taxonomy in the module docs.
    pub fn severity(&self) -> Severity {
        match self {
            #[cfg(feature = "vulkan")]
            QuendaError::Vulkan(_) => Severity::Fatal,
            QuendaError::AllocationFailure { .. } | QuendaError::DeviceLost => Severity::Fatal,
            QuendaError::NotFound { .. }
            | QuendaError::DuplicateResource { .. }
            | QuendaError::IndexOutOfRange { .. }
            | QuendaError::StrideMismatch { .. }
            | QuendaError::EmptyUpload { .. } => Severity::Logic,
            QuendaError::HeapExhausted { .. } | QuendaError::PoolExhausted { .. } => {
                Severity::Capacity
            }
            QuendaError::Other(_) => Severity::Fatal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_classification() {
        let fatal = QuendaError::AllocationFailure {
            resource: "cube".into(),
        };
        let logic = QuendaError::NotFound { name: "cube".into() };
        let capacity = QuendaError::HeapExhausted {
            requested: 4,
            available: 1,
        };
        assert_eq!(fatal.severity(), Severity::Fatal);
        assert_eq!(logic.severity(), Severity::Logic);
        assert_eq!(capacity.severity(), Severity::Capacity);
    }
}
