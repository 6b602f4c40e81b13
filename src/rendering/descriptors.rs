//! Shader-visible descriptor slots.

use crate::{QuendaError, QuendaResult};

/// Assigns contiguous ranges of shader-visible descriptor slots, in registration
/// order.
///
/// The table is append-only for the lifetime of the descriptor heap: slots are
/// never reassigned or compacted, so an offset handed out once stays valid until
/// shutdown. Capacity must therefore be sized up front to the sum of every pool's
/// element count.
#[derive(Debug)]
pub struct DescriptorSlotAllocator {
    frontier: u32,
    capacity: u32,
}

impl DescriptorSlotAllocator {
    /// An allocator over a heap of `capacity` slots.
    pub fn new(capacity: u32) -> Self {
        Self {
            frontier: 0,
            capacity,
        }
    }

    /// Assign `count` consecutive slots and return the first one.
    pub fn register(&mut self, count: u32) -> QuendaResult<u32> {
        let available = self.capacity - self.frontier;
        if count > available {
            return Err(QuendaError::HeapExhausted {
                requested: count,
                available,
            });
        }
        let base = self.frontier;
        self.frontier += count;
        Ok(base)
    }

    /// Slots assigned so far.
    pub fn frontier(&self) -> u32 {
        self.frontier
    }

    /// Total slots in the heap.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranges_are_disjoint_and_in_call_order() {
        let mut slots = DescriptorSlotAllocator::new(64);
        let counts = [1u32, 4, 2, 16];
        let mut expected_base = 0;
        for count in counts {
            assert_eq!(slots.register(count).unwrap(), expected_base);
            expected_base += count;
        }
        assert_eq!(slots.frontier(), expected_base);
    }

    #[test]
    fn exhaustion_is_a_capacity_error() {
        let mut slots = DescriptorSlotAllocator::new(4);
        slots.register(3).unwrap();
        match slots.register(2) {
            Err(QuendaError::HeapExhausted {
                requested: 2,
                available: 1,
            }) => {}
            other => panic!("expected HeapExhausted, got {other:?}"),
        }
        // A failed registration must not move the frontier.
        assert_eq!(slots.register(1).unwrap(), 3);
    }
}
