//! Per-object constant indices.

/// Hands out stable per-object constant indices.
///
/// Freed slots are reused before the high-water mark advances, most-recently-freed
/// first, which keeps descriptor churn to a minimum. The allocator does no liveness
/// tracking of its own: releasing a slot twice without an intervening acquire, or
/// using a slot after release, silently aliases two objects onto one constant
/// record. The registry is the only caller and releases each slot exactly once, on
/// mesh removal.
#[derive(Debug, Default)]
pub struct ObjectSlotAllocator {
    free: Vec<u32>,
    next: u32,
}

impl ObjectSlotAllocator {
    /// Return a slot no other live object holds.
    pub fn acquire(&mut self) -> u32 {
        match self.free.pop() {
            Some(slot) => slot,
            None => {
                let slot = self.next;
                self.next += 1;
                slot
            }
        }
    }

    /// Return `slot` to the free list for reuse by the next acquire.
    pub fn release(&mut self, slot: u32) {
        self.free.push(slot);
    }

    /// Slots handed out at least once.
    pub fn high_water_mark(&self) -> u32 {
        self.next
    }
}
