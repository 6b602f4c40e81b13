//! A GPU device backed by host memory.
//!
//! `DummyDevice` performs no real GPU work but implements the full [`GpuDevice`]
//! contract: buffers are plain byte arrays, recorded copies execute when their
//! command buffer is submitted, and the completion counter is a clock that either
//! retires submissions instantly (the default) or is advanced by hand. Every call is
//! appended to an op log so tests can assert ordering - in particular that a wait on
//! a token happens before the memory it guards is reused.

use std::{
    collections::HashMap,
    ptr::NonNull,
    sync::{Condvar, Mutex},
};

use super::{BufferId, BufferUsage, CommandBufferId, GpuBuffer, GpuDevice};
use crate::{QuendaError, QuendaResult};

/// A recorded device call, for assertions in tests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Op {
    /// `create_buffer`
    CreateBuffer {
        /// The handle that was assigned
        id: BufferId,
        /// Requested usage
        usage: BufferUsage,
        /// Requested size in bytes
        size: u64,
    },
    /// `destroy_buffer`
    DestroyBuffer(BufferId),
    /// `begin_commands`
    Begin(CommandBufferId),
    /// `end_commands`
    End(CommandBufferId),
    /// `record_copy`
    Copy {
        /// Command buffer recorded into
        commands: CommandBufferId,
        /// Source buffer
        src: BufferId,
        /// Destination buffer
        dst: BufferId,
        /// Bytes copied
        size: u64,
    },
    /// `record_transfer_barrier`
    Barrier {
        /// Command buffer recorded into
        commands: CommandBufferId,
        /// Buffer transitioned to generic read
        buffer: BufferId,
    },
    /// `bind_constant_slot`
    BindSlot {
        /// Frame context whose table was written
        frame_index: usize,
        /// Slot written
        slot: u32,
        /// Bound buffer
        buffer: BufferId,
        /// Byte offset of the bound element
        offset: u64,
        /// Byte range of the bound element
        range: u64,
    },
    /// `submit`
    Submit {
        /// Submitted command buffer
        commands: CommandBufferId,
        /// Token the queue will signal
        token: u64,
    },
    /// `wait_for_token`
    Wait(u64),
}

struct DummyBuffer {
    storage: Box<[u8]>,
}

#[derive(Default)]
struct State {
    buffers: HashMap<u32, DummyBuffer>,
    // Ops recorded into each command buffer since its last begin, replayed at submit.
    recordings: HashMap<u32, Vec<Op>>,
    ops: Vec<Op>,
    next_buffer: u32,
    next_commands: u32,
}

/// Host-memory implementation of [`GpuDevice`].
pub struct DummyDevice {
    state: Mutex<State>,
    clock: Mutex<u64>,
    retired: Condvar,
    auto_retire: bool,
    descriptor_capacity: u32,
}

impl DummyDevice {
    /// A device whose submissions retire the moment they are submitted.
    pub fn new(descriptor_capacity: u32) -> Self {
        Self {
            state: Mutex::default(),
            clock: Mutex::new(0),
            retired: Condvar::new(),
            auto_retire: true,
            descriptor_capacity,
        }
    }

    /// A device whose completion clock only moves via [`DummyDevice::retire`].
    /// `wait_for_token` genuinely blocks until another thread advances the clock.
    pub fn with_manual_clock(descriptor_capacity: u32) -> Self {
        Self {
            auto_retire: false,
            ..Self::new(descriptor_capacity)
        }
    }

    /// Advance the completion clock to `token` (never backwards) and wake waiters.
    pub fn retire(&self, token: u64) {
        let mut clock = self.clock.lock().unwrap();
        if token > *clock {
            *clock = token;
        }
        self.retired.notify_all();
    }

    /// Snapshot of the op log.
    pub fn ops(&self) -> Vec<Op> {
        self.state.lock().unwrap().ops.clone()
    }

    /// Bytes currently held by `buffer`, including the results of any executed copies.
    pub fn buffer_contents(&self, buffer: BufferId) -> Vec<u8> {
        let state = self.state.lock().unwrap();
        state.buffers[&buffer.0].storage.to_vec()
    }

    fn log(&self, op: Op) {
        self.state.lock().unwrap().ops.push(op);
    }
}

impl GpuDevice for DummyDevice {
    fn create_buffer(&self, usage: BufferUsage, size: u64, label: &str) -> QuendaResult<GpuBuffer> {
        log::trace!("DummyDevice: creating {usage:?} buffer '{label}' ({size} bytes)");
        let mut state = self.state.lock().unwrap();
        let id = state.next_buffer;
        state.next_buffer += 1;

        let mut storage = vec![0u8; size as usize].into_boxed_slice();
        // The mapping must come from a mutable pointer: writes go through it while
        // the box sits in the map.
        let mapped = usage
            .host_visible()
            .then(|| NonNull::new(storage.as_mut_ptr()).unwrap());
        state.buffers.insert(id, DummyBuffer { storage });
        state.ops.push(Op::CreateBuffer {
            id: BufferId(id),
            usage,
            size,
        });

        Ok(GpuBuffer {
            id: BufferId(id),
            size,
            usage,
            mapped,
        })
    }

    fn destroy_buffer(&self, buffer: GpuBuffer) {
        let mut state = self.state.lock().unwrap();
        state.buffers.remove(&buffer.id.0);
        state.ops.push(Op::DestroyBuffer(buffer.id));
    }

    fn create_command_buffer(&self) -> QuendaResult<CommandBufferId> {
        let mut state = self.state.lock().unwrap();
        let id = state.next_commands;
        state.next_commands += 1;
        state.recordings.insert(id, Vec::new());
        Ok(CommandBufferId(id))
    }

    fn begin_commands(&self, commands: CommandBufferId) -> QuendaResult<()> {
        let mut state = self.state.lock().unwrap();
        state.recordings.insert(commands.0, Vec::new());
        state.ops.push(Op::Begin(commands));
        Ok(())
    }

    fn end_commands(&self, commands: CommandBufferId) -> QuendaResult<()> {
        self.log(Op::End(commands));
        Ok(())
    }

    fn record_copy(&self, commands: CommandBufferId, src: BufferId, dst: BufferId, size: u64) {
        let op = Op::Copy {
            commands,
            src,
            dst,
            size,
        };
        let mut state = self.state.lock().unwrap();
        state
            .recordings
            .get_mut(&commands.0)
            .expect("copy recorded outside begin/end")
            .push(op.clone());
        state.ops.push(op);
    }

    fn record_transfer_barrier(&self, commands: CommandBufferId, buffer: BufferId) {
        self.log(Op::Barrier { commands, buffer });
    }

    fn bind_constant_slot(
        &self,
        frame_index: usize,
        slot: u32,
        buffer: BufferId,
        offset: u64,
        range: u64,
    ) {
        self.log(Op::BindSlot {
            frame_index,
            slot,
            buffer,
            offset,
            range,
        });
    }

    fn descriptor_capacity(&self) -> u32 {
        self.descriptor_capacity
    }

    fn submit(&self, commands: CommandBufferId, token: u64) -> QuendaResult<()> {
        let mut state = self.state.lock().unwrap();
        // Execute the recorded copies so device-local contents are observable.
        let recording = state
            .recordings
            .insert(commands.0, Vec::new())
            .ok_or_else(|| QuendaError::Other(anyhow::anyhow!("submit of unknown command buffer")))?;
        for op in recording {
            if let Op::Copy { src, dst, size, .. } = op {
                let bytes = state.buffers[&src.0].storage[..size as usize].to_vec();
                let dst = state
                    .buffers
                    .get_mut(&dst.0)
                    .expect("copy destination destroyed before submit");
                dst.storage[..size as usize].copy_from_slice(&bytes);
            }
        }
        state.ops.push(Op::Submit { commands, token });
        drop(state);

        if self.auto_retire {
            self.retire(token);
        }
        Ok(())
    }

    fn completed_token(&self) -> QuendaResult<u64> {
        Ok(*self.clock.lock().unwrap())
    }

    fn wait_for_token(&self, token: u64) -> QuendaResult<()> {
        self.log(Op::Wait(token));
        let mut clock = self.clock.lock().unwrap();
        while *clock < token {
            clock = self.retired.wait(clock).unwrap();
        }
        Ok(())
    }
}
