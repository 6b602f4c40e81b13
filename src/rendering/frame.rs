//! The frame pacer.
//!
//! Frames cycle through [`crate::PIPELINE_DEPTH`] contexts. Each submission is
//! tagged with a token from a strictly increasing counter; a context may not be
//! reused until the token of its previous submission has retired, which is the
//! whole synchronization story of the crate: once `begin_frame` returns, every
//! buffer and constant record belonging to that context is safe to overwrite.

use crate::{
    gpu::{CommandBufferId, GpuDevice},
    QuendaResult, PIPELINE_DEPTH,
};

/// One in-flight frame context.
#[derive(Debug)]
struct Frame {
    command_buffer: CommandBufferId,
    // Token of this context's last submission. Zero means never submitted.
    retire_token: u64,
}

/// Cycles frame contexts, enforcing that at most [`PIPELINE_DEPTH`] submissions are
/// in flight.
#[derive(Debug)]
pub struct FramePacer {
    frames: Vec<Frame>,
    frame_index: usize,
    next_token: u64,
}

impl FramePacer {
    /// A pacer with one primary command buffer per frame context.
    pub fn new(device: &dyn GpuDevice) -> QuendaResult<Self> {
        let mut frames = Vec::with_capacity(PIPELINE_DEPTH);
        for _ in 0..PIPELINE_DEPTH {
            frames.push(Frame {
                command_buffer: device.create_command_buffer()?,
                retire_token: 0,
            });
        }
        Ok(Self {
            frames,
            frame_index: 0,
            next_token: 1,
        })
    }

    /// Index of the context about to be recorded, in `0..PIPELINE_DEPTH`.
    pub fn frame_index(&self) -> usize {
        self.frame_index
    }

    /// Token of the most recent submission, or zero before the first one.
    pub fn last_submitted_token(&self) -> u64 {
        self.next_token - 1
    }

    /// Wait until the current context's previous submission has retired, then open
    /// its command buffer for recording.
    ///
    /// Only blocks when the GPU is a full [`PIPELINE_DEPTH`] frames behind.
    pub fn begin_frame(&mut self, device: &dyn GpuDevice) -> QuendaResult<CommandBufferId> {
        let frame = &self.frames[self.frame_index];
        if frame.retire_token != 0 {
            device.wait_for_token(frame.retire_token)?;
        }
        device.begin_commands(frame.command_buffer)?;
        Ok(frame.command_buffer)
    }

    /// Close the current context's command buffer, submit it tagged with a fresh
    /// token, and advance to the next context. Returns the token.
    pub fn end_frame(&mut self, device: &dyn GpuDevice) -> QuendaResult<u64> {
        let token = self.next_token;
        self.next_token += 1;

        let frame = &mut self.frames[self.frame_index];
        device.end_commands(frame.command_buffer)?;
        device.submit(frame.command_buffer, token)?;
        frame.retire_token = token;

        self.frame_index = (self.frame_index + 1) % PIPELINE_DEPTH;
        Ok(token)
    }

    /// Block until every submission so far has retired.
    pub fn wait_idle(&self, device: &dyn GpuDevice) -> QuendaResult<()> {
        let last = self.last_submitted_token();
        if last != 0 {
            device.wait_for_token(last)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::dummy::{DummyDevice, Op};

    #[test]
    fn tokens_are_strictly_increasing_from_one() {
        let device = DummyDevice::new(16);
        let mut pacer = FramePacer::new(&device).unwrap();
        assert_eq!(pacer.last_submitted_token(), 0);
        for expected in 1..=5 {
            pacer.begin_frame(&device).unwrap();
            assert_eq!(pacer.end_frame(&device).unwrap(), expected);
            assert_eq!(pacer.last_submitted_token(), expected);
        }
    }

    #[test]
    fn contexts_rotate_through_the_pipeline() {
        let device = DummyDevice::new(16);
        let mut pacer = FramePacer::new(&device).unwrap();
        let mut seen = Vec::new();
        for _ in 0..PIPELINE_DEPTH * 2 {
            seen.push(pacer.frame_index());
            pacer.begin_frame(&device).unwrap();
            pacer.end_frame(&device).unwrap();
        }
        assert_eq!(seen, vec![0, 1, 0, 1]);
    }

    // Frame K+PIPELINE_DEPTH must wait on frame K's token, and frames closer than
    // that must not wait at all.
    #[test]
    fn waits_exactly_pipeline_depth_frames_back() {
        let device = DummyDevice::with_manual_clock(16);
        let mut pacer = FramePacer::new(&device).unwrap();

        // The first PIPELINE_DEPTH frames never wait, even with nothing retired.
        for _ in 0..PIPELINE_DEPTH {
            pacer.begin_frame(&device).unwrap();
            pacer.end_frame(&device).unwrap();
        }
        assert!(device.ops().iter().all(|op| !matches!(op, Op::Wait(_))));

        // Frame PIPELINE_DEPTH reuses context 0 and must wait on token 1.
        device.retire(1);
        pacer.begin_frame(&device).unwrap();
        let ops = device.ops();
        let wait_at = ops
            .iter()
            .position(|op| matches!(op, Op::Wait(_)))
            .expect("reusing a context must wait on its previous token");
        assert_eq!(ops[wait_at], Op::Wait(1));
        // The wait happens before the context is reopened for recording.
        assert!(matches!(ops[wait_at + 1], Op::Begin(_)));
    }

    #[test]
    fn wait_idle_waits_on_the_last_token() {
        let device = DummyDevice::new(16);
        let mut pacer = FramePacer::new(&device).unwrap();

        // Nothing submitted: no wait is issued.
        pacer.wait_idle(&device).unwrap();
        assert!(device.ops().iter().all(|op| !matches!(op, Op::Wait(_))));

        for _ in 0..3 {
            pacer.begin_frame(&device).unwrap();
            pacer.end_frame(&device).unwrap();
        }
        pacer.wait_idle(&device).unwrap();
        assert_eq!(device.ops().last(), Some(&Op::Wait(3)));
    }
}
