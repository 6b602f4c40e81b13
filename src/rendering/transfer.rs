//! Staged uploads into device-local memory.
//!
//! Device-local buffers cannot be written from the host, so an upload goes through a
//! host-visible staging buffer: write the bytes there, record a copy into the
//! destination, then record the barrier that hands the destination over to its
//! readers. Nothing executes until the command buffer is submitted, which means the
//! staging buffer must stay alive until that submission's token retires. [`Upload`]
//! keeps the two buffers paired so the caller cannot lose track of the staging half.

use bytemuck::Pod;

use crate::{
    gpu::{BufferUsage, CommandBufferId, GpuBuffer, GpuDevice},
    QuendaError, QuendaResult,
};

/// A device-local buffer together with the staging buffer still feeding it.
///
/// The staging half may only be destroyed once the submission carrying the copy has
/// retired; the registry parks it until then.
#[derive(Debug)]
pub struct Upload {
    /// The destination buffer. Its contents are defined once the upload's
    /// submission retires.
    pub buffer: GpuBuffer,
    /// The host-visible source. Must outlive the submission.
    pub staging: GpuBuffer,
}

/// Create a device-local buffer of `usage` and schedule `bytes` into it on
/// `commands`.
///
/// Records, in order: the copy from a freshly written staging buffer, then the
/// barrier making the destination visible to vertex-input and shader reads.
pub fn upload_bytes(
    device: &dyn GpuDevice,
    commands: CommandBufferId,
    usage: BufferUsage,
    bytes: &[u8],
    label: &str,
) -> QuendaResult<Upload> {
    if bytes.is_empty() {
        return Err(QuendaError::EmptyUpload {
            resource: label.to_string(),
        });
    }
    let size = bytes.len() as u64;
    log::trace!("uploading {size} bytes to '{label}'");

    let staging = device.create_buffer(
        BufferUsage::Staging,
        size,
        &format!("{label} staging"),
    )?;
    staging.write(0, bytes);

    let buffer = device.create_buffer(usage, size, label)?;
    device.record_copy(commands, staging.id, buffer.id, size);
    device.record_transfer_barrier(commands, buffer.id);

    Ok(Upload { buffer, staging })
}

/// As [`upload_bytes`], for a slice of plain-old-data values.
pub fn upload_slice<T: Pod>(
    device: &dyn GpuDevice,
    commands: CommandBufferId,
    usage: BufferUsage,
    data: &[T],
    label: &str,
) -> QuendaResult<Upload> {
    upload_bytes(device, commands, usage, bytemuck::cast_slice(data), label)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::dummy::{DummyDevice, Op};

    #[test]
    fn upload_schedules_copy_then_barrier() {
        let device = DummyDevice::new(16);
        let commands = device.create_command_buffer().unwrap();
        device.begin_commands(commands).unwrap();

        let upload = upload_slice(
            &device,
            commands,
            BufferUsage::Index,
            &[7u32, 8, 9],
            "indices",
        )
        .unwrap();
        assert_eq!(upload.buffer.size, 12);
        assert_eq!(upload.buffer.usage, BufferUsage::Index);
        assert_eq!(upload.staging.usage, BufferUsage::Staging);

        // Staging holds the bytes already; the destination does not.
        assert_eq!(
            device.buffer_contents(upload.staging.id),
            bytemuck::cast_slice::<u32, u8>(&[7, 8, 9]).to_vec()
        );
        assert_eq!(device.buffer_contents(upload.buffer.id), vec![0u8; 12]);

        let ops = device.ops();
        let copy_at = ops
            .iter()
            .position(|op| matches!(op, Op::Copy { .. }))
            .unwrap();
        assert_eq!(
            ops[copy_at],
            Op::Copy {
                commands,
                src: upload.staging.id,
                dst: upload.buffer.id,
                size: 12,
            }
        );
        assert_eq!(
            ops[copy_at + 1],
            Op::Barrier {
                commands,
                buffer: upload.buffer.id,
            }
        );

        // Submission executes the copy.
        device.end_commands(commands).unwrap();
        device.submit(commands, 1).unwrap();
        assert_eq!(
            device.buffer_contents(upload.buffer.id),
            bytemuck::cast_slice::<u32, u8>(&[7, 8, 9]).to_vec()
        );
    }

    #[test]
    fn empty_upload_is_a_logic_error() {
        let device = DummyDevice::new(16);
        let commands = device.create_command_buffer().unwrap();
        device.begin_commands(commands).unwrap();

        let result = upload_bytes(&device, commands, BufferUsage::Vertex, &[], "nothing");
        assert!(matches!(result, Err(QuendaError::EmptyUpload { .. })));
        // Nothing was created or recorded.
        assert_eq!(device.ops(), vec![Op::Begin(commands)]);
    }
}
