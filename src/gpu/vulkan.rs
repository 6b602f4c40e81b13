//! The real device: Vulkan via `ash`.
//!
//! Headless by design - no surface or swapchain is created here, so the device can
//! be brought up on a build machine with nothing but a Vulkan driver. Completion
//! tokens are backed by a single timeline semaphore, whose monotonically increasing
//! 64-bit counter is exactly the completion model the frame pacer is specified
//! against. Descriptor slots are array elements of one variable-count uniform-buffer
//! binding, one descriptor set per frame in flight.

use std::{
    collections::HashMap,
    ffi::CString,
    ptr::NonNull,
    sync::Mutex,
};

use anyhow::Result;
use ash::{vk, Device, Entry, Instance};

use super::{BufferId, BufferUsage, CommandBufferId, GpuBuffer, GpuDevice};
use crate::{QuendaError, QuendaResult, PIPELINE_DEPTH};

struct VulkanBuffer {
    buffer: vk::Buffer,
    device_memory: vk::DeviceMemory,
    host_visible: bool,
}

#[derive(Default)]
struct Handles {
    buffers: HashMap<u32, VulkanBuffer>,
    command_buffers: HashMap<u32, vk::CommandBuffer>,
    next_buffer: u32,
    next_commands: u32,
}

/// A headless Vulkan 1.2 device implementing [`GpuDevice`].
pub struct VulkanDevice {
    #[allow(unused)]
    entry: Entry,
    /// The Vulkan instance.
    pub instance: Instance,
    /// The physical device in use.
    pub physical_device: vk::PhysicalDevice,
    /// The logical device.
    pub device: Device,
    /// The single queue all work is submitted to.
    pub graphics_queue: vk::Queue,
    /// Family index of `graphics_queue`.
    pub queue_family_index: u32,
    /// Pool all command buffers are allocated from.
    pub command_pool: vk::CommandPool,
    /// One descriptor set per frame in flight, each a single variable-count
    /// uniform-buffer array binding.
    pub descriptor_sets: [vk::DescriptorSet; PIPELINE_DEPTH],
    descriptor_pool: vk::DescriptorPool,
    descriptor_layout: vk::DescriptorSetLayout,
    timeline: vk::Semaphore,
    descriptor_capacity: u32,
    handles: Mutex<Handles>,
}

impl VulkanDevice {
    /// Bring up an instance, the first physical device, a graphics queue, a command
    /// pool and a `descriptor_capacity`-slot descriptor table per frame in flight.
    pub fn new(descriptor_capacity: u32) -> Result<Self> {
        log::info!("Initialising Vulkan..");
        let app_name = CString::new("Quenda")?;
        let entry = unsafe { Entry::new() }?;

        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .api_version(vk::make_version(1, 2, 0));
        let create_info = vk::InstanceCreateInfo::builder().application_info(&app_info);
        let instance = unsafe { entry.create_instance(&create_info, None) }?;

        let physical_device = unsafe {
            *instance
                .enumerate_physical_devices()?
                .first()
                .ok_or_else(|| anyhow::anyhow!("no Vulkan physical device available"))?
        };

        let (device, graphics_queue, queue_family_index) =
            create_device(&instance, physical_device)?;

        let command_pool = unsafe {
            device.create_command_pool(
                &vk::CommandPoolCreateInfo::builder()
                    .queue_family_index(queue_family_index)
                    .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER),
                None,
            )
        }?;

        let (descriptor_pool, descriptor_layout, descriptor_sets) =
            create_descriptor_table(&device, descriptor_capacity)?;

        let timeline = create_timeline_semaphore(&device)?;
        log::info!("..done");

        Ok(Self {
            entry,
            instance,
            physical_device,
            device,
            graphics_queue,
            queue_family_index,
            command_pool,
            descriptor_pool,
            descriptor_layout,
            descriptor_sets,
            timeline,
            descriptor_capacity,
            handles: Mutex::default(),
        })
    }

    /// The layout of the per-frame descriptor set, for pipeline creation by an
    /// external command recorder.
    pub fn descriptor_layout(&self) -> vk::DescriptorSetLayout {
        self.descriptor_layout
    }

    /// The raw `vk::Buffer` behind a handle, for an external command recorder.
    pub fn raw_buffer(&self, id: BufferId) -> Option<vk::Buffer> {
        self.handles.lock().unwrap().buffers.get(&id.0).map(|b| b.buffer)
    }

    fn raw_commands(&self, id: CommandBufferId) -> vk::CommandBuffer {
        self.handles.lock().unwrap().command_buffers[&id.0]
    }

    unsafe fn allocate_buffer_memory(
        &self,
        buffer: vk::Buffer,
        memory_property_flags: vk::MemoryPropertyFlags,
        label: &str,
    ) -> QuendaResult<vk::DeviceMemory> {
        let memory_requirements = self.device.get_buffer_memory_requirements(buffer);
        let memory_properties = self
            .instance
            .get_physical_device_memory_properties(self.physical_device);

        let memory_type_index = find_memory_type_index(
            memory_properties,
            memory_requirements.memory_type_bits,
            memory_property_flags,
        )
        .ok_or_else(|| QuendaError::AllocationFailure {
            resource: label.to_string(),
        })?;
        log::trace!("'{label}' uses memory type {memory_type_index}");

        self.device
            .allocate_memory(
                &vk::MemoryAllocateInfo::builder()
                    .allocation_size(memory_requirements.size)
                    .memory_type_index(memory_type_index as _),
                None,
            )
            .map_err(|_| QuendaError::AllocationFailure {
                resource: label.to_string(),
            })
    }
}

impl GpuDevice for VulkanDevice {
    fn create_buffer(&self, usage: BufferUsage, size: u64, label: &str) -> QuendaResult<GpuBuffer> {
        let device = &self.device;
        let usage_flags = match usage {
            BufferUsage::Vertex => {
                vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::Index => {
                vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::Staging => vk::BufferUsageFlags::TRANSFER_SRC,
            BufferUsage::Constant => vk::BufferUsageFlags::UNIFORM_BUFFER,
        };

        let buffer = unsafe {
            device.create_buffer(
                &vk::BufferCreateInfo::builder()
                    .size(size)
                    .sharing_mode(vk::SharingMode::EXCLUSIVE)
                    .usage(usage_flags),
                None,
            )
        }
        .map_err(|_| QuendaError::AllocationFailure {
            resource: label.to_string(),
        })?;

        let memory_property_flags = if usage.host_visible() {
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
        } else {
            vk::MemoryPropertyFlags::DEVICE_LOCAL
        };
        let device_memory =
            unsafe { self.allocate_buffer_memory(buffer, memory_property_flags, label) }?;
        unsafe { device.bind_buffer_memory(buffer, device_memory, 0) }?;

        // Host-visible buffers stay mapped until destruction.
        let mapped = if usage.host_visible() {
            let address = unsafe {
                device.map_memory(device_memory, 0, size, vk::MemoryMapFlags::empty())
            }?;
            Some(unsafe { NonNull::new_unchecked(address as *mut u8) })
        } else {
            None
        };

        let mut handles = self.handles.lock().unwrap();
        let id = handles.next_buffer;
        handles.next_buffer += 1;
        handles.buffers.insert(
            id,
            VulkanBuffer {
                buffer,
                device_memory,
                host_visible: usage.host_visible(),
            },
        );

        Ok(GpuBuffer {
            id: BufferId(id),
            size,
            usage,
            mapped,
        })
    }

    fn destroy_buffer(&self, buffer: GpuBuffer) {
        let mut handles = self.handles.lock().unwrap();
        if let Some(vulkan_buffer) = handles.buffers.remove(&buffer.id.0) {
            unsafe {
                if vulkan_buffer.host_visible {
                    self.device.unmap_memory(vulkan_buffer.device_memory);
                }
                self.device.free_memory(vulkan_buffer.device_memory, None);
                self.device.destroy_buffer(vulkan_buffer.buffer, None);
            }
        }
    }

    fn create_command_buffer(&self) -> QuendaResult<CommandBufferId> {
        let command_buffers = unsafe {
            self.device.allocate_command_buffers(
                &vk::CommandBufferAllocateInfo::builder()
                    .command_buffer_count(1)
                    .level(vk::CommandBufferLevel::PRIMARY)
                    .command_pool(self.command_pool),
            )
        }?;

        let mut handles = self.handles.lock().unwrap();
        let id = handles.next_commands;
        handles.next_commands += 1;
        handles.command_buffers.insert(id, command_buffers[0]);
        Ok(CommandBufferId(id))
    }

    fn begin_commands(&self, commands: CommandBufferId) -> QuendaResult<()> {
        let command_buffer = self.raw_commands(commands);
        unsafe {
            self.device
                .begin_command_buffer(command_buffer, &vk::CommandBufferBeginInfo::builder())
        }?;
        Ok(())
    }

    fn end_commands(&self, commands: CommandBufferId) -> QuendaResult<()> {
        unsafe { self.device.end_command_buffer(self.raw_commands(commands)) }?;
        Ok(())
    }

    fn record_copy(&self, commands: CommandBufferId, src: BufferId, dst: BufferId, size: u64) {
        let handles = self.handles.lock().unwrap();
        let src = handles.buffers[&src.0].buffer;
        let dst = handles.buffers[&dst.0].buffer;
        let command_buffer = handles.command_buffers[&commands.0];
        let region = vk::BufferCopy::builder().size(size).build();
        unsafe {
            self.device
                .cmd_copy_buffer(command_buffer, src, dst, &[region]);
        }
    }

    fn record_transfer_barrier(&self, commands: CommandBufferId, buffer: BufferId) {
        let handles = self.handles.lock().unwrap();
        let buffer = handles.buffers[&buffer.0].buffer;
        let command_buffer = handles.command_buffers[&commands.0];

        let barrier = vk::BufferMemoryBarrier::builder()
            .buffer(buffer)
            .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
            .dst_access_mask(
                vk::AccessFlags::VERTEX_ATTRIBUTE_READ
                    | vk::AccessFlags::INDEX_READ
                    | vk::AccessFlags::UNIFORM_READ,
            )
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .size(vk::WHOLE_SIZE)
            .build();

        unsafe {
            self.device.cmd_pipeline_barrier(
                command_buffer,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::VERTEX_INPUT | vk::PipelineStageFlags::VERTEX_SHADER,
                vk::DependencyFlags::empty(),
                &[],
                &[barrier],
                &[],
            );
        }
    }

    fn bind_constant_slot(
        &self,
        frame_index: usize,
        slot: u32,
        buffer: BufferId,
        offset: u64,
        range: u64,
    ) {
        let handles = self.handles.lock().unwrap();
        let buffer = handles.buffers[&buffer.0].buffer;

        let buffer_info = vk::DescriptorBufferInfo::builder()
            .buffer(buffer)
            .offset(offset)
            .range(range);
        let write = vk::WriteDescriptorSet::builder()
            .buffer_info(std::slice::from_ref(&buffer_info))
            .dst_set(self.descriptor_sets[frame_index])
            .dst_binding(CONSTANTS_BINDING)
            .dst_array_element(slot)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER);

        unsafe {
            self.device
                .update_descriptor_sets(std::slice::from_ref(&write), &[]);
        }
    }

    fn descriptor_capacity(&self) -> u32 {
        self.descriptor_capacity
    }

    fn submit(&self, commands: CommandBufferId, token: u64) -> QuendaResult<()> {
        let command_buffers = [self.raw_commands(commands)];
        let signal_semaphores = [self.timeline];
        let signal_values = [token];

        let mut timeline_info =
            vk::TimelineSemaphoreSubmitInfo::builder().signal_semaphore_values(&signal_values);
        let submit_info = vk::SubmitInfo::builder()
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .push_next(&mut timeline_info)
            .build();

        unsafe {
            self.device
                .queue_submit(self.graphics_queue, &[submit_info], vk::Fence::null())
        }
        .map_err(device_error)
    }

    fn completed_token(&self) -> QuendaResult<u64> {
        unsafe { self.device.get_semaphore_counter_value(self.timeline) }.map_err(device_error)
    }

    fn wait_for_token(&self, token: u64) -> QuendaResult<()> {
        let semaphores = [self.timeline];
        let values = [token];
        let wait_info = vk::SemaphoreWaitInfo::builder()
            .semaphores(&semaphores)
            .values(&values);
        unsafe { self.device.wait_semaphores(&wait_info, u64::MAX) }.map_err(device_error)
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            let handles = self.handles.get_mut().unwrap();
            for (_, vulkan_buffer) in handles.buffers.drain() {
                if vulkan_buffer.host_visible {
                    self.device.unmap_memory(vulkan_buffer.device_memory);
                }
                self.device.free_memory(vulkan_buffer.device_memory, None);
                self.device.destroy_buffer(vulkan_buffer.buffer, None);
            }
            self.device.destroy_semaphore(self.timeline, None);
            self.device
                .destroy_descriptor_pool(self.descriptor_pool, None);
            self.device
                .destroy_descriptor_set_layout(self.descriptor_layout, None);
            self.device.destroy_command_pool(self.command_pool, None);
            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}

/// Binding index of the constants array in the per-frame descriptor set.
pub const CONSTANTS_BINDING: u32 = 0;

fn device_error(result: vk::Result) -> QuendaError {
    match result {
        vk::Result::ERROR_DEVICE_LOST => QuendaError::DeviceLost,
        other => QuendaError::Vulkan(other),
    }
}

fn create_device(
    instance: &Instance,
    physical_device: vk::PhysicalDevice,
) -> Result<(Device, vk::Queue, u32)> {
    let queue_family_index = unsafe {
        instance
            .get_physical_device_queue_family_properties(physical_device)
            .into_iter()
            .enumerate()
            .find_map(|(queue_family_index, info)| {
                info.queue_flags
                    .contains(vk::QueueFlags::GRAPHICS)
                    .then(|| queue_family_index as u32)
            })
            .ok_or_else(|| anyhow::anyhow!("no graphics queue family"))?
    };

    let queue_priorities = [1.0];
    let graphics_queue_create_info = vk::DeviceQueueCreateInfo::builder()
        .queue_priorities(&queue_priorities)
        .queue_family_index(queue_family_index)
        .build();
    let queue_create_infos = [graphics_queue_create_info];

    let vulkan_1_2_features = &mut vk::PhysicalDeviceVulkan12Features {
        timeline_semaphore: vk::TRUE,
        runtime_descriptor_array: vk::TRUE,
        descriptor_binding_partially_bound: vk::TRUE,
        descriptor_binding_variable_descriptor_count: vk::TRUE,
        ..Default::default()
    };

    let device_create_info = vk::DeviceCreateInfo::builder()
        .queue_create_infos(&queue_create_infos)
        .push_next(vulkan_1_2_features);

    let device =
        unsafe { instance.create_device(physical_device, &device_create_info, None) }?;
    let graphics_queue = unsafe { device.get_device_queue(queue_family_index, 0) };

    Ok((device, graphics_queue, queue_family_index))
}

fn create_descriptor_table(
    device: &Device,
    capacity: u32,
) -> Result<(
    vk::DescriptorPool,
    vk::DescriptorSetLayout,
    [vk::DescriptorSet; PIPELINE_DEPTH],
)> {
    let pool_sizes = [vk::DescriptorPoolSize {
        ty: vk::DescriptorType::UNIFORM_BUFFER,
        descriptor_count: capacity * PIPELINE_DEPTH as u32,
    }];
    let pool = unsafe {
        device.create_descriptor_pool(
            &vk::DescriptorPoolCreateInfo::builder()
                .pool_sizes(&pool_sizes)
                .max_sets(PIPELINE_DEPTH as u32),
            None,
        )
    }?;

    let bindings = [vk::DescriptorSetLayoutBinding {
        binding: CONSTANTS_BINDING,
        descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
        descriptor_count: capacity,
        stage_flags: vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
        ..Default::default()
    }];
    let descriptor_flags = [vk::DescriptorBindingFlags::PARTIALLY_BOUND
        | vk::DescriptorBindingFlags::VARIABLE_DESCRIPTOR_COUNT];
    let mut binding_flags = vk::DescriptorSetLayoutBindingFlagsCreateInfoEXT::builder()
        .binding_flags(&descriptor_flags);

    let layout = unsafe {
        device.create_descriptor_set_layout(
            &vk::DescriptorSetLayoutCreateInfo::builder()
                .bindings(&bindings)
                .push_next(&mut binding_flags),
            None,
        )
    }?;

    let descriptor_counts = [capacity; PIPELINE_DEPTH];
    let mut variable_counts = vk::DescriptorSetVariableDescriptorCountAllocateInfo::builder()
        .descriptor_counts(&descriptor_counts);
    let layouts = [layout; PIPELINE_DEPTH];
    let sets: [vk::DescriptorSet; PIPELINE_DEPTH] = unsafe {
        device.allocate_descriptor_sets(
            &vk::DescriptorSetAllocateInfo::builder()
                .descriptor_pool(pool)
                .set_layouts(&layouts)
                .push_next(&mut variable_counts),
        )
    }?
    .as_slice()
    .try_into()
    .expect("descriptor set count mismatch");

    Ok((pool, layout, sets))
}

fn create_timeline_semaphore(device: &Device) -> Result<vk::Semaphore> {
    let mut type_info = vk::SemaphoreTypeCreateInfo::builder()
        .semaphore_type(vk::SemaphoreType::TIMELINE)
        .initial_value(0);
    let semaphore = unsafe {
        device.create_semaphore(
            &vk::SemaphoreCreateInfo::builder().push_next(&mut type_info),
            None,
        )
    }?;
    Ok(semaphore)
}

fn find_memory_type_index(
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    memory_type_bits_requirement: u32,
    memory_property_flags: vk::MemoryPropertyFlags,
) -> Option<usize> {
    (0..memory_properties.memory_type_count as usize).find(|&memory_index| {
        let memory_type_bits = 1 << memory_index;
        let is_required_memory_type = (memory_type_bits_requirement & memory_type_bits) != 0;
        let properties = memory_properties.memory_types[memory_index].property_flags;
        is_required_memory_type && properties.contains(memory_property_flags)
    })
}
