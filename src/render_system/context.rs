//! Vulkan instance/device bring-up and the capability object handed to every
//! render component.

use std::sync::Arc;

use log::info;
use vulkano::{
    command_buffer::allocator::StandardCommandBufferAllocator,
    device::{
        physical::PhysicalDeviceType, Device, DeviceCreateInfo, DeviceExtensions, Features, Queue,
        QueueCreateInfo, QueueFlags,
    },
    instance::{Instance, InstanceCreateFlags, InstanceCreateInfo},
    memory::allocator::StandardMemoryAllocator,
    swapchain::Surface,
    VulkanLibrary,
};
use winit::{event_loop::EventLoop, window::Window};

/// Owns the device, queues and allocators. Passed by reference into the
/// render paths; never cloned into long-lived components.
pub struct RenderContext {
    pub instance: Arc<Instance>,
    pub surface: Arc<Surface>,
    pub device: Arc<Device>,
    /// Graphics + compute capable queue with presentation support.
    pub queue: Arc<Queue>,
    /// Queue for the post-process pass; a dedicated compute family when the
    /// device has one, otherwise an alias of the general queue.
    pub compute_queue: Arc<Queue>,
    pub memory_allocator: Arc<StandardMemoryAllocator>,
    pub command_buffer_allocator: Arc<StandardCommandBufferAllocator>,
}

impl RenderContext {
    pub fn new(event_loop: &EventLoop<()>, window: Arc<Window>) -> RenderContext {
        let library = VulkanLibrary::new().expect("no Vulkan library present");
        let required_extensions = Surface::required_extensions(event_loop);
        let instance = Instance::new(
            library,
            InstanceCreateInfo {
                flags: InstanceCreateFlags::ENUMERATE_PORTABILITY,
                enabled_extensions: required_extensions,
                ..Default::default()
            },
        )
        .expect("failed to create Vulkan instance");

        let surface =
            Surface::from_window(instance.clone(), window).expect("failed to create surface");

        let (device, queue, compute_queue) = select_device(instance.clone(), &surface);

        let memory_allocator = Arc::new(StandardMemoryAllocator::new_default(device.clone()));
        let command_buffer_allocator = Arc::new(StandardCommandBufferAllocator::new(
            device.clone(),
            Default::default(),
        ));

        RenderContext {
            instance,
            surface,
            device,
            queue,
            compute_queue,
            memory_allocator,
            command_buffer_allocator,
        }
    }

    /// Full device idle wait; required before destroying any resource a
    /// command buffer may still reference.
    pub fn wait_idle(&self) {
        self.device.wait_idle().expect("device wait failed");
    }

    pub fn log_gpu_info(&self) {
        let version = self.instance.api_version();
        info!(
            "Vulkan instance version: {}.{}.{}",
            version.major, version.minor, version.patch
        );
        let selected = self.device.physical_device().properties().device_name.clone();
        info!("available Vulkan devices:");
        for physical_device in self
            .instance
            .enumerate_physical_devices()
            .expect("failed to enumerate physical devices")
        {
            let name = &physical_device.properties().device_name;
            let marker = if *name == selected { "(x)" } else { "( )" };
            info!("  {} {}", marker, name);
        }
    }
}

fn select_device(
    instance: Arc<Instance>,
    surface: &Surface,
) -> (Arc<Device>, Arc<Queue>, Arc<Queue>) {
    let device_extensions = DeviceExtensions {
        khr_swapchain: true,
        khr_acceleration_structure: true,
        khr_deferred_host_operations: true,
        khr_ray_query: true,
        khr_push_descriptor: true,
        ..DeviceExtensions::empty()
    };
    let features = Features {
        acceleration_structure: true,
        buffer_device_address: true,
        dynamic_rendering: true,
        ray_query: true,
        scalar_block_layout: true,
        shader_int8: true,
        storage_buffer8_bit_access: true,
        uniform_and_storage_buffer8_bit_access: true,
        ..Features::empty()
    };

    let (physical_device, general_queue_family_index, compute_queue_family_index) = instance
        .enumerate_physical_devices()
        .expect("failed to enumerate physical devices")
        .filter(|p| p.supported_extensions().contains(&device_extensions))
        .filter(|p| p.supported_features().contains(&features))
        .filter_map(|p| {
            // a general purpose queue that can also present
            let general_queue_family_index = p
                .queue_family_properties()
                .iter()
                .enumerate()
                .position(|(i, q)| {
                    q.queue_flags
                        .contains(QueueFlags::GRAPHICS | QueueFlags::COMPUTE)
                        && p.surface_support(i as u32, surface).unwrap_or(false)
                });

            // prefer a compute-only family for the post-process pass
            let compute_queue_family_index = p
                .queue_family_properties()
                .iter()
                .enumerate()
                .position(|(_, q)| {
                    q.queue_flags.contains(QueueFlags::COMPUTE)
                        && !q.queue_flags.contains(QueueFlags::GRAPHICS)
                });

            general_queue_family_index
                .map(|g| (p, g as u32, compute_queue_family_index.map(|c| c as u32)))
        })
        .min_by_key(|(p, _, _)| match p.properties().device_type {
            PhysicalDeviceType::DiscreteGpu => 0,
            PhysicalDeviceType::IntegratedGpu => 1,
            PhysicalDeviceType::VirtualGpu => 2,
            PhysicalDeviceType::Cpu => 3,
            PhysicalDeviceType::Other => 4,
            _ => 5,
        })
        .expect("no suitable physical device found");

    let mut queue_create_infos = vec![QueueCreateInfo {
        queue_family_index: general_queue_family_index,
        ..Default::default()
    }];
    if let Some(compute_family) = compute_queue_family_index {
        queue_create_infos.push(QueueCreateInfo {
            queue_family_index: compute_family,
            ..Default::default()
        });
    }

    let (device, mut queues) = Device::new(
        physical_device,
        DeviceCreateInfo {
            enabled_extensions: device_extensions,
            enabled_features: features,
            queue_create_infos,
            ..Default::default()
        },
    )
    .expect("failed to create logical device");

    let general_queue = queues.next().expect("missing general queue");
    let compute_queue = queues.next().unwrap_or_else(|| general_queue.clone());

    (device, general_queue, compute_queue)
}
