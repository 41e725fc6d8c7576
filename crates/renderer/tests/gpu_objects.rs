//! Frame resources and geometry uploads on a real device, without a window.
//!
//! Each test skips when no Vulkan loader or no graphics-capable GPU with the
//! swapchain extension is available.

use std::sync::Arc;

use framepace_renderer::frame_resources::FrameResourceSet;
use framepace_renderer::mesh::{QUAD_INDICES, QUAD_VERTICES, QuadMesh};
use framepace_renderer::RendererError;
use framepace_rhi::buffer::{Buffer, BufferUsage, Residency};
use framepace_rhi::command::CommandPool;
use framepace_rhi::device::Device;
use framepace_rhi::instance::Instance;
use framepace_rhi::physical_device::{PhysicalDeviceInfo, QueueFamilies};
use framepace_rhi::{RhiError, vk};

/// Device and the instance it was created from, dropped in that order.
struct Gpu {
    device: Arc<Device>,
    _instance: Instance,
}

fn vulkan_unavailable(e: &RhiError) -> bool {
    matches!(
        e,
        RhiError::LoadingError(_)
            | RhiError::VulkanError(
                vk::Result::ERROR_INCOMPATIBLE_DRIVER | vk::Result::ERROR_INITIALIZATION_FAILED
            )
    )
}

/// First GPU with a graphics queue family and the swapchain extension.
fn graphics_gpu(instance: &Instance) -> Option<PhysicalDeviceInfo> {
    let handle = instance.handle();
    let devices = unsafe { handle.enumerate_physical_devices() }.ok()?;

    devices.into_iter().find_map(|device| {
        let families = unsafe { handle.get_physical_device_queue_family_properties(device) };
        let graphics = families.iter().position(|family| {
            family.queue_count > 0 && family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
        })? as u32;

        let extensions = unsafe { handle.enumerate_device_extension_properties(device) }.ok()?;
        let has_swapchain = extensions.iter().any(|ext| {
            ext.extension_name_as_c_str()
                .is_ok_and(|name| name == ash::khr::swapchain::NAME)
        });

        has_swapchain.then(|| PhysicalDeviceInfo {
            device,
            properties: unsafe { handle.get_physical_device_properties(device) },
            queue_families: QueueFamilies {
                graphics,
                present: graphics,
            },
        })
    })
}

fn headless_gpu() -> Option<Gpu> {
    let instance = match Instance::new("framepace-test", false, &[]) {
        Ok(instance) => instance,
        Err(e) if vulkan_unavailable(&e) => {
            eprintln!("Skipping: no Vulkan ({})", e);
            return None;
        }
        Err(e) => panic!("Unexpected error: {:?}", e),
    };

    let Some(gpu) = graphics_gpu(&instance) else {
        eprintln!("Skipping: no graphics GPU with VK_KHR_swapchain");
        return None;
    };

    match Device::new(&instance, &gpu) {
        Ok(device) => Some(Gpu {
            device,
            _instance: instance,
        }),
        Err(e) if vulkan_unavailable(&e) => {
            eprintln!("Skipping: device creation failed ({})", e);
            None
        }
        Err(e) => panic!("Unexpected error: {:?}", e),
    }
}

fn graphics_pool(device: &Arc<Device>) -> CommandPool {
    CommandPool::new(device.clone(), device.queue_families().graphics).unwrap()
}

#[test]
fn frame_slots_start_with_signaled_fences() {
    let Some(gpu) = headless_gpu() else { return };
    let pool = graphics_pool(&gpu.device);

    let frames = FrameResourceSet::new(&gpu.device, &pool, 3).unwrap();

    assert_eq!(frames.len(), 3);
    assert!(frames.slot(3).is_none());
    for index in 0..frames.len() {
        let slot = frames.slot(index).unwrap();
        let signaled =
            unsafe { gpu.device.handle().get_fence_status(slot.in_flight().handle()) }.unwrap();
        assert!(signaled, "fence of slot {index} starts unsignaled");
        // The first wait of every slot returns at once
        slot.in_flight().wait().unwrap();
        assert_ne!(slot.image_available().handle(), slot.render_finished().handle());
    }
}

#[test]
fn frame_slots_are_distinct() {
    let Some(gpu) = headless_gpu() else { return };
    let pool = graphics_pool(&gpu.device);

    let frames = FrameResourceSet::new(&gpu.device, &pool, 2).unwrap();
    let (first, second) = (frames.slot(0).unwrap(), frames.slot(1).unwrap());

    assert_ne!(first.in_flight().handle(), second.in_flight().handle());
    assert_ne!(
        first.command_buffer().handle(),
        second.command_buffer().handle()
    );
}

#[test]
fn empty_frame_set_is_rejected() {
    let Some(gpu) = headless_gpu() else { return };
    let pool = graphics_pool(&gpu.device);

    let err = FrameResourceSet::new(&gpu.device, &pool, 0).err();
    assert!(matches!(
        err,
        Some(RendererError::ResourceCreation {
            resource: "frame resource set",
            ..
        })
    ));
}

#[test]
fn upload_lands_in_device_local_memory() {
    let Some(gpu) = headless_gpu() else { return };
    let pool = graphics_pool(&gpu.device);
    let indices: [u16; 6] = [0, 1, 2, 2, 3, 0];

    let buffer = Buffer::upload(
        gpu.device.clone(),
        &pool,
        BufferUsage::Index,
        bytemuck::cast_slice(&indices),
    )
    .unwrap();

    assert_eq!(buffer.residency(), Residency::DeviceLocal);
    assert_eq!(buffer.size(), 12);
    // Device-local memory is not mapped
    assert!(matches!(
        buffer.write(0, &[0; 2]),
        Err(RhiError::InvalidHandle(_))
    ));
}

#[test]
fn quad_mesh_binds_uploaded_buffers() {
    let Some(gpu) = headless_gpu() else { return };
    let pool = graphics_pool(&gpu.device);

    let mesh = QuadMesh::new(gpu.device.clone(), &pool).unwrap();
    let bindings = mesh.bindings(vk::DescriptorSet::null());

    assert_eq!(bindings.index_count, QUAD_INDICES.len() as u32);
    assert_eq!(bindings.index_type, vk::IndexType::UINT16);
    assert_ne!(bindings.vertex_buffer, bindings.index_buffer);
    assert_eq!(QUAD_VERTICES.len(), 4);
}
