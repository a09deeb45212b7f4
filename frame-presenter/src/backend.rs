//! [`PresentationDevice`] on top of `ash`.
//!
//! [`AshDevice`] bootstraps the instance, surface, physical and logical device
//! for a [`WindowSurface`] and implements every call the scheduler makes. It
//! owns the window so the surface can never outlive it.

use crate::config::InstanceConfig;
use crate::device::{
    AttachmentDesc, AttachmentImage, FrameSubmission, PresentationDevice, QueueFamilyIndices, SurfaceSupport,
    SwapchainDesc, WindowSurface,
};
use crate::render_pass::RenderPassLayout;
use anyhow::{anyhow, Context};
use ash::extensions::{ext, khr};
use ash::prelude::VkResult;
use ash::vk;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::ffi::{c_void, CStr, CString};
use std::mem::ManuallyDrop;
use std::os::raw::c_char;
use tracing::{debug, info, warn};
use vk_mem::Alloc;

const VALIDATION_LAYER: &[u8] = b"VK_LAYER_KHRONOS_validation\0";

unsafe extern "system" fn vulkan_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut c_void,
) -> vk::Bool32 {
    let callback_data = *p_callback_data;
    let message_id_name = if callback_data.p_message_id_name.is_null() {
        std::borrow::Cow::from("")
    } else {
        CStr::from_ptr(callback_data.p_message_id_name).to_string_lossy()
    };
    let message = if callback_data.p_message.is_null() {
        std::borrow::Cow::from("")
    } else {
        CStr::from_ptr(callback_data.p_message).to_string_lossy()
    };

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            tracing::error!(target: "vulkan", "{:?} {}: {}", message_type, message_id_name, message)
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            tracing::warn!(target: "vulkan", "{:?} {}: {}", message_type, message_id_name, message)
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => {
            tracing::debug!(target: "vulkan", "{:?} {}: {}", message_type, message_id_name, message)
        }
        _ => tracing::trace!(target: "vulkan", "{:?} {}: {}", message_type, message_id_name, message),
    }
    vk::FALSE
}

/// Instance-level objects. Dropping it destroys whatever has been created so
/// far, so a bootstrap that fails halfway leaves nothing behind.
struct InstanceCore {
    entry: ash::Entry,
    instance: ash::Instance,
    debug_utils: Option<(ext::DebugUtils, vk::DebugUtilsMessengerEXT)>,
    surface_loader: khr::Surface,
    surface: vk::SurfaceKHR,
}

impl InstanceCore {
    fn new<S: WindowSurface>(window: &S, config: &InstanceConfig) -> anyhow::Result<Self> {
        let entry = unsafe { ash::Entry::load()? };

        let app_name = CString::new(config.application_name.as_str())?;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(&app_name)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_1);

        let mut instance_extensions = ash_window::enumerate_required_extensions(window.raw_display_handle())
            .context("window system has no Vulkan surface support")?
            .to_vec();

        let validation = config.validation && Self::validation_layer_available(&entry)?;
        if config.validation && !validation {
            warn!("Validation requested but VK_LAYER_KHRONOS_validation is not installed.");
        }
        let mut enabled_layer_names: Vec<*const c_char> = Vec::new();
        if validation {
            instance_extensions.push(ext::DebugUtils::name().as_ptr());
            enabled_layer_names.push(VALIDATION_LAYER.as_ptr() as *const c_char);
        }

        let mut debug_messenger_create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                    | vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(vulkan_debug_callback));

        let mut instance_create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&instance_extensions)
            .enabled_layer_names(&enabled_layer_names);
        if validation {
            instance_create_info = instance_create_info.push_next(&mut debug_messenger_create_info);
        }

        let instance = unsafe { entry.create_instance(&instance_create_info, None)? };
        info!("Vulkan instance created (validation: {}).", validation);

        let surface_loader = khr::Surface::new(&entry, &instance);
        let mut core = Self {
            entry,
            instance,
            debug_utils: None,
            surface_loader,
            surface: vk::SurfaceKHR::null(),
        };

        if validation {
            let loader = ext::DebugUtils::new(&core.entry, &core.instance);
            let messenger = unsafe { loader.create_debug_utils_messenger(&debug_messenger_create_info, None)? };
            debug!("Vulkan debug messenger created.");
            core.debug_utils = Some((loader, messenger));
        }

        core.surface = unsafe {
            ash_window::create_surface(
                &core.entry,
                &core.instance,
                window.raw_display_handle(),
                window.raw_window_handle(),
                None,
            )
            .context("creating the window surface")?
        };
        info!("Vulkan surface created.");
        Ok(core)
    }

    fn validation_layer_available(entry: &ash::Entry) -> anyhow::Result<bool> {
        let wanted = unsafe { CStr::from_bytes_with_nul_unchecked(VALIDATION_LAYER) };
        let layers = entry.enumerate_instance_layer_properties()?;
        Ok(layers
            .iter()
            .any(|layer| unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) } == wanted))
    }
}

impl Drop for InstanceCore {
    fn drop(&mut self) {
        unsafe {
            if self.surface != vk::SurfaceKHR::null() {
                self.surface_loader.destroy_surface(self.surface, None);
            }
            if let Some((loader, messenger)) = self.debug_utils.take() {
                loader.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
        info!("Vulkan instance destroyed.");
    }
}

/// Memory placement for a render-target attachment. Transient attachments may
/// stay lazily allocated on tiled GPUs.
fn attachment_allocation_info(usage: vk::ImageUsageFlags) -> vk_mem::AllocationCreateInfo {
    vk_mem::AllocationCreateInfo {
        usage: vk_mem::MemoryUsage::AutoPreferDevice,
        preferred_flags: if usage.contains(vk::ImageUsageFlags::TRANSIENT_ATTACHMENT) {
            vk::MemoryPropertyFlags::LAZILY_ALLOCATED
        } else {
            vk::MemoryPropertyFlags::empty()
        },
        ..Default::default()
    }
}

pub struct AshDevice<S: WindowSurface> {
    physical_device: vk::PhysicalDevice,
    sample_counts: vk::SampleCountFlags,
    queue_families: QueueFamilyIndices,
    device: ash::Device,
    allocator: ManuallyDrop<vk_mem::Allocator>,
    allocations: RefCell<HashMap<vk::Image, vk_mem::Allocation>>,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    swapchain_loader: khr::Swapchain,
    command_pool: vk::CommandPool,
    // Dropped after the device objects above, and before the window.
    core: InstanceCore,
    window: S,
}

impl<S: WindowSurface> AshDevice<S> {
    pub fn new(window: S, config: &InstanceConfig) -> anyhow::Result<Self> {
        let core = InstanceCore::new(&window, config)?;

        let (physical_device, queue_families) =
            Self::select_physical_device(&core.instance, &core.surface_loader, core.surface)?;
        let limits = unsafe { core.instance.get_physical_device_properties(physical_device) }.limits;
        let sample_counts = limits.framebuffer_color_sample_counts & limits.framebuffer_depth_sample_counts;

        let (device, graphics_queue, present_queue) =
            Self::create_logical_device(&core.instance, physical_device, &queue_families)?;
        let swapchain_loader = khr::Swapchain::new(&core.instance, &device);

        let pool_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queue_families.graphics_family);
        let command_pool = match unsafe { device.create_command_pool(&pool_info, None) } {
            Ok(pool) => pool,
            Err(err) => {
                unsafe { device.destroy_device(None) };
                return Err(err).context("creating the command pool");
            }
        };
        debug!("Command pool created for family {}.", queue_families.graphics_family);

        let allocator_info = vk_mem::AllocatorCreateInfo::new(&core.instance, &device, physical_device)
            .vulkan_api_version(vk::API_VERSION_1_1);
        let allocator = match vk_mem::Allocator::new(allocator_info) {
            Ok(allocator) => allocator,
            Err(err) => {
                unsafe {
                    device.destroy_command_pool(command_pool, None);
                    device.destroy_device(None);
                }
                return Err(err).context("creating the memory allocator");
            }
        };
        debug!("Memory allocator created.");

        Ok(Self {
            physical_device,
            sample_counts,
            queue_families,
            device,
            allocator: ManuallyDrop::new(allocator),
            allocations: RefCell::new(HashMap::new()),
            graphics_queue,
            present_queue,
            swapchain_loader,
            command_pool,
            core,
            window,
        })
    }

    fn select_physical_device(
        instance: &ash::Instance,
        surface_loader: &khr::Surface,
        surface: vk::SurfaceKHR,
    ) -> anyhow::Result<(vk::PhysicalDevice, QueueFamilyIndices)> {
        let physical_devices = unsafe { instance.enumerate_physical_devices()? };
        info!("Found {} physical devices.", physical_devices.len());

        let mut best: Option<(u32, vk::PhysicalDevice, QueueFamilyIndices)> = None;
        for pdevice in physical_devices {
            let properties = unsafe { instance.get_physical_device_properties(pdevice) };
            let device_name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }.to_string_lossy();

            let Some(indices) = Self::find_queue_families(instance, surface_loader, surface, pdevice)? else {
                info!("Device {} lacks graphics or present queues.", device_name);
                continue;
            };
            if !Self::supports_swapchain(instance, pdevice)? {
                info!("Device {} does not support {:?}.", device_name, khr::Swapchain::name());
                continue;
            }
            let formats = unsafe { surface_loader.get_physical_device_surface_formats(pdevice, surface)? };
            let modes = unsafe { surface_loader.get_physical_device_surface_present_modes(pdevice, surface)? };
            if formats.is_empty() || modes.is_empty() {
                info!("Device {} cannot present to this surface.", device_name);
                continue;
            }

            let score = match properties.device_type {
                vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
                vk::PhysicalDeviceType::INTEGRATED_GPU => 500,
                _ => 10,
            };
            debug!("Device {} scored {}.", device_name, score);
            if best.map_or(true, |(best_score, ..)| score > best_score) {
                best = Some((score, pdevice, indices));
            }
        }

        let (_, pdevice, indices) = best.ok_or_else(|| anyhow!("Failed to find a suitable physical device"))?;
        let properties = unsafe { instance.get_physical_device_properties(pdevice) };
        info!(
            "Selected {} (graphics family {}, present family {}).",
            unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }.to_string_lossy(),
            indices.graphics_family,
            indices.present_family
        );
        Ok((pdevice, indices))
    }

    /// Prefers a single family that can both render and present.
    fn find_queue_families(
        instance: &ash::Instance,
        surface_loader: &khr::Surface,
        surface: vk::SurfaceKHR,
        pdevice: vk::PhysicalDevice,
    ) -> anyhow::Result<Option<QueueFamilyIndices>> {
        let families = unsafe { instance.get_physical_device_queue_family_properties(pdevice) };
        let mut graphics = None;
        let mut present = None;
        for (index, family) in families.iter().enumerate() {
            let index = index as u32;
            let renders = family.queue_flags.contains(vk::QueueFlags::GRAPHICS);
            let presents = unsafe { surface_loader.get_physical_device_surface_support(pdevice, index, surface)? };
            if renders && presents {
                return Ok(Some(QueueFamilyIndices {
                    graphics_family: index,
                    present_family: index,
                }));
            }
            if renders && graphics.is_none() {
                graphics = Some(index);
            }
            if presents && present.is_none() {
                present = Some(index);
            }
        }
        Ok(graphics.zip(present).map(|(graphics_family, present_family)| QueueFamilyIndices {
            graphics_family,
            present_family,
        }))
    }

    fn supports_swapchain(instance: &ash::Instance, pdevice: vk::PhysicalDevice) -> anyhow::Result<bool> {
        let available = unsafe { instance.enumerate_device_extension_properties(pdevice)? };
        Ok(available
            .iter()
            .any(|ext| unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) } == khr::Swapchain::name()))
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        indices: &QueueFamilyIndices,
    ) -> anyhow::Result<(ash::Device, vk::Queue, vk::Queue)> {
        let unique_queue_families: HashSet<u32> = [indices.graphics_family, indices.present_family].into_iter().collect();
        let queue_priorities = [1.0f32];
        let queue_create_infos: Vec<_> = unique_queue_families
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
                    .build()
            })
            .collect();

        let physical_device_features = vk::PhysicalDeviceFeatures::builder();
        let device_extension_names = [khr::Swapchain::name().as_ptr()];
        let device_create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_create_infos)
            .enabled_features(&physical_device_features)
            .enabled_extension_names(&device_extension_names);

        let device = unsafe { instance.create_device(physical_device, &device_create_info, None)? };
        let graphics_queue = unsafe { device.get_device_queue(indices.graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(indices.present_family, 0) };
        info!("Logical device created with {} queue families.", queue_create_infos.len());

        Ok((device, graphics_queue, present_queue))
    }

    pub fn raw(&self) -> &ash::Device {
        &self.device
    }

    pub fn instance(&self) -> &ash::Instance {
        &self.core.instance
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    pub fn command_pool(&self) -> vk::CommandPool {
        self.command_pool
    }

    pub fn window(&self) -> &S {
        &self.window
    }
}

impl<S: WindowSurface> PresentationDevice for AshDevice<S> {
    fn surface_support(&self) -> VkResult<SurfaceSupport> {
        unsafe {
            Ok(SurfaceSupport {
                capabilities: self
                    .core
                    .surface_loader
                    .get_physical_device_surface_capabilities(self.physical_device, self.core.surface)?,
                formats: self
                    .core
                    .surface_loader
                    .get_physical_device_surface_formats(self.physical_device, self.core.surface)?,
                present_modes: self
                    .core
                    .surface_loader
                    .get_physical_device_surface_present_modes(self.physical_device, self.core.surface)?,
            })
        }
    }

    fn queue_families(&self) -> QueueFamilyIndices {
        self.queue_families
    }

    fn drawable_extent(&self) -> vk::Extent2D {
        self.window.drawable_extent()
    }

    fn wait_events(&self) {
        self.window.wait_events()
    }

    fn close_requested(&self) -> bool {
        self.window.close_requested()
    }

    fn format_properties(&self, format: vk::Format) -> vk::FormatProperties {
        unsafe {
            self.core
                .instance
                .get_physical_device_format_properties(self.physical_device, format)
        }
    }

    fn framebuffer_sample_counts(&self) -> vk::SampleCountFlags {
        self.sample_counts
    }

    fn device_wait_idle(&self) -> VkResult<()> {
        unsafe { self.device.device_wait_idle() }
    }

    fn create_swapchain(&self, desc: &SwapchainDesc) -> VkResult<vk::SwapchainKHR> {
        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(self.core.surface)
            .min_image_count(desc.image_count)
            .image_format(desc.surface_format.format)
            .image_color_space(desc.surface_format.color_space)
            .image_extent(desc.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(desc.sharing_mode)
            .queue_family_indices(&desc.queue_family_indices)
            .pre_transform(desc.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(desc.present_mode)
            .clipped(true)
            .old_swapchain(vk::SwapchainKHR::null());
        unsafe { self.swapchain_loader.create_swapchain(&create_info, None) }
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        unsafe { self.swapchain_loader.get_swapchain_images(swapchain) }
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        unsafe { self.swapchain_loader.destroy_swapchain(swapchain, None) }
    }

    fn create_image_view(
        &self,
        image: vk::Image,
        format: vk::Format,
        aspect: vk::ImageAspectFlags,
    ) -> VkResult<vk::ImageView> {
        let create_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .components(vk::ComponentMapping::default())
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });
        unsafe { self.device.create_image_view(&create_info, None) }
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        unsafe { self.device.destroy_image_view(view, None) }
    }

    fn create_attachment(&self, desc: &AttachmentDesc) -> VkResult<AttachmentImage> {
        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .format(desc.format)
            .extent(vk::Extent3D {
                width: desc.extent.width,
                height: desc.extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(desc.samples)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);
        let allocation_info = attachment_allocation_info(desc.usage);
        let (image, mut allocation) = unsafe { self.allocator.create_image(&image_info, &allocation_info)? };

        match self.create_image_view(image, desc.format, desc.aspect) {
            Ok(view) => {
                self.allocations.borrow_mut().insert(image, allocation);
                Ok(AttachmentImage {
                    image,
                    view,
                    format: desc.format,
                    samples: desc.samples,
                    extent: desc.extent,
                })
            }
            Err(err) => {
                unsafe { self.allocator.destroy_image(image, &mut allocation) };
                Err(err)
            }
        }
    }

    fn destroy_attachment(&self, attachment: &AttachmentImage) {
        unsafe { self.device.destroy_image_view(attachment.view, None) };
        match self.allocations.borrow_mut().remove(&attachment.image) {
            Some(mut allocation) => unsafe { self.allocator.destroy_image(attachment.image, &mut allocation) },
            None => warn!("Attachment image {:?} has no allocation; not destroyed.", attachment.image),
        }
    }

    fn create_render_pass(&self, layout: &RenderPassLayout) -> VkResult<vk::RenderPass> {
        let color_refs = [layout.color_ref];
        let resolve_refs: Vec<_> = layout.resolve_ref.into_iter().collect();
        let mut subpass = vk::SubpassDescription::builder()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs)
            .depth_stencil_attachment(&layout.depth_ref);
        if !resolve_refs.is_empty() {
            subpass = subpass.resolve_attachments(&resolve_refs);
        }
        let subpasses = [subpass.build()];
        let dependencies = [layout.dependency];

        let create_info = vk::RenderPassCreateInfo::builder()
            .attachments(&layout.attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);
        unsafe { self.device.create_render_pass(&create_info, None) }
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        unsafe { self.device.destroy_render_pass(render_pass, None) }
    }

    fn create_framebuffer(
        &self,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> VkResult<vk::Framebuffer> {
        let create_info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass)
            .attachments(attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);
        unsafe { self.device.create_framebuffer(&create_info, None) }
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        unsafe { self.device.destroy_framebuffer(framebuffer, None) }
    }

    fn create_semaphore(&self) -> VkResult<vk::Semaphore> {
        unsafe { self.device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None) }
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe { self.device.destroy_semaphore(semaphore, None) }
    }

    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let create_info = vk::FenceCreateInfo::builder().flags(flags);
        unsafe { self.device.create_fence(&create_info, None) }
    }

    fn wait_for_fence(&self, fence: vk::Fence, timeout: u64) -> VkResult<()> {
        unsafe { self.device.wait_for_fences(&[fence], true, timeout) }
    }

    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()> {
        unsafe { self.device.reset_fences(&[fence]) }
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.device.destroy_fence(fence, None) }
    }

    fn allocate_command_buffers(&self, count: u32) -> VkResult<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);
        unsafe { self.device.allocate_command_buffers(&alloc_info) }
    }

    fn free_command_buffers(&self, command_buffers: &[vk::CommandBuffer]) {
        if !command_buffers.is_empty() {
            unsafe { self.device.free_command_buffers(self.command_pool, command_buffers) }
        }
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout: u64,
        semaphore: vk::Semaphore,
    ) -> VkResult<(u32, bool)> {
        unsafe {
            self.swapchain_loader
                .acquire_next_image(swapchain, timeout, semaphore, vk::Fence::null())
        }
    }

    fn queue_submit(&self, submission: &FrameSubmission) -> VkResult<()> {
        let wait_semaphores = [submission.wait_semaphore];
        let wait_stages = [submission.wait_stage];
        let command_buffers = [submission.command_buffer];
        let signal_semaphores = [submission.signal_semaphore];
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .build();
        unsafe {
            self.device
                .queue_submit(self.graphics_queue, &[submit_info], submission.fence)
        }
    }

    fn queue_present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> VkResult<bool> {
        let wait_semaphores = [wait_semaphore];
        let swapchains = [swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);
        unsafe { self.swapchain_loader.queue_present(self.present_queue, &present_info) }
    }
}

impl<S: WindowSurface> Drop for AshDevice<S> {
    fn drop(&mut self) {
        unsafe {
            if let Err(err) = self.device.device_wait_idle() {
                warn!("Device wait idle failed before teardown: {}", err);
            }
            for (image, mut allocation) in self.allocations.get_mut().drain() {
                warn!("Attachment image {:?} outlived its presentation.", image);
                self.allocator.destroy_image(image, &mut allocation);
            }
            ManuallyDrop::drop(&mut self.allocator);
            self.device.destroy_command_pool(self.command_pool, None);
            self.device.destroy_device(None);
        }
        debug!("Vulkan logical device destroyed.");
    }
}
