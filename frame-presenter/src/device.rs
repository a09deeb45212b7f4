//! The seam between the scheduler and the graphics device.
//!
//! [`PresentationDevice`] is the narrow slice of Vulkan the presentation core
//! needs: surface queries, chain and render-target creation, synchronization
//! objects, and the acquire/submit/present calls. The [`crate::backend`]
//! module implements it on `ash`; tests implement it with an instrumented
//! mock. Every call returns the raw `vk::Result` so callers classify failures
//! themselves.

use crate::render_pass::RenderPassLayout;
use ash::prelude::VkResult;
use ash::vk;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

/// Everything the surface reports about itself.
#[derive(Debug, Clone, Default)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

/// Queue families used for rendering and presentation. They may coincide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics_family: u32,
    pub present_family: u32,
}

impl QueueFamilyIndices {
    pub fn is_shared(&self) -> bool {
        self.graphics_family == self.present_family
    }
}

/// Negotiated parameters for a new swapchain.
#[derive(Debug, Clone, PartialEq)]
pub struct SwapchainDesc {
    pub image_count: u32,
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    pub sharing_mode: vk::SharingMode,
    /// Only populated for `CONCURRENT` sharing.
    pub queue_family_indices: Vec<u32>,
}

/// A device-local image used as a depth or multisample colour attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentDesc {
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub samples: vk::SampleCountFlags,
    pub usage: vk::ImageUsageFlags,
    pub aspect: vk::ImageAspectFlags,
}

/// A created attachment. Its memory belongs to the device implementation and
/// is released by [`PresentationDevice::destroy_attachment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AttachmentImage {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub format: vk::Format,
    pub samples: vk::SampleCountFlags,
    pub extent: vk::Extent2D,
}

/// One frame's worth of queue submission.
#[derive(Debug, Clone, Copy)]
pub struct FrameSubmission {
    pub command_buffer: vk::CommandBuffer,
    pub wait_semaphore: vk::Semaphore,
    pub wait_stage: vk::PipelineStageFlags,
    pub signal_semaphore: vk::Semaphore,
    pub fence: vk::Fence,
}

/// Device, queues and surface as seen by the presentation core.
///
/// All methods take `&self`; implementations that track state use interior
/// mutability. Destroy calls accept handles the implementation created and
/// must tolerate being called only after the caller has waited for the GPU.
pub trait PresentationDevice {
    // Surface and window system.
    fn surface_support(&self) -> VkResult<SurfaceSupport>;
    fn queue_families(&self) -> QueueFamilyIndices;
    /// Current drawable size of the window in pixels.
    fn drawable_extent(&self) -> vk::Extent2D;
    /// Blocks until the window system delivers its next event.
    fn wait_events(&self);
    /// Whether the user asked to close the window.
    fn close_requested(&self) -> bool;
    fn format_properties(&self, format: vk::Format) -> vk::FormatProperties;
    /// Sample counts supported by both colour and depth framebuffers.
    fn framebuffer_sample_counts(&self) -> vk::SampleCountFlags;
    fn device_wait_idle(&self) -> VkResult<()>;

    // Presentation chain.
    fn create_swapchain(&self, desc: &SwapchainDesc) -> VkResult<vk::SwapchainKHR>;
    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>>;
    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR);

    // Images, render passes and framebuffers.
    fn create_image_view(
        &self,
        image: vk::Image,
        format: vk::Format,
        aspect: vk::ImageAspectFlags,
    ) -> VkResult<vk::ImageView>;
    fn destroy_image_view(&self, view: vk::ImageView);
    fn create_attachment(&self, desc: &AttachmentDesc) -> VkResult<AttachmentImage>;
    fn destroy_attachment(&self, attachment: &AttachmentImage);
    fn create_render_pass(&self, layout: &RenderPassLayout) -> VkResult<vk::RenderPass>;
    fn destroy_render_pass(&self, render_pass: vk::RenderPass);
    fn create_framebuffer(
        &self,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> VkResult<vk::Framebuffer>;
    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer);

    // Synchronization.
    fn create_semaphore(&self) -> VkResult<vk::Semaphore>;
    fn destroy_semaphore(&self, semaphore: vk::Semaphore);
    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence>;
    fn wait_for_fence(&self, fence: vk::Fence, timeout: u64) -> VkResult<()>;
    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()>;
    fn destroy_fence(&self, fence: vk::Fence);

    // Command buffers.
    fn allocate_command_buffers(&self, count: u32) -> VkResult<Vec<vk::CommandBuffer>>;
    fn free_command_buffers(&self, command_buffers: &[vk::CommandBuffer]);

    // Frame loop.
    /// Returns the acquired image index and whether the chain is suboptimal.
    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout: u64,
        semaphore: vk::Semaphore,
    ) -> VkResult<(u32, bool)>;
    fn queue_submit(&self, submission: &FrameSubmission) -> VkResult<()>;
    /// Returns `true` when the chain is suboptimal.
    fn queue_present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> VkResult<bool>;
}

/// A native window the ash backend can create a surface for.
pub trait WindowSurface {
    fn raw_display_handle(&self) -> RawDisplayHandle;
    fn raw_window_handle(&self) -> RawWindowHandle;
    fn drawable_extent(&self) -> vk::Extent2D;
    fn wait_events(&self);
    fn close_requested(&self) -> bool;
}
