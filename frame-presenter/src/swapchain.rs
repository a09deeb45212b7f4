//! Presentation chain negotiation and construction.

use crate::device::{PresentationDevice, QueueFamilyIndices, SurfaceSupport, SwapchainDesc};
use crate::error::{PresentError, Result};
use crate::sync::MAX_CHAIN_IMAGES;
use ash::vk;
use tracing::{debug, info};

/// One more than the minimum, clamped to the maximum. A maximum of zero means
/// the surface imposes no upper limit.
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let desired = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        desired.min(capabilities.max_image_count)
    } else {
        desired
    }
}

/// First supported format matching a preference, else the first supported
/// format. `None` only when the surface reports no formats at all.
pub fn choose_surface_format(
    available: &[vk::SurfaceFormatKHR],
    preferred: &[vk::SurfaceFormatKHR],
) -> Option<vk::SurfaceFormatKHR> {
    preferred
        .iter()
        .find(|pref| {
            available
                .iter()
                .any(|a| a.format == pref.format && a.color_space == pref.color_space)
        })
        .copied()
        .or_else(|| available.first().copied())
}

/// First preferred mode the surface supports. FIFO is always available.
pub fn choose_present_mode(
    available: &[vk::PresentModeKHR],
    preferred: &[vk::PresentModeKHR],
) -> vk::PresentModeKHR {
    preferred
        .iter()
        .copied()
        .find(|mode| available.contains(mode))
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// The surface's current extent, or the drawable size clamped into the
/// supported range when the surface leaves the extent to the application.
pub fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, drawable: vk::Extent2D) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }
    vk::Extent2D {
        width: drawable.width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: drawable.height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// Concurrent sharing across distinct graphics and present families.
pub fn sharing_for(queues: QueueFamilyIndices) -> (vk::SharingMode, Vec<u32>) {
    if queues.is_shared() {
        (vk::SharingMode::EXCLUSIVE, Vec::new())
    } else {
        (
            vk::SharingMode::CONCURRENT,
            vec![queues.graphics_family, queues.present_family],
        )
    }
}

/// Runs every negotiation rule against what the surface reports.
pub fn negotiate(
    support: &SurfaceSupport,
    queues: QueueFamilyIndices,
    drawable: vk::Extent2D,
    preferred_formats: &[vk::SurfaceFormatKHR],
    preferred_modes: &[vk::PresentModeKHR],
) -> Result<SwapchainDesc> {
    let surface_format =
        choose_surface_format(&support.formats, preferred_formats).ok_or(PresentError::NoSurfaceFormats)?;
    let (sharing_mode, queue_family_indices) = sharing_for(queues);

    Ok(SwapchainDesc {
        image_count: choose_image_count(&support.capabilities),
        surface_format,
        present_mode: choose_present_mode(&support.present_modes, preferred_modes),
        extent: choose_extent(&support.capabilities, drawable),
        pre_transform: support.capabilities.current_transform,
        sharing_mode,
        queue_family_indices,
    })
}

/// The swapchain plus one view per image. Replaced wholesale, never mutated.
#[derive(Debug)]
pub struct PresentationChain {
    handle: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    views: Vec<vk::ImageView>,
    surface_format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    extent: vk::Extent2D,
}

impl PresentationChain {
    /// Creates the swapchain described by `desc`. Nothing is left behind on
    /// failure.
    pub fn create<D: PresentationDevice>(device: &D, desc: &SwapchainDesc) -> Result<Self> {
        let handle = device
            .create_swapchain(desc)
            .map_err(PresentError::creation("swapchain"))?;

        let images = match device.swapchain_images(handle) {
            Ok(images) if images.len() > MAX_CHAIN_IMAGES => {
                device.destroy_swapchain(handle);
                return Err(PresentError::TooManyChainImages {
                    count: images.len(),
                    max: MAX_CHAIN_IMAGES,
                });
            }
            Ok(images) => images,
            Err(err) => {
                device.destroy_swapchain(handle);
                return Err(PresentError::creation("swapchain image list")(err));
            }
        };

        let mut views = Vec::with_capacity(images.len());
        for &image in &images {
            match device.create_image_view(image, desc.surface_format.format, vk::ImageAspectFlags::COLOR) {
                Ok(view) => views.push(view),
                Err(err) => {
                    for view in views {
                        device.destroy_image_view(view);
                    }
                    device.destroy_swapchain(handle);
                    return Err(PresentError::creation("swapchain image view")(err));
                }
            }
        }

        info!(
            "Presentation chain created: {} images, {:?}/{:?}, {:?}, {}x{}.",
            images.len(),
            desc.surface_format.format,
            desc.surface_format.color_space,
            desc.present_mode,
            desc.extent.width,
            desc.extent.height
        );

        Ok(Self {
            handle,
            images,
            views,
            surface_format: desc.surface_format,
            present_mode: desc.present_mode,
            extent: desc.extent,
        })
    }

    pub fn destroy<D: PresentationDevice>(self, device: &D) {
        for view in self.views {
            device.destroy_image_view(view);
        }
        device.destroy_swapchain(self.handle);
        debug!("Presentation chain destroyed.");
    }

    pub fn handle(&self) -> vk::SwapchainKHR {
        self.handle
    }

    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    pub fn views(&self) -> &[vk::ImageView] {
        &self.views
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn surface_format(&self) -> vk::SurfaceFormatKHR {
        self.surface_format
    }

    pub fn format(&self) -> vk::Format {
        self.surface_format.format
    }

    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}
