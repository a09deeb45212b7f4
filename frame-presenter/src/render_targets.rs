//! Depth buffer, multisample colour buffer and per-image framebuffers.

use crate::device::{AttachmentDesc, AttachmentImage, PresentationDevice};
use crate::error::{PresentError, Result};
use crate::render_pass::RenderPass;
use crate::swapchain::PresentationChain;
use ash::vk;
use tracing::debug;

/// First candidate usable as an optimal-tiling depth attachment.
pub fn find_depth_format<D: PresentationDevice>(device: &D, candidates: &[vk::Format]) -> Result<vk::Format> {
    candidates
        .iter()
        .copied()
        .find(|&format| {
            device
                .format_properties(format)
                .optimal_tiling_features
                .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
        })
        .ok_or_else(|| PresentError::NoDepthFormat(candidates.to_vec()))
}

/// Highest supported sample count not above `requested`.
pub fn usable_sample_count(
    requested: vk::SampleCountFlags,
    supported: vk::SampleCountFlags,
) -> vk::SampleCountFlags {
    [
        vk::SampleCountFlags::TYPE_64,
        vk::SampleCountFlags::TYPE_32,
        vk::SampleCountFlags::TYPE_16,
        vk::SampleCountFlags::TYPE_8,
        vk::SampleCountFlags::TYPE_4,
        vk::SampleCountFlags::TYPE_2,
    ]
    .into_iter()
    .find(|&count| count.as_raw() <= requested.as_raw() && supported.contains(count))
    .unwrap_or(vk::SampleCountFlags::TYPE_1)
}

/// Attachments and framebuffers sized to one presentation chain.
#[derive(Debug)]
pub struct RenderTargetSet {
    depth: AttachmentImage,
    color: Option<AttachmentImage>,
    framebuffers: Vec<vk::Framebuffer>,
    extent: vk::Extent2D,
}

impl RenderTargetSet {
    /// Builds targets for every image of `chain`. A failure destroys whatever
    /// was already built.
    pub fn create<D: PresentationDevice>(
        device: &D,
        render_pass: &RenderPass,
        chain: &PresentationChain,
        depth_format: vk::Format,
    ) -> Result<Self> {
        let extent = chain.extent();
        let samples = render_pass.layout().samples;

        let color = if render_pass.layout().is_multisampled() {
            let desc = AttachmentDesc {
                format: chain.format(),
                extent,
                samples,
                usage: vk::ImageUsageFlags::TRANSIENT_ATTACHMENT | vk::ImageUsageFlags::COLOR_ATTACHMENT,
                aspect: vk::ImageAspectFlags::COLOR,
            };
            Some(
                device
                    .create_attachment(&desc)
                    .map_err(PresentError::creation("multisample colour target"))?,
            )
        } else {
            None
        };

        let depth_desc = AttachmentDesc {
            format: depth_format,
            extent,
            samples,
            usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            aspect: vk::ImageAspectFlags::DEPTH,
        };
        let depth = match device.create_attachment(&depth_desc) {
            Ok(depth) => depth,
            Err(err) => {
                if let Some(color) = &color {
                    device.destroy_attachment(color);
                }
                return Err(PresentError::creation("depth buffer")(err));
            }
        };

        let mut targets = Self {
            depth,
            color,
            framebuffers: Vec::with_capacity(chain.image_count()),
            extent,
        };

        for &view in chain.views() {
            let attachments = targets.framebuffer_attachments(view);
            match device.create_framebuffer(render_pass.handle(), &attachments, extent) {
                Ok(framebuffer) => targets.framebuffers.push(framebuffer),
                Err(err) => {
                    targets.destroy(device);
                    return Err(PresentError::creation("framebuffer")(err));
                }
            }
        }

        debug!(
            "Render targets created: {} framebuffers, depth {:?}, {:?}.",
            targets.framebuffers.len(),
            depth_format,
            samples
        );
        Ok(targets)
    }

    /// Views in render-pass attachment order for one chain image.
    fn framebuffer_attachments(&self, chain_view: vk::ImageView) -> Vec<vk::ImageView> {
        match &self.color {
            Some(color) => vec![color.view, self.depth.view, chain_view],
            None => vec![chain_view, self.depth.view],
        }
    }

    pub fn destroy<D: PresentationDevice>(self, device: &D) {
        for framebuffer in self.framebuffers {
            device.destroy_framebuffer(framebuffer);
        }
        device.destroy_attachment(&self.depth);
        if let Some(color) = &self.color {
            device.destroy_attachment(color);
        }
        debug!("Render targets destroyed.");
    }

    pub fn framebuffer(&self, image_index: usize) -> Option<vk::Framebuffer> {
        self.framebuffers.get(image_index).copied()
    }

    pub fn framebuffers(&self) -> &[vk::Framebuffer] {
        &self.framebuffers
    }

    pub fn depth(&self) -> &AttachmentImage {
        &self.depth
    }

    pub fn color(&self) -> Option<&AttachmentImage> {
        self.color.as_ref()
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}
