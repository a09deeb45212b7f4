use crate::device::PresentationDevice;
use crate::error::{PresentError, Result};
use ash::vk;
use tracing::debug;

/// Attachment layout of the single-subpass forward pass.
///
/// Multisampled passes use `[msaa colour, depth, resolve]` where the resolve
/// target is the chain image. Single-sample passes render straight into the
/// chain image: `[chain colour, depth]`. Framebuffers must list their views in
/// the same order.
#[derive(Debug, Clone)]
pub struct RenderPassLayout {
    pub attachments: Vec<vk::AttachmentDescription>,
    pub color_ref: vk::AttachmentReference,
    pub depth_ref: vk::AttachmentReference,
    pub resolve_ref: Option<vk::AttachmentReference>,
    pub dependency: vk::SubpassDependency,
    pub samples: vk::SampleCountFlags,
}

impl RenderPassLayout {
    pub fn new(color_format: vk::Format, depth_format: vk::Format, samples: vk::SampleCountFlags) -> Self {
        let multisampled = samples != vk::SampleCountFlags::TYPE_1;

        let color_attachment = vk::AttachmentDescription::builder()
            .format(color_format)
            .samples(samples)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(if multisampled {
                vk::AttachmentStoreOp::DONT_CARE
            } else {
                vk::AttachmentStoreOp::STORE
            })
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(if multisampled {
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
            } else {
                vk::ImageLayout::PRESENT_SRC_KHR
            })
            .build();

        let depth_attachment = vk::AttachmentDescription::builder()
            .format(depth_format)
            .samples(samples)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::DONT_CARE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
            .build();

        let mut attachments = vec![color_attachment, depth_attachment];
        let resolve_ref = multisampled.then(|| {
            attachments.push(
                vk::AttachmentDescription::builder()
                    .format(color_format)
                    .samples(vk::SampleCountFlags::TYPE_1)
                    .load_op(vk::AttachmentLoadOp::DONT_CARE)
                    .store_op(vk::AttachmentStoreOp::STORE)
                    .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                    .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                    .initial_layout(vk::ImageLayout::UNDEFINED)
                    .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
                    .build(),
            );
            vk::AttachmentReference {
                attachment: 2,
                layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            }
        });

        // The presentation engine must release the image, and the previous
        // frame's writes to the shared depth and MSAA images must land before
        // this frame clears them.
        let dependency = vk::SubpassDependency::builder()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
            )
            .src_access_mask(
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            )
            .dst_stage_mask(
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            )
            .dst_access_mask(
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            )
            .build();

        Self {
            attachments,
            color_ref: vk::AttachmentReference {
                attachment: 0,
                layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            },
            depth_ref: vk::AttachmentReference {
                attachment: 1,
                layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            },
            resolve_ref,
            dependency,
            samples,
        }
    }

    pub fn is_multisampled(&self) -> bool {
        self.resolve_ref.is_some()
    }

    /// Index of the attachment that ends up in the chain image.
    pub fn presented_attachment(&self) -> usize {
        self.resolve_ref.map_or(self.color_ref.attachment, |r| r.attachment) as usize
    }
}

#[derive(Debug)]
pub struct RenderPass {
    handle: vk::RenderPass,
    layout: RenderPassLayout,
}

impl RenderPass {
    pub fn create<D: PresentationDevice>(device: &D, layout: RenderPassLayout) -> Result<Self> {
        let handle = device
            .create_render_pass(&layout)
            .map_err(PresentError::creation("render pass"))?;
        debug!(
            "Render pass created ({} attachments, {:?}).",
            layout.attachments.len(),
            layout.samples
        );
        Ok(Self { handle, layout })
    }

    pub fn destroy<D: PresentationDevice>(self, device: &D) {
        device.destroy_render_pass(self.handle);
    }

    pub fn handle(&self) -> vk::RenderPass {
        self.handle
    }

    pub fn layout(&self) -> &RenderPassLayout {
        &self.layout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_sample_pass_presents_the_colour_attachment() {
        let layout = RenderPassLayout::new(
            vk::Format::B8G8R8A8_SRGB,
            vk::Format::D32_SFLOAT,
            vk::SampleCountFlags::TYPE_1,
        );
        assert!(!layout.is_multisampled());
        assert_eq!(layout.attachments.len(), 2);
        assert_eq!(layout.presented_attachment(), 0);
        assert_eq!(layout.attachments[0].final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(layout.attachments[0].store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(layout.attachments[1].format, vk::Format::D32_SFLOAT);
    }

    #[test]
    fn multisampled_pass_resolves_into_the_chain_image() {
        let layout = RenderPassLayout::new(
            vk::Format::B8G8R8A8_SRGB,
            vk::Format::D24_UNORM_S8_UINT,
            vk::SampleCountFlags::TYPE_4,
        );
        assert!(layout.is_multisampled());
        assert_eq!(layout.attachments.len(), 3);
        assert_eq!(layout.presented_attachment(), 2);

        let [color, depth, resolve] = [layout.attachments[0], layout.attachments[1], layout.attachments[2]];
        assert_eq!(color.samples, vk::SampleCountFlags::TYPE_4);
        assert_eq!(depth.samples, vk::SampleCountFlags::TYPE_4);
        assert_eq!(resolve.samples, vk::SampleCountFlags::TYPE_1);
        assert_eq!(color.final_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(resolve.final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
    }

    #[test]
    fn dependency_covers_colour_and_depth_stages() {
        let layout = RenderPassLayout::new(
            vk::Format::B8G8R8A8_SRGB,
            vk::Format::D32_SFLOAT,
            vk::SampleCountFlags::TYPE_1,
        );
        let dep = layout.dependency;
        assert_eq!(dep.src_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(dep.dst_subpass, 0);
        assert!(dep
            .dst_stage_mask
            .contains(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS));
    }

    #[test]
    fn dependency_orders_previous_attachment_writes_before_the_clear() {
        let layout = RenderPassLayout::new(
            vk::Format::B8G8R8A8_SRGB,
            vk::Format::D32_SFLOAT,
            vk::SampleCountFlags::TYPE_4,
        );
        let dep = layout.dependency;
        let writes = vk::AccessFlags::COLOR_ATTACHMENT_WRITE | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE;
        assert!(dep
            .src_stage_mask
            .contains(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS));
        assert_eq!(dep.src_access_mask, writes);
        assert_eq!(dep.dst_access_mask, writes);
    }
}
