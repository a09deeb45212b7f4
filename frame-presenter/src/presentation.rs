//! Everything that must be rebuilt when the surface changes.

use crate::config::PresenterConfig;
use crate::device::PresentationDevice;
use crate::error::{PresentError, Result};
use crate::render_pass::{RenderPass, RenderPassLayout};
use crate::render_targets::{find_depth_format, usable_sample_count, RenderTargetSet};
use crate::swapchain::{negotiate, PresentationChain};
use ash::vk;

/// Negotiation preferences, resolved from [`PresenterConfig`] once.
#[derive(Debug, Clone, PartialEq)]
pub struct PresentationSettings {
    pub surface_formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
    pub sample_count: vk::SampleCountFlags,
    pub depth_formats: Vec<vk::Format>,
}

impl From<&PresenterConfig> for PresentationSettings {
    fn from(config: &PresenterConfig) -> Self {
        Self {
            surface_formats: config.surface_format_preferences(),
            present_modes: config.present_mode_preferences(),
            sample_count: config.sample_count_flags(),
            depth_formats: config.depth_format_candidates(),
        }
    }
}

/// Description of a freshly built presentation, handed to recorders so they
/// can rebuild their pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainInfo {
    pub image_count: usize,
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub render_pass: vk::RenderPass,
    pub samples: vk::SampleCountFlags,
    pub depth_format: vk::Format,
}

/// The chain, its render pass and its render targets. Built and destroyed as
/// one unit so the three are never out of step.
#[derive(Debug)]
pub struct Presentation {
    chain: PresentationChain,
    render_pass: RenderPass,
    targets: RenderTargetSet,
    depth_format: vk::Format,
}

impl Presentation {
    pub fn build<D: PresentationDevice>(device: &D, settings: &PresentationSettings, drawable: vk::Extent2D) -> Result<Self> {
        let support = device
            .surface_support()
            .map_err(PresentError::creation("surface capability query"))?;
        let desc = negotiate(
            &support,
            device.queue_families(),
            drawable,
            &settings.surface_formats,
            &settings.present_modes,
        )?;
        let chain = PresentationChain::create(device, &desc)?;

        let depth_format = match find_depth_format(device, &settings.depth_formats) {
            Ok(format) => format,
            Err(err) => {
                chain.destroy(device);
                return Err(err);
            }
        };
        let samples = usable_sample_count(settings.sample_count, device.framebuffer_sample_counts());
        if samples != settings.sample_count {
            tracing::warn!(
                "Requested {:?} MSAA but the device supports at most {:?}.",
                settings.sample_count,
                samples
            );
        }

        let layout = RenderPassLayout::new(chain.format(), depth_format, samples);
        let render_pass = match RenderPass::create(device, layout) {
            Ok(render_pass) => render_pass,
            Err(err) => {
                chain.destroy(device);
                return Err(err);
            }
        };

        let targets = match RenderTargetSet::create(device, &render_pass, &chain, depth_format) {
            Ok(targets) => targets,
            Err(err) => {
                render_pass.destroy(device);
                chain.destroy(device);
                return Err(err);
            }
        };

        Ok(Self {
            chain,
            render_pass,
            targets,
            depth_format,
        })
    }

    /// Destroys targets, render pass and chain, in that order.
    pub fn destroy<D: PresentationDevice>(self, device: &D) {
        self.targets.destroy(device);
        self.render_pass.destroy(device);
        self.chain.destroy(device);
    }

    pub fn info(&self) -> ChainInfo {
        ChainInfo {
            image_count: self.chain.image_count(),
            surface_format: self.chain.surface_format(),
            present_mode: self.chain.present_mode(),
            extent: self.chain.extent(),
            render_pass: self.render_pass.handle(),
            samples: self.render_pass.layout().samples,
            depth_format: self.depth_format,
        }
    }

    pub fn chain(&self) -> &PresentationChain {
        &self.chain
    }

    pub fn render_pass(&self) -> &RenderPass {
        &self.render_pass
    }

    pub fn targets(&self) -> &RenderTargetSet {
        &self.targets
    }
}
