//! Opens a window and presents cleared frames until it is closed.
//!
//! Usage: `present-demo [config.toml]`. Without an argument `presenter.toml`
//! in the working directory is used when present.

use anyhow::Context;
use ash::vk;
use frame_presenter::{
    logging, AshDevice, CommandRecorder, FrameContext, FrameOutcome, FrameScheduler, PresenterConfig, RecordTarget,
    WinitSurface,
};
use std::path::PathBuf;
use tracing::info;

type Device = AshDevice<WinitSurface>;

/// Clears colour and depth. The colour slowly cycles with elapsed time.
struct ClearRecorder;

impl CommandRecorder<Device> for ClearRecorder {
    fn record(&mut self, device: &Device, target: &RecordTarget, frame: &FrameContext) -> anyhow::Result<vk::CommandBuffer> {
        let raw = device.raw();
        let command_buffer = target.command_buffer;
        let t = frame.elapsed_seconds();

        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: [0.5 + 0.5 * t.sin(), 0.5 + 0.5 * (t * 0.7).cos(), 0.3, 1.0],
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
            },
        ];
        let begin_info = vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        let render_pass_begin_info = vk::RenderPassBeginInfo::builder()
            .render_pass(target.render_pass)
            .framebuffer(target.framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent: target.extent,
            })
            .clear_values(&clear_values);

        unsafe {
            raw.reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::empty())?;
            raw.begin_command_buffer(command_buffer, &begin_info)?;
            raw.cmd_begin_render_pass(command_buffer, &render_pass_begin_info, vk::SubpassContents::INLINE);
            raw.cmd_end_render_pass(command_buffer);
            raw.end_command_buffer(command_buffer)?;
        }
        Ok(command_buffer)
    }
}

fn main() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("presenter.toml"));
    let config = PresenterConfig::load_or_default(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    logging::init_logging(&config.logging);

    let window = WinitSurface::new(&config.window)?;
    let device = AshDevice::new(window, &config.instance).context("Vulkan bootstrap failed")?;
    let mut scheduler = FrameScheduler::new(device, ClearRecorder, &config)?;
    scheduler.initialize()?;

    let mut frame = FrameContext::new();
    loop {
        let signals = scheduler.device().window().pump_events();
        if signals.close_requested {
            break;
        }
        if signals.resized {
            scheduler.notify_surface_resized();
        }

        frame.tick();
        match scheduler.render_one_frame(&frame)? {
            FrameOutcome::Presented { .. } => {}
            FrameOutcome::Rebuilt => info!("Frame {} skipped for a presentation rebuild.", frame.frame_number),
            FrameOutcome::WindowClosed => break,
        }
    }

    info!("Presented {} frames.", scheduler.frames_presented());
    scheduler.shutdown()?;
    Ok(())
}
