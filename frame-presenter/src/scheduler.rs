//! The frame loop: acquire, record, submit, present, and rebuild on demand.
//!
//! [`FrameScheduler`] owns the device, the command recorder, the frame slots
//! and the current [`Presentation`]. It is driven from a single thread by
//! calling [`FrameScheduler::render_one_frame`] once per loop iteration.
//!
//! At most `max_frames_in_flight` submissions are outstanding at once: every
//! frame first waits on its slot's fence. The image-in-use table additionally
//! keeps two submissions from targeting the same chain image when the chain
//! is shorter than the number of slots, or when the presentation engine hands
//! images back out of order.

use crate::config::PresenterConfig;
use crate::device::{FrameSubmission, PresentationDevice};
use crate::error::{ErrorCategory, InvariantViolation, PresentError, Result};
use crate::frame_context::FrameContext;
use crate::presentation::{ChainInfo, Presentation, PresentationSettings};
use crate::sync::{FrameSlots, ImageInUseTable};
use ash::vk;
use tracing::{debug, error, info, trace, warn};

/// Records the draw commands for one frame.
///
/// The scheduler owns synchronization and submission; a recorder only fills
/// command buffers. It must not keep `target.framebuffer` beyond the call.
pub trait CommandRecorder<D: PresentationDevice> {
    /// Records commands rendering into `target` and returns the buffer to
    /// submit, normally `target.command_buffer`.
    fn record(&mut self, device: &D, target: &RecordTarget, frame: &FrameContext) -> anyhow::Result<vk::CommandBuffer>;

    /// Called after every (re)build so pipelines and descriptor sets that
    /// depend on the render pass or extent can be recreated.
    fn on_presentation_rebuilt(&mut self, _device: &D, _info: &ChainInfo) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called before the presentation is destroyed. The GPU is idle.
    fn on_presentation_released(&mut self, _device: &D) {}
}

/// Everything a recorder needs for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordTarget {
    pub image_index: u32,
    pub slot: usize,
    pub framebuffer: vk::Framebuffer,
    pub render_pass: vk::RenderPass,
    pub extent: vk::Extent2D,
    /// The slot's command buffer. Its previous submission has completed.
    pub command_buffer: vk::CommandBuffer,
}

/// Result of one call to [`FrameScheduler::render_one_frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The frame was submitted and queued for presentation. `rebuilt` is set
    /// when the presentation was rebuilt afterwards.
    Presented { image_index: u32, slot: usize, rebuilt: bool },
    /// The surface was out of date; the presentation was rebuilt and nothing
    /// was presented.
    Rebuilt,
    /// The window was closed while the scheduler waited for it to be
    /// restored. The old presentation is kept; the caller should shut down.
    WindowClosed,
}

/// Where the scheduler is in its lifecycle. The in-frame phases are reported
/// by [`FrameScheduler::faulted_during`] when a frame fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Uninitialized,
    Idle { slot: usize },
    /// Waiting on the slot fence and acquiring an image.
    Acquiring,
    /// Waiting on the image's previous owner and recording commands.
    Recording,
    /// Resetting the slot fence and handing the commands to the queue.
    Submitted,
    /// Queueing the image for presentation.
    Presenting,
    StaleSurface,
    Rebuilding,
    Faulted,
    ShutDown,
}

pub struct FrameScheduler<D: PresentationDevice, R: CommandRecorder<D>> {
    device: D,
    recorder: R,
    settings: PresentationSettings,
    frames_in_flight: usize,
    slots: Option<FrameSlots>,
    images_in_use: ImageInUseTable,
    presentation: Option<Presentation>,
    state: SchedulerState,
    fault_phase: Option<SchedulerState>,
    current_slot: usize,
    resize_pending: bool,
    rebuild_count: u64,
    frames_presented: u64,
}

impl<D: PresentationDevice, R: CommandRecorder<D>> FrameScheduler<D, R> {
    /// Validates `config` and takes ownership of the device and recorder.
    /// No device objects are created until [`initialize`](Self::initialize).
    pub fn new(device: D, recorder: R, config: &PresenterConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            device,
            recorder,
            settings: PresentationSettings::from(config),
            frames_in_flight: config.max_frames_in_flight,
            slots: None,
            images_in_use: ImageInUseTable::default(),
            presentation: None,
            state: SchedulerState::Uninitialized,
            fault_phase: None,
            current_slot: 0,
            resize_pending: false,
            rebuild_count: 0,
            frames_presented: 0,
        })
    }

    /// Creates the frame slots and the first presentation.
    ///
    /// On failure nothing is left allocated and the scheduler stays
    /// uninitialized.
    pub fn initialize(&mut self) -> Result<()> {
        match self.state {
            SchedulerState::Uninitialized => {}
            SchedulerState::ShutDown => return Err(InvariantViolation::ShutDown.into()),
            SchedulerState::Faulted => return Err(InvariantViolation::Faulted.into()),
            _ => return Err(InvariantViolation::AlreadyInitialized.into()),
        }

        info!("Initializing frame scheduler with {} frames in flight.", self.frames_in_flight);
        self.slots = Some(FrameSlots::create(&self.device, self.frames_in_flight)?);
        self.current_slot = 0;

        let err = match self.rebuild() {
            Ok(true) => return Ok(()),
            Ok(false) => PresentError::WindowClosed,
            Err(err) => err,
        };
        error!("Initial presentation build failed: {}", err);
        if let Some(slots) = self.slots.take() {
            slots.destroy(&self.device);
        }
        self.state = SchedulerState::Uninitialized;
        Err(err)
    }

    /// Runs one acquire, record, submit and present step.
    ///
    /// Out-of-date surfaces are handled here by rebuilding; every other
    /// failure leaves the scheduler [`SchedulerState::Faulted`].
    pub fn render_one_frame(&mut self, frame: &FrameContext) -> Result<FrameOutcome> {
        self.ensure_idle()?;
        match self.frame_step(frame) {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                error!("Frame on slot {} failed while {:?}: {}", self.current_slot, self.state, err);
                self.fault(err)
            }
        }
    }

    /// Marks the surface as resized. The presentation is rebuilt after the
    /// next present.
    pub fn notify_surface_resized(&mut self) {
        if !self.resize_pending {
            debug!("Surface resize noted; rebuilding after the next present.");
        }
        self.resize_pending = true;
    }

    /// Rebuilds the chain and everything that depends on it right away.
    ///
    /// Returns `false` without rebuilding when the window was closed while
    /// minimized.
    pub fn rebuild_presentation(&mut self) -> Result<bool> {
        self.ensure_idle()?;
        match self.rebuild() {
            Ok(rebuilt) => Ok(rebuilt),
            Err(err) => {
                error!("Presentation rebuild failed: {}", err);
                self.fault(err)
            }
        }
    }

    /// Waits for the GPU to finish and destroys every object the scheduler
    /// created. Calling it again is a no-op. The first wait failure is
    /// returned after cleanup has completed anyway.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.state == SchedulerState::ShutDown {
            return Ok(());
        }
        info!("Shutting down frame scheduler.");

        let mut first_error = None;
        if self.slots.is_some() || self.presentation.is_some() {
            if let Err(err) = self.device.device_wait_idle() {
                warn!("Device wait idle failed during shutdown: {}", err);
                first_error.get_or_insert(PresentError::wait("device idle")(err));
            }
        }
        if let Some(slots) = &self.slots {
            for (index, slot) in slots.as_slice().iter().enumerate() {
                if !slot.is_armed() {
                    continue;
                }
                if let Err(err) = self.device.wait_for_fence(slot.frame_complete, u64::MAX) {
                    warn!("Waiting on slot {} during shutdown failed: {}", index, err);
                    first_error.get_or_insert(PresentError::wait("frame-complete fence")(err));
                }
            }
        }

        if let Some(presentation) = self.presentation.take() {
            self.recorder.on_presentation_released(&self.device);
            presentation.destroy(&self.device);
        }
        if let Some(slots) = self.slots.take() {
            slots.destroy(&self.device);
        }
        self.state = SchedulerState::ShutDown;
        info!(
            "Frame scheduler shut down after {} frames and {} rebuilds.",
            self.frames_presented, self.rebuild_count
        );

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn fault<T>(&mut self, err: PresentError) -> Result<T> {
        self.fault_phase = Some(self.state);
        self.state = SchedulerState::Faulted;
        Err(err)
    }

    fn ensure_idle(&self) -> Result<()> {
        match self.state {
            SchedulerState::Idle { .. } => Ok(()),
            SchedulerState::Uninitialized => Err(InvariantViolation::NotInitialized.into()),
            SchedulerState::ShutDown => Err(InvariantViolation::ShutDown.into()),
            _ => Err(InvariantViolation::Faulted.into()),
        }
    }

    fn frame_step(&mut self, frame: &FrameContext) -> Result<FrameOutcome> {
        let s = self.current_slot;
        let slot = *self
            .slots
            .as_ref()
            .ok_or(InvariantViolation::NotInitialized)?
            .get(s);
        let (swapchain, image_count) = {
            let presentation = self.presentation.as_ref().ok_or(InvariantViolation::NotInitialized)?;
            (presentation.chain().handle(), presentation.chain().image_count())
        };

        self.device
            .wait_for_fence(slot.frame_complete, u64::MAX)
            .map_err(PresentError::wait("frame-complete fence"))?;

        self.state = SchedulerState::Acquiring;
        let image_index = match self
            .device
            .acquire_next_image(swapchain, u64::MAX, slot.image_acquired)
        {
            Ok((index, suboptimal)) => {
                if suboptimal {
                    trace!("Acquired image {} from a suboptimal chain.", index);
                }
                index
            }
            Err(err) if ErrorCategory::of_surface_result(err) == ErrorCategory::TransientSurface => {
                warn!("Presentation chain {} at acquire; rebuilding.", err);
                self.state = SchedulerState::StaleSurface;
                return Ok(if self.rebuild()? {
                    FrameOutcome::Rebuilt
                } else {
                    FrameOutcome::WindowClosed
                });
            }
            Err(err) => return Err(PresentError::acquire(err)),
        };
        let image = image_index as usize;
        if image >= image_count {
            return Err(InvariantViolation::ImageIndexOutOfRange {
                index: image_index,
                count: image_count,
            }
            .into());
        }

        // An earlier frame on another slot may still be rendering into this
        // image. Our own fence was waited on above.
        if let Some(fence) = self.images_in_use.get(image) {
            if fence != slot.frame_complete {
                trace!("Image {} still in flight; waiting on its fence.", image);
                self.device
                    .wait_for_fence(fence, u64::MAX)
                    .map_err(PresentError::wait("image-in-use fence"))?;
            }
        }
        self.images_in_use.claim(image, slot.frame_complete);

        self.state = SchedulerState::Recording;
        let target = {
            let presentation = self.presentation.as_ref().ok_or(InvariantViolation::NotInitialized)?;
            RecordTarget {
                image_index,
                slot: s,
                framebuffer: presentation
                    .targets()
                    .framebuffer(image)
                    .ok_or(InvariantViolation::ImageIndexOutOfRange {
                        index: image_index,
                        count: image_count,
                    })?,
                render_pass: presentation.render_pass().handle(),
                extent: presentation.chain().extent(),
                command_buffer: slot.command_buffer,
            }
        };
        let command_buffer = self
            .recorder
            .record(&self.device, &target, frame)
            .map_err(PresentError::Recording)?;
        if command_buffer == vk::CommandBuffer::null() {
            return Err(InvariantViolation::EmptyCommandBuffer { slot: s }.into());
        }

        self.state = SchedulerState::Submitted;
        self.device
            .reset_fence(slot.frame_complete)
            .map_err(PresentError::submit)?;
        self.slot_mut(s)?.armed = false;
        self.device
            .queue_submit(&FrameSubmission {
                command_buffer,
                wait_semaphore: slot.image_acquired,
                wait_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                signal_semaphore: slot.render_finished,
                fence: slot.frame_complete,
            })
            .map_err(PresentError::submit)?;
        self.slot_mut(s)?.armed = true;
        trace!("Submitted slot {} for image {}.", s, image_index);

        self.state = SchedulerState::Presenting;
        let presented = match self
            .device
            .queue_present(swapchain, image_index, slot.render_finished)
        {
            Ok(suboptimal) => {
                self.frames_presented += 1;
                if suboptimal {
                    warn!("Presentation chain suboptimal; rebuilding.");
                } else if self.resize_pending {
                    info!("Surface resized; rebuilding.");
                }
                if !suboptimal && !self.resize_pending {
                    self.current_slot = (s + 1) % self.frames_in_flight;
                    self.state = SchedulerState::Idle {
                        slot: self.current_slot,
                    };
                    trace!("Presented image {} from slot {}.", image_index, s);
                    return Ok(FrameOutcome::Presented {
                        image_index,
                        slot: s,
                        rebuilt: false,
                    });
                }
                true
            }
            Err(err) if ErrorCategory::of_surface_result(err) == ErrorCategory::TransientSurface => {
                warn!("Presentation chain {} at present; rebuilding.", err);
                false
            }
            Err(err) => return Err(PresentError::present(image_index, err)),
        };

        self.state = SchedulerState::StaleSurface;
        if !self.rebuild()? {
            return Ok(FrameOutcome::WindowClosed);
        }
        Ok(if presented {
            FrameOutcome::Presented {
                image_index,
                slot: s,
                rebuilt: true,
            }
        } else {
            FrameOutcome::Rebuilt
        })
    }

    /// Tears down the current presentation, if any, and builds a new one.
    /// Frame slots are untouched and the current slot is kept. Returns
    /// `false`, leaving everything in place, if the window closed while
    /// minimized.
    fn rebuild(&mut self) -> Result<bool> {
        self.state = SchedulerState::Rebuilding;

        let Some(drawable) = self.wait_for_drawable() else {
            info!("Window closed while minimized; presentation left in place.");
            self.state = SchedulerState::Idle {
                slot: self.current_slot,
            };
            return Ok(false);
        };
        self.device
            .device_wait_idle()
            .map_err(PresentError::wait("device idle"))?;

        let replacing = match self.presentation.take() {
            Some(old) => {
                self.recorder.on_presentation_released(&self.device);
                old.destroy(&self.device);
                true
            }
            None => false,
        };

        let presentation = Presentation::build(&self.device, &self.settings, drawable)?;
        if let Err(err) = self.images_in_use.reset(presentation.chain().image_count()) {
            presentation.destroy(&self.device);
            return Err(err);
        }
        let info = presentation.info();
        if let Err(err) = self.recorder.on_presentation_rebuilt(&self.device, &info) {
            presentation.destroy(&self.device);
            return Err(PresentError::DependentRebuild(err));
        }

        self.presentation = Some(presentation);
        self.resize_pending = false;
        if replacing {
            self.rebuild_count += 1;
        }
        self.state = SchedulerState::Idle {
            slot: self.current_slot,
        };
        info!(
            "Presentation {}: {} images at {}x{}, {:?} MSAA.",
            if replacing { "rebuilt" } else { "built" },
            info.image_count,
            info.extent.width,
            info.extent.height,
            info.samples
        );
        Ok(true)
    }

    /// Blocks on window-system events until the drawable has a non-zero area.
    /// `None` if the window is closed first.
    fn wait_for_drawable(&self) -> Option<vk::Extent2D> {
        let mut drawable = self.device.drawable_extent();
        if drawable.width == 0 || drawable.height == 0 {
            info!("Drawable is {}x{}; waiting for the window to be restored.", drawable.width, drawable.height);
        }
        while drawable.width == 0 || drawable.height == 0 {
            if self.device.close_requested() {
                return None;
            }
            self.device.wait_events();
            drawable = self.device.drawable_extent();
        }
        Some(drawable)
    }

    fn slot_mut(&mut self, index: usize) -> Result<&mut crate::sync::FrameSlot> {
        Ok(self
            .slots
            .as_mut()
            .ok_or(InvariantViolation::NotInitialized)?
            .get_mut(index))
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn recorder(&self) -> &R {
        &self.recorder
    }

    pub fn recorder_mut(&mut self) -> &mut R {
        &mut self.recorder
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// The phase the scheduler was in when it faulted.
    pub fn faulted_during(&self) -> Option<SchedulerState> {
        self.fault_phase
    }

    /// Slot the next frame will use.
    pub fn current_slot(&self) -> usize {
        self.current_slot
    }

    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    pub fn is_resize_pending(&self) -> bool {
        self.resize_pending
    }

    /// Number of times a live presentation was replaced. The initial build
    /// does not count.
    pub fn rebuild_count(&self) -> u64 {
        self.rebuild_count
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    pub fn presentation(&self) -> Option<&Presentation> {
        self.presentation.as_ref()
    }

    pub fn chain_info(&self) -> Option<ChainInfo> {
        self.presentation.as_ref().map(Presentation::info)
    }

    pub fn slots(&self) -> Option<&FrameSlots> {
        self.slots.as_ref()
    }

    pub fn images_in_use(&self) -> &ImageInUseTable {
        &self.images_in_use
    }
}

impl<D: PresentationDevice, R: CommandRecorder<D>> Drop for FrameScheduler<D, R> {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            error!("Frame scheduler shutdown during drop failed: {}", err);
        }
    }
}
