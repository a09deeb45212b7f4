//! Instrumented in-memory device shared by the integration tests.
//!
//! The mock models an in-order GPU queue: a submission completes only when a
//! fence it signals is waited on, or when the device is waited idle. Every
//! call that would be undefined behaviour on a real device is recorded as a
//! violation instead.
#![allow(dead_code)]

use ash::prelude::VkResult;
use ash::vk::{self, Handle};
use frame_presenter::device::{
    AttachmentDesc, AttachmentImage, FrameSubmission, PresentationDevice, QueueFamilyIndices, SurfaceSupport,
    SwapchainDesc,
};
use frame_presenter::render_pass::RenderPassLayout;
use frame_presenter::{ChainInfo, CommandRecorder, FrameContext, PresenterConfig, RecordTarget};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};

pub const BGRA_SRGB: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_SRGB,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

pub const RGBA_UNORM: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::R8G8B8A8_UNORM,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

pub fn extent(width: u32, height: u32) -> vk::Extent2D {
    vk::Extent2D { width, height }
}

pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("frame_presenter=debug")
        .with_test_writer()
        .try_init();
}

/// Config with `frames` slots and otherwise default settings.
pub fn config(frames: usize) -> PresenterConfig {
    PresenterConfig {
        max_frames_in_flight: frames,
        ..PresenterConfig::default()
    }
}

/// One scripted result for `acquire_next_image`.
#[derive(Debug, Clone, Copy)]
pub enum Acquire {
    Image(u32),
    Suboptimal(u32),
    Fail(vk::Result),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    WaitFence(vk::Fence),
    WaitIdle,
    ResetFence(vk::Fence),
    Acquire(u32),
    Record { image: u32, slot: usize },
    Submit { fence: vk::Fence },
    Present(u32),
    CreateSwapchain,
    Destroy(&'static str),
    WaitEvents,
}

#[derive(Debug)]
struct Submission {
    fence: vk::Fence,
    image: Option<(vk::SwapchainKHR, u32)>,
}

#[derive(Debug)]
struct MockState {
    next_handle: u64,
    live: HashMap<u64, &'static str>,

    support: SurfaceSupport,
    queues: QueueFamilyIndices,
    drawable: vk::Extent2D,
    drawable_script: VecDeque<vk::Extent2D>,
    close_on_wait: bool,
    close_requested: bool,
    depth_support: Vec<vk::Format>,
    sample_counts: vk::SampleCountFlags,
    forced_image_count: Option<usize>,

    swapchains: HashMap<u64, Vec<vk::Image>>,
    swapchain_descs: Vec<SwapchainDesc>,
    framebuffer_attachments: Vec<usize>,
    acquire_cursor: u32,
    acquire_script: VecDeque<Acquire>,
    present_script: VecDeque<VkResult<bool>>,
    last_swapchain: vk::SwapchainKHR,
    recorded_for: HashMap<u64, (vk::SwapchainKHR, u32)>,

    signaled: HashMap<u64, bool>,
    pending: VecDeque<Submission>,
    max_outstanding: usize,
    submissions: usize,

    fail_submit: Option<vk::Result>,
    fail_swapchain: Option<vk::Result>,
    fail_framebuffer_at: Option<usize>,
    framebuffers_created: usize,

    events: Vec<Event>,
    violations: Vec<String>,
}

pub struct MockDevice {
    state: RefCell<MockState>,
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDevice {
    /// A surface with 2..=4 images that leaves the extent to the application,
    /// an 800x600 drawable, one shared queue family and up to 8x MSAA.
    pub fn new() -> Self {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 4,
            current_extent: extent(u32::MAX, u32::MAX),
            min_image_extent: extent(1, 1),
            max_image_extent: extent(8192, 8192),
            max_image_array_layers: 1,
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            ..Default::default()
        };
        Self {
            state: RefCell::new(MockState {
                next_handle: 0x1000,
                live: HashMap::new(),
                support: SurfaceSupport {
                    capabilities,
                    formats: vec![RGBA_UNORM, BGRA_SRGB],
                    present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
                },
                queues: QueueFamilyIndices {
                    graphics_family: 0,
                    present_family: 0,
                },
                drawable: extent(800, 600),
                drawable_script: VecDeque::new(),
                close_on_wait: false,
                close_requested: false,
                depth_support: vec![vk::Format::D32_SFLOAT, vk::Format::D24_UNORM_S8_UINT],
                sample_counts: vk::SampleCountFlags::TYPE_1
                    | vk::SampleCountFlags::TYPE_2
                    | vk::SampleCountFlags::TYPE_4
                    | vk::SampleCountFlags::TYPE_8,
                forced_image_count: None,
                swapchains: HashMap::new(),
                swapchain_descs: Vec::new(),
                framebuffer_attachments: Vec::new(),
                acquire_cursor: 0,
                acquire_script: VecDeque::new(),
                present_script: VecDeque::new(),
                last_swapchain: vk::SwapchainKHR::null(),
                recorded_for: HashMap::new(),
                signaled: HashMap::new(),
                pending: VecDeque::new(),
                max_outstanding: 0,
                submissions: 0,
                fail_submit: None,
                fail_swapchain: None,
                fail_framebuffer_at: None,
                framebuffers_created: 0,
                events: Vec::new(),
                violations: Vec::new(),
            }),
        }
    }

    // Configuration.

    pub fn with_image_counts(self, min: u32, max: u32) -> Self {
        {
            let mut state = self.state.borrow_mut();
            state.support.capabilities.min_image_count = min;
            state.support.capabilities.max_image_count = max;
        }
        self
    }

    pub fn with_queues(self, graphics_family: u32, present_family: u32) -> Self {
        self.state.borrow_mut().queues = QueueFamilyIndices {
            graphics_family,
            present_family,
        };
        self
    }

    pub fn with_sample_counts(self, counts: vk::SampleCountFlags) -> Self {
        self.state.borrow_mut().sample_counts = counts;
        self
    }

    pub fn with_depth_support(self, formats: Vec<vk::Format>) -> Self {
        self.state.borrow_mut().depth_support = formats;
        self
    }

    pub fn with_forced_image_count(self, count: usize) -> Self {
        self.state.borrow_mut().forced_image_count = Some(count);
        self
    }

    pub fn with_formats(self, formats: Vec<vk::SurfaceFormatKHR>) -> Self {
        self.state.borrow_mut().support.formats = formats;
        self
    }

    pub fn set_drawable(&self, drawable: vk::Extent2D) {
        self.state.borrow_mut().drawable = drawable;
    }

    /// Each `wait_events` call moves the drawable to the next scripted size.
    pub fn script_drawables(&self, sizes: impl IntoIterator<Item = vk::Extent2D>) {
        self.state.borrow_mut().drawable_script.extend(sizes);
    }

    /// The next `wait_events` delivers a close request instead of a resize.
    pub fn close_on_next_wait(&self) {
        self.state.borrow_mut().close_on_wait = true;
    }

    pub fn script_acquire(&self, steps: impl IntoIterator<Item = Acquire>) {
        self.state.borrow_mut().acquire_script.extend(steps);
    }

    pub fn script_present(&self, results: impl IntoIterator<Item = VkResult<bool>>) {
        self.state.borrow_mut().present_script.extend(results);
    }

    pub fn fail_next_submit(&self, result: vk::Result) {
        self.state.borrow_mut().fail_submit = Some(result);
    }

    pub fn fail_next_swapchain(&self, result: vk::Result) {
        self.state.borrow_mut().fail_swapchain = Some(result);
    }

    /// Fails the `n`th framebuffer creation from now, counting from zero.
    pub fn fail_framebuffer_at(&self, n: usize) {
        let mut state = self.state.borrow_mut();
        state.fail_framebuffer_at = Some(state.framebuffers_created + n);
    }

    // Observations.

    /// Called by recorders: image `image` of the current chain is about to be
    /// written by `command_buffer`.
    pub fn note_recording(&self, command_buffer: vk::CommandBuffer, image: u32, slot: usize) {
        let mut state = self.state.borrow_mut();
        let target = (state.last_swapchain, image);
        if state.pending.iter().any(|s| s.image == Some(target)) {
            state
                .violations
                .push(format!("recorded image {image} while an earlier submission for it is pending"));
        }
        state.recorded_for.insert(command_buffer.as_raw(), target);
        state.events.push(Event::Record { image, slot });
    }

    pub fn violations(&self) -> Vec<String> {
        self.state.borrow().violations.clone()
    }

    pub fn live_handles(&self) -> Vec<&'static str> {
        self.state.borrow().live.values().copied().collect()
    }

    pub fn max_outstanding(&self) -> usize {
        self.state.borrow().max_outstanding
    }

    pub fn outstanding(&self) -> usize {
        self.state.borrow().pending.len()
    }

    pub fn submissions(&self) -> usize {
        self.state.borrow().submissions
    }

    pub fn swapchain_descs(&self) -> Vec<SwapchainDesc> {
        self.state.borrow().swapchain_descs.clone()
    }

    pub fn framebuffer_attachment_counts(&self) -> Vec<usize> {
        self.state.borrow().framebuffer_attachments.clone()
    }

    pub fn events(&self) -> Vec<Event> {
        self.state.borrow().events.clone()
    }

    pub fn wait_events_calls(&self) -> usize {
        self.state
            .borrow()
            .events
            .iter()
            .filter(|e| **e == Event::WaitEvents)
            .count()
    }

    pub fn presented(&self) -> Vec<u32> {
        self.state
            .borrow()
            .events
            .iter()
            .filter_map(|e| match e {
                Event::Present(i) => Some(*i),
                _ => None,
            })
            .collect()
    }
}

impl MockState {
    fn create<T: Handle>(&mut self, kind: &'static str) -> T {
        let raw = self.next_handle;
        self.next_handle += 1;
        self.live.insert(raw, kind);
        T::from_raw(raw)
    }

    fn destroy<T: Handle>(&mut self, handle: T, kind: &'static str) {
        let raw = handle.as_raw();
        if self.live.remove(&raw).is_none() {
            self.violations.push(format!("destroyed unknown or already destroyed {kind} {raw:#x}"));
        }
        if !self.pending.is_empty() {
            self.violations
                .push(format!("destroyed {kind} while {} submissions are pending", self.pending.len()));
        }
        self.events.push(Event::Destroy(kind));
    }

    /// Completes every submission up to and including the last one that
    /// signals `fence`. Returns false if no pending submission signals it.
    fn retire_through(&mut self, fence: vk::Fence) -> bool {
        let Some(position) = self.pending.iter().rposition(|s| s.fence == fence) else {
            return false;
        };
        for submission in self.pending.drain(..=position) {
            self.signaled.insert(submission.fence.as_raw(), true);
        }
        true
    }

    fn retire_all(&mut self) {
        for submission in self.pending.drain(..) {
            self.signaled.insert(submission.fence.as_raw(), true);
        }
    }
}

impl PresentationDevice for MockDevice {
    fn surface_support(&self) -> VkResult<SurfaceSupport> {
        Ok(self.state.borrow().support.clone())
    }

    fn queue_families(&self) -> QueueFamilyIndices {
        self.state.borrow().queues
    }

    fn drawable_extent(&self) -> vk::Extent2D {
        self.state.borrow().drawable
    }

    fn wait_events(&self) {
        let mut state = self.state.borrow_mut();
        state.events.push(Event::WaitEvents);
        if state.close_on_wait {
            state.close_requested = true;
            return;
        }
        match state.drawable_script.pop_front() {
            Some(next) => state.drawable = next,
            None => panic!("wait_events called with no scripted window event left"),
        }
    }

    fn close_requested(&self) -> bool {
        self.state.borrow().close_requested
    }

    fn format_properties(&self, format: vk::Format) -> vk::FormatProperties {
        let supported = self.state.borrow().depth_support.contains(&format);
        vk::FormatProperties {
            optimal_tiling_features: if supported {
                vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT
            } else {
                vk::FormatFeatureFlags::empty()
            },
            ..Default::default()
        }
    }

    fn framebuffer_sample_counts(&self) -> vk::SampleCountFlags {
        self.state.borrow().sample_counts
    }

    fn device_wait_idle(&self) -> VkResult<()> {
        let mut state = self.state.borrow_mut();
        state.retire_all();
        state.events.push(Event::WaitIdle);
        Ok(())
    }

    fn create_swapchain(&self, desc: &SwapchainDesc) -> VkResult<vk::SwapchainKHR> {
        let mut state = self.state.borrow_mut();
        state.swapchain_descs.push(desc.clone());
        if let Some(err) = state.fail_swapchain.take() {
            return Err(err);
        }
        let count = state.forced_image_count.unwrap_or(desc.image_count as usize);
        let swapchain: vk::SwapchainKHR = state.create("swapchain");
        let images: Vec<vk::Image> = (0..count)
            .map(|_| {
                let raw = state.next_handle;
                state.next_handle += 1;
                vk::Image::from_raw(raw)
            })
            .collect();
        state.swapchains.insert(swapchain.as_raw(), images);
        state.last_swapchain = swapchain;
        state.acquire_cursor = 0;
        state.events.push(Event::CreateSwapchain);
        Ok(swapchain)
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        self.state
            .borrow()
            .swapchains
            .get(&swapchain.as_raw())
            .cloned()
            .ok_or(vk::Result::ERROR_SURFACE_LOST_KHR)
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        let mut state = self.state.borrow_mut();
        state.swapchains.remove(&swapchain.as_raw());
        state.destroy(swapchain, "swapchain");
    }

    fn create_image_view(
        &self,
        _image: vk::Image,
        _format: vk::Format,
        _aspect: vk::ImageAspectFlags,
    ) -> VkResult<vk::ImageView> {
        Ok(self.state.borrow_mut().create("image view"))
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        self.state.borrow_mut().destroy(view, "image view");
    }

    fn create_attachment(&self, desc: &AttachmentDesc) -> VkResult<AttachmentImage> {
        let mut state = self.state.borrow_mut();
        Ok(AttachmentImage {
            image: state.create("attachment image"),
            view: state.create("attachment view"),
            format: desc.format,
            samples: desc.samples,
            extent: desc.extent,
        })
    }

    fn destroy_attachment(&self, attachment: &AttachmentImage) {
        let mut state = self.state.borrow_mut();
        state.destroy(attachment.view, "attachment view");
        state.destroy(attachment.image, "attachment image");
    }

    fn create_render_pass(&self, _layout: &RenderPassLayout) -> VkResult<vk::RenderPass> {
        Ok(self.state.borrow_mut().create("render pass"))
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        self.state.borrow_mut().destroy(render_pass, "render pass");
    }

    fn create_framebuffer(
        &self,
        _render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        _extent: vk::Extent2D,
    ) -> VkResult<vk::Framebuffer> {
        let mut state = self.state.borrow_mut();
        let index = state.framebuffers_created;
        state.framebuffers_created += 1;
        if state.fail_framebuffer_at == Some(index) {
            state.fail_framebuffer_at = None;
            return Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        }
        state.framebuffer_attachments.push(attachments.len());
        Ok(state.create("framebuffer"))
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        self.state.borrow_mut().destroy(framebuffer, "framebuffer");
    }

    fn create_semaphore(&self) -> VkResult<vk::Semaphore> {
        Ok(self.state.borrow_mut().create("semaphore"))
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        self.state.borrow_mut().destroy(semaphore, "semaphore");
    }

    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence> {
        let mut state = self.state.borrow_mut();
        let fence: vk::Fence = state.create("fence");
        state.signaled.insert(fence.as_raw(), signaled);
        Ok(fence)
    }

    fn wait_for_fence(&self, fence: vk::Fence, _timeout: u64) -> VkResult<()> {
        let mut state = self.state.borrow_mut();
        state.events.push(Event::WaitFence(fence));
        if state.signaled.get(&fence.as_raw()).copied().unwrap_or(false) || state.retire_through(fence) {
            Ok(())
        } else {
            state
                .violations
                .push(format!("waited on fence {:#x} that will never signal", fence.as_raw()));
            Err(vk::Result::TIMEOUT)
        }
    }

    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()> {
        let mut state = self.state.borrow_mut();
        if state.pending.iter().any(|s| s.fence == fence) {
            state
                .violations
                .push(format!("reset fence {:#x} while its submission is pending", fence.as_raw()));
        }
        state.signaled.insert(fence.as_raw(), false);
        state.events.push(Event::ResetFence(fence));
        Ok(())
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        let mut state = self.state.borrow_mut();
        state.signaled.remove(&fence.as_raw());
        state.destroy(fence, "fence");
    }

    fn allocate_command_buffers(&self, count: u32) -> VkResult<Vec<vk::CommandBuffer>> {
        let mut state = self.state.borrow_mut();
        Ok((0..count).map(|_| state.create("command buffer")).collect())
    }

    fn free_command_buffers(&self, command_buffers: &[vk::CommandBuffer]) {
        let mut state = self.state.borrow_mut();
        for &command_buffer in command_buffers {
            state.destroy(command_buffer, "command buffer");
        }
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        _timeout: u64,
        _semaphore: vk::Semaphore,
    ) -> VkResult<(u32, bool)> {
        let mut state = self.state.borrow_mut();
        let count = state.swapchains.get(&swapchain.as_raw()).map_or(0, Vec::len) as u32;
        let result = match state.acquire_script.pop_front() {
            Some(Acquire::Image(index)) => Ok((index, false)),
            Some(Acquire::Suboptimal(index)) => Ok((index, true)),
            Some(Acquire::Fail(err)) => Err(err),
            None => {
                let index = state.acquire_cursor % count.max(1);
                state.acquire_cursor += 1;
                Ok((index, false))
            }
        };
        if let Ok((index, _)) = result {
            state.events.push(Event::Acquire(index));
        }
        result
    }

    fn queue_submit(&self, submission: &FrameSubmission) -> VkResult<()> {
        let mut state = self.state.borrow_mut();
        if let Some(err) = state.fail_submit.take() {
            return Err(err);
        }
        if state.signaled.get(&submission.fence.as_raw()).copied().unwrap_or(true) {
            state.violations.push("submitted with a signalled fence".to_string());
        }
        let image = state.recorded_for.get(&submission.command_buffer.as_raw()).copied();
        state.pending.push_back(Submission {
            fence: submission.fence,
            image,
        });
        state.submissions += 1;
        state.max_outstanding = state.max_outstanding.max(state.pending.len());
        state.events.push(Event::Submit {
            fence: submission.fence,
        });
        Ok(())
    }

    fn queue_present(
        &self,
        _swapchain: vk::SwapchainKHR,
        image_index: u32,
        _wait_semaphore: vk::Semaphore,
    ) -> VkResult<bool> {
        let mut state = self.state.borrow_mut();
        let result = state.present_script.pop_front().unwrap_or(Ok(false));
        if result.is_ok() {
            state.events.push(Event::Present(image_index));
        }
        result
    }
}

/// Recorder that notes every call and hands back the slot's buffer.
#[derive(Debug, Default)]
pub struct MockRecorder {
    pub targets: Vec<RecordTarget>,
    pub rebuilt: Vec<ChainInfo>,
    pub released: usize,
    pub return_null: bool,
    pub fail_next_rebuild: bool,
}

impl CommandRecorder<MockDevice> for MockRecorder {
    fn record(
        &mut self,
        device: &MockDevice,
        target: &RecordTarget,
        _frame: &FrameContext,
    ) -> anyhow::Result<vk::CommandBuffer> {
        device.note_recording(target.command_buffer, target.image_index, target.slot);
        self.targets.push(*target);
        if self.return_null {
            Ok(vk::CommandBuffer::null())
        } else {
            Ok(target.command_buffer)
        }
    }

    fn on_presentation_rebuilt(&mut self, _device: &MockDevice, info: &ChainInfo) -> anyhow::Result<()> {
        if std::mem::take(&mut self.fail_next_rebuild) {
            anyhow::bail!("pipeline creation failed");
        }
        self.rebuilt.push(*info);
        Ok(())
    }

    fn on_presentation_released(&mut self, _device: &MockDevice) {
        self.released += 1;
    }
}

pub type Scheduler = frame_presenter::FrameScheduler<MockDevice, MockRecorder>;

/// An initialized scheduler with `frames` slots over `device`.
pub fn ready(device: MockDevice, frames: usize) -> Scheduler {
    init_logging();
    let mut scheduler = Scheduler::new(device, MockRecorder::default(), &config(frames)).unwrap();
    scheduler.initialize().unwrap();
    scheduler
}

/// Renders `count` frames, failing the test on any error.
pub fn run(scheduler: &mut Scheduler, count: usize) -> Vec<frame_presenter::FrameOutcome> {
    let mut frame = FrameContext::new();
    (0..count)
        .map(|_| {
            frame.tick_with(std::time::Duration::from_millis(16));
            scheduler.render_one_frame(&frame).unwrap()
        })
        .collect()
}
