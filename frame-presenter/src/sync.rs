//! Per-frame synchronization state.
//!
//! Frame slots and the image-in-use table live in fixed-capacity arrays. Both
//! are created once by the scheduler and survive presentation rebuilds.

use crate::device::PresentationDevice;
use crate::error::{PresentError, Result};
use ash::vk;
use tracing::debug;

/// Upper bound on frames in flight.
pub const MAX_FRAMES_IN_FLIGHT: usize = 4;

/// Upper bound on presentation chain length.
pub const MAX_CHAIN_IMAGES: usize = 16;

/// Synchronization objects and command buffer for one frame in flight.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameSlot {
    /// Signalled by acquire, waited on by the submission.
    pub image_acquired: vk::Semaphore,
    /// Signalled by the submission, waited on by present.
    pub render_finished: vk::Semaphore,
    /// Signalled when this slot's submission completes on the GPU.
    pub frame_complete: vk::Fence,
    pub command_buffer: vk::CommandBuffer,
    /// Whether `frame_complete` is guaranteed to signal eventually. The fence
    /// is created signalled; it is disarmed by a reset and re-armed by a
    /// successful submit.
    pub(crate) armed: bool,
}

impl FrameSlot {
    pub fn is_armed(&self) -> bool {
        self.armed
    }
}

/// The K frame slots, indexed by slot number.
#[derive(Debug)]
pub struct FrameSlots {
    slots: [FrameSlot; MAX_FRAMES_IN_FLIGHT],
    len: usize,
}

impl FrameSlots {
    /// Creates `count` slots. A failure destroys whatever was already created.
    pub fn create<D: PresentationDevice>(device: &D, count: usize) -> Result<Self> {
        if count == 0 || count > MAX_FRAMES_IN_FLIGHT {
            return Err(PresentError::InvalidConfig(format!(
                "cannot create {} frame slots, the limit is {}",
                count, MAX_FRAMES_IN_FLIGHT
            )));
        }

        let command_buffers = device
            .allocate_command_buffers(count as u32)
            .map_err(PresentError::creation("frame command buffers"))?;

        let mut created = Self {
            slots: [FrameSlot::default(); MAX_FRAMES_IN_FLIGHT],
            len: 0,
        };
        for (index, &command_buffer) in command_buffers.iter().enumerate().take(count) {
            match create_slot(device, command_buffer) {
                Ok(slot) => {
                    created.slots[index] = slot;
                    created.len += 1;
                }
                Err(err) => {
                    created.destroy_objects(device);
                    device.free_command_buffers(&command_buffers);
                    return Err(err);
                }
            }
        }

        debug!("Created {} frame slots.", count);
        Ok(created)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, index: usize) -> &FrameSlot {
        &self.as_slice()[index]
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> &mut FrameSlot {
        &mut self.slots[..self.len][index]
    }

    pub fn as_slice(&self) -> &[FrameSlot] {
        &self.slots[..self.len]
    }

    /// Destroys every slot object. The caller must have waited for the GPU.
    pub fn destroy<D: PresentationDevice>(mut self, device: &D) {
        let command_buffers: Vec<_> = self.as_slice().iter().map(|s| s.command_buffer).collect();
        self.destroy_objects(device);
        device.free_command_buffers(&command_buffers);
        debug!("Frame slots destroyed.");
    }

    fn destroy_objects<D: PresentationDevice>(&mut self, device: &D) {
        for slot in &self.slots[..self.len] {
            device.destroy_semaphore(slot.image_acquired);
            device.destroy_semaphore(slot.render_finished);
            device.destroy_fence(slot.frame_complete);
        }
        self.len = 0;
    }
}

fn create_slot<D: PresentationDevice>(device: &D, command_buffer: vk::CommandBuffer) -> Result<FrameSlot> {
    let image_acquired = device
        .create_semaphore()
        .map_err(PresentError::creation("image-acquired semaphore"))?;
    let render_finished = match device.create_semaphore() {
        Ok(semaphore) => semaphore,
        Err(err) => {
            device.destroy_semaphore(image_acquired);
            return Err(PresentError::creation("render-finished semaphore")(err));
        }
    };
    // Signalled so the first wait on each slot returns immediately.
    let frame_complete = match device.create_fence(true) {
        Ok(fence) => fence,
        Err(err) => {
            device.destroy_semaphore(render_finished);
            device.destroy_semaphore(image_acquired);
            return Err(PresentError::creation("frame-complete fence")(err));
        }
    };

    Ok(FrameSlot {
        image_acquired,
        render_finished,
        frame_complete,
        command_buffer,
        armed: true,
    })
}

/// Maps each chain image to the fence of the last slot that targeted it.
#[derive(Debug, Clone)]
pub struct ImageInUseTable {
    entries: [Option<vk::Fence>; MAX_CHAIN_IMAGES],
    len: usize,
}

impl Default for ImageInUseTable {
    fn default() -> Self {
        Self {
            entries: [None; MAX_CHAIN_IMAGES],
            len: 0,
        }
    }
}

impl ImageInUseTable {
    /// Sizes the table for a chain of `image_count` images, all unclaimed.
    pub fn reset(&mut self, image_count: usize) -> Result<()> {
        if image_count > MAX_CHAIN_IMAGES {
            return Err(PresentError::TooManyChainImages {
                count: image_count,
                max: MAX_CHAIN_IMAGES,
            });
        }
        self.entries = [None; MAX_CHAIN_IMAGES];
        self.len = image_count;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Fence guarding image `index`, or `None` if no frame has targeted it.
    pub fn get(&self, index: usize) -> Option<vk::Fence> {
        self.entries[..self.len].get(index).copied().flatten()
    }

    /// Records that `fence` now guards image `index`.
    pub fn claim(&mut self, index: usize, fence: vk::Fence) {
        self.entries[..self.len][index] = Some(fence);
    }
}
