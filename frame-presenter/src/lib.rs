//! Frame presentation scheduling and swapchain lifecycle management on Vulkan.
//!
//! The [`FrameScheduler`] drives the acquire, record, submit and present loop
//! against any [`PresentationDevice`], bounds the GPU work in flight, and
//! rebuilds the presentation chain with its render targets whenever the
//! surface goes stale. [`AshDevice`] is the production device; with the
//! `window` feature, [`WinitSurface`] provides the window it presents to.

pub mod backend;
pub mod config;
pub mod device;
pub mod error;
pub mod frame_context;
pub mod logging;
pub mod presentation;
pub mod render_pass;
pub mod render_targets;
pub mod scheduler;
pub mod swapchain;
pub mod sync;
#[cfg(feature = "window")]
pub mod window;

pub use backend::AshDevice;
pub use config::PresenterConfig;
pub use device::{PresentationDevice, WindowSurface};
pub use error::{ErrorCategory, InvariantViolation, PresentError, Result};
pub use frame_context::FrameContext;
pub use presentation::ChainInfo;
pub use scheduler::{CommandRecorder, FrameOutcome, FrameScheduler, RecordTarget, SchedulerState};
pub use sync::{MAX_CHAIN_IMAGES, MAX_FRAMES_IN_FLIGHT};
#[cfg(feature = "window")]
pub use window::{WindowSignals, WinitSurface};
