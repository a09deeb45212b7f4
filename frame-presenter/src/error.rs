//! Error types for the presentation core.
//!
//! Every failure the scheduler can surface is a [`PresentError`]. Callers that
//! need to decide whether to exit, reinitialize, or fix a bug should branch on
//! [`PresentError::category`] rather than on individual variants.

use ash::vk;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// A specialized `Result` type for presentation operations.
pub type Result<T> = std::result::Result<T, PresentError>;

/// Broad classes of failure, ordered by how the application should react.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Out-of-date or suboptimal surface. Handled internally by a rebuild and
    /// never returned from a frame.
    TransientSurface,
    /// Creating the chain, render targets, sync objects or dependent
    /// pipelines failed.
    ResourceCreation,
    /// Acquire, submit, present or a completion wait failed for a reason other
    /// than surface staleness. Includes device loss.
    Submission,
    /// The caller broke the scheduler's usage contract.
    Invariant,
}

impl ErrorCategory {
    /// Classifies a raw Vulkan status returned by acquire or present.
    pub fn of_surface_result(result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_OUT_OF_DATE_KHR | vk::Result::SUBOPTIMAL_KHR => Self::TransientSurface,
            _ => Self::Submission,
        }
    }
}

/// Usage-contract violations. These indicate a bug in the calling code.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum InvariantViolation {
    #[error("a frame was requested before initialize()")]
    NotInitialized,
    #[error("initialize() was called on an already initialized scheduler")]
    AlreadyInitialized,
    #[error("the scheduler was used after shutdown()")]
    ShutDown,
    #[error("the scheduler was used after a fatal error")]
    Faulted,
    #[error("the command recorder returned an empty command buffer for frame slot {slot}")]
    EmptyCommandBuffer { slot: usize },
    #[error("acquire returned image index {index} but the chain only has {count} images")]
    ImageIndexOutOfRange { index: u32, count: usize },
}

/// The error type for presentation operations.
#[derive(Debug, Error)]
pub enum PresentError {
    #[error("failed to create {what}: {source}")]
    ResourceCreation {
        what: &'static str,
        #[source]
        source: vk::Result,
    },

    #[error("the surface reports no supported formats")]
    NoSurfaceFormats,

    #[error("none of the depth format candidates {0:?} support optimal-tiling depth attachments")]
    NoDepthFormat(Vec<vk::Format>),

    #[error("the presentation chain has {count} images, more than the supported {max}")]
    TooManyChainImages { count: usize, max: usize },

    #[error("the window was closed before a presentation could be built")]
    WindowClosed,

    #[error("chain-dependent objects could not be rebuilt: {0:#}")]
    DependentRebuild(#[source] anyhow::Error),

    #[error("failed to acquire the next chain image: {0}")]
    Acquire(#[source] vk::Result),

    #[error("failed to submit frame commands: {0}")]
    Submit(#[source] vk::Result),

    #[error("failed to present chain image {image_index}: {source}")]
    Present {
        image_index: u32,
        #[source]
        source: vk::Result,
    },

    #[error("failed waiting on {what}: {source}")]
    Wait {
        what: &'static str,
        #[source]
        source: vk::Result,
    },

    #[error("the device was lost during {0}")]
    DeviceLost(&'static str),

    #[error("command recording failed: {0:#}")]
    Recording(#[source] anyhow::Error),

    #[error(transparent)]
    Invariant(#[from] InvariantViolation),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("failed to read configuration file {path:?}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl PresentError {
    pub(crate) fn creation(what: &'static str) -> impl FnOnce(vk::Result) -> Self {
        move |source| Self::ResourceCreation { what, source }
    }

    pub(crate) fn acquire(result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_DEVICE_LOST => Self::DeviceLost("image acquisition"),
            other => Self::Acquire(other),
        }
    }

    pub(crate) fn submit(result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_DEVICE_LOST => Self::DeviceLost("queue submission"),
            other => Self::Submit(other),
        }
    }

    pub(crate) fn present(image_index: u32, result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_DEVICE_LOST => Self::DeviceLost("presentation"),
            source => Self::Present { image_index, source },
        }
    }

    pub(crate) fn wait(what: &'static str) -> impl FnOnce(vk::Result) -> Self {
        move |source| match source {
            vk::Result::ERROR_DEVICE_LOST => Self::DeviceLost(what),
            source => Self::Wait { what, source },
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ResourceCreation { .. }
            | Self::NoSurfaceFormats
            | Self::NoDepthFormat(_)
            | Self::TooManyChainImages { .. }
            | Self::WindowClosed
            | Self::DependentRebuild(_) => ErrorCategory::ResourceCreation,
            Self::Acquire(_)
            | Self::Submit(_)
            | Self::Present { .. }
            | Self::Wait { .. }
            | Self::DeviceLost(_)
            | Self::Recording(_) => ErrorCategory::Submission,
            Self::Invariant(_) | Self::InvalidConfig(_) | Self::ConfigParse(_) | Self::ConfigIo { .. } => {
                ErrorCategory::Invariant
            }
        }
    }

    /// Returns the contract violation, if this error is one.
    pub fn invariant(&self) -> Option<InvariantViolation> {
        match self {
            Self::Invariant(violation) => Some(*violation),
            _ => None,
        }
    }
}
