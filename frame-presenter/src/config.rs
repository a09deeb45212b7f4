//! Presenter configuration.
//!
//! Configuration is read from TOML. Every field has a default, so an empty
//! file (or no file at all) yields a working setup: two frames in flight, an
//! sRGB BGRA surface, mailbox presentation falling back to FIFO, and 4x MSAA
//! lowered to whatever the device supports.
//!
//! ```toml
//! max_frames_in_flight = 3
//! present_modes = ["MAILBOX", "FIFO"]
//! sample_count = 8
//!
//! [[surface_formats]]
//! format = "B8G8R8A8_SRGB"
//! color_space = "SRGB_NONLINEAR"
//!
//! [logging]
//! filter = "frame_presenter=debug"
//! ```

use crate::error::{PresentError, Result};
use crate::sync::MAX_FRAMES_IN_FLIGHT;
use ash::vk;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ColorFormat {
    B8g8r8a8Srgb,
    B8g8r8a8Unorm,
    R8g8b8a8Srgb,
    R8g8b8a8Unorm,
    A2b10g10r10UnormPack32,
    R16g16b16a16Sfloat,
}

impl From<ColorFormat> for vk::Format {
    fn from(format: ColorFormat) -> Self {
        match format {
            ColorFormat::B8g8r8a8Srgb => vk::Format::B8G8R8A8_SRGB,
            ColorFormat::B8g8r8a8Unorm => vk::Format::B8G8R8A8_UNORM,
            ColorFormat::R8g8b8a8Srgb => vk::Format::R8G8B8A8_SRGB,
            ColorFormat::R8g8b8a8Unorm => vk::Format::R8G8B8A8_UNORM,
            ColorFormat::A2b10g10r10UnormPack32 => vk::Format::A2B10G10R10_UNORM_PACK32,
            ColorFormat::R16g16b16a16Sfloat => vk::Format::R16G16B16A16_SFLOAT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ColorSpace {
    SrgbNonlinear,
    ExtendedSrgbLinear,
    Hdr10St2084,
}

impl From<ColorSpace> for vk::ColorSpaceKHR {
    fn from(space: ColorSpace) -> Self {
        match space {
            ColorSpace::SrgbNonlinear => vk::ColorSpaceKHR::SRGB_NONLINEAR,
            ColorSpace::ExtendedSrgbLinear => vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
            ColorSpace::Hdr10St2084 => vk::ColorSpaceKHR::HDR10_ST2084_EXT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceFormatPreference {
    pub format: ColorFormat,
    pub color_space: ColorSpace,
}

impl From<SurfaceFormatPreference> for vk::SurfaceFormatKHR {
    fn from(pref: SurfaceFormatPreference) -> Self {
        vk::SurfaceFormatKHR {
            format: pref.format.into(),
            color_space: pref.color_space.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PresentMode {
    Immediate,
    Mailbox,
    Fifo,
    FifoRelaxed,
}

impl From<PresentMode> for vk::PresentModeKHR {
    fn from(mode: PresentMode) -> Self {
        match mode {
            PresentMode::Immediate => vk::PresentModeKHR::IMMEDIATE,
            PresentMode::Mailbox => vk::PresentModeKHR::MAILBOX,
            PresentMode::Fifo => vk::PresentModeKHR::FIFO,
            PresentMode::FifoRelaxed => vk::PresentModeKHR::FIFO_RELAXED,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DepthFormat {
    D32Sfloat,
    D32SfloatS8Uint,
    D24UnormS8Uint,
    D16Unorm,
}

impl From<DepthFormat> for vk::Format {
    fn from(format: DepthFormat) -> Self {
        match format {
            DepthFormat::D32Sfloat => vk::Format::D32_SFLOAT,
            DepthFormat::D32SfloatS8Uint => vk::Format::D32_SFLOAT_S8_UINT,
            DepthFormat::D24UnormS8Uint => vk::Format::D24_UNORM_S8_UINT,
            DepthFormat::D16Unorm => vk::Format::D16_UNORM,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing-subscriber` filter directive. `RUST_LOG` takes precedence.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "frame-presenter".to_string(),
            width: 1280,
            height: 720,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceConfig {
    pub application_name: String,
    /// Enables `VK_LAYER_KHRONOS_validation` and the debug messenger.
    pub validation: bool,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            application_name: "frame-presenter".to_string(),
            validation: cfg!(debug_assertions),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenterConfig {
    /// Number of frame slots (K). Bounds the GPU work outstanding at once.
    pub max_frames_in_flight: usize,
    /// Surface formats in order of preference. The first supported format is
    /// used when none of these match.
    pub surface_formats: Vec<SurfaceFormatPreference>,
    /// Present modes in order of preference. FIFO is used when none match.
    pub present_modes: Vec<PresentMode>,
    /// Requested MSAA sample count; lowered to the device maximum.
    pub sample_count: u32,
    /// Depth formats in order of preference.
    pub depth_formats: Vec<DepthFormat>,
    pub logging: LoggingConfig,
    pub window: WindowConfig,
    pub instance: InstanceConfig,
}

impl Default for PresenterConfig {
    fn default() -> Self {
        Self {
            max_frames_in_flight: 2,
            surface_formats: vec![SurfaceFormatPreference {
                format: ColorFormat::B8g8r8a8Srgb,
                color_space: ColorSpace::SrgbNonlinear,
            }],
            present_modes: vec![PresentMode::Mailbox],
            sample_count: 4,
            depth_formats: vec![
                DepthFormat::D32Sfloat,
                DepthFormat::D32SfloatS8Uint,
                DepthFormat::D24UnormS8Uint,
            ],
            logging: LoggingConfig::default(),
            window: WindowConfig::default(),
            instance: InstanceConfig::default(),
        }
    }
}

impl PresenterConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path).map_err(|source| PresentError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    /// Loads `path` if it exists, otherwise returns the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            tracing::info!("No configuration at {:?}, using defaults.", path);
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_frames_in_flight == 0 || self.max_frames_in_flight > MAX_FRAMES_IN_FLIGHT {
            return Err(PresentError::InvalidConfig(format!(
                "max_frames_in_flight must be between 1 and {}, got {}",
                MAX_FRAMES_IN_FLIGHT, self.max_frames_in_flight
            )));
        }
        if !self.sample_count.is_power_of_two() || self.sample_count > 64 {
            return Err(PresentError::InvalidConfig(format!(
                "sample_count must be a power of two no larger than 64, got {}",
                self.sample_count
            )));
        }
        if self.depth_formats.is_empty() {
            return Err(PresentError::InvalidConfig(
                "depth_formats must name at least one candidate".to_string(),
            ));
        }
        Ok(())
    }

    pub fn surface_format_preferences(&self) -> Vec<vk::SurfaceFormatKHR> {
        self.surface_formats.iter().map(|&pref| pref.into()).collect()
    }

    pub fn present_mode_preferences(&self) -> Vec<vk::PresentModeKHR> {
        self.present_modes.iter().map(|&mode| mode.into()).collect()
    }

    pub fn depth_format_candidates(&self) -> Vec<vk::Format> {
        self.depth_formats.iter().map(|&format| format.into()).collect()
    }

    /// Sample counts map one to one onto the raw flag values.
    pub fn sample_count_flags(&self) -> vk::SampleCountFlags {
        vk::SampleCountFlags::from_raw(self.sample_count)
    }
}
