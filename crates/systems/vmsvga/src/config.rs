//! Device configuration, loadable from JSON.

use crate::chip::{SVGA_MAX_HEIGHT, SVGA_MAX_WIDTH};
use crate::SvgaError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Largest VRAM whose byte size fits the 32-bit size registers
pub const MAX_VRAM_SIZE_MB: u32 = u32::MAX >> 20;

fn default_vram_size_mb() -> u32 {
    32
}

fn default_fifo_len() -> usize {
    2 * 1024 * 1024
}

fn default_max_width() -> u32 {
    SVGA_MAX_WIDTH
}

fn default_max_height() -> u32 {
    SVGA_MAX_HEIGHT
}

/// Sizes of the device's memory regions and mode limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceConfig {
    /// VRAM size in MiB
    #[serde(default = "default_vram_size_mb")]
    pub vram_size_mb: u32,
    /// FIFO command buffer size in bytes
    #[serde(default = "default_fifo_len")]
    pub fifo_len: usize,
    #[serde(default = "default_max_width")]
    pub max_width: u32,
    #[serde(default = "default_max_height")]
    pub max_height: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            vram_size_mb: default_vram_size_mb(),
            fifo_len: default_fifo_len(),
            max_width: default_max_width(),
            max_height: default_max_height(),
        }
    }
}

impl DeviceConfig {
    pub fn from_json(json: &str) -> Result<Self, SvgaError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SvgaError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// VRAM size in bytes; meaningful once `validate` has passed
    pub fn vram_len(&self) -> usize {
        self.vram_size_mb as usize * 1024 * 1024
    }

    pub fn validate(&self) -> Result<(), SvgaError> {
        if self.vram_size_mb == 0 {
            return Err(SvgaError::InvalidConfig(
                "vram_size_mb must be non-zero".to_string(),
            ));
        }
        // Region sizes are reported to the guest through 32-bit registers
        if self.vram_size_mb > MAX_VRAM_SIZE_MB {
            return Err(SvgaError::InvalidConfig(format!(
                "vram_size_mb must be at most {}, got {}",
                MAX_VRAM_SIZE_MB, self.vram_size_mb
            )));
        }
        if u32::try_from(self.fifo_len).is_err() {
            return Err(SvgaError::InvalidConfig(format!(
                "fifo_len must fit in 32 bits, got {}",
                self.fifo_len
            )));
        }
        if self.fifo_len <= 32 || self.fifo_len % 4 != 0 {
            return Err(SvgaError::InvalidConfig(format!(
                "fifo_len must be larger than 32 and a multiple of 4, got {}",
                self.fifo_len
            )));
        }
        if self.max_width == 0 || self.max_height == 0 {
            return Err(SvgaError::InvalidConfig(format!(
                "mode limits must be non-zero, got {}x{}",
                self.max_width, self.max_height
            )));
        }
        Ok(())
    }
}
