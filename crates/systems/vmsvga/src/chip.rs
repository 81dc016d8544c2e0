//! Software SVGA II backend.
//!
//! Implements the SVGA register file behind an index/value port pair and
//! scans out the guest's linear framebuffer at the start of VRAM. There is
//! no command processor: SYNC completes immediately and FIFO contents are
//! never interpreted.
//!
//! Guest misprogramming (unsupported depth, mode changes while configured,
//! unknown registers) is logged and ignored.

use crate::backend::{BackendConfig, OutputGeometry, PullError, SvgaBackend};
use crate::registers::*;
use crate::SvgaError;
use vmsvga_core::logging::{log, LogCategory, LogLevel};
use vmsvga_core::MemoryRegion;

/// Largest mode the chip advertises
pub const SVGA_MAX_WIDTH: u32 = 2368;
pub const SVGA_MAX_HEIGHT: u32 = 1770;

/// Smallest usable command buffer in bytes
const MIN_FIFO_LEN: usize = 32;

pub struct SvgaChip {
    framebuffer: MemoryRegion,
    command_buffer: MemoryRegion,
    /// Region sizes as the guest sees them
    framebuffer_size: u32,
    command_buffer_size: u32,

    /// Register selected through the index port
    index: u32,
    /// SVGA_ID_* the guest settled on
    negotiated_version: u32,
    enabled: bool,
    configured: bool,
    busy: bool,
    width: u32,
    height: u32,
    max_width: u32,
    max_height: u32,
    guest_id: u32,
}

impl SvgaChip {
    pub fn new(config: BackendConfig) -> Result<Self, SvgaError> {
        Self::with_limits(config, SVGA_MAX_WIDTH, SVGA_MAX_HEIGHT)
    }

    pub fn with_limits(
        config: BackendConfig,
        max_width: u32,
        max_height: u32,
    ) -> Result<Self, SvgaError> {
        let BackendConfig {
            framebuffer,
            command_buffer,
        } = config;

        if framebuffer.is_empty() {
            return Err(SvgaError::InvalidConfig(format!(
                "framebuffer {} is empty",
                framebuffer.name()
            )));
        }
        if command_buffer.len() <= MIN_FIFO_LEN || command_buffer.len() % 4 != 0 {
            return Err(SvgaError::InvalidConfig(format!(
                "command buffer {} must be larger than {} bytes and a multiple of 4, got {}",
                command_buffer.name(),
                MIN_FIFO_LEN,
                command_buffer.len()
            )));
        }

        let framebuffer_size = region_size(&framebuffer)?;
        let command_buffer_size = region_size(&command_buffer)?;

        // Nothing is configured yet, so the guest cannot be looking at it
        command_buffer.fill(0);

        Ok(Self {
            framebuffer,
            command_buffer,
            framebuffer_size,
            command_buffer_size,
            index: 0,
            negotiated_version: SVGA_ID_2,
            enabled: false,
            configured: false,
            busy: false,
            width: 0,
            height: 0,
            max_width,
            max_height,
            guest_id: 0,
        })
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn configured(&self) -> bool {
        self.configured
    }

    pub fn guest_id(&self) -> u32 {
        self.guest_id
    }

    fn bytes_per_line(&self) -> u32 {
        self.width.saturating_mul(SVGA_BITS_PER_PIXEL / 8)
    }

    pub fn read_reg(&self, reg: u32) -> u32 {
        match reg {
            SVGA_REG_ID => self.negotiated_version,
            SVGA_REG_ENABLE => self.enabled as u32,
            SVGA_REG_WIDTH => self.width,
            SVGA_REG_HEIGHT => self.height,
            SVGA_REG_MAX_WIDTH => self.max_width,
            SVGA_REG_MAX_HEIGHT => self.max_height,
            SVGA_REG_DEPTH => SVGA_DEPTH,
            SVGA_REG_BITS_PER_PIXEL => SVGA_BITS_PER_PIXEL,
            SVGA_REG_PSEUDOCOLOR => 0,
            SVGA_REG_RED_MASK => SVGA_RED_MASK,
            SVGA_REG_GREEN_MASK => SVGA_GREEN_MASK,
            SVGA_REG_BLUE_MASK => SVGA_BLUE_MASK,
            SVGA_REG_BYTES_PER_LINE => self.bytes_per_line(),
            SVGA_REG_FB_START | SVGA_REG_FB_OFFSET => 0,
            SVGA_REG_VRAM_SIZE | SVGA_REG_FB_SIZE => self.framebuffer_size,
            SVGA_REG_CAPABILITIES => 0,
            SVGA_REG_MEM_SIZE => self.command_buffer_size,
            SVGA_REG_CONFIG_DONE => self.configured as u32,
            SVGA_REG_BUSY => self.busy as u32,
            SVGA_REG_GUEST_ID => self.guest_id,
            _ => {
                log(LogCategory::Stubs, LogLevel::Warn, || {
                    format!("unknown register read [{}] -> 0", reg)
                });
                0
            }
        }
    }

    pub fn write_reg(&mut self, reg: u32, val: u32) {
        match reg {
            SVGA_REG_ID => {
                self.negotiated_version = self.negotiated_version.min(val);
            }
            SVGA_REG_ENABLE => {
                self.enabled = val != 0;
                log(LogCategory::Backend, LogLevel::Info, || {
                    format!(
                        "svga {} ({}x{})",
                        if self.enabled { "enabled" } else { "disabled" },
                        self.width,
                        self.height
                    )
                });
            }
            SVGA_REG_WIDTH | SVGA_REG_HEIGHT if self.configured => {
                log(LogCategory::Backend, LogLevel::Error, || {
                    format!("ignoring mode change [{}]={} while configured", reg, val)
                });
            }
            SVGA_REG_WIDTH => self.width = val.min(self.max_width),
            SVGA_REG_HEIGHT => self.height = val.min(self.max_height),
            SVGA_REG_BITS_PER_PIXEL => {
                if val != SVGA_BITS_PER_PIXEL {
                    log(LogCategory::Backend, LogLevel::Error, || {
                        format!("unsupported bits per pixel {}", val)
                    });
                }
            }
            SVGA_REG_CONFIG_DONE => {
                self.configured = val != 0;
            }
            SVGA_REG_SYNC => {
                // No command processor, so the FIFO drains instantly
                self.busy = false;
                log(LogCategory::Stubs, LogLevel::Trace, || {
                    "SYNC: no FIFO processing in software backend".to_string()
                });
            }
            SVGA_REG_GUEST_ID => self.guest_id = val,
            _ => {
                log(LogCategory::Stubs, LogLevel::Warn, || {
                    format!("unknown register write [{}]={}", reg, val)
                });
            }
        }
    }
}

fn region_size(region: &MemoryRegion) -> Result<u32, SvgaError> {
    u32::try_from(region.len()).map_err(|_| {
        SvgaError::InvalidConfig(format!(
            "{} is {} bytes, larger than a 32-bit size register",
            region.name(),
            region.len()
        ))
    })
}

impl SvgaBackend for SvgaChip {
    fn read_register(&mut self, offset: u64) -> u32 {
        match offset {
            SVGA_INDEX_PORT => self.index,
            SVGA_VALUE_PORT => self.read_reg(self.index),
            _ => {
                log(LogCategory::Io, LogLevel::Warn, || {
                    format!("unknown io port read at {:#x}", offset)
                });
                0
            }
        }
    }

    fn write_register(&mut self, offset: u64, value: u32) {
        match offset {
            SVGA_INDEX_PORT => self.index = value,
            SVGA_VALUE_PORT => self.write_reg(self.index, value),
            _ => {
                log(LogCategory::Io, LogLevel::Warn, || {
                    format!("unknown io port write at {:#x}={:08x}", offset, value)
                });
            }
        }
    }

    fn is_legacy_mode(&self) -> bool {
        !self.enabled
    }

    fn output_geometry(&self) -> OutputGeometry {
        OutputGeometry::new(self.width, self.height, self.bytes_per_line())
    }

    fn pull_pixels(&mut self, dst: &mut [u8]) -> Result<(), PullError> {
        if !self.enabled {
            return Err(PullError::NoOutput);
        }

        let expected = self.output_geometry().scanout_len().unwrap_or(usize::MAX);
        if dst.len() != expected {
            log(LogCategory::Backend, LogLevel::Warn, || {
                format!(
                    "output buffer size mismatch: {} vs {} expected",
                    dst.len(),
                    expected
                )
            });
            return Err(PullError::SizeMismatch {
                expected,
                actual: dst.len(),
            });
        }

        self.framebuffer.read(0, dst)?;
        Ok(())
    }

    fn invalidate(&mut self) {
        log(LogCategory::Stubs, LogLevel::Trace, || {
            "invalidate: software backend keeps no frame history".to_string()
        });
    }

    fn name(&self) -> &str {
        "Software SVGA"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chip_with(fb_len: usize, fifo_len: usize) -> Result<SvgaChip, SvgaError> {
        SvgaChip::new(BackendConfig {
            framebuffer: MemoryRegion::new("vram", fb_len),
            command_buffer: MemoryRegion::new("fifo", fifo_len),
        })
    }

    fn chip() -> SvgaChip {
        chip_with(64 * 1024, 4096).unwrap()
    }

    fn write(chip: &mut SvgaChip, reg: u32, val: u32) {
        chip.write_register(SVGA_INDEX_PORT, reg);
        chip.write_register(SVGA_VALUE_PORT, val);
    }

    fn read(chip: &mut SvgaChip, reg: u32) -> u32 {
        chip.write_register(SVGA_INDEX_PORT, reg);
        chip.read_register(SVGA_VALUE_PORT)
    }

    #[test]
    fn test_rejects_bad_config() {
        assert!(matches!(chip_with(0, 4096), Err(SvgaError::InvalidConfig(_))));
        assert!(matches!(chip_with(16, 32), Err(SvgaError::InvalidConfig(_))));
        assert!(matches!(chip_with(16, 66), Err(SvgaError::InvalidConfig(_))));
        assert!(chip_with(16, 36).is_ok());
    }

    #[test]
    fn test_command_buffer_is_zeroed() {
        let fifo = MemoryRegion::new("fifo", 64);
        fifo.fill(0xFF);
        SvgaChip::new(BackendConfig {
            framebuffer: MemoryRegion::new("vram", 16),
            command_buffer: fifo.clone(),
        })
        .unwrap();
        assert!(fifo.with(|bytes| bytes.iter().all(|&b| b == 0)));
    }

    #[test]
    fn test_version_negotiation_takes_minimum() {
        let mut chip = chip();
        assert_eq!(read(&mut chip, SVGA_REG_ID), SVGA_ID_2);
        write(&mut chip, SVGA_REG_ID, SVGA_ID_1);
        assert_eq!(read(&mut chip, SVGA_REG_ID), SVGA_ID_1);
        write(&mut chip, SVGA_REG_ID, SVGA_ID_2);
        assert_eq!(read(&mut chip, SVGA_REG_ID), SVGA_ID_1);
    }

    #[test]
    fn test_mode_programming() {
        let mut chip = chip();
        assert!(chip.is_legacy_mode());

        write(&mut chip, SVGA_REG_WIDTH, 800);
        write(&mut chip, SVGA_REG_HEIGHT, 600);
        write(&mut chip, SVGA_REG_BITS_PER_PIXEL, 32);
        write(&mut chip, SVGA_REG_ENABLE, 1);

        assert!(!chip.is_legacy_mode());
        assert_eq!(chip.output_geometry(), OutputGeometry::new(800, 600, 3200));
        assert_eq!(read(&mut chip, SVGA_REG_BYTES_PER_LINE), 3200);
        assert_eq!(read(&mut chip, SVGA_REG_FB_SIZE), 64 * 1024);
        assert_eq!(read(&mut chip, SVGA_REG_MEM_SIZE), 4096);
    }

    #[test]
    fn test_mode_change_ignored_while_configured() {
        let mut chip = chip();
        write(&mut chip, SVGA_REG_WIDTH, 640);
        write(&mut chip, SVGA_REG_CONFIG_DONE, 1);
        write(&mut chip, SVGA_REG_WIDTH, 1024);
        assert_eq!(read(&mut chip, SVGA_REG_WIDTH), 640);

        write(&mut chip, SVGA_REG_CONFIG_DONE, 0);
        write(&mut chip, SVGA_REG_WIDTH, 1024);
        assert_eq!(read(&mut chip, SVGA_REG_WIDTH), 1024);
    }

    #[test]
    fn test_mode_clamped_to_limits() {
        let mut chip = chip();
        write(&mut chip, SVGA_REG_WIDTH, 100_000);
        assert_eq!(read(&mut chip, SVGA_REG_WIDTH), SVGA_MAX_WIDTH);
    }

    #[test]
    fn test_sync_clears_busy_and_unknown_registers_read_zero() {
        let mut chip = chip();
        write(&mut chip, SVGA_REG_SYNC, 1);
        assert_eq!(read(&mut chip, SVGA_REG_BUSY), 0);
        assert_eq!(read(&mut chip, 0x1234), 0);
        assert_eq!(chip.read_register(0x8), 0);
    }

    #[test]
    fn test_pull_requires_enable_and_exact_length() {
        let mut chip = chip();
        write(&mut chip, SVGA_REG_WIDTH, 4);
        write(&mut chip, SVGA_REG_HEIGHT, 2);

        let mut dst = [0xAAu8; 32];
        assert_eq!(chip.pull_pixels(&mut dst), Err(PullError::NoOutput));

        write(&mut chip, SVGA_REG_ENABLE, 1);
        let mut short = [0xAAu8; 16];
        assert_eq!(
            chip.pull_pixels(&mut short),
            Err(PullError::SizeMismatch {
                expected: 32,
                actual: 16
            })
        );
        assert!(short.iter().all(|&b| b == 0xAA));

        chip.framebuffer.write(0, &[7u8; 32]).unwrap();
        chip.pull_pixels(&mut dst).unwrap();
        assert_eq!(dst, [7u8; 32]);
    }

    #[test]
    fn test_pull_fails_when_framebuffer_too_small() {
        let mut chip = chip_with(16, 64).unwrap();
        write(&mut chip, SVGA_REG_WIDTH, 4);
        write(&mut chip, SVGA_REG_HEIGHT, 2);
        write(&mut chip, SVGA_REG_ENABLE, 1);

        let mut dst = [0x55u8; 32];
        assert!(matches!(
            chip.pull_pixels(&mut dst),
            Err(PullError::Memory(_))
        ));
        assert!(dst.iter().all(|&b| b == 0x55));
    }
}
