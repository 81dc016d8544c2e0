//! VMware SVGA II compatible display adapter with a pluggable rendering backend
//!
//! The adapter has two rendering paths. While the guest has not enabled the
//! SVGA mode, a software VGA renderer reading VRAM is authoritative. Once the
//! guest enables it, frames come from the backend and are presented from a
//! host-side scanout buffer.

mod backend;
mod chip;
mod config;
mod device;
mod display;
mod io;
mod pci;
pub mod registers;
mod scanout;
mod vga;

use thiserror::Error;
use vmsvga_core::MemoryError;

pub use backend::{BackendConfig, BackendHandle, OutputGeometry, PullError, SvgaBackend};
pub use chip::{SvgaChip, SVGA_MAX_HEIGHT, SVGA_MAX_WIDTH};
pub use config::DeviceConfig;
pub use device::{BarRegion, DeviceStatus, VmSvgaDevice, FIFO_REGION_NAME, VRAM_REGION_NAME};
pub use display::{DisplayRefresh, SCANOUT_FORMAT};
pub use io::{io_read, io_write, Endianness, IoRegionOps, SVGA_IO_OPS, SVGA_IO_WINDOW_LEN};
pub use pci::{BarKind, BarTarget, PciBar, PciIdentity, VMSVGA_BARS, VMSVGA_PCI};
pub use scanout::{ScanoutBuffer, ScanoutError};
pub use vga::{SoftwareVga, VgaColor, VgaMode, DEFAULT_VGA_PALETTE};

#[derive(Debug, Error)]
pub enum SvgaError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),
    #[error("Failed to read configuration: {0}")]
    ConfigRead(#[from] std::io::Error),
    #[error(transparent)]
    Memory(#[from] MemoryError),
    #[error("Device state cannot be migrated")]
    MigrationUnsupported,
}
