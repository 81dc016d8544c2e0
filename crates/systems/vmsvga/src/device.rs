//! The PCI display adapter: memory regions, backend, refresh and VGA fallback.

use crate::backend::{BackendConfig, BackendHandle, OutputGeometry, SvgaBackend};
use crate::chip::SvgaChip;
use crate::config::DeviceConfig;
use crate::display::DisplayRefresh;
use crate::io::{self, SVGA_IO_OPS};
use crate::pci::{BarTarget, PciBar, PciIdentity, VMSVGA_BARS, VMSVGA_PCI};
use crate::vga::SoftwareVga;
use crate::SvgaError;
use serde::Serialize;
use serde_json::Value;
use vmsvga_core::logging::{log, LogCategory, LogLevel};
use vmsvga_core::{ConsoleChar, DisplayConsole, GraphicHwOps, MemoryRegion};

pub const VRAM_REGION_NAME: &str = "vmsvga-vk.vram";
pub const FIFO_REGION_NAME: &str = "vmsvga-vk.fifo";

/// A BAR together with the size of the region it maps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BarRegion {
    pub bar: PciBar,
    pub len: u64,
}

/// Snapshot of the adapter for frontends and reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceStatus {
    pub pci: PciIdentity,
    pub bars: [BarRegion; 3],
    pub backend: String,
    pub legacy_mode: bool,
    pub geometry: OutputGeometry,
    /// Length of the live scanout buffer, None when unallocated
    pub scanout_len: Option<usize>,
    pub vram_len: usize,
    pub fifo_len: usize,
}

pub struct VmSvgaDevice {
    vram: MemoryRegion,
    fifo: MemoryRegion,
    backend: BackendHandle,
    refresh: DisplayRefresh,
    vga: SoftwareVga,
}

impl VmSvgaDevice {
    /// Realize the adapter with the built-in software SVGA backend
    pub fn realize(config: &DeviceConfig) -> Result<Self, SvgaError> {
        let (max_width, max_height) = (config.max_width, config.max_height);
        Self::realize_with(config, move |backend_config| {
            let chip = SvgaChip::with_limits(backend_config, max_width, max_height)?;
            Ok(Box::new(chip) as Box<dyn SvgaBackend>)
        })
    }

    /// Realize the adapter around a backend built by `constructor`
    pub fn realize_with<F>(config: &DeviceConfig, constructor: F) -> Result<Self, SvgaError>
    where
        F: FnOnce(BackendConfig) -> Result<Box<dyn SvgaBackend>, SvgaError>,
    {
        config.validate()?;

        let vram = MemoryRegion::new(VRAM_REGION_NAME, config.vram_len());
        let fifo = MemoryRegion::new(FIFO_REGION_NAME, config.fifo_len);

        let backend = BackendHandle::create(
            BackendConfig {
                framebuffer: vram.clone(),
                command_buffer: fifo.clone(),
            },
            constructor,
        )?;
        let vga = SoftwareVga::new(vram.clone());

        log(LogCategory::Lifecycle, LogLevel::Info, || {
            format!(
                "realized with {} MiB VRAM, {} byte FIFO, backend {}",
                config.vram_size_mb,
                config.fifo_len,
                backend.name()
            )
        });

        Ok(Self {
            vram,
            fifo,
            backend,
            refresh: DisplayRefresh::new(),
            vga,
        })
    }

    /// Guest read from the I/O BAR
    pub fn io_read(&mut self, addr: u64, size: u32) -> u64 {
        io::io_read(&mut self.backend, addr, size)
    }

    /// Guest write to the I/O BAR
    pub fn io_write(&mut self, addr: u64, data: u64, size: u32) {
        io::io_write(&mut self.backend, addr, data, size)
    }

    pub fn vram(&self) -> &MemoryRegion {
        &self.vram
    }

    pub fn fifo(&self) -> &MemoryRegion {
        &self.fifo
    }

    pub fn vga_mut(&mut self) -> &mut SoftwareVga {
        &mut self.vga
    }

    pub fn scanout_len(&self) -> Option<usize> {
        self.refresh.scanout().allocated_len()
    }

    pub fn pci_identity(&self) -> PciIdentity {
        VMSVGA_PCI
    }

    /// BAR layout with the sizes of this instance's regions
    pub fn bars(&self) -> [BarRegion; 3] {
        VMSVGA_BARS.map(|bar| BarRegion {
            bar,
            len: match bar.target {
                BarTarget::IoWindow => SVGA_IO_OPS.len,
                BarTarget::Vram => self.vram.len() as u64,
                BarTarget::Fifo => self.fifo.len() as u64,
            },
        })
    }

    pub fn status(&self) -> DeviceStatus {
        DeviceStatus {
            pci: self.pci_identity(),
            bars: self.bars(),
            backend: self.backend.name().to_string(),
            legacy_mode: self.backend.is_legacy_mode(),
            geometry: self.backend.output_geometry(),
            scanout_len: self.scanout_len(),
            vram_len: self.vram.len(),
            fifo_len: self.fifo.len(),
        }
    }

    /// Backend state lives outside the adapter, so it cannot be migrated
    pub fn supports_save_states(&self) -> bool {
        false
    }

    pub fn save_state(&self) -> Result<Value, SvgaError> {
        Err(SvgaError::MigrationUnsupported)
    }

    /// Tear the device down, releasing the scanout buffer and the backend
    pub fn finalize(self) {
        drop(self);
    }
}

impl Drop for VmSvgaDevice {
    fn drop(&mut self) {
        self.refresh.release_scanout();
        log(LogCategory::Lifecycle, LogLevel::Info, || {
            "finalizing vmsvga device".to_string()
        });
    }
}

impl GraphicHwOps for VmSvgaDevice {
    fn invalidate(&mut self) {
        self.refresh.invalidate(&mut self.backend, &mut self.vga);
    }

    fn gfx_update(&mut self, console: &mut dyn DisplayConsole) {
        self.refresh.update(&mut self.backend, &mut self.vga, console);
    }

    fn supports_text_update(&self) -> bool {
        self.backend.is_legacy_mode() && self.vga.supports_text_update()
    }

    fn text_update(&mut self, chardata: &mut [ConsoleChar]) {
        self.refresh
            .text_update(&mut self.backend, &mut self.vga, chardata);
    }

    fn name(&self) -> &str {
        "vmsvga-vk"
    }
}
