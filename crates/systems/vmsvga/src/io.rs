//! Register/FIFO bridge for the adapter's I/O BAR.
//!
//! Accesses on the control window go straight to the backend. The bridge
//! decodes nothing; it only enforces the access width the window was
//! registered with.

use crate::backend::BackendHandle;
use vmsvga_core::logging::{log, LogCategory, LogLevel};

/// Size of the control window in bytes
pub const SVGA_IO_WINDOW_LEN: u64 = 0x10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    Little,
    Big,
}

/// Access constraints the host must honour when dispatching to the window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoRegionOps {
    pub name: &'static str,
    pub len: u64,
    pub endianness: Endianness,
    pub min_access_size: u32,
    pub max_access_size: u32,
    pub unaligned: bool,
}

pub const SVGA_IO_OPS: IoRegionOps = IoRegionOps {
    name: "vmsvga-vk-io",
    len: SVGA_IO_WINDOW_LEN,
    endianness: Endianness::Little,
    min_access_size: 4,
    max_access_size: 4,
    unaligned: true,
};

impl IoRegionOps {
    pub fn accepts(&self, size: u32) -> bool {
        (self.min_access_size..=self.max_access_size).contains(&size)
    }
}

/// Forward a guest read of `size` bytes at `addr` to the backend.
///
/// # Panics
///
/// If [`SVGA_IO_OPS`] does not accept `size`. The port decode layer must
/// never dispatch other widths to this window.
pub fn io_read(backend: &mut BackendHandle, addr: u64, size: u32) -> u64 {
    assert!(
        SVGA_IO_OPS.accepts(size),
        "vmsvga io read of width {size} at {addr:#x}"
    );
    let value = backend.read_register(addr);
    log(LogCategory::Io, LogLevel::Trace, || {
        format!("io read [{:#x}] -> {:#010x}", addr, value)
    });
    value as u64
}

/// Forward a guest write to the backend; only the low 32 bits are used.
///
/// # Panics
///
/// If [`SVGA_IO_OPS`] does not accept `size`.
pub fn io_write(backend: &mut BackendHandle, addr: u64, data: u64, size: u32) {
    assert!(
        SVGA_IO_OPS.accepts(size),
        "vmsvga io write of width {size} at {addr:#x}"
    );
    log(LogCategory::Io, LogLevel::Trace, || {
        format!("io write [{:#x}] = {:#010x}", addr, data as u32)
    });
    backend.write_register(addr, data as u32);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendConfig, OutputGeometry, PullError, SvgaBackend};
    use std::collections::HashMap;
    use vmsvga_core::MemoryRegion;

    /// Returns a scrambled version of whatever was last written, so a
    /// pass-through bridge is observable
    #[derive(Default)]
    struct ScramblingBackend {
        regs: HashMap<u64, u32>,
    }

    impl SvgaBackend for ScramblingBackend {
        fn read_register(&mut self, offset: u64) -> u32 {
            self.regs.get(&offset).map(|v| v.rotate_left(8)).unwrap_or(0xDEAD_BEEF)
        }

        fn write_register(&mut self, offset: u64, value: u32) {
            self.regs.insert(offset, value);
        }

        fn is_legacy_mode(&self) -> bool {
            true
        }

        fn output_geometry(&self) -> OutputGeometry {
            OutputGeometry::default()
        }

        fn pull_pixels(&mut self, _dst: &mut [u8]) -> Result<(), PullError> {
            Err(PullError::NoOutput)
        }

        fn invalidate(&mut self) {}

        fn name(&self) -> &str {
            "scrambling"
        }
    }

    fn handle() -> BackendHandle {
        let config = BackendConfig {
            framebuffer: MemoryRegion::new("vram", 16),
            command_buffer: MemoryRegion::new("fifo", 64),
        };
        BackendHandle::create(config, |_| {
            Ok(Box::new(ScramblingBackend::default()) as Box<dyn SvgaBackend>)
        })
        .unwrap()
    }

    #[test]
    fn test_reads_and_writes_pass_through_unchanged() {
        let mut backend = handle();
        io_write(&mut backend, 1, 0x1234_5678, 4);
        io_write(&mut backend, 1, 0x0BAD_F00D, 4);
        assert_eq!(io_read(&mut backend, 1, 4), 0x0BAD_F00Du32.rotate_left(8) as u64);
        assert_eq!(io_read(&mut backend, 0, 4), 0xDEAD_BEEF);
    }

    #[test]
    fn test_unaligned_offsets_are_forwarded() {
        let mut backend = handle();
        io_write(&mut backend, 3, 7, 4);
        assert_eq!(io_read(&mut backend, 3, 4), 7u32.rotate_left(8) as u64);
    }

    #[test]
    fn test_write_truncates_to_32_bits() {
        let mut backend = handle();
        io_write(&mut backend, 0, 0xFFFF_FFFF_0000_0001, 4);
        assert_eq!(io_read(&mut backend, 0, 4), 1u32.rotate_left(8) as u64);
    }

    #[test]
    #[should_panic(expected = "io read of width 2")]
    fn test_wrong_read_width_is_fatal() {
        let mut backend = handle();
        io_read(&mut backend, 0, 2);
    }

    #[test]
    #[should_panic(expected = "io read of width 8")]
    fn test_wide_read_is_fatal() {
        let mut backend = handle();
        io_read(&mut backend, 0, 8);
    }

    #[test]
    #[should_panic(expected = "io write of width 1")]
    fn test_wrong_write_width_is_fatal() {
        let mut backend = handle();
        io_write(&mut backend, 0, 0, 1);
    }

    #[test]
    fn test_io_ops_only_accept_dwords() {
        assert!(SVGA_IO_OPS.accepts(4));
        assert!(!SVGA_IO_OPS.accepts(2));
        assert!(!SVGA_IO_OPS.accepts(8));
        assert!(SVGA_IO_OPS.unaligned);
        assert_eq!(SVGA_IO_OPS.len, 16);
    }
}
