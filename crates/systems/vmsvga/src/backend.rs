//! Rendering backend capability interface and its owning handle.
//!
//! The accelerated rendering engine is opaque to the adapter. All the adapter
//! needs is the surface below: register pass-through, a mode query, the
//! output geometry and a pull-style pixel read. Anything implementing
//! [`SvgaBackend`] can be plugged in.

use crate::SvgaError;
use serde::Serialize;
use thiserror::Error;
use vmsvga_core::logging::{log, LogCategory, LogLevel};
use vmsvga_core::{MemoryError, MemoryRegion};

/// Output geometry reported by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct OutputGeometry {
    pub width: u32,
    pub height: u32,
    /// Bytes per row; may exceed `width * 4` for alignment
    pub stride: u32,
}

impl OutputGeometry {
    pub fn new(width: u32, height: u32, stride: u32) -> Self {
        Self {
            width,
            height,
            stride,
        }
    }

    /// `stride * height`, or None if it does not fit in the address space
    pub fn scanout_len(&self) -> Option<usize> {
        (self.stride as usize).checked_mul(self.height as usize)
    }
}

/// Why a pixel pull produced nothing
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PullError {
    #[error("no output has been produced")]
    NoOutput,
    #[error("output buffer size mismatch: {actual} bytes, {expected} expected")]
    SizeMismatch { expected: usize, actual: usize },
    #[error(transparent)]
    Memory(#[from] MemoryError),
}

/// Memory the backend is constructed over
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Legacy VGA framebuffer (VRAM), shared with the VGA renderer
    pub framebuffer: MemoryRegion,
    /// FIFO command buffer, owned by the backend for its whole lifetime
    pub command_buffer: MemoryRegion,
}

/// Operations the adapter consumes from a rendering backend.
///
/// Construction happens through the constructor passed to
/// [`BackendHandle::create`]; destruction is `Drop`.
pub trait SvgaBackend: Send {
    /// 32-bit read from the control window
    fn read_register(&mut self, offset: u64) -> u32;

    /// 32-bit write to the control window
    fn write_register(&mut self, offset: u64, value: u32);

    /// True while the legacy VGA path is authoritative
    fn is_legacy_mode(&self) -> bool;

    /// Current output geometry; only meaningful outside legacy mode
    fn output_geometry(&self) -> OutputGeometry;

    /// Copy the latest rendered frame into `dst`.
    ///
    /// `dst.len()` is `stride * height` of the current geometry. On error the
    /// contents of `dst` must be left as they were.
    fn pull_pixels(&mut self, dst: &mut [u8]) -> Result<(), PullError>;

    /// The previously presented frame has been discarded by the host
    fn invalidate(&mut self);

    fn name(&self) -> &str;
}

/// Exclusive owner of one backend instance.
///
/// Created once at realize, destroyed once when dropped. There is no way to
/// reach the backend after the handle is gone.
pub struct BackendHandle {
    backend: Box<dyn SvgaBackend>,
}

impl BackendHandle {
    pub fn create<F>(config: BackendConfig, constructor: F) -> Result<Self, SvgaError>
    where
        F: FnOnce(BackendConfig) -> Result<Box<dyn SvgaBackend>, SvgaError>,
    {
        log(LogCategory::Lifecycle, LogLevel::Info, || {
            format!(
                "creating backend: framebuffer {} ({} bytes), command buffer {} ({} bytes)",
                config.framebuffer.name(),
                config.framebuffer.len(),
                config.command_buffer.name(),
                config.command_buffer.len()
            )
        });

        let backend = constructor(config)?;
        Ok(Self { backend })
    }

    /// Release the backend now instead of at end of scope
    pub fn destroy(self) {
        drop(self);
    }

    pub fn name(&self) -> &str {
        self.backend.name()
    }

    pub fn read_register(&mut self, offset: u64) -> u32 {
        self.backend.read_register(offset)
    }

    pub fn write_register(&mut self, offset: u64, value: u32) {
        self.backend.write_register(offset, value)
    }

    pub fn is_legacy_mode(&self) -> bool {
        self.backend.is_legacy_mode()
    }

    pub fn output_geometry(&self) -> OutputGeometry {
        self.backend.output_geometry()
    }

    pub fn pull_pixels(&mut self, dst: &mut [u8]) -> Result<(), PullError> {
        self.backend.pull_pixels(dst)
    }

    pub fn invalidate(&mut self) {
        self.backend.invalidate()
    }
}

impl Drop for BackendHandle {
    fn drop(&mut self) {
        log(LogCategory::Lifecycle, LogLevel::Info, || {
            format!("destroying backend {}", self.backend.name())
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingBackend {
        drops: Arc<AtomicUsize>,
        last_write: Option<(u64, u32)>,
    }

    impl SvgaBackend for CountingBackend {
        fn read_register(&mut self, _offset: u64) -> u32 {
            self.last_write.map(|(_, value)| value).unwrap_or(0)
        }

        fn write_register(&mut self, offset: u64, value: u32) {
            self.last_write = Some((offset, value));
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
            "counting"
        }
    }

    impl Drop for CountingBackend {
        fn drop(&mut self) {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn config() -> BackendConfig {
        BackendConfig {
            framebuffer: MemoryRegion::new("vram", 64),
            command_buffer: MemoryRegion::new("fifo", 64),
        }
    }

    #[test]
    fn test_backend_destroyed_exactly_once() {
        let drops = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&drops);
        let mut handle = BackendHandle::create(config(), move |_| {
            Ok(Box::new(CountingBackend {
                drops: counter,
                last_write: None,
            }) as Box<dyn SvgaBackend>)
        })
        .unwrap();

        handle.write_register(1, 0xCAFE);
        assert_eq!(handle.read_register(1), 0xCAFE);
        assert_eq!(drops.load(Ordering::SeqCst), 0);

        handle.destroy();
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_constructor_error_propagates() {
        let result = BackendHandle::create(config(), |_| {
            Err(SvgaError::InvalidConfig("no backend".to_string()))
        });
        assert!(matches!(result, Err(SvgaError::InvalidConfig(_))));
    }

    #[test]
    fn test_constructor_receives_config_regions() {
        let config = config();
        let vram = config.framebuffer.clone();
        let handle = BackendHandle::create(config, |cfg| {
            assert!(cfg.framebuffer.same_region(&vram));
            assert_eq!(cfg.command_buffer.name(), "fifo");
            Ok(Box::new(CountingBackend {
                drops: Arc::new(AtomicUsize::new(0)),
                last_write: None,
            }) as Box<dyn SvgaBackend>)
        })
        .unwrap();
        assert_eq!(handle.name(), "counting");
        assert!(handle.is_legacy_mode());
    }

    #[test]
    fn test_scanout_len() {
        assert_eq!(OutputGeometry::new(800, 600, 3200).scanout_len(), Some(1_920_000));
        assert_eq!(OutputGeometry::default().scanout_len(), Some(0));
    }
}
