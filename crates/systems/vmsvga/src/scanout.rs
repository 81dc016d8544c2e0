//! Host-side scanout buffer for the accelerated display path.
//!
//! The buffer is sized to exactly `stride * height` of the geometry the
//! backend last reported and is presented to the host console without a
//! copy. It only exists while the accelerated path is active.

use thiserror::Error;
use vmsvga_core::logging::{log, LogCategory, LogLevel};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanoutError {
    #[error("unable to allocate scanout buffer of {len} bytes")]
    Allocation {
        len: usize,
        #[source]
        source: std::collections::TryReserveError,
    },
}

#[derive(Debug, Default)]
pub struct ScanoutBuffer {
    pixels: Option<Box<[u8]>>,
}

impl ScanoutBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_allocated(&self) -> bool {
        self.pixels.is_some()
    }

    /// Recorded length; 0 when unallocated
    pub fn len(&self) -> usize {
        self.allocated_len().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Length of the live buffer, None when unallocated
    pub fn allocated_len(&self) -> Option<usize> {
        self.pixels.as_ref().map(|pixels| pixels.len())
    }

    pub fn as_slice(&self) -> Option<&[u8]> {
        self.pixels.as_deref()
    }

    pub fn as_mut_slice(&mut self) -> Option<&mut [u8]> {
        self.pixels.as_deref_mut()
    }

    /// Make sure a zeroed buffer of exactly `required_len` bytes exists.
    ///
    /// An existing buffer of the right length is kept with its contents. Any
    /// other buffer is released before the new one is allocated, so on error
    /// the manager is left unallocated.
    pub fn try_ensure_capacity(&mut self, required_len: usize) -> Result<&mut [u8], ScanoutError> {
        if self.allocated_len() != Some(required_len) {
            self.release();

            let mut pixels = Vec::new();
            pixels
                .try_reserve_exact(required_len)
                .map_err(|source| ScanoutError::Allocation {
                    len: required_len,
                    source,
                })?;
            pixels.resize(required_len, 0);

            log(LogCategory::Scanout, LogLevel::Debug, || {
                format!("allocated scanout buffer of {} bytes", required_len)
            });
            self.pixels = Some(pixels.into_boxed_slice());
        }

        Ok(self.pixels.as_deref_mut().unwrap_or_default())
    }

    /// Like [`ScanoutBuffer::try_ensure_capacity`], but terminates the
    /// process when the buffer cannot be allocated. The device has no
    /// other scanout target to fall back on.
    pub fn ensure_capacity(&mut self, required_len: usize) -> &mut [u8] {
        match self.try_ensure_capacity(required_len) {
            Ok(pixels) => pixels,
            Err(err) => {
                log(LogCategory::Scanout, LogLevel::Error, || {
                    format!("FATAL: {}", err)
                });
                eprintln!("FATAL: {}", err);
                std::process::abort();
            }
        }
    }

    /// Free the buffer; idempotent
    pub fn release(&mut self) {
        if let Some(pixels) = self.pixels.take() {
            log(LogCategory::Scanout, LogLevel::Debug, || {
                format!("released scanout buffer of {} bytes", pixels.len())
            });
        }
    }
}
