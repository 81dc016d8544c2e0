//! RAM-backed memory regions owned by the host runtime.
//!
//! A region is created once by the device glue (VGA VRAM, FIFO RAM) and
//! shared by handle with every component that needs to look at it: the
//! backend, the legacy VGA renderer and the frontend. Cloning a
//! [`MemoryRegion`] clones the handle, never the bytes.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    #[error("access of {len} bytes at offset {offset:#x} exceeds region {region} ({size} bytes)")]
    OutOfBounds {
        region: String,
        offset: usize,
        len: usize,
        size: usize,
    },
}

/// Fixed-size, shared, byte-addressable region
#[derive(Clone)]
pub struct MemoryRegion {
    name: Arc<str>,
    len: usize,
    bytes: Arc<Mutex<Box<[u8]>>>,
}

impl MemoryRegion {
    /// Allocate a zero-filled region of `len` bytes
    pub fn new(name: &str, len: usize) -> Self {
        Self {
            name: Arc::from(name),
            len,
            bytes: Arc::new(Mutex::new(vec![0u8; len].into_boxed_slice())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn lock(&self) -> MutexGuard<'_, Box<[u8]>> {
        self.bytes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` with shared access to the whole region
    pub fn with<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        f(&self.lock())
    }

    /// Run `f` with exclusive access to the whole region
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        f(&mut self.lock())
    }

    fn check(&self, offset: usize, len: usize) -> Result<(), MemoryError> {
        match offset.checked_add(len) {
            Some(end) if end <= self.len => Ok(()),
            _ => Err(MemoryError::OutOfBounds {
                region: self.name.to_string(),
                offset,
                len,
                size: self.len,
            }),
        }
    }

    /// Copy `dst.len()` bytes starting at `offset` into `dst`.
    ///
    /// `dst` is left untouched when the range is out of bounds.
    pub fn read(&self, offset: usize, dst: &mut [u8]) -> Result<(), MemoryError> {
        self.check(offset, dst.len())?;
        let bytes = self.lock();
        dst.copy_from_slice(&bytes[offset..offset + dst.len()]);
        Ok(())
    }

    pub fn write(&self, offset: usize, src: &[u8]) -> Result<(), MemoryError> {
        self.check(offset, src.len())?;
        let mut bytes = self.lock();
        bytes[offset..offset + src.len()].copy_from_slice(src);
        Ok(())
    }

    pub fn fill(&self, value: u8) {
        self.lock().fill(value);
    }

    /// True if both handles refer to the same backing storage
    pub fn same_region(&self, other: &MemoryRegion) -> bool {
        Arc::ptr_eq(&self.bytes, &other.bytes)
    }
}

impl fmt::Debug for MemoryRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryRegion")
            .field("name", &self.name)
            .field("len", &self.len)
            .finish()
    }
}
