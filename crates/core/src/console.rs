//! Host display console abstraction.
//!
//! The console owns the active display surface. Devices only describe the
//! surface they want ([`SurfaceInfo`]) and hand over pixels for the duration
//! of a present ([`SurfaceView`]); they never keep a reference to the host's
//! surface between refreshes.

use crate::types::Frame;
use serde::{Deserialize, Serialize};

/// One text-mode cell: character in the low byte, attribute in the next
pub type ConsoleChar = u32;

/// Pack a character and its attribute byte into a console cell
pub fn console_char(ch: u8, attr: u8) -> ConsoleChar {
    ch as u32 | ((attr as u32) << 8)
}

/// Pixel formats the console understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PixelFormat {
    /// 32-bit, native little-endian `0x00RRGGBB` (bytes B, G, R, X)
    #[default]
    Xrgb8888,
}

impl PixelFormat {
    /// Default host format for a given colour depth
    pub fn for_depth(bits_per_pixel: u32) -> Option<Self> {
        match bits_per_pixel {
            32 => Some(PixelFormat::Xrgb8888),
            _ => None,
        }
    }

    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            PixelFormat::Xrgb8888 => 4,
        }
    }

    pub fn bits_per_pixel(self) -> u32 {
        self.bytes_per_pixel() * 8
    }
}

/// Who provides the bytes presented on a surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SurfaceBacking {
    /// A software renderer's own framebuffer
    Renderer,
    /// The device's scanout buffer, presented without copying
    Scanout,
}

/// Geometry and format of a display surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceInfo {
    pub width: u32,
    pub height: u32,
    /// Bytes per row, may exceed `width * bytes_per_pixel`
    pub stride: u32,
    pub format: PixelFormat,
    pub backing: SurfaceBacking,
}

impl SurfaceInfo {
    /// Bytes needed to back the surface
    pub fn byte_len(&self) -> usize {
        self.stride as usize * self.height as usize
    }
}

/// Borrowed pixels of a surface for one present
#[derive(Debug, Clone, Copy)]
pub struct SurfaceView<'a> {
    pub info: SurfaceInfo,
    pub pixels: &'a [u8],
}

/// The host display subsystem as seen by a graphics device
pub trait DisplayConsole {
    /// Currently bound surface, if any
    fn surface(&self) -> Option<SurfaceInfo>;

    /// Bound surface dimensions, (0, 0) when nothing is bound
    fn surface_size(&self) -> (u32, u32) {
        self.surface()
            .map(|info| (info.width, info.height))
            .unwrap_or((0, 0))
    }

    /// Replace the active surface
    fn replace_surface(&mut self, info: SurfaceInfo);

    /// Redraw the whole surface from `view`
    fn update_full(&mut self, view: SurfaceView<'_>);
}

/// In-memory console for headless hosts and tests.
///
/// Presented bytes are decoded into an ARGB [`Frame`] row by row using the
/// surface stride.
#[derive(Debug, Default)]
pub struct HeadlessConsole {
    surface: Option<SurfaceInfo>,
    frame: Option<Frame>,
    replace_count: u64,
    update_count: u64,
}

impl HeadlessConsole {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last presented frame
    pub fn frame(&self) -> Option<&Frame> {
        self.frame.as_ref()
    }

    /// Number of surface replacements so far
    pub fn replace_count(&self) -> u64 {
        self.replace_count
    }

    /// Number of full updates so far
    pub fn update_count(&self) -> u64 {
        self.update_count
    }
}

impl DisplayConsole for HeadlessConsole {
    fn surface(&self) -> Option<SurfaceInfo> {
        self.surface
    }

    fn replace_surface(&mut self, info: SurfaceInfo) {
        self.surface = Some(info);
        self.replace_count += 1;
    }

    fn update_full(&mut self, view: SurfaceView<'_>) {
        self.update_count += 1;

        let info = view.info;
        let mut frame = Frame::new(info.width, info.height);
        let bpp = info.format.bytes_per_pixel() as usize;
        let row_bytes = info.width as usize * bpp;

        for (y, row) in frame
            .pixels
            .chunks_exact_mut(info.width.max(1) as usize)
            .enumerate()
        {
            let start = y * info.stride as usize;
            let Some(src) = view.pixels.get(start..start + row_bytes) else {
                break;
            };
            for (dst, px) in row.iter_mut().zip(src.chunks_exact(bpp)) {
                *dst = 0xFF00_0000 | u32::from_le_bytes([px[0], px[1], px[2], 0]);
            }
        }

        self.frame = Some(frame);
    }
}
