//! Software VGA renderer for the legacy display path.
//!
//! Reads the adapter's VRAM directly and renders one of the classic VGA
//! modes into its own framebuffer:
//!
//! - Text mode: 80x25 characters at 720x400 pixels (9x16 cells)
//! - Mode 13h: 320x200, 256 colours, linear
//! - 640x480, 16 colours, 4 bit planes
//!
//! The 256-entry palette holds 18-bit RGB (6 bits per channel).

use vmsvga_core::logging::{log, LogCategory, LogLevel};
use vmsvga_core::{
    console_char, ConsoleChar, DisplayConsole, GraphicHwOps, MemoryRegion, PixelFormat,
    SurfaceBacking, SurfaceInfo, SurfaceView,
};

const TEXT_COLS: usize = 80;
const TEXT_ROWS: usize = 25;
const CHAR_WIDTH: usize = 9;
const CHAR_HEIGHT: usize = 16;

/// Opaque black in ARGB
const BLACK: u32 = 0xFF00_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VgaMode {
    #[default]
    Text80x25,
    Graphics320x200,
    /// Planar, 16 colours
    Graphics640x480,
}

impl VgaMode {
    pub fn resolution(self) -> (u32, u32) {
        match self {
            VgaMode::Text80x25 => ((TEXT_COLS * CHAR_WIDTH) as u32, (TEXT_ROWS * CHAR_HEIGHT) as u32),
            VgaMode::Graphics320x200 => (320, 200),
            VgaMode::Graphics640x480 => (640, 480),
        }
    }
}

/// Palette entry, 6 bits per channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VgaColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl VgaColor {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn to_argb(self) -> u32 {
        let scale = |c: u8| ((c as u32 & 0x3F) * 255) / 63;
        BLACK | (scale(self.r) << 16) | (scale(self.g) << 8) | scale(self.b)
    }
}

pub const DEFAULT_VGA_PALETTE: [VgaColor; 256] = default_palette();

const fn default_palette() -> [VgaColor; 256] {
    let mut palette = [VgaColor::new(0, 0, 0); 256];

    // IBM 16-colour set
    palette[1] = VgaColor::new(0, 0, 42);
    palette[2] = VgaColor::new(0, 42, 0);
    palette[3] = VgaColor::new(0, 42, 42);
    palette[4] = VgaColor::new(42, 0, 0);
    palette[5] = VgaColor::new(42, 0, 42);
    palette[6] = VgaColor::new(42, 21, 0);
    palette[7] = VgaColor::new(42, 42, 42);
    palette[8] = VgaColor::new(21, 21, 21);
    palette[9] = VgaColor::new(21, 21, 63);
    palette[10] = VgaColor::new(21, 63, 21);
    palette[11] = VgaColor::new(21, 63, 63);
    palette[12] = VgaColor::new(63, 21, 21);
    palette[13] = VgaColor::new(63, 21, 63);
    palette[14] = VgaColor::new(63, 63, 21);
    palette[15] = VgaColor::new(63, 63, 63);

    // Grayscale ramp for the rest
    let mut i = 16;
    while i < 256 {
        let gray = (((i - 16) * 63) / 239) as u8;
        palette[i] = VgaColor::new(gray, gray, gray);
        i += 1;
    }

    palette
}

pub struct SoftwareVga {
    vram: MemoryRegion,
    mode: VgaMode,
    palette: [VgaColor; 256],
    /// ARGB pixels of the last render
    pixels: Vec<u32>,
    /// `pixels` encoded as XRGB8888 for presentation
    bytes: Vec<u8>,
    /// Next update must bind a fresh surface
    force_replace: bool,
}

impl SoftwareVga {
    pub fn new(vram: MemoryRegion) -> Self {
        let mut vga = Self {
            vram,
            mode: VgaMode::Text80x25,
            palette: DEFAULT_VGA_PALETTE,
            pixels: Vec::new(),
            bytes: Vec::new(),
            force_replace: true,
        };
        vga.resize_framebuffer();
        vga
    }

    pub fn mode(&self) -> VgaMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: VgaMode) {
        if self.mode != mode {
            log(LogCategory::Display, LogLevel::Info, || {
                format!("vga mode {:?} -> {:?}", self.mode, mode)
            });
            self.mode = mode;
            self.resize_framebuffer();
        }
    }

    pub fn set_palette(&mut self, index: u8, color: VgaColor) {
        self.palette[index as usize] = color;
    }

    pub fn palette(&self, index: u8) -> VgaColor {
        self.palette[index as usize]
    }

    /// Restore text mode and the default palette
    pub fn reset(&mut self) {
        self.palette = DEFAULT_VGA_PALETTE;
        self.set_mode(VgaMode::Text80x25);
        self.force_replace = true;
    }

    fn resize_framebuffer(&mut self) {
        let (width, height) = self.mode.resolution();
        self.pixels = vec![BLACK; width as usize * height as usize];
    }

    fn surface_info(&self) -> SurfaceInfo {
        let (width, height) = self.mode.resolution();
        let format = PixelFormat::Xrgb8888;
        SurfaceInfo {
            width,
            height,
            stride: width * format.bytes_per_pixel(),
            format,
            backing: SurfaceBacking::Renderer,
        }
    }

    fn color(&self, index: u8) -> u32 {
        self.palette[index as usize].to_argb()
    }

    fn render(&self, vram: &[u8], pixels: &mut [u32]) {
        pixels.fill(BLACK);
        match self.mode {
            VgaMode::Text80x25 => self.render_text(vram, pixels),
            VgaMode::Graphics320x200 => self.render_320x200(vram, pixels),
            VgaMode::Graphics640x480 => self.render_640x480(vram, pixels),
        }
    }

    fn render_text(&self, vram: &[u8], pixels: &mut [u32]) {
        let fb_width = TEXT_COLS * CHAR_WIDTH;

        for (cell, chunk) in vram.chunks_exact(2).take(TEXT_COLS * TEXT_ROWS).enumerate() {
            let (ch, attr) = (chunk[0], chunk[1]);
            let fg = self.color(attr & 0x0F);
            let bg = self.color(attr >> 4);
            let glyph = glyph(ch);

            let x0 = (cell % TEXT_COLS) * CHAR_WIDTH;
            let y0 = (cell / TEXT_COLS) * CHAR_HEIGHT;

            for (row, &bits) in glyph.iter().enumerate() {
                let line = (y0 + row) * fb_width + x0;
                for col in 0..CHAR_WIDTH {
                    let bit = if col < 8 {
                        (bits >> (7 - col)) & 1
                    } else if (0xC0..=0xDF).contains(&ch) {
                        // Line-drawing characters extend into the ninth column
                        bits & 1
                    } else {
                        0
                    };
                    pixels[line + col] = if bit == 1 { fg } else { bg };
                }
            }
        }
    }

    fn render_320x200(&self, vram: &[u8], pixels: &mut [u32]) {
        for (pixel, &index) in pixels.iter_mut().zip(vram) {
            *pixel = self.color(index);
        }
    }

    fn render_640x480(&self, vram: &[u8], pixels: &mut [u32]) {
        const WIDTH: usize = 640;
        const PLANE_SIZE: usize = WIDTH * 480 / 8;

        for (idx, pixel) in pixels.iter_mut().enumerate() {
            let byte_offset = idx / 8;
            let shift = 7 - (idx % 8);

            let mut index = 0u8;
            for plane in 0..4 {
                if let Some(&byte) = vram.get(plane * PLANE_SIZE + byte_offset) {
                    index |= ((byte >> shift) & 1) << plane;
                }
            }
            *pixel = self.color(index);
        }
    }
}

impl GraphicHwOps for SoftwareVga {
    fn invalidate(&mut self) {
        self.force_replace = true;
    }

    fn gfx_update(&mut self, console: &mut dyn DisplayConsole) {
        let info = self.surface_info();
        if self.force_replace || console.surface() != Some(info) {
            console.replace_surface(info);
            self.force_replace = false;
        }

        let mut pixels = std::mem::take(&mut self.pixels);
        self.vram.with(|vram| self.render(vram, &mut pixels));

        self.bytes.clear();
        self.bytes
            .extend(pixels.iter().flat_map(|pixel| pixel.to_le_bytes()));
        self.pixels = pixels;

        console.update_full(SurfaceView {
            info,
            pixels: &self.bytes,
        });
    }

    fn supports_text_update(&self) -> bool {
        self.mode == VgaMode::Text80x25
    }

    fn text_update(&mut self, chardata: &mut [ConsoleChar]) {
        if self.mode != VgaMode::Text80x25 {
            return;
        }
        self.vram.with(|vram| {
            for (cell, chunk) in chardata
                .iter_mut()
                .zip(vram.chunks_exact(2).take(TEXT_COLS * TEXT_ROWS))
            {
                *cell = console_char(chunk[0], chunk[1]);
            }
        });
    }

    fn name(&self) -> &str {
        "Software VGA"
    }
}

fn glyph(ch: u8) -> &'static [u8; 16] {
    static FONT: [[u8; 16]; 256] = font_8x16();
    static MISSING: [u8; 16] = [
        0x00, 0x00, 0x7E, 0x42, 0x42, 0x42, 0x42, 0x42, 0x42, 0x42, 0x42, 0x42, 0x42, 0x7E, 0x00,
        0x00,
    ];

    let glyph = &FONT[ch as usize];
    if ch != 0x00 && ch != 0x20 && glyph.iter().all(|&b| b == 0) {
        &MISSING
    } else {
        glyph
    }
}

/// Partial 8x16 font; characters without a glyph render as a box
const fn font_8x16() -> [[u8; 16]; 256] {
    let mut font = [[0u8; 16]; 256];

    font[0x21] = [
        0x00, 0x00, 0x18, 0x18, 0x18, 0x18, 0x18, 0x18, 0x18, 0x18, 0x00, 0x00, 0x18, 0x18, 0x00,
        0x00,
    ];
    font[0x41] = [
        0x00, 0x00, 0x00, 0x18, 0x3C, 0x66, 0x66, 0x66, 0x7E, 0x66, 0x66, 0x66, 0x66, 0x00, 0x00,
        0x00,
    ];
    font[0x47] = [
        0x00, 0x00, 0x00, 0x3C, 0x66, 0x60, 0x60, 0x6E, 0x66, 0x66, 0x66, 0x66, 0x3E, 0x00, 0x00,
        0x00,
    ];
    font[0x53] = [
        0x00, 0x00, 0x00, 0x3C, 0x66, 0x60, 0x30, 0x18, 0x0C, 0x06, 0x06, 0x66, 0x3C, 0x00, 0x00,
        0x00,
    ];
    font[0x56] = [
        0x00, 0x00, 0x00, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x3C, 0x3C, 0x18, 0x00, 0x00,
        0x00,
    ];
    font[0xC4] = [
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xFF, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00,
    ];

    font
}
