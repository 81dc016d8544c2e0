//! Host-runtime primitives shared by the emulated display adapter and its
//! frontends.

pub mod console;
pub mod graphic;
pub mod logging;
pub mod memory;

pub mod types {
    use serde::{Deserialize, Serialize};

    /// ARGB8888 pixels as shown on the host
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Frame {
        pub width: u32,
        pub height: u32,
        pub pixels: Vec<u32>,
    }

    impl Frame {
        pub fn new(width: u32, height: u32) -> Self {
            Self {
                width,
                height,
                pixels: vec![0; width as usize * height as usize],
            }
        }
    }
}

pub use console::{
    console_char, ConsoleChar, DisplayConsole, HeadlessConsole, PixelFormat, SurfaceBacking,
    SurfaceInfo, SurfaceView,
};
pub use graphic::GraphicHwOps;
pub use memory::{MemoryError, MemoryRegion};
