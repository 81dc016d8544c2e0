//! Display refresh controller.
//!
//! Invoked on every host invalidate/update/text-update callback. The
//! authoritative rendering path is re-derived from the backend on every call:
//!
//! ```text
//!                 backend.is_legacy_mode()
//!                /                         \
//!          legacy VGA                   accelerated
//!   forward to VGA hooks,       geometry -> scanout buffer -> surface
//!   drop any scanout buffer     -> pull pixels -> present full surface
//! ```

use crate::backend::{BackendHandle, OutputGeometry};
use crate::scanout::ScanoutBuffer;
use vmsvga_core::logging::{log, LogCategory, LogLevel};
use vmsvga_core::{
    ConsoleChar, DisplayConsole, GraphicHwOps, PixelFormat, SurfaceBacking, SurfaceInfo,
    SurfaceView,
};

/// Fixed scanout format of the accelerated path
pub const SCANOUT_FORMAT: PixelFormat = PixelFormat::Xrgb8888;

#[derive(Debug, Default)]
pub struct DisplayRefresh {
    scanout: ScanoutBuffer,
}

impl DisplayRefresh {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scanout(&self) -> &ScanoutBuffer {
        &self.scanout
    }

    /// Drop the scanout buffer, e.g. at device teardown
    pub fn release_scanout(&mut self) {
        self.scanout.release();
    }

    pub fn invalidate(&mut self, backend: &mut BackendHandle, vga: &mut dyn GraphicHwOps) {
        if backend.is_legacy_mode() {
            self.scanout.release();
            vga.invalidate();
        } else {
            log(LogCategory::Display, LogLevel::Debug, || {
                "invalidate: discarding scanout buffer".to_string()
            });
            self.scanout.release();
            backend.invalidate();
        }
    }

    pub fn update(
        &mut self,
        backend: &mut BackendHandle,
        vga: &mut dyn GraphicHwOps,
        console: &mut dyn DisplayConsole,
    ) {
        if backend.is_legacy_mode() {
            // A buffer left over from an accelerated phase would be sized for
            // geometry that no longer exists.
            self.scanout.release();
            vga.gfx_update(console);
        } else {
            self.update_accelerated(backend, console);
        }
    }

    pub fn text_update(
        &mut self,
        backend: &mut BackendHandle,
        vga: &mut dyn GraphicHwOps,
        chardata: &mut [ConsoleChar],
    ) {
        if backend.is_legacy_mode() && vga.supports_text_update() {
            vga.text_update(chardata);
        }
    }

    fn update_accelerated(&mut self, backend: &mut BackendHandle, console: &mut dyn DisplayConsole) {
        let geometry = backend.output_geometry();
        let Some(required_len) = geometry.scanout_len() else {
            log(LogCategory::Display, LogLevel::Error, || {
                format!("FATAL: scanout geometry {:?} overflows", geometry)
            });
            eprintln!("FATAL: scanout geometry {:?} overflows", geometry);
            std::process::abort();
        };

        let info = surface_for(geometry);
        let pixels = self.scanout.ensure_capacity(required_len);

        if needs_new_surface(console.surface(), &info) {
            log(LogCategory::Display, LogLevel::Info, || {
                format!(
                    "switching surface to {}x{} (stride {})",
                    info.width, info.height, info.stride
                )
            });
            console.replace_surface(info);
        }

        if let Err(err) = backend.pull_pixels(pixels) {
            // Present whatever the buffer still holds
            log(LogCategory::Display, LogLevel::Debug, || {
                format!("pixel pull failed, presenting previous frame: {}", err)
            });
        }

        console.update_full(SurfaceView {
            info,
            pixels: &*pixels,
        });
    }
}

fn surface_for(geometry: OutputGeometry) -> SurfaceInfo {
    SurfaceInfo {
        width: geometry.width,
        height: geometry.height,
        stride: geometry.stride,
        format: SCANOUT_FORMAT,
        backing: SurfaceBacking::Scanout,
    }
}

/// The bound surface must be the scanout buffer with the same layout
fn needs_new_surface(current: Option<SurfaceInfo>, wanted: &SurfaceInfo) -> bool {
    match current {
        Some(current) => {
            (current.width, current.height) != (wanted.width, wanted.height)
                || current.stride != wanted.stride
                || current.backing != SurfaceBacking::Scanout
        }
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendConfig, PullError, SvgaBackend};
    use std::sync::{Arc, Mutex};
    use vmsvga_core::{console_char, HeadlessConsole, MemoryRegion};

    #[derive(Default)]
    struct BackendState {
        legacy: bool,
        geometry: OutputGeometry,
        fill: Option<u8>,
        pulls: Vec<usize>,
        invalidates: usize,
    }

    #[derive(Clone, Default)]
    struct MockBackend(Arc<Mutex<BackendState>>);

    impl MockBackend {
        fn state(&self) -> std::sync::MutexGuard<'_, BackendState> {
            self.0.lock().unwrap()
        }
    }

    impl SvgaBackend for MockBackend {
        fn read_register(&mut self, _offset: u64) -> u32 {
            0
        }

        fn write_register(&mut self, _offset: u64, _value: u32) {}

        fn is_legacy_mode(&self) -> bool {
            self.state().legacy
        }

        fn output_geometry(&self) -> OutputGeometry {
            self.state().geometry
        }

        fn pull_pixels(&mut self, dst: &mut [u8]) -> Result<(), PullError> {
            let mut state = self.state();
            state.pulls.push(dst.len());
            match state.fill {
                Some(byte) => {
                    dst.fill(byte);
                    Ok(())
                }
                None => Err(PullError::NoOutput),
            }
        }

        fn invalidate(&mut self) {
            self.state().invalidates += 1;
        }

        fn name(&self) -> &str {
            "mock"
        }
    }

    #[derive(Default)]
    struct MockVga {
        invalidates: usize,
        updates: usize,
        text_updates: usize,
        has_text_hook: bool,
    }

    impl GraphicHwOps for MockVga {
        fn invalidate(&mut self) {
            self.invalidates += 1;
        }

        fn gfx_update(&mut self, _console: &mut dyn DisplayConsole) {
            self.updates += 1;
        }

        fn supports_text_update(&self) -> bool {
            self.has_text_hook
        }

        fn text_update(&mut self, chardata: &mut [ConsoleChar]) {
            self.text_updates += 1;
            chardata.fill(console_char(b'V', 0x07));
        }

        fn name(&self) -> &str {
            "mock vga"
        }
    }

    fn setup(legacy: bool, geometry: OutputGeometry) -> (MockBackend, BackendHandle) {
        let mock = MockBackend::default();
        {
            let mut state = mock.state();
            state.legacy = legacy;
            state.geometry = geometry;
            state.fill = Some(0x11);
        }
        let config = BackendConfig {
            framebuffer: MemoryRegion::new("vram", 16),
            command_buffer: MemoryRegion::new("fifo", 64),
        };
        let backend_mock = mock.clone();
        let handle = BackendHandle::create(config, move |_| {
            Ok(Box::new(backend_mock) as Box<dyn SvgaBackend>)
        })
        .unwrap();
        (mock, handle)
    }

    #[test]
    fn test_first_accelerated_update() {
        let (mock, mut backend) = setup(false, OutputGeometry::new(800, 600, 3200));
        let mut refresh = DisplayRefresh::new();
        let mut vga = MockVga::default();
        let mut console = HeadlessConsole::new();

        refresh.update(&mut backend, &mut vga, &mut console);

        assert_eq!(refresh.scanout().allocated_len(), Some(3200 * 600));
        assert_eq!(console.surface_size(), (800, 600));
        assert_eq!(console.surface().unwrap().backing, SurfaceBacking::Scanout);
        assert_eq!(mock.state().pulls, vec![3200 * 600]);
        assert_eq!(console.update_count(), 1);
        assert_eq!(vga.updates, 0);
    }

    #[test]
    fn test_unchanged_geometry_keeps_surface() {
        let (_mock, mut backend) = setup(false, OutputGeometry::new(64, 32, 256));
        let mut refresh = DisplayRefresh::new();
        let mut vga = MockVga::default();
        let mut console = HeadlessConsole::new();

        refresh.update(&mut backend, &mut vga, &mut console);
        refresh.update(&mut backend, &mut vga, &mut console);

        assert_eq!(console.replace_count(), 1);
        assert_eq!(console.update_count(), 2);
    }

    #[test]
    fn test_accelerated_invalidate_releases_buffer() {
        let (mock, mut backend) = setup(false, OutputGeometry::new(64, 32, 256));
        let mut refresh = DisplayRefresh::new();
        let mut vga = MockVga::default();
        let mut console = HeadlessConsole::new();

        refresh.update(&mut backend, &mut vga, &mut console);
        assert!(refresh.scanout().is_allocated());

        refresh.invalidate(&mut backend, &mut vga);
        assert!(!refresh.scanout().is_allocated());
        assert_eq!(mock.state().invalidates, 1);
        assert_eq!(vga.invalidates, 0);
    }

    #[test]
    fn test_failed_pull_presents_stale_frame() {
        let (mock, mut backend) = setup(false, OutputGeometry::new(4, 2, 16));
        let mut refresh = DisplayRefresh::new();
        let mut vga = MockVga::default();
        let mut console = HeadlessConsole::new();

        refresh.update(&mut backend, &mut vga, &mut console);
        mock.state().fill = None;
        refresh.update(&mut backend, &mut vga, &mut console);

        assert!(refresh
            .scanout()
            .as_slice()
            .unwrap()
            .iter()
            .all(|&b| b == 0x11));
        assert_eq!(console.update_count(), 2);
        assert_eq!(console.frame().unwrap().pixels[0], 0xFF111111);
    }

    #[test]
    fn test_legacy_mode_routes_to_vga() {
        let (mock, mut backend) = setup(true, OutputGeometry::new(800, 600, 3200));
        let mut refresh = DisplayRefresh::new();
        let mut vga = MockVga::default();
        let mut console = HeadlessConsole::new();

        refresh.invalidate(&mut backend, &mut vga);
        refresh.update(&mut backend, &mut vga, &mut console);

        assert_eq!(vga.invalidates, 1);
        assert_eq!(vga.updates, 1);
        assert!(!refresh.scanout().is_allocated());
        let state = mock.state();
        assert!(state.pulls.is_empty());
        assert_eq!(state.invalidates, 0);
    }

    #[test]
    fn test_text_update_needs_legacy_mode_and_hook() {
        let (mock, mut backend) = setup(true, OutputGeometry::default());
        let mut refresh = DisplayRefresh::new();
        let mut vga = MockVga::default();
        let mut cells = [0 as ConsoleChar; 4];

        refresh.text_update(&mut backend, &mut vga, &mut cells);
        assert_eq!(vga.text_updates, 0);

        vga.has_text_hook = true;
        refresh.text_update(&mut backend, &mut vga, &mut cells);
        assert_eq!(vga.text_updates, 1);
        assert_eq!(cells[0], console_char(b'V', 0x07));

        mock.state().legacy = false;
        cells.fill(0);
        refresh.text_update(&mut backend, &mut vga, &mut cells);
        assert_eq!(vga.text_updates, 1);
        assert!(cells.iter().all(|&c| c == 0));
    }

    #[test]
    fn test_zero_geometry_presents_empty_surface() {
        let (mock, mut backend) = setup(false, OutputGeometry::default());
        let mut refresh = DisplayRefresh::new();
        let mut vga = MockVga::default();
        let mut console = HeadlessConsole::new();

        refresh.update(&mut backend, &mut vga, &mut console);

        assert_eq!(refresh.scanout().allocated_len(), Some(0));
        assert_eq!(mock.state().pulls, vec![0]);
        assert!(console.frame().unwrap().pixels.is_empty());
    }

    #[test]
    fn test_needs_new_surface() {
        let wanted = surface_for(OutputGeometry::new(800, 600, 3200));
        assert!(needs_new_surface(None, &wanted));
        assert!(!needs_new_surface(Some(wanted), &wanted));
        assert!(needs_new_surface(
            Some(SurfaceInfo {
                backing: SurfaceBacking::Renderer,
                ..wanted
            }),
            &wanted
        ));
        assert!(needs_new_surface(
            Some(SurfaceInfo {
                stride: 4096,
                ..wanted
            }),
            &wanted
        ));
    }
}
