//! Display refresh hooks shared by every graphics device
//!
//! The host runtime drives a graphics device through three callbacks per
//! console:
//!
//! ```text
//! host display tick -> GraphicHwOps::{invalidate, gfx_update, text_update} -> DisplayConsole
//! ```
//!
//! A software VGA renderer implements them directly. An adapter with several
//! rendering paths implements them by picking the authoritative path on each
//! call and forwarding to it.

use crate::console::{ConsoleChar, DisplayConsole};

/// Refresh callbacks a graphics device exposes to the host display subsystem
pub trait GraphicHwOps: Send {
    /// The previous frame is discarded; the next update must redraw fully
    fn invalidate(&mut self);

    /// Produce a frame and present it on `console`
    fn gfx_update(&mut self, console: &mut dyn DisplayConsole);

    /// Whether [`GraphicHwOps::text_update`] does anything
    fn supports_text_update(&self) -> bool {
        false
    }

    /// Fill `chardata` with the current text-mode cells
    fn text_update(&mut self, _chardata: &mut [ConsoleChar]) {}

    /// Name of this device or renderer (for debugging/UI)
    fn name(&self) -> &str;
}
