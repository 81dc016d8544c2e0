//! SVGA II register indices and port layout.

/// Index port: selects the register the value port operates on
pub const SVGA_INDEX_PORT: u64 = 0;
/// Value port: reads/writes the selected register
pub const SVGA_VALUE_PORT: u64 = 1;

pub const SVGA_MAGIC: u32 = 0x0090_0000;

pub const fn svga_make_id(version: u32) -> u32 {
    (SVGA_MAGIC << 8) | version
}

pub const SVGA_ID_0: u32 = svga_make_id(0);
pub const SVGA_ID_1: u32 = svga_make_id(1);
pub const SVGA_ID_2: u32 = svga_make_id(2);

pub const SVGA_REG_ID: u32 = 0;
pub const SVGA_REG_ENABLE: u32 = 1;
pub const SVGA_REG_WIDTH: u32 = 2;
pub const SVGA_REG_HEIGHT: u32 = 3;
pub const SVGA_REG_MAX_WIDTH: u32 = 4;
pub const SVGA_REG_MAX_HEIGHT: u32 = 5;
pub const SVGA_REG_DEPTH: u32 = 6;
pub const SVGA_REG_BITS_PER_PIXEL: u32 = 7;
pub const SVGA_REG_PSEUDOCOLOR: u32 = 8;
pub const SVGA_REG_RED_MASK: u32 = 9;
pub const SVGA_REG_GREEN_MASK: u32 = 10;
pub const SVGA_REG_BLUE_MASK: u32 = 11;
pub const SVGA_REG_BYTES_PER_LINE: u32 = 12;
pub const SVGA_REG_FB_START: u32 = 13;
pub const SVGA_REG_FB_OFFSET: u32 = 14;
pub const SVGA_REG_VRAM_SIZE: u32 = 15;
pub const SVGA_REG_FB_SIZE: u32 = 16;
pub const SVGA_REG_CAPABILITIES: u32 = 17;
pub const SVGA_REG_MEM_START: u32 = 18; // deprecated
pub const SVGA_REG_MEM_SIZE: u32 = 19;
/// Set by the guest once the FIFO memory area is configured
pub const SVGA_REG_CONFIG_DONE: u32 = 20;
pub const SVGA_REG_SYNC: u32 = 21;
pub const SVGA_REG_BUSY: u32 = 22;
pub const SVGA_REG_GUEST_ID: u32 = 23;

/// The only colour depth the adapter scans out
pub const SVGA_BITS_PER_PIXEL: u32 = 32;
pub const SVGA_DEPTH: u32 = 24;

pub const SVGA_RED_MASK: u32 = 0x00FF_0000;
pub const SVGA_GREEN_MASK: u32 = 0x0000_FF00;
pub const SVGA_BLUE_MASK: u32 = 0x0000_00FF;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_ids() {
        assert_eq!(SVGA_ID_0, 0x9000_0000);
        assert_eq!(SVGA_ID_2, 0x9000_0002);
        assert!(SVGA_ID_1 < SVGA_ID_2);
    }
}
