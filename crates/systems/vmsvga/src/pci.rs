//! PCI identity and BAR layout of the adapter.

use serde::Serialize;

pub const PCI_VENDOR_ID_VMWARE: u16 = 0x15AD;
pub const PCI_DEVICE_ID_VMWARE_SVGA2: u16 = 0x0405;
pub const PCI_CLASS_DISPLAY_VGA: u16 = 0x0300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PciIdentity {
    pub vendor_id: u16,
    pub device_id: u16,
    pub class_id: u16,
    pub subsystem_vendor_id: u16,
    pub subsystem_id: u16,
    pub cache_line_size: u8,
    pub latency_timer: u8,
    pub interrupt_line: u8,
    /// Option ROM loaded for the legacy path
    pub romfile: &'static str,
    pub hotpluggable: bool,
}

pub const VMSVGA_PCI: PciIdentity = PciIdentity {
    vendor_id: PCI_VENDOR_ID_VMWARE,
    device_id: PCI_DEVICE_ID_VMWARE_SVGA2,
    class_id: PCI_CLASS_DISPLAY_VGA,
    subsystem_vendor_id: PCI_VENDOR_ID_VMWARE,
    subsystem_id: PCI_DEVICE_ID_VMWARE_SVGA2,
    cache_line_size: 0x08,
    latency_timer: 0x40,
    interrupt_line: 0xFF,
    romfile: "vgabios-vmware.bin",
    hotpluggable: false,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BarKind {
    Io,
    Memory { prefetchable: bool },
}

/// Which region a BAR maps; the size of memory BARs comes from the config
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BarTarget {
    IoWindow,
    Vram,
    Fifo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PciBar {
    pub index: u8,
    pub kind: BarKind,
    pub target: BarTarget,
}

pub const VMSVGA_BARS: [PciBar; 3] = [
    PciBar {
        index: 0,
        kind: BarKind::Io,
        target: BarTarget::IoWindow,
    },
    PciBar {
        index: 1,
        kind: BarKind::Memory { prefetchable: true },
        target: BarTarget::Vram,
    },
    PciBar {
        index: 2,
        kind: BarKind::Memory { prefetchable: true },
        target: BarTarget::Fifo,
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity() {
        assert_eq!(VMSVGA_PCI.vendor_id, 0x15AD);
        assert_eq!(VMSVGA_PCI.subsystem_vendor_id, VMSVGA_PCI.vendor_id);
        assert_eq!(VMSVGA_PCI.subsystem_id, VMSVGA_PCI.device_id);
        assert!(!VMSVGA_PCI.hotpluggable);
    }

    #[test]
    fn test_bar_layout() {
        assert_eq!(VMSVGA_BARS[0].kind, BarKind::Io);
        assert!(VMSVGA_BARS[1..]
            .iter()
            .all(|bar| bar.kind == BarKind::Memory { prefetchable: true }));
        assert_eq!(VMSVGA_BARS[2].target, BarTarget::Fifo);
    }
}
