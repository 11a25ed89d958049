//! Static device database.  The ID read from 0x0FF0 selects a row with the device's features and
//! memory map; rows are referenced by index and never copied out of the table.
use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Features: u8 {
        /// Dedicated TEST pin; JTAG pins are shared with GPIO
        const TEST_PIN = 1 << 0;
        /// MSP430X CPU with 20-bit addressing
        const CPUX = 1 << 1;
        /// Supports the DATA_QUICK block transfer instruction
        const DATA_QUICK = 1 << 2;
        /// 2xx flash controller: shorter mass erase, Info A lock
        const FAST_FLASH = 1 << 3;
        /// PSA preload by halted CPU instead of by PC
        const ENH_VERIFY = 1 << 4;
        /// 4-wire JTAG
        const JTAG = 1 << 5;
        /// 2-wire Spy-Bi-Wire
        const SPY_BI_WIRE = 1 << 6;
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub id: u16,
    pub name: &'static str,
    pub features: Features,
    pub ram_start: u16,
    pub ram_end: u16,
    pub main_start: u16,
}

impl DeviceDescriptor {
    pub fn has_test_pin(&self) -> bool {
        self.features.contains(Features::TEST_PIN)
    }

    pub fn has_cpux(&self) -> bool {
        self.features.contains(Features::CPUX)
    }

    pub fn has_data_quick(&self) -> bool {
        self.features.contains(Features::DATA_QUICK)
    }

    pub fn has_fast_flash(&self) -> bool {
        self.features.contains(Features::FAST_FLASH)
    }

    pub fn has_enh_verify(&self) -> bool {
        self.features.contains(Features::ENH_VERIFY)
    }

    pub fn has_jtag(&self) -> bool {
        self.features.contains(Features::JTAG)
    }

    pub fn has_spy_bi_wire(&self) -> bool {
        self.features.contains(Features::SPY_BI_WIRE)
    }
}

const Q: Features = Features::DATA_QUICK;
const J: Features = Features::JTAG;
const T: Features = Features::TEST_PIN;
const X: Features = Features::CPUX;
const F2: Features = Features::FAST_FLASH.union(Features::ENH_VERIFY);
const S: Features = Features::SPY_BI_WIRE;

const fn row(
    id: u16,
    name: &'static str,
    features: Features,
    ram_start: u16,
    ram_end: u16,
    main_start: u16,
) -> DeviceDescriptor {
    DeviceDescriptor {
        id,
        name,
        features,
        ram_start,
        ram_end,
        main_start,
    }
}

/// Known devices, then the generic fallback as the last row
pub static DEVICES: [DeviceDescriptor; 26] = [
    row(0xF112, "MSP430F11x(1)", Q.union(J), 0x0200, 0x02FF, 0xF000),
    row(0x1132, "MSP430F11x2", T.union(Q).union(J), 0x0200, 0x02FF, 0xE000),
    row(0xF123, "MSP430F12x", Q.union(J), 0x0200, 0x02FF, 0xE000),
    row(0x1232, "MSP430F12x2", T.union(Q).union(J), 0x0200, 0x02FF, 0xE000),
    row(0xF149, "MSP430F13x/F14x", Q.union(J), 0x0200, 0x09FF, 0x1100),
    row(0xF169, "MSP430F16x", Q.union(J), 0x0200, 0x09FF, 0x1100),
    row(0xF16C, "MSP430F161x", Q.union(J), 0x1100, 0x38FF, 0x4000),
    row(0xF413, "MSP430F41x", Q.union(J), 0x0200, 0x02FF, 0xE000),
    row(0xF427, "MSP430FE42x", Q.union(J), 0x0200, 0x05FF, 0x8000),
    row(0xF439, "MSP430F43x", Q.union(J), 0x0200, 0x09FF, 0x1100),
    row(0xF449, "MSP430F44x", Q.union(J), 0x0200, 0x09FF, 0x1100),
    row(0xF46F, "MSP430FG46xx", X.union(Q).union(F2).union(J), 0x1100, 0x20FF, 0x3100),
    row(0xF47F, "MSP430F47xx", X.union(Q).union(F2).union(J), 0x1100, 0x20FF, 0x3100),
    row(0xF41F, "MSP430F41x2", T.union(Q).union(F2).union(S), 0x0200, 0x03FF, 0x8000),
    row(0xF201, "MSP430F20x1", T.union(Q).union(F2).union(S), 0x0200, 0x027F, 0xF800),
    row(0xF202, "MSP430F20x2", T.union(Q).union(F2).union(S), 0x0200, 0x027F, 0xF800),
    row(0xF203, "MSP430F20x3", T.union(Q).union(F2).union(S), 0x0200, 0x027F, 0xF800),
    row(0xF213, "MSP430F21x1", T.union(Q).union(F2).union(J), 0x0200, 0x02FF, 0xE000),
    row(0xF223, "MSP430F22xx", T.union(Q).union(F2).union(J).union(S), 0x0200, 0x03FF, 0x8000),
    row(0xF234, "MSP430F23x", Q.union(F2).union(J), 0x0200, 0x05FF, 0x8000),
    row(0xF249, "MSP430F24x", Q.union(F2).union(J), 0x0200, 0x09FF, 0x1100),
    row(0xF26F, "MSP430F261x", X.union(Q).union(F2).union(J), 0x1100, 0x30FF, 0x3100),
    row(0x2553, "MSP430G2x53", T.union(Q).union(F2).union(S), 0x0200, 0x03FF, 0xC000),
    row(0x2452, "MSP430G2x52", T.union(Q).union(F2).union(S), 0x0200, 0x02FF, 0xE000),
    row(0x2231, "MSP430G2x31", T.union(Q).union(F2).union(S), 0x0200, 0x027F, 0xF800),
    // Slowest erase, no quick access, no enhanced verify: safe for anything
    row(GENERIC_ID, "generic", J, 0x0200, 0x02FF, 0x1100),
];

pub const GENERIC_ID: u16 = 0xFFFF;

/// Index of a row in `DEVICES`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceHandle(usize);

impl DeviceHandle {
    pub fn descriptor(self) -> &'static DeviceDescriptor {
        &DEVICES[self.0]
    }
}

/// Outcome of looking up a device ID.  An unknown ID still programs using the generic row, but
/// the caller can tell the difference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Known(DeviceHandle),
    Generic { id: u16 },
}

impl Resolution {
    pub fn descriptor(&self) -> &'static DeviceDescriptor {
        match self {
            Resolution::Known(handle) => handle.descriptor(),
            Resolution::Generic { .. } => &DEVICES[DEVICES.len() - 1],
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Resolution::Known(_))
    }

    /// The ID that was read from the target
    pub fn id(&self) -> u16 {
        match self {
            Resolution::Known(handle) => handle.descriptor().id,
            Resolution::Generic { id } => *id,
        }
    }
}

/// Linear scan of the table for an exact ID match
pub fn resolve(id: u16) -> Resolution {
    let known = &DEVICES[..DEVICES.len() - 1];
    match known.iter().position(|d| d.id == id) {
        Some(index) => Resolution::Known(DeviceHandle(index)),
        None => Resolution::Generic { id },
    }
}
