//! Board and run configuration.  Retry bounds and flash timing are fixed by the silicon and live
//! next to the code that uses them; only what differs between boards and production lines is here.
use alloc::vec;
use alloc::vec::Vec;

use crate::session::ReleaseTarget;

/// How the target is switched from normal operation into JTAG mode
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum EntrySequence {
    /// Devices with a TEST pin: pulse TEST with RST held, selecting 4-wire JTAG
    #[default]
    TestPin,
    /// Devices with dedicated JTAG pins: hold RST high and wait
    RstOnly,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct JtagConfig {
    pub entry: EntrySequence,
    /// Delay after each TCK edge in nanoseconds, zero to run as fast as the GPIO allows
    pub half_period_ns: u32,
}

impl JtagConfig {
    pub fn with_entry(mut self, entry: EntrySequence) -> Self {
        self.entry = entry;
        self
    }

    /// Set the TCK frequency (approximate, via half-period calculation)
    pub fn with_clock_khz(mut self, khz: u32) -> Self {
        if khz > 0 {
            self.half_period_ns = 500_000 / khz;
        }
        self
    }
}

/// A flash range that is segment-erased and erase-checked on every run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
    pub address: u16,
    /// Length in 16-bit words
    pub words: u16,
}

impl Region {
    pub const fn new(address: u16, words: u16) -> Self {
        Self { address, words }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProgramConfig {
    pub jtag: JtagConfig,
    /// Word-aligned RAM address used by the read/write self-test, `None` for the start of the
    /// device's RAM
    pub ram_test_addr: Option<u16>,
    /// Any address in main memory; selects the array for the mass erase
    pub mass_erase_addr: u16,
    /// Regions re-erased and erase-checked after the mass erase
    pub protected: Vec<Region>,
    /// Allow Info Segment A to be erased and programmed
    pub unlock_info_a: bool,
    pub release: ReleaseTarget,
}

impl Default for ProgramConfig {
    fn default() -> Self {
        Self {
            jtag: JtagConfig::default(),
            ram_test_addr: None,
            mass_erase_addr: 0xFE00,
            // Top main segment (reset vector) and Info Segment D
            protected: vec![Region::new(0xFE00, 0x0100), Region::new(0x1000, 0x0020)],
            unlock_info_a: false,
            release: ReleaseTarget::Reset,
        }
    }
}

impl ProgramConfig {
    pub fn with_jtag(mut self, jtag: JtagConfig) -> Self {
        self.jtag = jtag;
        self
    }

    pub fn with_ram_test_addr(mut self, addr: u16) -> Self {
        self.ram_test_addr = Some(addr);
        self
    }

    pub fn with_protected(mut self, protected: Vec<Region>) -> Self {
        self.protected = protected;
        self
    }

    pub fn with_unlock_info_a(mut self, unlock: bool) -> Self {
        self.unlock_info_a = unlock;
        self
    }

    pub fn with_release(mut self, release: ReleaseTarget) -> Self {
        self.release = release;
        self
    }
}
