//! Flash erase, programming and PSA verification.
//!
//! The flash controller runs from TCLK while the CPU is halted, so erase and program cycles are
//! timed by counting TCLK strobes.  Verification does not read memory back: the target's PSA
//! generator walks the range and only its 16-bit signature is compared against one computed
//! locally.
use embedded_hal::delay::DelayNs;
use log::{debug, error, info};

use crate::error::{Error, Result};
use crate::image::MemoryImage;
use crate::port::Port;
use crate::session::{cntrl, Session};
use crate::tap::ir;

/// Flash controller registers and bits
pub mod fctl {
    pub const FCTL1: u16 = 0x0128;
    pub const FCTL2: u16 = 0x012A;
    pub const FCTL3: u16 = 0x012C;
    /// Password in the high byte of every write
    pub const KEY: u16 = 0xA500;

    pub const ERASE: u16 = 0x0002;
    pub const MERAS: u16 = 0x0004;
    pub const GMERAS: u16 = 0x0008;
    pub const WRT: u16 = 0x0040;

    pub const LOCK: u16 = 0x0010;
    /// Toggles on writing 1
    pub const LOCKA: u16 = 0x0040;

    /// MCLK as flash clock, divider 1
    pub const FCTL2_MCLK: u16 = KEY | 0x0040;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EraseMode {
    /// Main and info of all memory arrays
    Glob,
    /// Main of all memory arrays
    AllMain,
    /// Main and info of the selected array
    Mass,
    /// Main of the selected array
    Main,
    /// The segment holding the erase address
    Segment,
}

impl EraseMode {
    /// FCTL1 value that selects this mode
    pub const fn fctl1(self) -> u16 {
        match self {
            EraseMode::Glob => 0xA50E,
            EraseMode::AllMain => 0xA50C,
            EraseMode::Mass => 0xA506,
            EraseMode::Main => 0xA504,
            EraseMode::Segment => 0xA502,
        }
    }

    fn is_bulk(self) -> bool {
        self != EraseMode::Segment
    }
}

const SEGMENT_STROBES: u32 = 4820;
const FAST_MASS_STROBES: u32 = 10600;
const MASS_STROBES: u32 = 5300;
/// Older flash needs the mass erase cycle repeated
const MASS_PASSES: u32 = 19;
/// At least 33 are needed on F149 and F449
const WRITE_STROBES: u32 = 35;

const ERASE_TRIGGER: u16 = 0x55AA;
const ERASED: u16 = 0xFFFF;
const PSA_POLY: u16 = 0x0805;

/// Advance a PSA signature by one word
pub fn psa_step(psa: u16, word: u16) -> u16 {
    let next = if psa & 0x8000 != 0 {
        ((psa ^ PSA_POLY) << 1) | 0x0001
    } else {
        psa << 1
    };
    next ^ word
}

/// Signature the target computes over `words` starting at `start`
pub fn psa_signature(start: u16, words: impl IntoIterator<Item = u16>) -> u16 {
    words
        .into_iter()
        .fold(start.wrapping_sub(2), psa_step)
}

fn check_range(start: u16, words: usize) -> Result<()> {
    let end = start as u32 + 2 * words as u32;
    if end > 0x1_0000 {
        return Err(Error::AddressOutOfRange { address: end });
    }
    Ok(())
}

impl<P, D> Session<P, D>
where
    P: Port,
    D: DelayNs,
{
    /// Load `value` into the register at `addr` through the address/data scan chain.  The caller
    /// clocks TCLK to complete the write.
    fn load(&mut self, addr: u16, value: u16) {
        self.jtag.ir_shift(ir::ADDR_16BIT);
        self.jtag.dr_shift16(addr);
        self.jtag.ir_shift(ir::DATA_TO_ADDR);
        self.jtag.dr_shift16(value);
    }

    fn load_and_clock(&mut self, addr: u16, value: u16) {
        self.load(addr, value);
        self.jtag.set_tclk();
        self.jtag.clr_tclk();
    }

    /// Restore LOCK (and LOCKA if it was toggled open), then give the CPU back
    fn lock_flash(&mut self) {
        self.jtag.clr_tclk();
        self.load(fctl::FCTL3, fctl::KEY | fctl::LOCK | self.info_a_key);
        self.jtag.set_tclk();
        self.release_cpu();
    }

    /// Erase in `mode`, `addr` being any address inside the segment or array to erase
    pub fn erase_flash(&mut self, mode: EraseMode, addr: u16) -> Result<()> {
        let (strobes, passes) = if !mode.is_bulk() {
            (SEGMENT_STROBES, 1)
        } else if self.descriptor().has_fast_flash() {
            (FAST_MASS_STROBES, 1)
        } else {
            (MASS_STROBES, MASS_PASSES)
        };
        info!(
            "erase {:?} at 0x{:04X}: {} passes of {} strobes",
            mode, addr, passes, strobes
        );

        for pass in 0..passes {
            if let Err(e) = self.halt_cpu() {
                // Earlier passes left the controller unlocked
                if pass > 0 {
                    self.lock_flash();
                }
                return Err(e);
            }
            self.jtag.clr_tclk();
            self.jtag.ir_shift(ir::CNTRL_SIG_16BIT);
            self.jtag.dr_shift16(cntrl::HALT_WRITE);
            self.load_and_clock(fctl::FCTL1, mode.fctl1());
            self.load_and_clock(fctl::FCTL2, fctl::FCTL2_MCLK);
            // LOCKA toggles, so only open it once
            let key = if pass == 0 { self.info_a_key } else { 0 };
            self.load_and_clock(fctl::FCTL3, fctl::KEY | key);
            // Dummy write starts the erase
            self.load_and_clock(addr, ERASE_TRIGGER);

            self.jtag.ir_shift(ir::CNTRL_SIG_16BIT);
            self.jtag.dr_shift16(cntrl::HALT_READ);
            self.jtag.tclk_strobes(strobes);

            self.jtag.ir_shift(ir::CNTRL_SIG_16BIT);
            self.jtag.dr_shift16(cntrl::HALT_WRITE);
            self.load(fctl::FCTL1, fctl::KEY);
            self.jtag.set_tclk();
            debug!("erase pass {} done", pass + 1);
        }

        self.lock_flash();
        Ok(())
    }

    /// Program `data` into flash at `start`.  Bits can only be cleared; the range must have been
    /// erased.
    pub fn write_flash(&mut self, start: u16, data: &[u16]) -> Result<()> {
        check_range(start, data.len())?;
        debug!("program {} words at 0x{:04X}", data.len(), start);

        self.halt_cpu()?;
        self.jtag.clr_tclk();
        self.jtag.ir_shift(ir::CNTRL_SIG_16BIT);
        self.jtag.dr_shift16(cntrl::HALT_WRITE);
        self.load_and_clock(fctl::FCTL1, fctl::KEY | fctl::WRT);
        self.load_and_clock(fctl::FCTL2, fctl::FCTL2_MCLK);
        self.load_and_clock(fctl::FCTL3, fctl::KEY | self.info_a_key);
        self.jtag.ir_shift(ir::CNTRL_SIG_16BIT);

        let mut addr = start;
        for &word in data {
            self.jtag.dr_shift16(cntrl::HALT_WRITE);
            self.load(addr, word);
            self.jtag.set_tclk();
            self.jtag.clr_tclk();
            self.jtag.ir_shift(ir::CNTRL_SIG_16BIT);
            self.jtag.dr_shift16(cntrl::HALT_READ);
            self.jtag.tclk_strobes(WRITE_STROBES);
            addr = addr.wrapping_add(2);
        }

        self.jtag.ir_shift(ir::CNTRL_SIG_16BIT);
        self.jtag.dr_shift16(cntrl::HALT_WRITE);
        self.load(fctl::FCTL1, fctl::KEY);
        self.jtag.set_tclk();
        self.lock_flash();
        Ok(())
    }

    /// Compare the target's PSA over `length` words at `start` with the expected signature of
    /// `data`, or of erased flash when `data` is `None`.  Words past the end of `data` are
    /// expected erased.
    fn verify_psa(&mut self, start: u16, length: usize, data: Option<&[u16]>) -> Result<()> {
        check_range(start, length)?;

        let enhanced = self.descriptor().has_enh_verify();
        self.execute_por()?;
        if enhanced {
            self.set_pc(start.wrapping_sub(4))?;
            self.halt_cpu()?;
            self.jtag.clr_tclk();
            self.jtag.ir_shift(ir::DATA_16BIT);
            self.jtag.dr_shift16(start.wrapping_sub(2));
        } else {
            self.set_pc(start.wrapping_sub(2))?;
            self.jtag.set_tclk();
            self.jtag.clr_tclk();
        }

        self.jtag.ir_shift(ir::DATA_PSA);
        let mut expected = start.wrapping_sub(2);
        for i in 0..length {
            let word = data.and_then(|d| d.get(i).copied()).unwrap_or(ERASED);
            expected = psa_step(expected, word);
            // One PSA cycle: TCLK high through Select, Capture, Shift, Exit1, Update, Idle
            self.jtag.set_tclk();
            self.jtag.clock_tms(&[true, false, false, true, true, false]);
            self.jtag.clr_tclk();
        }

        self.jtag.ir_shift(ir::SHIFT_OUT_PSA);
        let actual = self.jtag.dr_shift16(0x0000);
        self.jtag.set_tclk();
        if enhanced {
            self.release_cpu();
        }

        if actual != expected {
            return Err(Error::VerifyMismatch {
                start,
                length,
                expected,
                actual,
            });
        }
        Ok(())
    }

    /// Check that `length` words from `start` are erased
    pub fn erase_check(&mut self, start: u16, length: usize) -> Result<()> {
        self.verify_psa(start, length, None)
    }

    /// Check that memory from `start` holds `data`
    pub fn verify_mem(&mut self, start: u16, data: &[u16]) -> Result<()> {
        self.verify_psa(start, data.len(), Some(data))
    }

    /// Program and verify every section of `image` in order.  The first section that fails to
    /// verify ends the run; later sections are not touched.
    pub fn write_flash_all_sections(&mut self, image: &MemoryImage) -> Result<usize> {
        let mut total = 0;
        for (index, section) in image.sections().iter().enumerate() {
            let start = section.start()?;
            info!(
                "section {}: {} words at 0x{:04X}",
                index,
                section.len(),
                start
            );
            self.write_flash(start, &section.data)?;
            if let Err(e) = self.verify_mem(start, &section.data) {
                error!("section {} failed verification: {}", index, e);
                return Err(Error::SectionWriteFailure {
                    section: index,
                    address: section.address,
                });
            }
            total += section.len();
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JtagConfig;
    use crate::port::sim::{NoDelay, SimConfig, SimTarget};
    use crate::tap::Jtag;
    use alloc::vec;

    #[test]
    fn erase_mode_registers() {
        assert_eq!(EraseMode::Glob.fctl1(), fctl::KEY | fctl::GMERAS | fctl::MERAS | fctl::ERASE);
        assert_eq!(EraseMode::AllMain.fctl1(), fctl::KEY | fctl::GMERAS | fctl::MERAS);
        assert_eq!(EraseMode::Mass.fctl1(), fctl::KEY | fctl::MERAS | fctl::ERASE);
        assert_eq!(EraseMode::Main.fctl1(), fctl::KEY | fctl::MERAS);
        assert_eq!(EraseMode::Segment.fctl1(), fctl::KEY | fctl::ERASE);
    }

    #[test]
    fn psa_feedback() {
        assert_eq!(psa_step(0x0001, 0x0000), 0x0002);
        // MSB set: xor polynomial, shift, set bit 0
        assert_eq!(psa_step(0x8000, 0x0000), 0x100B);
        assert_eq!(psa_step(0x8000, 0x100B), 0x0000);
    }

    #[test]
    fn signature_is_seeded_with_start_minus_two() {
        assert_eq!(psa_signature(0xC000, []), 0xBFFE);
        assert_eq!(psa_signature(0xC000, [0x1234]), psa_step(0xBFFE, 0x1234));
    }

    #[test]
    fn single_bit_errors_change_signature() {
        let erased = vec![ERASED; 16];
        let good = psa_signature(0xF000, erased.iter().copied());
        for word in 0..erased.len() {
            for bit in 0..16 {
                let mut bad = erased.clone();
                bad[word] ^= 1 << bit;
                assert_ne!(psa_signature(0xF000, bad), good, "word {} bit {}", word, bit);
            }
        }
    }

    #[test]
    fn short_data_is_padded_with_erased_words() {
        let mut target = SimTarget::new(SimConfig::default());
        let jtag = Jtag::new(&mut target, NoDelay, &JtagConfig::default());
        let mut session = Session::connect(jtag).unwrap();
        assert_eq!(session.verify_psa(0xC000, 3, Some(&[ERASED][..])), Ok(()));
        assert!(session.verify_psa(0xC000, 3, Some(&[0x0000][..])).is_err());
        assert_eq!(session.verify_psa(0xC000, 2, Some(&[][..])), Ok(()));
        session.abort();
    }

    #[test]
    fn range_check() {
        assert!(check_range(0xFE00, 0x100).is_ok());
        assert_eq!(
            check_range(0xFE00, 0x101),
            Err(Error::AddressOutOfRange { address: 0x1_0002 })
        );
    }
}
