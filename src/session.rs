//! Connection lifecycle and memory access.  A `Session` exists only while the target is under
//! JTAG control: `Session::connect` brings the CPU under control and identifies it, and
//! `Session::release` hands it back.
use embedded_hal::delay::DelayNs;
use log::{debug, info, warn};

use crate::device::{self, DeviceDescriptor, Resolution};
use crate::error::{Error, Result};
use crate::port::Port;
use crate::tap::{ir, Format, Jtag, JTAG_ID};

/// Bits of the JTAG control signal register, and the combinations the sequences use
pub mod cntrl {
    pub const READ: u16 = 0x0001;
    pub const HALT_JTAG: u16 = 0x0008;
    pub const BYTE: u16 = 0x0010;
    pub const INSTR_LOAD: u16 = 0x0080;
    pub const TCE: u16 = 0x0200;
    pub const TCE1: u16 = 0x0400;
    pub const PUC: u16 = 0x0800;
    pub const CPU_RW: u16 = 0x1000;
    pub const TAGFUNCSAT: u16 = 0x2000;

    /// JTAG owns the bus, CPU running, read
    pub const JTAG_READ: u16 = TAGFUNCSAT | TCE1 | READ;
    pub const RESET: u16 = JTAG_READ | PUC;
    /// CPU drives R/W and BYTE so it can execute a fed instruction
    pub const CPU_READ: u16 = JTAG_READ | CPU_RW;
    pub const HALT_WRITE: u16 = TAGFUNCSAT | TCE1 | HALT_JTAG;
    pub const HALT_READ: u16 = HALT_WRITE | READ;
}

/// Where the device ID word lives
pub const DEVICE_ID_ADDR: u16 = 0x0FF0;
pub const WDTCTL: u16 = 0x0120;
/// Watchdog password plus hold
pub const WDT_HOLD: u16 = 0x5A80;

/// `release` address meaning "reset the target" rather than "start at this PC"
pub const V_RESET: u16 = 0xFFFE;

const MAX_ENTRY_TRY: u32 = 8;
const SYNC_POLLS: u32 = 50;
const FUSE_CHECKS: u32 = 3;
const INSTR_FETCH_POLLS: u32 = 50;
const FUSE_BLOWN_READBACK: u16 = 0x5555;

/// `mov #imm, PC`
const MOV_IMM_PC: u16 = 0x4030;
/// `jmp $`
const JMP_SELF: u16 = 0x3FFF;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReleaseTarget {
    /// Reset the target, so it starts from its reset vector
    Reset,
    /// Load the program counter and let the CPU run from there
    Pc(u16),
}

impl From<u16> for ReleaseTarget {
    fn from(addr: u16) -> Self {
        if addr == V_RESET {
            ReleaseTarget::Reset
        } else {
            ReleaseTarget::Pc(addr)
        }
    }
}

pub struct Session<P, D> {
    pub(crate) jtag: Jtag<P, D>,
    device: Resolution,
    /// Value OR'd into FCTL3 writes to toggle LOCKA
    pub(crate) info_a_key: u16,
}

impl<P, D> Session<P, D>
where
    P: Port,
    D: DelayNs,
{
    /// Enter JTAG mode, take control of the CPU and identify the device.  The lines are released
    /// again if anything fails.
    pub fn connect(jtag: Jtag<P, D>) -> Result<Self> {
        let mut session = Session {
            jtag,
            device: Resolution::Generic { id: 0 },
            info_a_key: 0,
        };
        match session.get_device() {
            Ok(()) => Ok(session),
            Err(e) => {
                session.jtag.stop();
                Err(e)
            }
        }
    }

    fn get_device(&mut self) -> Result<()> {
        for attempt in 1..=MAX_ENTRY_TRY {
            self.jtag.start();
            let id = self.jtag.ir_shift(ir::BYPASS);
            if id == JTAG_ID {
                debug!("JTAG ID 0x{:02X} on attempt {}", id, attempt);
                break;
            }
            debug!("entry attempt {}: JTAG ID 0x{:02X}", attempt, id);
            self.jtag.stop();
            if attempt == MAX_ENTRY_TRY {
                return Err(Error::ConnectionTimeout {
                    attempts: attempt,
                    last_id: id,
                });
            }
        }

        self.jtag.reset_tap();
        if self.is_fuse_blown() {
            return Err(Error::FuseBlown);
        }

        // Request the bus and wait for the CPU to synchronize
        self.jtag.ir_shift(ir::CNTRL_SIG_16BIT);
        self.jtag.dr_shift16(cntrl::JTAG_READ);
        self.jtag.ir_shift(ir::CNTRL_SIG_CAPTURE);
        let synced = (0..SYNC_POLLS).any(|_| self.jtag.dr_shift16(0x0000) & cntrl::TCE != 0);
        if !synced {
            return Err(Error::SyncTimeout { polls: SYNC_POLLS });
        }

        let id = self.read_mem(Format::Word, DEVICE_ID_ADDR)?.swap_bytes();
        self.device = device::resolve(id);
        match self.device {
            Resolution::Known(handle) => info!("found {} (0x{:04X})", handle.descriptor().name, id),
            Resolution::Generic { id } => warn!("unknown device 0x{:04X}, using generic parameters", id),
        }

        self.execute_por()
    }

    /// Security fuse check.  A blown fuse turns every data register into a 1-bit bypass, so
    /// 0xAAAA comes back shifted by one.  The first read after reset is unreliable.
    fn is_fuse_blown(&mut self) -> bool {
        for _ in 0..FUSE_CHECKS {
            self.jtag.ir_shift(ir::CNTRL_SIG_CAPTURE);
            if self.jtag.dr_shift16(0xAAAA) == FUSE_BLOWN_READBACK {
                warn!("JTAG fuse is blown");
                return true;
            }
        }
        false
    }

    pub fn device(&self) -> Resolution {
        self.device
    }

    pub fn descriptor(&self) -> &'static DeviceDescriptor {
        self.device.descriptor()
    }

    pub fn jtag(&self) -> &Jtag<P, D> {
        &self.jtag
    }

    pub fn jtag_mut(&mut self) -> &mut Jtag<P, D> {
        &mut self.jtag
    }

    /// Allow Info Segment A to be erased and written for the rest of the session
    pub fn unlock_info_a(&mut self) {
        self.info_a_key = crate::flash::fctl::LOCKA;
    }

    /// Power-on reset through JTAG, leaving the watchdog held
    pub fn execute_por(&mut self) -> Result<()> {
        self.jtag.ir_shift(ir::CNTRL_SIG_16BIT);
        self.jtag.dr_shift16(cntrl::RESET);
        self.jtag.dr_shift16(cntrl::JTAG_READ);
        self.jtag.clr_tclk();
        self.jtag.set_tclk();
        self.jtag.clr_tclk();
        self.jtag.set_tclk();
        self.jtag.clr_tclk();
        let version = self.jtag.ir_shift(ir::ADDR_CAPTURE);
        self.jtag.set_tclk();
        self.write_mem(Format::Word, WDTCTL, WDT_HOLD)?;

        if version != JTAG_ID {
            return Err(Error::IdMismatch {
                expected: JTAG_ID,
                found: version,
            });
        }
        Ok(())
    }

    /// Wait for the CPU to reach an instruction fetch, leaving TCLK high
    pub fn set_instr_fetch(&mut self) -> Result<()> {
        self.jtag.ir_shift(ir::CNTRL_SIG_CAPTURE);
        for _ in 0..INSTR_FETCH_POLLS {
            if self.jtag.dr_shift16(0x0000) & cntrl::INSTR_LOAD != 0 {
                return Ok(());
            }
            self.jtag.clr_tclk();
            self.jtag.set_tclk();
        }
        Err(Error::InstrFetchTimeout)
    }

    /// Feed the CPU a `mov #addr, PC`
    pub fn set_pc(&mut self, addr: u16) -> Result<()> {
        self.set_instr_fetch()?;
        self.jtag.ir_shift(ir::CNTRL_SIG_16BIT);
        self.jtag.dr_shift16(cntrl::CPU_READ);
        self.jtag.ir_shift(ir::DATA_16BIT);
        self.jtag.dr_shift16(MOV_IMM_PC);
        self.jtag.clr_tclk();
        self.jtag.set_tclk();
        self.jtag.dr_shift16(addr);
        self.jtag.clr_tclk();
        self.jtag.set_tclk();
        self.jtag.ir_shift(ir::ADDR_CAPTURE);
        self.jtag.clr_tclk();
        self.jtag.ir_shift(ir::CNTRL_SIG_16BIT);
        self.jtag.dr_shift16(cntrl::JTAG_READ);
        debug!("PC = 0x{:04X}", addr);
        Ok(())
    }

    pub fn halt_cpu(&mut self) -> Result<()> {
        self.set_instr_fetch()?;
        self.jtag.ir_shift(ir::DATA_16BIT);
        self.jtag.dr_shift16(JMP_SELF);
        self.jtag.clr_tclk();
        self.jtag.ir_shift(ir::CNTRL_SIG_16BIT);
        self.jtag.dr_shift16(cntrl::HALT_READ);
        self.jtag.set_tclk();
        Ok(())
    }

    pub fn release_cpu(&mut self) {
        self.jtag.clr_tclk();
        self.jtag.ir_shift(ir::CNTRL_SIG_16BIT);
        self.jtag.dr_shift16(cntrl::JTAG_READ);
        self.jtag.ir_shift(ir::ADDR_CAPTURE);
        self.jtag.set_tclk();
    }

    pub fn read_mem(&mut self, format: Format, addr: u16) -> Result<u16> {
        self.halt_cpu()?;
        self.jtag.clr_tclk();
        self.jtag.ir_shift(ir::CNTRL_SIG_16BIT);
        self.jtag.dr_shift16(match format {
            Format::Word => cntrl::HALT_READ,
            Format::Byte => cntrl::HALT_READ | cntrl::BYTE,
        });
        self.jtag.ir_shift(ir::ADDR_16BIT);
        self.jtag.dr_shift16(addr);
        self.jtag.ir_shift(ir::DATA_TO_ADDR);
        self.jtag.set_tclk();
        self.jtag.clr_tclk();
        let data = self.jtag.dr_shift16(0x0000);
        self.jtag.set_tclk();
        self.release_cpu();

        let data = match format {
            Format::Word => data,
            Format::Byte => data & 0x00FF,
        };
        debug!("read 0x{:04X} = 0x{:04X}", addr, data);
        Ok(data)
    }

    pub fn write_mem(&mut self, format: Format, addr: u16, data: u16) -> Result<()> {
        self.halt_cpu()?;
        self.jtag.clr_tclk();
        self.jtag.ir_shift(ir::CNTRL_SIG_16BIT);
        self.jtag.dr_shift16(match format {
            Format::Word => cntrl::HALT_WRITE,
            Format::Byte => cntrl::HALT_WRITE | cntrl::BYTE,
        });
        self.jtag.ir_shift(ir::ADDR_16BIT);
        self.jtag.dr_shift16(addr);
        self.jtag.ir_shift(ir::DATA_TO_ADDR);
        self.jtag.dr_shift16(data);
        self.jtag.set_tclk();
        self.release_cpu();
        debug!("write 0x{:04X} = 0x{:04X}", addr, data);
        Ok(())
    }

    /// Read `buf.len()` words from `start` with the PC auto-incrementing on each TCLK
    pub fn read_mem_quick(&mut self, start: u16, buf: &mut [u16]) -> Result<()> {
        self.set_pc(start.wrapping_sub(4))?;
        self.halt_cpu()?;
        self.jtag.clr_tclk();
        self.jtag.ir_shift(ir::CNTRL_SIG_16BIT);
        self.jtag.dr_shift16(cntrl::HALT_READ);
        self.jtag.ir_shift(ir::DATA_QUICK);
        for word in buf.iter_mut() {
            self.jtag.set_tclk();
            self.jtag.clr_tclk();
            *word = self.jtag.dr_shift16(0x0000);
        }
        self.jtag.set_tclk();
        self.release_cpu();
        Ok(())
    }

    /// Write `data` to RAM or peripherals from `start`.  Not for flash.
    pub fn write_mem_quick(&mut self, start: u16, data: &[u16]) -> Result<()> {
        self.set_pc(start.wrapping_sub(4))?;
        self.halt_cpu()?;
        self.jtag.clr_tclk();
        self.jtag.ir_shift(ir::CNTRL_SIG_16BIT);
        self.jtag.dr_shift16(cntrl::HALT_WRITE);
        self.jtag.ir_shift(ir::DATA_QUICK);
        for &word in data {
            self.jtag.dr_shift16(word);
            self.jtag.set_tclk();
            self.jtag.clr_tclk();
        }
        self.jtag.set_tclk();
        self.release_cpu();
        Ok(())
    }

    /// Read a block using quick access when the device has it, one word at a time otherwise
    pub fn read_mem_block(&mut self, start: u16, buf: &mut [u16]) -> Result<()> {
        if self.descriptor().has_data_quick() {
            return self.read_mem_quick(start, buf);
        }
        for (i, word) in buf.iter_mut().enumerate() {
            *word = self.read_mem(Format::Word, start.wrapping_add(2 * i as u16))?;
        }
        Ok(())
    }

    /// Hand the target back: either reset it or start it at `target`'s PC, then leave JTAG
    /// mode and release the lines.
    pub fn release(mut self, target: ReleaseTarget) -> (P, D) {
        match target {
            ReleaseTarget::Reset => {
                self.jtag.ir_shift(ir::CNTRL_SIG_16BIT);
                self.jtag.dr_shift16(cntrl::RESET);
                self.jtag.dr_shift16(cntrl::JTAG_READ);
            }
            ReleaseTarget::Pc(addr) => {
                if let Err(e) = self.set_pc(addr) {
                    warn!("could not set PC to 0x{:04X}: {}", addr, e);
                }
            }
        }
        self.jtag.ir_shift(ir::CNTRL_SIG_RELEASE);
        self.jtag.stop();
        info!("target released ({:?})", target);
        self.jtag.into_parts()
    }

    /// Leave the target as it is and release the lines
    pub fn abort(mut self) -> (P, D) {
        self.jtag.stop();
        self.jtag.into_parts()
    }
}
