//! A software MSP430 target behind the `Port` contract.
//!
//! `SimTarget` follows the wires the way the silicon does: TCK rising edges walk a TAP
//! controller, TDI edges in Run-Test/Idle clock the CPU, and the JTAG data registers reach a
//! 64 KiB memory with a flash controller in front of the flash ranges.  It is good enough to run
//! every sequence in this crate end to end and to count what they did, but it is not a CPU: fed
//! instructions are only recognised far enough to load the program counter.
use alloc::collections::BTreeMap;
use alloc::vec;
use alloc::vec::Vec;

use embedded_hal::delay::DelayNs;
use log::{debug, warn};

use crate::device::{self, DeviceDescriptor};
use crate::flash::fctl;
use crate::port::{Port, Signals};
use crate::session::{cntrl, DEVICE_ID_ADDR, WDTCTL};
use crate::statemachine::JtagState;
use crate::tap::{ir, JTAG_ID};

const INFO_START: u16 = 0x1000;
const INFO_A: u16 = 0x10C0;
const INFO_END: u32 = 0x1100;
const MAIN_SEGMENT: u32 = 0x200;
const INFO_SEGMENT: u32 = 0x40;
const RESET_VECTOR: u16 = 0xFFFE;

/// Delay that returns immediately
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDelay;

impl DelayNs for NoDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimConfig {
    pub device_id: u16,
    /// Answered by every IR capture
    pub jtag_id: u8,
    /// Answered by IR captures once a power-up clear has been requested through JTAG
    pub jtag_id_after_por: u8,
    pub fuse_blown: bool,
    /// Entry attempts that get no answer before the pins make contact.  `u32::MAX` never does.
    pub failed_entries: u32,
    /// Control-capture polls answered without TCE before the CPU syncs, `None` to never sync
    pub sync_delay: Option<u32>,
    /// Control-capture polls answered without INSTR_LOAD before each instruction fetch, `None`
    /// to never reach one
    pub fetch_delay: Option<u32>,
    pub info_a_locked: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            device_id: 0xF149,
            jtag_id: JTAG_ID,
            jtag_id_after_por: JTAG_ID,
            fuse_blown: false,
            failed_entries: 0,
            sync_delay: Some(2),
            fetch_delay: Some(0),
            info_a_locked: true,
        }
    }
}

/// One erase started by a write to flash
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EraseEvent {
    /// FCTL1 at the time of the trigger write
    pub fctl1: u16,
    pub address: u16,
    /// TCLK rising edges seen while the erase was running
    pub strobes: u32,
}

pub struct SimTarget {
    config: SimConfig,
    descriptor: &'static DeviceDescriptor,
    mem: Vec<u8>,
    stuck: BTreeMap<u16, u16>,

    out: Signals,
    contacted: bool,
    state: JtagState,
    ir: u8,
    ir_sr: u8,
    dr_sr: u16,
    bypass: bool,
    tdo: bool,

    cntrl: u16,
    addr: u16,
    data: u16,
    quick_pending: bool,
    pc: u16,
    halted: bool,
    mov_pc: bool,
    psa: u16,
    psa_preload: Option<u16>,
    sync_count: u32,
    synced: bool,
    por_requested: bool,
    instr_load: bool,
    fetch_wait: u32,
    fetches: u32,
    fetch_limit: Option<u32>,
    cpu_released: bool,

    fctl1: u16,
    fctl3: u16,
    wdt_held: bool,
    erase_busy: bool,

    entries: u32,
    erases: Vec<EraseEvent>,
    psa_runs: Vec<u16>,
    programmed: Vec<u16>,
    resets: u32,
    releases: u32,
    violations: u32,
    stalled_polls: u32,
}

impl SimTarget {
    pub fn new(config: SimConfig) -> Self {
        let descriptor = device::resolve(config.device_id).descriptor();
        let mut mem = vec![0u8; 0x1_0000];
        mem[INFO_START as usize..INFO_END as usize].fill(0xFF);
        mem[descriptor.main_start as usize..].fill(0xFF);
        let [hi, lo] = config.device_id.to_be_bytes();
        mem[DEVICE_ID_ADDR as usize] = hi;
        mem[DEVICE_ID_ADDR as usize + 1] = lo;

        let fctl3 = if config.info_a_locked {
            fctl::LOCK | fctl::LOCKA
        } else {
            fctl::LOCK
        };

        Self {
            config,
            descriptor,
            mem,
            stuck: BTreeMap::new(),
            out: Signals::empty(),
            contacted: false,
            state: JtagState::Reset,
            ir: ir::BYPASS,
            ir_sr: 0,
            dr_sr: 0,
            bypass: true,
            tdo: true,
            cntrl: 0,
            addr: 0,
            data: 0,
            quick_pending: false,
            pc: 0,
            halted: false,
            mov_pc: false,
            psa: 0,
            psa_preload: None,
            sync_count: 0,
            synced: false,
            por_requested: false,
            instr_load: true,
            fetch_wait: 0,
            fetches: 0,
            fetch_limit: None,
            cpu_released: false,
            fctl1: 0,
            fctl3,
            wdt_held: false,
            erase_busy: false,
            entries: 0,
            erases: Vec::new(),
            psa_runs: Vec::new(),
            programmed: Vec::new(),
            resets: 0,
            releases: 0,
            violations: 0,
            stalled_polls: 0,
        }
    }

    pub fn descriptor(&self) -> &'static DeviceDescriptor {
        self.descriptor
    }

    /// Word at `addr`, bypassing the flash controller
    pub fn peek(&self, addr: u16) -> u16 {
        let a = (addr & !1) as usize;
        u16::from_le_bytes([self.mem[a], self.mem[a + 1]])
    }

    pub fn poke(&mut self, addr: u16, value: u16) {
        let a = (addr & !1) as usize;
        self.mem[a..a + 2].copy_from_slice(&value.to_le_bytes());
    }

    /// Store `words` from `addr` directly, as if programmed earlier
    pub fn load(&mut self, addr: u16, words: &[u16]) {
        for (i, &word) in words.iter().enumerate() {
            self.poke(addr.wrapping_add(2 * i as u16), word);
        }
    }

    /// Flash bits in `mask` at `addr` stay 1 when programmed
    pub fn stick_bits(&mut self, addr: u16, mask: u16) {
        *self.stuck.entry(addr & !1).or_insert(0) |= mask;
    }

    /// Times the lines were driven
    pub fn entries(&self) -> u32 {
        self.entries
    }

    pub fn erases(&self) -> &[EraseEvent] {
        &self.erases
    }

    /// Start address of each PSA run
    pub fn psa_runs(&self) -> &[u16] {
        &self.psa_runs
    }

    /// Address of every flash word programmed, in order
    pub fn programmed(&self) -> &[u16] {
        &self.programmed
    }

    /// Power-up clears caused through JTAG
    pub fn resets(&self) -> u32 {
        self.resets
    }

    /// Times the lines were released
    pub fn releases(&self) -> u32 {
        self.releases
    }

    /// Flash accesses the controller would have flagged
    pub fn violations(&self) -> u32 {
        self.violations
    }

    /// Instruction fetches the CPU has reached under JTAG control
    pub fn fetches(&self) -> u32 {
        self.fetches
    }

    /// Control-capture polls of a synchronized CPU answered without INSTR_LOAD
    pub fn stalled_polls(&self) -> u32 {
        self.stalled_polls
    }

    /// The CPU reaches `fetches` more instruction fetches, then hangs
    pub fn hang_after_fetches(&mut self, fetches: u32) {
        self.fetch_limit = Some(self.fetches + fetches);
    }

    pub fn pc(&self) -> u16 {
        self.pc
    }

    pub fn watchdog_held(&self) -> bool {
        self.wdt_held
    }

    /// Whether CNTRL_SIG_RELEASE has been shifted since the lines were last driven
    pub fn cpu_released(&self) -> bool {
        self.cpu_released
    }

    pub fn info_a_locked(&self) -> bool {
        self.fctl3 & fctl::LOCKA != 0
    }

    pub fn flash_locked(&self) -> bool {
        self.fctl3 & fctl::LOCK != 0
    }

    fn is_flash(&self, addr: u16) -> bool {
        (INFO_START as u32..INFO_END).contains(&(addr as u32)) || addr >= self.descriptor.main_start
    }

    fn fill(&mut self, start: u32, end: u32) {
        self.mem[start as usize..end as usize].fill(0xFF);
    }

    fn violation(&mut self, what: &str, addr: u16, value: u16) {
        warn!("sim: {} at 0x{:04X} (0x{:04X})", what, addr, value);
        self.violations += 1;
    }

    fn puc(&mut self) {
        self.pc = self.peek(RESET_VECTOR);
        self.halted = false;
        self.fctl1 = fctl::KEY;
        self.fctl3 |= fctl::LOCK;
        self.wdt_held = false;
        self.erase_busy = false;
        self.resets += 1;
        debug!("sim: PUC, PC 0x{:04X}", self.pc);
    }

    fn mem_read(&self, addr: u16, byte: bool) -> u16 {
        match addr & !1 {
            fctl::FCTL1 => 0x9600 | (self.fctl1 & 0xFF),
            fctl::FCTL2 => 0x9600 | (fctl::FCTL2_MCLK & 0xFF),
            fctl::FCTL3 => 0x9600 | (self.fctl3 & 0xFF),
            WDTCTL => 0x6900 | (self.wdt_held as u16) << 7,
            _ if byte => {
                let b = self.mem[addr as usize] as u16;
                (b << 8) | b
            }
            a => self.peek(a),
        }
    }

    fn mem_write(&mut self, addr: u16, value: u16, byte: bool) {
        let keyed = value & 0xFF00 == fctl::KEY;
        match addr & !1 {
            WDTCTL => {
                if value >> 8 == 0x5A {
                    self.wdt_held = value & 0x0080 != 0;
                } else {
                    self.violation("watchdog password", addr, value);
                }
            }
            fctl::FCTL1 if keyed => {
                self.fctl1 = value;
                if value & (fctl::ERASE | fctl::MERAS) == 0 {
                    self.erase_busy = false;
                }
            }
            fctl::FCTL2 if keyed => {}
            fctl::FCTL3 if keyed => {
                if value & fctl::LOCKA != 0 {
                    self.fctl3 ^= fctl::LOCKA;
                }
                self.fctl3 = (self.fctl3 & !fctl::LOCK) | (value & fctl::LOCK);
            }
            fctl::FCTL1 | fctl::FCTL2 | fctl::FCTL3 => {
                self.violation("flash password", addr, value);
            }
            a if self.is_flash(a) => self.flash_write(a, value),
            _ if byte => self.mem[addr as usize] = value as u8,
            a => self.poke(a, value),
        }
    }

    fn flash_write(&mut self, addr: u16, value: u16) {
        if self.fctl3 & fctl::LOCK != 0 {
            self.violation("write to locked flash", addr, value);
            return;
        }
        if (INFO_A..INFO_END as u16).contains(&addr) && self.info_a_locked() {
            debug!("sim: Info A locked, write to 0x{:04X} ignored", addr);
            return;
        }

        if self.fctl1 & (fctl::ERASE | fctl::MERAS) != 0 {
            self.erase(addr);
            self.erases.push(EraseEvent {
                fctl1: self.fctl1,
                address: addr,
                strobes: 0,
            });
            self.erase_busy = true;
        } else if self.fctl1 & fctl::WRT != 0 {
            let stuck = self.stuck.get(&addr).copied().unwrap_or(0);
            let old = self.peek(addr);
            self.poke(addr, old & (value | stuck));
            self.programmed.push(addr);
        } else {
            self.violation("flash write outside erase/write mode", addr, value);
        }
    }

    fn erase(&mut self, addr: u16) {
        let main_start = self.descriptor.main_start as u32;
        let addr = addr as u32;
        if self.fctl1 & fctl::MERAS != 0 {
            self.fill(main_start, 0x1_0000);
            if self.fctl1 & fctl::ERASE != 0 {
                self.fill(INFO_START as u32, INFO_A as u32);
                if !self.info_a_locked() {
                    self.fill(INFO_A as u32, INFO_END);
                }
            }
        } else if addr >= main_start {
            let base = addr & !(MAIN_SEGMENT - 1);
            self.fill(base.max(main_start), base + MAIN_SEGMENT);
        } else {
            let base = addr & !(INFO_SEGMENT - 1);
            self.fill(base, base + INFO_SEGMENT);
        }
    }

    fn psa_step(psa: u16, word: u16) -> u16 {
        let fed = if psa & 0x8000 != 0 { psa ^ 0x0805 } else { psa };
        (fed << 1 | psa >> 15) ^ word
    }

    fn reading(&self) -> bool {
        self.cntrl & cntrl::READ != 0
    }

    fn poll_fetch(&mut self) {
        let hung = matches!(self.fetch_limit, Some(limit) if self.fetches >= limit);
        let due = matches!(self.config.fetch_delay, Some(n) if self.fetch_wait >= n);
        self.instr_load = due && !hung;
        if self.instr_load {
            self.fetch_wait = 0;
            self.fetches += 1;
        } else {
            self.fetch_wait += 1;
            self.stalled_polls += 1;
        }
    }

    fn tclk_rise(&mut self) {
        let busy = self.erase_busy;
        self.psa_preload = None;

        if self.cntrl & cntrl::HALT_JTAG != 0 {
            if !self.halted {
                self.halted = true;
                self.pc = self.pc.wrapping_add(2);
            }
        } else {
            self.halted = false;
        }

        let byte = self.cntrl & cntrl::BYTE != 0;
        match self.ir {
            ir::DATA_TO_ADDR if !self.reading() => self.mem_write(self.addr, self.data, byte),
            ir::DATA_QUICK => {
                self.pc = self.pc.wrapping_add(2);
                // Only the word shifted in since the last TCLK is stored
                if !self.reading() && self.quick_pending {
                    self.mem_write(self.pc, self.data, byte);
                    self.quick_pending = false;
                }
            }
            ir::DATA_PSA => {
                self.pc = self.pc.wrapping_add(2);
                self.psa = Self::psa_step(self.psa, self.peek(self.pc));
            }
            _ => {}
        }

        if busy && self.erase_busy {
            if let Some(event) = self.erases.last_mut() {
                event.strobes += 1;
            }
        }
    }

    fn update_ir(&mut self) {
        self.ir = self.ir_sr;
        self.quick_pending = false;
        match self.ir {
            ir::DATA_PSA => {
                if let Some(start) = self.psa_preload.take() {
                    self.pc = start;
                }
                self.psa = self.pc;
                self.psa_runs.push(self.pc.wrapping_add(2));
            }
            ir::CNTRL_SIG_RELEASE => self.cpu_released = true,
            _ => {}
        }
    }

    fn capture_dr(&mut self) {
        let known = matches!(
            self.ir,
            ir::CNTRL_SIG_16BIT
                | ir::CNTRL_SIG_CAPTURE
                | ir::ADDR_16BIT
                | ir::ADDR_CAPTURE
                | ir::DATA_TO_ADDR
                | ir::DATA_16BIT
                | ir::DATA_QUICK
                | ir::DATA_PSA
                | ir::SHIFT_OUT_PSA
        );
        self.bypass = self.config.fuse_blown || !known;
        if self.bypass {
            self.dr_sr = 0;
            return;
        }

        if self.ir == ir::CNTRL_SIG_CAPTURE {
            if self.synced {
                self.poll_fetch();
            } else if self.cntrl & cntrl::TCE1 != 0 {
                self.sync_count += 1;
                self.synced = matches!(self.config.sync_delay, Some(n) if self.sync_count > n);
            }
        }

        self.dr_sr = match self.ir {
            ir::CNTRL_SIG_16BIT | ir::CNTRL_SIG_CAPTURE => {
                let tce = if self.synced { cntrl::TCE } else { 0 };
                let load = if self.instr_load { cntrl::INSTR_LOAD } else { 0 };
                self.cntrl | load | tce
            }
            ir::ADDR_16BIT | ir::ADDR_CAPTURE => self.addr,
            ir::DATA_TO_ADDR if self.reading() => {
                self.mem_read(self.addr, self.cntrl & cntrl::BYTE != 0)
            }
            ir::DATA_QUICK if self.reading() => self.peek(self.pc),
            ir::DATA_TO_ADDR | ir::DATA_QUICK | ir::DATA_16BIT => self.data,
            ir::SHIFT_OUT_PSA => self.psa,
            _ => 0,
        };
    }

    fn update_dr(&mut self) {
        if self.bypass {
            return;
        }
        let value = self.dr_sr;
        match self.ir {
            ir::CNTRL_SIG_16BIT => {
                self.cntrl = value;
                if value & cntrl::PUC != 0 {
                    self.por_requested = true;
                    self.puc();
                }
            }
            ir::ADDR_16BIT => self.addr = value,
            ir::DATA_TO_ADDR => self.data = value,
            ir::DATA_QUICK => {
                self.data = value;
                self.quick_pending = true;
            }
            ir::DATA_16BIT => {
                self.data = value;
                // The CPU executes what it is fed only while it owns the bus
                if self.cntrl & cntrl::CPU_RW != 0 {
                    if self.mov_pc {
                        self.pc = value;
                        self.mov_pc = false;
                    } else if value == 0x4030 {
                        self.mov_pc = true;
                    }
                } else if self.halted && self.descriptor.has_enh_verify() {
                    // Start address for the next PSA run
                    self.psa_preload = Some(value);
                }
            }
            _ => {}
        }
    }

    /// Act on a rising TCK edge, then advance the TAP
    fn clock(&mut self, tms: bool, tdi: bool) {
        match self.state {
            JtagState::Reset => self.ir = ir::BYPASS,
            JtagState::CaptureIR => {
                self.ir_sr = if self.por_requested {
                    self.config.jtag_id_after_por
                } else {
                    self.config.jtag_id
                }
            }
            JtagState::ShiftIR => {
                self.tdo = self.ir_sr & 0x80 != 0;
                self.ir_sr = (self.ir_sr << 1) | tdi as u8;
            }
            JtagState::UpdateIR => self.update_ir(),
            JtagState::CaptureDR => self.capture_dr(),
            JtagState::ShiftDR if self.bypass => {
                self.tdo = self.dr_sr & 1 != 0;
                self.dr_sr = tdi as u16;
            }
            JtagState::ShiftDR => {
                self.tdo = self.dr_sr & 0x8000 != 0;
                self.dr_sr = (self.dr_sr << 1) | tdi as u16;
            }
            JtagState::UpdateDR => self.update_dr(),
            _ => {}
        }
        self.state = self.state.next(tms);
    }

    fn drive_lines(&mut self, new: Signals) {
        let old = self.out;
        self.out = new;
        if !self.contacted {
            return;
        }
        if !old.contains(Signals::TCK) && new.contains(Signals::TCK) {
            self.clock(new.contains(Signals::TMS), new.contains(Signals::TDI));
        }
        if self.state == JtagState::Idle
            && !old.contains(Signals::TCLK)
            && new.contains(Signals::TCLK)
        {
            self.tclk_rise();
        }
    }
}

impl Port for SimTarget {
    fn set(&mut self, signals: Signals) {
        self.drive_lines(self.out | signals);
    }

    fn clear(&mut self, signals: Signals) {
        self.drive_lines(self.out & !signals);
    }

    fn read(&mut self) -> Signals {
        // TDO floats high without contact
        if !self.contacted || self.tdo {
            Signals::TDO
        } else {
            Signals::empty()
        }
    }

    fn drive(&mut self) {
        self.entries += 1;
        self.cpu_released = false;
        self.por_requested = false;
        self.contacted = self.entries > self.config.failed_entries;
        self.state = JtagState::Reset;
    }

    fn release(&mut self) {
        self.out = Signals::empty();
        self.contacted = false;
        self.state = JtagState::Reset;
        self.ir = ir::BYPASS;
        self.cntrl = 0;
        self.synced = false;
        self.sync_count = 0;
        self.halted = false;
        self.psa_preload = None;
        self.instr_load = true;
        self.fetch_wait = 0;
        self.releases += 1;
    }
}
