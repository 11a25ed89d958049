//! Bit-bang and shift primitives.  `Jtag` owns the port and the delay, tracks the TAP state and
//! the TCLK level, and exposes the MSP430 flavour of IR/DR scans: fixed-length, MSB first, always
//! starting and ending in Run-Test/Idle.
use embedded_hal::delay::DelayNs;
use log::trace;

use crate::config::{EntrySequence, JtagConfig};
use crate::port::{Port, Signals};
use crate::statemachine::JtagState;

/// JTAG instructions, bit-reversed so they can be shifted MSB first
pub mod ir {
    pub const CNTRL_SIG_16BIT: u8 = 0xC8;
    pub const CNTRL_SIG_CAPTURE: u8 = 0x28;
    pub const CNTRL_SIG_RELEASE: u8 = 0xA8;
    pub const DATA_16BIT: u8 = 0x82;
    pub const DATA_QUICK: u8 = 0xC2;
    pub const DATA_PSA: u8 = 0x22;
    pub const SHIFT_OUT_PSA: u8 = 0x62;
    pub const ADDR_16BIT: u8 = 0xC1;
    pub const ADDR_CAPTURE: u8 = 0x21;
    pub const DATA_TO_ADDR: u8 = 0xA1;
    pub const BYPASS: u8 = 0xFF;
}

/// JTAG ID returned by the IR capture of 1xx, 2xx and 4xx devices
pub const JTAG_ID: u8 = 0x89;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    Byte = 8,
    Word = 16,
}

pub struct Jtag<P, D> {
    port: P,
    delay: D,
    state: JtagState,
    tms: bool,
    tclk: bool,
    half_period_ns: u32,
    entry: EntrySequence,
}

impl<P, D> Jtag<P, D>
where
    P: Port,
    D: DelayNs,
{
    pub fn new(port: P, delay: D, config: &JtagConfig) -> Self {
        Self {
            port,
            delay,
            state: JtagState::Reset,
            tms: true,
            tclk: true,
            half_period_ns: config.half_period_ns,
            entry: config.entry,
        }
    }

    pub fn into_parts(self) -> (P, D) {
        (self.port, self.delay)
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    /// Where the TAP is believed to be
    pub fn state(&self) -> JtagState {
        self.state
    }

    /// Latched TCLK level
    pub fn tclk(&self) -> bool {
        self.tclk
    }

    pub fn delay_us(&mut self, us: u32) {
        self.delay.delay_us(us);
    }

    pub fn delay_ms(&mut self, ms: u32) {
        self.delay.delay_ms(ms);
    }

    fn line(&mut self, signal: Signals, high: bool) {
        if high {
            self.port.set(signal);
        } else {
            self.port.clear(signal);
        }
    }

    fn set_tms(&mut self, high: bool) {
        self.tms = high;
        self.line(Signals::TMS, high);
    }

    fn set_tdi(&mut self, high: bool) {
        self.line(Signals::TDI, high);
    }

    fn half_period(&mut self) {
        if self.half_period_ns > 0 {
            self.delay.delay_ns(self.half_period_ns);
        }
    }

    /// One TCK cycle.  TCK idles high; the TAP advances on the rising edge.
    fn tck(&mut self) {
        self.port.clear(Signals::TCK);
        self.half_period();
        self.port.set(Signals::TCK);
        self.state = self.state.next(self.tms);
        self.half_period();
    }

    fn tdo(&mut self) -> bool {
        self.port.read().contains(Signals::TDO)
    }

    pub fn set_tclk(&mut self) {
        self.port.set(Signals::TCLK);
        self.tclk = true;
    }

    pub fn clr_tclk(&mut self) {
        self.port.clear(Signals::TCLK);
        self.tclk = false;
    }

    /// Give the target `count` full TCLK periods, ending low
    pub fn tclk_strobes(&mut self, count: u32) {
        for _ in 0..count {
            self.set_tclk();
            self.clr_tclk();
        }
    }

    /// Clock a series of TMS values, keeping TDI at the latched TCLK level
    pub fn clock_tms(&mut self, tms: &[bool]) {
        for &t in tms {
            self.set_tms(t);
            self.tck();
        }
    }

    /// Use TMS to get into `state` by the most efficient path
    pub fn goto(&mut self, state: JtagState) {
        let path = self.state.path(state);
        self.clock_tms(&path);
    }

    /// Shift `format` bits of `data` MSB first while capturing TDO, then move through Update to
    /// Run-Test/Idle.  Must be called in Shift-DR or Shift-IR.  TDI is put back to the latched
    /// TCLK level before the TAP reaches Run-Test/Idle, so the halted CPU never sees a stray
    /// clock.
    pub fn shift(&mut self, format: Format, data: u16) -> u16 {
        debug_assert!(self.state.is_shift(), "shift from {:?}", self.state);

        let mut tdo = 0u16;
        for bit in (0..format as u16).rev() {
            self.set_tdi(data & (1 << bit) != 0);
            if bit == 0 {
                // last bit leaves Shift-xR
                self.set_tms(true);
            }
            self.tck();
            tdo = (tdo << 1) | self.tdo() as u16;
        }

        let tclk = self.tclk;
        self.set_tdi(tclk);
        // Exit1 -> Update
        self.tck();
        self.set_tms(false);
        // Update -> Run-Test/Idle
        self.tck();
        tdo
    }

    /// Load an 8-bit instruction, returning the captured IR (the JTAG ID)
    pub fn ir_shift(&mut self, instruction: u8) -> u8 {
        debug_assert_eq!(self.state, JtagState::Idle);
        self.goto(JtagState::ShiftIR);
        let id = self.shift(Format::Byte, instruction as u16) as u8;
        trace!("IR 0x{:02X} -> 0x{:02X}", instruction, id);
        id
    }

    /// Exchange 16 bits with the data register selected by the current instruction
    pub fn dr_shift16(&mut self, data: u16) -> u16 {
        debug_assert_eq!(self.state, JtagState::Idle);
        self.goto(JtagState::ShiftDR);
        let out = self.shift(Format::Word, data);
        trace!("DR 0x{:04X} -> 0x{:04X}", data, out);
        out
    }

    /// Force Test-Logic-Reset with TMS high, settle in Run-Test/Idle, then hold TMS low twice so
    /// the target can sense its security fuse.
    pub fn reset_tap(&mut self) {
        self.set_tclk();
        self.set_tms(true);
        self.port.set(Signals::TCK);
        for _ in 0..6 {
            self.tck();
        }
        debug_assert_eq!(self.state, JtagState::Reset);

        self.set_tms(false);
        self.tck();
        self.set_tms(true);

        for _ in 0..2 {
            self.set_tms(false);
            self.delay.delay_us(5);
            self.set_tms(true);
        }
        trace!("TAP reset");
    }

    /// Drive the lines and run the board's JTAG entry sequence, then reset the TAP.
    pub fn start(&mut self) {
        self.port.drive();
        self.port.set(Signals::TMS | Signals::TCK | Signals::TCLK);
        self.tms = true;
        self.tclk = true;

        match self.entry {
            EntrySequence::TestPin => {
                self.port.clear(Signals::TST);
                self.delay.delay_ms(4);
                self.port.set(Signals::RST);
                self.port.set(Signals::TST);
                self.delay.delay_ms(20);

                self.port.clear(Signals::RST);
                self.delay.delay_us(40);
                // TEST low then high while RST is low selects 4-wire JTAG
                self.port.clear(Signals::TST);
                self.delay.delay_us(1);
                self.port.set(Signals::TST);
                self.delay.delay_us(40);
                self.port.set(Signals::RST);
                self.delay.delay_ms(5);
            }
            EntrySequence::RstOnly => {
                self.port.set(Signals::RST);
                self.delay.delay_ms(5);
            }
        }

        // The target's TAP state is unknown until the reset below
        self.state = JtagState::Reset;
        self.reset_tap();
    }

    /// Release all lines
    pub fn stop(&mut self) {
        self.port.release();
        self.state = JtagState::Reset;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::sim::NoDelay;
    use alloc::vec::Vec;

    /// TDO wired straight to TDI
    #[derive(Default)]
    struct Loopback {
        out: Signals,
    }

    impl Port for Loopback {
        fn set(&mut self, signals: Signals) {
            self.out |= signals;
        }

        fn clear(&mut self, signals: Signals) {
            self.out &= !signals;
        }

        fn read(&mut self) -> Signals {
            if self.out.contains(Signals::TDI) {
                Signals::TDO
            } else {
                Signals::empty()
            }
        }
    }

    /// Follows the TAP from the wire and records TDI edges seen in Run-Test/Idle
    struct Watcher {
        out: Signals,
        state: JtagState,
        tclk_edges: Vec<bool>,
    }

    impl Watcher {
        fn new() -> Self {
            Self {
                out: Signals::empty(),
                state: JtagState::Reset,
                tclk_edges: Vec::new(),
            }
        }

        fn update(&mut self, new: Signals) {
            let old = self.out;
            self.out = new;
            if !old.contains(Signals::TCK) && new.contains(Signals::TCK) {
                self.state = self.state.next(new.contains(Signals::TMS));
            }
            if self.state == JtagState::Idle && (old ^ new).contains(Signals::TDI) {
                self.tclk_edges.push(new.contains(Signals::TDI));
            }
        }
    }

    impl Port for Watcher {
        fn set(&mut self, signals: Signals) {
            self.update(self.out | signals);
        }

        fn clear(&mut self, signals: Signals) {
            self.update(self.out & !signals);
        }

        fn read(&mut self) -> Signals {
            Signals::empty()
        }
    }

    fn jtag<P: Port>(port: P) -> Jtag<P, NoDelay> {
        let mut jtag = Jtag::new(port, NoDelay, &JtagConfig::default());
        jtag.reset_tap();
        jtag
    }

    #[test]
    fn loopback_shift_returns_input() {
        let mut jtag = jtag(Loopback::default());
        for x in [0x0000, 0xFFFF, 0x1234, 0x8001, 0xA55A, 0x5555] {
            assert_eq!(jtag.dr_shift16(x), x);
        }
        assert_eq!(jtag.ir_shift(0x89), 0x89);
        assert_eq!(jtag.state(), JtagState::Idle);
    }

    #[test]
    fn shift_restores_tclk_level() {
        let mut jtag = jtag(Loopback::default());
        jtag.clr_tclk();
        jtag.dr_shift16(0xFFFF);
        assert!(!jtag.port().out.contains(Signals::TDI));
        jtag.set_tclk();
        jtag.dr_shift16(0x0000);
        assert!(jtag.port().out.contains(Signals::TDI));
    }

    #[test]
    fn shifts_never_clock_the_cpu() {
        let mut jtag = jtag(Watcher::new());
        jtag.port_mut().tclk_edges.clear();

        jtag.clr_tclk();
        jtag.ir_shift(ir::DATA_16BIT);
        jtag.dr_shift16(0xAAAA);
        jtag.set_tclk();
        jtag.dr_shift16(0x5555);
        jtag.ir_shift(ir::BYPASS);

        // Only the two explicit TCLK changes reach the idle TAP
        assert_eq!(jtag.port().tclk_edges, [false, true]);
        assert_eq!(jtag.port().state, JtagState::Idle);
    }

    #[test]
    fn strobes_end_low() {
        let mut jtag = jtag(Watcher::new());
        jtag.clr_tclk();
        jtag.port_mut().tclk_edges.clear();
        jtag.tclk_strobes(35);
        let rising = jtag.port().tclk_edges.iter().filter(|e| **e).count();
        assert_eq!(rising, 35);
        assert!(!jtag.tclk());
    }
}
