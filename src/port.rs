//! The GPIO contract the JTAG engine is built on.  Every JTAG signal is one bit in a
//! set-output / clear-output / read-input register triple; implementations of `Port` map those
//! bits onto real pins (`gpio::GpioPort`) or onto a software target (`sim::SimTarget`).
use bitflags::bitflags;

pub mod gpio;
pub mod sim;

bitflags! {
    /// One bit per JTAG line.  TCLK is not a separate wire: it is TDI while the TAP sits in
    /// Run-Test/Idle.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Signals: u8 {
        const TMS = 1 << 0;
        const TDI = 1 << 1;
        const TDO = 1 << 2;
        const TCK = 1 << 3;
        const RST = 1 << 4;
        const TST = 1 << 5;
    }
}

impl Signals {
    pub const TCLK: Signals = Signals::TDI;
    pub const OUTPUTS: Signals = Signals::TMS
        .union(Signals::TDI)
        .union(Signals::TCK)
        .union(Signals::RST)
        .union(Signals::TST);
}

pub trait Port {
    /// Drive every line in `signals` high.
    fn set(&mut self, signals: Signals);
    /// Drive every line in `signals` low.
    fn clear(&mut self, signals: Signals);
    /// Sample the input lines.  Only `Signals::TDO` is meaningful.
    fn read(&mut self) -> Signals;

    /// Switch the output lines from high impedance to driven
    fn drive(&mut self) {}
    /// Return every line to high impedance
    fn release(&mut self) {}
}

impl<P: Port + ?Sized> Port for &mut P {
    fn set(&mut self, signals: Signals) {
        (**self).set(signals)
    }

    fn clear(&mut self, signals: Signals) {
        (**self).clear(signals)
    }

    fn read(&mut self) -> Signals {
        (**self).read()
    }

    fn drive(&mut self) {
        (**self).drive()
    }

    fn release(&mut self) {
        (**self).release()
    }
}

impl<P: Port + ?Sized> Port for alloc::boxed::Box<P> {
    fn set(&mut self, signals: Signals) {
        (**self).set(signals)
    }

    fn clear(&mut self, signals: Signals) {
        (**self).clear(signals)
    }

    fn read(&mut self) -> Signals {
        (**self).read()
    }

    fn drive(&mut self) {
        (**self).drive()
    }

    fn release(&mut self) {
        (**self).release()
    }
}
