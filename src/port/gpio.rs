use core::convert::Infallible;

use embedded_hal::digital::{InputPin, OutputPin, PinState};

use crate::port::{Port, Signals};

/// A `Port` built from individual `embedded-hal` pins.  Pins must be infallible, which is the
/// case for memory-mapped GPIO on microcontrollers.
pub struct GpioPort<Tms, Tdi, Tdo, Tck, Rst, Tst>
where
    Tms: OutputPin<Error = Infallible>,
    Tdi: OutputPin<Error = Infallible>,
    Tdo: InputPin<Error = Infallible>,
    Tck: OutputPin<Error = Infallible>,
    Rst: OutputPin<Error = Infallible>,
    Tst: OutputPin<Error = Infallible>,
{
    tms: Tms,
    tdi: Tdi,
    tdo: Tdo,
    tck: Tck,
    rst: Rst,
    tst: Tst,
}

impl<Tms, Tdi, Tdo, Tck, Rst, Tst> GpioPort<Tms, Tdi, Tdo, Tck, Rst, Tst>
where
    Tms: OutputPin<Error = Infallible>,
    Tdi: OutputPin<Error = Infallible>,
    Tdo: InputPin<Error = Infallible>,
    Tck: OutputPin<Error = Infallible>,
    Rst: OutputPin<Error = Infallible>,
    Tst: OutputPin<Error = Infallible>,
{
    pub fn new(tms: Tms, tdi: Tdi, tdo: Tdo, tck: Tck, rst: Rst, tst: Tst) -> Self {
        Self {
            tms,
            tdi,
            tdo,
            tck,
            rst,
            tst,
        }
    }

    fn write(&mut self, signals: Signals, state: PinState) {
        let ok = |r: Result<(), Infallible>| r.unwrap_or_else(|e| match e {});
        if signals.contains(Signals::TMS) {
            ok(self.tms.set_state(state));
        }
        if signals.contains(Signals::TDI) {
            ok(self.tdi.set_state(state));
        }
        if signals.contains(Signals::TCK) {
            ok(self.tck.set_state(state));
        }
        if signals.contains(Signals::RST) {
            ok(self.rst.set_state(state));
        }
        if signals.contains(Signals::TST) {
            ok(self.tst.set_state(state));
        }
    }
}

impl<Tms, Tdi, Tdo, Tck, Rst, Tst> Port for GpioPort<Tms, Tdi, Tdo, Tck, Rst, Tst>
where
    Tms: OutputPin<Error = Infallible>,
    Tdi: OutputPin<Error = Infallible>,
    Tdo: InputPin<Error = Infallible>,
    Tck: OutputPin<Error = Infallible>,
    Rst: OutputPin<Error = Infallible>,
    Tst: OutputPin<Error = Infallible>,
{
    fn set(&mut self, signals: Signals) {
        self.write(signals, PinState::High);
    }

    fn clear(&mut self, signals: Signals) {
        self.write(signals, PinState::Low);
    }

    fn read(&mut self) -> Signals {
        let high = self.tdo.is_high().unwrap_or_else(|e| match e {});
        if high {
            Signals::TDO
        } else {
            Signals::empty()
        }
    }

    fn release(&mut self) {
        // Push-pull pins cannot float; park TEST low so the target leaves JTAG mode.
        self.clear(Signals::TMS | Signals::TDI | Signals::TCK | Signals::TST);
        self.set(Signals::RST);
    }
}
