//! This crate programs the flash of MSP430 microcontrollers over a bit-banged 4-wire JTAG
//! interface.  It is layered the same way as the hardware protocol.
//!
//! At the lowest level, the `Port` trait is the GPIO contract: set, clear and read a handful of
//! lines (TMS, TDI, TDO, TCK, RST, TEST).  `GpioPort` implements it over `embedded-hal` pins, and
//! `SimTarget` implements it with a software MSP430 so everything above can run without
//! silicon.
//!
//! `Jtag` drives the TAP through a `Port`.  It keeps track of the TAP state and of the TCLK
//! level (TCLK is TDI while the TAP idles, and single-steps the halted CPU), and shifts the 8-bit
//! instructions and 16-bit data words the MSP430 JTAG interface uses.
//!
//! A `Session` is a connected target.  `Session::connect` enters JTAG mode, takes control of the
//! CPU and identifies the device against a static table; the session then offers memory access,
//! flash erase and programming, and PSA verification.  `Session::release` hands the target back.
//!
//! `Programmer` runs the whole production sequence for a TI-TXT image.
//!
//! # Example
//! ```
//! use msp430_jtag::port::sim::{NoDelay, SimConfig, SimTarget};
//! use msp430_jtag::{ProgramConfig, Programmer};
//!
//! let mut target = SimTarget::new(SimConfig::default());
//! let programmer = Programmer::new(ProgramConfig::default());
//! let report = programmer
//!     .program_text(&mut target, NoDelay, "@C000\n31 40 00 03\n@FFFE\n00 C0\nq\n")
//!     .unwrap();
//! assert_eq!(report.words, 3);
//! assert_eq!(target.peek(0xFFFE), 0xC000);
//! ```

#![no_std]

#[cfg(feature = "std")]
extern crate std;

extern crate alloc;

pub mod config;
pub mod device;
pub mod error;
pub mod flash;
pub mod image;
pub mod port;
pub mod programmer;
pub mod session;
pub mod statemachine;
pub mod tap;

pub use config::{EntrySequence, JtagConfig, ProgramConfig, Region};
pub use device::{resolve, DeviceDescriptor, Resolution};
pub use error::{Error, Result, Status};
pub use flash::EraseMode;
pub use image::{MemoryImage, Section};
pub use port::{Port, Signals};
pub use programmer::{Programmer, Report, Step};
pub use session::{ReleaseTarget, Session};
pub use tap::{Format, Jtag};
