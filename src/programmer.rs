//! The production programming run: connect, check RAM, erase, program and verify every section,
//! and hand the target back.  The first failing step ends the run; the target is left in
//! whatever state that step reached.
use core::fmt;

use embedded_hal::delay::DelayNs;
use log::{error, info};

use crate::config::ProgramConfig;
use crate::device::Resolution;
use crate::error::{Error, Result};
use crate::flash::EraseMode;
use crate::image::MemoryImage;
use crate::port::Port;
use crate::session::Session;
use crate::tap::{Format, Jtag};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    Parse,
    Connect,
    RamTest,
    UnlockInfoA,
    MassErase,
    EraseProtected,
    Program,
    Release,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::Parse => "parse image",
            Step::Connect => "connect",
            Step::RamTest => "RAM self-test",
            Step::UnlockInfoA => "unlock Info A",
            Step::MassErase => "mass erase",
            Step::EraseProtected => "erase protected regions",
            Step::Program => "program and verify",
            Step::Release => "release",
        };
        f.write_str(name)
    }
}

/// What a successful run did
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Report {
    pub device: Resolution,
    pub sections: usize,
    pub words: usize,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.device {
            Resolution::Known(handle) => {
                let d = handle.descriptor();
                write!(f, "{} (0x{:04X})", d.name, d.id)?;
            }
            Resolution::Generic { id } => write!(f, "unknown device 0x{:04X} (generic)", id)?,
        }
        write!(f, ": {} sections, {} words", self.sections, self.words)
    }
}

/// Byte pair written to RAM and read back as one word
const RAM_TEST_LOW: u8 = 0x34;
const RAM_TEST_HIGH: u8 = 0x12;

fn check<T>(step: Step, result: Result<T>) -> Result<T> {
    if let Err(e) = &result {
        error!("{} failed: {}", step, e);
    }
    result
}

pub struct Programmer {
    config: ProgramConfig,
}

impl Programmer {
    pub fn new(config: ProgramConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProgramConfig {
        &self.config
    }

    /// Parse a TI-TXT image and program it
    pub fn program_text<P, D>(&self, port: P, delay: D, text: &str) -> Result<Report>
    where
        P: Port,
        D: DelayNs,
    {
        info!("{}", Step::Parse);
        let image = check(Step::Parse, MemoryImage::parse(text))?;
        self.program(port, delay, &image)
    }

    pub fn program<P, D>(&self, port: P, delay: D, image: &MemoryImage) -> Result<Report>
    where
        P: Port,
        D: DelayNs,
    {
        info!("{}", Step::Connect);
        let jtag = Jtag::new(port, delay, &self.config.jtag);
        let mut session = check(Step::Connect, Session::connect(jtag))?;

        match self.run(&mut session, image) {
            Ok(words) => {
                info!("{}", Step::Release);
                let device = session.device();
                session.release(self.config.release);
                let report = Report {
                    device,
                    sections: image.sections().len(),
                    words,
                };
                info!("done: {}", report);
                Ok(report)
            }
            Err(e) => {
                session.abort();
                Err(e)
            }
        }
    }

    fn run<P, D>(&self, session: &mut Session<P, D>, image: &MemoryImage) -> Result<usize>
    where
        P: Port,
        D: DelayNs,
    {
        info!("{}", Step::RamTest);
        check(Step::RamTest, self.ram_test(session))?;

        if self.config.unlock_info_a {
            info!("{}", Step::UnlockInfoA);
            session.unlock_info_a();
        }

        info!("{}", Step::MassErase);
        check(
            Step::MassErase,
            session.erase_flash(EraseMode::Mass, self.config.mass_erase_addr),
        )?;

        info!("{}", Step::EraseProtected);
        for region in &self.config.protected {
            check(
                Step::EraseProtected,
                session
                    .erase_flash(EraseMode::Segment, region.address)
                    .and_then(|()| session.erase_check(region.address, region.words as usize)),
            )?;
        }

        info!("{}", Step::Program);
        check(Step::Program, session.write_flash_all_sections(image))
    }

    /// Two byte writes read back as one word proves the address, data and byte-lane paths
    fn ram_test<P, D>(&self, session: &mut Session<P, D>) -> Result<()>
    where
        P: Port,
        D: DelayNs,
    {
        let addr = self
            .config
            .ram_test_addr
            .unwrap_or(session.descriptor().ram_start)
            & !1;
        session.write_mem(Format::Byte, addr, RAM_TEST_LOW as u16)?;
        session.write_mem(Format::Byte, addr + 1, RAM_TEST_HIGH as u16)?;

        let expected = u16::from_le_bytes([RAM_TEST_LOW, RAM_TEST_HIGH]);
        let found = session.read_mem(Format::Word, addr)?;
        if found != expected {
            return Err(Error::RamSelfTest { expected, found });
        }
        Ok(())
    }
}
