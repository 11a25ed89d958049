//! Error and status types shared by every layer of the programmer.

use thiserror::Error;

/// What was wrong with a line of a text image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageErrorKind {
    /// Data appeared before the first `@address` line
    DataBeforeAddress,
    /// The text after `@` is not a hex address
    BadAddress,
    /// A data token is not a hex byte
    BadByte,
}

impl core::fmt::Display for ImageErrorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::DataBeforeAddress => write!(f, "data before first address line"),
            Self::BadAddress => write!(f, "malformed section address"),
            Self::BadByte => write!(f, "malformed data byte"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    /// The target never answered with the expected JTAG ID during entry
    #[error("no JTAG response after {attempts} entry attempts (last ID 0x{last_id:02X})")]
    ConnectionTimeout { attempts: u32, last_id: u8 },
    /// The JTAG version reported after reset differs from the one seen at entry
    #[error("JTAG ID mismatch: expected 0x{expected:02X}, found 0x{found:02X}")]
    IdMismatch { expected: u8, found: u8 },
    /// The CPU never reported itself synchronized to JTAG
    #[error("CPU not synchronized after {polls} polls")]
    SyncTimeout { polls: u32 },
    /// The JTAG access fuse is blown; the device is unreachable
    #[error("JTAG security fuse is blown")]
    FuseBlown,
    /// The CPU never reached the instruction-fetch state
    #[error("CPU did not enter instruction fetch")]
    InstrFetchTimeout,
    /// Target PSA signature differs from the locally computed one
    #[error("PSA mismatch over 0x{start:04X}+{length} words: expected 0x{expected:04X}, target 0x{actual:04X}")]
    VerifyMismatch {
        start: u16,
        length: usize,
        expected: u16,
        actual: u16,
    },
    /// A section of the image did not verify after programming
    #[error("section {section} at 0x{address:05X} failed to program")]
    SectionWriteFailure { section: usize, address: u32 },
    /// RAM read back differs from what was written
    #[error("RAM self-test failed: expected 0x{expected:04X}, read 0x{found:04X}")]
    RamSelfTest { expected: u16, found: u16 },
    /// Address outside the 16-bit space reachable by these sequences
    #[error("address 0x{address:05X} is out of range")]
    AddressOutOfRange { address: u32 },
    /// Text image could not be parsed
    #[error("image line {line}: {kind}")]
    Image { line: usize, kind: ImageErrorKind },
}

pub type Result<T> = core::result::Result<T, Error>;

/// Coarse outcome of an operation, usable directly as a success flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Error,
    FuseBlown,
}

impl Status {
    pub fn is_ok(self) -> bool {
        self == Status::Ok
    }
}

impl<T> From<&Result<T>> for Status {
    fn from(result: &Result<T>) -> Self {
        match result {
            Ok(_) => Status::Ok,
            Err(Error::FuseBlown) => Status::FuseBlown,
            Err(_) => Status::Error,
        }
    }
}

impl From<Status> for bool {
    fn from(status: Status) -> bool {
        status.is_ok()
    }
}
