//! TI-TXT memory images.
//!
//! ```text
//! @C000
//! 31 40 00 03 B2 40 80 5A
//! 20 01
//! @FFFE
//! 00 C0
//! q
//! ```
//!
//! Each `@` line opens a section at a hex byte address, the bytes that follow are packed into
//! little-endian words, and `q` ends the file.
use alloc::vec::Vec;

use crate::error::{Error, ImageErrorKind, Result};

/// Contiguous run of words starting at `address`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub address: u32,
    pub data: Vec<u16>,
}

impl Section {
    /// Length in words
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Start address, if the whole section fits the 16-bit address space
    pub fn start(&self) -> Result<u16> {
        let end = self.address as u64 + 2 * self.data.len() as u64;
        if end > 0x1_0000 {
            return Err(Error::AddressOutOfRange {
                address: self.address,
            });
        }
        Ok(self.address as u16)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryImage {
    sections: Vec<Section>,
}

/// Section being filled, with a pending low byte
struct Builder {
    address: u32,
    data: Vec<u16>,
    low: Option<u8>,
}

impl Builder {
    fn new(address: u32) -> Self {
        Self {
            address,
            data: Vec::new(),
            low: None,
        }
    }

    fn push(&mut self, byte: u8) {
        match self.low.take() {
            None => self.low = Some(byte),
            Some(low) => self.data.push(u16::from_le_bytes([low, byte])),
        }
    }

    fn finish(mut self) -> Section {
        if let Some(low) = self.low.take() {
            self.data.push(u16::from_le_bytes([low, 0xFF]));
        }
        Section {
            address: self.address,
            data: self.data,
        }
    }
}

impl MemoryImage {
    pub fn new(sections: Vec<Section>) -> Self {
        Self { sections }
    }

    /// Sections in file order
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn total_words(&self) -> usize {
        self.sections.iter().map(Section::len).sum()
    }

    /// Parse a whole image held in memory.  Line numbers in errors start at 1.
    pub fn parse(text: &str) -> Result<Self> {
        let mut parser = Parser::default();
        for (index, line) in text.lines().enumerate() {
            if !parser.line(index + 1, line)? {
                break;
            }
        }
        Ok(parser.finish())
    }

    /// Parse an image line by line from any reader
    #[cfg(feature = "std")]
    pub fn from_reader<R: std::io::BufRead>(reader: R) -> std::io::Result<Self> {
        let mut parser = Parser::default();
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            let more = parser
                .line(index + 1, &line)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            if !more {
                break;
            }
        }
        Ok(parser.finish())
    }
}

#[derive(Default)]
struct Parser {
    current: Option<Builder>,
    sections: Vec<Section>,
}

impl Parser {
    fn close(&mut self) {
        if let Some(builder) = self.current.take() {
            let section = builder.finish();
            if !section.is_empty() {
                self.sections.push(section);
            }
        }
    }

    /// Consume one line, returning false once the terminator has been seen
    fn line(&mut self, number: usize, line: &str) -> Result<bool> {
        let line = line.trim();
        let error = |kind| Error::Image { line: number, kind };

        if line.is_empty() {
            return Ok(true);
        }
        if line.eq_ignore_ascii_case("q") {
            return Ok(false);
        }
        if let Some(addr) = line.strip_prefix('@') {
            let address =
                u32::from_str_radix(addr.trim(), 16).map_err(|_| error(ImageErrorKind::BadAddress))?;
            self.close();
            self.current = Some(Builder::new(address));
            return Ok(true);
        }

        let builder = self
            .current
            .as_mut()
            .ok_or(error(ImageErrorKind::DataBeforeAddress))?;
        for token in line.split_whitespace() {
            let value = u16::from_str_radix(token, 16).map_err(|_| error(ImageErrorKind::BadByte))?;
            builder.push(value as u8);
        }
        Ok(true)
    }

    fn finish(mut self) -> MemoryImage {
        self.close();
        MemoryImage {
            sections: self.sections,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn odd_byte_is_padded() {
        let image = MemoryImage::parse("@C000\n1234 56\nq\n").unwrap();
        assert_eq!(
            image.sections(),
            [Section {
                address: 0xC000,
                data: vec![0x5634]
            }]
        );
    }

    #[test]
    fn bytes_pack_little_endian() {
        let image = MemoryImage::parse("@f000\n31 40 00 03\nB2 40\nq").unwrap();
        assert_eq!(image.sections()[0].address, 0xF000);
        assert_eq!(image.sections()[0].data, [0x4031, 0x0300, 0x40B2]);
        assert_eq!(image.total_words(), 3);
    }

    #[test]
    fn multiple_sections_keep_file_order() {
        let text = "@FFFE\n00 C0\n@C000\n31 40\n32 41\nq\n";
        let image = MemoryImage::parse(text).unwrap();
        let starts: Vec<u32> = image.sections().iter().map(|s| s.address).collect();
        assert_eq!(starts, [0xFFFE, 0xC000]);
        assert_eq!(image.sections()[1].data, [0x4031, 0x4132]);
    }

    #[test]
    fn missing_terminator_and_empty_sections() {
        let image = MemoryImage::parse("@1000\n@1100\r\n AA BB \r\n").unwrap();
        assert_eq!(
            image.sections(),
            [Section {
                address: 0x1100,
                data: vec![0xBBAA]
            }]
        );
    }

    #[test]
    fn text_after_terminator_is_ignored() {
        let image = MemoryImage::parse("@C000\n01 02\nq\nnot an image\n").unwrap();
        assert_eq!(image.total_words(), 1);
    }

    #[test]
    fn malformed_lines() {
        assert_eq!(
            MemoryImage::parse("12 34\n"),
            Err(Error::Image {
                line: 1,
                kind: ImageErrorKind::DataBeforeAddress
            })
        );
        assert_eq!(
            MemoryImage::parse("@C000\n12 3G\n"),
            Err(Error::Image {
                line: 2,
                kind: ImageErrorKind::BadByte
            })
        );
        assert_eq!(
            MemoryImage::parse("\n@XYZ\n"),
            Err(Error::Image {
                line: 2,
                kind: ImageErrorKind::BadAddress
            })
        );
    }

    #[test]
    fn section_range() {
        let top = Section {
            address: 0xFFFE,
            data: vec![0xC000],
        };
        assert_eq!(top.start(), Ok(0xFFFE));
        let high = Section {
            address: 0x1_0000,
            data: vec![0],
        };
        assert_eq!(
            high.start(),
            Err(Error::AddressOutOfRange { address: 0x1_0000 })
        );
    }

    #[cfg(feature = "std")]
    #[test]
    fn reader_matches_parse() {
        let text = "@C000\n31 40 00 03\n@FFFE\n00 C0\nq\n";
        let from_reader = MemoryImage::from_reader(text.as_bytes()).unwrap();
        assert_eq!(from_reader, MemoryImage::parse(text).unwrap());

        let err = MemoryImage::from_reader("zz\n".as_bytes()).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }
}
