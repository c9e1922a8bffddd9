//! Bounds-checked cursor over module images and symbol maps.
//!
//! Decoders are written as straight sequences of `?`-propagated reads: every read checks the
//! remaining input, advances the cursor and reports [`crate::Error::OutOfBounds`] on
//! truncation.
//!
//! ```rust
//! use cilfacade::Parser;
//!
//! let data = [0x01, 0x02, 0x81, 0x00, 0x03, b'a', b'b', b'c'];
//! let mut parser = Parser::new(&data);
//!
//! assert_eq!(parser.read_le::<u16>()?, 0x0201);
//! assert_eq!(parser.read_compressed_uint()?, 0x100);
//! assert_eq!(parser.read_prefixed_string_utf8()?, "abc");
//! assert!(!parser.has_more_data());
//! # Ok::<(), cilfacade::Error>(())
//! ```

use crate::{
    file::io::{read_le_at, CilIO},
    Result,
};

/// Read cursor over a borrowed byte slice.
pub struct Parser<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> Parser<'a> {
    /// Start reading `data` at offset 0.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Parser { data, position: 0 }
    }

    /// Returns `true` while unread input remains
    #[must_use]
    pub fn has_more_data(&self) -> bool {
        self.remaining() > 0
    }

    /// Jump to the absolute offset `pos`, which must lie inside the input.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] for offsets at or past the end.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos >= self.data.len() {
            return Err(out_of_bounds_error!());
        }
        self.position = pos;
        Ok(())
    }

    /// Skip `step` bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than `step` bytes remain.
    pub fn advance_by(&mut self, step: usize) -> Result<()> {
        self.position = self.end_of(step)?;
        Ok(())
    }

    /// Current offset
    #[must_use]
    pub fn pos(&self) -> usize {
        self.position
    }

    /// Unread bytes
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    /// The next byte, without consuming it.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] at the end of input.
    pub fn peek_byte(&self) -> Result<u8> {
        match self.data.get(self.position) {
            Some(byte) => Ok(*byte),
            None => Err(out_of_bounds_error!()),
        }
    }

    /// Read a little-endian `T`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the value is truncated.
    pub fn read_le<T: CilIO>(&mut self) -> Result<T> {
        read_le_at::<T>(self.data, &mut self.position)
    }

    /// Read an ECMA-335 compressed unsigned integer (1, 2 or 4 bytes, selected by the top bits
    /// of the first byte).
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] on truncation and [`crate::Error::Malformed`]
    /// for a first byte of the form `111xxxxx`.
    pub fn read_compressed_uint(&mut self) -> Result<u32> {
        let lead = self.read_le::<u8>()?;
        match lead >> 5 {
            0b000..=0b011 => Ok(u32::from(lead)),
            0b100 | 0b101 => {
                let low = self.read_le::<u8>()?;
                Ok((u32::from(lead & 0x3F) << 8) | u32::from(low))
            }
            0b110 => {
                let rest = self.read_bytes(3)?;
                Ok(rest
                    .iter()
                    .fold(u32::from(lead & 0x1F), |value, byte| (value << 8) | u32::from(*byte)))
            }
            _ => Err(malformed_error!(
                "Invalid compressed integer lead byte 0x{:02x} at offset {}",
                lead,
                self.position - 1
            )),
        }
    }

    /// Read a compressed element count that can not exceed the unread input.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for counts larger than the remaining bytes.
    pub fn read_count(&mut self) -> Result<usize> {
        let count = self.read_compressed_uint()? as usize;
        if count > self.remaining() {
            return Err(malformed_error!(
                "Element count {} at offset {} exceeds remaining data",
                count,
                self.position
            ));
        }
        Ok(count)
    }

    /// Read a UTF-8 string preceded by its compressed byte length.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] on truncation and [`crate::Error::Malformed`]
    /// for invalid UTF-8.
    pub fn read_prefixed_string_utf8(&mut self) -> Result<String> {
        let length = self.read_compressed_uint()? as usize;
        let start = self.position;
        let bytes = self.read_bytes(length)?;
        match std::str::from_utf8(bytes) {
            Ok(text) => Ok(text.to_string()),
            Err(error) => Err(malformed_error!("Invalid UTF-8 string at offset {}: {}", start, error)),
        }
    }

    /// Read `length` raw bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than `length` bytes remain.
    pub fn read_bytes(&mut self, length: usize) -> Result<&'a [u8]> {
        let end = self.end_of(length)?;
        let bytes = &self.data[self.position..end];
        self.position = end;
        Ok(bytes)
    }

    fn end_of(&self, length: usize) -> Result<usize> {
        match self.position.checked_add(length) {
            Some(end) if end <= self.data.len() => Ok(end),
            _ => Err(out_of_bounds_error!()),
        }
    }
}
