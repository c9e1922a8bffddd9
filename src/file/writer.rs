//! Append-only byte sink, the write-side counterpart of [`crate::file::parser::Parser`].

use crate::{
    file::io::{write_le, CilIO},
    Result,
};

/// Largest value representable as an ECMA-335 compressed unsigned integer.
pub const MAX_COMPRESSED_UINT: u32 = 0x1FFF_FFFF;

/// Growable output buffer with the encodings used by module images and symbol maps.
///
/// # Examples
///
/// ```rust
/// use cilfacade::ByteWriter;
///
/// let mut writer = ByteWriter::new();
/// writer.write_le(0x0201u16);
/// writer.write_compressed_uint(0x100)?;
/// assert_eq!(writer.into_inner(), vec![0x01, 0x02, 0x81, 0x00]);
/// # Ok::<(), cilfacade::Error>(())
/// ```
#[derive(Debug, Default)]
pub struct ByteWriter {
    data: Vec<u8>,
}

impl ByteWriter {
    /// Create an empty writer.
    #[must_use]
    pub fn new() -> Self {
        ByteWriter { data: Vec::new() }
    }

    /// Number of bytes written so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The bytes written so far.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Consume the writer and return its buffer.
    #[must_use]
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }

    /// Append a primitive in little-endian.
    pub fn write_le<T: CilIO>(&mut self, value: T) {
        write_le(&mut self.data, value);
    }

    /// Append raw bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Append an ECMA-335 II.23.2 compressed unsigned integer.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `value` exceeds [`MAX_COMPRESSED_UINT`].
    pub fn write_compressed_uint(&mut self, value: u32) -> Result<()> {
        match value {
            0..=0x7F => self.data.push(value as u8),
            0x80..=0x3FFF => {
                self.data.push(((value >> 8) as u8) | 0x80);
                self.data.push(value as u8);
            }
            0x4000..=MAX_COMPRESSED_UINT => {
                self.data.push(((value >> 24) as u8) | 0xC0);
                self.data.push((value >> 16) as u8);
                self.data.push((value >> 8) as u8);
                self.data.push(value as u8);
            }
            _ => {
                return Err(malformed_error!(
                    "Value {} does not fit a compressed uint",
                    value
                ))
            }
        }

        Ok(())
    }

    /// Append an element count or length.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `count` does not fit a compressed uint.
    pub fn write_count(&mut self, count: usize) -> Result<()> {
        let Ok(count) = u32::try_from(count) else {
            return Err(malformed_error!("Count {} is too large", count));
        };

        self.write_compressed_uint(count)
    }

    /// Append a compressed length followed by the UTF-8 bytes of `value`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the string is longer than a compressed uint allows.
    pub fn write_prefixed_string_utf8(&mut self, value: &str) -> Result<()> {
        self.write_count(value.len())?;
        self.data.extend_from_slice(value.as_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Parser;

    #[test]
    fn compressed_uint_boundaries() {
        let cases: [(u32, &[u8]); 6] = [
            (0, &[0x00]),
            (0x7F, &[0x7F]),
            (0x80, &[0x80, 0x80]),
            (0x3FFF, &[0xBF, 0xFF]),
            (0x4000, &[0xC0, 0x00, 0x40, 0x00]),
            (MAX_COMPRESSED_UINT, &[0xDF, 0xFF, 0xFF, 0xFF]),
        ];

        for (value, expected) in cases {
            let mut writer = ByteWriter::new();
            writer.write_compressed_uint(value).unwrap();
            assert_eq!(writer.as_slice(), expected, "value {value:#x}");

            let mut parser = Parser::new(writer.as_slice());
            assert_eq!(parser.read_compressed_uint().unwrap(), value);
        }
    }

    #[test]
    fn compressed_uint_too_large() {
        let mut writer = ByteWriter::new();
        assert!(writer.write_compressed_uint(MAX_COMPRESSED_UINT + 1).is_err());
        assert!(writer.is_empty());
    }

    #[test]
    fn prefixed_string_multibyte() {
        let mut writer = ByteWriter::new();
        writer.write_prefixed_string_utf8("Größe").unwrap();
        assert_eq!(writer.as_slice()[0] as usize, "Größe".len());

        let bytes = writer.into_inner();
        let mut parser = Parser::new(&bytes);
        assert_eq!(parser.read_prefixed_string_utf8().unwrap(), "Größe");
    }
}
