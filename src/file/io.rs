//! Little-endian primitive reading and writing for module images.
//!
//! The [`crate::file::io::CilIO`] trait abstracts over the fixed-size primitives stored in
//! `.cmi` images and symbol maps. [`crate::file::io::read_le_at`] and
//! [`crate::file::io::write_le`] are the only entry points; everything higher level goes
//! through [`crate::file::parser::Parser`] and [`crate::file::writer::ByteWriter`].
//!
//! All reads are bounds-checked and return [`crate::Error::OutOfBounds`] instead of panicking.

use crate::{Error::OutOfBounds, Result};

/// Trait for primitives that can be read from and written to little-endian byte buffers.
///
/// Each implementation defines a `Bytes` associated type that represents the fixed-size
/// byte array of that primitive (e.g. `[u8; 4]` for `u32`).
pub trait CilIO: Sized + Copy {
    /// Fixed-size byte array holding the encoded value
    type Bytes: Sized + AsRef<[u8]> + for<'a> TryFrom<&'a [u8]>;

    /// Read T from a byte buffer in little-endian
    fn from_le_bytes(bytes: Self::Bytes) -> Self;

    /// Write T to a byte buffer in little-endian
    fn to_le_bytes(self) -> Self::Bytes;
}

macro_rules! impl_cil_io {
    ($($ty:ty),* $(,)?) => {
        $(
            impl CilIO for $ty {
                type Bytes = [u8; std::mem::size_of::<$ty>()];

                fn from_le_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_le_bytes(bytes)
                }

                fn to_le_bytes(self) -> Self::Bytes {
                    <$ty>::to_le_bytes(self)
                }
            }
        )*
    };
}

impl_cil_io!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

/// Read a `T` at `offset` and advance the offset past it.
///
/// # Arguments
/// * `data` - The buffer to read from
/// * `offset` - Position of the value, updated to the first byte after it
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the buffer is too short.
pub fn read_le_at<T: CilIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    let Some(end) = offset.checked_add(type_len) else {
        return Err(OutOfBounds);
    };

    if end > data.len() {
        return Err(OutOfBounds);
    }

    let Ok(bytes) = T::Bytes::try_from(&data[*offset..end]) else {
        return Err(OutOfBounds);
    };

    *offset = end;
    Ok(T::from_le_bytes(bytes))
}

/// Append a `T` in little-endian to `data`.
pub fn write_le<T: CilIO>(data: &mut Vec<u8>, value: T) {
    data.extend_from_slice(value.to_le_bytes().as_ref());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    const TEST_BUFFER: [u8; 8] = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];

    #[test]
    fn read_sequential() {
        let mut offset = 0;

        let first: u16 = read_le_at(&TEST_BUFFER, &mut offset).unwrap();
        let second: u32 = read_le_at(&TEST_BUFFER, &mut offset).unwrap();
        let third: i8 = read_le_at(&TEST_BUFFER, &mut offset).unwrap();

        assert_eq!(first, 0x0201);
        assert_eq!(second, 0x0605_0403);
        assert_eq!(third, 0x07);
        assert_eq!(offset, 7);
    }

    #[test]
    fn read_past_end() {
        let mut offset = 6;
        let result = read_le_at::<u32>(&TEST_BUFFER, &mut offset);

        assert!(matches!(result, Err(Error::OutOfBounds)));
        assert_eq!(offset, 6);
    }

    #[test]
    fn read_offset_overflow() {
        let mut offset = usize::MAX;
        let result = read_le_at::<u8>(&TEST_BUFFER, &mut offset);

        assert!(matches!(result, Err(Error::OutOfBounds)));
    }

    #[test]
    fn write_then_read_floats() {
        let mut data = Vec::new();
        write_le(&mut data, 1.5f32);
        write_le(&mut data, -2.25f64);
        assert_eq!(data.len(), 12);

        let mut offset = 0;
        assert_eq!(read_le_at::<f32>(&data, &mut offset).unwrap(), 1.5);
        assert_eq!(read_le_at::<f64>(&data, &mut offset).unwrap(), -2.25);
    }
}
