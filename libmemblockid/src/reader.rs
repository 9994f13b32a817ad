use thiserror::Error;
use zerocopy::FromBytes;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReadError {
    #[error("Insufficient data: {len} bytes at offset {offset} exceed buffer of {available} bytes")]
    InsufficientData {
        offset: u64,
        len: usize,
        available: u64,
    },
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Endianness {
    Little,
    Big,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum FieldWidth {
    U8,
    U16,
    U32,
    U64,
}

impl FieldWidth {
    pub const fn bytes(&self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16 => 2,
            Self::U32 => 4,
            Self::U64 => 8,
        }
    }
}

/// Unsigned integer field at a fixed absolute offset.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Field {
    pub offset: u64,
    pub width: FieldWidth,
    pub endianness: Endianness,
}

impl Field {
    pub const fn u8(offset: u64) -> Field {
        return Field {
            offset,
            width: FieldWidth::U8,
            endianness: Endianness::Little,
        };
    }

    pub const fn le16(offset: u64) -> Field {
        return Field {
            offset,
            width: FieldWidth::U16,
            endianness: Endianness::Little,
        };
    }

    pub const fn le32(offset: u64) -> Field {
        return Field {
            offset,
            width: FieldWidth::U32,
            endianness: Endianness::Little,
        };
    }

    pub const fn be32(offset: u64) -> Field {
        return Field {
            offset,
            width: FieldWidth::U32,
            endianness: Endianness::Big,
        };
    }

    pub const fn le64(offset: u64) -> Field {
        return Field {
            offset,
            width: FieldWidth::U64,
            endianness: Endianness::Little,
        };
    }
}

/// Read `len` bytes at `offset` from `buffer`.
///
/// # Errors
/// Returns [`ReadError::InsufficientData`] when the requested range does not lie
/// completely inside the buffer, including ranges whose end overflows.
pub fn read_at(buffer: &[u8], offset: u64, len: usize) -> Result<&[u8], ReadError> {
    return ProbeBuffer::new(buffer).read_at(offset, len);
}

/// Read-only, bounds-checked view over a caller supplied buffer.
///
/// Every accessor returns [`ReadError`] instead of panicking, so format code can
/// treat a short buffer as a failed match.
#[derive(Debug, Clone, Copy)]
pub struct ProbeBuffer<'a> {
    data: &'a [u8],
}

impl<'a> ProbeBuffer<'a> {
    pub fn new(data: &'a [u8]) -> ProbeBuffer<'a> {
        return ProbeBuffer { data };
    }

    pub fn len(&self) -> u64 {
        return self.data.len() as u64;
    }

    pub fn is_empty(&self) -> bool {
        return self.data.is_empty();
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        return self.data;
    }

    fn insufficient(&self, offset: u64, len: usize) -> ReadError {
        return ReadError::InsufficientData {
            offset,
            len,
            available: self.len(),
        };
    }

    pub fn read_at(&self, offset: u64, len: usize) -> Result<&'a [u8], ReadError> {
        let start = usize::try_from(offset).map_err(|_| self.insufficient(offset, len))?;
        let end = start
            .checked_add(len)
            .ok_or_else(|| self.insufficient(offset, len))?;

        return self
            .data
            .get(start..end)
            .ok_or_else(|| self.insufficient(offset, len));
    }

    pub fn read_exact_at<const S: usize>(&self, offset: u64) -> Result<[u8; S], ReadError> {
        let mut buffer = [0u8; S];
        buffer.copy_from_slice(self.read_at(offset, S)?);

        return Ok(buffer);
    }

    /// Copy `size_of::<T>()` bytes at `offset` into an on-disk structure.
    pub fn map_at<T: FromBytes>(&self, offset: u64) -> Result<T, ReadError> {
        let len = size_of::<T>();
        let bytes = self.read_at(offset, len)?;

        let data = T::read_from_bytes(bytes).map_err(|_| self.insufficient(offset, len))?;

        return Ok(data);
    }

    pub fn read_uint(&self, field: Field) -> Result<u64, ReadError> {
        let bytes = self.read_at(field.offset, field.width.bytes())?;

        let value = bytes.iter().enumerate().fold(0u64, |acc, (i, byte)| {
            let shift = match field.endianness {
                Endianness::Little => i * 8,
                Endianness::Big => (bytes.len() - 1 - i) * 8,
            };
            acc | (u64::from(*byte) << shift)
        });

        return Ok(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_inside_bounds() {
        let data = [1u8, 2, 3, 4, 5, 6, 7, 8];
        let buf = ProbeBuffer::new(&data);

        assert_eq!(buf.read_at(2, 3).unwrap(), &[3, 4, 5]);
        assert_eq!(buf.read_at(8, 0).unwrap(), &[] as &[u8]);
        assert_eq!(buf.read_exact_at::<2>(6).unwrap(), [7, 8]);
    }

    #[test]
    fn read_past_end_is_insufficient() {
        let data = [0u8; 16];

        assert_eq!(
            read_at(&data, 12, 8),
            Err(ReadError::InsufficientData {
                offset: 12,
                len: 8,
                available: 16
            })
        );
        assert!(read_at(&data, 17, 0).is_err());
        assert!(read_at(&data, u64::MAX, 1).is_err());
        assert!(read_at(&data, 1, usize::MAX).is_err());
        assert!(read_at(&[], 0, 1).is_err());
    }

    #[test]
    fn map_at_copies_structures() {
        let data = [0xAAu8; 8];
        let buf = ProbeBuffer::new(&data);

        assert_eq!(buf.map_at::<[u8; 4]>(4), Ok([0xAA; 4]));
        assert!(buf.map_at::<[u8; 4]>(5).is_err());
    }

    #[test]
    fn read_uint_endianness() {
        let data = [0x00, 0x10, 0x00, 0x00, 0x12, 0x34];
        let buf = ProbeBuffer::new(&data);

        assert_eq!(buf.read_uint(Field::le32(0)).unwrap(), 0x1000);
        assert_eq!(buf.read_uint(Field::be32(0)).unwrap(), 0x0010_0000);
        assert_eq!(buf.read_uint(Field::le16(4)).unwrap(), 0x3412);
        assert_eq!(buf.read_uint(Field::u8(5)).unwrap(), 0x34);
        assert!(buf.read_uint(Field::le64(0)).is_err());
    }
}
