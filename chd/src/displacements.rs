use std::io::{Read, Write};

use binout::{AsIs, Serializer};
use dyn_size_of::GetSize;

use crate::utils::to_io_error;

/// Displacement table of a built [`Function`](crate::Function): one value per
/// bucket, stored at an element width of 8, 16 or 32 bits.
///
/// Construction produces the 32-bit representation;
/// [`Function::compact`](crate::Function::compact) narrows it to the smallest
/// width that holds the maximum committed displacement.
#[derive(Clone, PartialEq, Eq)]
pub enum Displacements {
    U8(Box<[u8]>),
    U16(Box<[u16]>),
    U32(Box<[u32]>),
}

impl Displacements {
    /// Number of entries (one per bucket).
    pub fn len(&self) -> usize {
        match self {
            Self::U8(a) => a.len(),
            Self::U16(a) => a.len(),
            Self::U32(a) => a.len(),
        }
    }

    /// `true` if the table has no entries.
    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Bytes per entry: 1, 2 or 4.
    pub fn element_bytes(&self) -> u8 {
        match self {
            Self::U8(_) => 1,
            Self::U16(_) => 2,
            Self::U32(_) => 4,
        }
    }

    /// Displacement of the bucket with the given `index`.
    #[inline(always)]
    pub fn get(&self, index: usize) -> u32 {
        debug_assert!(index < self.len());
        match self {
            Self::U8(a) => unsafe { *a.get_unchecked(index) as u32 },
            Self::U16(a) => unsafe { *a.get_unchecked(index) as u32 },
            Self::U32(a) => unsafe { *a.get_unchecked(index) },
        }
    }

    /// Rewrites the table at the smallest element width that holds `d_max`.
    /// Never widens; a table that already is at the target width is left as is.
    pub(crate) fn narrow(&mut self, d_max: u32) {
        let width: u8 = if d_max <= u8::MAX as u32 { 1 }
            else if d_max <= u16::MAX as u32 { 2 }
            else { 4 };
        if width >= self.element_bytes() { return; }
        *self = if width == 1 {
            Self::U8((0..self.len()).map(|i| self.get(i) as u8).collect())
        } else {
            Self::U16((0..self.len()).map(|i| self.get(i) as u16).collect())
        };
    }

    /// Returns the number of bytes which `write` will write.
    pub(crate) fn write_bytes(&self) -> usize {
        AsIs::size(self.element_bytes()) + self.len() * self.element_bytes() as usize
    }

    /// Writes the element width followed by the entries.
    pub(crate) fn write(&self, output: &mut dyn Write) -> std::io::Result<()> {
        AsIs::write(output, self.element_bytes())?;
        match self {
            Self::U8(a) => AsIs::write_all(output, a.iter()),
            Self::U16(a) => AsIs::write_all(output, a.iter()),
            Self::U32(a) => AsIs::write_all(output, a.iter()),
        }
    }

    /// Reads a table of `len` entries written by [`Self::write`].
    pub(crate) fn read(input: &mut dyn Read, len: usize) -> std::io::Result<Self> {
        let element_bytes: u8 = AsIs::read(input)?;
        Ok(match element_bytes {
            1 => Self::U8(AsIs::read_n(input, len)?),
            2 => Self::U16(AsIs::read_n(input, len)?),
            4 => Self::U32(AsIs::read_n(input, len)?),
            _ => return Err(to_io_error("invalid displacement element width")),
        })
    }
}

impl GetSize for Displacements {
    fn size_bytes_dyn(&self) -> usize {
        match self {
            Self::U8(a) => a.size_bytes_dyn(),
            Self::U16(a) => a.size_bytes_dyn(),
            Self::U32(a) => a.size_bytes_dyn(),
        }
    }
    fn size_bytes_content_dyn(&self) -> usize {
        match self {
            Self::U8(a) => a.size_bytes_content_dyn(),
            Self::U16(a) => a.size_bytes_content_dyn(),
            Self::U32(a) => a.size_bytes_content_dyn(),
        }
    }
    const USES_DYN_MEM: bool = true;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(d: &Displacements) -> Vec<u32> {
        (0..d.len()).map(|i| d.get(i)).collect()
    }

    #[test]
    fn narrow_selects_smallest_width() {
        let mut d = Displacements::U32(vec![0, 3, 255].into_boxed_slice());
        d.narrow(255);
        assert_eq!(d.element_bytes(), 1);
        assert_eq!(values(&d), [0, 3, 255]);

        let mut d = Displacements::U32(vec![1, 256, 65535].into_boxed_slice());
        d.narrow(65535);
        assert_eq!(d.element_bytes(), 2);
        assert_eq!(values(&d), [1, 256, 65535]);

        let mut d = Displacements::U32(vec![1, 65536].into_boxed_slice());
        d.narrow(65536);
        assert_eq!(d.element_bytes(), 4);
    }

    #[test]
    fn narrow_is_idempotent_and_never_widens() {
        let mut d = Displacements::U8(vec![7, 9].into_boxed_slice());
        d.narrow(9);
        assert_eq!(d.element_bytes(), 1);
        d.narrow(70000);    // stale wider bound must not widen the table
        assert_eq!(d.element_bytes(), 1);
        assert_eq!(values(&d), [7, 9]);
    }

    #[test]
    fn read_write() {
        for d in [
            Displacements::U8(vec![1, 2, 250].into_boxed_slice()),
            Displacements::U16(vec![1, 2, 60000].into_boxed_slice()),
            Displacements::U32(vec![1, 2, 4_000_000_000].into_boxed_slice()),
        ] {
            let mut buff = Vec::new();
            d.write(&mut buff).unwrap();
            assert_eq!(buff.len(), d.write_bytes());
            let read = Displacements::read(&mut &buff[..], d.len()).unwrap();
            assert!(read == d);
        }
    }

    #[test]
    fn read_rejects_unknown_width() {
        assert!(Displacements::read(&mut &[3u8, 0, 0, 0][..], 1).is_err());
    }
}
