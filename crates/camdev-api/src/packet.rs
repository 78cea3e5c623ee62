// Bounds-checked big-endian reader over a binary payload.
//
// Every accessor takes an absolute offset and returns a decode error when
// the read would run past the end of the buffer.

use crate::error::Error;

/// Read-only view over a binary payload.
#[derive(Debug, Clone, Copy)]
pub struct Packet<'a> {
    buf: &'a [u8],
}

impl<'a> Packet<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Borrow `n` bytes starting at `offset`.
    pub fn bytes(&self, offset: usize, n: usize) -> Result<&'a [u8], Error> {
        offset
            .checked_add(n)
            .and_then(|end| self.buf.get(offset..end))
            .ok_or_else(|| {
                Error::decode(format!(
                    "read of {n} bytes at offset {offset} exceeds packet length {}",
                    self.buf.len()
                ))
            })
    }

    pub fn u8(&self, offset: usize) -> Result<u8, Error> {
        let [b] = self.array::<1>(offset)?;
        Ok(b)
    }

    pub fn u16(&self, offset: usize) -> Result<u16, Error> {
        self.array(offset).map(u16::from_be_bytes)
    }

    pub fn u32(&self, offset: usize) -> Result<u32, Error> {
        self.array(offset).map(u32::from_be_bytes)
    }

    /// Decode `n` bytes at `offset` as UTF-16BE.
    ///
    /// Fixed-width name fields are NUL-padded; trailing NUL code units are
    /// dropped. An odd `n` or an unpaired surrogate is a decode error.
    pub fn utf16_string(&self, offset: usize, n: usize) -> Result<String, Error> {
        if n % 2 != 0 {
            return Err(Error::decode(format!(
                "UTF-16 field at offset {offset} has odd length {n}"
            )));
        }

        let mut units: Vec<u16> = self
            .bytes(offset, n)?
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        while units.last() == Some(&0) {
            units.pop();
        }

        String::from_utf16(&units)
            .map_err(|e| Error::decode(format!("invalid UTF-16 at offset {offset}: {e}")))
    }

    fn array<const N: usize>(&self, offset: usize) -> Result<[u8; N], Error> {
        let slice = self.bytes(offset, N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }
}
