//! Forward-only byte cursor used by every decoder.
//!
//! A [`Parser`] never reads past the end of its buffer: any request for more
//! bytes than remain fails with [`ProtocolError::Underrun`] and leaves the
//! cursor where it was.

use crate::error::{ProtocolError, Result};

/// Cursor over a borrowed byte slice.
#[derive(Debug, Clone)]
pub struct Parser<'a> {
    data: &'a [u8],
}

impl<'a> Parser<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Number of bytes not yet consumed.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Consume exactly `size` bytes.
    pub fn take(&mut self, size: usize) -> Result<&'a [u8]> {
        if self.data.len() < size {
            return Err(ProtocolError::Underrun {
                needed: size,
                remaining: self.data.len(),
            });
        }
        let (head, tail) = self.data.split_at(size);
        self.data = tail;
        Ok(head)
    }

    /// Consume exactly `N` bytes into an owned array.
    pub fn take_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take_array::<1>()?[0])
    }

    pub fn read_u16_be(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.take_array()?))
    }

    pub fn read_u32_be(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.take_array()?))
    }

    pub fn read_u64_be(&mut self) -> Result<u64> {
        Ok(u64::from_be_bytes(self.take_array()?))
    }

    /// Succeeds only if the whole buffer has been consumed.
    pub fn finish(self) -> Result<()> {
        if self.data.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::TrailingBytes(self.data.len()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_advances_cursor() {
        let mut parser = Parser::new(&[1, 2, 3, 4]);
        assert_eq!(parser.take(1).unwrap(), &[1]);
        assert_eq!(parser.take(2).unwrap(), &[2, 3]);
        assert_eq!(parser.remaining(), 1);
    }

    #[test]
    fn underrun_leaves_cursor_untouched() {
        let mut parser = Parser::new(&[0xaa, 0xbb]);
        let err = parser.take(3).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::Underrun {
                needed: 3,
                remaining: 2
            }
        ));
        assert_eq!(parser.remaining(), 2);
    }

    #[test]
    fn big_endian_reads() {
        let mut parser = Parser::new(&[0x1e, 0x61, 0, 0, 0, 7]);
        assert_eq!(parser.read_u16_be().unwrap(), 7777);
        assert_eq!(parser.read_u32_be().unwrap(), 7);
        assert!(parser.finish().is_ok());
    }

    #[test]
    fn finish_reports_trailing_bytes() {
        let mut parser = Parser::new(&[1, 2, 3]);
        parser.read_u8().unwrap();
        assert!(matches!(parser.finish(), Err(ProtocolError::TrailingBytes(2))));
    }
}
