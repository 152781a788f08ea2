//! Packed relation bits for the position store.
//!
//! One bit per position entry, set when the entry belongs to a different
//! document than the entry before it. Bits are packed LSB-first; a writer
//! can append runs of any length and pads the final byte with zeros on
//! `flush`.

use std::io::{self, Write};

pub struct PosrelWriter<W: Write> {
    inner: W,
    cur: u8,
    used: u32,
    written: u64,
}

impl<W: Write> PosrelWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            cur: 0,
            used: 0,
            written: 0,
        }
    }

    /// Append the low `n` bits of `bits` (`n <= 8`).
    pub fn write_byte(&mut self, bits: u8, n: u32) -> io::Result<()> {
        debug_assert!(n <= 8);
        if n == 0 {
            return Ok(());
        }
        let bits = (bits as u16) & ((1u16 << n) - 1);
        let merged = (self.cur as u16) | (bits << self.used);
        self.used += n;
        if self.used >= 8 {
            self.emit(merged as u8)?;
            self.cur = (merged >> 8) as u8;
            self.used -= 8;
        } else {
            self.cur = merged as u8;
        }
        Ok(())
    }

    /// Append the first `n` bits of `bytes`.
    pub fn write(&mut self, bytes: &[u8], n: usize) -> io::Result<()> {
        let full = n / 8;
        if self.used == 0 {
            self.inner.write_all(&bytes[..full])?;
            self.written += full as u64;
        } else {
            for &b in &bytes[..full] {
                self.write_byte(b, 8)?;
            }
        }
        let rest = (n % 8) as u32;
        if rest > 0 {
            self.write_byte(bytes[full], rest)?;
        }
        Ok(())
    }

    /// Append a single bit.
    #[inline]
    pub fn push(&mut self, bit: bool) -> io::Result<()> {
        self.write_byte(bit as u8, 1)
    }

    /// Pad the pending partial byte with zeros and write it out.
    pub fn flush(&mut self) -> io::Result<()> {
        if self.used > 0 {
            let cur = self.cur;
            self.emit(cur)?;
            self.cur = 0;
            self.used = 0;
        }
        Ok(())
    }

    /// Bytes written so far, not counting a pending partial byte.
    pub fn offset(&self) -> u64 {
        self.written
    }

    /// Flush pending bits and return the underlying writer.
    pub fn into_inner(mut self) -> io::Result<W> {
        self.flush()?;
        Ok(self.inner)
    }

    fn emit(&mut self, byte: u8) -> io::Result<()> {
        self.inner.write_all(&[byte])?;
        self.written += 1;
        Ok(())
    }
}

/// Read-only view over a run of relation bits.
#[derive(Clone, Copy)]
pub struct PosrelBits<'a> {
    data: &'a [u8],
}

impl<'a> PosrelBits<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Bytes needed to hold `n` bits
    #[inline]
    pub fn bytes_for(n: usize) -> usize {
        n.div_ceil(8)
    }

    /// Number of bits that can be read
    pub fn capacity(&self) -> usize {
        self.data.len() * 8
    }

    #[inline]
    pub fn get(&self, i: usize) -> Option<bool> {
        self.data.get(i / 8).map(|b| (b >> (i % 8)) & 1 == 1)
    }

    /// Bytes backing the first `n` bits
    pub fn prefix(&self, n: usize) -> Option<&'a [u8]> {
        self.data.get(..Self::bytes_for(n))
    }

    /// Number of set bits among the first `n`
    pub fn count_ones(&self, n: usize) -> Option<usize> {
        let bytes = self.prefix(n)?;
        let full = n / 8;
        let mut ones: usize = bytes[..full].iter().map(|b| b.count_ones() as usize).sum();
        let rest = n % 8;
        if rest > 0 {
            ones += (bytes[full] & ((1u8 << rest) - 1)).count_ones() as usize;
        }
        Some(ones)
    }

    /// Iterate over the first `n` bits
    pub fn iter(&self, n: usize) -> impl Iterator<Item = bool> + 'a {
        let data = self.data;
        (0..n.min(data.len() * 8)).map(move |i| (data[i / 8] >> (i % 8)) & 1 == 1)
    }
}
