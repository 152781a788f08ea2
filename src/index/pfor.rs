//! Block codec for posting-list integers.
//!
//! Integers are grouped into blocks of [`BLOCK_SIZE`]. A full block is
//! bit-packed at one width chosen per block; values that do not fit are
//! patched in afterwards from a small exception list. The trailing partial
//! block uses a byte-oriented variable-length layout instead.
//!
//! Full block:
//!
//! ```text
//! header   u8     bit width b (0..=32) | 0x80 if exceptions follow
//! [count   u8     number of exceptions
//!  pos     u8 * count      block index of each exception
//!  high    varint * count  value >> b of each exception]
//! packed   32*b bytes      low b bits of all 256 values, LSB-first
//! ```
//!
//! Partial block (`n < 256` values):
//!
//! ```text
//! control  u8 * ceil(n/4)  2 bits per value: byte length - 1, LSB-first
//! data     1..=4 LE bytes per value
//! ```
//!
//! The stream carries no length; the decoder is told how many integers to
//! read and reports how many bytes that took.

use crate::utils::encoding::{decode_varint, encode_varint};
use thiserror::Error;

/// Number of integers in a full block
pub const BLOCK_SIZE: usize = 256;

const EXCEPTION_FLAG: u8 = 0x80;
const WIDTH_MASK: u8 = 0x3f;

/// Malformed codec input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("truncated block at byte {0}")]
    Truncated(usize),
    #[error("invalid block header {header:#04x} at byte {at}")]
    BadHeader { header: u8, at: usize },
    #[error("exception value overflows u32 at byte {0}")]
    Overflow(usize),
}

/// Encode `values`, appending the encoded bytes to `out`.
pub fn encode(values: &[u32], out: &mut Vec<u8>) {
    let mut blocks = values.chunks_exact(BLOCK_SIZE);
    for block in &mut blocks {
        encode_block(block, out);
    }
    encode_tail(blocks.remainder(), out);
}

pub fn encode_to_vec(values: &[u32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() + values.len() / 4 + 1);
    encode(values, &mut out);
    out
}

/// Decode `count` integers from `buf`, appending them to `out`.
/// Returns the number of bytes consumed.
pub fn decode(buf: &[u8], count: usize, out: &mut Vec<u32>) -> Result<usize, DecodeError> {
    // A full block takes at least its header byte, a tail value a control
    // quarter-byte plus one data byte
    let rem = count % BLOCK_SIZE;
    let min_len = (count / BLOCK_SIZE)
        .checked_add(rem.div_ceil(4) + rem)
        .ok_or(DecodeError::Truncated(buf.len()))?;
    if buf.len() < min_len {
        return Err(DecodeError::Truncated(buf.len()));
    }
    out.reserve(count);
    let mut pos = 0;
    for _ in 0..count / BLOCK_SIZE {
        pos += decode_block(buf, pos, out)?;
    }
    pos += decode_tail(buf, pos, count % BLOCK_SIZE, out)?;
    Ok(pos)
}

pub fn decode_to_vec(buf: &[u8], count: usize) -> Result<(Vec<u32>, usize), DecodeError> {
    let mut out = Vec::new();
    let consumed = decode(buf, count, &mut out)?;
    Ok((out, consumed))
}

/// Number of significant bits in `v`
#[inline]
fn bit_width(v: u32) -> u32 {
    32 - v.leading_zeros()
}

/// Bytes a varint needs to hold `bits` significant bits
#[inline]
fn varint_bytes(bits: u32) -> usize {
    (bits.max(1) as usize).div_ceil(7)
}

/// Pick the width with the smallest encoded size among those that fit at
/// least half the block.
fn choose_width(block: &[u32]) -> u32 {
    let mut histogram = [0usize; 33];
    for &v in block {
        histogram[bit_width(v) as usize] += 1;
    }

    let mut best = (usize::MAX, 32);
    let mut fits = 0;
    for b in 0..=32u32 {
        fits += histogram[b as usize];
        if fits < BLOCK_SIZE / 2 {
            continue;
        }
        let exceptions = BLOCK_SIZE - fits;
        let mut cost = 4 * b as usize * 8;
        if exceptions > 0 {
            cost += 1 + exceptions;
            for w in (b + 1)..=32 {
                cost += histogram[w as usize] * varint_bytes(w - b);
            }
        }
        if cost < best.0 {
            best = (cost, b);
        }
    }
    best.1
}

fn encode_block(block: &[u32], out: &mut Vec<u8>) {
    debug_assert_eq!(block.len(), BLOCK_SIZE);
    let b = choose_width(block);
    let mask = (1u64 << b) - 1;

    let exceptions: Vec<u8> = block
        .iter()
        .enumerate()
        .filter(|&(_, &v)| bit_width(v) > b)
        .map(|(i, _)| i as u8)
        .collect();

    if exceptions.is_empty() {
        out.push(b as u8);
    } else {
        out.push(b as u8 | EXCEPTION_FLAG);
        out.push(exceptions.len() as u8);
        out.extend_from_slice(&exceptions);
        for &i in &exceptions {
            // b < 32 whenever an exception exists
            encode_varint(block[i as usize] >> b, out);
        }
    }

    let mut acc: u64 = 0;
    let mut nbits = 0u32;
    for &v in block {
        acc |= (v as u64 & mask) << nbits;
        nbits += b;
        while nbits >= 8 {
            out.push(acc as u8);
            acc >>= 8;
            nbits -= 8;
        }
    }
    debug_assert_eq!(nbits, 0);
}

fn decode_block(buf: &[u8], start: usize, out: &mut Vec<u32>) -> Result<usize, DecodeError> {
    let mut pos = start;
    let header = *buf.get(pos).ok_or(DecodeError::Truncated(pos))?;
    pos += 1;

    let b = (header & WIDTH_MASK) as u32;
    if b > 32 || header & !(WIDTH_MASK | EXCEPTION_FLAG) != 0 {
        return Err(DecodeError::BadHeader { header, at: start });
    }

    let mut patches: Vec<(u8, u32)> = Vec::new();
    if header & EXCEPTION_FLAG != 0 {
        let n = *buf.get(pos).ok_or(DecodeError::Truncated(pos))? as usize;
        pos += 1;
        let positions = buf.get(pos..pos + n).ok_or(DecodeError::Truncated(pos))?;
        pos += n;
        patches.reserve(n);
        for &i in positions {
            let (high, len) =
                decode_varint(buf.get(pos..).unwrap_or_default()).ok_or(DecodeError::Truncated(pos))?;
            if b == 32 || (high as u64) << b > u32::MAX as u64 {
                return Err(DecodeError::Overflow(pos));
            }
            pos += len;
            patches.push((i, high << b));
        }
    }

    let packed_len = 4 * b as usize * 8;
    let packed = buf
        .get(pos..pos + packed_len)
        .ok_or(DecodeError::Truncated(pos))?;
    pos += packed_len;

    let base = out.len();
    let mask = (1u64 << b) - 1;
    let mut acc: u64 = 0;
    let mut nbits = 0u32;
    let mut bytes = packed.iter();
    for _ in 0..BLOCK_SIZE {
        while nbits < b {
            // packed_len bytes hold exactly BLOCK_SIZE * b bits
            acc |= (*bytes.next().unwrap_or(&0) as u64) << nbits;
            nbits += 8;
        }
        out.push((acc & mask) as u32);
        acc >>= b;
        nbits -= b;
    }

    for (i, high) in patches {
        out[base + i as usize] |= high;
    }

    Ok(pos - start)
}

#[inline]
fn byte_len(v: u32) -> usize {
    (bit_width(v) as usize).div_ceil(8).max(1)
}

fn encode_tail(values: &[u32], out: &mut Vec<u8>) {
    for group in values.chunks(4) {
        let mut control = 0u8;
        for (i, &v) in group.iter().enumerate() {
            control |= ((byte_len(v) - 1) as u8) << (2 * i);
        }
        out.push(control);
    }
    for &v in values {
        out.extend_from_slice(&v.to_le_bytes()[..byte_len(v)]);
    }
}

fn decode_tail(
    buf: &[u8],
    start: usize,
    count: usize,
    out: &mut Vec<u32>,
) -> Result<usize, DecodeError> {
    let control_len = count.div_ceil(4);
    let control = buf
        .get(start..start + control_len)
        .ok_or(DecodeError::Truncated(start))?;
    let mut pos = start + control_len;

    for i in 0..count {
        let len = ((control[i / 4] >> (2 * (i % 4))) & 3) as usize + 1;
        let bytes = buf.get(pos..pos + len).ok_or(DecodeError::Truncated(pos))?;
        let mut le = [0u8; 4];
        le[..len].copy_from_slice(bytes);
        out.push(u32::from_le_bytes(le));
        pos += len;
    }

    Ok(pos - start)
}

/// Turn an ascending sequence into first value + successive differences.
pub fn delta_encode(values: &[u32]) -> Vec<u32> {
    let mut prev = 0u32;
    values
        .iter()
        .map(|&v| {
            let d = v.wrapping_sub(prev);
            prev = v;
            d
        })
        .collect()
}

/// Inverse of [`delta_encode`], in place.
pub fn accumulate(values: &mut [u32]) {
    let mut sum = 0u32;
    for v in values {
        sum = sum.wrapping_add(*v);
        *v = sum;
    }
}
