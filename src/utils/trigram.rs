use crate::index::types::{bytes_to_trigram, Trigram, TRIGRAM_SPACE};

/// Bitset for tracking which trigrams one file has produced.
///
/// Covers all 16M possible trigram values (2MB). The set is meant to be
/// reused across files: `clear` only resets the words that were touched, so
/// the cost per file is proportional to its distinct trigrams, not the
/// bitset size.
pub struct TrigramSet {
    bits: Vec<u64>,
    touched: Vec<u32>,
    len: usize,
}

impl TrigramSet {
    pub fn new() -> Self {
        Self {
            bits: vec![0u64; TRIGRAM_SPACE / 64],
            touched: Vec::new(),
            len: 0,
        }
    }

    /// Insert a trigram. Returns true if it was not present before.
    #[inline]
    pub fn insert(&mut self, trigram: Trigram) -> bool {
        let idx = ((trigram >> 6) as usize) & (TRIGRAM_SPACE / 64 - 1);
        let bit = 1u64 << (trigram & 63);
        let word = &mut self.bits[idx];
        if *word & bit != 0 {
            return false;
        }
        if *word == 0 {
            self.touched.push(idx as u32);
        }
        *word |= bit;
        self.len += 1;
        true
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        for &idx in &self.touched {
            self.bits[idx as usize] = 0;
        }
        self.touched.clear();
        self.len = 0;
    }
}

impl Default for TrigramSet {
    fn default() -> Self {
        Self::new()
    }
}

/// Reports whether the byte pair `c1 c2` can occur in UTF-8 text.
///
/// This is a cheap approximation applied to every pair of adjacent bytes
/// during indexing: an ASCII byte must be followed by ASCII or a lead byte,
/// a continuation byte by anything but the invalid 0xf8..=0xff range, and a
/// lead byte by a continuation byte.
#[inline]
pub fn valid_utf8_pair(c1: u8, c2: u8) -> bool {
    match c1 {
        0x00..=0x7f => c2 < 0x80 || (0xc0..0xf8).contains(&c2),
        0x80..=0xbf => c2 < 0xf8,
        0xc0..=0xf7 => (0x80..0xc0).contains(&c2),
        _ => false,
    }
}

/// Extract unique trigrams from a literal, sorted ascending.
pub fn query_trigrams(query: &[u8]) -> Vec<Trigram> {
    let mut trigrams: Vec<Trigram> = query
        .windows(3)
        .map(|w| bytes_to_trigram(w[0], w[1], w[2]))
        .collect();
    trigrams.sort_unstable();
    trigrams.dedup();
    trigrams
}

/// Extract every trigram of a literal together with its byte offset.
pub fn trigrams_with_offsets(content: &[u8]) -> Vec<(Trigram, u32)> {
    content
        .windows(3)
        .enumerate()
        .map(|(pos, w)| (bytes_to_trigram(w[0], w[1], w[2]), pos as u32))
        .collect()
}

/// Parse a trigram given on the command line: either exactly three bytes of
/// text, or a hex value like `0x616263`.
pub fn parse_trigram(s: &str) -> Option<Trigram> {
    if let Some(hex) = s.strip_prefix("0x") {
        let t = u32::from_str_radix(hex, 16).ok()?;
        return (t < TRIGRAM_SPACE as u32).then_some(t);
    }
    match s.as_bytes() {
        [a, b, c] => Some(bytes_to_trigram(*a, *b, *c)),
        _ => None,
    }
}

/// Render a trigram for display, escaping non-printable bytes.
pub fn format_trigram(t: Trigram) -> String {
    crate::index::types::trigram_to_bytes(t)
        .iter()
        .flat_map(|&b| std::ascii::escape_default(b))
        .map(char::from)
        .collect()
}
