//! Bit-packed 2D mask.
//!
//! One bit per pixel in `u64` words, LSB first. Pixel masks in this workspace
//! use a set bit to mark a bad pixel.

/// Number of bits per storage word.
const BITS_PER_WORD: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitBuffer2 {
    words: Vec<u64>,
    width: usize,
    height: usize,
    /// Total number of bits (width * height).
    len: usize,
}

impl BitBuffer2 {
    /// Create a new bit buffer filled with the given value.
    #[inline]
    pub fn new_filled(width: usize, height: usize, value: bool) -> Self {
        let len = width * height;
        let num_words = len.div_ceil(BITS_PER_WORD);
        let fill = if value { !0u64 } else { 0u64 };
        let mut buf = Self {
            words: vec![fill; num_words],
            width,
            height,
            len,
        };
        buf.clear_tail();
        buf
    }

    /// Create a new bit buffer with all bits cleared.
    #[inline]
    pub fn new_default(width: usize, height: usize) -> Self {
        Self::new_filled(width, height, false)
    }

    /// Create a bit buffer from a slice of booleans in row-major order.
    pub fn from_slice(width: usize, height: usize, data: &[bool]) -> Self {
        assert_eq!(
            data.len(),
            width * height,
            "data length {} does not match dimensions {}x{}",
            data.len(),
            width,
            height
        );
        Self::from_fn(width, height, |x, y| data[y * width + x])
    }

    /// Create a bit buffer by evaluating `f(x, y)` for every pixel.
    pub fn from_fn<F>(width: usize, height: usize, mut f: F) -> Self
    where
        F: FnMut(usize, usize) -> bool,
    {
        let mut buf = Self::new_default(width, height);
        for y in 0..height {
            for x in 0..width {
                if f(x, y) {
                    buf.set_xy(x, y, true);
                }
            }
        }
        buf
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Get a bit value at the given linear index.
    #[inline]
    pub fn get(&self, idx: usize) -> bool {
        debug_assert!(idx < self.len);
        (self.words[idx / BITS_PER_WORD] >> (idx % BITS_PER_WORD)) & 1 != 0
    }

    /// Set a bit value at the given linear index.
    #[inline]
    pub fn set(&mut self, idx: usize, value: bool) {
        debug_assert!(idx < self.len);
        let word = &mut self.words[idx / BITS_PER_WORD];
        let bit = 1u64 << (idx % BITS_PER_WORD);
        if value {
            *word |= bit;
        } else {
            *word &= !bit;
        }
    }

    #[inline]
    pub fn get_xy(&self, x: usize, y: usize) -> bool {
        debug_assert!(x < self.width && y < self.height);
        self.get(y * self.width + x)
    }

    #[inline]
    pub fn set_xy(&mut self, x: usize, y: usize, value: bool) {
        debug_assert!(x < self.width && y < self.height);
        self.set(y * self.width + x, value);
    }

    /// Count the number of set bits.
    #[inline]
    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Set every bit that is set in `other` (logical OR).
    pub fn union_with(&mut self, other: &Self) {
        assert_eq!(self.shape(), other.shape(), "mask shape mismatch");
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            *a |= *b;
        }
    }

    // Bits past `len` in the last word stay zero so `count_ones` is exact.
    fn clear_tail(&mut self) {
        let rem = self.len % BITS_PER_WORD;
        if rem != 0 {
            if let Some(last) = self.words.last_mut() {
                *last &= (1u64 << rem) - 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_filled_true_counts_exactly() {
        // 7x9 = 63 bits, one partially used word
        let buf = BitBuffer2::new_filled(7, 9, true);
        assert_eq!(buf.count_ones(), 63);
        assert!(buf.get(62));
    }

    #[test]
    fn test_set_get_across_word_boundary() {
        let mut buf = BitBuffer2::new_default(64, 2);
        buf.set(63, true);
        buf.set(64, true);
        assert!(buf.get(63));
        assert!(buf.get(64));
        assert!(!buf.get(62));
        assert!(buf.get_xy(0, 1));
        assert_eq!(buf.count_ones(), 2);
    }

    #[test]
    fn test_from_fn_matches_predicate() {
        let buf = BitBuffer2::from_fn(5, 4, |x, y| x == y);
        assert_eq!(buf.count_ones(), 4);
        assert!(buf.get_xy(3, 3));
        assert!(!buf.get_xy(4, 3));
    }

    #[test]
    fn test_union_with() {
        let mut a = BitBuffer2::from_slice(2, 2, &[true, false, false, false]);
        let b = BitBuffer2::from_slice(2, 2, &[false, false, false, true]);
        a.union_with(&b);
        let values: Vec<bool> = (0..a.len()).map(|i| a.get(i)).collect();
        assert_eq!(values, vec![true, false, false, true]);
    }

    #[test]
    fn test_empty_buffer() {
        let buf = BitBuffer2::new_filled(0, 3, true);
        assert!(buf.is_empty());
        assert_eq!(buf.count_ones(), 0);
    }
}
