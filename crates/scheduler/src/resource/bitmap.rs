//! Fixed-size bitset with first-fit contiguous run search.

const WORD_BITS: usize = 64;

/// A fixed-capacity bitset. Set bits are units in use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    words: Vec<u64>,
    len: usize,
}

impl Bitmap {
    /// Create an all-clear bitmap with `len` units.
    pub fn new(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(WORD_BITS)],
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether unit `idx` is in use. Out-of-range units read as set.
    pub fn test(&self, idx: usize) -> bool {
        if idx >= self.len {
            return true;
        }
        self.words[idx / WORD_BITS] & (1 << (idx % WORD_BITS)) != 0
    }

    /// Number of units in use.
    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// True when no unit is in use.
    pub fn is_clear(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    /// Whether every unit in `[start, start + count)` is free.
    pub fn is_range_clear(&self, start: usize, count: usize) -> bool {
        if start + count > self.len {
            return false;
        }
        (start..start + count).all(|idx| !self.test(idx))
    }

    /// Whether every unit in `[start, start + count)` is in use.
    pub fn is_range_set(&self, start: usize, count: usize) -> bool {
        if start + count > self.len {
            return false;
        }
        (start..start + count).all(|idx| self.test(idx))
    }

    /// First-fit search for `count` contiguous free units, scanning from index 0.
    ///
    /// A zero-length request is satisfied at index 0 without inspecting the map.
    pub fn find_clear_run(&self, count: usize) -> Option<usize> {
        if count == 0 {
            return Some(0);
        }
        if count > self.len {
            return None;
        }
        let mut run_start = 0;
        let mut run_len = 0;
        for idx in 0..self.len {
            if self.test(idx) {
                run_len = 0;
                run_start = idx + 1;
                continue;
            }
            run_len += 1;
            if run_len == count {
                return Some(run_start);
            }
        }
        None
    }

    /// Mark `[start, start + count)` as in use.
    ///
    /// Panics if any unit is already in use: handing out one unit twice
    /// would corrupt the pool.
    pub fn set_range(&mut self, start: usize, count: usize) {
        assert!(
            self.is_range_clear(start, count),
            "double allocation of units {start}..{} (len {})",
            start + count,
            self.len
        );
        for idx in start..start + count {
            self.words[idx / WORD_BITS] |= 1 << (idx % WORD_BITS);
        }
    }

    /// Mark `[start, start + count)` as free.
    ///
    /// Panics if any unit is not in use: releasing a grant twice is a caller bug.
    pub fn clear_range(&mut self, start: usize, count: usize) {
        assert!(
            self.is_range_set(start, count),
            "double free of units {start}..{} (len {})",
            start + count,
            self.len
        );
        for idx in start..start + count {
            self.words[idx / WORD_BITS] &= !(1 << (idx % WORD_BITS));
        }
    }

    /// Indices of units in use, ascending.
    pub fn iter_ones(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len).filter(move |idx| self.test(*idx))
    }

    /// Whether any unit is in use in both maps.
    pub fn intersects(&self, other: &Bitmap) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .any(|(a, b)| a & b != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_fit_from_zero() {
        let mut map = Bitmap::new(10);
        assert_eq!(map.find_clear_run(3), Some(0));
        map.set_range(0, 3);
        assert_eq!(map.find_clear_run(3), Some(3));
        map.set_range(4, 1);
        // 3 is a single hole; the first run of two starts after the set unit.
        assert_eq!(map.find_clear_run(2), Some(5));
        assert_eq!(map.find_clear_run(1), Some(3));
    }

    #[test]
    fn exhausted_run() {
        let mut map = Bitmap::new(4);
        map.set_range(1, 1);
        assert_eq!(map.find_clear_run(3), None);
        assert_eq!(map.find_clear_run(5), None);
        assert_eq!(map.find_clear_run(2), Some(2));
    }

    #[test]
    fn zero_length_request() {
        let map = Bitmap::new(0);
        assert_eq!(map.find_clear_run(0), Some(0));
        assert!(map.is_empty());
    }

    #[test]
    fn crosses_word_boundary() {
        let mut map = Bitmap::new(130);
        map.set_range(0, 60);
        assert_eq!(map.find_clear_run(10), Some(60));
        map.set_range(60, 10);
        assert!(map.test(63));
        assert!(map.test(64));
        assert!(!map.test(70));
        assert_eq!(map.count_ones(), 70);
        map.clear_range(0, 70);
        assert!(map.is_clear());
    }

    #[test]
    fn out_of_range_reads_as_set() {
        let map = Bitmap::new(3);
        assert!(map.test(3));
        assert!(!map.is_range_clear(2, 2));
    }

    #[test]
    fn intersects_detects_overlap() {
        let mut a = Bitmap::new(8);
        let mut b = Bitmap::new(8);
        a.set_range(0, 2);
        b.set_range(2, 2);
        assert!(!a.intersects(&b));
        b.set_range(1, 1);
        assert!(a.intersects(&b));
        assert_eq!(b.iter_ones().collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    #[should_panic(expected = "double free")]
    fn double_free_panics() {
        let mut map = Bitmap::new(8);
        map.set_range(2, 3);
        map.clear_range(2, 3);
        map.clear_range(2, 3);
    }

    #[test]
    #[should_panic(expected = "double allocation")]
    fn double_allocation_panics() {
        let mut map = Bitmap::new(8);
        map.set_range(2, 3);
        map.set_range(4, 1);
    }
}
