//! Rule Bitsets
//!
//! Dense bitsets over rule entry positions. Iteration is ascending, which
//! is declaration order for the rule index.

/// Growable dense bitset
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleBitSet {
    words: Vec<u64>,
}

impl RuleBitSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bitset able to hold `bits` positions without growing
    pub fn with_capacity(bits: usize) -> Self {
        Self { words: vec![0; bits.div_ceil(64)] }
    }

    /// Set a position
    pub fn insert(&mut self, pos: usize) {
        let word = pos / 64;
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1 << (pos % 64);
    }

    pub fn contains(&self, pos: usize) -> bool {
        self.words.get(pos / 64).is_some_and(|w| (w >> (pos % 64)) & 1 == 1)
    }

    /// In-place union
    pub fn union_with(&mut self, other: &RuleBitSet) {
        if other.words.len() > self.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            *a |= *b;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    /// Number of set positions
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Ascending iterator over set positions
    pub fn iter(&self) -> BitIter<'_> {
        BitIter { words: &self.words, index: 0, current: self.words.first().copied().unwrap_or(0) }
    }
}

/// Iterator over set positions
pub struct BitIter<'a> {
    words: &'a [u64],
    index: usize,
    current: u64,
}

impl Iterator for BitIter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        loop {
            if self.current != 0 {
                let bit = self.current.trailing_zeros() as usize;
                // Clear lowest set bit
                self.current &= self.current - 1;
                return Some(self.index * 64 + bit);
            }
            self.index += 1;
            self.current = *self.words.get(self.index)?;
        }
    }
}

impl<'a> IntoIterator for &'a RuleBitSet {
    type Item = usize;
    type IntoIter = BitIter<'a>;

    fn into_iter(self) -> BitIter<'a> {
        self.iter()
    }
}
