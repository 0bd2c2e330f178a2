use std::fmt;

/// Fixed-capacity set of small integers
///
/// Used for local-slot write-sets and for the "already queued" flags of the worklists. Indices at
/// or past the capacity are never members, and inserting them is a no-op.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct BitSet {
    words: Vec<u64>,
    capacity: usize,
}

impl BitSet {
    /// New set with no members
    pub fn new(capacity: usize) -> BitSet {
        BitSet {
            words: vec![0; (capacity + 63) / 64],
            capacity,
        }
    }

    /// Largest member this set can hold, plus one
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn contains(&self, idx: usize) -> bool {
        if idx >= self.capacity {
            return false;
        }
        (self.words[idx / 64] >> (idx % 64)) & 1 == 1
    }

    /// Add a member, returning whether it was newly added
    pub fn insert(&mut self, idx: usize) -> bool {
        if idx >= self.capacity {
            return false;
        }
        let word = &mut self.words[idx / 64];
        let mask = 1_u64 << (idx % 64);
        let fresh = *word & mask == 0;
        *word |= mask;
        fresh
    }

    /// Remove a member, returning whether it was present
    pub fn remove(&mut self, idx: usize) -> bool {
        if idx >= self.capacity {
            return false;
        }
        let word = &mut self.words[idx / 64];
        let mask = 1_u64 << (idx % 64);
        let present = *word & mask != 0;
        *word &= !mask;
        present
    }

    /// Add all members of `other`, returning whether anything changed
    ///
    /// Members of `other` beyond this set's capacity are dropped.
    pub fn union_with(&mut self, other: &BitSet) -> bool {
        let mut changed = false;
        for (idx, (word, other_word)) in self.words.iter_mut().zip(&other.words).enumerate() {
            let mut incoming = *other_word;
            let last_bits = self.capacity - idx * 64;
            if last_bits < 64 {
                incoming &= (1_u64 << last_bits) - 1;
            }
            let merged = *word | incoming;
            changed |= merged != *word;
            *word = merged;
        }
        changed
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|word| *word == 0)
    }

    pub fn len(&self) -> usize {
        self.words.iter().map(|word| word.count_ones() as usize).sum()
    }

    /// Members in increasing order
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(idx, word)| {
            let word = *word;
            (0..64)
                .filter(move |bit| (word >> bit) & 1 == 1)
                .map(move |bit| idx * 64 + bit)
        })
    }
}

impl fmt::Debug for BitSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn insert_and_remove() {
        let mut set = BitSet::new(130);
        assert!(set.is_empty());
        assert!(set.insert(0));
        assert!(set.insert(64));
        assert!(set.insert(129));
        assert!(!set.insert(64));
        assert!(!set.insert(130), "Past capacity");

        assert_eq!(set.iter().collect::<Vec<_>>(), vec![0, 64, 129]);
        assert_eq!(set.len(), 3);

        assert!(set.remove(64));
        assert!(!set.remove(64));
        assert!(!set.contains(64));
        assert!(set.contains(129));
    }

    #[test]
    fn union_reports_change() {
        let mut small = BitSet::new(3);
        let mut large = BitSet::new(70);
        large.insert(1);
        large.insert(68);

        assert!(small.union_with(&large));
        assert_eq!(small.iter().collect::<Vec<_>>(), vec![1]);
        assert!(!small.union_with(&large), "Already a superset");
    }
}
