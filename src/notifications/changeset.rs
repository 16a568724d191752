use crate::storage::RowKey;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::ops::Range;

/// Sorted, coalesced set of indices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexSet {
    ranges: SmallVec<[Range<usize>; 4]>,
}

impl IndexSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, index: usize) {
        let pos = self.ranges.partition_point(|r| r.end < index);
        if let Some(range) = self.ranges.get_mut(pos) {
            if range.contains(&index) {
                return;
            }
            if range.end == index {
                range.end += 1;
                let end = range.end;
                if self.ranges.get(pos + 1).is_some_and(|next| next.start == end) {
                    let next = self.ranges.remove(pos + 1);
                    self.ranges[pos].end = next.end;
                }
                return;
            }
            if range.start == index + 1 {
                range.start = index;
                return;
            }
        }
        self.ranges.insert(pos, index..index + 1);
    }

    pub fn contains(&self, index: usize) -> bool {
        let pos = self.ranges.partition_point(|r| r.end <= index);
        self.ranges.get(pos).is_some_and(|r| r.contains(&index))
    }

    pub fn count(&self) -> usize {
        self.ranges.iter().map(|r| r.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn ranges(&self) -> &[Range<usize>] {
        &self.ranges
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.ranges.iter().flat_map(|r| r.clone())
    }
}

impl FromIterator<usize> for IndexSet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let mut set = IndexSet::new();
        for index in iter {
            set.add(index);
        }
        set
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Move {
    pub from: usize,
    pub to: usize,
}

/// Difference between two states of one collection.
///
/// `deletions` and `modifications` index the old state; `insertions` and
/// `modifications_new` index the new one. A moved row appears in `moves` and
/// also as a deletion of its old index and an insertion of its new index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionChangeSet {
    pub deletions: IndexSet,
    pub insertions: IndexSet,
    pub modifications: IndexSet,
    pub modifications_new: IndexSet,
    pub moves: Vec<Move>,
    pub collection_invalidated: bool,
}

impl CollectionChangeSet {
    pub fn is_empty(&self) -> bool {
        self.deletions.is_empty()
            && self.insertions.is_empty()
            && self.modifications.is_empty()
            && self.moves.is_empty()
            && !self.collection_invalidated
    }

    /// Every old row deleted, and the collection itself gone.
    pub fn invalidated(old_len: usize) -> Self {
        Self {
            deletions: (0..old_len).collect(),
            collection_invalidated: true,
            ..Self::default()
        }
    }

    /// Diffs two `(row key, row version)` sequences. A key may occur more than
    /// once; its n-th occurrences on both sides are matched with each other.
    pub fn calculate(old: &[(RowKey, u64)], new: &[(RowKey, u64)]) -> Self {
        let mut changes = Self::default();

        let mut seen: HashMap<RowKey, usize> = HashMap::new();
        let mut old_positions: HashMap<(RowKey, usize), usize> = HashMap::with_capacity(old.len());
        for (index, (key, _)) in old.iter().enumerate() {
            let nth = seen.entry(*key).or_default();
            old_positions.insert((*key, *nth), index);
            *nth += 1;
        }

        seen.clear();
        let mut matched: Vec<(usize, usize)> = Vec::with_capacity(new.len());
        let mut kept = vec![false; old.len()];
        for (new_index, (key, version)) in new.iter().enumerate() {
            let nth = seen.entry(*key).or_default();
            let identity = (*key, *nth);
            *nth += 1;
            match old_positions.get(&identity) {
                Some(&old_index) => {
                    kept[old_index] = true;
                    matched.push((old_index, new_index));
                    if old[old_index].1 != *version {
                        changes.modifications.add(old_index);
                        changes.modifications_new.add(new_index);
                    }
                }
                None => changes.insertions.add(new_index),
            }
        }
        for (old_index, kept) in kept.into_iter().enumerate() {
            if !kept {
                changes.deletions.add(old_index);
            }
        }

        for (&(from, to), stable) in matched.iter().zip(stable_pairs(&matched)) {
            if !stable {
                changes.moves.push(Move { from, to });
                changes.deletions.add(from);
                changes.insertions.add(to);
            }
        }
        changes
    }
}

/// Marks the longest run of pairs whose old indices increase in new order.
/// Every other pair is a move.
fn stable_pairs(pairs: &[(usize, usize)]) -> Vec<bool> {
    let mut tails: Vec<usize> = Vec::new();
    let mut prev: Vec<Option<usize>> = vec![None; pairs.len()];
    for (idx, (old, _)) in pairs.iter().enumerate() {
        let pos = tails.partition_point(|&t| pairs[t].0 < *old);
        if pos > 0 {
            prev[idx] = Some(tails[pos - 1]);
        }
        if pos == tails.len() {
            tails.push(idx);
        } else {
            tails[pos] = idx;
        }
    }
    let mut stable = vec![false; pairs.len()];
    let mut cursor = tails.last().copied();
    while let Some(idx) = cursor {
        stable[idx] = true;
        cursor = prev[idx];
    }
    stable
}
