//! Sparse vector types: the bag-of-words vector (word -> weight) and the
//! feature vector (direct-index node -> local feature indices). Both keep
//! their keys sorted so scoring and merging run as a single linear pass
//! over the two vectors instead of hash lookups.

use serde::{Deserialize, Serialize};

use crate::ids::{NodeId, WordId};
use crate::weighting::Weighting;

/// Sparse word -> weight mapping for one image, sorted by `WordId`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BowVector {
    entries: Vec<(WordId, f64)>,
}

impl BowVector {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[(WordId, f64)] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = (WordId, f64)> + '_ {
        self.entries.iter().copied()
    }

    pub fn get(&self, word: WordId) -> Option<f64> {
        self.entries
            .binary_search_by_key(&word, |(w, _)| *w)
            .ok()
            .map(|i| self.entries[i].1)
    }

    /// Build a sorted, deduplicated vector from the raw (possibly
    /// repeated, unsorted) per-descriptor contributions produced during
    /// quantization. Under `Binary` weighting repeated words collapse to
    /// presence (`1.0`); otherwise contributions for the same word sum.
    pub fn from_raw(mut raw: Vec<(WordId, f64)>, weighting: Weighting) -> Self {
        raw.sort_unstable_by_key(|(w, _)| *w);
        let mut entries: Vec<(WordId, f64)> = Vec::with_capacity(raw.len());
        for (word, value) in raw {
            match entries.last_mut() {
                Some((last_word, last_value)) if *last_word == word => {
                    if weighting == Weighting::Binary {
                        *last_value = 1.0;
                    } else {
                        *last_value += value;
                    }
                }
                _ => entries.push((word, if weighting == Weighting::Binary { 1.0 } else { value })),
            }
        }
        Self { entries }
    }

    /// Multiply every value by `factor` in place.
    pub fn scale(&mut self, factor: f64) {
        for (_, v) in self.entries.iter_mut() {
            *v *= factor;
        }
    }

    /// Divides by the L1 norm (sum of values, all non-negative). Per
    /// spec, a would-be division by zero leaves the vector as-is (empty
    /// vectors stay empty).
    pub fn normalize_l1(&mut self) {
        let sum: f64 = self.entries.iter().map(|(_, v)| v).sum();
        if sum > 0.0 {
            self.scale(1.0 / sum);
        }
    }

    /// Divides by the L2 norm (Euclidean length).
    pub fn normalize_l2(&mut self) {
        let sum_sq: f64 = self.entries.iter().map(|(_, v)| v * v).sum();
        if sum_sq > 0.0 {
            self.scale(1.0 / sum_sq.sqrt());
        }
    }
}

/// Two-cursor merge over `a`'s keys, yielding `(word, a_value, b_value)`
/// for every word present in `a` (`b_value` is `0.0` when absent). Runs
/// in `O(|a| + |b|)` by walking both sorted entry lists in lockstep
/// rather than binary-searching `b` per entry of `a`. This is the
/// "primary-sided" merge scoring and the database's posting-list scan
/// both rely on: a word present only in `b` always contributes `0` to
/// every scoring function but KL, and KL's own asymmetry is defined in
/// terms of one preferred side, which callers pick by argument order.
pub fn merge_primary<'a>(a: &'a BowVector, b: &'a BowVector) -> impl Iterator<Item = (WordId, f64, f64)> + 'a {
    let b_entries = b.entries();
    let mut j = 0usize;
    a.entries.iter().map(move |&(word, a_val)| {
        while j < b_entries.len() && b_entries[j].0 < word {
            j += 1;
        }
        let b_val = if j < b_entries.len() && b_entries[j].0 == word {
            b_entries[j].1
        } else {
            0.0
        };
        (word, a_val, b_val)
    })
}

/// Sparse mapping from a direct-index tree node to the local feature
/// indices (within one image) that descended through it, sorted by
/// `NodeId`. Each feature index appears under exactly one key.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    entries: Vec<(NodeId, Vec<u32>)>,
}

impl FeatureVector {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn add_feature(&mut self, node: NodeId, feature_index: u32) {
        match self.entries.binary_search_by_key(&node, |(n, _)| *n) {
            Ok(i) => self.entries[i].1.push(feature_index),
            Err(i) => self.entries.insert(i, (node, vec![feature_index])),
        }
    }

    pub fn get(&self, node: NodeId) -> Option<&[u32]> {
        self.entries
            .binary_search_by_key(&node, |(n, _)| *n)
            .ok()
            .map(|i| self.entries[i].1.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &[u32])> {
        self.entries.iter().map(|(n, v)| (*n, v.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_raw_sums_by_default() {
        let bow = BowVector::from_raw(vec![(2, 1.0), (1, 0.5), (2, 1.0)], Weighting::Tf);
        assert_eq!(bow.entries(), &[(1, 0.5), (2, 2.0)]);
    }

    #[test]
    fn from_raw_binary_collapses_to_presence() {
        let bow = BowVector::from_raw(vec![(2, 1.0), (2, 1.0), (1, 1.0)], Weighting::Binary);
        assert_eq!(bow.entries(), &[(1, 1.0), (2, 1.0)]);
    }

    #[test]
    fn normalize_l1_scales_to_unit_sum() {
        let mut bow = BowVector::from_raw(vec![(0, 1.0), (1, 3.0)], Weighting::Tf);
        bow.normalize_l1();
        let sum: f64 = bow.iter().map(|(_, v)| v).sum();
        assert!((sum - 1.0).abs() < 1e-12);
    }

    #[test]
    fn normalize_on_empty_is_noop() {
        let mut bow = BowVector::new();
        bow.normalize_l1();
        assert!(bow.is_empty());
    }

    #[test]
    fn merge_primary_fills_missing_with_zero() {
        let a = BowVector::from_raw(vec![(0, 1.0), (2, 2.0)], Weighting::Tf);
        let b = BowVector::from_raw(vec![(2, 5.0)], Weighting::Tf);
        let merged: Vec<_> = merge_primary(&a, &b).collect();
        assert_eq!(merged, vec![(0, 1.0, 0.0), (2, 2.0, 5.0)]);
    }

    /// Exercises the two-cursor walk with keys interleaved in both
    /// directions (gaps in `b` before, between, and after `a`'s keys),
    /// not just a single missing-then-present key.
    #[test]
    fn merge_primary_two_cursor_handles_interleaved_keys() {
        let a = BowVector::from_raw(vec![(1, 1.0), (3, 3.0), (5, 5.0), (7, 7.0)], Weighting::Tf);
        let b = BowVector::from_raw(vec![(0, 10.0), (3, 30.0), (4, 40.0), (7, 70.0), (9, 90.0)], Weighting::Tf);
        let merged: Vec<_> = merge_primary(&a, &b).collect();
        assert_eq!(
            merged,
            vec![(1, 1.0, 0.0), (3, 3.0, 30.0), (5, 5.0, 0.0), (7, 7.0, 70.0)]
        );
    }

    #[test]
    fn feature_vector_groups_by_node() {
        let mut fv = FeatureVector::new();
        fv.add_feature(3, 0);
        fv.add_feature(1, 1);
        fv.add_feature(3, 2);
        assert_eq!(fv.get(3), Some(&[0u32, 2][..]));
        assert_eq!(fv.get(1), Some(&[1u32][..]));
        assert_eq!(fv.get(9), None);
    }
}
