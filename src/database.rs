//! Inverted index and image database: append-only posting lists per word,
//! top-k similarity query, and (optionally) a direct index for
//! cross-image feature correspondence.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::bow::FeatureVector;
use crate::descriptor::Descriptor;
use crate::error::{BowError, BowResult};
use crate::ids::EntryId;
use crate::scoring;
use crate::vocab::Vocabulary;

/// One `(entry, weight)` pair in a word's posting list. Entries within a
/// single list are unique and appear in insertion (monotonically
/// increasing `EntryId`) order.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct Posting {
    entry: EntryId,
    weight: f64,
}

/// An append-only image database built on top of a trained vocabulary:
/// `add` quantizes and appends postings, `query` scores every candidate
/// reachable through the query's own words and returns the top-k.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Database<D: Descriptor> {
    vocabulary: Vocabulary<D>,
    use_direct_index: bool,
    direct_index_level: u32,
    inverted_index: Vec<Vec<Posting>>,
    direct_index: Vec<Option<FeatureVector>>,
    num_entries: u32,
}

impl<D: Descriptor> Database<D> {
    /// Takes ownership of a trained vocabulary. `direct_index_level` is
    /// only meaningful when `use_direct_index` is set.
    pub fn new(vocabulary: Vocabulary<D>, use_direct_index: bool, direct_index_level: u32) -> BowResult<Self> {
        if vocabulary.is_empty() {
            return Err(BowError::NotTrained);
        }
        let num_words = vocabulary.size() as usize;
        Ok(Self {
            vocabulary,
            use_direct_index,
            direct_index_level,
            inverted_index: vec![Vec::new(); num_words],
            direct_index: Vec::new(),
            num_entries: 0,
        })
    }

    pub fn size(&self) -> u32 {
        self.num_entries
    }

    pub fn vocabulary(&self) -> &Vocabulary<D> {
        &self.vocabulary
    }

    /// Drops every posting and direct-index entry, keeping the owned
    /// vocabulary so the database can be reused.
    pub fn clear(&mut self) {
        for postings in self.inverted_index.iter_mut() {
            postings.clear();
        }
        self.direct_index.clear();
        self.num_entries = 0;
        log::info!("database cleared");
    }

    /// Transforms `features`, assigns the next `EntryId`, and appends a
    /// posting to every word's list. Fails (leaving no partial state)
    /// if `features` is empty.
    pub fn add(&mut self, features: &[D]) -> BowResult<EntryId> {
        let level = self.use_direct_index.then_some(self.direct_index_level);
        let (bow, fv) = self.vocabulary.transform_with_fv(features, level)?;

        let eid = self.num_entries;
        for (word, weight) in bow.iter() {
            self.inverted_index[word as usize].push(Posting { entry: eid, weight });
        }
        self.direct_index.push(self.use_direct_index.then_some(fv));
        self.num_entries += 1;
        log::trace!("added entry {eid} ({} features)", features.len());
        Ok(eid)
    }

    /// Scores `features` against every entry reachable through the
    /// query's own words (postings of words absent from the query are
    /// never visited), sorts by similarity (ascending for KL, descending
    /// otherwise, ties broken by lower `EntryId`), and truncates to
    /// `max_results`. `max_entry_id`, if set, restricts candidates to
    /// entries inserted at or before it.
    pub fn query(&self, features: &[D], max_results: usize, max_entry_id: Option<EntryId>) -> BowResult<Vec<(EntryId, f64)>> {
        let query_bow = self.vocabulary.transform(features)?;
        let scoring = self.vocabulary.scoring();

        let mut pairs: HashMap<EntryId, f64> = HashMap::new();
        for (word, q_weight) in query_bow.iter() {
            for posting in &self.inverted_index[word as usize] {
                if let Some(cap) = max_entry_id {
                    if posting.entry > cap {
                        continue;
                    }
                }
                let acc = pairs.entry(posting.entry).or_insert(0.0);
                scoring::accumulate(scoring, acc, q_weight, posting.weight);
            }
        }

        let mut results: Vec<(EntryId, f64)> = Vec::with_capacity(pairs.len());
        for (entry, acc) in pairs {
            let value = scoring::finalize(scoring, acc);
            if !value.is_finite() {
                return Err(BowError::Numeric(format!("{scoring:?} produced {value} for entry {entry}")));
            }
            results.push((entry, value));
        }

        let higher_is_better = scoring.higher_is_better();
        results.sort_by(|a, b| {
            let primary = if higher_is_better {
                b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal)
            } else {
                a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal)
            };
            primary.then_with(|| a.0.cmp(&b.0))
        });
        results.truncate(max_results);
        log::trace!("query returned {} of possibly more candidates", results.len());
        Ok(results)
    }

    pub fn get_feature_vector(&self, entry: EntryId) -> BowResult<&FeatureVector> {
        if !self.use_direct_index {
            return Err(BowError::DirectIndexDisabled);
        }
        self.direct_index
            .get(entry as usize)
            .and_then(|fv| fv.as_ref())
            .ok_or(BowError::EntryOutOfRange(entry))
    }

    /// For every direct-index node present in both `a` and `b`'s feature
    /// vectors, yields the Cartesian product of their local feature
    /// indices. Symmetric: `retrieve_features(a, b)` and
    /// `retrieve_features(b, a)` (with pairs swapped) contain the same
    /// pair set.
    pub fn retrieve_features(&self, a: EntryId, b: EntryId) -> BowResult<Vec<(u32, u32)>> {
        let fv_a = self.get_feature_vector(a)?;
        let fv_b = self.get_feature_vector(b)?;
        let mut out = Vec::new();
        for (node, indices_a) in fv_a.iter() {
            if let Some(indices_b) = fv_b.get(node) {
                for &ia in indices_a {
                    for &ib in indices_b {
                        out.push((ia, ib));
                    }
                }
            }
        }
        Ok(out)
    }

    #[cfg(feature = "bincode")]
    pub fn load<P: AsRef<std::path::Path>>(path: P) -> BowResult<Self>
    where
        D: serde::de::DeserializeOwned,
    {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        Ok(bincode::deserialize_from(reader)?)
    }

    #[cfg(feature = "bincode")]
    pub fn save<P: AsRef<std::path::Path>>(&self, path: P) -> BowResult<()>
    where
        D: serde::Serialize,
    {
        let file = std::fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        bincode::serialize_into(writer, self)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::BinaryDescriptor;
    use crate::scoring::Scoring;
    use crate::weighting::Weighting;
    use rand::{Rng, SeedableRng};

    fn random_descriptor(rng: &mut impl Rng) -> BinaryDescriptor<4> {
        BinaryDescriptor::new([rng.gen(), rng.gen(), rng.gen(), rng.gen()])
    }

    fn random_image(rng: &mut impl Rng, n: usize) -> Vec<BinaryDescriptor<4>> {
        (0..n).map(|_| random_descriptor(rng)).collect()
    }

    fn build_db(n_images: usize, n_feats: usize, use_direct_index: bool, seed: u64) -> (Database<BinaryDescriptor<4>>, Vec<Vec<BinaryDescriptor<4>>>) {
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        let images: Vec<Vec<BinaryDescriptor<4>>> = (0..n_images).map(|_| random_image(&mut rng, n_feats)).collect();
        let voc = Vocabulary::new(10, 4, Weighting::TfIdf, Scoring::L1)
            .unwrap()
            .create(&images, seed)
            .unwrap();
        let mut db = Database::new(voc, use_direct_index, 2).unwrap();
        for image in &images {
            db.add(image).unwrap();
        }
        (db, images)
    }

    #[test]
    fn self_match_is_top_result() {
        let (db, images) = build_db(30, 40, false, 11);
        for (i, image) in images.iter().enumerate() {
            let results = db.query(image, 5, None).unwrap();
            assert_eq!(results[0].0, i as u32, "entry {i} was not its own top match");
        }
    }

    #[test]
    fn max_entry_id_filters_candidates() {
        let (db, images) = build_db(10, 40, false, 5);
        let results = db.query(&images[5], 10, Some(4)).unwrap();
        assert!(results.iter().all(|(e, _)| *e <= 4));
    }

    #[test]
    fn add_rejects_empty_features() {
        let (mut db, _) = build_db(5, 10, false, 1);
        let empty: Vec<BinaryDescriptor<4>> = Vec::new();
        assert!(matches!(db.add(&empty), Err(BowError::EmptyInput)));
    }

    #[test]
    fn direct_index_disabled_by_default_errors() {
        let (db, _) = build_db(5, 10, false, 1);
        assert!(matches!(db.get_feature_vector(0), Err(BowError::DirectIndexDisabled)));
    }

    #[test]
    fn direct_index_recall_covers_all_features() {
        let (db, _) = build_db(5, 100, true, 2);
        let fv = db.get_feature_vector(0).unwrap();
        let mut covered: Vec<u32> = fv.iter().flat_map(|(_, idxs)| idxs.iter().copied()).collect();
        covered.sort_unstable();
        covered.dedup();
        assert_eq!(covered, (0..100).collect::<Vec<u32>>());
    }

    #[test]
    fn retrieve_features_is_symmetric() {
        let (db, _) = build_db(5, 50, true, 3);
        let forward = db.retrieve_features(1, 3).unwrap();
        let backward = db.retrieve_features(3, 1).unwrap();
        let mut forward_swapped: Vec<(u32, u32)> = backward.iter().map(|(a, b)| (*b, *a)).collect();
        let mut forward_sorted = forward.clone();
        forward_sorted.sort_unstable();
        forward_swapped.sort_unstable();
        assert_eq!(forward_sorted, forward_swapped);
    }

    #[test]
    fn clear_resets_entries_but_keeps_vocabulary() {
        let (mut db, _) = build_db(5, 10, false, 4);
        assert_eq!(db.size(), 5);
        db.clear();
        assert_eq!(db.size(), 0);
        assert!(!db.vocabulary().is_empty());
    }
}
