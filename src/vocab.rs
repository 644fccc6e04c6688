//! Hierarchical vocabulary tree: recursive k-means construction,
//! descriptor quantization, and TF-IDF/TF/IDF/BINARY weight assignment.
//!
//! Nodes live in a flat `Vec`, addressed by index (`NodeId`), rather than
//! as a pointer-based tree — children are `NodeId`s, parents are
//! `NodeId`s, there is no ownership cycle to reason about, and
//! (de)serialization is just serializing the array in order.

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::bow::{BowVector, FeatureVector};
use crate::descriptor::Descriptor;
use crate::error::{BowError, BowResult};
use crate::ids::{NodeId, WordId, NO_PARENT, ROOT};
use crate::scoring::{self, Scoring};
use crate::weighting::Weighting;

const MAX_LLOYD_ITERATIONS: usize = 10;
const MIN_K: u32 = 2;
const MAX_K: u32 = 256;
const MIN_DEPTH: u32 = 1;
const MAX_DEPTH: u32 = 10;
/// Inline capacity for a node's children list before it spills to the
/// heap; covers the default branching factor (10) and most configured
/// ones without an allocation per node.
const INLINE_CHILDREN: usize = 16;

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Node<D> {
    parent: NodeId,
    children: SmallVec<[NodeId; INLINE_CHILDREN]>,
    descriptor: D,
    weight: f64,
    word_id: Option<WordId>,
}

impl<D> Node<D> {
    fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// A trained (or untrained) hierarchical vocabulary over descriptors of
/// type `D`. Immutable once [`Vocabulary::create`] has populated it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Vocabulary<D: Descriptor> {
    k: u32,
    max_depth: u32,
    weighting: Weighting,
    scoring: Scoring,
    nodes: Vec<Node<D>>,
    /// word_id -> node_id, dense, assigned in traversal order at the end
    /// of construction.
    words: Vec<NodeId>,
}

impl<D: Descriptor> Vocabulary<D> {
    /// An empty, untrained vocabulary with fixed configuration.
    pub fn new(k: u32, max_depth: u32, weighting: Weighting, scoring: Scoring) -> BowResult<Self> {
        if !(MIN_K..=MAX_K).contains(&k) {
            return Err(BowError::InvalidBranchingFactor(k));
        }
        if !(MIN_DEPTH..=MAX_DEPTH).contains(&max_depth) {
            return Err(BowError::InvalidMaxDepth(max_depth));
        }
        Ok(Self {
            k,
            max_depth,
            weighting,
            scoring,
            nodes: Vec::new(),
            words: Vec::new(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Number of words (leaves) in the tree.
    pub fn size(&self) -> u32 {
        self.words.len() as u32
    }

    pub fn get_branching_factor(&self) -> u32 {
        self.k
    }

    pub fn get_depth_levels(&self) -> u32 {
        self.max_depth
    }

    pub fn scoring(&self) -> Scoring {
        self.scoring
    }

    pub fn weighting(&self) -> Weighting {
        self.weighting
    }

    pub fn get_word_weight(&self, word: WordId) -> BowResult<f64> {
        let node_id = *self.words.get(word as usize).ok_or(BowError::WordOutOfRange(word))?;
        Ok(self.nodes[node_id as usize].weight)
    }

    pub fn get_word(&self, word: WordId) -> BowResult<&D> {
        let node_id = *self.words.get(word as usize).ok_or(BowError::WordOutOfRange(word))?;
        Ok(&self.nodes[node_id as usize].descriptor)
    }

    /// Builds the tree from one descriptor list per training image via
    /// recursive k-means (k-means++ seeding, Lloyd iterations capped at
    /// 10), then assigns dense word ids and leaf weights in a single
    /// deterministic traversal. `seed` makes construction reproducible.
    pub fn create(mut self, training_features: &[Vec<D>], seed: u64) -> BowResult<Self> {
        if training_features.is_empty() || training_features.iter().all(|f| f.is_empty()) {
            return Err(BowError::EmptyInput);
        }
        self.nodes.clear();
        self.words.clear();

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let pool: Vec<(u32, &D)> = training_features
            .iter()
            .enumerate()
            .flat_map(|(img, feats)| feats.iter().map(move |d| (img as u32, d)))
            .collect();
        let num_images = training_features.len() as u32;

        let root_descriptor = D::mean_of(&pool.iter().map(|(_, d)| *d).collect::<Vec<_>>());
        let root = self.alloc_node(NO_PARENT, root_descriptor);
        debug_assert_eq!(root, ROOT);
        self.cluster(root, &pool, 0, &mut rng);

        self.assign_words_and_weights(num_images);
        log::info!(
            "vocabulary built: {} words, {} nodes, k={}, depth={}",
            self.size(),
            self.nodes.len(),
            self.k,
            self.max_depth
        );
        Ok(self)
    }

    fn alloc_node(&mut self, parent: NodeId, descriptor: D) -> NodeId {
        let id = self.nodes.len() as NodeId;
        self.nodes.push(Node {
            parent,
            children: SmallVec::new(),
            descriptor,
            weight: 0.0,
            word_id: None,
        });
        id
    }

    /// Recursively partitions `items` (image-tagged descriptor refs)
    /// rooted at `node_id`, which the caller has already allocated.
    fn cluster(&mut self, node_id: NodeId, items: &[(u32, &D)], depth: u32, rng: &mut ChaCha8Rng) {
        log::debug!(
            "k-means split: node={node_id} depth={depth} items={}",
            items.len()
        );
        debug_assert!(!items.is_empty());

        if depth == self.max_depth {
            self.finish_leaf(node_id, items);
            return;
        }

        if items.len() <= self.k as usize {
            // Too few descriptors to cluster meaningfully: one leaf child
            // per descriptor.
            for &(img, desc) in items {
                let child = self.alloc_node(node_id, desc.clone());
                self.nodes[node_id as usize].children.push(child);
                self.finish_leaf(child, &[(img, desc)]);
            }
            return;
        }

        let groups = self.kmeans_partition(items, rng);
        for group in groups {
            if group.is_empty() {
                continue;
            }
            let center = D::mean_of(&group.iter().map(|(_, d)| *d).collect::<Vec<_>>());
            let child = self.alloc_node(node_id, center);
            self.nodes[node_id as usize].children.push(child);
            self.cluster(child, &group, depth + 1, rng);
        }
    }

    fn finish_leaf(&mut self, node_id: NodeId, items: &[(u32, &D)]) {
        let descriptor = D::mean_of(&items.iter().map(|(_, d)| *d).collect::<Vec<_>>());
        let mut image_ids: Vec<u32> = items.iter().map(|(img, _)| *img).collect();
        image_ids.sort_unstable();
        image_ids.dedup();
        let node = &mut self.nodes[node_id as usize];
        node.descriptor = descriptor;
        // Temporarily stash the distinct training-image count; overwritten
        // with the real weight in `assign_words_and_weights`.
        node.weight = image_ids.len() as f64;
    }

    /// Modified k-means++ seeding followed by Lloyd iterations (assign,
    /// recompute center via `mean_of`, repeat until stable or 10 rounds).
    /// Ties in both seeding-collapse detection and nearest-center
    /// assignment break toward the lowest index.
    fn kmeans_partition<'a>(&self, items: &'a [(u32, &'a D)], rng: &mut ChaCha8Rng) -> Vec<Vec<(u32, &'a D)>> {
        let centers = self.seed_centers(items, rng);
        let k = centers.len();
        let mut assignment: Vec<usize> = vec![usize::MAX; items.len()];
        let mut centers = centers;

        for _iteration in 0..MAX_LLOYD_ITERATIONS {
            let mut changed = false;
            let mut new_assignment = vec![0usize; items.len()];
            for (i, (_, desc)) in items.iter().enumerate() {
                let mut best = (0usize, f64::INFINITY);
                for (c, center) in centers.iter().enumerate() {
                    let d = center.distance(desc);
                    if d < best.1 {
                        best = (c, d);
                    }
                }
                new_assignment[i] = best.0;
                if assignment[i] != best.0 {
                    changed = true;
                }
            }
            assignment = new_assignment;
            if !changed {
                break;
            }

            let mut groups: Vec<Vec<(u32, &D)>> = vec![Vec::new(); k];
            for (i, &(img, desc)) in items.iter().enumerate() {
                groups[assignment[i]].push((img, desc));
            }
            centers = groups
                .iter()
                .enumerate()
                .map(|(c, g)| {
                    if g.is_empty() {
                        centers[c].clone()
                    } else {
                        D::mean_of(&g.iter().map(|(_, d)| *d).collect::<Vec<_>>())
                    }
                })
                .collect();
        }

        let mut groups: Vec<Vec<(u32, &D)>> = vec![Vec::new(); k];
        for (i, &(img, desc)) in items.iter().enumerate() {
            groups[assignment[i]].push((img, desc));
        }
        groups
    }

    /// k-means++: first center uniform at random, subsequent centers
    /// chosen with probability proportional to squared distance to the
    /// nearest already-chosen center. If every remaining point has
    /// distance 0 to some chosen center (a collapsed cluster), seeding
    /// stops early with fewer than `k` centers for this split.
    fn seed_centers<'a>(&self, items: &'a [(u32, &'a D)], rng: &mut ChaCha8Rng) -> Vec<D> {
        let mut centers: Vec<D> = Vec::with_capacity(self.k as usize);
        let first = items.choose(rng).expect("items is non-empty").1;
        centers.push(first.clone());

        let mut nearest_sq: Vec<f64> = items
            .iter()
            .map(|(_, d)| {
                let dist = d.distance(first);
                dist * dist
            })
            .collect();

        while centers.len() < self.k as usize {
            let total: f64 = nearest_sq.iter().sum();
            if total <= 0.0 {
                // Every remaining point already coincides with a center.
                break;
            }
            let mut threshold = rng.gen::<f64>() * total;
            let mut chosen = items.len() - 1;
            for (i, &d2) in nearest_sq.iter().enumerate() {
                if threshold <= d2 {
                    chosen = i;
                    break;
                }
                threshold -= d2;
            }
            let next = items[chosen].1.clone();
            for (i, (_, d)) in items.iter().enumerate() {
                let dist = d.distance(&next);
                let dist_sq = dist * dist;
                if dist_sq < nearest_sq[i] {
                    nearest_sq[i] = dist_sq;
                }
            }
            centers.push(next);
        }
        centers
    }

    /// Dense `WordId` assignment and leaf weight computation, in a
    /// single deterministic pre-order traversal (children visited in
    /// index order).
    fn assign_words_and_weights(&mut self, num_images: u32) {
        let mut stack = vec![ROOT];
        let mut leaves = Vec::new();
        // Iterative pre-order so traversal order doesn't depend on stack
        // depth limits for very deep/wide trees.
        while let Some(node_id) = stack.pop() {
            let children: SmallVec<[NodeId; INLINE_CHILDREN]> = self.nodes[node_id as usize].children.clone();
            if children.is_empty() {
                leaves.push(node_id);
            } else {
                for &child in children.iter().rev() {
                    stack.push(child);
                }
            }
        }
        // `stack.pop()` visits the most-recently-pushed child first; since
        // we pushed children in reverse, leaves come out in left-to-right
        // (ascending child index) order deterministically.
        self.words = leaves;
        for (word_id, &node_id) in self.words.iter().enumerate() {
            let node = &mut self.nodes[node_id as usize];
            node.word_id = Some(word_id as WordId);
            node.weight = match self.weighting {
                Weighting::TfIdf | Weighting::Idf => {
                    let n_i = node.weight.max(1.0);
                    (num_images as f64 / n_i).ln()
                }
                Weighting::Tf | Weighting::Binary => 1.0,
            };
        }
    }

    /// Descends from the root choosing, at each node, the child whose
    /// descriptor minimizes distance to `desc` (ties broken by lowest
    /// child index). Returns the word id, its weight, and (if
    /// `direct_index_level` is set) the ancestor node at that depth.
    fn quantize(&self, desc: &D, direct_index_level: Option<u32>) -> (WordId, f64, Option<NodeId>) {
        let mut node_id = ROOT;
        let mut depth = 0u32;
        let mut ancestor_at_level = if direct_index_level == Some(0) { Some(ROOT) } else { None };
        loop {
            let node = &self.nodes[node_id as usize];
            if node.is_leaf() {
                let word_id = node.word_id.expect("leaf without word id");
                return (word_id, node.weight, ancestor_at_level);
            }
            let mut best = (node.children[0], f64::INFINITY);
            for &child in node.children.iter() {
                let d = self.nodes[child as usize].descriptor.distance(desc);
                if d < best.1 {
                    best = (child, d);
                }
            }
            node_id = best.0;
            depth += 1;
            if Some(depth) == direct_index_level {
                ancestor_at_level = Some(node_id);
            }
        }
    }

    /// Quantizes a single descriptor to its word id, with no weighting
    /// applied.
    pub fn transform_one(&self, desc: &D) -> BowResult<WordId> {
        if self.is_empty() {
            return Err(BowError::NotTrained);
        }
        Ok(self.quantize(desc, None).0)
    }

    /// Quantizes `features` into a weighted, normalized BoW vector.
    pub fn transform(&self, features: &[D]) -> BowResult<BowVector> {
        self.transform_with_fv(features, None).map(|(bow, _)| bow)
    }

    /// Same as [`Vocabulary::transform`], additionally returning the
    /// direct index mapping ancestor nodes at `direct_index_level`
    /// (counted from the root, root = 0) to local feature indices.
    pub fn transform_with_fv(&self, features: &[D], direct_index_level: Option<u32>) -> BowResult<(BowVector, FeatureVector)> {
        if self.is_empty() {
            return Err(BowError::NotTrained);
        }
        if features.is_empty() {
            return Err(BowError::EmptyInput);
        }

        let mut raw: Vec<(WordId, f64)> = Vec::with_capacity(features.len());
        let mut fv = FeatureVector::new();
        for (i, desc) in features.iter().enumerate() {
            let (word, idf_weight, ancestor) = self.quantize(desc, direct_index_level);
            let contribution = match self.weighting {
                Weighting::TfIdf | Weighting::Idf => idf_weight,
                Weighting::Tf | Weighting::Binary => 1.0,
            };
            raw.push((word, contribution));
            if let Some(node) = ancestor {
                fv.add_feature(node, i as u32);
            }
        }

        let mut bow = BowVector::from_raw(raw, self.weighting);
        if matches!(self.weighting, Weighting::TfIdf | Weighting::Tf) {
            bow.scale(1.0 / features.len() as f64);
        }
        scoring::normalize(&mut bow, self.scoring);
        Ok((bow, fv))
    }

    /// Scores two already-normalized BoW vectors using this vocabulary's
    /// configured scoring function.
    pub fn score(&self, a: &BowVector, b: &BowVector) -> BowResult<f64> {
        if self.is_empty() {
            return Err(BowError::NotTrained);
        }
        scoring::score(self.scoring, a, b)
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
