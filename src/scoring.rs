//! Pluggable scoring functions over pre-normalized sparse BoW vectors.
//!
//! Every function here assumes its inputs already carry the norm
//! [`Scoring::required_norm`] calls for (§4.2) — that normalization
//! happens once, right after `Vocabulary::transform`, not on every score
//! call. `accumulate`/`finalize` are the incremental form the database
//! uses to score a query against every posting-list candidate in a
//! single pass over the query's words (§4.3); `score` is the same math
//! applied once to a single pair of vectors.

use serde::{Deserialize, Serialize};

use crate::bow::{merge_primary, BowVector};
use crate::error::{BowError, BowResult};

/// `v · ln(v / w)` blows up as `w -> 0`; DBoW-family implementations
/// substitute a large fixed penalty rather than propagating infinity.
const KL_ABSENT_PENALTY: f64 = 1.0e9;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scoring {
    L1,
    L2,
    ChiSquare,
    Kl,
    Bhattacharyya,
    DotProduct,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Norm {
    L1,
    L2,
    None,
}

impl Scoring {
    pub fn required_norm(self) -> Norm {
        match self {
            Scoring::L1 => Norm::L1,
            Scoring::L2 => Norm::L2,
            Scoring::ChiSquare => Norm::L1,
            Scoring::Kl => Norm::L1,
            Scoring::Bhattacharyya => Norm::L1,
            Scoring::DotProduct => Norm::None,
        }
    }

    /// `false` only for KL, where lower scores mean more similar.
    pub fn higher_is_better(self) -> bool {
        !matches!(self, Scoring::Kl)
    }
}

pub fn normalize(v: &mut BowVector, scoring: Scoring) {
    match scoring.required_norm() {
        Norm::L1 => v.normalize_l1(),
        Norm::L2 => v.normalize_l2(),
        Norm::None => {}
    }
}

/// Per-word contribution of one shared `(a_word, b_word)` pair to the
/// running score accumulator. Calling this for every word in `a` (with
/// `b_word = 0.0` when `a`'s word is absent from `b`) and finishing with
/// [`finalize`] reproduces the full-vector score, because every scoring
/// function here contributes exactly `0` for a word absent from `a`
/// (KL's "only in the query" case is the one exception, handled by the
/// caller passing `b_word = 0.0` explicitly so the `else` branch fires).
pub fn accumulate(scoring: Scoring, acc: &mut f64, a_word: f64, b_word: f64) {
    match scoring {
        Scoring::L1 => *acc += (a_word - b_word).abs() - a_word - b_word,
        Scoring::L2 => *acc -= a_word * b_word,
        Scoring::ChiSquare => {
            let denom = a_word + b_word;
            if denom > 0.0 {
                *acc += a_word * b_word / denom;
            }
        }
        Scoring::Kl => {
            if b_word > 0.0 {
                if a_word > 0.0 {
                    *acc += a_word * (a_word / b_word).ln();
                }
            } else if a_word > 0.0 {
                *acc += a_word * KL_ABSENT_PENALTY;
            }
        }
        Scoring::Bhattacharyya => *acc += (a_word * b_word).sqrt(),
        Scoring::DotProduct => *acc += a_word * b_word,
    }
}

/// Turns the running accumulator into the scoring function's final
/// value. Assumes both vectors carried [`Scoring::required_norm`] (L1
/// vectors sum to `1`, L2 vectors have unit length) when `accumulate`
/// was driven over them.
pub fn finalize(scoring: Scoring, acc: f64) -> f64 {
    match scoring {
        // acc = sum_common(|a-b| - a - b); full L1 distance is
        // acc + sum(a) + sum(b) = acc + 2 for L1-normalized inputs.
        Scoring::L1 => -acc / 2.0,
        // acc = -dot(a, b); 1 - dot = 1 + acc.
        Scoring::L2 => 1.0 - (1.0 + acc).max(0.0).sqrt(),
        Scoring::ChiSquare => (2.0 * acc).clamp(0.0, 1.0),
        Scoring::Kl => acc,
        Scoring::Bhattacharyya => acc,
        Scoring::DotProduct => acc,
    }
}

/// Scores two already-normalized BoW vectors. `a` is the "query" side for
/// asymmetric scorings (KL).
pub fn score(scoring: Scoring, a: &BowVector, b: &BowVector) -> BowResult<f64> {
    let mut acc = 0.0;
    for (_, av, bv) in merge_primary(a, b) {
        accumulate(scoring, &mut acc, av, bv);
    }
    let result = finalize(scoring, acc);
    if !result.is_finite() {
        return Err(BowError::Numeric(format!("{scoring:?} produced {result}")));
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weighting::Weighting;

    fn l1_vec(pairs: &[(u32, f64)]) -> BowVector {
        let mut v = BowVector::from_raw(pairs.to_vec(), Weighting::Tf);
        v.normalize_l1();
        v
    }

    fn l2_vec(pairs: &[(u32, f64)]) -> BowVector {
        let mut v = BowVector::from_raw(pairs.to_vec(), Weighting::Tf);
        v.normalize_l2();
        v
    }

    #[test]
    fn l1_self_score_is_one() {
        let v = l1_vec(&[(0, 1.0), (1, 2.0), (5, 3.0)]);
        let s = score(Scoring::L1, &v, &v).unwrap();
        assert!((s - 1.0).abs() < 1e-9, "{s}");
    }

    #[test]
    fn l2_self_score_is_one() {
        let v = l2_vec(&[(0, 1.0), (1, 2.0), (5, 3.0)]);
        let s = score(Scoring::L2, &v, &v).unwrap();
        assert!((s - 1.0).abs() < 1e-9, "{s}");
    }

    #[test]
    fn bhattacharyya_self_score_is_one() {
        let v = l1_vec(&[(0, 1.0), (1, 2.0), (5, 3.0)]);
        let s = score(Scoring::Bhattacharyya, &v, &v).unwrap();
        assert!((s - 1.0).abs() < 1e-9, "{s}");
    }

    #[test]
    fn kl_self_score_is_zero() {
        let v = l1_vec(&[(0, 1.0), (1, 2.0), (5, 3.0)]);
        let s = score(Scoring::Kl, &v, &v).unwrap();
        assert!(s.abs() < 1e-9, "{s}");
    }

    #[test]
    fn l1_matches_dense_reference() {
        let a = l1_vec(&[(0, 0.2), (1, 0.3), (2, 0.5)]);
        let b = l1_vec(&[(0, 0.1), (2, 0.4), (3, 0.5)]);
        let sparse = score(Scoring::L1, &a, &b).unwrap();

        // Dense reference over the full 4-word universe.
        let dense_a = [0.2, 0.3, 0.5, 0.0];
        let dense_b = [0.1, 0.0, 0.4, 0.5];
        let dense_dist: f64 = dense_a.iter().zip(dense_b.iter()).map(|(x, y)| (x - y).abs()).sum();
        let dense_score = 1.0 - dense_dist / 2.0;

        assert!((sparse - dense_score).abs() < 1e-9, "{sparse} vs {dense_score}");
    }

    #[test]
    fn chi_square_in_unit_range() {
        let a = l1_vec(&[(0, 0.2), (1, 0.8)]);
        let b = l1_vec(&[(0, 0.5), (1, 0.5)]);
        let s = score(Scoring::ChiSquare, &a, &b).unwrap();
        assert!((0.0..=1.0).contains(&s));
    }

    #[test]
    fn dot_product_no_normalization_required() {
        let a = BowVector::from_raw(vec![(0, 2.0), (1, 3.0)], Weighting::Tf);
        let b = BowVector::from_raw(vec![(0, 1.0), (1, 1.0)], Weighting::Tf);
        let s = score(Scoring::DotProduct, &a, &b).unwrap();
        assert_eq!(s, 5.0);
    }
}
