//! Descriptor abstraction. A descriptor is a fixed-size value understood
//! only through [`Descriptor`]'s three operations; the vocabulary tree and
//! database are generic over it.

use bitvec::{order::Msb0, view::BitView};
use serde::de::{Deserialize, Deserializer, Error as DeError};
use serde::ser::{Serialize, Serializer};
use std::convert::TryInto;

use crate::error::{BowError, BowResult};

/// A fixed-size descriptor with a mean, a distance, and a lossless string
/// round-trip (used for persistence of node representatives).
pub trait Descriptor: Clone + std::fmt::Debug + PartialEq + Send + Sync + 'static {
    /// Componentwise mean for real descriptors, per-bit majority vote
    /// (tie resolves to 0) for binary ones. `items` is never empty.
    fn mean_of(items: &[&Self]) -> Self;

    /// Non-negative, symmetric; `distance(a, a) == 0`.
    fn distance(&self, other: &Self) -> f64;

    /// Lossless string form for persistence.
    fn to_desc_string(&self) -> String;

    /// Inverse of [`Descriptor::to_desc_string`].
    fn from_desc_string(s: &str) -> BowResult<Self>
    where
        Self: Sized;
}

/// A binary descriptor of `N` bytes (ORB/BRIEF/BRISK-shaped). Distance is
/// Hamming via byte-wise XOR + popcount; mean is per-bit majority vote.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BinaryDescriptor<const N: usize>(pub [u8; N]);

impl<const N: usize> BinaryDescriptor<N> {
    pub fn new(bytes: [u8; N]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; N] {
        &self.0
    }
}

impl<const N: usize> Descriptor for BinaryDescriptor<N> {
    fn mean_of(items: &[&Self]) -> Self {
        debug_assert!(!items.is_empty());
        let half = items.len() / 2;
        let mut counts = vec![0usize; N * 8];
        for item in items {
            for (i, bit) in item.0.view_bits::<Msb0>().iter().enumerate() {
                if *bit {
                    counts[i] += 1;
                }
            }
        }
        let mut out: Self = Self([0u8; N]);
        let out_bits = out.0.view_bits_mut::<Msb0>();
        for (i, &c) in counts.iter().enumerate() {
            if c > half {
                out_bits.set(i, true);
            }
        }
        out
    }

    fn distance(&self, other: &Self) -> f64 {
        let popcount: u32 = self
            .0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a ^ b).count_ones())
            .sum();
        popcount as f64
    }

    fn to_desc_string(&self) -> String {
        self.0
            .iter()
            .map(|b| b.to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn from_desc_string(s: &str) -> BowResult<Self> {
        let bytes: Result<Vec<u8>, _> = s.split_whitespace().map(|tok| tok.parse::<u8>()).collect();
        let bytes = bytes.map_err(|e| BowError::DescriptorParse(e.to_string()))?;
        let arr: [u8; N] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| BowError::DescriptorParse(format!("expected {N} bytes, got {}", v.len())))?;
        Ok(Self(arr))
    }
}

impl<const N: usize> Serialize for BinaryDescriptor<N> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.to_vec().serialize(serializer)
    }
}

impl<'de, const N: usize> Deserialize<'de> for BinaryDescriptor<N> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes = Vec::<u8>::deserialize(deserializer)?;
        let arr: [u8; N] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| DeError::custom(format!("expected {N} bytes, got {}", v.len())))?;
        Ok(Self(arr))
    }
}

/// A real-valued descriptor of `N` floats. Distance is L2; mean is the
/// componentwise arithmetic mean.
#[derive(Clone, Debug, PartialEq)]
pub struct FloatDescriptor<const N: usize>(pub [f32; N]);

impl<const N: usize> FloatDescriptor<N> {
    pub fn new(values: [f32; N]) -> Self {
        Self(values)
    }
}

impl<const N: usize> Descriptor for FloatDescriptor<N> {
    fn mean_of(items: &[&Self]) -> Self {
        debug_assert!(!items.is_empty());
        let mut sum = [0f64; N];
        for item in items {
            for (i, &v) in item.0.iter().enumerate() {
                sum[i] += v as f64;
            }
        }
        let n = items.len() as f64;
        let mut out = [0f32; N];
        for i in 0..N {
            out[i] = (sum[i] / n) as f32;
        }
        Self(out)
    }

    fn distance(&self, other: &Self) -> f64 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| {
                let d = (*a - *b) as f64;
                d * d
            })
            .sum::<f64>()
            .sqrt()
    }

    fn to_desc_string(&self) -> String {
        self.0
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn from_desc_string(s: &str) -> BowResult<Self> {
        let values: Result<Vec<f32>, _> = s.split_whitespace().map(|tok| tok.parse::<f32>()).collect();
        let values = values.map_err(|e| BowError::DescriptorParse(e.to_string()))?;
        let arr: [f32; N] = values
            .try_into()
            .map_err(|v: Vec<f32>| BowError::DescriptorParse(format!("expected {N} floats, got {}", v.len())))?;
        Ok(Self(arr))
    }
}

impl<const N: usize> Serialize for FloatDescriptor<N> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.to_vec().serialize(serializer)
    }
}

impl<'de, const N: usize> Deserialize<'de> for FloatDescriptor<N> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let values = Vec::<f32>::deserialize(deserializer)?;
        let arr: [f32; N] = values
            .try_into()
            .map_err(|v: Vec<f32>| DeError::custom(format!("expected {N} floats, got {}", v.len())))?;
        Ok(Self(arr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hamming_distance_self_is_zero() {
        let d = BinaryDescriptor::new([0xAB; 32]);
        assert_eq!(d.distance(&d), 0.0);
    }

    #[test]
    fn hamming_counts_differing_bits() {
        let a = BinaryDescriptor::new([0b0000_0000; 4]);
        let b = BinaryDescriptor::new([0b0000_0011; 4]);
        assert_eq!(a.distance(&b), 8.0);
    }

    #[test]
    fn binary_mean_ties_resolve_to_zero() {
        let a = BinaryDescriptor::new([0b1000_0000; 1]);
        let b = BinaryDescriptor::new([0b0000_0000; 1]);
        let mean = BinaryDescriptor::mean_of(&[&a, &b]);
        assert_eq!(mean.0[0], 0);
    }

    #[test]
    fn binary_mean_majority_wins() {
        let a = BinaryDescriptor::new([0b1000_0000; 1]);
        let b = BinaryDescriptor::new([0b1000_0000; 1]);
        let c = BinaryDescriptor::new([0b0000_0000; 1]);
        let mean = BinaryDescriptor::mean_of(&[&a, &b, &c]);
        assert_eq!(mean.0[0], 0b1000_0000);
    }

    #[test]
    fn binary_round_trip_string() {
        let d = BinaryDescriptor::new([1u8, 2, 3, 255]);
        let s = d.to_desc_string();
        let parsed = BinaryDescriptor::<4>::from_desc_string(&s).unwrap();
        assert_eq!(d, parsed);
    }

    #[test]
    fn float_distance_self_is_zero() {
        let d = FloatDescriptor::new([1.0, 2.0, 3.0]);
        assert_eq!(d.distance(&d), 0.0);
    }

    #[test]
    fn float_mean_componentwise() {
        let a = FloatDescriptor::new([1.0, 2.0]);
        let b = FloatDescriptor::new([3.0, 4.0]);
        let mean = FloatDescriptor::mean_of(&[&a, &b]);
        assert_eq!(mean.0, [2.0, 3.0]);
    }

    #[test]
    fn float_round_trip_string() {
        let d = FloatDescriptor::new([1.5f32, -2.25, 0.0]);
        let s = d.to_desc_string();
        let parsed = FloatDescriptor::<3>::from_desc_string(&s).unwrap();
        assert_eq!(d, parsed);
    }
}
