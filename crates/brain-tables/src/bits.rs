//! ビット列と出力状態インデックスの相互変換
//!
//! 決定論的テーブルの各行は出力ビット列で、要素 `o` がゲートの `o` 番目の出力に対応する。
//! 出力状態インデックスとしては要素 0 が最下位ビットになる。

use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::ser::{SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ConvertError, ConvertResult};

/// one-hot 分布を作れる行の最大ビット幅（2^24 要素 = 128 MiB）
pub const MAX_ROW_BITS: usize = 24;

/// ビット列を出力状態インデックスに変換する
///
/// 逆順に走査して左シフトで畳み込むため、末尾の要素が最上位ビットになる。
/// 空のビット列は 0。64 ビットを超える入力は扱えない。
#[inline]
pub fn binary_to_index(bits: &[bool]) -> u64 {
    debug_assert!(bits.len() <= u64::BITS as usize, "bit vector too long: {}", bits.len());
    bits.iter().rev().fold(0, |acc, &bit| (acc << 1) | u64::from(bit))
}

/// 決定論的テーブルの1行
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BitVector(Vec<bool>);

impl BitVector {
    pub fn new(bits: Vec<bool>) -> Self {
        Self(bits)
    }

    /// `index` を `width` ビットで表したビット列（要素 0 が最下位ビット）
    pub fn from_index(index: u64, width: usize) -> Self {
        Self::new((0..width).map(|i| i < u64::BITS as usize && (index >> i) & 1 == 1).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.0
    }

    /// このビット列が選ぶ出力状態
    pub fn to_index(&self) -> u64 {
        binary_to_index(&self.0)
    }
}

impl From<Vec<bool>> for BitVector {
    fn from(bits: Vec<bool>) -> Self {
        Self(bits)
    }
}

impl Serialize for BitVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.0.len()))?;
        for &bit in &self.0 {
            seq.serialize_element(&u8::from(bit))?;
        }
        seq.end()
    }
}

struct BitVectorVisitor;

impl<'de> Visitor<'de> for BitVectorVisitor {
    type Value = BitVector;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a sequence of 0/1 integers")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut bits = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(value) = seq.next_element::<u64>()? {
            match value {
                0 => bits.push(false),
                1 => bits.push(true),
                other => {
                    return Err(de::Error::invalid_value(
                        de::Unexpected::Unsigned(other),
                        &"a bit (0 or 1)",
                    ));
                }
            }
        }
        Ok(BitVector(bits))
    }
}

impl<'de> Deserialize<'de> for BitVector {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_seq(BitVectorVisitor)
    }
}

/// 出力状態上の確率分布（確率的テーブルの1行）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct ProbabilityVector(Vec<f64>);

impl ProbabilityVector {
    pub fn new(probabilities: Vec<f64>) -> Self {
        Self(probabilities)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn sum(&self) -> f64 {
        self.0.iter().sum()
    }
}

/// 行 `bits` が選ぶ出力状態に全質量を置いた分布を作る
///
/// 長さは `2^bits.len()`。
pub fn one_hot_distribution(bits: &BitVector) -> ConvertResult<ProbabilityVector> {
    let width = bits.len();
    if width > MAX_ROW_BITS {
        return Err(ConvertError::RowTooWide {
            width,
            max: MAX_ROW_BITS,
        });
    }
    let num_states = 1usize << width;
    let target = bits.to_index() as usize;
    let probabilities = (0..num_states).map(|i| if i == target { 1.0 } else { 0.0 }).collect();
    Ok(ProbabilityVector::new(probabilities))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bits(raw: &[u8]) -> BitVector {
        BitVector::new(raw.iter().map(|&b| b == 1).collect())
    }

    #[test]
    fn binary_to_index_treats_first_element_as_lsb() {
        assert_eq!(binary_to_index(&[]), 0);
        assert_eq!(bits(&[0, 0]).to_index(), 0);
        assert_eq!(bits(&[1, 0]).to_index(), 1);
        assert_eq!(bits(&[0, 1]).to_index(), 2);
        assert_eq!(bits(&[1, 1]).to_index(), 3);
        assert_eq!(bits(&[0, 0, 1]).to_index(), 4);
        assert_eq!(bits(&[1, 0, 1, 1]).to_index(), 13);
    }

    #[test]
    fn binary_to_index_is_bijective_up_to_eight_bits() {
        for width in 0..=8usize {
            let mut seen = vec![false; 1 << width];
            for index in 0..(1u64 << width) {
                let bv = BitVector::from_index(index, width);
                assert_eq!(bv.len(), width);
                let back = bv.to_index();
                assert_eq!(back, index, "width={width}");
                assert!(!seen[back as usize]);
                seen[back as usize] = true;
            }
            assert!(seen.iter().all(|&s| s));
        }
    }

    #[test]
    fn one_hot_has_single_unit_mass() {
        for width in 0..=6usize {
            for index in 0..(1u64 << width) {
                let bv = BitVector::from_index(index, width);
                let dist = one_hot_distribution(&bv).expect("one-hot failed");
                assert_eq!(dist.len(), 1 << width);
                assert_eq!(dist.sum(), 1.0);
                let ones: Vec<usize> = dist
                    .as_slice()
                    .iter()
                    .enumerate()
                    .filter(|(_, p)| **p == 1.0)
                    .map(|(i, _)| i)
                    .collect();
                assert_eq!(ones, vec![index as usize]);
                assert!(dist.as_slice().iter().all(|&p| p == 0.0 || p == 1.0));
            }
        }
    }

    #[test]
    fn one_hot_of_empty_row_is_certain() {
        let dist = one_hot_distribution(&BitVector::default()).expect("one-hot failed");
        assert_eq!(dist.as_slice(), &[1.0]);
    }

    #[test]
    fn one_hot_rejects_too_wide_rows() {
        let bv = BitVector::new(vec![false; MAX_ROW_BITS + 1]);
        let err = one_hot_distribution(&bv).expect_err("should reject");
        assert!(matches!(err, ConvertError::RowTooWide { width, .. } if width == MAX_ROW_BITS + 1));
    }

    #[test]
    fn bit_vector_json_is_integer_array() {
        let bv: BitVector = serde_json::from_str("[1,0,1]").expect("parse failed");
        assert_eq!(bv, bits(&[1, 0, 1]));
        assert_eq!(serde_json::to_string(&bv).expect("serialize failed"), "[1,0,1]");
    }

    #[test]
    fn bit_vector_rejects_non_bits() {
        assert!(serde_json::from_str::<BitVector>("[0,2]").is_err());
        assert!(serde_json::from_str::<BitVector>("[0.0,1.0]").is_err());
        assert!(serde_json::from_str::<BitVector>("[-1]").is_err());
    }

    #[test]
    fn binary_to_index_accepts_full_u64_width() {
        assert_eq!(binary_to_index(&[true; 64]), u64::MAX);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "bit vector too long")]
    fn binary_to_index_rejects_more_than_64_bits() {
        binary_to_index(&[true; 65]);
    }

    #[test]
    fn probability_vector_serializes_floats() {
        let pv = ProbabilityVector::new(vec![0.0, 1.0]);
        assert_eq!(serde_json::to_string(&pv).expect("serialize failed"), "[0.0,1.0]");
    }
}
