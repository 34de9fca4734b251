//! ルックアップテーブル（決定論的 / 確率的）

use serde::{Deserialize, Serialize};

use crate::bits::{BitVector, ProbabilityVector, one_hot_distribution};
use crate::error::ConvertResult;

/// 入力パターンごとに出力ビット列を1つ持つテーブル
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct DeterministicTable(Vec<BitVector>);

impl DeterministicTable {
    pub fn rows(&self) -> &[BitVector] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// 各行を one-hot 分布に置き換えた確率的テーブル
    ///
    /// 行ごとに自身のビット幅を使うので、幅の揃っていないテーブルもそのまま変換できる。
    pub fn to_probabilistic(&self) -> ConvertResult<ProbabilisticTable> {
        self.0
            .iter()
            .map(one_hot_distribution)
            .collect::<ConvertResult<Vec<_>>>()
            .map(ProbabilisticTable::new)
    }
}

/// 入力パターンごとに出力状態上の分布を持つテーブル
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct ProbabilisticTable(Vec<ProbabilityVector>);

impl ProbabilisticTable {
    pub fn new(rows: Vec<ProbabilityVector>) -> Self {
        Self(rows)
    }

    pub fn rows(&self) -> &[ProbabilityVector] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// 最も長い行の状態数（空なら 0）
    pub fn num_output_patterns(&self) -> usize {
        self.0.iter().map(ProbabilityVector::len).max().unwrap_or(0)
    }
}
