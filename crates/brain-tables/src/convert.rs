//! 決定論的テーブル → 確率的テーブル変換
//!
//! 決定論的テーブルの各行を、その行が選ぶ出力状態に全質量を置いた分布へ置き換える。
//! 入力は一切変更せず、常に新しい値を返す。

use serde_json::json;
use std::ops::AddAssign;

use crate::error::ConvertResult;
use crate::layer::{ConvolutionRegime, FilterCell, FilterLayout, LayerDescription};
use crate::table::{DeterministicTable, ProbabilisticTable};

/// 変換後のセルに付ける `type` タグ
pub const PROBABILISTIC_TEXTURE_TYPE: &str = "ProbabilisticTexture";

/// 変換前のセルが通常持つ `type` タグ
pub const DETERMINISTIC_TEXTURE_TYPE: &str = "DeterministicTexture";

pub const NUM_INPUT_PATTERNS_KEY: &str = "numInputPatterns";
pub const NUM_OUTPUT_PATTERNS_KEY: &str = "numOutputPatterns";

pub type DeterministicLayer = LayerDescription<DeterministicTable>;
pub type ProbabilisticLayer = LayerDescription<ProbabilisticTable>;

/// 変換オプション
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConvertOptions {
    /// 変換後のセルに numInputPatterns / numOutputPatterns を付与する
    ///
    /// シミュレータ側の確率的ゲートの読み込みはこの2フィールドを要求する。
    pub annotate_pattern_counts: bool,
}

/// 脳記述の決定論的テーブルを確率的テーブルへ変換する
#[derive(Debug, Clone, Default)]
pub struct TableConverter {
    options: ConvertOptions,
}

impl TableConverter {
    pub fn new(options: ConvertOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> ConvertOptions {
        self.options
    }

    /// 1セル分の変換
    pub fn convert_cell(
        &self,
        cell: &FilterCell<DeterministicTable>,
    ) -> ConvertResult<FilterCell<ProbabilisticTable>> {
        if let Some(kind) = cell.kind().filter(|&k| k != DETERMINISTIC_TEXTURE_TYPE) {
            log::debug!("converting cell tagged {kind:?} as {DETERMINISTIC_TEXTURE_TYPE}");
        }
        let table = cell.table().to_probabilistic()?;
        let num_input_patterns = table.len();
        let num_output_patterns = table.num_output_patterns();

        let mut converted = cell.with_table(table);
        converted.set_kind(PROBABILISTIC_TEXTURE_TYPE);
        if self.options.annotate_pattern_counts {
            converted.insert_field(NUM_INPUT_PATTERNS_KEY, json!(num_input_patterns));
            converted.insert_field(NUM_OUTPUT_PATTERNS_KEY, json!(num_output_patterns));
        }
        Ok(converted)
    }

    /// 1レイヤー分の変換
    ///
    /// unshared / shared 以外の方式のレイヤーはそのまま複製する。
    pub fn convert_layer(&self, layer: &DeterministicLayer) -> ConvertResult<ProbabilisticLayer> {
        if let ConvolutionRegime::Other(label) = layer.regime() {
            log::debug!("passing through layer with convolution regime {label:?}");
        }
        layer.try_map_cells(|cell| self.convert_cell(cell))
    }

    /// 1個体（レイヤー列）の変換。順序を保つ
    pub fn convert_individual(
        &self,
        layers: &[DeterministicLayer],
    ) -> ConvertResult<Vec<ProbabilisticLayer>> {
        layers
            .iter()
            .enumerate()
            .map(|(index, layer)| self.convert_layer(layer).map_err(|e| e.in_layer(index)))
            .collect()
    }
}

/// 既定オプションでの1個体変換
pub fn convert_individual(layers: &[DeterministicLayer]) -> ConvertResult<Vec<ProbabilisticLayer>> {
    TableConverter::default().convert_individual(layers)
}

/// 変換対象の集計
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConversionStats {
    pub layers: usize,
    pub unshared_layers: usize,
    pub shared_layers: usize,
    pub passthrough_layers: usize,
    pub cells: usize,
    pub rows: usize,
}

impl ConversionStats {
    /// 決定論的な脳記述に含まれる変換対象を数える
    pub fn tally(layers: &[DeterministicLayer]) -> Self {
        let mut stats = Self::default();
        for layer in layers {
            stats.layers += 1;
            match layer.filters() {
                FilterLayout::Unshared(_) => stats.unshared_layers += 1,
                FilterLayout::Shared(_) => stats.shared_layers += 1,
                FilterLayout::Passthrough => stats.passthrough_layers += 1,
            }
            for cell in layer.filters().cells() {
                stats.cells += 1;
                stats.rows += cell.table().len();
            }
        }
        stats
    }
}

impl AddAssign for ConversionStats {
    fn add_assign(&mut self, rhs: Self) {
        self.layers += rhs.layers;
        self.unshared_layers += rhs.unshared_layers;
        self.shared_layers += rhs.shared_layers;
        self.passthrough_layers += rhs.passthrough_layers;
        self.cells += rhs.cells;
        self.rows += rhs.rows;
    }
}
