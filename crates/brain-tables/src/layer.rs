//! レイヤー記述とフィルタセル
//!
//! MABE の TextureLayeredBrain が保存するレイヤー JSON を型付きで扱う。
//! 変換で触るフィールド（`filters` 内の `table` / `type`）以外は順序付きの
//! JSON オブジェクトとしてそのまま保持し、書き出し時に元の位置へ戻す。

use serde::de::{self, DeserializeOwned, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::error::{ConvertError, ConvertResult};

pub const REGIME_KEY: &str = "convolutionRegime";
pub const FILTERS_KEY: &str = "filters";
pub const TABLE_KEY: &str = "table";
pub const TYPE_KEY: &str = "type";

/// 順序付き JSON オブジェクト
pub type Fields = Map<String, Value>;

/// フィールドを取り出して型付きの値にする
///
/// 取り出した位置には `null` が残り、キー順序の保持に使う。
fn take_field<T: DeserializeOwned>(fields: &mut Fields, name: &'static str) -> ConvertResult<Option<T>> {
    let Some(slot) = fields.get_mut(name) else {
        return Ok(None);
    };
    serde_json::from_value(slot.take())
        .map(Some)
        .map_err(|source| ConvertError::InvalidField {
            field: name,
            source,
        })
}

// =============================================================================
// ConvolutionRegime
// =============================================================================

/// フィルタの重み共有方式
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConvolutionRegime {
    /// 位置ごとに独立したフィルタ（`filters[x][y][t][g]`）
    Unshared,
    /// 全位置で共有されるフィルタ（`filters[g]`）
    Shared,
    /// 変換対象外の方式。値は元の表記
    Other(String),
}

impl ConvolutionRegime {
    /// JSON 値から判定する。文字列以外は未知の方式として扱う
    pub fn from_value(value: &Value) -> Self {
        match value.as_str() {
            Some("unshared") => ConvolutionRegime::Unshared,
            Some("shared") => ConvolutionRegime::Shared,
            Some(other) => ConvolutionRegime::Other(other.to_owned()),
            None => ConvolutionRegime::Other(value.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ConvolutionRegime::Unshared => "unshared",
            ConvolutionRegime::Shared => "shared",
            ConvolutionRegime::Other(label) => label,
        }
    }
}

impl fmt::Display for ConvolutionRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// FilterCell
// =============================================================================

/// フィルタ構造の1要素（ゲート1個分）
///
/// `fields` は元オブジェクト全体で、`table` と（あれば）`type` の位置にはプレースホルダが入る。
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCell<T> {
    table: T,
    kind: Option<String>,
    fields: Fields,
}

impl<T> FilterCell<T> {
    pub fn table(&self) -> &T {
        &self.table
    }

    /// `type` タグ（入力に無かった場合は `None`）
    pub fn kind(&self) -> Option<&str> {
        self.kind.as_deref()
    }

    /// `type` タグを設定する。元に無かった場合は末尾に追加される
    pub fn set_kind(&mut self, kind: impl Into<String>) {
        self.fields.entry(TYPE_KEY).or_insert(Value::Null);
        self.kind = Some(kind.into());
    }

    /// `table` / `type` 以外のフィールド
    pub fn field(&self, name: &str) -> Option<&Value> {
        if name == TABLE_KEY || name == TYPE_KEY {
            return None;
        }
        self.fields.get(name)
    }

    /// `table` / `type` 以外のフィールドを設定する（既存キーは位置を保って上書き）
    pub fn insert_field(&mut self, name: &str, value: Value) {
        debug_assert!(name != TABLE_KEY && name != TYPE_KEY, "typed field {name} set as opaque");
        if name == TABLE_KEY || name == TYPE_KEY {
            return;
        }
        self.fields.insert(name.to_owned(), value);
    }

    /// テーブルだけを差し替えた新しいセル（他のフィールドは複製）
    pub fn with_table<U>(&self, table: U) -> FilterCell<U> {
        FilterCell {
            table,
            kind: self.kind.clone(),
            fields: self.fields.clone(),
        }
    }
}

impl<T: DeserializeOwned> FilterCell<T> {
    pub fn from_fields(mut fields: Fields) -> ConvertResult<Self> {
        let table = take_field(&mut fields, TABLE_KEY)?.ok_or(ConvertError::MissingField(TABLE_KEY))?;
        let kind = take_field::<String>(&mut fields, TYPE_KEY)?;
        Ok(Self {
            table,
            kind,
            fields,
        })
    }
}

impl<T: Serialize> Serialize for FilterCell<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (key, value) in &self.fields {
            match (key.as_str(), &self.kind) {
                (TABLE_KEY, _) => map.serialize_entry(key, &self.table)?,
                (TYPE_KEY, Some(kind)) => map.serialize_entry(key, kind)?,
                _ => map.serialize_entry(key, value)?,
            }
        }
        map.end()
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for FilterCell<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let fields = Fields::deserialize(deserializer)?;
        Self::from_fields(fields).map_err(|e| de::Error::custom(e.chain_message()))
    }
}

// =============================================================================
// FilterLayout
// =============================================================================

/// unshared レイヤーのセル配置 `[x][y][t][g]`
pub type UnsharedGrid<T> = Vec<Vec<Vec<Vec<FilterCell<T>>>>>;

/// 共有方式ごとのフィルタ構造
#[derive(Debug, Clone, PartialEq)]
pub enum FilterLayout<T> {
    Unshared(UnsharedGrid<T>),
    Shared(Vec<FilterCell<T>>),
    /// 変換対象外。`filters` は不透明フィールドとしてレイヤー側に残る
    Passthrough,
}

impl<T> FilterLayout<T> {
    /// 全セルを `[x][y][t][g]` / `[g]` の順に走査する
    pub fn cells(&self) -> Box<dyn Iterator<Item = &FilterCell<T>> + '_> {
        match self {
            FilterLayout::Unshared(grid) => Box::new(grid.iter().flatten().flatten().flatten()),
            FilterLayout::Shared(cells) => Box::new(cells.iter()),
            FilterLayout::Passthrough => Box::new(std::iter::empty()),
        }
    }

    pub fn cell_count(&self) -> usize {
        self.cells().count()
    }

    /// unshared の場合の (X, Y, T) サイズ
    pub fn unshared_dims(&self) -> Option<(usize, usize, usize)> {
        let FilterLayout::Unshared(grid) = self else {
            return None;
        };
        let size_y = grid.first().map_or(0, Vec::len);
        let size_t = grid.first().and_then(|col| col.first()).map_or(0, Vec::len);
        Some((grid.len(), size_y, size_t))
    }

    /// 構造を保ったまま各セルを写す
    pub fn try_map_cells<U, E>(
        &self,
        mut f: impl FnMut(&FilterCell<T>) -> Result<FilterCell<U>, E>,
    ) -> Result<FilterLayout<U>, E> {
        Ok(match self {
            FilterLayout::Unshared(grid) => {
                let mut mapped: UnsharedGrid<U> = Vec::with_capacity(grid.len());
                for column in grid {
                    let mut mapped_column = Vec::with_capacity(column.len());
                    for stack in column {
                        let mut mapped_stack = Vec::with_capacity(stack.len());
                        for cells in stack {
                            mapped_stack.push(cells.iter().map(&mut f).collect::<Result<Vec<_>, E>>()?);
                        }
                        mapped_column.push(mapped_stack);
                    }
                    mapped.push(mapped_column);
                }
                FilterLayout::Unshared(mapped)
            }
            FilterLayout::Shared(cells) => {
                FilterLayout::Shared(cells.iter().map(&mut f).collect::<Result<_, E>>()?)
            }
            FilterLayout::Passthrough => FilterLayout::Passthrough,
        })
    }
}

/// X/Y/T 軸が矩形であることを確認する（G 軸は位置ごとに異なってよい）
fn check_rectangular<T>(grid: &UnsharedGrid<T>) -> ConvertResult<()> {
    let Some(first_column) = grid.first() else {
        return Ok(());
    };
    let size_y = first_column.len();
    let size_t = first_column.first().map_or(0, Vec::len);
    for column in grid {
        if column.len() != size_y {
            return Err(ConvertError::RaggedFilters {
                axis: "Y",
                expected: size_y,
                actual: column.len(),
            });
        }
        for stack in column {
            if stack.len() != size_t {
                return Err(ConvertError::RaggedFilters {
                    axis: "T",
                    expected: size_t,
                    actual: stack.len(),
                });
            }
        }
    }
    Ok(())
}

impl<T: Serialize> Serialize for FilterLayout<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FilterLayout::Unshared(grid) => grid.serialize(serializer),
            FilterLayout::Shared(cells) => cells.serialize(serializer),
            FilterLayout::Passthrough => serializer.serialize_unit(),
        }
    }
}

// =============================================================================
// LayerDescription
// =============================================================================

/// 1レイヤー分の記述
#[derive(Debug, Clone, PartialEq)]
pub struct LayerDescription<T> {
    regime: ConvolutionRegime,
    filters: FilterLayout<T>,
    fields: Fields,
}

impl<T> LayerDescription<T> {
    pub fn regime(&self) -> &ConvolutionRegime {
        &self.regime
    }

    pub fn filters(&self) -> &FilterLayout<T> {
        &self.filters
    }

    /// 型付きで保持していないフィールド（`convolutionRegime` を含む）
    pub fn field(&self, name: &str) -> Option<&Value> {
        if name == FILTERS_KEY && !matches!(self.filters, FilterLayout::Passthrough) {
            return None;
        }
        self.fields.get(name)
    }

    /// フィルタセルを写した新しいレイヤー（他のフィールドは複製）
    pub fn try_map_cells<U, E>(
        &self,
        f: impl FnMut(&FilterCell<T>) -> Result<FilterCell<U>, E>,
    ) -> Result<LayerDescription<U>, E> {
        Ok(LayerDescription {
            regime: self.regime.clone(),
            filters: self.filters.try_map_cells(f)?,
            fields: self.fields.clone(),
        })
    }
}

impl<T: DeserializeOwned> LayerDescription<T> {
    pub fn from_fields(mut fields: Fields) -> ConvertResult<Self> {
        let regime = fields
            .get(REGIME_KEY)
            .map(ConvolutionRegime::from_value)
            .ok_or(ConvertError::MissingField(REGIME_KEY))?;
        let filters = match regime {
            ConvolutionRegime::Unshared => {
                let grid: UnsharedGrid<T> = take_field(&mut fields, FILTERS_KEY)?
                    .ok_or(ConvertError::MissingField(FILTERS_KEY))?;
                check_rectangular(&grid)?;
                FilterLayout::Unshared(grid)
            }
            ConvolutionRegime::Shared => FilterLayout::Shared(
                take_field(&mut fields, FILTERS_KEY)?
                    .ok_or(ConvertError::MissingField(FILTERS_KEY))?,
            ),
            ConvolutionRegime::Other(_) => FilterLayout::Passthrough,
        };
        Ok(Self {
            regime,
            filters,
            fields,
        })
    }

    pub fn from_value(value: Value) -> ConvertResult<Self> {
        let fields = Fields::deserialize(value).map_err(|source| ConvertError::InvalidField {
            field: "layer",
            source,
        })?;
        Self::from_fields(fields)
    }
}

impl<T: Serialize> LayerDescription<T> {
    pub fn to_value(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}

impl<T: Serialize> Serialize for LayerDescription<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (key, value) in &self.fields {
            if key == FILTERS_KEY && !matches!(self.filters, FilterLayout::Passthrough) {
                map.serialize_entry(key, &self.filters)?;
            } else {
                map.serialize_entry(key, value)?;
            }
        }
        map.end()
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for LayerDescription<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let fields = Fields::deserialize(deserializer)?;
        Self::from_fields(fields).map_err(|e| de::Error::custom(e.chain_message()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::DeterministicTable;
    use serde_json::json;

    type DetLayer = LayerDescription<DeterministicTable>;

    fn cell_json(id: u64) -> Value {
        json!({"id": id, "type": "DeterministicTexture", "table": [[0, 1], [1, 0]], "inputsShift": [0, 0, 0, 0]})
    }

    #[test]
    fn regime_dispatch() {
        assert_eq!(ConvolutionRegime::from_value(&json!("unshared")), ConvolutionRegime::Unshared);
        assert_eq!(ConvolutionRegime::from_value(&json!("shared")), ConvolutionRegime::Shared);
        assert_eq!(
            ConvolutionRegime::from_value(&json!("dense")),
            ConvolutionRegime::Other("dense".to_owned())
        );
        assert_eq!(ConvolutionRegime::from_value(&json!(3)).as_str(), "3");
    }

    #[test]
    fn shared_layer_round_trips_with_key_order() {
        let input = json!({
            "inputShape": [4, 4, 1, 1],
            "filters": [cell_json(0), cell_json(1)],
            "convolutionRegime": "shared",
            "stride": [1, 1, 1],
        });
        let layer = DetLayer::from_value(input.clone()).expect("parse failed");
        assert_eq!(layer.filters().cell_count(), 2);
        assert_eq!(layer.field("stride"), Some(&json!([1, 1, 1])));
        assert_eq!(layer.field(FILTERS_KEY), None);

        let text = serde_json::to_string(&layer).expect("serialize failed");
        assert_eq!(text, serde_json::to_string(&input).expect("serialize failed"));
        assert!(text.starts_with(r#"{"inputShape":[4,4,1,1],"filters":[{"id":0,"type":"#));
    }

    #[test]
    fn unshared_layer_reports_dims() {
        let input = json!({
            "convolutionRegime": "unshared",
            "filters": [
                [[[cell_json(0)], [cell_json(1), cell_json(2)]]],
                [[[cell_json(3)], []]],
            ],
        });
        let layer = DetLayer::from_value(input.clone()).expect("parse failed");
        assert_eq!(layer.filters().unshared_dims(), Some((2, 1, 2)));
        assert_eq!(layer.filters().cell_count(), 4);
        assert_eq!(layer.to_value().expect("serialize failed"), input);
    }

    #[test]
    fn ragged_unshared_filters_are_rejected() {
        let input = json!({
            "convolutionRegime": "unshared",
            "filters": [
                [[[cell_json(0)]], [[cell_json(1)]]],
                [[[cell_json(2)]]],
            ],
        });
        let err = DetLayer::from_value(input).expect_err("should be rejected");
        assert!(matches!(err, ConvertError::RaggedFilters { axis: "Y", expected: 2, actual: 1 }));
    }

    #[test]
    fn wrong_nesting_depth_is_rejected() {
        let input = json!({"convolutionRegime": "unshared", "filters": [cell_json(0)]});
        let err = DetLayer::from_value(input).expect_err("should be rejected");
        assert!(matches!(err, ConvertError::InvalidField { field: FILTERS_KEY, .. }));
    }

    #[test]
    fn missing_regime_and_filters_are_reported() {
        let err = DetLayer::from_value(json!({"filters": []})).expect_err("should be rejected");
        assert!(matches!(err, ConvertError::MissingField(REGIME_KEY)));

        let err = DetLayer::from_value(json!({"convolutionRegime": "shared"}))
            .expect_err("should be rejected");
        assert!(matches!(err, ConvertError::MissingField(FILTERS_KEY)));
    }

    #[test]
    fn missing_table_is_reported_with_context() {
        let input = json!({"convolutionRegime": "shared", "filters": [{"type": "DeterministicTexture"}]});
        let err = DetLayer::from_value(input).expect_err("should be rejected");
        let message = err.chain_message();
        assert!(message.contains("invalid field `filters`"), "{message}");
        assert!(message.contains("missing field `table`"), "{message}");
    }

    #[test]
    fn other_regime_keeps_filters_opaque() {
        let input = json!({"convolutionRegime": "dense", "filters": {"anything": [1, 2.5, "x"]}});
        let layer = DetLayer::from_value(input.clone()).expect("parse failed");
        assert_eq!(layer.filters(), &FilterLayout::Passthrough);
        assert_eq!(layer.field(FILTERS_KEY), Some(&json!({"anything": [1, 2.5, "x"]})));
        assert_eq!(layer.to_value().expect("serialize failed"), input);
    }

    #[test]
    fn cell_without_type_gets_it_appended() {
        let mut cell: FilterCell<DeterministicTable> =
            serde_json::from_value(json!({"table": [[1]], "id": 7})).expect("parse failed");
        assert_eq!(cell.kind(), None);
        cell.set_kind("ProbabilisticTexture");
        assert_eq!(
            serde_json::to_string(&cell).expect("serialize failed"),
            r#"{"table":[[1]],"id":7,"type":"ProbabilisticTexture"}"#
        );
    }
}
