//! テクスチャ脳のルックアップテーブル変換
//!
//! MABE が保存した TextureLayeredBrain のレイヤー記述を型付きで読み込み、
//! 決定論的テーブル（出力ビット列）を等価な確率的テーブル（one-hot 分布）に変換する。
//!
//! ```
//! use brain_tables::{DeterministicLayer, TableConverter};
//! use serde_json::json;
//!
//! let layer = DeterministicLayer::from_value(json!({
//!     "convolutionRegime": "shared",
//!     "filters": [{"type": "DeterministicTexture", "table": [[0], [1]]}],
//! }))
//! .unwrap();
//! let converted = TableConverter::default().convert_layer(&layer).unwrap();
//! assert_eq!(
//!     serde_json::to_string(&converted).unwrap(),
//!     r#"{"convolutionRegime":"shared","filters":[{"type":"ProbabilisticTexture","table":[[1.0,0.0],[0.0,1.0]]}]}"#
//! );
//! ```

pub mod bits;
pub mod convert;
pub mod error;
pub mod layer;
pub mod table;

pub use bits::{BitVector, MAX_ROW_BITS, ProbabilityVector, binary_to_index, one_hot_distribution};
pub use convert::{
    ConversionStats, ConvertOptions, DETERMINISTIC_TEXTURE_TYPE, DeterministicLayer,
    PROBABILISTIC_TEXTURE_TYPE, ProbabilisticLayer, TableConverter, convert_individual,
};
pub use error::{ConvertError, ConvertResult};
pub use layer::{ConvolutionRegime, FilterCell, FilterLayout, LayerDescription, UnsharedGrid};
pub use table::{DeterministicTable, ProbabilisticTable};
