//! Error types for brain table conversion

/// 脳記述のパース・変換で発生するエラー
#[derive(thiserror::Error, Debug)]
pub enum ConvertError {
    /// 必須フィールドが存在しない
    #[error("missing field `{0}`")]
    MissingField(&'static str),

    /// フィールドの値が期待する形式ではない
    #[error("invalid field `{field}`")]
    InvalidField {
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// unshared フィルタの X/Y/T 軸が矩形になっていない
    #[error("ragged unshared filters along {axis}: expected {expected}, got {actual}")]
    RaggedFilters {
        axis: &'static str,
        expected: usize,
        actual: usize,
    },

    /// 1行のビット幅が大きすぎて確率ベクトルを確保できない
    #[error("table row has {width} bits, at most {max} are supported")]
    RowTooWide { width: usize, max: usize },

    /// 個体内の特定レイヤーで発生したエラー
    #[error("failed to convert layer {index}")]
    Layer {
        index: usize,
        #[source]
        source: Box<ConvertError>,
    },
}

impl ConvertError {
    /// 原因チェーンを ": " で連結した1行表現
    ///
    /// serde の `Error::custom` 経由で返すと source が失われるため、その前に平坦化する。
    pub fn chain_message(&self) -> String {
        let mut message = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        message
    }

    pub(crate) fn in_layer(self, index: usize) -> Self {
        ConvertError::Layer {
            index,
            source: Box::new(self),
        }
    }
}

/// Result type for conversion operations
pub type ConvertResult<T> = Result<T, ConvertError>;
