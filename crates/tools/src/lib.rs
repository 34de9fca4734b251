//! 保存済み集団ファイルのオフライン後処理ツール群

pub mod common;
pub mod convert;
pub mod population;
