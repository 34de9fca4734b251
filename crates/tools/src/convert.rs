//! 集団全体の一括変換
//!
//! 個体ごとの解析と変換は独立なので rayon で並列に行い、出力は入力順を保つ。

use anyhow::{Context, Result};
use brain_tables::{
    ConversionStats, DeterministicTable, ProbabilisticLayer, ProbabilisticTable, TableConverter,
};
use rayon::prelude::*;

use crate::population::{Individual, IndividualId, Population, RawIndividual};

/// 変換に失敗した個体の扱い
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// 最初に失敗した個体で全体を中断する
    #[default]
    Abort,
    /// 失敗した個体を警告付きで出力から除く
    Skip,
}

#[derive(Debug, Clone)]
pub struct BatchReport {
    pub converted: Population<ProbabilisticTable>,
    pub skipped: Vec<IndividualId>,
    pub stats: ConversionStats,
}

/// 1個体分の解析と変換
///
/// 構造の不整合（解析時）と行幅超過（変換時）のどちらもこの個体の失敗になる。
fn convert_one(
    converter: &TableConverter,
    raw: &RawIndividual,
) -> Result<(Vec<ProbabilisticLayer>, ConversionStats)> {
    let individual: Individual<DeterministicTable> = raw.parse()?;
    let layers = converter
        .convert_individual(&individual.layers)
        .with_context(|| format!("line {}", raw.line_no))?;
    Ok((layers, ConversionStats::tally(&individual.layers)))
}

pub fn convert_population(
    converter: &TableConverter,
    individuals: &[RawIndividual],
    policy: FailurePolicy,
) -> Result<BatchReport> {
    let results: Vec<_> = individuals
        .par_iter()
        .map(|raw| (raw.id, convert_one(converter, raw)))
        .collect();

    let mut report = BatchReport {
        converted: Population::new(),
        skipped: Vec::new(),
        stats: ConversionStats::default(),
    };
    for (id, result) in results {
        match result {
            Ok((layers, stats)) => {
                report.stats += stats;
                report.converted.insert(id, layers);
            }
            Err(e) => match policy {
                FailurePolicy::Abort => {
                    return Err(e.context(format!("failed to convert individual {id}")));
                }
                FailurePolicy::Skip => {
                    log::warn!("skipping individual {id}: {e:#}");
                    report.skipped.push(id);
                }
            },
        }
    }
    Ok(report)
}
