//! 決定論的テクスチャ脳 → 確率的テクスチャ脳 変換ツール
//!
//! MABE の集団ファイルを読み、各個体の決定論的ルックアップテーブルを
//! one-hot 分布の確率的テーブルに置き換えた集団ファイルを書き出す。
//!
//! 使用例:
//! ```bash
//! det2prob snapshot_data_100.csv snapshot_data_100_prob.csv
//! det2prob pop.csv.gz - --annotate-pattern-counts --skip-invalid
//! ```

use std::path::PathBuf;

use anyhow::{Result, bail};
use brain_tables::{ConvertOptions, TableConverter};
use clap::Parser;
use tools::common::io::is_stdio;
use tools::convert::{FailurePolicy, convert_population};
use tools::population::{load_raw_population, save_population};

#[derive(Parser, Debug)]
#[command(name = "det2prob")]
#[command(about = "決定論的テクスチャ脳の集団を確率的テクスチャ脳に変換する")]
struct Cli {
    /// 入力の集団ファイル（`-` で標準入力、`.gz` は自動展開）
    in_file: PathBuf,

    /// 出力先（`-` で標準出力、`.gz` は圧縮）。既存ファイルは上書きしない
    out_file: PathBuf,

    /// 変換後のセルに numInputPatterns / numOutputPatterns を付与する
    #[arg(long, default_value_t = false)]
    annotate_pattern_counts: bool,

    /// 変換できない個体を警告付きで除外する（既定は中断）
    #[arg(long, default_value_t = false)]
    skip_invalid: bool,

    /// 並列数（0 = 自動）
    #[arg(long, default_value_t = 0)]
    jobs: usize,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let cli = Cli::parse();

    // 読み込み前に出力先を確認
    if !is_stdio(&cli.out_file) && cli.out_file.exists() {
        bail!("output file {} exists, will not overwrite", cli.out_file.display());
    }

    if cli.jobs > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(cli.jobs)
            .build_global()
            .unwrap_or_else(|e| {
                log::warn!("failed to set thread count: {e}");
            });
    }

    let individuals = load_raw_population(&cli.in_file)?;
    log::info!("loaded {} individuals from {}", individuals.len(), cli.in_file.display());

    let converter = TableConverter::new(ConvertOptions {
        annotate_pattern_counts: cli.annotate_pattern_counts,
    });
    let policy = if cli.skip_invalid {
        FailurePolicy::Skip
    } else {
        FailurePolicy::Abort
    };
    let report = convert_population(&converter, &individuals, policy)?;

    let stats = report.stats;
    log::info!(
        "converted {} individuals: {} layers ({} unshared, {} shared, {} passed through), {} cells, {} rows",
        report.converted.len(),
        stats.layers,
        stats.unshared_layers,
        stats.shared_layers,
        stats.passthrough_layers,
        stats.cells,
        stats.rows
    );
    if !report.skipped.is_empty() {
        log::warn!("skipped {} individuals: {:?}", report.skipped.len(), report.skipped);
    }

    save_population(&cli.out_file, &report.converted)?;
    log::info!("wrote {}", cli.out_file.display());
    Ok(())
}
