//! 集団ファイルの読み書き
//!
//! MABE の集団ファイルは1行目がヘッダ、以降1行1個体で
//! `'<コンパクトなJSONレイヤー配列>',<個体ID>` という形式。

use std::collections::HashMap;
use std::io::{BufRead, ErrorKind, Write};
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use brain_tables::LayerDescription;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::common::io::{create_new_writer, open_reader};

/// 集団ファイルのヘッダ行
pub const POPULATION_HEADER: &str = "BRAIN_root::_json,ID";

pub type IndividualId = i64;

/// 1個体分の脳記述
#[derive(Debug, Clone, PartialEq)]
pub struct Individual<T> {
    pub id: IndividualId,
    pub layers: Vec<LayerDescription<T>>,
}

/// 挿入順を保ち、IDで引ける個体の集まり
#[derive(Debug, Clone)]
pub struct Population<T> {
    individuals: Vec<Individual<T>>,
    index: HashMap<IndividualId, usize>,
}

impl<T> Default for Population<T> {
    fn default() -> Self {
        Self {
            individuals: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<T> Population<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.individuals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.individuals.is_empty()
    }

    /// 個体を追加する
    ///
    /// 同じIDが既にあれば元の位置で置き換え、古いレイヤー列を返す。
    pub fn insert(
        &mut self,
        id: IndividualId,
        layers: Vec<LayerDescription<T>>,
    ) -> Option<Vec<LayerDescription<T>>> {
        match self.index.get(&id) {
            Some(&pos) => Some(std::mem::replace(&mut self.individuals[pos].layers, layers)),
            None => {
                self.index.insert(id, self.individuals.len());
                self.individuals.push(Individual { id, layers });
                None
            }
        }
    }

    pub fn get(&self, id: IndividualId) -> Option<&Individual<T>> {
        self.index.get(&id).map(|&pos| &self.individuals[pos])
    }

    pub fn individuals(&self) -> &[Individual<T>] {
        &self.individuals
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Individual<T>> {
        self.individuals.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = IndividualId> + '_ {
        self.individuals.iter().map(|ind| ind.id)
    }
}

impl<T> FromIterator<Individual<T>> for Population<T> {
    fn from_iter<I: IntoIterator<Item = Individual<T>>>(iter: I) -> Self {
        let mut population = Self::new();
        for ind in iter {
            population.insert(ind.id, ind.layers);
        }
        population
    }
}

/// 脳記述を解析する前の1個体
///
/// ID と行番号だけを確定させ、脳記述は JSON テキストのまま持つ。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawIndividual {
    pub id: IndividualId,
    /// 入力ファイル上の行番号（1始まり）
    pub line_no: usize,
    pub payload: String,
}

impl RawIndividual {
    /// 脳記述を型付きで解析する
    pub fn parse<T: DeserializeOwned>(&self) -> Result<Individual<T>> {
        let layers: Vec<LayerDescription<T>> = serde_json::from_str(&self.payload)
            .with_context(|| format!("invalid brain description at line {}", self.line_no))?;
        Ok(Individual { id: self.id, layers })
    }
}

/// データ行を ID と脳記述テキストに分ける
///
/// 脳記述は先頭の `'` から最後の `',` までの部分。
pub fn split_population_line(line: &str) -> Result<(IndividualId, &str)> {
    let line = line.trim_end_matches(['\r', '\n']);
    let rest = line
        .strip_prefix('\'')
        .ok_or_else(|| anyhow!("line does not start with a quoted brain description"))?;
    let split = rest
        .rfind("',")
        .ok_or_else(|| anyhow!("missing closing quote before the individual id"))?;
    let (payload, id_part) = (&rest[..split], &rest[split + 2..]);

    let id: IndividualId = id_part
        .trim()
        .parse()
        .with_context(|| format!("invalid individual id {:?}", id_part.trim()))?;
    Ok((id, payload))
}

/// データ行を1つ解析する
pub fn parse_population_line<T: DeserializeOwned>(
    line: &str,
) -> Result<(IndividualId, Vec<LayerDescription<T>>)> {
    let (id, payload) = split_population_line(line)?;
    let layers: Vec<LayerDescription<T>> = serde_json::from_str(payload)
        .with_context(|| format!("invalid brain description for individual {id}"))?;
    Ok((id, layers))
}

/// 1個体を1行に整形する（改行なし）
pub fn format_population_line<T: Serialize>(
    id: IndividualId,
    layers: &[LayerDescription<T>],
) -> Result<String> {
    let json = serde_json::to_string(layers)
        .with_context(|| format!("failed to serialize individual {id}"))?;
    Ok(format!("'{json}',{id}"))
}

/// ヘッダと各行の ID だけを解析して読む
///
/// ID が読めない行はファイル全体のエラー。同じ ID は後の行が元の位置で置き換える。
pub fn read_raw_population<R: BufRead>(reader: R) -> Result<Vec<RawIndividual>> {
    let mut individuals: Vec<RawIndividual> = Vec::new();
    let mut index: HashMap<IndividualId, usize> = HashMap::new();
    let mut lines = reader.lines();

    match lines.next() {
        Some(header) => {
            let header = header.context("failed to read header line")?;
            if header.trim() != POPULATION_HEADER {
                log::warn!("unexpected population header {:?}, expected {POPULATION_HEADER:?}", header.trim());
            }
        }
        None => {
            log::warn!("population file is empty");
            return Ok(individuals);
        }
    }

    for (i, line) in lines.enumerate() {
        let line_no = i + 2;
        let line = line.with_context(|| format!("failed to read line {line_no}"))?;
        if line.trim().is_empty() {
            continue;
        }
        let (id, payload) =
            split_population_line(&line).with_context(|| format!("line {line_no}"))?;
        let raw = RawIndividual {
            id,
            line_no,
            payload: payload.to_owned(),
        };
        match index.get(&id) {
            Some(&pos) => {
                log::warn!("duplicate individual id {id} at line {line_no}, keeping the later record");
                individuals[pos] = raw;
            }
            None => {
                index.insert(id, individuals.len());
                individuals.push(raw);
            }
        }
    }
    Ok(individuals)
}

/// 全個体を型付きで読む。1個体でも解析できなければエラー
pub fn read_population<R: BufRead, T: DeserializeOwned>(reader: R) -> Result<Population<T>> {
    read_raw_population(reader)?
        .iter()
        .map(|raw| raw.parse().with_context(|| format!("individual {}", raw.id)))
        .collect()
}

pub fn write_population<W: Write, T: Serialize>(
    mut writer: W,
    population: &Population<T>,
) -> Result<()> {
    writeln!(writer, "{POPULATION_HEADER}")?;
    for ind in population.iter() {
        let line = format_population_line(ind.id, &ind.layers)?;
        writeln!(writer, "{line}")?;
    }
    writer.flush()?;
    Ok(())
}

/// ファイル（`-` は標準入力、`.gz` は展開）から集団を読む
pub fn load_population<T: DeserializeOwned>(path: &Path) -> Result<Population<T>> {
    let reader =
        open_reader(path).with_context(|| format!("failed to open {}", path.display()))?;
    read_population(reader).with_context(|| format!("failed to read {}", path.display()))
}

/// ファイルから解析前の個体列を読む
pub fn load_raw_population(path: &Path) -> Result<Vec<RawIndividual>> {
    let reader =
        open_reader(path).with_context(|| format!("failed to open {}", path.display()))?;
    read_raw_population(reader).with_context(|| format!("failed to read {}", path.display()))
}

/// 集団を新規ファイルに書く。既存ファイルは上書きしない
pub fn save_population<T: Serialize>(path: &Path, population: &Population<T>) -> Result<()> {
    let mut writer = match create_new_writer(path) {
        Ok(w) => w,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            bail!("output file {} exists, will not overwrite", path.display())
        }
        Err(e) => {
            return Err(e).with_context(|| format!("failed to create {}", path.display()));
        }
    };
    write_population(&mut writer, population)
        .with_context(|| format!("failed to write {}", path.display()))?;
    writer.close().with_context(|| format!("failed to finish {}", path.display()))?;
    Ok(())
}
