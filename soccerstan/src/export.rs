//! CSV export of posterior draws and summaries.
//!
//! For every exported parameter `param` of model `model`, raw draws go to `<model>-<param>.csv`
//! and the summary to `<model>-<param>-summary.csv`. Team draws have one column per team, in
//! label order.

use std::io;
use std::io::Write;
use std::path::{Path, PathBuf};

use ordinalizer::Ordinal;
use rustc_hash::FxHashMap;
use strum::{EnumCount, IntoEnumIterator};
use strum_macros::{Display, EnumCount, EnumIter};
use tracing::info;

use crate::csv::{CsvWriter, Record};
use crate::inference::Draws;
use crate::reindex::ResultTable;
use crate::summary::{ParamSummary, Summary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Ordinal, EnumCount, EnumIter, Display)]
#[strum(serialize_all = "snake_case")]
pub enum SummaryColumn {
    Team,
    Mean,
    Sd,
    Lower,
    Median,
    Upper,
}

impl From<SummaryColumn> for usize {
    fn from(column: SummaryColumn) -> Self {
        column.ordinal()
    }
}

pub fn write_draws<W: Write>(csv: &mut CsvWriter<W>, param: &str, table: &ResultTable) -> Result<(), io::Error> {
    match table {
        ResultTable::Scalar(draws) => {
            csv.append(["draw", param])?;
            for (index, draw) in draws.iter().enumerate() {
                csv.append(Record::with_values([index.to_string(), draw.to_string()]))?;
            }
        }
        ResultTable::Team(table) => {
            let mut columns = table.columns.iter().collect::<Vec<_>>();
            columns.sort_by(|a, b| a.label.cmp(&b.label));
            csv.append(
                Some("draw")
                    .into_iter()
                    .chain(columns.iter().map(|column| column.label.as_str())),
            )?;
            let num_draws = columns.first().map(|column| column.draws.len()).unwrap_or_default();
            for index in 0..num_draws {
                csv.append(Record::with_values(
                    Some(index.to_string())
                        .into_iter()
                        .chain(columns.iter().map(|column| column.draws[index].to_string())),
                ))?;
            }
        }
        ResultTable::Other(draws) => match draws {
            Draws::Scalar(draws) => write_draws(csv, param, &ResultTable::Scalar(draws.clone()))?,
            Draws::Team(matrix) => {
                csv.append(
                    Some("draw".to_string())
                        .into_iter()
                        .chain((1..=matrix.cols()).map(|col| format!("{param}[{col}]"))),
                )?;
                for row in 0..matrix.rows() {
                    csv.append(Record::with_values(
                        Some(row.to_string())
                            .into_iter()
                            .chain(matrix.row_slice(row).iter().map(ToString::to_string)),
                    ))?;
                }
            }
        },
    }
    Ok(())
}

fn summary_record(team: Option<&str>, summary: &Summary) -> Record {
    let mut record = Record::with_capacity(SummaryColumn::COUNT);
    if let Some(team) = team {
        record.set(SummaryColumn::Team, team);
    }
    record.set(SummaryColumn::Mean, summary.mean);
    record.set(SummaryColumn::Sd, summary.sd);
    record.set(SummaryColumn::Lower, summary.lower);
    record.set(SummaryColumn::Median, summary.median);
    record.set(SummaryColumn::Upper, summary.upper);
    record
}

pub fn write_summary<W: Write>(csv: &mut CsvWriter<W>, summary: &ParamSummary) -> Result<(), io::Error> {
    csv.append(Record::with_values(SummaryColumn::iter()))?;
    match summary {
        ParamSummary::Scalar(summary) => csv.append(summary_record(None, summary))?,
        ParamSummary::Team(teams) => {
            for (team, summary) in teams {
                csv.append(summary_record(Some(team), summary))?;
            }
        }
    }
    Ok(())
}

/// Writes draws and summaries of the given model into `dir`, returning the paths written.
pub fn export(
    dir: &Path,
    model: &str,
    tables: &FxHashMap<String, ResultTable>,
    summaries: &[(String, ParamSummary)],
) -> Result<Vec<PathBuf>, io::Error> {
    std::fs::create_dir_all(dir)?;
    let mut names = tables.keys().collect::<Vec<_>>();
    names.sort();
    let mut written = vec![];
    for name in names {
        let path = dir.join(format!("{model}-{name}.csv"));
        let mut csv = CsvWriter::create(&path)?;
        write_draws(&mut csv, name, &tables[name])?;
        csv.flush()?;
        written.push(path);
    }
    for (name, summary) in summaries {
        let path = dir.join(format!("{model}-{name}-summary.csv"));
        let mut csv = CsvWriter::create(&path)?;
        write_summary(&mut csv, summary)?;
        csv.flush()?;
        written.push(path);
    }
    info!("exported {} files to {}", written.len(), dir.display());
    Ok(written)
}
