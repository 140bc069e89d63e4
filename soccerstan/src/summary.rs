//! Posterior summaries: mean, median and a central interval per parameter and team.

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::reindex::ResultTable;

#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub mean: f64,
    pub sd: f64,
    pub lower: f64,
    pub median: f64,
    pub upper: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParamSummary {
    Scalar(Summary),
    /// One summary per team, in descending order of median.
    Team(Vec<(String, Summary)>),
}

/// Linearly interpolated `p`-quantile of sorted values.
pub fn quantile(sorted: &[f64], p: f64) -> f64 {
    debug_assert!(!sorted.is_empty(), "no values");
    debug_assert!((0.0..=1.0).contains(&p), "p {p} outside [0, 1]");
    let position = p * (sorted.len() - 1) as f64;
    let below = position.floor() as usize;
    let above = position.ceil() as usize;
    let fraction = position - below as f64;
    sorted[below] + (sorted[above] - sorted[below]) * fraction
}

/// Summarises `draws`, with `lower` and `upper` bounding the central `1 - alpha` interval.
/// Returns `None` if there are no draws.
pub fn summarise(draws: &[f64], alpha: f64) -> Option<Summary> {
    if draws.is_empty() {
        return None;
    }
    let mut sorted = draws.to_vec();
    sorted.sort_by(f64::total_cmp);
    let n = draws.len() as f64;
    let mean = draws.iter().sum::<f64>() / n;
    let sd = if draws.len() > 1 {
        (draws.iter().map(|draw| (draw - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
    } else {
        0.0
    };
    Some(Summary {
        mean,
        sd,
        lower: quantile(&sorted, alpha / 2.0),
        median: quantile(&sorted, 0.5),
        upper: quantile(&sorted, 1.0 - alpha / 2.0),
    })
}

/// Summarises every scalar and team table, ordered by parameter name. Pass-through quantities
/// that are neither are skipped.
pub fn summarise_tables(
    tables: &FxHashMap<String, ResultTable>,
    alpha: f64,
) -> Vec<(String, ParamSummary)> {
    let mut names = tables.keys().collect::<Vec<_>>();
    names.sort();
    let mut summaries = Vec::with_capacity(names.len());
    for name in names {
        let summary = match &tables[name] {
            ResultTable::Scalar(draws) => summarise(draws, alpha).map(ParamSummary::Scalar),
            ResultTable::Team(table) => {
                let mut teams = table
                    .columns
                    .iter()
                    .filter_map(|column| {
                        summarise(&column.draws, alpha).map(|summary| (column.label.clone(), summary))
                    })
                    .collect::<Vec<_>>();
                teams.sort_by(|(_, a), (_, b)| b.median.total_cmp(&a.median));
                Some(ParamSummary::Team(teams))
            }
            ResultTable::Other(_) => {
                debug!("not summarising '{name}'");
                None
            }
        };
        if let Some(summary) = summary {
            summaries.push((name.clone(), summary));
        }
    }
    summaries
}
