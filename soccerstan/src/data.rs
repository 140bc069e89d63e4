//! Match data and its normalisation into model-ready records.

use std::fmt::{Display, Formatter};

use thiserror::Error;
use tracing::debug;

use crate::encoding;
use crate::encoding::Encoding;

/// One row of the source table. A `None` goal count marks a fixture that is yet to be played.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    pub home_team: String,
    pub away_team: String,
    pub home_goals: Option<String>,
    pub away_goals: Option<String>,
}
impl RawRow {
    pub fn played(home_team: &str, away_team: &str, home_goals: u16, away_goals: u16) -> Self {
        Self {
            home_team: home_team.into(),
            away_team: away_team.into(),
            home_goals: Some(home_goals.to_string()),
            away_goals: Some(away_goals.to_string()),
        }
    }

    pub fn unplayed(home_team: &str, away_team: &str) -> Self {
        Self {
            home_team: home_team.into(),
            away_team: away_team.into(),
            home_goals: None,
            away_goals: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTable {
    pub rows: Vec<RawRow>,
}

impl From<Vec<RawRow>> for RawTable {
    fn from(rows: Vec<RawRow>) -> Self {
        Self { rows }
    }
}

/// A completed fixture with its encoded team identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchRecord {
    pub home_team: String,
    pub away_team: String,
    pub home_goals: u16,
    pub away_goals: u16,
    pub home_team_id: u32,
    pub away_team_id: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedDataset {
    pub records: Vec<MatchRecord>,
    pub encoding: Encoding,
}
impl NormalizedDataset {
    pub fn num_teams(&self) -> usize {
        self.encoding.len()
    }

    pub fn num_games(&self) -> usize {
        self.records.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoalColumn {
    Home,
    Away,
}
impl Display for GoalColumn {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            GoalColumn::Home => write!(f, "home_goals"),
            GoalColumn::Away => write!(f, "away_goals"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("malformed score in row {row}, {column}: {}", describe(.value))]
pub struct MalformedScoreError {
    /// 1-based position of the row among the table's data rows.
    pub row: usize,
    pub column: GoalColumn,
    pub value: Option<String>,
}

fn describe(value: &Option<String>) -> String {
    match value {
        None => "missing".into(),
        Some(value) => format!("'{value}' is not a goal count"),
    }
}

/// Normalises `table` into played-match records.
///
/// The encoding is derived from every row, played or not, so that teams appearing only in
/// upcoming fixtures still receive identifiers. Rows without a home goal count are then
/// dropped and the rest are coerced and encoded, preserving their relative order.
pub fn normalize(table: &RawTable) -> Result<NormalizedDataset, MalformedScoreError> {
    let encoding = encoding::encode(
        table
            .rows
            .iter()
            .flat_map(|row| [row.home_team.as_str(), row.away_team.as_str()]),
    );

    let mut records = Vec::with_capacity(table.rows.len());
    for (index, row) in table.rows.iter().enumerate() {
        let Some(home_goals) = &row.home_goals else {
            continue;
        };
        let row_number = index + 1;
        let home_goals = coerce_goals(home_goals).ok_or_else(|| MalformedScoreError {
            row: row_number,
            column: GoalColumn::Home,
            value: Some(home_goals.clone()),
        })?;
        let away_goals = row
            .away_goals
            .as_deref()
            .and_then(coerce_goals)
            .ok_or_else(|| MalformedScoreError {
                row: row_number,
                column: GoalColumn::Away,
                value: row.away_goals.clone(),
            })?;
        records.push(MatchRecord {
            home_team: row.home_team.clone(),
            away_team: row.away_team.clone(),
            home_goals,
            away_goals,
            home_team_id: encoding[row.home_team.as_str()],
            away_team_id: encoding[row.away_team.as_str()],
        });
    }
    debug!(
        "normalised {} rows into {} played matches across {} teams",
        table.rows.len(),
        records.len(),
        encoding.len()
    );
    Ok(NormalizedDataset { records, encoding })
}

/// Parses a goal count, tolerating integral decimal renderings such as `"2.0"`.
fn coerce_goals(text: &str) -> Option<u16> {
    let text = text.trim();
    if let Ok(goals) = text.parse::<u16>() {
        return Some(goals);
    }
    let goals = text.parse::<f64>().ok()?;
    if goals.is_finite() && goals >= 0.0 && goals.fract() == 0.0 && goals <= u16::MAX as f64 {
        Some(goals as u16)
    } else {
        None
    }
}
