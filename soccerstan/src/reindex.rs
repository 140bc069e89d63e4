//! Relabelling of team-indexed posterior draws with team names.

use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::encoding::Encoding;
use crate::inference::{Draws, PosteriorSampleSet};

/// Draws of one team, labelled with its name.
#[derive(Debug, Clone, PartialEq)]
pub struct TeamColumn {
    pub label: String,
    pub draws: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TeamTable {
    pub columns: Vec<TeamColumn>,
}
impl TeamTable {
    pub fn column(&self, label: &str) -> Option<&TeamColumn> {
        self.columns.iter().find(|column| column.label == label)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|column| column.label.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResultTable {
    Scalar(Vec<f64>),
    Team(TeamTable),
    /// A multi-dimensional quantity that is not team-indexed, passed through as sampled.
    Other(Draws),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReindexError {
    #[error("parameter '{param}' has a column for team identifier {identifier}, which is not in the encoding")]
    UnknownIdentifier { param: String, identifier: u32 },

    #[error("team parameter '{0}' has one-dimensional draws")]
    NotTeamIndexed(String),
}

/// Replaces the positional team identifiers of each team parameter's draws with the labels
/// they were encoded from. Parameters not named in `team_parameters` are left as they are.
///
/// Columns keep their positional order, which happens to be label order; callers must not rely
/// on it.
pub fn reindex(
    samples: PosteriorSampleSet,
    encoding: &Encoding,
    team_parameters: &[String],
) -> Result<FxHashMap<String, ResultTable>, ReindexError> {
    let decoding = encoding.inverse();
    let mut tables = FxHashMap::default();
    for (name, draws) in samples {
        let is_team = team_parameters.iter().any(|team_param| *team_param == name);
        let table = match (is_team, draws) {
            (true, Draws::Team(matrix)) => {
                let mut columns = Vec::with_capacity(matrix.cols());
                for col in 0..matrix.cols() {
                    let identifier = col as u32 + 1;
                    let label = decoding.label_of(identifier).ok_or_else(|| {
                        ReindexError::UnknownIdentifier {
                            param: name.clone(),
                            identifier,
                        }
                    })?;
                    columns.push(TeamColumn {
                        label: label.into(),
                        draws: matrix.col_to_vec(col),
                    });
                }
                ResultTable::Team(TeamTable { columns })
            }
            (true, Draws::Scalar(_)) => return Err(ReindexError::NotTeamIndexed(name)),
            (false, Draws::Scalar(draws)) => ResultTable::Scalar(draws),
            (false, draws) => ResultTable::Other(draws),
        };
        tables.insert(name, table);
    }
    Ok(tables)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use soccerstan_testing::assert_slice_f64_relative;

    use super::*;
    use crate::encoding::encode;
    use crate::linear::Matrix;

    fn matrix(rows: &[&[f64]]) -> Matrix<f64> {
        let mut matrix = Matrix::with_cols(rows[0].len());
        for row in rows {
            matrix.push_row(row);
        }
        matrix
    }

    fn team_table(tables: &FxHashMap<String, ResultTable>, name: &str) -> TeamTable {
        match &tables[name] {
            ResultTable::Team(table) => table.clone(),
            other => panic!("{name} is not a team table: {other:?}"),
        }
    }

    #[test]
    fn relabels_team_columns() {
        let encoding = encode(["B", "A"]);
        let samples = PosteriorSampleSet::from_iter([(
            "attack".to_string(),
            Draws::Team(matrix(&[&[0.1, 0.2], &[0.3, 0.4]])),
        )]);
        let tables = reindex(samples, &encoding, &["attack".into()]).unwrap();
        let attack = team_table(&tables, "attack");
        assert_eq!(
            BTreeSet::from(["A", "B"]),
            attack.labels().collect::<BTreeSet<_>>()
        );
        assert_slice_f64_relative(&[0.1, 0.3], &attack.column("A").unwrap().draws, 1e-9);
        assert_slice_f64_relative(&[0.2, 0.4], &attack.column("B").unwrap().draws, 1e-9);
    }

    #[test]
    fn column_count_matches_encoding() {
        let encoding = encode(["Leeds", "Arsenal", "Chelsea", "Arsenal"]);
        let samples = PosteriorSampleSet::from_iter([(
            "defence".to_string(),
            Draws::Team(Matrix::allocate(5, 3)),
        )]);
        let tables = reindex(samples, &encoding, &["defence".into()]).unwrap();
        let defence = team_table(&tables, "defence");
        assert_eq!(encoding.len(), defence.columns.len());
        for label in defence.labels() {
            assert!(encoding.id_of(label).is_some(), "{label}");
        }
        assert!(defence.columns.iter().all(|column| column.draws.len() == 5));
    }

    #[test]
    fn scalars_untouched() {
        let encoding = encode(["A", "B"]);
        let samples = PosteriorSampleSet::from_iter([
            ("intercept".to_string(), Draws::Scalar(vec![1.0, 2.0])),
            ("lp".to_string(), Draws::Team(matrix(&[&[1.0, 2.0, 3.0]]))),
        ]);
        let tables = reindex(samples, &encoding, &[]).unwrap();
        assert_eq!(ResultTable::Scalar(vec![1.0, 2.0]), tables["intercept"]);
        assert_eq!(
            ResultTable::Other(Draws::Team(matrix(&[&[1.0, 2.0, 3.0]]))),
            tables["lp"]
        );
    }

    #[test]
    fn unknown_identifier() {
        let encoding = encode(["A", "B"]);
        let samples = PosteriorSampleSet::from_iter([(
            "attack".to_string(),
            Draws::Team(Matrix::allocate(2, 3)),
        )]);
        assert_eq!(
            ReindexError::UnknownIdentifier {
                param: "attack".into(),
                identifier: 3
            },
            reindex(samples, &encoding, &["attack".into()]).unwrap_err()
        );
    }

    #[test]
    fn team_parameter_with_scalar_draws() {
        let encoding = encode(["A"]);
        let samples =
            PosteriorSampleSet::from_iter([("attack".to_string(), Draws::Scalar(vec![0.0]))]);
        assert_eq!(
            ReindexError::NotTeamIndexed("attack".into()),
            reindex(samples, &encoding, &["attack".into()]).unwrap_err()
        );
    }
}
