//! Posterior sampling against normalised match data.

use std::fmt::Debug;
use std::time::Instant;

use bincode::{Decode, Encode};
use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::{debug, info};

use crate::data::MatchRecord;
use crate::encoding::Encoding;
use crate::linear::Matrix;
use crate::model::template::CompileError;
use crate::model::ModelIdentity;

pub mod metropolis;

/// Draws of one parameter. Team draws hold one row per draw and one column per team, column
/// `j` belonging to the team with identifier `j + 1`.
#[derive(Debug, Clone, PartialEq)]
pub enum Draws {
    Scalar(Vec<f64>),
    Team(Matrix<f64>),
}
impl Draws {
    pub fn num_draws(&self) -> usize {
        match self {
            Draws::Scalar(draws) => draws.len(),
            Draws::Team(draws) => draws.rows(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PosteriorSampleSet {
    params: FxHashMap<String, Draws>,
}
impl PosteriorSampleSet {
    pub fn insert(&mut self, name: impl Into<String>, draws: Draws) {
        self.params.insert(name.into(), draws);
    }

    pub fn get(&self, name: &str) -> Option<&Draws> {
        self.params.get(name)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Draws)> {
        self.params.iter().map(|(name, draws)| (name.as_str(), draws))
    }
}

impl IntoIterator for PosteriorSampleSet {
    type Item = (String, Draws);
    type IntoIter = std::collections::hash_map::IntoIter<String, Draws>;

    fn into_iter(self) -> Self::IntoIter {
        self.params.into_iter()
    }
}

impl FromIterator<(String, Draws)> for PosteriorSampleSet {
    fn from_iter<T: IntoIterator<Item = (String, Draws)>>(iter: T) -> Self {
        Self {
            params: iter.into_iter().collect(),
        }
    }
}

/// The data handed to the engine: team and game counts, and per-game identifiers and goal
/// counts as parallel sequences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInput {
    pub n_teams: usize,
    pub n_games: usize,
    pub home_team: Vec<u32>,
    pub away_team: Vec<u32>,
    pub home_goals: Vec<u16>,
    pub away_goals: Vec<u16>,
}
impl ModelInput {
    pub fn assemble(records: &[MatchRecord], encoding: &Encoding) -> Self {
        Self {
            n_teams: encoding.len(),
            n_games: records.len(),
            home_team: records.iter().map(|record| record.home_team_id).collect(),
            away_team: records.iter().map(|record| record.away_team_id).collect(),
            home_goals: records.iter().map(|record| record.home_goals).collect(),
            away_goals: records.iter().map(|record| record.away_goals).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SamplerOptions {
    /// Iterations per chain, warmup included.
    pub iterations: u32,
    pub chains: u32,
    /// Defaults to half of `iterations`.
    pub warmup: Option<u32>,
    pub seed: u64,
    /// When set, a potential scale reduction above this value fails the run.
    pub max_rhat: Option<f64>,
}
impl SamplerOptions {
    pub fn warmup(&self) -> u32 {
        self.warmup.unwrap_or(self.iterations / 2)
    }

    /// Number of post-warmup draws kept from each chain.
    pub fn kept(&self) -> u32 {
        self.iterations.saturating_sub(self.warmup())
    }
}

impl Default for SamplerOptions {
    fn default() -> Self {
        Self {
            iterations: 2_000,
            chains: 4,
            warmup: None,
            seed: 0,
            max_rhat: None,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
#[error("inference failed: {0}")]
pub struct InferenceFailedError(pub String);

/// An inference engine: compiles a model template into a reusable artifact and draws posterior
/// samples from it.
pub trait Engine {
    type Artifact: Encode + Decode<()> + Debug;

    fn compile(&self, identity: &ModelIdentity) -> Result<Self::Artifact, CompileError>;

    fn sample(
        &self,
        artifact: &Self::Artifact,
        input: &ModelInput,
        options: &SamplerOptions,
    ) -> Result<PosteriorSampleSet, InferenceFailedError>;
}

/// Samples the posterior of a compiled model over the given played matches.
///
/// The engine's output is checked against the identity: every declared parameter must be
/// present with one draw sequence, team parameters must carry one column per encoded team, and
/// all parameters must have the same number of draws. Failures are not retried.
pub fn run<E: Engine>(
    engine: &E,
    artifact: &E::Artifact,
    identity: &ModelIdentity,
    records: &[MatchRecord],
    encoding: &Encoding,
    options: &SamplerOptions,
) -> Result<PosteriorSampleSet, InferenceFailedError> {
    let input = ModelInput::assemble(records, encoding);
    info!(
        "sampling '{}': {} chains of {} iterations ({} warmup) over {} games between {} teams",
        identity.name,
        options.chains,
        options.iterations,
        options.warmup(),
        input.n_games,
        input.n_teams
    );
    let start_time = Instant::now();
    let samples = engine.sample(artifact, &input, options)?;
    info!("sampling took {:.3}s", start_time.elapsed().as_secs_f64());
    check_samples(identity, &input, &samples)?;
    Ok(samples)
}

fn check_samples(
    identity: &ModelIdentity,
    input: &ModelInput,
    samples: &PosteriorSampleSet,
) -> Result<(), InferenceFailedError> {
    let mut expected_draws = None;
    for name in identity.all_parameters() {
        let draws = samples
            .get(name)
            .ok_or_else(|| InferenceFailedError(format!("no draws for parameter '{name}'")))?;
        match (identity.is_team_parameter(name), draws) {
            (true, Draws::Team(matrix)) if matrix.cols() != input.n_teams => {
                return Err(InferenceFailedError(format!(
                    "team parameter '{name}' has {} columns for {} teams",
                    matrix.cols(),
                    input.n_teams
                )));
            }
            (true, Draws::Scalar(_)) => {
                return Err(InferenceFailedError(format!(
                    "team parameter '{name}' was sampled as a scalar"
                )));
            }
            (false, Draws::Team(_)) => {
                return Err(InferenceFailedError(format!(
                    "scalar parameter '{name}' was sampled per team"
                )));
            }
            _ => {}
        }
        let num_draws = draws.num_draws();
        match expected_draws {
            None => expected_draws = Some(num_draws),
            Some(expected) if expected != num_draws => {
                return Err(InferenceFailedError(format!(
                    "parameter '{name}' has {num_draws} draws, expected {expected}"
                )));
            }
            Some(_) => {}
        }
    }
    for (name, _) in samples.iter() {
        if !identity.all_parameters().any(|declared| declared == name) {
            debug!("passing through undeclared quantity '{name}'");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{normalize, RawRow, RawTable};

    struct CannedEngine {
        samples: PosteriorSampleSet,
    }

    impl Engine for CannedEngine {
        type Artifact = ();

        fn compile(&self, _: &ModelIdentity) -> Result<Self::Artifact, CompileError> {
            Ok(())
        }

        fn sample(
            &self,
            _: &Self::Artifact,
            input: &ModelInput,
            _: &SamplerOptions,
        ) -> Result<PosteriorSampleSet, InferenceFailedError> {
            assert_eq!(vec![1, 2], input.home_team);
            Ok(self.samples.clone())
        }
    }

    fn identity() -> ModelIdentity {
        ModelIdentity {
            name: "canned".into(),
            template: String::new(),
            parameters: vec!["intercept".into()],
            team_parameters: vec!["attack".into()],
        }
    }

    fn dataset() -> crate::data::NormalizedDataset {
        normalize(&RawTable::from(vec![
            RawRow::played("A", "B", 2, 1),
            RawRow::played("B", "A", 0, 0),
            RawRow::unplayed("C", "A"),
        ]))
        .unwrap()
    }

    fn team_draws(rows: usize, cols: usize) -> Draws {
        Draws::Team(Matrix::allocate(rows, cols))
    }

    fn run_canned(samples: PosteriorSampleSet) -> Result<PosteriorSampleSet, InferenceFailedError> {
        let dataset = dataset();
        run(
            &CannedEngine { samples },
            &(),
            &identity(),
            &dataset.records,
            &dataset.encoding,
            &SamplerOptions::default(),
        )
    }

    #[test]
    fn assemble_parallel_sequences() {
        let dataset = dataset();
        let input = ModelInput::assemble(&dataset.records, &dataset.encoding);
        assert_eq!(
            ModelInput {
                n_teams: 3,
                n_games: 2,
                home_team: vec![1, 2],
                away_team: vec![2, 1],
                home_goals: vec![2, 0],
                away_goals: vec![1, 0],
            },
            input
        );
    }

    #[test]
    fn warmup_defaults_to_half() {
        let options = SamplerOptions {
            iterations: 1_001,
            ..SamplerOptions::default()
        };
        assert_eq!(500, options.warmup());
        assert_eq!(501, options.kept());
        let options = SamplerOptions {
            iterations: 100,
            warmup: Some(150),
            ..SamplerOptions::default()
        };
        assert_eq!(0, options.kept());
    }

    #[test]
    fn accepts_well_formed_samples() {
        let samples = PosteriorSampleSet::from_iter([
            ("intercept".to_string(), Draws::Scalar(vec![0.0; 4])),
            ("attack".to_string(), team_draws(4, 3)),
            ("log_lik".to_string(), Draws::Scalar(vec![0.0; 4])),
        ]);
        assert_eq!(samples, run_canned(samples.clone()).unwrap());
    }

    #[test]
    fn missing_parameter() {
        let samples = PosteriorSampleSet::from_iter([("attack".to_string(), team_draws(4, 3))]);
        assert_eq!(
            InferenceFailedError("no draws for parameter 'intercept'".into()),
            run_canned(samples).unwrap_err()
        );
    }

    #[test]
    fn wrong_team_count() {
        let samples = PosteriorSampleSet::from_iter([
            ("intercept".to_string(), Draws::Scalar(vec![0.0; 4])),
            ("attack".to_string(), team_draws(4, 2)),
        ]);
        assert_eq!(
            "inference failed: team parameter 'attack' has 2 columns for 3 teams",
            run_canned(samples).unwrap_err().to_string()
        );
    }

    #[test]
    fn wrong_dimensionality() {
        let samples = PosteriorSampleSet::from_iter([
            ("intercept".to_string(), team_draws(4, 3)),
            ("attack".to_string(), team_draws(4, 3)),
        ]);
        assert_eq!(
            InferenceFailedError("scalar parameter 'intercept' was sampled per team".into()),
            run_canned(samples).unwrap_err()
        );
    }

    #[test]
    fn inconsistent_draw_counts() {
        let samples = PosteriorSampleSet::from_iter([
            ("intercept".to_string(), Draws::Scalar(vec![0.0; 4])),
            ("attack".to_string(), team_draws(5, 3)),
        ]);
        assert_eq!(
            InferenceFailedError("parameter 'attack' has 5 draws, expected 4".into()),
            run_canned(samples).unwrap_err()
        );
    }
}
