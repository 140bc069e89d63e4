//! A component-wise random-walk Metropolis sampler for compiled templates.
//!
//! Each coordinate of the parameter vector is updated in turn with a Gaussian proposal.
//! Proposal scales are tuned during warmup towards an acceptance rate of 0.44. Chains run in
//! parallel, each with its own generator seeded from `seed + chain`.

use std::f64::consts::PI;

use rayon::prelude::*;
use rustc_hash::FxHashMap;
use tinyrand::{Rand, Seeded, Wyrand};
use tracing::{debug, warn};

use crate::inference::{Draws, Engine, InferenceFailedError, ModelInput, PosteriorSampleSet, SamplerOptions};
use crate::linear::Matrix;
use crate::model::template;
use crate::model::template::{CompileError, CompiledModel, ParamKind, Prior, Side, Term};
use crate::model::ModelIdentity;

const TARGET_ACCEPTANCE: f64 = 0.44;
const ADAPTATION_BATCH: u32 = 50;
const INIT_STEP: f64 = 0.25;
const INIT_RADIUS: f64 = 0.5;
const RHAT_WARNING: f64 = 1.1;

#[derive(Debug, Default, Clone)]
pub struct MetropolisEngine;

impl Engine for MetropolisEngine {
    type Artifact = CompiledModel;

    fn compile(&self, identity: &ModelIdentity) -> Result<Self::Artifact, CompileError> {
        template::compile(identity)
    }

    fn sample(
        &self,
        model: &CompiledModel,
        input: &ModelInput,
        options: &SamplerOptions,
    ) -> Result<PosteriorSampleSet, InferenceFailedError> {
        let layout = Layout::new(model, input)?;
        let (warmup, kept) = (options.warmup(), options.kept());
        if kept == 0 {
            return Err(InferenceFailedError(format!(
                "no draws remain after {warmup} warmup iterations of {}",
                options.iterations
            )));
        }
        if options.chains == 0 {
            return Err(InferenceFailedError("at least one chain is required".into()));
        }

        let chains = (0..options.chains)
            .into_par_iter()
            .map(|chain| {
                let mut rand = Wyrand::seed(options.seed.wrapping_add(chain as u64));
                run_chain(&layout, input, warmup, kept, &mut rand)
                    .map_err(|err| InferenceFailedError(format!("chain {chain}: {err}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        check_convergence(&layout, &chains, options.max_rhat)?;
        Ok(collect_draws(model, &layout, input.n_teams, chains))
    }
}

/// How a coordinate enters the log-rates of one game.
#[derive(Debug, Clone)]
struct Influence {
    game: usize,
    home: f64,
    away: f64,
}

/// Flattened view of a compiled model over a particular data set.
#[derive(Debug)]
struct Layout {
    offsets: Vec<usize>,
    names: Vec<String>,
    priors: Vec<Prior>,
    influences: Vec<Vec<Influence>>,
}
impl Layout {
    fn new(model: &CompiledModel, input: &ModelInput) -> Result<Self, InferenceFailedError> {
        let mut offsets = Vec::with_capacity(model.params.len());
        let mut names = vec![];
        let mut priors = vec![];
        for param in &model.params {
            offsets.push(names.len());
            match param.kind {
                ParamKind::Scalar => {
                    names.push(param.name.clone());
                    priors.push(param.prior.clone());
                }
                ParamKind::Team => {
                    for team in 1..=input.n_teams {
                        names.push(format!("{}[{team}]", param.name));
                        priors.push(param.prior.clone());
                    }
                }
            }
        }

        let mut influences = vec![vec![]; names.len()];
        let mut per_game = FxHashMap::<usize, (f64, f64)>::default();
        for game in 0..input.n_games {
            let teams = (input.home_team[game], input.away_team[game]);
            for &team in [teams.0, teams.1].iter() {
                if team == 0 || team as usize > input.n_teams {
                    return Err(InferenceFailedError(format!(
                        "team identifier {team} in game {game} outside 1..={}",
                        input.n_teams
                    )));
                }
            }
            per_game.clear();
            for term in &model.home_log_rate {
                per_game.entry(coordinate(&offsets, term, teams)).or_default().0 += sign(term);
            }
            for term in &model.away_log_rate {
                per_game.entry(coordinate(&offsets, term, teams)).or_default().1 += sign(term);
            }
            for (&coordinate, &(home, away)) in &per_game {
                if home != 0.0 || away != 0.0 {
                    influences[coordinate].push(Influence { game, home, away });
                }
            }
        }
        Ok(Self {
            offsets,
            names,
            priors,
            influences,
        })
    }

    fn dims(&self) -> usize {
        self.names.len()
    }
}

fn sign(term: &Term) -> f64 {
    if term.negated {
        -1.0
    } else {
        1.0
    }
}

fn coordinate(offsets: &[usize], term: &Term, (home, away): (u32, u32)) -> usize {
    let offset = offsets[term.param];
    match term.index {
        None => offset,
        Some(Side::Home) => offset + home as usize - 1,
        Some(Side::Away) => offset + away as usize - 1,
    }
}

/// Chain state: the parameter vector and the per-game log-rates it implies.
struct State {
    theta: Vec<f64>,
    eta_home: Vec<f64>,
    eta_away: Vec<f64>,
}
impl State {
    fn new(layout: &Layout, input: &ModelInput, theta: Vec<f64>) -> Self {
        let mut eta_home = vec![0.0; input.n_games];
        let mut eta_away = vec![0.0; input.n_games];
        for (coordinate, influences) in layout.influences.iter().enumerate() {
            for influence in influences {
                eta_home[influence.game] += influence.home * theta[coordinate];
                eta_away[influence.game] += influence.away * theta[coordinate];
            }
        }
        Self {
            theta,
            eta_home,
            eta_away,
        }
    }

    fn log_density(&self, layout: &Layout, input: &ModelInput) -> f64 {
        let log_prior = layout
            .priors
            .iter()
            .zip(&self.theta)
            .map(|(prior, &value)| prior.log_density(value))
            .sum::<f64>();
        let log_lik = (0..input.n_games)
            .map(|game| {
                poisson_kernel(input.home_goals[game], self.eta_home[game])
                    + poisson_kernel(input.away_goals[game], self.eta_away[game])
            })
            .sum::<f64>();
        log_prior + log_lik
    }

    /// Change in log density from moving `coordinate` by `delta`.
    fn delta(&self, layout: &Layout, input: &ModelInput, coordinate: usize, delta: f64) -> f64 {
        let value = self.theta[coordinate];
        let prior = &layout.priors[coordinate];
        let mut change = prior.log_density(value + delta) - prior.log_density(value);
        for influence in &layout.influences[coordinate] {
            let game = influence.game;
            let (eta_home, eta_away) = (self.eta_home[game], self.eta_away[game]);
            change += poisson_kernel(input.home_goals[game], eta_home + influence.home * delta)
                - poisson_kernel(input.home_goals[game], eta_home);
            change += poisson_kernel(input.away_goals[game], eta_away + influence.away * delta)
                - poisson_kernel(input.away_goals[game], eta_away);
        }
        change
    }

    fn apply(&mut self, layout: &Layout, coordinate: usize, delta: f64) {
        self.theta[coordinate] += delta;
        for influence in &layout.influences[coordinate] {
            self.eta_home[influence.game] += influence.home * delta;
            self.eta_away[influence.game] += influence.away * delta;
        }
    }
}

/// Poisson log-mass of `goals` at log-rate `eta`, without the `ln(goals!)` constant.
#[inline]
fn poisson_kernel(goals: u16, eta: f64) -> f64 {
    goals as f64 * eta - eta.exp()
}

#[inline]
fn uniform(rand: &mut impl Rand) -> f64 {
    ((rand.next_u64() >> 11) as f64 + 0.5) / (1u64 << 53) as f64
}

#[inline]
fn standard_normal(rand: &mut impl Rand) -> f64 {
    let (u1, u2) = (uniform(rand), uniform(rand));
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

struct ChainOutput {
    draws: Matrix<f64>,
    acceptance: f64,
}

fn run_chain(
    layout: &Layout,
    input: &ModelInput,
    warmup: u32,
    kept: u32,
    rand: &mut impl Rand,
) -> Result<ChainOutput, String> {
    let dims = layout.dims();
    let theta = (0..dims)
        .map(|_| (2.0 * uniform(rand) - 1.0) * INIT_RADIUS)
        .collect();
    let mut state = State::new(layout, input, theta);
    let init_density = state.log_density(layout, input);
    if !init_density.is_finite() {
        return Err(format!("log density {init_density} at initial values"));
    }

    let mut steps = vec![INIT_STEP; dims];
    let mut batch_accepted = vec![0u32; dims];
    let mut batches = 0;
    let mut accepted = 0u64;
    let mut draws = Matrix::allocate(kept as usize, dims);

    for iteration in 0..warmup + kept {
        let sampling = iteration >= warmup;
        for coordinate in 0..dims {
            let delta = steps[coordinate] * standard_normal(rand);
            let change = state.delta(layout, input, coordinate, delta);
            if change.is_finite() && uniform(rand).ln() < change {
                state.apply(layout, coordinate, delta);
                if sampling {
                    accepted += 1;
                } else {
                    batch_accepted[coordinate] += 1;
                }
            }
        }

        if !sampling && (iteration + 1) % ADAPTATION_BATCH == 0 {
            batches += 1;
            let adjustment = f64::min(0.5, 1.0 / f64::sqrt(batches as f64));
            for (step, batch) in steps.iter_mut().zip(batch_accepted.iter_mut()) {
                let rate = *batch as f64 / ADAPTATION_BATCH as f64;
                if rate > TARGET_ACCEPTANCE {
                    *step *= adjustment.exp();
                } else {
                    *step /= adjustment.exp();
                }
                *batch = 0;
            }
        }

        if sampling {
            let row = (iteration - warmup) as usize;
            draws.row_slice_mut(row).copy_from_slice(&state.theta);
        }
    }

    if dims > 0 && accepted == 0 {
        return Err("no proposal was accepted after warmup".into());
    }
    let final_density = state.log_density(layout, input);
    if !final_density.is_finite() {
        return Err(format!("log density {final_density} at final values"));
    }
    let acceptance = if dims == 0 {
        1.0
    } else {
        accepted as f64 / (kept as u64 * dims as u64) as f64
    };
    Ok(ChainOutput { draws, acceptance })
}

/// Potential scale reduction of one coordinate across chains.
fn rhat(chains: &[ChainOutput], coordinate: usize) -> Option<f64> {
    let m = chains.len();
    let n = chains.first()?.draws.rows();
    if m < 2 || n < 2 {
        return None;
    }
    let (means, variances): (Vec<f64>, Vec<f64>) = chains
        .iter()
        .map(|chain| {
            let mean = chain.draws.col_iter(coordinate).sum::<f64>() / n as f64;
            let variance = chain
                .draws
                .col_iter(coordinate)
                .map(|value| (value - mean).powi(2))
                .sum::<f64>()
                / (n - 1) as f64;
            (mean, variance)
        })
        .unzip();
    let within = variances.iter().sum::<f64>() / m as f64;
    if within <= 0.0 {
        return None;
    }
    let grand_mean = means.iter().sum::<f64>() / m as f64;
    let between = n as f64 * means.iter().map(|mean| (mean - grand_mean).powi(2)).sum::<f64>() / (m - 1) as f64;
    let pooled = (n - 1) as f64 / n as f64 * within + between / n as f64;
    Some((pooled / within).sqrt())
}

fn check_convergence(
    layout: &Layout,
    chains: &[ChainOutput],
    max_rhat: Option<f64>,
) -> Result<(), InferenceFailedError> {
    for (chain, output) in chains.iter().enumerate() {
        debug!("chain {chain}: acceptance rate {:.3}", output.acceptance);
    }
    let worst = (0..layout.dims())
        .filter_map(|coordinate| rhat(chains, coordinate).map(|rhat| (coordinate, rhat)))
        .max_by(|(_, a), (_, b)| a.total_cmp(b));
    let Some((coordinate, worst)) = worst else {
        return Ok(());
    };
    let name = &layout.names[coordinate];
    debug!("largest R-hat {worst:.3} for {name}");
    match max_rhat {
        Some(max_rhat) if worst > max_rhat => Err(InferenceFailedError(format!(
            "R-hat {worst:.3} for {name} exceeds {max_rhat}"
        ))),
        _ => {
            if worst > RHAT_WARNING {
                warn!("chains have not mixed: R-hat {worst:.3} for {name}; consider more iterations");
            }
            Ok(())
        }
    }
}

fn collect_draws(
    model: &CompiledModel,
    layout: &Layout,
    n_teams: usize,
    chains: Vec<ChainOutput>,
) -> PosteriorSampleSet {
    let mut chains = chains.into_iter();
    let mut combined = match chains.next() {
        Some(first) => first.draws,
        None => Matrix::with_cols(layout.dims()),
    };
    for chain in chains {
        combined.append(chain.draws);
    }

    model
        .params
        .iter()
        .zip(&layout.offsets)
        .map(|(param, &offset)| {
            let draws = match param.kind {
                ParamKind::Scalar => Draws::Scalar(combined.col_to_vec(offset)),
                ParamKind::Team => {
                    let mut matrix = Matrix::with_cols(n_teams);
                    for row in 0..combined.rows() {
                        matrix.push_row(&combined.row_slice(row)[offset..offset + n_teams]);
                    }
                    Draws::Team(matrix)
                }
            };
            (param.name.clone(), draws)
        })
        .collect()
}
