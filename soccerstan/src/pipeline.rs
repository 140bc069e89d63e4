//! End-to-end fitting: normalise, build, sample, reindex. Each stage runs to completion before
//! the next begins, and the first error ends the fit.

use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::info;

use crate::cache::{ArtifactStore, BuildError, CacheStats, ModelBuilder};
use crate::data::{normalize, MalformedScoreError, NormalizedDataset, RawTable};
use crate::inference::{Engine, InferenceFailedError, SamplerOptions};
use crate::model::ModelIdentity;
use crate::reindex::{reindex, ReindexError, ResultTable};
use crate::inference;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    /// Reuse and persist compiled models through the store.
    pub use_cache: bool,
    /// Compile afresh and overwrite the stored model, whatever the store holds.
    pub rebuild: bool,
    pub sampler: SamplerOptions,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0}")]
    MalformedScore(#[from] MalformedScoreError),

    #[error("{0}")]
    Build(#[from] BuildError),

    #[error("{0}")]
    InferenceFailed(#[from] InferenceFailedError),

    #[error("{0}")]
    Reindex(#[from] ReindexError),
}

#[derive(Debug)]
pub struct FitOutcome {
    pub dataset: NormalizedDataset,
    pub tables: FxHashMap<String, ResultTable>,
    pub cache_stats: CacheStats,
}

pub fn fit<E: Engine, S: ArtifactStore>(
    engine: &E,
    store: S,
    identity: &ModelIdentity,
    table: &RawTable,
    config: &Config,
) -> Result<FitOutcome, PipelineError> {
    let dataset = normalize(table)?;
    info!(
        "normalised {} rows into {} played games between {} teams",
        table.rows.len(),
        dataset.num_games(),
        dataset.num_teams()
    );

    let mut builder = ModelBuilder::new(engine, store);
    let artifact = if config.rebuild {
        builder.rebuild(identity)?
    } else {
        builder.build(identity, config.use_cache)?
    };
    let cache_stats = builder.stats().clone();

    let samples = inference::run(
        engine,
        &artifact,
        identity,
        &dataset.records,
        &dataset.encoding,
        &config.sampler,
    )?;
    let tables = reindex(samples, &dataset.encoding, &identity.team_parameters)?;
    Ok(FitOutcome {
        dataset,
        tables,
        cache_stats,
    })
}
