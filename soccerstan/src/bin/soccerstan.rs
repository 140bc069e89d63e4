use std::env;
use std::error::Error;
use std::path::PathBuf;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, bail};
use clap::Parser;
use stanza::renderer::console::Console;
use stanza::renderer::Renderer;
use tracing::{debug, info};

use soccerstan::cache::DirStore;
use soccerstan::inference::metropolis::MetropolisEngine;
use soccerstan::inference::SamplerOptions;
use soccerstan::model::ModelIdentity;
use soccerstan::summary::ParamSummary;
use soccerstan::{csv, export, model, pipeline, print, summary};

const DEFAULT_CACHE_DIR: &str = "cache";

#[derive(Debug, clap::Parser, Clone)]
struct Args {
    /// CSV file of match results
    data: PathBuf,

    /// name of the model to fit
    model: String,

    /// reuse compiled models across runs
    #[clap(long)]
    cache: bool,

    /// directory holding compiled models
    #[clap(long = "cache-dir", default_value = DEFAULT_CACHE_DIR)]
    cache_dir: PathBuf,

    /// recompile the model and overwrite the cached copy
    #[clap(long)]
    rebuild: bool,

    /// number of chains
    #[clap(long, default_value_t = 4)]
    chains: u32,

    /// iterations per chain, warmup included
    #[clap(long = "iter", default_value_t = 2_000)]
    iterations: u32,

    /// warmup iterations per chain (half of the iterations if unset)
    #[clap(long)]
    warmup: Option<u32>,

    /// seed of the first chain (derived from the clock if unset)
    #[clap(long)]
    seed: Option<u64>,

    /// fail if any parameter's R-hat exceeds this value
    #[clap(long = "max-rhat")]
    max_rhat: Option<f64>,

    /// the reported intervals cover 1 - alpha of the posterior
    #[clap(long, default_value_t = 0.05)]
    alpha: f64,

    /// JSON file defining a custom model
    #[clap(long = "model-file")]
    model_file: Option<PathBuf>,

    /// directory to export draws and summaries to
    #[clap(long)]
    out: Option<PathBuf>,
}
impl Args {
    fn validate(&self) -> anyhow::Result<()> {
        if self.chains == 0 {
            bail!("at least one chain is required");
        }
        if self.iterations == 0 {
            bail!("the iteration count must be positive");
        }
        if let Some(warmup) = self.warmup {
            if warmup >= self.iterations {
                bail!("warmup ({warmup}) must be less than the iteration count ({})", self.iterations);
            }
        }
        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            bail!("alpha must lie strictly between 0 and 1");
        }
        if let Some(max_rhat) = self.max_rhat {
            if max_rhat.is_nan() || max_rhat < 1.0 {
                bail!("max-rhat must be at least 1");
            }
        }
        if self.rebuild && !self.cache {
            bail!("--rebuild requires --cache");
        }
        Ok(())
    }

    fn seed(&self) -> u64 {
        self.seed.unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|elapsed| elapsed.as_nanos() as u64)
                .unwrap_or_default()
        })
    }
}

fn resolve_model(args: &Args) -> anyhow::Result<ModelIdentity> {
    if let Some(model_file) = &args.model_file {
        let identity = ModelIdentity::from_json_file(model_file)?;
        if identity.name != args.model {
            bail!(
                "{} defines model '{}', not '{}'",
                model_file.display(),
                identity.name,
                args.model
            );
        }
        return Ok(identity);
    }
    model::lookup(&args.model).ok_or_else(|| {
        let available = model::builtin()
            .into_iter()
            .map(|identity| identity.name)
            .collect::<Vec<_>>();
        anyhow!(
            "unknown model '{}'; available models: {}",
            args.model,
            available.join(", ")
        )
    })
}

fn main() -> Result<(), Box<dyn Error>> {
    if env::var("RUST_BACKTRACE").is_err() {
        env::set_var("RUST_BACKTRACE", "full")
    }
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info")
    }
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    args.validate()?;
    debug!("args: {args:?}");

    let identity = resolve_model(&args)?;
    let table = csv::read_table_file(&args.data)?;
    let config = pipeline::Config {
        use_cache: args.cache,
        rebuild: args.rebuild,
        sampler: SamplerOptions {
            iterations: args.iterations,
            chains: args.chains,
            warmup: args.warmup,
            seed: args.seed(),
            max_rhat: args.max_rhat,
        },
    };
    info!("seed: {}", config.sampler.seed);

    let start_time = Instant::now();
    let outcome = pipeline::fit(
        &MetropolisEngine,
        DirStore::new(&args.cache_dir),
        &identity,
        &table,
        &config,
    )?;
    debug!("cache stats: {:?}", outcome.cache_stats);

    let summaries = summary::summarise_tables(&outcome.tables, args.alpha);
    info!(
        "{} parameters:\n{}",
        identity.name,
        Console::default().render(&print::tabulate_scalars(&summaries, args.alpha))
    );
    for (name, summary) in &summaries {
        if let ParamSummary::Team(teams) = summary {
            info!(
                "{name}:\n{}",
                Console::default().render(&print::tabulate_teams(name, teams, args.alpha))
            );
        }
    }

    if let Some(out) = &args.out {
        export::export(out, &identity.name, &outcome.tables, &summaries)?;
    }
    info!("took {:.3}s", start_time.elapsed().as_secs_f64());
    Ok(())
}
