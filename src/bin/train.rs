//! ar-train: train an adversarial critic and reconstruct with it
//!
//! Usage:
//!   ar-train --config experiment.json --iterations 200 --checkpoint runs/critic.ckpt --calibrate

use adversarial_regulariser::config::ExperimentConfig;
use adversarial_regulariser::critic::{ConvCritic, Regularizer};
use adversarial_regulariser::data::{DataSource, PhantomSource, Split};
use adversarial_regulariser::eval::{evaluate_reconstruction, Psnr};
use adversarial_regulariser::forward::build_forward_model;
use adversarial_regulariser::io::{CheckpointStore, FileCheckpointStore};
use adversarial_regulariser::optim::{
    calibrate_mu, AdversarialTrainer, Reconstructor, SearchStrategy,
};
use adversarial_regulariser::telemetry::init_tracing;
use anyhow::Context;
use clap::{Parser, ValueHint};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Adversarial regularizer training and reconstruction"
)]
struct Cli {
    /// Experiment configuration (JSON); defaults are used when omitted
    #[arg(long, value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// Successful critic updates to run
    #[arg(long, default_value_t = 100)]
    iterations: usize,

    /// Checkpoint file, resumed from when it exists
    #[arg(long, value_hint = ValueHint::FilePath)]
    checkpoint: Option<PathBuf>,

    /// Calibrate mu on a held-out batch after training
    #[arg(long)]
    calibrate: bool,

    /// Held-out batch size for calibration and evaluation
    #[arg(long, default_value_t = 4)]
    eval_batch: usize,
}

fn main() -> anyhow::Result<()> {
    init_tracing().context("installing tracing subscriber")?;
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ExperimentConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ExperimentConfig::default(),
    };
    config.validate()?;
    info!(name = %config.name, problem = ?config.problem, "starting experiment");

    let model = build_forward_model(&config.problem).context("building forward model")?;
    let mut rng = StdRng::seed_from_u64(config.seed);
    let critic = ConvCritic::from_config(&config.critic, model.signal_shape(), &mut rng)?;

    let mut source = PhantomSource::new(model.as_ref(), config.noise_level, config.seed)?;
    let mut trainer = AdversarialTrainer::new(model.as_ref(), critic, config.clone())?;

    let store = cli.checkpoint.clone().map(FileCheckpointStore::new);
    if let Some(store) = &store {
        if trainer.resume(store)? {
            info!(path = %store.path().display(), "resuming");
        }
    }

    let summary = trainer
        .train(
            &mut source,
            cli.iterations,
            store.as_ref().map(|s| s as &dyn CheckpointStore),
        )
        .context("training critic")?;
    info!(
        completed = summary.completed,
        skipped = summary.skipped,
        iteration = summary.final_iteration,
        "training finished"
    );

    let critic = trainer.into_critic();
    let regularizer: &dyn Regularizer = &critic;
    let engine = Reconstructor::new(model.as_ref(), Some(regularizer));
    let held_out = source.next_batch(cli.eval_batch.max(1), Split::Evaluation)?;

    if cli.calibrate {
        let centre = if config.mu > 0.0 { config.mu } else { 0.1 };
        let outcome = calibrate_mu(
            &engine,
            &config.schedule(),
            &held_out.signals,
            &held_out.measurements,
            &Psnr::default(),
            SearchStrategy::Geometric {
                min: centre / 10.0,
                max: centre * 10.0,
                count: 7,
            },
        )
        .context("calibrating mu")?;
        info!(mu = outcome.best_mu, psnr = outcome.best_score, "calibrated mu");
        config.mu = outcome.best_mu;
    }

    let schedule = config.schedule().with_snapshots(config.log_interval);
    let rec = engine.reconstruct(&held_out.measurements[0], &schedule)?;
    evaluate_reconstruction(&Psnr::default(), &held_out.signals[0], &held_out.baselines[0], &rec)?;

    Ok(())
}
