//! End-to-end reconstruction scenarios on small problems.

use rand::rngs::StdRng;
use rand::SeedableRng;

use adversarial_regulariser::config::StartingPoint;
use adversarial_regulariser::core::{disk_phantom, distance, Signal};
use adversarial_regulariser::critic::{Regularizer, TotalVariation};
use adversarial_regulariser::data::simulate_measurement;
use adversarial_regulariser::error::{ReconError, Result};
use adversarial_regulariser::forward::{Denoising, ForwardModel, Tomography};
use adversarial_regulariser::optim::{ReconstructionSchedule, Reconstructor};

fn schedule(total_steps: usize, step_size: f32, mu: f32, start: StartingPoint) -> ReconstructionSchedule {
    ReconstructionSchedule {
        total_steps,
        step_size,
        step_size_decay: 1.0,
        decay_every: 10,
        mu,
        starting_point: start,
        mini_steps: 10,
        early_stop: None,
        snapshot_every: None,
    }
}

/// Regularizer whose gradient is NaN everywhere.
struct PoisonedRegularizer;

impl Regularizer for PoisonedRegularizer {
    fn name(&self) -> &str {
        "poisoned"
    }

    fn value(&self, _x: &Signal) -> Result<f32> {
        Ok(f32::NAN)
    }

    fn gradient(&self, x: &Signal) -> Result<Signal> {
        Ok(x.map(|_| f32::NAN))
    }
}

#[test]
fn test_identity_single_step_returns_measurement() {
    let model = Denoising::new(16).unwrap();
    let truth = disk_phantom(16, 0.5, 0.8);
    let mut rng = StdRng::seed_from_u64(0);
    let y = simulate_measurement(&model, &truth, 0.0, &mut rng).unwrap();

    let engine = Reconstructor::new(&model, None);
    let rec = engine
        .reconstruct(&y, &schedule(1, 1.0, 0.0, StartingPoint::Zero))
        .unwrap();
    assert_eq!(rec.iterate, y);
    assert_eq!(rec.steps_run, 1);
}

#[test]
fn test_unregularized_descent_is_monotone() {
    let model = Tomography::new(16, 10).unwrap();
    let truth = disk_phantom(16, 0.5, 1.0);
    let mut rng = StdRng::seed_from_u64(1);
    let y = simulate_measurement(&model, &truth, 0.01, &mut rng).unwrap();

    let engine = Reconstructor::new(&model, None);
    let rec = engine
        .reconstruct(&y, &schedule(30, 0.5, 0.0, StartingPoint::Baseline))
        .unwrap();
    assert_eq!(rec.objective_trace.len(), 31);
    for (k, pair) in rec.objective_trace.windows(2).enumerate() {
        assert!(
            pair[1] <= pair[0] * (1.0 + 1e-6) + 1e-9,
            "fidelity increased at step {k}: {} -> {}",
            pair[0],
            pair[1]
        );
    }
}

#[test]
fn test_nan_regularizer_reports_step() {
    let model = Denoising::new(8).unwrap();
    let y = Signal::from_element(8, 8, 0.5);
    let reg = PoisonedRegularizer;
    let engine = Reconstructor::new(&model, Some(&reg));
    match engine.reconstruct(&y, &schedule(5, 0.5, 0.1, StartingPoint::Baseline)) {
        Err(ReconError::NumericalInstability { step, what }) => {
            assert_eq!(step, 0);
            assert!(what.contains("poisoned"), "{what}");
        }
        other => panic!("expected NumericalInstability, got {other:?}"),
    }
}

#[test]
fn test_early_stop_matches_short_run() {
    let model = Tomography::new(12, 6).unwrap();
    let truth = disk_phantom(12, 0.4, 1.0);
    let y = model.forward(&truth).unwrap();
    let engine = Reconstructor::new(&model, None);

    let capped = schedule(40, 0.5, 0.0, StartingPoint::Zero).with_early_stop(5);
    let short = schedule(5, 0.5, 0.0, StartingPoint::Zero);
    let a = engine.reconstruct(&y, &capped).unwrap();
    let b = engine.reconstruct(&y, &short).unwrap();
    assert_eq!(a.steps_run, 5);
    assert_eq!(a.iterate, b.iterate);
}

#[test]
fn test_mini_start_improves_on_zero_start() {
    let model = Tomography::new(16, 10).unwrap();
    let truth = disk_phantom(16, 0.5, 1.0);
    let y = model.forward(&truth).unwrap();
    let engine = Reconstructor::new(&model, None);

    let s = schedule(1, 0.5, 0.0, StartingPoint::Zero);
    let zero = engine.initial_guess(&y, &s).unwrap();
    let mini = engine
        .initial_guess(&y, &s.clone().with_starting_point(StartingPoint::Mini))
        .unwrap();
    assert!(zero.iter().all(|v| *v == 0.0));
    assert!(distance(&mini, &truth) < distance(&zero, &truth));
}

#[test]
fn test_tv_denoising_improves_on_noisy_input() {
    let model = Denoising::new(32).unwrap();
    let truth = disk_phantom(32, 0.5, 1.0);
    let mut rng = StdRng::seed_from_u64(7);
    let y = simulate_measurement(&model, &truth, 0.1, &mut rng).unwrap();

    let tv = TotalVariation::new(0.05).unwrap();
    let engine = Reconstructor::new(&model, Some(&tv));
    let rec = engine
        .reconstruct(&y, &schedule(100, 0.1, 0.05, StartingPoint::Baseline))
        .unwrap();

    let before = distance(&y, &truth);
    let after = distance(&rec.iterate, &truth);
    assert!(after < 0.9 * before, "TV error {after} vs noisy {before}");
}

#[test]
fn test_batch_reconstruction_matches_sequential() {
    let model = Denoising::new(8).unwrap();
    let tv = TotalVariation::new(0.1).unwrap();
    let engine = Reconstructor::new(&model, Some(&tv));
    let mut rng = StdRng::seed_from_u64(9);
    let ys: Vec<Signal> = (0..3)
        .map(|_| simulate_measurement(&model, &disk_phantom(8, 0.5, 1.0), 0.05, &mut rng).unwrap())
        .collect();
    let s = schedule(10, 0.2, 0.1, StartingPoint::Baseline);
    let batch = engine.reconstruct_batch(&ys, &s).unwrap();
    for (y, rec) in ys.iter().zip(&batch) {
        assert_eq!(engine.reconstruct(y, &s).unwrap().iterate, rec.iterate);
    }
}
