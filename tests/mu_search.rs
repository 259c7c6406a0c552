//! Trade-off weight search: candidate grids, bracketing and failure handling.

use std::cell::Cell;

use rand::rngs::StdRng;
use rand::SeedableRng;

use adversarial_regulariser::config::StartingPoint;
use adversarial_regulariser::core::{disk_phantom, Signal};
use adversarial_regulariser::critic::TotalVariation;
use adversarial_regulariser::data::simulate_measurement;
use adversarial_regulariser::error::ReconError;
use adversarial_regulariser::eval::NegativeL2;
use adversarial_regulariser::forward::Denoising;
use adversarial_regulariser::optim::{
    calibrate_mu, MuSearch, ReconstructionSchedule, Reconstructor, SearchStrategy,
};

/// Unimodal in log(mu), peaking at `peak`.
fn unimodal(mu: f32, peak: f32) -> f64 {
    let d = (mu.ln() - peak.ln()) as f64;
    -d * d
}

#[test]
fn test_candidate_search_picks_peak() {
    let search =
        MuSearch::new(SearchStrategy::Candidates(vec![0.1, 0.3, 1.0, 3.0])).unwrap();
    let out = search.run(|mu| Ok(unimodal(mu, 0.3))).unwrap();
    assert_eq!(out.best_mu, 0.3);
    assert_eq!(out.trials.len(), 4);
    assert!(out.trials.iter().all(|t| t.score.is_some()));
}

#[test]
fn test_geometric_search_evaluates_every_candidate_once() {
    let calls = Cell::new(0);
    let search = MuSearch::new(SearchStrategy::Geometric {
        min: 0.01,
        max: 10.0,
        count: 7,
    })
    .unwrap();
    let out = search
        .run(|mu| {
            calls.set(calls.get() + 1);
            Ok(unimodal(mu, 0.1))
        })
        .unwrap();
    assert_eq!(calls.get(), 7);
    assert!((out.best_mu - 0.1).abs() < 1e-3, "best {}", out.best_mu);
}

#[test]
fn test_bracket_search_converges_in_log_space() {
    let search = MuSearch::new(SearchStrategy::Bracket {
        lo: 0.001,
        hi: 100.0,
        iterations: 25,
    })
    .unwrap();
    let out = search.run(|mu| Ok(unimodal(mu, 0.7))).unwrap();
    assert!(
        (out.best_mu.ln() - 0.7f32.ln()).abs() < 0.05,
        "best {}",
        out.best_mu
    );
}

#[test]
fn test_failed_candidates_are_recorded_and_skipped() {
    let search =
        MuSearch::new(SearchStrategy::Candidates(vec![0.1, 0.3, 1.0, 3.0])).unwrap();
    let out = search
        .run(|mu| {
            if mu > 0.5 {
                Err(ReconError::instability(4, "iterate is not finite"))
            } else {
                Ok(unimodal(mu, 3.0))
            }
        })
        .unwrap();
    assert_eq!(out.best_mu, 0.3);
    let failed: Vec<f32> = out
        .trials
        .iter()
        .filter(|t| t.score.is_none())
        .map(|t| t.mu)
        .collect();
    assert_eq!(failed, vec![1.0, 3.0]);
}

#[test]
fn test_all_failures_exhaust_search() {
    let search = MuSearch::new(SearchStrategy::Candidates(vec![0.1, 1.0])).unwrap();
    let err = search.run(|_| Ok(f64::NAN)).unwrap_err();
    assert!(matches!(err, ReconError::SearchExhausted { tried: 2 }));
}

#[test]
fn test_fatal_errors_abort_search() {
    let search = MuSearch::new(SearchStrategy::Candidates(vec![0.1, 1.0])).unwrap();
    let err = search
        .run(|_| Err(ReconError::Configuration("broken".into())))
        .unwrap_err();
    assert!(matches!(err, ReconError::Configuration(_)));
}

#[test]
fn test_calibrate_mu_on_tv_denoising() {
    let model = Denoising::new(24).unwrap();
    let tv = TotalVariation::new(0.05).unwrap();
    let engine = Reconstructor::new(&model, Some(&tv));
    let mut rng = StdRng::seed_from_u64(21);

    let truths: Vec<Signal> = vec![disk_phantom(24, 0.5, 1.0), disk_phantom(24, 0.3, 0.6)];
    let measurements: Vec<Signal> = truths
        .iter()
        .map(|t| simulate_measurement(&model, t, 0.1, &mut rng).unwrap())
        .collect();

    let schedule = ReconstructionSchedule {
        total_steps: 60,
        step_size: 0.1,
        step_size_decay: 1.0,
        decay_every: 10,
        mu: 0.0,
        starting_point: StartingPoint::Baseline,
        mini_steps: 5,
        early_stop: None,
        snapshot_every: None,
    };
    let out = calibrate_mu(
        &engine,
        &schedule,
        &truths,
        &measurements,
        &NegativeL2,
        SearchStrategy::Candidates(vec![0.0, 0.02, 0.05]),
    )
    .unwrap();

    // Some regularization beats none on noisy data.
    assert!(out.best_mu > 0.0, "best mu {}", out.best_mu);
    assert_eq!(out.trials.len(), 3);
}
