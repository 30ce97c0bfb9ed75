//! Monte-Carlo analysis over component tolerances.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::analysis::CancelToken;
use crate::engine::Engine;
use crate::error::{Error, Result};

const HISTOGRAM_BINS: usize = 16;

/// Summary statistics over the per-run scalar outcomes.
#[derive(Debug, Clone, PartialEq)]
pub struct MonteCarloStats {
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub p1: f64,
    pub p99: f64,
    pub histogram: Vec<usize>,
    pub samples: Vec<f64>,
}

/// Run `runs` independent trials, perturbing every tolerance-tagged
/// parameter by up to ±`tolerance_pct`, simulating `duration` seconds and
/// reducing each trial with `extractor`.
///
/// Trials are seeded individually from the engine's base seed, so the
/// result is reproducible no matter how rayon schedules them.
pub fn run_monte_carlo<F>(
    engine: &Engine,
    runs: usize,
    tolerance_pct: f64,
    duration: f64,
    extractor: F,
    cancel: &CancelToken,
) -> Result<MonteCarloStats>
where
    F: Fn(&Engine) -> f64 + Sync,
{
    let outcomes: Vec<Result<f64>> = (0..runs)
        .into_par_iter()
        .map(|run| {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let mut eng = engine.clone();
            let mut rng = StdRng::seed_from_u64(engine.mc_seed.wrapping_add(run as u64));
            for comp in eng.circuit.components.values_mut() {
                let u: f64 = rng.gen_range(-1.0..=1.0);
                comp.device.perturb(1.0 + tolerance_pct / 100.0 * u);
            }
            eng.reset();
            eng.run_for(duration)?;
            Ok(extractor(&eng))
        })
        .collect();

    let samples = outcomes.into_iter().collect::<Result<Vec<f64>>>()?;
    Ok(summarize(samples))
}

fn summarize(samples: Vec<f64>) -> MonteCarloStats {
    let n = samples.len().max(1) as f64;
    let mean = samples.iter().sum::<f64>() / n;
    let var = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;

    let mut sorted = samples.clone();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let percentile = |p: f64| -> f64 {
        if sorted.is_empty() {
            return 0.0;
        }
        let idx = (p / 100.0 * (sorted.len() - 1) as f64).round() as usize;
        sorted[idx.min(sorted.len() - 1)]
    };

    let min = sorted.first().copied().unwrap_or(0.0);
    let max = sorted.last().copied().unwrap_or(0.0);
    let span = (max - min).max(f64::MIN_POSITIVE);
    let mut histogram = vec![0usize; HISTOGRAM_BINS];
    for &s in &samples {
        let bin = ((s - min) / span * HISTOGRAM_BINS as f64) as usize;
        histogram[bin.min(HISTOGRAM_BINS - 1)] += 1;
    }

    MonteCarloStats {
        mean,
        std_dev: var.sqrt(),
        min,
        max,
        p1: percentile(1.0),
        p99: percentile(99.0),
        histogram,
        samples,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_statistics() {
        let stats = summarize((1..=100).map(|i| i as f64).collect());
        assert!((stats.mean - 50.5).abs() < 1e-12);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 100.0);
        assert!(stats.p1 <= 2.0);
        assert!(stats.p99 >= 99.0);
        assert_eq!(stats.histogram.iter().sum::<usize>(), 100);
    }

    #[test]
    fn test_constant_samples() {
        let stats = summarize(vec![5.0; 10]);
        assert_eq!(stats.std_dev, 0.0);
        assert_eq!(stats.p1, 5.0);
        assert_eq!(stats.histogram[0], 10);
    }
}
