//! Frequency response by swept transient.
//!
//! For each of K log-spaced frequencies the stimulus is retuned, the
//! circuit runs long enough to reach steady state, and the output probe's
//! last full period is correlated against sin/cos at the test frequency.
//! No small-signal linearisation is involved, so the sweep sees the
//! circuit's real large-signal behaviour.

use rayon::prelude::*;

use voltlab_core::error::Error as CircuitError;

use crate::analysis::CancelToken;
use crate::circuit::{ComponentId, ProbeId};
use crate::engine::Engine;
use crate::error::{Error, Result};

/// Samples per period of the test tone.
const SAMPLES_PER_PERIOD: usize = 256;
/// Periods simulated before the measurement window.
const SETTLE_PERIODS: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodePoint {
    pub frequency: f64,
    pub magnitude_db: f64,
    pub phase_deg: f64,
}

/// Run a Bode sweep of `stimulus` → `probe` over `[f_start, f_stop]`.
pub fn run_bode(
    engine: &Engine,
    stimulus: ComponentId,
    probe: ProbeId,
    f_start: f64,
    f_stop: f64,
    num_points: usize,
    cancel: &CancelToken,
) -> Result<Vec<BodePoint>> {
    if f_start <= 0.0 || f_stop <= f_start {
        return Err(CircuitError::ParameterOutOfRange {
            field: "f_start/f_stop".into(),
            value: f_start,
            reason: "need 0 < f_start < f_stop".into(),
        }
        .into());
    }
    let comp = engine
        .circuit
        .components
        .get(&stimulus)
        .ok_or(CircuitError::UnknownComponent(stimulus))?;
    let input_amplitude = comp
        .device
        .waveform()
        .and_then(|w| w.base_amplitude())
        .filter(|a| *a != 0.0)
        .ok_or_else(|| CircuitError::InvalidTopology("stimulus has no drive amplitude".into()))?;
    if !engine.circuit.probes.contains_key(&probe) {
        return Err(CircuitError::UnknownProbe(probe).into());
    }

    let ratio = f_stop / f_start;
    let freqs: Vec<f64> = (0..num_points)
        .map(|k| {
            let f = if num_points > 1 {
                k as f64 / (num_points - 1) as f64
            } else {
                0.0
            };
            f_start * ratio.powf(f)
        })
        .collect();

    freqs
        .par_iter()
        .map(|&f| {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            measure_one(engine, stimulus, probe, f, input_amplitude)
        })
        .collect()
}

fn measure_one(
    engine: &Engine,
    stimulus: ComponentId,
    probe: ProbeId,
    f: f64,
    input_amplitude: f64,
) -> Result<BodePoint> {
    let mut eng = engine.clone();
    eng.set_adaptive(false, 1e-3);
    eng.set_timestep(1.0 / (f * SAMPLES_PER_PERIOD as f64))?;
    if let Some(comp) = eng.circuit.components.get_mut(&stimulus) {
        if let Some(wf) = comp.device.waveform_mut() {
            wf.set_frequency(f);
        }
    }
    eng.reset();
    eng.run_for((SETTLE_PERIODS + 1) as f64 / f)?;

    // Correlate the last full period against the test tone.
    let samples = eng.history(probe, SAMPLES_PER_PERIOD)?;
    let n = samples.len() as f64;
    let mut in_phase = 0.0;
    let mut quadrature = 0.0;
    for &(t, v) in &samples {
        let arg = 2.0 * std::f64::consts::PI * f * t;
        in_phase += v * arg.sin();
        quadrature += v * arg.cos();
    }
    in_phase *= 2.0 / n;
    quadrature *= 2.0 / n;

    let amplitude = in_phase.hypot(quadrature);
    let mut phase_deg = quadrature.atan2(in_phase).to_degrees();
    if phase_deg > 180.0 {
        phase_deg -= 360.0;
    }

    Ok(BodePoint {
        frequency: f,
        magnitude_db: 20.0 * (amplitude / input_amplitude.abs()).log10(),
        phase_deg,
    })
}
