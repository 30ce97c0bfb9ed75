//! Parameter sweeps: repeat a fixed-duration transient across a range of
//! one component parameter and reduce each run to a scalar.

use rayon::prelude::*;

use voltlab_core::error::Error as CircuitError;

use crate::analysis::CancelToken;
use crate::circuit::ComponentId;
use crate::engine::Engine;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepPoint {
    pub param: f64,
    pub output: f64,
}

/// Sweep `field` of `component` over `[start, end]` in `num` points.
pub fn run_sweep<F>(
    engine: &Engine,
    component: ComponentId,
    field: &str,
    start: f64,
    end: f64,
    num: usize,
    log_scale: bool,
    duration: f64,
    extractor: F,
    cancel: &CancelToken,
) -> Result<Vec<SweepPoint>>
where
    F: Fn(&Engine) -> f64 + Sync,
{
    if log_scale && (start <= 0.0 || end <= 0.0) {
        return Err(CircuitError::ParameterOutOfRange {
            field: field.to_string(),
            value: start,
            reason: "log sweep needs positive endpoints".into(),
        }
        .into());
    }
    // Probe the field once so bad names fail before any trial runs.
    engine.circuit.get_parameter(component, field)?;

    let values: Vec<f64> = (0..num)
        .map(|k| {
            let f = if num > 1 {
                k as f64 / (num - 1) as f64
            } else {
                0.0
            };
            if log_scale {
                start * (end / start).powf(f)
            } else {
                start + (end - start) * f
            }
        })
        .collect();

    values
        .par_iter()
        .map(|&value| {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let mut eng = engine.clone();
            eng.set_parameter(component, field, value)?;
            eng.reset();
            eng.run_for(duration)?;
            Ok(SweepPoint {
                param: value,
                output: extractor(&eng),
            })
        })
        .collect()
}
