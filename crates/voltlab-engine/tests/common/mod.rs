//! Shared helpers for the engine integration tests.
#![allow(dead_code)]

use voltlab_engine::{ComponentId, Endpoint, Engine};

/// Wire two component terminals together.
pub fn connect(engine: &mut Engine, a: (ComponentId, usize), b: (ComponentId, usize)) {
    engine
        .add_wire(
            Endpoint::Terminal {
                component: a.0,
                terminal: a.1,
            },
            Endpoint::Terminal {
                component: b.0,
                terminal: b.1,
            },
        )
        .expect("wiring valid terminals");
}

/// Sample from `history` closest to time `t`.
pub fn value_at(history: &[(f64, f64)], t: f64) -> f64 {
    history
        .iter()
        .min_by(|a, b| (a.0 - t).abs().total_cmp(&(b.0 - t).abs()))
        .map(|&(_, v)| v)
        .expect("non-empty history")
}

/// Rising/falling crossing times of `level` in a history.
pub fn crossings(history: &[(f64, f64)], level: f64) -> Vec<(f64, bool)> {
    let mut out = Vec::new();
    for pair in history.windows(2) {
        let (t0, v0) = pair[0];
        let (t1, v1) = pair[1];
        if (v0 < level) != (v1 < level) {
            // Linear interpolation of the crossing instant.
            let frac = (level - v0) / (v1 - v0);
            out.push((t0 + frac * (t1 - t0), v1 > v0));
        }
    }
    out
}
