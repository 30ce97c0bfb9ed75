//! Time-varying source waveforms.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Frequency multipliers and phases of the deterministic multi-sine mix
/// used for noise-flavoured waveforms. Incommensurate ratios keep the mix
/// from repeating over any musical interval.
const NOISE_MIX: [(f64, f64); 6] = [
    (1.0, 0.00),
    (1.618, 1.30),
    (2.414, 2.71),
    (3.303, 4.10),
    (5.196, 0.77),
    (7.389, 5.55),
];

/// A source waveform, evaluated as a pure function of time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Waveform {
    Dc {
        value: f64,
    },
    Sine {
        offset: f64,
        amplitude: f64,
        frequency: f64,
        phase_deg: f64,
    },
    Square {
        offset: f64,
        amplitude: f64,
        frequency: f64,
        phase_deg: f64,
    },
    Triangle {
        offset: f64,
        amplitude: f64,
        frequency: f64,
        phase_deg: f64,
    },
    Sawtooth {
        offset: f64,
        amplitude: f64,
        frequency: f64,
        phase_deg: f64,
    },
    /// Two-level clock between `v_low` and `v_high` with a duty cycle.
    Clock {
        v_low: f64,
        v_high: f64,
        frequency: f64,
        duty: f64,
    },
    /// Single or repeating pulse train.
    Pulse {
        v_low: f64,
        v_high: f64,
        delay: f64,
        width: f64,
        period: f64,
    },
    Pwm {
        v_low: f64,
        v_high: f64,
        frequency: f64,
        duty: f64,
    },
    /// Piecewise-linear points `(t, v)`, optionally repeating past the
    /// last point.
    Pwl {
        points: Vec<(f64, f64)>,
        repeat: bool,
    },
    /// Sine plus offset plus a deterministic noise term.
    Expression {
        offset: f64,
        amplitude: f64,
        frequency: f64,
        noise: f64,
    },
    /// Pseudo-random noise from a multi-sine mix, band-limited around
    /// `frequency`.
    Noise {
        amplitude: f64,
        frequency: f64,
    },
}

impl Waveform {
    pub fn dc(value: f64) -> Self {
        Waveform::Dc { value }
    }

    pub fn sine(offset: f64, amplitude: f64, frequency: f64, phase_deg: f64) -> Self {
        Waveform::Sine {
            offset,
            amplitude,
            frequency,
            phase_deg,
        }
    }

    pub fn pulse(v_low: f64, v_high: f64, delay: f64, width: f64, period: f64) -> Self {
        Waveform::Pulse {
            v_low,
            v_high,
            delay,
            width,
            period,
        }
    }

    pub fn pwl(points: Vec<(f64, f64)>, repeat: bool) -> Self {
        Waveform::Pwl { points, repeat }
    }

    /// Value at time `t`.
    pub fn value(&self, t: f64) -> f64 {
        self.value_mod(t, None, None)
    }

    /// Value with optional modulation overrides.
    ///
    /// `amplitude` replaces the waveform's own amplitude (or DC level);
    /// `cycles` replaces the phase accumulator `frequency · t` of periodic
    /// shapes, which keeps swept-frequency sources phase-continuous.
    pub fn value_mod(&self, t: f64, amplitude: Option<f64>, cycles: Option<f64>) -> f64 {
        match self {
            Waveform::Dc { value } => amplitude.unwrap_or(*value),
            Waveform::Sine {
                offset,
                amplitude: a,
                frequency,
                phase_deg,
            } => {
                let u = cycles.unwrap_or(frequency * t) + phase_deg / 360.0;
                offset + amplitude.unwrap_or(*a) * (2.0 * PI * u).sin()
            }
            Waveform::Square {
                offset,
                amplitude: a,
                frequency,
                phase_deg,
            } => {
                let u = cycles.unwrap_or(frequency * t) + phase_deg / 360.0;
                let s = if u.rem_euclid(1.0) < 0.5 { 1.0 } else { -1.0 };
                offset + amplitude.unwrap_or(*a) * s
            }
            Waveform::Triangle {
                offset,
                amplitude: a,
                frequency,
                phase_deg,
            } => {
                let u = (cycles.unwrap_or(frequency * t) + phase_deg / 360.0).rem_euclid(1.0);
                // Sine-aligned triangle: zero at the cycle start, peak at
                // the quarter point.
                let s = if u < 0.25 {
                    4.0 * u
                } else if u < 0.75 {
                    2.0 - 4.0 * u
                } else {
                    4.0 * u - 4.0
                };
                offset + amplitude.unwrap_or(*a) * s
            }
            Waveform::Sawtooth {
                offset,
                amplitude: a,
                frequency,
                phase_deg,
            } => {
                let u = (cycles.unwrap_or(frequency * t) + phase_deg / 360.0).rem_euclid(1.0);
                offset + amplitude.unwrap_or(*a) * (2.0 * u - 1.0)
            }
            Waveform::Clock {
                v_low,
                v_high,
                frequency,
                duty,
            }
            | Waveform::Pwm {
                v_low,
                v_high,
                frequency,
                duty,
            } => {
                let u = cycles.unwrap_or(frequency * t).rem_euclid(1.0);
                let high_phase = u < duty.clamp(0.0, 1.0);
                match (high_phase, amplitude) {
                    (true, Some(a)) => *v_low + a,
                    (true, None) => *v_high,
                    (false, _) => *v_low,
                }
            }
            Waveform::Pulse {
                v_low,
                v_high,
                delay,
                width,
                period,
            } => {
                let hi = amplitude.map(|a| *v_low + a).unwrap_or(*v_high);
                if t < *delay {
                    return *v_low;
                }
                let local = if *period > 0.0 {
                    (t - delay).rem_euclid(*period)
                } else {
                    t - delay
                };
                if local < *width {
                    hi
                } else {
                    *v_low
                }
            }
            Waveform::Pwl { points, repeat } => pwl_value(points, *repeat, t),
            Waveform::Expression {
                offset,
                amplitude: a,
                frequency,
                noise,
            } => {
                let u = cycles.unwrap_or(frequency * t);
                let base = offset + amplitude.unwrap_or(*a) * (2.0 * PI * u).sin();
                base + noise * multi_sine(t, frequency * 13.7)
            }
            Waveform::Noise {
                amplitude: a,
                frequency,
            } => amplitude.unwrap_or(*a) * multi_sine(t, *frequency),
        }
    }

    /// The waveform's own amplitude-like scalar, if it has one.
    pub fn base_amplitude(&self) -> Option<f64> {
        match self {
            Waveform::Dc { value } => Some(*value),
            Waveform::Sine { amplitude, .. }
            | Waveform::Square { amplitude, .. }
            | Waveform::Triangle { amplitude, .. }
            | Waveform::Sawtooth { amplitude, .. }
            | Waveform::Expression { amplitude, .. }
            | Waveform::Noise { amplitude, .. } => Some(*amplitude),
            Waveform::Clock { v_low, v_high, .. }
            | Waveform::Pwm { v_low, v_high, .. }
            | Waveform::Pulse { v_low, v_high, .. } => Some(v_high - v_low),
            Waveform::Pwl { .. } => None,
        }
    }

    /// The waveform's repetition frequency, if it has one.
    pub fn base_frequency(&self) -> Option<f64> {
        match self {
            Waveform::Sine { frequency, .. }
            | Waveform::Square { frequency, .. }
            | Waveform::Triangle { frequency, .. }
            | Waveform::Sawtooth { frequency, .. }
            | Waveform::Clock { frequency, .. }
            | Waveform::Pwm { frequency, .. }
            | Waveform::Expression { frequency, .. }
            | Waveform::Noise { frequency, .. } => Some(*frequency),
            Waveform::Pulse { period, .. } if *period > 0.0 => Some(1.0 / period),
            _ => None,
        }
    }

    /// Replace the repetition frequency in place (used by the Bode driver
    /// to retune the stimulus).
    pub fn set_frequency(&mut self, f: f64) {
        match self {
            Waveform::Sine { frequency, .. }
            | Waveform::Square { frequency, .. }
            | Waveform::Triangle { frequency, .. }
            | Waveform::Sawtooth { frequency, .. }
            | Waveform::Clock { frequency, .. }
            | Waveform::Pwm { frequency, .. }
            | Waveform::Expression { frequency, .. }
            | Waveform::Noise { frequency, .. } => *frequency = f,
            Waveform::Pulse { period, .. } => {
                if f > 0.0 {
                    *period = 1.0 / f;
                }
            }
            Waveform::Dc { .. } | Waveform::Pwl { .. } => {}
        }
    }
}

fn pwl_value(points: &[(f64, f64)], repeat: bool, t: f64) -> f64 {
    let Some(&(t_last, v_last)) = points.last() else {
        return 0.0;
    };
    let Some(&(t_first, v_first)) = points.first() else {
        return 0.0;
    };

    let t = if repeat && t_last > 0.0 {
        t.rem_euclid(t_last)
    } else {
        t
    };

    if t <= t_first {
        return v_first;
    }
    if t >= t_last {
        return v_last;
    }
    for pair in points.windows(2) {
        let (t0, v0) = pair[0];
        let (t1, v1) = pair[1];
        if t >= t0 && t <= t1 {
            if t1 - t0 <= 0.0 {
                return v1;
            }
            return v0 + (v1 - v0) * (t - t0) / (t1 - t0);
        }
    }
    v_last
}

/// Deterministic noise in roughly [-1, 1]: a mix of incommensurate sines.
fn multi_sine(t: f64, base_freq: f64) -> f64 {
    let f = if base_freq > 0.0 { base_freq } else { 1.0 };
    let mut acc = 0.0;
    for &(mult, phase) in &NOISE_MIX {
        acc += (2.0 * PI * f * mult * t + phase).sin();
    }
    acc / 2.5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dc() {
        assert_eq!(Waveform::dc(3.3).value(10.0), 3.3);
    }

    #[test]
    fn test_sine_phase() {
        let w = Waveform::sine(1.0, 2.0, 50.0, 90.0);
        // At t = 0 with 90° phase the sine is at its peak.
        assert!((w.value(0.0) - 3.0).abs() < 1e-12);
        // One full period later, same value.
        assert!((w.value(0.02) - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_square_and_clock() {
        let sq = Waveform::Square {
            offset: 0.0,
            amplitude: 1.0,
            frequency: 1.0,
            phase_deg: 0.0,
        };
        assert_eq!(sq.value(0.1), 1.0);
        assert_eq!(sq.value(0.6), -1.0);

        let clk = Waveform::Clock {
            v_low: 0.0,
            v_high: 5.0,
            frequency: 1.0,
            duty: 0.25,
        };
        assert_eq!(clk.value(0.1), 5.0);
        assert_eq!(clk.value(0.5), 0.0);
    }

    #[test]
    fn test_triangle_extremes() {
        let w = Waveform::Triangle {
            offset: 0.0,
            amplitude: 1.0,
            frequency: 1.0,
            phase_deg: 0.0,
        };
        assert!((w.value(0.25) - 1.0).abs() < 1e-12);
        assert!((w.value(0.75) + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_pulse_train() {
        let w = Waveform::pulse(0.0, 5.0, 1e-3, 2e-3, 10e-3);
        assert_eq!(w.value(0.0), 0.0);
        assert_eq!(w.value(2e-3), 5.0);
        assert_eq!(w.value(4e-3), 0.0);
        // Second period.
        assert_eq!(w.value(12e-3), 5.0);
    }

    #[test]
    fn test_pwl_interpolates_and_repeats() {
        let w = Waveform::pwl(vec![(0.0, 0.0), (1.0, 10.0), (2.0, 0.0)], true);
        assert!((w.value(0.5) - 5.0).abs() < 1e-12);
        assert!((w.value(1.5) - 5.0).abs() < 1e-12);
        // Repeats with period 2.
        assert!((w.value(2.5) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_noise_is_deterministic_and_bounded() {
        let w = Waveform::Noise {
            amplitude: 1.0,
            frequency: 1000.0,
        };
        for i in 0..200 {
            let t = i as f64 * 1e-5;
            let v = w.value(t);
            assert_eq!(v, w.value(t));
            assert!(v.abs() <= 2.5);
        }
    }

    #[test]
    fn test_cycles_override_keeps_phase() {
        let w = Waveform::sine(0.0, 1.0, 100.0, 0.0);
        // Overriding cycles ignores the nominal frequency entirely.
        let v = w.value_mod(123.0, None, Some(0.25));
        assert!((v - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_set_frequency() {
        let mut w = Waveform::sine(0.0, 1.0, 100.0, 0.0);
        w.set_frequency(250.0);
        assert_eq!(w.base_frequency(), Some(250.0));
    }
}
