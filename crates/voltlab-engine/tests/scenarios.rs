//! End-to-end scenarios: small reference circuits with known answers.

mod common;

use common::{connect, crossings, value_at};
use voltlab_engine::analysis::{spectrum, WindowFunction};
use voltlab_devices::{Device, DiodeKind};
use voltlab_engine::Engine;

/// 10 V DC source into 1 kΩ to ground.
#[test]
fn s1_ohms_law() {
    let mut eng = Engine::new();
    let vs = eng.add_component(Device::dc_voltage(10.0), 0, 0);
    let r = eng.add_component(Device::resistor(1e3), 100, 0);
    let gnd = eng.add_component(Device::ground(), 200, 0);
    connect(&mut eng, (vs, 0), (r, 0));
    connect(&mut eng, (r, 1), (gnd, 0));
    connect(&mut eng, (vs, 1), (gnd, 0));

    for _ in 0..5 {
        eng.step().unwrap();
    }

    let top = eng.circuit.components[&r].nodes[0];
    let v = eng.node_voltage(top).unwrap();
    assert!((v - 10.0).abs() / 10.0 < 1e-9, "v = {v}");

    let i = eng.branch_current(r).unwrap();
    assert!((i - 10.0e-3).abs() / 10.0e-3 < 1e-9, "i = {i}");
}

/// 5 V charging 1 µF through 1 kΩ: the classic RC exponential.
#[test]
fn s2_rc_charging_curve() {
    let mut eng = Engine::new();
    eng.set_timestep(10e-6).unwrap();
    let vs = eng.add_component(Device::dc_voltage(5.0), 0, 0);
    let r = eng.add_component(Device::resistor(1e3), 100, 0);
    let c = eng.add_component(Device::capacitor(1e-6), 200, 0);
    let gnd = eng.add_component(Device::ground(), 300, 0);
    connect(&mut eng, (vs, 0), (r, 0));
    connect(&mut eng, (r, 1), (c, 0));
    connect(&mut eng, (c, 1), (gnd, 0));
    connect(&mut eng, (vs, 1), (gnd, 0));

    eng.ensure_topology().unwrap();
    let cap_top = eng.circuit.components[&c].nodes[0];
    let probe = eng.add_probe(cap_top, 0).unwrap();

    eng.run_for(5e-3).unwrap();
    let history = eng.history(probe, 1000).unwrap();

    // 5·(1 − e^−1) at one time constant.
    let v1 = value_at(&history, 1e-3);
    assert!((v1 - 3.1606).abs() / 3.1606 < 5e-3, "V_C(1ms) = {v1}");

    let v5 = value_at(&history, 5e-3);
    assert!((v5 - 4.9663).abs() / 4.9663 < 1e-3, "V_C(5ms) = {v5}");
}

/// 1 V, 1 kHz sine into a resistor: unity peak and a clean fundamental.
#[test]
fn s3_ac_peak_and_spectrum() {
    let mut eng = Engine::new();
    // 64 kHz sampling puts 1 kHz exactly on FFT bin 16 of 1024.
    eng.set_timestep(1.0 / 64_000.0).unwrap();
    let vs = eng.add_component(Device::ac_voltage(1.0, 1e3), 0, 0);
    let r = eng.add_component(Device::resistor(1e3), 100, 0);
    let gnd = eng.add_component(Device::ground(), 200, 0);
    connect(&mut eng, (vs, 0), (r, 0));
    connect(&mut eng, (r, 1), (gnd, 0));
    connect(&mut eng, (vs, 1), (gnd, 0));

    eng.ensure_topology().unwrap();
    let top = eng.circuit.components[&r].nodes[0];
    let probe = eng.add_probe(top, 0).unwrap();

    // Two full FFT windows; measure over the second.
    eng.run_for(2.0 * 1024.0 / 64_000.0).unwrap();
    let history = eng.history(probe, 1024).unwrap();

    let peak = history.iter().map(|&(_, v)| v.abs()).fold(0.0, f64::max);
    assert!((peak - 1.0).abs() < 5e-3, "peak = {peak}");

    let spec = spectrum(&history, WindowFunction::Hanning);
    let (peak_bin, _) = spec
        .iter()
        .enumerate()
        .max_by(|a, b| a.1 .1.total_cmp(&b.1 .1))
        .unwrap();
    let f_peak = spec[peak_bin].0;
    assert!(
        (f_peak - 1000.0).abs() < 64.0,
        "fundamental found at {f_peak} Hz"
    );
}

/// Forward-biased diode in series with 100 Ω: the solved point satisfies
/// the Shockley equation self-consistently.
#[test]
fn s4_diode_operating_point() {
    let mut eng = Engine::new();
    // Junction temperature pinned at 300 K through the environment.
    eng.set_environment(26.85, 0.5);
    let vs = eng.add_component(Device::dc_voltage(0.7), 0, 0);
    let d = eng.add_component(Device::diode(DiodeKind::Silicon), 100, 0);
    let r = eng.add_component(Device::resistor(100.0), 200, 0);
    let gnd = eng.add_component(Device::ground(), 300, 0);
    connect(&mut eng, (vs, 0), (d, 0));
    connect(&mut eng, (d, 1), (r, 0));
    connect(&mut eng, (r, 1), (gnd, 0));
    connect(&mut eng, (vs, 1), (gnd, 0));

    for _ in 0..10 {
        eng.step().unwrap();
    }

    let anode = eng.circuit.components[&d].nodes[0];
    let cathode = eng.circuit.components[&d].nodes[1];
    let v_d = eng.node_voltage(anode).unwrap() - eng.node_voltage(cathode).unwrap();

    let vt = 8.617_333_262e-5 * 300.0;
    let i_shockley = 1e-12 * ((v_d / vt).exp() - 1.0);
    let i_resistor = (0.7 - v_d) / 100.0;

    assert!(
        (i_shockley - i_resistor).abs() / i_resistor < 0.02,
        "inconsistent: shockley {i_shockley}, resistor {i_resistor}"
    );
    // The operating point lands in the low-milliamp range.
    assert!(i_resistor > 5e-4 && i_resistor < 1e-2, "i = {i_resistor}");
}

/// Ideal op-amp inverting amplifier with gain −10.
#[test]
fn s5_inverting_amplifier() {
    let mut eng = Engine::new();
    let vin = eng.add_component(Device::dc_voltage(1.0), 0, 0);
    let r1 = eng.add_component(Device::resistor(1e3), 100, 0);
    let r2 = eng.add_component(Device::resistor(10e3), 200, 0);
    let amp = eng.add_component(Device::opamp(), 300, 0);
    let gnd = eng.add_component(Device::ground(), 400, 0);

    connect(&mut eng, (vin, 0), (r1, 0));
    connect(&mut eng, (r1, 1), (amp, 1)); // inverting input
    connect(&mut eng, (r1, 1), (r2, 0));
    connect(&mut eng, (r2, 1), (amp, 2)); // feedback to output
    connect(&mut eng, (amp, 0), (gnd, 0)); // non-inverting input grounded
    connect(&mut eng, (vin, 1), (gnd, 0));

    for _ in 0..5 {
        eng.step().unwrap();
    }

    let out = eng.circuit.components[&amp].nodes[2];
    let v_out = eng.node_voltage(out).unwrap();
    assert!((v_out + 10.0).abs() < 0.01, "v_out = {v_out}");
}

/// 555 astable: R1 = R2 = 10 kΩ, C = 10 µF, VCC = 5 V.
#[test]
fn s6_astable_555() {
    let mut eng = Engine::new();
    eng.set_timestep(0.5e-3).unwrap();
    let vcc = eng.add_component(Device::dc_voltage(5.0), 0, 0);
    let r1 = eng.add_component(Device::resistor(10e3), 100, 0);
    let r2 = eng.add_component(Device::resistor(10e3), 200, 0);
    let c = eng.add_component(Device::capacitor(10e-6), 300, 0);
    let timer = eng.add_component(Device::timer_555(), 400, 0);
    let gnd = eng.add_component(Device::ground(), 500, 0);

    // Supply.
    connect(&mut eng, (vcc, 0), (timer, 0));
    connect(&mut eng, (vcc, 1), (gnd, 0));
    connect(&mut eng, (timer, 1), (gnd, 0));
    // VCC → R1 → discharge, R1/R2 junction at the discharge pin.
    connect(&mut eng, (vcc, 0), (r1, 0));
    connect(&mut eng, (r1, 1), (timer, 4));
    connect(&mut eng, (r1, 1), (r2, 0));
    // R2 → timing node: trigger, threshold and the capacitor.
    connect(&mut eng, (r2, 1), (timer, 2));
    connect(&mut eng, (timer, 2), (timer, 3));
    connect(&mut eng, (r2, 1), (c, 0));
    connect(&mut eng, (c, 1), (gnd, 0));

    eng.ensure_topology().unwrap();
    let out = eng.circuit.components[&timer].nodes[5];
    let probe = eng.add_probe(out, 0).unwrap();

    // A handful of cycles; period ≈ 208 ms.
    eng.run_for(1.0).unwrap();
    let history = eng.history(probe, 3000).unwrap();
    let edges = crossings(&history, 2.5);
    assert!(edges.len() >= 6, "oscillation produced {} edges", edges.len());

    // Drop the startup cycle, then measure one high and one low interval.
    let rising: Vec<f64> = edges.iter().filter(|e| e.1).map(|e| e.0).collect();
    let falling: Vec<f64> = edges.iter().filter(|e| !e.1).map(|e| e.0).collect();
    let (t_rise, t_fall) = (rising[1], falling[1]);
    let (high, low) = if t_rise < t_fall {
        (t_fall - t_rise, rising[2] - t_fall)
    } else {
        (falling[2] - t_rise, t_rise - t_fall)
    };

    let expect_high = 0.693 * 20e3 * 10e-6;
    let expect_low = 0.693 * 10e3 * 10e-6;
    assert!(
        (high - expect_high).abs() / expect_high < 0.08,
        "high time {high}, expected {expect_high}"
    );
    assert!(
        (low - expect_low).abs() / expect_low < 0.08,
        "low time {low}, expected {expect_low}"
    );

    // The duty cycle follows from the two intervals.
    let duty = high / (high + low);
    assert!((duty - 2.0 / 3.0).abs() < 0.05, "duty = {duty}");
}
