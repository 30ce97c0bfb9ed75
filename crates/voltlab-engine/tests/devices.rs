//! Device-level integration: behaviours that only show up with the full
//! engine in the loop.

mod common;

use common::{connect, crossings};
use voltlab_devices::subcircuit::{SubcircuitDef, SubcircuitPin};
use voltlab_devices::{Device, DeviceEvent, DiodeKind, GateKind};
use voltlab_engine::analysis::{run_bode, run_monte_carlo, run_sweep, CancelToken};
use voltlab_engine::Engine;

/// Ideal transformer: a 2:1 step-up reproduces the ratio under load.
#[test]
fn transformer_steps_up() {
    let mut eng = Engine::new();
    eng.set_timestep(1e-5).unwrap();
    let vs = eng.add_component(Device::ac_voltage(1.0, 1e3), 0, 0);
    let tr = eng.add_component(
        Device::Transformer(voltlab_devices::transformer::Transformer::default()),
        100,
        0,
    );
    let load = eng.add_component(Device::resistor(1e3), 200, 0);
    let gnd = eng.add_component(Device::ground(), 300, 0);

    connect(&mut eng, (vs, 0), (tr, 0));
    connect(&mut eng, (vs, 1), (gnd, 0));
    connect(&mut eng, (tr, 1), (gnd, 0));
    connect(&mut eng, (tr, 2), (load, 0));
    connect(&mut eng, (load, 1), (gnd, 0));
    connect(&mut eng, (tr, 3), (gnd, 0));

    eng.ensure_topology().unwrap();
    let sec = eng.circuit.components[&load].nodes[0];
    let probe = eng.add_probe(sec, 0).unwrap();
    eng.run_for(5e-3).unwrap();

    let peak = eng
        .history(probe, 200)
        .unwrap()
        .iter()
        .map(|&(_, v)| v.abs())
        .fold(0.0, f64::max);
    // Turns ratio 2 with a light load; the series branch costs a little.
    assert!((peak - 2.0).abs() < 0.1, "secondary peak = {peak}");
}

/// A NOT gate wired as an RC relaxation oscillator toggles.
#[test]
fn gate_rc_oscillator() {
    let mut eng = Engine::new();
    eng.set_timestep(1e-5).unwrap();
    let inv = eng.add_component(Device::gate(GateKind::Not), 0, 0);
    let r = eng.add_component(Device::resistor(10e3), 100, 0);
    let c = eng.add_component(Device::capacitor(10e-9), 200, 0);
    let gnd = eng.add_component(Device::ground(), 300, 0);

    // Output feeds the input back through RC.
    connect(&mut eng, (inv, 1), (r, 0));
    connect(&mut eng, (r, 1), (inv, 0));
    connect(&mut eng, (r, 1), (c, 0));
    connect(&mut eng, (c, 1), (gnd, 0));

    eng.ensure_topology().unwrap();
    let out = eng.circuit.components[&inv].nodes[1];
    let probe = eng.add_probe(out, 0).unwrap();
    eng.run_for(10e-3).unwrap();

    let edges = crossings(&eng.history(probe, 2000).unwrap(), 2.5);
    assert!(edges.len() > 4, "oscillator produced {} edges", edges.len());
}

/// Sub-circuit divider instance behaves like its flat equivalent.
#[test]
fn subcircuit_divider() {
    let mut eng = Engine::new();
    let def = SubcircuitDef {
        name: "divider".into(),
        devices: vec![
            (Device::resistor(1e3), vec![1, 2]),
            (Device::resistor(3e3), vec![2, 0]),
        ],
        pins: vec![
            SubcircuitPin {
                name: "in".into(),
                node: 1,
            },
            SubcircuitPin {
                name: "out".into(),
                node: 2,
            },
        ],
        num_nodes: 2,
    };
    let def_id = eng.define_subcircuit(def).unwrap();
    let inst = eng.instantiate_subcircuit(def_id, 100, 0).unwrap();

    let vs = eng.add_component(Device::dc_voltage(8.0), 0, 0);
    let gnd = eng.add_component(Device::ground(), 200, 0);
    connect(&mut eng, (vs, 0), (inst, 0));
    connect(&mut eng, (vs, 1), (gnd, 0));

    for _ in 0..3 {
        eng.step().unwrap();
    }
    let out = eng.circuit.components[&inst].nodes[1];
    let v = eng.node_voltage(out).unwrap();
    // 8 V · 3k/(1k+3k)
    assert!((v - 6.0).abs() < 1e-6, "divider output {v}");
}

/// Hidden sub-circuit nodes live in the instance's extra rows.
#[test]
fn subcircuit_hidden_node() {
    let mut eng = Engine::new();
    let def = SubcircuitDef {
        name: "double_divider".into(),
        devices: vec![
            (Device::resistor(1e3), vec![1, 3]),
            (Device::resistor(1e3), vec![3, 2]),
            (Device::resistor(2e3), vec![2, 0]),
        ],
        pins: vec![
            SubcircuitPin {
                name: "in".into(),
                node: 1,
            },
            SubcircuitPin {
                name: "out".into(),
                node: 2,
            },
        ],
        num_nodes: 3,
    };
    let def_id = eng.define_subcircuit(def).unwrap();
    let inst = eng.instantiate_subcircuit(def_id, 100, 0).unwrap();
    assert_eq!(eng.circuit.components[&inst].device.extra_vars(), 1);

    let vs = eng.add_component(Device::dc_voltage(8.0), 0, 0);
    let gnd = eng.add_component(Device::ground(), 200, 0);
    connect(&mut eng, (vs, 0), (inst, 0));
    connect(&mut eng, (vs, 1), (gnd, 0));

    eng.step().unwrap();
    let out = eng.circuit.components[&inst].nodes[1];
    let v = eng.node_voltage(out).unwrap();
    // 8 V · 2k/(1k+1k+2k)
    assert!((v - 4.0).abs() < 1e-6, "output {v}");
}

/// TX voltage appears on an RX antenna one step later.
#[test]
fn wireless_link() {
    let mut eng = Engine::new();
    let vs = eng.add_component(Device::dc_voltage(3.0), 0, 0);
    let tx = eng.add_component(
        Device::TxAntenna(voltlab_devices::wireless::TxAntenna::default()),
        100,
        0,
    );
    let rx = eng.add_component(
        Device::RxAntenna(voltlab_devices::wireless::RxAntenna::default()),
        200,
        0,
    );
    let load = eng.add_component(Device::resistor(1e6), 300, 0);
    let gnd = eng.add_component(Device::ground(), 400, 0);

    connect(&mut eng, (vs, 0), (tx, 0));
    connect(&mut eng, (vs, 1), (gnd, 0));
    connect(&mut eng, (tx, 1), (gnd, 0));
    connect(&mut eng, (rx, 0), (load, 0));
    connect(&mut eng, (rx, 1), (gnd, 0));
    connect(&mut eng, (load, 1), (gnd, 0));

    for _ in 0..3 {
        eng.step().unwrap();
    }
    let out = eng.circuit.components[&load].nodes[0];
    let v = eng.node_voltage(out).unwrap();
    // 3 V through 50 Ω into 1 MΩ.
    assert!((v - 3.0).abs() < 0.01, "received {v}");
}

/// A fuse protecting an overloaded branch blows and raises an event.
#[test]
fn fuse_blows_under_overload() {
    let mut eng = Engine::new();
    let vs = eng.add_component(Device::dc_voltage(10.0), 0, 0);
    let mut fuse_dev = voltlab_devices::passive::Fuse::default();
    fuse_dev.params.current_rating = 0.5;
    fuse_dev.params.i2t_rating = 1e-4;
    let fuse = eng.add_component(Device::Fuse(fuse_dev), 100, 0);
    let r = eng.add_component(Device::resistor(5.0), 200, 0);
    let gnd = eng.add_component(Device::ground(), 300, 0);
    connect(&mut eng, (vs, 0), (fuse, 0));
    connect(&mut eng, (fuse, 1), (r, 0));
    connect(&mut eng, (r, 1), (gnd, 0));
    connect(&mut eng, (vs, 1), (gnd, 0));

    eng.run_for(2e-3).unwrap();

    assert!(eng
        .events()
        .iter()
        .any(|e| e.component == fuse && e.event == DeviceEvent::FuseBlown));
    // Post-blow the branch is dark.
    let i = eng.branch_current(r).unwrap();
    assert!(i.abs() < 1e-4, "current after blow = {i}");
}

/// Bode sweep of an RC low-pass: -3 dB near the corner, -20 dB/decade
/// above it.
#[test]
fn bode_rc_lowpass() {
    let mut eng = Engine::new();
    let vs = eng.add_component(Device::ac_voltage(1.0, 1e3), 0, 0);
    let r = eng.add_component(Device::resistor(1.59e3), 100, 0);
    let c = eng.add_component(Device::capacitor(100e-9), 200, 0);
    let gnd = eng.add_component(Device::ground(), 300, 0);
    connect(&mut eng, (vs, 0), (r, 0));
    connect(&mut eng, (r, 1), (c, 0));
    connect(&mut eng, (c, 1), (gnd, 0));
    connect(&mut eng, (vs, 1), (gnd, 0));

    eng.ensure_topology().unwrap();
    let out = eng.circuit.components[&c].nodes[0];
    let probe = eng.add_probe(out, 0).unwrap();

    // Corner at 1/(2πRC) ≈ 1 kHz.
    let points = run_bode(&eng, vs, probe, 100.0, 10e3, 9, &CancelToken::new()).unwrap();
    assert_eq!(points.len(), 9);

    let at = |f: f64| {
        points
            .iter()
            .min_by(|a, b| (a.frequency - f).abs().total_cmp(&(b.frequency - f).abs()))
            .unwrap()
    };
    // Passband is flat.
    assert!(at(100.0).magnitude_db.abs() < 0.5);
    // Corner is 3 dB down with ~45° of lag.
    let corner = at(1e3);
    assert!((corner.magnitude_db + 3.0).abs() < 1.0, "corner {corner:?}");
    assert!((corner.phase_deg + 45.0).abs() < 8.0, "corner {corner:?}");
    // A decade up is ~20 dB down.
    assert!((at(10e3).magnitude_db + 20.0).abs() < 2.0);
}

/// Monte-Carlo over resistor tolerance spreads the divider output.
#[test]
fn monte_carlo_divider_spread() {
    let mut eng = Engine::new();
    let vs = eng.add_component(Device::dc_voltage(10.0), 0, 0);
    let r1 = eng.add_component(Device::resistor(1e3), 100, 0);
    let r2 = eng.add_component(Device::resistor(1e3), 200, 0);
    let gnd = eng.add_component(Device::ground(), 300, 0);
    connect(&mut eng, (vs, 0), (r1, 0));
    connect(&mut eng, (r1, 1), (r2, 0));
    connect(&mut eng, (r2, 1), (gnd, 0));
    connect(&mut eng, (vs, 1), (gnd, 0));
    eng.ensure_topology().unwrap();
    let mid = eng.circuit.components[&r2].nodes[0];

    let stats = run_monte_carlo(
        &eng,
        64,
        5.0,
        1e-4,
        move |e: &Engine| e.node_voltage(mid).unwrap(),
        &CancelToken::new(),
    )
    .unwrap();

    assert_eq!(stats.samples.len(), 64);
    assert!((stats.mean - 5.0).abs() < 0.2, "mean {}", stats.mean);
    assert!(stats.std_dev > 0.01 && stats.std_dev < 0.5);
    assert!(stats.min >= 4.0 && stats.max <= 6.0);
    assert!(stats.p1 <= stats.p99);

    // Same seed, same answer.
    let again = run_monte_carlo(
        &eng,
        64,
        5.0,
        1e-4,
        move |e: &Engine| e.node_voltage(mid).unwrap(),
        &CancelToken::new(),
    )
    .unwrap();
    assert_eq!(stats.samples, again.samples);
}

/// Parameter sweep across a resistor maps the divider response.
#[test]
fn parameter_sweep_divider() {
    let mut eng = Engine::new();
    let vs = eng.add_component(Device::dc_voltage(10.0), 0, 0);
    let r1 = eng.add_component(Device::resistor(1e3), 100, 0);
    let r2 = eng.add_component(Device::resistor(1e3), 200, 0);
    let gnd = eng.add_component(Device::ground(), 300, 0);
    connect(&mut eng, (vs, 0), (r1, 0));
    connect(&mut eng, (r1, 1), (r2, 0));
    connect(&mut eng, (r2, 1), (gnd, 0));
    connect(&mut eng, (vs, 1), (gnd, 0));
    eng.ensure_topology().unwrap();
    let mid = eng.circuit.components[&r2].nodes[0];

    let points = run_sweep(
        &eng,
        r1,
        "resistance",
        1e3,
        9e3,
        5,
        false,
        1e-4,
        move |e: &Engine| e.node_voltage(mid).unwrap(),
        &CancelToken::new(),
    )
    .unwrap();

    assert_eq!(points.len(), 5);
    // 10·1k/(r1+1k): 5.0 down to 1.0.
    assert!((points[0].output - 5.0).abs() < 1e-3);
    assert!((points[4].output - 1.0).abs() < 1e-3);
    for pair in points.windows(2) {
        assert!(pair[1].output < pair[0].output);
    }
}

/// Cancellation between trials surfaces as an error.
#[test]
fn cancelled_analysis() {
    let mut eng = Engine::new();
    let vs = eng.add_component(Device::dc_voltage(1.0), 0, 0);
    let r = eng.add_component(Device::resistor(1e3), 100, 0);
    let gnd = eng.add_component(Device::ground(), 200, 0);
    connect(&mut eng, (vs, 0), (r, 0));
    connect(&mut eng, (r, 1), (gnd, 0));
    connect(&mut eng, (vs, 1), (gnd, 0));
    eng.ensure_topology().unwrap();

    let token = CancelToken::new();
    token.cancel();
    let result = run_monte_carlo(&eng, 8, 1.0, 1e-4, |_| 0.0, &token);
    assert!(matches!(result, Err(voltlab_engine::Error::Cancelled)));
}

/// LED glow tracks current, and overdrive kills it with an event.
#[test]
fn led_glow_and_burnout() {
    let mut eng = Engine::new();
    let vs = eng.add_component(Device::dc_voltage(5.0), 0, 0);
    let led = eng.add_component(Device::diode(DiodeKind::Led), 100, 0);
    let r = eng.add_component(Device::resistor(220.0), 200, 0);
    let gnd = eng.add_component(Device::ground(), 300, 0);
    connect(&mut eng, (vs, 0), (led, 0));
    connect(&mut eng, (led, 1), (r, 0));
    connect(&mut eng, (r, 1), (gnd, 0));
    connect(&mut eng, (vs, 1), (gnd, 0));

    for _ in 0..5 {
        eng.step().unwrap();
    }
    let glow = match &eng.circuit.components[&led].device {
        Device::Diode(d) => d.glow(),
        _ => unreachable!(),
    };
    // (5 − ~2.1) / 220 ≈ 13 mA against a 20 mA rating.
    assert!(glow > 0.4 && glow <= 1.0, "glow = {glow}");

    // Drop the series resistance so the current races past 2·i_max.
    eng.set_parameter(r, "resistance", 10.0).unwrap();
    eng.run_for(1e-3).unwrap();
    assert!(eng
        .events()
        .iter()
        .any(|e| e.component == led && e.event == DeviceEvent::LedBurnedOut));
}
