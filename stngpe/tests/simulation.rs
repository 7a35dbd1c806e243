use stngpe::activation::{activation_gpe, activation_stn};
use stngpe::{
    AdaptiveController, AdaptiveFilterController, Constants, Control, Controller, HistoryView,
    MidIncrease, ProportionalController, Result, ScheduledSwap, SimError, Simulation,
    SimulationConfig, State, Trajectory, ZeroController, run_simulation,
};

/// Records what the simulator hands it and always asks for the same control.
#[derive(Default)]
struct Recorder {
    lens: Vec<usize>,
    equilibria: Vec<(usize, f64)>,
}

impl Controller for Recorder {
    fn name(&self) -> &'static str {
        "recorder"
    }

    fn update(&mut self, history: HistoryView<'_>) -> Result<Control> {
        self.lens.push(history.len());
        Ok(Control::new(1.0, 0.5))
    }

    fn set_equilibrium(&mut self, equilibrium: f64) {
        self.equilibria.push((self.lens.len(), equilibrium));
    }
}

struct Failing;

impl Controller for Failing {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn update(&mut self, _history: HistoryView<'_>) -> Result<Control> {
        Err(SimError::InsufficientSamples {
            required: 10,
            actual: 1,
        })
    }
}

fn run_zero(constants: &Constants, config: SimulationConfig) -> Trajectory {
    run_simulation(constants, config, &mut ZeroController).unwrap()
}

fn bits(values: &[f64]) -> Vec<u64> {
    values.iter().map(|v| v.to_bits()).collect()
}

#[test]
fn test_runs_are_deterministic() {
    let constants = Constants::healthy();
    let config = SimulationConfig::new(400.0, 0.05).with_init_theta(0.5);

    let mut first = AdaptiveController::new(0.1, 20.0, 0.05).unwrap();
    let mut second = AdaptiveController::new(0.1, 20.0, 0.05).unwrap();
    let a = run_simulation(&constants, config.clone(), &mut first).unwrap();
    let b = run_simulation(&constants, config, &mut second).unwrap();

    assert_eq!(bits(a.history().stn()), bits(b.history().stn()));
    assert_eq!(bits(a.history().gpe()), bits(b.history().gpe()));
    assert_eq!(bits(a.history().theta()), bits(b.history().theta()));
    assert_eq!(bits(a.control()), bits(b.control()));
    assert_eq!(bits(a.input()), bits(b.input()));
}

#[test]
fn test_prehistory_holds_initial_state() {
    let init = State::new(12.0, 34.0, 5.0);
    let config = SimulationConfig {
        init_state: init,
        control_start: 0.0,
        ..SimulationConfig::new(100.0, 0.5)
    };
    let mut recorder = Recorder::default();
    let out = run_simulation(&Constants::healthy(), config, &mut recorder).unwrap();

    assert_eq!(out.prehistory_len(), 13);
    for i in 0..out.prehistory_len() {
        assert!(out.time(i) <= 0.0);
        assert_eq!(out.history().get(i), init);
        assert_eq!(out.control()[i], 0.0);
        assert_eq!(out.input()[i], 0.0);
    }
    assert!(out.time(out.prehistory_len()) > 0.0);
    assert_ne!(out.history().get(out.prehistory_len()), init);
}

#[test]
fn test_controller_sees_strict_prefix() {
    let mut recorder = Recorder::default();
    let sim = Simulation::new(&Constants::healthy(), SimulationConfig::new(50.0, 0.5)).unwrap();
    sim.run(&mut recorder).unwrap();

    let expected: Vec<usize> = (sim.prehistory_len()..sim.len()).collect();
    assert_eq!(recorder.lens, expected);
}

#[test]
fn test_uncoupled_stn_is_a_leaky_integrator() {
    let mut constants = Constants::healthy();
    constants.c12 = 0.0;
    constants.c21 = 0.0;
    let dt = 0.01;
    let out = run_zero(&constants, SimulationConfig::new(100.0, dt));

    let target = activation_stn(constants.cctx * constants.ctx_level, &constants);
    let x0 = 20.0;
    let origin = out.prehistory_len() - 1;
    let decay = 1.0 - dt / constants.tau1;
    for k in (0..10_000).step_by(250) {
        let x = out.history().stn()[origin + k];
        let euler = target + (x0 - target) * decay.powi(k as i32);
        let exact = target + (x0 - target) * (-(k as f64) * dt / constants.tau1).exp();
        assert!((x - euler).abs() < 1e-9, "step {k}: {x} vs {euler}");
        assert!((x - exact).abs() < 0.01, "step {k}: {x} vs {exact}");
    }
}

#[test]
fn test_uncoupled_gpe_is_a_leaky_integrator() {
    let mut constants = Constants::healthy();
    constants.c12 = 0.0;
    constants.c21 = 0.0;
    constants.c22 = 0.0;
    let dt = 0.01;
    let out = run_zero(&constants, SimulationConfig::new(100.0, dt));

    let target = activation_gpe(constants.cstr * constants.str_level, &constants);
    let origin = out.prehistory_len() - 1;
    for k in (0..10_000).step_by(500) {
        let x = out.history().gpe()[origin + k];
        let exact = target + (20.0 - target) * (-(k as f64) * dt / constants.tau2).exp();
        assert!((x - exact).abs() < 0.01, "step {k}: {x} vs {exact}");
    }
}

#[test]
fn test_zero_controller_keeps_theta() {
    let out = run_zero(
        &Constants::healthy(),
        SimulationConfig::new(300.0, 0.1).with_init_theta(40.0),
    );
    assert!(out.history().theta().iter().all(|&t| t == 40.0));
    assert!(out.control().iter().all(|&c| c == 0.0));
}

#[test]
fn test_output_gated_before_control_start() {
    let dt = 0.5;
    let config = SimulationConfig {
        steady_state_pad: 100.0,
        ..SimulationConfig::new(400.0, dt).with_init_theta(1.0)
    };
    let gate = config.control_start + config.steady_state_pad;
    let mut recorder = Recorder::default();
    let out = run_simulation(&Constants::healthy(), config, &mut recorder).unwrap();

    let mut theta = 1.0;
    for i in 0..out.len() {
        let t = out.time(i);
        if t < gate {
            assert_eq!(out.control()[i], 0.0, "t = {t}");
            assert_eq!(out.history().theta()[i], 1.0, "t = {t}");
        } else {
            theta += dt * 0.5;
            assert_eq!(out.control()[i], 1.0, "t = {t}");
            assert!((out.history().theta()[i] - theta).abs() < 1e-9);
        }
    }
    // The controller still ran on every step.
    assert_eq!(recorder.lens.len(), out.len() - out.prehistory_len());
}

#[test]
fn test_proportional_control_changes_trajectory_after_gate() {
    let constants = Constants::healthy();
    let config = SimulationConfig::new(400.0, 0.5);
    let free = run_zero(&constants, config.clone());
    let mut p = ProportionalController::new(5.0, 0.5).unwrap();
    let controlled = run_simulation(&constants, config, &mut p).unwrap();

    let gate_index = free.index_at(200.0);
    assert_eq!(
        bits(&free.history().stn()[..gate_index]),
        bits(&controlled.history().stn()[..gate_index])
    );
    assert_ne!(controlled.control()[gate_index], 0.0);
    assert_ne!(
        controlled.history().stn()[gate_index],
        free.history().stn()[gate_index]
    );
    assert!(p.baseline() > 0.0);
}

#[test]
fn test_adaptive_filter_warm_up_in_loop() {
    let dt = 0.5;
    let mut a = AdaptiveFilterController::new(0.1, 50.0, dt, 250.0).unwrap();
    let required = a.samples_required();
    let config = SimulationConfig {
        control_start: -100.0,
        ..SimulationConfig::new(300.0, dt).with_init_theta(1.0)
    };
    let out = run_simulation(&Constants::healthy(), config, &mut a).unwrap();
    assert_eq!(required, 500);
    assert!(out.len() > required + 1);

    for i in 0..required {
        assert_eq!(out.control()[i], 0.0);
        assert_eq!(out.history().theta()[i], 1.0);
    }
    assert_ne!(out.control()[required], 0.0);
    assert_ne!(out.history().theta()[required + 1], 1.0);
    assert!(a.baseline() > 0.0);
}

#[test]
fn test_healthy_loop_stays_bounded() {
    let out = run_zero(
        &Constants::healthy(),
        SimulationConfig::new(500.0, 0.01).with_init_theta(40.0),
    );
    assert_eq!(out.len(), 50_600);
    for (&stn, &gpe) in out.history().stn().iter().zip(out.history().gpe()) {
        assert!(stn.is_finite() && gpe.is_finite());
        assert!((0.0..=400.0).contains(&stn));
        assert!((0.0..=400.0).contains(&gpe));
    }
}

#[test]
fn test_mid_increase_only_acts_after_onset() {
    let constants = Constants::healthy();
    let base = SimulationConfig::new(300.0, 0.5);
    let free = run_zero(&constants, base.clone());
    let boosted = run_zero(
        &constants,
        SimulationConfig {
            mid_increase: Some(MidIncrease {
                onset: 150.0,
                cortical: 10.0,
                striatal: 0.0,
            }),
            ..base
        },
    );

    // Strictly after the onset
    let onset = free.index_at(150.0);
    assert_eq!(
        bits(&free.history().stn()[..=onset]),
        bits(&boosted.history().stn()[..=onset])
    );
    assert!(boosted.history().stn()[onset + 1] > free.history().stn()[onset + 1]);
}

#[test]
fn test_scheduled_swap_uses_local_copy() {
    let constants = Constants::healthy();
    let mut louder = constants;
    louder.ctx_level = 40.0;
    let config = SimulationConfig {
        schedule: vec![ScheduledSwap {
            time: 100.0,
            constants: louder,
            equilibrium: Some(25.0),
        }],
        ..SimulationConfig::new(200.0, 0.5)
    };

    let mut recorder = Recorder::default();
    let swapped = run_simulation(&constants, config, &mut recorder).unwrap();
    let free = run_zero(&constants, SimulationConfig::new(200.0, 0.5));

    assert_eq!(constants, Constants::healthy());
    let at = swapped.index_at(100.0);
    assert_eq!(
        bits(&free.history().stn()[..at]),
        bits(&swapped.history().stn()[..at])
    );
    assert!(swapped.history().stn()[at] > free.history().stn()[at]);

    // Equilibrium handed over once, right before the controller's call at t = 100.
    let calls_before = at - swapped.prehistory_len();
    assert_eq!(recorder.equilibria, vec![(calls_before, 25.0)]);
}

fn swap(time: f64, ctx_level: f64, equilibrium: Option<f64>) -> ScheduledSwap {
    ScheduledSwap {
        time,
        constants: Constants {
            ctx_level,
            ..Constants::healthy()
        },
        equilibrium,
    }
}

#[test]
fn test_swaps_apply_once_in_order() {
    let dt = 0.5;
    let constants = Constants::healthy();
    // 99.8 and 100 both fall due on the step at t = 100.
    let schedule = vec![
        swap(60.0, 30.0, Some(11.0)),
        swap(99.8, 35.0, Some(22.0)),
        swap(100.0, 40.0, Some(33.0)),
    ];
    let config = |schedule| SimulationConfig {
        schedule,
        ..SimulationConfig::new(200.0, dt)
    };

    let mut recorder = Recorder::default();
    let out = run_simulation(&constants, config(schedule), &mut recorder).unwrap();

    let at_60 = out.index_at(60.0);
    let at_100 = out.index_at(100.0);
    let pre = out.prehistory_len();
    assert_eq!(
        recorder.equilibria,
        vec![(at_60 - pre, 11.0), (at_100 - pre, 22.0), (at_100 - pre, 33.0)]
    );

    // Same trajectory as going straight from 30 to 40 at t = 100.
    let direct = run_zero(
        &constants,
        config(vec![swap(60.0, 30.0, None), swap(100.0, 40.0, None)]),
    );
    assert_eq!(bits(out.history().stn()), bits(direct.history().stn()));

    let first_only = run_zero(&constants, config(vec![swap(60.0, 30.0, None)]));
    assert_eq!(
        bits(&first_only.history().stn()[..at_100]),
        bits(&out.history().stn()[..at_100])
    );
    assert!(out.history().stn()[at_100] > first_only.history().stn()[at_100]);
    assert!(out.history().stn()[at_60] > run_zero(&constants, config(Vec::new())).history().stn()[at_60]);
}

#[test]
fn test_baseline_above_max_rate_runs_finite() {
    let mut constants = Constants::healthy();
    constants.b1 = 400.0;
    constants.c12 = 0.0;
    let out = run_zero(&constants, SimulationConfig::new(50.0, 0.5));
    assert!(out.history().stn().iter().all(|x| x.is_finite()));
    assert!(out.history().gpe().iter().all(|x| x.is_finite()));
}

#[test]
fn test_controller_error_aborts_run() {
    let result = run_simulation(
        &Constants::healthy(),
        SimulationConfig::new(50.0, 0.5),
        &mut Failing,
    );
    assert!(matches!(result, Err(SimError::InsufficientSamples { .. })));
}

#[test]
fn test_bad_constants_fail_before_stepping() {
    let mut constants = Constants::healthy();
    constants.d12 = -6.0;
    let mut recorder = Recorder::default();
    let result = run_simulation(&constants, SimulationConfig::new(50.0, 0.5), &mut recorder);
    assert!(matches!(result, Err(SimError::NegativeDelay { name: "d12", .. })));
    assert!(recorder.lens.is_empty());
}
