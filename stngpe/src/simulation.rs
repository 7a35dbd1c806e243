//! Fixed-step Euler integration of the delayed STN/GPe loop.
//!
//! Time runs from `-max_delay` in steps of `dt`. Every sample with `t <= 0`
//! holds the initial state and is never written again; each later sample
//! depends only on earlier ones, so a delayed lookup never leaves the buffer.
//!
//! `dt` should divide the delays and the gating/onset times. Delays are
//! checked; the other times are compared against the step's time as-is.

use std::f64::consts::PI;

use log::debug;

use crate::activation::{activation_gpe, activation_stn};
use crate::constants::{Constants, ceil_steps};
use crate::controller::{Control, Controller};
use crate::error::{Result, SimError};
use crate::history::{History, HistoryView, State};

pub const DEFAULT_INIT_STATE: State = State::new(20.0, 20.0, 40.0);
/// Controller output is discarded before this time (plus the padding), ms
pub const DEFAULT_CONTROL_START: f64 = 200.0;
/// Onset of step increases in the input (plus the padding), ms
pub const DEFAULT_INCREASE_ONSET: f64 = 750.0;

/// Step increase of the afferent rates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MidIncrease {
    pub onset: f64,
    pub cortical: f64,
    pub striatal: f64,
}

impl MidIncrease {
    /// Cortical-only increase at the default onset.
    pub fn cortical(amount: f64) -> Self {
        Self {
            onset: DEFAULT_INCREASE_ONSET,
            cortical: amount,
            striatal: 0.0,
        }
    }
}

impl From<(f64, f64, f64)> for MidIncrease {
    fn from((onset, cortical, striatal): (f64, f64, f64)) -> Self {
        Self {
            onset,
            cortical,
            striatal,
        }
    }
}

/// Step increase of the cortical oscillation amplitude.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AmplitudeIncrease {
    pub onset: f64,
    pub amount: f64,
}

impl AmplitudeIncrease {
    pub fn new(amount: f64) -> Self {
        Self {
            onset: DEFAULT_INCREASE_ONSET,
            amount,
        }
    }
}

/// Replace the constants (and optionally the controller equilibrium) from `time` on.
#[derive(Clone, Debug, PartialEq)]
pub struct ScheduledSwap {
    pub time: f64,
    pub constants: Constants,
    pub equilibrium: Option<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SimulationConfig {
    /// Simulated time after the padding, ms
    pub simulation_time: f64,
    /// Integration step, ms
    pub dt: f64,
    /// Value of every pre-history sample
    pub init_state: State,
    pub control_start: f64,
    /// Extra time simulated before `simulation_time` so the loop settles;
    /// gating and onset times are shifted by it.
    pub steady_state_pad: f64,
    pub mid_increase: Option<MidIncrease>,
    pub amplitude_increase: Option<AmplitudeIncrease>,
    /// Strictly increasing in time
    pub schedule: Vec<ScheduledSwap>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            simulation_time: 1000.0,
            dt: 0.01,
            init_state: DEFAULT_INIT_STATE,
            control_start: DEFAULT_CONTROL_START,
            steady_state_pad: 0.0,
            mid_increase: None,
            amplitude_increase: None,
            schedule: Vec::new(),
        }
    }
}

impl SimulationConfig {
    pub fn new(simulation_time: f64, dt: f64) -> Self {
        Self {
            simulation_time,
            dt,
            ..Default::default()
        }
    }

    /// Default rates with the given initial θ.
    pub fn with_init_theta(mut self, theta: f64) -> Self {
        self.init_state = State::new(DEFAULT_INIT_STATE.stn, DEFAULT_INIT_STATE.gpe, theta);
        self
    }
}

/// Per-step exogenous input.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Drive {
    cortical: f64,
    striatal: f64,
    oscillation: f64,
}

/// Delays in steps, fixed for a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct DelaySteps {
    d11: usize,
    d12: usize,
    d21: usize,
    d22: usize,
}

impl DelaySteps {
    fn max(&self) -> usize {
        self.d11.max(self.d12).max(self.d21).max(self.d22)
    }
}

/// A validated simulation setup. Each [`Simulation::run`] works on its own
/// buffers and its own copy of the constants.
#[derive(Clone, Debug)]
pub struct Simulation {
    constants: Constants,
    config: SimulationConfig,
    delays: DelaySteps,
    start_time: f64,
    prehistory_len: usize,
    len: usize,
}

impl Simulation {
    pub fn new(constants: &Constants, config: SimulationConfig) -> Result<Self> {
        let dt = config.dt;
        if !(dt.is_finite() && dt > 0.0) {
            return Err(SimError::InvalidStep(dt));
        }
        constants.validate()?;
        let [d11, d12, d21, d22] = constants.delay_steps(dt)?;
        let delays = DelaySteps { d11, d12, d21, d22 };

        check_duration("simulation_time", config.simulation_time, "positive", |v| v > 0.0)?;
        check_duration("steady_state_pad", config.steady_state_pad, "non-negative", |v| v >= 0.0)?;
        check_duration("control_start", config.control_start, "finite", |_| true)?;
        if let Some(m) = config.mid_increase {
            check_duration("mid_increase.onset", m.onset, "finite", |_| true)?;
        }
        if let Some(a) = config.amplitude_increase {
            check_duration("amplitude_increase.onset", a.onset, "finite", |_| true)?;
        }
        check_schedule(constants, &config.schedule)?;

        let max_delay = constants.max_delay();
        let len = ceil_steps(max_delay + config.simulation_time + config.steady_state_pad, dt);
        let prehistory_len = (delays.max() + 1).min(len);

        debug!(
            "simulation: {} samples, dt = {} ms, pre-history {} samples, delays {:?} steps",
            len, dt, prehistory_len, delays
        );

        Ok(Self {
            constants: *constants,
            config,
            delays,
            start_time: -max_delay,
            prehistory_len,
            len,
        })
    }

    /// Total number of samples including the pre-history.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Samples holding the initial state.
    pub fn prehistory_len(&self) -> usize {
        self.prehistory_len
    }

    /// Time of sample `i` in ms.
    pub fn time(&self, i: usize) -> f64 {
        self.start_time + i as f64 * self.config.dt
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Integrate the whole horizon with `controller` in the loop.
    ///
    /// The controller is called once per step, even while its output is
    /// gated off, and any error it returns aborts the run.
    pub fn run(&self, controller: &mut dyn Controller) -> Result<Trajectory> {
        let dt = self.config.dt;
        let gate = self.config.control_start + self.config.steady_state_pad;
        let d = self.delays;

        let mut constants = self.constants;
        let mut history = History::with_prefix(self.len, self.prehistory_len, self.config.init_state);
        let mut control_history = vec![0.0; self.len];
        let mut input_history = vec![0.0; self.len];
        let mut next_swap = 0;
        let mut gate_open = false;

        debug!(
            "running {} controller over {} steps",
            controller.name(),
            self.len - self.prehistory_len
        );

        for i in self.prehistory_len..self.len {
            let t = self.time(i);

            // 1) Scheduled swaps due by now
            while let Some(swap) = self.config.schedule.get(next_swap) {
                if t < swap.time {
                    break;
                }
                constants = swap.constants;
                if let Some(eq) = swap.equilibrium {
                    controller.set_equilibrium(eq);
                }
                debug!("t = {t:.3} ms: applied scheduled swap {next_swap}");
                next_swap += 1;
            }

            // 2) Controller sees everything before this step
            let mut control = controller.update(history.prefix(i))?;

            // 3) Gate the output, not the controller
            if t < gate {
                control = Control::NONE;
            } else if !gate_open {
                gate_open = true;
                debug!("t = {t:.3} ms: control enabled");
            }

            // 4) Exogenous input
            let drive = self.drive(&constants, t);

            // 5) Delayed coupling
            let stn = history.stn();
            let gpe = history.gpe();
            let input_stn = constants.c11 * stn[i - 1 - d.d11]
                + constants.c12 * gpe[i - 1 - d.d12]
                + constants.cctx * drive.cortical;
            let input_gpe = constants.c21 * stn[i - 1 - d.d21]
                + constants.c22 * gpe[i - 1 - d.d22]
                + constants.cstr * drive.striatal;

            // 6) Euler step
            let prev = history.get(i - 1);
            let next = State::new(
                prev.stn
                    + dt / constants.tau1
                        * (activation_stn(input_stn + control.stimulation, &constants) - prev.stn),
                prev.gpe + dt / constants.tau2 * (activation_gpe(input_gpe, &constants) - prev.gpe),
                prev.theta + dt * control.theta_rate,
            );
            history.set(i, next);
            control_history[i] = control.stimulation;
            input_history[i] = drive.oscillation;
        }

        debug!("{} controller finished", controller.name());

        Ok(Trajectory {
            history,
            control: control_history,
            input: input_history,
            dt,
            start_time: self.start_time,
            prehistory_len: self.prehistory_len,
        })
    }

    fn drive(&self, constants: &Constants, t: f64) -> Drive {
        let pad = self.config.steady_state_pad;

        let mut amplitude = constants.amplitude;
        if let Some(inc) = self.config.amplitude_increase {
            if inc.amount > 0.0 && t > inc.onset + pad {
                amplitude += inc.amount;
            }
        }
        let oscillation = amplitude * (2.0 * PI * constants.frequency * t / 1000.0).sin();

        let mut cortical = constants.ctx_level + oscillation;
        let mut striatal = constants.str_level;
        // Step increases only ever raise the input
        if let Some(inc) = self.config.mid_increase {
            if t > inc.onset + pad {
                if inc.cortical > 0.0 {
                    cortical += inc.cortical;
                }
                if inc.striatal > 0.0 {
                    striatal += inc.striatal;
                }
            }
        }

        Drive {
            cortical,
            striatal,
            oscillation,
        }
    }
}

fn check_duration(
    name: &'static str,
    value: f64,
    requirement: &'static str,
    ok: impl Fn(f64) -> bool,
) -> Result<()> {
    if value.is_finite() && ok(value) {
        Ok(())
    } else {
        Err(SimError::InvalidDuration {
            name,
            requirement,
            value,
        })
    }
}

fn check_schedule(base: &Constants, schedule: &[ScheduledSwap]) -> Result<()> {
    let mut previous = f64::NEG_INFINITY;
    for (index, swap) in schedule.iter().enumerate() {
        if !swap.time.is_finite() || swap.time <= previous {
            return Err(SimError::ScheduleOrder {
                index,
                time: swap.time,
                previous,
            });
        }
        previous = swap.time;

        swap.constants.validate()?;
        for ((name, fixed), (_, swapped)) in base.delays().into_iter().zip(swap.constants.delays()) {
            if fixed != swapped {
                return Err(SimError::ScheduledDelayChange { index, name });
            }
        }
    }
    Ok(())
}

/// Run one simulation with a fresh local copy of `constants`.
pub fn run_simulation(
    constants: &Constants,
    config: SimulationConfig,
    controller: &mut dyn Controller,
) -> Result<Trajectory> {
    Simulation::new(constants, config)?.run(controller)
}

/// Result of a run: the state history plus the applied stimulation and the
/// cortical oscillation, all aligned by sample index.
#[derive(Clone, Debug)]
pub struct Trajectory {
    history: History,
    control: Vec<f64>,
    input: Vec<f64>,
    dt: f64,
    start_time: f64,
    prehistory_len: usize,
}

impl Trajectory {
    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn prehistory_len(&self) -> usize {
        self.prehistory_len
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Stimulation actually applied at each sample.
    pub fn control(&self) -> &[f64] {
        &self.control
    }

    /// Cortical oscillation at each sample.
    pub fn input(&self) -> &[f64] {
        &self.input
    }

    pub fn time(&self, i: usize) -> f64 {
        self.start_time + i as f64 * self.dt
    }

    pub fn times(&self) -> impl Iterator<Item = f64> + '_ {
        (0..self.len()).map(|i| self.time(i))
    }

    /// First sample index whose time is at least `t` (clamped to the length).
    pub fn index_at(&self, t: f64) -> usize {
        let steps = ((t - self.start_time) / self.dt - 1e-9).ceil();
        (steps.max(0.0) as usize).min(self.len())
    }

    /// States from time `t` on, e.g. everything after the steady-state pad.
    pub fn after(&self, t: f64) -> HistoryView<'_> {
        let start = self.index_at(t);
        self.history.view().tail(self.len() - start)
    }

    pub fn control_after(&self, t: f64) -> &[f64] {
        &self.control[self.index_at(t)..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::ZeroController;

    fn small_config() -> SimulationConfig {
        SimulationConfig::new(100.0, 0.5)
    }

    #[test]
    fn test_lengths_and_time_axis() {
        let sim = Simulation::new(&Constants::healthy(), small_config()).unwrap();
        // (6 + 100) / 0.5
        assert_eq!(sim.len(), 212);
        // 6 ms of delay at 0.5 ms plus the sample at t = 0
        assert_eq!(sim.prehistory_len(), 13);
        assert_eq!(sim.time(0), -6.0);
        assert_eq!(sim.time(12), 0.0);
        assert_eq!(sim.time(13), 0.5);
    }

    #[test]
    fn test_padding_extends_horizon() {
        let config = SimulationConfig {
            steady_state_pad: 50.0,
            ..small_config()
        };
        let sim = Simulation::new(&Constants::healthy(), config).unwrap();
        assert_eq!(sim.len(), 312);
    }

    #[test]
    fn test_invalid_step_rejected() {
        for dt in [0.0, -0.1, f64::NAN, f64::INFINITY] {
            let config = SimulationConfig::new(100.0, dt);
            assert!(matches!(
                Simulation::new(&Constants::healthy(), config),
                Err(SimError::InvalidStep(_))
            ));
        }
    }

    #[test]
    fn test_fractional_delay_rejected() {
        let config = SimulationConfig::new(100.0, 0.7);
        assert!(matches!(
            Simulation::new(&Constants::healthy(), config),
            Err(SimError::FractionalDelay { name: "d12", .. })
        ));
    }

    #[test]
    fn test_bad_durations_rejected() {
        let config = SimulationConfig::new(0.0, 0.5);
        assert!(matches!(
            Simulation::new(&Constants::healthy(), config),
            Err(SimError::InvalidDuration {
                name: "simulation_time",
                ..
            })
        ));
        let config = SimulationConfig {
            steady_state_pad: -1.0,
            ..small_config()
        };
        assert!(matches!(
            Simulation::new(&Constants::healthy(), config),
            Err(SimError::InvalidDuration {
                name: "steady_state_pad",
                ..
            })
        ));
    }

    #[test]
    fn test_schedule_must_increase() {
        let swap = |time| ScheduledSwap {
            time,
            constants: Constants::healthy(),
            equilibrium: None,
        };
        let config = SimulationConfig {
            schedule: vec![swap(50.0), swap(50.0)],
            ..small_config()
        };
        assert!(matches!(
            Simulation::new(&Constants::healthy(), config),
            Err(SimError::ScheduleOrder { index: 1, .. })
        ));
    }

    #[test]
    fn test_schedule_cannot_change_delays() {
        let mut changed = Constants::healthy();
        changed.d22 = 5.0;
        let config = SimulationConfig {
            schedule: vec![ScheduledSwap {
                time: 10.0,
                constants: changed,
                equilibrium: None,
            }],
            ..small_config()
        };
        assert!(matches!(
            Simulation::new(&Constants::healthy(), config),
            Err(SimError::ScheduledDelayChange { index: 0, name: "d22" })
        ));
    }

    #[test]
    fn test_drive_step_increases() {
        let mut constants = Constants::healthy();
        constants.amplitude = 2.0;
        constants.frequency = 250.0;
        let config = SimulationConfig {
            steady_state_pad: 10.0,
            mid_increase: Some((20.0, 5.0, 3.0).into()),
            amplitude_increase: Some(AmplitudeIncrease {
                onset: 20.0,
                amount: 1.0,
            }),
            ..small_config()
        };
        let sim = Simulation::new(&constants, config).unwrap();

        // 250 Hz: t = 1 ms is a quarter period, sin = 1
        let before = sim.drive(&constants, 1.0);
        assert!((before.oscillation - 2.0).abs() < 1e-12);
        assert!((before.cortical - 29.0).abs() < 1e-12);
        assert_eq!(before.striatal, 2.0);

        // onset 20 + pad 10, strictly after
        let at_onset = sim.drive(&constants, 30.0);
        assert_eq!(at_onset.striatal, 2.0);

        let after = sim.drive(&constants, 33.0);
        assert!((after.oscillation - 3.0).abs() < 1e-9);
        assert!((after.cortical - (27.0 + 3.0 + 5.0)).abs() < 1e-9);
        assert_eq!(after.striatal, 5.0);
    }

    #[test]
    fn test_non_positive_increases_ignored() {
        let mut constants = Constants::healthy();
        constants.amplitude = 2.0;
        constants.frequency = 250.0;
        let config = SimulationConfig {
            mid_increase: Some((20.0, -5.0, 0.0).into()),
            amplitude_increase: Some(AmplitudeIncrease {
                onset: 20.0,
                amount: -1.0,
            }),
            ..small_config()
        };
        let sim = Simulation::new(&constants, config).unwrap();
        let plain = Simulation::new(&constants, small_config()).unwrap();
        for t in [1.0, 21.0, 23.0, 80.0] {
            assert_eq!(sim.drive(&constants, t), plain.drive(&constants, t), "t = {t}");
        }

        // Mixed signs: only the positive part applies.
        let config = SimulationConfig {
            mid_increase: Some((20.0, -5.0, 3.0).into()),
            ..small_config()
        };
        let sim = Simulation::new(&constants, config).unwrap();
        let after = sim.drive(&constants, 23.0);
        let before = plain.drive(&constants, 23.0);
        assert_eq!(after.cortical, before.cortical);
        assert_eq!(after.striatal, before.striatal + 3.0);
    }

    #[test]
    fn test_trajectory_index_helpers() {
        let sim = Simulation::new(&Constants::healthy(), small_config()).unwrap();
        let out = sim.run(&mut ZeroController).unwrap();
        assert_eq!(out.index_at(0.0), 12);
        assert_eq!(out.index_at(-100.0), 0);
        assert_eq!(out.index_at(1e9), out.len());
        assert_eq!(out.after(50.0).len(), out.len() - 112);
        assert_eq!(out.times().next(), Some(-6.0));
        assert_eq!(out.control_after(0.0).len(), out.len() - 12);
    }
}
