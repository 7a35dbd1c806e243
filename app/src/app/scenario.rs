use log::info;
use rayon::prelude::*;
use stngpe::{Constants, MidIncrease, SimulationConfig, State, run_simulation};

use super::{ControllerKind, ControllerParams, Summary};

const COMPARED: [ControllerKind; 4] = [
    ControllerKind::Zero,
    ControllerKind::Proportional,
    ControllerKind::Adaptive,
    ControllerKind::MemoryLess,
];

/// A fixed setup every compared controller is run against.
#[derive(Clone, Debug)]
pub struct Scenario {
    pub name: &'static str,
    pub constants: Constants,
    pub config: SimulationConfig,
    pub params: ControllerParams,
    /// The memory-less law gets its own gain
    pub memory_less_gain: f64,
}

impl Scenario {
    fn base(name: &'static str, constants: Constants, mid_increase: MidIncrease) -> Self {
        Self {
            name,
            constants,
            config: SimulationConfig {
                init_state: State::new(20.0, 20.0, 0.0),
                steady_state_pad: 1000.0,
                mid_increase: Some(mid_increase),
                ..SimulationConfig::new(3000.0, 0.01)
            },
            params: ControllerParams {
                gain: 1.0,
                integral_gain: 0.0,
                beta: 3.0,
                sigma: 0.1,
                tau_theta: 75.0,
                tail_len: stngpe::controller::DEFAULT_TAIL_LEN,
                threshold: 1.0,
                mu_min: -100.0,
                mu_max: 100.0,
                deadband_tail: 1000,
                equilibrium: None,
            },
            memory_less_gain: 1.0,
        }
    }

    /// Strong loop coupling oscillates on its own; the step in cortical
    /// drive at 750 ms pushes it further.
    pub fn endogenous() -> Self {
        let constants = Constants {
            c12: -3.0,
            c21: 10.0,
            c22: -0.9,
            cctx: 5.0,
            cstr: -139.4,
            ..Constants::healthy()
        };
        let mut s = Self::base("endogenous", constants, (750.0, 15.0, 0.0).into());
        s.params.sigma = 0.19;
        s.params.gain = 2.0;
        s
    }

    /// Healthy loop entrained by a 20 Hz cortical oscillation.
    pub fn cortical() -> Self {
        let constants = Constants {
            c22: -0.9,
            amplitude: 10.0,
            frequency: 20.0,
            ctx_level: 50.0,
            ..Constants::healthy()
        };
        let mut s = Self::base("cortical", constants, (750.0, 10.0, 50.0).into());
        s.params.sigma = 0.01;
        s.params.tau_theta = 5.0;
        s.params.gain = 25.0;
        s.memory_less_gain = 4.0;
        s
    }

    /// Run every compared controller in parallel, results in a fixed order.
    pub fn run_all(&self) -> anyhow::Result<Vec<Summary>> {
        info!(
            "scenario {}: {} controllers, {} ms at dt = {} ms",
            self.name,
            COMPARED.len(),
            self.config.simulation_time,
            self.config.dt
        );

        COMPARED
            .par_iter()
            .map(|&kind| -> anyhow::Result<Summary> {
                let params = self.params_for(kind);
                let mut controller = kind.build(&params, self.config.dt)?;
                let out = run_simulation(&self.constants, self.config.clone(), controller.as_mut())?;
                info!("{}: {} done", self.name, controller.name());
                Ok(Summary::new(controller.name(), &out, &self.config))
            })
            .collect()
    }

    fn params_for(&self, kind: ControllerKind) -> ControllerParams {
        let mut params = self.params.clone();
        if kind == ControllerKind::MemoryLess {
            params.gain = self.memory_less_gain;
        }
        params
    }
}
