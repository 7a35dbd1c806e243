use super::{Control, Controller, latest, positive};
use crate::error::Result;
use crate::history::HistoryView;

const DEFAULT_OMEGA: f64 = 0.01;

/// Stimulation proportional to the STN deviation from a slowly tracked baseline.
#[derive(Clone, Debug)]
pub struct ProportionalController {
    gain: f64,
    omega: f64,
    dt: f64,
    /// Tracked baseline
    w: f64,
    /// Fixed reference replacing the baseline in the error, if set
    equilibrium: Option<f64>,
}

impl ProportionalController {
    pub fn new(gain: f64, dt: f64) -> Result<Self> {
        positive("dt", dt)?;
        Ok(Self {
            gain,
            omega: DEFAULT_OMEGA,
            dt,
            w: 0.0,
            equilibrium: None,
        })
    }

    /// Baseline tracking rate.
    pub fn with_omega(mut self, omega: f64) -> Self {
        self.omega = omega;
        self
    }

    /// Regulate toward a fixed equilibrium instead of the tracked baseline.
    pub fn with_equilibrium(mut self, equilibrium: f64) -> Self {
        self.equilibrium = Some(equilibrium);
        self
    }

    pub fn baseline(&self) -> f64 {
        self.w
    }

    pub fn equilibrium(&self) -> Option<f64> {
        self.equilibrium
    }
}

impl Controller for ProportionalController {
    fn name(&self) -> &'static str {
        "proportional"
    }

    fn update(&mut self, history: HistoryView<'_>) -> Result<Control> {
        let state = latest(&history)?;
        self.w += self.omega * (state.stn - self.w) * self.dt;
        let reference = self.equilibrium.unwrap_or(self.w);
        Ok(Control::new(-self.gain * (state.stn - reference), 0.0))
    }

    fn set_equilibrium(&mut self, equilibrium: f64) {
        self.equilibrium = Some(equilibrium);
    }
}

/// Proportional law plus an integral of the error.
#[derive(Clone, Debug)]
pub struct ProportionalIntegralController {
    proportional_gain: f64,
    integral_gain: f64,
    omega: f64,
    dt: f64,
    w: f64,
    integral: f64,
}

impl ProportionalIntegralController {
    pub fn new(proportional_gain: f64, integral_gain: f64, dt: f64) -> Result<Self> {
        positive("dt", dt)?;
        Ok(Self {
            proportional_gain,
            integral_gain,
            omega: DEFAULT_OMEGA,
            dt,
            w: 0.0,
            integral: 0.0,
        })
    }

    pub fn with_omega(mut self, omega: f64) -> Self {
        self.omega = omega;
        self
    }

    pub fn baseline(&self) -> f64 {
        self.w
    }

    /// Accumulated `∫ gain_I * error dt`.
    pub fn integral(&self) -> f64 {
        self.integral
    }
}

impl Controller for ProportionalIntegralController {
    fn name(&self) -> &'static str {
        "proportional-integral"
    }

    fn update(&mut self, history: HistoryView<'_>) -> Result<Control> {
        let state = latest(&history)?;
        self.w += self.omega * (state.stn - self.w) * self.dt;
        let error = state.stn - self.w;
        self.integral += self.integral_gain * error * self.dt;
        Ok(Control::new(
            -(self.proportional_gain * error) - self.integral,
            0.0,
        ))
    }
}

/// Static law quadratic in the gain. The baseline is tracked but not used
/// by the output.
#[derive(Clone, Debug)]
pub struct MemoryLessController {
    gain: f64,
    beta: f64,
    omega: f64,
    dt: f64,
    w: f64,
}

impl MemoryLessController {
    pub fn new(gain: f64, beta: f64, dt: f64) -> Result<Self> {
        positive("dt", dt)?;
        Ok(Self {
            gain,
            beta,
            omega: DEFAULT_OMEGA,
            dt,
            w: 0.0,
        })
    }

    pub fn with_omega(mut self, omega: f64) -> Self {
        self.omega = omega;
        self
    }

    pub fn baseline(&self) -> f64 {
        self.w
    }
}

impl Controller for MemoryLessController {
    fn name(&self) -> &'static str {
        "memoryless"
    }

    fn update(&mut self, history: HistoryView<'_>) -> Result<Control> {
        let state = latest(&history)?;
        self.w += self.omega * (state.stn - self.w) * self.dt;
        let x = state.stn;
        let stimulation = -self.gain * self.gain * self.beta * x - self.gain * self.beta * x;
        Ok(Control::new(stimulation, 0.0))
    }
}
