use super::{Control, Controller, latest, positive};
use crate::analysis::peak_to_peak;
use crate::constants::floor_steps;
use crate::error::{Result, SimError};
use crate::filter::{self, Coefficients};
use crate::history::{HistoryView, State};

const DEFAULT_OMEGA: f64 = 0.1;
/// Trailing window for amplitude estimates, ms
pub const DEFAULT_TAIL_LEN: f64 = 500.0;

// ----------------------- Amplitude estimation for the filter variant
const DECIMATION: usize = 10;
const BAND_LOW_HZ: f64 = 15.0;
const BAND_HIGH_HZ: f64 = 30.0;
const BAND_ORDER: usize = 5;

fn theta_rate(error: f64, sigma: f64, theta: f64, tau_theta: f64) -> f64 {
    (error.abs() - sigma * theta) / tau_theta
}

/// Proportional law whose gain is θ itself; θ grows with the error magnitude
/// and decays with `sigma`.
#[derive(Clone, Debug)]
pub struct AdaptiveController {
    sigma: f64,
    tau_theta: f64,
    omega: f64,
    dt: f64,
    w: f64,
}

impl AdaptiveController {
    pub fn new(sigma: f64, tau_theta: f64, dt: f64) -> Result<Self> {
        positive("dt", dt)?;
        positive("tau_theta", tau_theta)?;
        Ok(Self {
            sigma,
            tau_theta,
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

impl Controller for AdaptiveController {
    fn name(&self) -> &'static str {
        "adaptive"
    }

    fn update(&mut self, history: HistoryView<'_>) -> Result<Control> {
        let state = latest(&history)?;
        // Output uses the baseline before this step's update, the θ law after it.
        let stimulation = -state.theta * (state.stn - self.w);
        self.w += self.omega * (state.stn - self.w) * self.dt;
        let rate = theta_rate(state.stn - self.w, self.sigma, state.theta, self.tau_theta);
        Ok(Control::new(stimulation, rate))
    }
}

/// Adaptive law where θ follows the beta-band amplitude of the STN rate over
/// a trailing window instead of the instantaneous error.
///
/// Until the window is full the output is zero, but the baseline keeps
/// tracking the raw STN rate every call.
#[derive(Clone, Debug)]
pub struct AdaptiveFilterController {
    sigma: f64,
    tau_theta: f64,
    omega: f64,
    dt: f64,
    w: f64,
    /// Window length in samples
    samples: usize,
    deadzone: f64,
    anti_alias: Coefficients,
    band: Coefficients,
}

impl AdaptiveFilterController {
    /// `tail_len` is the trailing window in ms.
    pub fn new(sigma: f64, tau_theta: f64, dt: f64, tail_len: f64) -> Result<Self> {
        positive("dt", dt)?;
        positive("tau_theta", tau_theta)?;
        positive("tail_len", tail_len)?;

        let samples = floor_steps(tail_len, dt);
        let decimated = samples.div_ceil(DECIMATION);
        let anti_alias = filter::decimation_lowpass(DECIMATION)?;
        let sample_rate_hz = 1000.0 / (dt * DECIMATION as f64);
        let band = filter::butter_bandpass(BAND_ORDER, BAND_LOW_HZ, BAND_HIGH_HZ, sample_rate_hz)
            .map_err(|e| SimError::InvalidParameter {
                name: "dt",
                reason: e.to_string(),
            })?;
        if decimated <= band.edge_len() {
            return Err(SimError::InvalidParameter {
                name: "tail_len",
                reason: format!(
                    "{samples} samples decimate to {decimated}, need more than {}",
                    band.edge_len()
                ),
            });
        }

        Ok(Self {
            sigma,
            tau_theta,
            omega: DEFAULT_OMEGA,
            dt,
            w: 0.0,
            samples,
            deadzone: 0.0,
            anti_alias,
            band,
        })
    }

    pub fn with_omega(mut self, omega: f64) -> Self {
        self.omega = omega;
        self
    }

    /// Amplitudes below `deadzone` count as zero.
    pub fn with_deadzone(mut self, deadzone: f64) -> Self {
        self.deadzone = deadzone;
        self
    }

    pub fn baseline(&self) -> f64 {
        self.w
    }

    /// History length needed before the law engages.
    pub fn samples_required(&self) -> usize {
        self.samples
    }

    /// Peak-to-peak beta amplitude of the STN trace in `window`.
    pub fn amplitude(&self, window: HistoryView<'_>) -> Result<f64> {
        let decimated = filter::decimate_with(&self.anti_alias, window.stn(), DECIMATION)?;
        let banded = filter::filtfilt(&self.band, &decimated)?;
        let e = peak_to_peak(&banded);
        Ok(if e < self.deadzone { 0.0 } else { e })
    }

    fn update_baseline(&mut self, state: State) {
        self.w += self.omega * (state.stn - self.w) * self.dt;
    }
}

impl Controller for AdaptiveFilterController {
    fn name(&self) -> &'static str {
        "adaptive-filter"
    }

    fn update(&mut self, history: HistoryView<'_>) -> Result<Control> {
        let state = latest(&history)?;
        if history.len() < self.samples {
            self.update_baseline(state);
            return Ok(Control::NONE);
        }

        let stimulation = -state.theta * (state.stn - self.w);
        self.update_baseline(state);
        let error = self.amplitude(history.tail(self.samples))?;
        let rate = theta_rate(error, self.sigma, state.theta, self.tau_theta);
        Ok(Control::new(stimulation, rate))
    }
}

/// Saturated proportional law gated by the raw STN peak-to-peak amplitude.
///
/// Stateless apart from its hyperparameters.
#[derive(Clone, Debug)]
pub struct AdaptiveDeadbandController {
    sigma: f64,
    tau_theta: f64,
    /// λ: amplitude below which nothing happens
    threshold: f64,
    mu_min: f64,
    mu_max: f64,
    /// Window length in samples
    tail_len: usize,
}

impl AdaptiveDeadbandController {
    pub fn new(
        sigma: f64,
        tau_theta: f64,
        threshold: f64,
        (mu_min, mu_max): (f64, f64),
        tail_len: usize,
    ) -> Result<Self> {
        positive("tau_theta", tau_theta)?;
        if tail_len == 0 {
            return Err(SimError::InvalidParameter {
                name: "tail_len",
                reason: "window must hold at least one sample".into(),
            });
        }
        if !(mu_min <= mu_max) {
            return Err(SimError::InvalidParameter {
                name: "mu_min",
                reason: format!("saturation range [{mu_min}, {mu_max}] is empty"),
            });
        }
        Ok(Self {
            sigma,
            tau_theta,
            threshold,
            mu_min,
            mu_max,
            tail_len,
        })
    }
}

impl Controller for AdaptiveDeadbandController {
    fn name(&self) -> &'static str {
        "adaptive-deadband"
    }

    fn update(&mut self, history: HistoryView<'_>) -> Result<Control> {
        let state = latest(&history)?;
        let error = peak_to_peak(history.tail(self.tail_len).stn());

        let stimulation = if error < self.threshold {
            0.0
        } else {
            -(state.stn * state.theta).clamp(self.mu_min, self.mu_max)
        };
        let rect = (error - self.threshold).max(0.0);
        let rate = (rect - self.sigma * state.theta) / self.tau_theta;
        Ok(Control::new(stimulation, rate))
    }
}
