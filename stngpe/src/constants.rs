use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};

/// Names in vector order. Index `i` of [`Constants::to_array`] is `NAMES[i]`.
pub const NAMES: [&str; Constants::LEN] = [
    "tau1", "tau2", "c11", "c12", "c21", "c22", "d11", "d12", "d21", "d22", "m1", "b1", "m2", "b2",
    "cctx", "cstr", "amplitude", "frequency", "ctx_level", "str_level",
];

/// The 20 model parameters of the STN/GPe loop.
///
/// Times are in ms, rates in spk/s, frequency in Hz.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Constants {
    // ----------------------- Leaky integrators
    /// STN time constant
    pub tau1: f64,
    /// GPe time constant
    pub tau2: f64,

    // ----------------------- Connectivity (receiver, sender)
    pub c11: f64,
    pub c12: f64,
    pub c21: f64,
    pub c22: f64,

    // ----------------------- Transmission delays
    pub d11: f64,
    pub d12: f64,
    pub d21: f64,
    pub d22: f64,

    // ----------------------- Sigmoid shape: saturation m, baseline b
    pub m1: f64,
    pub b1: f64,
    pub m2: f64,
    pub b2: f64,

    // ----------------------- Afferent gains
    pub cctx: f64,
    pub cstr: f64,

    // ----------------------- Exogenous input
    /// Cortical oscillation amplitude
    pub amplitude: f64,
    /// Cortical oscillation frequency
    pub frequency: f64,
    /// Mean cortical rate
    pub ctx_level: f64,
    /// Mean striatal rate
    pub str_level: f64,
}

impl Default for Constants {
    fn default() -> Self {
        Self::healthy()
    }
}

impl Constants {
    pub const LEN: usize = 20;

    /// Published healthy-state parameter set.
    pub fn healthy() -> Self {
        Self {
            tau1: 6.0,
            tau2: 14.0,
            c11: 0.0,
            c12: -1.12,
            c21: 19.0,
            c22: -6.6,
            d11: 0.0,
            d12: 6.0,
            d21: 6.0,
            d22: 4.0,
            m1: 300.0,
            b1: 17.0,
            m2: 400.0,
            b2: 75.0,
            cctx: 2.42,
            cstr: -15.1,
            amplitude: 0.0,
            frequency: 80.0,
            ctx_level: 27.0,
            str_level: 2.0,
        }
    }

    /// Build from a flat vector in [`NAMES`] order.
    pub fn from_slice(values: &[f64]) -> Result<Self> {
        let v: &[f64; Self::LEN] = values.try_into().map_err(|_| SimError::ConstantsLength {
            expected: Self::LEN,
            actual: values.len(),
        })?;
        Ok(Self {
            tau1: v[0],
            tau2: v[1],
            c11: v[2],
            c12: v[3],
            c21: v[4],
            c22: v[5],
            d11: v[6],
            d12: v[7],
            d21: v[8],
            d22: v[9],
            m1: v[10],
            b1: v[11],
            m2: v[12],
            b2: v[13],
            cctx: v[14],
            cstr: v[15],
            amplitude: v[16],
            frequency: v[17],
            ctx_level: v[18],
            str_level: v[19],
        })
    }

    pub fn to_array(&self) -> [f64; Self::LEN] {
        [
            self.tau1,
            self.tau2,
            self.c11,
            self.c12,
            self.c21,
            self.c22,
            self.d11,
            self.d12,
            self.d21,
            self.d22,
            self.m1,
            self.b1,
            self.m2,
            self.b2,
            self.cctx,
            self.cstr,
            self.amplitude,
            self.frequency,
            self.ctx_level,
            self.str_level,
        ]
    }

    /// Delays as `(name, value)` in d11, d12, d21, d22 order.
    pub fn delays(&self) -> [(&'static str, f64); 4] {
        [
            ("d11", self.d11),
            ("d12", self.d12),
            ("d21", self.d21),
            ("d22", self.d22),
        ]
    }

    pub fn max_delay(&self) -> f64 {
        self.delays()
            .iter()
            .map(|&(_, d)| d)
            .fold(0.0, f64::max)
    }

    /// Check everything that does not depend on the integration step.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in NAMES.into_iter().zip(self.to_array()) {
            if !value.is_finite() {
                return Err(SimError::NonFiniteConstant { name, value });
            }
        }
        for (name, value) in [("tau1", self.tau1), ("tau2", self.tau2)] {
            if value <= 0.0 {
                return Err(SimError::InvalidTimeConstant { name, value });
            }
        }
        for (name, value) in self.delays() {
            if value < 0.0 {
                return Err(SimError::NegativeDelay { name, value });
            }
        }
        Ok(())
    }

    /// Convert every delay to a whole number of steps.
    ///
    /// Fails when a delay is negative or lies further than a rounding error
    /// away from a multiple of `dt`.
    pub fn delay_steps(&self, dt: f64) -> Result<[usize; 4]> {
        let mut steps = [0usize; 4];
        for (slot, (name, value)) in steps.iter_mut().zip(self.delays()) {
            if value < 0.0 {
                return Err(SimError::NegativeDelay { name, value });
            }
            *slot = whole_steps(value, dt).ok_or(SimError::FractionalDelay { name, value, dt })?;
        }
        Ok(steps)
    }
}

/// `value / dt` as an integer if it is one up to floating-point noise.
pub(crate) fn whole_steps(value: f64, dt: f64) -> Option<usize> {
    let ratio = value / dt;
    let rounded = ratio.round();
    if (ratio - rounded).abs() <= 1e-9 * rounded.max(1.0) {
        Some(rounded as usize)
    } else {
        None
    }
}

/// `floor(value / dt)`, tolerant of `value / dt` landing just below an integer.
pub(crate) fn floor_steps(value: f64, dt: f64) -> usize {
    let ratio = value / dt;
    match whole_steps(value, dt) {
        Some(steps) => steps,
        None => ratio.floor().max(0.0) as usize,
    }
}

/// `ceil(value / dt)`, tolerant of `value / dt` landing just above an integer.
pub(crate) fn ceil_steps(value: f64, dt: f64) -> usize {
    let ratio = value / dt;
    match whole_steps(value, dt) {
        Some(steps) => steps,
        None => ratio.ceil().max(0.0) as usize,
    }
}
