//! Error types for stngpe

use thiserror::Error;

/// Simulation error type
#[derive(Debug, Error)]
pub enum SimError {
    /// Constants vector has the wrong number of entries
    #[error("constants vector must have {expected} entries, got {actual}")]
    ConstantsLength { expected: usize, actual: usize },

    /// A constant is NaN or infinite
    #[error("constant `{name}` is not finite: {value}")]
    NonFiniteConstant { name: &'static str, value: f64 },

    /// Leaky-integrator time constant must be positive
    #[error("time constant `{name}` must be positive, got {value}")]
    InvalidTimeConstant { name: &'static str, value: f64 },

    /// Integration step must be positive and finite
    #[error("integration step must be positive and finite, got {0}")]
    InvalidStep(f64),

    /// A duration (simulation time, padding, onset) is out of range
    #[error("`{name}` must be finite and {requirement}, got {value}")]
    InvalidDuration {
        name: &'static str,
        requirement: &'static str,
        value: f64,
    },

    /// Transmission delay below zero
    #[error("delay `{name}` must be non-negative, got {value}")]
    NegativeDelay { name: &'static str, value: f64 },

    /// Transmission delay is not a whole number of integration steps
    #[error("delay `{name}` = {value} is not a whole multiple of dt = {dt}")]
    FractionalDelay { name: &'static str, value: f64, dt: f64 },

    /// Scheduled swap times must be strictly increasing
    #[error("scheduled swap {index} at t = {time} does not follow previous swap at t = {previous}")]
    ScheduleOrder {
        index: usize,
        time: f64,
        previous: f64,
    },

    /// A scheduled constants swap tried to change a delay
    #[error("scheduled swap {index} changes delay `{name}`; delays are fixed for a run")]
    ScheduledDelayChange { index: usize, name: &'static str },

    /// Controller hyperparameter is invalid
    #[error("invalid controller parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// Decimation factor must exceed one
    #[error("decimation factor must be greater than 1, got {0}")]
    InvalidDecimationFactor(usize),

    /// Signal too short for the filter's edge padding
    #[error("insufficient samples: need more than {required}, got {actual}")]
    InsufficientSamples { required: usize, actual: usize },

    /// Pass band is empty or lies outside (0, nyquist)
    #[error("invalid pass band [{low_hz}, {high_hz}] Hz for nyquist {nyquist_hz} Hz")]
    InvalidBand {
        low_hz: f64,
        high_hz: f64,
        nyquist_hz: f64,
    },

    /// Steady-state filter state has no solution (a pole sits at z = 1)
    #[error("filter has a pole at z = 1; no steady-state initial conditions")]
    SingularFilter,

    /// Controller called with no history at all
    #[error("controller called with an empty history view")]
    EmptyHistory,
}

pub type Result<T> = std::result::Result<T, SimError>;
