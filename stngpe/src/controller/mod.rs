//! Closed-loop stimulation laws.
//!
//! Every controller sees the history strictly before the step being computed
//! and answers with a stimulation added to the STN input plus the rate of
//! change of θ. Internal state (baseline, integral) advances once per call,
//! whether or not the simulator ends up applying the output.

mod adaptive;
mod proportional;

pub use adaptive::{
    AdaptiveController, AdaptiveDeadbandController, AdaptiveFilterController, DEFAULT_TAIL_LEN,
};
pub use proportional::{MemoryLessController, ProportionalController, ProportionalIntegralController};

use crate::error::{Result, SimError};
use crate::history::{HistoryView, State};

/// Controller output for one step.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Control {
    /// Added to the STN linear input
    pub stimulation: f64,
    /// dθ/dt
    pub theta_rate: f64,
}

impl Control {
    pub const NONE: Control = Control {
        stimulation: 0.0,
        theta_rate: 0.0,
    };

    pub const fn new(stimulation: f64, theta_rate: f64) -> Self {
        Self {
            stimulation,
            theta_rate,
        }
    }
}

/// Common contract of all control laws.
pub trait Controller: Send {
    /// Short identifier for logs.
    fn name(&self) -> &'static str;

    /// Compute the control for the step following `history`.
    fn update(&mut self, history: HistoryView<'_>) -> Result<Control>;

    /// Replace the equilibrium the controller regulates toward.
    ///
    /// Laws without a fixed equilibrium ignore this.
    fn set_equilibrium(&mut self, _equilibrium: f64) {}
}

/// Never stimulates, never adapts.
#[derive(Clone, Copy, Debug, Default)]
pub struct ZeroController;

impl Controller for ZeroController {
    fn name(&self) -> &'static str {
        "zero"
    }

    fn update(&mut self, _history: HistoryView<'_>) -> Result<Control> {
        Ok(Control::NONE)
    }
}

fn latest(history: &HistoryView<'_>) -> Result<State> {
    history.last().ok_or(SimError::EmptyHistory)
}

fn positive(name: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(SimError::InvalidParameter {
            name,
            reason: format!("must be positive and finite, got {value}"),
        })
    }
}
