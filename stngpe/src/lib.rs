//! Delayed STN/GPe rate model under closed-loop stimulation.
//!
//! Two leaky populations with sigmoid activations are coupled through
//! discrete transmission delays and integrated with a fixed-step Euler
//! scheme. A [`Controller`] observes the trajectory so far and returns a
//! stimulation for the STN plus the rate of change of the adaptive gain θ.

pub mod activation;
pub mod analysis;
pub mod constants;
pub mod controller;
pub mod error;
pub mod filter;
pub mod history;
pub mod render;
pub mod simulation;

pub use constants::Constants;
pub use controller::{
    AdaptiveController, AdaptiveDeadbandController, AdaptiveFilterController, Control, Controller,
    MemoryLessController, ProportionalController, ProportionalIntegralController, ZeroController,
};
pub use error::{Result, SimError};
pub use history::{History, HistoryView, State};
pub use simulation::{
    AmplitudeIncrease, MidIncrease, ScheduledSwap, Simulation, SimulationConfig, Trajectory,
    run_simulation,
};
