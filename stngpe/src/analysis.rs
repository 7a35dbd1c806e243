//! Amplitude measures over simulated traces.

use crate::constants::floor_steps;
use crate::error::Result;
use crate::filter;

/// Decimation applied before band-pass filtering a trace.
pub const DECIMATION: usize = 10;
/// Butterworth order of the analysis band-pass.
pub const BAND_ORDER: usize = 5;

/// A frequency band in Hz.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Band {
    pub low_hz: f64,
    pub high_hz: f64,
}

impl Band {
    /// Narrow beta band used for loop-oscillation sweeps.
    pub const BETA: Band = Band {
        low_hz: 16.0,
        high_hz: 24.0,
    };
}

/// Max minus min; 0 for an empty slice.
pub fn peak_to_peak(signal: &[f64]) -> f64 {
    if signal.is_empty() {
        return 0.0;
    }
    let (lo, hi) = signal
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    hi - lo
}

/// Peak-to-peak of the trailing `tail_ms` of a trace sampled every `dt` ms.
pub fn raw_amplitude(signal: &[f64], dt: f64, tail_ms: f64) -> f64 {
    let n = (tail_ms / dt).ceil() as usize;
    peak_to_peak(&signal[signal.len().saturating_sub(n)..])
}

/// Band-limited peak-to-peak amplitude of the trailing `tail_ms` of a trace.
///
/// The whole trace is decimated and filtered first so the window is free of
/// filter edge effects; only then is the tail cut.
pub fn band_amplitude(signal: &[f64], dt: f64, tail_ms: f64, band: Band) -> Result<f64> {
    let decimated = filter::decimate(signal, DECIMATION)?;
    let sample_rate_hz = 1000.0 / (dt * DECIMATION as f64);
    let filtered = filter::bandpass_filter(
        &decimated,
        band.low_hz,
        band.high_hz,
        sample_rate_hz,
        BAND_ORDER,
    )?;
    let n = floor_steps(tail_ms, dt) / DECIMATION;
    Ok(peak_to_peak(&filtered[filtered.len().saturating_sub(n)..]))
}
