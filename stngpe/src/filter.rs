//! Digital filtering for amplitude estimation.
//!
//! IIR designs go analog prototype -> frequency transform -> bilinear
//! transform -> transfer function, all in zero/pole/gain form until the last
//! step. Zero-phase filtering runs the filter forward then backward over an
//! odd extension of the signal, with the initial conditions set to the step
//! response steady state so the edges do not ring.

use std::f64::consts::PI;

use nalgebra::{Complex, DMatrix, DVector};

use crate::error::{Result, SimError};

/// Chebyshev type I order used for anti-aliasing before subsampling.
pub const DECIMATION_ORDER: usize = 8;
/// Pass-band ripple of the anti-aliasing filter in dB.
pub const DECIMATION_RIPPLE_DB: f64 = 0.05;

/// Sampling rate used internally for the bilinear transform.
const DESIGN_FS: f64 = 2.0;

/// Transfer-function coefficients, highest power first, normalised so `a[0] == 1`.
#[derive(Clone, Debug, PartialEq)]
pub struct Coefficients {
    pub b: Vec<f64>,
    pub a: Vec<f64>,
}

impl Coefficients {
    /// Number of taps after padding `b` and `a` to equal length.
    pub fn taps(&self) -> usize {
        self.b.len().max(self.a.len())
    }

    /// Samples added on each side of the signal by [`filtfilt`].
    pub fn edge_len(&self) -> usize {
        3 * self.taps()
    }
}

// ----------------------- Zero / pole / gain design

#[derive(Clone, Debug)]
struct Zpk {
    zeros: Vec<Complex<f64>>,
    poles: Vec<Complex<f64>>,
    gain: f64,
}

impl Zpk {
    fn relative_degree(&self) -> usize {
        self.poles.len() - self.zeros.len()
    }

    /// Analog Butterworth low-pass prototype with unit cutoff.
    fn butterworth(order: usize) -> Self {
        let n = order as f64;
        let poles = (0..order)
            .map(|j| {
                let m = -(n - 1.0) + 2.0 * j as f64;
                -Complex::from_polar(1.0, PI * m / (2.0 * n))
            })
            .collect();
        Self {
            zeros: Vec::new(),
            poles,
            gain: 1.0,
        }
    }

    /// Analog Chebyshev type I low-pass prototype with `ripple_db` pass-band ripple.
    fn chebyshev1(order: usize, ripple_db: f64) -> Self {
        let n = order as f64;
        let eps = (10f64.powf(0.1 * ripple_db) - 1.0).sqrt();
        let mu = (1.0 / eps).asinh() / n;
        let poles: Vec<Complex<f64>> = (0..order)
            .map(|j| {
                let m = -(n - 1.0) + 2.0 * j as f64;
                -Complex::new(mu, PI * m / (2.0 * n)).sinh()
            })
            .collect();
        let mut gain = poles
            .iter()
            .fold(Complex::new(1.0, 0.0), |acc, p| acc * -p)
            .re;
        if order % 2 == 0 {
            gain /= (1.0 + eps * eps).sqrt();
        }
        Self {
            zeros: Vec::new(),
            poles,
            gain,
        }
    }

    /// Move the cutoff of a low-pass prototype to `wo`.
    fn lowpass_to_lowpass(self, wo: f64) -> Self {
        let degree = self.relative_degree() as i32;
        Self {
            zeros: self.zeros.iter().map(|z| z * wo).collect(),
            poles: self.poles.iter().map(|p| p * wo).collect(),
            gain: self.gain * wo.powi(degree),
        }
    }

    /// Turn a low-pass prototype into a band-pass centred on `wo` with width `bw`.
    fn lowpass_to_bandpass(self, wo: f64, bw: f64) -> Self {
        let degree = self.relative_degree();
        let split = |roots: &[Complex<f64>]| -> Vec<Complex<f64>> {
            let scaled: Vec<Complex<f64>> = roots.iter().map(|r| r * (bw / 2.0)).collect();
            let upper = scaled.iter().map(|r| r + (r * r - wo * wo).sqrt());
            let lower = scaled.iter().map(|r| r - (r * r - wo * wo).sqrt());
            upper.chain(lower).collect()
        };
        let mut zeros = split(&self.zeros);
        zeros.extend(std::iter::repeat_n(Complex::new(0.0, 0.0), degree));
        Self {
            zeros,
            poles: split(&self.poles),
            gain: self.gain * bw.powi(degree as i32),
        }
    }

    /// Map the analog filter to the z-plane.
    fn bilinear(self, fs: f64) -> Self {
        let degree = self.relative_degree();
        let fs2 = Complex::new(2.0 * fs, 0.0);
        let numerator = self.zeros.iter().fold(Complex::new(1.0, 0.0), |acc, z| acc * (fs2 - z));
        let denominator = self.poles.iter().fold(Complex::new(1.0, 0.0), |acc, p| acc * (fs2 - p));
        let mut zeros: Vec<Complex<f64>> = self.zeros.iter().map(|z| (fs2 + z) / (fs2 - z)).collect();
        zeros.extend(std::iter::repeat_n(Complex::new(-1.0, 0.0), degree));
        Self {
            zeros,
            poles: self.poles.iter().map(|p| (fs2 + p) / (fs2 - p)).collect(),
            gain: self.gain * (numerator / denominator).re,
        }
    }

    fn into_coefficients(self) -> Coefficients {
        let b = poly(&self.zeros).iter().map(|c| self.gain * c.re).collect();
        let a = poly(&self.poles).iter().map(|c| c.re).collect();
        Coefficients { b, a }
    }
}

/// Monic polynomial with the given roots, highest power first.
fn poly(roots: &[Complex<f64>]) -> Vec<Complex<f64>> {
    let mut coeffs = vec![Complex::new(1.0, 0.0)];
    for root in roots {
        let mut next = vec![Complex::new(0.0, 0.0); coeffs.len() + 1];
        for (i, c) in coeffs.iter().enumerate() {
            next[i] += c;
            next[i + 1] -= c * root;
        }
        coeffs = next;
    }
    coeffs
}

/// Pre-warp a normalised frequency (1 = nyquist) for the bilinear transform.
fn prewarp(normalized: f64) -> f64 {
    2.0 * DESIGN_FS * (PI * normalized / DESIGN_FS).tan()
}

/// Digital Butterworth band-pass. The result has `2 * order` poles.
pub fn butter_bandpass(order: usize, low_hz: f64, high_hz: f64, sample_rate_hz: f64) -> Result<Coefficients> {
    let nyquist_hz = sample_rate_hz / 2.0;
    let band_ok = order > 0
        && sample_rate_hz.is_finite()
        && low_hz > 0.0
        && low_hz < high_hz
        && high_hz < nyquist_hz;
    if !band_ok {
        return Err(SimError::InvalidBand {
            low_hz,
            high_hz,
            nyquist_hz,
        });
    }
    let low = prewarp(low_hz / nyquist_hz);
    let high = prewarp(high_hz / nyquist_hz);
    Ok(Zpk::butterworth(order)
        .lowpass_to_bandpass((low * high).sqrt(), high - low)
        .bilinear(DESIGN_FS)
        .into_coefficients())
}

/// Digital Chebyshev type I low-pass with cutoff given as a fraction of nyquist.
pub fn cheby1_lowpass(order: usize, ripple_db: f64, cutoff: f64) -> Coefficients {
    Zpk::chebyshev1(order, ripple_db)
        .lowpass_to_lowpass(prewarp(cutoff))
        .bilinear(DESIGN_FS)
        .into_coefficients()
}

// ----------------------- Filtering

fn padded(coeffs: &Coefficients) -> (Vec<f64>, Vec<f64>) {
    let n = coeffs.taps();
    let a0 = coeffs.a[0];
    let mut b: Vec<f64> = coeffs.b.iter().map(|v| v / a0).collect();
    let mut a: Vec<f64> = coeffs.a.iter().map(|v| v / a0).collect();
    b.resize(n, 0.0);
    a.resize(n, 0.0);
    (b, a)
}

/// Direct form II transposed filter. `zi` holds `taps - 1` delay-line values.
pub fn lfilter(coeffs: &Coefficients, x: &[f64], zi: Option<&[f64]>) -> Vec<f64> {
    let (b, a) = padded(coeffs);
    let order = b.len() - 1;
    let mut z = match zi {
        Some(zi) => zi.to_vec(),
        None => vec![0.0; order],
    };

    let mut y = Vec::with_capacity(x.len());
    for &xn in x {
        let yn = b[0] * xn + z.first().copied().unwrap_or(0.0);
        for j in 0..order {
            let carry = if j + 1 < order { z[j + 1] } else { 0.0 };
            z[j] = b[j + 1] * xn + carry - a[j + 1] * yn;
        }
        y.push(yn);
    }
    y
}

/// Delay-line state matching the steady state of a unit step input.
///
/// Fails for filters with a pole at z = 1, which never settle.
pub fn lfilter_zi(coeffs: &Coefficients) -> Result<Vec<f64>> {
    let (b, a) = padded(coeffs);
    let m = b.len() - 1;
    if m == 0 {
        return Ok(Vec::new());
    }

    // (I - companion(a)^T) zi = b[1:] - a[1:] * b[0]
    let lhs = DMatrix::from_fn(m, m, |i, j| {
        let mut v = if i == j { 1.0 } else { 0.0 };
        if j == 0 {
            v += a[i + 1];
        }
        if j == i + 1 {
            v -= 1.0;
        }
        v
    });
    let rhs = DVector::from_iterator(m, (1..=m).map(|i| b[i] - a[i] * b[0]));
    let zi = lhs.lu().solve(&rhs).ok_or(SimError::SingularFilter)?;
    Ok(zi.iter().copied().collect())
}

/// Odd extension: mirror `edge` samples about each endpoint.
fn odd_extend(x: &[f64], edge: usize) -> Vec<f64> {
    let first = x[0];
    let last = x[x.len() - 1];
    let mut ext = Vec::with_capacity(x.len() + 2 * edge);
    ext.extend((1..=edge).rev().map(|k| 2.0 * first - x[k]));
    ext.extend_from_slice(x);
    ext.extend((1..=edge).map(|k| 2.0 * last - x[x.len() - 1 - k]));
    ext
}

/// Forward-backward filtering with zero phase shift.
///
/// The signal must be longer than [`Coefficients::edge_len`].
pub fn filtfilt(coeffs: &Coefficients, x: &[f64]) -> Result<Vec<f64>> {
    let edge = coeffs.edge_len();
    if x.len() <= edge {
        return Err(SimError::InsufficientSamples {
            required: edge,
            actual: x.len(),
        });
    }

    let ext = odd_extend(x, edge);
    let zi = lfilter_zi(coeffs)?;
    let scaled = |s: f64| zi.iter().map(|z| z * s).collect::<Vec<f64>>();

    let mut y = lfilter(coeffs, &ext, Some(scaled(ext[0]).as_slice()));
    y.reverse();
    let mut y = lfilter(coeffs, &y, Some(scaled(y[0]).as_slice()));
    y.reverse();

    Ok(y[edge..y.len() - edge].to_vec())
}

/// Anti-aliasing low-pass for [`decimate`]: order-8 Chebyshev I at
/// `0.8 / factor` of nyquist.
pub fn decimation_lowpass(factor: usize) -> Result<Coefficients> {
    if factor <= 1 {
        return Err(SimError::InvalidDecimationFactor(factor));
    }
    Ok(cheby1_lowpass(
        DECIMATION_ORDER,
        DECIMATION_RIPPLE_DB,
        0.8 / factor as f64,
    ))
}

/// Low-pass with [`decimation_lowpass`], then keep every `factor`-th sample
/// starting at the first.
///
/// Output length is `ceil(len / factor)`.
pub fn decimate(signal: &[f64], factor: usize) -> Result<Vec<f64>> {
    decimate_with(&decimation_lowpass(factor)?, signal, factor)
}

/// [`decimate`] with a precomputed anti-aliasing filter.
pub fn decimate_with(lowpass: &Coefficients, signal: &[f64], factor: usize) -> Result<Vec<f64>> {
    if factor <= 1 {
        return Err(SimError::InvalidDecimationFactor(factor));
    }
    let smoothed = filtfilt(lowpass, signal)?;
    Ok(smoothed.into_iter().step_by(factor).collect())
}

/// Zero-phase Butterworth band-pass; output has the input's length.
pub fn bandpass_filter(
    signal: &[f64],
    low_hz: f64,
    high_hz: f64,
    sample_rate_hz: f64,
    order: usize,
) -> Result<Vec<f64>> {
    let coeffs = butter_bandpass(order, low_hz, high_hz, sample_rate_hz)?;
    filtfilt(&coeffs, signal)
}
