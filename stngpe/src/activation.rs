use crate::constants::Constants;

/// Saturating sigmoid `m / (1 + exp(-4x/m) * (m - b) / b)`.
///
/// `m` is the maximal rate and `b` the rate at zero input. For `0 < b < m`
/// the `(m - b) / b` factor is folded into the exponent so large negative
/// inputs decay to 0 and large positive inputs saturate at `m` instead of
/// forming `inf * 0`. Other `b` use the product form as written. NaN input
/// gives NaN.
pub fn sigmoid(x: f64, m: f64, b: f64) -> f64 {
    let ratio = (m - b) / b;
    if ratio > 0.0 {
        m / (1.0 + (-4.0 * x / m + ratio.ln()).exp())
    } else {
        m / (1.0 + (-4.0 * x / m).exp() * ratio)
    }
}

/// STN firing rate for a given linear input.
pub fn activation_stn(x: f64, constants: &Constants) -> f64 {
    sigmoid(x, constants.m1, constants.b1)
}

/// GPe firing rate for a given linear input.
pub fn activation_gpe(x: f64, constants: &Constants) -> f64 {
    sigmoid(x, constants.m2, constants.b2)
}
