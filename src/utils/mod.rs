//! Math utilities, activation functions, and float helpers.

/// On-disk stand-in for an error value that is not yet known.
///
/// A known error of exactly `9999.0` collides with the sentinel: it is saved
/// as this value and loads back as unknown. The sigmoid engine's errors stay
/// within `[0, 1]`, but other [`Network`](crate::core::Network) implementations
/// must keep their running error below it to round-trip.
pub const UNKNOWN_ERROR_SENTINEL: f32 = 9999.0;

/// Activation function: logistic sigmoid.
#[inline]
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Derivative of sigmoid, expressed in terms of its output `y = sigmoid(x)`.
#[inline]
pub fn d_sigmoid_from_output(y: f32) -> f32 {
    y * (1.0 - y)
}

/// Bit-for-bit float equality (distinguishes `0.0` from `-0.0`, matches identical NaNs).
#[inline]
pub fn bits_eq(a: f32, b: f32) -> bool {
    a.to_bits() == b.to_bits()
}

/// Bit-for-bit equality of two optional error values.
#[inline]
pub fn optional_bits_eq(a: Option<f32>, b: Option<f32>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => bits_eq(a, b),
        _ => false,
    }
}

/// Encode an optional error as a plain float for persistence.
#[inline]
pub fn encode_error(value: Option<f32>) -> f32 {
    value.unwrap_or(UNKNOWN_ERROR_SENTINEL)
}

/// Decode a persisted error float, mapping the sentinel back to `None`.
#[inline]
pub fn decode_error(raw: f32) -> Option<f32> {
    if bits_eq(raw, UNKNOWN_ERROR_SENTINEL) {
        None
    } else {
        Some(raw)
    }
}
