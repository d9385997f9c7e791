//! Rational time bases and timestamp rescaling
//!
//! Container timestamps are expressed in ticks of a per-stream time base
//! (e.g. 1/90000). Everything past the decoder works in microseconds.

use std::fmt;

/// A rational number `num / den`, used as a time base (seconds per tick)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rational {
    pub num: i32,
    pub den: i32,
}

/// One microsecond, the time base of every `DecodedFrame::pts`
pub const MICROSECONDS: Rational = Rational::new(1, 1_000_000);

impl Rational {
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// A time base with a zero numerator or denominator cannot scale anything
    pub fn is_valid(&self) -> bool {
        self.num != 0 && self.den != 0
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

#[cfg(feature = "ffmpeg")]
impl From<ffmpeg_next::Rational> for Rational {
    fn from(r: ffmpeg_next::Rational) -> Self {
        Self::new(r.numerator(), r.denominator())
    }
}

/// Rescale `value` from time base `from` to time base `to`
///
/// Computes `value * from / to` exactly in 128-bit integers and rounds the
/// quotient to nearest, halfway cases away from zero. Returns 0 for an
/// invalid time base.
pub fn rescale_q(value: i64, from: Rational, to: Rational) -> i64 {
    if !from.is_valid() || !to.is_valid() {
        return 0;
    }

    let mut num = value as i128 * from.num as i128 * to.den as i128;
    let mut den = from.den as i128 * to.num as i128;
    if den < 0 {
        num = -num;
        den = -den;
    }

    let half = den / 2;
    let rounded = if num >= 0 {
        (num + half) / den
    } else {
        (num - half) / den
    };

    rounded.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}
