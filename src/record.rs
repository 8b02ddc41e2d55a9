use serde::{Deserialize, Serialize};

/// One completed quiz attempt as stored under the history key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreRecord {
    /// Decoded location of the article the quiz was generated from.
    pub url: String,
    /// Ratio of correct answers, always with two decimals.
    pub score: String,
    /// Locale-formatted time of saving.
    pub date: String,
}

impl ScoreRecord {
    pub fn new(url: impl Into<String>, score: impl Into<String>, date: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            score: score.into(),
            date: date.into(),
        }
    }
}

pub type ScoreHistory = Vec<ScoreRecord>;

/// `correct / max(1, answered)` with exactly two decimals.
///
/// Rounds the `f64` ratio the way `Number.prototype.toFixed(2)` does: the
/// exact binary value decides, and a true tie goes to the larger hundredth.
/// So `1/8` (exactly `0.125`) is `"0.13"` while `3/40` (just below `0.075`)
/// is `"0.07"`.
pub fn format_score(correct: usize, answered: usize) -> String {
    let ratio = correct as f64 / answered.max(1) as f64;
    let hundredths = to_fixed_hundredths(ratio);
    format!("{}.{:02}", hundredths / 100, hundredths % 100)
}

// Nearest integer to `value * 100` for `value` in `[0, 1]`, computed on the
// exact mantissa and exponent so no intermediate rounding happens.
fn to_fixed_hundredths(value: f64) -> u128 {
    if value <= 0.0 || !value.is_finite() {
        return 0;
    }
    let bits = value.to_bits();
    let exponent_bits = ((bits >> 52) & 0x7FF) as i32;
    let fraction = u128::from(bits & ((1u64 << 52) - 1));
    let (mantissa, exponent) = if exponent_bits == 0 {
        (fraction, -1074)
    } else {
        (fraction | (1u128 << 52), exponent_bits - 1075)
    };
    // value == mantissa / 2^shift
    let shift = u32::try_from(-exponent).unwrap_or(0);
    if shift == 0 {
        return mantissa.saturating_mul(100);
    }
    if shift >= 120 {
        // Below 2^-67, far under half a hundredth.
        return 0;
    }
    let scaled = mantissa * 100;
    let whole = scaled >> shift;
    let remainder = scaled - (whole << shift);
    if (remainder << 1) >= (1u128 << shift) {
        whole + 1
    } else {
        whole
    }
}
