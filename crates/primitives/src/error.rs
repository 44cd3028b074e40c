use core::fmt;

/// Floating-point failure category raised while evaluating an expression.
///
/// These mirror the IEEE exception flags the evaluator inspects after each
/// arithmetic step or function call.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MathError {
    /// Argument outside the function domain (NaN result from finite inputs).
    Domain,
    /// Division by zero or a pole of the function.
    Pole,
    /// Result too large in magnitude to represent.
    Overflow,
    /// Result rounded to zero while the exact value is nonzero.
    Underflow,
    /// Result outside the representable range for another reason.
    Range,
}

impl core::error::Error for MathError {}

impl fmt::Display for MathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Domain => "domain error",
            Self::Pole => "pole error",
            Self::Overflow => "overflow error",
            Self::Underflow => "underflow error",
            Self::Range => "range error",
        };
        f.write_str(s)
    }
}
