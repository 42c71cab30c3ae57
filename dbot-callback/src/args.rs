//! Decoded callback arguments.
//!
//! Every argument arrives as a string and is coerced to the most specific scalar it matches, in
//! this fixed order: `"false"`, `"true"`, `"undefined"`, `"NaN"`, `"null"`, `"Infinity"`, then any
//! numeric literal, then plain string. A literal `"42"` therefore always decodes as the number 42,
//! and an empty or blank argument decodes as 0; callers that need digit or empty strings must not
//! send them through a token.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum CallbackArg {
    Bool(bool),
    /// Absent value (`"undefined"` on the wire).
    Undefined,
    NaN,
    Null,
    Infinity,
    Number(f64),
    Str(String),
}

impl CallbackArg {
    /// Coerces one raw wire argument. Total and deterministic.
    pub fn coerce(raw: &str) -> Self {
        match raw {
            "false" => Self::Bool(false),
            "true" => Self::Bool(true),
            "undefined" => Self::Undefined,
            "NaN" => Self::NaN,
            "null" => Self::Null,
            "Infinity" => Self::Infinity,
            _ => match parse_number(raw) {
                Some(n) => Self::Number(n),
                None => Self::Str(raw.to_string()),
            },
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Infinity => Some(f64::INFINITY),
            Self::NaN => Some(f64::NAN),
            _ => None,
        }
    }

    /// Integral numbers only (`1` yes, `1.5` no).
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Number(n)
                if n.fract() == 0.0 && *n >= i64::MIN as f64 && *n <= i64::MAX as f64 =>
            {
                Some(*n as i64)
            }
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Self::Undefined | Self::Null)
    }
}

impl fmt::Display for CallbackArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Undefined => f.write_str("undefined"),
            Self::NaN => f.write_str("NaN"),
            Self::Null => f.write_str("null"),
            Self::Infinity => f.write_str("Infinity"),
            Self::Number(n) if n.is_infinite() => {
                f.write_str(if *n > 0.0 { "Infinity" } else { "-Infinity" })
            }
            Self::Number(n) => write!(f, "{}", n),
            Self::Str(s) => f.write_str(s),
        }
    }
}

impl From<bool> for CallbackArg {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for CallbackArg {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<i32> for CallbackArg {
    fn from(value: i32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<f64> for CallbackArg {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for CallbackArg {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for CallbackArg {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

/// Numeric literal grammar: decimal (with optional sign, fraction, exponent), `0x`/`0o`/`0b`
/// integers, and signed `Infinity`. Empty or blank input is 0.
fn parse_number(raw: &str) -> Option<f64> {
    let s = raw.trim();
    if s.is_empty() {
        return Some(0.0);
    }

    for (prefix, radix) in [("0x", 16), ("0X", 16), ("0o", 8), ("0O", 8), ("0b", 2), ("0B", 2)] {
        if let Some(digits) = s.strip_prefix(prefix) {
            return u128::from_str_radix(digits, radix).ok().map(|v| v as f64);
        }
    }

    match s {
        "+Infinity" => return Some(f64::INFINITY),
        "-Infinity" => return Some(f64::NEG_INFINITY),
        _ => {}
    }

    // f64::from_str also accepts "inf"/"nan" spellings; those stay strings here.
    if !s
        .bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-'))
    {
        return None;
    }
    s.parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coerce_priority_order() {
        assert_eq!(CallbackArg::coerce("false"), CallbackArg::Bool(false));
        assert_eq!(CallbackArg::coerce("true"), CallbackArg::Bool(true));
        assert_eq!(CallbackArg::coerce("undefined"), CallbackArg::Undefined);
        assert_eq!(CallbackArg::coerce("NaN"), CallbackArg::NaN);
        assert_eq!(CallbackArg::coerce("null"), CallbackArg::Null);
        assert_eq!(CallbackArg::coerce("Infinity"), CallbackArg::Infinity);
        assert_eq!(CallbackArg::coerce("42"), CallbackArg::Number(42.0));
        assert_eq!(CallbackArg::coerce("foo"), CallbackArg::Str("foo".to_string()));
    }

    #[test]
    fn test_numeric_literals() {
        assert_eq!(CallbackArg::coerce("-3.5"), CallbackArg::Number(-3.5));
        assert_eq!(CallbackArg::coerce(".5"), CallbackArg::Number(0.5));
        assert_eq!(CallbackArg::coerce("1e3"), CallbackArg::Number(1000.0));
        assert_eq!(CallbackArg::coerce("0x1f"), CallbackArg::Number(31.0));
        assert_eq!(CallbackArg::coerce("0b101"), CallbackArg::Number(5.0));
        assert_eq!(
            CallbackArg::coerce("-Infinity"),
            CallbackArg::Number(f64::NEG_INFINITY)
        );
    }

    #[test]
    fn test_non_numbers_stay_strings() {
        for raw in ["inf", "nan", "infinity", "1e", ".", "12abc", "-0x10", "true1"] {
            assert_eq!(
                CallbackArg::coerce(raw),
                CallbackArg::Str(raw.to_string()),
                "raw = {:?}",
                raw
            );
        }
    }

    #[test]
    fn test_empty_argument_is_zero() {
        assert_eq!(CallbackArg::coerce(""), CallbackArg::Number(0.0));
        assert_eq!(CallbackArg::coerce("  "), CallbackArg::Number(0.0));
        assert_eq!(CallbackArg::coerce("").as_i64(), Some(0));
    }

    #[test]
    fn test_accessors() {
        assert_eq!(CallbackArg::coerce("7").as_i64(), Some(7));
        assert_eq!(CallbackArg::coerce("7.25").as_i64(), None);
        assert_eq!(CallbackArg::coerce("7.25").as_f64(), Some(7.25));
        assert!(CallbackArg::coerce("NaN").as_f64().is_some_and(f64::is_nan));
        assert_eq!(CallbackArg::coerce("true").as_bool(), Some(true));
        assert_eq!(CallbackArg::coerce("abc").as_str(), Some("abc"));
        assert!(CallbackArg::coerce("null").is_nullish());
        assert!(CallbackArg::coerce("undefined").is_nullish());
    }

    #[test]
    fn test_display_is_wire_form() {
        assert_eq!(CallbackArg::from(1_i64).to_string(), "1");
        assert_eq!(CallbackArg::from(2.5).to_string(), "2.5");
        assert_eq!(CallbackArg::from(false).to_string(), "false");
        assert_eq!(CallbackArg::Number(f64::NEG_INFINITY).to_string(), "-Infinity");
        assert_eq!(CallbackArg::Undefined.to_string(), "undefined");
    }
}
