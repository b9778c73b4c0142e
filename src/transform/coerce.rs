//! Tolerant scalar coercion for query values
//!
//! These helpers never fail. Unparseable input collapses to zero or
//! `None` and the caller keeps its default. Ranged fields (quality, blur,
//! rotate) use [`to_float`] and strict integer parsing instead so that an
//! out-of-range value can be told apart from a missing one.

/// Parse a leading signed integer, `parseInt`-style
///
/// Leading whitespace and an optional sign are accepted, parsing stops at
/// the first non-digit. Empty or non-numeric input yields 0; overflow
/// saturates.
pub fn to_int(raw: Option<&str>) -> i64 {
    let Some(raw) = raw else {
        return 0;
    };
    let s = raw.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let mut value: i64 = 0;
    let mut any = false;
    for b in digits.bytes() {
        if !b.is_ascii_digit() {
            break;
        }
        any = true;
        value = value.saturating_mul(10).saturating_add((b - b'0') as i64);
    }

    if !any {
        0
    } else if negative {
        -value
    } else {
        value
    }
}

/// Absolute value of [`to_int`], saturated to `u32`
pub fn to_unsigned_int(raw: Option<&str>) -> u32 {
    u32::try_from(to_int(raw).unsigned_abs()).unwrap_or(u32::MAX)
}

/// Strict finite float parse of the trimmed value
pub fn to_float(raw: Option<&str>) -> Option<f64> {
    raw?.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Presence-based flag coercion
///
/// A flag given without a value (`?sharpen`) is true. `0`, `false`, `no`
/// and `off` are false, any other value is true. An absent flag is false.
pub fn to_bool(raw: Option<&str>) -> bool {
    match raw {
        None => false,
        Some(v) => {
            let v = v.trim();
            !(v.eq_ignore_ascii_case("0")
                || v.eq_ignore_ascii_case("false")
                || v.eq_ignore_ascii_case("no")
                || v.eq_ignore_ascii_case("off"))
        }
    }
}
