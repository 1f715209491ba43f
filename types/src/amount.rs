//! Display formatting for balances.
//!
//! Balances reach the tree as raw fixed-point integers (base currency and its
//! assets) or as decimal strings (secondary currency and its tokens). Everything
//! is formatted on the integer/string level; no floating point is involved.

use crate::EmberError;

/// Format a raw fixed-point quantity with `decimals` fractional digits and
/// thousands separators in the integer part.
///
/// `format_qnt(123456789, 8)` is `"1.23456789"`.
pub fn format_qnt(raw: u128, decimals: u8) -> String {
    let digits = raw.to_string();
    let decimals = decimals as usize;
    if decimals == 0 {
        return group_thousands(&digits);
    }
    let padded = format!("{:0>width$}", digits, width = decimals + 1);
    let (int_part, frac_part) = padded.split_at(padded.len() - decimals);
    format!("{}.{}", group_thousands(int_part), frac_part)
}

/// Render a non-negative decimal string with exactly `places` fractional digits.
///
/// Extra fractional digits are truncated, missing ones are zero-padded.
pub fn format_fixed(decimal: &str, places: usize) -> Result<String, EmberError> {
    let (int_part, frac_part) = split_decimal(decimal)?;
    let int_part = if int_part.is_empty() { "0" } else { int_part };
    if places == 0 {
        return Ok(int_part.to_string());
    }
    let mut frac: String = frac_part.chars().take(places).collect();
    while frac.len() < places {
        frac.push('0');
    }
    Ok(format!("{int_part}.{frac}"))
}

/// Insert thousands separators into the integer part of a decimal string.
///
/// Input that is not a plain non-negative decimal is returned unchanged.
pub fn comma_format(decimal: &str) -> String {
    match split_decimal(decimal) {
        Ok((int_part, frac_part)) => {
            let int_part = if int_part.is_empty() { "0" } else { int_part };
            if decimal.contains('.') {
                format!("{}.{}", group_thousands(int_part), frac_part)
            } else {
                group_thousands(int_part)
            }
        }
        Err(_) => decimal.to_string(),
    }
}

fn split_decimal(decimal: &str) -> Result<(&str, &str), EmberError> {
    let trimmed = decimal.trim();
    if trimmed.is_empty() {
        return Err(EmberError::InvalidAmount("empty amount".into()));
    }
    let (int_part, frac_part) = match trimmed.split_once('.') {
        Some((i, f)) => (i, f),
        None => (trimmed, ""),
    };
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(int_part) || !all_digits(frac_part) || (int_part.is_empty() && frac_part.is_empty()) {
        return Err(EmberError::InvalidAmount(decimal.to_string()));
    }
    Ok((int_part, frac_part))
}

fn group_thousands(digits: &str) -> String {
    let len = digits.len();
    let mut out = String::with_capacity(len + len / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
