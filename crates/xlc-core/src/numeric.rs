//! Numeric scalar casts: the integer family, float/double and decimal

use crate::error::CastError;
use crate::table::RawCell;
use crate::types::Builtin;
use crate::value::{DecimalValue, Value};
use bigdecimal::BigDecimal;
use std::str::FromStr;

/// Cast to one of the fixed-width integer types
pub(crate) fn cast_integer(cell: &RawCell, target: Builtin) -> Result<Value, CastError> {
    let (Some((min, max)), Some((_, signed))) = (target.integer_bounds(), target.integer_width())
    else {
        return Err(CastError::cast(cell, target.name(), "not an integer type"));
    };

    let whole = match cell {
        RawCell::Number(n) => whole_from_f64(*n)
            .ok_or_else(|| CastError::cast(cell, target.name(), "not a whole number"))?,
        RawCell::Text(s) => parse_integer_text(s.trim())
            .map_err(|reason| CastError::cast(cell, target.name(), reason))?,
        _ => return Err(CastError::cast(cell, target.name(), "expected a number")),
    };

    if whole < min || whole > max {
        return Err(CastError::overflow(cell, target.name()));
    }
    // bounds checked above
    Ok(if signed {
        Value::Int(whole as i64)
    } else {
        Value::UInt(whole as u64)
    })
}

fn whole_from_f64(n: f64) -> Option<i128> {
    (n.is_finite() && n.fract() == 0.0).then_some(n as i128)
}

// Exponent notation goes through f64; the mantissa itself must be whole
fn parse_integer_text(text: &str) -> Result<i128, &'static str> {
    let lower = text.to_ascii_lowercase();
    if let Some((mantissa, _)) = lower.split_once('e') {
        let mantissa: f64 = mantissa.parse().map_err(|_| "invalid scientific notation")?;
        if mantissa.fract() != 0.0 {
            return Err("scientific notation is not a whole number");
        }
        let value: f64 = lower.parse().map_err(|_| "invalid scientific notation")?;
        return whole_from_f64(value).ok_or("scientific notation is not a whole number");
    }
    lower.parse::<i128>().map_err(|_| "not a whole number")
}

/// Cast to float, double or decimal
pub(crate) fn cast_real(cell: &RawCell, target: Builtin) -> Result<Value, CastError> {
    let text = match cell {
        RawCell::Number(n) if target != Builtin::Decimal => return Ok(Value::Float(*n)),
        RawCell::Number(n) => n.to_string(),
        RawCell::Text(s) => s.trim().to_string(),
        _ => return Err(CastError::cast(cell, target.name(), "expected a number")),
    };

    if target == Builtin::Decimal && is_nan_token(&text) {
        return Ok(Value::Decimal(DecimalValue::NaN));
    }

    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || ".,eE+-".contains(*c))
        .collect();
    if cleaned.is_empty() {
        return Ok(Value::zero(target));
    }

    let signs = cleaned.chars().filter(|c| *c == '+' || *c == '-').count();
    let has_exponent = cleaned.contains(['e', 'E']);
    if signs > 2 || (signs > 1 && !has_exponent) {
        return Err(CastError::cast(cell, target.name(), "misplaced sign"));
    }

    if target == Builtin::Decimal {
        parse_decimal(&cleaned)
            .map(|d| Value::Decimal(DecimalValue::Number(d)))
            .map_err(|reason| CastError::cast(cell, target.name(), reason))
    } else {
        parse_float(&cleaned)
            .map(Value::Float)
            .ok_or_else(|| CastError::cast(cell, target.name(), "not a number"))
    }
}

fn is_nan_token(text: &str) -> bool {
    ["nan", "inf", "infinity"]
        .iter()
        .any(|t| text.eq_ignore_ascii_case(t))
}

fn parse_decimal(cleaned: &str) -> Result<BigDecimal, String> {
    let mut s: String = cleaned.chars().filter(|c| *c != ',').collect();
    if s.matches('.').count() > 1 {
        return Err("more than one decimal point".to_string());
    }
    if s.ends_with('.') {
        s.push('0');
    }
    if s.starts_with('.') {
        s.insert(0, '0');
    }

    BigDecimal::from_str(&s)
        .map(|d| d.normalized())
        .map_err(|e| e.to_string())
}

fn parse_float(cleaned: &str) -> Option<f64> {
    let mut normalized = match cleaned.split_once(['e', 'E']) {
        Some((mantissa, exponent)) => {
            let mut s = normalize_separators(mantissa);
            s.push('e');
            s.push_str(&normalize_separators(exponent));
            s
        }
        None => normalize_separators(cleaned),
    };
    if normalized.starts_with('.') {
        normalized.insert(0, '0');
    }
    normalized.parse().ok()
}

/// The right-most `,`/`.` becomes the decimal point; earlier ones are
/// grouping marks and are dropped.
fn normalize_separators(s: &str) -> String {
    let last = s.rfind([',', '.']);
    s.char_indices()
        .filter_map(|(i, c)| match c {
            ',' | '.' if Some(i) == last => Some('.'),
            ',' | '.' => None,
            _ => Some(c),
        })
        .collect()
}
