use std::fmt;

use serde_json::Value;

/// Amounts arrive from the backend as JavaScript numbers, so they stay `f64`.
/// Every accumulation step is rounded back to cents with [`round_amount`].
pub type Amount = f64;

/// Round to 2 decimal places, half away from zero.
/// Non-finite input becomes 0 and negative zero is normalized to 0.
pub fn round_amount(value: Amount) -> Amount {
    if !value.is_finite() {
        return 0.0;
    }
    let rounded = (value * 100.0).round() / 100.0;
    if rounded == 0.0 { 0.0 } else { rounded }
}

/// Amount expressed in whole cents, used where exact equality matters.
pub fn to_cents(value: Amount) -> i64 {
    (round_amount(value) * 100.0).round() as i64
}

/// Format an amount as a plain decimal string.
/// Example: 50.0 -> "50.00", -1234.5 -> "-1234.50"
pub fn format_amount(value: Amount) -> String {
    format!("{:.2}", round_amount(value))
}

/// Parse a human-entered amount.
///
/// Accepts either `.` or `,` as decimal separator, thousands separators,
/// currency markers (`$`, `US$`, `ARS`, `USD`, `€`) and accounting
/// parentheses for negatives. Examples: "1.234,56" -> 1234.56,
/// "$ 1,234.56" -> 1234.56, "(40)" -> -40.0, "-12,5" -> -12.5
pub fn parse_amount(input: &str) -> Result<Amount, ParseAmountError> {
    let mut text: String = input.trim().to_string();
    if text.is_empty() {
        return Err(ParseAmountError::Empty);
    }

    let mut negative = false;
    if text.starts_with('(') && text.ends_with(')') {
        negative = true;
        text = text[1..text.len() - 1].to_string();
    }

    for marker in ["US$", "ARS", "USD", "$", "€"] {
        text = text.replace(marker, "");
    }
    let mut text: String = text.chars().filter(|c| !c.is_whitespace()).collect();

    if let Some(rest) = text.strip_prefix('-') {
        negative = !negative;
        text = rest.to_string();
    } else if let Some(rest) = text.strip_prefix('+') {
        text = rest.to_string();
    }

    let normalized = normalize_separators(&text);
    if normalized.is_empty()
        || !normalized
            .chars()
            .all(|c| c.is_ascii_digit() || c == '.')
    {
        return Err(ParseAmountError::InvalidFormat);
    }

    let value: f64 = normalized
        .parse()
        .map_err(|_| ParseAmountError::InvalidFormat)?;
    if !value.is_finite() {
        return Err(ParseAmountError::InvalidFormat);
    }
    Ok(if negative { -value } else { value })
}

/// Rewrite thousands/decimal separators into a plain `1234.56` form.
fn normalize_separators(text: &str) -> String {
    let last_dot = text.rfind('.');
    let last_comma = text.rfind(',');

    match (last_dot, last_comma) {
        (Some(dot), Some(comma)) => {
            // Whichever separator comes last is the decimal one
            if comma > dot {
                text.replace('.', "").replace(',', ".")
            } else {
                text.replace(',', "")
            }
        }
        (None, Some(_)) => {
            let commas = text.matches(',').count();
            let decimals = text.len() - text.rfind(',').map(|i| i + 1).unwrap_or(0);
            if commas == 1 && decimals != 3 {
                text.replace(',', ".")
            } else {
                text.replace(',', "")
            }
        }
        (Some(_), None) => {
            if text.matches('.').count() > 1 {
                text.replace('.', "")
            } else {
                text.to_string()
            }
        }
        (None, None) => text.to_string(),
    }
}

/// Coerce a loosely-typed JSON value into an amount.
/// Numbers pass through, numeric strings are parsed, anything else is `None`.
pub fn coerce_amount(value: &Value) -> Option<Amount> {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => parse_amount(s).ok(),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseAmountError {
    Empty,
    InvalidFormat,
}

impl fmt::Display for ParseAmountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseAmountError::Empty => write!(f, "empty amount"),
            ParseAmountError::InvalidFormat => write!(f, "invalid amount format"),
        }
    }
}

impl std::error::Error for ParseAmountError {}
