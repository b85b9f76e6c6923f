use crate::error::ReadError;

/// Parses a fixed-width ASCII header field as an integer.
pub fn parse_int_field(raw: &str, field: &str) -> Result<i64, ReadError> {
    let s = raw.trim();
    s.parse::<i64>()
        .map_err(|_| ReadError::InvalidHeader(format!("{} is not an integer: '{}'", field, s)))
}

/// Parses a fixed-width ASCII header field as a float.
pub fn parse_float_field(raw: &str, field: &str) -> Result<f64, ReadError> {
    let s = raw.trim();
    match s.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(ReadError::InvalidHeader(format!("{} is not a number: '{}'", field, s))),
    }
}

/// Parses an EDF duration string into 100 ns units.
pub fn parse_edf_time(s: &str) -> Result<i64, ReadError> {
    let s = s.trim();
    let invalid = || ReadError::InvalidHeader(format!("invalid data record duration '{}'", s));

    if s.is_empty() {
        return Err(invalid());
    }

    let (negative, s) = if let Some(rest) = s.strip_prefix('-') {
        (true, rest)
    } else if let Some(rest) = s.strip_prefix('+') {
        (false, rest)
    } else {
        (false, s)
    };

    // ASCII only from here on, so byte slicing below stays on char boundaries
    if !s.bytes().all(|b| b.is_ascii_digit() || b == b'.') {
        return Err(invalid());
    }

    let mut value = 0i64;

    if let Some(dot_pos) = s.find('.') {
        let integer_part = &s[..dot_pos];
        let decimal_part = &s[dot_pos + 1..];

        if !integer_part.is_empty() {
            value += integer_part.parse::<i64>().map_err(|_| invalid())? * crate::EDF_TIME_DIMENSION;
        }

        // at most 7 decimal places fit the time unit
        if !decimal_part.is_empty() {
            let decimal_str = if decimal_part.len() > 7 {
                &decimal_part[..7]
            } else {
                decimal_part
            };
            let decimal_value = decimal_str.parse::<i64>().map_err(|_| invalid())?;
            value += decimal_value * 10i64.pow(7 - decimal_str.len() as u32);
        }
    } else {
        value = s.parse::<i64>().map_err(|_| invalid())? * crate::EDF_TIME_DIMENSION;
    }

    Ok(if negative { -value } else { value })
}

/// Left-aligned, space-padded ASCII field of exactly `width` bytes.
pub fn fixed_field(value: &str, width: usize) -> Vec<u8> {
    let mut field = vec![b' '; width];
    let ascii: Vec<u8> = value
        .bytes()
        .map(|b| if (0x20..0x7f).contains(&b) { b } else { b'_' })
        .collect();
    let len = ascii.len().min(width);
    field[..len].copy_from_slice(&ascii[..len]);
    field
}

/// Formats a number so it fits an 8-byte header field.
///
/// Decimals are rounded away as needed; a value whose integer part alone
/// needs more than 8 characters is an error.
pub fn format_number_field(value: f64) -> Result<String, ReadError> {
    let too_wide = || ReadError::InvalidHeader(format!("{} does not fit an 8-character field", value));
    if !value.is_finite() {
        return Err(too_wide());
    }

    let rounded = format!("{:.0}", value);
    let as_integer = || {
        if rounded.len() <= 8 {
            Ok(rounded.clone())
        } else {
            Err(too_wide())
        }
    };
    if value.fract() == 0.0 {
        return as_integer();
    }

    let text = format!("{}", value);
    if text.len() <= 8 {
        return Ok(text);
    }
    // "-0" for -0.5 keeps the sign in the width budget
    let int_len = format!("{:.0}", value.trunc()).len();
    if int_len + 1 >= 8 {
        return as_integer();
    }
    let text = format!("{:.*}", 8 - int_len - 1, value);
    if text.len() <= 8 {
        Ok(text)
    } else {
        // rounding carried into a new integer digit
        as_integer()
    }
}
