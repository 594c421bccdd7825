//! Text helpers shared by the readers and the DBC writer.

use std::borrow::Cow;

/// Decodes raw file content: UTF-8 when valid, Windows-1252 otherwise.
///
/// Vector tools commonly save DBC files as CP-1252 (`°C` units, umlauts in
/// comments), which is not valid UTF-8.
#[cfg(feature = "dbc")]
pub fn decode_text(bytes: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(bytes) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => {
            let (text, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            text
        }
    }
}

/// Decodes raw file content, replacing invalid UTF-8 sequences.
#[cfg(not(feature = "dbc"))]
pub fn decode_text(bytes: &[u8]) -> Cow<'_, str> {
    String::from_utf8_lossy(bytes)
}

/// Shortest decimal rendering of `value` that parses back to the same `f64`.
/// Integral values are printed without a fractional part.
pub fn format_f64(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    format!("{}", value)
}

/// Escapes a string for a double-quoted DBC literal.
pub fn escape_dbc_string(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '"' => escaped.push_str("\\\""),
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Turns an arbitrary network name into a valid identifier
/// (`"Engine-Speed 2"` becomes `Engine_Speed_2`).
pub fn sanitize_identifier(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

/// `EngineSpeed` / `engine speed` / `ENGINE_SPEED` to `engine_speed`.
pub fn to_snake_case(name: &str) -> String {
    let ident = sanitize_identifier(name);
    let chars: Vec<char> = ident.chars().collect();
    let mut out = String::with_capacity(ident.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() {
            let prev = i.checked_sub(1).map(|p| chars[p]);
            let next = chars.get(i + 1).copied();
            let boundary = match prev {
                Some(p) if p.is_ascii_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_ascii_uppercase() => next.is_some_and(|n| n.is_ascii_lowercase()),
                _ => false,
            };
            if boundary && !out.ends_with('_') {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// `engine_speed` / `ENGINE_SPEED` / `engineSpeed` to `EngineSpeed`.
pub fn to_pascal_case(name: &str) -> String {
    let snake = to_snake_case(name);
    let mut out = String::with_capacity(snake.len());
    let mut upper = true;
    for c in snake.chars() {
        if c == '_' {
            upper = true;
            continue;
        }
        if upper {
            out.push(c.to_ascii_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_f64() {
        assert_eq!(format_f64(1.0), "1");
        assert_eq!(format_f64(-40.0), "-40");
        assert_eq!(format_f64(0.1), "0.1");
        assert_eq!(format_f64(6513.5), "6513.5");
        assert_eq!(format_f64(-0.0), "0");
        assert_eq!(format_f64(1e-5).parse::<f64>().ok(), Some(1e-5));
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape_dbc_string("a \"b\"\\"), "a \\\"b\\\"\\\\");
    }

    #[cfg(feature = "dbc")]
    #[test]
    fn test_decode_windows_1252() {
        assert_eq!(decode_text(b"\"\xB0C\""), "\"°C\"");
        assert_eq!(decode_text("km/h".as_bytes()), "km/h");
    }

    #[test]
    fn test_case_conversion() {
        assert_eq!(to_snake_case("EngineSpeed"), "engine_speed");
        assert_eq!(to_snake_case("ENGINE_SPEED"), "engine_speed");
        assert_eq!(to_snake_case("ABSStatus"), "abs_status");
        assert_eq!(to_snake_case("Motor-Temp 2"), "motor_temp_2");
        assert_eq!(to_pascal_case("engine_speed"), "EngineSpeed");
        assert_eq!(to_pascal_case("LIN_Frame1"), "LinFrame1");
        assert_eq!(to_pascal_case("2nd"), "_2nd");
    }
}
