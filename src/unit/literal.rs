//! Sass literals from JSON values.
//!
//! Defines arrive as [`serde_json::Value`]s and are injected as
//! `$name: <literal>;` declarations. Some CSS values only survive JSON as
//! strings:
//! - `12px` becomes `"12px"`
//! - `50%` becomes `"50%"`
//! - `#ff0000` becomes `"#ff0000"`
//!
//! Strings matching one of these patterns are emitted unquoted so they keep
//! their numeric or color type in the stylesheet. Everything else is quoted.

use std::fmt::Write;

use serde_json::Value;

/// Units accepted on dimension literals.
const UNITS: &[&str] = &[
    "px", "em", "rem", "pt", "pc", "cm", "mm", "in", "q", "ex", "ch", "vw", "vh", "vmin", "vmax",
    "deg", "rad", "grad", "turn", "s", "ms", "hz", "khz", "dpi", "dpcm", "dppx", "fr",
];

/// Convert a JSON value to Sass source text.
///
/// - `null` → `null`
/// - booleans and numbers verbatim
/// - strings → unquoted CSS literal or quoted string
/// - arrays → `(a, b)` lists, `(a,)` for one element, `()` when empty
/// - objects → `("key": value)` maps, `()` when empty
pub fn to_sass(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value);
    out
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => {
            let _ = write!(out, "{b}");
        }
        Value::Number(n) => {
            let _ = write!(out, "{n}");
        }
        Value::String(s) => {
            if is_css_literal(s) {
                out.push_str(s.trim());
            } else {
                write_quoted(out, s);
            }
        }
        Value::Array(items) => {
            out.push('(');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_value(out, item);
            }
            if items.len() == 1 {
                out.push(',');
            }
            out.push(')');
        }
        Value::Object(map) => {
            out.push('(');
            for (i, (key, item)) in map.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_quoted(out, key);
                out.push_str(": ");
                write_value(out, item);
            }
            out.push(')');
        }
    }
}

fn write_quoted(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\a "),
            c => out.push(c),
        }
    }
    out.push('"');
}

/// Check if a string is a CSS literal that should stay unquoted.
///
/// Matches plain numbers, dimensions (`12px`, `1.5em`), percentages and hex
/// colors (`#rgb`, `#rgba`, `#rrggbb`, `#rrggbbaa`).
pub fn is_css_literal(s: &str) -> bool {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix('#') {
        return matches!(hex.len(), 3 | 4 | 6 | 8) && hex.bytes().all(|b| b.is_ascii_hexdigit());
    }
    let number_end = s
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || c == '.' || (i == 0 && c == '-')))
        .map_or(s.len(), |(i, _)| i);
    let (number, unit) = s.split_at(number_end);
    if number.ends_with('.') || number.parse::<f64>().is_err() {
        return false;
    }
    unit.is_empty() || unit == "%" || UNITS.contains(&unit.to_ascii_lowercase().as_str())
}

/// Check if `name` can be used as a Sass variable name.
///
/// `name` is the bare identifier, without the leading `$`.
pub fn is_variable_name(name: &str) -> bool {
    let Some(first) = name.chars().next() else {
        return false;
    };
    !first.is_ascii_digit()
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || !c.is_ascii())
}
