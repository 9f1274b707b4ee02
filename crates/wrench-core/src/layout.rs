//! Date layouts written with `yyyy-MM-dd HH:mm:ss` style tokens.

use chrono::{DateTime, TimeZone};
use std::fmt::Display;

const TOKENS: [(&str, &str); 9] = [
    ("yyyy", "%Y"),
    ("yy", "%y"),
    ("MM", "%m"),
    ("dd", "%d"),
    ("HH", "%H"),
    ("hh", "%I"),
    ("mm", "%M"),
    ("ss", "%S"),
    ("tt", "%p"),
];

/// Translates a token layout into a chrono `strftime` string.
///
/// Text that is not a token is copied verbatim.
///
/// ```
/// assert_eq!(wrench_core::layout::to_strftime("dd/MM/yyyy HH:mm"), "%d/%m/%Y %H:%M");
/// ```
pub fn to_strftime(layout: &str) -> String {
    let mut out = String::with_capacity(layout.len() * 2);
    let mut rest = layout;
    'scan: while let Some(c) = rest.chars().next() {
        for (token, spec) in TOKENS {
            if let Some(after) = rest.strip_prefix(token) {
                out.push_str(spec);
                rest = after;
                continue 'scan;
            }
        }
        if c == '%' {
            out.push_str("%%");
        } else {
            out.push(c);
        }
        rest = &rest[c.len_utf8()..];
    }
    out
}

/// Formats a timestamp with a token layout.
pub fn format<Tz>(value: &DateTime<Tz>, layout: &str) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    value.format(&to_strftime(layout)).to_string()
}
