//! Helpers for turning `cast` output into values the adapter can reason about.

use regex::Regex;
use std::sync::OnceLock;

fn hex_bytes_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^0x(?:[0-9a-fA-F]{2})*$").expect("static regex"))
}

fn address_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^0x[0-9a-fA-F]{40}$").expect("static regex"))
}

/// Last non-empty line; `cast` sometimes prints warnings before the value.
fn last_line(output: &str) -> Option<&str> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .last()
}

/// Parse a decoded `bool` return value.
pub(crate) fn parse_bool(output: &str) -> Option<bool> {
    match last_line(output)? {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

/// Parse a decoded `bytes` return value. `0x` alone is an empty value.
pub(crate) fn parse_hex_bytes(output: &str) -> Option<Vec<u8>> {
    let line = last_line(output).unwrap_or("0x");
    if !hex_bytes_pattern().is_match(line) {
        return None;
    }
    hex::decode(&line[2..]).ok()
}

/// Parse an address printed by `cast wallet address`.
pub(crate) fn parse_address(output: &str) -> Option<String> {
    let line = last_line(output)?;
    address_pattern()
        .is_match(line)
        .then(|| line.to_string())
}

/// Parse a hex signature printed by `cast wallet sign`.
pub(crate) fn parse_signature(output: &str) -> Option<String> {
    let line = last_line(output)?;
    (hex_bytes_pattern().is_match(line) && line.len() > 2).then(|| line.to_string())
}

/// Encode a value as a `bytes` argument.
pub(crate) fn to_hex_arg(value: &[u8]) -> String {
    format!("0x{}", hex::encode(value))
}
