//! Text info requests: the diagnostic side of the protocol.
//!
//! A request payload is the requested names joined by newlines; the
//! response carries one `name<TAB>value` line per name. Values that are
//! themselves lists (peer addresses, statistics) use `;` between elements.

use std::collections::HashMap;

/// Builds an info request payload from the requested names.
pub fn pack_info_request<N: AsRef<str>>(names: &[N]) -> Vec<u8> {
    names
        .iter()
        .map(|name| name.as_ref())
        .collect::<Vec<_>>()
        .join("\n")
        .into_bytes()
}

/// Parses a response payload into name/value pairs.
///
/// Empty lines are skipped; a line without a TAB maps the whole line to an
/// empty value.
pub fn parse_info_response(payload: &str) -> HashMap<String, String> {
    let mut values = HashMap::new();
    for line in payload.split('\n') {
        if line.is_empty() {
            continue;
        }
        match line.split_once('\t') {
            Some((name, value)) => values.insert(name.to_string(), value.to_string()),
            None => values.insert(line.to_string(), String::new()),
        };
    }
    values
}

/// Splits a `;`-delimited info value into its elements, dropping empties
/// (list values often end with a trailing delimiter).
pub fn split_info_value(value: &str) -> Vec<&str> {
    value.split(';').filter(|item| !item.is_empty()).collect()
}
