//! Helpers for reading request headers and shaping response metadata.

use std::collections::HashMap;

/// Finds the content type among the request properties.
///
/// Matches keys spelled `Content-Type` or `ContentType`, in any letter case.
pub fn retrieve_content_type_header(properties: &HashMap<String, String>) -> Option<&str> {
    properties
        .iter()
        .find(|(key, _)| is_content_type_key(key))
        .map(|(_, value)| value.as_str())
}

fn is_content_type_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.starts_with("content-type") || key.starts_with("contenttype")
}

pub fn retrieve_accept_header(properties: &HashMap<String, String>) -> Option<&str> {
    properties
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case("accept"))
        .map(|(_, value)| value.as_str())
}

/// Splits an accept header into its media types, in order of appearance.
pub fn parse_accept(accept: &str) -> Vec<&str> {
    accept
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Response phrases end up in a status line, which must not contain line breaks.
pub fn remove_crlf(phrase: &str) -> String {
    phrase.chars().filter(|c| !matches!(c, '\r' | '\n')).collect()
}
