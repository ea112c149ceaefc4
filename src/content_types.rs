//! Content-type identifiers understood by the codec.

pub const JSON: &str = "application/json";
pub const CSV: &str = "text/csv";
pub const OCTET_STREAM: &str = "application/octet-stream";
pub const ANY: &str = "*/*";
pub const NPY: &str = "application/x-npy";
pub const NPZ: &str = "application/x-npz";

pub const CONTENT_TYPE_HEADER: &str = "Content-Type";
pub const ACCEPT_HEADER: &str = "Accept";

/// Payloads of these types are handed to handlers as UTF-8 text.
pub const UTF8_TYPES: [&str; 2] = [JSON, CSV];

/// Media type without parameters, lower-cased: `Text/CSV; charset=utf-8` becomes `text/csv`.
pub fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

pub fn is_utf8(content_type: &str) -> bool {
    let essence = essence(content_type);
    UTF8_TYPES.contains(&essence.as_str())
}
