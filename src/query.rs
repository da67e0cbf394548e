//! Minimal URL query lookup for request handlers.
//!
//! Values are returned exactly as they appear on the wire. Nothing is
//! percent-decoded, matching what the ESP-IDF httpd query helpers do.

/// The query part of a request URI, without the leading `?`.
///
/// Returns `None` when the URI has no `?` or nothing follows it.
pub fn query_string(uri: &str) -> Option<&str> {
    let (_, query) = uri.split_once('?')?;
    // A fragment is never sent by browsers, but strip it if a client does.
    let query = query.split('#').next().unwrap_or_default();
    (!query.is_empty()).then_some(query)
}

/// Value of the first `key=value` pair named `key`.
///
/// A bare `key` with no `=` yields an empty value.
pub fn query_value<'a>(query: &'a str, key: &str) -> Option<&'a str> {
    query
        .split('&')
        .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
        .find(|(name, _)| *name == key)
        .map(|(_, value)| value)
}
