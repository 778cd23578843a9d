//! Path and query parameters of a resolved location.
//!
//! - [`RouteParams`]: values captured from `:param` segments of the matched
//!   route chain (e.g. `/users/:id` matched against `/users/42`).
//! - [`QueryParams`]: the `?key=value&...` part of a location. Keys may
//!   repeat (`?tag=a&tag=b`).
//!
//! Both are ordered maps so that two locations with the same parameters
//! compare and serialize identically. Tab identity and persisted route
//! snapshots rely on that.
//!
//! # Example
//!
//! ```
//! use navigator_plugins::params::{split_location, QueryParams};
//!
//! let (path, query) = split_location("/detail?id=1&tab=info");
//! assert_eq!(path, "/detail");
//! assert_eq!(query.get_as::<u32>("id"), Some(1));
//! assert_eq!(query.to_query_string(), "id=1&tab=info");
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Route parameters extracted from path segments
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RouteParams {
    params: BTreeMap<String, String>,
}

impl RouteParams {
    /// Create empty route parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a parameter value by key.
    pub fn get(&self, key: &str) -> Option<&String> {
        self.params.get(key)
    }

    /// Get a parameter and parse it as a specific type
    ///
    /// Returns `None` if the parameter doesn't exist or cannot be parsed.
    pub fn get_as<T>(&self, key: &str) -> Option<T>
    where
        T: std::str::FromStr,
    {
        self.params.get(key)?.parse().ok()
    }

    /// Insert or overwrite a parameter.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.params.insert(key.into(), value.into());
    }

    /// Return `true` if the given key is present.
    pub fn contains(&self, key: &str) -> bool {
        self.params.contains_key(key)
    }

    /// Iterate over all `(key, value)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.params.iter()
    }

    /// Return `true` if there are no parameters.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Return the number of parameters.
    pub fn len(&self) -> usize {
        self.params.len()
    }
}

// ============================================================================
// Query Parameters
// ============================================================================

/// Query parameters parsed from a location's query string
///
/// Supports multiple values for the same key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryParams {
    params: BTreeMap<String, Vec<String>>,
}

impl QueryParams {
    /// Create empty query parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a query string (without the leading `?`).
    ///
    /// A key without `=` is kept with an empty value.
    pub fn from_query_string(query: &str) -> Self {
        let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            params
                .entry(decode_uri_component(key))
                .or_default()
                .push(decode_uri_component(value));
        }

        Self { params }
    }

    /// Get the first value for a key.
    pub fn get(&self, key: &str) -> Option<&String> {
        self.params.get(key)?.first()
    }

    /// Get all values for a key.
    pub fn get_all(&self, key: &str) -> Option<&Vec<String>> {
        self.params.get(key)
    }

    /// Get the first value for a key, parsed as type `T`.
    pub fn get_as<T>(&self, key: &str) -> Option<T>
    where
        T: std::str::FromStr,
    {
        self.get(key)?.parse().ok()
    }

    /// Append a value for the given key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.params.entry(key.into()).or_default().push(value.into());
    }

    /// Return `true` if the given key is present.
    pub fn contains(&self, key: &str) -> bool {
        self.params.contains_key(key)
    }

    /// Serialize back into a query string, keys in sorted order.
    pub fn to_query_string(&self) -> String {
        let pairs: Vec<String> = self
            .params
            .iter()
            .flat_map(|(key, values)| {
                values.iter().map(move |value| {
                    format!(
                        "{}={}",
                        encode_uri_component(key),
                        encode_uri_component(value)
                    )
                })
            })
            .collect();

        pairs.join("&")
    }

    /// Return `true` if there are no parameters.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Return the number of unique parameter keys.
    pub fn len(&self) -> usize {
        self.params.len()
    }
}

// ============================================================================
// Location helpers
// ============================================================================

/// Split a location like `/detail?id=1#top` into its normalized path and query.
///
/// The fragment is dropped; the path always starts with `/` and has no
/// trailing slash (except for the root).
pub fn split_location(location: &str) -> (String, QueryParams) {
    let without_hash = location.split_once('#').map_or(location, |(l, _)| l);
    let (path, query) = without_hash
        .split_once('?')
        .unwrap_or((without_hash, ""));
    (normalize_path(path), QueryParams::from_query_string(query))
}

/// Join a path and query back into a canonical full path.
pub fn full_path(path: &str, query: &QueryParams) -> String {
    if query.is_empty() {
        path.to_string()
    } else {
        format!("{}?{}", path, query.to_query_string())
    }
}

/// Normalize a path: leading slash, no duplicate or trailing slashes.
pub fn normalize_path(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    format!("/{}", segments.join("/"))
}

fn encode_uri_component(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

fn decode_uri_component(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
                match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    Some(byte) => {
                        out.push(byte);
                        i += 3;
                    }
                    None => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            other => {
                out.push(other);
                i += 1;
            }
        }
    }

    String::from_utf8_lossy(&out).into_owned()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_params_get_as() {
        let mut params = RouteParams::new();
        params.insert("id", "123");
        params.insert("active", "true");

        assert_eq!(params.get_as::<i32>("id"), Some(123));
        assert_eq!(params.get_as::<bool>("active"), Some(true));
        assert_eq!(params.get_as::<i32>("missing"), None);
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_query_params_multiple_values() {
        let query = QueryParams::from_query_string("tag=rust&tag=ui&page=2");

        assert_eq!(query.get_all("tag").unwrap().len(), 2);
        assert_eq!(query.get("tag"), Some(&"rust".to_string()));
        assert_eq!(query.get_as::<u32>("page"), Some(2));
    }

    #[test]
    fn test_query_string_is_sorted() {
        let a = QueryParams::from_query_string("b=2&a=1");
        let b = QueryParams::from_query_string("a=1&b=2");
        assert_eq!(a, b);
        assert_eq!(a.to_query_string(), "a=1&b=2");
    }

    #[test]
    fn test_key_without_value() {
        let query = QueryParams::from_query_string("flag&x=1");
        assert!(query.contains("flag"));
        assert_eq!(query.get("flag"), Some(&String::new()));
    }

    #[test]
    fn test_uri_round_trip_utf8() {
        let encoded = encode_uri_component("héllo world");
        assert_eq!(encoded, "h%C3%A9llo%20world");
        assert_eq!(decode_uri_component(&encoded), "héllo world");
        assert_eq!(decode_uri_component("a+b"), "a b");
        assert_eq!(decode_uri_component("100%"), "100%");
    }

    #[test]
    fn test_split_location() {
        let (path, query) = split_location("/users//42/?tab=posts#comments");
        assert_eq!(path, "/users/42");
        assert_eq!(query.get("tab"), Some(&"posts".to_string()));

        let (path, query) = split_location("");
        assert_eq!(path, "/");
        assert!(query.is_empty());
    }

    #[test]
    fn test_full_path() {
        let (path, query) = split_location("/p?x=1");
        assert_eq!(full_path(&path, &query), "/p?x=1");
        assert_eq!(full_path("/p", &QueryParams::new()), "/p");
    }
}
