//! Common filters and functions available to every config template
//!
//! - `b64enc` / `b64dec`: base64 encoding
//! - `quote`: double-quoted, escaped string
//! - `trim_suffix(suffix)`: strip a trailing suffix
//! - `to_yaml` / `to_json`: serialize a value
//! - `path_join(a, b, ...)`: join path segments with `/`

use base64::{engine::general_purpose::STANDARD, Engine};
use minijinja::value::Rest;
use minijinja::{Error, ErrorKind, Value};

pub fn b64enc(value: &str) -> String {
    STANDARD.encode(value.as_bytes())
}

pub fn b64dec(value: &str) -> Result<String, Error> {
    let bytes = STANDARD.decode(value).map_err(|e| {
        Error::new(
            ErrorKind::InvalidOperation,
            format!("base64 decode error: {e}"),
        )
    })?;
    String::from_utf8(bytes).map_err(|e| {
        Error::new(
            ErrorKind::InvalidOperation,
            format!("base64 decode produced invalid UTF-8: {e}"),
        )
    })
}

/// Usage: `{{ spec.chart.url | quote }}`
pub fn quote(value: Value) -> String {
    let raw = if value.is_undefined() || value.is_none() {
        String::new()
    } else {
        value.to_string()
    };
    format!("\"{}\"", raw.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Usage: `{{ url | trim_suffix("/") }}`
pub fn trim_suffix(value: &str, suffix: &str) -> String {
    value.strip_suffix(suffix).unwrap_or(value).to_string()
}

pub fn to_yaml(value: Value) -> Result<String, Error> {
    serde_yaml::to_string(&value)
        .map(|yaml| yaml.trim_end().to_string())
        .map_err(|e| Error::new(ErrorKind::BadSerialization, format!("yaml: {e}")))
}

pub fn to_json(value: Value) -> Result<String, Error> {
    serde_json::to_string(&value)
        .map_err(|e| Error::new(ErrorKind::BadSerialization, format!("json: {e}")))
}

/// Usage: `{{ path_join(root, "docker", "registry") }}`
pub fn path_join(segments: Rest<String>) -> String {
    let mut joined = String::new();
    for segment in segments.iter().filter(|s| !s.is_empty()) {
        if joined.is_empty() {
            joined.push_str(segment.trim_end_matches('/'));
        } else {
            joined.push('/');
            joined.push_str(segment.trim_matches('/'));
        }
    }
    joined
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base64_roundtrip_and_invalid_input() {
        assert_eq!(b64enc("harbor"), "aGFyYm9y");
        assert_eq!(b64dec("aGFyYm9y").unwrap(), "harbor");
        assert!(b64dec("not base64!").is_err());
    }

    #[test]
    fn test_quote_escapes() {
        assert_eq!(quote(Value::from("a\"b")), "\"a\\\"b\"");
        assert_eq!(quote(Value::UNDEFINED), "\"\"");
    }

    #[test]
    fn test_trim_suffix() {
        assert_eq!(trim_suffix("http://core/", "/"), "http://core");
        assert_eq!(trim_suffix("http://core", "/"), "http://core");
    }

    #[test]
    fn test_path_join() {
        assert_eq!(
            path_join(Rest(vec!["/storage/".to_string(), "/docker".to_string(), String::new()])),
            "/storage/docker"
        );
    }
}
