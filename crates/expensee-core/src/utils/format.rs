use reqwest::header::{self, HeaderName};
use serde_json::Value;

/// Field names whose values never appear in logs
const SECRET_FIELDS: &[&str] = &["password", "new_password", "refresh_token", "access_token", "token"];

pub fn is_secret_field(name: &str) -> bool {
    SECRET_FIELDS.iter().any(|f| f.eq_ignore_ascii_case(name))
}

/// Truncate a string to a maximum length, adding ellipsis if needed
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}

/// Truncate a response or request body for logging, noting the original size.
pub fn truncate_body(body: &str, max_len: usize) -> String {
    if body.len() <= max_len {
        body.to_string()
    } else {
        let head: String = body.chars().take(max_len).collect();
        format!("{}... (truncated, {} total bytes)", head, body.len())
    }
}

/// Render a header value for logs. Credentials are masked, keeping only the scheme.
pub fn redact_header(name: &HeaderName, value: &str) -> String {
    if name == header::AUTHORIZATION || name == header::COOKIE {
        match value.split_once(' ') {
            Some((scheme, _)) => format!("{} [redacted]", scheme),
            None => "[redacted]".to_string(),
        }
    } else {
        value.to_string()
    }
}

/// Copy of a JSON value with secret fields masked, at any depth.
pub fn redact_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| {
                    let v = if is_secret_field(k) {
                        Value::String("[redacted]".to_string())
                    } else {
                        redact_json(v)
                    };
                    (k.clone(), v)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact_json).collect()),
        other => other.clone(),
    }
}
