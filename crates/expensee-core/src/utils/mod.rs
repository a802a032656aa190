//! Utility functions for log formatting.

pub mod format;

pub use format::{is_secret_field, redact_header, redact_json, truncate_body, truncate_string};
