//! JSONP body unwrapping.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{ReportError, Result};

/// `callbackName(` prefix, allowing dotted names and leading comments Solr may emit.
static CALLBACK_OPEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:/\*\*/\s*)?(?P<name>[A-Za-z_$][A-Za-z0-9_$.]*)\s*\(").unwrap()
});

/// Strip a `callback( ... )` wrapper, returning the inner JSON text.
///
/// Bare JSON bodies are returned unchanged. When `expected` is given, a wrapper
/// naming a different callback is rejected.
pub fn unwrap_jsonp<'a>(body: &'a str, expected: Option<&str>) -> Result<&'a str> {
    let trimmed = body.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return Ok(trimmed);
    }

    let caps = CALLBACK_OPEN.captures(trimmed).ok_or_else(|| {
        ReportError::MalformedResponse("body is neither JSON nor a JSONP callback".to_string())
    })?;
    let name = &caps["name"];
    if let Some(expected) = expected {
        if name != expected {
            return Err(ReportError::MalformedResponse(format!(
                "expected callback {}, got {}",
                expected, name
            )));
        }
    }

    let open_end = caps.get(0).map(|m| m.end()).unwrap_or(0);
    let rest = trimmed[open_end..].trim_end();
    let rest = rest.strip_suffix(';').unwrap_or(rest).trim_end();
    rest.strip_suffix(')')
        .map(str::trim)
        .ok_or_else(|| ReportError::MalformedResponse("unterminated JSONP callback".to_string()))
}
