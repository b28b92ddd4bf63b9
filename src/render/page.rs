//! Page-level output: a standalone report page, or in-place element replacement.

use std::sync::LazyLock;

use askama::Template;
use regex::Regex;

use crate::error::{ReportError, Result};

/// Standalone page holding the rendered fragment in its target element.
#[derive(Template)]
#[template(path = "report.html")]
pub struct ReportPage<'a> {
    pub title: &'a str,
    pub element_id: &'a str,
    pub fragment: &'a str,
}

impl ReportPage<'_> {
    pub fn to_html(&self) -> Result<String> {
        self.render()
            .map_err(|e| ReportError::Sink(format!("failed to render page: {}", e)))
    }
}

/// Comments, or start/end tags with their raw attribute text. Quoted attribute
/// values may contain `>`.
static TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?s)<!--.*?-->|<(?P<close>/?)(?P<tag>[A-Za-z][A-Za-z0-9-]*)(?P<attrs>(?:[^>"']|"[^"]*"|'[^']*')*)>"#,
    )
    .unwrap()
});

/// One attribute: a name, optionally followed by a double-quoted, single-quoted
/// or unquoted value.
static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?P<name>[^\s"'>/=]+)(?:\s*=\s*(?:"(?P<dq>[^"]*)"|'(?P<sq>[^']*)'|(?P<bare>[^\s"'=<>`]+)))?"#,
    )
    .unwrap()
});

/// Value of the `id` attribute in a start tag's attribute text, if any.
fn id_attribute(attrs: &str) -> Option<&str> {
    ATTRIBUTE
        .captures_iter(attrs)
        .filter(|c| c["name"].eq_ignore_ascii_case("id"))
        .find_map(|c| {
            c.name("dq")
                .or_else(|| c.name("sq"))
                .or_else(|| c.name("bare"))
                .map(|m| m.as_str())
        })
}

/// Replace the inner content of the element whose `id` attribute equals
/// `element_id`.
///
/// Comments are skipped, so a commented-out element is never patched. Nested
/// elements with the same tag name are balanced; the element's own attributes
/// are left untouched.
pub fn replace_element_content(page: &str, element_id: &str, content: &str) -> Result<String> {
    let mut tokens = TOKEN
        .captures_iter(page)
        .filter(|c| c.name("tag").is_some());

    let (open_end, tag) = loop {
        let Some(c) = tokens.next() else {
            return Err(ReportError::Sink(format!(
                "no element with id {} in page",
                element_id
            )));
        };
        if !c["close"].is_empty() || id_attribute(&c["attrs"]) != Some(element_id) {
            continue;
        }
        if c["attrs"].trim_end().ends_with('/') {
            return Err(ReportError::Sink(format!(
                "element {} is self-closing",
                element_id
            )));
        }
        let end = c.get(0).map(|m| m.end()).unwrap_or(0);
        break (end, c["tag"].to_string());
    };

    let mut depth = 1usize;
    for c in tokens {
        if !c["tag"].eq_ignore_ascii_case(&tag) {
            continue;
        }
        if c["close"].is_empty() {
            if !c["attrs"].trim_end().ends_with('/') {
                depth += 1;
            }
            continue;
        }
        depth -= 1;
        if depth == 0 {
            let close_start = c.get(0).map(|m| m.start()).unwrap_or(open_end);
            let mut out = String::with_capacity(page.len() + content.len());
            out.push_str(&page[..open_end]);
            out.push_str(content);
            out.push_str(&page[close_start..]);
            return Ok(out);
        }
    }

    Err(ReportError::Sink(format!(
        "element {} is never closed",
        element_id
    )))
}
