//! Escaping of free text (tooltips, labels) before it is stored or drawn.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub const DANGEROUS_TAGS: [&str; 5] = ["script", "alert", "onclick", "onerror", "onload"];
pub const DANGEROUS_ATTRS: [&str; 3] = ["href", "xlink:href", "style"];

/// Fullwidth dollar sign, substituted for a leading `$` or `{`.
const STORAGE_OPERATOR_REPLACEMENT: char = '\u{FF04}';

lazy_static! {
    static ref DANGEROUS_TAG_PATTERNS: Vec<Regex> = DANGEROUS_TAGS
        .iter()
        .filter_map(|tag| Regex::new(&format!(r"(?is)<{tag}\b[^>]*>.*?</{tag}\s*>")).ok())
        .collect();
    static ref DANGEROUS_ATTR_PATTERNS: Vec<Regex> = DANGEROUS_ATTRS
        .iter()
        .filter_map(|attr| Regex::new(&format!(r#"(?i){}\s*=\s*".*?""#, regex::escape(attr))).ok())
        .collect();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SanitizeOptions {
    pub for_storage: bool,
    pub for_svg: bool,
}

impl Default for SanitizeOptions {
    fn default() -> Self {
        Self {
            for_storage: true,
            for_svg: true,
        }
    }
}

impl SanitizeOptions {
    pub fn none() -> Self {
        Self {
            for_storage: false,
            for_svg: false,
        }
    }
}

pub fn sanitize(text: &str, options: SanitizeOptions) -> String {
    let mut out = if options.for_svg {
        strip_svg_content(text)
    } else {
        text.to_string()
    };
    out = escape_html(&out);
    if options.for_storage {
        out = escape_storage_operators(&out);
    }
    out
}

/// Shorthand for the default (storage + SVG) sanitization.
pub fn sanitize_text(text: &str) -> String {
    sanitize(text, SanitizeOptions::default())
}

pub fn strip_svg_content(text: &str) -> String {
    let mut out = text.to_string();
    for re in DANGEROUS_TAG_PATTERNS.iter() {
        out = re.replace_all(&out, "").into_owned();
    }
    for re in DANGEROUS_ATTR_PATTERNS.iter() {
        out = re.replace_all(&out, "").into_owned();
    }
    out
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn escape_storage_operators(text: &str) -> String {
    match text.chars().next() {
        Some('$') | Some('{') => {
            let mut out = String::with_capacity(text.len() + 2);
            out.push(STORAGE_OPERATOR_REPLACEMENT);
            out.push_str(&text[1..]);
            out
        }
        _ => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_html_is_escaped() {
        assert_eq!(
            sanitize("<div>Test & <b>bold</b></div>", SanitizeOptions::none()),
            "&lt;div&gt;Test &amp; &lt;b&gt;bold&lt;/b&gt;&lt;/div&gt;"
        );
    }

    #[test]
    fn test_script_is_removed_for_svg() {
        let out = sanitize_text("<svg><script>alert('xss')</script></svg>");
        assert!(!out.contains("script"));
        assert_eq!(sanitize_text("<script>alert('XSS')</script>"), "");
    }

    #[test]
    fn test_dangerous_tags_are_removed() {
        for tag in DANGEROUS_TAGS {
            let input = format!("<svg><{tag}></{tag}></svg>");
            assert_eq!(strip_svg_content(&input), "<svg></svg>");
        }
    }

    #[test]
    fn test_dangerous_attrs_are_removed() {
        for attr in DANGEROUS_ATTRS {
            let input = format!(r#"<svg><circle {attr}="dangerous"/></svg>"#);
            assert!(!strip_svg_content(&input).contains(attr));
        }
    }

    #[test]
    fn test_storage_prefixes_are_replaced() {
        assert_eq!(escape_storage_operators("$set"), "\u{FF04}set");
        assert_eq!(escape_storage_operators("{test}"), "\u{FF04}test}");
        assert_eq!(escape_storage_operators("a$b"), "a$b");
    }

    #[test]
    fn test_plain_text_and_unicode_pass_through() {
        assert_eq!(sanitize_text(""), "");
        assert_eq!(
            sanitize_text("Normal string with no special characters"),
            "Normal string with no special characters"
        );
        let out = sanitize_text("测试 <script>alert('XSS')</script> 🚀");
        assert!(out.contains("测试"));
        assert!(out.contains("🚀"));
        assert!(!out.contains("<script>"));
    }
}
