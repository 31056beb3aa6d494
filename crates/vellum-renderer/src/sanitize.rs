//! Escaping helpers for document-supplied strings.
//!
//! Everything a plugin embeds into the page goes through this module.
//! Specs ride inside inert JSON script tags; the escaping guarantees a
//! hostile payload cannot break out of the tag it is embedded in.

use pulldown_cmark_escape::{escape_href, escape_html, escape_html_body_text};
use serde_json::Value;

/// Escape text destined for an element body.
pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let _ = escape_html_body_text(&mut out, text);
    out
}

/// Escape text destined for an attribute value.
pub fn escape_attr(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let _ = escape_html(&mut out, text);
    out
}

/// Escape a URL destined for an href/src attribute.
pub fn escape_url(url: &str) -> String {
    let mut out = String::with_capacity(url.len());
    let _ = escape_href(&mut out, url);
    out
}

/// Serialize `value` into an inert `<script type="application/json">`
/// tag. `<`, `>`, and `&` in the serialized JSON are escaped, so a
/// string containing `</script>` cannot terminate the tag early.
pub fn inert_json_script(value: &Value) -> String {
    let json = serde_json::to_string(value).unwrap_or_else(|_| "null".to_string());
    let mut escaped = String::with_capacity(json.len());
    for c in json.chars() {
        match c {
            '<' => escaped.push_str("\\u003c"),
            '>' => escaped.push_str("\\u003e"),
            '&' => escaped.push_str("\\u0026"),
            _ => escaped.push(c),
        }
    }
    format!(r#"<script type="application/json">{escaped}</script>"#)
}

/// Recover the JSON value from a payload produced by
/// [`inert_json_script`]. The unicode escapes decode transparently.
pub fn parse_inert_json(payload: &str) -> Result<Value, serde_json::Error> {
    serde_json::from_str(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn script_breakout_is_neutralized() {
        let hostile = json!({"text": "</script><img src=x onerror=alert(1)>"});
        let tag = inert_json_script(&hostile);
        let payload = tag
            .strip_prefix(r#"<script type="application/json">"#)
            .and_then(|rest| rest.strip_suffix("</script>"))
            .unwrap();
        assert!(!payload.contains("</script>"));
        assert!(!payload.contains('<'));
        assert!(!payload.contains('>'));

        let recovered = parse_inert_json(payload).unwrap();
        assert_eq!(recovered, hostile);
    }

    #[test]
    fn body_text_is_escaped() {
        assert_eq!(escape_text("a < b & c"), "a &lt; b &amp; c");
    }
}
