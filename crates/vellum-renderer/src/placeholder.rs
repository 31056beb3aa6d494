//! Structural placeholder descriptors.
//!
//! Plugins never emit raw HTML. `fence` produces a [`Placeholder`]
//! describing the container element and its inert spec payload; a
//! rendering adapter ([`Placeholder::to_html`]) turns it into markup.
//! This keeps plugin logic host-environment-agnostic and testable
//! without a browser.

use crate::sanitize;
use serde_json::Value;
use smol_str::SmolStr;

#[derive(Debug, Clone)]
pub struct Placeholder {
    pub plugin_name: SmolStr,
    pub container_id: SmolStr,
    /// Position of this plugin's fence within the document.
    pub index: usize,
    pub tag: SmolStr,
    pub classes: Vec<SmolStr>,
    pub attrs: Vec<(SmolStr, String)>,
    /// The extracted spec, carried inert until hydration.
    pub payload: Value,
    /// Visible text inside the container (error and blocked notices).
    pub prose: Option<String>,
}

impl Placeholder {
    pub fn new(plugin_name: impl Into<SmolStr>, index: usize, payload: Value) -> Self {
        let plugin_name = plugin_name.into();
        let container_id = SmolStr::new(format!("{plugin_name}-{index}"));
        Self {
            plugin_name: plugin_name.clone(),
            container_id,
            index,
            tag: "div".into(),
            classes: vec![SmolStr::new(format!("vellum-{plugin_name}"))],
            attrs: Vec::new(),
            payload,
            prose: None,
        }
    }

    pub fn with_class(mut self, class: impl Into<SmolStr>) -> Self {
        self.classes.push(class.into());
        self
    }

    pub fn with_prose(mut self, prose: impl Into<String>) -> Self {
        self.prose = Some(prose.into());
        self
    }

    /// Render the container: an element with the escaped id/classes, an
    /// inert JSON script tag when a payload is present, and escaped
    /// prose.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        out.push('<');
        out.push_str(&self.tag);
        out.push_str(&format!(r#" id="{}""#, sanitize::escape_attr(&self.container_id)));
        if !self.classes.is_empty() {
            let classes: Vec<String> = self
                .classes
                .iter()
                .map(|c| sanitize::escape_attr(c))
                .collect();
            out.push_str(&format!(r#" class="{}""#, classes.join(" ")));
        }
        for (name, value) in &self.attrs {
            out.push_str(&format!(
                r#" {}="{}""#,
                sanitize::escape_attr(name),
                sanitize::escape_attr(value)
            ));
        }
        out.push('>');
        if !self.payload.is_null() {
            out.push_str(&sanitize::inert_json_script(&self.payload));
        }
        if let Some(prose) = &self.prose {
            out.push_str(&sanitize::escape_text(prose));
        }
        out.push_str(&format!("</{}>", self.tag));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn container_ids_are_plugin_scoped() {
        let p = Placeholder::new("slider", 2, json!({"variableId": "x"}));
        assert_eq!(p.container_id, "slider-2");
        let html = p.to_html();
        assert!(html.starts_with(r#"<div id="slider-2" class="vellum-slider">"#));
        assert!(html.contains(r#"<script type="application/json">"#));
    }

    #[test]
    fn container_markup_snapshot() {
        let live = Placeholder::new("slider", 0, json!({"variableId": "x", "max": 10}));
        insta::assert_snapshot!(
            live.to_html(),
            @r#"<div id="slider-0" class="vellum-slider"><script type="application/json">{"variableId":"x","max":10}</script></div>"#
        );

        let blocked = Placeholder::new("vega", 1, Value::Null)
            .with_class("vellum-blocked")
            .with_prose("blocked: charts disabled");
        insta::assert_snapshot!(
            blocked.to_html(),
            @r#"<div id="vega-1" class="vellum-vega vellum-blocked">blocked: charts disabled</div>"#
        );
    }

    #[test]
    fn prose_is_escaped() {
        let p = Placeholder::new("vega", 0, Value::Null)
            .with_prose("blocked: <script>alert(1)</script>");
        let html = p.to_html();
        assert!(!html.contains("<script>alert"));
        assert!(html.contains("&lt;script&gt;"));
    }
}
