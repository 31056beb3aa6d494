//! Markdown parsing and fence dispatch.
//!
//! Walks the markdown event stream; fenced code blocks whose info
//! string names a registered plugin are routed to that plugin's
//! `fence`, everything else renders as ordinary (escaped) HTML prose.
//! A fence that fails to parse becomes an inline error placeholder and
//! is reported to the error sink; sibling blocks are unaffected.

use crate::placeholder::Placeholder;
use crate::plugin::{ErrorSink, Phase, RenderIssue};
use crate::registry::PluginRegistry;
use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag, TagEnd};
use serde_json::Value;
use smol_str::SmolStr;
use std::collections::HashMap;

/// One ordered chunk of the rendered document.
#[derive(Debug, Clone)]
pub enum Block {
    Html(String),
    Placeholder(Placeholder),
}

#[derive(Debug, Default)]
pub struct ParsedDocument {
    pub blocks: Vec<Block>,
}

impl ParsedDocument {
    pub fn placeholders(&self) -> impl Iterator<Item = &Placeholder> {
        self.blocks.iter().filter_map(|block| match block {
            Block::Placeholder(p) => Some(p),
            Block::Html(_) => None,
        })
    }

    /// Replace an approved placeholder's container lookup, rendering a
    /// blocked notice in place of the spec.
    pub fn block_container(&mut self, container_id: &str, reason: &str) {
        for block in &mut self.blocks {
            if let Block::Placeholder(p) = block {
                if p.container_id == container_id {
                    p.payload = Value::Null;
                    p.classes.push("vellum-blocked".into());
                    p.prose = Some(format!("blocked: {reason}"));
                }
            }
        }
    }

    /// Assemble the document subtree as HTML. Adjacent prose chunks
    /// were already coalesced during parsing.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        for block in &self.blocks {
            match block {
                Block::Html(html) => out.push_str(html),
                Block::Placeholder(p) => out.push_str(&p.to_html()),
            }
        }
        out
    }
}

fn markdown_options() -> Options {
    Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TASKLISTS
}

/// The plugin a fence belongs to: the first info-string token naming a
/// registered plugin (`slider`, or `json slider`).
fn fence_plugin(registry: &PluginRegistry, info: &str) -> Option<&'static str> {
    info.split_whitespace()
        .find_map(|token| registry.get(token).map(|p| p.name()))
}

/// Parse `markdown` into ordered blocks, dispatching plugin fences.
pub fn parse_markdown(
    markdown: &str,
    registry: &PluginRegistry,
    errors: &mut ErrorSink,
) -> ParsedDocument {
    let mut document = ParsedDocument::default();
    let mut prose: Vec<Event<'_>> = Vec::new();
    let mut indices: HashMap<SmolStr, usize> = HashMap::new();

    let flush_prose = |prose: &mut Vec<Event<'_>>, document: &mut ParsedDocument| {
        if prose.is_empty() {
            return;
        }
        let mut html = String::new();
        pulldown_cmark::html::push_html(&mut html, prose.drain(..));
        match document.blocks.last_mut() {
            Some(Block::Html(existing)) => existing.push_str(&html),
            _ => document.blocks.push(Block::Html(html)),
        }
    };

    let mut events = Parser::new_ext(markdown, markdown_options()).peekable();
    while let Some(event) = events.next() {
        let plugin_name = match &event {
            Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(info))) => {
                fence_plugin(registry, info)
            }
            _ => None,
        };
        let Some(plugin_name) = plugin_name else {
            // Document-supplied raw HTML is demoted to text so the
            // writer escapes it; only plugin placeholders may inject
            // markup.
            let event = match event {
                Event::Html(html) | Event::InlineHtml(html) => Event::Text(html),
                other => other,
            };
            prose.push(event);
            continue;
        };

        // Consume the fence body.
        let mut content = String::new();
        for inner in events.by_ref() {
            match inner {
                Event::Text(text) => content.push_str(&text),
                Event::End(TagEnd::CodeBlock) => break,
                _ => {}
            }
        }

        flush_prose(&mut prose, &mut document);

        let index = indices.entry(SmolStr::new(plugin_name)).or_insert(0);
        let current = *index;
        *index += 1;

        let plugin = registry
            .get(plugin_name)
            .expect("fence_plugin only returns registered names");
        match plugin.fence(&content, current) {
            Ok(placeholder) => document.blocks.push(Block::Placeholder(placeholder)),
            Err(err) => {
                errors.report(RenderIssue {
                    plugin_name: plugin_name.into(),
                    index: current,
                    phase: Phase::Parse,
                    container_id: Some(SmolStr::new(format!("{plugin_name}-{current}"))),
                    message: err.to_string(),
                });
                let notice = Placeholder::new(plugin_name, current, Value::Null)
                    .with_class("vellum-error")
                    .with_prose(format!("error: {err}"));
                document.blocks.push(Block::Html(notice.to_html()));
            }
        }
    }
    flush_prose(&mut prose, &mut document);

    document
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::{HydrateCtx, Instance, Plugin, PluginError};
    use vellum_api::SpecReview;

    struct JsonFence(&'static str);

    impl Plugin for JsonFence {
        fn name(&self) -> &'static str {
            self.0
        }
        fn fence(&self, content: &str, index: usize) -> Result<Placeholder, PluginError> {
            let payload: Value = serde_json::from_str(content)
                .map_err(|e| PluginError::InvalidSpec(e.to_string()))?;
            Ok(Placeholder::new(self.0, index, payload))
        }
        fn hydrate_component(
            &self,
            _review: &SpecReview,
            _ctx: &mut HydrateCtx,
        ) -> Result<Vec<Box<dyn Instance>>, PluginError> {
            Ok(Vec::new())
        }
    }

    fn registry() -> PluginRegistry {
        PluginRegistry::builder()
            .register(Box::new(JsonFence("slider")))
            .build()
            .unwrap()
    }

    #[test]
    fn plugin_fences_become_placeholders() {
        let registry = registry();
        let mut errors = ErrorSink::default();
        let doc = parse_markdown(
            "# Title\n\nprose\n\n```slider\n{\"variableId\": \"x\"}\n```\n\nmore prose\n",
            &registry,
            &mut errors,
        );
        assert!(errors.issues().is_empty());
        let placeholders: Vec<_> = doc.placeholders().collect();
        assert_eq!(placeholders.len(), 1);
        assert_eq!(placeholders[0].container_id, "slider-0");
        assert_eq!(doc.blocks.len(), 3);
    }

    #[test]
    fn unknown_fences_render_as_prose() {
        let registry = registry();
        let mut errors = ErrorSink::default();
        let doc = parse_markdown("```python\nprint('hi')\n```\n", &registry, &mut errors);
        assert_eq!(doc.placeholders().count(), 0);
        assert!(doc.to_html().contains("print("));
    }

    #[test]
    fn bad_fence_reports_error_and_keeps_siblings() {
        let registry = registry();
        let mut errors = ErrorSink::default();
        let doc = parse_markdown(
            "```slider\nnot json\n```\n\n```slider\n{\"variableId\": \"y\"}\n```\n",
            &registry,
            &mut errors,
        );
        assert_eq!(errors.issues().len(), 1);
        assert_eq!(errors.issues()[0].phase, Phase::Parse);
        assert_eq!(errors.issues()[0].index, 0);
        // The sibling still parsed, with its own document-order index.
        let placeholders: Vec<_> = doc.placeholders().collect();
        assert_eq!(placeholders.len(), 1);
        assert_eq!(placeholders[0].container_id, "slider-1");
        assert!(doc.to_html().contains("vellum-error"));
    }

    #[test]
    fn hostile_prose_is_escaped() {
        let registry = registry();
        let mut errors = ErrorSink::default();
        let doc = parse_markdown(
            "hello <img src=x onerror=alert(1)>\n",
            &registry,
            &mut errors,
        );
        let html = doc.to_html();
        assert!(!html.contains("<img src=x onerror=alert(1)>"));
    }
}
