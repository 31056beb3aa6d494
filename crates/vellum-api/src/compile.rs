//! Lowers an [`InteractiveDocument`] to its fenced-markdown form.
//!
//! The markdown form is what actually crosses into the sandbox
//! (`sandboxRender` carries only markdown). Prose passes through
//! verbatim; every control, data loader, and the variables declaration
//! becomes a fenced code block whose info string names the plugin that
//! owns it and whose body is the element spec as JSON.

use crate::document::{
    DataLoader, InteractiveDocument, InteractiveElement, PageElement, Variable,
};
use serde_json::Value;
use std::fmt::Write;

/// Fence info string for a control, i.e. the plugin that hydrates it.
fn plugin_name(element: &InteractiveElement) -> &'static str {
    match element {
        InteractiveElement::Checkbox { .. } => "checkbox",
        InteractiveElement::Dropdown { .. } => "dropdown",
        InteractiveElement::Slider { .. } => "slider",
        InteractiveElement::Textbox { .. } => "textbox",
        InteractiveElement::Number { .. } => "number",
        InteractiveElement::Date { .. } => "date",
        InteractiveElement::Image { .. } => "image",
        InteractiveElement::Chart { .. } => "chart",
        InteractiveElement::Tabulator { .. } => "tabulator",
        InteractiveElement::Presets { .. } => "presets",
        InteractiveElement::Inspector { .. } => "inspector",
    }
}

fn chart_fence(spec: &Value) -> &'static str {
    let is_lite = spec
        .get("$schema")
        .and_then(Value::as_str)
        .is_some_and(|schema| schema.contains("vega-lite"));
    if is_lite { "vega-lite" } else { "vega" }
}

fn push_fence(out: &mut String, info: &str, body: &Value) {
    let json = serde_json::to_string_pretty(body).unwrap_or_else(|_| "null".to_string());
    // A longer fence keeps JSON containing backticks inert.
    let _ = writeln!(out, "````{info}\n{json}\n````\n");
}

fn push_variables(out: &mut String, variables: &[Variable]) {
    if variables.is_empty() {
        return;
    }
    let body = serde_json::to_value(variables).unwrap_or(Value::Null);
    push_fence(out, "variables", &body);
}

fn push_loader(out: &mut String, loader: &DataLoader) {
    let body = serde_json::to_value(loader).unwrap_or(Value::Null);
    push_fence(out, "data", &body);
}

fn push_element(out: &mut String, element: &InteractiveElement, doc: &InteractiveDocument) {
    // Charts referencing a resource key are inlined at compile time so
    // the sandbox never needs the resources table.
    if let InteractiveElement::Chart { chart_key, spec } = element {
        let resolved = spec.clone().or_else(|| {
            let key = chart_key.as_ref()?;
            doc.resources.as_ref()?.charts.get(key).cloned()
        });
        match resolved {
            Some(spec) => push_fence(out, chart_fence(&spec), &spec),
            // Unresolvable charts still target the chart pipeline;
            // validation reports the missing resource.
            None => push_fence(
                out,
                "vega",
                &serde_json::to_value(element).unwrap_or(Value::Null),
            ),
        }
        return;
    }
    let body = serde_json::to_value(element).unwrap_or(Value::Null);
    push_fence(out, plugin_name(element), &body);
}

/// Compile a document to markdown. The caller is expected to have run
/// [`crate::validate_document`] first; compilation itself is total.
pub fn compile_document(doc: &InteractiveDocument) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# {}\n", doc.title);

    push_variables(&mut out, doc.variables.as_deref().unwrap_or(&[]));
    for loader in &doc.data_loaders {
        push_loader(&mut out, loader);
    }

    for (index, group) in doc.groups.iter().enumerate() {
        // The first group is conventionally "main" and needs no heading.
        if index > 0 || group.group_id != "main" {
            let _ = writeln!(out, "## {}\n", group.group_id);
        }
        for element in group.normalized() {
            match element {
                PageElement::Markdown(text) => {
                    let _ = writeln!(out, "{text}\n");
                }
                PageElement::Interactive(control) => push_element(&mut out, &control, doc),
            }
        }
    }

    out
}
