//! The interactive document model.
//!
//! This mirrors the JSON interchange format: a titled list of element
//! groups, optional data loaders, and a (possibly empty, but required)
//! list of variables. Elements are either markdown prose fragments or
//! typed interactive controls.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use smol_str::SmolStr;
use std::collections::BTreeMap;

/// Scalar type of a document variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableType {
    Number,
    String,
    Boolean,
    Object,
}

/// A named, typed signal declared by the document.
///
/// `variable_id` must be unique within the document and must not
/// collide with reserved names or data source names.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    pub variable_id: SmolStr,
    #[serde(rename = "type")]
    pub var_type: VariableType,
    #[serde(default)]
    pub is_array: bool,
    #[serde(default)]
    pub initial_value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calculation: Option<Calculation>,
}

/// Derivation attached to a variable. Exactly one kind per variable:
/// a scalar expression or a tabular derivation over named sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Calculation {
    #[serde(rename_all = "camelCase")]
    DataFrame {
        source_names: Vec<SmolStr>,
        #[serde(default)]
        transformations: Vec<Transformation>,
    },
    Scalar { expression: String },
}

/// Row-level transformation applied to a derived data frame.
///
/// Only the kinds the brain executes are modeled; anything else is
/// carried opaquely and ignored at evaluation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Transformation {
    Filter { expr: String },
    Derive { field: SmolStr, expr: String },
    #[serde(untagged)]
    Other(Value),
}

/// Tabular data format for loaders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DataFormat {
    #[default]
    Json,
    Csv,
    Tsv,
    Dsv,
}

/// Source of a named tabular data set.
///
/// `data_source_name` follows the same naming rules as variable ids
/// and additionally must not end with the reserved `_selected` suffix.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DataLoader {
    #[serde(rename_all = "camelCase")]
    Inline {
        data_source_name: SmolStr,
        #[serde(default)]
        format: DataFormat,
        content: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        delimiter: Option<char>,
        #[serde(default)]
        transformations: Vec<Transformation>,
    },
    #[serde(rename_all = "camelCase")]
    File {
        data_source_name: SmolStr,
        filename: String,
        #[serde(default)]
        format: DataFormat,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        delimiter: Option<char>,
        #[serde(default)]
        transformations: Vec<Transformation>,
    },
    #[serde(rename_all = "camelCase")]
    Url {
        data_source_name: SmolStr,
        url: String,
        #[serde(default)]
        format: DataFormat,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        delimiter: Option<char>,
        #[serde(default)]
        transformations: Vec<Transformation>,
    },
    #[serde(rename_all = "camelCase")]
    Spec {
        data_source_name: SmolStr,
        spec: Value,
    },
}

impl DataLoader {
    pub fn data_source_name(&self) -> &SmolStr {
        match self {
            DataLoader::Inline {
                data_source_name, ..
            }
            | DataLoader::File {
                data_source_name, ..
            }
            | DataLoader::Url {
                data_source_name, ..
            }
            | DataLoader::Spec {
                data_source_name, ..
            } => data_source_name,
        }
    }
}

/// One entry in an element group: prose or a typed control.
///
/// Plain strings decode as markdown; shorthand strings such as
/// `"slider x"` are expanded to controls during normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PageElement {
    Markdown(String),
    Interactive(InteractiveElement),
}

/// Dynamic option source for dropdowns: a data source plus the field
/// providing option labels.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicOptions {
    pub data_source_name: SmolStr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_name: Option<SmolStr>,
}

/// Named batch of signal values applied when the user activates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preset {
    pub name: String,
    pub state: BTreeMap<SmolStr, Value>,
}

/// A typed interactive control.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InteractiveElement {
    #[serde(rename_all = "camelCase")]
    Checkbox {
        variable_id: SmolStr,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Dropdown {
        variable_id: SmolStr,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        options: Option<Vec<String>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        dynamic_options: Option<DynamicOptions>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        multiple: Option<bool>,
    },
    #[serde(rename_all = "camelCase")]
    Slider {
        variable_id: SmolStr,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
        #[serde(default)]
        min: f64,
        #[serde(default = "default_slider_max")]
        max: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        step: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<f64>,
    },
    #[serde(rename_all = "camelCase")]
    Textbox {
        variable_id: SmolStr,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        placeholder: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Number {
        variable_id: SmolStr,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        step: Option<f64>,
    },
    #[serde(rename_all = "camelCase")]
    Date {
        variable_id: SmolStr,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Image {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        variable_id: Option<SmolStr>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        alt: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Chart {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        chart_key: Option<SmolStr>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        spec: Option<Value>,
    },
    #[serde(rename_all = "camelCase")]
    Tabulator {
        data_source_name: SmolStr,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        variable_id: Option<SmolStr>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        editable: Option<bool>,
    },
    Presets { presets: Vec<Preset> },
    #[serde(rename_all = "camelCase")]
    Inspector {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data_source_name: Option<SmolStr>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        variable_id: Option<SmolStr>,
    },
}

fn default_slider_max() -> f64 {
    100.0
}

/// Named ordered sequence of page elements.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementGroup {
    pub group_id: SmolStr,
    pub elements: Vec<PageElement>,
}

/// Document-scoped chart resources, keyed by chart name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Resources {
    #[serde(default)]
    pub charts: BTreeMap<SmolStr, Value>,
}

/// The on-disk / interchange form of an interactive document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractiveDocument {
    pub title: String,
    pub groups: Vec<ElementGroup>,
    #[serde(default)]
    pub data_loaders: Vec<DataLoader>,
    /// Required by the format, though it may be empty. `None` means the
    /// document forgot to declare it, which validation rejects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<Vec<Variable>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<Resources>,
}

impl ElementGroup {
    /// Expand shorthand strings and coalesce adjacent markdown
    /// fragments into single fragments, preserving insertion order.
    pub fn normalized(&self) -> Vec<PageElement> {
        let mut out: Vec<PageElement> = Vec::with_capacity(self.elements.len());
        for element in &self.elements {
            let element = match element {
                PageElement::Markdown(text) => match parse_shorthand(text) {
                    Some(control) => PageElement::Interactive(control),
                    None => PageElement::Markdown(text.clone()),
                },
                other => other.clone(),
            };
            match (&element, out.last_mut()) {
                (PageElement::Markdown(next), Some(PageElement::Markdown(prev))) => {
                    prev.push_str("\n\n");
                    prev.push_str(next);
                }
                _ => out.push(element),
            }
        }
        out
    }
}

/// Parse the `"<kind> <variableId>"` shorthand for controls.
///
/// Returns `None` when the string is ordinary prose.
pub fn parse_shorthand(text: &str) -> Option<InteractiveElement> {
    let mut words = text.split_whitespace();
    let kind = words.next()?;
    let target: SmolStr = words.next()?.into();
    if words.next().is_some() {
        return None;
    }
    match kind {
        "checkbox" => Some(InteractiveElement::Checkbox {
            variable_id: target,
            label: None,
        }),
        "dropdown" => Some(InteractiveElement::Dropdown {
            variable_id: target,
            label: None,
            options: None,
            dynamic_options: None,
            multiple: None,
        }),
        "slider" => Some(InteractiveElement::Slider {
            variable_id: target,
            label: None,
            min: 0.0,
            max: 100.0,
            step: None,
            value: None,
        }),
        "textbox" => Some(InteractiveElement::Textbox {
            variable_id: target,
            label: None,
            placeholder: None,
        }),
        "number" => Some(InteractiveElement::Number {
            variable_id: target,
            label: None,
            min: None,
            max: None,
            step: None,
        }),
        "date" => Some(InteractiveElement::Date {
            variable_id: target,
            label: None,
        }),
        "tabulator" => Some(InteractiveElement::Tabulator {
            data_source_name: target,
            variable_id: None,
            editable: None,
        }),
        "chart" => Some(InteractiveElement::Chart {
            chart_key: Some(target),
            spec: None,
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn document_round_trips_through_json() {
        let doc: InteractiveDocument = serde_json::from_value(json!({
            "title": "Sales",
            "variables": [
                {"variableId": "x", "type": "number", "initialValue": 5}
            ],
            "groups": [
                {"groupId": "main", "elements": ["Intro.", "slider x"]}
            ]
        }))
        .unwrap();
        assert_eq!(doc.title, "Sales");
        let vars = doc.variables.as_ref().unwrap();
        assert_eq!(vars[0].variable_id, "x");
        assert_eq!(vars[0].initial_value, json!(5));

        let back = serde_json::to_value(&doc).unwrap();
        let again: InteractiveDocument = serde_json::from_value(back).unwrap();
        assert_eq!(again.groups.len(), 1);
    }

    #[test]
    fn shorthand_expands_to_controls() {
        match parse_shorthand("slider x") {
            Some(InteractiveElement::Slider {
                variable_id, max, ..
            }) => {
                assert_eq!(variable_id, "x");
                assert_eq!(max, 100.0);
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(parse_shorthand("just some prose").is_none());
        assert!(parse_shorthand("slider").is_none());
    }

    #[test]
    fn adjacent_markdown_coalesces_in_order() {
        let group = ElementGroup {
            group_id: "main".into(),
            elements: vec![
                PageElement::Markdown("one".into()),
                PageElement::Markdown("two".into()),
                PageElement::Markdown("checkbox flag".into()),
                PageElement::Markdown("three".into()),
            ],
        };
        let normalized = group.normalized();
        assert_eq!(normalized.len(), 3);
        match &normalized[0] {
            PageElement::Markdown(text) => assert_eq!(text, "one\n\ntwo"),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(matches!(
            normalized[1],
            PageElement::Interactive(InteractiveElement::Checkbox { .. })
        ));
    }

    #[test]
    fn calculation_kinds_decode_distinctly() {
        let scalar: Calculation = serde_json::from_value(json!({"expression": "a + 1"})).unwrap();
        assert!(matches!(scalar, Calculation::Scalar { .. }));

        let frame: Calculation = serde_json::from_value(json!({
            "sourceNames": ["sales"],
            "transformations": [{"type": "filter", "expr": "datum.amount > 10"}]
        }))
        .unwrap();
        match frame {
            Calculation::DataFrame {
                source_names,
                transformations,
            } => {
                assert_eq!(source_names, vec![SmolStr::new("sales")]);
                assert!(matches!(transformations[0], Transformation::Filter { .. }));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
