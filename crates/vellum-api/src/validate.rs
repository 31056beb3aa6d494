//! Document validation.
//!
//! Validation collects every issue it can find rather than stopping at
//! the first, so the host can show a complete report and the renderer
//! can block exactly the offending specs.

use crate::document::{Calculation, InteractiveDocument, InteractiveElement, PageElement};
use crate::{RESERVED_NAMES, SELECTED_SUFFIX};
use miette::Diagnostic;
use smol_str::SmolStr;
use std::collections::HashSet;

/// Where in the document an issue was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueScope {
    Document,
    Variable,
    DataLoader,
    Element,
}

/// One validation finding. `name` is the variable id, data source
/// name, or group id the issue is attributed to.
#[derive(Debug, Clone, thiserror::Error, Diagnostic)]
#[error("{scope:?} `{name}`: {message}")]
#[diagnostic(code(vellum::validate))]
pub struct ValidationIssue {
    pub scope: IssueScope,
    pub name: SmolStr,
    pub message: String,
}

impl ValidationIssue {
    fn new(scope: IssueScope, name: impl Into<SmolStr>, message: impl Into<String>) -> Self {
        Self {
            scope,
            name: name.into(),
            message: message.into(),
        }
    }
}

fn valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Check a document against the naming and structural invariants.
///
/// Returns every issue found; an empty vec means the document is safe
/// to compile and render.
pub fn validate_document(doc: &InteractiveDocument) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    let variables = match &doc.variables {
        Some(vars) => vars.as_slice(),
        None => {
            issues.push(ValidationIssue::new(
                IssueScope::Document,
                doc.title.as_str(),
                "document must declare a `variables` array (it may be empty)",
            ));
            &[]
        }
    };

    let mut variable_ids: HashSet<&str> = HashSet::new();
    for var in variables {
        let id = var.variable_id.as_str();
        if !valid_name(id) {
            issues.push(ValidationIssue::new(
                IssueScope::Variable,
                id,
                "variable id must start with a letter or underscore and contain only word characters",
            ));
        }
        if RESERVED_NAMES.contains(&id) {
            issues.push(ValidationIssue::new(
                IssueScope::Variable,
                id,
                format!("`{id}` is a reserved name"),
            ));
        }
        if !variable_ids.insert(id) {
            issues.push(ValidationIssue::new(
                IssueScope::Variable,
                id,
                "duplicate variable id",
            ));
        }
    }

    let mut loader_names: HashSet<&str> = HashSet::new();
    for loader in &doc.data_loaders {
        let name = loader.data_source_name().as_str();
        if !valid_name(name) {
            issues.push(ValidationIssue::new(
                IssueScope::DataLoader,
                name,
                "data source name must start with a letter or underscore and contain only word characters",
            ));
        }
        if name.ends_with(SELECTED_SUFFIX) {
            issues.push(ValidationIssue::new(
                IssueScope::DataLoader,
                name,
                format!("data source name must not end with the reserved `{SELECTED_SUFFIX}` suffix"),
            ));
        }
        if RESERVED_NAMES.contains(&name) {
            issues.push(ValidationIssue::new(
                IssueScope::DataLoader,
                name,
                format!("`{name}` is a reserved name"),
            ));
        }
        if !loader_names.insert(name) {
            issues.push(ValidationIssue::new(
                IssueScope::DataLoader,
                name,
                "duplicate data source name",
            ));
        }
        if variable_ids.contains(name) {
            issues.push(ValidationIssue::new(
                IssueScope::DataLoader,
                name,
                "data source name collides with a variable id",
            ));
        }
    }

    // Calculation inputs must refer to something declared.
    for var in variables {
        if let Some(Calculation::DataFrame { source_names, .. }) = &var.calculation {
            for source in source_names {
                let known = variable_ids.contains(source.as_str())
                    || loader_names.contains(source.as_str());
                if !known {
                    issues.push(ValidationIssue::new(
                        IssueScope::Variable,
                        var.variable_id.clone(),
                        format!("calculation references unknown source `{source}`"),
                    ));
                }
            }
        }
    }

    for group in &doc.groups {
        for element in group.normalized() {
            match element {
                PageElement::Interactive(InteractiveElement::Dropdown {
                    variable_id,
                    options,
                    dynamic_options,
                    ..
                }) => {
                    if options.is_some() && dynamic_options.is_some() {
                        issues.push(ValidationIssue::new(
                            IssueScope::Element,
                            variable_id,
                            "Dropdown cannot have both static and dynamic options",
                        ));
                    }
                }
                PageElement::Interactive(InteractiveElement::Chart { chart_key, spec }) => {
                    if spec.is_none() {
                        let resolvable = chart_key.as_ref().is_some_and(|key| {
                            doc.resources
                                .as_ref()
                                .is_some_and(|r| r.charts.contains_key(key))
                        });
                        if !resolvable {
                            issues.push(ValidationIssue::new(
                                IssueScope::Element,
                                chart_key.unwrap_or_else(|| "chart".into()),
                                "chart has neither an inline spec nor a resolvable chartKey",
                            ));
                        }
                    }
                }
                _ => {}
            }
        }
    }

    issues
}
