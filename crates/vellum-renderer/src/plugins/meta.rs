//! Document metadata fences: variable declarations and data loaders.
//!
//! Neither produces a live component. Their approved specs feed the
//! brain build and the data loading pass after hydration, so their
//! validation runs here, before the approval round-trip.

use crate::expr;
use crate::placeholder::Placeholder;
use crate::plugin::{HydrateCtx, Instance, Plugin, PluginError};
use vellum_api::{Calculation, DataLoader, SpecReview, Variable, RESERVED_NAMES, SELECTED_SUFFIX};

pub struct VariablesPlugin;

impl VariablesPlugin {
    /// Reject malformed declarations before asking the host to review
    /// them: bad names and unparseable scalar expressions self-block.
    fn check(variables: &[Variable]) -> Option<String> {
        for var in variables {
            let id = var.variable_id.as_str();
            if RESERVED_NAMES.contains(&id) {
                return Some(format!("`{id}` is a reserved name"));
            }
            if let Some(Calculation::Scalar { expression }) = &var.calculation {
                if let Err(err) = expr::parse(expression) {
                    return Some(format!("variable `{id}`: {err}"));
                }
            }
        }
        None
    }
}

impl Plugin for VariablesPlugin {
    fn name(&self) -> &'static str {
        "variables"
    }

    fn fence(&self, content: &str, index: usize) -> Result<Placeholder, PluginError> {
        let payload: serde_json::Value =
            serde_json::from_str(content).map_err(|e| PluginError::InvalidSpec(e.to_string()))?;
        // Decode eagerly so shape errors surface at parse time.
        let _: Vec<Variable> = serde_json::from_value(payload.clone())
            .map_err(|e| PluginError::InvalidSpec(format!("not a variables array: {e}")))?;
        Ok(Placeholder::new("variables", index, payload).with_class("vellum-hidden"))
    }

    fn hydrate_specs(&self, placeholders: &[Placeholder]) -> Vec<SpecReview> {
        placeholders
            .iter()
            .map(|p| {
                let variables: Vec<Variable> =
                    serde_json::from_value(p.payload.clone()).unwrap_or_default();
                match Self::check(&variables) {
                    Some(reason) => SpecReview::blocked(
                        p.plugin_name.clone(),
                        p.container_id.clone(),
                        p.payload.clone(),
                        reason,
                    ),
                    None => SpecReview::approved(
                        p.plugin_name.clone(),
                        p.container_id.clone(),
                        p.payload.clone(),
                    ),
                }
            })
            .collect()
    }

    fn hydrate_component(
        &self,
        _review: &SpecReview,
        _ctx: &mut HydrateCtx,
    ) -> Result<Vec<Box<dyn Instance>>, PluginError> {
        // Declarations hydrate into the brain, not into an instance.
        Ok(Vec::new())
    }
}

pub struct DataPlugin;

impl DataPlugin {
    fn check(loader: &DataLoader) -> Option<String> {
        let name = loader.data_source_name().as_str();
        if name.ends_with(SELECTED_SUFFIX) {
            return Some(format!(
                "data source name must not end with the reserved `{SELECTED_SUFFIX}` suffix"
            ));
        }
        if RESERVED_NAMES.contains(&name) {
            return Some(format!("`{name}` is a reserved name"));
        }
        None
    }
}

impl Plugin for DataPlugin {
    fn name(&self) -> &'static str {
        "data"
    }

    fn fence(&self, content: &str, index: usize) -> Result<Placeholder, PluginError> {
        let payload: serde_json::Value =
            serde_json::from_str(content).map_err(|e| PluginError::InvalidSpec(e.to_string()))?;
        let _: DataLoader = serde_json::from_value(payload.clone())
            .map_err(|e| PluginError::InvalidSpec(format!("not a data loader: {e}")))?;
        Ok(Placeholder::new("data", index, payload).with_class("vellum-hidden"))
    }

    fn hydrate_specs(&self, placeholders: &[Placeholder]) -> Vec<SpecReview> {
        placeholders
            .iter()
            .map(|p| {
                let loader: Result<DataLoader, _> = serde_json::from_value(p.payload.clone());
                let reason = match &loader {
                    Ok(loader) => Self::check(loader),
                    Err(e) => Some(e.to_string()),
                };
                match reason {
                    Some(reason) => SpecReview::blocked(
                        p.plugin_name.clone(),
                        p.container_id.clone(),
                        p.payload.clone(),
                        reason,
                    ),
                    None => SpecReview::approved(
                        p.plugin_name.clone(),
                        p.container_id.clone(),
                        p.payload.clone(),
                    ),
                }
            })
            .collect()
    }

    fn hydrate_component(
        &self,
        _review: &SpecReview,
        _ctx: &mut HydrateCtx,
    ) -> Result<Vec<Box<dyn Instance>>, PluginError> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_expression_self_blocks() {
        let plugin = VariablesPlugin;
        let placeholder = plugin
            .fence(
                r#"[{"variableId": "bad", "type": "number", "initialValue": 0,
                     "calculation": {"expression": "1 +"}}]"#,
                0,
            )
            .unwrap();
        let reviews = plugin.hydrate_specs(&[placeholder]);
        assert!(!reviews[0].is_approved());
        assert!(reviews[0].reason.as_ref().unwrap().contains("bad"));
    }

    #[test]
    fn selected_suffix_loader_self_blocks() {
        let plugin = DataPlugin;
        let placeholder = plugin
            .fence(
                r#"{"type": "inline", "dataSourceName": "rows_selected", "content": []}"#,
                0,
            )
            .unwrap();
        let reviews = plugin.hydrate_specs(&[placeholder]);
        assert!(!reviews[0].is_approved());
        assert!(reviews[0].reason.as_ref().unwrap().contains("_selected"));
    }

    #[test]
    fn healthy_metadata_is_proposed_for_approval() {
        let plugin = VariablesPlugin;
        let placeholder = plugin
            .fence(r#"[{"variableId": "x", "type": "number", "initialValue": 5}]"#, 0)
            .unwrap();
        let reviews = plugin.hydrate_specs(&[placeholder]);
        assert!(reviews[0].is_approved());
    }
}
