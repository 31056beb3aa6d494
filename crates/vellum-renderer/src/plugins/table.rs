//! Tabular view plugin.
//!
//! A tabulator binds a data source signal and publishes the companion
//! `<name>_selected` signal carrying the current selection.

use crate::placeholder::Placeholder;
use crate::plugin::{HydrateCtx, Instance, Plugin, PluginError};
use crate::plugins::{decode_element_json, priority};
use crate::signals::{Batch, InitialSignal, SignalValue};
use serde_json::{json, Value};
use smol_str::SmolStr;
use vellum_api::{InteractiveElement, SpecReview, SELECTED_SUFFIX};

pub struct TabulatorInstance {
    container_id: SmolStr,
    data_source_name: SmolStr,
    selected_id: SmolStr,
    rows: Value,
    selection: Value,
}

impl TabulatorInstance {
    fn new(container_id: SmolStr, data_source_name: SmolStr) -> Self {
        let selected_id = SmolStr::new(format!("{data_source_name}{SELECTED_SUFFIX}"));
        Self {
            container_id,
            data_source_name,
            selected_id,
            rows: json!([]),
            selection: json!([]),
        }
    }
}

impl Instance for TabulatorInstance {
    fn id(&self) -> &str {
        &self.container_id
    }

    fn initial_signals(&self) -> Vec<InitialSignal> {
        vec![InitialSignal {
            variable_id: self.selected_id.clone(),
            value: json!([]),
            is_data: true,
            priority: priority::TABLE,
        }]
    }

    fn receive_batch(&mut self, batch: &Batch, emit: &mut dyn FnMut(SmolStr, SignalValue)) {
        if let Some(update) = batch.get(&self.data_source_name) {
            self.rows = update.value.clone();
            // New data invalidates the current selection.
            if self.selection.as_array().is_some_and(|s| !s.is_empty()) {
                self.selection = json!([]);
                emit(self.selected_id.clone(), SignalValue::data(json!([])));
            }
        }
        if let Some(update) = batch.get(&self.selected_id) {
            self.selection = update.value.clone();
        }
    }

    fn current_signal_value(&self) -> Option<SignalValue> {
        Some(SignalValue::data(self.selection.clone()))
    }
}

pub struct TabulatorPlugin;

impl Plugin for TabulatorPlugin {
    fn name(&self) -> &'static str {
        "tabulator"
    }

    fn fence(&self, content: &str, index: usize) -> Result<Placeholder, PluginError> {
        let payload = decode_element_json("tabulator", content)?;
        Ok(Placeholder::new("tabulator", index, payload))
    }

    fn hydrate_component(
        &self,
        review: &SpecReview,
        _ctx: &mut HydrateCtx,
    ) -> Result<Vec<Box<dyn Instance>>, PluginError> {
        let spec = review
            .approved_spec
            .clone()
            .ok_or_else(|| PluginError::Hydration("spec not approved".into()))?;
        let element: InteractiveElement = serde_json::from_value(spec)
            .map_err(|e| PluginError::Hydration(format!("tabulator spec mismatch: {e}")))?;
        match element {
            InteractiveElement::Tabulator {
                data_source_name, ..
            } => Ok(vec![Box::new(TabulatorInstance::new(
                review.container_id.clone(),
                data_source_name,
            ))]),
            other => Err(PluginError::Hydration(format!(
                "expected a tabulator element, found {other:?}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_data_resets_selection_via_emit() {
        let mut table = TabulatorInstance::new("tabulator-0".into(), "sales".into());
        table.selection = json!([{"amount": 1}]);

        let mut emitted = Vec::new();
        let mut batch = Batch::new();
        batch.insert("sales".into(), SignalValue::data(json!([{"amount": 2}])));
        table.receive_batch(&batch, &mut |id, value| emitted.push((id, value)));

        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].0, "sales_selected");
        assert_eq!(table.current_signal_value().unwrap().value, json!([]));
    }
}
