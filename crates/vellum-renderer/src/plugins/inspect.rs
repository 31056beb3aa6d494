//! Inspector plugin: a read-only view of live signal state.
//!
//! Bound to a variable or data source it mirrors that one signal;
//! unbound it mirrors every delivery, which is what document authors
//! use while debugging wiring.

use crate::placeholder::Placeholder;
use crate::plugin::{HydrateCtx, Instance, Plugin, PluginError};
use crate::plugins::decode_element_json;
use crate::signals::{Batch, SignalValue};
use serde_json::Value;
use smol_str::SmolStr;
use std::collections::BTreeMap;
use vellum_api::{InteractiveElement, SpecReview};

pub struct InspectorInstance {
    container_id: SmolStr,
    /// When set, only this signal is tracked.
    watched: Option<SmolStr>,
    values: BTreeMap<SmolStr, Value>,
}

impl Instance for InspectorInstance {
    fn id(&self) -> &str {
        &self.container_id
    }

    fn receive_batch(&mut self, batch: &Batch, _emit: &mut dyn FnMut(SmolStr, SignalValue)) {
        for (id, update) in batch {
            let tracked = self.watched.as_ref().map_or(true, |watched| watched == id);
            if tracked {
                self.values.insert(id.clone(), update.value.clone());
            }
        }
    }

    fn current_signal_value(&self) -> Option<SignalValue> {
        match &self.watched {
            Some(watched) => self.values.get(watched).cloned().map(SignalValue::scalar),
            None => Some(SignalValue::scalar(
                serde_json::to_value(&self.values).unwrap_or(Value::Null),
            )),
        }
    }
}

pub struct InspectorPlugin;

impl Plugin for InspectorPlugin {
    fn name(&self) -> &'static str {
        "inspector"
    }

    fn fence(&self, content: &str, index: usize) -> Result<Placeholder, PluginError> {
        let payload = decode_element_json("inspector", content)?;
        Ok(Placeholder::new("inspector", index, payload))
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
            .map_err(|e| PluginError::Hydration(format!("inspector spec mismatch: {e}")))?;
        match element {
            InteractiveElement::Inspector {
                data_source_name,
                variable_id,
            } => Ok(vec![Box::new(InspectorInstance {
                container_id: review.container_id.clone(),
                watched: variable_id.or(data_source_name),
                values: BTreeMap::new(),
            })]),
            other => Err(PluginError::Hydration(format!(
                "expected an inspector element, found {other:?}"
            ))),
        }
    }
}
