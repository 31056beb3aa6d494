//! Preset batch plugin.
//!
//! A presets block renders a set of named buttons; activating one
//! broadcasts its whole state as a single batch. Activation arrives
//! from the host-page event glue through the renderer's broadcast
//! entry point; the instance holds the batches so that glue can look
//! them up by name.

use crate::placeholder::Placeholder;
use crate::plugin::{HydrateCtx, Instance, Plugin, PluginError};
use crate::plugins::decode_element_json;
use crate::signals::{Batch, SignalValue};
use vellum_api::{InteractiveElement, Preset, SpecReview};

use smol_str::SmolStr;

pub struct PresetsInstance {
    container_id: SmolStr,
    presets: Vec<Preset>,
}

impl PresetsInstance {
    /// The batch a named preset broadcasts, if the name exists.
    pub fn batch_for(&self, name: &str) -> Option<Batch> {
        let preset = self.presets.iter().find(|p| p.name == name)?;
        let mut batch = Batch::new();
        for (variable_id, value) in &preset.state {
            batch.insert(variable_id.clone(), SignalValue::scalar(value.clone()));
        }
        Some(batch)
    }

    pub fn preset_names(&self) -> impl Iterator<Item = &str> {
        self.presets.iter().map(|p| p.name.as_str())
    }
}

impl Instance for PresetsInstance {
    fn id(&self) -> &str {
        &self.container_id
    }
}

pub struct PresetsPlugin;

impl Plugin for PresetsPlugin {
    fn name(&self) -> &'static str {
        "presets"
    }

    fn fence(&self, content: &str, index: usize) -> Result<Placeholder, PluginError> {
        let payload = decode_element_json("presets", content)?;
        Ok(Placeholder::new("presets", index, payload))
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
            .map_err(|e| PluginError::Hydration(format!("presets spec mismatch: {e}")))?;
        match element {
            InteractiveElement::Presets { presets } => Ok(vec![Box::new(PresetsInstance {
                container_id: review.container_id.clone(),
                presets,
            })]),
            other => Err(PluginError::Hydration(format!(
                "expected a presets element, found {other:?}"
            ))),
        }
    }
}
