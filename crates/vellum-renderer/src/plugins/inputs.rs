//! Input control plugins: slider, checkbox, textbox, number, date,
//! dropdown.
//!
//! Every control binds one variable. Hydration produces a
//! [`ControlInstance`] that contributes the control's initial value at
//! control priority, caches the latest value it hears on the bus, and
//! reports it through `current_signal_value`. The DOM event wiring
//! that turns user gestures into broadcasts is host-page glue and
//! lives outside this crate.

use crate::placeholder::Placeholder;
use crate::plugin::{HydrateCtx, Instance, Plugin, PluginError};
use crate::plugins::{decode_element_json, priority};
use crate::signals::{Batch, InitialSignal, SignalValue};
use serde_json::{json, Value};
use smol_str::SmolStr;
use vellum_api::{InteractiveElement, SpecReview};

/// Live state for any single-variable control.
pub struct ControlInstance {
    container_id: SmolStr,
    variable_id: SmolStr,
    value: Value,
}

impl ControlInstance {
    fn new(container_id: SmolStr, variable_id: SmolStr, value: Value) -> Self {
        Self {
            container_id,
            variable_id,
            value,
        }
    }
}

impl Instance for ControlInstance {
    fn id(&self) -> &str {
        &self.container_id
    }

    fn initial_signals(&self) -> Vec<InitialSignal> {
        vec![InitialSignal {
            variable_id: self.variable_id.clone(),
            value: self.value.clone(),
            is_data: false,
            priority: priority::CONTROL,
        }]
    }

    fn receive_batch(&mut self, batch: &Batch, _emit: &mut dyn FnMut(SmolStr, SignalValue)) {
        if let Some(update) = batch.get(&self.variable_id) {
            self.value = update.value.clone();
        }
    }

    fn current_signal_value(&self) -> Option<SignalValue> {
        Some(SignalValue::scalar(self.value.clone()))
    }
}

fn decode_control(plugin: &str, review: &SpecReview) -> Result<InteractiveElement, PluginError> {
    let spec = review
        .approved_spec
        .clone()
        .ok_or_else(|| PluginError::Hydration("spec not approved".into()))?;
    serde_json::from_value(spec).map_err(|e| {
        PluginError::Hydration(format!("{plugin} spec does not match its schema: {e}"))
    })
}

macro_rules! control_plugin {
    ($name:ident, $tag:literal, $variant:ident, $default:expr) => {
        pub struct $name;

        impl Plugin for $name {
            fn name(&self) -> &'static str {
                $tag
            }

            fn fence(&self, content: &str, index: usize) -> Result<Placeholder, PluginError> {
                let payload = decode_element_json($tag, content)?;
                Ok(Placeholder::new($tag, index, payload))
            }

            fn hydrate_component(
                &self,
                review: &SpecReview,
                _ctx: &mut HydrateCtx,
            ) -> Result<Vec<Box<dyn Instance>>, PluginError> {
                match decode_control($tag, review)? {
                    InteractiveElement::$variant { variable_id, .. } => {
                        Ok(vec![Box::new(ControlInstance::new(
                            review.container_id.clone(),
                            variable_id,
                            $default,
                        ))])
                    }
                    other => Err(PluginError::Hydration(format!(
                        "expected a {} element, found {other:?}",
                        $tag
                    ))),
                }
            }
        }
    };
}

control_plugin!(CheckboxPlugin, "checkbox", Checkbox, json!(false));
control_plugin!(TextboxPlugin, "textbox", Textbox, json!(""));
control_plugin!(NumberPlugin, "number", Number, json!(0));
control_plugin!(DatePlugin, "date", Date, json!(""));

pub struct SliderPlugin;

impl Plugin for SliderPlugin {
    fn name(&self) -> &'static str {
        "slider"
    }

    fn fence(&self, content: &str, index: usize) -> Result<Placeholder, PluginError> {
        let payload = decode_element_json("slider", content)?;
        Ok(Placeholder::new("slider", index, payload))
    }

    fn hydrate_component(
        &self,
        review: &SpecReview,
        _ctx: &mut HydrateCtx,
    ) -> Result<Vec<Box<dyn Instance>>, PluginError> {
        match decode_control("slider", review)? {
            InteractiveElement::Slider {
                variable_id,
                min,
                value,
                ..
            } => {
                let initial = json!(value.unwrap_or(min));
                Ok(vec![Box::new(ControlInstance::new(
                    review.container_id.clone(),
                    variable_id,
                    initial,
                ))])
            }
            other => Err(PluginError::Hydration(format!(
                "expected a slider element, found {other:?}"
            ))),
        }
    }
}

pub struct DropdownPlugin;

impl Plugin for DropdownPlugin {
    fn name(&self) -> &'static str {
        "dropdown"
    }

    fn fence(&self, content: &str, index: usize) -> Result<Placeholder, PluginError> {
        let payload = decode_element_json("dropdown", content)?;
        Ok(Placeholder::new("dropdown", index, payload))
    }

    /// Dropdowns self-validate before the approval round-trip: a spec
    /// declaring both static and dynamic options is rejected here, so
    /// it never reaches hydration.
    fn hydrate_specs(&self, placeholders: &[Placeholder]) -> Vec<SpecReview> {
        placeholders
            .iter()
            .map(|p| {
                let has_static = p
                    .payload
                    .get("options")
                    .is_some_and(|v| !v.is_null());
                let has_dynamic = p
                    .payload
                    .get("dynamicOptions")
                    .is_some_and(|v| !v.is_null());
                if has_static && has_dynamic {
                    SpecReview::blocked(
                        p.plugin_name.clone(),
                        p.container_id.clone(),
                        p.payload.clone(),
                        "Dropdown cannot have both static and dynamic options",
                    )
                } else {
                    SpecReview::approved(
                        p.plugin_name.clone(),
                        p.container_id.clone(),
                        p.payload.clone(),
                    )
                }
            })
            .collect()
    }

    fn hydrate_component(
        &self,
        review: &SpecReview,
        _ctx: &mut HydrateCtx,
    ) -> Result<Vec<Box<dyn Instance>>, PluginError> {
        match decode_control("dropdown", review)? {
            InteractiveElement::Dropdown {
                variable_id,
                options,
                ..
            } => {
                let initial = options
                    .as_ref()
                    .and_then(|opts| opts.first())
                    .map(|first| json!(first))
                    .unwrap_or(Value::Null);
                Ok(vec![Box::new(ControlInstance::new(
                    review.container_id.clone(),
                    variable_id,
                    initial,
                ))])
            }
            other => Err(PluginError::Hydration(format!(
                "expected a dropdown element, found {other:?}"
            ))),
        }
    }
}
