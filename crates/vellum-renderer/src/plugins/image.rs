//! Image plugin: a display element whose URL may be bound to a
//! variable.

use crate::placeholder::Placeholder;
use crate::plugin::{HydrateCtx, Instance, Plugin, PluginError};
use crate::plugins::decode_element_json;
use crate::sanitize;
use crate::signals::{Batch, SignalValue};
use serde_json::Value;
use smol_str::SmolStr;
use vellum_api::{InteractiveElement, SpecReview};

pub struct ImageInstance {
    container_id: SmolStr,
    variable_id: Option<SmolStr>,
    url: Option<String>,
}

impl Instance for ImageInstance {
    fn id(&self) -> &str {
        &self.container_id
    }

    fn receive_batch(&mut self, batch: &Batch, _emit: &mut dyn FnMut(SmolStr, SignalValue)) {
        let Some(variable_id) = &self.variable_id else {
            return;
        };
        if let Some(update) = batch.get(variable_id) {
            self.url = update.value.as_str().map(sanitize::escape_url);
        }
    }

    fn current_signal_value(&self) -> Option<SignalValue> {
        self.url
            .as_ref()
            .map(|url| SignalValue::scalar(Value::String(url.clone())))
    }
}

pub struct ImagePlugin;

impl Plugin for ImagePlugin {
    fn name(&self) -> &'static str {
        "image"
    }

    fn fence(&self, content: &str, index: usize) -> Result<Placeholder, PluginError> {
        let payload = decode_element_json("image", content)?;
        Ok(Placeholder::new("image", index, payload))
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
            .map_err(|e| PluginError::Hydration(format!("image spec mismatch: {e}")))?;
        match element {
            InteractiveElement::Image {
                url, variable_id, ..
            } => Ok(vec![Box::new(ImageInstance {
                container_id: review.container_id.clone(),
                variable_id,
                url: url.map(|u| sanitize::escape_url(&u)),
            })]),
            other => Err(PluginError::Hydration(format!(
                "expected an image element, found {other:?}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bound_image_follows_its_variable() {
        let mut image = ImageInstance {
            container_id: "image-0".into(),
            variable_id: Some("photo_url".into()),
            url: None,
        };
        let mut batch = Batch::new();
        batch.insert(
            "photo_url".into(),
            SignalValue::scalar(json!("https://example.com/a.png")),
        );
        image.receive_batch(&batch, &mut |_, _| {});
        assert_eq!(
            image.current_signal_value().unwrap().value,
            json!("https://example.com/a.png")
        );
    }
}
