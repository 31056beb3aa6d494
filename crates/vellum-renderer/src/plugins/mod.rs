//! Built-in plugins.
//!
//! Each module owns one content kind: input controls, charts, tabular
//! views, preset batches, images, state inspectors, and the document
//! metadata fences (variable declarations and data loaders).

pub mod chart;
pub mod image;
pub mod inputs;
pub mod inspect;
pub mod meta;
pub mod presets;
pub mod table;

use crate::registry::{PluginRegistry, RegistryError};

/// Initial-signal priorities. Higher wins when two instances
/// initialize the same variable; document variable declarations beat
/// controls, controls beat charts.
pub mod priority {
    pub const CHART: i32 = 0;
    pub const CONTROL: i32 = 1;
    pub const TABLE: i32 = 1;
    pub const VARIABLES: i32 = 5;
}

/// The full built-in plugin set, in registration order.
pub fn standard_registry() -> Result<PluginRegistry, RegistryError> {
    PluginRegistry::builder()
        .register(Box::new(meta::VariablesPlugin))
        .register(Box::new(meta::DataPlugin))
        .register(Box::new(inputs::SliderPlugin))
        .register(Box::new(inputs::CheckboxPlugin))
        .register(Box::new(inputs::TextboxPlugin))
        .register(Box::new(inputs::NumberPlugin))
        .register(Box::new(inputs::DatePlugin))
        .register(Box::new(inputs::DropdownPlugin))
        .register(Box::new(chart::VegaLitePlugin))
        .register(Box::new(chart::VegaPlugin))
        .register(Box::new(table::TabulatorPlugin))
        .register(Box::new(presets::PresetsPlugin))
        .register(Box::new(image::ImagePlugin))
        .register(Box::new(inspect::InspectorPlugin))
        .build()
}

/// Decode a fence body as JSON, defaulting a missing `type` tag to the
/// plugin name so hand-authored fences can omit it.
pub(crate) fn decode_element_json(
    plugin: &str,
    content: &str,
) -> Result<serde_json::Value, crate::plugin::PluginError> {
    let mut value: serde_json::Value = serde_json::from_str(content)
        .map_err(|e| crate::plugin::PluginError::InvalidSpec(e.to_string()))?;
    if let serde_json::Value::Object(map) = &mut value {
        map.entry("type")
            .or_insert_with(|| serde_json::Value::String(plugin.to_string()));
    }
    Ok(value)
}
