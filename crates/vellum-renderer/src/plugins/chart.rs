//! Chart plugins.
//!
//! `vega-lite` hydrates before `vega`: its hydration step lowers the
//! spec into vega's input form and hands it over through the shared
//! hydration context, so the vega plugin picks it up in the same
//! render pass. The actual chart math belongs to the charting runtime
//! on the page; here a chart is a signal consumer bound to the spec's
//! declared signals.

use crate::placeholder::Placeholder;
use crate::plugin::{CompiledSpec, HydrateCtx, Instance, Plugin, PluginError};
use crate::plugins::priority;
use crate::signals::{Batch, InitialSignal, SignalValue};
use serde_json::{json, Map, Value};
use smol_str::SmolStr;
use std::collections::BTreeMap;
use vellum_api::SpecReview;

const VEGA_SCHEMA: &str = "https://vega.github.io/schema/vega/v6.json";

/// A hydrated chart: holds the spec and mirrors the signal values the
/// spec declares.
pub struct ChartInstance {
    container_id: SmolStr,
    signals: BTreeMap<SmolStr, Value>,
    #[allow(dead_code)]
    spec: Value,
}

impl ChartInstance {
    fn new(container_id: SmolStr, spec: Value) -> Self {
        let mut signals = BTreeMap::new();
        if let Some(Value::Array(declared)) = spec.get("signals").cloned() {
            for signal in declared {
                let Some(name) = signal.get("name").and_then(Value::as_str) else {
                    continue;
                };
                let value = signal.get("value").cloned().unwrap_or(Value::Null);
                signals.insert(SmolStr::new(name), value);
            }
        }
        Self {
            container_id,
            signals,
            spec,
        }
    }
}

impl Instance for ChartInstance {
    fn id(&self) -> &str {
        &self.container_id
    }

    fn initial_signals(&self) -> Vec<InitialSignal> {
        self.signals
            .iter()
            .map(|(name, value)| InitialSignal {
                variable_id: name.clone(),
                value: value.clone(),
                is_data: false,
                priority: priority::CHART,
            })
            .collect()
    }

    fn receive_batch(&mut self, batch: &Batch, _emit: &mut dyn FnMut(SmolStr, SignalValue)) {
        for (id, update) in batch {
            if self.signals.contains_key(id) {
                self.signals.insert(id.clone(), update.value.clone());
            }
        }
    }
}

fn parse_spec(plugin: &str, content: &str) -> Result<Value, PluginError> {
    let spec: Value =
        serde_json::from_str(content).map_err(|e| PluginError::InvalidSpec(e.to_string()))?;
    if !spec.is_object() {
        return Err(PluginError::InvalidSpec(format!(
            "{plugin} spec must be a JSON object"
        )));
    }
    Ok(spec)
}

pub struct VegaPlugin;

impl Plugin for VegaPlugin {
    fn name(&self) -> &'static str {
        "vega"
    }

    fn fence(&self, content: &str, index: usize) -> Result<Placeholder, PluginError> {
        let payload = parse_spec("vega", content)?;
        Ok(Placeholder::new("vega", index, payload).with_class("vellum-chart"))
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
        Ok(vec![Box::new(ChartInstance::new(
            review.container_id.clone(),
            spec,
        ))])
    }

    /// Pick up specs lowered by the vega-lite plugin earlier in this
    /// hydration pass.
    fn finish_hydration(&self, ctx: &mut HydrateCtx) -> Vec<Box<dyn Instance>> {
        let mut handed_off = std::mem::take(&mut ctx.compiled);
        handed_off.sort_by_key(|c| c.index);
        handed_off
            .into_iter()
            .map(|compiled| {
                Box::new(ChartInstance::new(compiled.container_id, compiled.spec))
                    as Box<dyn Instance>
            })
            .collect()
    }
}

pub struct VegaLitePlugin;

impl VegaLitePlugin {
    /// Lower a vega-lite spec to the vega input shape. Only the signal
    /// plumbing matters at this layer: `params` become `signals`, data
    /// carries over, and the schema is rewritten. Full compilation is
    /// the charting runtime's job.
    fn lower(spec: &Value) -> Value {
        let mut out = Map::new();
        out.insert("$schema".to_string(), json!(VEGA_SCHEMA));
        if let Some(data) = spec.get("data") {
            out.insert("data".to_string(), data.clone());
        }
        let signals: Vec<Value> = spec
            .get("params")
            .and_then(Value::as_array)
            .map(|params| {
                params
                    .iter()
                    .filter_map(|param| {
                        let name = param.get("name")?;
                        Some(json!({
                            "name": name,
                            "value": param.get("value").cloned().unwrap_or(Value::Null)
                        }))
                    })
                    .collect()
            })
            .unwrap_or_default();
        if !signals.is_empty() {
            out.insert("signals".to_string(), Value::Array(signals));
        }
        out.insert("_source".to_string(), spec.clone());
        Value::Object(out)
    }
}

impl Plugin for VegaLitePlugin {
    fn name(&self) -> &'static str {
        "vega-lite"
    }

    fn hydrates_before(&self) -> Option<&'static str> {
        Some("vega")
    }

    fn fence(&self, content: &str, index: usize) -> Result<Placeholder, PluginError> {
        let payload = parse_spec("vega-lite", content)?;
        Ok(Placeholder::new("vega-lite", index, payload).with_class("vellum-chart"))
    }

    fn hydrate_component(
        &self,
        review: &SpecReview,
        ctx: &mut HydrateCtx,
    ) -> Result<Vec<Box<dyn Instance>>, PluginError> {
        let spec = review
            .approved_spec
            .clone()
            .ok_or_else(|| PluginError::Hydration("spec not approved".into()))?;
        ctx.compiled.push(CompiledSpec {
            container_id: review.container_id.clone(),
            index: ctx.compiled.len(),
            spec: Self::lower(&spec),
        });
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vega_lite_lowers_params_to_signals() {
        let spec = json!({
            "$schema": "https://vega.github.io/schema/vega-lite/v5.json",
            "params": [{"name": "threshold", "value": 10}],
            "mark": "bar"
        });
        let lowered = VegaLitePlugin::lower(&spec);
        assert_eq!(lowered["$schema"], json!(VEGA_SCHEMA));
        assert_eq!(lowered["signals"][0]["name"], json!("threshold"));
        assert_eq!(lowered["signals"][0]["value"], json!(10));
    }

    #[test]
    fn chart_mirrors_declared_signals() {
        let spec = json!({"signals": [{"name": "threshold", "value": 1}]});
        let mut chart = ChartInstance::new("vega-0".into(), spec);
        assert_eq!(chart.initial_signals().len(), 1);

        let mut batch = Batch::new();
        batch.insert("threshold".into(), SignalValue::scalar(json!(42)));
        batch.insert("unrelated".into(), SignalValue::scalar(json!(0)));
        chart.receive_batch(&batch, &mut |_, _| {});
        assert_eq!(chart.signals["threshold"], json!(42));
        assert!(!chart.signals.contains_key("unrelated"));
    }

    #[test]
    fn lite_hydration_hands_off_to_vega() {
        let lite = VegaLitePlugin;
        let review = SpecReview::approved(
            "vega-lite",
            "vega-lite-0",
            json!({"params": [{"name": "p", "value": 1}]}),
        );
        let mut ctx = HydrateCtx::default();
        let own = lite.hydrate_component(&review, &mut ctx).unwrap();
        assert!(own.is_empty());
        assert_eq!(ctx.compiled.len(), 1);

        let vega = VegaPlugin;
        let instances = vega.finish_hydration(&mut ctx);
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].id(), "vega-lite-0");
        assert!(ctx.compiled.is_empty());
    }
}
