//! Plugin registry with registration-time hydration ordering.
//!
//! The registry is an explicit object constructed at startup and
//! injected into the parser and renderer, so independent documents and
//! tests can run with different plugin sets. `hydrates_before`
//! declarations form a partial order; a cycle is a configuration error
//! raised here, never a render-time deadlock.

use crate::plugin::Plugin;
use smol_str::SmolStr;
use std::collections::HashMap;

#[derive(Debug, Clone, thiserror::Error, miette::Diagnostic)]
pub enum RegistryError {
    #[error("duplicate plugin name `{0}`")]
    #[diagnostic(code(vellum::registry::duplicate))]
    DuplicateName(SmolStr),
    #[error("plugin `{plugin}` declares hydratesBefore unknown plugin `{target}`")]
    #[diagnostic(code(vellum::registry::unknown_target))]
    UnknownTarget { plugin: SmolStr, target: SmolStr },
    #[error("cycle in hydratesBefore declarations involving `{0}`")]
    #[diagnostic(code(vellum::registry::cycle))]
    HydrationCycle(SmolStr),
}

pub struct PluginRegistry {
    plugins: Vec<Box<dyn Plugin>>,
    by_name: HashMap<SmolStr, usize>,
    /// Indices into `plugins`, topologically ordered by
    /// `hydrates_before`.
    hydration_order: Vec<usize>,
}

#[derive(Default)]
pub struct RegistryBuilder {
    plugins: Vec<Box<dyn Plugin>>,
}

impl RegistryBuilder {
    pub fn register(mut self, plugin: Box<dyn Plugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn build(self) -> Result<PluginRegistry, RegistryError> {
        let mut by_name = HashMap::new();
        for (index, plugin) in self.plugins.iter().enumerate() {
            if by_name.insert(SmolStr::new(plugin.name()), index).is_some() {
                return Err(RegistryError::DuplicateName(plugin.name().into()));
            }
        }

        // Kahn's algorithm over the hydrates_before edges.
        let count = self.plugins.len();
        let mut successors: Vec<Vec<usize>> = vec![Vec::new(); count];
        let mut in_degree = vec![0usize; count];
        for (index, plugin) in self.plugins.iter().enumerate() {
            if let Some(target) = plugin.hydrates_before() {
                let &target_index =
                    by_name
                        .get(target)
                        .ok_or_else(|| RegistryError::UnknownTarget {
                            plugin: plugin.name().into(),
                            target: target.into(),
                        })?;
                successors[index].push(target_index);
                in_degree[target_index] += 1;
            }
        }

        // Registration order is the tiebreak, so iterate indices in
        // order and take ready nodes front-to-back.
        let mut ready: Vec<usize> = (0..count).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(count);
        while let Some(index) = ready.first().copied() {
            ready.remove(0);
            order.push(index);
            for &next in &successors[index] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.push(next);
                    ready.sort_unstable();
                }
            }
        }
        if order.len() != count {
            let stuck = (0..count)
                .find(|&i| in_degree[i] > 0)
                .map(|i| SmolStr::new(self.plugins[i].name()))
                .unwrap_or_default();
            return Err(RegistryError::HydrationCycle(stuck));
        }

        Ok(PluginRegistry {
            plugins: self.plugins,
            by_name,
            hydration_order: order,
        })
    }
}

impl PluginRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn get(&self, name: &str) -> Option<&dyn Plugin> {
        self.by_name.get(name).map(|&i| self.plugins[i].as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Plugins in the order they must hydrate.
    pub fn in_hydration_order(&self) -> impl Iterator<Item = &dyn Plugin> {
        self.hydration_order
            .iter()
            .map(move |&i| self.plugins[i].as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::placeholder::Placeholder;
    use crate::plugin::{HydrateCtx, Instance, PluginError};
    use serde_json::Value;
    use vellum_api::SpecReview;

    struct Fake {
        name: &'static str,
        before: Option<&'static str>,
    }

    impl Plugin for Fake {
        fn name(&self) -> &'static str {
            self.name
        }
        fn hydrates_before(&self) -> Option<&'static str> {
            self.before
        }
        fn fence(&self, _content: &str, index: usize) -> Result<Placeholder, PluginError> {
            Ok(Placeholder::new(self.name, index, Value::Null))
        }
        fn hydrate_component(
            &self,
            _review: &SpecReview,
            _ctx: &mut HydrateCtx,
        ) -> Result<Vec<Box<dyn Instance>>, PluginError> {
            Ok(Vec::new())
        }
    }

    fn fake(name: &'static str, before: Option<&'static str>) -> Box<dyn Plugin> {
        Box::new(Fake { name, before })
    }

    #[test]
    fn hydration_order_respects_declarations() {
        let registry = PluginRegistry::builder()
            .register(fake("vega", None))
            .register(fake("slider", None))
            .register(fake("vega-lite", Some("vega")))
            .build()
            .unwrap();
        let order: Vec<&str> = registry.in_hydration_order().map(|p| p.name()).collect();
        let lite = order.iter().position(|n| *n == "vega-lite").unwrap();
        let vega = order.iter().position(|n| *n == "vega").unwrap();
        assert!(lite < vega);
    }

    #[test]
    fn cycle_is_a_registration_error() {
        let result = PluginRegistry::builder()
            .register(fake("a", Some("b")))
            .register(fake("b", Some("a")))
            .build();
        assert!(matches!(result, Err(RegistryError::HydrationCycle(_))));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let result = PluginRegistry::builder()
            .register(fake("a", None))
            .register(fake("a", None))
            .build();
        assert!(matches!(result, Err(RegistryError::DuplicateName(_))));
    }

    #[test]
    fn unknown_target_is_rejected() {
        let result = PluginRegistry::builder()
            .register(fake("a", Some("ghost")))
            .build();
        assert!(matches!(result, Err(RegistryError::UnknownTarget { .. })));
    }
}
