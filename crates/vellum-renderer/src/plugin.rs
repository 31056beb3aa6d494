//! The plugin contract.
//!
//! A plugin converts one kind of fenced content block into a
//! placeholder plus an extracted spec, validates specs before the
//! approval round-trip, and hydrates approved specs into live,
//! signal-connected instances.

use crate::placeholder::Placeholder;
use crate::signals::{Batch, InitialSignal, SignalValue};
use serde_json::Value;
use smol_str::SmolStr;
use vellum_api::SpecReview;

#[derive(Debug, Clone, thiserror::Error, miette::Diagnostic)]
pub enum PluginError {
    #[error("invalid spec: {0}")]
    #[diagnostic(code(vellum::plugin::spec))]
    InvalidSpec(String),
    #[error("hydration failed: {0}")]
    #[diagnostic(code(vellum::plugin::hydrate))]
    Hydration(String),
}

/// Phase during which an error was caught, for attribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Parse,
    HydrateSpecs,
    Hydrate,
}

/// An error attributed to one spec. Reported through the document
/// error handler; never aborts sibling specs.
#[derive(Debug, Clone)]
pub struct RenderIssue {
    pub plugin_name: SmolStr,
    pub index: usize,
    pub phase: Phase,
    pub container_id: Option<SmolStr>,
    pub message: String,
}

/// Collects per-spec errors for the document-level handler.
#[derive(Debug, Default)]
pub struct ErrorSink {
    issues: Vec<RenderIssue>,
}

impl ErrorSink {
    pub fn report(&mut self, issue: RenderIssue) {
        tracing::warn!(
            plugin = %issue.plugin_name,
            index = issue.index,
            phase = ?issue.phase,
            "{}",
            issue.message
        );
        self.issues.push(issue);
    }

    pub fn issues(&self) -> &[RenderIssue] {
        &self.issues
    }

    pub fn clear(&mut self) {
        self.issues.clear();
    }
}

/// A chart spec produced by one plugin for consumption by another
/// (vega-lite compiles into vega's input).
#[derive(Debug, Clone)]
pub struct CompiledSpec {
    pub container_id: SmolStr,
    pub index: usize,
    pub spec: Value,
}

/// Shared scratch state threaded through hydration, in plugin
/// hydration order.
#[derive(Debug, Default)]
pub struct HydrateCtx {
    /// Specs handed from an earlier plugin to a later one.
    pub compiled: Vec<CompiledSpec>,
}

/// A live component bound to one hydrated spec.
///
/// Owned exclusively by the renderer; destroyed in reverse hydration
/// order when the document is replaced.
pub trait Instance {
    fn id(&self) -> &str;

    /// Values this instance contributes to the bus at hydration time.
    fn initial_signals(&self) -> Vec<InitialSignal> {
        Vec::new()
    }

    /// Called once after initial signals are resolved, before the
    /// first delivery.
    fn begin_listening(&mut self) {}

    /// Receive one batched update. May emit further updates, which are
    /// queued FIFO rather than delivered re-entrantly.
    fn receive_batch(&mut self, batch: &Batch, emit: &mut dyn FnMut(SmolStr, SignalValue)) {
        let _ = (batch, emit);
    }

    /// Current value of the signal this instance displays or edits.
    fn current_signal_value(&self) -> Option<SignalValue> {
        None
    }

    fn destroy(&mut self) {}
}

/// A self-describing content handler.
pub trait Plugin {
    fn name(&self) -> &'static str;

    /// Declares that this plugin must hydrate before the named plugin
    /// (its output placeholders are consumed by that plugin).
    fn hydrates_before(&self) -> Option<&'static str> {
        None
    }

    /// Convert a fenced block's raw content into a placeholder with an
    /// inert payload. Runs during parsing.
    fn fence(&self, content: &str, index: usize) -> Result<Placeholder, PluginError>;

    /// Re-examine placeholders into review entries before the approval
    /// round-trip. Plugins with validation self-block here; the default
    /// proposes every payload for approval.
    fn hydrate_specs(&self, placeholders: &[Placeholder]) -> Vec<SpecReview> {
        placeholders
            .iter()
            .map(|p| SpecReview::approved(p.plugin_name.clone(), p.container_id.clone(), p.payload.clone()))
            .collect()
    }

    /// Turn one approved spec into live instances.
    fn hydrate_component(
        &self,
        review: &SpecReview,
        ctx: &mut HydrateCtx,
    ) -> Result<Vec<Box<dyn Instance>>, PluginError>;

    /// Runs after all of this plugin's reviews, so a consumer plugin
    /// can pick up specs produced by earlier plugins this render.
    fn finish_hydration(&self, ctx: &mut HydrateCtx) -> Vec<Box<dyn Instance>> {
        let _ = ctx;
        Vec::new()
    }
}
