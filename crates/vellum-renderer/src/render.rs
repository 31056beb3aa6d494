//! The renderer / hydrator.
//!
//! One render transaction: parse content into blocks and placeholders,
//! collect candidate spec reviews, send them out for approval, and on
//! a matching reply hydrate the approved specs into live instances
//! wired to the signal bus. A new `render` call supersedes any
//! in-flight transaction; replies carrying a stale transaction id are
//! logged and discarded.

use crate::brain::{self, Brain};
use crate::parser::{self, ParsedDocument};
use crate::plugin::{ErrorSink, HydrateCtx, Instance, Phase, RenderIssue};
use crate::registry::PluginRegistry;
use crate::signals::{Batch, SignalBus, SignalValue};
use serde_json::Value;
use smol_str::SmolStr;
use std::collections::{BTreeSet, HashMap, VecDeque};
use vellum_api::{
    Calculation, DataFormat, DataLoader, SandboxInbound, SandboxOutbound, SandboxStatusKind,
    SpecReview, Transformation, Variable,
};

/// Renderer lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPhase {
    Init,
    Parsing,
    AwaitingApproval,
    Hydrating,
    Listening,
}

struct PendingTransaction {
    id: u64,
    reviews: Vec<SpecReview>,
}

struct PendingFetch {
    data_source_name: SmolStr,
    format: DataFormat,
    delimiter: Option<char>,
    transformations: Vec<Transformation>,
}

/// Origin ids used for broadcasts that come from the runtime itself
/// rather than an instance.
const ORIGIN_INIT: &str = "__init";
const ORIGIN_BRAIN: &str = "__brain";

pub struct Renderer {
    registry: PluginRegistry,
    phase: RenderPhase,
    next_transaction_id: u64,
    document: ParsedDocument,
    pending: Option<PendingTransaction>,
    instances: Vec<Box<dyn Instance>>,
    bus: SignalBus,
    brain: Brain,
    variables: Vec<Variable>,
    errors: ErrorSink,
    outbox: VecDeque<SandboxOutbound>,
    next_fetch_id: u64,
    pending_fetches: HashMap<u64, PendingFetch>,
}

impl Renderer {
    pub fn new(registry: PluginRegistry) -> Self {
        let mut outbox = VecDeque::new();
        outbox.push_back(SandboxOutbound::SandboxStatus {
            status: SandboxStatusKind::Ready,
            details: None,
        });
        Self {
            registry,
            phase: RenderPhase::Init,
            next_transaction_id: 0,
            document: ParsedDocument::default(),
            pending: None,
            instances: Vec::new(),
            bus: SignalBus::new(),
            brain: Brain::default(),
            variables: Vec::new(),
            errors: ErrorSink::default(),
            outbox,
            next_fetch_id: 0,
            pending_fetches: HashMap::new(),
        }
    }

    pub fn phase(&self) -> RenderPhase {
        self.phase
    }

    pub fn current_transaction(&self) -> Option<u64> {
        self.pending.as_ref().map(|p| p.id)
    }

    pub fn issues(&self) -> &[RenderIssue] {
        self.errors.issues()
    }

    pub fn instances(&self) -> &[Box<dyn Instance>] {
        &self.instances
    }

    pub fn signal_value(&self, id: &str) -> Option<&SignalValue> {
        self.bus.value_of(id)
    }

    /// Assembled HTML for the renderer's own subtree.
    pub fn html(&self) -> String {
        self.document.to_html()
    }

    pub fn drain_outbox(&mut self) -> Vec<SandboxOutbound> {
        self.outbox.drain(..).collect()
    }

    /// Single entry point for messages arriving from the host frame.
    pub fn handle_message(&mut self, message: SandboxInbound) {
        match message {
            SandboxInbound::SandboxRender { markdown } => {
                self.render(markdown.as_deref().unwrap_or(""));
            }
            SandboxInbound::SandboxApproval {
                transaction_id,
                specs,
            } => self.apply_approval(transaction_id, specs),
            SandboxInbound::GuardedFetchResponse {
                request_id,
                status,
                body,
                error,
            } => self.apply_fetch_response(request_id, status, body, error),
        }
    }

    /// Parse content and request approval for the extracted specs.
    /// Safe to call repeatedly; each call supersedes the previous
    /// transaction and tears down live instances first.
    #[tracing::instrument(skip(self, markdown))]
    pub fn render(&mut self, markdown: &str) {
        self.teardown();
        self.phase = RenderPhase::Parsing;
        self.document = parser::parse_markdown(markdown, &self.registry, &mut self.errors);

        let mut reviews = Vec::new();
        for plugin in self.registry.in_hydration_order() {
            let placeholders: Vec<_> = self
                .document
                .placeholders()
                .filter(|p| p.plugin_name == plugin.name())
                .cloned()
                .collect();
            if placeholders.is_empty() {
                continue;
            }
            reviews.extend(plugin.hydrate_specs(&placeholders));
        }

        self.next_transaction_id += 1;
        let id = self.next_transaction_id;
        self.pending = Some(PendingTransaction {
            id,
            reviews: reviews.clone(),
        });
        self.phase = RenderPhase::AwaitingApproval;
        self.outbox
            .push_back(SandboxOutbound::SandboxedPreHydrateMessage {
                transaction_id: id,
                specs: reviews,
            });
    }

    fn teardown(&mut self) {
        // Reverse hydration order, so consumers go down before their
        // producers.
        for mut instance in self.instances.drain(..).rev() {
            instance.destroy();
        }
        self.bus.clear();
        self.brain = Brain::default();
        self.variables.clear();
        self.errors.clear();
        self.pending = None;
        self.pending_fetches.clear();
    }

    /// Apply the host's approval decision. A reply whose transaction id
    /// does not match the last request is stale and discarded.
    fn apply_approval(&mut self, transaction_id: u64, specs: Vec<SpecReview>) {
        let Some(pending) = &self.pending else {
            tracing::debug!(transaction_id, "approval with no transaction in flight");
            return;
        };
        if pending.id != transaction_id {
            tracing::debug!(
                got = transaction_id,
                expected = pending.id,
                "stale approval discarded"
            );
            return;
        }
        let proposed: BTreeSet<SmolStr> = pending
            .reviews
            .iter()
            .map(|r| r.container_id.clone())
            .collect();
        self.pending = None;
        self.phase = RenderPhase::Hydrating;

        // An approval can only decide on what was proposed; a reply
        // naming an unknown container cannot introduce new content.
        let reviews: Vec<SpecReview> = specs
            .into_iter()
            .filter(|review| {
                let known = proposed.contains(&review.container_id);
                if !known {
                    tracing::warn!(
                        container = %review.container_id,
                        "approval names a container that was never proposed"
                    );
                }
                known
            })
            .map(SpecReview::normalize)
            .collect();

        // Blocked entries render a visible notice in place of the spec.
        for review in reviews.iter().filter(|r| !r.is_approved()) {
            let reason = review.reason.as_deref().unwrap_or("blocked");
            self.document.block_container(&review.container_id, reason);
        }

        // A proposed entry the reply never mentions did not get
        // approval either; it blocks visibly instead of staying inert.
        let answered: BTreeSet<SmolStr> =
            reviews.iter().map(|r| r.container_id.clone()).collect();
        for container in proposed.difference(&answered) {
            self.document
                .block_container(container, "no decision returned");
        }

        self.hydrate(&reviews);
        self.phase = RenderPhase::Listening;
        self.outbox.push_back(SandboxOutbound::SandboxStatus {
            status: SandboxStatusKind::Rendered,
            details: None,
        });
    }

    fn hydrate(&mut self, reviews: &[SpecReview]) {
        let mut ctx = HydrateCtx::default();
        let mut hydrated: Vec<Box<dyn Instance>> = Vec::new();

        for plugin in self.registry.in_hydration_order() {
            let mine = reviews
                .iter()
                .filter(|r| r.is_approved() && r.plugin_name == plugin.name());
            for review in mine {
                match plugin.hydrate_component(review, &mut ctx) {
                    Ok(instances) => hydrated.extend(instances),
                    Err(err) => {
                        // Attribute to the fence's document-order
                        // index; blocking an earlier sibling must not
                        // shift it.
                        let index = self
                            .document
                            .placeholders()
                            .find(|p| p.container_id == review.container_id)
                            .map(|p| p.index)
                            .unwrap_or(0);
                        self.errors.report(RenderIssue {
                            plugin_name: review.plugin_name.clone(),
                            index,
                            phase: Phase::Hydrate,
                            container_id: Some(review.container_id.clone()),
                            message: err.to_string(),
                        });
                    }
                }
            }
            hydrated.extend(plugin.finish_hydration(&mut ctx));
        }
        self.instances = hydrated;

        // Document metadata rides in approved reviews of the metadata
        // plugins.
        self.variables = reviews
            .iter()
            .filter(|r| r.is_approved() && r.plugin_name == "variables")
            .filter_map(|r| {
                serde_json::from_value::<Vec<Variable>>(r.approved_spec.clone()?).ok()
            })
            .flatten()
            .collect();
        let loaders: Vec<DataLoader> = reviews
            .iter()
            .filter(|r| r.is_approved() && r.plugin_name == "data")
            .filter_map(|r| serde_json::from_value(r.approved_spec.clone()?).ok())
            .collect();

        match Brain::build(&self.variables) {
            Ok(brain) => self.brain = brain,
            Err(err) => {
                self.errors.report(RenderIssue {
                    plugin_name: "variables".into(),
                    index: 0,
                    phase: Phase::Hydrate,
                    container_id: None,
                    message: err.to_string(),
                });
                self.brain = Brain::default();
            }
        }

        self.register_initial_signals();
        self.start_data_loaders(&loaders);

        // First full evaluation of the derived graph.
        if !self.brain.is_empty() {
            let mut changed: BTreeSet<SmolStr> =
                self.bus.state().keys().cloned().collect();
            changed.extend(self.brain.external_inputs());
            let (batch, errors) = self.brain.evaluate(&changed, self.bus.state());
            self.report_brain_errors(errors);
            if !batch.is_empty() {
                self.bus.broadcast(ORIGIN_BRAIN, batch);
            }
        }

        for instance in &mut self.instances {
            instance.begin_listening();
        }

        // Initial delivery: every instance sees the resolved state.
        let snapshot = self.bus.snapshot();
        if !snapshot.is_empty() {
            self.bus.broadcast(ORIGIN_INIT, snapshot);
        }
        self.pump();
    }

    fn register_initial_signals(&mut self) {
        let mut contributions = Vec::with_capacity(self.instances.len() + 1);

        // Variable declarations carry the document's authoritative
        // initial values and outrank component defaults.
        let declared = self
            .variables
            .iter()
            .map(|var| crate::signals::InitialSignal {
                variable_id: var.variable_id.clone(),
                value: var.initial_value.clone(),
                is_data: var.is_array
                    || matches!(var.calculation, Some(Calculation::DataFrame { .. })),
                priority: crate::plugins::priority::VARIABLES,
            })
            .collect();
        contributions.push(declared);

        for instance in &self.instances {
            contributions.push(instance.initial_signals());
        }
        self.bus.register_initial_signals(&contributions);
    }

    fn start_data_loaders(&mut self, loaders: &[DataLoader]) {
        for loader in loaders {
            match loader {
                DataLoader::Inline {
                    data_source_name,
                    format,
                    content,
                    delimiter,
                    transformations,
                } => {
                    let decoded = match content {
                        Value::String(text) => brain::decode_rows(*format, *delimiter, text),
                        other => Ok(other.clone()),
                    };
                    self.finish_load(data_source_name.clone(), transformations, decoded);
                }
                DataLoader::Url {
                    data_source_name,
                    url,
                    format,
                    delimiter,
                    transformations,
                } => self.request_fetch(
                    data_source_name.clone(),
                    url.clone(),
                    *format,
                    *delimiter,
                    transformations.clone(),
                ),
                // The sandbox has no filesystem; file content resolves
                // through the host exactly like a URL.
                DataLoader::File {
                    data_source_name,
                    filename,
                    format,
                    delimiter,
                    transformations,
                } => self.request_fetch(
                    data_source_name.clone(),
                    filename.clone(),
                    *format,
                    *delimiter,
                    transformations.clone(),
                ),
                DataLoader::Spec {
                    data_source_name, ..
                } => {
                    tracing::debug!(
                        name = %data_source_name,
                        "spec data loaders resolve in the charting runtime; skipped here"
                    );
                }
            }
        }
    }

    fn request_fetch(
        &mut self,
        data_source_name: SmolStr,
        url: String,
        format: DataFormat,
        delimiter: Option<char>,
        transformations: Vec<Transformation>,
    ) {
        self.next_fetch_id += 1;
        self.pending_fetches.insert(
            self.next_fetch_id,
            PendingFetch {
                data_source_name,
                format,
                delimiter,
                transformations,
            },
        );
        self.outbox.push_back(SandboxOutbound::GuardedFetchRequest {
            request_id: self.next_fetch_id,
            url,
            options: None,
        });
    }

    fn apply_fetch_response(
        &mut self,
        request_id: u64,
        status: u16,
        body: Option<String>,
        error: Option<String>,
    ) {
        let Some(fetch) = self.pending_fetches.remove(&request_id) else {
            tracing::debug!(request_id, "fetch response for unknown request");
            return;
        };
        if let Some(error) = error {
            self.errors.report(RenderIssue {
                plugin_name: "data".into(),
                index: 0,
                phase: Phase::Hydrate,
                container_id: None,
                message: format!("fetch for `{}` failed: {error}", fetch.data_source_name),
            });
            return;
        }
        if !(200..300).contains(&status) {
            self.errors.report(RenderIssue {
                plugin_name: "data".into(),
                index: 0,
                phase: Phase::Hydrate,
                container_id: None,
                message: format!(
                    "fetch for `{}` returned status {status}",
                    fetch.data_source_name
                ),
            });
            return;
        }
        let decoded = brain::decode_rows(
            fetch.format,
            fetch.delimiter,
            body.as_deref().unwrap_or(""),
        );
        self.finish_load(fetch.data_source_name, &fetch.transformations, decoded);
        self.pump();
    }

    fn finish_load(
        &mut self,
        data_source_name: SmolStr,
        transformations: &[Transformation],
        decoded: Result<Value, brain::BrainError>,
    ) {
        let value = decoded.and_then(|value| {
            if transformations.is_empty() {
                return Ok(value);
            }
            let rows = match value {
                Value::Array(rows) => rows,
                other => vec![other],
            };
            brain::transform_rows(&data_source_name, transformations, rows, self.bus.state())
                .map(Value::Array)
        });
        match value {
            Ok(value) => {
                let mut batch = Batch::new();
                batch.insert(data_source_name.clone(), SignalValue::data(value));
                self.bus
                    .broadcast(SmolStr::new(format!("data:{data_source_name}")), batch);
            }
            Err(err) => self.errors.report(RenderIssue {
                plugin_name: "data".into(),
                index: 0,
                phase: Phase::Hydrate,
                container_id: None,
                message: format!("data source `{data_source_name}`: {err}"),
            }),
        }
    }

    /// Entry point for component events from the embedding glue (a
    /// slider moved, a preset activated). Merges, then drains the
    /// delivery queue.
    pub fn broadcast_from(&mut self, origin: &str, batch: Batch) {
        self.bus.broadcast(origin, batch);
        self.pump();
    }

    /// Drain queued deliveries FIFO. Re-entrant broadcasts from
    /// `receive_batch` handlers append to the queue and are processed
    /// in arrival order.
    fn pump(&mut self) {
        while let Some(delivery) = self.bus.take_next() {
            let mut emissions: Vec<(SmolStr, Batch)> = Vec::new();
            for instance in &mut self.instances {
                if instance.id() == delivery.origin {
                    continue;
                }
                let mut emitted = Batch::new();
                instance.receive_batch(&delivery.batch, &mut |id, value| {
                    emitted.insert(id, value);
                });
                if !emitted.is_empty() {
                    emissions.push((SmolStr::new(instance.id()), emitted));
                }
            }
            for (origin, batch) in emissions {
                self.bus.broadcast(origin, batch);
            }

            if delivery.origin != ORIGIN_BRAIN && !self.brain.is_empty() {
                let changed: BTreeSet<SmolStr> = delivery.batch.keys().cloned().collect();
                let (batch, errors) = self.brain.evaluate(&changed, self.bus.state());
                self.report_brain_errors(errors);
                if !batch.is_empty() {
                    self.bus.broadcast(ORIGIN_BRAIN, batch);
                }
            }
        }
    }

    fn report_brain_errors(&mut self, errors: Vec<brain::BrainError>) {
        for err in errors {
            self.errors.report(RenderIssue {
                plugin_name: "variables".into(),
                index: 0,
                phase: Phase::Hydrate,
                container_id: None,
                message: err.to_string(),
            });
        }
    }
}
