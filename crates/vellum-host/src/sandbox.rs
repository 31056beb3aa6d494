//! The sandbox frame wrapper.
//!
//! [`Sandbox`] owns one [`Frame`] (the isolation boundary around a
//! renderer) and runs the host side of the protocol: render requests
//! in, approval round-trips through the registered [`Approver`],
//! guarded fetches through the registered fetcher, and status
//! surfaced out. Inbound envelopes are checked against the frame's id;
//! a forged source is dropped with a warning, never processed.

use crate::fetch::GuardedFetcher;
use crate::policy::{enforce_review_shape, Approver};
use smol_str::SmolStr;
use std::time::{Duration, Instant};
use vellum_api::{
    Dependency, DependencyKind, SandboxInbound, SandboxOutbound, SandboxStatusKind, SpecReview,
};
use vellum_renderer::Renderer;

/// How long an undecided approval may stay pending before the whole
/// transaction is blocked.
pub const APPROVAL_TIMEOUT: Duration = Duration::from_secs(30);

/// Identity of one frame; envelopes carry it so a listener shared
/// between frames can attribute traffic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FrameId(pub SmolStr);

impl FrameId {
    pub fn new(id: impl Into<SmolStr>) -> Self {
        Self(id.into())
    }
}

/// One message out of a frame, stamped with its claimed source.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub source: FrameId,
    pub message: SandboxOutbound,
}

/// The isolation boundary. Implementations deliver host messages into
/// the sandboxed renderer and surface its outbound traffic.
pub trait Frame {
    fn id(&self) -> &FrameId;
    fn post(&mut self, message: SandboxInbound);
    fn drain(&mut self) -> Vec<Envelope>;
}

/// In-process frame hosting a real renderer, for native embedding and
/// tests.
pub struct LocalFrame {
    id: FrameId,
    renderer: Renderer,
}

impl LocalFrame {
    pub fn new(id: impl Into<SmolStr>, renderer: Renderer) -> Self {
        Self {
            id: FrameId::new(id),
            renderer,
        }
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }
}

impl Frame for LocalFrame {
    fn id(&self) -> &FrameId {
        &self.id
    }

    fn post(&mut self, message: SandboxInbound) {
        self.renderer.handle_message(message);
    }

    fn drain(&mut self) -> Vec<Envelope> {
        self.renderer
            .drain_outbox()
            .into_iter()
            .map(|message| Envelope {
                source: self.id.clone(),
                message,
            })
            .collect()
    }
}

struct PendingApproval {
    transaction_id: u64,
    specs: Vec<SpecReview>,
    since: Instant,
}

pub struct Sandbox<F: Frame> {
    frame: F,
    approver: Box<dyn Approver>,
    fetcher: Box<dyn GuardedFetcher>,
    approval_timeout: Duration,
    pending: Option<PendingApproval>,
    status: Option<SandboxStatusKind>,
    last_error: Option<String>,
    dependencies: Vec<Dependency>,
}

/// Runtime assets the sandbox page loads; the editor can swap these
/// for an offline bundle.
fn default_dependencies() -> Vec<Dependency> {
    let script = |url: &str| Dependency {
        url: url.to_string(),
        kind: DependencyKind::Script,
    };
    vec![
        script("https://cdn.jsdelivr.net/npm/vega@6"),
        script("https://cdn.jsdelivr.net/npm/vega-lite@6"),
        script("https://cdn.jsdelivr.net/npm/vega-embed@7"),
        script("https://unpkg.com/tabulator-tables@6/dist/js/tabulator.min.js"),
        Dependency {
            url: "https://unpkg.com/tabulator-tables@6/dist/css/tabulator.min.css".to_string(),
            kind: DependencyKind::Style,
        },
    ]
}

impl<F: Frame> Sandbox<F> {
    pub fn new(frame: F, approver: Box<dyn Approver>, fetcher: Box<dyn GuardedFetcher>) -> Self {
        Self {
            frame,
            approver,
            fetcher,
            approval_timeout: APPROVAL_TIMEOUT,
            pending: None,
            status: None,
            last_error: None,
            dependencies: default_dependencies(),
        }
    }

    pub fn with_approval_timeout(mut self, timeout: Duration) -> Self {
        self.approval_timeout = timeout;
        self
    }

    pub fn frame(&self) -> &F {
        &self.frame
    }

    pub fn status(&self) -> Option<SandboxStatusKind> {
        self.status
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    pub fn set_dependencies(&mut self, dependencies: Vec<Dependency>) {
        self.dependencies = dependencies;
    }

    /// Send content into the frame and run the protocol until the
    /// frame goes quiet (or an approval is left pending).
    pub fn render(&mut self, markdown: &str) {
        self.frame.post(SandboxInbound::SandboxRender {
            markdown: Some(markdown.to_string()),
        });
        self.pump();
    }

    /// Resolve a deferred approval from an external decision-maker.
    /// Stale transaction ids are dropped.
    pub fn decide(&mut self, transaction_id: u64, specs: Vec<SpecReview>) {
        match &self.pending {
            Some(pending) if pending.transaction_id == transaction_id => {
                self.pending = None;
                self.post_approval(transaction_id, specs);
            }
            _ => {
                tracing::debug!(transaction_id, "decision for a transaction no longer pending");
            }
        }
    }

    /// Fail closed: if a deferred approval has outlived the deadline,
    /// block every spec in it.
    pub fn poll_timeout(&mut self) {
        let timeout = self.approval_timeout;
        let Some(pending) = self.pending.take_if(|p| p.since.elapsed() >= timeout) else {
            return;
        };
        tracing::warn!(
            transaction_id = pending.transaction_id,
            "approval deadline passed; blocking the transaction"
        );
        let blocked = pending
            .specs
            .into_iter()
            .map(|mut review| {
                review.block("approval timed out");
                review
            })
            .collect();
        self.post_approval(pending.transaction_id, blocked);
    }

    fn post_approval(&mut self, transaction_id: u64, specs: Vec<SpecReview>) {
        self.frame.post(SandboxInbound::SandboxApproval {
            transaction_id,
            specs: enforce_review_shape(specs),
        });
        self.pump();
    }

    /// Drain and handle frame traffic until quiet.
    pub fn pump(&mut self) {
        loop {
            let envelopes = self.frame.drain();
            if envelopes.is_empty() {
                break;
            }
            for envelope in envelopes {
                if envelope.source != *self.frame.id() {
                    tracing::warn!(
                        claimed = %envelope.source.0,
                        expected = %self.frame.id().0,
                        "dropping envelope with forged source"
                    );
                    continue;
                }
                self.handle(envelope.message);
            }
        }
    }

    fn handle(&mut self, message: SandboxOutbound) {
        match message {
            SandboxOutbound::SandboxedPreHydrateMessage {
                transaction_id,
                specs,
            } => {
                // A new proposal supersedes any older pending one.
                self.pending = None;
                match self.approver.review(specs.clone()) {
                    Some(decided) => self.post_approval(transaction_id, decided),
                    None => {
                        self.pending = Some(PendingApproval {
                            transaction_id,
                            specs,
                            since: Instant::now(),
                        });
                    }
                }
            }
            SandboxOutbound::SandboxStatus { status, details } => {
                self.status = Some(status);
                if status == SandboxStatusKind::Error {
                    self.last_error = details;
                }
            }
            SandboxOutbound::GuardedFetchRequest {
                request_id,
                url,
                options,
            } => {
                let outcome = self.fetcher.fetch(&url, options.as_ref());
                self.frame.post(SandboxInbound::GuardedFetchResponse {
                    request_id,
                    status: outcome.status,
                    body: outcome.body,
                    error: outcome.error,
                });
            }
        }
    }
}
