//! Host page message glue.
//!
//! [`HostListener`] sits between external callers (editor, extension
//! host) and one sandbox: it accepts render requests in either form
//! (markdown, or the JSON interchange document which it validates and
//! compiles first), reports lifecycle through `hostStatus`, applies
//! toolbar control messages field by field, and answers the editor's
//! offline-dependency round-trip. A malformed wire message is logged
//! and discarded; the only document-wide fatal path is an interactive
//! document that fails top-level decode.

use crate::fetch::GuardedFetcher;
use crate::policy::Approver;
use crate::sandbox::{Frame, Sandbox};
use serde_json::Value;
use smol_str::SmolStr;
use vellum_api::{
    compile_document, validate_document, HostInbound, HostOutbound, HostStatusKind,
    InteractiveDocument, SandboxStatusKind, ToolbarControl, ValidationIssue,
};

#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum ListenerError {
    #[error("interactive document failed to decode: {0}")]
    #[diagnostic(code(vellum::host::document_decode))]
    DocumentDecode(#[from] serde_json::Error),
}

/// Accumulated toolbar state; each control message overrides only the
/// fields it carries.
#[derive(Debug, Clone, Default)]
pub struct ToolbarState {
    pub show_source: bool,
    pub show_tweak_button: bool,
    pub show_download_button: bool,
    pub show_restart_button: bool,
    pub mode: Option<String>,
    pub filename: Option<String>,
    pub download_dialog_open: bool,
}

impl ToolbarState {
    pub fn apply(&mut self, control: &ToolbarControl) {
        if let Some(v) = control.show_source {
            self.show_source = v;
        }
        if let Some(v) = control.show_tweak_button {
            self.show_tweak_button = v;
        }
        if let Some(v) = control.show_download_button {
            self.show_download_button = v;
        }
        if let Some(v) = control.show_restart_button {
            self.show_restart_button = v;
        }
        if let Some(v) = &control.set_mode {
            self.mode = Some(v.clone());
        }
        if let Some(v) = &control.set_filename {
            self.filename = Some(v.clone());
        }
        if let Some(v) = control.show_download_dialog {
            self.download_dialog_open = v;
        }
    }
}

pub struct HostListener<F: Frame> {
    /// This page's own sender id; editor traffic it emitted comes back
    /// tagged with it and is skipped.
    id: SmolStr,
    sandbox: Sandbox<F>,
    toolbar: ToolbarState,
    validation_issues: Vec<ValidationIssue>,
    outbox: Vec<HostOutbound>,
}

impl<F: Frame> HostListener<F> {
    pub fn new(
        id: impl Into<SmolStr>,
        frame: F,
        approver: Box<dyn Approver>,
        fetcher: Box<dyn GuardedFetcher>,
    ) -> Self {
        let mut listener = Self {
            id: id.into(),
            sandbox: Sandbox::new(frame, approver, fetcher),
            toolbar: ToolbarState::default(),
            validation_issues: Vec::new(),
            outbox: Vec::new(),
        };
        listener.push_status(HostStatusKind::Ready, None);
        listener
    }

    pub fn sandbox(&self) -> &Sandbox<F> {
        &self.sandbox
    }

    pub fn sandbox_mut(&mut self) -> &mut Sandbox<F> {
        &mut self.sandbox
    }

    pub fn toolbar(&self) -> &ToolbarState {
        &self.toolbar
    }

    /// Issues from the most recent interactive-document render.
    pub fn validation_issues(&self) -> &[ValidationIssue] {
        &self.validation_issues
    }

    pub fn drain_outbox(&mut self) -> Vec<HostOutbound> {
        std::mem::take(&mut self.outbox)
    }

    /// Decode and dispatch one raw wire message. Unknown tags and
    /// malformed shapes never propagate past this boundary.
    pub fn handle_value(&mut self, value: Value) {
        match serde_json::from_value::<HostInbound>(value) {
            Ok(message) => self.handle(message),
            Err(err) => tracing::warn!(%err, "discarding undecodable host message"),
        }
    }

    pub fn handle(&mut self, message: HostInbound) {
        match message {
            HostInbound::HostRenderRequest {
                title,
                markdown,
                interactive_document,
            } => {
                // The request's title doubles as the toolbar filename.
                if let Some(title) = title {
                    self.toolbar.filename = Some(title);
                }
                match (markdown, interactive_document) {
                    (_, Some(document)) => self.render_document(document),
                    (Some(markdown), None) => self.render_markdown(&markdown),
                    (None, None) => {
                        tracing::debug!("render request with neither form; ignored");
                    }
                }
            }
            HostInbound::HostToolbarControl(control) => self.toolbar.apply(&control),
            HostInbound::EditorReady { sender } => {
                if sender != self.id {
                    self.push_status(HostStatusKind::Ready, None);
                }
            }
            HostInbound::EditorPage { sender, page } => {
                if sender != self.id {
                    self.render_document(page);
                }
            }
            HostInbound::EditorGetOfflineDependencies { sender } => {
                if sender != self.id {
                    self.outbox.push(HostOutbound::EditorSetOfflineDependencies {
                        sender: self.id.clone(),
                        offline_deps: self.sandbox.dependencies().to_vec(),
                    });
                }
            }
            HostInbound::EditorSetOfflineDependencies {
                sender,
                offline_deps,
            } => {
                if sender != self.id {
                    self.sandbox.set_dependencies(offline_deps);
                }
            }
        }
    }

    pub fn render_markdown(&mut self, markdown: &str) {
        self.validation_issues.clear();
        self.push_status(HostStatusKind::Rendering, None);
        self.sandbox.render(markdown);
        self.push_sandbox_status();
    }

    fn render_document(&mut self, document: Value) {
        self.push_status(HostStatusKind::Compiling, None);
        match self.compile(document) {
            Ok(markdown) => {
                self.push_status(HostStatusKind::Rendering, None);
                self.sandbox.render(&markdown);
                self.push_sandbox_status();
            }
            Err(err) => {
                tracing::warn!(%err, "document rejected");
                self.push_status(HostStatusKind::Error, Some(err.to_string()));
            }
        }
    }

    fn compile(&mut self, document: Value) -> Result<String, ListenerError> {
        let document: InteractiveDocument = serde_json::from_value(document)?;
        // Validation issues are advisory at this layer; the renderer's
        // per-spec review blocks anything that must not hydrate.
        self.validation_issues = validate_document(&document);
        for issue in &self.validation_issues {
            tracing::warn!(scope = ?issue.scope, name = %issue.name, "{}", issue.message);
        }
        Ok(compile_document(&document))
    }

    fn push_sandbox_status(&mut self) {
        match self.sandbox.status() {
            Some(SandboxStatusKind::Rendered) => self.push_status(HostStatusKind::Rendered, None),
            Some(SandboxStatusKind::Error) => self.push_status(
                HostStatusKind::Error,
                self.sandbox.last_error().map(str::to_string),
            ),
            _ => {}
        }
    }

    fn push_status(&mut self, host_status: HostStatusKind, details: Option<String>) {
        self.outbox.push(HostOutbound::HostStatus {
            host_status,
            details,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::TableFetcher;
    use crate::policy::ApproveAll;
    use crate::sandbox::LocalFrame;
    use serde_json::json;
    use vellum_renderer::{standard_registry, RenderPhase, Renderer};

    fn listener() -> HostListener<LocalFrame> {
        let renderer = Renderer::new(standard_registry().unwrap());
        HostListener::new(
            "host-1",
            LocalFrame::new("frame-1", renderer),
            Box::new(ApproveAll),
            Box::new(TableFetcher::default()),
        )
    }

    fn statuses(listener: &mut HostListener<LocalFrame>) -> Vec<HostStatusKind> {
        listener
            .drain_outbox()
            .into_iter()
            .filter_map(|msg| match msg {
                HostOutbound::HostStatus { host_status, .. } => Some(host_status),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn interactive_document_compiles_and_renders() {
        let mut listener = listener();
        listener.handle(HostInbound::HostRenderRequest {
            title: None,
            markdown: None,
            interactive_document: Some(json!({
                "title": "Demo",
                "variables": [{"variableId": "x", "type": "number", "initialValue": 3}],
                "groups": [{"groupId": "main", "elements": ["Hello.", "slider x"]}]
            })),
        });
        assert_eq!(
            statuses(&mut listener),
            vec![
                HostStatusKind::Ready,
                HostStatusKind::Compiling,
                HostStatusKind::Rendering,
                HostStatusKind::Rendered
            ]
        );
        let renderer = listener.sandbox().frame().renderer();
        assert_eq!(renderer.phase(), RenderPhase::Listening);
        assert_eq!(renderer.signal_value("x").unwrap().value, json!(3));
        // The hydrated control reports the declared initial value.
        assert_eq!(
            renderer.instances()[0].current_signal_value().unwrap().value,
            json!(3)
        );
    }

    #[test]
    fn undecodable_document_is_the_fatal_path() {
        let mut listener = listener();
        listener.handle(HostInbound::HostRenderRequest {
            title: None,
            markdown: None,
            interactive_document: Some(json!({"groups": "not an array"})),
        });
        let out = listener.drain_outbox();
        let last = out.last().unwrap();
        match last {
            HostOutbound::HostStatus {
                host_status: HostStatusKind::Error,
                details,
            } => assert!(details.as_ref().unwrap().contains("decode")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn empty_render_request_is_ignored() {
        let mut listener = listener();
        listener.drain_outbox();
        listener.handle(HostInbound::HostRenderRequest {
            title: None,
            markdown: None,
            interactive_document: None,
        });
        assert!(listener.drain_outbox().is_empty());
    }

    #[test]
    fn render_request_title_lands_in_the_toolbar() {
        let mut listener = listener();
        listener.handle(HostInbound::HostRenderRequest {
            title: Some("quarterly.md".into()),
            markdown: Some("# Hi\n".into()),
            interactive_document: None,
        });
        assert_eq!(listener.toolbar().filename.as_deref(), Some("quarterly.md"));

        // A request without a title keeps the previous one.
        listener.handle(HostInbound::HostRenderRequest {
            title: None,
            markdown: Some("# Again\n".into()),
            interactive_document: None,
        });
        assert_eq!(listener.toolbar().filename.as_deref(), Some("quarterly.md"));
    }

    #[test]
    fn toolbar_control_applies_only_present_fields() {
        let mut listener = listener();
        listener.handle_value(json!({
            "type": "hostToolbarControl",
            "showSource": true,
            "setFilename": "report.md"
        }));
        listener.handle_value(json!({
            "type": "hostToolbarControl",
            "showTweakButton": true
        }));
        let toolbar = listener.toolbar();
        assert!(toolbar.show_source);
        assert!(toolbar.show_tweak_button);
        assert_eq!(toolbar.filename.as_deref(), Some("report.md"));
    }

    #[test]
    fn own_editor_traffic_is_skipped() {
        let mut listener = listener();
        listener.drain_outbox();
        listener.handle(HostInbound::EditorGetOfflineDependencies {
            sender: "host-1".into(),
        });
        assert!(listener.drain_outbox().is_empty());

        listener.handle(HostInbound::EditorGetOfflineDependencies {
            sender: "editor-7".into(),
        });
        let out = listener.drain_outbox();
        match &out[0] {
            HostOutbound::EditorSetOfflineDependencies {
                sender,
                offline_deps,
            } => {
                assert_eq!(sender, "host-1");
                assert!(!offline_deps.is_empty());
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn unknown_wire_tags_are_discarded() {
        let mut listener = listener();
        listener.drain_outbox();
        listener.handle_value(json!({"type": "hostEval", "code": "boom"}));
        assert!(listener.drain_outbox().is_empty());
    }
}
