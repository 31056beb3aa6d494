//! Shared data model and wire protocol for vellum interactive documents.
//!
//! An interactive document is a JSON structure (or its compiled markdown
//! form) mixing prose, charts, and input controls. This crate holds the
//! document model itself, the validation rules that run before anything
//! renders, the compiler that lowers a document to fenced markdown, and
//! the message types exchanged between the host page and the sandboxed
//! renderer.

pub mod compile;
pub mod document;
pub mod messages;
pub mod review;
pub mod validate;

pub use compile::compile_document;
pub use document::{
    Calculation, DataFormat, DataLoader, DynamicOptions, ElementGroup, InteractiveDocument,
    InteractiveElement, PageElement, Preset, Resources, Transformation, Variable, VariableType,
};
pub use messages::{
    Dependency, DependencyKind, FetchOptions, HostInbound, HostOutbound, HostStatusKind,
    SandboxInbound, SandboxOutbound, SandboxStatusKind, ToolbarControl,
};
pub use review::SpecReview;
pub use validate::{validate_document, IssueScope, ValidationIssue};

/// Reserved suffix for companion signals carrying a tabular view's
/// current selection. Data source names must not end with it.
pub const SELECTED_SUFFIX: &str = "_selected";

/// Variable names that may never be declared by a document.
pub const RESERVED_NAMES: &[&str] = &["datum"];
