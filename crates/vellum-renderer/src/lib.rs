//! The sandboxed document renderer.
//!
//! Everything that touches document-supplied content lives in this
//! crate, behind the approval protocol: markdown parsing with plugin
//! fence dispatch, spec extraction into inert placeholders, hydration
//! of approved specs into live instances, the signal bus connecting
//! them, and the derived-variable graph. The host side of the protocol
//! lives in `vellum-host`.

pub mod brain;
pub mod expr;
pub mod parser;
pub mod placeholder;
pub mod plugin;
pub mod plugins;
pub mod registry;
pub mod render;
pub mod sanitize;
pub mod signals;

pub use parser::{Block, ParsedDocument};
pub use placeholder::Placeholder;
pub use plugin::{ErrorSink, HydrateCtx, Instance, Phase, Plugin, PluginError, RenderIssue};
pub use plugins::standard_registry;
pub use registry::{PluginRegistry, RegistryBuilder, RegistryError};
pub use render::{RenderPhase, Renderer};
pub use signals::{Batch, Delivery, InitialSignal, SignalBus, SignalValue};
