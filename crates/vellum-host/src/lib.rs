//! Host side of the vellum document sandbox.
//!
//! The renderer runs inside an isolated frame and can only affect the
//! page through the message protocol; this crate is everything on the
//! trusted side of that boundary: the frame wrapper and approval
//! bridging ([`sandbox`]), the policy funnel every proposed spec flows
//! through ([`policy`]), the external-caller message glue
//! ([`listener`]), and the guarded fetch proxy ([`fetch`]).

pub mod fetch;
pub mod listener;
pub mod policy;
pub mod sandbox;

pub use fetch::{FetchOutcome, GuardedFetcher, HttpFetcher, TableFetcher};
pub use listener::{HostListener, ListenerError, ToolbarState};
pub use policy::{enforce_review_shape, ApproveAll, Approver, ApproverFn};
pub use sandbox::{Envelope, Frame, FrameId, LocalFrame, Sandbox, APPROVAL_TIMEOUT};
