//! The approval policy funnel.
//!
//! Every spec the sandbox proposes flows through exactly one
//! [`Approver`] before anything hydrates. An approver may decide
//! immediately or defer (a human-in-the-loop UI); a deferred decision
//! that never arrives fails closed at the sandbox's approval deadline.

use vellum_api::SpecReview;

pub trait Approver {
    /// Decide on a proposed batch. `None` leaves the decision pending;
    /// the sandbox wrapper blocks everything if no decision arrives in
    /// time.
    fn review(&mut self, specs: Vec<SpecReview>) -> Option<Vec<SpecReview>>;
}

/// Pass-through policy: approves whatever the renderer proposed.
/// Entries the renderer already self-blocked stay blocked.
pub struct ApproveAll;

impl Approver for ApproveAll {
    fn review(&mut self, specs: Vec<SpecReview>) -> Option<Vec<SpecReview>> {
        Some(specs)
    }
}

/// Closure adapter for one-off policies.
pub struct ApproverFn<F>(pub F);

impl<F> Approver for ApproverFn<F>
where
    F: FnMut(Vec<SpecReview>) -> Option<Vec<SpecReview>>,
{
    fn review(&mut self, specs: Vec<SpecReview>) -> Option<Vec<SpecReview>> {
        (self.0)(specs)
    }
}

/// Re-check the review shape on the host side before it goes back over
/// the wire. An approver that returns a malformed entry gets it
/// normalized toward blocked, never toward approved.
pub fn enforce_review_shape(specs: Vec<SpecReview>) -> Vec<SpecReview> {
    specs.into_iter().map(SpecReview::normalize).collect()
}
