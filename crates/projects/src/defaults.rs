/// Standard checklist applied to a phase that has no deliverables yet.
///
/// Deployments can override this list through configuration; the order here is
/// the order deliverables are presented in.
pub const DEFAULT_DELIVERABLES: &[&str] = &[
    "Kick-off meeting held",
    "Requirements confirmed",
    "Draft deliverable submitted",
    "Client review completed",
    "Final deliverable approved",
];
