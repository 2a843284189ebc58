//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects have no identity and are replaced rather than mutated. In this
/// workspace that covers derived figures such as invoice totals and phase
/// completion summaries: they are recomputed from their source data, never
/// edited in place.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
