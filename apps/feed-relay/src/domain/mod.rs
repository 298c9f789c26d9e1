//! Domain layer - Payload provenance, routing policy, and quote selection.
//!
//! Everything here is pure: no I/O, no clocks, no channels. The
//! application layer drives these types from its async workflows.

/// Payload provenance tags and the payload container.
pub mod payload;

/// Quote-list reduction to the most recent record.
pub mod quotes;

/// Provenance-to-stream routing policy.
pub mod routing;
