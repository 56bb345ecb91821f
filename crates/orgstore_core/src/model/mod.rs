//! Organization domain model.
//!
//! # Responsibility
//! - Define the organization aggregate and its owned address/contact records.
//! - Define inbound request shapes, including tri-state patch fields.
//! - Define the canonical list query shared by every storage adapter.
//!
//! # Invariants
//! - Every organization is identified by a stable `OrganizationId`.
//! - Deletion is represented by the `deleted_at` tombstone, not hard delete.
//! - `status` is always one of the closed `OrganizationStatus` values.

pub mod organization;
pub mod patch;
pub mod query;
