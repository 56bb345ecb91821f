//! Use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls and event publication.
//! - Keep transport layers decoupled from storage details.

pub mod organization_service;
