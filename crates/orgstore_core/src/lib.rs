//! Multi-tenant organization store.
//! Repository contract, SQLite and in-memory adapters, and an event-emitting service.

pub mod config;
pub mod context;
pub mod db;
pub mod events;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{Config, ConfigError, EventsConfig, LoggingConfig, StorageBackend, StorageConfig};
pub use context::{Clock, OpContext, SharedClock, SystemClock};
pub use events::{
    EventPublisher, LogPublisher, OrganizationEvent, OrganizationEventKind,
    OrganizationEventPayload, PublishError,
};
pub use logging::init_logging;
pub use model::organization::{
    parse_organization_id, ActorId, Address, AddressInput, AddressType, Contact, ContactInput,
    ContactType, CreateOrganization, Organization, OrganizationId, OrganizationStatus,
    PatchOrganization, ReplaceOrganization, ValidationError,
};
pub use model::patch::Patch;
pub use model::query::{ListPage, ListQuery, MemberPage, SortDirection, SortField};
pub use repo::memory_organization_repo::MemoryOrganizationRepository;
pub use repo::open_repository;
pub use repo::organization_repo::{
    BulkFailure, BulkResult, OrganizationRepository, RepoError, RepoResult,
};
pub use repo::sqlite_organization_repo::SqliteOrganizationRepository;
pub use service::organization_service::OrganizationService;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
