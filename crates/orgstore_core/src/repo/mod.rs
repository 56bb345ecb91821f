//! Repository layer: storage contract and its adapters.
//!
//! # Responsibility
//! - Define the organization storage contract.
//! - Provide interchangeable SQLite and in-memory implementations.
//! - Select an adapter from configuration.
//!
//! # Invariants
//! - Both adapters produce identical observable results for the same call sequence.
//! - Repository writes validate input before persistence.

pub mod memory_organization_repo;
pub mod organization_repo;
pub mod sqlite_organization_repo;

use crate::config::{StorageBackend, StorageConfig};
use crate::db::{open_db, open_db_in_memory};
use log::info;
use memory_organization_repo::MemoryOrganizationRepository;
use organization_repo::{OrganizationRepository, RepoError, RepoResult};
use sqlite_organization_repo::SqliteOrganizationRepository;

/// Opens the adapter selected by `config`.
///
/// The SQLite backend opens `database_path`, or an in-memory database when
/// no path is configured, and applies pending migrations.
pub fn open_repository(config: &StorageConfig) -> RepoResult<Box<dyn OrganizationRepository>> {
    info!(
        "event=repo_open module=repo status=start backend={}",
        config.backend.as_str()
    );
    let repo: Box<dyn OrganizationRepository> = match config.backend {
        StorageBackend::Memory => Box::new(MemoryOrganizationRepository::new()),
        StorageBackend::Sqlite => {
            let conn = match config.database_path.as_deref() {
                Some(path) => open_db(path, config.busy_timeout()),
                None => open_db_in_memory(),
            }
            .map_err(|err| RepoError::from(err).during("open"))?;
            Box::new(SqliteOrganizationRepository::try_new(conn)?)
        }
    };
    Ok(repo)
}
