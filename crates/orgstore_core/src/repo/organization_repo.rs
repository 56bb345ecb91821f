//! Organization repository contract.
//!
//! # Responsibility
//! - Define the storage-agnostic operations every adapter implements.
//! - Define the error taxonomy shared by adapters and the service layer.
//! - Compose bulk operations out of single-entity operations.
//!
//! # Invariants
//! - "Not found" is `Ok(None)`/`Ok(false)`, never an error.
//! - Write paths validate input before any storage mutation.
//! - Bulk operations apply items sequentially; a failure reports what was
//!   already processed instead of discarding it.

use crate::context::OpContext;
use crate::db::DbError;
use crate::model::organization::{
    CreateOrganization, Organization, OrganizationId, PatchOrganization, ReplaceOrganization,
    ValidationError,
};
use crate::model::query::{ListPage, ListQuery, MemberPage};
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;
use uuid::Uuid;

pub type RepoResult<T> = Result<T, RepoError>;

/// Outcome of a bulk operation: every affected entity, or a partial failure.
pub type BulkResult<T> = Result<Vec<T>, BulkFailure<T>>;

/// Repository error for organization persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    /// Input rejected before touching storage.
    Validation(ValidationError),
    /// Raw storage failure without operation context.
    Db(DbError),
    /// Storage failure raised while executing `operation`.
    Storage {
        operation: &'static str,
        source: DbError,
    },
    /// Caller cancelled the operation. Mutations may or may not have landed.
    Cancelled,
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    /// Persisted data cannot be converted to a valid organization.
    InvalidData(String),
}

impl RepoError {
    /// Attaches operation context to raw storage failures.
    pub fn during(self, operation: &'static str) -> Self {
        match self {
            Self::Db(source) if source.is_interrupted() => Self::Cancelled,
            Self::Db(source) => Self::Storage { operation, source },
            other => other,
        }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::Storage { operation, source } => {
                write!(f, "organization {operation} failed: {source}")
            }
            Self::Cancelled => write!(f, "operation cancelled"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "organization repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "organization repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "organization repository requires column `{column}` in table `{table}`"
            ),
            Self::InvalidData(message) => {
                write!(f, "invalid persisted organization data: {message}")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::Storage { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ValidationError> for RepoError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Bulk operation that stopped at `failed_index`.
///
/// `processed` holds the entities affected before the failure; they are
/// committed in storage.
#[derive(Debug)]
pub struct BulkFailure<T> {
    pub processed: Vec<T>,
    pub failed_index: usize,
    pub error: RepoError,
}

impl<T> BulkFailure<T> {
    /// Number of entities successfully processed before the failure.
    pub fn completed(&self) -> usize {
        self.processed.len()
    }
}

impl<T> Display for BulkFailure<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "bulk operation failed at item {} after {} succeeded: {}",
            self.failed_index,
            self.processed.len(),
            self.error
        )
    }
}

impl<T: Debug> Error for BulkFailure<T> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.error)
    }
}

/// Storage contract satisfied by the SQLite and in-memory adapters.
pub trait OrganizationRepository: Send + Sync {
    /// Inserts a new organization and its owned records; returns the stored aggregate.
    fn create(&self, ctx: &OpContext, req: &CreateOrganization) -> RepoResult<Organization>;

    /// Gets one non-deleted organization.
    fn get(&self, ctx: &OpContext, id: OrganizationId) -> RepoResult<Option<Organization>>;

    /// Filters, sorts and paginates non-deleted organizations.
    fn list(&self, ctx: &OpContext, query: &ListQuery) -> RepoResult<ListPage>;

    /// Overwrites every field of a non-deleted organization.
    fn replace(
        &self,
        ctx: &OpContext,
        id: OrganizationId,
        req: &ReplaceOrganization,
    ) -> RepoResult<Option<Organization>>;

    /// Applies a partial update to a non-deleted organization.
    fn patch(
        &self,
        ctx: &OpContext,
        id: OrganizationId,
        req: &PatchOrganization,
    ) -> RepoResult<Option<Organization>>;

    /// Tombstones a non-deleted organization; returns the tombstoned snapshot.
    fn soft_delete(&self, ctx: &OpContext, id: OrganizationId)
        -> RepoResult<Option<Organization>>;

    /// Clears the tombstone of a deleted organization.
    fn restore(&self, ctx: &OpContext, id: OrganizationId) -> RepoResult<Option<Organization>>;

    /// Adds a membership. Returns `false` when the organization is absent or deleted.
    /// Adding an existing membership is a successful no-op.
    fn add_member(&self, ctx: &OpContext, org_id: OrganizationId, user_id: Uuid)
        -> RepoResult<bool>;

    /// Removes a membership. Returns whether one existed.
    fn remove_member(
        &self,
        ctx: &OpContext,
        org_id: OrganizationId,
        user_id: Uuid,
    ) -> RepoResult<bool>;

    /// Lists member user ids ordered ascending.
    fn list_members(
        &self,
        ctx: &OpContext,
        org_id: OrganizationId,
        limit: Option<u32>,
        offset: u32,
    ) -> RepoResult<MemberPage>;

    /// Creates each request in order, stopping at the first failure.
    fn bulk_create(
        &self,
        ctx: &OpContext,
        reqs: &[CreateOrganization],
    ) -> BulkResult<Organization> {
        let mut created = Vec::with_capacity(reqs.len());
        for (index, req) in reqs.iter().enumerate() {
            match self.create(ctx, req) {
                Ok(org) => created.push(org),
                Err(error) => {
                    return Err(BulkFailure {
                        processed: created,
                        failed_index: index,
                        error,
                    })
                }
            }
        }
        Ok(created)
    }

    /// Patches each id in order. Unknown or deleted ids are skipped.
    fn bulk_update(
        &self,
        ctx: &OpContext,
        ids: &[OrganizationId],
        patch: &PatchOrganization,
    ) -> BulkResult<Organization> {
        let mut updated = Vec::with_capacity(ids.len());
        for (index, id) in ids.iter().enumerate() {
            match self.patch(ctx, *id, patch) {
                Ok(Some(org)) => updated.push(org),
                Ok(None) => {}
                Err(error) => {
                    return Err(BulkFailure {
                        processed: updated,
                        failed_index: index,
                        error,
                    })
                }
            }
        }
        Ok(updated)
    }

    /// Soft-deletes each id in order. Unknown or already deleted ids are skipped.
    fn bulk_delete(&self, ctx: &OpContext, ids: &[OrganizationId]) -> BulkResult<Organization> {
        let mut deleted = Vec::with_capacity(ids.len());
        for (index, id) in ids.iter().enumerate() {
            match self.soft_delete(ctx, *id) {
                Ok(Some(org)) => deleted.push(org),
                Ok(None) => {}
                Err(error) => {
                    return Err(BulkFailure {
                        processed: deleted,
                        failed_index: index,
                        error,
                    })
                }
            }
        }
        Ok(deleted)
    }
}

macro_rules! forward_repository {
    ($wrapper:ty) => {
        impl<R: OrganizationRepository + ?Sized> OrganizationRepository for $wrapper {
            fn create(&self, ctx: &OpContext, req: &CreateOrganization) -> RepoResult<Organization> {
                (**self).create(ctx, req)
            }

            fn get(&self, ctx: &OpContext, id: OrganizationId) -> RepoResult<Option<Organization>> {
                (**self).get(ctx, id)
            }

            fn list(&self, ctx: &OpContext, query: &ListQuery) -> RepoResult<ListPage> {
                (**self).list(ctx, query)
            }

            fn replace(
                &self,
                ctx: &OpContext,
                id: OrganizationId,
                req: &ReplaceOrganization,
            ) -> RepoResult<Option<Organization>> {
                (**self).replace(ctx, id, req)
            }

            fn patch(
                &self,
                ctx: &OpContext,
                id: OrganizationId,
                req: &PatchOrganization,
            ) -> RepoResult<Option<Organization>> {
                (**self).patch(ctx, id, req)
            }

            fn soft_delete(
                &self,
                ctx: &OpContext,
                id: OrganizationId,
            ) -> RepoResult<Option<Organization>> {
                (**self).soft_delete(ctx, id)
            }

            fn restore(
                &self,
                ctx: &OpContext,
                id: OrganizationId,
            ) -> RepoResult<Option<Organization>> {
                (**self).restore(ctx, id)
            }

            fn add_member(
                &self,
                ctx: &OpContext,
                org_id: OrganizationId,
                user_id: Uuid,
            ) -> RepoResult<bool> {
                (**self).add_member(ctx, org_id, user_id)
            }

            fn remove_member(
                &self,
                ctx: &OpContext,
                org_id: OrganizationId,
                user_id: Uuid,
            ) -> RepoResult<bool> {
                (**self).remove_member(ctx, org_id, user_id)
            }

            fn list_members(
                &self,
                ctx: &OpContext,
                org_id: OrganizationId,
                limit: Option<u32>,
                offset: u32,
            ) -> RepoResult<MemberPage> {
                (**self).list_members(ctx, org_id, limit, offset)
            }

            fn bulk_create(
                &self,
                ctx: &OpContext,
                reqs: &[CreateOrganization],
            ) -> BulkResult<Organization> {
                (**self).bulk_create(ctx, reqs)
            }

            fn bulk_update(
                &self,
                ctx: &OpContext,
                ids: &[OrganizationId],
                patch: &PatchOrganization,
            ) -> BulkResult<Organization> {
                (**self).bulk_update(ctx, ids, patch)
            }

            fn bulk_delete(
                &self,
                ctx: &OpContext,
                ids: &[OrganizationId],
            ) -> BulkResult<Organization> {
                (**self).bulk_delete(ctx, ids)
            }
        }
    };
}

forward_repository!(Box<R>);
forward_repository!(Arc<R>);

/// Returns `Err(Cancelled)` when the caller has already given up.
pub(crate) fn ensure_not_cancelled(ctx: &OpContext) -> RepoResult<()> {
    if ctx.is_cancelled() {
        return Err(RepoError::Cancelled);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{BulkFailure, RepoError};
    use crate::db::DbError;
    use crate::model::organization::ValidationError;

    #[test]
    fn during_wraps_raw_storage_failures_with_operation() {
        let raw = RepoError::Db(DbError::Sqlite(rusqlite::Error::QueryReturnedNoRows));
        let wrapped = raw.during("replace");
        assert!(matches!(
            wrapped,
            RepoError::Storage {
                operation: "replace",
                ..
            }
        ));
        assert!(wrapped.to_string().contains("replace"));
    }

    #[test]
    fn during_keeps_validation_errors() {
        let err = RepoError::from(ValidationError::EmptyName).during("create");
        assert!(matches!(err, RepoError::Validation(ValidationError::EmptyName)));
    }

    #[test]
    fn bulk_failure_reports_completed_count() {
        let failure = BulkFailure {
            processed: vec![1, 2],
            failed_index: 2,
            error: RepoError::Cancelled,
        };
        assert_eq!(failure.completed(), 2);
        assert!(failure.to_string().contains("after 2 succeeded"));
    }
}
