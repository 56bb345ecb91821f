//! In-memory implementation of the organization repository.
//!
//! # Responsibility
//! - Execute the repository contract without any external dependency.
//! - Mirror the SQLite adapter's observable behavior, list semantics included.
//!
//! # Invariants
//! - One reader/writer lock guards the whole collection; mutations hold the
//!   write lock for their full duration.
//! - Stored values are never shared with callers: every read and write clones.
//! - Timestamps are truncated to milliseconds, like the SQLite adapter.

use crate::context::{now_millis, system_clock, OpContext, SharedClock};
use crate::model::organization::{
    CreateOrganization, Organization, OrganizationId, PatchOrganization, ReplaceOrganization,
};
use crate::model::query::{normalize_limit, ListPage, ListQuery, MemberPage};
use crate::repo::organization_repo::{ensure_not_cancelled, OrganizationRepository, RepoResult};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

#[derive(Default)]
struct MemoryState {
    organizations: HashMap<OrganizationId, Organization>,
    members: HashMap<OrganizationId, BTreeSet<Uuid>>,
}

/// Volatile organization repository.
pub struct MemoryOrganizationRepository {
    state: RwLock<MemoryState>,
    clock: SharedClock,
}

impl Default for MemoryOrganizationRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryOrganizationRepository {
    pub fn new() -> Self {
        Self::with_clock(system_clock())
    }

    pub fn with_clock(clock: SharedClock) -> Self {
        Self {
            state: RwLock::new(MemoryState::default()),
            clock,
        }
    }

    fn now(&self) -> DateTime<Utc> {
        now_millis(self.clock.as_ref())
    }

    /// Runs `mutate` on a live, non-deleted organization and stamps audit fields.
    fn mutate_active(
        &self,
        ctx: &OpContext,
        id: OrganizationId,
        mutate: impl FnOnce(&mut Organization),
    ) -> Option<Organization> {
        let mut state = self.state.write();
        let org = state
            .organizations
            .get_mut(&id)
            .filter(|org| org.is_active())?;
        mutate(org);
        touch(org, self.now(), ctx);
        Some(org.clone())
    }
}

impl OrganizationRepository for MemoryOrganizationRepository {
    fn create(&self, ctx: &OpContext, req: &CreateOrganization) -> RepoResult<Organization> {
        ensure_not_cancelled(ctx)?;
        req.validate()?;

        let id = Uuid::new_v4();
        let now = self.now();
        let org = Organization {
            id,
            tenant_id: req.tenant_id,
            name: req.name.trim().to_string(),
            legal_code: req.legal_code.clone(),
            status: req.normalized_status(),
            tags: req.tags.clone(),
            addresses: req
                .addresses
                .iter()
                .cloned()
                .map(|input| input.into_address(id))
                .collect(),
            contacts: req
                .contacts
                .iter()
                .cloned()
                .map(|input| input.into_contact(id))
                .collect(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
            created_by: ctx.actor,
            updated_by: ctx.actor,
        };

        self.state.write().organizations.insert(id, org.clone());
        Ok(org)
    }

    fn get(&self, ctx: &OpContext, id: OrganizationId) -> RepoResult<Option<Organization>> {
        ensure_not_cancelled(ctx)?;
        let state = self.state.read();
        Ok(state
            .organizations
            .get(&id)
            .filter(|org| org.is_active())
            .cloned())
    }

    fn list(&self, ctx: &OpContext, query: &ListQuery) -> RepoResult<ListPage> {
        ensure_not_cancelled(ctx)?;
        let query = query.normalized();

        let state = self.state.read();
        let mut matched: Vec<&Organization> = state
            .organizations
            .values()
            .filter(|org| query.matches(org))
            .collect();
        matched.sort_by(|left, right| query.compare(left, right));

        let total = matched.len();
        let offset = usize::try_from(query.offset).unwrap_or(usize::MAX);
        let limit = usize::try_from(query.limit).unwrap_or(usize::MAX);
        let items = matched
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();

        Ok(ListPage {
            items,
            total: u64::try_from(total).unwrap_or(u64::MAX),
            limit: query.limit,
            offset: query.offset,
        })
    }

    fn replace(
        &self,
        ctx: &OpContext,
        id: OrganizationId,
        req: &ReplaceOrganization,
    ) -> RepoResult<Option<Organization>> {
        ensure_not_cancelled(ctx)?;
        req.validate()?;

        Ok(self.mutate_active(ctx, id, |org| {
            org.tenant_id = req.tenant_id;
            org.name = req.name.trim().to_string();
            org.legal_code = req.legal_code.clone();
            org.status = req.normalized_status();
            org.tags = req.tags.clone();
            org.addresses = req
                .addresses
                .iter()
                .cloned()
                .map(|input| input.into_address(id))
                .collect();
            org.contacts = req
                .contacts
                .iter()
                .cloned()
                .map(|input| input.into_contact(id))
                .collect();
        }))
    }

    fn patch(
        &self,
        ctx: &OpContext,
        id: OrganizationId,
        req: &PatchOrganization,
    ) -> RepoResult<Option<Organization>> {
        ensure_not_cancelled(ctx)?;
        req.validate()?;

        Ok(self.mutate_active(ctx, id, |org| req.apply_to(org)))
    }

    fn soft_delete(
        &self,
        ctx: &OpContext,
        id: OrganizationId,
    ) -> RepoResult<Option<Organization>> {
        ensure_not_cancelled(ctx)?;
        let now = self.now();
        Ok(self.mutate_active(ctx, id, |org| org.deleted_at = Some(now)))
    }

    fn restore(&self, ctx: &OpContext, id: OrganizationId) -> RepoResult<Option<Organization>> {
        ensure_not_cancelled(ctx)?;

        let mut state = self.state.write();
        let Some(org) = state
            .organizations
            .get_mut(&id)
            .filter(|org| !org.is_active())
        else {
            return Ok(None);
        };
        org.deleted_at = None;
        touch(org, self.now(), ctx);
        Ok(Some(org.clone()))
    }

    fn add_member(
        &self,
        ctx: &OpContext,
        org_id: OrganizationId,
        user_id: Uuid,
    ) -> RepoResult<bool> {
        ensure_not_cancelled(ctx)?;

        let mut state = self.state.write();
        let active = state
            .organizations
            .get(&org_id)
            .is_some_and(Organization::is_active);
        if !active {
            return Ok(false);
        }
        state.members.entry(org_id).or_default().insert(user_id);
        Ok(true)
    }

    fn remove_member(
        &self,
        ctx: &OpContext,
        org_id: OrganizationId,
        user_id: Uuid,
    ) -> RepoResult<bool> {
        ensure_not_cancelled(ctx)?;

        let mut state = self.state.write();
        Ok(state
            .members
            .get_mut(&org_id)
            .is_some_and(|members| members.remove(&user_id)))
    }

    fn list_members(
        &self,
        ctx: &OpContext,
        org_id: OrganizationId,
        limit: Option<u32>,
        offset: u32,
    ) -> RepoResult<MemberPage> {
        ensure_not_cancelled(ctx)?;
        let limit = normalize_limit(limit);

        let state = self.state.read();
        let members = state.members.get(&org_id);
        let total = members.map_or(0, BTreeSet::len);
        let user_ids = members
            .into_iter()
            .flatten()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .copied()
            .collect();

        Ok(MemberPage {
            organization_id: org_id,
            user_ids,
            total: u64::try_from(total).unwrap_or(u64::MAX),
            limit,
            offset,
        })
    }
}

/// Refreshes audit fields; `updated_at` never moves backwards.
fn touch(org: &mut Organization, now: DateTime<Utc>, ctx: &OpContext) {
    org.updated_at = org.updated_at.max(now);
    org.updated_by = ctx.actor;
}

#[cfg(test)]
mod tests {
    use super::MemoryOrganizationRepository;
    use crate::context::OpContext;
    use crate::model::organization::CreateOrganization;
    use crate::repo::organization_repo::{OrganizationRepository, RepoError};

    #[test]
    fn returned_values_do_not_alias_stored_state() {
        let repo = MemoryOrganizationRepository::new();
        let ctx = OpContext::new();
        let mut req = CreateOrganization::named("Acme");
        req.tags = vec!["a".to_string()];

        let mut created = repo.create(&ctx, &req).unwrap();
        created.tags.push("mutated".to_string());
        created.name.push_str(" changed");

        let stored = repo.get(&ctx, created.id).unwrap().unwrap();
        assert_eq!(stored.tags, vec!["a".to_string()]);
        assert_eq!(stored.name, "Acme");
    }

    #[test]
    fn cancelled_context_is_rejected_before_mutation() {
        let repo = MemoryOrganizationRepository::new();
        let ctx = OpContext::new();
        ctx.cancel.cancel();

        let err = repo
            .create(&ctx, &CreateOrganization::named("Acme"))
            .unwrap_err();
        assert!(matches!(err, RepoError::Cancelled));

        let page = repo
            .list(&OpContext::new(), &Default::default())
            .unwrap();
        assert_eq!(page.total, 0);
    }
}
