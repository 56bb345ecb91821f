//! Organization use-case service.
//!
//! # Responsibility
//! - Normalize caller input before it reaches the repository.
//! - Emit one domain event per successfully affected organization.
//!
//! # Invariants
//! - The service never bypasses repository validation or persistence contracts.
//! - Publishing happens after the mutation is committed; a publish failure is
//!   logged and never turns a committed mutation into an error.
//! - Bulk operations publish for every processed entity, including the ones
//!   processed before a partial failure.

use crate::config::EventsConfig;
use crate::context::OpContext;
use crate::events::{EventPublisher, OrganizationEvent, OrganizationEventKind};
use crate::model::organization::{
    AddressInput, ContactInput, CreateOrganization, Organization, OrganizationId,
    OrganizationStatus, PatchOrganization, ReplaceOrganization,
};
use crate::model::query::{ListPage, ListQuery, MemberPage};
use crate::repo::organization_repo::{BulkResult, OrganizationRepository, RepoResult};
use log::{debug, warn};
use uuid::Uuid;

/// Use-case service over one repository and one event publisher.
pub struct OrganizationService<R: OrganizationRepository, P: EventPublisher> {
    repo: R,
    publisher: P,
    events: EventsConfig,
}

impl<R: OrganizationRepository, P: EventPublisher> OrganizationService<R, P> {
    /// Creates a service with default event routing.
    pub fn new(repo: R, publisher: P) -> Self {
        Self::with_events_config(repo, publisher, EventsConfig::default())
    }

    pub fn with_events_config(repo: R, publisher: P, events: EventsConfig) -> Self {
        Self {
            repo,
            publisher,
            events,
        }
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub fn create(&self, ctx: &OpContext, req: &CreateOrganization) -> RepoResult<Organization> {
        let org = self.repo.create(ctx, &prepare_create(req))?;
        debug!(
            "event=org_create module=service status=ok org_id={} trace_id={}",
            org.id, ctx.trace_id
        );
        self.publish(ctx, OrganizationEventKind::Created, &org);
        Ok(org)
    }

    pub fn get(&self, ctx: &OpContext, id: OrganizationId) -> RepoResult<Option<Organization>> {
        self.repo.get(ctx, id)
    }

    pub fn list(&self, ctx: &OpContext, query: &ListQuery) -> RepoResult<ListPage> {
        self.repo.list(ctx, query)
    }

    pub fn replace(
        &self,
        ctx: &OpContext,
        id: OrganizationId,
        req: &ReplaceOrganization,
    ) -> RepoResult<Option<Organization>> {
        let updated = self.repo.replace(ctx, id, &prepare_replace(req))?;
        self.after_mutation(ctx, "org_replace", id, OrganizationEventKind::Updated, updated)
    }

    pub fn patch(
        &self,
        ctx: &OpContext,
        id: OrganizationId,
        req: &PatchOrganization,
    ) -> RepoResult<Option<Organization>> {
        let mut prepared = prepare_patch(req);
        assign_patch_ids(&mut prepared);
        let updated = self.repo.patch(ctx, id, &prepared)?;
        self.after_mutation(ctx, "org_patch", id, OrganizationEventKind::Updated, updated)
    }

    pub fn soft_delete(
        &self,
        ctx: &OpContext,
        id: OrganizationId,
    ) -> RepoResult<Option<Organization>> {
        let deleted = self.repo.soft_delete(ctx, id)?;
        self.after_mutation(ctx, "org_delete", id, OrganizationEventKind::Deleted, deleted)
    }

    pub fn restore(&self, ctx: &OpContext, id: OrganizationId) -> RepoResult<Option<Organization>> {
        let restored = self.repo.restore(ctx, id)?;
        self.after_mutation(ctx, "org_restore", id, OrganizationEventKind::Updated, restored)
    }

    pub fn bulk_create(
        &self,
        ctx: &OpContext,
        reqs: &[CreateOrganization],
    ) -> BulkResult<Organization> {
        let prepared: Vec<CreateOrganization> = reqs.iter().map(prepare_create).collect();
        let outcome = self.repo.bulk_create(ctx, &prepared);
        self.after_bulk(ctx, "org_bulk_create", OrganizationEventKind::Created, outcome)
    }

    /// Applies `patch` to each id. Owned records without an id receive a
    /// fresh one per organization.
    pub fn bulk_update(
        &self,
        ctx: &OpContext,
        ids: &[OrganizationId],
        patch: &PatchOrganization,
    ) -> BulkResult<Organization> {
        let outcome = self.repo.bulk_update(ctx, ids, &prepare_patch(patch));
        self.after_bulk(ctx, "org_bulk_update", OrganizationEventKind::Updated, outcome)
    }

    pub fn bulk_delete(&self, ctx: &OpContext, ids: &[OrganizationId]) -> BulkResult<Organization> {
        let outcome = self.repo.bulk_delete(ctx, ids);
        self.after_bulk(ctx, "org_bulk_delete", OrganizationEventKind::Deleted, outcome)
    }

    pub fn add_member(
        &self,
        ctx: &OpContext,
        org_id: OrganizationId,
        user_id: Uuid,
    ) -> RepoResult<bool> {
        let added = self.repo.add_member(ctx, org_id, user_id)?;
        debug!(
            "event=org_member_add module=service status=ok org_id={org_id} applied={added} trace_id={}",
            ctx.trace_id
        );
        Ok(added)
    }

    pub fn remove_member(
        &self,
        ctx: &OpContext,
        org_id: OrganizationId,
        user_id: Uuid,
    ) -> RepoResult<bool> {
        let removed = self.repo.remove_member(ctx, org_id, user_id)?;
        debug!(
            "event=org_member_remove module=service status=ok org_id={org_id} applied={removed} trace_id={}",
            ctx.trace_id
        );
        Ok(removed)
    }

    pub fn list_members(
        &self,
        ctx: &OpContext,
        org_id: OrganizationId,
        limit: Option<u32>,
        offset: u32,
    ) -> RepoResult<MemberPage> {
        self.repo.list_members(ctx, org_id, limit, offset)
    }

    fn after_mutation(
        &self,
        ctx: &OpContext,
        event: &'static str,
        id: OrganizationId,
        kind: OrganizationEventKind,
        outcome: Option<Organization>,
    ) -> RepoResult<Option<Organization>> {
        match outcome.as_ref() {
            Some(org) => {
                debug!(
                    "event={event} module=service status=ok org_id={id} trace_id={}",
                    ctx.trace_id
                );
                self.publish(ctx, kind, org);
            }
            None => debug!(
                "event={event} module=service status=not_found org_id={id} trace_id={}",
                ctx.trace_id
            ),
        }
        Ok(outcome)
    }

    fn after_bulk(
        &self,
        ctx: &OpContext,
        event: &'static str,
        kind: OrganizationEventKind,
        outcome: BulkResult<Organization>,
    ) -> BulkResult<Organization> {
        match &outcome {
            Ok(processed) => {
                debug!(
                    "event={event} module=service status=ok processed={} trace_id={}",
                    processed.len(),
                    ctx.trace_id
                );
                for org in processed {
                    self.publish(ctx, kind, org);
                }
            }
            Err(failure) => {
                warn!(
                    "event={event} module=service status=partial processed={} failed_index={} trace_id={} error={}",
                    failure.completed(),
                    failure.failed_index,
                    ctx.trace_id,
                    failure.error
                );
                for org in &failure.processed {
                    self.publish(ctx, kind, org);
                }
            }
        }
        outcome
    }

    fn publish(&self, ctx: &OpContext, kind: OrganizationEventKind, org: &Organization) {
        let event = OrganizationEvent::new(kind, org, &ctx.trace_id, &self.events);
        if let Err(err) = self.publisher.publish(&event) {
            warn!(
                "event=org_publish module=service status=error kind={} org_id={} routing_key={} trace_id={} error={err}",
                kind.as_str(),
                org.id,
                event.routing_key,
                ctx.trace_id
            );
        }
    }
}

fn prepare_create(req: &CreateOrganization) -> CreateOrganization {
    CreateOrganization {
        tenant_id: req.tenant_id,
        name: req.name.trim().to_string(),
        legal_code: req.legal_code.clone(),
        status: Some(
            req.status
                .as_deref()
                .map_or_else(OrganizationStatus::default, OrganizationStatus::normalize)
                .as_str()
                .to_string(),
        ),
        tags: req.tags.clone(),
        addresses: with_address_ids(&req.addresses),
        contacts: with_contact_ids(&req.contacts),
    }
}

fn prepare_replace(req: &ReplaceOrganization) -> ReplaceOrganization {
    ReplaceOrganization {
        tenant_id: req.tenant_id,
        name: req.name.trim().to_string(),
        legal_code: req.legal_code.clone(),
        status: OrganizationStatus::normalize(&req.status).as_str().to_string(),
        tags: req.tags.clone(),
        addresses: with_address_ids(&req.addresses),
        contacts: with_contact_ids(&req.contacts),
    }
}

/// Trims scalar fields. Owned record ids are left to `assign_patch_ids`.
fn prepare_patch(req: &PatchOrganization) -> PatchOrganization {
    let mut prepared = req.clone();
    if let Some(name) = prepared.name.as_mut() {
        *name = name.trim().to_string();
    }
    if let Some(status) = prepared.status.as_mut() {
        *status = OrganizationStatus::normalize(status).as_str().to_string();
    }
    prepared
}

fn assign_patch_ids(patch: &mut PatchOrganization) {
    if let Some(addresses) = patch.addresses.as_mut() {
        *addresses = with_address_ids(addresses);
    }
    if let Some(contacts) = patch.contacts.as_mut() {
        *contacts = with_contact_ids(contacts);
    }
}

fn with_address_ids(addresses: &[AddressInput]) -> Vec<AddressInput> {
    addresses
        .iter()
        .cloned()
        .map(|mut address| {
            address.id.get_or_insert_with(Uuid::new_v4);
            address
        })
        .collect()
}

fn with_contact_ids(contacts: &[ContactInput]) -> Vec<ContactInput> {
    contacts
        .iter()
        .cloned()
        .map(|mut contact| {
            contact.id.get_or_insert_with(Uuid::new_v4);
            contact
        })
        .collect()
}
