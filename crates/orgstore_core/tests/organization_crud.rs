use chrono::{DateTime, Duration, TimeZone, Utc};
use orgstore_core::db::open_db_in_memory;
use orgstore_core::{
    AddressInput, AddressType, Clock, ContactInput, ContactType, CreateOrganization,
    MemoryOrganizationRepository, OpContext, OrganizationRepository, OrganizationStatus, Patch,
    PatchOrganization, RepoError, ReplaceOrganization, SqliteOrganizationRepository,
    ValidationError,
};
use parking_lot::Mutex;
use std::sync::Arc;
use uuid::Uuid;

struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
    fn new() -> Arc<Self> {
        Arc::new(Self(Mutex::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        )))
    }

    fn advance_ms(&self, ms: i64) {
        *self.0.lock() += Duration::milliseconds(ms);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock()
    }
}

fn backends(clock: &Arc<ManualClock>) -> Vec<(&'static str, Box<dyn OrganizationRepository>)> {
    let memory: Box<dyn OrganizationRepository> =
        Box::new(MemoryOrganizationRepository::with_clock(clock.clone()));
    let sqlite: Box<dyn OrganizationRepository> = Box::new(
        SqliteOrganizationRepository::with_clock(open_db_in_memory().unwrap(), clock.clone())
            .unwrap(),
    );
    vec![("memory", memory), ("sqlite", sqlite)]
}

fn full_request() -> CreateOrganization {
    let mut address = AddressInput::new(AddressType::Legal);
    address.country = "DE".to_string();
    address.city = "Berlin".to_string();

    let mut contact = ContactInput::new(ContactType::Email, "ops@acme.test");
    contact.is_primary = true;

    CreateOrganization {
        tenant_id: Some(Uuid::new_v4()),
        name: "  Acme GmbH  ".to_string(),
        legal_code: Some("HRB-1".to_string()),
        status: Some(" INACTIVE ".to_string()),
        tags: vec!["Partner".to_string(), "eu".to_string()],
        addresses: vec![address],
        contacts: vec![
            contact,
            ContactInput::new(ContactType::Phone, "+49 30 1234"),
        ],
    }
}

#[test]
fn create_and_get_roundtrip_on_every_backend() {
    let clock = ManualClock::new();
    let actor = Uuid::new_v4();

    for (backend, repo) in backends(&clock) {
        let ctx = OpContext::new().with_actor(actor);
        let req = full_request();
        let created = repo.create(&ctx, &req).unwrap();

        assert_eq!(created.name, "Acme GmbH", "{backend}");
        assert_eq!(created.status, OrganizationStatus::Inactive, "{backend}");
        assert_eq!(created.tenant_id, req.tenant_id, "{backend}");
        assert_eq!(created.tags, vec!["Partner", "eu"], "{backend}");
        assert_eq!(created.created_at, created.updated_at, "{backend}");
        assert_eq!(created.created_by, Some(actor), "{backend}");
        assert_eq!(created.updated_by, Some(actor), "{backend}");
        assert!(created.deleted_at.is_none(), "{backend}");

        assert_eq!(created.addresses.len(), 1, "{backend}");
        assert_eq!(created.addresses[0].organization_id, created.id, "{backend}");
        assert_eq!(created.addresses[0].city, "Berlin", "{backend}");
        assert_eq!(created.contacts.len(), 2, "{backend}");
        assert_eq!(created.contacts[0].value, "ops@acme.test", "{backend}");
        assert!(created.contacts[0].is_primary, "{backend}");
        assert_eq!(created.contacts[1].kind, ContactType::Phone, "{backend}");

        let loaded = repo.get(&ctx, created.id).unwrap();
        assert_eq!(loaded, Some(created), "{backend}");
    }
}

#[test]
fn missing_status_defaults_to_active_and_unknown_status_normalizes() {
    let clock = ManualClock::new();

    for (backend, repo) in backends(&clock) {
        let ctx = OpContext::new();
        let defaulted = repo
            .create(&ctx, &CreateOrganization::named("Plain"))
            .unwrap();
        assert_eq!(defaulted.status, OrganizationStatus::Active, "{backend}");

        let mut req = CreateOrganization::named("Odd");
        req.status = Some("suspended".to_string());
        let odd = repo.create(&ctx, &req).unwrap();
        assert_eq!(odd.status, OrganizationStatus::Active, "{backend}");
    }
}

#[test]
fn create_rejects_blank_name_without_storing_anything() {
    let clock = ManualClock::new();

    for (backend, repo) in backends(&clock) {
        let ctx = OpContext::new();
        let err = repo
            .create(&ctx, &CreateOrganization::named("   "))
            .unwrap_err();
        assert!(
            matches!(err, RepoError::Validation(ValidationError::EmptyName)),
            "{backend}: {err}"
        );

        let page = repo.list(&ctx, &Default::default()).unwrap();
        assert_eq!(page.total, 0, "{backend}");
    }
}

#[test]
fn get_unknown_id_is_not_found() {
    let clock = ManualClock::new();

    for (backend, repo) in backends(&clock) {
        let found = repo.get(&OpContext::new(), Uuid::new_v4()).unwrap();
        assert!(found.is_none(), "{backend}");
    }
}

#[test]
fn soft_delete_hides_entity_and_restore_reinstates_it() {
    let clock = ManualClock::new();
    let deleter = Uuid::new_v4();
    let restorer = Uuid::new_v4();

    for (backend, repo) in backends(&clock) {
        let ctx = OpContext::new();
        let created = repo.create(&ctx, &full_request()).unwrap();

        clock.advance_ms(10);
        let deleted = repo
            .soft_delete(&OpContext::new().with_actor(deleter), created.id)
            .unwrap()
            .unwrap();
        assert!(deleted.deleted_at.is_some(), "{backend}");
        assert!(deleted.updated_at > created.updated_at, "{backend}");
        assert_eq!(deleted.updated_by, Some(deleter), "{backend}");
        assert_eq!(deleted.addresses, created.addresses, "{backend}");

        assert!(repo.get(&ctx, created.id).unwrap().is_none(), "{backend}");
        assert_eq!(repo.list(&ctx, &Default::default()).unwrap().total, 0);
        assert!(
            repo.soft_delete(&ctx, created.id).unwrap().is_none(),
            "{backend}: second delete must be a no-op"
        );
        assert!(
            repo.patch(&ctx, created.id, &PatchOrganization::default())
                .unwrap()
                .is_none(),
            "{backend}: tombstoned entity must not be patched"
        );

        clock.advance_ms(10);
        let restored = repo
            .restore(&OpContext::new().with_actor(restorer), created.id)
            .unwrap()
            .unwrap();
        assert!(restored.deleted_at.is_none(), "{backend}");
        assert!(restored.updated_at > deleted.updated_at, "{backend}");
        assert_eq!(restored.updated_by, Some(restorer), "{backend}");
        assert_eq!(restored.created_at, created.created_at, "{backend}");
        assert_eq!(repo.get(&ctx, created.id).unwrap(), Some(restored));

        assert!(
            repo.restore(&ctx, created.id).unwrap().is_none(),
            "{backend}: restoring an active entity is not found"
        );
        assert!(repo.restore(&ctx, Uuid::new_v4()).unwrap().is_none());
    }
}

#[test]
fn replace_overwrites_every_field_and_clears_omitted_owned_records() {
    let clock = ManualClock::new();

    for (backend, repo) in backends(&clock) {
        let ctx = OpContext::new();
        let created = repo.create(&ctx, &full_request()).unwrap();

        clock.advance_ms(5);
        let replaced = repo
            .replace(
                &ctx,
                created.id,
                &ReplaceOrganization {
                    tenant_id: None,
                    name: " Acme AG ".to_string(),
                    legal_code: None,
                    status: "Blocked".to_string(),
                    tags: Vec::new(),
                    addresses: Vec::new(),
                    contacts: vec![ContactInput::new(ContactType::Phone, "+41")],
                },
            )
            .unwrap()
            .unwrap();

        assert_eq!(replaced.id, created.id, "{backend}");
        assert_eq!(replaced.name, "Acme AG", "{backend}");
        assert_eq!(replaced.tenant_id, None, "{backend}");
        assert_eq!(replaced.legal_code, None, "{backend}");
        assert_eq!(replaced.status, OrganizationStatus::Blocked, "{backend}");
        assert!(replaced.tags.is_empty(), "{backend}");
        assert!(replaced.addresses.is_empty(), "{backend}");
        assert_eq!(replaced.contacts.len(), 1, "{backend}");
        assert_eq!(replaced.created_at, created.created_at, "{backend}");
        assert!(replaced.updated_at > created.updated_at, "{backend}");

        assert_eq!(repo.get(&ctx, created.id).unwrap(), Some(replaced));
    }
}

#[test]
fn replace_unknown_or_invalid_is_reported_distinctly() {
    let clock = ManualClock::new();

    for (backend, repo) in backends(&clock) {
        let ctx = OpContext::new();
        let valid = ReplaceOrganization {
            name: "Acme".to_string(),
            ..ReplaceOrganization::default()
        };
        assert!(
            repo.replace(&ctx, Uuid::new_v4(), &valid).unwrap().is_none(),
            "{backend}"
        );

        let created = repo.create(&ctx, &CreateOrganization::named("Acme")).unwrap();
        let err = repo
            .replace(&ctx, created.id, &ReplaceOrganization::default())
            .unwrap_err();
        assert!(matches!(err, RepoError::Validation(_)), "{backend}");
        assert_eq!(repo.get(&ctx, created.id).unwrap().unwrap().name, "Acme");
    }
}

#[test]
fn patch_distinguishes_absent_null_and_value() {
    let clock = ManualClock::new();

    for (backend, repo) in backends(&clock) {
        let ctx = OpContext::new();
        let created = repo.create(&ctx, &full_request()).unwrap();
        let tenant = created.tenant_id;

        let renamed = repo
            .patch(
                &ctx,
                created.id,
                &PatchOrganization {
                    name: Some("  Renamed ".to_string()),
                    ..PatchOrganization::default()
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(renamed.name, "Renamed", "{backend}");
        assert_eq!(renamed.legal_code.as_deref(), Some("HRB-1"), "{backend}");
        assert_eq!(renamed.tenant_id, tenant, "{backend}");
        assert_eq!(renamed.tags, created.tags, "{backend}");
        assert_eq!(renamed.addresses, created.addresses, "{backend}");
        assert_eq!(renamed.contacts, created.contacts, "{backend}");

        let cleared = repo
            .patch(
                &ctx,
                created.id,
                &PatchOrganization {
                    legal_code: Patch::Null,
                    tenant_id: Patch::Null,
                    ..PatchOrganization::default()
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(cleared.legal_code, None, "{backend}");
        assert_eq!(cleared.tenant_id, None, "{backend}");
        assert_eq!(cleared.name, "Renamed", "{backend}");

        let new_tenant = Uuid::new_v4();
        let set = repo
            .patch(
                &ctx,
                created.id,
                &PatchOrganization {
                    legal_code: Patch::Value("HRB-2".to_string()),
                    tenant_id: Patch::Value(new_tenant),
                    status: Some("BLOCKED".to_string()),
                    tags: Some(Vec::new()),
                    addresses: Some(Vec::new()),
                    ..PatchOrganization::default()
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(set.legal_code.as_deref(), Some("HRB-2"), "{backend}");
        assert_eq!(set.tenant_id, Some(new_tenant), "{backend}");
        assert_eq!(set.status, OrganizationStatus::Blocked, "{backend}");
        assert!(set.tags.is_empty(), "{backend}");
        assert!(set.addresses.is_empty(), "{backend}");
        assert_eq!(set.contacts.len(), 2, "{backend}");

        assert_eq!(repo.get(&ctx, created.id).unwrap(), Some(set));
    }
}

#[test]
fn patch_parsed_from_json_respects_tri_state() {
    let clock = ManualClock::new();

    for (backend, repo) in backends(&clock) {
        let ctx = OpContext::new();
        let created = repo.create(&ctx, &full_request()).unwrap();

        let untouched: PatchOrganization = serde_json::from_str(r#"{"status":"active"}"#).unwrap();
        let patched = repo.patch(&ctx, created.id, &untouched).unwrap().unwrap();
        assert_eq!(patched.legal_code.as_deref(), Some("HRB-1"), "{backend}");

        let nulled: PatchOrganization = serde_json::from_str(r#"{"legalCode":null}"#).unwrap();
        let patched = repo.patch(&ctx, created.id, &nulled).unwrap().unwrap();
        assert_eq!(patched.legal_code, None, "{backend}");
        assert_eq!(patched.status, OrganizationStatus::Active, "{backend}");
    }
}

#[test]
fn empty_patch_refreshes_audit_fields_only() {
    let clock = ManualClock::new();
    let editor = Uuid::new_v4();

    for (backend, repo) in backends(&clock) {
        let created = repo
            .create(&OpContext::new(), &full_request())
            .unwrap();

        clock.advance_ms(7);
        let patched = repo
            .patch(
                &OpContext::new().with_actor(editor),
                created.id,
                &PatchOrganization::default(),
            )
            .unwrap()
            .unwrap();
        assert_eq!(
            patched.updated_at,
            created.updated_at + Duration::milliseconds(7),
            "{backend}"
        );
        assert_eq!(patched.updated_by, Some(editor), "{backend}");
        assert_eq!(patched.name, created.name, "{backend}");
        assert!(repo
            .patch(&OpContext::new(), Uuid::new_v4(), &PatchOrganization::default())
            .unwrap()
            .is_none());
    }
}

#[test]
fn patch_with_blank_name_is_rejected() {
    let clock = ManualClock::new();

    for (backend, repo) in backends(&clock) {
        let ctx = OpContext::new();
        let created = repo.create(&ctx, &CreateOrganization::named("Acme")).unwrap();
        let err = repo
            .patch(
                &ctx,
                created.id,
                &PatchOrganization {
                    name: Some(" ".to_string()),
                    ..PatchOrganization::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, RepoError::Validation(_)), "{backend}");
    }
}

#[test]
fn updated_at_never_moves_backwards() {
    let clock = ManualClock::new();

    for (backend, repo) in backends(&clock) {
        let ctx = OpContext::new();
        clock.advance_ms(1_000);
        let created = repo.create(&ctx, &CreateOrganization::named("Acme")).unwrap();

        clock.advance_ms(-500);
        let patched = repo
            .patch(&ctx, created.id, &PatchOrganization::default())
            .unwrap()
            .unwrap();
        assert_eq!(patched.updated_at, created.updated_at, "{backend}");
        clock.advance_ms(500);
    }
}

#[test]
fn owned_records_keep_caller_supplied_ids() {
    let clock = ManualClock::new();

    for (backend, repo) in backends(&clock) {
        let ctx = OpContext::new();
        let address_id = Uuid::new_v4();
        let mut address = AddressInput::new(AddressType::Shipping);
        address.id = Some(address_id);

        let mut req = CreateOrganization::named("Acme");
        req.addresses = vec![address, AddressInput::new(AddressType::Actual)];
        let created = repo.create(&ctx, &req).unwrap();

        assert_eq!(created.addresses[0].id, address_id, "{backend}");
        assert_eq!(created.addresses[0].kind, AddressType::Shipping, "{backend}");
        assert_ne!(created.addresses[1].id, Uuid::nil(), "{backend}");
        assert_eq!(created.addresses[1].kind, AddressType::Actual, "{backend}");
    }
}

#[test]
fn repeated_owned_ids_in_one_request_are_rejected_before_storage() {
    let clock = ManualClock::new();

    for (backend, repo) in backends(&clock) {
        let ctx = OpContext::new();
        let fixed = Uuid::new_v4();
        let mut address = AddressInput::new(AddressType::Legal);
        address.id = Some(fixed);
        let mut contact = ContactInput::new(ContactType::Phone, "+49 30 1234");
        contact.id = Some(fixed);

        let mut req = CreateOrganization::named("Acme");
        req.addresses = vec![address.clone(), address.clone()];
        let err = repo.create(&ctx, &req).unwrap_err();
        assert!(
            matches!(
                err,
                RepoError::Validation(ValidationError::DuplicateOwnedId {
                    field: "addresses",
                    ..
                })
            ),
            "{backend}: {err}"
        );
        assert_eq!(repo.list(&ctx, &Default::default()).unwrap().total, 0);

        let existing = repo.create(&ctx, &full_request()).unwrap();
        let replace = ReplaceOrganization {
            name: "Acme".to_string(),
            contacts: vec![contact.clone(), contact.clone()],
            ..ReplaceOrganization::default()
        };
        let err = repo.replace(&ctx, existing.id, &replace).unwrap_err();
        assert!(matches!(err, RepoError::Validation(_)), "{backend}: {err}");

        let patch = PatchOrganization {
            addresses: Some(vec![address.clone(), address]),
            ..PatchOrganization::default()
        };
        let err = repo.patch(&ctx, existing.id, &patch).unwrap_err();
        assert!(matches!(err, RepoError::Validation(_)), "{backend}: {err}");

        assert_eq!(repo.get(&ctx, existing.id).unwrap(), Some(existing), "{backend}");
    }
}

#[test]
fn owned_ids_may_repeat_across_organizations() {
    let clock = ManualClock::new();

    for (backend, repo) in backends(&clock) {
        let ctx = OpContext::new();
        let first = repo.create(&ctx, &full_request()).unwrap();
        let second = repo.create(&ctx, &CreateOrganization::named("Other")).unwrap();

        let reused = first.addresses[0].id;
        let mut address = AddressInput::new(AddressType::Actual);
        address.id = Some(reused);
        let replace = ReplaceOrganization {
            name: "Other".to_string(),
            addresses: vec![address],
            ..ReplaceOrganization::default()
        };
        let replaced = repo.replace(&ctx, second.id, &replace).unwrap().unwrap();
        assert_eq!(replaced.addresses[0].id, reused, "{backend}");
        assert_eq!(replaced.addresses[0].organization_id, second.id, "{backend}");

        let untouched = repo.get(&ctx, first.id).unwrap().unwrap();
        assert_eq!(untouched.addresses, first.addresses, "{backend}");
        assert_eq!(untouched.addresses[0].organization_id, first.id, "{backend}");
    }
}
