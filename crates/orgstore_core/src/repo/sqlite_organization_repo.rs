//! SQLite implementation of the organization repository.
//!
//! # Responsibility
//! - Execute the repository contract against the migrated SQLite schema.
//! - Keep every SQL statement inside the persistence boundary.
//!
//! # Invariants
//! - Multi-row writes run in one immediate transaction; any failure rolls back.
//! - Read paths filter `deleted_at IS NULL` in SQL, never after the fact.
//! - Owned addresses/contacts are replaced wholesale (delete, then insert).
//! - `updated_at` is written as `MAX(updated_at, now)` and never decreases.
//! - A cancelled context interrupts the running statement via the progress handler.

use crate::context::{now_millis, system_clock, OpContext, SharedClock};
use crate::db::migrations::latest_version;
use crate::db::register_sql_functions;
use crate::model::organization::{
    ActorId, Address, AddressInput, AddressType, Contact, ContactInput, ContactType,
    CreateOrganization, Organization, OrganizationId, OrganizationStatus, PatchOrganization,
    ReplaceOrganization,
};
use crate::model::patch::Patch;
use crate::model::query::{
    normalize_limit, ListPage, ListQuery, MemberPage, NormalizedListQuery, SortDirection,
    SortField,
};
use crate::repo::organization_repo::{
    ensure_not_cancelled, OrganizationRepository, RepoError, RepoResult,
};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row, TransactionBehavior};
use std::ops::{Deref, DerefMut};
use std::panic::AssertUnwindSafe;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const ORGANIZATION_SELECT_SQL: &str = "SELECT
    id,
    tenant_id,
    name,
    legal_code,
    status,
    tags,
    created_at,
    updated_at,
    deleted_at,
    created_by,
    updated_by
FROM organizations";

/// Virtual machine instructions between cancellation checks.
const PROGRESS_HANDLER_OPS: i32 = 1_000;

/// SQLite-backed organization repository.
///
/// The connection is serialized behind a mutex, so one repository can be
/// shared by any number of callers.
pub struct SqliteOrganizationRepository {
    conn: Mutex<Connection>,
    clock: SharedClock,
}

impl SqliteOrganizationRepository {
    /// Constructs a repository from a migrated/ready connection.
    pub fn try_new(conn: Connection) -> RepoResult<Self> {
        Self::with_clock(conn, system_clock())
    }

    /// Same as `try_new`, stamping timestamps from `clock`.
    pub fn with_clock(conn: Connection, clock: SharedClock) -> RepoResult<Self> {
        ensure_organization_connection_ready(&conn)?;
        // Connections not opened through `open_db` lack `fold()`.
        register_sql_functions(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            clock,
        })
    }

    fn now_ms(&self) -> i64 {
        now_millis(self.clock.as_ref()).timestamp_millis()
    }

    fn run<T>(
        &self,
        ctx: &OpContext,
        operation: &'static str,
        body: impl FnOnce(&mut Connection) -> RepoResult<T>,
    ) -> RepoResult<T> {
        ensure_not_cancelled(ctx)?;
        let mut conn = CancellableConnection::new(self.conn.lock(), &ctx.cancel);
        body(&mut *conn).map_err(|err| err.during(operation))
    }
}

impl OrganizationRepository for SqliteOrganizationRepository {
    fn create(&self, ctx: &OpContext, req: &CreateOrganization) -> RepoResult<Organization> {
        req.validate()?;

        self.run(ctx, "create", |conn| {
            let id = Uuid::new_v4();
            let now = self.now_ms();
            let actor = actor_text(ctx.actor);
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            tx.execute(
                "INSERT INTO organizations (
                    id,
                    tenant_id,
                    name,
                    legal_code,
                    status,
                    tags,
                    created_at,
                    updated_at,
                    deleted_at,
                    created_by,
                    updated_by
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7, NULL, ?8, ?8);",
                params![
                    id.to_string(),
                    req.tenant_id.map(|value| value.to_string()),
                    req.name.trim(),
                    req.legal_code.as_deref(),
                    req.normalized_status().as_str(),
                    encode_tags(&req.tags)?,
                    now,
                    actor,
                ],
            )?;
            replace_addresses(&tx, id, &req.addresses)?;
            replace_contacts(&tx, id, &req.contacts)?;

            let org = load_required_organization(&tx, id)?;
            tx.commit()?;
            Ok(org)
        })
    }

    fn get(&self, ctx: &OpContext, id: OrganizationId) -> RepoResult<Option<Organization>> {
        self.run(ctx, "get", |conn| {
            // Header and owned rows are read from one snapshot, so a tombstone
            // landing between the two reads cannot leak a deleted aggregate.
            let tx = conn.transaction()?;
            let org = load_organization(&tx, id, false)?;
            tx.commit()?;
            Ok(org)
        })
    }

    fn list(&self, ctx: &OpContext, query: &ListQuery) -> RepoResult<ListPage> {
        let query = query.normalized();
        let (where_sql, bind_values) = build_list_filter(&query);
        let order_sql = build_list_order(&query);

        self.run(ctx, "list", |conn| {
            let tx = conn.transaction()?;

            let total: i64 = tx.query_row(
                &format!("SELECT COUNT(*) FROM organizations WHERE {where_sql};"),
                params_from_iter(bind_values.iter()),
                |row| row.get(0),
            )?;

            let mut page_values = bind_values.clone();
            page_values.push(Value::Integer(i64::from(query.limit)));
            page_values.push(Value::Integer(i64::from(query.offset)));

            let mut items = Vec::new();
            {
                let mut stmt = tx.prepare(&format!(
                    "{ORGANIZATION_SELECT_SQL}
                     WHERE {where_sql}
                     ORDER BY {order_sql}
                     LIMIT ? OFFSET ?;"
                ))?;
                let mut rows = stmt.query(params_from_iter(page_values))?;
                while let Some(row) = rows.next()? {
                    let mut org = parse_organization_row(row)?;
                    load_owned(&tx, &mut org)?;
                    items.push(org);
                }
            }
            tx.commit()?;

            Ok(ListPage {
                items,
                total: u64::try_from(total).unwrap_or_default(),
                limit: query.limit,
                offset: query.offset,
            })
        })
    }

    fn replace(
        &self,
        ctx: &OpContext,
        id: OrganizationId,
        req: &ReplaceOrganization,
    ) -> RepoResult<Option<Organization>> {
        req.validate()?;

        self.run(ctx, "replace", |conn| {
            let now = self.now_ms();
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let changed = tx.execute(
                "UPDATE organizations
                 SET
                    tenant_id = ?2,
                    name = ?3,
                    legal_code = ?4,
                    status = ?5,
                    tags = ?6,
                    updated_at = MAX(updated_at, ?7),
                    updated_by = ?8
                 WHERE id = ?1
                   AND deleted_at IS NULL;",
                params![
                    id.to_string(),
                    req.tenant_id.map(|value| value.to_string()),
                    req.name.trim(),
                    req.legal_code.as_deref(),
                    req.normalized_status().as_str(),
                    encode_tags(&req.tags)?,
                    now,
                    actor_text(ctx.actor),
                ],
            )?;
            if changed == 0 {
                return Ok(None);
            }

            replace_addresses(&tx, id, &req.addresses)?;
            replace_contacts(&tx, id, &req.contacts)?;

            let org = load_required_organization(&tx, id)?;
            tx.commit()?;
            Ok(Some(org))
        })
    }

    fn patch(
        &self,
        ctx: &OpContext,
        id: OrganizationId,
        req: &PatchOrganization,
    ) -> RepoResult<Option<Organization>> {
        req.validate()?;

        self.run(ctx, "patch", |conn| {
            let (mut assignments, mut bind_values) = build_patch_assignments(req)?;
            // Audit columns are always refreshed; with no touched scalar the
            // statement reduces to the existence/tombstone guard.
            assignments.push("updated_at = MAX(updated_at, ?)");
            bind_values.push(Value::Integer(self.now_ms()));
            assignments.push("updated_by = ?");
            bind_values.push(actor_text(ctx.actor).map_or(Value::Null, Value::Text));
            bind_values.push(Value::Text(id.to_string()));

            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let changed = tx.execute(
                &format!(
                    "UPDATE organizations SET {} WHERE id = ? AND deleted_at IS NULL;",
                    assignments.join(", ")
                ),
                params_from_iter(bind_values),
            )?;
            if changed == 0 {
                return Ok(None);
            }

            if let Some(addresses) = req.addresses.as_deref() {
                replace_addresses(&tx, id, addresses)?;
            }
            if let Some(contacts) = req.contacts.as_deref() {
                replace_contacts(&tx, id, contacts)?;
            }

            let org = load_required_organization(&tx, id)?;
            tx.commit()?;
            Ok(Some(org))
        })
    }

    fn soft_delete(
        &self,
        ctx: &OpContext,
        id: OrganizationId,
    ) -> RepoResult<Option<Organization>> {
        self.run(ctx, "soft_delete", |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let changed = tx.execute(
                "UPDATE organizations
                 SET
                    deleted_at = ?2,
                    updated_at = MAX(updated_at, ?2),
                    updated_by = ?3
                 WHERE id = ?1
                   AND deleted_at IS NULL;",
                params![id.to_string(), self.now_ms(), actor_text(ctx.actor)],
            )?;
            if changed == 0 {
                return Ok(None);
            }

            let snapshot = load_organization(&tx, id, true)?;
            tx.commit()?;
            Ok(snapshot)
        })
    }

    fn restore(&self, ctx: &OpContext, id: OrganizationId) -> RepoResult<Option<Organization>> {
        self.run(ctx, "restore", |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let changed = tx.execute(
                "UPDATE organizations
                 SET
                    deleted_at = NULL,
                    updated_at = MAX(updated_at, ?2),
                    updated_by = ?3
                 WHERE id = ?1
                   AND deleted_at IS NOT NULL;",
                params![id.to_string(), self.now_ms(), actor_text(ctx.actor)],
            )?;
            if changed == 0 {
                return Ok(None);
            }

            let org = load_required_organization(&tx, id)?;
            tx.commit()?;
            Ok(Some(org))
        })
    }

    fn add_member(
        &self,
        ctx: &OpContext,
        org_id: OrganizationId,
        user_id: Uuid,
    ) -> RepoResult<bool> {
        self.run(ctx, "add_member", |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            if !organization_is_active(&tx, org_id)? {
                return Ok(false);
            }

            tx.execute(
                "INSERT INTO org_members (user_id, org_id)
                 VALUES (?1, ?2)
                 ON CONFLICT (user_id, org_id) DO NOTHING;",
                params![user_id.to_string(), org_id.to_string()],
            )?;
            tx.commit()?;
            Ok(true)
        })
    }

    fn remove_member(
        &self,
        ctx: &OpContext,
        org_id: OrganizationId,
        user_id: Uuid,
    ) -> RepoResult<bool> {
        self.run(ctx, "remove_member", |conn| {
            let removed = conn.execute(
                "DELETE FROM org_members WHERE user_id = ?1 AND org_id = ?2;",
                params![user_id.to_string(), org_id.to_string()],
            )?;
            Ok(removed > 0)
        })
    }

    fn list_members(
        &self,
        ctx: &OpContext,
        org_id: OrganizationId,
        limit: Option<u32>,
        offset: u32,
    ) -> RepoResult<MemberPage> {
        let limit = normalize_limit(limit);

        self.run(ctx, "list_members", |conn| {
            let tx = conn.transaction()?;
            let org_text = org_id.to_string();
            let total: i64 = tx.query_row(
                "SELECT COUNT(*) FROM org_members WHERE org_id = ?1;",
                [org_text.as_str()],
                |row| row.get(0),
            )?;

            let mut user_ids = Vec::new();
            {
                let mut stmt = tx.prepare(
                    "SELECT user_id
                     FROM org_members
                     WHERE org_id = ?1
                     ORDER BY user_id ASC
                     LIMIT ?2 OFFSET ?3;",
                )?;
                let mut rows =
                    stmt.query(params![org_text, i64::from(limit), i64::from(offset)])?;
                while let Some(row) = rows.next()? {
                    let text: String = row.get(0)?;
                    user_ids.push(parse_uuid(&text, "org_members.user_id")?);
                }
            }
            tx.commit()?;

            Ok(MemberPage {
                organization_id: org_id,
                user_ids,
                total: u64::try_from(total).unwrap_or_default(),
                limit,
                offset,
            })
        })
    }
}

/// Locked connection with a cancellation-aware progress handler installed.
struct CancellableConnection<'a> {
    conn: MutexGuard<'a, Connection>,
}

impl<'a> CancellableConnection<'a> {
    fn new(conn: MutexGuard<'a, Connection>, cancel: &CancellationToken) -> Self {
        let cancel = AssertUnwindSafe(cancel.clone());
        conn.progress_handler(PROGRESS_HANDLER_OPS, Some(move || cancel.is_cancelled()));
        Self { conn }
    }
}

impl Deref for CancellableConnection<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.conn
    }
}

impl DerefMut for CancellableConnection<'_> {
    fn deref_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }
}

impl Drop for CancellableConnection<'_> {
    fn drop(&mut self) {
        self.conn.progress_handler(0, None::<fn() -> bool>);
    }
}

fn build_list_filter(query: &NormalizedListQuery) -> (String, Vec<Value>) {
    let mut clauses = vec!["deleted_at IS NULL".to_string()];
    let mut bind_values = Vec::new();

    if let Some(tenant_id) = query.tenant_id {
        clauses.push("tenant_id = ?".to_string());
        bind_values.push(Value::Text(tenant_id.to_string()));
    }

    if let Some(needle) = query.search.as_ref() {
        clauses.push(
            "(instr(fold(name), ?) > 0 OR instr(fold(COALESCE(legal_code, '')), ?) > 0)"
                .to_string(),
        );
        bind_values.push(Value::Text(needle.clone()));
        bind_values.push(Value::Text(needle.clone()));
    }

    if let Some(status) = query.status.as_ref() {
        clauses.push("status = ?".to_string());
        bind_values.push(Value::Text(status.clone()));
    }

    for tag in &query.tags {
        clauses.push(
            "EXISTS (
                SELECT 1
                FROM json_each(organizations.tags) AS tag
                WHERE fold(tag.value) = ?
            )"
            .to_string(),
        );
        bind_values.push(Value::Text(tag.clone()));
    }

    (clauses.join(" AND "), bind_values)
}

fn build_list_order(query: &NormalizedListQuery) -> String {
    let direction = match query.sort_direction {
        SortDirection::Asc => "ASC",
        SortDirection::Desc => "DESC",
    };
    match query.sort_field {
        SortField::Name => "fold(name) ASC, id ASC".to_string(),
        SortField::CreatedAt => format!("created_at {direction}, id ASC"),
        SortField::UpdatedAt => format!("updated_at {direction}, id ASC"),
    }
}

fn build_patch_assignments(
    req: &PatchOrganization,
) -> RepoResult<(Vec<&'static str>, Vec<Value>)> {
    let mut assignments = Vec::new();
    let mut bind_values = Vec::new();

    if let Some(value) = patch_value(req.tenant_id.as_ref(), |id| Value::Text(id.to_string())) {
        assignments.push("tenant_id = ?");
        bind_values.push(value);
    }
    if let Some(name) = req.name.as_deref() {
        assignments.push("name = ?");
        bind_values.push(Value::Text(name.trim().to_string()));
    }
    if let Some(value) = patch_value(req.legal_code.as_ref(), |code| Value::Text(code.clone())) {
        assignments.push("legal_code = ?");
        bind_values.push(value);
    }
    if let Some(status) = req.status.as_deref() {
        assignments.push("status = ?");
        bind_values.push(Value::Text(
            OrganizationStatus::normalize(status).as_str().to_string(),
        ));
    }
    if let Some(tags) = req.tags.as_deref() {
        assignments.push("tags = ?");
        bind_values.push(Value::Text(encode_tags(tags)?));
    }

    Ok((assignments, bind_values))
}

fn patch_value<T>(patch: Patch<&T>, to_value: impl FnOnce(&T) -> Value) -> Option<Value> {
    match patch {
        Patch::Unset => None,
        Patch::Null => Some(Value::Null),
        Patch::Value(value) => Some(to_value(value)),
    }
}

fn replace_addresses(
    conn: &Connection,
    org_id: OrganizationId,
    addresses: &[AddressInput],
) -> RepoResult<()> {
    let org_text = org_id.to_string();
    conn.execute(
        "DELETE FROM org_addresses WHERE organization_id = ?1;",
        [org_text.as_str()],
    )?;

    let mut stmt = conn.prepare(
        "INSERT INTO org_addresses (
            id,
            organization_id,
            position,
            type,
            country,
            region,
            city,
            street,
            zip
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9);",
    )?;
    for (position, input) in addresses.iter().enumerate() {
        let address = input.clone().into_address(org_id);
        stmt.execute(params![
            address.id.to_string(),
            org_text,
            i64::try_from(position).unwrap_or(i64::MAX),
            address.kind.as_str(),
            address.country,
            address.region,
            address.city,
            address.street,
            address.zip,
        ])?;
    }
    Ok(())
}

fn replace_contacts(
    conn: &Connection,
    org_id: OrganizationId,
    contacts: &[ContactInput],
) -> RepoResult<()> {
    let org_text = org_id.to_string();
    conn.execute(
        "DELETE FROM org_contacts WHERE organization_id = ?1;",
        [org_text.as_str()],
    )?;

    let mut stmt = conn.prepare(
        "INSERT INTO org_contacts (
            id,
            organization_id,
            position,
            type,
            value,
            is_primary
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
    )?;
    for (position, input) in contacts.iter().enumerate() {
        let contact = input.clone().into_contact(org_id);
        stmt.execute(params![
            contact.id.to_string(),
            org_text,
            i64::try_from(position).unwrap_or(i64::MAX),
            contact.kind.as_str(),
            contact.value,
            contact.is_primary,
        ])?;
    }
    Ok(())
}

fn load_organization(
    conn: &Connection,
    id: OrganizationId,
    include_deleted: bool,
) -> RepoResult<Option<Organization>> {
    let mut stmt = conn.prepare(&format!(
        "{ORGANIZATION_SELECT_SQL}
         WHERE id = ?1
           AND (?2 = 1 OR deleted_at IS NULL);"
    ))?;
    let mut rows = stmt.query(params![id.to_string(), include_deleted])?;
    let Some(row) = rows.next()? else {
        return Ok(None);
    };

    let mut org = parse_organization_row(row)?;
    load_owned(conn, &mut org)?;
    Ok(Some(org))
}

fn load_required_organization(conn: &Connection, id: OrganizationId) -> RepoResult<Organization> {
    load_organization(conn, id, false)?.ok_or_else(|| {
        RepoError::InvalidData(format!("organization {id} vanished inside its own write"))
    })
}

fn load_owned(conn: &Connection, org: &mut Organization) -> RepoResult<()> {
    org.addresses = load_addresses(conn, org.id)?;
    org.contacts = load_contacts(conn, org.id)?;
    Ok(())
}

fn load_addresses(conn: &Connection, org_id: OrganizationId) -> RepoResult<Vec<Address>> {
    let mut stmt = conn.prepare(
        "SELECT id, type, country, region, city, street, zip
         FROM org_addresses
         WHERE organization_id = ?1
         ORDER BY position ASC;",
    )?;
    let mut rows = stmt.query([org_id.to_string()])?;
    let mut addresses = Vec::new();
    while let Some(row) = rows.next()? {
        let id_text: String = row.get("id")?;
        let type_text: String = row.get("type")?;
        let kind = AddressType::parse(&type_text).ok_or_else(|| {
            RepoError::InvalidData(format!(
                "invalid address type `{type_text}` in org_addresses.type"
            ))
        })?;
        addresses.push(Address {
            id: parse_uuid(&id_text, "org_addresses.id")?,
            organization_id: org_id,
            kind,
            country: row.get("country")?,
            region: row.get("region")?,
            city: row.get("city")?,
            street: row.get("street")?,
            zip: row.get("zip")?,
        });
    }
    Ok(addresses)
}

fn load_contacts(conn: &Connection, org_id: OrganizationId) -> RepoResult<Vec<Contact>> {
    let mut stmt = conn.prepare(
        "SELECT id, type, value, is_primary
         FROM org_contacts
         WHERE organization_id = ?1
         ORDER BY position ASC;",
    )?;
    let mut rows = stmt.query([org_id.to_string()])?;
    let mut contacts = Vec::new();
    while let Some(row) = rows.next()? {
        let id_text: String = row.get("id")?;
        let type_text: String = row.get("type")?;
        let kind = ContactType::parse(&type_text).ok_or_else(|| {
            RepoError::InvalidData(format!(
                "invalid contact type `{type_text}` in org_contacts.type"
            ))
        })?;
        contacts.push(Contact {
            id: parse_uuid(&id_text, "org_contacts.id")?,
            organization_id: org_id,
            kind,
            value: row.get("value")?,
            is_primary: row.get("is_primary")?,
        });
    }
    Ok(contacts)
}

fn parse_organization_row(row: &Row<'_>) -> RepoResult<Organization> {
    let id_text: String = row.get("id")?;
    let status_text: String = row.get("status")?;
    let status = OrganizationStatus::parse(&status_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid status `{status_text}` in organizations.status"
        ))
    })?;
    let tags_text: String = row.get("tags")?;

    Ok(Organization {
        id: parse_uuid(&id_text, "organizations.id")?,
        tenant_id: parse_optional_uuid(row.get("tenant_id")?, "organizations.tenant_id")?,
        name: row.get("name")?,
        legal_code: row.get("legal_code")?,
        status,
        tags: decode_tags(&tags_text)?,
        addresses: Vec::new(),
        contacts: Vec::new(),
        created_at: from_millis(row.get("created_at")?, "organizations.created_at")?,
        updated_at: from_millis(row.get("updated_at")?, "organizations.updated_at")?,
        deleted_at: match row.get::<_, Option<i64>>("deleted_at")? {
            Some(value) => Some(from_millis(value, "organizations.deleted_at")?),
            None => None,
        },
        created_by: parse_optional_uuid(row.get("created_by")?, "organizations.created_by")?,
        updated_by: parse_optional_uuid(row.get("updated_by")?, "organizations.updated_by")?,
    })
}

fn organization_is_active(conn: &Connection, org_id: OrganizationId) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM organizations
            WHERE id = ?1
              AND deleted_at IS NULL
        );",
        [org_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn encode_tags(tags: &[String]) -> RepoResult<String> {
    serde_json::to_string(tags)
        .map_err(|err| RepoError::InvalidData(format!("cannot encode tags: {err}")))
}

fn decode_tags(value: &str) -> RepoResult<Vec<String>> {
    serde_json::from_str(value).map_err(|err| {
        RepoError::InvalidData(format!("invalid tags `{value}` in organizations.tags: {err}"))
    })
}

fn actor_text(actor: Option<ActorId>) -> Option<String> {
    actor.map(|value| value.to_string())
}

fn from_millis(value: i64, column: &'static str) -> RepoResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(value)
        .ok_or_else(|| RepoError::InvalidData(format!("invalid timestamp `{value}` in {column}")))
}

fn parse_uuid(value: &str, column: &'static str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}

fn parse_optional_uuid(value: Option<String>, column: &'static str) -> RepoResult<Option<Uuid>> {
    value.map(|text| parse_uuid(&text, column)).transpose()
}

fn ensure_organization_connection_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for table in ["organizations", "org_addresses", "org_contacts", "org_members"] {
        if !table_exists(conn, table)? {
            return Err(RepoError::MissingRequiredTable(table));
        }
    }

    for column in [
        "id",
        "tenant_id",
        "name",
        "legal_code",
        "status",
        "tags",
        "created_at",
        "updated_at",
        "deleted_at",
        "created_by",
        "updated_by",
    ] {
        if !table_has_column(conn, "organizations", column)? {
            return Err(RepoError::MissingRequiredColumn {
                table: "organizations",
                column,
            });
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> RepoResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::{build_list_filter, build_list_order, build_patch_assignments};
    use crate::model::organization::PatchOrganization;
    use crate::model::patch::Patch;
    use crate::model::query::ListQuery;
    use rusqlite::types::Value;

    #[test]
    fn patch_assignments_include_only_touched_columns() {
        let patch = PatchOrganization {
            legal_code: Patch::Null,
            status: Some("BLOCKED".to_string()),
            ..PatchOrganization::default()
        };
        let (assignments, values) = build_patch_assignments(&patch).unwrap();
        assert_eq!(assignments, vec!["legal_code = ?", "status = ?"]);
        assert_eq!(
            values,
            vec![Value::Null, Value::Text("blocked".to_string())]
        );

        let (untouched, none) = build_patch_assignments(&PatchOrganization::default()).unwrap();
        assert!(untouched.is_empty());
        assert!(none.is_empty());
    }

    #[test]
    fn list_filter_is_conjunctive_and_excludes_tombstones() {
        let query = ListQuery {
            search: Some("Acme".to_string()),
            status: Some("active".to_string()),
            tags: vec!["a".to_string(), "b".to_string()],
            ..ListQuery::default()
        }
        .normalized();
        let (sql, values) = build_list_filter(&query);
        assert!(sql.starts_with("deleted_at IS NULL AND "));
        assert_eq!(sql.matches(" AND ").count(), 4);
        assert_eq!(values.len(), 5);
        assert_eq!(values[0], Value::Text("acme".to_string()));
    }

    #[test]
    fn list_order_defaults_to_created_at_desc() {
        let query = ListQuery::default().normalized();
        assert_eq!(build_list_order(&query), "created_at DESC, id ASC");
    }
}
