//! Organization aggregate and request models.
//!
//! # Responsibility
//! - Define the canonical organization record and its owned sub-entities.
//! - Normalize raw status input and validate names before persistence.
//!
//! # Invariants
//! - `id` is generated server-side and never changes.
//! - `name` is stored trimmed and non-empty.
//! - Addresses and contacts always point at their parent `organization_id`.
//! - Owned record ids are unique within their parent, never across parents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

use crate::model::patch::Patch;

/// Stable organization identifier.
pub type OrganizationId = Uuid;

/// Identifier of the caller performing a mutation.
pub type ActorId = Uuid;

/// Lifecycle status of an organization, independent of tombstone state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrganizationStatus {
    #[default]
    Active,
    Inactive,
    Blocked,
}

impl OrganizationStatus {
    /// Maps raw input to a status. Blank or unrecognized input becomes `Active`.
    pub fn normalize(raw: &str) -> Self {
        Self::parse(raw).unwrap_or_default()
    }

    /// Strict parse used for persisted values.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "active" => Some(Self::Active),
            "inactive" => Some(Self::Inactive),
            "blocked" => Some(Self::Blocked),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Blocked => "blocked",
        }
    }
}

impl Display for OrganizationStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Address role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressType {
    Legal,
    Actual,
    Shipping,
}

impl AddressType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Legal => "legal",
            Self::Actual => "actual",
            Self::Shipping => "shipping",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "legal" => Some(Self::Legal),
            "actual" => Some(Self::Actual),
            "shipping" => Some(Self::Shipping),
            _ => None,
        }
    }
}

/// Contact channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactType {
    Email,
    Phone,
}

impl ContactType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Phone => "phone",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "email" => Some(Self::Email),
            "phone" => Some(Self::Phone),
            _ => None,
        }
    }
}

/// Address owned by one organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub id: Uuid,
    pub organization_id: OrganizationId,
    #[serde(rename = "type")]
    pub kind: AddressType,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub street: String,
    #[serde(default)]
    pub zip: String,
}

/// Contact owned by one organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: Uuid,
    pub organization_id: OrganizationId,
    #[serde(rename = "type")]
    pub kind: ContactType,
    pub value: String,
    #[serde(default)]
    pub is_primary: bool,
}

/// Canonical organization aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    pub id: OrganizationId,
    pub tenant_id: Option<Uuid>,
    pub name: String,
    pub legal_code: Option<String>,
    pub status: OrganizationStatus,
    pub tags: Vec<String>,
    pub addresses: Vec<Address>,
    pub contacts: Vec<Contact>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Soft delete tombstone. `Some` hides the entity from every read path.
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_by: Option<ActorId>,
    pub updated_by: Option<ActorId>,
}

impl Organization {
    /// Returns whether this organization is visible to read paths.
    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }
}

/// Address as supplied by a caller. A missing `id` is generated on write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressInput {
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(rename = "type")]
    pub kind: AddressType,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub street: String,
    #[serde(default)]
    pub zip: String,
}

impl AddressInput {
    pub fn new(kind: AddressType) -> Self {
        Self {
            id: None,
            kind,
            country: String::new(),
            region: String::new(),
            city: String::new(),
            street: String::new(),
            zip: String::new(),
        }
    }

    /// Materializes the owned record for `organization_id`.
    pub fn into_address(self, organization_id: OrganizationId) -> Address {
        Address {
            id: self.id.unwrap_or_else(Uuid::new_v4),
            organization_id,
            kind: self.kind,
            country: self.country,
            region: self.region,
            city: self.city,
            street: self.street,
            zip: self.zip,
        }
    }
}

/// Contact as supplied by a caller. A missing `id` is generated on write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactInput {
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(rename = "type")]
    pub kind: ContactType,
    pub value: String,
    #[serde(default)]
    pub is_primary: bool,
}

impl ContactInput {
    pub fn new(kind: ContactType, value: impl Into<String>) -> Self {
        Self {
            id: None,
            kind,
            value: value.into(),
            is_primary: false,
        }
    }

    pub fn into_contact(self, organization_id: OrganizationId) -> Contact {
        Contact {
            id: self.id.unwrap_or_else(Uuid::new_v4),
            organization_id,
            kind: self.kind,
            value: self.value,
            is_primary: self.is_primary,
        }
    }
}

/// Input for `create`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrganization {
    #[serde(default)]
    pub tenant_id: Option<Uuid>,
    pub name: String,
    #[serde(default)]
    pub legal_code: Option<String>,
    /// Raw status input; normalized on write.
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub addresses: Vec<AddressInput>,
    #[serde(default)]
    pub contacts: Vec<ContactInput>,
}

impl CreateOrganization {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Rejects input that must never reach storage.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_name(&self.name)?;
        validate_owned_ids(&self.addresses, &self.contacts)
    }

    pub fn normalized_status(&self) -> OrganizationStatus {
        self.status
            .as_deref()
            .map_or_else(OrganizationStatus::default, OrganizationStatus::normalize)
    }
}

/// Input for `replace`. Every field is overwritten, owned sequences included.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaceOrganization {
    #[serde(default)]
    pub tenant_id: Option<Uuid>,
    pub name: String,
    #[serde(default)]
    pub legal_code: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub addresses: Vec<AddressInput>,
    #[serde(default)]
    pub contacts: Vec<ContactInput>,
}

impl ReplaceOrganization {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_name(&self.name)?;
        validate_owned_ids(&self.addresses, &self.contacts)
    }

    pub fn normalized_status(&self) -> OrganizationStatus {
        OrganizationStatus::normalize(&self.status)
    }
}

/// Input for `patch`.
///
/// `tenant_id`/`legal_code` are tri-state. Sequence fields use `None` for
/// "leave unchanged" and `Some(vec![])` for "clear".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchOrganization {
    #[serde(default, skip_serializing_if = "Patch::is_unset")]
    pub tenant_id: Patch<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Patch::is_unset")]
    pub legal_code: Patch<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addresses: Option<Vec<AddressInput>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contacts: Option<Vec<ContactInput>>,
}

impl PatchOrganization {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(name) = self.name.as_deref() {
            validate_name(name)?;
        }
        validate_owned_ids(
            self.addresses.as_deref().unwrap_or_default(),
            self.contacts.as_deref().unwrap_or_default(),
        )
    }

    /// Applies this patch to an in-memory aggregate. Audit fields are left to the caller.
    pub fn apply_to(&self, org: &mut Organization) {
        self.tenant_id.clone().apply(&mut org.tenant_id);
        if let Some(name) = self.name.as_deref() {
            org.name = name.trim().to_string();
        }
        self.legal_code.clone().apply(&mut org.legal_code);
        if let Some(status) = self.status.as_deref() {
            org.status = OrganizationStatus::normalize(status);
        }
        if let Some(tags) = self.tags.as_ref() {
            org.tags = tags.clone();
        }
        if let Some(addresses) = self.addresses.as_ref() {
            org.addresses = addresses
                .iter()
                .cloned()
                .map(|input| input.into_address(org.id))
                .collect();
        }
        if let Some(contacts) = self.contacts.as_ref() {
            org.contacts = contacts
                .iter()
                .cloned()
                .map(|input| input.into_contact(org.id))
                .collect();
        }
    }
}

/// Input rejected before touching storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// `name` is missing or whitespace-only.
    EmptyName,
    /// Identifier text is not a UUID.
    MalformedId(String),
    /// The same owned record id appears twice in one sequence.
    DuplicateOwnedId { field: &'static str, id: Uuid },
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyName => write!(f, "organization name is required"),
            Self::MalformedId(value) => write!(f, "malformed identifier `{value}`"),
            Self::DuplicateOwnedId { field, id } => {
                write!(f, "duplicate id `{id}` in organization {field}")
            }
        }
    }
}

impl Error for ValidationError {}

/// Parses an organization identifier received as text.
pub fn parse_organization_id(raw: &str) -> Result<OrganizationId, ValidationError> {
    Uuid::parse_str(raw.trim()).map_err(|_| ValidationError::MalformedId(raw.to_string()))
}

fn validate_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::EmptyName);
    }
    Ok(())
}

fn validate_owned_ids(
    addresses: &[AddressInput],
    contacts: &[ContactInput],
) -> Result<(), ValidationError> {
    ensure_unique_ids("addresses", addresses.iter().filter_map(|address| address.id))?;
    ensure_unique_ids("contacts", contacts.iter().filter_map(|contact| contact.id))
}

fn ensure_unique_ids(
    field: &'static str,
    ids: impl Iterator<Item = Uuid>,
) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(ValidationError::DuplicateOwnedId { field, id });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{
        parse_organization_id, AddressInput, AddressType, ContactInput, ContactType,
        CreateOrganization, OrganizationStatus, PatchOrganization, ReplaceOrganization,
        ValidationError,
    };
    use uuid::Uuid;

    #[test]
    fn status_normalization_defaults_to_active() {
        assert_eq!(OrganizationStatus::normalize(""), OrganizationStatus::Active);
        assert_eq!(
            OrganizationStatus::normalize("BOGUS"),
            OrganizationStatus::Active
        );
        assert_eq!(
            OrganizationStatus::normalize(" Blocked "),
            OrganizationStatus::Blocked
        );
        assert_eq!(CreateOrganization::named("x").normalized_status(), OrganizationStatus::Active);
    }

    #[test]
    fn blank_names_are_rejected() {
        let err = CreateOrganization::named("   ").validate().unwrap_err();
        assert_eq!(err, ValidationError::EmptyName);

        let patch = PatchOrganization {
            name: Some("\t".to_string()),
            ..PatchOrganization::default()
        };
        assert_eq!(patch.validate().unwrap_err(), ValidationError::EmptyName);
        assert!(PatchOrganization::default().validate().is_ok());
    }

    #[test]
    fn address_input_keeps_supplied_id_and_stamps_parent() {
        let parent = Uuid::new_v4();
        let fixed = Uuid::new_v4();
        let mut input = AddressInput::new(AddressType::Legal);
        input.id = Some(fixed);

        let address = input.into_address(parent);
        assert_eq!(address.id, fixed);
        assert_eq!(address.organization_id, parent);

        let generated = AddressInput::new(AddressType::Shipping).into_address(parent);
        assert_ne!(generated.id, Uuid::nil());
    }

    #[test]
    fn repeated_owned_ids_are_rejected_per_sequence() {
        let shared = Uuid::new_v4();
        let mut address = AddressInput::new(AddressType::Legal);
        address.id = Some(shared);
        let mut contact = ContactInput::new(ContactType::Email, "ops@acme.test");
        contact.id = Some(shared);

        let mut create = CreateOrganization::named("Acme");
        create.addresses = vec![address.clone(), address.clone()];
        assert_eq!(
            create.validate().unwrap_err(),
            ValidationError::DuplicateOwnedId {
                field: "addresses",
                id: shared
            }
        );

        let replace = ReplaceOrganization {
            name: "Acme".to_string(),
            contacts: vec![contact.clone(), contact.clone()],
            ..ReplaceOrganization::default()
        };
        assert!(matches!(
            replace.validate(),
            Err(ValidationError::DuplicateOwnedId {
                field: "contacts",
                ..
            })
        ));

        let patch = PatchOrganization {
            addresses: Some(vec![address.clone(), address.clone()]),
            ..PatchOrganization::default()
        };
        assert!(patch.validate().is_err());

        // One id per sequence is fine, even when the two sequences share it.
        let mut single = CreateOrganization::named("Acme");
        single.addresses = vec![address, AddressInput::new(AddressType::Actual)];
        single.contacts = vec![contact];
        assert!(single.validate().is_ok());
    }

    #[test]
    fn malformed_identifier_is_a_validation_error() {
        assert!(matches!(
            parse_organization_id("not-a-uuid"),
            Err(ValidationError::MalformedId(_))
        ));
        let id = Uuid::new_v4();
        assert_eq!(parse_organization_id(&id.to_string()).unwrap(), id);
    }
}
