//! List query model shared by all storage adapters.
//!
//! # Responsibility
//! - Accept raw list parameters as received from outer layers.
//! - Produce one canonical normalized form that every adapter executes.
//!
//! # Invariants
//! - `limit` is clamped to `1..=200` and defaults to 50.
//! - Unknown sort keys fall back to `created_at`, unknown directions to desc.
//! - `name` always sorts ascending; ties are broken by `id` ascending.
//! - Case folding goes through `fold_case`, which SQLite also calls as `fold()`,
//!   so both adapters compare identical byte strings.

use crate::model::organization::{Organization, OrganizationId};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use uuid::Uuid;

pub const LIST_DEFAULT_LIMIT: u32 = 50;
pub const LIST_LIMIT_MAX: u32 = 200;

/// Sort key accepted by `list`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    Name,
    #[default]
    CreatedAt,
    UpdatedAt,
}

impl SortField {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "name" => Self::Name,
            "updatedat" | "updated_at" => Self::UpdatedAt,
            _ => Self::CreatedAt,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("asc") {
            Self::Asc
        } else {
            Self::Desc
        }
    }
}

/// Raw list parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    #[serde(default)]
    pub tenant_id: Option<Uuid>,
    /// Case-insensitive substring over `name` and `legal_code`.
    #[serde(default, rename = "q")]
    pub search: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    /// Every listed tag must be present on a match.
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub sort_by: Option<String>,
    #[serde(default)]
    pub sort_dir: Option<String>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub offset: u32,
}

impl ListQuery {
    pub fn normalized(&self) -> NormalizedListQuery {
        let sort_field = self
            .sort_by
            .as_deref()
            .map_or_else(SortField::default, SortField::parse);
        let sort_direction = match sort_field {
            SortField::Name => SortDirection::Asc,
            _ => self
                .sort_dir
                .as_deref()
                .map_or_else(SortDirection::default, SortDirection::parse),
        };

        NormalizedListQuery {
            tenant_id: self.tenant_id,
            search: non_blank_folded(self.search.as_deref()),
            status: non_blank_folded(self.status.as_deref()),
            tags: self
                .tags
                .iter()
                .filter_map(|tag| non_blank_folded(Some(tag)))
                .collect(),
            sort_field,
            sort_direction,
            limit: normalize_limit(self.limit),
            offset: self.offset,
        }
    }
}

/// Canonical list query; both adapters consume only this form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedListQuery {
    pub tenant_id: Option<Uuid>,
    /// Folded needle.
    pub search: Option<String>,
    /// Folded status filter.
    pub status: Option<String>,
    /// Folded required tags.
    pub tags: Vec<String>,
    pub sort_field: SortField,
    pub sort_direction: SortDirection,
    pub limit: u32,
    pub offset: u32,
}

impl NormalizedListQuery {
    /// In-memory evaluation of the filter predicate. Tombstones never match.
    pub fn matches(&self, org: &Organization) -> bool {
        if !org.is_active() {
            return false;
        }
        if let Some(tenant_id) = self.tenant_id {
            if org.tenant_id != Some(tenant_id) {
                return false;
            }
        }
        if let Some(needle) = self.search.as_deref() {
            let in_name = fold_case(&org.name).contains(needle);
            let in_code = org
                .legal_code
                .as_deref()
                .is_some_and(|code| fold_case(code).contains(needle));
            if !in_name && !in_code {
                return false;
            }
        }
        if let Some(status) = self.status.as_deref() {
            if org.status.as_str() != status {
                return false;
            }
        }
        self.tags
            .iter()
            .all(|wanted| org.tags.iter().any(|tag| fold_case(tag) == *wanted))
    }

    /// In-memory ordering matching the SQL `ORDER BY` clause.
    pub fn compare(&self, left: &Organization, right: &Organization) -> Ordering {
        let primary = match self.sort_field {
            SortField::Name => fold_case(&left.name).cmp(&fold_case(&right.name)),
            SortField::CreatedAt => left.created_at.cmp(&right.created_at),
            SortField::UpdatedAt => left.updated_at.cmp(&right.updated_at),
        };
        let primary = match self.sort_direction {
            SortDirection::Asc => primary,
            SortDirection::Desc => primary.reverse(),
        };
        primary.then_with(|| left.id.cmp(&right.id))
    }
}

/// One page of organizations plus the unpaginated match count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPage {
    pub items: Vec<Organization>,
    pub total: u64,
    /// Effective limit after clamping.
    pub limit: u32,
    pub offset: u32,
}

/// One page of organization members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberPage {
    pub organization_id: OrganizationId,
    pub user_ids: Vec<Uuid>,
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
}

/// Clamps a page size to `1..=LIST_LIMIT_MAX`; `None` and `0` use the default.
pub fn normalize_limit(limit: Option<u32>) -> u32 {
    match limit {
        Some(0) | None => LIST_DEFAULT_LIMIT,
        Some(value) if value > LIST_LIMIT_MAX => LIST_LIMIT_MAX,
        Some(value) => value,
    }
}

/// Splits the comma-separated `tags` query parameter.
pub fn parse_tag_filter(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}

/// Unicode lowercase used for every case-insensitive comparison.
pub fn fold_case(value: &str) -> String {
    value.to_lowercase()
}

fn non_blank_folded(value: Option<&str>) -> Option<String> {
    let trimmed = value?.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(fold_case(trimmed))
    }
}
