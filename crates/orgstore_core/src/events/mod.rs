//! Organization domain events.
//!
//! # Responsibility
//! - Define the event shape emitted after successful mutations.
//! - Define the publisher seam the service talks to.
//!
//! # Invariants
//! - Payloads are flat camelCase JSON records.
//! - `occurredAt` is the organization's `updated_at` in RFC 3339.
//! - Publishing never mutates storage.

use crate::config::EventsConfig;
use crate::model::organization::{Address, Contact, Organization, OrganizationId};
use chrono::SecondsFormat;
use log::info;
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use uuid::Uuid;

/// Event kind; selects the routing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrganizationEventKind {
    Created,
    Updated,
    Deleted,
}

impl OrganizationEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        }
    }
}

/// Serialized event body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationEventPayload {
    pub id: OrganizationId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<Uuid>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub legal_code: Option<String>,
    pub status: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<Address>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub contacts: Vec<Contact>,
    pub occurred_at: String,
    pub trace_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub schema_version: String,
}

impl OrganizationEventPayload {
    pub fn from_organization(org: &Organization, trace_id: &str, schema_version: &str) -> Self {
        Self {
            id: org.id,
            tenant_id: org.tenant_id,
            name: org.name.clone(),
            legal_code: org.legal_code.clone(),
            status: org.status.as_str().to_string(),
            tags: org.tags.clone(),
            addresses: org.addresses.clone(),
            contacts: org.contacts.clone(),
            occurred_at: org.updated_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            trace_id: trace_id.to_string(),
            schema_version: schema_version.to_string(),
        }
    }
}

/// One domain event, ready for a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrganizationEvent {
    pub kind: OrganizationEventKind,
    pub exchange: String,
    pub routing_key: String,
    pub payload: OrganizationEventPayload,
}

impl OrganizationEvent {
    /// Builds an event for `org`, taking routing and versioning from `config`.
    pub fn new(
        kind: OrganizationEventKind,
        org: &Organization,
        trace_id: &str,
        config: &EventsConfig,
    ) -> Self {
        let routing_key = match kind {
            OrganizationEventKind::Created => &config.routing_keys.created,
            OrganizationEventKind::Updated => &config.routing_keys.updated,
            OrganizationEventKind::Deleted => &config.routing_keys.deleted,
        };
        Self {
            kind,
            exchange: config.exchange.clone(),
            routing_key: routing_key.clone(),
            payload: OrganizationEventPayload::from_organization(
                org,
                trace_id,
                &config.schema_version,
            ),
        }
    }

    /// JSON body for transports.
    pub fn to_json(&self) -> Result<String, PublishError> {
        serde_json::to_string(&self.payload).map_err(PublishError::Encode)
    }
}

#[derive(Debug)]
pub enum PublishError {
    Encode(serde_json::Error),
    /// Transport rejected or failed to deliver the event.
    Transport(String),
}

impl Display for PublishError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Encode(err) => write!(f, "failed to encode event payload: {err}"),
            Self::Transport(message) => write!(f, "event transport failed: {message}"),
        }
    }
}

impl Error for PublishError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Encode(err) => Some(err),
            Self::Transport(_) => None,
        }
    }
}

/// Outbound seam for domain events.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: &OrganizationEvent) -> Result<(), PublishError>;
}

impl<P: EventPublisher + ?Sized> EventPublisher for Box<P> {
    fn publish(&self, event: &OrganizationEvent) -> Result<(), PublishError> {
        (**self).publish(event)
    }
}

impl<P: EventPublisher + ?Sized> EventPublisher for Arc<P> {
    fn publish(&self, event: &OrganizationEvent) -> Result<(), PublishError> {
        (**self).publish(event)
    }
}

/// Publisher used when no broker is configured: events go to the log only.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogPublisher;

impl EventPublisher for LogPublisher {
    fn publish(&self, event: &OrganizationEvent) -> Result<(), PublishError> {
        let body = event.to_json()?;
        info!(
            "event=org_event module=events status=ok exchange={} routing_key={} org_id={} trace_id={} bytes={}",
            event.exchange,
            event.routing_key,
            event.payload.id,
            event.payload.trace_id,
            body.len()
        );
        Ok(())
    }
}
