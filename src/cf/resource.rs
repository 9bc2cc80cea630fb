//! Resource records and server-side filters
//!
//! The v2 API wraps every record in a `metadata`/`entity` envelope and every
//! list response in a page envelope carrying a `next_url` continuation
//! reference. Typed accessors cover the fields the client inspects; the rest
//! of the entity stays available as raw JSON.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Record metadata shared by every collection.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Metadata {
    pub guid: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// A single resource record (org, space, app, service, ...).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Resource {
    pub metadata: Metadata,
    #[serde(default)]
    pub entity: Value,
}

/// One page of a list response.
#[derive(Debug, Deserialize)]
pub struct ResourcePage {
    #[serde(default)]
    pub resources: Vec<Resource>,
    #[serde(default)]
    pub next_url: Option<String>,
    #[serde(default)]
    pub total_results: Option<u64>,
}

/// State and type of the most recent broker operation on a service instance.
#[derive(Debug, Clone, Deserialize)]
pub struct LastOperation {
    #[serde(default)]
    pub state: String,
    #[serde(rename = "type", default)]
    pub operation_type: String,
}

/// Result of a service status query.
#[derive(Debug, Clone)]
pub struct ServiceStatus {
    pub name: String,
    pub state: String,
    pub operation_type: String,
}

/// Result of an app status query.
#[derive(Debug, Clone)]
pub struct AppStatus {
    pub name: String,
    pub state: String,
    pub guid: String,
}

/// How a service instance was provisioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    /// Provisioned through a broker plan.
    Managed,
    /// Credentials supplied directly by a user.
    UserProvided,
}

impl Resource {
    pub fn guid(&self) -> &str {
        &self.metadata.guid
    }

    pub fn url(&self) -> &str {
        &self.metadata.url
    }

    /// The record's `name` entity field, when present.
    pub fn name(&self) -> Option<&str> {
        self.entity.get("name").and_then(Value::as_str)
    }

    /// The record's `label` entity field (service brokers use `label`, not
    /// `name`).
    pub fn label(&self) -> Option<&str> {
        self.entity.get("label").and_then(Value::as_str)
    }

    pub fn state(&self) -> Option<&str> {
        self.entity.get("state").and_then(Value::as_str)
    }

    /// A named URL entity field, e.g. `service_bindings_url`.
    pub fn entity_url(&self, field: &str) -> Option<&str> {
        self.entity.get(field).and_then(Value::as_str)
    }

    pub fn last_operation(&self) -> Option<LastOperation> {
        let raw = self.entity.get("last_operation")?;
        serde_json::from_value(raw.clone()).ok()
    }

    /// Stored credentials on a service key or user-provided instance.
    pub fn credentials(&self) -> Option<&serde_json::Map<String, Value>> {
        self.entity.get("credentials").and_then(Value::as_object)
    }

    /// Distinguish managed from user-provided instances by schema, not by
    /// matching substrings against the serialized record.
    pub fn service_kind(&self) -> ServiceKind {
        if self.entity.get("service_plan_guid").is_some() {
            ServiceKind::Managed
        } else {
            ServiceKind::UserProvided
        }
    }

    /// A binding that carries a `port` credential fronts a network service
    /// (managed-database-style); ones without are plain secret stores.
    pub fn is_database_binding(&self) -> bool {
        self.credentials()
            .map(|c| c.contains_key("port"))
            .unwrap_or(false)
    }
}

/// Server-side query parameters for list endpoints.
///
/// Keys are unique and order-irrelevant. The `q` parameter uses the v2
/// `key:value` syntax for exact matches and comparison operators for ranges.
#[derive(Debug, Clone, Default)]
pub struct Filters(BTreeMap<String, String>);

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a raw query parameter.
    pub fn param(mut self, key: &str, value: impl Into<String>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    /// Set the `q` expression directly.
    pub fn query(self, expr: impl Into<String>) -> Self {
        self.param("q", expr)
    }

    /// Exact-match filter on the `name` field.
    pub fn name(name: &str) -> Self {
        Self::new().query(format!("name:{}", name))
    }

    /// Exact-match filter on the `label` field (service brokers).
    pub fn label(label: &str) -> Self {
        Self::new().query(format!("label:{}", label))
    }

    /// Restrict results to one space.
    pub fn space_guid(guid: &str) -> Self {
        Self::new().query(format!("space_guid:{}", guid))
    }

    /// Restrict results to one parent service.
    pub fn service_guid(guid: &str) -> Self {
        Self::new().query(format!("service_guid:{}", guid))
    }

    /// Range filter on record timestamps, `since <= t < until`.
    pub fn timestamp_between(since: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        Self::new().query(format!(
            "timestamp>{};timestamp<{}",
            since.to_rfc3339_opts(SecondsFormat::Secs, true),
            until.to_rfc3339_opts(SecondsFormat::Secs, true),
        ))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn to_query(&self) -> Vec<(String, String)> {
        self.0
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}
