//! Cloud Foundry Client
//!
//! Main client for the v2 API, combining the UAA session, the HTTP wrapper
//! and cursor-following pagination. Every authorized operation passes through
//! [`UaaCredentials::ensure_valid`] before building its request.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use super::http::CfHttpClient;
use super::resource::{AppStatus, Filters, Resource, ResourcePage, ServiceStatus};
use super::token::UaaCredentials;
use crate::error::{Error, Result};

/// Upper bound on continuation-following before a list call is declared
/// non-terminating.
pub const DEFAULT_MAX_PAGES: usize = 1000;

/// Cloud Foundry API client scoped to an optional org/space context.
pub struct CfClient {
    api_url: String,
    credentials: UaaCredentials,
    http: CfHttpClient,
    org_guid: Option<String>,
    space_guid: Option<String>,
    max_pages: usize,
}

impl CfClient {
    /// Create a client without org/space context.
    ///
    /// `api_url` is the API base URL including scheme, without a trailing
    /// slash (e.g. `https://api.sys.example.com`).
    pub fn new(api_url: &str, credentials: UaaCredentials) -> Result<Self> {
        Ok(Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            credentials,
            http: CfHttpClient::new()?,
            org_guid: None,
            space_guid: None,
            max_pages: DEFAULT_MAX_PAGES,
        })
    }

    /// Override the pagination bound.
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Resolve an org name (and optionally a space name within it) and pin
    /// the client to that context. Fails with [`Error::NotFound`] when either
    /// name does not resolve.
    pub async fn with_context(mut self, org_name: &str, space_name: Option<&str>) -> Result<Self> {
        let org_guid = self.org_guid(org_name).await?;
        if let Some(space_name) = space_name {
            let space_guid = self.space_guid(&org_guid, space_name).await?;
            self.space_guid = Some(space_guid);
        }
        self.org_guid = Some(org_guid);
        tracing::info!(org = org_name, space = space_name, "resolved CF context");
        Ok(self)
    }

    pub fn org_context(&self) -> Option<&str> {
        self.org_guid.as_deref()
    }

    pub fn space_context(&self) -> Option<&str> {
        self.space_guid.as_deref()
    }

    /// End the UAA session. The next operation logs in again.
    pub async fn logout(&self) {
        self.credentials.invalidate().await;
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    fn space_guid_required(&self) -> Result<&str> {
        self.space_guid
            .as_deref()
            .ok_or_else(|| Error::Config("operation requires a space context".to_string()))
    }

    // =========================================================================
    // Pagination core
    // =========================================================================

    /// Fetch every page of a list endpoint, accumulating resources in
    /// server-returned order.
    ///
    /// Each response may carry a `next_url` continuation reference; its query
    /// parameters replace the current ones and the request repeats. Iteration
    /// is bounded by `max_pages`: a malformed or self-referential continuation
    /// reference is an upstream contract violation and surfaces as
    /// [`Error::Pagination`] rather than a hang.
    pub async fn fetch_all(&self, path: &str, filters: &Filters) -> Result<Vec<Resource>> {
        let url = self.endpoint(path);
        let mut query = filters.to_query();
        let mut resources = Vec::new();

        for _ in 0..self.max_pages {
            let token = self.credentials.ensure_valid().await?;
            let body = self.http.get(&url, &token, &query).await?;
            let page: ResourcePage = serde_json::from_value(body)?;
            resources.extend(page.resources);

            match page.next_url {
                Some(next) => query = continuation_query(&next),
                None => return Ok(resources),
            }
        }

        Err(Error::Pagination {
            endpoint: path.to_string(),
            max_pages: self.max_pages,
        })
    }

    /// Single authorized GET without pagination, for caller-supplied paths.
    pub async fn get_raw(&self, path: &str) -> Result<Value> {
        let token = self.credentials.ensure_valid().await?;
        self.http.get(&self.endpoint(path), &token, &[]).await
    }

    async fn post(&self, path: &str, query: &[(String, String)], body: &Value) -> Result<Value> {
        let token = self.credentials.ensure_valid().await?;
        self.http
            .post(&self.endpoint(path), &token, query, body)
            .await
    }

    async fn delete(&self, path: &str, query: &[(String, String)]) -> Result<Value> {
        let token = self.credentials.ensure_valid().await?;
        self.http.delete(&self.endpoint(path), &token, query).await
    }

    // =========================================================================
    // Collection listings
    // =========================================================================

    pub async fn orgs(&self, filters: &Filters) -> Result<Vec<Resource>> {
        self.fetch_all("/v2/organizations", filters).await
    }

    pub async fn org_spaces(&self, org_guid: &str, filters: &Filters) -> Result<Vec<Resource>> {
        self.fetch_all(&format!("/v2/organizations/{}/spaces", org_guid), filters)
            .await
    }

    pub async fn apps(&self, filters: &Filters) -> Result<Vec<Resource>> {
        self.fetch_all("/v2/apps", filters).await
    }

    /// Service brokers offering provisionable services, not provisioned
    /// instances.
    pub async fn services(&self, filters: &Filters) -> Result<Vec<Resource>> {
        self.fetch_all("/v2/services", filters).await
    }

    pub async fn service_plans(&self, filters: &Filters) -> Result<Vec<Resource>> {
        self.fetch_all("/v2/service_plans", filters).await
    }

    pub async fn service_instances(&self, filters: &Filters) -> Result<Vec<Resource>> {
        self.fetch_all("/v2/service_instances", filters).await
    }

    pub async fn user_provided_service_instances(&self, filters: &Filters) -> Result<Vec<Resource>> {
        self.fetch_all("/v2/user_provided_service_instances", filters)
            .await
    }

    /// Audit events in a time window.
    pub async fn events(&self, since: DateTime<Utc>, until: DateTime<Utc>) -> Result<Vec<Resource>> {
        self.fetch_all("/v2/events", &Filters::timestamp_between(since, until))
            .await
    }

    /// Follow a record-supplied bindings URL (e.g. `service_bindings_url`).
    pub async fn service_bindings(&self, bindings_url: &str) -> Result<Vec<Resource>> {
        self.fetch_all(bindings_url, &Filters::new()).await
    }

    pub async fn service_keys(&self, service_guid: &str) -> Result<Vec<Resource>> {
        self.fetch_all(
            &format!("/v2/service_instances/{}/service_keys", service_guid),
            &Filters::new(),
        )
        .await
    }

    // =========================================================================
    // Name resolution
    // =========================================================================
    //
    // Resolution is case-sensitive exact equality on the returned record's
    // name. When the API returns several records with the same name the first
    // wins; duplicates are not an error.

    pub async fn org_guid(&self, name: &str) -> Result<String> {
        let orgs = self.orgs(&Filters::name(name)).await?;
        resolve_first(&orgs, name, Resource::name, "organization")
    }

    pub async fn space_guid(&self, org_guid: &str, name: &str) -> Result<String> {
        let spaces = self.org_spaces(org_guid, &Filters::name(name)).await?;
        resolve_first(&spaces, name, Resource::name, "space")
    }

    /// Broker label to guid mapping, optionally narrowed to one label.
    pub async fn service_guids(&self, label: Option<&str>) -> Result<BTreeMap<String, String>> {
        let filters = match label {
            Some(label) => Filters::label(label),
            None => Filters::new(),
        };
        let services = self.services(&filters).await?;
        Ok(services
            .iter()
            .filter_map(|s| s.label().map(|l| (l.to_string(), s.guid().to_string())))
            .collect())
    }

    /// Plan name to guid mapping for one service.
    pub async fn service_plan_guids(&self, service_guid: &str) -> Result<BTreeMap<String, String>> {
        let plans = self
            .service_plans(&Filters::service_guid(service_guid))
            .await?;
        Ok(plans
            .iter()
            .filter_map(|p| p.name().map(|n| (n.to_string(), p.guid().to_string())))
            .collect())
    }

    // =========================================================================
    // Apps
    // =========================================================================

    /// Create an app record in the current space. Does not push bits; the
    /// record exists to receive service bindings.
    pub async fn create_app(&self, name: &str) -> Result<Resource> {
        let space_guid = self.space_guid_required()?;
        let body = json!({
            "name": name,
            "space_guid": space_guid,
        });
        let response = self.post("/v2/apps", &[], &body).await?;
        tracing::info!(app = name, "created app");
        Ok(serde_json::from_value(response)?)
    }

    /// Delete an app by its record URL.
    pub async fn delete_app(&self, app_url: &str) -> Result<()> {
        self.delete(app_url, &accepts_incomplete()).await?;
        Ok(())
    }

    pub async fn app_status(&self, name: &str) -> Result<AppStatus> {
        let space_guid = self.space_guid_required()?;
        let apps = self.apps(&Filters::space_guid(space_guid)).await?;
        let app = first_exact(&apps, name, Resource::name).ok_or(Error::NotFound {
            collection: "app",
            name: name.to_string(),
        })?;
        Ok(AppStatus {
            name: name.to_string(),
            state: app.state().unwrap_or_default().to_string(),
            guid: app.guid().to_string(),
        })
    }

    /// Unbind every service from the named app, then delete it. Failures are
    /// attributed to the record being processed.
    pub async fn delete_app_by_name(&self, name: &str) -> Result<()> {
        let space_guid = self.space_guid_required()?;
        let apps = self.apps(&Filters::space_guid(space_guid)).await?;

        for app in apps.iter().filter(|a| a.name() == Some(name)) {
            if let Some(bindings_url) = app.entity_url("service_bindings_url") {
                for binding in self.service_bindings(bindings_url).await? {
                    tracing::info!(app = name, binding = binding.guid(), "unbinding service");
                    self.unbind_service(binding.guid()).await.map_err(|e| {
                        tracing::error!(app = name, binding = binding.guid(), "unbind failed");
                        e
                    })?;
                }
            }
            tracing::info!(app = name, guid = app.guid(), "deleting app");
            self.delete_app(app.url()).await?;
        }
        Ok(())
    }

    // =========================================================================
    // Services
    // =========================================================================

    /// Provision a managed service instance from a broker plan.
    ///
    /// Provisioning is requested as incomplete-accepted; the broker may still
    /// be working when this returns. Poll [`service_status`](Self::service_status)
    /// for completion.
    pub async fn create_service(
        &self,
        name: &str,
        broker_name: &str,
        plan_name: &str,
        parameters: Option<Value>,
    ) -> Result<Resource> {
        let space_guid = self.space_guid_required()?;

        let service_guids = self.service_guids(Some(broker_name)).await?;
        let service_guid = service_guids.get(broker_name).ok_or(Error::NotFound {
            collection: "service broker",
            name: broker_name.to_string(),
        })?;
        let plan_guids = self.service_plan_guids(service_guid).await?;
        let plan_guid = plan_guids.get(plan_name).ok_or(Error::NotFound {
            collection: "service plan",
            name: plan_name.to_string(),
        })?;

        let body = json!({
            "name": name,
            "service_plan_guid": plan_guid,
            "space_guid": space_guid,
            "parameters": parameters.unwrap_or_else(|| json!({})),
            "tags": [],
        });
        let response = self
            .post("/v2/service_instances", &accepts_incomplete(), &body)
            .await?;
        tracing::info!(service = name, broker = broker_name, "provisioning requested");
        Ok(serde_json::from_value(response)?)
    }

    /// Create a user-provided service whose credentials become available to
    /// bound apps.
    pub async fn create_user_provided_service(
        &self,
        name: &str,
        credentials: Value,
    ) -> Result<Resource> {
        let space_guid = self.space_guid_required()?;
        let body = json!({
            "space_guid": space_guid,
            "name": name,
            "credentials": credentials,
        });
        let response = self
            .post("/v2/user_provided_service_instances", &[], &body)
            .await?;
        Ok(serde_json::from_value(response)?)
    }

    /// Delete a service instance by its record URL. Deletion is asynchronous
    /// at the protocol level; this does not wait for the broker.
    pub async fn delete_service(&self, service_url: &str) -> Result<()> {
        self.delete(service_url, &accepts_incomplete()).await?;
        Ok(())
    }

    /// Delete a space by its record URL, recursively removing its contents.
    /// Asynchronous at the protocol level; completion is not polled.
    pub async fn delete_space(&self, space_url: &str) -> Result<()> {
        let query = [
            ("async".to_string(), "true".to_string()),
            ("recursive".to_string(), "true".to_string()),
        ];
        self.delete(space_url, &query).await?;
        Ok(())
    }

    pub async fn bind_service(&self, service_guid: &str, app_guid: &str) -> Result<Resource> {
        let body = json!({
            "service_instance_guid": service_guid,
            "app_guid": app_guid,
        });
        let response = self.post("/v2/service_bindings", &[], &body).await?;
        Ok(serde_json::from_value(response)?)
    }

    pub async fn unbind_service(&self, binding_guid: &str) -> Result<()> {
        self.delete(&format!("/v2/service_bindings/{}", binding_guid), &[])
            .await?;
        Ok(())
    }

    pub async fn create_service_key(
        &self,
        service_guid: &str,
        key_name: Option<&str>,
    ) -> Result<Resource> {
        let generated = format!("cfvault-{}", Uuid::new_v4().simple());
        let name = key_name.unwrap_or(generated.as_str());
        let body = json!({
            "service_instance_guid": service_guid,
            "name": name,
        });
        let response = self.post("/v2/service_keys", &[], &body).await?;
        tracing::info!(service = service_guid, key = name, "created service key");
        Ok(serde_json::from_value(response)?)
    }

    pub async fn delete_service_key(&self, key_url: &str) -> Result<()> {
        self.delete(key_url, &[]).await?;
        Ok(())
    }

    /// Return an existing service key for the instance, creating one when
    /// none exists yet.
    pub async fn ensure_service_key(&self, service_guid: &str) -> Result<Resource> {
        let mut keys = self.service_keys(service_guid).await?;
        match keys.is_empty() {
            false => Ok(keys.remove(0)),
            true => self.create_service_key(service_guid, None).await,
        }
    }

    /// True when a service instance with exactly this name exists in the
    /// current space.
    pub async fn service_instance_exists(&self, name: &str) -> Result<bool> {
        let space_guid = self.space_guid_required()?;
        let instances = self
            .service_instances(&Filters::space_guid(space_guid))
            .await?;
        Ok(instances.iter().any(|i| i.name() == Some(name)))
    }

    /// State and type of the last broker operation on the named instance.
    pub async fn service_status(&self, name: &str) -> Result<ServiceStatus> {
        let space_guid = self.space_guid_required()?;
        let instances = self
            .service_instances(&Filters::space_guid(space_guid))
            .await?;
        let instance = first_exact(&instances, name, Resource::name).ok_or(Error::NotFound {
            collection: "service instance",
            name: name.to_string(),
        })?;
        let (state, operation_type) = match instance.last_operation() {
            Some(op) => (op.state, op.operation_type),
            None => (String::new(), String::new()),
        };
        Ok(ServiceStatus {
            name: name.to_string(),
            state,
            operation_type,
        })
    }

    /// Service keys (and the credentials they carry) for the named instance
    /// in the current space, creating a key when none exists.
    pub async fn service_credentials(&self, name: &str) -> Result<Vec<Resource>> {
        let space_guid = self.space_guid_required()?;
        let instances = self
            .service_instances(&Filters::space_guid(space_guid))
            .await?;
        let instance = first_exact(&instances, name, Resource::name).ok_or(Error::NotFound {
            collection: "service instance",
            name: name.to_string(),
        })?;

        let keys = self.service_keys(instance.guid()).await?;
        if !keys.is_empty() {
            return Ok(keys);
        }
        Ok(vec![self.create_service_key(instance.guid(), None).await?])
    }

    /// Delete every service key of the named instance, then the instance
    /// itself. Failures are attributed to the record being processed.
    pub async fn delete_service_instance_by_name(&self, name: &str) -> Result<()> {
        let space_guid = self.space_guid_required()?;
        let instances = self
            .service_instances(&Filters::space_guid(space_guid))
            .await?;

        for instance in instances.iter().filter(|i| i.name() == Some(name)) {
            for key in self.service_keys(instance.guid()).await? {
                tracing::info!(service = name, key = key.guid(), "deleting service key");
                self.delete_service_key(key.url()).await.map_err(|e| {
                    tracing::error!(service = name, key = key.guid(), "key delete failed");
                    e
                })?;
            }
            tracing::info!(service = name, guid = instance.guid(), "deleting service instance");
            self.delete_service(instance.url()).await?;
        }
        Ok(())
    }
}

fn accepts_incomplete() -> [(String, String); 1] {
    [("accepts_incomplete".to_string(), "true".to_string())]
}

/// First record whose projected name is exactly equal to `name`.
fn first_exact<'r>(
    records: &'r [Resource],
    name: &str,
    field: fn(&Resource) -> Option<&str>,
) -> Option<&'r Resource> {
    records.iter().find(|r| field(r) == Some(name))
}

fn resolve_first(
    records: &[Resource],
    name: &str,
    field: fn(&Resource) -> Option<&str>,
    collection: &'static str,
) -> Result<String> {
    first_exact(records, name, field)
        .map(|r| r.guid().to_string())
        .ok_or(Error::NotFound {
            collection,
            name: name.to_string(),
        })
}

/// Extract the query parameters from a continuation reference such as
/// `/v2/organizations?order-direction=asc&page=2`.
fn continuation_query(next_url: &str) -> Vec<(String, String)> {
    match next_url.split_once('?') {
        Some((_, query)) => url::form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect(),
        None => Vec::new(),
    }
}
