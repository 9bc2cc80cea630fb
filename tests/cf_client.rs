//! Integration tests for the paginated resource client using wiremock
//!
//! These verify cursor-following pagination, the pagination bound, exact
//! name-to-guid resolution, and the query parameters attached to mutating
//! operations.

use serde_json::{json, Value};
use tokio_test::assert_ok;
use wiremock::matchers::{bearer_token, body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use cfvault::cf::http::build_client;
use cfvault::{CfClient, Error, Filters, UaaCredentials};

fn record(guid: &str, name: &str) -> Value {
    json!({
        "metadata": {"guid": guid, "url": format!("/v2/records/{}", guid)},
        "entity": {"name": name},
    })
}

fn page(resources: Vec<Value>, next_url: Option<&str>) -> Value {
    json!({
        "total_results": resources.len(),
        "resources": resources,
        "next_url": next_url,
    })
}

async fn mount_token(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "t1",
            "refresh_token": "r1",
            "token_type": "bearer",
            "expires_in": 3600,
        })))
        .mount(server)
        .await;
}

async fn client_for(server: &MockServer) -> CfClient {
    mount_token(server).await;
    let creds = UaaCredentials::new(&server.uri(), "tester", "hunter2", build_client().unwrap());
    CfClient::new(&server.uri(), creds).unwrap()
}

/// `fetch_all` concatenates pages in server order, one request per page
#[tokio::test]
async fn test_fetch_all_follows_continuation() {
    let server = MockServer::start().await;

    // First page carries a continuation reference.
    Mock::given(method("GET"))
        .and(path("/v2/organizations"))
        .and(bearer_token("t1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(
            vec![record("o1", "alpha"), record("o2", "beta")],
            Some("/v2/organizations?order-direction=asc&page=2"),
        )))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    // Terminating page: no continuation reference.
    Mock::given(method("GET"))
        .and(path("/v2/organizations"))
        .and(query_param("page", "2"))
        .and(bearer_token("t1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(page(vec![record("o3", "gamma")], None)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let orgs = client.orgs(&Filters::new()).await.unwrap();

    let guids: Vec<&str> = orgs.iter().map(|r| r.guid()).collect();
    assert_eq!(guids, vec!["o1", "o2", "o3"]);
}

/// A self-referential continuation reference trips the pagination bound
#[tokio::test]
async fn test_pagination_bound() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2/services"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(
            vec![record("s1", "broker")],
            Some("/v2/services?page=2"),
        )))
        .expect(3)
        .mount(&server)
        .await;

    let client = client_for(&server).await.with_max_pages(3);
    match client.services(&Filters::new()).await {
        Err(Error::Pagination { max_pages, .. }) => assert_eq!(max_pages, 3),
        other => panic!("expected pagination error, got {:?}", other.map(|r| r.len())),
    }
}

/// Resolution is exact equality; the first equal record wins and substring
/// matches never do
#[tokio::test]
async fn test_org_guid_exact_match() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2/organizations"))
        .and(query_param("q", "name:dev"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(
            vec![record("g1", "dev2"), record("g2", "dev"), record("g3", "dev")],
            None,
        )))
        .mount(&server)
        .await;

    // The upstream filter may over-match; the client must not.
    Mock::given(method("GET"))
        .and(path("/v2/organizations"))
        .and(query_param("q", "name:de"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(
            vec![record("g1", "dev2"), record("g2", "dev")],
            None,
        )))
        .mount(&server)
        .await;

    let client = client_for(&server).await;

    assert_eq!(client.org_guid("dev").await.unwrap(), "g2");
    assert!(matches!(
        client.org_guid("de").await,
        Err(Error::NotFound { collection: "organization", .. })
    ));
}

/// Context resolution pins the client to the named org and space
#[tokio::test]
async fn test_with_context_resolves_guids() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2/organizations"))
        .and(query_param("q", "name:platform"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(page(vec![record("org-1", "platform")], None)),
        )
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v2/organizations/org-1/spaces"))
        .and(query_param("q", "name:prod"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(page(vec![record("space-1", "prod")], None)),
        )
        .mount(&server)
        .await;

    let client = client_for(&server)
        .await
        .with_context("platform", Some("prod"))
        .await
        .unwrap();

    assert_eq!(client.org_context(), Some("org-1"));
    assert_eq!(client.space_context(), Some("space-1"));
}

/// Space deletion is requested asynchronous and recursive at the protocol
/// level
#[tokio::test]
async fn test_delete_space_query_params() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/v2/spaces/space-1"))
        .and(query_param("async", "true"))
        .and(query_param("recursive", "true"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    tokio_test::assert_ok!(client.delete_space("/v2/spaces/space-1").await);
}

/// App creation posts the name and the resolved space context
#[tokio::test]
async fn test_create_app_body() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2/organizations"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(page(vec![record("org-1", "platform")], None)),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/organizations/org-1/spaces"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(page(vec![record("space-1", "prod")], None)),
        )
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v2/apps"))
        .and(body_json(json!({"name": "worker", "space_guid": "space-1"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(record("app-1", "worker")))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server)
        .await
        .with_context("platform", Some("prod"))
        .await
        .unwrap();

    let app = client.create_app("worker").await.unwrap();
    assert_eq!(app.guid(), "app-1");
}

/// Service instance status comes from the record's last_operation fields
#[tokio::test]
async fn test_service_status() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2/organizations"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(page(vec![record("org-1", "platform")], None)),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/organizations/org-1/spaces"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(page(vec![record("space-1", "prod")], None)),
        )
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v2/service_instances"))
        .and(query_param("q", "space_guid:space-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(
            vec![json!({
                "metadata": {"guid": "svc-1", "url": "/v2/service_instances/svc-1"},
                "entity": {
                    "name": "space-vault",
                    "last_operation": {"state": "in progress", "type": "delete"},
                },
            })],
            None,
        )))
        .mount(&server)
        .await;

    let client = client_for(&server)
        .await
        .with_context("platform", Some("prod"))
        .await
        .unwrap();

    let status = client.service_status("space-vault").await.unwrap();
    assert_eq!(status.state, "in progress");
    assert_eq!(status.operation_type, "delete");

    assert!(matches!(
        client.service_status("missing").await,
        Err(Error::NotFound { .. })
    ));
}

/// Non-success statuses on resource operations surface status and body
#[tokio::test]
async fn test_resource_error_carries_status() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2/apps"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "description": "You are not authorized",
            "error_code": "CF-NotAuthorized",
        })))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    match client.apps(&Filters::new()).await {
        Err(Error::Resource { status, body }) => {
            assert_eq!(status.as_u16(), 403);
            assert!(body.contains("CF-NotAuthorized"));
        }
        other => panic!("expected resource error, got {:?}", other.map(|r| r.len())),
    }
}
