//! End-to-end tests of [`TrackerApi`] against an in-process fake Jira.
//!
//! The fake implements just enough of the REST v3 surface (bulk entity
//! properties with filters, task status, issue read/write, paginated
//! search, field catalog) to exercise request shapes and response
//! handling without network access.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_matches::assert_matches;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde_json::{json, Value};

use pointdown_core::retry::RetryPolicy;
use pointdown_core::store::{Expected, FieldStore, PropertyStore, SetOutcome, TaskOutcome};
use pointdown_tracker::{TrackerApi, TrackerConfig, TrackerError};

const SP: &str = "customfield_10022";

// ---------------------------------------------------------------------------
// Fake server
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Fake {
    /// (entity id, property key) -> value
    properties: HashMap<(i64, String), Value>,
    /// issue key -> (id, story points)
    issues: Vec<(String, i64, Option<f64>)>,
    /// task id -> remaining RUNNING polls before COMPLETE
    tasks: HashMap<u64, u32>,
    next_task: u64,
    /// Number of upcoming issue reads that answer 503.
    fail_reads: u32,
}

type Shared = Arc<Mutex<Fake>>;

fn issue_json(key: &str, id: i64, sp: Option<f64>) -> Value {
    json!({
        "id": id.to_string(),
        "key": key,
        "fields": { "summary": format!("Summary of {key}"), SP: sp },
    })
}

fn new_task(fake: &mut Fake) -> Response {
    fake.next_task += 1;
    fake.tasks.insert(fake.next_task, 1);
    (
        StatusCode::SEE_OTHER,
        [(header::LOCATION, format!("/rest/api/3/task/{}", fake.next_task))],
    )
        .into_response()
}

async fn bulk_set(
    State(state): State<Shared>,
    Path(key): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let mut fake = state.lock().unwrap();
    let filter = &body["filter"];
    for id in filter["entityIds"].as_array().cloned().unwrap_or_default() {
        let id = id.as_i64().unwrap();
        let slot = (id, key.clone());
        let current = fake.properties.get(&slot);
        let matches = match (filter.get("hasProperty"), filter.get("currentValue")) {
            (Some(Value::Bool(false)), _) => current.is_none(),
            (_, Some(expected)) => current == Some(expected),
            _ => true,
        };
        if matches {
            fake.properties.insert(slot, body["value"].clone());
        }
    }
    new_task(&mut fake)
}

async fn bulk_delete(
    State(state): State<Shared>,
    Path(key): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let mut fake = state.lock().unwrap();
    for id in body["entityIds"].as_array().cloned().unwrap_or_default() {
        let slot = (id.as_i64().unwrap(), key.clone());
        if fake.properties.get(&slot) == Some(&body["currentValue"]) {
            fake.properties.remove(&slot);
        }
    }
    new_task(&mut fake)
}

async fn get_property(
    State(state): State<Shared>,
    Path((id, key)): Path<(i64, String)>,
) -> Response {
    let fake = state.lock().unwrap();
    match fake.properties.get(&(id, key.clone())) {
        Some(value) => Json(json!({ "key": key, "value": value })).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn task_status(State(state): State<Shared>, Path(id): Path<u64>) -> Response {
    let mut fake = state.lock().unwrap();
    match fake.tasks.get_mut(&id) {
        Some(0) => Json(json!({ "status": "COMPLETE" })).into_response(),
        Some(remaining) => {
            *remaining -= 1;
            Json(json!({ "status": "RUNNING" })).into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn get_issue(State(state): State<Shared>, Path(key): Path<String>) -> Response {
    let mut fake = state.lock().unwrap();
    if fake.fail_reads > 0 {
        fake.fail_reads -= 1;
        return (StatusCode::SERVICE_UNAVAILABLE, "try later").into_response();
    }
    match fake.issues.iter().find(|(k, _, _)| *k == key) {
        Some((k, id, sp)) => Json(issue_json(k, *id, *sp)).into_response(),
        None => (StatusCode::NOT_FOUND, "Issue does not exist").into_response(),
    }
}

async fn put_issue(
    State(state): State<Shared>,
    Path(key): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let mut fake = state.lock().unwrap();
    let Some(value) = body["fields"][SP].as_f64() else {
        return (StatusCode::BAD_REQUEST, "bad field").into_response();
    };
    match fake.issues.iter_mut().find(|(k, _, _)| *k == key) {
        Some(issue) => {
            issue.2 = Some(value);
            StatusCode::NO_CONTENT.into_response()
        }
        None => (StatusCode::NOT_FOUND, "Issue does not exist").into_response(),
    }
}

async fn search(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
    let fake = state.lock().unwrap();
    let start: usize = body["nextPageToken"]
        .as_str()
        .and_then(|t| t.parse().ok())
        .unwrap_or(0);
    let page: Vec<Value> = fake
        .issues
        .iter()
        .skip(start)
        .take(2)
        .map(|(k, id, sp)| issue_json(k, *id, *sp))
        .collect();
    let next = start + page.len();
    let is_last = next >= fake.issues.len();
    Json(json!({
        "issues": page,
        "nextPageToken": if is_last { Value::Null } else { json!(next.to_string()) },
        "isLast": is_last,
    }))
    .into_response()
}

async fn fields() -> Json<Value> {
    Json(json!([
        { "id": "summary", "name": "Summary", "schema": { "type": "string" } },
        { "id": SP, "name": "Story Points", "schema": { "type": "number" } },
    ]))
}

async fn spawn_fake(fake: Fake) -> (TrackerApi, Shared) {
    let state: Shared = Arc::new(Mutex::new(fake));
    let app = Router::new()
        .route(
            "/rest/api/3/issue/properties/{prop}",
            put(bulk_set).delete(bulk_delete),
        )
        .route("/rest/api/3/issue/{key}/properties/{prop}", get(get_property))
        .route("/rest/api/3/issue/{key}", get(get_issue).put(put_issue))
        .route("/rest/api/3/task/{id}", get(task_status))
        .route("/rest/api/3/search/jql", post(search))
        .route("/rest/api/3/field", get(fields))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let mut config = TrackerConfig::new(format!("http://{addr}"), "dev@example.com", "token").unwrap();
    config.transport_retry = RetryPolicy::fixed(Duration::from_millis(10)).with_max_attempts(3);
    config.task_poll.interval = Duration::from_millis(10);

    (TrackerApi::new(config).unwrap(), state)
}

fn sample_issues() -> Vec<(String, i64, Option<f64>)> {
    vec![
        ("ABC-1".into(), 10001, Some(5.0)),
        ("ABC-2".into(), 10002, None),
        ("ABC-3".into(), 10003, Some(2.5)),
    ]
}

// ---------------------------------------------------------------------------
// Property store
// ---------------------------------------------------------------------------

#[tokio::test]
async fn conditional_create_then_read_back() {
    let (api, _) = spawn_fake(Fake::default()).await;
    let lease = json!({ "owner": "dev", "nonce": "n1", "expiresAt": 1 });

    let outcome = api
        .conditional_set(10001, "pointdown.lock", &Expected::Absent, &lease)
        .await
        .unwrap();
    let SetOutcome::Pending(handle) = outcome else {
        panic!("expected a task handle, got {outcome:?}");
    };
    assert_eq!(api.await_task(&handle).await.unwrap(), TaskOutcome::Succeeded);

    let stored = api.get(10001, "pointdown.lock").await.unwrap();
    assert_eq!(stored, Some(lease));
}

#[tokio::test]
async fn create_does_not_overwrite_existing_property() {
    let mut fake = Fake::default();
    let theirs = json!({ "owner": "other", "nonce": "n0" });
    fake.properties.insert((10001, "pointdown.lock".into()), theirs.clone());
    let (api, _) = spawn_fake(fake).await;

    let outcome = api
        .conditional_set(10001, "pointdown.lock", &Expected::Absent, &json!({ "owner": "me" }))
        .await
        .unwrap();
    if let SetOutcome::Pending(handle) = outcome {
        api.await_task(&handle).await.unwrap();
    }

    assert_eq!(api.get(10001, "pointdown.lock").await.unwrap(), Some(theirs));
}

#[tokio::test]
async fn replace_and_delete_are_keyed_on_current_value() {
    let mut fake = Fake::default();
    let old = json!({ "owner": "other", "nonce": "n0" });
    fake.properties.insert((10001, "pointdown.lock".into()), old.clone());
    let (api, state) = spawn_fake(fake).await;

    let mine = json!({ "owner": "me", "nonce": "n1" });
    api.conditional_set(10001, "pointdown.lock", &Expected::Equals(old.clone()), &mine)
        .await
        .unwrap();
    assert_eq!(api.get(10001, "pointdown.lock").await.unwrap(), Some(mine.clone()));

    // A stale delete keyed on the old value leaves our lease alone.
    api.conditional_delete(10001, "pointdown.lock", &old).await.unwrap();
    assert!(state
        .lock()
        .unwrap()
        .properties
        .contains_key(&(10001, "pointdown.lock".to_string())));

    api.conditional_delete(10001, "pointdown.lock", &mine).await.unwrap();
    assert_eq!(api.get(10001, "pointdown.lock").await.unwrap(), None);
}

#[tokio::test]
async fn missing_property_is_none() {
    let (api, _) = spawn_fake(Fake::default()).await;
    assert_eq!(api.get(42, "pointdown.lock").await.unwrap(), None);
}

#[tokio::test]
async fn task_polling_times_out() {
    let mut fake = Fake::default();
    fake.tasks.insert(99, u32::MAX);
    let (api, _) = spawn_fake(fake).await;

    let handle = pointdown_core::store::TaskHandle { id: "99".into() };
    assert_eq!(api.await_task(&handle).await.unwrap(), TaskOutcome::TimedOut);
}

// ---------------------------------------------------------------------------
// Fields and search
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fetch_write_and_fetch_again() {
    let (api, _) = spawn_fake(Fake {
        issues: sample_issues(),
        ..Fake::default()
    })
    .await;

    let entity = api.fetch_entity("ABC-1", SP).await.unwrap();
    assert_eq!(entity.id, Some(10001));
    assert_eq!(entity.field_value, 5.0);
    assert_eq!(entity.summary, "Summary of ABC-1");

    api.write_field("ABC-1", SP, 3.5).await.unwrap();
    assert_eq!(api.fetch_entity("ABC-1", SP).await.unwrap().field_value, 3.5);
}

#[tokio::test]
async fn null_field_reads_as_zero() {
    let (api, _) = spawn_fake(Fake {
        issues: sample_issues(),
        ..Fake::default()
    })
    .await;
    assert_eq!(api.fetch_entity("ABC-2", SP).await.unwrap().field_value, 0.0);
}

#[tokio::test]
async fn transient_server_errors_are_retried() {
    let (api, _) = spawn_fake(Fake {
        issues: sample_issues(),
        fail_reads: 2,
        ..Fake::default()
    })
    .await;

    let entity = api.fetch_entity("ABC-3", SP).await.unwrap();
    assert_eq!(entity.field_value, 2.5);
}

#[tokio::test]
async fn persistent_server_errors_exhaust_retries() {
    let (api, _) = spawn_fake(Fake {
        issues: sample_issues(),
        fail_reads: 10,
        ..Fake::default()
    })
    .await;

    let err = api.fetch_entity("ABC-3", SP).await.unwrap_err();
    assert_matches!(
        err,
        TrackerError::RetriesExhausted { operation: "fetch_entity", attempts: 3, .. }
    );
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let (api, _) = spawn_fake(Fake {
        issues: sample_issues(),
        ..Fake::default()
    })
    .await;

    let err = api.fetch_entity("NOPE-1", SP).await.unwrap_err();
    assert_matches!(err, TrackerError::Api { status: 404, .. });
}

#[tokio::test]
async fn search_follows_page_tokens() {
    let (api, _) = spawn_fake(Fake {
        issues: sample_issues(),
        ..Fake::default()
    })
    .await;

    let entities = api.search("project = ABC", SP).await.unwrap();
    let keys: Vec<&str> = entities.iter().map(|e| e.key.as_str()).collect();
    assert_eq!(keys, ["ABC-1", "ABC-2", "ABC-3"]);
}

#[tokio::test]
async fn field_catalog_maps_schema_types() {
    let (api, _) = spawn_fake(Fake::default()).await;

    let fields = api.list_fields().await.unwrap();
    assert_eq!(fields.len(), 2);
    assert_eq!(fields[1].name, "Story Points");

    let types = api.field_schema_types().await.unwrap();
    assert_eq!(types.get(SP).map(String::as_str), Some("number"));
}
