//! HTTP contract tests for the REST API, driven through the real router
//! with the in-memory repository and a recording publisher.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde_json::{Value, json};
use tower::ServiceExt;
use tripwire_core::{TriggerEventId, TriggerId};
use tripwire_scheduler::{
    EventFilter, EventStatus, Firing, InMemoryTriggerRepository, MAX_INTERVAL_MINUTES,
    NewTrigger, RecordingPublisher, RetentionPolicy, StoreError, Trigger, TriggerConditions,
    TriggerEvent, TriggerFilter, TriggerPatch, TriggerRepository, TriggerStatus,
};
use tripwire_server::auth::{Claims, JwtAuthValidator};
use tripwire_server::requests::format_time;
use tripwire_server::{AppState, router};

const SECRET: &str = "api-test-secret";

struct Harness {
    router: Router,
    publisher: Arc<RecordingPublisher>,
    token: String,
}

fn harness_with(retention: RetentionPolicy) -> Result<Harness, String> {
    harness_on(Arc::new(InMemoryTriggerRepository::new()), retention)
}

fn harness_on(
    repository: Arc<dyn TriggerRepository>,
    retention: RetentionPolicy,
) -> Result<Harness, String> {
    let publisher = Arc::new(RecordingPublisher::new());
    let state = AppState::new(
        repository,
        publisher.clone(),
        Arc::new(JwtAuthValidator::new(SECRET, 0)),
        retention,
    );
    let exp = u64::try_from(Utc::now().timestamp() + 3600)
        .map_err(|err| format!("compute expiry: {err}"))?;
    let token = encode(
        &Header::new(Algorithm::HS256),
        &Claims {
            sub: Some("ops".to_string()),
            exp,
        },
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .map_err(|err| format!("mint token: {err}"))?;
    Ok(Harness {
        router: router(state, Duration::from_secs(5)),
        publisher,
        token,
    })
}

fn harness() -> Result<Harness, String> {
    harness_with(RetentionPolicy::default())
}

impl Harness {
    async fn call(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> Result<(StatusCode, Value), String> {
        send(&self.router, method, uri, Some(&self.token), body).await
    }

    async fn create(&self, body: Value) -> Result<Value, String> {
        let (status, created) = self
            .call(Method::POST, "/triggers/create_trigger", Some(body))
            .await?;
        if status != StatusCode::OK {
            return Err(format!("create failed with {status}: {created}"));
        }
        created["records"]
            .get(0)
            .cloned()
            .ok_or_else(|| "create returned no record".to_string())
    }
}

async fn send(
    router: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Result<(StatusCode, Value), String> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    let req = if let Some(payload) = body {
        builder = builder.header(header::CONTENT_TYPE, "application/json");
        let bytes =
            serde_json::to_vec(&payload).map_err(|err| format!("serialize request body: {err}"))?;
        builder
            .body(Body::from(bytes))
            .map_err(|err| format!("build request: {err}"))?
    } else {
        builder
            .body(Body::empty())
            .map_err(|err| format!("build request: {err}"))?
    };

    let response = router
        .clone()
        .oneshot(req)
        .await
        .map_err(|err| format!("route request: {err}"))?;
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .map_err(|err| format!("read response body: {err}"))?;

    let parsed = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).map_err(|err| format!("parse response body: {err}"))?
    };
    Ok((status, parsed))
}

fn in_minutes(minutes: i64) -> String {
    format_time(Utc::now() + chrono::Duration::minutes(minutes))
}

fn string_field<'a>(value: &'a Value, field: &str) -> Result<&'a str, String> {
    value[field]
        .as_str()
        .ok_or_else(|| format!("missing string field {field} in {value}"))
}

fn time_field(value: &Value, field: &str) -> Result<DateTime<Utc>, String> {
    string_field(value, field)?
        .parse::<DateTime<Utc>>()
        .map_err(|err| format!("parse {field}: {err}"))
}

/// In-memory store where a firing retires the trigger between the API's
/// read and its conditional write.
struct RetiredMidUpdate {
    inner: InMemoryTriggerRepository,
}

#[async_trait]
impl TriggerRepository for RetiredMidUpdate {
    async fn find_due(&self, now: DateTime<Utc>) -> Result<Vec<Trigger>, StoreError> {
        self.inner.find_due(now).await
    }

    async fn get(&self, id: TriggerId) -> Result<Trigger, StoreError> {
        self.inner.get(id).await
    }

    async fn list(&self, filter: &TriggerFilter) -> Result<Vec<Trigger>, StoreError> {
        self.inner.list(filter).await
    }

    async fn create(&self, trigger: NewTrigger) -> Result<Trigger, StoreError> {
        self.inner.create(trigger).await
    }

    async fn update(
        &self,
        id: TriggerId,
        conditions: TriggerConditions,
        patch: TriggerPatch,
    ) -> Result<Trigger, StoreError> {
        let retire = TriggerPatch {
            status: Some(TriggerStatus::Inactive),
            ..TriggerPatch::default()
        };
        self.inner.update(id, TriggerConditions::none(), retire).await?;
        self.inner.update(id, conditions, patch).await
    }

    async fn delete(&self, id: TriggerId) -> Result<Trigger, StoreError> {
        self.inner.delete(id).await
    }

    async fn record_firing(&self, firing: Firing) -> Result<TriggerEvent, StoreError> {
        self.inner.record_firing(firing).await
    }

    async fn list_events(&self, filter: &EventFilter) -> Result<Vec<TriggerEvent>, StoreError> {
        self.inner.list_events(filter).await
    }

    async fn set_event_status(
        &self,
        id: TriggerEventId,
        status: EventStatus,
    ) -> Result<TriggerEvent, StoreError> {
        self.inner.set_event_status(id, status).await
    }

    async fn delete_event(&self, id: TriggerEventId) -> Result<TriggerEvent, StoreError> {
        self.inner.delete_event(id).await
    }

    async fn transition_events(
        &self,
        from: EventStatus,
        cutoff: DateTime<Utc>,
        to: EventStatus,
    ) -> Result<u64, StoreError> {
        self.inner.transition_events(from, cutoff, to).await
    }

    async fn remove_events(
        &self,
        status: EventStatus,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        self.inner.remove_events(status, cutoff).await
    }
}

#[tokio::test]
async fn requests_without_a_valid_token_are_rejected() -> Result<(), String> {
    let h = harness()?;

    let (status, body) = send(&h.router, Method::GET, "/triggers/fetch", None, None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status"], "failure");
    assert_eq!(body["status_code"], 401);
    assert_eq!(body["status_bool"], false);

    let (status, _) = send(
        &h.router,
        Method::GET,
        "/triggers/fetch",
        Some("not-a-token"),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn create_scheduled_trigger_returns_envelope() -> Result<(), String> {
    let h = harness()?;

    let (status, body) = h
        .call(
            Method::POST,
            "/triggers/create_trigger",
            Some(json!({
                "trigger_name": "nightly-report",
                "trigger_time": in_minutes(10),
                "interval": 5,
                "trigger_message": "build the report"
            })),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["status_code"], 200);
    assert_eq!(body["message"], "Trigger 'nightly-report' created successfully");
    assert_eq!(body["count"], 1);
    assert_eq!(body["status_bool"], true);
    assert!(body["timestamp"].is_string());

    let record = &body["records"][0];
    assert_eq!(record["trigger_type"], "scheduled");
    assert_eq!(record["status"], "active");
    assert_eq!(record["interval"], 5);
    assert_eq!(record["trigger_count"], 0);
    assert!(string_field(record, "id")?.starts_with("trg_"));
    assert!(h.publisher.published().is_empty());
    Ok(())
}

#[tokio::test]
async fn create_rejects_past_time_and_missing_schedule() -> Result<(), String> {
    let h = harness()?;

    let (status, body) = h
        .call(
            Method::POST,
            "/triggers/create_trigger",
            Some(json!({"trigger_name": "late", "trigger_time": in_minutes(-5)})),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["count"], 0);

    let (status, _) = h
        .call(
            Method::POST,
            "/triggers/create_trigger",
            Some(json!({"trigger_name": "no-schedule"})),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = h
        .call(
            Method::POST,
            "/triggers/create_trigger",
            Some(json!({"trigger_name": "bad-format", "trigger_time": "tomorrow"})),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn api_trigger_is_published_on_creation() -> Result<(), String> {
    let h = harness()?;

    let record = h
        .create(json!({
            "trigger_name": "webhook",
            "interval": 30,
            "api_payload": {"order": 42}
        }))
        .await?;
    assert_eq!(record["trigger_type"], "api");
    assert_eq!(record["interval"], Value::Null);
    assert_eq!(record["api_payload"], json!({"order": 42}));

    let published = h.publisher.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].id.to_string(), string_field(&record, "id")?);
    Ok(())
}

#[tokio::test]
async fn api_trigger_creation_survives_publish_failure() -> Result<(), String> {
    let h = harness()?;
    h.publisher.set_failing(true);

    let record = h
        .create(json!({"trigger_name": "webhook", "api_payload": {"k": "v"}}))
        .await?;
    assert_eq!(record["trigger_type"], "api");
    assert!(h.publisher.published().is_empty());
    Ok(())
}

#[tokio::test]
async fn fetch_filters_and_reports_no_records() -> Result<(), String> {
    let h = harness()?;

    let (status, body) = h.call(Method::GET, "/triggers/fetch", None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "No Records Found");

    h.create(json!({"trigger_name": "a", "interval": 5})).await?;
    h.create(json!({"trigger_name": "b", "interval": 5})).await?;
    h.create(json!({"trigger_name": "c", "api_payload": {"x": 1}}))
        .await?;

    let (status, body) = h.call(Method::GET, "/triggers/fetch", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 3);

    let (_, body) = h
        .call(Method::GET, "/triggers/fetch?trigger_type=api", None)
        .await?;
    assert_eq!(body["count"], 1);
    assert_eq!(body["records"][0]["trigger_name"], "c");

    let (_, body) = h
        .call(Method::GET, "/triggers/fetch?num_records=2", None)
        .await?;
    assert_eq!(body["count"], 2);

    let (status, _) = h
        .call(Method::GET, "/triggers/fetch?trigger_type=cron", None)
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn update_guards_id_unknown_fields_and_inactive_triggers() -> Result<(), String> {
    let h = harness()?;
    let record = h
        .create(json!({"trigger_name": "guarded", "trigger_time": in_minutes(10)}))
        .await?;
    let uri = format!(
        "/triggers/update_trigger?trigger_id={}",
        string_field(&record, "id")?
    );

    let (status, body) = h
        .call(Method::PATCH, &uri, Some(json!({"id": "trg_other"})))
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Cannot change ID");

    let (status, _) = h
        .call(Method::PATCH, &uri, Some(json!({"colour": "blue"})))
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = h
        .call(Method::PATCH, &uri, Some(json!({"trigger_count": 9})))
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = h
        .call(
            Method::PATCH,
            &uri,
            Some(json!({"trigger_name": "renamed", "trigger_message": "hello"})),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Updated successfully");
    assert_eq!(body["records"][0]["trigger_name"], "renamed");
    assert_eq!(body["records"][0]["trigger_message"], "hello");

    let (status, body) = h
        .call(Method::PATCH, &uri, Some(json!({"status": "inactive"})))
        .await?;
    assert_eq!(status, StatusCode::OK);
    let retired = body["records"][0].clone();
    assert_eq!(retired["status"], "inactive");

    let (status, body) = h
        .call(
            Method::PATCH,
            &uri,
            Some(json!({"trigger_name": "again", "trigger_time": in_minutes(30)})),
        )
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Cannot change inactive triggers");

    let (_, body) = h
        .call(
            Method::GET,
            &format!("/triggers/fetch?trigger_id={}", string_field(&record, "id")?),
            None,
        )
        .await?;
    let stored = &body["records"][0];
    assert_eq!(stored["trigger_name"], "renamed");
    assert_eq!(
        time_field(stored, "trigger_time")?,
        time_field(&retired, "trigger_time")?
    );
    assert_eq!(
        time_field(stored, "updated_at")?,
        time_field(&retired, "updated_at")?
    );
    Ok(())
}

#[tokio::test]
async fn update_refused_when_trigger_retires_before_the_write() -> Result<(), String> {
    let h = harness_on(
        Arc::new(RetiredMidUpdate {
            inner: InMemoryTriggerRepository::new(),
        }),
        RetentionPolicy::default(),
    )?;
    let record = h
        .create(json!({"trigger_name": "raced", "trigger_time": in_minutes(10)}))
        .await?;
    let id = string_field(&record, "id")?.to_string();

    let (status, body) = h
        .call(
            Method::PATCH,
            &format!("/triggers/update_trigger?trigger_id={id}"),
            Some(json!({"trigger_name": "too-late"})),
        )
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Cannot change inactive triggers");

    let (_, body) = h
        .call(Method::GET, &format!("/triggers/fetch?trigger_id={id}"), None)
        .await?;
    let stored = &body["records"][0];
    assert_eq!(stored["status"], "inactive");
    assert_eq!(stored["trigger_name"], "raced");
    assert_eq!(
        time_field(stored, "trigger_time")?,
        time_field(&record, "trigger_time")?
    );
    Ok(())
}

#[tokio::test]
async fn update_of_unknown_trigger_is_not_found_whatever_the_body() -> Result<(), String> {
    let h = harness()?;
    let uri = "/triggers/update_trigger?trigger_id=trg_01ARZ3NDEKTSV4RRFFQ69G5FAV";

    for body in [
        json!({"id": "trg_other"}),
        json!({"colour": "blue"}),
        json!({}),
        json!([1, 2]),
        json!({"trigger_name": "renamed"}),
    ] {
        let (status, response) = h.call(Method::PATCH, uri, Some(body.clone())).await?;
        assert_eq!(status, StatusCode::NOT_FOUND, "body {body}");
        assert_eq!(response["message"], "Trigger not found");
    }
    Ok(())
}

#[tokio::test]
async fn interval_beyond_the_cap_is_rejected() -> Result<(), String> {
    let h = harness()?;

    for interval in [json!(i64::MAX), json!(MAX_INTERVAL_MINUTES + 1)] {
        let (status, body) = h
            .call(
                Method::POST,
                "/triggers/create_trigger",
                Some(json!({"trigger_name": "huge", "interval": interval})),
            )
            .await?;
        assert_eq!(status, StatusCode::BAD_REQUEST, "interval {interval}");
        assert_eq!(body["count"], 0);
    }

    let record = h
        .create(json!({"trigger_name": "capped", "trigger_time": in_minutes(10), "interval": 5}))
        .await?;
    let id = string_field(&record, "id")?.to_string();
    let (status, _) = h
        .call(
            Method::PATCH,
            &format!("/triggers/update_trigger?trigger_id={id}"),
            Some(json!({"interval": i64::MAX})),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = h
        .call(Method::GET, &format!("/triggers/fetch?trigger_id={id}"), None)
        .await?;
    assert_eq!(body["records"][0]["interval"], 5);
    assert_eq!(
        time_field(&body["records"][0], "trigger_time")?,
        time_field(&record, "trigger_time")?
    );
    Ok(())
}

#[tokio::test]
async fn interval_change_rearms_from_current_time() -> Result<(), String> {
    let h = harness()?;
    let record = h
        .create(json!({"trigger_name": "rearm", "trigger_time": in_minutes(10)}))
        .await?;
    let original = time_field(&record, "trigger_time")?;
    let uri = format!(
        "/triggers/update_trigger?trigger_id={}",
        string_field(&record, "id")?
    );

    let (status, body) = h
        .call(Method::PATCH, &uri, Some(json!({"interval": 15})))
        .await?;
    assert_eq!(status, StatusCode::OK);
    let updated = &body["records"][0];
    assert_eq!(updated["interval"], 15);
    assert_eq!(
        time_field(updated, "trigger_time")?,
        original + chrono::Duration::minutes(15)
    );
    Ok(())
}

#[tokio::test]
async fn logging_firings_rearms_recurring_triggers() -> Result<(), String> {
    let h = harness()?;
    let record = h
        .create(json!({"trigger_name": "every-five", "trigger_time": in_minutes(10), "interval": 5}))
        .await?;
    let id = string_field(&record, "id")?.to_string();
    let log_uri = format!("/triggered_events/log_event?trigger_id={id}");

    let (status, body) = h.call(Method::POST, &log_uri, None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Trigger event logged successfully");
    let event = &body["records"][0];
    assert_eq!(event["trigger_id"], id.as_str());
    assert_eq!(event["trigger_count"], 1);
    assert_eq!(event["status"], "active");
    assert!(string_field(event, "id")?.starts_with("tev_"));
    let triggered_at = time_field(event, "triggered_at")?;

    let (_, body) = h
        .call(Method::GET, &format!("/triggers/fetch?trigger_id={id}"), None)
        .await?;
    let trigger = &body["records"][0];
    assert_eq!(trigger["status"], "active");
    assert_eq!(trigger["trigger_count"], 1);
    assert_eq!(
        time_field(trigger, "trigger_time")?,
        triggered_at + chrono::Duration::minutes(5)
    );

    let (status, _) = h.call(Method::POST, &log_uri, None).await?;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = h
        .call(
            Method::GET,
            &format!("/triggered_events/fetch_events?trigger_id={id}"),
            None,
        )
        .await?;
    assert_eq!(body["count"], 2);
    assert_eq!(body["records"][1]["trigger_count"], 2);
    Ok(())
}

#[tokio::test]
async fn one_shot_trigger_retires_after_first_firing() -> Result<(), String> {
    let h = harness()?;
    let record = h
        .create(json!({"trigger_name": "once", "trigger_time": in_minutes(10)}))
        .await?;
    let id = string_field(&record, "id")?.to_string();
    let log_uri = format!("/triggered_events/log_event?trigger_id={id}");

    let (status, _) = h.call(Method::POST, &log_uri, None).await?;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = h
        .call(Method::GET, &format!("/triggers/fetch?trigger_id={id}"), None)
        .await?;
    assert_eq!(body["records"][0]["status"], "inactive");
    assert_eq!(body["records"][0]["trigger_count"], 1);

    let (status, _) = h.call(Method::POST, &log_uri, None).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn unknown_and_malformed_ids() -> Result<(), String> {
    let h = harness()?;

    let (status, _) = h
        .call(
            Method::POST,
            "/triggered_events/log_event?trigger_id=trg_01ARZ3NDEKTSV4RRFFQ69G5FAV",
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = h
        .call(
            Method::DELETE,
            "/triggers/delete_trigger?trigger_id=not-an-id",
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = h
        .call(Method::DELETE, "/triggers/delete_trigger", None)
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn event_status_override_and_delete() -> Result<(), String> {
    let h = harness()?;
    let record = h
        .create(json!({"trigger_name": "override", "interval": 5}))
        .await?;
    let id = string_field(&record, "id")?.to_string();
    let (_, body) = h
        .call(
            Method::POST,
            &format!("/triggered_events/log_event?trigger_id={id}"),
            None,
        )
        .await?;
    let event_id = string_field(&body["records"][0], "id")?.to_string();

    let (status, body) = h
        .call(
            Method::PATCH,
            &format!("/triggered_events/update_status?event_id={event_id}&status=archived"),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Status updated successfully");
    assert_eq!(body["records"][0]["status"], "archived");
    assert_eq!(body["records"][0]["trigger_count"], 1);

    let (status, _) = h
        .call(
            Method::PATCH,
            &format!("/triggered_events/update_status?event_id={event_id}&status=deleted"),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = h
        .call(
            Method::DELETE,
            &format!("/triggered_events/delete_event?event_id={event_id}"),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Record Deleted Successfully");
    assert_eq!(body["count"], 0);

    // The trigger is untouched by deleting its event.
    let (status, body) = h
        .call(Method::GET, &format!("/triggers/fetch?trigger_id={id}"), None)
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["records"][0]["trigger_count"], 1);

    let (status, _) = h
        .call(
            Method::GET,
            &format!("/triggered_events/fetch_events?trigger_id={id}"),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn deleting_a_trigger_removes_its_events() -> Result<(), String> {
    let h = harness()?;
    let record = h
        .create(json!({"trigger_name": "doomed", "interval": 5}))
        .await?;
    let id = string_field(&record, "id")?.to_string();
    h.call(
        Method::POST,
        &format!("/triggered_events/log_event?trigger_id={id}"),
        None,
    )
    .await?;

    let (status, body) = h
        .call(
            Method::DELETE,
            &format!("/triggers/delete_trigger?trigger_id={id}"),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["records"], json!([]));

    let (status, _) = h
        .call(Method::GET, "/triggered_events/fetch_events", None)
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn manual_sweep_archives_aged_events() -> Result<(), String> {
    let retention =
        RetentionPolicy::from_secs(0, 3600).map_err(|err| format!("build policy: {err}"))?;
    let h = harness_with(retention)?;
    let record = h
        .create(json!({"trigger_name": "swept", "interval": 5}))
        .await?;
    let id = string_field(&record, "id")?.to_string();
    h.call(
        Method::POST,
        &format!("/triggered_events/log_event?trigger_id={id}"),
        None,
    )
    .await?;

    let (status, body) = h
        .call(Method::PATCH, "/triggered_logs/update_and_delete", None)
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Records updated and deleted successfully");
    assert_eq!(body["records"][0]["archived"], 1);
    assert_eq!(body["records"][0]["removed"], 0);

    let (status, body) = h
        .call(
            Method::GET,
            "/triggered_events/fetch_events?status=archived",
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);

    let (_, body) = h
        .call(Method::PATCH, "/triggered_logs/update_and_delete", None)
        .await?;
    assert_eq!(body["records"][0]["archived"], 0);
    Ok(())
}

#[tokio::test]
async fn current_time_lists_nothing_when_nothing_is_due() -> Result<(), String> {
    let h = harness()?;
    h.create(json!({"trigger_name": "later", "trigger_time": in_minutes(30)}))
        .await?;

    let (status, body) = h
        .call(Method::GET, "/triggered_events/current_time", None)
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "No Records Found");
    Ok(())
}

#[tokio::test]
async fn unknown_route_answers_failure_envelope() -> Result<(), String> {
    let h = harness()?;
    let (status, body) = h.call(Method::GET, "/nope", None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], "failure");
    assert_eq!(body["records"], json!([]));
    Ok(())
}
