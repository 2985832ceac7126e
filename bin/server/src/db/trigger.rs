//! PostgreSQL storage for triggers and firing events.

use chrono::{DateTime, Duration, Utc};
use serde_json::Value as JsonValue;
use sqlx::error::ErrorKind;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use std::str::FromStr;
use tripwire_core::{TriggerEventId, TriggerId};
use tripwire_scheduler::{
    EventFilter, EventStatus, Firing, NewTrigger, NextState, StoreError, Trigger,
    TriggerConditions, TriggerEvent, TriggerFilter, TriggerKind, TriggerPatch, TriggerRepository,
    TriggerStatus, truncate_to_minute,
};

const TRIGGER_COLUMNS: &str = "id, trigger_name, trigger_type, status, trigger_time, \
     interval_minutes, trigger_message, api_payload, last_triggered_on, trigger_count, \
     created_at, updated_at";

const EVENT_COLUMNS: &str = "id, trigger_id, status, triggered_at, trigger_name, trigger_type, \
     trigger_message, interval_minutes, api_payload, last_triggered_on, trigger_count, \
     archived_at, deleted_at, created_at, updated_at";

fn invalid_data(message: String) -> sqlx::Error {
    sqlx::Error::Decode(Box::new(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        message,
    )))
}

/// Constraint violations carry a message worth showing the caller;
/// everything else is a transport failure.
fn store_error(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &e {
        match db.kind() {
            ErrorKind::UniqueViolation
            | ErrorKind::ForeignKeyViolation
            | ErrorKind::NotNullViolation
            | ErrorKind::CheckViolation => {
                return StoreError::Constraint {
                    message: db.message().to_string(),
                };
            }
            _ => {}
        }
    }
    StoreError::Transport {
        message: e.to_string(),
    }
}

/// Row type for trigger queries.
#[derive(FromRow)]
struct TriggerRow {
    id: String,
    trigger_name: String,
    trigger_type: String,
    status: String,
    trigger_time: Option<DateTime<Utc>>,
    interval_minutes: Option<i64>,
    trigger_message: Option<String>,
    api_payload: Option<JsonValue>,
    last_triggered_on: Option<DateTime<Utc>>,
    trigger_count: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TriggerRow {
    fn try_into_record(self) -> Result<Trigger, sqlx::Error> {
        let id = TriggerId::from_str(&self.id)
            .map_err(|e| invalid_data(format!("invalid trigger id '{}': {}", self.id, e)))?;
        let kind = TriggerKind::parse(&self.trigger_type).ok_or_else(|| {
            invalid_data(format!("invalid trigger type '{}'", self.trigger_type))
        })?;
        let status = TriggerStatus::parse(&self.status)
            .ok_or_else(|| invalid_data(format!("invalid trigger status '{}'", self.status)))?;

        Ok(Trigger {
            id,
            name: self.trigger_name,
            kind,
            status,
            trigger_time: self.trigger_time,
            interval_minutes: self.interval_minutes,
            message: self.trigger_message,
            payload: self.api_payload,
            last_triggered_on: self.last_triggered_on,
            trigger_count: self.trigger_count,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Row type for event queries.
#[derive(FromRow)]
struct EventRow {
    id: String,
    trigger_id: String,
    status: String,
    triggered_at: DateTime<Utc>,
    trigger_name: String,
    trigger_type: String,
    trigger_message: Option<String>,
    interval_minutes: Option<i64>,
    api_payload: Option<JsonValue>,
    last_triggered_on: Option<DateTime<Utc>>,
    trigger_count: i64,
    archived_at: Option<DateTime<Utc>>,
    deleted_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl EventRow {
    fn try_into_record(self) -> Result<TriggerEvent, sqlx::Error> {
        let id = TriggerEventId::from_str(&self.id)
            .map_err(|e| invalid_data(format!("invalid event id '{}': {}", self.id, e)))?;
        let trigger_id = TriggerId::from_str(&self.trigger_id).map_err(|e| {
            invalid_data(format!("invalid trigger id '{}': {}", self.trigger_id, e))
        })?;
        let status = EventStatus::parse(&self.status)
            .ok_or_else(|| invalid_data(format!("invalid event status '{}'", self.status)))?;
        let kind = TriggerKind::parse(&self.trigger_type).ok_or_else(|| {
            invalid_data(format!("invalid trigger type '{}'", self.trigger_type))
        })?;

        Ok(TriggerEvent {
            id,
            trigger_id,
            status,
            triggered_at: self.triggered_at,
            name: self.trigger_name,
            kind,
            message: self.trigger_message,
            interval_minutes: self.interval_minutes,
            payload: self.api_payload,
            last_triggered_on: self.last_triggered_on,
            trigger_count: self.trigger_count,
            archived_at: self.archived_at,
            deleted_at: self.deleted_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn into_triggers(rows: Vec<TriggerRow>) -> Result<Vec<Trigger>, StoreError> {
    rows.into_iter()
        .map(|r| r.try_into_record().map_err(store_error))
        .collect()
}

fn into_events(rows: Vec<EventRow>) -> Result<Vec<TriggerEvent>, StoreError> {
    rows.into_iter()
        .map(|r| r.try_into_record().map_err(store_error))
        .collect()
}

/// Repository for triggers and their events.
pub struct PgTriggerRepository {
    pool: PgPool,
}

impl PgTriggerRepository {
    /// Creates a new repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl TriggerRepository for PgTriggerRepository {
    async fn find_due(&self, now: DateTime<Utc>) -> Result<Vec<Trigger>, StoreError> {
        let minute = truncate_to_minute(now);
        let rows: Vec<TriggerRow> = sqlx::query_as(&format!(
            r#"
            SELECT {TRIGGER_COLUMNS}
            FROM triggers
            WHERE status = 'active'
              AND trigger_type = 'scheduled'
              AND trigger_time >= $1
              AND trigger_time < $2
            ORDER BY seq
            "#
        ))
        .bind(minute)
        .bind(minute + Duration::minutes(1))
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        into_triggers(rows)
    }

    async fn get(&self, id: TriggerId) -> Result<Trigger, StoreError> {
        let row: Option<TriggerRow> = sqlx::query_as(&format!(
            "SELECT {TRIGGER_COLUMNS} FROM triggers WHERE id = $1"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        match row {
            Some(r) => r.try_into_record().map_err(store_error),
            None => Err(StoreError::TriggerNotFound { id }),
        }
    }

    async fn list(&self, filter: &TriggerFilter) -> Result<Vec<Trigger>, StoreError> {
        let mut query =
            QueryBuilder::<Postgres>::new(format!("SELECT {TRIGGER_COLUMNS} FROM triggers WHERE TRUE"));
        if let Some(id) = filter.id {
            query.push(" AND id = ").push_bind(id.to_string());
        }
        if let Some(name) = &filter.name {
            query.push(" AND trigger_name = ").push_bind(name.clone());
        }
        if let Some(kind) = filter.kind {
            query.push(" AND trigger_type = ").push_bind(kind.as_str());
        }
        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status.as_str());
        }
        query.push(" ORDER BY seq");
        if let Some(limit) = filter.limit {
            query.push(" LIMIT ").push_bind(i64::from(limit));
        }

        let rows: Vec<TriggerRow> = query
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;

        into_triggers(rows)
    }

    async fn create(&self, trigger: NewTrigger) -> Result<Trigger, StoreError> {
        let trigger = trigger.into_trigger(TriggerId::new(), Utc::now());
        let row: TriggerRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO triggers
                (id, trigger_name, trigger_type, status, trigger_time, interval_minutes,
                 trigger_message, api_payload, last_triggered_on, trigger_count,
                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {TRIGGER_COLUMNS}
            "#
        ))
        .bind(trigger.id.to_string())
        .bind(&trigger.name)
        .bind(trigger.kind.as_str())
        .bind(trigger.status.as_str())
        .bind(trigger.trigger_time)
        .bind(trigger.interval_minutes)
        .bind(&trigger.message)
        .bind(&trigger.payload)
        .bind(trigger.last_triggered_on)
        .bind(trigger.trigger_count)
        .bind(trigger.created_at)
        .bind(trigger.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(store_error)?;

        row.try_into_record().map_err(store_error)
    }

    #[tracing::instrument(skip(self, patch), fields(trigger_id = %id))]
    async fn update(
        &self,
        id: TriggerId,
        conditions: TriggerConditions,
        patch: TriggerPatch,
    ) -> Result<Trigger, StoreError> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;

        let row: Option<TriggerRow> = sqlx::query_as(&format!(
            "SELECT {TRIGGER_COLUMNS} FROM triggers WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.to_string())
        .fetch_optional(&mut *tx)
        .await
        .map_err(store_error)?;
        let mut trigger = row
            .ok_or(StoreError::TriggerNotFound { id })?
            .try_into_record()
            .map_err(store_error)?;

        conditions
            .check(&trigger)
            .map_err(|reason| StoreError::ConditionFailed { id, reason })?;
        patch.apply(&mut trigger, Utc::now())?;

        let row: TriggerRow = sqlx::query_as(&format!(
            r#"
            UPDATE triggers
            SET trigger_name = $2, status = $3, trigger_time = $4, interval_minutes = $5,
                trigger_message = $6, api_payload = $7, last_triggered_on = $8,
                updated_at = $9
            WHERE id = $1
            RETURNING {TRIGGER_COLUMNS}
            "#
        ))
        .bind(id.to_string())
        .bind(&trigger.name)
        .bind(trigger.status.as_str())
        .bind(trigger.trigger_time)
        .bind(trigger.interval_minutes)
        .bind(&trigger.message)
        .bind(&trigger.payload)
        .bind(trigger.last_triggered_on)
        .bind(trigger.updated_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(store_error)?;

        tx.commit().await.map_err(store_error)?;
        row.try_into_record().map_err(store_error)
    }

    async fn delete(&self, id: TriggerId) -> Result<Trigger, StoreError> {
        // Events go with the trigger via ON DELETE CASCADE.
        let row: Option<TriggerRow> = sqlx::query_as(&format!(
            "DELETE FROM triggers WHERE id = $1 RETURNING {TRIGGER_COLUMNS}"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        match row {
            Some(r) => r.try_into_record().map_err(store_error),
            None => Err(StoreError::TriggerNotFound { id }),
        }
    }

    #[tracing::instrument(skip(self, firing), fields(trigger_id = %firing.trigger_id))]
    async fn record_firing(&self, firing: Firing) -> Result<TriggerEvent, StoreError> {
        let id = firing.trigger_id;
        let (status, trigger_time) = match firing.next {
            NextState::Rearm { trigger_time } => (TriggerStatus::Active, Some(trigger_time)),
            NextState::Retire => (TriggerStatus::Inactive, None),
        };

        let mut tx = self.pool.begin().await.map_err(store_error)?;

        let advanced = sqlx::query(
            r#"
            UPDATE triggers
            SET last_triggered_on = $3, trigger_count = $4, status = $5,
                trigger_time = COALESCE($6, trigger_time), updated_at = $7
            WHERE id = $1 AND status = 'active' AND trigger_count = $2
            "#,
        )
        .bind(id.to_string())
        .bind(firing.expected_count)
        .bind(firing.last_triggered_on)
        .bind(firing.trigger_count)
        .bind(status.as_str())
        .bind(trigger_time)
        .bind(firing.fired_at)
        .execute(&mut *tx)
        .await
        .map_err(store_error)?
        .rows_affected();

        if advanced == 0 {
            let current: Option<(String, i64)> =
                sqlx::query_as("SELECT status, trigger_count FROM triggers WHERE id = $1")
                    .bind(id.to_string())
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(store_error)?;
            return Err(match current {
                None => StoreError::TriggerNotFound { id },
                Some((status, count)) => StoreError::ConditionFailed {
                    id,
                    reason: format!(
                        "status is {status} with trigger_count {count}, expected active with {}",
                        firing.expected_count
                    ),
                },
            });
        }

        let event = &firing.event;
        let row: EventRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO trigger_events
                (id, trigger_id, status, triggered_at, trigger_name, trigger_type,
                 trigger_message, interval_minutes, api_payload, last_triggered_on,
                 trigger_count, archived_at, deleted_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING {EVENT_COLUMNS}
            "#
        ))
        .bind(event.id.to_string())
        .bind(event.trigger_id.to_string())
        .bind(event.status.as_str())
        .bind(event.triggered_at)
        .bind(&event.name)
        .bind(event.kind.as_str())
        .bind(&event.message)
        .bind(event.interval_minutes)
        .bind(&event.payload)
        .bind(event.last_triggered_on)
        .bind(event.trigger_count)
        .bind(event.archived_at)
        .bind(event.deleted_at)
        .bind(event.created_at)
        .bind(event.updated_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(store_error)?;

        tx.commit().await.map_err(store_error)?;
        row.try_into_record().map_err(store_error)
    }

    async fn list_events(&self, filter: &EventFilter) -> Result<Vec<TriggerEvent>, StoreError> {
        let mut query = QueryBuilder::<Postgres>::new(format!(
            "SELECT {EVENT_COLUMNS} FROM trigger_events WHERE TRUE"
        ));
        if let Some(trigger_id) = filter.trigger_id {
            query.push(" AND trigger_id = ").push_bind(trigger_id.to_string());
        }
        if let Some(name) = &filter.name {
            query.push(" AND trigger_name = ").push_bind(name.clone());
        }
        if let Some(kind) = filter.kind {
            query.push(" AND trigger_type = ").push_bind(kind.as_str());
        }
        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status.as_str());
        }
        query.push(" ORDER BY seq");
        if let Some(limit) = filter.limit {
            query.push(" LIMIT ").push_bind(i64::from(limit));
        }

        let rows: Vec<EventRow> = query
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;

        into_events(rows)
    }

    async fn set_event_status(
        &self,
        id: TriggerEventId,
        status: EventStatus,
    ) -> Result<TriggerEvent, StoreError> {
        let row: Option<EventRow> = sqlx::query_as(&format!(
            r#"
            UPDATE trigger_events
            SET status = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {EVENT_COLUMNS}
            "#
        ))
        .bind(id.to_string())
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        match row {
            Some(r) => r.try_into_record().map_err(store_error),
            None => Err(StoreError::EventNotFound { id }),
        }
    }

    async fn delete_event(&self, id: TriggerEventId) -> Result<TriggerEvent, StoreError> {
        let row: Option<EventRow> = sqlx::query_as(&format!(
            "DELETE FROM trigger_events WHERE id = $1 RETURNING {EVENT_COLUMNS}"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        match row {
            Some(r) => r.try_into_record().map_err(store_error),
            None => Err(StoreError::EventNotFound { id }),
        }
    }

    async fn transition_events(
        &self,
        from: EventStatus,
        cutoff: DateTime<Utc>,
        to: EventStatus,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE trigger_events
            SET status = $3, updated_at = NOW()
            WHERE status = $1 AND triggered_at <= $2
            "#,
        )
        .bind(from.as_str())
        .bind(cutoff)
        .bind(to.as_str())
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(result.rows_affected())
    }

    async fn remove_events(
        &self,
        status: EventStatus,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let result =
            sqlx::query("DELETE FROM trigger_events WHERE status = $1 AND triggered_at <= $2")
                .bind(status.as_str())
                .bind(cutoff)
                .execute(&self.pool)
                .await
                .map_err(store_error)?;

        Ok(result.rows_affected())
    }
}
