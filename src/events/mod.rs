//! Audit trail plumbing.
//!
//! Mutating handlers publish `DomainEvent`s onto a broadcast bus; a
//! background listener projects them into the append-only `action_log`
//! table. Publishing is fire-and-forget: a full channel or a failed
//! insert is logged and swallowed, never surfaced to the caller, so an
//! audit outage cannot block or fail the guarded operation itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::SqlitePool;
use tokio::sync::broadcast;
use uuid::Uuid;

pub mod loggable;
pub use loggable::{Loggable, Severity};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent<T> {
    pub id: Uuid,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
    pub actor_id: Option<Uuid>,
    pub subject_id: Option<Uuid>,
    pub payload: T,
}

impl<T> DomainEvent<T> {
    pub fn new(name: String, actor_id: Option<Uuid>, subject_id: Option<Uuid>, payload: T) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            occurred_at: Utc::now(),
            actor_id,
            subject_id,
            payload,
        }
    }
}

pub type EventBus = broadcast::Sender<Value>;

pub fn init_event_bus() -> (EventBus, broadcast::Receiver<Value>) {
    broadcast::channel(1024)
}

/// Request context for audit entries (IP, User-Agent).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extract context from Axum request headers
    pub fn from_headers(headers: &axum::http::HeaderMap) -> Self {
        let ip = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.split(',').next().unwrap_or(s).trim().to_string())
            .or_else(|| {
                headers
                    .get("x-real-ip")
                    .and_then(|v| v.to_str().ok())
                    .map(String::from)
            });

        let user_agent = headers
            .get(axum::http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        Self { ip, user_agent }
    }
}

/// Structured activity payload stored alongside each action_log row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityPayload {
    /// The current/new state of the entity
    #[serde(rename = "new")]
    pub current: Value,
    /// The previous state (for update/delete operations)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<RequestContext>,
    /// Severity level for retention policy
    pub severity: Severity,
}

pub fn log_activity<T: Loggable>(
    event_bus: &EventBus,
    action: &str,
    actor_id: Option<Uuid>,
    entity: &T,
) {
    log_activity_with_context(event_bus, action, actor_id, entity, None, None);
}

/// Activity logging with old/new tracking and request context.
pub fn log_activity_with_context<T: Loggable>(
    event_bus: &EventBus,
    action: &str,
    actor_id: Option<Uuid>,
    entity: &T,
    old_entity: Option<&T>,
    context: Option<RequestContext>,
) {
    let event_name = format!("{}.{}", T::entity_type(), action);

    let severity = entity.severity_for_action(action);
    let payload = ActivityPayload {
        current: serde_json::to_value(entity).unwrap_or_default(),
        old: old_entity.map(|e| serde_json::to_value(e).unwrap_or_default()),
        context,
        severity,
    };

    let event = DomainEvent::new(
        event_name,
        actor_id,
        Some(entity.subject_id()),
        serde_json::to_value(&payload).unwrap_or_default(),
    );

    // Fire and forget - logging failures must not break the operation
    let _ = event_bus.send(serde_json::to_value(event).unwrap_or_default());
}

fn describe(name: &str) -> &'static str {
    match name {
        "user.registered" => "New user registered",
        "user.login" => "User logged in",
        "user.login_failed" => "Login attempt failed",
        "user.logout" => "User logged out",
        "user_profile.created" => "User profile created",
        "user_profile.updated" => "User profile updated",
        "user_permission.permission_change" => "Permission changed",
        "car.created" => "Car created",
        "car.updated" => "Car updated",
        "car.deleted" => "Car deleted",
        "sector.created" => "Sector created",
        "sector.deleted" => "Sector deleted",
        "department.created" => "Department created",
        "department.deleted" => "Department deleted",
        "division.created" => "Division created",
        "division.deleted" => "Division deleted",
        _ => "System event",
    }
}

/// Project bus events into the append-only action_log table. Each row
/// links to the previous one via SHA-256(prev_hash || payload) so audit
/// tampering is detectable.
pub async fn start_activity_listener(mut rx: broadcast::Receiver<Value>, pool: SqlitePool) {
    tracing::info!("activity listener started");
    while let Ok(event) = rx.recv().await {
        if let Err(e) = persist_event(&event, &pool).await {
            tracing::error!("failed to save action log entry: {e}");
        }
    }
}

async fn persist_event(event: &Value, pool: &SqlitePool) -> anyhow::Result<()> {
    let name = event.get("name").and_then(|v| v.as_str()).unwrap_or("unknown");
    let actor_id = event.get("actor_id").and_then(|v| v.as_str()).map(String::from);
    let subject_id = event.get("subject_id").and_then(|v| v.as_str()).map(String::from);

    let occurred_at = event
        .get("occurred_at")
        .and_then(|v| v.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    let severity = event
        .get("payload")
        .and_then(|p| p.get("severity"))
        .and_then(|s| s.as_str())
        .unwrap_or("important")
        .to_string();

    let ip_address = event
        .get("payload")
        .and_then(|p| p.get("context"))
        .and_then(|c| c.get("ip"))
        .and_then(|v| v.as_str())
        .map(String::from);

    // Event names are "<entity>.<action>"; the action suffix doubles as
    // the action_type column of the original schema.
    let action_type = name.rsplit('.').next().unwrap_or(name).to_string();
    let module_name = name.split('.').next().map(String::from);

    let properties = serde_json::to_string(event)?;

    let prev_hash: Option<String> =
        sqlx::query_scalar("SELECT hash FROM action_log ORDER BY occurred_at DESC, id DESC LIMIT 1")
            .fetch_optional(pool)
            .await?;

    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    if let Some(ref ph) = prev_hash {
        hasher.update(ph.as_bytes());
    }
    hasher.update(properties.as_bytes());
    let hash = hex::encode(hasher.finalize());

    sqlx::query(
        r#"
        INSERT INTO action_log
            (id, actor_id, action_type, module_name, object_id, description,
             ip_address, severity, properties, prev_hash, hash, occurred_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(actor_id)
    .bind(action_type)
    .bind(module_name)
    .bind(subject_id)
    .bind(describe(name))
    .bind(ip_address)
    .bind(severity)
    .bind(properties)
    .bind(prev_hash)
    .bind(hash)
    .bind(occurred_at)
    .execute(pool)
    .await?;

    Ok(())
}
