//! HTTP routes.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    middleware,
    routing::{get, post},
};
use courier_common::{AppError, AppResult};
use courier_queue::{DispatchSummary, EmailJob, EnqueueOptions};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use validator::Validate;

use crate::rate_limit::{QuotaGuard, enforce_quota};
use crate::state::AppState;

/// Sequence started for every new subscriber.
pub const ONBOARDING_SEQUENCE: &str = "onboarding";
/// Number of emails in the onboarding sequence.
pub const ONBOARDING_STEPS: i32 = 3;

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let subscribe_guard = QuotaGuard::new(state.limiter.clone(), state.quotas.subscribe.clone());
    let contact_guard = QuotaGuard::new(state.limiter.clone(), state.quotas.contact.clone());

    let api = Router::new()
        .route(
            "/subscribe",
            post(subscribe).layer(middleware::from_fn_with_state(
                subscribe_guard,
                enforce_quota,
            )),
        )
        .route(
            "/contact",
            post(contact).layer(middleware::from_fn_with_state(contact_guard, enforce_quota)),
        )
        .route("/cron/dispatch", post(cron_dispatch))
        .route("/cron/cleanup", post(cron_cleanup))
        .route("/sequences/{id}/advance", post(advance_sequence))
        .route("/jobs/{id}", get(show_job));

    Router::new()
        .route("/healthz", get(healthz))
        .nest("/api", api)
        .with_state(state)
}

/// Newsletter signup.
#[derive(Debug, Deserialize, Validate)]
pub struct SubscribeRequest {
    /// Subscriber address.
    #[validate(email)]
    pub email: String,
    /// Optional display name, used in the greeting.
    #[validate(length(max = 200))]
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubscribeResponse {
    sequence_id: String,
    /// Welcome email job. Absent when the subscriber was already enrolled.
    job_id: Option<String>,
}

/// Contact form submission.
#[derive(Debug, Deserialize, Validate)]
pub struct ContactRequest {
    /// Reply address.
    #[validate(email)]
    pub email: String,
    /// Sender name.
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    /// Message body.
    #[validate(length(min = 1, max = 5000))]
    pub message: String,
}

async fn healthz() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn subscribe(
    State(state): State<AppState>,
    Json(req): Json<SubscribeRequest>,
) -> AppResult<(StatusCode, Json<SubscribeResponse>)> {
    req.validate()?;

    let metadata = req.name.as_ref().map(|name| json!({ "name": name }));
    let start = state
        .sequences
        .start(&req.email, ONBOARDING_SEQUENCE, ONBOARDING_STEPS, metadata)
        .await?;
    let sequence_id = start.id;

    if !start.created {
        tracing::debug!(sequence_id = %sequence_id, "Subscriber already enrolled");
        return Ok((
            StatusCode::ACCEPTED,
            Json(SubscribeResponse {
                sequence_id,
                job_id: None,
            }),
        ));
    }

    let greeting = req.name.as_deref().unwrap_or("there");
    let welcome = EmailJob::new(
        &req.email,
        "Welcome aboard",
        format!("Hi {greeting}, thanks for subscribing. More soon."),
    )
    .in_sequence(&sequence_id);
    let job_id = state
        .queue
        .enqueue_job(&welcome, EnqueueOptions::default().priority(1))
        .await?;

    tracing::info!(sequence_id = %sequence_id, job_id = %job_id, "Subscriber added");

    Ok((
        StatusCode::ACCEPTED,
        Json(SubscribeResponse {
            sequence_id,
            job_id: Some(job_id),
        }),
    ))
}

async fn contact(
    State(state): State<AppState>,
    Json(req): Json<ContactRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    req.validate()?;

    let email = EmailJob::new(
        &state.contact_inbox,
        format!("Contact form: {}", req.name),
        format!("From: {} <{}>\n\n{}", req.name, req.email, req.message),
    );
    let job_id = state
        .queue
        .enqueue_job(&email, EnqueueOptions::default())
        .await?;

    Ok((StatusCode::ACCEPTED, Json(json!({ "jobId": job_id }))))
}

/// Check the bearer token on a trigger endpoint.
fn authorize_cron(state: &AppState, headers: &HeaderMap) -> AppResult<()> {
    let Some(secret) = state.cron_secret.as_deref() else {
        return Err(AppError::Unauthorized);
    };

    let token = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match token {
        Some(token) if token == secret => Ok(()),
        _ => Err(AppError::Unauthorized),
    }
}

async fn cron_dispatch(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<DispatchSummary>> {
    authorize_cron(&state, &headers)?;

    let summary = state.queue.dispatch(&state.registry, state.batch_size).await?;
    Ok(Json(summary))
}

async fn cron_cleanup(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Json<Value>> {
    authorize_cron(&state, &headers)?;

    let deleted = state.queue.cleanup(state.retention_days).await?;
    let expired_counters = state.limiter.sweep().await;

    Ok(Json(json!({
        "deleted": deleted,
        "expiredCounters": expired_counters,
    })))
}

async fn advance_sequence(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    authorize_cron(&state, &headers)?;

    let sequence = state.sequences.advance(&id).await?;
    Ok(Json(serde_json::to_value(sequence)?))
}

async fn show_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    authorize_cron(&state, &headers)?;

    let job = state.queue.get(&id).await?;
    let logs = state.queue.logs(&id).await?;
    Ok(Json(json!({ "job": job, "logs": logs })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_request_validation() {
        let ok = SubscribeRequest {
            email: "reader@example.com".to_string(),
            name: None,
        };
        assert!(ok.validate().is_ok());

        let bad = SubscribeRequest {
            email: "not-an-email".to_string(),
            name: None,
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_contact_request_requires_message() {
        let req = ContactRequest {
            email: "reader@example.com".to_string(),
            name: "Reader".to_string(),
            message: String::new(),
        };
        assert!(req.validate().is_err());
    }
}
