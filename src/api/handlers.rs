//! Route handlers.

use axum::Json;
use axum::extract::{Path, Query, Request, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::middleware::Next;
use axum::response::Response;
use uuid::Uuid;

use crate::api::ApiState;
use crate::api::error::ApiError;
use crate::api::types::{HealthResponse, ListQuery, RootResponse};
use crate::auth::bearer_token;
use crate::error::{AuthError, JobError};
use crate::jobs::{Job, JobPatch, JobScope, JobSubmission, JobSummary};

/// Bearer credential from the request, if any.
fn credential(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token)
}

/// Owner scope for a caller that must be authenticated.
async fn owner_scope(state: &ApiState, headers: &HeaderMap) -> Result<JobScope, ApiError> {
    let principal = state.manager.resolve_caller(credential(headers)).await?;
    Ok(JobScope::Owner(principal))
}

/// Scope for callers allowed to act either as a service or as an owner.
async fn service_or_owner_scope(
    state: &ApiState,
    headers: &HeaderMap,
) -> Result<JobScope, ApiError> {
    if let Some(token) = credential(headers)
        && state.service_token.verify(token)
    {
        return Ok(JobScope::Unrestricted);
    }
    owner_scope(state, headers).await
}

pub(crate) async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "Robotics Training Job Manager API".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        status: "running".to_string(),
    })
}

pub(crate) async fn health(State(state): State<ApiState>) -> (StatusCode, Json<HealthResponse>) {
    let queue = state.manager.queue().name().to_string();
    match state.manager.check_store().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "healthy".to_string(),
                store: "connected".to_string(),
                queue,
            }),
        ),
        Err(e) => {
            tracing::warn!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "degraded".to_string(),
                    store: "unreachable".to_string(),
                    queue,
                }),
            )
        }
    }
}

pub(crate) async fn submit_job(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(submission): Json<JobSubmission>,
) -> Result<(StatusCode, Json<Job>), ApiError> {
    let owner = match credential(&headers) {
        None if state.allow_anonymous => None,
        presented => Some(state.manager.resolve_caller(presented).await?),
    };

    let job = state.manager.submit(submission, owner.as_ref()).await?;
    Ok((StatusCode::CREATED, Json(job)))
}

pub(crate) async fn list_jobs(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Job>>, ApiError> {
    let scope = owner_scope(&state, &headers).await?;
    Ok(Json(state.manager.list(&scope, query.limit()).await?))
}

pub(crate) async fn job_summary(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Json<JobSummary>, ApiError> {
    let scope = owner_scope(&state, &headers).await?;
    Ok(Json(state.manager.summary(&scope).await?))
}

/// Read path with tolerant authentication: an unresolvable credential is
/// treated as an anonymous caller, who only sees ownerless jobs.
pub(crate) async fn get_job(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(job_id): Path<Uuid>,
) -> Result<Json<Job>, ApiError> {
    let presented = credential(&headers);
    let scope = match state.manager.resolve_caller_optional(presented).await {
        Some(principal) => JobScope::Owner(principal),
        None if state.allow_anonymous => JobScope::Unowned,
        None if presented.is_some() => {
            return Err(AuthError::InvalidToken("credential could not be resolved".into()).into());
        }
        None => return Err(AuthError::MissingCredential.into()),
    };

    Ok(Json(state.manager.get(job_id, &scope).await?))
}

pub(crate) async fn update_job_status(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(job_id): Path<Uuid>,
    Json(patch): Json<JobPatch>,
) -> Result<Json<Job>, ApiError> {
    let scope = service_or_owner_scope(&state, &headers).await?;
    Ok(Json(state.manager.update_status(job_id, patch, &scope).await?))
}

pub(crate) async fn list_all_jobs(
    State(state): State<ApiState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Job>>, ApiError> {
    Ok(Json(
        state
            .manager
            .list(&JobScope::Unrestricted, query.limit())
            .await?,
    ))
}

/// Middleware admitting only callers that present the service credential.
///
/// Wire up with `axum::middleware::from_fn_with_state(state, service_auth_middleware)`.
pub(crate) async fn service_auth_middleware(
    State(state): State<ApiState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = credential(request.headers()).ok_or(AuthError::MissingCredential)?;
    if !state.service_token.verify(token) {
        tracing::warn!("Rejected administrative request without a valid service credential");
        return Err(JobError::Forbidden.into());
    }
    Ok(next.run(request).await)
}
