//! Route handlers for the ingest server (§4.1, §4.4, §4.7, §6).

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth;
use crate::error::AppError;
use crate::http::state::AppState;
use crate::models::VoteMessage;
use crate::rate_limiter::{Admission, RateLimiter};
use crate::results::ResultsQuery;

const SUPPORTED_PROVIDERS: &[&str] = &["google", "apple", "facebook", "instagram"];

/// Body shape per §6: the `Authorization` header authenticates the HTTP
/// request itself; `user_token` is the copy carried on the queued message
/// for the worker to re-verify, per the payload-vs-header design note
/// (§9). In practice a caller sends the same JWT both places.
#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    pub candidate_id: Uuid,
    pub user_token: String,
}

#[derive(Debug, Serialize)]
pub struct VoteAccepted {
    pub status: &'static str,
    pub message: &'static str,
    pub timestamp: DateTime<Utc>,
}

pub async fn submit_vote(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(body): Json<VoteRequest>,
) -> Result<(StatusCode, Json<VoteAccepted>), AppError> {
    let header_token = bearer_token(&headers)?;
    let user_identifier = auth::verify_token(
        header_token,
        &state.config.jwt.secret,
        &state.config.jwt.algorithm,
        true,
    )?;

    if body.user_token.trim().is_empty() {
        return Err(AppError::Validation("user_token must not be empty".to_string()));
    }

    let source_ip = client_ip(&headers, peer);
    let admission = state
        .rate_limiter
        .check(RateLimiter::principal_key(Some(&user_identifier), &source_ip))
        .await;
    if admission == Admission::Limited {
        return Err(AppError::RateLimited);
    }

    let message = VoteMessage {
        candidate_id: body.candidate_id,
        user_token: body.user_token,
        vote_timestamp: Utc::now(),
        source_ip,
        user_agent: user_agent(&headers),
    };

    state.publisher.publish(&message).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(VoteAccepted {
            status: "accepted",
            message: "vote queued for processing",
            timestamp: Utc::now(),
        }),
    ))
}

#[derive(Debug, Deserialize, Default)]
pub struct ResultsQueryParams {
    pub candidate_id: Option<Uuid>,
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

pub async fn get_results(
    State(state): State<AppState>,
    Query(params): Query<ResultsQueryParams>,
) -> Result<Json<crate::models::ResultsResponse>, AppError> {
    let page = params.page.unwrap_or(1);
    if page < 1 {
        return Err(AppError::Validation("page must be >= 1".to_string()));
    }
    let limit = params.limit.unwrap_or(50);
    if !(1..=100).contains(&limit) {
        return Err(AppError::Validation("limit must be between 1 and 100".to_string()));
    }

    let query = ResultsQuery {
        candidate_id: params.candidate_id,
        page,
        limit,
    };

    let response = state.results.fetch(&query).await?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct AuthRequest {
    pub subject: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
}

/// Test-mode stand-in for a real provider's OAuth exchange (§4.1): mints a
/// token for whatever `subject` the caller asserts, scoped to a known
/// provider name so the route shape matches where a real per-provider
/// exchange would live.
pub async fn mint_auth_token(
    State(state): State<AppState>,
    axum::extract::Path(provider): axum::extract::Path<String>,
    Json(body): Json<AuthRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    if !SUPPORTED_PROVIDERS.contains(&provider.as_str()) {
        return Err(AppError::Validation(format!("unsupported provider: {provider}")));
    }
    if body.subject.trim().is_empty() {
        return Err(AppError::Validation("subject must not be empty".to_string()));
    }

    let token = auth::mint_test_token(
        &body.subject,
        &state.config.jwt.secret,
        &state.config.jwt.algorithm,
        3600,
    )?;

    Ok(Json(AuthResponse { token }))
}

pub async fn healthz() -> StatusCode {
    StatusCode::OK
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let raw = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::AuthInvalid("missing Authorization header".to_string()))?;

    auth::extract_bearer(raw)
        .ok_or_else(|| AppError::AuthInvalid("Authorization header is not a bearer token".to_string()))
}

fn client_ip(headers: &HeaderMap, peer: SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| peer.ip().to_string())
}

fn user_agent(headers: &HeaderMap) -> String {
    headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}
