// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! HTTP surface of the bridge API.
//!
//! Caller identity comes from headers set by the upstream session layer:
//! `x-account-id` (account subject) and `x-account-login` (username). A request
//! without them, or from an account missing from the allow-list, is rejected
//! before it reaches a handler.

use axum::{
    extract::{FromRequestParts, Path, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::application::account_service::AccountService;
use crate::application::bridge_service::{BridgeService, CreateBridgeRequest};
use crate::domain::account::{Account, Caller};
use crate::domain::bridge::{AccountId, BridgeId};
use crate::domain::error::BridgeError;

pub const ACCOUNT_ID_HEADER: &str = "x-account-id";
pub const ACCOUNT_LOGIN_HEADER: &str = "x-account-login";

pub struct AppState {
    pub bridge_service: Arc<dyn BridgeService>,
    pub account_service: Arc<dyn AccountService>,
}

pub fn app(
    bridge_service: Arc<dyn BridgeService>,
    account_service: Arc<dyn AccountService>,
) -> Router {
    let state = Arc::new(AppState {
        bridge_service,
        account_service,
    });

    Router::new()
        .route("/health", get(health))
        .route("/bridges", get(list_bridges).post(create_bridge))
        .route("/bridges/by-name/{name}", get(get_bridge_by_name))
        .route("/bridges/{id}", get(get_bridge).delete(delete_bridge))
        .route("/bridges/{id}/stop", post(stop_bridge))
        .route("/bridges/{id}/resume", post(resume_bridge))
        .route("/bridges/{id}/retry", post(retry_bridge))
        .route("/bridges/{id}/jobs", get(list_bridge_jobs))
        .route("/usage", get(list_usage))
        .route("/accounts", get(list_accounts).post(create_account))
        .route(
            "/accounts/{id}",
            get(get_account).put(update_account).delete(delete_account),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============================================================================
// Errors
// ============================================================================

/// Renders a [`BridgeError`] as `{"errors":[{"message","extensions":{"code"}}]}`.
#[derive(Debug)]
pub struct ApiError(pub BridgeError);

impl From<BridgeError> for ApiError {
    fn from(err: BridgeError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0 {
            BridgeError::Validation(_) => StatusCode::BAD_REQUEST,
            BridgeError::NotFound(_) => StatusCode::NOT_FOUND,
            BridgeError::Conflict(_) => StatusCode::CONFLICT,
            BridgeError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            BridgeError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if matches!(self.0, BridgeError::Internal(_)) {
            tracing::error!(error = %self.0, "Request failed");
        }
        let body = json!({
            "errors": [{
                "message": self.0.to_string(),
                "extensions": { "code": self.0.label() }
            }]
        });
        (self.status(), Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

fn parse_bridge_id(id: &str) -> Result<BridgeId, ApiError> {
    BridgeId::from_string(id)
        .map_err(|_| ApiError(BridgeError::Validation(format!("invalid bridge id: {}", id))))
}

fn found<T>(value: Option<T>, what: &str) -> ApiResult<T> {
    value
        .map(Json)
        .ok_or_else(|| ApiError(BridgeError::NotFound(format!("{} not found", what))))
}

// ============================================================================
// Caller identity
// ============================================================================

/// A caller whose account is on the allow-list.
pub struct AuthenticatedCaller(pub Caller);

impl FromRequestParts<Arc<AppState>> for AuthenticatedCaller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        let (Some(account_id), Some(login)) =
            (header(ACCOUNT_ID_HEADER), header(ACCOUNT_LOGIN_HEADER))
        else {
            return Err(ApiError(BridgeError::unauthorized()));
        };

        let caller = Caller::new(account_id, login);
        state.account_service.ensure_allowed(&caller.account_id).await?;
        Ok(Self(caller))
    }
}

// ============================================================================
// Handlers
// ============================================================================

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn create_bridge(
    State(state): State<Arc<AppState>>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    Json(request): Json<CreateBridgeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let bridge = state.bridge_service.create_bridge(&caller, request).await?;
    Ok((StatusCode::CREATED, Json(bridge)))
}

async fn list_bridges(
    State(state): State<Arc<AppState>>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.bridge_service.list_bridges(&caller.account_id).await?))
}

async fn get_bridge(
    State(state): State<Arc<AppState>>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_bridge_id(&id)?;
    let bridge = state.bridge_service.get_bridge(id, &caller.account_id).await?;
    found(bridge, "bridge")
}

async fn get_bridge_by_name(
    State(state): State<Arc<AppState>>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let bridge = state
        .bridge_service
        .get_bridge_by_name(&name, &caller.account_id)
        .await?;
    found(bridge, "bridge")
}

async fn delete_bridge(
    State(state): State<Arc<AppState>>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_bridge_id(&id)?;
    Ok(Json(state.bridge_service.delete_bridge(id, &caller.account_id).await?))
}

async fn stop_bridge(
    State(state): State<Arc<AppState>>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_bridge_id(&id)?;
    Ok(Json(state.bridge_service.stop_bridge(id, &caller.account_id).await?))
}

async fn resume_bridge(
    State(state): State<Arc<AppState>>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_bridge_id(&id)?;
    Ok(Json(state.bridge_service.resume_bridge(id, &caller.account_id).await?))
}

async fn retry_bridge(
    State(state): State<Arc<AppState>>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_bridge_id(&id)?;
    let job = state.bridge_service.retry_bridge(id, &caller.account_id).await?;
    Ok((StatusCode::ACCEPTED, Json(job)))
}

async fn list_bridge_jobs(
    State(state): State<Arc<AppState>>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_bridge_id(&id)?;
    Ok(Json(state.bridge_service.list_bridge_jobs(id, &caller.account_id).await?))
}

async fn list_usage(
    State(state): State<Arc<AppState>>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.bridge_service.list_usage(&caller.account_id).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateAccountRequest {
    is_admin: bool,
}

async fn list_accounts(
    State(state): State<Arc<AppState>>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.account_service.list_accounts(&caller.account_id).await?))
}

async fn create_account(
    State(state): State<Arc<AppState>>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    Json(account): Json<Account>,
) -> Result<impl IntoResponse, ApiError> {
    let account = state
        .account_service
        .create_account(&caller.account_id, account)
        .await?;
    Ok((StatusCode::CREATED, Json(account)))
}

async fn get_account(
    State(state): State<Arc<AppState>>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let account = state
        .account_service
        .get_account(&caller.account_id, &AccountId::new(id))
        .await?;
    found(account, "account")
}

async fn update_account(
    State(state): State<Arc<AppState>>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    Path(id): Path<String>,
    Json(request): Json<UpdateAccountRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let account = Account::new(AccountId::new(id), request.is_admin);
    Ok(Json(
        state
            .account_service
            .update_account(&caller.account_id, account)
            .await?,
    ))
}

async fn delete_account(
    State(state): State<Arc<AppState>>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(
        state
            .account_service
            .delete_account(&caller.account_id, &AccountId::new(id))
            .await?,
    ))
}
