//! HTTP surface for the wiki service.

use crate::error::WikiError;
use crate::model::{CreateTemplateRequest, UpdateWikiRequest};
use crate::repository::WikiRepository;
use crate::service::{WikiListing, WikiService};
use anyhow::{Context, Result};
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Header carrying the reader's language for lookups by code.
pub const APP_LANGUAGE_HEADER: &str = "x-app-language";

/// Shared state for API handlers.
pub struct AppState<R: WikiRepository> {
    pub service: WikiService<R>,
    /// Page size when a listing omits `limit`.
    pub default_page_limit: i64,
    /// Language used when `X-App-Language` is absent or unparseable.
    pub default_app_language: i32,
}

/// Success envelope shared by every endpoint.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub status_code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    status_code: u16,
    message: String,
    error: String,
}

fn success<T: Serialize>(status: StatusCode, message: &str, data: T) -> Response {
    let body = ApiResponse {
        status_code: status.as_u16(),
        message: message.to_string(),
        data: Some(data),
    };
    (status, Json(body)).into_response()
}

impl IntoResponse for WikiError {
    fn into_response(self) -> Response {
        let (status, detail) = match &self {
            WikiError::Validation(message) => (StatusCode::BAD_REQUEST, message.clone()),
            WikiError::NotFound(message) => (StatusCode::NOT_FOUND, message.clone()),
            WikiError::Storage(e) => {
                error!("Storage failure: {:#}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error".to_string())
            }
        };
        let body = ErrorBody {
            status_code: status.as_u16(),
            message: status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string(),
            error: detail,
        };
        (status, Json(body)).into_response()
    }
}

// Malformed bodies, queries and paths answer with the same error envelope
// as every other validation failure.
impl From<JsonRejection> for WikiError {
    fn from(rejection: JsonRejection) -> Self {
        WikiError::validation(rejection.body_text())
    }
}

impl From<QueryRejection> for WikiError {
    fn from(rejection: QueryRejection) -> Self {
        WikiError::validation(rejection.body_text())
    }
}

impl From<PathRejection> for WikiError {
    fn from(rejection: PathRejection) -> Self {
        WikiError::validation(rejection.body_text())
    }
}

/// The bearer token from `Authorization`, if any.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn app_language(headers: &HeaderMap, default: i32) -> i32 {
    headers
        .get(APP_LANGUAGE_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[derive(Debug, Default, Deserialize)]
pub struct TypeParams {
    #[serde(rename = "type", default)]
    pub wiki_type: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct CodeParams {
    #[serde(default)]
    pub code: String,
    #[serde(rename = "type", default)]
    pub wiki_type: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub language: Option<i32>,
    #[serde(rename = "type")]
    pub wiki_type: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LanguageParams {
    pub language: Option<i32>,
}

async fn health() -> Response {
    success(StatusCode::OK, "ok", serde_json::json!({ "status": "healthy" }))
}

async fn create_template<R: WikiRepository>(
    State(state): State<Arc<AppState<R>>>,
    headers: HeaderMap,
    request: Result<Json<CreateTemplateRequest>, JsonRejection>,
) -> Result<Response, WikiError> {
    let Json(request) = request?;
    let report = state
        .service
        .create_template(request, bearer_token(&headers))
        .await?;
    Ok(success(
        StatusCode::CREATED,
        "Wiki template created successfully",
        report,
    ))
}

async fn get_template<R: WikiRepository>(
    State(state): State<Arc<AppState<R>>>,
    params: Result<Query<TypeParams>, QueryRejection>,
) -> Result<Response, WikiError> {
    let Query(params) = params?;
    let template = state.service.get_template(&params.wiki_type).await?;
    Ok(success(StatusCode::OK, "Template fetched successfully", template))
}

async fn statistics<R: WikiRepository>(
    State(state): State<Arc<AppState<R>>>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Response, WikiError> {
    let Query(params) = params?;
    let stats = state
        .service
        .statistics(
            params.page.unwrap_or(1),
            params.limit.unwrap_or(state.default_page_limit),
            params.wiki_type.as_deref(),
            params.search.as_deref(),
        )
        .await?;
    Ok(success(StatusCode::OK, "Statistics fetched successfully", stats))
}

async fn get_by_code<R: WikiRepository>(
    State(state): State<Arc<AppState<R>>>,
    headers: HeaderMap,
    params: Result<Query<CodeParams>, QueryRejection>,
) -> Result<Response, WikiError> {
    let Query(params) = params?;
    let language = app_language(&headers, state.default_app_language);
    let wiki = state
        .service
        .get_by_code(
            &params.code,
            &params.wiki_type,
            Some(language),
            bearer_token(&headers),
        )
        .await?;
    Ok(success(StatusCode::OK, "Wiki fetched successfully", wiki))
}

async fn list<R: WikiRepository>(
    State(state): State<Arc<AppState<R>>>,
    headers: HeaderMap,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Response, WikiError> {
    let Query(params) = params?;
    let listing = WikiListing {
        page: params.page.unwrap_or(1),
        limit: params.limit.unwrap_or(state.default_page_limit),
        language: params.language,
        wiki_type: params.wiki_type.unwrap_or_default(),
        search: params.search,
    };
    let page = state.service.list(&listing, bearer_token(&headers)).await?;
    Ok(success(StatusCode::OK, "Wikis fetched successfully", page))
}

async fn get_by_id<R: WikiRepository>(
    State(state): State<Arc<AppState<R>>>,
    headers: HeaderMap,
    id: Result<Path<String>, PathRejection>,
    params: Result<Query<LanguageParams>, QueryRejection>,
) -> Result<Response, WikiError> {
    let Path(id) = id?;
    let Query(params) = params?;
    let wiki = state
        .service
        .get_by_id(&id, params.language, bearer_token(&headers))
        .await?;
    Ok(success(StatusCode::OK, "Wiki fetched successfully", wiki))
}

async fn update<R: WikiRepository>(
    State(state): State<Arc<AppState<R>>>,
    id: Result<Path<String>, PathRejection>,
    request: Result<Json<UpdateWikiRequest>, JsonRejection>,
) -> Result<Response, WikiError> {
    let Path(id) = id?;
    let Json(request) = request?;
    let report = state.service.update(&id, request).await?;
    Ok(success(StatusCode::OK, "Wiki updated successfully", report))
}

/// Build the API router with all routes.
pub fn router<R: WikiRepository>(state: Arc<AppState<R>>) -> Router {
    Router::new()
        .route("/api/v1/health", get(health))
        .route(
            "/api/v1/wikis/template",
            post(create_template::<R>).get(get_template::<R>),
        )
        .route("/api/v1/wikis/statistics", get(statistics::<R>))
        .route("/api/v1/wikis/code", get(get_by_code::<R>))
        .route("/api/v1/wikis", get(list::<R>))
        .route("/api/v1/wikis/:id", get(get_by_id::<R>).put(update::<R>))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "request",
                        method = %request.method(),
                        uri = %request.uri(),
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     _span: &tracing::Span| {
                        let status = response.status();
                        if status.is_server_error() {
                            tracing::error!(status = %status, latency_ms = latency.as_millis(), "request failed");
                        } else if !status.is_success() {
                            tracing::warn!(status = %status, latency_ms = latency.as_millis(), "request rejected");
                        } else {
                            tracing::debug!(status = %status, latency_ms = latency.as_millis(), "request completed");
                        }
                    },
                ),
        )
        .with_state(state)
}

/// Serve `router` on `listener` until Ctrl-C.
pub async fn serve(listener: tokio::net::TcpListener, router: Router) -> Result<()> {
    info!(
        "Listening on {}",
        listener.local_addr().context("Failed to read local address")?
    );
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutdown signal received");
}
