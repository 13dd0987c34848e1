//! Axum-based HTTP server with optional OpenAPI (utoipa) and Swagger UI

use crate::config::EntityConfig;
use crate::coordinator::CoordinatorRegistry;
use crate::error::TariffError;
use crate::search::search_municipalities;
use crate::sensor::{current_report, render};
use crate::sparql::SparqlClient;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::WatchStream;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<CoordinatorRegistry>,
    pub client: SparqlClient,
}

#[derive(Debug, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema, utoipa::IntoParams))]
#[cfg_attr(feature = "openapi", into_params(parameter_in = Query))]
pub struct SearchParams {
    pub q: Option<String>,
}

type ApiError = (StatusCode, Json<serde_json::Value>);

fn error_body(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(serde_json::json!({"error": message.into()})))
}

fn map_error(err: &TariffError) -> ApiError {
    let status = match err {
        TariffError::InvalidSearchTerm { .. } | TariffError::Validation { .. } => {
            StatusCode::BAD_REQUEST
        }
        TariffError::Transport { .. }
        | TariffError::Timeout { .. }
        | TariffError::MalformedResponse { .. } => StatusCode::BAD_GATEWAY,
        TariffError::Cancelled { .. } => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_body(status, err.to_string())
}

fn not_found(id: &str) -> ApiError {
    error_body(StatusCode::NOT_FOUND, format!("Unknown entity '{}'", id))
}

#[cfg_attr(feature = "openapi", utoipa::path(get, path = "/api/health", responses(
    (status = 200, description = "Service is healthy")
)))]
async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

#[cfg_attr(feature = "openapi", utoipa::path(get, path = "/api/tariffs", responses(
    (status = 200, description = "Reports for every configured entity")
)))]
async fn list_tariffs(State(state): State<AppState>) -> impl IntoResponse {
    let reports: Vec<_> = state.registry.iter().map(current_report).collect();
    Json(reports)
}

#[cfg_attr(feature = "openapi", utoipa::path(get, path = "/api/tariffs/{id}", params(("id" = String, Path, description = "Entity id")), responses(
    (status = 200, description = "Report for one entity"),
    (status = 404, description = "Unknown entity")
)))]
async fn get_tariff(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let handle = state.registry.get(&id).ok_or_else(|| not_found(&id))?;
    Ok(Json(current_report(handle)))
}

#[cfg_attr(feature = "openapi", utoipa::path(post, path = "/api/tariffs/{id}/refresh", params(("id" = String, Path, description = "Entity id")), responses(
    (status = 202, description = "Refresh scheduled"),
    (status = 404, description = "Unknown entity")
)))]
async fn refresh_tariff(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let handle = state.registry.get(&id).ok_or_else(|| not_found(&id))?;
    handle.trigger_now().map_err(|e| map_error(&e))?;
    Ok((StatusCode::ACCEPTED, Json(serde_json::json!({"ok": true}))))
}

#[cfg_attr(feature = "openapi", utoipa::path(put, path = "/api/tariffs/{id}/config", params(("id" = String, Path, description = "Entity id")), responses(
    (status = 200, description = "Entity reconfigured"),
    (status = 400, description = "Invalid entity configuration"),
    (status = 404, description = "Unknown entity")
)))]
async fn put_entity_config(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<serde_json::Value>,
) -> Result<impl IntoResponse, ApiError> {
    let handle = state.registry.get(&id).ok_or_else(|| not_found(&id))?;
    let entity: EntityConfig = serde_json::from_value(body)
        .map_err(|e| error_body(StatusCode::BAD_REQUEST, e.to_string()))?;
    handle.reconfigure(entity).map_err(|e| map_error(&e))?;
    Ok((StatusCode::OK, Json(serde_json::json!({"ok": true}))))
}

#[cfg_attr(feature = "openapi", utoipa::path(get, path = "/api/tariffs/{id}/events", params(("id" = String, Path, description = "Entity id")), responses(
    (status = 200, description = "Server-sent report updates"),
    (status = 404, description = "Unknown entity")
)))]
async fn tariff_events(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let handle = state.registry.get(&id).ok_or_else(|| not_found(&id))?;
    let snapshot_rx = handle.subscribe();
    let entity_rx = handle.subscribe_entity();

    // status is published after the snapshot, so each status change carries a fresh report
    let stream = WatchStream::new(handle.subscribe_status()).filter_map(move |status| {
        let snapshot = snapshot_rx.borrow().clone();
        let entity = entity_rx.borrow().clone();
        let report = render(&entity, snapshot.as_deref(), &status);
        Event::default()
            .event("report")
            .json_data(&report)
            .ok()
            .map(Ok::<Event, std::convert::Infallible>)
    });
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

#[cfg_attr(feature = "openapi", utoipa::path(get, path = "/api/search", params(SearchParams), responses(
    (status = 200, description = "Ranked municipality matches"),
    (status = 400, description = "Empty search term"),
    (status = 502, description = "Endpoint unreachable or malformed answer")
)))]
async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<impl IntoResponse, ApiError> {
    let term = params.q.unwrap_or_default();
    let matches = search_municipalities(&state.client, &term)
        .await
        .map_err(|e| map_error(&e))?;
    Ok(Json(matches))
}

#[cfg_attr(feature = "openapi", utoipa::path(get, path = "/api/config/schema", responses((status = 200))))]
async fn get_config_schema() -> impl IntoResponse {
    let schema = schemars::schema_for!(crate::config::Config);
    Json(serde_json::to_value(&schema).unwrap_or(serde_json::json!({"error":"schema"})))
}

#[cfg(feature = "openapi")]
#[derive(utoipa::OpenApi)]
#[openapi(
    paths(
        health, list_tariffs, get_tariff, refresh_tariff, put_entity_config,
        tariff_events, search, get_config_schema,
    ),
    components(schemas(SearchParams)),
    tags((name = "elcom-tariffs", description = "Swiss electricity tariffs API"))
)]
pub struct ApiDoc;

pub fn build_router(state: AppState) -> Router {
    let router = Router::new()
        .route("/api/health", get(health))
        .route("/api/tariffs", get(list_tariffs))
        .route("/api/tariffs/{id}", get(get_tariff))
        .route("/api/tariffs/{id}/refresh", post(refresh_tariff))
        .route("/api/tariffs/{id}/config", axum::routing::put(put_entity_config))
        .route("/api/tariffs/{id}/events", get(tariff_events))
        .route("/api/search", get(search))
        .route("/api/config/schema", get(get_config_schema));

    #[cfg(feature = "openapi")]
    let router = {
        use utoipa::OpenApi;
        router.merge(utoipa_swagger_ui::SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
    };

    router
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Bind and serve until `shutdown` resolves
pub async fn serve<F>(state: AppState, host: &str, port: u16, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let router = build_router(state);
    let logger = crate::logging::get_logger("web");
    logger.info(&format!(
        "Starting web server; requested host={}, port={}",
        host, port
    ));

    let addr = match host.parse::<IpAddr>() {
        Ok(ip) => SocketAddr::new(ip, port),
        Err(_) => {
            logger.warn(&format!("Invalid host '{}'; falling back to 127.0.0.1", host));
            ([127, 0, 0, 1], port).into()
        }
    };

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    logger.info(&format!(
        "Web server listening at http://{}:{} (API /api)",
        local_addr.ip(),
        local_addr.port()
    ));

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;
    logger.info("Web server stopped");
    Ok(())
}
