use crate::api::{ApiJson, ApiResponse, AppState};
use crate::error::Result;
use crate::models::{timestamp, Incident, IncidentPatch, NewIncident, TranscriptMessage};
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Health check endpoint
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: timestamp::format(&Utc::now()),
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

/// Create an incident
pub async fn create_incident(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<NewIncident>,
) -> Result<Json<ApiResponse<Incident>>> {
    let created = state.repository.create(payload).await?;
    Ok(Json(ApiResponse::success(created)))
}

/// List incidents in the active index
pub async fn list_incidents(
    State(state): State<AppState>,
    Query(params): Query<ListIncidentsQuery>,
) -> Result<Json<ApiResponse<Vec<Incident>>>> {
    // An empty `status=` means no filter
    let status = params.status.as_deref().filter(|s| !s.is_empty());

    let incidents = state.repository.list_by_status(status).await?;
    Ok(Json(ApiResponse::success(incidents)))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListIncidentsQuery {
    pub status: Option<String>,
}

/// Get an incident by ID
pub async fn get_incident(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Incident>>> {
    let incident = state.repository.get(&id).await?;
    Ok(Json(ApiResponse::success(incident)))
}

/// Append a transcript message
pub async fn append_transcript(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(message): ApiJson<TranscriptMessage>,
) -> Result<Json<ApiResponse<Incident>>> {
    let incident = state.repository.append_transcript(&id, message).await?;
    Ok(Json(ApiResponse::success(incident)))
}

/// Partially update an incident
pub async fn patch_incident(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(updates): ApiJson<IncidentPatch>,
) -> Result<Json<ApiResponse<Incident>>> {
    let incident = state.repository.patch(&id, updates).await?;
    Ok(Json(ApiResponse::success(incident)))
}

/// Prometheus metrics endpoint
pub async fn metrics() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        crate::metrics::gather_metrics(),
    )
}
