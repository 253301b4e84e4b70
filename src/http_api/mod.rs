use std::{net::SocketAddr, sync::Arc};

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{NaiveDate, NaiveTime, Weekday};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    AttendanceReport, CalendarSnapshot, CandidatePeriod, ConflictCheck, EngineError,
    ExcludeTarget, ExclusionReason, Occurrence, ResourceConflict, ResourceKind, ResourceRef,
    SchedulingEngine, Scope,
};

type SharedEngine = Arc<RwLock<SchedulingEngine<CalendarSnapshot>>>;

#[derive(Clone)]
pub struct AppState {
    engine: SharedEngine,
}

impl AppState {
    pub fn new(engine: SchedulingEngine<CalendarSnapshot>) -> Self {
        Self {
            engine: Arc::new(RwLock::new(engine)),
        }
    }

    fn engine(&self) -> SharedEngine {
        self.engine.clone()
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

#[derive(Debug)]
enum ApiError {
    NotFound(String),
    Conflict(String, Option<serde_json::Value>),
    Invalid(String),
    Internal(String),
}

impl ApiError {
    fn invalid(message: impl Into<String>) -> Self {
        ApiError::Invalid(message.into())
    }
}

impl From<EngineError> for ApiError {
    fn from(value: EngineError) -> Self {
        let message = value.to_string();
        match value {
            EngineError::NotFound { .. } => ApiError::NotFound(message),
            EngineError::InvalidRange { .. }
            | EngineError::RangeTooLarge { .. }
            | EngineError::InvalidInput(_) => ApiError::Invalid(message),
            EngineError::InvalidState(violation) => {
                ApiError::Conflict(message, serde_json::to_value(&violation).ok())
            }
            EngineError::Computation(_) | EngineError::Store(_) => ApiError::Internal(message),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message, details) = match self {
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, "not_found", message, None),
            ApiError::Conflict(message, details) => {
                (StatusCode::CONFLICT, "conflict", message, details)
            }
            ApiError::Invalid(message) => {
                (StatusCode::BAD_REQUEST, "invalid_request", message, None)
            }
            ApiError::Internal(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                message,
                None,
            ),
        };
        let body = Json(ErrorBody {
            error,
            message,
            details,
        });
        (status, body).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct RangeQuery {
    start: NaiveDate,
    end: NaiveDate,
}

#[derive(Debug, Deserialize)]
struct AvailabilityQuery {
    term: i32,
    weekday: Weekday,
    start: String,
    end: String,
}

#[derive(Debug, Deserialize)]
struct ConflictPayload {
    candidate: CandidatePeriod,
    #[serde(default)]
    exclude: Option<ExcludeTarget>,
}

#[derive(Debug, Deserialize)]
struct AttendanceCheckPayload {
    date: NaiveDate,
}

#[derive(Debug, Deserialize)]
struct ExcludedQuery {
    date: NaiveDate,
    #[serde(default)]
    campus: Option<i32>,
    #[serde(default)]
    period: Option<i32>,
}

#[derive(Debug, Serialize)]
struct ExcludedResponse {
    date: NaiveDate,
    excluded: bool,
    reasons: Vec<ExclusionReason>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/patterns/:id/occurrences", get(pattern_occurrences))
        .route("/resources/:kind/:id/availability", get(resource_availability))
        .route("/conflicts", post(schedule_conflicts))
        .route("/classes/:id/effective-days", get(effective_days))
        .route("/classes/:id/attendance", get(attendance_report))
        .route("/classes/:id/attendance/check", post(attendance_check))
        .route("/excluded", get(excluded_date))
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, engine: SchedulingEngine<CalendarSnapshot>) -> std::io::Result<()> {
    let state = AppState::new(engine);
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}

fn parse_time(input: &str) -> Result<NaiveTime, ApiError> {
    NaiveTime::parse_from_str(input.trim(), "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(input.trim(), "%H:%M:%S"))
        .map_err(|_| ApiError::invalid(format!("invalid time '{input}' (expected HH:MM)")))
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn pattern_occurrences(
    State(state): State<AppState>,
    Path(pattern_id): Path<i32>,
    Query(query): Query<RangeQuery>,
) -> Result<Json<Vec<Occurrence>>, ApiError> {
    let engine = state.engine();
    let occurrences = {
        let guard = engine.read();
        guard.generate_occurrences(pattern_id, query.start, query.end)?
    };
    Ok(Json(occurrences))
}

async fn resource_availability(
    State(state): State<AppState>,
    Path((kind, resource_id)): Path<(String, i32)>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<ConflictCheck>, ApiError> {
    let kind = kind.parse::<ResourceKind>().map_err(ApiError::invalid)?;
    let start = parse_time(&query.start)?;
    let end = parse_time(&query.end)?;
    let resource = ResourceRef {
        kind,
        id: resource_id,
    };
    let engine = state.engine();
    let check = {
        let guard = engine.read();
        guard.check_resource_availability(resource, query.term, query.weekday, start, end, None)?
    };
    Ok(Json(check))
}

async fn schedule_conflicts(
    State(state): State<AppState>,
    Json(payload): Json<ConflictPayload>,
) -> Result<Json<Vec<ResourceConflict>>, ApiError> {
    let engine = state.engine();
    let conflicts = {
        let guard = engine.read();
        guard.check_schedule_conflicts(&payload.candidate, payload.exclude)?
    };
    Ok(Json(conflicts))
}

async fn effective_days(
    State(state): State<AppState>,
    Path(class_id): Path<i32>,
    Query(query): Query<RangeQuery>,
) -> Result<Json<Vec<NaiveDate>>, ApiError> {
    let engine = state.engine();
    let days = {
        let guard = engine.read();
        guard.compute_effective_days(class_id, query.start, query.end)?
    };
    Ok(Json(days))
}

async fn attendance_report(
    State(state): State<AppState>,
    Path(class_id): Path<i32>,
    Query(query): Query<RangeQuery>,
) -> Result<Json<AttendanceReport>, ApiError> {
    let engine = state.engine();
    let report = {
        let guard = engine.read();
        guard.compute_attendance_stats(class_id, query.start, query.end)?
    };
    Ok(Json(report))
}

async fn attendance_check(
    State(state): State<AppState>,
    Path(class_id): Path<i32>,
    Json(payload): Json<AttendanceCheckPayload>,
) -> Result<StatusCode, ApiError> {
    let engine = state.engine();
    {
        let guard = engine.read();
        guard.ensure_attendance_markable(class_id, payload.date)?;
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn excluded_date(
    State(state): State<AppState>,
    Query(query): Query<ExcludedQuery>,
) -> Result<Json<ExcludedResponse>, ApiError> {
    let scope = Scope {
        campus_id: query.campus,
        academic_period_id: query.period,
    };
    let engine = state.engine();
    let reasons = {
        let guard = engine.read();
        guard
            .excluded_dates(query.date, query.date, scope)?
            .remove(&query.date)
            .unwrap_or_default()
    };
    Ok(Json(ExcludedResponse {
        date: query.date,
        excluded: !reasons.is_empty(),
        reasons,
    }))
}
