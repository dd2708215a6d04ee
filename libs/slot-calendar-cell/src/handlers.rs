use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use axum_extra::TypedHeader;
use chrono::NaiveDate;
use headers::{authorization::Bearer, Authorization};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use shared_models::auth::{SessionContext, User};
use shared_models::error::AppError;

use crate::models::{AdjustmentOverride, BuildSlotRequest, DateRange};
use crate::router::CalendarState;

#[derive(Debug, Deserialize)]
pub struct DoctorQuery {
    pub doctor_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CalendarQuery {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub doctor_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ConflictCheckBody {
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
    pub exclude_slot_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateSlotBody {
    #[serde(flatten)]
    pub request: BuildSlotRequest,
    #[serde(default)]
    pub proceed_anyway: bool,
}

#[derive(Debug, Deserialize)]
pub struct ReplaceSlotBody {
    #[serde(flatten)]
    pub request: BuildSlotRequest,
    pub version: Option<u64>,
    #[serde(default)]
    pub proceed_anyway: bool,
}

/// A doctor account only ever works on its own schedule; without an
/// explicit `doctor_id` it is scoped to itself, never to the facility default.
fn session_for(
    user: &User,
    facility_id: String,
    auth: &Authorization<Bearer>,
    doctor_id: Option<String>,
) -> Result<SessionContext, AppError> {
    let doctor_id = doctor_id.filter(|id| !id.trim().is_empty());

    if user.role.as_deref() == Some("doctor") {
        if let Some(requested) = doctor_id.as_deref() {
            if requested != user.id {
                warn!("Doctor {} tried to manage schedule of {}", user.id, requested);
                return Err(AppError::Forbidden(
                    "Not authorized to manage another doctor's schedule".to_string(),
                ));
            }
        }
        return Ok(SessionContext::new(user, facility_id, auth.token()).with_doctor(Some(user.id.clone())));
    }

    Ok(SessionContext::new(user, facility_id, auth.token()).with_doctor(doctor_id))
}

fn date_range(from: NaiveDate, to: NaiveDate) -> Result<DateRange, AppError> {
    DateRange::new(from, to).map_err(AppError::from)
}

#[axum::debug_handler]
pub async fn check_conflict(
    State(state): State<Arc<CalendarState>>,
    Path(facility_id): Path<String>,
    Query(query): Query<DoctorQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(body): Json<ConflictCheckBody>,
) -> Result<Json<Value>, AppError> {
    let session = session_for(&user, facility_id, &auth, query.doctor_id)?;
    let range = date_range(body.from_date, body.to_date)?;

    let outcome = state
        .service
        .check_conflict(&session, range, body.exclude_slot_id.as_deref())
        .await?;

    Ok(Json(json!(outcome)))
}

#[axum::debug_handler]
pub async fn create_slot(
    State(state): State<Arc<CalendarState>>,
    Path(facility_id): Path<String>,
    Query(query): Query<DoctorQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(body): Json<CreateSlotBody>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let doctor_id = body.request.doctor_id.clone().or(query.doctor_id);
    let session = session_for(&user, facility_id, &auth, doctor_id)?;

    let definition = state
        .service
        .create_definition(&session, &body.request, body.proceed_anyway)
        .await?;

    Ok((StatusCode::CREATED, Json(json!(definition))))
}

#[axum::debug_handler]
pub async fn get_slot(
    State(state): State<Arc<CalendarState>>,
    Path((facility_id, slot_id)): Path<(String, String)>,
    Query(query): Query<DoctorQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let session = session_for(&user, facility_id, &auth, query.doctor_id)?;
    let definition = state.service.fetch_definition(&session, &slot_id).await?;
    Ok(Json(json!(definition)))
}

#[axum::debug_handler]
pub async fn replace_slot(
    State(state): State<Arc<CalendarState>>,
    Path((facility_id, slot_id)): Path<(String, String)>,
    Query(query): Query<DoctorQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(body): Json<ReplaceSlotBody>,
) -> Result<Json<Value>, AppError> {
    let doctor_id = body.request.doctor_id.clone().or(query.doctor_id);
    let session = session_for(&user, facility_id, &auth, doctor_id)?;

    let definition = state
        .service
        .replace_definition(&session, &slot_id, &body.request, body.version, body.proceed_anyway)
        .await?;

    Ok(Json(json!(definition)))
}

#[axum::debug_handler]
pub async fn get_calendar(
    State(state): State<Arc<CalendarState>>,
    Path(facility_id): Path<String>,
    Query(query): Query<CalendarQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let session = session_for(&user, facility_id, &auth, query.doctor_id)?;
    let range = date_range(query.from, query.to)?;

    let statuses = state.service.calendar(&session, range).await?;
    Ok(Json(json!({
        "facility_id": session.facility_id,
        "doctor_id": session.doctor_id,
        "dates": statuses,
    })))
}

#[axum::debug_handler]
pub async fn get_remote_calendar(
    State(state): State<Arc<CalendarState>>,
    Path(facility_id): Path<String>,
    Query(query): Query<CalendarQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let session = session_for(&user, facility_id, &auth, query.doctor_id)?;
    let range = date_range(query.from, query.to)?;

    let statuses = state.service.remote_calendar(&session, range).await?;
    Ok(Json(json!({
        "facility_id": session.facility_id,
        "doctor_id": session.doctor_id,
        "dates": statuses,
    })))
}

#[axum::debug_handler]
pub async fn get_day(
    State(state): State<Arc<CalendarState>>,
    Path((facility_id, date)): Path<(String, NaiveDate)>,
    Query(query): Query<DoctorQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let session = session_for(&user, facility_id, &auth, query.doctor_id)?;
    let view = state.service.day_view(&session, date).await?;
    Ok(Json(json!({
        "free_places": view.free_places(),
        "view": view,
    })))
}

#[axum::debug_handler]
pub async fn put_adjustment(
    State(state): State<Arc<CalendarState>>,
    Path((facility_id, slot_id, date)): Path<(String, String, NaiveDate)>,
    Query(query): Query<DoctorQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(change): Json<AdjustmentOverride>,
) -> Result<Json<Value>, AppError> {
    let session = session_for(&user, facility_id, &auth, query.doctor_id)?;
    let adjustment = state
        .service
        .apply_adjustment(&session, &slot_id, date, change)
        .await?;
    Ok(Json(json!(adjustment)))
}

#[axum::debug_handler]
pub async fn delete_adjustment(
    State(state): State<Arc<CalendarState>>,
    Path((facility_id, slot_id, date)): Path<(String, String, NaiveDate)>,
    Query(query): Query<DoctorQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<StatusCode, AppError> {
    let session = session_for(&user, facility_id, &auth, query.doctor_id)?;
    state.service.revert_adjustment(&session, &slot_id, date).await?;
    Ok(StatusCode::NO_CONTENT)
}
