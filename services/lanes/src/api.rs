use crate::config::ApiConfig;
use crate::date_range::format_date_range;
use crate::media_store::MediaStore;
use crate::ordering::PositionUpdate;
use crate::recompute::Recomputer;
use crate::store::{
    EventChanges, EventRecord, ImageRecord, LaneChanges, LaneRecord, LaneStats, LaneStore,
    NewEvent, NewImage, NewLane, NewUser, StoreError, UserRecord,
};
use anyhow::Context;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument};
use uuid::Uuid;

/// Concurrent presign requests per share page
const PRESIGN_CONCURRENCY: usize = 8;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<LaneStore>,
    pub media: Arc<MediaStore>,
    pub recomputer: Recomputer,
    pub presigned_url_expiry: Duration,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);
type ApiResult<T> = Result<Json<T>, ApiError>;

/// Base64 serialization helper for raw image bytes
mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(s).map_err(serde::de::Error::custom)
    }
}

/// Base64 serialization helper for optional image bytes
mod base64_opt {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match bytes {
            Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: Option<String> = Option::deserialize(deserializer)?;
        s.map(|s| STANDARD.decode(s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

// ---- request/response types ----

/// User sign-up request
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub description: Option<String>,
    pub avatar_url: Option<String>,
}

/// User in API responses
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub description: Option<String>,
    pub avatar_url: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<UserRecord> for UserResponse {
    fn from(u: UserRecord) -> Self {
        Self {
            id: u.id,
            username: u.username,
            first_name: u.first_name,
            last_name: u.last_name,
            description: u.description,
            avatar_url: u.avatar_url,
            active: u.active,
            created_at: u.created_at,
        }
    }
}

/// Lane creation request; the owner is the acting user
#[derive(Debug, Deserialize)]
pub struct CreateLaneRequest {
    pub title: String,
    pub description: Option<String>,
    pub cover_image_url: Option<String>,
    #[serde(default)]
    pub is_public: bool,
}

/// Partial lane update
#[derive(Debug, Deserialize)]
pub struct UpdateLaneRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub cover_image_url: Option<String>,
    pub is_public: Option<bool>,
}

/// Lane in API responses, with the formatted date range alongside the bounds
#[derive(Debug, Serialize)]
pub struct LaneResponse {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub cover_image_url: Option<String>,
    pub is_public: bool,
    pub date_range_start: Option<NaiveDate>,
    pub date_range_end: Option<NaiveDate>,
    /// Human-readable date range, e.g. "January - June 2023"
    pub date_range: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<LaneRecord> for LaneResponse {
    fn from(l: LaneRecord) -> Self {
        let range = match (l.date_range_start, l.date_range_end) {
            (Some(start), Some(end)) => Some((start, end)),
            _ => None,
        };
        Self {
            id: l.id,
            owner_id: l.owner_id,
            title: l.title,
            description: l.description,
            cover_image_url: l.cover_image_url,
            is_public: l.is_public,
            date_range_start: l.date_range_start,
            date_range_end: l.date_range_end,
            date_range: format_date_range(range),
            created_at: l.created_at,
            updated_at: l.updated_at,
        }
    }
}

/// Query parameters for lane listing
#[derive(Debug, Deserialize)]
pub struct LaneListQuery {
    pub owner_id: Uuid,
}

/// Event creation request; the position is allocated server-side
#[derive(Debug, Deserialize)]
pub struct CreateEventRequest {
    pub title: String,
    pub event_date: NaiveDate,
    pub description: Option<String>,
    pub location: Option<String>,
}

/// Partial event update
#[derive(Debug, Deserialize)]
pub struct UpdateEventRequest {
    pub title: Option<String>,
    pub event_date: Option<NaiveDate>,
    pub description: Option<String>,
    pub location: Option<String>,
}

/// Event in API responses
#[derive(Debug, Serialize)]
pub struct EventResponse {
    pub id: Uuid,
    pub lane_id: Uuid,
    pub title: String,
    pub event_date: NaiveDate,
    pub position: i32,
    pub description: Option<String>,
    pub location: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<EventRecord> for EventResponse {
    fn from(e: EventRecord) -> Self {
        Self {
            id: e.id,
            lane_id: e.lane_id,
            title: e.title,
            event_date: e.event_date,
            position: e.position,
            description: e.description,
            location: e.location,
            created_at: e.created_at,
            updated_at: e.updated_at,
        }
    }
}

/// One entry of an explicit reorder batch
#[derive(Debug, Deserialize)]
pub struct PositionAssignment {
    pub id: Uuid,
    pub position: i32,
}

/// Explicit reorder request for a lane's events
#[derive(Debug, Deserialize)]
pub struct ReorderRequest {
    pub assignments: Vec<PositionAssignment>,
}

/// Image upload request; bytes travel base64-encoded
#[derive(Debug, Serialize, Deserialize)]
pub struct UploadImageRequest {
    /// Full-size image bytes
    #[serde(with = "base64_bytes")]
    pub image_data: Vec<u8>,
    /// Image format (jpeg, png, ...)
    pub format: String,
    /// Pre-scaled thumbnail bytes, if the client produced one
    #[serde(default, with = "base64_opt")]
    pub thumbnail_data: Option<Vec<u8>>,
    pub alt_text: Option<String>,
    /// Promote this image to the event's primary on insert
    #[serde(default)]
    pub make_primary: bool,
}

/// Image in API responses
#[derive(Debug, Serialize)]
pub struct ImageResponse {
    pub id: Uuid,
    pub event_id: Uuid,
    pub url: String,
    pub thumbnail_url: Option<String>,
    pub alt_text: Option<String>,
    pub position: i32,
    /// Projection of `position == 0`
    pub is_primary: bool,
    pub created_at: DateTime<Utc>,
}

impl From<ImageRecord> for ImageResponse {
    fn from(i: ImageRecord) -> Self {
        let is_primary = i.is_primary();
        Self {
            id: i.id,
            event_id: i.event_id,
            url: i.url,
            thumbnail_url: i.thumbnail_url,
            alt_text: i.alt_text,
            position: i.position,
            is_primary,
            created_at: i.created_at,
        }
    }
}

/// Image on a public share page, with a time-limited access URL
#[derive(Debug, Serialize)]
pub struct ShareImage {
    #[serde(flatten)]
    pub image: ImageResponse,
    pub presigned_url: Option<String>,
    pub presigned_expires_at: Option<DateTime<Utc>>,
}

/// Event on a public share page
#[derive(Debug, Serialize)]
pub struct ShareEvent {
    #[serde(flatten)]
    pub event: EventResponse,
    pub images: Vec<ShareImage>,
}

/// Public share page for a lane
#[derive(Debug, Serialize)]
pub struct ShareResponse {
    pub lane: LaneResponse,
    pub events: Vec<ShareEvent>,
}

// ---- helpers ----

/// Extract the acting user from the `x-actor-id` header.
///
/// Every mutating route requires an explicit actor; there is no ambient
/// current-user state anywhere in the service.
fn actor_id(headers: &HeaderMap) -> Result<Uuid, ApiError> {
    headers
        .get("x-actor-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v).ok())
        .ok_or_else(|| {
            (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "Missing or invalid x-actor-id header".to_string(),
                    code: "MISSING_ACTOR".to_string(),
                }),
            )
        })
}

fn forbidden() -> ApiError {
    (
        StatusCode::FORBIDDEN,
        Json(ErrorResponse {
            error: "Resource is owned by another user".to_string(),
            code: "FORBIDDEN".to_string(),
        }),
    )
}

/// Map a store error onto an API error, logging unexpected failures
fn store_error(action: &'static str, err: StoreError) -> ApiError {
    match err {
        StoreError::NotFound(entity) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("{entity} not found"),
                code: "NOT_FOUND".to_string(),
            }),
        ),
        StoreError::InvalidReorder(e) => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: e.to_string(),
                code: "INVALID_REORDER".to_string(),
            }),
        ),
        e => {
            error!(error = %e, action = action, "Store operation failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("Failed to {action}"),
                    code: "STORE_ERROR".to_string(),
                }),
            )
        }
    }
}

fn media_error(action: &'static str, err: anyhow::Error) -> ApiError {
    error!(error = %err, action = action, "Media operation failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: format!("Failed to {action}"),
            code: "MEDIA_ERROR".to_string(),
        }),
    )
}

/// Load a lane and check it is owned by the actor
async fn owned_lane(
    state: &AppState,
    lane_id: Uuid,
    actor: Uuid,
) -> Result<LaneRecord, ApiError> {
    let lane = state
        .store
        .get_lane(lane_id)
        .await
        .map_err(|e| store_error("load lane", e))?;
    if lane.owner_id != actor {
        return Err(forbidden());
    }
    Ok(lane)
}

/// Load an event together with its owning lane, checked against the actor
async fn owned_event(
    state: &AppState,
    event_id: Uuid,
    actor: Uuid,
) -> Result<(EventRecord, LaneRecord), ApiError> {
    let event = state
        .store
        .get_event(event_id)
        .await
        .map_err(|e| store_error("load event", e))?;
    let lane = owned_lane(state, event.lane_id, actor).await?;
    Ok((event, lane))
}

// ---- router ----

/// Create the API router
pub fn create_router(state: AppState, config: &ApiConfig) -> Router {
    let cors = if config.cors_enabled {
        if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    } else {
        CorsLayer::new()
    };

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/api/v1/stats", get(service_stats))
        .route("/api/v1/users", post(create_user))
        .route(
            "/api/v1/users/:username",
            get(get_user).delete(deactivate_user),
        )
        .route("/api/v1/lanes", post(create_lane).get(list_lanes))
        .route(
            "/api/v1/lanes/:lane_id",
            get(get_lane).post(update_lane).delete(delete_lane),
        )
        .route(
            "/api/v1/lanes/:lane_id/events",
            post(create_event).get(list_events),
        )
        .route("/api/v1/lanes/:lane_id/events/reorder", post(reorder_events))
        .route(
            "/api/v1/events/:event_id",
            get(get_event).post(update_event).delete(delete_event),
        )
        .route(
            "/api/v1/events/:event_id/images",
            post(upload_image).get(list_event_images),
        )
        .route("/api/v1/images/:image_id/primary", post(set_primary_image))
        .route("/api/v1/images/:image_id", delete(delete_image))
        .route("/api/v1/share/:lane_id", get(share_lane))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ---- handlers ----

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "lanes-service"
    }))
}

/// Readiness check endpoint
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match sqlx::query("SELECT 1").fetch_one(state.store.pool()).await {
        Ok(_) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ready",
                "database": "connected"
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "not_ready",
                "database": "disconnected",
                "error": e.to_string()
            })),
        ),
    }
}

/// Service-wide record counts
async fn service_stats(State(state): State<AppState>) -> ApiResult<LaneStats> {
    let stats = state
        .store
        .stats()
        .await
        .map_err(|e| store_error("load stats", e))?;
    Ok(Json(stats))
}

/// Register a new user
#[instrument(skip(state, request), fields(username = %request.username))]
async fn create_user(
    State(state): State<AppState>,
    Json(request): Json<CreateUserRequest>,
) -> ApiResult<UserResponse> {
    let user = state
        .store
        .create_user(NewUser {
            username: request.username,
            first_name: request.first_name,
            last_name: request.last_name,
            description: request.description,
            avatar_url: request.avatar_url,
        })
        .await
        .map_err(|e| store_error("create user", e))?;

    Ok(Json(user.into()))
}

/// Profile lookup by username
#[instrument(skip(state))]
async fn get_user(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> ApiResult<UserResponse> {
    let user = state
        .store
        .get_user_by_username(&username)
        .await
        .map_err(|e| store_error("load user", e))?;

    Ok(Json(user.into()))
}

/// Deactivate the acting user's own account
#[instrument(skip(state, headers))]
async fn deactivate_user(
    State(state): State<AppState>,
    Path(username): Path<String>,
    headers: HeaderMap,
) -> ApiResult<serde_json::Value> {
    let actor = actor_id(&headers)?;
    let user = state
        .store
        .get_user_by_username(&username)
        .await
        .map_err(|e| store_error("load user", e))?;
    if user.id != actor {
        return Err(forbidden());
    }

    state
        .store
        .deactivate_user(user.id)
        .await
        .map_err(|e| store_error("deactivate user", e))?;

    Ok(Json(serde_json::json!({ "deactivated": true })))
}

/// Create a lane owned by the acting user
#[instrument(skip(state, headers, request))]
async fn create_lane(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateLaneRequest>,
) -> ApiResult<LaneResponse> {
    let actor = actor_id(&headers)?;

    let lane = state
        .store
        .create_lane(NewLane {
            owner_id: actor,
            title: request.title,
            description: request.description,
            cover_image_url: request.cover_image_url,
            is_public: request.is_public,
        })
        .await
        .map_err(|e| store_error("create lane", e))?;

    Ok(Json(lane.into()))
}

/// List a user's lanes
#[instrument(skip(state))]
async fn list_lanes(
    State(state): State<AppState>,
    Query(params): Query<LaneListQuery>,
) -> ApiResult<Vec<LaneResponse>> {
    let lanes = state
        .store
        .list_lanes_by_owner(params.owner_id)
        .await
        .map_err(|e| store_error("list lanes", e))?;

    Ok(Json(lanes.into_iter().map(Into::into).collect()))
}

/// Get a single lane
#[instrument(skip(state))]
async fn get_lane(
    State(state): State<AppState>,
    Path(lane_id): Path<Uuid>,
) -> ApiResult<LaneResponse> {
    let lane = state
        .store
        .get_lane(lane_id)
        .await
        .map_err(|e| store_error("load lane", e))?;

    Ok(Json(lane.into()))
}

/// Update a lane's attributes
#[instrument(skip(state, headers, request))]
async fn update_lane(
    State(state): State<AppState>,
    Path(lane_id): Path<Uuid>,
    headers: HeaderMap,
    Json(request): Json<UpdateLaneRequest>,
) -> ApiResult<LaneResponse> {
    let actor = actor_id(&headers)?;
    owned_lane(&state, lane_id, actor).await?;

    let lane = state
        .store
        .update_lane(
            lane_id,
            LaneChanges {
                title: request.title,
                description: request.description,
                cover_image_url: request.cover_image_url,
                is_public: request.is_public,
            },
        )
        .await
        .map_err(|e| store_error("update lane", e))?;

    Ok(Json(lane.into()))
}

/// Soft-delete a lane
#[instrument(skip(state, headers))]
async fn delete_lane(
    State(state): State<AppState>,
    Path(lane_id): Path<Uuid>,
    headers: HeaderMap,
) -> ApiResult<serde_json::Value> {
    let actor = actor_id(&headers)?;
    owned_lane(&state, lane_id, actor).await?;

    state
        .store
        .soft_delete_lane(lane_id)
        .await
        .map_err(|e| store_error("delete lane", e))?;

    Ok(Json(serde_json::json!({ "deleted": true })))
}

/// Append an event to a lane
#[instrument(skip(state, headers, request))]
async fn create_event(
    State(state): State<AppState>,
    Path(lane_id): Path<Uuid>,
    headers: HeaderMap,
    Json(request): Json<CreateEventRequest>,
) -> ApiResult<EventResponse> {
    let actor = actor_id(&headers)?;
    owned_lane(&state, lane_id, actor).await?;

    let event = state
        .store
        .create_event(
            lane_id,
            NewEvent {
                title: request.title,
                event_date: request.event_date,
                description: request.description,
                location: request.location,
            },
        )
        .await
        .map_err(|e| store_error("create event", e))?;

    // Best-effort: the event exists regardless of the range refresh
    state.recomputer.trigger(lane_id);

    Ok(Json(event.into()))
}

/// List a lane's events in display order
#[instrument(skip(state))]
async fn list_events(
    State(state): State<AppState>,
    Path(lane_id): Path<Uuid>,
) -> ApiResult<Vec<EventResponse>> {
    // Listing against a missing lane should 404, not return an empty set
    state
        .store
        .get_lane(lane_id)
        .await
        .map_err(|e| store_error("load lane", e))?;

    let events = state
        .store
        .list_events(lane_id)
        .await
        .map_err(|e| store_error("list events", e))?;

    Ok(Json(events.into_iter().map(Into::into).collect()))
}

/// Apply an explicit reorder batch to a lane's events
#[instrument(skip(state, headers, request), fields(count = request.assignments.len()))]
async fn reorder_events(
    State(state): State<AppState>,
    Path(lane_id): Path<Uuid>,
    headers: HeaderMap,
    Json(request): Json<ReorderRequest>,
) -> ApiResult<Vec<EventResponse>> {
    let actor = actor_id(&headers)?;
    owned_lane(&state, lane_id, actor).await?;

    let assignments: Vec<PositionUpdate> = request
        .assignments
        .iter()
        .map(|a| PositionUpdate {
            id: a.id,
            position: a.position,
        })
        .collect();

    state
        .store
        .reorder_events(lane_id, &assignments)
        .await
        .map_err(|e| store_error("reorder events", e))?;

    let events = state
        .store
        .list_events(lane_id)
        .await
        .map_err(|e| store_error("list events", e))?;

    Ok(Json(events.into_iter().map(Into::into).collect()))
}

/// Get a single event
#[instrument(skip(state))]
async fn get_event(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> ApiResult<EventResponse> {
    let event = state
        .store
        .get_event(event_id)
        .await
        .map_err(|e| store_error("load event", e))?;

    Ok(Json(event.into()))
}

/// Update an event's attributes
#[instrument(skip(state, headers, request))]
async fn update_event(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    headers: HeaderMap,
    Json(request): Json<UpdateEventRequest>,
) -> ApiResult<EventResponse> {
    let actor = actor_id(&headers)?;
    let (before, lane) = owned_event(&state, event_id, actor).await?;

    let event = state
        .store
        .update_event(
            event_id,
            EventChanges {
                title: request.title,
                event_date: request.event_date,
                description: request.description,
                location: request.location,
            },
        )
        .await
        .map_err(|e| store_error("update event", e))?;

    // Only a changed date can move the lane's bounds
    if event.event_date != before.event_date {
        state.recomputer.trigger(lane.id);
    }

    Ok(Json(event.into()))
}

/// Soft-delete an event
#[instrument(skip(state, headers))]
async fn delete_event(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    headers: HeaderMap,
) -> ApiResult<serde_json::Value> {
    let actor = actor_id(&headers)?;
    owned_event(&state, event_id, actor).await?;

    let lane_id = state
        .store
        .soft_delete_event(event_id)
        .await
        .map_err(|e| store_error("delete event", e))?;

    state.recomputer.trigger(lane_id);

    Ok(Json(serde_json::json!({ "deleted": true })))
}

/// List an event's images, primary first
#[instrument(skip(state))]
async fn list_event_images(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> ApiResult<Vec<ImageResponse>> {
    state
        .store
        .get_event(event_id)
        .await
        .map_err(|e| store_error("load event", e))?;

    let images = state
        .store
        .list_images(event_id)
        .await
        .map_err(|e| store_error("list images", e))?;

    Ok(Json(images.into_iter().map(Into::into).collect()))
}

/// Upload an image and attach it to an event
#[instrument(skip(state, headers, request), fields(event_id = %event_id, size_bytes = request.image_data.len()))]
async fn upload_image(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    headers: HeaderMap,
    Json(request): Json<UploadImageRequest>,
) -> ApiResult<ImageResponse> {
    let actor = actor_id(&headers)?;
    let (event, lane) = owned_event(&state, event_id, actor).await?;

    if request.image_data.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "Image payload is empty".to_string(),
                code: "EMPTY_IMAGE".to_string(),
            }),
        ));
    }

    let image_id = Uuid::new_v4();
    let key = state
        .media
        .generate_media_key(lane.id, event.id, image_id, &request.format);

    let size_bytes = request.image_data.len();
    state
        .media
        .upload_image(&key, request.image_data, &request.format)
        .await
        .map_err(|e| media_error("upload image", e))?;

    let (thumbnail_key, thumbnail_url) = match request.thumbnail_data {
        Some(thumbnail) => {
            let thumb_key =
                state
                    .media
                    .generate_thumbnail_key(lane.id, event.id, image_id, &request.format);
            state
                .media
                .upload_image(&thumb_key, thumbnail, &request.format)
                .await
                .map_err(|e| media_error("upload thumbnail", e))?;
            let thumb_url = state.media.public_url(&thumb_key);
            (Some(thumb_key), Some(thumb_url))
        }
        None => (None, None),
    };

    let url = state.media.public_url(&key);
    let image = state
        .store
        .create_image(
            image_id,
            event_id,
            NewImage {
                object_key: key,
                url,
                thumbnail_key,
                thumbnail_url,
                alt_text: request.alt_text,
            },
            request.make_primary,
        )
        .await
        .map_err(|e| store_error("attach image", e))?;

    metrics::counter!("lanes.media.bytes_uploaded").increment(size_bytes as u64);

    Ok(Json(image.into()))
}

/// Promote an image to its event's primary
#[instrument(skip(state, headers))]
async fn set_primary_image(
    State(state): State<AppState>,
    Path(image_id): Path<Uuid>,
    headers: HeaderMap,
) -> ApiResult<ImageResponse> {
    let actor = actor_id(&headers)?;
    let image = state
        .store
        .get_image(image_id)
        .await
        .map_err(|e| store_error("load image", e))?;
    owned_event(&state, image.event_id, actor).await?;

    let image = state
        .store
        .set_primary_image(image_id)
        .await
        .map_err(|e| store_error("promote image", e))?;

    Ok(Json(image.into()))
}

/// Delete an image record and its stored objects.
///
/// The record is removed first; if an object delete fails afterwards the
/// operation reports failure even though the record is already gone. The
/// applied portion is not undone.
#[instrument(skip(state, headers))]
async fn delete_image(
    State(state): State<AppState>,
    Path(image_id): Path<Uuid>,
    headers: HeaderMap,
) -> ApiResult<serde_json::Value> {
    let actor = actor_id(&headers)?;
    let image = state
        .store
        .get_image(image_id)
        .await
        .map_err(|e| store_error("load image", e))?;
    owned_event(&state, image.event_id, actor).await?;

    let record = state
        .store
        .delete_image(image_id)
        .await
        .map_err(|e| store_error("delete image", e))?;

    state
        .media
        .delete_object(&record.object_key)
        .await
        .map_err(|e| media_error("delete image object", e))?;
    if let Some(ref thumbnail_key) = record.thumbnail_key {
        state
            .media
            .delete_object(thumbnail_key)
            .await
            .map_err(|e| media_error("delete thumbnail object", e))?;
    }

    Ok(Json(serde_json::json!({ "deleted": true })))
}

/// Public share page for a lane
#[instrument(skip(state))]
async fn share_lane(
    State(state): State<AppState>,
    Path(lane_id): Path<Uuid>,
) -> ApiResult<ShareResponse> {
    let lane = state
        .store
        .get_public_lane(lane_id)
        .await
        .map_err(|e| store_error("load shared lane", e))?;

    let events = state
        .store
        .list_events(lane_id)
        .await
        .map_err(|e| store_error("list events", e))?;

    let mut share_events = Vec::with_capacity(events.len());
    for event in events {
        let images = state
            .store
            .list_images(event.id)
            .await
            .map_err(|e| store_error("list images", e))?;

        let share_images: Vec<ShareImage> = stream::iter(images)
            .map(|image| {
                let media = state.media.clone();
                let expiry = state.presigned_url_expiry;
                async move {
                    let presigned = media.presign_get(&image.object_key, expiry).await;
                    let (presigned_url, presigned_expires_at) = match presigned {
                        Ok((url, expires_at)) => (Some(url), Some(expires_at)),
                        Err(e) => {
                            error!(error = %e, key = %image.object_key, "Failed to presign image");
                            (None, None)
                        }
                    };
                    ShareImage {
                        image: image.into(),
                        presigned_url,
                        presigned_expires_at,
                    }
                }
            })
            .buffered(PRESIGN_CONCURRENCY)
            .collect()
            .await;

        share_events.push(ShareEvent {
            event: event.into(),
            images: share_images,
        });
    }

    metrics::counter!("lanes.share.views").increment(1);

    Ok(Json(ShareResponse {
        lane: lane.into(),
        events: share_events,
    }))
}

/// Start the API server
pub async fn start_api_server(state: AppState, config: &ApiConfig) -> anyhow::Result<()> {
    let router = create_router(state, config);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting lanes API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .await
        .context("API server error")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_request_decodes_base64_payload() {
        let json = r#"{
            "image_data": "SGVsbG8gV29ybGQ=",
            "format": "jpeg",
            "alt_text": "sunset over the pier",
            "make_primary": true
        }"#;

        let request: UploadImageRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.image_data, b"Hello World");
        assert_eq!(request.format, "jpeg");
        assert!(request.thumbnail_data.is_none());
        assert!(request.make_primary);
    }

    #[test]
    fn test_upload_request_defaults() {
        let json = r#"{"image_data": "", "format": "png"}"#;

        let request: UploadImageRequest = serde_json::from_str(json).unwrap();
        assert!(request.image_data.is_empty());
        assert!(!request.make_primary);
        assert!(request.alt_text.is_none());
    }

    #[test]
    fn test_image_response_projects_primary() {
        let record = ImageRecord {
            id: Uuid::new_v4(),
            event_id: Uuid::new_v4(),
            object_key: "media/a/b/c.jpg".to_string(),
            url: "https://example.com/media/a/b/c.jpg".to_string(),
            thumbnail_key: None,
            thumbnail_url: None,
            alt_text: None,
            position: 0,
            created_at: Utc::now(),
        };

        let response: ImageResponse = record.into();
        assert!(response.is_primary);
        assert_eq!(response.position, 0);
    }

    #[test]
    fn test_lane_response_formats_date_range() {
        let lane = LaneRecord {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            title: "Summer 2023".to_string(),
            description: None,
            cover_image_url: None,
            is_public: true,
            date_range_start: NaiveDate::from_ymd_opt(2023, 1, 5),
            date_range_end: NaiveDate::from_ymd_opt(2023, 6, 20),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        };

        let response: LaneResponse = lane.into();
        assert_eq!(response.date_range, "January - June 2023");
    }

    #[test]
    fn test_lane_response_with_no_events() {
        let lane = LaneRecord {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            title: "Empty".to_string(),
            description: None,
            cover_image_url: None,
            is_public: false,
            date_range_start: None,
            date_range_end: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        };

        let response: LaneResponse = lane.into();
        assert_eq!(response.date_range, "No events yet");
    }

    #[test]
    fn test_actor_id_requires_valid_uuid() {
        let mut headers = HeaderMap::new();
        assert!(actor_id(&headers).is_err());

        headers.insert("x-actor-id", "not-a-uuid".parse().unwrap());
        assert!(actor_id(&headers).is_err());

        let id = Uuid::new_v4();
        headers.insert("x-actor-id", id.to_string().parse().unwrap());
        assert_eq!(actor_id(&headers).unwrap(), id);
    }
}
