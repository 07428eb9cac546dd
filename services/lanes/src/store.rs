use crate::config::DatabaseConfig;
use crate::ordering::{
    self, PositionUpdate, ReorderError, SiblingPosition, PRIMARY_POSITION,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Errors surfaced by the lane store
#[derive(Error, Debug)]
pub enum StoreError {
    /// The referenced record does not exist or is soft-deleted
    #[error("{0} not found")]
    NotFound(&'static str),

    /// A read/write round trip failed; the underlying cause is not interpreted
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// An explicit reorder batch was rejected before any write was applied
    #[error("invalid reorder batch: {0}")]
    InvalidReorder(#[from] ReorderError),
}

/// A registered user
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct UserRecord {
    pub id: Uuid,
    /// Unique handle used for profile lookup
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub description: Option<String>,
    pub avatar_url: Option<String>,
    /// Deactivated users keep their rows but disappear from lookups
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Attributes for user sign-up
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub description: Option<String>,
    pub avatar_url: Option<String>,
}

/// A memory lane: a user-owned, ordered collection of events
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct LaneRecord {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub cover_image_url: Option<String>,
    pub is_public: bool,
    /// Derived cache of the earliest live event date; null when empty
    pub date_range_start: Option<NaiveDate>,
    /// Derived cache of the latest live event date; null when empty
    pub date_range_end: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Attributes for lane creation
#[derive(Debug, Clone)]
pub struct NewLane {
    pub owner_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub cover_image_url: Option<String>,
    pub is_public: bool,
}

/// Partial lane update; unset fields keep their current value
#[derive(Debug, Clone, Default)]
pub struct LaneChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub cover_image_url: Option<String>,
    pub is_public: Option<bool>,
}

/// A dated, located item within a lane
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct EventRecord {
    pub id: Uuid,
    pub lane_id: Uuid,
    pub title: String,
    pub event_date: NaiveDate,
    /// Ordering key, unique among live siblings of the lane
    pub position: i32,
    pub description: Option<String>,
    pub location: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Attributes for event creation; the position is allocated by the store
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub title: String,
    pub event_date: NaiveDate,
    pub description: Option<String>,
    pub location: Option<String>,
}

/// Partial event update; unset fields keep their current value
#[derive(Debug, Clone, Default)]
pub struct EventChanges {
    pub title: Option<String>,
    pub event_date: Option<NaiveDate>,
    pub description: Option<String>,
    pub location: Option<String>,
}

/// A photo attached to an event
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ImageRecord {
    pub id: Uuid,
    pub event_id: Uuid,
    /// Object-storage key of the full-size image
    pub object_key: String,
    pub url: String,
    pub thumbnail_key: Option<String>,
    pub thumbnail_url: Option<String>,
    pub alt_text: Option<String>,
    /// Ordering key; position 0 designates the primary image
    pub position: i32,
    pub created_at: DateTime<Utc>,
}

impl ImageRecord {
    /// Whether this image is the event's primary/cover image.
    ///
    /// Projected from the stored position so there is a single source of
    /// truth for primacy.
    pub fn is_primary(&self) -> bool {
        self.position == PRIMARY_POSITION
    }
}

/// Attributes for image creation; the position is allocated by the store
#[derive(Debug, Clone)]
pub struct NewImage {
    pub object_key: String,
    pub url: String,
    pub thumbnail_key: Option<String>,
    pub thumbnail_url: Option<String>,
    pub alt_text: Option<String>,
}

/// Service-wide record counts
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct LaneStats {
    pub active_users: i64,
    pub total_lanes: i64,
    pub total_events: i64,
    pub total_images: i64,
}

/// PostgreSQL-backed repository for users, lanes, events, and images
pub struct LaneStore {
    pool: PgPool,
}

impl LaneStore {
    /// Create a new lane store with connection pool
    pub async fn new(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Some(Duration::from_secs(config.idle_timeout_secs)))
            .connect(&config.url)
            .await?;

        info!("Connected to PostgreSQL database");

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations").run(&self.pool).await?;

        info!("Database migrations completed");
        Ok(())
    }

    /// Get the connection pool (for health checks)
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // ---- users ----

    /// Register a new user
    pub async fn create_user(&self, new: NewUser) -> Result<UserRecord, StoreError> {
        let user = sqlx::query_as::<_, UserRecord>(
            r#"
            INSERT INTO users (id, username, first_name, last_name, description, avatar_url, active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, TRUE, NOW())
            RETURNING id, username, first_name, last_name, description, avatar_url, active, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new.username)
        .bind(&new.first_name)
        .bind(&new.last_name)
        .bind(&new.description)
        .bind(&new.avatar_url)
        .fetch_one(&self.pool)
        .await?;

        metrics::counter!("lanes.users.created").increment(1);

        Ok(user)
    }

    /// Look up an active user by username
    pub async fn get_user_by_username(&self, username: &str) -> Result<UserRecord, StoreError> {
        sqlx::query_as::<_, UserRecord>(
            r#"
            SELECT id, username, first_name, last_name, description, avatar_url, active, created_at
            FROM users
            WHERE username = $1 AND active
            "#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound("user"))
    }

    /// Look up a user by id, active or not
    pub async fn get_user(&self, user_id: Uuid) -> Result<UserRecord, StoreError> {
        sqlx::query_as::<_, UserRecord>(
            r#"
            SELECT id, username, first_name, last_name, description, avatar_url, active, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound("user"))
    }

    /// Deactivate a user; the row is retained but excluded from lookups
    pub async fn deactivate_user(&self, user_id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE users SET active = FALSE WHERE id = $1 AND active")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("user"));
        }

        Ok(())
    }

    // ---- lanes ----

    /// Create a new lane
    pub async fn create_lane(&self, new: NewLane) -> Result<LaneRecord, StoreError> {
        let lane = sqlx::query_as::<_, LaneRecord>(
            r#"
            INSERT INTO lanes (id, owner_id, title, description, cover_image_url, is_public, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW(), NOW())
            RETURNING id, owner_id, title, description, cover_image_url, is_public,
                      date_range_start, date_range_end, created_at, updated_at, deleted_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.owner_id)
        .bind(&new.title)
        .bind(&new.description)
        .bind(&new.cover_image_url)
        .bind(new.is_public)
        .fetch_one(&self.pool)
        .await?;

        metrics::counter!("lanes.lanes.created").increment(1);

        Ok(lane)
    }

    /// Get a live lane by id
    pub async fn get_lane(&self, lane_id: Uuid) -> Result<LaneRecord, StoreError> {
        sqlx::query_as::<_, LaneRecord>(
            r#"
            SELECT id, owner_id, title, description, cover_image_url, is_public,
                   date_range_start, date_range_end, created_at, updated_at, deleted_at
            FROM lanes
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(lane_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound("lane"))
    }

    /// Get a live lane by id, only if it is shared publicly
    pub async fn get_public_lane(&self, lane_id: Uuid) -> Result<LaneRecord, StoreError> {
        sqlx::query_as::<_, LaneRecord>(
            r#"
            SELECT id, owner_id, title, description, cover_image_url, is_public,
                   date_range_start, date_range_end, created_at, updated_at, deleted_at
            FROM lanes
            WHERE id = $1 AND is_public AND deleted_at IS NULL
            "#,
        )
        .bind(lane_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound("lane"))
    }

    /// List a user's live lanes, most recently touched first
    pub async fn list_lanes_by_owner(&self, owner_id: Uuid) -> Result<Vec<LaneRecord>, StoreError> {
        let lanes = sqlx::query_as::<_, LaneRecord>(
            r#"
            SELECT id, owner_id, title, description, cover_image_url, is_public,
                   date_range_start, date_range_end, created_at, updated_at, deleted_at
            FROM lanes
            WHERE owner_id = $1 AND deleted_at IS NULL
            ORDER BY updated_at DESC
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(lanes)
    }

    /// Apply a partial update to a live lane
    pub async fn update_lane(
        &self,
        lane_id: Uuid,
        changes: LaneChanges,
    ) -> Result<LaneRecord, StoreError> {
        sqlx::query_as::<_, LaneRecord>(
            r#"
            UPDATE lanes SET
                title = COALESCE($2, title),
                description = COALESCE($3, description),
                cover_image_url = COALESCE($4, cover_image_url),
                is_public = COALESCE($5, is_public),
                updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING id, owner_id, title, description, cover_image_url, is_public,
                      date_range_start, date_range_end, created_at, updated_at, deleted_at
            "#,
        )
        .bind(lane_id)
        .bind(&changes.title)
        .bind(&changes.description)
        .bind(&changes.cover_image_url)
        .bind(changes.is_public)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound("lane"))
    }

    /// Soft-delete a lane; it disappears from every listing
    pub async fn soft_delete_lane(&self, lane_id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE lanes SET deleted_at = NOW(), updated_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(lane_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("lane"));
        }

        metrics::counter!("lanes.lanes.deleted").increment(1);

        Ok(())
    }

    /// Persist the derived date-range bounds onto a lane.
    ///
    /// Always touches `updated_at`; the bounds are a display cache, never a
    /// source of truth.
    pub async fn write_date_range(
        &self,
        lane_id: Uuid,
        range: Option<(NaiveDate, NaiveDate)>,
    ) -> Result<(), StoreError> {
        let (start, end) = match range {
            Some((start, end)) => (Some(start), Some(end)),
            None => (None, None),
        };

        let result = sqlx::query(
            r#"
            UPDATE lanes SET date_range_start = $2, date_range_end = $3, updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(lane_id)
        .bind(start)
        .bind(end)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("lane"));
        }

        Ok(())
    }

    // ---- events ----

    /// Append a new event to a lane.
    ///
    /// The parent lane row is locked for the duration of the transaction so
    /// concurrent appends to the same lane serialize and cannot allocate the
    /// same position.
    #[instrument(skip(self, new), fields(lane_id = %lane_id))]
    pub async fn create_event(
        &self,
        lane_id: Uuid,
        new: NewEvent,
    ) -> Result<EventRecord, StoreError> {
        let mut tx = self.pool.begin().await?;

        let lane: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM lanes WHERE id = $1 AND deleted_at IS NULL FOR UPDATE")
                .bind(lane_id)
                .fetch_optional(&mut *tx)
                .await?;
        if lane.is_none() {
            return Err(StoreError::NotFound("lane"));
        }

        let positions: Vec<(i32,)> =
            sqlx::query_as("SELECT position FROM events WHERE lane_id = $1 AND deleted_at IS NULL")
                .bind(lane_id)
                .fetch_all(&mut *tx)
                .await?;
        let positions: Vec<i32> = positions.into_iter().map(|p| p.0).collect();
        let position = ordering::next_position(&positions, 1);

        let event = sqlx::query_as::<_, EventRecord>(
            r#"
            INSERT INTO events (id, lane_id, title, event_date, position, description, location, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW(), NOW())
            RETURNING id, lane_id, title, event_date, position, description, location,
                      created_at, updated_at, deleted_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(lane_id)
        .bind(&new.title)
        .bind(new.event_date)
        .bind(position)
        .bind(&new.description)
        .bind(&new.location)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(event_id = %event.id, position = position, "Event appended");
        metrics::counter!("lanes.events.created").increment(1);

        Ok(event)
    }

    /// Get a live event by id
    pub async fn get_event(&self, event_id: Uuid) -> Result<EventRecord, StoreError> {
        sqlx::query_as::<_, EventRecord>(
            r#"
            SELECT id, lane_id, title, event_date, position, description, location,
                   created_at, updated_at, deleted_at
            FROM events
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound("event"))
    }

    /// List a lane's live events in display order
    pub async fn list_events(&self, lane_id: Uuid) -> Result<Vec<EventRecord>, StoreError> {
        let events = sqlx::query_as::<_, EventRecord>(
            r#"
            SELECT id, lane_id, title, event_date, position, description, location,
                   created_at, updated_at, deleted_at
            FROM events
            WHERE lane_id = $1 AND deleted_at IS NULL
            ORDER BY position ASC
            "#,
        )
        .bind(lane_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }

    /// Dates of a lane's live events, for date-range recomputation
    pub async fn event_dates(&self, lane_id: Uuid) -> Result<Vec<NaiveDate>, StoreError> {
        let dates: Vec<(NaiveDate,)> =
            sqlx::query_as("SELECT event_date FROM events WHERE lane_id = $1 AND deleted_at IS NULL")
                .bind(lane_id)
                .fetch_all(&self.pool)
                .await?;

        Ok(dates.into_iter().map(|d| d.0).collect())
    }

    /// Apply a partial update to a live event
    pub async fn update_event(
        &self,
        event_id: Uuid,
        changes: EventChanges,
    ) -> Result<EventRecord, StoreError> {
        sqlx::query_as::<_, EventRecord>(
            r#"
            UPDATE events SET
                title = COALESCE($2, title),
                event_date = COALESCE($3, event_date),
                description = COALESCE($4, description),
                location = COALESCE($5, location),
                updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING id, lane_id, title, event_date, position, description, location,
                      created_at, updated_at, deleted_at
            "#,
        )
        .bind(event_id)
        .bind(&changes.title)
        .bind(changes.event_date)
        .bind(&changes.description)
        .bind(&changes.location)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound("event"))
    }

    /// Apply an explicit reorder batch to a lane's events.
    ///
    /// The batch is validated against the live sibling set before any write;
    /// a rejected batch leaves every position untouched. Accepted batches
    /// apply atomically.
    #[instrument(skip(self, assignments), fields(lane_id = %lane_id, count = assignments.len()))]
    pub async fn reorder_events(
        &self,
        lane_id: Uuid,
        assignments: &[PositionUpdate],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let lane: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM lanes WHERE id = $1 AND deleted_at IS NULL FOR UPDATE")
                .bind(lane_id)
                .fetch_optional(&mut *tx)
                .await?;
        if lane.is_none() {
            return Err(StoreError::NotFound("lane"));
        }

        let siblings: Vec<(Uuid, i32)> = sqlx::query_as(
            "SELECT id, position FROM events WHERE lane_id = $1 AND deleted_at IS NULL",
        )
        .bind(lane_id)
        .fetch_all(&mut *tx)
        .await?;
        let siblings: Vec<SiblingPosition> = siblings
            .into_iter()
            .map(|(id, position)| SiblingPosition { id, position })
            .collect();

        ordering::validate_reorder(assignments, &siblings)?;

        for assignment in assignments {
            sqlx::query("UPDATE events SET position = $2, updated_at = NOW() WHERE id = $1")
                .bind(assignment.id)
                .bind(assignment.position)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        metrics::counter!("lanes.events.reordered").increment(1);

        Ok(())
    }

    /// Soft-delete an event and return its parent lane id.
    ///
    /// The lane id is returned so the caller can recompute the lane's date
    /// range after the delete has committed.
    #[instrument(skip(self), fields(event_id = %event_id))]
    pub async fn soft_delete_event(&self, event_id: Uuid) -> Result<Uuid, StoreError> {
        let lane: Option<(Uuid,)> = sqlx::query_as(
            r#"
            UPDATE events SET deleted_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING lane_id
            "#,
        )
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?;

        let lane_id = lane.ok_or(StoreError::NotFound("event"))?.0;

        metrics::counter!("lanes.events.deleted").increment(1);

        Ok(lane_id)
    }

    // ---- images ----

    /// Attach an image to an event.
    ///
    /// Without `make_primary` the image is appended after the current last
    /// sibling; an event's first image always lands at position 0 and is the
    /// primary. With `make_primary` the new image takes position 0 and every
    /// existing sibling is renumbered to 1..n in prior order, all within one
    /// transaction.
    /// The caller supplies the image id so the row and its object keys can
    /// share it.
    #[instrument(skip(self, new), fields(event_id = %event_id, make_primary = make_primary))]
    pub async fn create_image(
        &self,
        image_id: Uuid,
        event_id: Uuid,
        new: NewImage,
        make_primary: bool,
    ) -> Result<ImageRecord, StoreError> {
        let mut tx = self.pool.begin().await?;

        let event: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM events WHERE id = $1 AND deleted_at IS NULL FOR UPDATE")
                .bind(event_id)
                .fetch_optional(&mut *tx)
                .await?;
        if event.is_none() {
            return Err(StoreError::NotFound("event"));
        }

        let siblings: Vec<(Uuid, i32)> = sqlx::query_as(
            "SELECT id, position FROM images WHERE event_id = $1 ORDER BY position ASC, created_at ASC",
        )
        .bind(event_id)
        .fetch_all(&mut *tx)
        .await?;
        let siblings: Vec<SiblingPosition> = siblings
            .into_iter()
            .map(|(id, position)| SiblingPosition { id, position })
            .collect();

        let position = if make_primary {
            PRIMARY_POSITION
        } else {
            let positions: Vec<i32> = siblings.iter().map(|s| s.position).collect();
            ordering::next_position(&positions, PRIMARY_POSITION)
        };

        let image = sqlx::query_as::<_, ImageRecord>(
            r#"
            INSERT INTO images (id, event_id, object_key, url, thumbnail_key, thumbnail_url, alt_text, position, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW())
            RETURNING id, event_id, object_key, url, thumbnail_key, thumbnail_url, alt_text,
                      position, created_at
            "#,
        )
        .bind(image_id)
        .bind(event_id)
        .bind(&new.object_key)
        .bind(&new.url)
        .bind(&new.thumbnail_key)
        .bind(&new.thumbnail_url)
        .bind(&new.alt_text)
        .bind(position)
        .fetch_one(&mut *tx)
        .await?;

        if make_primary {
            for update in ordering::plan_promotion(image.id, &siblings) {
                sqlx::query("UPDATE images SET position = $2 WHERE id = $1")
                    .bind(update.id)
                    .bind(update.position)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;

        metrics::counter!("lanes.images.created").increment(1);

        Ok(image)
    }

    /// Get an image by id
    pub async fn get_image(&self, image_id: Uuid) -> Result<ImageRecord, StoreError> {
        sqlx::query_as::<_, ImageRecord>(
            r#"
            SELECT id, event_id, object_key, url, thumbnail_key, thumbnail_url, alt_text,
                   position, created_at
            FROM images
            WHERE id = $1
            "#,
        )
        .bind(image_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound("image"))
    }

    /// List an event's images in display order, primary first
    pub async fn list_images(&self, event_id: Uuid) -> Result<Vec<ImageRecord>, StoreError> {
        let images = sqlx::query_as::<_, ImageRecord>(
            r#"
            SELECT id, event_id, object_key, url, thumbnail_key, thumbnail_url, alt_text,
                   position, created_at
            FROM images
            WHERE event_id = $1
            ORDER BY position ASC
            "#,
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(images)
    }

    /// Promote an image to its event's primary.
    ///
    /// The target takes position 0 and every other sibling is renumbered to
    /// 1..n in ascending prior order. The sibling rows are locked and the
    /// renumbering commits as one transaction, so the set never exposes a
    /// partially applied state; the full renumbering also repairs any gaps
    /// or duplicates the set had accumulated.
    #[instrument(skip(self), fields(image_id = %image_id))]
    pub async fn set_primary_image(&self, image_id: Uuid) -> Result<ImageRecord, StoreError> {
        let mut tx = self.pool.begin().await?;

        let target: Option<(Uuid,)> = sqlx::query_as("SELECT event_id FROM images WHERE id = $1")
            .bind(image_id)
            .fetch_optional(&mut *tx)
            .await?;
        let event_id = target.ok_or(StoreError::NotFound("image"))?.0;

        let siblings: Vec<(Uuid, i32)> = sqlx::query_as(
            "SELECT id, position FROM images WHERE event_id = $1 ORDER BY position ASC, created_at ASC FOR UPDATE",
        )
        .bind(event_id)
        .fetch_all(&mut *tx)
        .await?;
        let siblings: Vec<SiblingPosition> = siblings
            .into_iter()
            .map(|(id, position)| SiblingPosition { id, position })
            .collect();

        for update in ordering::plan_promotion(image_id, &siblings) {
            sqlx::query("UPDATE images SET position = $2 WHERE id = $1")
                .bind(update.id)
                .bind(update.position)
                .execute(&mut *tx)
                .await?;
        }

        let image = sqlx::query_as::<_, ImageRecord>(
            r#"
            SELECT id, event_id, object_key, url, thumbnail_key, thumbnail_url, alt_text,
                   position, created_at
            FROM images
            WHERE id = $1
            "#,
        )
        .bind(image_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        metrics::counter!("lanes.images.promoted").increment(1);

        Ok(image)
    }

    /// Hard-delete an image record and return it.
    ///
    /// The record is returned so the caller can remove the backing objects
    /// from storage; there is no soft-delete path for images.
    #[instrument(skip(self), fields(image_id = %image_id))]
    pub async fn delete_image(&self, image_id: Uuid) -> Result<ImageRecord, StoreError> {
        let image = sqlx::query_as::<_, ImageRecord>(
            r#"
            DELETE FROM images
            WHERE id = $1
            RETURNING id, event_id, object_key, url, thumbnail_key, thumbnail_url, alt_text,
                      position, created_at
            "#,
        )
        .bind(image_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound("image"))?;

        metrics::counter!("lanes.images.deleted").increment(1);

        Ok(image)
    }

    // ---- stats ----

    /// Get service-wide record counts
    pub async fn stats(&self) -> Result<LaneStats, StoreError> {
        let stats: LaneStats = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM users WHERE active) AS active_users,
                (SELECT COUNT(*) FROM lanes WHERE deleted_at IS NULL) AS total_lanes,
                (SELECT COUNT(*) FROM events WHERE deleted_at IS NULL) AS total_events,
                (SELECT COUNT(*) FROM images) AS total_images
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image_at(position: i32) -> ImageRecord {
        ImageRecord {
            id: Uuid::new_v4(),
            event_id: Uuid::new_v4(),
            object_key: "media/test.jpg".to_string(),
            url: "https://example.com/media/test.jpg".to_string(),
            thumbnail_key: None,
            thumbnail_url: None,
            alt_text: None,
            position,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_is_primary_is_a_position_projection() {
        assert!(image_at(0).is_primary());
        assert!(!image_at(1).is_primary());
        assert!(!image_at(7).is_primary());
    }

    #[test]
    fn test_not_found_is_distinct_from_reorder_rejection() {
        let not_found = StoreError::NotFound("lane");
        assert_eq!(not_found.to_string(), "lane not found");

        let rejected: StoreError = ReorderError::DuplicatePosition(2).into();
        assert!(matches!(rejected, StoreError::InvalidReorder(_)));
        assert!(rejected.to_string().contains("assigned to more than one"));
    }
}
