//! Memory Lanes Service
//!
//! Backend service for the Memory Lanes personal media platform. Users
//! organize dated events with photos into ordered collections ("lanes") and
//! share them via public links. Records live in PostgreSQL, image bytes in
//! S3-compatible object storage.
//!
//! ## Features
//!
//! - **Ordered galleries and timelines**: integer positions, unique among
//!   live siblings, allocated and repaired transactionally (appends,
//!   primary-image promotion with full renumbering, validated explicit
//!   reorders)
//! - **Derived date ranges**: each lane caches the `[min, max]` of its live
//!   events' dates, recomputed best-effort after every event mutation
//! - **Soft deletes** for lanes and events; hard deletes for images together
//!   with their stored objects
//! - **Share links**: public lane pages with presigned image URLs
//!
//! ## Architecture
//!
//! ```text
//! HTTP API (axum)             PostgreSQL                S3 Bucket
//! ┌──────────────┐           ┌──────────────┐          ┌──────────────┐
//! │ users/lanes/ │           │ users        │          │ media/       │
//! │ events/      │──────────▶│ lanes        │          │   {lane}/    │
//! │ images/share │           │ events       │          │   {event}/   │
//! └──────────────┘           │ images       │          └──────────────┘
//!        │                   └──────────────┘                 ▲
//!        │                          ▲                         │
//!        ▼                          │                         │
//! ┌──────────────┐           ┌──────────────┐          ┌──────────────┐
//! │ Position     │           │ Lane         │          │ Media        │
//! │ Allocator    │──────────▶│ Store        │          │ Store        │
//! └──────────────┘           └──────────────┘          └──────────────┘
//!        │                          ▲
//!        ▼                          │
//! ┌──────────────┐           ┌──────────────┐
//! │ Date-Range   │──────────▶│ Recomputer   │
//! │ Aggregator   │           │ (background) │
//! └──────────────┘           └──────────────┘
//! ```

pub mod api;
pub mod config;
pub mod date_range;
pub mod media_store;
pub mod ordering;
pub mod recompute;
pub mod store;

pub use api::{AppState, ErrorResponse};
pub use config::Config;
pub use date_range::{compute_date_range, format_date_range};
pub use media_store::MediaStore;
pub use ordering::{PositionUpdate, ReorderError, SiblingPosition, PRIMARY_POSITION};
pub use recompute::{recompute_date_range, Recomputer};
pub use store::{
    EventRecord, ImageRecord, LaneRecord, LaneStats, LaneStore, StoreError, UserRecord,
};
