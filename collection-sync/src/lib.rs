//! artsync collection sync - pulls platform collections into local storage.
//!
//! # Architecture
//!
//! ```text
//!   AuthManager (artsync crate)
//!          ↓  valid access token
//! ┌─────────────────────────────────────────┐
//! │  PlatformClient / PaginatedClient        │
//! │  - offset pagination, paced requests     │
//! └─────────────────────────────────────────┘
//!          ↓  wire records
//!      transformer  →  User / Gallery
//!          ↓
//! ┌─────────────────────────────────────────┐
//! │  SqliteRepository                        │
//! │  - upsert by platform id                 │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Core Types
//!
//! - [`PaginatedClient`] - Walks `{results, has_more, next_offset}` collections
//! - [`PlatformClient`] - Typed platform endpoints (whoami, profile, gallery folders)
//! - [`SyncService`] - Fetch, normalize and upsert
//! - [`SqliteRepository`] - User and gallery storage

pub mod api;
pub mod entity;
pub mod error;
pub mod pagination;
pub mod repository;
pub mod sync;
pub mod transformer;

pub use api::{GalleryFolderOptions, PlatformClient};
pub use entity::{Gallery, User};
pub use error::FetchError;
pub use pagination::{CollectionQuery, FixedPacer, Pacer, PaginatedClient, RemotePage};
pub use repository::{GalleryRepository, SqliteRepository, UserRepository};
pub use sync::SyncService;
