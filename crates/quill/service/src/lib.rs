//! Quill service library
//!
//! REST transport over the review core:
//! - poem publishing and owner edits
//! - pull request creation, review and listing
//! - per-user statistics
//! - optional pass-through to an image rendering service

pub mod api;
pub mod config;
pub mod error;
pub mod render;
pub mod server;

pub use api::create_router;
pub use api::rest::state::AppState;
pub use config::ServiceConfig;
pub use error::{ApiError, ServiceError};
pub use render::{HttpRenderer, Renderer};
pub use server::Server;
