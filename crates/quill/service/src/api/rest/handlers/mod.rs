//! API request handlers

mod health;
mod poems;
mod pull_requests;
mod render;
mod stats;

pub use health::*;
pub use poems::*;
pub use pull_requests::*;
pub use render::*;
pub use stats::*;
