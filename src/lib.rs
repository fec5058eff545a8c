//! FilDAS - departmental document archive
//!
//! Departments own folder trees of documents. Documents are versioned,
//! shared with per-user permissions that nested items inherit, reviewed
//! through a submit/approve/reject workflow and previewed as PDF.
//! Every change lands in the activity log; affected users are notified
//! in-app and by mail.

pub mod activity;
pub mod config;
pub mod convert;
pub mod db;
pub mod entity;
pub mod error;
pub mod handlers;
pub mod hierarchy;
pub mod middleware;
pub mod notify;
pub mod permission;
pub mod routes;
pub mod sharing;
pub mod state;
pub mod storage;
pub mod versioning;

#[cfg(test)]
pub mod test_util;

// Re-export commonly used types
pub use config::Config;
pub use error::{AppError, AppResult};
pub use state::AppState;
