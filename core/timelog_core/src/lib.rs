//! Personal time tracking: activity storage, date-range filtering and the dashboard metrics
//! (today vs. yesterday, weekly progress, top project) served over HTTP.
//!
//! `clock`, `range`, `filter` and `summary` are pure and operate on in-memory activity
//! snapshots. `store` and `http` are the SQLite and axum layers around them.

pub mod clock;
pub mod error;
pub mod filter;
pub mod http;
pub mod model;
pub mod range;
pub mod store;
pub mod summary;

pub use http::{router, AppState};
