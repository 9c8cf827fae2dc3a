mod dto;
pub mod handlers;
pub mod live;
pub mod memory;
pub mod model;
pub mod repo;
mod repo_types;
pub mod stats;
pub mod store;
pub(crate) mod titles;
pub mod tracker;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    Router::new().merge(handlers::routes())
}
