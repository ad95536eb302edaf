use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;

pub mod dto;
pub mod handlers;
pub mod repo;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/user/create", post(handlers::create_user))
        .route("/user/token", post(handlers::create_token))
        // Unmatched verbs on /user/me (e.g. POST) get the router's 405.
        .route("/user/me", get(handlers::me).patch(handlers::update_me))
}
