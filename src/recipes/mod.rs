use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::state::AppState;

pub mod dto;
pub mod handlers;
pub mod repo;
pub mod service;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/recipe/tags",
            get(handlers::list_tags).post(handlers::create_tag),
        )
        .route(
            "/recipe/ingredients",
            get(handlers::list_ingredients).post(handlers::create_ingredient),
        )
        .route(
            "/recipe/recipes",
            get(handlers::list_recipes).post(handlers::create_recipe),
        )
        .route(
            "/recipe/recipes/:id",
            get(handlers::retrieve_recipe)
                .put(handlers::replace_recipe)
                .patch(handlers::patch_recipe)
                .delete(handlers::delete_recipe),
        )
        .route(
            "/recipe/recipes/:id/upload-image",
            post(handlers::upload_image).layer(DefaultBodyLimit::max(20 * 1024 * 1024)),
        )
}
