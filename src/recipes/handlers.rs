use std::collections::HashSet;

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use sqlx::PgPool;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{auth::AuthUser, error::ApiError, state::AppState};

use super::{
    dto::{
        parse_id_list, AttributeListParams, CreateAttributeRequest, RecipeChanges, RecipeDetail,
        RecipeImageResponse, RecipeListItem, RecipeListParams, RecipePatchRequest,
        RecipeWriteRequest,
    },
    repo::{self, Ingredient, Recipe, Tag},
    service,
};

// ---- tags / ingredients ----

#[instrument(skip(state))]
pub async fn list_tags(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(params): Query<AttributeListParams>,
) -> Result<Json<Vec<Tag>>, ApiError> {
    let tags = repo::list_tags(&state.db, user_id, params.assigned_only()).await?;
    Ok(Json(tags))
}

#[instrument(skip(state, payload))]
pub async fn create_tag(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<CreateAttributeRequest>,
) -> Result<(StatusCode, Json<Tag>), ApiError> {
    let name = payload.validate()?;
    let tag = repo::create_tag(&state.db, user_id, &name).await?;
    info!(user_id = %user_id, tag_id = tag.id, "tag created");
    Ok((StatusCode::CREATED, Json(tag)))
}

#[instrument(skip(state))]
pub async fn list_ingredients(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(params): Query<AttributeListParams>,
) -> Result<Json<Vec<Ingredient>>, ApiError> {
    let ingredients =
        repo::list_ingredients(&state.db, user_id, params.assigned_only()).await?;
    Ok(Json(ingredients))
}

#[instrument(skip(state, payload))]
pub async fn create_ingredient(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<CreateAttributeRequest>,
) -> Result<(StatusCode, Json<Ingredient>), ApiError> {
    let name = payload.validate()?;
    let ingredient = repo::create_ingredient(&state.db, user_id, &name).await?;
    info!(user_id = %user_id, ingredient_id = ingredient.id, "ingredient created");
    Ok((StatusCode::CREATED, Json(ingredient)))
}

// ---- recipes ----

/// Referenced ids must exist and belong to the requester; an unowned id is
/// indistinguishable from a nonexistent one.
async fn check_tag_ids(db: &PgPool, user_id: Uuid, ids: &[i64]) -> Result<(), ApiError> {
    if ids.is_empty() {
        return Ok(());
    }
    let owned: HashSet<i64> = repo::owned_tag_ids(db, user_id, ids).await?.into_iter().collect();
    if let Some(missing) = ids.iter().find(|id| !owned.contains(*id)) {
        return Err(ApiError::validation(
            "tags",
            format!("invalid id {missing} - object does not exist"),
        ));
    }
    Ok(())
}

async fn check_ingredient_ids(db: &PgPool, user_id: Uuid, ids: &[i64]) -> Result<(), ApiError> {
    if ids.is_empty() {
        return Ok(());
    }
    let owned: HashSet<i64> = repo::owned_ingredient_ids(db, user_id, ids)
        .await?
        .into_iter()
        .collect();
    if let Some(missing) = ids.iter().find(|id| !owned.contains(*id)) {
        return Err(ApiError::validation(
            "ingredients",
            format!("invalid id {missing} - object does not exist"),
        ));
    }
    Ok(())
}

async fn summarize(state: &AppState, recipe: Recipe) -> Result<RecipeListItem, ApiError> {
    let ids = [recipe.id];
    let mut tag_map = repo::tag_ids_by_recipe(&state.db, &ids).await?;
    let mut ingredient_map = repo::ingredient_ids_by_recipe(&state.db, &ids).await?;
    Ok(RecipeListItem {
        id: recipe.id,
        title: recipe.title,
        time_minutes: recipe.time_minutes,
        price: recipe.price,
        link: recipe.link,
        tags: tag_map.remove(&recipe.id).unwrap_or_default(),
        ingredients: ingredient_map.remove(&recipe.id).unwrap_or_default(),
    })
}

#[instrument(skip(state))]
pub async fn list_recipes(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(params): Query<RecipeListParams>,
) -> Result<Json<Vec<RecipeListItem>>, ApiError> {
    let tag_filter = params
        .tags
        .as_deref()
        .map(|raw| parse_id_list("tags", raw))
        .transpose()?;
    let ingredient_filter = params
        .ingredients
        .as_deref()
        .map(|raw| parse_id_list("ingredients", raw))
        .transpose()?;

    let recipes = repo::list_recipes(
        &state.db,
        user_id,
        tag_filter.as_deref(),
        ingredient_filter.as_deref(),
    )
    .await?;

    let ids: Vec<i64> = recipes.iter().map(|r| r.id).collect();
    let mut tag_map = repo::tag_ids_by_recipe(&state.db, &ids).await?;
    let mut ingredient_map = repo::ingredient_ids_by_recipe(&state.db, &ids).await?;

    let items = recipes
        .into_iter()
        .map(|r| RecipeListItem {
            tags: tag_map.remove(&r.id).unwrap_or_default(),
            ingredients: ingredient_map.remove(&r.id).unwrap_or_default(),
            id: r.id,
            title: r.title,
            time_minutes: r.time_minutes,
            price: r.price,
            link: r.link,
        })
        .collect();
    Ok(Json(items))
}

#[instrument(skip(state, payload))]
pub async fn create_recipe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<RecipeWriteRequest>,
) -> Result<(StatusCode, Json<RecipeListItem>), ApiError> {
    let new_recipe = payload.validate()?;
    check_tag_ids(&state.db, user_id, &new_recipe.tags).await?;
    check_ingredient_ids(&state.db, user_id, &new_recipe.ingredients).await?;

    let recipe = repo::create_recipe(
        &state.db,
        user_id,
        &new_recipe.title,
        new_recipe.time_minutes,
        new_recipe.price,
        new_recipe.link.as_deref(),
        &new_recipe.tags,
        &new_recipe.ingredients,
    )
    .await?;

    info!(user_id = %user_id, recipe_id = recipe.id, "recipe created");
    let item = summarize(&state, recipe).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

#[instrument(skip(state))]
pub async fn retrieve_recipe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<RecipeDetail>, ApiError> {
    let recipe = repo::get_recipe(&state.db, user_id, id)
        .await?
        .ok_or_else(|| ApiError::not_found("recipe"))?;

    let tags = repo::tags_for_recipe(&state.db, recipe.id).await?;
    let ingredients = repo::ingredients_for_recipe(&state.db, recipe.id).await?;
    Ok(Json(RecipeDetail {
        id: recipe.id,
        title: recipe.title,
        time_minutes: recipe.time_minutes,
        price: recipe.price,
        link: recipe.link,
        tags,
        ingredients,
    }))
}

async fn apply_update(
    state: &AppState,
    user_id: Uuid,
    id: i64,
    changes: RecipeChanges,
) -> Result<Json<RecipeListItem>, ApiError> {
    if let Some(tag_ids) = &changes.tags {
        check_tag_ids(&state.db, user_id, tag_ids).await?;
    }
    if let Some(ingredient_ids) = &changes.ingredients {
        check_ingredient_ids(&state.db, user_id, ingredient_ids).await?;
    }

    let recipe = repo::update_recipe(&state.db, user_id, id, &changes)
        .await?
        .ok_or_else(|| ApiError::not_found("recipe"))?;

    info!(user_id = %user_id, recipe_id = recipe.id, "recipe updated");
    Ok(Json(summarize(state, recipe).await?))
}

#[instrument(skip(state, payload))]
pub async fn replace_recipe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
    Json(payload): Json<RecipeWriteRequest>,
) -> Result<Json<RecipeListItem>, ApiError> {
    let changes = payload.validate()?.into_changes();
    apply_update(&state, user_id, id, changes).await
}

#[instrument(skip(state, payload))]
pub async fn patch_recipe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
    Json(payload): Json<RecipePatchRequest>,
) -> Result<Json<RecipeListItem>, ApiError> {
    let changes = payload.validate()?;
    apply_update(&state, user_id, id, changes).await
}

#[instrument(skip(state))]
pub async fn delete_recipe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    if !repo::delete_recipe(&state.db, user_id, id).await? {
        return Err(ApiError::not_found("recipe"));
    }
    info!(user_id = %user_id, recipe_id = id, "recipe deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, multipart))]
pub async fn upload_image(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
    mut multipart: Multipart,
) -> Result<Json<RecipeImageResponse>, ApiError> {
    let mut upload = None;
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() == Some("image") {
            let ext = field.file_name().and_then(extension_of);
            let bytes = field
                .bytes()
                .await
                .map_err(|_| ApiError::validation("image", "could not read uploaded file"))?;
            upload = Some((ext, bytes));
            break;
        }
    }
    let (ext, bytes) =
        upload.ok_or_else(|| ApiError::validation("image", "no file was submitted"))?;

    let url = service::store_recipe_image(&state, user_id, id, ext.as_deref(), bytes).await?;
    info!(user_id = %user_id, recipe_id = id, "recipe image uploaded");
    Ok(Json(RecipeImageResponse {
        id,
        image: Some(url),
    }))
}

/// Extension of the uploaded filename, lowercased; ignored unless it is a
/// short alphanumeric suffix.
fn extension_of(file_name: &str) -> Option<String> {
    let (_, ext) = file_name.rsplit_once('.')?;
    if ext.is_empty() || ext.len() > 8 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
