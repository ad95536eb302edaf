use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

use super::dto::RecipeChanges;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Tag {
    pub id: i64,
    #[serde(skip_serializing)]
    pub user_id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Ingredient {
    pub id: i64,
    #[serde(skip_serializing)]
    pub user_id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct Recipe {
    pub id: i64,
    pub user_id: Uuid,
    pub title: String,
    pub time_minutes: i32,
    pub price: Decimal,
    pub link: Option<String>,
    pub image_key: Option<String>,
    pub created_at: OffsetDateTime,
}

const RECIPE_COLUMNS: &str =
    "id, user_id, title, time_minutes, price, link, image_key, created_at";

// ---- tags ----

pub async fn list_tags(db: &PgPool, user_id: Uuid, assigned_only: bool) -> sqlx::Result<Vec<Tag>> {
    // EXISTS keeps rows unique even when a tag is on several recipes.
    let sql = if assigned_only {
        r#"
        SELECT id, user_id, name FROM tags
         WHERE user_id = $1
           AND EXISTS (SELECT 1 FROM recipe_tags rt WHERE rt.tag_id = tags.id)
         ORDER BY name DESC
        "#
    } else {
        "SELECT id, user_id, name FROM tags WHERE user_id = $1 ORDER BY name DESC"
    };
    sqlx::query_as::<_, Tag>(sql).bind(user_id).fetch_all(db).await
}

pub async fn create_tag(db: &PgPool, user_id: Uuid, name: &str) -> sqlx::Result<Tag> {
    sqlx::query_as::<_, Tag>(
        "INSERT INTO tags (user_id, name) VALUES ($1, $2) RETURNING id, user_id, name",
    )
    .bind(user_id)
    .bind(name)
    .fetch_one(db)
    .await
}

/// The subset of `ids` that exist and belong to `user_id`.
pub async fn owned_tag_ids(db: &PgPool, user_id: Uuid, ids: &[i64]) -> sqlx::Result<Vec<i64>> {
    sqlx::query_scalar::<_, i64>("SELECT id FROM tags WHERE user_id = $1 AND id = ANY($2)")
        .bind(user_id)
        .bind(ids)
        .fetch_all(db)
        .await
}

pub async fn tags_for_recipe(db: &PgPool, recipe_id: i64) -> sqlx::Result<Vec<Tag>> {
    sqlx::query_as::<_, Tag>(
        r#"
        SELECT t.id, t.user_id, t.name
          FROM tags t
          JOIN recipe_tags rt ON rt.tag_id = t.id
         WHERE rt.recipe_id = $1
         ORDER BY t.id
        "#,
    )
    .bind(recipe_id)
    .fetch_all(db)
    .await
}

// ---- ingredients ----

pub async fn list_ingredients(
    db: &PgPool,
    user_id: Uuid,
    assigned_only: bool,
) -> sqlx::Result<Vec<Ingredient>> {
    let sql = if assigned_only {
        r#"
        SELECT id, user_id, name FROM ingredients
         WHERE user_id = $1
           AND EXISTS (SELECT 1 FROM recipe_ingredients ri WHERE ri.ingredient_id = ingredients.id)
         ORDER BY name DESC
        "#
    } else {
        "SELECT id, user_id, name FROM ingredients WHERE user_id = $1 ORDER BY name DESC"
    };
    sqlx::query_as::<_, Ingredient>(sql)
        .bind(user_id)
        .fetch_all(db)
        .await
}

pub async fn create_ingredient(db: &PgPool, user_id: Uuid, name: &str) -> sqlx::Result<Ingredient> {
    sqlx::query_as::<_, Ingredient>(
        "INSERT INTO ingredients (user_id, name) VALUES ($1, $2) RETURNING id, user_id, name",
    )
    .bind(user_id)
    .bind(name)
    .fetch_one(db)
    .await
}

pub async fn owned_ingredient_ids(
    db: &PgPool,
    user_id: Uuid,
    ids: &[i64],
) -> sqlx::Result<Vec<i64>> {
    sqlx::query_scalar::<_, i64>("SELECT id FROM ingredients WHERE user_id = $1 AND id = ANY($2)")
        .bind(user_id)
        .bind(ids)
        .fetch_all(db)
        .await
}

pub async fn ingredients_for_recipe(db: &PgPool, recipe_id: i64) -> sqlx::Result<Vec<Ingredient>> {
    sqlx::query_as::<_, Ingredient>(
        r#"
        SELECT i.id, i.user_id, i.name
          FROM ingredients i
          JOIN recipe_ingredients ri ON ri.ingredient_id = i.id
         WHERE ri.recipe_id = $1
         ORDER BY i.id
        "#,
    )
    .bind(recipe_id)
    .fetch_all(db)
    .await
}

// ---- recipes ----

/// Owner-scoped listing, newest first. A present filter restricts to recipes
/// associated with at least one of the listed ids; both filters AND together.
pub async fn list_recipes(
    db: &PgPool,
    user_id: Uuid,
    tag_ids: Option<&[i64]>,
    ingredient_ids: Option<&[i64]>,
) -> sqlx::Result<Vec<Recipe>> {
    sqlx::query_as::<_, Recipe>(&format!(
        r#"
        SELECT {RECIPE_COLUMNS} FROM recipes r
         WHERE r.user_id = $1
           AND ($2::bigint[] IS NULL
                OR r.id IN (SELECT recipe_id FROM recipe_tags WHERE tag_id = ANY($2)))
           AND ($3::bigint[] IS NULL
                OR r.id IN (SELECT recipe_id FROM recipe_ingredients WHERE ingredient_id = ANY($3)))
         ORDER BY r.id DESC
        "#
    ))
    .bind(user_id)
    .bind(tag_ids)
    .bind(ingredient_ids)
    .fetch_all(db)
    .await
}

pub async fn get_recipe(db: &PgPool, user_id: Uuid, id: i64) -> sqlx::Result<Option<Recipe>> {
    sqlx::query_as::<_, Recipe>(&format!(
        "SELECT {RECIPE_COLUMNS} FROM recipes WHERE id = $1 AND user_id = $2"
    ))
    .bind(id)
    .bind(user_id)
    .fetch_optional(db)
    .await
}

/// Association id lists for a batch of recipes, keyed by recipe id.
pub async fn tag_ids_by_recipe(
    db: &PgPool,
    recipe_ids: &[i64],
) -> sqlx::Result<HashMap<i64, Vec<i64>>> {
    let rows = sqlx::query_as::<_, (i64, i64)>(
        "SELECT recipe_id, tag_id FROM recipe_tags WHERE recipe_id = ANY($1) ORDER BY tag_id",
    )
    .bind(recipe_ids)
    .fetch_all(db)
    .await?;
    let mut map: HashMap<i64, Vec<i64>> = HashMap::new();
    for (recipe_id, tag_id) in rows {
        map.entry(recipe_id).or_default().push(tag_id);
    }
    Ok(map)
}

pub async fn ingredient_ids_by_recipe(
    db: &PgPool,
    recipe_ids: &[i64],
) -> sqlx::Result<HashMap<i64, Vec<i64>>> {
    let rows = sqlx::query_as::<_, (i64, i64)>(
        r#"
        SELECT recipe_id, ingredient_id FROM recipe_ingredients
         WHERE recipe_id = ANY($1) ORDER BY ingredient_id
        "#,
    )
    .bind(recipe_ids)
    .fetch_all(db)
    .await?;
    let mut map: HashMap<i64, Vec<i64>> = HashMap::new();
    for (recipe_id, ingredient_id) in rows {
        map.entry(recipe_id).or_default().push(ingredient_id);
    }
    Ok(map)
}

async fn replace_tag_links(
    tx: &mut Transaction<'_, Postgres>,
    recipe_id: i64,
    tag_ids: &[i64],
) -> sqlx::Result<()> {
    sqlx::query("DELETE FROM recipe_tags WHERE recipe_id = $1")
        .bind(recipe_id)
        .execute(&mut **tx)
        .await?;
    // ON CONFLICT collapses duplicate ids in the input by identity.
    sqlx::query(
        r#"
        INSERT INTO recipe_tags (recipe_id, tag_id)
        SELECT $1, unnest($2::bigint[])
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(recipe_id)
    .bind(tag_ids)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn replace_ingredient_links(
    tx: &mut Transaction<'_, Postgres>,
    recipe_id: i64,
    ingredient_ids: &[i64],
) -> sqlx::Result<()> {
    sqlx::query("DELETE FROM recipe_ingredients WHERE recipe_id = $1")
        .bind(recipe_id)
        .execute(&mut **tx)
        .await?;
    sqlx::query(
        r#"
        INSERT INTO recipe_ingredients (recipe_id, ingredient_id)
        SELECT $1, unnest($2::bigint[])
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(recipe_id)
    .bind(ingredient_ids)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn create_recipe(
    db: &PgPool,
    user_id: Uuid,
    title: &str,
    time_minutes: i32,
    price: Decimal,
    link: Option<&str>,
    tag_ids: &[i64],
    ingredient_ids: &[i64],
) -> sqlx::Result<Recipe> {
    let mut tx = db.begin().await?;
    let recipe = sqlx::query_as::<_, Recipe>(&format!(
        r#"
        INSERT INTO recipes (user_id, title, time_minutes, price, link)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING {RECIPE_COLUMNS}
        "#
    ))
    .bind(user_id)
    .bind(title)
    .bind(time_minutes)
    .bind(price)
    .bind(link)
    .fetch_one(&mut *tx)
    .await?;

    replace_tag_links(&mut tx, recipe.id, tag_ids).await?;
    replace_ingredient_links(&mut tx, recipe.id, ingredient_ids).await?;
    tx.commit().await?;
    Ok(recipe)
}

/// Apply validated changes; returns None when the recipe is not visible to
/// `user_id`. Column and association updates share one transaction.
pub async fn update_recipe(
    db: &PgPool,
    user_id: Uuid,
    id: i64,
    changes: &RecipeChanges,
) -> sqlx::Result<Option<Recipe>> {
    let mut tx = db.begin().await?;
    let set_link = changes.link.is_some();
    let link_value = changes.link.clone().flatten();

    let recipe = sqlx::query_as::<_, Recipe>(&format!(
        r#"
        UPDATE recipes
           SET title = COALESCE($3, title),
               time_minutes = COALESCE($4, time_minutes),
               price = COALESCE($5, price),
               link = CASE WHEN $6 THEN $7 ELSE link END
         WHERE id = $1 AND user_id = $2
        RETURNING {RECIPE_COLUMNS}
        "#
    ))
    .bind(id)
    .bind(user_id)
    .bind(changes.title.as_deref())
    .bind(changes.time_minutes)
    .bind(changes.price)
    .bind(set_link)
    .bind(link_value)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(recipe) = recipe else {
        return Ok(None);
    };

    if let Some(tag_ids) = &changes.tags {
        replace_tag_links(&mut tx, recipe.id, tag_ids).await?;
    }
    if let Some(ingredient_ids) = &changes.ingredients {
        replace_ingredient_links(&mut tx, recipe.id, ingredient_ids).await?;
    }
    tx.commit().await?;
    Ok(Some(recipe))
}

/// Returns whether a visible row was deleted.
pub async fn delete_recipe(db: &PgPool, user_id: Uuid, id: i64) -> sqlx::Result<bool> {
    let result = sqlx::query("DELETE FROM recipes WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .execute(db)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn set_image_key(
    db: &PgPool,
    user_id: Uuid,
    id: i64,
    key: &str,
) -> sqlx::Result<Option<Recipe>> {
    sqlx::query_as::<_, Recipe>(&format!(
        r#"
        UPDATE recipes SET image_key = $3
         WHERE id = $1 AND user_id = $2
        RETURNING {RECIPE_COLUMNS}
        "#
    ))
    .bind(id)
    .bind(user_id)
    .bind(key)
    .fetch_optional(db)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_serialization_exposes_id_and_name_only() {
        let tag = Tag {
            id: 7,
            user_id: Uuid::new_v4(),
            name: "Vegan".into(),
        };
        let json = serde_json::to_value(&tag).unwrap();
        assert_eq!(json, serde_json::json!({ "id": 7, "name": "Vegan" }));
    }
}
