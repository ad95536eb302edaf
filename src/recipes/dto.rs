use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

use super::repo::{Ingredient, Tag};

/// Query params for tag/ingredient listings. `assigned_only` is 0 or 1 on the
/// wire; any nonzero value enables the filter.
#[derive(Debug, Default, Deserialize)]
pub struct AttributeListParams {
    pub assigned_only: Option<u8>,
}

impl AttributeListParams {
    pub fn assigned_only(&self) -> bool {
        self.assigned_only.is_some_and(|v| v != 0)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateAttributeRequest {
    #[serde(default)]
    pub name: String,
}

impl CreateAttributeRequest {
    pub fn validate(self) -> Result<String, ApiError> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(ApiError::validation("name", "this field may not be blank"));
        }
        Ok(name)
    }
}

/// Query params for the recipe listing; both filters are comma-separated id
/// lists on the wire.
#[derive(Debug, Default, Deserialize)]
pub struct RecipeListParams {
    pub tags: Option<String>,
    pub ingredients: Option<String>,
}

/// Parse a comma-separated id list. Any token that is not an integer is a
/// fatal input error attributed to `field`.
pub fn parse_id_list(field: &'static str, raw: &str) -> Result<Vec<i64>, ApiError> {
    raw.split(',')
        .map(|token| {
            token.trim().parse::<i64>().map_err(|_| {
                ApiError::validation(field, format!("'{}' is not a valid id", token.trim()))
            })
        })
        .collect()
}

fn validate_title(title: &str) -> Result<String, ApiError> {
    let title = title.trim().to_string();
    if title.is_empty() {
        return Err(ApiError::validation("title", "this field may not be blank"));
    }
    Ok(title)
}

fn validate_time_minutes(minutes: Option<i32>) -> Result<i32, ApiError> {
    let minutes =
        minutes.ok_or_else(|| ApiError::validation("time_minutes", "this field is required"))?;
    if minutes < 0 {
        return Err(ApiError::validation(
            "time_minutes",
            "ensure this value is greater than or equal to 0",
        ));
    }
    Ok(minutes)
}

fn validate_price(price: Option<Decimal>) -> Result<Decimal, ApiError> {
    let price = price.ok_or_else(|| ApiError::validation("price", "this field is required"))?;
    if price.is_sign_negative() {
        return Err(ApiError::validation(
            "price",
            "ensure this value is greater than or equal to 0",
        ));
    }
    if price.scale() > 2 {
        return Err(ApiError::validation(
            "price",
            "ensure that there are no more than 2 decimal places",
        ));
    }
    // NUMERIC(5, 2) tops out at 999.99.
    if price >= Decimal::from(1000) {
        return Err(ApiError::validation(
            "price",
            "ensure that there are no more than 5 digits in total",
        ));
    }
    Ok(price)
}

/// Body for recipe creation, also reused verbatim by PUT: a full replace, so
/// omitted tag/ingredient lists mean "no associations" and an omitted link
/// clears the link.
#[derive(Debug, Default, Deserialize)]
pub struct RecipeWriteRequest {
    #[serde(default)]
    pub title: String,
    pub time_minutes: Option<i32>,
    pub price: Option<Decimal>,
    pub link: Option<String>,
    #[serde(default)]
    pub tags: Vec<i64>,
    #[serde(default)]
    pub ingredients: Vec<i64>,
}

#[derive(Debug)]
pub struct NewRecipe {
    pub title: String,
    pub time_minutes: i32,
    pub price: Decimal,
    pub link: Option<String>,
    pub tags: Vec<i64>,
    pub ingredients: Vec<i64>,
}

impl RecipeWriteRequest {
    pub fn validate(self) -> Result<NewRecipe, ApiError> {
        Ok(NewRecipe {
            title: validate_title(&self.title)?,
            time_minutes: validate_time_minutes(self.time_minutes)?,
            price: validate_price(self.price)?,
            link: self.link,
            tags: self.tags,
            ingredients: self.ingredients,
        })
    }
}

/// Body for PATCH: only supplied fields change; supplied tag/ingredient lists
/// replace the association set.
#[derive(Debug, Default, Deserialize)]
pub struct RecipePatchRequest {
    pub title: Option<String>,
    pub time_minutes: Option<i32>,
    pub price: Option<Decimal>,
    pub link: Option<String>,
    pub tags: Option<Vec<i64>>,
    pub ingredients: Option<Vec<i64>>,
}

/// Validated column/association changes; `None` leaves a field untouched.
#[derive(Debug, Default)]
pub struct RecipeChanges {
    pub title: Option<String>,
    pub time_minutes: Option<i32>,
    pub price: Option<Decimal>,
    /// Outer None: keep the link; Some(inner) overwrites, clearing on None.
    pub link: Option<Option<String>>,
    pub tags: Option<Vec<i64>>,
    pub ingredients: Option<Vec<i64>>,
}

impl RecipePatchRequest {
    pub fn validate(self) -> Result<RecipeChanges, ApiError> {
        let title = self.title.as_deref().map(validate_title).transpose()?;
        let time_minutes = self.time_minutes.map(Some).map(validate_time_minutes).transpose()?;
        let price = self.price.map(Some).map(validate_price).transpose()?;
        Ok(RecipeChanges {
            title,
            time_minutes,
            price,
            link: self.link.map(Some),
            tags: self.tags,
            ingredients: self.ingredients,
        })
    }
}

impl NewRecipe {
    /// A PUT is a full replace expressed as changes to every column.
    pub fn into_changes(self) -> RecipeChanges {
        RecipeChanges {
            title: Some(self.title),
            time_minutes: Some(self.time_minutes),
            price: Some(self.price),
            link: Some(self.link),
            tags: Some(self.tags),
            ingredients: Some(self.ingredients),
        }
    }
}

/// Summary form used by the listing: associations as id lists.
#[derive(Debug, Serialize)]
pub struct RecipeListItem {
    pub id: i64,
    pub title: String,
    pub time_minutes: i32,
    pub price: Decimal,
    pub link: Option<String>,
    pub tags: Vec<i64>,
    pub ingredients: Vec<i64>,
}

/// Detail form: associations nested as full objects.
#[derive(Debug, Serialize)]
pub struct RecipeDetail {
    pub id: i64,
    pub title: String,
    pub time_minutes: i32,
    pub price: Decimal,
    pub link: Option<String>,
    pub tags: Vec<Tag>,
    pub ingredients: Vec<Ingredient>,
}

/// Response for the image upload sub-action.
#[derive(Debug, Serialize)]
pub struct RecipeImageResponse {
    pub id: i64,
    pub image: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_req(title: &str) -> RecipeWriteRequest {
        RecipeWriteRequest {
            title: title.into(),
            time_minutes: Some(10),
            price: Some(Decimal::new(599, 2)),
            ..Default::default()
        }
    }

    #[test]
    fn parse_id_list_accepts_integers_and_spaces() {
        assert_eq!(parse_id_list("tags", "1,2,3").unwrap(), vec![1, 2, 3]);
        assert_eq!(parse_id_list("tags", " 4 , 5 ").unwrap(), vec![4, 5]);
    }

    #[test]
    fn parse_id_list_rejects_non_integer_tokens() {
        for bad in ["a,2", "1,,2", "", "1;2", "1.5"] {
            let err = parse_id_list("tags", bad).unwrap_err();
            assert!(
                matches!(err, ApiError::Validation { field: "tags", .. }),
                "{bad}"
            );
        }
    }

    #[test]
    fn assigned_only_flag_interpretation() {
        assert!(!AttributeListParams { assigned_only: None }.assigned_only());
        assert!(!AttributeListParams { assigned_only: Some(0) }.assigned_only());
        assert!(AttributeListParams { assigned_only: Some(1) }.assigned_only());
    }

    #[test]
    fn blank_attribute_name_is_rejected() {
        for bad in ["", "   "] {
            let err = CreateAttributeRequest { name: bad.into() }.validate().unwrap_err();
            assert!(matches!(err, ApiError::Validation { field: "name", .. }));
        }
        assert_eq!(
            CreateAttributeRequest { name: " Vegan ".into() }.validate().unwrap(),
            "Vegan"
        );
    }

    #[test]
    fn write_request_requires_title_time_and_price() {
        assert!(write_req("Soup").validate().is_ok());
        assert!(write_req("").validate().is_err());

        let err = RecipeWriteRequest {
            title: "Soup".into(),
            price: Some(Decimal::new(500, 2)),
            ..Default::default()
        }
        .validate()
        .unwrap_err();
        assert!(matches!(err, ApiError::Validation { field: "time_minutes", .. }));

        let err = RecipeWriteRequest {
            title: "Soup".into(),
            time_minutes: Some(10),
            ..Default::default()
        }
        .validate()
        .unwrap_err();
        assert!(matches!(err, ApiError::Validation { field: "price", .. }));
    }

    #[test]
    fn write_request_rejects_out_of_range_values() {
        let mut req = write_req("Soup");
        req.time_minutes = Some(-1);
        assert!(req.validate().is_err());

        let mut req = write_req("Soup");
        req.price = Some(Decimal::new(-100, 2));
        assert!(req.validate().is_err());

        let mut req = write_req("Soup");
        req.price = Some(Decimal::new(100000, 2)); // 1000.00 > NUMERIC(5,2)
        assert!(req.validate().is_err());
    }

    #[test]
    fn full_replace_clears_omitted_associations_and_link() {
        let changes = write_req("Soup").validate().unwrap().into_changes();
        assert_eq!(changes.tags.as_deref(), Some(&[][..]));
        assert_eq!(changes.ingredients.as_deref(), Some(&[][..]));
        assert_eq!(changes.link, Some(None));
    }

    #[test]
    fn patch_leaves_omitted_fields_untouched() {
        let changes = RecipePatchRequest {
            title: Some("New Title".into()),
            ..Default::default()
        }
        .validate()
        .unwrap();
        assert_eq!(changes.title.as_deref(), Some("New Title"));
        assert!(changes.tags.is_none());
        assert!(changes.ingredients.is_none());
        assert!(changes.link.is_none());
        assert!(changes.price.is_none());
    }

    #[test]
    fn price_deserializes_from_number_and_serializes_as_string() {
        let req: RecipeWriteRequest =
            serde_json::from_str(r#"{"title":"Soup","time_minutes":10,"price":5.00}"#).unwrap();
        let recipe = req.validate().unwrap();
        assert_eq!(recipe.price, Decimal::new(500, 2));

        let item = RecipeListItem {
            id: 1,
            title: "Soup".into(),
            time_minutes: 10,
            price: Decimal::new(500, 2),
            link: None,
            tags: vec![],
            ingredients: vec![],
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["price"], "5.00");
    }
}
