use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use super::{error::ApiError, pagination::PageQuery};
use crate::{
    config::{Bounds, Config},
    constants::{
        MAX_EMAIL_LENGTH, MAX_NAME_LENGTH, MAX_PERSON_NAME_LENGTH, MAX_SLUG_LENGTH,
        MAX_USERNAME_LENGTH, MIN_PASSWORD_LENGTH, MIN_PERSON_NAME_LENGTH, MIN_USERNAME_LENGTH,
        RESERVED_USERNAMES,
    },
};

static USERNAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_]+$").expect("static regex"));
static PERSON_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-zА-Яа-яЁё\s-]+$").expect("static regex"));
static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("static regex"));
static HEX_COLOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#(?:[0-9a-fA-F]{3}){1,2}$").expect("static regex"));
static SLUG: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[-a-zA-Z0-9_]+$").expect("static regex"));

fn required(field: &str, value: Option<String>) -> Result<String, ApiError> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ApiError::validation(field, "This field is required")),
    }
}

fn max_length(field: &str, value: &str, max: usize) -> Result<(), ApiError> {
    if value.chars().count() > max {
        return Err(ApiError::validation(
            field,
            format!("Ensure this field has no more than {max} characters"),
        ));
    }
    Ok(())
}

fn within(field: &str, value: i32, bounds: Bounds) -> Result<(), ApiError> {
    if !bounds.contains(value) {
        return Err(ApiError::validation(
            field,
            format!("Must be between {} and {}", bounds.min, bounds.max),
        ));
    }
    Ok(())
}

pub fn validate_password(field: &str, password: &str) -> Result<(), ApiError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ApiError::validation(
            field,
            format!("Password must contain at least {MIN_PASSWORD_LENGTH} characters"),
        ));
    }
    if password.chars().all(|c| c.is_ascii_digit()) {
        return Err(ApiError::validation(field, "Password must not be entirely numeric"));
    }
    Ok(())
}

// Recipes

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecipeLimits {
    pub amount: Bounds,
    pub cooking_time: Bounds,
}

impl From<&Config> for RecipeLimits {
    fn from(config: &Config) -> Self {
        Self {
            amount: config.amount,
            cooking_time: config.cooking_time,
        }
    }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngredientAmountForm {
    pub id: i32,
    pub amount: i32,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(default)]
pub struct RecipeForm {
    pub name: Option<String>,
    pub text: Option<String>,
    pub cooking_time: Option<i32>,
    pub image: Option<String>,
    pub tags: Vec<i32>,
    pub ingredients: Vec<IngredientAmountForm>,
}

/// A recipe payload that passed every check not requiring the database.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidRecipe {
    pub name: String,
    pub text: String,
    pub cooking_time: i32,
    pub image: Option<String>,
    pub tags: Vec<i32>,
    pub ingredients: Vec<IngredientAmountForm>,
}

impl RecipeForm {
    pub fn validate(self, limits: RecipeLimits, image_required: bool) -> Result<ValidRecipe, ApiError> {
        let name = required("name", self.name)?;
        let text = required("text", self.text)?;
        let cooking_time = self
            .cooking_time
            .ok_or_else(|| ApiError::validation("cooking_time", "This field is required"))?;
        let image = match self.image.map(|i| i.trim().to_string()) {
            Some(image) if !image.is_empty() => Some(image),
            _ if image_required => return Err(ApiError::validation("image", "This field is required")),
            _ => None,
        };

        max_length("name", &name, MAX_NAME_LENGTH)?;
        within("cooking_time", cooking_time, limits.cooking_time)?;

        if self.tags.is_empty() {
            return Err(ApiError::validation("tags", "At least one tag is required"));
        }
        if self.ingredients.is_empty() {
            return Err(ApiError::validation("ingredients", "At least one ingredient is required"));
        }

        let mut seen = HashSet::new();
        for ingredient in self.ingredients.iter() {
            if !seen.insert(ingredient.id) {
                return Err(ApiError::validation("ingredients", "Ingredients must not repeat"));
            }
            within("amount", ingredient.amount, limits.amount)?;
        }

        let mut seen = HashSet::new();
        let tags = self.tags.into_iter().filter(|id| seen.insert(*id)).collect();

        Ok(ValidRecipe {
            name,
            text,
            cooking_time,
            image,
            tags,
            ingredients: self.ingredients,
        })
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct RecipeFilter {
    pub page: PageQuery,
    pub author: Option<i32>,
    pub tags: Vec<String>,
    pub is_favorited: Option<bool>,
    pub is_in_shopping_cart: Option<bool>,
}

fn parse_flag(field: &str, value: &str) -> Result<bool, ApiError> {
    match value {
        "1" | "true" => Ok(true),
        "0" | "false" => Ok(false),
        _ => Err(ApiError::validation(field, "Expected 0 or 1")),
    }
}

fn parse_number<T: std::str::FromStr>(field: &str, value: &str) -> Result<T, ApiError> {
    value
        .parse()
        .map_err(|_| ApiError::validation(field, "A valid integer is required"))
}

impl RecipeFilter {
    /// Built from raw pairs since `tags` may repeat.
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Result<Self, ApiError> {
        let mut filter = Self::default();

        for (key, value) in pairs {
            match key.as_str() {
                "page" => filter.page.page = Some(parse_number("page", &value)?),
                "limit" => filter.page.limit = Some(parse_number("limit", &value)?),
                "author" => filter.author = Some(parse_number("author", &value)?),
                "tags" => {
                    if !value.is_empty() && !filter.tags.contains(&value) {
                        filter.tags.push(value);
                    }
                }
                "is_favorited" => filter.is_favorited = Some(parse_flag("is_favorited", &value)?),
                "is_in_shopping_cart" => {
                    filter.is_in_shopping_cart = Some(parse_flag("is_in_shopping_cart", &value)?)
                }
                _ => {}
            }
        }

        Ok(filter)
    }
}

// Users

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(default)]
pub struct UserForm {
    pub email: Option<String>,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidUser {
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
}

fn validate_person_name(field: &str, value: &str) -> Result<(), ApiError> {
    if value.chars().count() < MIN_PERSON_NAME_LENGTH {
        return Err(ApiError::validation(
            field,
            format!("Must contain at least {MIN_PERSON_NAME_LENGTH} characters"),
        ));
    }
    max_length(field, value, MAX_PERSON_NAME_LENGTH)?;
    if !PERSON_NAME.is_match(value) {
        return Err(ApiError::validation(
            field,
            "May only contain letters, spaces and hyphens",
        ));
    }
    Ok(())
}

impl UserForm {
    pub fn validate(self) -> Result<ValidUser, ApiError> {
        let email = required("email", self.email)?;
        let username = required("username", self.username)?;
        let first_name = required("first_name", self.first_name)?;
        let last_name = required("last_name", self.last_name)?;
        let password = self
            .password
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ApiError::validation("password", "This field is required"))?;

        max_length("email", &email, MAX_EMAIL_LENGTH)?;
        if !EMAIL.is_match(&email) {
            return Err(ApiError::validation("email", "Enter a valid email address"));
        }

        if RESERVED_USERNAMES.contains(&username.as_str()) {
            return Err(ApiError::validation("username", "This username is not allowed"));
        }
        if username.chars().count() < MIN_USERNAME_LENGTH {
            return Err(ApiError::validation(
                "username",
                format!("Username must contain at least {MIN_USERNAME_LENGTH} characters"),
            ));
        }
        max_length("username", &username, MAX_USERNAME_LENGTH)?;
        if !USERNAME.is_match(&username) {
            return Err(ApiError::validation(
                "username",
                "Username may only contain latin letters, digits and underscores",
            ));
        }

        validate_person_name("first_name", &first_name)?;
        validate_person_name("last_name", &last_name)?;
        validate_password("password", &password)?;

        Ok(ValidUser {
            email,
            username,
            first_name,
            last_name,
            password,
        })
    }
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(default)]
pub struct SetPasswordForm {
    pub current_password: Option<String>,
    pub new_password: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidPasswordChange {
    pub current_password: String,
    pub new_password: String,
}

impl SetPasswordForm {
    pub fn validate(self) -> Result<ValidPasswordChange, ApiError> {
        let current_password = self
            .current_password
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ApiError::validation("current_password", "This field is required"))?;
        let new_password = self
            .new_password
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ApiError::validation("new_password", "This field is required"))?;

        validate_password("new_password", &new_password)?;

        Ok(ValidPasswordChange {
            current_password,
            new_password,
        })
    }
}

// Catalog

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(default)]
pub struct TagForm {
    pub name: Option<String>,
    pub color: Option<String>,
    pub slug: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidTag {
    pub name: String,
    pub color: String,
    pub slug: String,
}

impl TagForm {
    pub fn validate(self) -> Result<ValidTag, ApiError> {
        let name = required("name", self.name)?;
        let color = required("color", self.color)?;
        let slug = required("slug", self.slug)?;

        max_length("name", &name, MAX_NAME_LENGTH)?;
        if !HEX_COLOR.is_match(&color) {
            return Err(ApiError::validation("color", "Color must be in HEX format"));
        }
        max_length("slug", &slug, MAX_SLUG_LENGTH)?;
        if !SLUG.is_match(&slug) {
            return Err(ApiError::validation(
                "slug",
                "Slug may only contain letters, digits, hyphens and underscores",
            ));
        }

        Ok(ValidTag { name, color, slug })
    }
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(default)]
pub struct IngredientForm {
    pub name: Option<String>,
    pub measurement_unit: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidIngredient {
    pub name: String,
    pub measurement_unit: String,
}

impl IngredientForm {
    pub fn validate(self) -> Result<ValidIngredient, ApiError> {
        let name = required("name", self.name)?;
        let measurement_unit = required("measurement_unit", self.measurement_unit)?;

        max_length("name", &name, MAX_NAME_LENGTH)?;
        max_length("measurement_unit", &measurement_unit, MAX_NAME_LENGTH)?;

        Ok(ValidIngredient {
            name,
            measurement_unit,
        })
    }
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct IngredientQuery {
    pub name: Option<String>,
}

#[derive(Deserialize, Debug, Default, Clone, Copy)]
pub struct SubscriptionQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub recipes_limit: Option<usize>,
}

impl SubscriptionQuery {
    pub fn page_query(&self) -> PageQuery {
        PageQuery {
            page: self.page,
            limit: self.limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    const LIMITS: RecipeLimits = RecipeLimits {
        amount: Bounds { min: 1, max: 1000 },
        cooking_time: Bounds { min: 1, max: 600 },
    };

    fn recipe_form() -> RecipeForm {
        RecipeForm {
            name: Some(String::from("Pancakes")),
            text: Some(String::from("Mix and fry.")),
            cooking_time: Some(20),
            image: Some(String::from("data:image/png;base64,AAAA")),
            tags: vec![1, 2],
            ingredients: vec![
                IngredientAmountForm { id: 10, amount: 200 },
                IngredientAmountForm { id: 11, amount: 2 },
            ],
        }
    }

    fn field_of(error: ApiError) -> String {
        match error {
            ApiError::Validation { field, .. } => field,
            other => panic!("expected a validation error, got {other:?}"),
        }
    }

    #[test]
    fn valid_recipe_passes() {
        let recipe = recipe_form().validate(LIMITS, true).unwrap();

        assert_eq!(recipe.name, "Pancakes");
        assert_eq!(recipe.tags, vec![1, 2]);
        assert_eq!(recipe.ingredients.len(), 2);
    }

    #[rstest]
    #[case::missing_name(RecipeForm { name: None, ..recipe_form() }, "name")]
    #[case::blank_text(RecipeForm { text: Some(String::from("  ")), ..recipe_form() }, "text")]
    #[case::missing_cooking_time(RecipeForm { cooking_time: None, ..recipe_form() }, "cooking_time")]
    #[case::zero_cooking_time(RecipeForm { cooking_time: Some(0), ..recipe_form() }, "cooking_time")]
    #[case::long_cooking_time(RecipeForm { cooking_time: Some(601), ..recipe_form() }, "cooking_time")]
    #[case::missing_image(RecipeForm { image: None, ..recipe_form() }, "image")]
    #[case::no_tags(RecipeForm { tags: vec![], ..recipe_form() }, "tags")]
    #[case::no_ingredients(RecipeForm { ingredients: vec![], ..recipe_form() }, "ingredients")]
    #[case::zero_amount(
        RecipeForm { ingredients: vec![IngredientAmountForm { id: 1, amount: 0 }], ..recipe_form() },
        "amount"
    )]
    fn invalid_recipe_names_the_field(#[case] form: RecipeForm, #[case] field: &str) {
        assert_eq!(field_of(form.validate(LIMITS, true).unwrap_err()), field);
    }

    #[test]
    fn duplicate_ingredient_ids_are_rejected() {
        let form = RecipeForm {
            ingredients: vec![
                IngredientAmountForm { id: 3, amount: 1 },
                IngredientAmountForm { id: 3, amount: 5 },
            ],
            ..recipe_form()
        };

        assert_eq!(
            form.validate(LIMITS, true).unwrap_err(),
            ApiError::validation("ingredients", "Ingredients must not repeat")
        );
    }

    #[test]
    fn duplicate_tags_collapse() {
        let form = RecipeForm {
            tags: vec![2, 1, 2],
            ..recipe_form()
        };

        assert_eq!(form.validate(LIMITS, true).unwrap().tags, vec![2, 1]);
    }

    #[test]
    fn image_is_optional_on_update() {
        let form = RecipeForm {
            image: None,
            ..recipe_form()
        };

        assert_eq!(form.validate(LIMITS, false).unwrap().image, None);
    }

    #[test]
    fn recipe_form_fields_default_when_absent() {
        let form: RecipeForm = serde_json::from_str(r#"{"name": "Soup"}"#).unwrap();
        assert_eq!(field_of(form.validate(LIMITS, true).unwrap_err()), "text");
    }

    #[test]
    fn filter_collects_repeated_tags() {
        let pairs = vec![
            (String::from("tags"), String::from("breakfast")),
            (String::from("tags"), String::from("lunch")),
            (String::from("tags"), String::from("breakfast")),
            (String::from("is_favorited"), String::from("1")),
            (String::from("author"), String::from("4")),
            (String::from("page"), String::from("2")),
        ];

        let filter = RecipeFilter::from_pairs(pairs).unwrap();
        assert_eq!(filter.tags, vec!["breakfast", "lunch"]);
        assert_eq!(filter.is_favorited, Some(true));
        assert_eq!(filter.is_in_shopping_cart, None);
        assert_eq!(filter.author, Some(4));
        assert_eq!(filter.page.page, Some(2));
    }

    #[test]
    fn filter_rejects_bad_flag() {
        let pairs = vec![(String::from("is_in_shopping_cart"), String::from("yes"))];
        assert_eq!(
            field_of(RecipeFilter::from_pairs(pairs).unwrap_err()),
            "is_in_shopping_cart"
        );
    }

    fn user_form() -> UserForm {
        UserForm {
            email: Some(String::from("chef@example.com")),
            username: Some(String::from("chef_01")),
            first_name: Some(String::from("Anna")),
            last_name: Some(String::from("Smith-Jones")),
            password: Some(String::from("correct horse")),
        }
    }

    #[test]
    fn valid_user_passes() {
        assert_eq!(user_form().validate().unwrap().username, "chef_01");
    }

    #[rstest]
    #[case::reserved(UserForm { username: Some(String::from("me")), ..user_form() }, "username")]
    #[case::short(UserForm { username: Some(String::from("abc")), ..user_form() }, "username")]
    #[case::symbols(UserForm { username: Some(String::from("chef.01")), ..user_form() }, "username")]
    #[case::email(UserForm { email: Some(String::from("chef.example.com")), ..user_form() }, "email")]
    #[case::first_name(UserForm { first_name: Some(String::from("A1")), ..user_form() }, "first_name")]
    #[case::short_password(UserForm { password: Some(String::from("short")), ..user_form() }, "password")]
    #[case::numeric_password(UserForm { password: Some(String::from("12345678")), ..user_form() }, "password")]
    fn invalid_user_names_the_field(#[case] form: UserForm, #[case] field: &str) {
        assert_eq!(field_of(form.validate().unwrap_err()), field);
    }

    #[test]
    fn cyrillic_names_are_accepted() {
        let form = UserForm {
            first_name: Some(String::from("Ёлка")),
            ..user_form()
        };
        assert!(form.validate().is_ok());
    }

    #[test]
    fn set_password_requires_both_fields() {
        let form = SetPasswordForm {
            current_password: Some(String::from("old password")),
            new_password: None,
        };
        assert_eq!(field_of(form.validate().unwrap_err()), "new_password");
    }

    #[rstest]
    #[case("#FFF", true)]
    #[case("#49b64e", true)]
    #[case("#12345", false)]
    #[case("49b64e", false)]
    #[case("#GGGGGG", false)]
    fn tag_color_must_be_hex(#[case] color: &str, #[case] valid: bool) {
        let form = TagForm {
            name: Some(String::from("Breakfast")),
            color: Some(color.to_string()),
            slug: Some(String::from("breakfast")),
        };
        assert_eq!(form.validate().is_ok(), valid);
    }

    #[test]
    fn tag_slug_rejects_spaces() {
        let form = TagForm {
            name: Some(String::from("Late dinner")),
            color: Some(String::from("#000")),
            slug: Some(String::from("late dinner")),
        };
        assert_eq!(field_of(form.validate().unwrap_err()), "slug");
    }

    #[test]
    fn ingredient_requires_unit() {
        let form = IngredientForm {
            name: Some(String::from("Flour")),
            measurement_unit: None,
        };
        assert_eq!(field_of(form.validate().unwrap_err()), "measurement_unit");
    }
}
