use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::price::Price;
use crate::api::validator::{Validator, unique};

pub const TITLE_MAX_BYTES: usize = 80;
pub const DESCRIPTION_MAX_BYTES: usize = 500;
pub const MAX_CATEGORIES: usize = 5;

/// A versioned listing record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct Ad {
    pub id: i64,
    #[serde(skip)]
    pub created_at: DateTime<Utc>,
    pub title: String,
    pub description: String,
    pub categories: Vec<String>,
    pub price: Price,
    pub version: i32,
}

impl Ad {
    /// An unsaved listing; storage assigns `id`, `created_at` and `version`.
    #[must_use]
    pub fn draft(title: String, description: String, categories: Vec<String>, price: Price) -> Self {
        Self {
            id: 0,
            created_at: Utc::now(),
            title,
            description,
            categories,
            price,
            version: 0,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct CreateAdRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub categories: Option<Vec<String>>,
    #[serde(default)]
    pub price: Price,
}

/// Partial update; absent fields keep their stored value.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct UpdateAdRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub categories: Option<Vec<String>>,
    pub price: Option<Price>,
}

impl UpdateAdRequest {
    pub fn apply(self, ad: &mut Ad) {
        if let Some(title) = self.title {
            ad.title = title;
        }
        if let Some(description) = self.description {
            ad.description = description;
        }
        if let Some(categories) = self.categories {
            ad.categories = categories;
        }
        if let Some(price) = self.price {
            ad.price = price;
        }
    }
}

pub fn validate_ad(v: &mut Validator, ad: &Ad, categories_provided: bool) {
    v.check(!ad.title.is_empty(), "title", "must be provided");
    v.check(
        ad.title.len() <= TITLE_MAX_BYTES,
        "title",
        "must not be more than 80 bytes long",
    );

    v.check(!ad.description.is_empty(), "description", "must be provided");
    v.check(
        ad.description.len() <= DESCRIPTION_MAX_BYTES,
        "description",
        "must not be more than 500 bytes long",
    );

    v.check(ad.price.0 != 0, "price", "must be provided");
    v.check(ad.price.0 > 0, "price", "must be positive integer");

    v.check(categories_provided, "categories", "must be provided");
    v.check(
        !ad.categories.is_empty(),
        "categories",
        "must contain at least 1 categories",
    );
    v.check(
        ad.categories.len() <= MAX_CATEGORIES,
        "categories",
        "must not contain more than 5 categories",
    );
    v.check(
        unique(&ad.categories),
        "categories",
        "must not contain duplicate values",
    );
}
