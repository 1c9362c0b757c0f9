//! Pagination and sorting for listing queries.

use serde::Serialize;
use std::{collections::HashMap, str::FromStr};
use utoipa::ToSchema;

use crate::api::validator::Validator;

pub const SORT_SAFELIST: [&str; 6] = ["id", "title", "price", "-id", "-title", "-price"];
pub const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE: i64 = 10_000_000;
const MAX_PAGE_SIZE: i64 = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortColumn {
    Id,
    Title,
    Price,
}

/// A safelisted sort key. Never built from unchecked input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Sort {
    pub column: SortColumn,
    pub descending: bool,
}

impl Default for Sort {
    fn default() -> Self {
        Self {
            column: SortColumn::Id,
            descending: false,
        }
    }
}

impl FromStr for Sort {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !SORT_SAFELIST.contains(&s) {
            return Err(());
        }
        let (descending, name) = match s.strip_prefix('-') {
            Some(name) => (true, name),
            None => (false, s),
        };
        let column = match name {
            "id" => SortColumn::Id,
            "title" => SortColumn::Title,
            "price" => SortColumn::Price,
            _ => return Err(()),
        };
        Ok(Self { column, descending })
    }
}

impl Sort {
    #[must_use]
    pub const fn column_sql(self) -> &'static str {
        match self.column {
            SortColumn::Id => "id",
            SortColumn::Title => "title",
            SortColumn::Price => "price",
        }
    }

    #[must_use]
    pub const fn direction_sql(self) -> &'static str {
        if self.descending { "DESC" } else { "ASC" }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Filters {
    pub page: i64,
    pub page_size: i64,
    pub sort: Sort,
}

impl Default for Filters {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            sort: Sort::default(),
        }
    }
}

impl Filters {
    #[must_use]
    pub const fn limit(&self) -> i64 {
        self.page_size
    }

    #[must_use]
    pub const fn offset(&self) -> i64 {
        (self.page - 1) * self.page_size
    }
}

/// Parsed `GET /v1/ads` query.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AdQuery {
    pub title: String,
    pub categories: Vec<String>,
    pub filters: Filters,
}

impl AdQuery {
    /// Read and validate the raw query string pairs.
    ///
    /// Invalid integers and out-of-range or non-safelisted values are recorded
    /// on `v`; the returned query is only meaningful when `v` stays valid.
    pub fn parse(params: &HashMap<String, String>, v: &mut Validator) -> Self {
        let title = params.get("title").cloned().unwrap_or_default();
        let categories = params
            .get("categories")
            .filter(|csv| !csv.is_empty())
            .map(|csv| csv.split(',').map(str::to_string).collect())
            .unwrap_or_default();

        let page = read_int(params, "page", 1, v);
        let page_size = read_int(params, "page_size", DEFAULT_PAGE_SIZE, v);
        let sort_value = params.get("sort").map_or("id", String::as_str);

        v.check(page > 0, "page", "must be greater than zero");
        v.check(page <= MAX_PAGE, "page", "must be a maximum of 10 million");
        v.check(page_size > 0, "page_size", "must be greater than zero");
        v.check(page_size <= MAX_PAGE_SIZE, "page_size", "must be a maximum of 100");

        let sort = match sort_value.parse::<Sort>() {
            Ok(sort) => sort,
            Err(()) => {
                v.add_error("sort", "invalid sort value");
                Sort::default()
            }
        };

        Self {
            title,
            categories,
            filters: Filters {
                page,
                page_size,
                sort,
            },
        }
    }
}

fn read_int(params: &HashMap<String, String>, key: &str, default: i64, v: &mut Validator) -> i64 {
    match params.get(key).filter(|value| !value.is_empty()) {
        None => default,
        Some(value) => value.parse().unwrap_or_else(|_| {
            v.add_error(key, "must be an integer value");
            default
        }),
    }
}

/// Pagination summary; serializes as `{}` when nothing matched.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct Metadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_page: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_size: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_page: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_page: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_records: Option<i64>,
}

impl Metadata {
    #[must_use]
    pub fn calculate(total_records: i64, page: i64, page_size: i64) -> Self {
        if total_records == 0 || page_size <= 0 {
            return Self::default();
        }
        Self {
            current_page: Some(page),
            page_size: Some(page_size),
            first_page: Some(1),
            last_page: Some((total_records + page_size - 1) / page_size),
            total_records: Some(total_records),
        }
    }
}
