use serde::{Deserialize, Serialize};

use super::error::ApiError;
use crate::constants::MAX_PAGE_SIZE;

#[derive(Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub number: i64,
    pub size: i64,
}

impl PageQuery {
    pub fn resolve(&self, default_size: i64) -> Page {
        Page {
            number: self.page.unwrap_or(1).max(1),
            size: self.limit.unwrap_or(default_size).clamp(1, MAX_PAGE_SIZE),
        }
    }
}

impl Page {
    pub fn offset(&self) -> i64 {
        (self.number - 1).saturating_mul(self.size)
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct PageContext<T> {
    pub count: i64,
    pub next: Option<i64>,
    pub previous: Option<i64>,
    pub results: Vec<T>,
}

impl<T> PageContext<T> {
    /// A page past the last one is a 404, since an empty window carries no total.
    pub fn from_rows(rows: Vec<T>, total_rows: i64, page: Page) -> Result<Self, ApiError> {
        if rows.is_empty() {
            if page.number > 1 {
                return Err(ApiError::NotFound(String::from("Invalid page")));
            }
            return Ok(Self::no_rows());
        }

        let next = (page.offset() + (rows.len() as i64) < total_rows).then_some(page.number + 1);
        let previous = (page.number > 1).then_some(page.number - 1);

        Ok(Self {
            count: total_rows,
            next,
            previous,
            results: rows,
        })
    }

    pub fn no_rows() -> Self {
        Self {
            count: 0,
            next: None,
            previous: None,
            results: vec![],
        }
    }
}
