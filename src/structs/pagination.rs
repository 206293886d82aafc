use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MEMBER_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 100;

#[derive(Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

/// Page-number pagination. When `?page` is absent the endpoint answers with
/// a flat array capped at the default size instead of a pagination envelope.
pub struct PageParams {
    pub page: Option<i64>,
    pub size: i64,
}

impl PageParams {
    pub fn new(query: &PageQuery, default_size: i64) -> Self {
        let size = query
            .page_size
            .unwrap_or(default_size)
            .clamp(1, MAX_PAGE_SIZE);
        let page = query.page.map(|p| p.max(1));
        PageParams { page, size }
    }

    pub fn limit(&self) -> i64 {
        self.size
    }

    pub fn offset(&self) -> i64 {
        match self.page {
            Some(page) => (page - 1) * self.size,
            None => 0,
        }
    }

    pub fn is_paginated(&self) -> bool {
        self.page.is_some()
    }
}

#[derive(Serialize)]
pub struct Paginated<T> {
    pub count: i64,
    pub page: i64,
    pub page_size: i64,
    pub results: Vec<T>,
}

pub fn page_response<T: Serialize>(params: &PageParams, count: i64, results: Vec<T>) -> Response {
    match params.page {
        Some(page) => Json(Paginated {
            count,
            page,
            page_size: params.size,
            results,
        })
        .into_response(),
        None => Json(results).into_response(),
    }
}
