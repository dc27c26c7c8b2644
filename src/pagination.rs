//! Page-number pagination and whitelisted ordering for list endpoints.

use std::future::Future;

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::{IntoParams, ToSchema};

use crate::error::{AppError, AppResult, RepoResult};

pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 100;

/// PageParams
///
/// Query parameters shared by every paginated listing.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageParams {
    /// 1-based page number, or `last`.
    pub page: Option<String>,
    /// Items per page (default 10, max 100).
    pub page_size: Option<String>,
    /// Comma-separated fields; prefix with `-` for descending order.
    pub ordering: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageNumber {
    Number(i64),
    Last,
}

/// Column ordering understood by the repositories. `field` is always one of the
/// whitelisted internal names from an `OrderingSpec`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderBy {
    pub field: &'static str,
    pub descending: bool,
}

impl OrderBy {
    pub fn asc(field: &'static str) -> Self {
        Self {
            field,
            descending: false,
        }
    }

    pub fn desc(field: &'static str) -> Self {
        Self {
            field,
            descending: true,
        }
    }
}

/// One page worth of a listing, as handed to the repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub order: Vec<OrderBy>,
    pub limit: i64,
    pub offset: i64,
}

impl ListQuery {
    pub fn unbounded(order: Vec<OrderBy>) -> Self {
        Self {
            order,
            limit: i64::MAX,
            offset: 0,
        }
    }
}

/// OrderingSpec
///
/// Maps public ordering names to internal column names, plus the default order.
pub struct OrderingSpec {
    pub fields: &'static [(&'static str, &'static str)],
    pub default: &'static [OrderBy],
}

impl OrderingSpec {
    /// Unknown fields are ignored; if nothing valid remains the default applies.
    pub fn resolve(&self, raw: Option<&str>) -> Vec<OrderBy> {
        let parsed: Vec<OrderBy> = raw
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|term| !term.is_empty())
            .filter_map(|term| {
                let (descending, name) = match term.strip_prefix('-') {
                    Some(name) => (true, name),
                    None => (false, term),
                };
                self.fields
                    .iter()
                    .find(|(public, _)| *public == name)
                    .map(|(_, field)| OrderBy { field, descending })
            })
            .collect();

        if parsed.is_empty() {
            self.default.to_vec()
        } else {
            parsed
        }
    }
}

/// A validated page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: PageNumber,
    pub page_size: i64,
}

impl PageRequest {
    pub fn from_params(params: &PageParams) -> AppResult<Self> {
        let page = match params.page.as_deref().map(str::trim) {
            None | Some("") => PageNumber::Number(1),
            Some("last") => PageNumber::Last,
            Some(raw) => match raw.parse::<i64>() {
                Ok(n) if n >= 1 => PageNumber::Number(n),
                _ => return Err(AppError::InvalidPage),
            },
        };

        let page_size = params
            .page_size
            .as_deref()
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .filter(|size| *size > 0)
            .map(|size| size.min(MAX_PAGE_SIZE))
            .unwrap_or(DEFAULT_PAGE_SIZE);

        Ok(Self { page, page_size })
    }

    pub fn total_pages(&self, total_items: i64) -> i64 {
        ((total_items + self.page_size - 1) / self.page_size).max(1)
    }

    /// Runs `fetch` for the requested page and validates the page number against
    /// the total. `last` costs one extra query when it is not page 1.
    pub async fn fetch<T, F, Fut>(
        &self,
        order: Vec<OrderBy>,
        mut fetch: F,
    ) -> AppResult<(Vec<T>, i64, i64)>
    where
        F: FnMut(ListQuery) -> Fut,
        Fut: Future<Output = RepoResult<(Vec<T>, i64)>>,
    {
        let number = match self.page {
            PageNumber::Number(n) => n,
            PageNumber::Last => 1,
        };
        let query = |page: i64| ListQuery {
            order: order.clone(),
            limit: self.page_size,
            offset: (page - 1).saturating_mul(self.page_size),
        };

        let (mut items, total) = fetch(query(number)).await?;
        let total_pages = self.total_pages(total);

        let number = match self.page {
            PageNumber::Number(n) if n > total_pages => return Err(AppError::InvalidPage),
            PageNumber::Number(n) => n,
            PageNumber::Last if total_pages > 1 => {
                items = fetch(query(total_pages)).await?.0;
                total_pages
            }
            PageNumber::Last => 1,
        };

        Ok((items, total, number))
    }
}

/// Page
///
/// The envelope returned by every paginated listing.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
pub struct Page<T> {
    pub total_items: i64,
    pub total_pages: i64,
    pub current_page: i64,
    pub items_per_page: i64,
    pub next_page_link: Option<String>,
    pub previous_page_link: Option<String>,
    pub results: Vec<T>,
}

/// Absolute location of the listing, used to build neighbour page links.
#[derive(Debug, Clone)]
pub struct PageLinks<'a> {
    pub base_url: &'a str,
    pub path: &'a str,
    pub query: Option<&'a str>,
}

impl PageLinks<'_> {
    fn link(&self, page: i64) -> String {
        let mut pairs: Vec<String> = self
            .query
            .unwrap_or_default()
            .split('&')
            .filter(|pair| !pair.is_empty())
            .filter(|pair| pair.split('=').next() != Some("page"))
            .map(str::to_string)
            .collect();
        if page > 1 {
            pairs.push(format!("page={page}"));
        }

        let base = self.base_url.trim_end_matches('/');
        if pairs.is_empty() {
            format!("{}{}", base, self.path)
        } else {
            format!("{}{}?{}", base, self.path, pairs.join("&"))
        }
    }
}

impl<T> Page<T> {
    pub fn new(
        results: Vec<T>,
        total_items: i64,
        current_page: i64,
        request: &PageRequest,
        links: &PageLinks<'_>,
    ) -> Self {
        let total_pages = request.total_pages(total_items);
        Self {
            total_items,
            total_pages,
            current_page,
            items_per_page: request.page_size,
            next_page_link: (current_page < total_pages).then(|| links.link(current_page + 1)),
            previous_page_link: (current_page > 1).then(|| links.link(current_page - 1)),
            results,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            total_items: self.total_items,
            total_pages: self.total_pages,
            current_page: self.current_page,
            items_per_page: self.items_per_page,
            next_page_link: self.next_page_link,
            previous_page_link: self.previous_page_link,
            results: self.results.into_iter().map(f).collect(),
        }
    }

    /// The same envelope around a different result list of equal length.
    pub fn with_results<U>(self, results: Vec<U>) -> Page<U> {
        Page {
            total_items: self.total_items,
            total_pages: self.total_pages,
            current_page: self.current_page,
            items_per_page: self.items_per_page,
            next_page_link: self.next_page_link,
            previous_page_link: self.previous_page_link,
            results,
        }
    }
}
