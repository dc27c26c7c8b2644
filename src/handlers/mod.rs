//! HTTP handlers, grouped by the area of the API they serve.

use std::future::Future;

use axum::http::Uri;

use crate::{
    AppState,
    error::{AppResult, RepoResult},
    pagination::{ListQuery, OrderingSpec, Page, PageLinks, PageParams, PageRequest},
};

pub mod accounts;
pub mod admin;
pub mod catalog;
pub mod community;

/// paginate
///
/// Shared plumbing of every paginated listing: validates the page parameters,
/// resolves `ordering` against the resource's whitelist, runs `fetch` and wraps
/// the rows into the page envelope with absolute neighbour links.
pub(crate) async fn paginate<T, F, Fut>(
    state: &AppState,
    uri: &Uri,
    params: &PageParams,
    ordering: &OrderingSpec,
    fetch: F,
) -> AppResult<Page<T>>
where
    F: FnMut(ListQuery) -> Fut,
    Fut: Future<Output = RepoResult<(Vec<T>, i64)>>,
{
    let request = PageRequest::from_params(params)?;
    let order = ordering.resolve(params.ordering.as_deref());
    let (rows, total, current) = request.fetch(order, fetch).await?;

    let links = PageLinks {
        base_url: &state.config.public_base_url,
        path: uri.path(),
        query: uri.query(),
    };
    Ok(Page::new(rows, total, current, &request, &links))
}
