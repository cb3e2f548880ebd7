//! Lazy page-by-page retrieval driven by server pagination metadata.

use std::marker::PhantomData;

use futures::Stream;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error};

use super::{ApiClient, ApiError, ApiRequest, decode};

/// Pagination metadata reported by the CRM on every page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: u32,
    pub total_pages: u32,
}

#[derive(Debug, Clone)]
pub struct Page<T> {
    pub pagination: Pagination,
    pub items: Vec<T>,
}

/// Finite producer of pages for one collection.
///
/// Stops once the requested page index reaches the server-reported
/// `totalPages`, never on an empty page. A failed page is yielded once as an
/// error and ends the sequence. Build a new paginator to start over.
pub struct Paginator<T> {
    client: ApiClient,
    request: ApiRequest,
    results_key: &'static str,
    page_size: u32,
    next_page: u32,
    total_pages: Option<u32>,
    done: bool,
    _items: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> Paginator<T> {
    pub(crate) fn new(
        client: ApiClient,
        request: ApiRequest,
        results_key: &'static str,
        page_size: u32,
    ) -> Self {
        Self {
            client,
            request,
            results_key,
            page_size,
            next_page: 0,
            total_pages: None,
            done: false,
            _items: PhantomData,
        }
    }

    /// Fetches the next page, or `None` once the collection is exhausted.
    pub async fn next_page(&mut self) -> Option<Result<Page<T>, ApiError>> {
        if self.done {
            return None;
        }
        if let Some(total) = self.total_pages
            && self.next_page >= total
        {
            self.done = true;
            return None;
        }

        let request = self.request.for_page(self.next_page, self.page_size);
        let result = match self.client.send(&request).await {
            Ok(body) => decode_page(&request.path, &body, self.results_key),
            Err(e) => Err(e),
        };

        match result {
            Ok(page) => {
                let Pagination {
                    current_page,
                    total_pages,
                } = page.pagination;
                self.total_pages = Some(total_pages);
                if current_page >= total_pages {
                    self.done = true;
                    return None;
                }
                debug!(
                    path = %request.path,
                    page = current_page + 1,
                    total_pages,
                    items = page.items.len(),
                    "fetched page"
                );
                self.next_page += 1;
                Some(Ok(page))
            }
            Err(e) => {
                error!(
                    path = %request.path,
                    page = self.next_page,
                    error = %e,
                    "page retrieval failed, ending iteration"
                );
                self.done = true;
                Some(Err(e))
            }
        }
    }

    /// Drains every page into one list. Any page failure fails the whole call.
    pub async fn collect_items(mut self) -> Result<Vec<T>, ApiError> {
        let mut items = Vec::new();
        while let Some(page) = self.next_page().await {
            items.extend(page?.items);
        }
        Ok(items)
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<Page<T>, ApiError>> {
        futures::stream::unfold(self, |mut pages| async move {
            let page = pages.next_page().await?;
            Some((page, pages))
        })
    }
}

fn decode_page<T: DeserializeOwned>(
    path: &str,
    body: &str,
    results_key: &str,
) -> Result<Page<T>, ApiError> {
    let mut envelope: Value = decode(path, body)?;

    let pagination = envelope
        .get_mut("pagination")
        .map(Value::take)
        .ok_or_else(|| ApiError::Malformed {
            path: path.to_string(),
            reason: "missing pagination".to_string(),
        })?;
    let pagination: Pagination =
        serde_json::from_value(pagination).map_err(|source| ApiError::Decode {
            path: path.to_string(),
            source,
            body: body.to_string(),
        })?;

    // Neon reports an empty result set as null or omits the key.
    let items = match envelope.get_mut(results_key).map(Value::take) {
        None | Some(Value::Null) => Vec::new(),
        Some(results) => serde_json::from_value(results).map_err(|source| ApiError::Decode {
            path: path.to_string(),
            source,
            body: body.to_string(),
        })?,
    };

    Ok(Page { pagination, items })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_page() {
        let body = r#"{"pagination":{"currentPage":1,"pageSize":2,"totalPages":4,"totalResults":8},
                       "accounts":[{"accountId":"1"},{"accountId":"2"}]}"#;
        let page: Page<Value> = decode_page("/v2/accounts", body, "accounts").unwrap();

        assert_eq!(
            page.pagination,
            Pagination {
                current_page: 1,
                total_pages: 4
            }
        );
        assert_eq!(page.items.len(), 2);
    }

    #[test]
    fn test_decode_page_null_results() {
        let body = r#"{"pagination":{"currentPage":0,"totalPages":1},"memberships":null}"#;
        let page: Page<Value> = decode_page("/m", body, "memberships").unwrap();
        assert!(page.items.is_empty());

        let body = r#"{"pagination":{"currentPage":0,"totalPages":1}}"#;
        let page: Page<Value> = decode_page("/m", body, "memberships").unwrap();
        assert!(page.items.is_empty());
    }

    #[test]
    fn test_decode_page_without_pagination() {
        let err = decode_page::<Value>("/v2/accounts", r#"{"accounts":[]}"#, "accounts")
            .unwrap_err();
        assert!(matches!(err, ApiError::Malformed { .. }));
    }
}
