//! Shared types and pagination infrastructure for the YouTube API client.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};
use tokio_stream::{Stream, StreamExt};

/// Largest `maxResults` the list endpoints accept.
pub const MAX_PAGE_SIZE: u32 = 50;

type OneFuturePage<'a, F, T> =
    Pin<Box<dyn Future<Output = eyre::Result<(F, (VecDeque<T>, Option<String>))>> + 'a + Send>>;

/// A paginated stream that automatically fetches subsequent pages from a YouTube API list endpoint.
///
/// This stream yields items one by one, automatically fetching the next page when the current
/// page is exhausted. The first page is always requested; a missing or empty next-page token
/// ends the stream. Only supports forward pagination (no previous page support).
pub struct PagedStream<'a, T, F> {
    /// Current batch of items from the most recent API response
    current_items: VecDeque<T>,
    /// Future representing the currently pending API request, if any
    pending_request: Option<OneFuturePage<'a, F, T>>,
    /// Whether we've reached the end of all available data
    is_done: bool,
}

impl<'a, T, F> PagedStream<'a, T, F> {
    /// Creates a stream whose pages are produced by `fetcher`.
    ///
    /// `fetcher` receives `None` for the first page and the previous page's token after that,
    /// and resolves to that page's items plus the token for the page after it.
    pub fn new<Fut>(fetcher: F) -> Self
    where
        F: Fn(Option<String>) -> Fut,
        F: Send + 'a,
        Fut: Future<Output = eyre::Result<(VecDeque<T>, Option<String>)>> + Send + 'a,
    {
        let first_page = async move {
            let results = fetcher(None).await?;
            Ok((fetcher, results))
        };
        Self {
            pending_request: Some(Box::pin(first_page)),
            current_items: VecDeque::new(),
            is_done: false,
        }
    }
}

impl<'a, T: Unpin, F> Unpin for PagedStream<'a, T, F> {}

impl<'a, T: Unpin, F, Fut> Stream for PagedStream<'a, T, F>
where
    F: Fn(Option<String>) -> Fut,
    F: Send + 'a,
    Fut: Future<Output = eyre::Result<(VecDeque<T>, Option<String>)>> + Send + 'a,
{
    type Item = eyre::Result<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(item) = self.current_items.pop_front() {
                return Poll::Ready(Some(Ok(item)));
            }

            if self.is_done {
                return Poll::Ready(None);
            }

            let Some(pending) = self.pending_request.as_mut() else {
                self.is_done = true;
                return Poll::Ready(None);
            };

            match pending.as_mut().poll(cx) {
                Poll::Ready(Ok((fetcher, (items, next_token)))) => {
                    self.current_items.extend(items);

                    match next_token.filter(|token| !token.is_empty()) {
                        Some(next_token) => {
                            // Set up the future for the next page (but don't poll it yet)
                            self.pending_request = Some(Box::pin(async move {
                                let results = fetcher(Some(next_token)).await?;
                                Ok((fetcher, results))
                            }));
                        }
                        None => {
                            self.is_done = true;
                            self.pending_request = None;
                        }
                    }
                }
                Poll::Ready(Err(e)) => {
                    self.pending_request = None;
                    self.is_done = true;
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Drains a paged stream into a single collection, in order.
///
/// Stops at the first error and returns it; items fetched before the failure are discarded.
pub async fn collect_all<T, S>(stream: S) -> eyre::Result<Vec<T>>
where
    S: Stream<Item = eyre::Result<T>>,
{
    let mut stream = std::pin::pin!(stream);
    let mut all = Vec::new();
    while let Some(item) = stream.next().await {
        all.push(item?);
    }
    Ok(all)
}

/// Paging details for lists of resources.
///
/// See: <https://developers.google.com/youtube/v3/docs/pageInfo>
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageInfo {
    /// The total number of results in the result set.
    #[serde(rename = "totalResults", default)]
    pub total_results: u32,
    /// The number of results included in the API response.
    #[serde(rename = "resultsPerPage", default)]
    pub results_per_page: u32,
}

/// A thumbnail image, keyed by size name (`default`, `medium`, `high`, ...) in its parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thumbnail {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

pub type Thumbnails = BTreeMap<String, Thumbnail>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves `pages` in order, using the page's index as its token.
    fn pages_stream<'a>(
        pages: &'a [Vec<u32>],
        calls: &'a AtomicUsize,
        fail_at: Option<usize>,
    ) -> impl Stream<Item = eyre::Result<u32>> + 'a {
        PagedStream::new(move |token: Option<String>| async move {
            calls.fetch_add(1, Ordering::SeqCst);
            let index = match token {
                None => 0,
                Some(token) => token.parse::<usize>()?,
            };
            if fail_at == Some(index) {
                eyre::bail!("page {index} unavailable");
            }
            let next = (index + 1 < pages.len()).then(|| (index + 1).to_string());
            let items: VecDeque<u32> = pages[index].iter().copied().collect();
            Ok::<_, eyre::Report>((items, next))
        })
    }

    #[tokio::test]
    async fn concatenates_any_page_split_in_order() {
        let total: Vec<u32> = (0..137).collect();
        for page_size in [1, 7, 49, 50] {
            let pages: Vec<Vec<u32>> = total.chunks(page_size).map(<[u32]>::to_vec).collect();
            let calls = AtomicUsize::new(0);

            let all = collect_all(pages_stream(&pages, &calls, None)).await.unwrap();
            assert_eq!(all, total);
            assert_eq!(calls.load(Ordering::SeqCst), pages.len());
        }
    }

    #[tokio::test]
    async fn uneven_and_empty_pages() {
        let pages = vec![vec![1, 2, 3], vec![], vec![4], vec![5, 6]];
        let calls = AtomicUsize::new(0);

        let all = collect_all(pages_stream(&pages, &calls, None)).await.unwrap();
        assert_eq!(all, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn failure_discards_earlier_pages() {
        let pages = vec![vec![1, 2], vec![3, 4], vec![5]];
        let calls = AtomicUsize::new(0);

        let err = collect_all(pages_stream(&pages, &calls, Some(1)))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "page 1 unavailable");
        // no further pages after the failure
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn empty_token_ends_the_stream() {
        let calls = Arc::new(AtomicUsize::new(0));
        let stream = PagedStream::new({
            let calls = Arc::clone(&calls);
            move |token: Option<String>| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    assert_eq!(token, None);
                    Ok::<_, eyre::Report>((VecDeque::from(["only"]), Some(String::new())))
                }
            }
        });

        assert_eq!(collect_all(stream).await.unwrap(), vec!["only"]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
