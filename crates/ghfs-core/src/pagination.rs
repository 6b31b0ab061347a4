//! Draining paginated remote collections.
//!
//! Backends describe one page at a time as a [`Page`]; [`drain`] keeps asking
//! for the next page until the collection is exhausted and returns every item
//! in response order.
//!
//! Two token shapes are supported:
//!
//! - **Offset**: 1-based page numbers with a fixed page size. A short page is
//!   the last one ([`Page::offset`]).
//! - **Cursor**: an opaque cursor plus an explicit "has more" flag
//!   ([`Page::cursor`]).
//!
//! An empty page always ends the drain, for APIs that never signal the end
//! explicitly. There is no iteration cap: an API that keeps
//! returning full pages forever is a transport bug.
//!
//! The drain is a plain future. Dropping it (for example when a request times
//! out) stops it before the next page is requested.

use std::future::Future;
use tracing::debug;

/// Largest page size the REST API accepts.
pub const DEFAULT_PER_PAGE: u32 = 100;

/// Position of a page within a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageToken {
    /// 1-based page number.
    Offset(u32),
    /// Cursor after which to continue; `None` requests the first page.
    Cursor(Option<String>),
}

impl PageToken {
    /// The first page for offset pagination.
    pub const FIRST_OFFSET: PageToken = PageToken::Offset(1);

    /// The first page for cursor pagination.
    pub const FIRST_CURSOR: PageToken = PageToken::Cursor(None);
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    /// Items in response order.
    pub items: Vec<T>,
    /// Token for the following page, `None` on the last page.
    pub next: Option<PageToken>,
}

impl<T> Page<T> {
    /// A page with no successor.
    pub fn last(items: Vec<T>) -> Self {
        Self { items, next: None }
    }

    /// An offset page: the next token is `page + 1` only if this page was
    /// full.
    pub fn offset(items: Vec<T>, page: u32, per_page: u32) -> Self {
        let full = u32::try_from(items.len()).is_ok_and(|len| len >= per_page);
        let next = full.then(|| PageToken::Offset(page + 1));
        Self { items, next }
    }

    /// A cursor page: the next token is `end_cursor` only if `has_more`.
    pub fn cursor(items: Vec<T>, has_more: bool, end_cursor: Option<String>) -> Self {
        let next = match (has_more, end_cursor) {
            (true, Some(cursor)) => Some(PageToken::Cursor(Some(cursor))),
            (true, None) => {
                debug!("page reports more results but no end cursor, stopping");
                None
            }
            (false, _) => None,
        };
        Self { items, next }
    }

    /// Applies `f` to every item, keeping the pagination state.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            next: self.next,
        }
    }
}

/// Fetches every page starting at `first` and concatenates the items.
///
/// Stops when a page is empty or has no next token. Errors from `fetch_page`
/// are returned as-is and abort the drain.
pub async fn drain<T, E, F, Fut>(first: PageToken, mut fetch_page: F) -> Result<Vec<T>, E>
where
    F: FnMut(PageToken) -> Fut,
    Fut: Future<Output = Result<Page<T>, E>>,
{
    let mut items = Vec::new();
    let mut token = first;
    let mut pages = 0usize;

    loop {
        let page = fetch_page(token).await?;
        pages += 1;

        if page.items.is_empty() {
            break;
        }
        items.extend(page.items);

        match page.next {
            Some(next) => token = next,
            None => break,
        }
    }

    debug!(pages, items = items.len(), "drained collection");
    Ok(items)
}
