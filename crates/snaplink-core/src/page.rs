use crate::cursor::{Cursor, Keyed};
use crate::error::PaginationError;
use crate::keyset::KeysetQuery;
use crate::repository::KeysetSource;
use serde::Serialize;
use typed_builder::TypedBuilder;

/// One page of a newest-first listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: PageInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageInfo {
    /// Page size that was actually applied.
    pub limit: usize,
    /// Token to pass back for the following page; present only if one exists.
    pub next_cursor: Option<Cursor>,
    pub has_next_page: bool,
}

impl<T: Keyed> Page<T> {
    /// Turns an over-fetched, newest-first result set into a page.
    ///
    /// `rows` may hold up to `limit + 1` items. The surplus item is only
    /// evidence that a further page exists and is dropped; the next cursor
    /// points at the last item that is kept.
    pub fn assemble(mut rows: Vec<T>, limit: usize) -> Self {
        let has_next_page = rows.len() > limit;
        rows.truncate(limit);

        let next_cursor = if has_next_page {
            rows.last().map(|last| Cursor::encode(&last.position()))
        } else {
            None
        };

        Self {
            items: rows,
            page: PageInfo {
                limit,
                has_next_page: next_cursor.is_some(),
                next_cursor,
            },
        }
    }
}

impl<T> Page<T> {
    pub fn next_cursor(&self) -> Option<&Cursor> {
        self.page.next_cursor.as_ref()
    }

    pub fn has_next_page(&self) -> bool {
        self.page.has_next_page
    }
}

/// Page size policy applied to client-supplied limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TypedBuilder)]
pub struct PageLimits {
    /// Used when the client asks for nothing, or for something non-positive.
    #[builder(default = 20)]
    pub default_limit: usize,
    /// Upper bound for any page.
    #[builder(default = 100)]
    pub max_limit: usize,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl PageLimits {
    /// Normalizes a requested page size into `1..=max_limit`.
    pub fn clamp(&self, requested: Option<i64>) -> usize {
        let max = self.max_limit.max(1);
        match requested.and_then(|value| usize::try_from(value).ok()) {
            Some(value) if value > 0 => value.min(max),
            _ => self.default_limit.clamp(1, max),
        }
    }
}

/// Lists one page of `source`, resuming after `cursor` when given.
///
/// This is a single store round trip: the scan asks for `limit + 1` rows
/// and [`Page::assemble`] trims the surplus.
pub async fn list_page<S, F>(
    source: &S,
    filter: F,
    cursor: Option<&str>,
    limit: usize,
) -> Result<Page<S::Item>, PaginationError>
where
    S: KeysetSource<F> + ?Sized,
    F: Send + Sync,
{
    let query = KeysetQuery::build(filter, cursor, limit)?;
    let rows = source.scan(&query).await?;
    Ok(Page::assemble(rows, query.limit()))
}
