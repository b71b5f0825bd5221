use crate::cursor::{Cursor, Keyed, Position};
use crate::error::PaginationError;
use std::cmp::Reverse;

/// A keyset scan request: rows matching `filter` that come strictly after
/// `after` in newest-first order, at most [`fetch`](Self::fetch) of them.
///
/// Stores must translate [`admits`](Self::admits) literally. In SQL that is
/// `created_at < :t OR (created_at = :t AND id < :id)` together with
/// `ORDER BY created_at DESC, id DESC LIMIT :fetch`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeysetQuery<F> {
    filter: F,
    after: Option<Position>,
    limit: usize,
}

impl<F> KeysetQuery<F> {
    /// Builds a query from an optional cursor token.
    ///
    /// `limit` is expected to be normalized already (see
    /// [`PageLimits::clamp`](crate::page::PageLimits::clamp)).
    pub fn build(filter: F, cursor: Option<&str>, limit: usize) -> Result<Self, PaginationError> {
        let after = cursor.map(Cursor::decode).transpose()?;
        Ok(Self::new(filter, after, limit))
    }

    pub fn new(filter: F, after: Option<Position>, limit: usize) -> Self {
        Self {
            filter,
            after,
            limit,
        }
    }

    pub fn filter(&self) -> &F {
        &self.filter
    }

    /// The position the scan resumes after, if any.
    pub fn after(&self) -> Option<&Position> {
        self.after.as_ref()
    }

    /// Page size the caller asked for.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Number of rows to fetch: one more than the page size, so the page
    /// assembler can tell whether another page exists without a second
    /// round trip.
    pub fn fetch(&self) -> usize {
        self.limit.saturating_add(1)
    }

    /// Whether `position` lies strictly after the resume point.
    pub fn admits(&self, position: &Position) -> bool {
        match &self.after {
            None => true,
            Some(after) => {
                position.created_at < after.created_at
                    || (position.created_at == after.created_at && position.id < after.id)
            }
        }
    }
}

/// Sorts rows newest first: `created_at` descending, then `id` descending.
pub fn order_newest_first<T: Keyed>(rows: &mut [T]) {
    rows.sort_unstable_by_key(|row| Reverse(row.position()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordId;
    use jiff::Timestamp;

    fn at(second: i64, id: u64) -> Position {
        Position::new(Timestamp::from_second(second).unwrap(), RecordId::new(id))
    }

    #[test]
    fn without_cursor_everything_is_admitted() {
        let query = KeysetQuery::build((), None, 10).unwrap();
        assert!(query.after().is_none());
        assert!(query.admits(&at(0, 0)));
        assert_eq!(query.fetch(), 11);
    }

    #[test]
    fn cursor_admits_strictly_older_rows() {
        let token = Cursor::encode(&at(5, 10));
        let query = KeysetQuery::build((), Some(token.as_str()), 2).unwrap();

        assert!(query.admits(&at(4, 99)));
        assert!(query.admits(&at(5, 9)));
        assert!(!query.admits(&at(5, 10)));
        assert!(!query.admits(&at(5, 11)));
        assert!(!query.admits(&at(6, 1)));
    }

    #[test]
    fn invalid_cursor_fails_the_build() {
        let err = KeysetQuery::build((), Some("%%%"), 2).unwrap_err();
        assert!(matches!(err, PaginationError::InvalidCursor(_)));
    }

    #[test]
    fn fetch_does_not_overflow() {
        let query = KeysetQuery::new((), None, usize::MAX);
        assert_eq!(query.fetch(), usize::MAX);
    }

    #[test]
    fn newest_first_breaks_ties_by_id() {
        struct Row(Position);
        impl Keyed for Row {
            fn position(&self) -> Position {
                self.0
            }
        }

        let mut rows = vec![Row(at(3, 25)), Row(at(5, 1)), Row(at(4, 26)), Row(at(5, 2))];
        order_newest_first(&mut rows);
        let order: Vec<_> = rows.iter().map(|r| r.0).collect();
        assert_eq!(order, vec![at(5, 2), at(5, 1), at(4, 26), at(3, 25)]);
    }
}
