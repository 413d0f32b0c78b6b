//! Cursor pagination over `(created_at, id)`.
//!
//! Listing endpoints page descending on creation order. A cursor is the
//! boundary pair of the row it was derived from; `next` walks strictly
//! older rows, `previous` strictly newer ones. Supplying both bounds in
//! one request is rejected as a pagination deadlock rather than silently
//! picking a side.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Fixed page size for all listing queries.
pub const PAGE_SIZE: i64 = 25;

/// Opaque ordered position of a row in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    /// Creation timestamp of the boundary row.
    pub created_at: DateTime<Utc>,
    /// Internal id of the boundary row, tie-breaker within a timestamp.
    pub id: Uuid,
}

impl Cursor {
    /// Encodes the cursor for transport in a query parameter.
    pub fn encode(&self) -> String {
        format!("{}|{}", self.created_at.to_rfc3339(), self.id)
    }

    /// Decodes a cursor produced by [`Cursor::encode`].
    pub fn decode(raw: &str) -> Option<Self> {
        let (timestamp, id) = raw.split_once('|')?;
        let created_at = DateTime::parse_from_rfc3339(timestamp).ok()?.with_timezone(&Utc);
        let id = Uuid::parse_str(id).ok()?;
        Some(Self { created_at, id })
    }
}

/// Implemented by aggregates that can bound a page.
pub trait Paginateable {
    /// Returns the cursor positioned at this entity.
    fn cursor(&self) -> Cursor;
}

/// A pair of optional page bounds.
#[derive(Debug, Clone, Copy, Default)]
pub struct Pagination {
    /// Bound towards newer rows.
    pub previous: Option<Cursor>,
    /// Bound towards older rows.
    pub next: Option<Cursor>,
}

impl Pagination {
    /// Builds a pagination request bounded by the given entities.
    pub fn new(previous: Option<&dyn Paginateable>, next: Option<&dyn Paginateable>) -> Self {
        Self { previous: previous.map(Paginateable::cursor), next: next.map(Paginateable::cursor) }
    }

    /// True when both bounds are set and the request cannot be satisfied.
    pub fn is_deadlocked(&self) -> bool {
        self.previous.is_some() && self.next.is_some()
    }

    /// Derives the outgoing page bounds from a result set.
    ///
    /// Items arrive newest-first; the first row bounds `previous`, the last
    /// bounds `next`. An empty page yields no bounds at all, which callers
    /// read as "cursor exhausted".
    pub fn of_page<T: Paginateable>(items: &[T]) -> Self {
        match (items.first(), items.last()) {
            (Some(first), Some(last)) => {
                Self { previous: Some(first.cursor()), next: Some(last.cursor()) }
            },
            _ => Self::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Row(DateTime<Utc>, Uuid);

    impl Paginateable for Row {
        fn cursor(&self) -> Cursor {
            Cursor { created_at: self.0, id: self.1 }
        }
    }

    #[test]
    fn cursor_round_trips_through_encoding() {
        let cursor = Cursor { created_at: Utc::now(), id: Uuid::new_v4() };
        let decoded = Cursor::decode(&cursor.encode()).unwrap();
        assert_eq!(decoded.id, cursor.id);
        assert_eq!(decoded.created_at, cursor.created_at);
    }

    #[test]
    fn malformed_cursor_decodes_to_none() {
        assert!(Cursor::decode("").is_none());
        assert!(Cursor::decode("not-a-cursor").is_none());
        assert!(Cursor::decode("2024-01-01T00:00:00Z|not-a-uuid").is_none());
    }

    #[test]
    fn both_bounds_deadlock() {
        let a = Row(Utc::now(), Uuid::new_v4());
        let b = Row(Utc::now(), Uuid::new_v4());
        assert!(Pagination::new(Some(&a), Some(&b)).is_deadlocked());
        assert!(!Pagination::new(Some(&a), None).is_deadlocked());
        assert!(!Pagination::new(None, None).is_deadlocked());
    }

    #[test]
    fn empty_page_has_no_bounds() {
        let page = Pagination::of_page::<Row>(&[]);
        assert!(page.previous.is_none());
        assert!(page.next.is_none());
    }

    #[test]
    fn page_bounds_come_from_boundary_rows() {
        let newest = Row(Utc::now(), Uuid::new_v4());
        let oldest = Row(Utc::now() - chrono::Duration::seconds(10), Uuid::new_v4());
        let first_id = newest.1;
        let last_id = oldest.1;
        let page = Pagination::of_page(&[newest, oldest]);
        assert_eq!(page.previous.unwrap().id, first_id);
        assert_eq!(page.next.unwrap().id, last_id);
    }
}
