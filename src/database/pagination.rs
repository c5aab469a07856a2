use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

#[derive(Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PageQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl PageQuery {
    pub fn limit(&self) -> i64 {
        self.limit
            .filter(|limit| *limit > 0)
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .min(MAX_PAGE_SIZE)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

#[derive(Serialize, Debug)]
pub struct Page<T> {
    pub count: i64,
    pub next_offset: Option<i64>,
    pub prev_offset: Option<i64>,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    pub fn from_rows(results: Vec<T>, total_rows: i64, query: PageQuery) -> Self {
        let (limit, offset) = (query.limit(), query.offset());

        let next_offset = offset
            .checked_add(limit)
            .filter(|next| *next < total_rows);
        let prev_offset = Some((offset - limit).max(0)).filter(|_| offset > 0);

        Self {
            count: total_rows,
            next_offset,
            prev_offset,
            results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_falls_back_and_is_capped() {
        assert_eq!(PageQuery::default().limit(), DEFAULT_PAGE_SIZE);
        assert_eq!(PageQuery { limit: Some(0), offset: None }.limit(), DEFAULT_PAGE_SIZE);
        assert_eq!(PageQuery { limit: Some(10_000), offset: None }.limit(), MAX_PAGE_SIZE);
        assert_eq!(PageQuery { limit: None, offset: Some(-5) }.offset(), 0);
    }

    #[test]
    fn offsets_point_at_neighbouring_pages() {
        let query = PageQuery { limit: Some(2), offset: Some(2) };
        let page = Page::from_rows(vec!["c", "d"], 5, query);

        assert_eq!(page.next_offset, Some(4));
        assert_eq!(page.prev_offset, Some(0));

        let last = Page::from_rows(vec!["e"], 5, PageQuery { limit: Some(2), offset: Some(4) });
        assert_eq!(last.next_offset, None);

        let first = Page::from_rows(vec!["a", "b"], 5, PageQuery { limit: Some(2), offset: None });
        assert_eq!(first.prev_offset, None);
    }

    #[test]
    fn huge_offsets_have_no_next_page() {
        let query = PageQuery { limit: Some(6), offset: Some(i64::MAX) };
        let page = Page::<&str>::from_rows(vec![], 0, query);

        assert_eq!(page.next_offset, None);
        assert_eq!(page.prev_offset, Some(i64::MAX - 6));
    }
}
