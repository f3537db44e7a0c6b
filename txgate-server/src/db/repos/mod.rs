//! Repositories. All statement access goes through the request's bound
//! transaction; no repository ever touches a pool directly.

pub mod users;

use serde::{Deserialize, Serialize};

pub use users::{NewUser, User, UserChanges, UserRepo};

/// Query-string pagination parameters.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PaginationParams {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// Validated pagination window.
#[derive(Debug, Clone, Copy)]
pub struct Pagination {
    pub page: i64,
    pub per_page: i64,
}

impl Pagination {
    const DEFAULT_PER_PAGE: i64 = 50;
    const MAX_PER_PAGE: i64 = 200;
    const MAX_PAGE: i64 = 1_000_000;

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.per_page
    }
}

impl From<PaginationParams> for Pagination {
    fn from(p: PaginationParams) -> Self {
        Self {
            page: p.page.unwrap_or(1).clamp(1, Self::MAX_PAGE),
            per_page: p
                .per_page
                .unwrap_or(Self::DEFAULT_PER_PAGE)
                .clamp(1, Self::MAX_PER_PAGE),
        }
    }
}

/// One page of results plus the total count.
#[derive(Debug, Clone, Serialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_clamps_out_of_range_input() {
        let page = Pagination::from(PaginationParams {
            page: Some(0),
            per_page: Some(100_000),
        });
        assert_eq!(page.page, 1);
        assert_eq!(page.per_page, Pagination::MAX_PER_PAGE);
        assert_eq!(page.offset(), 0);
    }

    #[test]
    fn pagination_offset_stays_finite_for_huge_page_numbers() {
        let page = Pagination::from(PaginationParams {
            page: Some(i64::MAX),
            per_page: Some(Pagination::MAX_PER_PAGE),
        });
        assert_eq!(page.page, Pagination::MAX_PAGE);
        assert_eq!(
            page.offset(),
            (Pagination::MAX_PAGE - 1) * Pagination::MAX_PER_PAGE
        );
        assert!(page.offset() >= 0);
    }
}
