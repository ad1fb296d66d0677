use serde::{Deserialize, Serialize};

/// Common pagination parameters (`page` starts at 1).
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PageParams {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_per_page")]
    pub per_page: i64,
}

fn default_page() -> i64 {
    1
}

fn default_per_page() -> i64 {
    20
}

impl Default for PageParams {
    fn default() -> Self {
        Self {
            page: default_page(),
            per_page: default_per_page(),
        }
    }
}

impl PageParams {
    /// Clamp into a sane range; page is 1-based.
    pub fn normalized(self) -> Self {
        Self {
            page: self.page.max(1),
            per_page: self.per_page.clamp(1, 200),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page.max(1) - 1) * self.per_page
    }
}

/// Paginated result shape shared by every listing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub list: Vec<T>,
    pub total: i64,
    pub pages: i64,
    pub current_page: i64,
    pub per_page: i64,
}

impl<T> Page<T> {
    pub fn new(list: Vec<T>, total: i64, params: PageParams) -> Self {
        let params = params.normalized();
        let pages = if params.per_page > 0 {
            (total + params.per_page - 1) / params.per_page
        } else {
            0
        };
        Self {
            list,
            total,
            pages,
            current_page: params.page,
            per_page: params.per_page,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            list: self.list.into_iter().map(f).collect(),
            total: self.total,
            pages: self.pages,
            current_page: self.current_page,
            per_page: self.per_page,
        }
    }
}

/// Inclusive date range filter used by article and log listings.
#[derive(Debug, Clone, Deserialize)]
pub struct DateRange {
    pub start: Option<chrono::DateTime<chrono::Utc>>,
    pub end: Option<chrono::DateTime<chrono::Utc>>,
}

/// Inclusive retry-count range filter.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RetryRange {
    pub min: Option<i32>,
    pub max: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_count_rounds_up() {
        let page = Page::new(vec![1, 2, 3], 41, PageParams { page: 1, per_page: 20 });
        assert_eq!(page.pages, 3);
        assert_eq!(page.total, 41);
    }

    #[test]
    fn params_normalize_out_of_range() {
        let params = PageParams { page: 0, per_page: 100_000 }.normalized();
        assert_eq!(params.page, 1);
        assert_eq!(params.per_page, 200);
        assert_eq!(params.offset(), 0);
    }
}
