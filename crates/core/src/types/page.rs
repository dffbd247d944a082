//! Pagination parameters and page arithmetic.

use serde::Serialize;

/// Errors produced while reading pagination parameters.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PageError {
    /// `page` is not an integer of at least 1.
    #[error("The page must be an integer of at least 1.")]
    InvalidPage,
    /// `count` is not an integer within `1..=100`.
    #[error("The count must be an integer between {min} and {max}.")]
    InvalidCount {
        /// Smallest accepted page size.
        min: u32,
        /// Largest accepted page size.
        max: u32,
    },
}

impl PageError {
    /// Name of the query parameter the error refers to.
    #[must_use]
    pub const fn field(&self) -> &'static str {
        match self {
            Self::InvalidPage => "page",
            Self::InvalidCount { .. } => "count",
        }
    }
}

/// A validated page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageRequest {
    page: u32,
    count: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            count: Self::DEFAULT_COUNT,
        }
    }
}

impl PageRequest {
    /// Page size used when the client does not send one.
    pub const DEFAULT_COUNT: u32 = 5;
    /// Smallest accepted page size.
    pub const MIN_COUNT: u32 = 1;
    /// Largest accepted page size.
    pub const MAX_COUNT: u32 = 100;

    /// Build a request from already typed values.
    ///
    /// # Errors
    ///
    /// Returns a [`PageError`] if `page` is zero or `count` is out of range.
    pub const fn new(page: u32, count: u32) -> Result<Self, PageError> {
        if page == 0 {
            return Err(PageError::InvalidPage);
        }
        if count < Self::MIN_COUNT || count > Self::MAX_COUNT {
            return Err(PageError::InvalidCount {
                min: Self::MIN_COUNT,
                max: Self::MAX_COUNT,
            });
        }
        Ok(Self { page, count })
    }

    /// Parse raw query-string values, applying defaults for absent ones.
    ///
    /// Every invalid parameter is reported, not just the first.
    ///
    /// # Errors
    ///
    /// Returns all [`PageError`]s found.
    pub fn parse(page: Option<&str>, count: Option<&str>) -> Result<Self, Vec<PageError>> {
        let mut errors = Vec::new();

        let page = match page.map(str::trim) {
            None | Some("") => Some(1),
            Some(raw) => raw.parse::<u32>().ok().filter(|p| *p >= 1),
        };
        if page.is_none() {
            errors.push(PageError::InvalidPage);
        }

        let count = match count.map(str::trim) {
            None | Some("") => Some(Self::DEFAULT_COUNT),
            Some(raw) => raw
                .parse::<u32>()
                .ok()
                .filter(|c| (Self::MIN_COUNT..=Self::MAX_COUNT).contains(c)),
        };
        if count.is_none() {
            errors.push(PageError::InvalidCount {
                min: Self::MIN_COUNT,
                max: Self::MAX_COUNT,
            });
        }

        match (page, count) {
            (Some(page), Some(count)) => Ok(Self { page, count }),
            _ => Err(errors),
        }
    }

    /// 1-based page number.
    #[must_use]
    pub const fn page(&self) -> u32 {
        self.page
    }

    /// Page size.
    #[must_use]
    pub const fn count(&self) -> u32 {
        self.count
    }

    /// Number of rows to skip.
    #[must_use]
    pub const fn offset(&self) -> u64 {
        (self.page as u64 - 1) * self.count as u64
    }
}

/// Position of a page within a result set of known size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageWindow {
    /// Current page (1-based).
    pub page: u32,
    /// Page size.
    pub count: u32,
    /// Total number of rows across all pages.
    pub total: u64,
    /// Number of the last page; never less than 1.
    pub total_pages: u64,
}

impl PageWindow {
    /// Compute the window for `request` over `total` rows.
    #[must_use]
    pub const fn new(request: PageRequest, total: u64) -> Self {
        let count = request.count as u64;
        let pages = total.div_ceil(count);
        Self {
            page: request.page,
            count: request.count,
            total,
            total_pages: if pages == 0 { 1 } else { pages },
        }
    }

    /// Page after this one, if it exists.
    #[must_use]
    pub const fn next_page(&self) -> Option<u32> {
        if (self.page as u64) < self.total_pages {
            Some(self.page + 1)
        } else {
            None
        }
    }

    /// Page before this one, if this is not the first page.
    #[must_use]
    pub const fn previous_page(&self) -> Option<u32> {
        if self.page > 1 {
            Some(self.page - 1)
        } else {
            None
        }
    }
}
