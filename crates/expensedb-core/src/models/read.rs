use super::write::ValidationError;

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// 1-based page window used by `ExpensesRepository::list_expenses`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: u32,
    page_size: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageRequest {
    pub fn new(page: u32, page_size: u32) -> Result<Self, ValidationError> {
        if page < 1 {
            return Err(ValidationError::InvalidPageParam { name: "page", value: page });
        }
        if page_size < 1 {
            return Err(ValidationError::InvalidPageParam { name: "page_size", value: page_size });
        }
        Ok(Self { page, page_size })
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Number of records preceding this page.
    pub fn offset(&self) -> u64 {
        (u64::from(self.page) - 1) * u64::from(self.page_size)
    }

    /// Whether a page after this one holds records, given `total` records.
    pub fn has_next(&self, total: u64) -> bool {
        u64::from(self.page) * u64::from(self.page_size) + 1 <= total
    }

    /// Whether a page before this one holds records, given `total` records.
    pub fn has_prev(&self, total: u64) -> bool {
        self.page > 1 && self.offset() < total
    }
}
