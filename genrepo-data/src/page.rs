use serde::{Deserialize, Serialize};

use crate::error::DataError;

/// One-based pagination parameters.
///
/// Both fields must be at least 1. Out-of-range values are rejected, never
/// clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pageable {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_page_size")]
    pub size: i64,
}

fn default_page() -> i64 {
    1
}

fn default_page_size() -> i64 {
    20
}

impl Default for Pageable {
    fn default() -> Self {
        Self {
            page: default_page(),
            size: default_page_size(),
        }
    }
}

impl Pageable {
    pub fn new(page: i64, size: i64) -> Self {
        Self { page, size }
    }

    pub fn validate(&self) -> Result<(), DataError> {
        if self.page <= 0 {
            return Err(DataError::InvalidArgument(format!(
                "page number must be at least 1, got {}",
                self.page
            )));
        }
        if self.size <= 0 {
            return Err(DataError::InvalidArgument(format!(
                "page size must be at least 1, got {}",
                self.size
            )));
        }
        Ok(())
    }

    /// Rows to skip: `(page - 1) * size`.
    pub fn offset(&self) -> Result<u64, DataError> {
        self.validate()?;
        ((self.page - 1) as u64)
            .checked_mul(self.size as u64)
            .ok_or_else(|| DataError::InvalidArgument("page offset overflows".to_string()))
    }

    pub fn next(&self) -> Self {
        Self::new(self.page.saturating_add(1), self.size)
    }
}

/// A page of results with pagination metadata.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub content: Vec<T>,
    pub page: i64,
    pub size: i64,
    pub total_elements: u64,
    pub total_pages: u64,
}

impl<T> Page<T> {
    pub fn new(content: Vec<T>, pageable: &Pageable, total_elements: u64) -> Self {
        let size = pageable.size.max(0) as u64;
        let total_pages = if size == 0 {
            0
        } else {
            total_elements.div_ceil(size)
        };
        Self {
            content,
            page: pageable.page,
            size: pageable.size,
            total_elements,
            total_pages,
        }
    }

    pub fn has_next(&self) -> bool {
        (self.page as u64) < self.total_pages
    }

    pub fn has_previous(&self) -> bool {
        self.page > 1
    }

    /// Transform the content, keeping the metadata.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            content: self.content.into_iter().map(f).collect(),
            page: self.page,
            size: self.size,
            total_elements: self.total_elements,
            total_pages: self.total_pages,
        }
    }

    /// Fallible [`map`](Page::map), e.g. for mapper conversions.
    pub fn try_map<U, E>(self, f: impl FnMut(T) -> Result<U, E>) -> Result<Page<U>, E> {
        Ok(Page {
            content: self.content.into_iter().map(f).collect::<Result<_, _>>()?,
            page: self.page,
            size: self.size,
            total_elements: self.total_elements,
            total_pages: self.total_pages,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_are_one_based() {
        assert_eq!(Pageable::new(1, 10).offset().unwrap(), 0);
        assert_eq!(Pageable::new(3, 10).offset().unwrap(), 20);
    }

    #[test]
    fn non_positive_values_are_rejected() {
        assert!(matches!(Pageable::new(0, 10).validate(), Err(DataError::InvalidArgument(_))));
        assert!(matches!(Pageable::new(1, -5).validate(), Err(DataError::InvalidArgument(_))));
    }

    #[test]
    fn page_metadata() {
        let page = Page::new(vec![21, 22, 23, 24, 25], &Pageable::new(3, 10), 25);
        assert_eq!(page.total_pages, 3);
        assert!(!page.has_next());
        assert!(page.has_previous());
        let doubled = page.map(|n| n * 2);
        assert_eq!(doubled.content[0], 42);
    }
}
