use serde::{Deserialize, Serialize};

use gatekeep_core::{DomainError, DomainResult};

/// Offset pagination for list operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Page {
    pub const DEFAULT_LIMIT: i64 = 10;
    pub const MAX_LIMIT: i64 = 100;

    /// Build a page from optional caller input.
    ///
    /// Missing or zero `limit` falls back to the default; oversized limits
    /// are clamped. Negative values are rejected.
    pub fn new(limit: Option<i64>, offset: Option<i64>) -> DomainResult<Self> {
        let limit = match limit {
            None | Some(0) => Self::DEFAULT_LIMIT,
            Some(l) if l < 0 => return Err(DomainError::validation("limit cannot be negative")),
            Some(l) => l.min(Self::MAX_LIMIT),
        };
        let offset = match offset {
            None => 0,
            Some(o) if o < 0 => return Err(DomainError::validation("offset cannot be negative")),
            Some(o) => o,
        };
        Ok(Self { limit, offset })
    }

    /// Index range of this page within a full, ordered listing.
    pub fn window(&self, len: usize) -> core::ops::Range<usize> {
        let start = usize::try_from(self.offset).unwrap_or(usize::MAX).min(len);
        let end = start
            .saturating_add(usize::try_from(self.limit).unwrap_or(0))
            .min(len);
        start..end
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: Self::DEFAULT_LIMIT,
            offset: 0,
        }
    }
}
