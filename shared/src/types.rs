//! Common types used across the ledger

use serde::{Deserialize, Serialize};

/// Cursor-style page of results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    /// Pass back as `after` to continue; `None` once the sequence is exhausted
    pub next_cursor: Option<i64>,
}

/// Page size bounds for ledger history
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PageLimit(u32);

impl PageLimit {
    pub const DEFAULT: u32 = 100;
    pub const MAX: u32 = 1000;

    pub fn new(requested: Option<u32>) -> Self {
        let limit = requested.unwrap_or(Self::DEFAULT).clamp(1, Self::MAX);
        Self(limit)
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_limit_bounds() {
        assert_eq!(PageLimit::new(None).get(), 100);
        assert_eq!(PageLimit::new(Some(0)).get(), 1);
        assert_eq!(PageLimit::new(Some(50_000)).get(), 1000);
        assert_eq!(PageLimit::new(Some(25)).get(), 25);
    }
}
