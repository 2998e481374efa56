//! The capability set an adapter reports via `supported_operations()`.
//!
//! Modeled as a hand-rolled bitset rather than a `bitflags` dependency:
//! an operation an adapter simply never implements beyond the default
//! that returns `CloudError::not_supported` is absent from this set.

/// One bit per operation a provider can support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupportedOps(u16);

impl SupportedOps {
    pub const EXCHANGE_CODE: Self = Self(1 << 0);
    pub const REFRESH_TOKEN: Self = Self(1 << 1);
    pub const GET_ITEM_DATA: Self = Self(1 << 2);
    pub const LIST_DIRECTORY: Self = Self(1 << 3);
    pub const GET_ITEM_URL: Self = Self(1 << 4);
    pub const DOWNLOAD_FILE: Self = Self(1 << 5);
    pub const UPLOAD_FILE: Self = Self(1 << 6);
    pub const DELETE_ITEM: Self = Self(1 << 7);
    pub const CREATE_DIRECTORY: Self = Self(1 << 8);
    pub const MOVE_ITEM: Self = Self(1 << 9);
    pub const RENAME_ITEM: Self = Self(1 << 10);
    pub const GET_THUMBNAIL: Self = Self(1 << 11);
    pub const GENERAL_DATA: Self = Self(1 << 12);

    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl std::ops::BitOr for SupportedOps {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl std::ops::BitOrAssign for SupportedOps {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = self.union(rhs);
    }
}

impl Default for SupportedOps {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_and_contains() {
        let ops = SupportedOps::LIST_DIRECTORY | SupportedOps::GET_ITEM_DATA;
        assert!(ops.contains(SupportedOps::LIST_DIRECTORY));
        assert!(ops.contains(SupportedOps::GET_ITEM_DATA));
        assert!(!ops.contains(SupportedOps::UPLOAD_FILE));
    }

    #[test]
    fn empty_contains_nothing() {
        assert!(!SupportedOps::empty().contains(SupportedOps::EXCHANGE_CODE));
    }
}
