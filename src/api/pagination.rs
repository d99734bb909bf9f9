use serde::Serialize;

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_PAGE_SIZE: i64 = 5;

/// Paging request as supplied by a caller. Nothing is rejected; out-of-range
/// values are replaced by defaults in [`Filters::normalize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Filters {
    pub page: i64,
    pub page_size: i64,
}

impl Default for Filters {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Filters {
    pub fn new(page: i64, page_size: i64) -> Self {
        Self { page, page_size }
    }

    /// Replace a page or page size below 1 with its default.
    pub fn normalize(self) -> Self {
        Self {
            page: if self.page < 1 { DEFAULT_PAGE } else { self.page },
            page_size: if self.page_size < 1 {
                DEFAULT_PAGE_SIZE
            } else {
                self.page_size
            },
        }
    }

    /// Row limit for the store query.
    pub fn limit(&self) -> i64 {
        self.page_size
    }

    /// Row offset for the store query, saturating at `i64::MAX`.
    ///
    /// A page far past the end is still a valid request that simply yields no rows.
    pub fn offset(&self) -> i64 {
        (self.page.max(1) - 1).saturating_mul(self.page_size.max(0))
    }
}

fn is_zero(n: &i64) -> bool {
    *n == 0
}

/// Paging envelope returned alongside a list of items.
///
/// The all-zero value means "no results" and serializes as `{}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Metadata {
    #[serde(skip_serializing_if = "is_zero")]
    pub current_page: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub page_size: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub first_page: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub last_page: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub total_records: i64,
}

impl Metadata {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Build the paging envelope for `total` rows viewed `size` at a time.
pub fn paginate(total: i64, page: i64, size: i64) -> Metadata {
    if total <= 0 {
        return Metadata::default();
    }
    let size = size.max(1);

    Metadata {
        current_page: page,
        page_size: size,
        first_page: 1,
        last_page: total / size + i64::from(total % size != 0),
        total_records: total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_normalize_replaces_invalid_values() {
        assert_eq!(Filters::new(0, 0).normalize(), Filters::default());
        assert_eq!(Filters::new(-3, 10).normalize(), Filters::new(1, 10));
        assert_eq!(Filters::new(4, -1).normalize(), Filters::new(4, 5));
        assert_eq!(Filters::new(2, 20).normalize(), Filters::new(2, 20));
    }

    #[test]
    fn test_limit_and_offset() {
        let f = Filters::new(3, 5);
        assert_eq!(f.limit(), 5);
        assert_eq!(f.offset(), 10);
        assert_eq!(Filters::default().offset(), 0);
    }

    #[test]
    fn test_offset_saturates() {
        assert_eq!(Filters::new(i64::MAX, i64::MAX).offset(), i64::MAX);
        assert_eq!(Filters::new(i64::MAX, 2).offset(), i64::MAX);
    }

    #[test]
    fn test_paginate_examples() {
        assert_eq!(
            paginate(7, 1, 5),
            Metadata {
                current_page: 1,
                page_size: 5,
                first_page: 1,
                last_page: 2,
                total_records: 7,
            }
        );
        assert_eq!(paginate(10, 2, 5).last_page, 2);
        assert_eq!(paginate(1, 1, 5).last_page, 1);
        assert_eq!(paginate(1, 1, i64::MAX).last_page, 1);
    }

    #[test]
    fn test_zero_total_is_empty_metadata() {
        let meta = paginate(0, 3, 5);
        assert!(meta.is_empty());
        assert_eq!(serde_json::to_string(&meta).unwrap(), "{}");
    }

    #[test]
    fn test_metadata_json_field_names() {
        let json = serde_json::to_value(paginate(7, 1, 5)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "current_page": 1,
                "page_size": 5,
                "first_page": 1,
                "last_page": 2,
                "total_records": 7
            })
        );
    }

    proptest! {
        #[test]
        fn prop_invalid_filters_normalize_to_defaults(page in i64::MIN..1, size in i64::MIN..1) {
            prop_assert_eq!(Filters::new(page, size).normalize(), Filters::default());
        }

        #[test]
        fn prop_normalized_filters_are_positive(page in any::<i64>(), size in any::<i64>()) {
            let f = Filters::new(page, size).normalize();
            prop_assert!(f.page >= 1);
            prop_assert!(f.page_size >= 1);
            prop_assert!(f.offset() >= 0);
        }

        #[test]
        fn prop_zero_total_is_always_empty(page in any::<i64>(), size in any::<i64>()) {
            prop_assert!(paginate(0, page, size).is_empty());
        }

        #[test]
        fn prop_last_page_is_ceiling(total in 1i64..1_000_000, size in 1i64..10_000) {
            let meta = paginate(total, 1, size);
            let expected = (total as f64 / size as f64).ceil() as i64;
            prop_assert_eq!(meta.last_page, expected);
            prop_assert!((meta.last_page - 1) * size < total);
            prop_assert!(meta.last_page * size >= total);
        }
    }
}
