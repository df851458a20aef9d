use serde::{Deserialize, Serialize};

use crate::entities::bin::BinId;

/// Inclusive range of occupied bins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinSpan {
    pub lo: BinId,
    pub hi: BinId,
}

impl BinSpan {
    pub fn new(a: BinId, b: BinId) -> Self {
        Self {
            lo: a.min(b),
            hi: a.max(b),
        }
    }

    /// Smallest span covering every id, or `None` for an empty set.
    pub fn from_ids(ids: impl IntoIterator<Item = BinId>) -> Option<Self> {
        let mut iter = ids.into_iter();
        let first = iter.next()?;
        Some(iter.fold(Self::new(first, first), |span, id| Self {
            lo: span.lo.min(id),
            hi: span.hi.max(id),
        }))
    }

    pub fn contains(&self, bin_id: BinId) -> bool {
        self.lo <= bin_id && bin_id <= self.hi
    }

    /// How many bins `bin_id` sits outside the span; zero when inside.
    pub fn distance_to(&self, bin_id: BinId) -> u32 {
        if self.contains(bin_id) {
            return 0;
        }
        bin_id.abs_diff(self.lo).min(bin_id.abs_diff(self.hi))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_ids() {
        assert_eq!(BinSpan::from_ids([99, 98]), Some(BinSpan::new(98, 99)));
        assert_eq!(BinSpan::from_ids(Vec::<BinId>::new()), None);
    }

    #[test]
    fn test_distance_inside_is_zero() {
        let span = BinSpan::new(98, 102);
        for bin in 98..=102 {
            assert_eq!(span.distance_to(bin), 0);
        }
    }

    #[test]
    fn test_distance_outside_uses_nearest_edge() {
        let span = BinSpan::new(98, 99);
        assert_eq!(span.distance_to(101), 2);
        assert_eq!(span.distance_to(100), 1);
        assert_eq!(span.distance_to(95), 3);
    }
}
