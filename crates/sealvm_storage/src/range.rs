//! Key ranges and scan order.

use sealvm_core::BridgeError;
use serde::{Deserialize, Serialize};
use std::ops::Bound;

/// A key/value pair returned by a scan
pub type Record = (Vec<u8>, Vec<u8>);

/// Scan direction over the lexicographic byte order of keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Order {
    /// Smallest key first
    Ascending,
    /// Largest key first
    Descending,
}

impl Order {
    /// Wire code used by guest code
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Ascending => 1,
            Self::Descending => 2,
        }
    }
}

impl TryFrom<i32> for Order {
    type Error = BridgeError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(Self::Ascending),
            2 => Ok(Self::Descending),
            other => Err(BridgeError::bad_argument(format!(
                "unknown scan order {}",
                other
            ))),
        }
    }
}

/// Range of keys, inclusive start and exclusive end
///
/// Either side may be unbounded. Cursors narrow their range as they advance,
/// so a range may also carry an excluded start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    start: Bound<Vec<u8>>,
    end: Bound<Vec<u8>>,
}

impl KeyRange {
    /// Create a range; `None` and empty bounds both mean unbounded
    #[must_use]
    pub fn new(start: Option<Vec<u8>>, end: Option<Vec<u8>>) -> Self {
        Self {
            start: start
                .filter(|s| !s.is_empty())
                .map_or(Bound::Unbounded, Bound::Included),
            end: end
                .filter(|e| !e.is_empty())
                .map_or(Bound::Unbounded, Bound::Excluded),
        }
    }

    /// The range of all keys
    #[must_use]
    pub fn all() -> Self {
        Self {
            start: Bound::Unbounded,
            end: Bound::Unbounded,
        }
    }

    /// Borrow the bounds in a form accepted by `BTreeMap::range`
    #[must_use]
    pub fn as_bounds(&self) -> (Bound<&[u8]>, Bound<&[u8]>) {
        (
            self.start.as_ref().map(Vec::as_slice),
            self.end.as_ref().map(Vec::as_slice),
        )
    }

    /// Check whether `key` lies in the range
    #[must_use]
    pub fn contains(&self, key: &[u8]) -> bool {
        let after_start = match &self.start {
            Bound::Included(s) => key >= s.as_slice(),
            Bound::Excluded(s) => key > s.as_slice(),
            Bound::Unbounded => true,
        };
        let before_end = match &self.end {
            Bound::Included(e) => key <= e.as_slice(),
            Bound::Excluded(e) => key < e.as_slice(),
            Bound::Unbounded => true,
        };
        after_start && before_end
    }

    /// Check whether no key can lie in the range
    ///
    /// Must be checked before handing the bounds to `BTreeMap::range`,
    /// which panics on inverted bounds.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match (&self.start, &self.end) {
            (Bound::Included(s), Bound::Included(e)) => s > e,
            (Bound::Included(s), Bound::Excluded(e))
            | (Bound::Excluded(s), Bound::Included(e))
            | (Bound::Excluded(s), Bound::Excluded(e)) => s >= e,
            _ => false,
        }
    }

    /// Narrow the range past a key just returned in `order`
    pub fn advance_past(&mut self, key: &[u8], order: Order) {
        match order {
            Order::Ascending => self.start = Bound::Excluded(key.to_vec()),
            Order::Descending => self.end = Bound::Excluded(key.to_vec()),
        }
    }

    /// Total length of the bound keys
    #[must_use]
    pub fn bounds_len(&self) -> usize {
        let len = |b: &Bound<Vec<u8>>| match b {
            Bound::Included(k) | Bound::Excluded(k) => k.len(),
            Bound::Unbounded => 0,
        };
        len(&self.start) + len(&self.end)
    }
}

impl Default for KeyRange {
    fn default() -> Self {
        Self::all()
    }
}
