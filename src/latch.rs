//! Set-once field types
//!
//! `Latch<T>` holds a value that goes from unset to set at most once.
//! `StickyFlag` is the boolean version: once raised it stays raised.
//! Both setters are no-ops when the field is already set, so the business
//! rules can run on every write without checking state first.

use serde::{Deserialize, Serialize};

/// A value that can be written once and never replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Latch<T>(Option<T>);

impl<T> Latch<T> {
    /// An unset latch
    pub const fn unset() -> Self {
        Self(None)
    }

    /// Rebuild a latch from a stored value
    pub const fn from_stored(value: Option<T>) -> Self {
        Self(value)
    }

    /// Set the value if nothing is stored yet.
    ///
    /// Returns `true` if this call set it.
    pub fn set(&mut self, value: T) -> bool {
        if self.0.is_some() {
            return false;
        }
        self.0 = Some(value);
        true
    }

    /// Like [`Latch::set`], but only builds the value when it will be used.
    pub fn set_with(&mut self, make: impl FnOnce() -> T) -> bool {
        if self.0.is_some() {
            return false;
        }
        self.0 = Some(make());
        true
    }

    pub fn is_set(&self) -> bool {
        self.0.is_some()
    }

    pub fn get(&self) -> Option<&T> {
        self.0.as_ref()
    }
}

impl<T: Copy> Latch<T> {
    pub fn value(&self) -> Option<T> {
        self.0
    }
}

impl<T> Default for Latch<T> {
    fn default() -> Self {
        Self::unset()
    }
}

/// A boolean that can be raised but never lowered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StickyFlag(bool);

impl StickyFlag {
    pub const fn from_stored(raised: bool) -> Self {
        Self(raised)
    }

    /// Raise the flag. Returns `true` if it was down before this call.
    pub fn raise(&mut self) -> bool {
        let was_down = !self.0;
        self.0 = true;
        was_down
    }

    pub fn is_raised(&self) -> bool {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_latch_sets_once() {
        let mut latch = Latch::unset();
        assert!(!latch.is_set());
        assert!(latch.set(1));
        assert!(!latch.set(2));
        assert_eq!(latch.value(), Some(1));
    }

    #[test]
    fn test_latch_set_with_is_lazy() {
        let mut latch = Latch::from_stored(Some("first"));
        let mut called = false;
        let changed = latch.set_with(|| {
            called = true;
            "second"
        });
        assert!(!changed);
        assert!(!called);
        assert_eq!(latch.get(), Some(&"first"));
    }

    #[test]
    fn test_sticky_flag_never_lowers() {
        let mut flag = StickyFlag::default();
        assert!(!flag.is_raised());
        assert!(flag.raise());
        assert!(!flag.raise());
        assert!(flag.is_raised());
    }

    #[test]
    fn test_latch_serializes_as_plain_option() {
        let latch: Latch<i32> = Latch::from_stored(Some(7));
        assert_eq!(serde_json::to_string(&latch).unwrap(), "7");
        let empty: Latch<i32> = Latch::unset();
        assert_eq!(serde_json::to_string(&empty).unwrap(), "null");
    }

    proptest! {
        #[test]
        fn prop_latch_keeps_first_value(values in proptest::collection::vec(any::<i64>(), 1..20)) {
            let mut latch = Latch::unset();
            for v in &values {
                latch.set(*v);
            }
            prop_assert_eq!(latch.value(), Some(values[0]));
        }

        #[test]
        fn prop_sticky_flag_is_monotonic(raises in proptest::collection::vec(any::<bool>(), 0..30)) {
            let mut flag = StickyFlag::default();
            let mut seen_raise = false;
            for r in raises {
                if r {
                    flag.raise();
                    seen_raise = true;
                }
                prop_assert_eq!(flag.is_raised(), seen_raise);
            }
        }
    }
}
