//! Deduplicated table of floating point literals referenced by emitted code.
//!
//! The pool is a per-run context object: one is created (or reset) at the start of every
//! emission run and handed explicitly to the code generator. Entries are append-only and keep
//! insertion order, so a slot index never changes once assigned.

/// Two values closer than this share one pool slot.
pub const POOL_TOLERANCE: f64 = 1e-10;

/// Ordered, append-only set of unique `f64` literals.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConstantPool {
    values: Vec<f64>,
}

impl ConstantPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the slot holding `value`, inserting it if no entry lies within tolerance.
    ///
    /// The first value inserted for a slot is the one kept. NaN never matches an
    /// existing entry, so every NaN literal gets its own slot.
    pub fn intern(&mut self, value: f64) -> usize {
        match self.find(value) {
            Some(slot) => slot,
            None => {
                self.values.push(value);
                self.values.len() - 1
            }
        }
    }

    /// Looks up the slot of `value` without inserting.
    pub fn find(&self, value: f64) -> Option<usize> {
        self.values
            .iter()
            .position(|existing| (existing - value).abs() < POOL_TOLERANCE)
    }

    /// Value stored in `slot`.
    pub fn get(&self, slot: usize) -> Option<f64> {
        self.values.get(slot).copied()
    }

    /// Empties the pool for a new emission run.
    pub fn reset(&mut self) {
        self.values.clear();
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Values in slot order.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn into_values(self) -> Vec<f64> {
        self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_duplicates_share_a_slot() {
        let mut pool = ConstantPool::new();
        assert_eq!(pool.intern(2.0), 0);
        assert_eq!(pool.intern(3.5), 1);
        assert_eq!(pool.intern(2.0), 0);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_values_within_tolerance_share_a_slot() {
        let mut pool = ConstantPool::new();
        let slot = pool.intern(1.0);
        assert_eq!(pool.intern(1.0 + 1e-12), slot);
        assert_eq!(pool.intern(1.0 - 5e-11), slot);
        assert_eq!(pool.values(), &[1.0]);
    }

    #[test]
    fn test_values_beyond_tolerance_get_new_slots() {
        let mut pool = ConstantPool::new();
        pool.intern(1.0);
        assert_eq!(pool.intern(1.0 + 1e-9), 1);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_nan_is_never_shared() {
        let mut pool = ConstantPool::new();
        assert_eq!(pool.intern(f64::NAN), 0);
        assert_eq!(pool.intern(f64::NAN), 1);
    }

    #[test]
    fn test_reset() {
        let mut pool = ConstantPool::new();
        pool.intern(4.0);
        pool.reset();
        assert!(pool.is_empty());
        assert_eq!(pool.intern(7.0), 0);
        assert_eq!(pool.get(0), Some(7.0));
        assert_eq!(pool.find(4.0), None);
    }

    #[test]
    fn test_into_values_keeps_slot_order() {
        let mut pool = ConstantPool::new();
        for value in [3.0, 1.0, 3.0 + 1e-12, 2.0] {
            pool.intern(value);
        }
        assert_eq!(pool.into_values(), vec![3.0, 1.0, 2.0]);
    }
}
