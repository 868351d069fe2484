//! The big-integer arena.
//!
//! Guests never see an arbitrary-precision value directly; they hold small
//! integer handles into this arena and manipulate values through the
//! handle-taking environment functions. Handles are allocated densely and
//! monotonically, so frame rollback is a truncation: popping a frame
//! invalidates every handle allocated inside it.

use num_bigint::{BigInt, BigUint, Sign};

use cinder_primitives::{VMError, VMResult};

/// Frame-scoped arena mapping handles to big integers.
#[derive(Debug, Default)]
pub struct BigIntContext {
    values: Vec<BigInt>,
    stack: Vec<usize>,
}

impl BigIntContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every value and frame; called once per request.
    pub fn init_state(&mut self) {
        self.values.clear();
        self.stack.clear();
    }

    /// Allocate a handle for `value`.
    pub fn insert(&mut self, value: BigInt) -> i32 {
        self.values.push(value);
        (self.values.len() - 1) as i32
    }

    /// Allocate a handle holding an unsigned value.
    pub fn insert_unsigned(&mut self, value: BigUint) -> i32 {
        self.insert(BigInt::from_biguint(Sign::Plus, value))
    }

    /// Resolve a handle.
    pub fn get(&self, handle: i32) -> VMResult<&BigInt> {
        usize::try_from(handle)
            .ok()
            .and_then(|i| self.values.get(i))
            .ok_or_else(|| invalid_handle(handle))
    }

    /// Replace the value behind a handle.
    pub fn set(&mut self, handle: i32, value: BigInt) -> VMResult<()> {
        let slot = usize::try_from(handle)
            .ok()
            .and_then(|i| self.values.get_mut(i))
            .ok_or_else(|| invalid_handle(handle))?;
        *slot = value;
        Ok(())
    }

    /// The unsigned magnitude behind a handle; negative values read as
    /// their absolute magnitude, matching the byte-oriented accessors.
    pub fn get_unsigned(&self, handle: i32) -> VMResult<BigUint> {
        Ok(self.get(handle)?.magnitude().clone())
    }

    /// Open a new frame. Handles allocated from here on die with it.
    pub fn push_state(&mut self) {
        self.stack.push(self.values.len());
    }

    /// Close a frame, invalidating its handles. Commit and discard agree
    /// here: handles never outlive their frame either way.
    pub fn pop_state(&mut self) {
        if let Some(len) = self.stack.pop() {
            self.values.truncate(len);
        }
    }

    pub fn clear_state_stack(&mut self) {
        self.stack.clear();
    }

    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    /// Number of live handles, for diagnostics.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn invalid_handle(handle: i32) -> VMError {
    VMError::UserError(format!("invalid big int handle {}", handle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let mut ctx = BigIntContext::new();
        let h = ctx.insert(BigInt::from(42));
        assert_eq!(ctx.get(h).unwrap(), &BigInt::from(42));
    }

    #[test]
    fn test_handles_are_dense_and_monotonic() {
        let mut ctx = BigIntContext::new();
        assert_eq!(ctx.insert(BigInt::from(1)), 0);
        assert_eq!(ctx.insert(BigInt::from(2)), 1);
        assert_eq!(ctx.insert(BigInt::from(3)), 2);
    }

    #[test]
    fn test_invalid_handle_is_user_error() {
        let ctx = BigIntContext::new();
        let err = ctx.get(0).unwrap_err();
        assert!(matches!(err, VMError::UserError(_)));
        assert!(ctx.get(-1).is_err());
    }

    #[test]
    fn test_set_replaces_value() {
        let mut ctx = BigIntContext::new();
        let h = ctx.insert(BigInt::from(1));
        ctx.set(h, BigInt::from(99)).unwrap();
        assert_eq!(ctx.get(h).unwrap(), &BigInt::from(99));
        assert!(ctx.set(7, BigInt::from(0)).is_err());
    }

    #[test]
    fn test_pop_invalidates_frame_handles() {
        let mut ctx = BigIntContext::new();
        let outer = ctx.insert(BigInt::from(10));

        ctx.push_state();
        let inner = ctx.insert(BigInt::from(20));
        assert!(ctx.get(inner).is_ok());
        ctx.pop_state();

        assert!(ctx.get(outer).is_ok());
        assert!(ctx.get(inner).is_err());
        assert_eq!(ctx.stack_depth(), 0);
    }

    #[test]
    fn test_unsigned_magnitude() {
        let mut ctx = BigIntContext::new();
        let h = ctx.insert(BigInt::from(-1000));
        assert_eq!(ctx.get_unsigned(h).unwrap(), BigUint::from(1000u32));
    }

    #[test]
    fn test_init_state_clears_everything() {
        let mut ctx = BigIntContext::new();
        ctx.insert(BigInt::from(1));
        ctx.push_state();
        ctx.init_state();
        assert!(ctx.is_empty());
        assert_eq!(ctx.stack_depth(), 0);
        // Handle allocation restarts from zero.
        assert_eq!(ctx.insert(BigInt::from(5)), 0);
    }
}
