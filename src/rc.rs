//! Shared-ownership cell used across the engine.
//!
//! `MutArc` is the one interior-mutability primitive every concurrently
//! mutated structure (subjects, share state, subscriptions) is built on.

use std::sync::{Arc, Mutex, MutexGuard};

pub trait RcDeref {
  type Target<'a>
  where
    Self: 'a;
  fn rc_deref(&self) -> Self::Target<'_>;
}

pub trait RcDerefMut {
  type Target<'a>
  where
    Self: 'a;
  fn rc_deref_mut(&self) -> Self::Target<'_>;
}

/// Thread-safe shared mutable cell (`Arc<Mutex<T>>`).
#[derive(Default, Debug)]
pub struct MutArc<T>(Arc<Mutex<T>>);

impl<T> MutArc<T> {
  pub fn own(t: T) -> Self { Self(Arc::new(Mutex::new(t))) }

  /// Pointer identity of the underlying allocation.
  pub fn ptr_eq(&self, other: &Self) -> bool { Arc::ptr_eq(&self.0, &other.0) }
}

impl<T> RcDeref for MutArc<T> {
  type Target<'a>
    = MutexGuard<'a, T>
  where
    Self: 'a;

  #[inline]
  fn rc_deref(&self) -> Self::Target<'_> { self.0.lock().unwrap() }
}

impl<T> RcDerefMut for MutArc<T> {
  type Target<'a>
    = MutexGuard<'a, T>
  where
    Self: 'a;

  #[inline]
  fn rc_deref_mut(&self) -> Self::Target<'_> { self.0.lock().unwrap() }
}

impl<T> Clone for MutArc<T> {
  #[inline]
  fn clone(&self) -> Self { Self(self.0.clone()) }
}

impl<T> From<T> for MutArc<T> {
  fn from(t: T) -> Self { Self::own(t) }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn shared_mutation_is_visible_through_clones() {
    let a = MutArc::own(1);
    let b = a.clone();
    *a.rc_deref_mut() = 2;
    assert_eq!(*b.rc_deref(), 2);
    assert!(a.ptr_eq(&b));
  }
}
