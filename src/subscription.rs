//! Cancellation handles.
//!
//! A `Subscription` owns the teardown actions of one `subscribe` call.
//! `unsubscribe` is idempotent and safe to race from multiple threads:
//! exactly one teardown execution occurs, and teardowns run outside the
//! handle's internal lock so they may themselves unsubscribe freely.

use std::{
  mem,
  sync::{Arc, Mutex},
};

use smallvec::SmallVec;

pub trait Subscription {
  /// Request teardown. Idempotent; never blocks beyond what the teardown
  /// actions themselves guarantee.
  fn unsubscribe(&mut self);

  fn is_closed(&self) -> bool;
}

/// Boxed teardown, the storage form inside composite subscriptions.
pub type BoxSubscription = Box<dyn Subscription + Send>;

impl<T: Subscription + ?Sized> Subscription for Box<T> {
  #[inline]
  fn unsubscribe(&mut self) { (**self).unsubscribe() }

  #[inline]
  fn is_closed(&self) -> bool { (**self).is_closed() }
}

/// An already-finished subscription; unsubscribing is a no-op.
impl Subscription for () {
  fn unsubscribe(&mut self) {}

  fn is_closed(&self) -> bool { true }
}

// ============================================================================
// SharedSubscription
// ============================================================================

/// Clonable composite subscription. All clones refer to the same teardown
/// set; the first `unsubscribe` from any clone drains it.
#[derive(Clone, Default, Debug)]
pub struct SharedSubscription(Arc<Mutex<Inner>>);

#[derive(Default)]
struct Inner {
  closed: bool,
  teardown: SmallVec<[BoxSubscription; 1]>,
}

impl std::fmt::Debug for Inner {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Inner")
      .field("closed", &self.closed)
      .field("teardown_count", &self.teardown.len())
      .finish()
  }
}

impl SharedSubscription {
  pub fn new() -> Self { Self::default() }

  /// Attach a nested teardown. If this handle is already closed the
  /// teardown runs immediately.
  pub fn add(&self, subscription: impl Subscription + Send + 'static) {
    let mut subscription = subscription;
    if subscription.is_closed() {
      return;
    }
    let run_now = {
      let mut inner = self.0.lock().unwrap();
      if inner.closed {
        true
      } else {
        inner.teardown.retain(|t| !t.is_closed());
        inner.teardown.push(Box::new(subscription));
        return;
      }
    };
    if run_now {
      subscription.unsubscribe();
    }
  }
}

impl Subscription for SharedSubscription {
  fn unsubscribe(&mut self) {
    let teardown = {
      let mut inner = self.0.lock().unwrap();
      if inner.closed {
        return;
      }
      inner.closed = true;
      mem::take(&mut inner.teardown)
    };
    for mut t in teardown {
      t.unsubscribe();
    }
  }

  fn is_closed(&self) -> bool { self.0.lock().unwrap().closed }
}

// ============================================================================
// FnSubscription
// ============================================================================

/// Single-teardown subscription wrapping a closure.
pub struct FnSubscription<F>(Option<F>);

impl<F: FnOnce()> FnSubscription<F> {
  pub fn new(teardown: F) -> Self { Self(Some(teardown)) }
}

impl<F: FnOnce()> Subscription for FnSubscription<F> {
  fn unsubscribe(&mut self) {
    if let Some(teardown) = self.0.take() {
      teardown();
    }
  }

  fn is_closed(&self) -> bool { self.0.is_none() }
}

// ============================================================================
// SerialSubscription
// ============================================================================

/// A slot holding at most one live inner subscription.
///
/// Re-subscribing operators (`retry`, `catch`, `on_error_resume_next`,
/// `subscribe_on`) publish each new upstream attempt here, so the handle
/// the caller holds always cancels the current attempt.
#[derive(Clone, Default, Debug)]
pub struct SerialSubscription(Arc<Mutex<SerialInner>>);

#[derive(Default)]
struct SerialInner {
  closed: bool,
  current: Option<BoxSubscription>,
}

impl std::fmt::Debug for SerialInner {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("SerialInner")
      .field("closed", &self.closed)
      .field("occupied", &self.current.is_some())
      .finish()
  }
}

impl SerialSubscription {
  pub fn new() -> Self { Self::default() }

  /// Install `subscription` as the current inner one, unsubscribing the
  /// previous occupant. An already-finished subscription is dropped
  /// without displacing a live one; if this slot is closed the new
  /// subscription is torn down immediately.
  pub fn swap(&self, subscription: impl Subscription + Send + 'static) {
    let subscription: BoxSubscription = Box::new(subscription);
    if subscription.is_closed() {
      return;
    }
    // Displaced handles are unsubscribed outside the lock.
    let displaced = {
      let mut inner = self.0.lock().unwrap();
      if inner.closed {
        Some(subscription)
      } else {
        inner.current.replace(subscription)
      }
    };
    if let Some(mut displaced) = displaced {
      displaced.unsubscribe();
    }
  }
}

impl Subscription for SerialSubscription {
  fn unsubscribe(&mut self) {
    let current = {
      let mut inner = self.0.lock().unwrap();
      if inner.closed {
        return;
      }
      inner.closed = true;
      inner.current.take()
    };
    if let Some(mut current) = current {
      current.unsubscribe();
    }
  }

  fn is_closed(&self) -> bool { self.0.lock().unwrap().closed }
}

// ============================================================================
// RAII helpers
// ============================================================================

/// Wrapper returned by the `subscribe*` convenience methods, providing
/// `unsubscribe_when_dropped()`.
pub struct SubscriptionWrapper<T: Subscription>(pub(crate) T);

impl<T: Subscription> SubscriptionWrapper<T> {
  /// Activates RAII behavior: `unsubscribe()` runs as soon as the returned
  /// guard goes out of scope.
  pub fn unsubscribe_when_dropped(self) -> SubscriptionGuard<T> { SubscriptionGuard(self.0) }

  /// Consumes this wrapper and returns the underlying subscription.
  pub fn into_inner(self) -> T { self.0 }
}

impl<T: Subscription> Subscription for SubscriptionWrapper<T> {
  #[inline]
  fn unsubscribe(&mut self) { self.0.unsubscribe() }

  #[inline]
  fn is_closed(&self) -> bool { self.0.is_closed() }
}

/// Unsubscribes when dropped. Wrap in its own scope to drop immediately.
#[must_use]
pub struct SubscriptionGuard<T: Subscription>(pub(crate) T);

impl<T: Subscription> SubscriptionGuard<T> {
  pub fn new(subscription: T) -> Self { SubscriptionGuard(subscription) }
}

impl<T: Subscription> Drop for SubscriptionGuard<T> {
  #[inline]
  fn drop(&mut self) { self.0.unsubscribe() }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicUsize, Ordering};

  use super::*;

  #[test]
  fn teardown_runs_exactly_once() {
    let count = Arc::new(AtomicUsize::new(0));
    let c = count.clone();
    let mut sub = SharedSubscription::new();
    sub.add(FnSubscription::new(move || {
      c.fetch_add(1, Ordering::SeqCst);
    }));
    sub.unsubscribe();
    sub.unsubscribe();
    sub.clone().unsubscribe();
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert!(sub.is_closed());
  }

  #[test]
  fn add_after_close_tears_down_immediately() {
    let count = Arc::new(AtomicUsize::new(0));
    let c = count.clone();
    let mut sub = SharedSubscription::new();
    sub.unsubscribe();
    sub.add(FnSubscription::new(move || {
      c.fetch_add(1, Ordering::SeqCst);
    }));
    assert_eq!(count.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn serial_swap_unsubscribes_previous() {
    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));
    let serial = SerialSubscription::new();
    let f = first.clone();
    serial.swap(FnSubscription::new(move || {
      f.fetch_add(1, Ordering::SeqCst);
    }));
    let s = second.clone();
    serial.swap(FnSubscription::new(move || {
      s.fetch_add(1, Ordering::SeqCst);
    }));
    assert_eq!(first.load(Ordering::SeqCst), 1);
    assert_eq!(second.load(Ordering::SeqCst), 0);
    serial.clone().unsubscribe();
    assert_eq!(second.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn serial_swap_ignores_finished_subscription() {
    let live = Arc::new(AtomicUsize::new(0));
    let serial = SerialSubscription::new();
    let l = live.clone();
    serial.swap(FnSubscription::new(move || {
      l.fetch_add(1, Ordering::SeqCst);
    }));
    // A finished subscription must not displace the live one.
    serial.swap(());
    assert_eq!(live.load(Ordering::SeqCst), 0);
    serial.clone().unsubscribe();
    assert_eq!(live.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn guard_unsubscribes_on_drop() {
    let count = Arc::new(AtomicUsize::new(0));
    let c = count.clone();
    {
      let sub = SharedSubscription::new();
      sub.add(FnSubscription::new(move || {
        c.fetch_add(1, Ordering::SeqCst);
      }));
      let _guard = SubscriptionWrapper(sub).unsubscribe_when_dropped();
    }
    assert_eq!(count.load(Ordering::SeqCst), 1);
  }
}
