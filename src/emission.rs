//! Emission serialization: the Safe/Unsafe observer dichotomy.
//!
//! Producers that are single-threaded by construction wrap their observer
//! in [`UnsafeObserver`] and pay nothing. Genuinely concurrent producers
//! (fan-in from several threads, a subject fed from anywhere) wrap it in
//! [`SafeObserver`], which serializes racing `next`/`error`/`complete`
//! calls into a total order: each call is atomic with respect to the
//! others, though no particular cross-thread order is promised.
//!
//! Both wrappers expose the same strategy surface through [`Deliver`], so
//! engine plumbing (the scheduler-boundary consumer, notably) is agnostic
//! to which one is installed.

use std::mem;

use crate::{
  observer::Observer,
  rc::{MutArc, RcDeref, RcDerefMut},
};

/// The three-case message type of the protocol. After an `Err` or
/// `Complete` is delivered to an observer, nothing further may follow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification<Item, Err> {
  Next(Item),
  Err(Err),
  Complete,
}

impl<Item, Err> Notification<Item, Err> {
  /// `true` for `Err` and `Complete`.
  pub fn is_terminal(&self) -> bool { !matches!(self, Notification::Next(_)) }
}

/// Strategy surface shared by both emission wrappers.
pub trait Deliver<Item, Err> {
  fn deliver(&mut self, notification: Notification<Item, Err>);
}

fn contract_violation(what: &str) {
  tracing::warn!(target: "rxflow", "observer contract violation: {}", what);
  debug_assert!(false, "observer contract violation: {what}");
}

// ============================================================================
// SafeObserver
// ============================================================================

enum SafeState<O> {
  Active(O),
  /// Detached by unsubscribe; emissions are silently dropped.
  Stopped,
  /// A terminal notification went through.
  Terminated,
}

/// Mutual-exclusion wrapper serializing concurrent producers.
///
/// Clonable; all clones funnel into the same inner observer. The first
/// terminal takes the observer out, so a racing producer that loses the
/// terminal race has its values dropped rather than delivered after the
/// fact. A *second* terminal is a contract violation and fails loudly in
/// development builds.
pub struct SafeObserver<O> {
  state: MutArc<SafeState<O>>,
}

impl<O> Clone for SafeObserver<O> {
  fn clone(&self) -> Self { Self { state: self.state.clone() } }
}

impl<O> SafeObserver<O> {
  pub fn new(observer: O) -> Self { Self { state: MutArc::own(SafeState::Active(observer)) } }

  /// Detach without a terminal notification. Emissions arriving after
  /// this call are dropped; used by subscription teardown.
  pub fn stop(&self) {
    let mut state = self.state.rc_deref_mut();
    if matches!(*state, SafeState::Active(_)) {
      *state = SafeState::Stopped;
    }
  }

  fn take_for_terminal(&self) -> Option<O> {
    let mut state = self.state.rc_deref_mut();
    match mem::replace(&mut *state, SafeState::Terminated) {
      SafeState::Active(observer) => Some(observer),
      SafeState::Stopped => {
        // Detached before the terminal arrived; stay detached.
        *state = SafeState::Stopped;
        None
      }
      SafeState::Terminated => {
        drop(state);
        contract_violation("terminal notification delivered twice");
        None
      }
    }
  }
}

impl<Item, Err, O> Observer<Item, Err> for SafeObserver<O>
where
  O: Observer<Item, Err>,
{
  fn next(&mut self, value: Item) {
    // Delivering under the lock is the point: it serializes racing calls.
    let mut state = self.state.rc_deref_mut();
    if let SafeState::Active(observer) = &mut *state {
      observer.next(value);
    }
  }

  fn error(self, err: Err) {
    if let Some(observer) = self.take_for_terminal() {
      observer.error(err);
    }
  }

  fn complete(self) {
    if let Some(observer) = self.take_for_terminal() {
      observer.complete();
    }
  }

  fn is_closed(&self) -> bool {
    match &*self.state.rc_deref() {
      SafeState::Active(observer) => observer.is_closed(),
      _ => true,
    }
  }
}

impl<Item, Err, O> Deliver<Item, Err> for SafeObserver<O>
where
  O: Observer<Item, Err>,
{
  fn deliver(&mut self, notification: Notification<Item, Err>) {
    match notification {
      Notification::Next(value) => self.next(value),
      Notification::Err(err) => {
        if let Some(observer) = self.take_for_terminal() {
          observer.error(err);
        }
      }
      Notification::Complete => {
        if let Some(observer) = self.take_for_terminal() {
          observer.complete();
        }
      }
    }
  }
}

// ============================================================================
// UnsafeObserver
// ============================================================================

/// Zero-overhead pass-through for single-threaded producers.
///
/// The producer guarantees at most one thread calls in at any instant; in
/// exchange there is no lock on the emission path. A notification after
/// the terminal is a contract violation here, not a race, and fails
/// loudly in development builds.
pub struct UnsafeObserver<O>(Option<O>);

impl<O> UnsafeObserver<O> {
  pub fn new(observer: O) -> Self { Self(Some(observer)) }
}

impl<Item, Err, O> Observer<Item, Err> for UnsafeObserver<O>
where
  O: Observer<Item, Err>,
{
  #[inline]
  fn next(&mut self, value: Item) {
    match &mut self.0 {
      Some(observer) => observer.next(value),
      None => contract_violation("next after terminal on an unsafe observer"),
    }
  }

  fn error(mut self, err: Err) {
    match self.0.take() {
      Some(observer) => observer.error(err),
      None => contract_violation("error after terminal on an unsafe observer"),
    }
  }

  fn complete(mut self) {
    match self.0.take() {
      Some(observer) => observer.complete(),
      None => contract_violation("complete after terminal on an unsafe observer"),
    }
  }

  #[inline]
  fn is_closed(&self) -> bool { self.0.is_closed() }
}

impl<Item, Err, O> Deliver<Item, Err> for UnsafeObserver<O>
where
  O: Observer<Item, Err>,
{
  fn deliver(&mut self, notification: Notification<Item, Err>) {
    match notification {
      Notification::Next(value) => self.next(value),
      Notification::Err(err) => {
        if let Some(observer) = self.0.take() {
          observer.error(err);
        }
      }
      Notification::Complete => {
        if let Some(observer) = self.0.take() {
          observer.complete();
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use std::{
    sync::{Arc, Mutex},
    thread,
  };

  use super::*;

  #[derive(Clone)]
  struct Record {
    values: Arc<Mutex<Vec<i32>>>,
    terminals: Arc<Mutex<usize>>,
  }

  impl Record {
    fn new() -> Self {
      Self { values: Arc::new(Mutex::new(vec![])), terminals: Arc::new(Mutex::new(0)) }
    }
  }

  impl Observer<i32, &'static str> for Record {
    fn next(&mut self, value: i32) { self.values.lock().unwrap().push(value); }
    fn error(self, _: &'static str) { *self.terminals.lock().unwrap() += 1; }
    fn complete(self) { *self.terminals.lock().unwrap() += 1; }
    fn is_closed(&self) -> bool { false }
  }

  #[test]
  fn safe_observer_serializes_concurrent_producers() {
    let record = Record::new();
    let safe = SafeObserver::new(record.clone());

    let handles: Vec<_> = (0..4)
      .map(|t| {
        let mut safe = safe.clone();
        thread::spawn(move || {
          for i in 0..250 {
            safe.next(t * 1000 + i);
          }
        })
      })
      .collect();
    for h in handles {
      h.join().unwrap();
    }
    safe.complete();

    let mut got = record.values.lock().unwrap().clone();
    assert_eq!(got.len(), 1000);
    got.sort_unstable();
    got.dedup();
    assert_eq!(got.len(), 1000, "no value lost or duplicated");
    assert_eq!(*record.terminals.lock().unwrap(), 1);
  }

  #[test]
  fn safe_observer_drops_values_after_stop() {
    let record = Record::new();
    let mut safe = SafeObserver::new(record.clone());
    safe.next(1);
    safe.stop();
    safe.next(2);
    assert_eq!(*record.values.lock().unwrap(), vec![1]);
    assert!(safe.is_closed());
  }

  #[test]
  fn value_racing_a_terminal_is_dropped_not_delivered() {
    let record = Record::new();
    let safe = SafeObserver::new(record.clone());
    safe.clone().error("boom");
    // A producer thread losing the terminal race does not corrupt state.
    safe.clone().next(7);
    assert!(record.values.lock().unwrap().is_empty());
    assert_eq!(*record.terminals.lock().unwrap(), 1);
  }

  #[test]
  fn unsafe_observer_is_a_pass_through() {
    let record = Record::new();
    let mut unsafe_obs = UnsafeObserver::new(record.clone());
    unsafe_obs.next(3);
    unsafe_obs.complete();
    assert_eq!(*record.values.lock().unwrap(), vec![3]);
    assert_eq!(*record.terminals.lock().unwrap(), 1);
  }
}
