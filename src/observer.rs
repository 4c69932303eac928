//! Observer side of the push protocol.
//!
//! An `Observer` receives values, at most one terminal event, and nothing
//! after that. The terminal methods consume the observer, so "notification
//! after terminal" is unrepresentable for a directly-owned observer; shared
//! observers (`MutArc<Option<O>>`, `SafeObserver`) enforce the same
//! invariant at runtime by taking the inner observer out on terminal.

use std::convert::Infallible;

use crate::rc::{MutArc, RcDeref, RcDerefMut};

/// The consumer endpoint of an observable sequence.
pub trait Observer<Item, Err> {
  /// Receive the next value.
  fn next(&mut self, value: Item);

  /// Receive the terminal error. Consumes the observer; no further
  /// notification of any kind may follow.
  fn error(self, err: Err);

  /// Receive the completion notification. Consumes the observer.
  fn complete(self);

  /// `true` once the observer will not accept further values. Producers
  /// poll this at safe points to stop early (cooperative cancellation).
  fn is_closed(&self) -> bool;
}

/// Object-safe emission facade handed to `create` closures.
///
/// Unlike `Observer`, terminal methods take `&mut self`, so the producer
/// closure can keep emitting-looking code after a terminal call; the bridge
/// behind the facade drops everything after the first terminal.
pub trait Emitter<Item, Err> {
  fn next(&mut self, value: Item);
  fn error(&mut self, err: Err);
  fn complete(&mut self);

  /// `true` once emission is pointless (downstream detached or terminated).
  fn is_closed(&self) -> bool;

  /// Attach a resource release to the subscription owning this emission.
  /// Runs on unsubscribe or terminal, whichever comes first.
  fn add_teardown(&mut self, teardown: Box<dyn FnOnce() + Send>);
}

/// Object-safe mirror of `Observer`, enabling `Box<dyn DynObserver>`
/// storage (subjects keep their subscriber set this way).
pub trait DynObserver<Item, Err> {
  fn dyn_next(&mut self, value: Item);
  fn dyn_error(self: Box<Self>, err: Err);
  fn dyn_complete(self: Box<Self>);
  fn dyn_is_closed(&self) -> bool;
}

impl<T, Item, Err> DynObserver<Item, Err> for T
where
  T: Observer<Item, Err>,
{
  fn dyn_next(&mut self, value: Item) { self.next(value); }
  fn dyn_error(self: Box<Self>, err: Err) { (*self).error(err); }
  fn dyn_complete(self: Box<Self>) { (*self).complete(); }
  fn dyn_is_closed(&self) -> bool { self.is_closed() }
}

/// Boxed observer with `Send`, the storage form inside subjects.
pub type BoxObserver<Item, Err> = Box<dyn DynObserver<Item, Err> + Send>;

impl<Item, Err> Observer<Item, Err> for BoxObserver<Item, Err> {
  #[inline]
  fn next(&mut self, value: Item) { (**self).dyn_next(value) }

  #[inline]
  fn error(self, err: Err) { self.dyn_error(err) }

  #[inline]
  fn complete(self) { self.dyn_complete() }

  #[inline]
  fn is_closed(&self) -> bool { (**self).dyn_is_closed() }
}

/// Closure adapter for value-only subscriptions.
///
/// Implements `Observer<Item, Infallible>` only: a subscription that
/// ignores errors is accepted solely for streams that cannot produce one.
/// Observers that wish to ignore a real error type must say so explicitly
/// through [`ObserverAll`].
#[derive(Clone)]
pub struct FnMutObserver<F>(pub F);

impl<F, Item> Observer<Item, Infallible> for FnMutObserver<F>
where
  F: FnMut(Item),
{
  #[inline]
  fn next(&mut self, value: Item) { (self.0)(value); }

  fn error(self, _err: Infallible) {}

  fn complete(self) {}

  fn is_closed(&self) -> bool { false }
}

/// Three-callback observer built by `subscribe_all`.
#[derive(Clone)]
pub struct ObserverAll<N, E, C> {
  pub next: N,
  pub error: E,
  pub complete: C,
}

impl<Item, Err, N, E, C> Observer<Item, Err> for ObserverAll<N, E, C>
where
  N: FnMut(Item),
  E: FnOnce(Err),
  C: FnOnce(),
{
  #[inline]
  fn next(&mut self, value: Item) { (self.next)(value); }

  fn error(self, err: Err) { (self.error)(err); }

  fn complete(self) { (self.complete)(); }

  fn is_closed(&self) -> bool { false }
}

/// `None` ignores everything; `Some` delegates. The building block for
/// take-on-terminal shared observers.
impl<O, Item, Err> Observer<Item, Err> for Option<O>
where
  O: Observer<Item, Err>,
{
  fn next(&mut self, value: Item) {
    if let Some(inner) = self {
      inner.next(value);
    }
  }

  fn error(self, err: Err) {
    if let Some(inner) = self {
      inner.error(err);
    }
  }

  fn complete(self) {
    if let Some(inner) = self {
      inner.complete();
    }
  }

  fn is_closed(&self) -> bool {
    match self {
      Some(inner) => inner.is_closed(),
      None => true,
    }
  }
}

/// Shared-ownership observer: clones feed the same inner observer, the
/// first terminal takes it out so later clones observe a closed endpoint.
impl<O, Item, Err> Observer<Item, Err> for MutArc<Option<O>>
where
  O: Observer<Item, Err>,
{
  fn next(&mut self, value: Item) { self.rc_deref_mut().next(value); }

  fn error(self, err: Err) {
    if let Some(inner) = self.rc_deref_mut().take() {
      inner.error(err);
    }
  }

  fn complete(self) {
    if let Some(inner) = self.rc_deref_mut().take() {
      inner.complete();
    }
  }

  fn is_closed(&self) -> bool { self.rc_deref().is_closed() }
}

#[cfg(test)]
mod tests {
  use super::*;

  struct Collect(Vec<i32>);

  impl Observer<i32, ()> for Collect {
    fn next(&mut self, value: i32) { self.0.push(value); }
    fn error(self, _: ()) {}
    fn complete(self) {}
    fn is_closed(&self) -> bool { false }
  }

  #[test]
  fn closure_observer_collects_values() {
    let mut sum = 0;
    {
      let mut obs = FnMutObserver(|v: i32| sum += v);
      obs.next(10);
      obs.next(20);
    }
    assert_eq!(sum, 30);
  }

  #[test]
  fn shared_observer_closes_on_terminal() {
    let shared = MutArc::own(Some(Collect(vec![])));
    let mut feeder = shared.clone();
    feeder.next(1);
    assert!(!shared.is_closed());
    shared.clone().complete();
    assert!(shared.is_closed());
    // Values after the terminal are silently dropped by the `Option` layer.
    feeder.next(2);
  }

  #[test]
  fn boxed_observer_round_trip() {
    let mut boxed: BoxObserver<i32, ()> = Box::new(Collect(vec![]));
    boxed.next(1);
    assert!(!boxed.is_closed());
    boxed.complete();
  }
}
