use crate::{
  context::Ctx,
  observable::{Observable, ObservableExt},
  observer::{Emitter, Observer},
  subscription::{FnSubscription, SharedSubscription, Subscription},
};

/// Build an observable from a producer closure.
///
/// The closure runs once per subscription, synchronously inside
/// `actual_subscribe`, and receives an [`Emitter`] to push through. The
/// emitter enforces the protocol at the boundary: everything after the
/// first terminal call is dropped, and teardowns registered through
/// [`Emitter::add_teardown`] run on terminal or unsubscribe, whichever
/// comes first.
///
/// ```
/// use rxflow::prelude::*;
///
/// let mut collected = vec![];
/// create(|emitter: &mut dyn Emitter<i32, ()>| {
///   emitter.next(1);
///   emitter.next(2);
///   emitter.complete();
/// })
/// .subscribe_all(|v| collected.push(v), |_| {}, || {});
/// ```
pub fn create<F, Item, Err>(producer: F) -> ObservableCreate<F>
where
  F: FnOnce(&mut dyn Emitter<Item, Err>),
{
  ObservableCreate { producer }
}

#[derive(Clone)]
pub struct ObservableCreate<F> {
  producer: F,
}

impl<F, Item, Err> ObservableExt<Item, Err> for ObservableCreate<F> where
  F: FnOnce(&mut dyn Emitter<Item, Err>)
{
}

impl<F, Item, Err, O> Observable<Item, Err, O> for ObservableCreate<F>
where
  F: FnOnce(&mut dyn Emitter<Item, Err>),
  O: Observer<Item, Err>,
{
  type Unsub = SharedSubscription;

  fn actual_subscribe(self, ctx: Ctx, observer: O) -> Self::Unsub {
    let subscription = SharedSubscription::new();
    let mut bridge =
      EmitterBridge { observer: Some(observer), subscription: subscription.clone(), ctx };
    (self.producer)(&mut bridge);
    subscription
  }
}

/// Protocol-enforcing adapter between a producer closure and the real
/// observer.
struct EmitterBridge<O> {
  observer: Option<O>,
  subscription: SharedSubscription,
  ctx: Ctx,
}

impl<O> EmitterBridge<O> {
  /// Take the observer out for a terminal delivery and release resources.
  fn finish(&mut self) -> Option<O> {
    let observer = self.observer.take();
    if observer.is_some() {
      self.subscription.clone().unsubscribe();
    }
    observer
  }
}

impl<Item, Err, O> Emitter<Item, Err> for EmitterBridge<O>
where
  O: Observer<Item, Err>,
{
  fn next(&mut self, value: Item) {
    if self.subscription.is_closed() {
      return;
    }
    if let Some(observer) = &mut self.observer {
      observer.next(value);
    }
  }

  fn error(&mut self, err: Err) {
    if let Some(observer) = self.finish() {
      observer.error(err);
    }
  }

  fn complete(&mut self) {
    if let Some(observer) = self.finish() {
      observer.complete();
    }
  }

  fn is_closed(&self) -> bool {
    self.subscription.is_closed()
      || self.ctx.is_done()
      || match &self.observer {
        Some(observer) => observer.is_closed(),
        None => true,
      }
  }

  fn add_teardown(&mut self, teardown: Box<dyn FnOnce() + Send>) {
    if self.observer.is_none() {
      // Already terminated; release immediately.
      teardown();
      return;
    }
    self.subscription.add(FnSubscription::new(teardown));
  }
}
