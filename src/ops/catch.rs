use std::marker::PhantomData;

use crate::{
  context::Ctx,
  observable::{Observable, ObservableExt},
  observer::Observer,
  subscription::{SerialSubscription, Subscription},
};

/// See [`ObservableExt::catch`].
pub struct CatchOp<S, F, Item, Err> {
  pub(crate) source: S,
  pub(crate) handler: F,
  pub(crate) _hint: PhantomData<fn() -> (Item, Err)>,
}

impl<S: Clone, F: Clone, Item, Err> Clone for CatchOp<S, F, Item, Err> {
  fn clone(&self) -> Self {
    Self { source: self.source.clone(), handler: self.handler.clone(), _hint: PhantomData }
  }
}

impl<S, F, Item, Err> ObservableExt<Item, Err> for CatchOp<S, F, Item, Err> where
  S: ObservableExt<Item, Err>
{
}

impl<S, F, U, Item, Err, O> Observable<Item, Err, O> for CatchOp<S, F, Item, Err>
where
  S: Observable<Item, Err, CatchObserver<F, O>>,
  S::Unsub: Send + 'static,
  F: FnOnce(Err) -> U,
  U: Observable<Item, Err, O>,
  U::Unsub: Send + 'static,
  O: Observer<Item, Err>,
{
  type Unsub = SerialSubscription;

  fn actual_subscribe(self, ctx: Ctx, observer: O) -> Self::Unsub {
    let serial = SerialSubscription::new();
    let catch_observer =
      CatchObserver { handler: self.handler, observer, serial: serial.clone(), ctx: ctx.clone() };
    let unsub = self.source.actual_subscribe(ctx, catch_observer);
    serial.swap(unsub);
    serial
  }
}

/// Swaps in the handler's observable when the source errors. The fallback
/// is subscribed with the raw downstream observer, so its own error
/// passes through unhandled.
pub struct CatchObserver<F, O> {
  handler: F,
  observer: O,
  serial: SerialSubscription,
  ctx: Ctx,
}

impl<F, U, Item, Err, O> Observer<Item, Err> for CatchObserver<F, O>
where
  F: FnOnce(Err) -> U,
  U: Observable<Item, Err, O>,
  U::Unsub: Send + 'static,
  O: Observer<Item, Err>,
{
  fn next(&mut self, value: Item) { self.observer.next(value); }

  fn error(self, err: Err) {
    let CatchObserver { handler, observer, serial, ctx } = self;
    if serial.is_closed() {
      return;
    }
    let fallback = handler(err);
    let unsub = fallback.actual_subscribe(ctx, observer);
    serial.swap(unsub);
  }

  fn complete(self) { self.observer.complete(); }

  fn is_closed(&self) -> bool { self.serial.is_closed() || self.observer.is_closed() }
}
