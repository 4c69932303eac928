//! Operators that derive, reset or observe the cancellation context.
//!
//! Contexts flow from the subscription call toward the source, so a
//! deriving operator affects everything upstream of it in the chain.
//! `throw_on_context_cancel` therefore belongs between the source and the
//! operator that derives the context it should enforce.

use std::{
  any::Any,
  marker::PhantomData,
  sync::Arc,
  time::{Duration, Instant},
};

use crate::{
  context::{Ctx, CtxError},
  observable::{Observable, ObservableExt},
  observer::Observer,
  subscription::{SerialSubscription, Subscription},
};

// ============================================================================
// Context derivation
// ============================================================================

/// See [`ObservableExt::ctx_with_value`].
pub struct ContextWithValueOp<S, Item, Err> {
  pub(crate) source: S,
  pub(crate) key: &'static str,
  pub(crate) value: Arc<dyn Any + Send + Sync>,
  pub(crate) _hint: PhantomData<fn() -> (Item, Err)>,
}

impl<S: Clone, Item, Err> Clone for ContextWithValueOp<S, Item, Err> {
  fn clone(&self) -> Self {
    Self {
      source: self.source.clone(),
      key: self.key,
      value: self.value.clone(),
      _hint: PhantomData,
    }
  }
}

impl<S, Item, Err> ObservableExt<Item, Err> for ContextWithValueOp<S, Item, Err> where
  S: ObservableExt<Item, Err>
{
}

impl<S, Item, Err, O> Observable<Item, Err, O> for ContextWithValueOp<S, Item, Err>
where
  S: Observable<Item, Err, O>,
  O: Observer<Item, Err>,
{
  type Unsub = S::Unsub;

  fn actual_subscribe(self, ctx: Ctx, observer: O) -> Self::Unsub {
    self.source.actual_subscribe(ctx.with_value_arc(self.key, self.value), observer)
  }
}

/// See [`ObservableExt::ctx_with_timeout`].
pub struct ContextWithTimeoutOp<S, Item, Err> {
  pub(crate) source: S,
  pub(crate) duration: Duration,
  pub(crate) cause: Option<CtxError>,
  pub(crate) _hint: PhantomData<fn() -> (Item, Err)>,
}

impl<S: Clone, Item, Err> Clone for ContextWithTimeoutOp<S, Item, Err> {
  fn clone(&self) -> Self {
    Self {
      source: self.source.clone(),
      duration: self.duration,
      cause: self.cause.clone(),
      _hint: PhantomData,
    }
  }
}

impl<S, Item, Err> ObservableExt<Item, Err> for ContextWithTimeoutOp<S, Item, Err> where
  S: ObservableExt<Item, Err>
{
}

impl<S, Item, Err, O> Observable<Item, Err, O> for ContextWithTimeoutOp<S, Item, Err>
where
  S: Observable<Item, Err, O>,
  O: Observer<Item, Err>,
{
  type Unsub = S::Unsub;

  fn actual_subscribe(self, ctx: Ctx, observer: O) -> Self::Unsub {
    let derived = match self.cause {
      Some(cause) => ctx.with_timeout_cause(self.duration, cause),
      None => ctx.with_timeout(self.duration),
    };
    self.source.actual_subscribe(derived, observer)
  }
}

/// See [`ObservableExt::ctx_with_deadline`].
pub struct ContextWithDeadlineOp<S, Item, Err> {
  pub(crate) source: S,
  pub(crate) deadline: Instant,
  pub(crate) cause: Option<CtxError>,
  pub(crate) _hint: PhantomData<fn() -> (Item, Err)>,
}

impl<S: Clone, Item, Err> Clone for ContextWithDeadlineOp<S, Item, Err> {
  fn clone(&self) -> Self {
    Self {
      source: self.source.clone(),
      deadline: self.deadline,
      cause: self.cause.clone(),
      _hint: PhantomData,
    }
  }
}

impl<S, Item, Err> ObservableExt<Item, Err> for ContextWithDeadlineOp<S, Item, Err> where
  S: ObservableExt<Item, Err>
{
}

impl<S, Item, Err, O> Observable<Item, Err, O> for ContextWithDeadlineOp<S, Item, Err>
where
  S: Observable<Item, Err, O>,
  O: Observer<Item, Err>,
{
  type Unsub = S::Unsub;

  fn actual_subscribe(self, ctx: Ctx, observer: O) -> Self::Unsub {
    let derived = match self.cause {
      Some(cause) => ctx.with_deadline_cause(self.deadline, cause),
      None => ctx.with_deadline(self.deadline),
    };
    self.source.actual_subscribe(derived, observer)
  }
}

/// See [`ObservableExt::ctx_reset`].
pub struct ContextResetOp<S, Item, Err> {
  pub(crate) source: S,
  pub(crate) ctx: Option<Ctx>,
  pub(crate) _hint: PhantomData<fn() -> (Item, Err)>,
}

impl<S: Clone, Item, Err> Clone for ContextResetOp<S, Item, Err> {
  fn clone(&self) -> Self {
    Self { source: self.source.clone(), ctx: self.ctx.clone(), _hint: PhantomData }
  }
}

impl<S, Item, Err> ObservableExt<Item, Err> for ContextResetOp<S, Item, Err> where
  S: ObservableExt<Item, Err>
{
}

impl<S, Item, Err, O> Observable<Item, Err, O> for ContextResetOp<S, Item, Err>
where
  S: Observable<Item, Err, O>,
  O: Observer<Item, Err>,
{
  type Unsub = S::Unsub;

  fn actual_subscribe(self, _ctx: Ctx, observer: O) -> Self::Unsub {
    let replacement = self.ctx.unwrap_or_else(Ctx::background);
    self.source.actual_subscribe(replacement, observer)
  }
}

// ============================================================================
// Context observation
// ============================================================================

/// See [`ObservableExt::with_ctx`].
pub struct WithCtxOp<S, Item, Err> {
  pub(crate) source: S,
  pub(crate) _hint: PhantomData<fn() -> (Item, Err)>,
}

impl<S: Clone, Item, Err> Clone for WithCtxOp<S, Item, Err> {
  fn clone(&self) -> Self { Self { source: self.source.clone(), _hint: PhantomData } }
}

impl<S, Item, Err> ObservableExt<(Item, Ctx), Err> for WithCtxOp<S, Item, Err> where
  S: ObservableExt<Item, Err>
{
}

impl<S, Item, Err, O> Observable<(Item, Ctx), Err, O> for WithCtxOp<S, Item, Err>
where
  S: Observable<Item, Err, WithCtxObserver<O>>,
  O: Observer<(Item, Ctx), Err>,
{
  type Unsub = S::Unsub;

  fn actual_subscribe(self, ctx: Ctx, observer: O) -> Self::Unsub {
    self.source.actual_subscribe(ctx.clone(), WithCtxObserver { observer, ctx })
  }
}

/// Pairs every value with the context active for this subscription.
pub struct WithCtxObserver<O> {
  observer: O,
  ctx: Ctx,
}

impl<Item, Err, O> Observer<Item, Err> for WithCtxObserver<O>
where
  O: Observer<(Item, Ctx), Err>,
{
  fn next(&mut self, value: Item) { self.observer.next((value, self.ctx.clone())); }

  fn error(self, err: Err) { self.observer.error(err); }

  fn complete(self) { self.observer.complete(); }

  fn is_closed(&self) -> bool { self.observer.is_closed() }
}

// ============================================================================
// Cancellation enforcement
// ============================================================================

/// See [`ObservableExt::throw_on_context_cancel`].
pub struct ThrowOnContextCancelOp<S, Item, Err> {
  pub(crate) source: S,
  pub(crate) _hint: PhantomData<fn() -> (Item, Err)>,
}

impl<S: Clone, Item, Err> Clone for ThrowOnContextCancelOp<S, Item, Err> {
  fn clone(&self) -> Self { Self { source: self.source.clone(), _hint: PhantomData } }
}

impl<S, Item, Err> ObservableExt<Item, Err> for ThrowOnContextCancelOp<S, Item, Err> where
  S: ObservableExt<Item, Err>
{
}

impl<S, Item, Err, O> Observable<Item, Err, O> for ThrowOnContextCancelOp<S, Item, Err>
where
  S: Observable<Item, Err, ThrowOnCancelObserver<O>>,
  S::Unsub: Send + 'static,
  Err: From<CtxError>,
  O: Observer<Item, Err>,
{
  type Unsub = SerialSubscription;

  fn actual_subscribe(self, ctx: Ctx, observer: O) -> Self::Unsub {
    let serial = SerialSubscription::new();
    // A context that is already done never reaches the source.
    if let Some(reason) = ctx.err() {
      observer.error(reason.into());
      let mut closed = serial;
      closed.unsubscribe();
      return closed;
    }
    let throw_observer =
      ThrowOnCancelObserver { observer: Some(observer), ctx: ctx.clone(), serial: serial.clone() };
    let unsub = self.source.actual_subscribe(ctx, throw_observer);
    serial.swap(unsub);
    serial
  }
}

/// Converts a done context into a terminal error at the next emission,
/// then cancels the upstream.
pub struct ThrowOnCancelObserver<O> {
  observer: Option<O>,
  ctx: Ctx,
  serial: SerialSubscription,
}

impl<Item, Err, O> Observer<Item, Err> for ThrowOnCancelObserver<O>
where
  Err: From<CtxError>,
  O: Observer<Item, Err>,
{
  fn next(&mut self, value: Item) {
    if self.observer.is_none() {
      return;
    }
    match self.ctx.err() {
      None => {
        if let Some(observer) = &mut self.observer {
          observer.next(value);
        }
      }
      Some(reason) => {
        if let Some(observer) = self.observer.take() {
          observer.error(reason.into());
        }
        self.serial.clone().unsubscribe();
      }
    }
  }

  fn error(self, err: Err) {
    if let Some(observer) = self.observer {
      observer.error(err);
    }
  }

  fn complete(self) {
    if let Some(observer) = self.observer {
      observer.complete();
    }
  }

  fn is_closed(&self) -> bool {
    match &self.observer {
      Some(observer) => observer.is_closed(),
      None => true,
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Mutex;

  use super::*;
  use crate::observable::{create, from_iter};
  use crate::observer::{Emitter, ObserverAll};
  use crate::subject::Subject;

  #[test]
  fn derived_value_is_visible_upstream() {
    let mut seen = None;
    from_iter(0..1)
      .with_ctx()
      .ctx_with_value("tenant", 42u32)
      .subscribe_all(
        |(_, ctx): (i32, Ctx)| {
          seen = ctx.value("tenant").and_then(|v| v.downcast_ref::<u32>().copied());
        },
        |_: ()| {},
        || {},
      );
    assert_eq!(seen, Some(42));
  }

  #[test]
  fn reset_hides_outer_values() {
    let mut seen = None;
    let mut delivered = false;
    from_iter(0..1)
      .with_ctx()
      .ctx_reset(None)
      .ctx_with_value("tenant", 42u32)
      .subscribe_all(
        |(_, ctx): (i32, Ctx)| {
          delivered = true;
          seen = ctx.value("tenant").map(|_| ());
        },
        |_: ()| {},
        || {},
      );
    assert!(delivered);
    assert_eq!(seen, None);
  }

  #[test]
  fn expired_timeout_surfaces_as_an_error() {
    let mut errored = None;
    create(|e: &mut dyn Emitter<i32, CtxError>| {
      e.next(1);
    })
    .throw_on_context_cancel()
    .ctx_with_timeout(Duration::ZERO)
    .subscribe_all(|_| {}, |e| errored = Some(e), || {});
    assert_eq!(errored, Some(CtxError::DeadlineExceeded));
  }

  #[test]
  fn live_context_passes_values_through() {
    let mut values = vec![];
    from_iter(1..=2)
      .throw_on_context_cancel()
      .ctx_with_timeout(Duration::from_secs(3600))
      .subscribe_all(|v| values.push(v), |_: CtxError| {}, || {});
    assert_eq!(values, vec![1, 2]);
  }

  #[test]
  fn cancel_detaches_from_a_hot_source_mid_delivery() {
    let values = Arc::new(Mutex::new(vec![]));
    let errors = Arc::new(Mutex::new(vec![]));
    let (ctx, handle) = Ctx::background().with_cancel();
    let mut subject = Subject::<i32, CtxError>::new();
    let v = values.clone();
    let e = errors.clone();
    let _sub = subject.clone().throw_on_context_cancel().subscribe_with_context(
      ctx,
      ObserverAll {
        next: move |value: i32| v.lock().unwrap().push(value),
        error: move |err: CtxError| e.lock().unwrap().push(err),
        complete: || {},
      },
    );

    subject.next(1);
    handle.cancel();
    // The conversion runs inside the subject's own fan-out; it errors the
    // downstream and unsubscribes the upstream without re-entering the
    // subject, and the triggering value is not delivered.
    subject.next(2);
    subject.next(3);

    assert_eq!(*values.lock().unwrap(), vec![1]);
    assert_eq!(*errors.lock().unwrap(), vec![CtxError::Canceled]);
    assert_eq!(subject.subscriber_count(), 0);
  }
}
