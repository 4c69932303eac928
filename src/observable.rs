//! The Observable side of the push protocol.
//!
//! An observable is an immutable descriptor of how to produce a
//! notification sequence: cold by construction, it owns no mutable state,
//! and every `subscribe` re-executes the producer logic independently
//! unless a sharing operator multiplexes it. The [`Observable`] trait is
//! the wiring contract implemented by sources and operators;
//! [`ObservableExt`] is the combinator surface users chain on.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};

mod create;
mod defer;
mod from_iter;
mod of;
mod trivial;

pub use create::{create, ObservableCreate};
pub use defer::{defer, ObservableDefer};
pub use from_iter::{from_iter, ObservableFromIter};
pub use of::{of, ObservableOf};
pub use trivial::{empty, never, throw_err, ObservableEmpty, ObservableNever, ObservableThrow};

use crate::{
  context::{Ctx, CtxError},
  observer::{FnMutObserver, Observer, ObserverAll},
  ops::{
    catch::CatchOp,
    context::{
      ContextResetOp, ContextWithDeadlineOp, ContextWithTimeoutOp, ContextWithValueOp,
      ThrowOnContextCancelOp, WithCtxOp,
    },
    observe_on::ObserveOnOp,
    on_error_resume_next::OnErrorResumeNextOp,
    on_error_return::OnErrorReturnOp,
    retry::{RetryConfig, RetryOp},
    share::{ShareConfig, ShareOp, ShareReplayConfig},
    subscribe_on::SubscribeOnOp,
  },
  subject::{ReplaySubject, Subject},
  subscription::{Subscription, SubscriptionWrapper},
};

/// Core subscribe contract: register `observer`, begin production, and
/// return the handle that cancels it.
///
/// `ctx` is the cancellation context active for this subscription;
/// operators that derive contexts rewrite it on the way to the source.
pub trait Observable<Item, Err, O: Observer<Item, Err>> {
  type Unsub: Subscription;

  fn actual_subscribe(self, ctx: Ctx, observer: O) -> Self::Unsub;
}

/// User-facing combinator surface.
///
/// Implemented explicitly (not blanket) by every source and operator so
/// `Item`/`Err` inference flows through chains without turbofish
/// annotations.
pub trait ObservableExt<Item, Err>: Sized {
  // ==================== subscribing ====================

  /// Subscribe with a value handler only.
  ///
  /// Only available when `Err` is [`Infallible`](std::convert::Infallible):
  /// ignoring errors is accepted solely for streams that cannot produce
  /// one. Use [`subscribe_all`](Self::subscribe_all) for fallible streams.
  fn subscribe<N>(
    self, next: N,
  ) -> SubscriptionWrapper<<Self as Observable<Item, Err, FnMutObserver<N>>>::Unsub>
  where
    N: FnMut(Item),
    FnMutObserver<N>: Observer<Item, Err>,
    Self: Observable<Item, Err, FnMutObserver<N>>,
  {
    SubscriptionWrapper(self.actual_subscribe(Ctx::background(), FnMutObserver(next)))
  }

  /// Subscribe with value, error and completion handlers.
  fn subscribe_all<N, E, C>(
    self, next: N, error: E, complete: C,
  ) -> SubscriptionWrapper<<Self as Observable<Item, Err, ObserverAll<N, E, C>>>::Unsub>
  where
    N: FnMut(Item),
    E: FnOnce(Err),
    C: FnOnce(),
    ObserverAll<N, E, C>: Observer<Item, Err>,
    Self: Observable<Item, Err, ObserverAll<N, E, C>>,
  {
    SubscriptionWrapper(self.actual_subscribe(Ctx::background(), ObserverAll { next, error, complete }))
  }

  /// Subscribe with an arbitrary observer under the background context.
  fn subscribe_with<O>(self, observer: O) -> <Self as Observable<Item, Err, O>>::Unsub
  where
    O: Observer<Item, Err>,
    Self: Observable<Item, Err, O>,
  {
    self.actual_subscribe(Ctx::background(), observer)
  }

  /// Subscribe with an arbitrary observer under an explicit context.
  fn subscribe_with_context<O>(
    self, ctx: Ctx, observer: O,
  ) -> <Self as Observable<Item, Err, O>>::Unsub
  where
    O: Observer<Item, Err>,
    Self: Observable<Item, Err, O>,
  {
    self.actual_subscribe(ctx, observer)
  }

  // ==================== scheduler boundary ====================

  /// Move downstream delivery onto a dedicated consumer thread, buffered
  /// through a bounded queue of `buffer_size` notifications. A full queue
  /// blocks the producer (backpressure); order is FIFO.
  fn observe_on(self, buffer_size: usize) -> ObserveOnOp<Self, Item, Err> {
    ObserveOnOp { source: self, buffer_size, _hint: PhantomData }
  }

  /// Run the upstream subscribe (and production) on a background thread;
  /// the calling thread's subscribe returns immediately. Emissions are
  /// buffered through a bounded queue of `buffer_size` notifications.
  fn subscribe_on(self, buffer_size: usize) -> SubscribeOnOp<Self, Item, Err> {
    SubscribeOnOp { source: self, buffer_size, _hint: PhantomData }
  }

  // ==================== sharing ====================

  /// Multiplex one upstream execution across all simultaneous
  /// subscribers through an internal publish [`Subject`]. Resets on
  /// error, on completion and on the subscriber count reaching zero.
  fn share(self) -> ShareOp<Self, Subject<Item, Err>, fn() -> Subject<Item, Err>>
  where
    Item: Clone,
    Err: Clone,
  {
    self.share_with_config(ShareConfig::new(Subject::new as fn() -> Subject<Item, Err>))
  }

  /// [`share`](Self::share) with an explicit connector and reset flags.
  fn share_with_config<Sub, C>(self, config: ShareConfig<Sub, C>) -> ShareOp<Self, Sub, C>
  where
    Sub: Observer<Item, Err>,
    C: Fn() -> Sub,
  {
    ShareOp::new(self, config)
  }

  /// Share through a bounded [`ReplaySubject`], so late subscribers see
  /// the last `buffer_size` values. The replay buffer persists across
  /// upstream termination; only the ref-count-zero reset applies, and
  /// only when enabled through
  /// [`share_replay_with_config`](Self::share_replay_with_config).
  #[allow(clippy::type_complexity)]
  fn share_replay(
    self, buffer_size: usize,
  ) -> ShareOp<Self, ReplaySubject<Item, Err>, Box<dyn Fn() -> ReplaySubject<Item, Err> + Send>>
  where
    Item: Clone,
    Err: Clone,
  {
    self.share_replay_with_config(buffer_size, ShareReplayConfig::new())
  }

  #[allow(clippy::type_complexity)]
  fn share_replay_with_config(
    self, buffer_size: usize, config: ShareReplayConfig,
  ) -> ShareOp<Self, ReplaySubject<Item, Err>, Box<dyn Fn() -> ReplaySubject<Item, Err> + Send>>
  where
    Item: Clone,
    Err: Clone,
  {
    let connector: Box<dyn Fn() -> ReplaySubject<Item, Err> + Send> =
      Box::new(move || ReplaySubject::new(buffer_size));
    ShareOp::new(self, config.into_share_config(connector))
  }

  // ==================== error recovery ====================

  /// Re-subscribe the source on error, up to `max_retries` total
  /// subscription attempts; once exhausted the last error propagates.
  fn retry(self, max_retries: usize) -> RetryOp<Self, usize, Item, Err> {
    RetryOp { source: self, policy: max_retries, _hint: PhantomData }
  }

  fn retry_with_config(self, config: RetryConfig) -> RetryOp<Self, RetryConfig, Item, Err> {
    RetryOp { source: self, policy: config, _hint: PhantomData }
  }

  /// On error, subscribe the observable returned by `handler` in place of
  /// the failed source. Errors of the fallback propagate unhandled.
  fn catch<F>(self, handler: F) -> CatchOp<Self, F, Item, Err> {
    CatchOp { source: self, handler, _hint: PhantomData }
  }

  /// On error, emit `f(err)` and complete.
  fn on_error_return<F>(self, f: F) -> OnErrorReturnOp<Self, F, Item, Err> {
    OnErrorReturnOp { source: self, f, _hint: PhantomData }
  }

  /// On error, substitute each fallback in turn; the last error
  /// propagates once all fallbacks are exhausted.
  fn on_error_resume_next_with<C>(
    self, fallbacks: Vec<C>,
  ) -> OnErrorResumeNextOp<Self, C, Item, Err> {
    OnErrorResumeNextOp { source: self, fallbacks, _hint: PhantomData }
  }

  // ==================== cancellation context ====================

  /// Derive the upstream context with an additional key/value pair.
  fn ctx_with_value(
    self, key: &'static str, value: impl std::any::Any + Send + Sync,
  ) -> ContextWithValueOp<Self, Item, Err> {
    ContextWithValueOp { source: self, key, value: Arc::new(value), _hint: PhantomData }
  }

  /// Derive the upstream context with a timeout.
  fn ctx_with_timeout(self, duration: Duration) -> ContextWithTimeoutOp<Self, Item, Err> {
    ContextWithTimeoutOp { source: self, duration, cause: None, _hint: PhantomData }
  }

  fn ctx_with_timeout_cause(
    self, duration: Duration, cause: CtxError,
  ) -> ContextWithTimeoutOp<Self, Item, Err> {
    ContextWithTimeoutOp { source: self, duration, cause: Some(cause), _hint: PhantomData }
  }

  /// Derive the upstream context with a wall-clock deadline.
  fn ctx_with_deadline(self, deadline: Instant) -> ContextWithDeadlineOp<Self, Item, Err> {
    ContextWithDeadlineOp { source: self, deadline, cause: None, _hint: PhantomData }
  }

  fn ctx_with_deadline_cause(
    self, deadline: Instant, cause: CtxError,
  ) -> ContextWithDeadlineOp<Self, Item, Err> {
    ContextWithDeadlineOp { source: self, deadline, cause: Some(cause), _hint: PhantomData }
  }

  /// Discard the accumulated context: the upstream sees `ctx` when given,
  /// or a fresh root context otherwise.
  fn ctx_reset(self, ctx: Option<Ctx>) -> ContextResetOp<Self, Item, Err> {
    ContextResetOp { source: self, ctx, _hint: PhantomData }
  }

  /// Pair each value with the context active for this subscription.
  fn with_ctx(self) -> WithCtxOp<Self, Item, Err> { WithCtxOp { source: self, _hint: PhantomData } }

  /// Convert a done context into an error notification at the next
  /// emission (the cooperative check point). Chain this between the
  /// source and the context-deriving operator.
  fn throw_on_context_cancel(self) -> ThrowOnContextCancelOp<Self, Item, Err> {
    ThrowOnContextCancelOp { source: self, _hint: PhantomData }
  }
}
