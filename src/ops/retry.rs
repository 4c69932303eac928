use std::{marker::PhantomData, thread, time::Duration};

use crate::{
  context::Ctx,
  observable::{Observable, ObservableExt},
  observer::{BoxObserver, Observer},
  subscription::{SerialSubscription, Subscription},
};

/// Decides whether a failed source gets another subscription attempt.
///
/// `attempts_made` counts every subscription of the source so far, the
/// initial one included: with a budget of 3 the source runs at most
/// three times, two of them retries. Returning `Some(delay)` authorizes
/// the next attempt after `delay`, slept on the thread that observed the
/// error; `None` lets the error through. With `reset_on_success` each
/// delivered value re-arms the budget, so only consecutive failures
/// count against it.
pub trait RetryPolicy<Err> {
  fn should_retry(&self, err: &Err, attempts_made: usize) -> Option<Duration>;

  fn reset_on_success(&self) -> bool { false }
}

/// A bare `usize` is the whole policy for `retry(n)`: a total attempt
/// budget with immediate re-subscription.
impl<Err> RetryPolicy<Err> for usize {
  fn should_retry(&self, _err: &Err, attempts_made: usize) -> Option<Duration> {
    (attempts_made < *self).then_some(Duration::ZERO)
  }
}

#[derive(Clone, Copy, Debug)]
pub struct RetryConfig {
  max_retries: usize,
  delay: Duration,
  reset_on_success: bool,
}

impl RetryConfig {
  pub fn new(max_retries: usize) -> Self {
    Self { max_retries, delay: Duration::ZERO, reset_on_success: false }
  }

  /// Wait this long before each re-subscription.
  pub fn delay(mut self, delay: Duration) -> Self {
    self.delay = delay;
    self
  }

  /// Re-arm the attempt budget whenever the source delivers a value.
  pub fn reset_on_success(mut self) -> Self {
    self.reset_on_success = true;
    self
  }
}

impl<Err> RetryPolicy<Err> for RetryConfig {
  fn should_retry(&self, _err: &Err, attempts_made: usize) -> Option<Duration> {
    (attempts_made < self.max_retries).then_some(self.delay)
  }

  fn reset_on_success(&self) -> bool { self.reset_on_success }
}

/// See [`ObservableExt::retry`].
pub struct RetryOp<S, P, Item, Err> {
  pub(crate) source: S,
  pub(crate) policy: P,
  pub(crate) _hint: PhantomData<fn() -> (Item, Err)>,
}

impl<S: Clone, P: Clone, Item, Err> Clone for RetryOp<S, P, Item, Err> {
  fn clone(&self) -> Self {
    Self { source: self.source.clone(), policy: self.policy.clone(), _hint: PhantomData }
  }
}

impl<S, P, Item, Err> ObservableExt<Item, Err> for RetryOp<S, P, Item, Err> where
  S: ObservableExt<Item, Err>
{
}

/// The source only ever sees a boxed observer: each attempt hands it a
/// fresh [`BoxObserver`], so the observer type stays the same no matter
/// how many re-subscriptions happen.
impl<S, P, Item, Err, O> Observable<Item, Err, O> for RetryOp<S, P, Item, Err>
where
  S: Observable<Item, Err, BoxObserver<Item, Err>> + Clone + Send + 'static,
  S::Unsub: Send + 'static,
  P: RetryPolicy<Err> + Send + 'static,
  O: Observer<Item, Err> + Send + 'static,
  Item: 'static,
  Err: 'static,
{
  type Unsub = SerialSubscription;

  fn actual_subscribe(self, ctx: Ctx, observer: O) -> Self::Unsub {
    let serial = SerialSubscription::new();
    let first_attempt: BoxObserver<Item, Err> = Box::new(RetryObserver {
      source: self.source.clone(),
      observer,
      policy: self.policy,
      attempts: 1,
      serial: serial.clone(),
      ctx: ctx.clone(),
    });
    // Synchronous failures re-subscribe from inside this call; `swap`
    // drops the then-stale handle instead of displacing the live one.
    let unsub = self.source.actual_subscribe(ctx, first_attempt);
    serial.swap(unsub);
    serial
  }
}

/// Downstream stand-in that intercepts the terminal error and re-runs the
/// source while the policy allows another attempt.
pub struct RetryObserver<S, P, O> {
  source: S,
  observer: O,
  policy: P,
  attempts: usize,
  serial: SerialSubscription,
  ctx: Ctx,
}

impl<S, P, Item, Err, O> Observer<Item, Err> for RetryObserver<S, P, O>
where
  S: Observable<Item, Err, BoxObserver<Item, Err>> + Clone + Send + 'static,
  S::Unsub: Send + 'static,
  P: RetryPolicy<Err> + Send + 'static,
  O: Observer<Item, Err> + Send + 'static,
  Item: 'static,
  Err: 'static,
{
  fn next(&mut self, value: Item) {
    if self.policy.reset_on_success() {
      self.attempts = 1;
    }
    self.observer.next(value);
  }

  fn error(self, err: Err) {
    let RetryObserver { source, observer, policy, attempts, serial, ctx } = self;
    if serial.is_closed() {
      return;
    }
    let delay = if ctx.is_done() { None } else { policy.should_retry(&err, attempts) };
    match delay {
      Some(delay) => {
        if !delay.is_zero() {
          thread::sleep(delay);
        }
        let next_attempt: BoxObserver<Item, Err> = Box::new(RetryObserver {
          source: source.clone(),
          observer,
          policy,
          attempts: attempts + 1,
          serial: serial.clone(),
          ctx: ctx.clone(),
        });
        let unsub = source.actual_subscribe(ctx, next_attempt);
        serial.swap(unsub);
      }
      None => observer.error(err),
    }
  }

  fn complete(self) { self.observer.complete(); }

  fn is_closed(&self) -> bool { self.serial.is_closed() || self.observer.is_closed() }
}
