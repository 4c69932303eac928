//! Reference-counted multicasting over a connector subject.
//!
//! `ShareOp` owns one upstream connection and fans it out through a
//! subject built by the connector. The connection is established when a
//! subscriber finds the share disconnected and is torn down (or kept,
//! depending on the reset flags) on upstream terminal or when the
//! subscriber count drops back to zero.
//!
//! The upstream is subscribed under the root context, not any one
//! subscriber's: a shared execution must not die with the first
//! subscriber's deadline. Subscriber contexts still govern their own
//! attach.

use std::{
  marker::PhantomData,
  mem,
  sync::{Arc, Mutex},
};

use crate::{
  context::Ctx,
  observable::{Observable, ObservableExt},
  observer::Observer,
  subscription::{BoxSubscription, Subscription},
};

/// Reset behavior and connector for [`ObservableExt::share_with_config`].
///
/// All three reset flags default to on, matching plain `share`.
pub struct ShareConfig<Sub, C> {
  pub(crate) connector: C,
  pub(crate) reset_on_error: bool,
  pub(crate) reset_on_complete: bool,
  pub(crate) reset_on_ref_count_zero: bool,
  _marker: PhantomData<Sub>,
}

impl<Sub, C: Fn() -> Sub> ShareConfig<Sub, C> {
  pub fn new(connector: C) -> Self {
    Self {
      connector,
      reset_on_error: true,
      reset_on_complete: true,
      reset_on_ref_count_zero: true,
      _marker: PhantomData,
    }
  }

  pub fn reset_on_error(mut self, on: bool) -> Self {
    self.reset_on_error = on;
    self
  }

  pub fn reset_on_complete(mut self, on: bool) -> Self {
    self.reset_on_complete = on;
    self
  }

  pub fn reset_on_ref_count_zero(mut self, on: bool) -> Self {
    self.reset_on_ref_count_zero = on;
    self
  }
}

/// Reset behavior for [`ObservableExt::share_replay_with_config`].
///
/// Replay sharing keeps its buffer across upstream termination, so there
/// are deliberately no error/complete reset knobs here; the only choice
/// is whether losing the last subscriber discards buffer and connection.
/// Defaults to keeping both.
#[derive(Clone, Copy, Debug, Default)]
pub struct ShareReplayConfig {
  reset_on_ref_count_zero: bool,
}

impl ShareReplayConfig {
  pub fn new() -> Self { Self::default() }

  pub fn reset_on_ref_count_zero(mut self, on: bool) -> Self {
    self.reset_on_ref_count_zero = on;
    self
  }

  pub(crate) fn into_share_config<Sub, C: Fn() -> Sub>(self, connector: C) -> ShareConfig<Sub, C> {
    ShareConfig {
      connector,
      reset_on_error: false,
      reset_on_complete: false,
      reset_on_ref_count_zero: self.reset_on_ref_count_zero,
      _marker: PhantomData,
    }
  }
}

enum Connection {
  Disconnected,
  /// The upstream subscribe is running; its handle is not yet known.
  Connecting,
  Connected(BoxSubscription),
}

struct ShareState<Sub> {
  subject: Option<Sub>,
  connection: Connection,
  ref_count: usize,
}

struct ShareInner<S, Sub, C> {
  source: S,
  connector: C,
  reset_on_error: bool,
  reset_on_complete: bool,
  reset_on_ref_count_zero: bool,
  state: Mutex<ShareState<Sub>>,
}

impl<S, Sub, C> ShareInner<S, Sub, C> {
  /// Drop the current subject and connection so the next subscriber
  /// starts a fresh execution. The displaced connection handle is
  /// unsubscribed outside the state lock.
  fn reset_connection(&self) {
    tracing::debug!(target: "rxflow::share", "share reset");
    let displaced = {
      let mut state = self.state.lock().unwrap();
      state.subject = None;
      mem::replace(&mut state.connection, Connection::Disconnected)
    };
    if let Connection::Connected(mut handle) = displaced {
      handle.unsubscribe();
    }
  }
}

/// See [`ObservableExt::share`].
pub struct ShareOp<S, Sub, C> {
  inner: Arc<ShareInner<S, Sub, C>>,
}

impl<S, Sub, C> Clone for ShareOp<S, Sub, C> {
  fn clone(&self) -> Self { Self { inner: self.inner.clone() } }
}

impl<S, Sub, C> ShareOp<S, Sub, C> {
  pub(crate) fn new(source: S, config: ShareConfig<Sub, C>) -> Self {
    Self {
      inner: Arc::new(ShareInner {
        source,
        connector: config.connector,
        reset_on_error: config.reset_on_error,
        reset_on_complete: config.reset_on_complete,
        reset_on_ref_count_zero: config.reset_on_ref_count_zero,
        state: Mutex::new(ShareState {
          subject: None,
          connection: Connection::Disconnected,
          ref_count: 0,
        }),
      }),
    }
  }
}

impl<S, Sub, C, Item, Err> ObservableExt<Item, Err> for ShareOp<S, Sub, C> where
  S: ObservableExt<Item, Err>
{
}

impl<S, Sub, C, Item, Err, O> Observable<Item, Err, O> for ShareOp<S, Sub, C>
where
  S: Observable<Item, Err, ShareConnectionObserver<S, Sub, C>> + Clone,
  S::Unsub: Send + 'static,
  Sub: Observable<Item, Err, O> + Observer<Item, Err> + Clone,
  <Sub as Observable<Item, Err, O>>::Unsub: Send + 'static,
  C: Fn() -> Sub,
  O: Observer<Item, Err>,
{
  type Unsub = ShareSubscription<S, Sub, C>;

  fn actual_subscribe(self, ctx: Ctx, observer: O) -> Self::Unsub {
    let inner = self.inner;
    let (subject, need_connect) = {
      let mut state = inner.state.lock().unwrap();
      let subject = match &state.subject {
        Some(subject) => subject.clone(),
        None => {
          let subject = (inner.connector)();
          state.subject = Some(subject.clone());
          subject
        }
      };
      let need_connect = matches!(state.connection, Connection::Disconnected);
      if need_connect {
        state.connection = Connection::Connecting;
      }
      (subject, need_connect)
    };

    // Attach before connecting, so this subscriber observes the shared
    // execution from its very first emission.
    let attach = subject.clone().actual_subscribe(ctx, observer);
    let live = !attach.is_closed();
    if live {
      inner.state.lock().unwrap().ref_count += 1;
    }

    if need_connect {
      tracing::debug!(target: "rxflow::share", "connecting shared upstream");
      let connection_observer = ShareConnectionObserver { subject, inner: inner.clone() };
      let handle = inner.source.clone().actual_subscribe(Ctx::background(), connection_observer);
      let stale = {
        let mut state = inner.state.lock().unwrap();
        if matches!(state.connection, Connection::Connecting) {
          state.connection = Connection::Connected(Box::new(handle));
          None
        } else {
          // A synchronous terminal already reset the share; the handle
          // belongs to a finished execution.
          Some(handle)
        }
      };
      if let Some(mut stale) = stale {
        stale.unsubscribe();
      }
    }

    ShareSubscription {
      inner,
      attach: if live { Some(Box::new(attach)) } else { None },
      done: !live,
    }
  }
}

/// Feeds the shared subject from the single upstream execution and
/// applies the terminal reset policy.
pub struct ShareConnectionObserver<S, Sub, C> {
  subject: Sub,
  inner: Arc<ShareInner<S, Sub, C>>,
}

impl<S, Sub, C, Item, Err> Observer<Item, Err> for ShareConnectionObserver<S, Sub, C>
where
  Sub: Observer<Item, Err>,
{
  fn next(&mut self, value: Item) { self.subject.next(value); }

  fn error(self, err: Err) {
    // Reset before delivery: a subscriber arriving between the two sees a
    // fresh share, not a terminated subject.
    if self.inner.reset_on_error {
      self.inner.reset_connection();
    }
    self.subject.error(err);
  }

  fn complete(self) {
    if self.inner.reset_on_complete {
      self.inner.reset_connection();
    }
    self.subject.complete();
  }

  fn is_closed(&self) -> bool { self.subject.is_closed() }
}

/// One subscriber's handle on a share: detaches from the subject and
/// applies the ref-count-zero reset policy.
pub struct ShareSubscription<S, Sub, C> {
  inner: Arc<ShareInner<S, Sub, C>>,
  attach: Option<BoxSubscription>,
  done: bool,
}

impl<S, Sub, C> Subscription for ShareSubscription<S, Sub, C> {
  fn unsubscribe(&mut self) {
    if self.done {
      return;
    }
    self.done = true;
    if let Some(mut attach) = self.attach.take() {
      attach.unsubscribe();
    }
    let teardown = {
      let mut state = self.inner.state.lock().unwrap();
      state.ref_count = state.ref_count.saturating_sub(1);
      if state.ref_count == 0 && self.inner.reset_on_ref_count_zero {
        tracing::debug!(target: "rxflow::share", "last subscriber left, disconnecting");
        state.subject = None;
        match mem::replace(&mut state.connection, Connection::Disconnected) {
          Connection::Connected(handle) => Some(handle),
          _ => None,
        }
      } else {
        None
      }
    };
    if let Some(mut teardown) = teardown {
      teardown.unsubscribe();
    }
  }

  fn is_closed(&self) -> bool { self.done }
}
