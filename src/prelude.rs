//! One-stop import for users of the engine.

pub use crate::{
  context::{CancelHandle, Ctx, CtxError},
  emission::{Deliver, Notification, SafeObserver, UnsafeObserver},
  observable::{
    create, defer, empty, from_iter, never, of, throw_err, Observable, ObservableExt,
  },
  observer::{BoxObserver, Emitter, FnMutObserver, Observer, ObserverAll},
  ops::{
    retry::{RetryConfig, RetryPolicy},
    share::{ShareConfig, ShareReplayConfig},
  },
  subject::{BehaviorSubject, ReplaySubject, Subject},
  subscription::{
    BoxSubscription, FnSubscription, SerialSubscription, SharedSubscription, Subscription,
    SubscriptionGuard, SubscriptionWrapper,
  },
};
