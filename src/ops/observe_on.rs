use std::{marker::PhantomData, sync::atomic::Ordering};

use crate::{
  context::Ctx,
  emission::SafeObserver,
  observable::{Observable, ObservableExt},
  observer::Observer,
  scheduler::{boundary, spawn_consumer, Boundary, QueueSender},
  subscription::{FnSubscription, SharedSubscription},
};

/// See [`ObservableExt::observe_on`].
pub struct ObserveOnOp<S, Item, Err> {
  pub(crate) source: S,
  pub(crate) buffer_size: usize,
  pub(crate) _hint: PhantomData<fn() -> (Item, Err)>,
}

impl<S: Clone, Item, Err> Clone for ObserveOnOp<S, Item, Err> {
  fn clone(&self) -> Self {
    Self { source: self.source.clone(), buffer_size: self.buffer_size, _hint: PhantomData }
  }
}

impl<S, Item, Err> ObservableExt<Item, Err> for ObserveOnOp<S, Item, Err> where
  S: ObservableExt<Item, Err>
{
}

impl<S, Item, Err, O> Observable<Item, Err, O> for ObserveOnOp<S, Item, Err>
where
  S: Observable<Item, Err, QueueSender<Item, Err>>,
  S::Unsub: Send + 'static,
  Item: Send + 'static,
  Err: Send + 'static,
  O: Observer<Item, Err> + Send + 'static,
{
  type Unsub = SharedSubscription;

  fn actual_subscribe(self, ctx: Ctx, observer: O) -> Self::Unsub {
    let Boundary { sender, receiver, stop } = boundary(self.buffer_size);
    let deliver = SafeObserver::new(observer);
    let detach = deliver.clone();
    let _consumer = spawn_consumer(receiver, deliver, stop.clone());

    let subscription = SharedSubscription::new();
    subscription.add(FnSubscription::new(move || {
      stop.store(true, Ordering::Release);
      detach.stop();
    }));
    // The upstream may emit synchronously right here; the consumer thread
    // is already draining, so a full queue only stalls the producer.
    let upstream = self.source.actual_subscribe(ctx, sender);
    subscription.add(upstream);
    subscription
  }
}
