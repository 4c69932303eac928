use std::{marker::PhantomData, sync::atomic::Ordering, thread};

use crate::{
  context::Ctx,
  emission::SafeObserver,
  observable::{Observable, ObservableExt},
  observer::Observer,
  scheduler::{boundary, spawn_consumer, Boundary, QueueSender},
  subscription::{FnSubscription, SerialSubscription, SharedSubscription},
};

/// See [`ObservableExt::subscribe_on`].
pub struct SubscribeOnOp<S, Item, Err> {
  pub(crate) source: S,
  pub(crate) buffer_size: usize,
  pub(crate) _hint: PhantomData<fn() -> (Item, Err)>,
}

impl<S: Clone, Item, Err> Clone for SubscribeOnOp<S, Item, Err> {
  fn clone(&self) -> Self {
    Self { source: self.source.clone(), buffer_size: self.buffer_size, _hint: PhantomData }
  }
}

impl<S, Item, Err> ObservableExt<Item, Err> for SubscribeOnOp<S, Item, Err> where
  S: ObservableExt<Item, Err>
{
}

impl<S, Item, Err, O> Observable<Item, Err, O> for SubscribeOnOp<S, Item, Err>
where
  S: Observable<Item, Err, QueueSender<Item, Err>> + Send + 'static,
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

    // The upstream subscribe runs on its own thread, so this call returns
    // before the source produces anything. Its handle lands in the serial
    // slot once available; unsubscribing the slot earlier closes it, and
    // `swap` then tears the late handle down on arrival.
    let upstream = SerialSubscription::new();
    let slot = upstream.clone();
    let source = self.source;
    thread::Builder::new()
      .name("rxflow-subscribe-on".into())
      .spawn(move || {
        let unsub = source.actual_subscribe(ctx, sender);
        slot.swap(unsub);
      })
      .expect("spawn subscribe_on producer thread");

    let subscription = SharedSubscription::new();
    subscription.add(FnSubscription::new(move || {
      stop.store(true, Ordering::Release);
      detach.stop();
    }));
    subscription.add(upstream);
    subscription
  }
}
